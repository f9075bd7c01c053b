//! Interestingness scoring for market discovery.
//!
//! Computes a strategy-agnostic score (0-100) indicating how likely a market
//! is to be interesting to SOME strategy. This is not a trading signal, just
//! a prioritization metric for deciding which markets deserve deeper data
//! retention (higher tiers).

use super::market::{MarketUniverse, Tier};

/// Input metrics for scoring a market.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketMetrics {
    /// Primary outcome price (0-1).
    pub price: Option<f64>,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub trade_count_24h: i64,
    pub price_change_24h: f64,
    pub price_change_1h: f64,
    pub spread: f64,
    pub days_to_end: Option<f64>,
    pub market_age_days: Option<f64>,
    pub category: Option<String>,
    pub outcome_count: i32,
}

impl From<&MarketUniverse> for MarketMetrics {
    fn from(m: &MarketUniverse) -> Self {
        Self {
            price: m.price,
            volume_24h: m.volume_24h,
            liquidity: m.liquidity,
            trade_count_24h: m.trade_count_24h,
            price_change_24h: m.price_change_24h,
            price_change_1h: m.price_change_1h,
            spread: m.spread.unwrap_or(0.0),
            days_to_end: m.days_to_end,
            market_age_days: m.market_age_days,
            category: m.category.clone(),
            outcome_count: m.outcome_count,
        }
    }
}

/// Category boost points, from historical predictability.
fn category_boost(category: &str) -> f64 {
    match category.to_ascii_lowercase().as_str() {
        "politics" => 5.0,
        "science" => 4.0,
        "economics" => 4.0,
        "crypto" => 3.0,
        "technology" => 3.0,
        "sports" => 2.0,
        "entertainment" => 1.0,
        _ => 0.0,
    }
}

/// Compute the strategy-agnostic interestingness score (0-100).
///
/// Breakdown: volume & liquidity max 25, price movement max 25, market
/// timing max 20, price extremes max 20, category boost max 10, spread
/// penalty up to -10, multi-outcome penalty -5. Clamped to [0, 100].
#[must_use]
pub fn compute_interestingness(m: &MarketMetrics) -> f64 {
    let mut score = 0.0;

    // Volume: log scale, max at $1M/day
    if m.volume_24h > 0.0 {
        score += (15.0 * ((m.volume_24h + 1.0).log10() / 6.0)).min(15.0);
    }

    // Liquidity: max at $100K
    if m.liquidity > 0.0 {
        score += (10.0 * (m.liquidity / 100_000.0)).min(10.0);
    }

    // 24h price change: 10% move = 15 pts
    score += (m.price_change_24h.abs() * 150.0).min(15.0);

    // 1h price change: 5% move = 10 pts
    score += (m.price_change_1h.abs() * 200.0).min(10.0);

    // New market bonus (< 7 days old)
    if let Some(age) = m.market_age_days {
        if age < 7.0 {
            score += 10.0 * (1.0 - age / 7.0);
        }
    }

    // Near resolution bonus (< 14 days to end)
    if let Some(days) = m.days_to_end {
        if days < 14.0 {
            score += 10.0 * (1.0 - days / 14.0);
        }
    }

    // Price extremes
    if let Some(price) = m.price {
        if price > 0.90 {
            score += 10.0 * ((price - 0.90) / 0.10);
        }
        if price < 0.10 {
            score += 10.0 * ((0.10 - price) / 0.10);
        }
        // Mid-range with high volume: competitive/uncertain
        if price > 0.40 && price < 0.60 && m.volume_24h > 50_000.0 {
            score += 5.0;
        }
    }

    // Spread penalty beyond 5%
    if m.spread > 0.05 {
        score -= ((m.spread - 0.05) * 100.0).min(10.0);
    }

    if let Some(category) = &m.category {
        score += category_boost(category);
    }

    // Multi-outcome markets are harder to trade
    if m.outcome_count > 2 {
        score -= 5.0;
    }

    score.clamp(0.0, 100.0)
}

/// Recommended tier for a score: >= 80 -> 3, >= 40 -> 2, else 1.
#[must_use]
pub fn tier_recommendation(score: f64) -> Tier {
    if score >= 80.0 {
        Tier::Three
    } else if score >= 40.0 {
        Tier::Two
    } else {
        Tier::One
    }
}
