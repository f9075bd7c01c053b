//! `thresher check`: validate configuration and connectivity.

use std::path::Path;

use std::time::Duration;

use crate::app::{Config, TradeMode};
use crate::core::exchange::polymarket::{ClobCredentials, DataClient};
use crate::core::store::Database;

/// Validate the config file, credentials (live mode), and database
/// reachability. Returns the process exit code.
pub async fn execute(config_path: &Path) -> i32 {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config: FAIL ({e})");
            return 1;
        }
    };
    println!("config: ok");

    if let Err(e) = config.validate() {
        eprintln!("validation: FAIL ({e})");
        return 1;
    }
    println!("validation: ok");

    if config.venue.mode == TradeMode::Live {
        match ClobCredentials::load(&config.venue.credentials_file) {
            Ok(_) => println!("credentials: ok"),
            Err(e) => {
                eprintln!("credentials: FAIL ({e})");
                return 1;
            }
        }
    } else {
        println!("credentials: skipped (paper mode)");
    }

    let client = DataClient::new(
        config.venue.clob_url.clone(),
        config.venue.data_url.clone(),
        Duration::from_secs(config.venue.request_timeout_secs),
        Duration::from_secs(config.venue.max_trade_age_seconds),
    );
    match client {
        Ok(client) => match client.markets_page(None).await {
            Ok(page) => {
                let count = page.data.map_or(0, |d| d.len());
                println!("venue: ok ({count} markets on first page)");
            }
            Err(e) => {
                eprintln!("venue: FAIL ({e})");
                return 1;
            }
        },
        Err(e) => {
            eprintln!("venue: FAIL ({e})");
            return 1;
        }
    }

    match Database::connect(config.database.clone()).await {
        Ok(db) => {
            if db.health_check().await {
                println!("database: ok");
            } else {
                eprintln!("database: FAIL (health check)");
                return 1;
            }
            db.close().await;
        }
        Err(e) => {
            eprintln!("database: FAIL ({e})");
            return 1;
        }
    }

    println!("all checks passed");
    0
}
