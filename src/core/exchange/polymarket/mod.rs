//! Polymarket adapters: REST, authenticated CLOB, WebSocket, universe.

pub mod clob;
pub mod messages;
pub mod response;
pub mod rest;
pub mod universe;
pub mod websocket;

pub use clob::{ClobClient, ClobCredentials};
pub use rest::DataClient;
pub use universe::{FetchedMarket, MarketCatalog, UniverseFetcher};
pub use websocket::{MarketStream, StreamConfig};
