pub mod binance;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod model;
pub mod price_source;
pub mod price_store;
pub mod price_window;
pub mod server;
pub mod tick_processor;
pub mod trajectory;
