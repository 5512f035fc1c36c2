pub mod client;
pub mod config;
pub mod contact;
pub mod debounce;
pub mod error;
pub mod friendship;
pub mod gateway;
pub mod message;
pub mod parsers;
pub mod queue;
pub mod request;
pub mod room;
pub mod session;
pub mod store;
pub mod test_utils;
pub mod transport;
pub mod types;

pub use client::{BridgeState, Client};
pub use config::BridgeConfig;
pub use error::BridgeError;
