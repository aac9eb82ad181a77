// lib.rs
#![warn(clippy::large_futures)]

pub use std::net;

pub use anyhow::bail;
pub use serde::{Deserialize, Serialize};
pub use tokio::time::{sleep, Duration};

mod config;
pub use config::*;

mod sensors;
pub use sensors::*;

mod measure;
pub use measure::*;

mod feed;
pub use feed::*;

mod multicast;
pub use multicast::*;

mod wifi;
pub use wifi::*;

mod reporter;
pub use reporter::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

// EOF
