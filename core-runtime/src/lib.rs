//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the playback core and its façade:
//! - Logging and tracing setup with optional host log forwarding
//! - [`CoreConfig`](config::CoreConfig) builder with fail-fast validation
//! - Event bus for player, queue, cache and plugin events
//!
//! Nothing in here knows about the player itself; `core-playback` depends on
//! this crate, not the other way around.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
