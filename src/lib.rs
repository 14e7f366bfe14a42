//! The Dathost Library
//!
//! This crate contains all the moving parts of the dat gateway. The
//! application itself, via `main.rs` is only a very tiny frontend.

pub use self::config::Config;
pub use self::error::{ExitError, Failed};
pub use self::operation::Operation;

pub mod archive;
pub mod config;
pub mod error;
pub mod http;
pub mod listing;
pub mod log;
pub mod lookup;
pub mod operation;
pub mod registry;
pub mod sniff;
pub mod vhost;
