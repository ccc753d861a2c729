//! Keeps distracting websites and applications out of reach.
//! Sites are redirected to loopback through the hosts file, url paths are blocked through
//! Chromium browser policies and blocked executables are killed on sight. A small daemon keeps
//! re-applying the configuration in the background.
//!

pub mod blocking;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod utils;
