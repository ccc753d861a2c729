//! The blocking engine. Each submodule owns one OS resource, [enforcer::Enforcer] ties them to
//! a [BlockConfig](crate::config::BlockConfig).

pub mod enforcer;
pub mod hosts;
pub mod policy;
pub mod processes;
