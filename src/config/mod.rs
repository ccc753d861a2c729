//! Persisted block lists. [ConfigStore] is the only writer of the configuration file, the rest
//! of the application derives its state from [BlockConfig].

mod block_config;
mod store;

pub use block_config::{normalize_domain, normalize_url_pattern, wildcard_variant, BlockConfig};
pub use store::ConfigStore;

pub const CONFIG_FILE_NAME: &str = "blocked_sites.json";
