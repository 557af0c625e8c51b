pub mod axis_map;
pub mod builder;
pub mod compose;
pub mod config;
pub mod error;
pub mod group;
pub mod intra_group;
pub mod job;
pub mod linearize;
pub mod shape;
pub mod table;
pub mod topology;
pub mod validate;

pub use error::*;
pub use shape::*;

use tracing_subscriber::EnvFilter;

/// Install the global log subscriber. `RUST_LOG` overrides the default
/// `info` level; calling this twice is harmless.
pub fn init_tracing(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("[{}] tracing initialized", service);
    }
}
