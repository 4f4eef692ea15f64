// Memescope Core Library
// Feed normalization, snapshot caching and the client reducer

pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod reducer;
pub mod settings;
pub mod snapshot_store;
pub mod sse;
pub mod storage_trait;
pub mod symbol_cache;

#[cfg(feature = "native")]
pub mod native;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports
pub use error::CoreError;
pub use fetcher::*;
pub use metrics::*;
pub use models::*;
pub use reducer::*;
pub use settings::Settings;
pub use snapshot_store::*;
pub use storage_trait::*;
pub use symbol_cache::*;
