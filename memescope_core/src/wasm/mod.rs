// WASM-specific implementations
pub mod storage_impl;

pub use storage_impl::*;
