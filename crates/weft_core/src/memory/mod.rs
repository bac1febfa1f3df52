//! # Memory Management
//!
//! Fixed-capacity pools for records recycled across frames.

mod pool;

pub use pool::{PoolAllocator, PoolHandle};
