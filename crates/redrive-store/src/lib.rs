//! # Redrive Store
//!
//! Low-level Redis adapter for the redrive scheduler.
//!
//! ## Design Principles
//!
//! - **No business logic** - Pure infrastructure layer
//! - **No dependencies** on other redrive-* crates
//! - **Generic operations** - Callers pick the value types
//!
//! ## Features
//!
//! - Connection management with automatic reconnection
//! - Key-value operations with expiry and TTL management
//! - Atomic claim consumption (GETDEL)
//! - List append/pop for time buckets
//! - Hash writes for the dead-letter table
//!
//! ## Example
//!
//! ```rust,no_run
//! use redrive_store::RedisStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = RedisStore::connect("redis://localhost:6379").await?;
//!
//!     store.rpush("20240101-1003", "{\"topic\":\"orders\"}").await?;
//!     store.expire("20240101-1003", 180).await?;
//!
//!     let entry: Option<String> = store.lpop("20240101-1003").await?;
//!
//!     Ok(())
//! }
//! ```

mod client;

pub use client::RedisStore;

// Re-export commonly used types
pub use redis::RedisError;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, RedisError>;
