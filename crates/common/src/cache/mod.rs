//! Bounded, expiring response cache.
//!
//! A thread-safe map with a hard size bound, least-recently-used eviction and
//! per-entry TTL expiry. Designed for caching upstream API responses: every
//! cache is bounded, every entry eventually expires, and a clock abstraction
//! keeps the time-based behavior deterministic in tests.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use portico_common::cache::{Cache, CacheConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::builder()
//!     .max_size(100)
//!     .ttl(Duration::from_secs(900))
//!     .build()?;
//!
//! let cache: Cache<String, String> = Cache::new(config);
//! cache.insert("items?limit=10".to_string(), "payload".to_string());
//! assert_eq!(cache.get(&"items?limit=10".to_string()), Some("payload".to_string()));
//!
//! let stats = cache.stats();
//! println!("hit rate: {:.2}%", stats.hit_rate() * 100.0);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! Handles are cheap clones sharing one storage, so the same cache can back
//! any number of concurrent callers:
//!
//! ```
//! use std::thread;
//!
//! use portico_common::cache::{Cache, CacheConfig};
//!
//! let cache: Cache<String, i32> = Cache::new(CacheConfig::default());
//!
//! let mut handles = vec![];
//! for i in 0..10 {
//!     let cache_clone = cache.clone();
//!     let handle = thread::spawn(move || {
//!         cache_clone.insert(format!("key-{}", i), i);
//!     });
//!     handles.push(handle);
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! ```

mod config;
mod core;
mod stats;

// Re-export public API
pub use config::{CacheConfig, CacheConfigBuilder};
pub use core::Cache;
pub use stats::CacheStats;
