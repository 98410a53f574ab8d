//! Runtime-agnostic async abstraction layer for the media catalog core.
//!
//! Every `core-*` and `bridge-*` crate depends on this crate instead of naming
//! Tokio directly, so the executor can be swapped in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `time`: Time-related operations (sleep, duration, instant, timeout)
//! - `sync`: Synchronization primitives (Mutex, RwLock, channels, cancellation)
//! - `fs`: Async filesystem helpers
//! - `runtime`: Runtime handles and `block_on`
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod fs;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
