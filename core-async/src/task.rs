//! Task spawning and execution abstractions.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     assert_eq!(handle.await.unwrap(), 42);
//!
//!     // Blocking work (directory walks, tag parsing) goes to the blocking pool
//!     let walked = task::spawn_blocking(|| 7).await.unwrap();
//!     assert_eq!(walked, 7);
//! }
//! ```

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the current runtime.
///
/// The spawned task may run on a different thread.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
