//! Synchronization primitives.
//!
//! All primitives are `Send + Sync` and async-aware: holding a lock never
//! blocks the executor.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{CancellationToken, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let token = CancellationToken::new();
//!     let child = token.clone();
//!     token.cancel();
//!     assert!(child.is_cancelled());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
