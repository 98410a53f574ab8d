//! Time-related abstractions.
//!
//! `Instant` is monotonic and suitable for measuring elapsed time; `sleep`
//! and `timeout` integrate with the runtime's timer wheel.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
