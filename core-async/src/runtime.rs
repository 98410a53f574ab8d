//! Runtime handles and a blocking entry point.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Drive `future` to completion on a fresh current-thread runtime.
///
/// Backs `#[core_async::test]` and synchronous callers that run outside any
/// runtime. Panics if the runtime cannot be built.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build runtime")
        .block_on(future)
}
