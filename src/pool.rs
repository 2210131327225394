use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// The external worker-thread provider the rest of the crate schedules chunks onto.
///
/// Every other subsystem (actors, operators) is written against this narrow interface
/// rather than against `tokio` directly, mirroring the base design's "the core assumes
/// a `Pool` with `execute(task)`" collaborator.
#[derive(Clone)]
pub struct Pool {
    handle: Handle,
}

impl Pool {
    /// Wraps the `tokio` runtime the caller is currently inside of.
    pub fn current() -> Self {
        Pool {
            handle: Handle::current(),
        }
    }

    /// Wraps an explicit runtime handle, e.g. for actors owned by a dedicated group.
    pub fn from_handle(handle: Handle) -> Self {
        Pool { handle }
    }

    /// Submits one chunk of non-blocking work. This is the pool task a "chunk" (see
    /// the actor scheduling contract) is run as; it never occupies a worker between
    /// chunks because the future it drives is expected to complete on its own.
    pub fn execute<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(task)
    }

    /// Submits one chunk of work that may block the calling OS thread for its
    /// duration, e.g. the blocking-style actor's `receive()` loop.
    pub fn execute_blocking<F, R>(&self, task: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(task)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}
