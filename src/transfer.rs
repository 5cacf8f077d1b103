//! Deferred data-transfer jobs.
//!
//! Command execution may require a data transfer that is too slow (or too
//! blocking) to run in the transport's capsule-receive context. Such work is
//! packaged as a [`TransferJob`] and handed to
//! [`QueuePair::enqueue_transfer`](crate::QueuePair::enqueue_transfer),
//! which runs jobs FIFO on a single draining task per queue pair. A job
//! still queued when the queue pair shuts down is aborted, never silently
//! dropped.

use std::future::Future;
use std::pin::Pin;

/// Boxed future for job execution.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An opaque unit of deferred data-transfer work.
///
/// Exactly one of [`execute`](TransferJob::execute) or
/// [`abort`](TransferJob::abort) is invoked for every job, consuming it.
pub trait TransferJob: Send + 'static {
    /// Perform the transfer. Runs on the queue pair's draining task and may
    /// take as long as the storage engine needs.
    fn execute(self: Box<Self>) -> BoxFuture<'static, ()>;

    /// Abandon the transfer. Invoked instead of `execute` when the queue
    /// pair is shutting down. May block or call into other subsystems; it
    /// is never invoked under the queue-pair lock.
    fn abort(self: Box<Self>);
}
