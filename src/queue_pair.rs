//! Queue-pair lifecycle, command admission, and response emission.
//!
//! A [`QueuePair`] is the paired submission/completion channel for one
//! admin or I/O queue of a fabric connection. It owns the per-queue
//! transport handle, admits inbound command capsules (rejecting duplicates
//! and pre-association traffic), emits completions with optional
//! submission-queue flow control, and runs deferred data transfers on a
//! single FIFO draining task.
//!
//! # Concurrency
//!
//! The transport's receive callback, command interpreters completing
//! asynchronously, a shutdown initiator, and the draining task may all
//! touch a queue pair at once. The internal mutex guards only the transport
//! handle slot, the transfer queue, and the flow-control pointers, and is
//! never held across a transport or storage call. Command-identifier
//! admission is independent atomics. Transmissions pin the handle (clone
//! the `Arc` out of the slot under the lock) so a racing `shutdown` can
//! never free the transport mid-transmit; the handle is freed exactly once,
//! when its last reference drops.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::cid_set::CommandIdSet;
use crate::dispatch::{CommandDispatch, Controller};
use crate::error::{FabricqError, Result};
use crate::protocol::{CommandCapsule, Completion, CompletionStatus, ResponseCapsule};
use crate::transfer::TransferJob;
use crate::transport::{
    QueueEvents, QueueParams, TransportError, TransportFactory, TransportQueue,
};

const LOCK_MSG: &str = "queue pair lock poisoned";

/// State guarded by the queue-pair mutex.
struct Inner {
    /// Transport handle slot. `None` once shutdown has begun; transmit
    /// paths pin the handle by cloning the `Arc` out of here.
    handle: Option<Arc<dyn TransportQueue>>,
    /// Shadow of the peer's submission-queue head (flow control only).
    sq_head: u16,
    /// Shadow of the peer's submission-queue tail (flow control only).
    sq_tail: u16,
    /// Deferred data-transfer jobs awaiting the draining task.
    transfers: VecDeque<Box<dyn TransferJob>>,
    /// Whether a draining task is scheduled or running.
    draining: bool,
}

/// Event counters, updated lock-free.
#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    responses: AtomicU64,
    transfers_executed: AtomicU64,
    transfers_aborted: AtomicU64,
}

/// Snapshot of a queue pair's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePairStats {
    /// Commands admitted past duplicate detection.
    pub commands_admitted: u64,
    /// Completions sent through `send_response`.
    pub responses_sent: u64,
    /// Deferred transfers executed to completion.
    pub transfers_executed: u64,
    /// Deferred transfers aborted (shutdown or late enqueue).
    pub transfers_aborted: u64,
}

/// A controller-side command queue pair.
///
/// Created by connection-management code when the transport hands off a new
/// connection's parameters, initially unassociated. The connect handshake
/// (see [`finish_accept`](QueuePair::finish_accept)) associates it with its
/// owning controller; ordinary command traffic is routed only after that.
pub struct QueuePair {
    id: u16,
    is_admin: bool,
    name: String,
    queue_size: u16,
    flow_control: bool,
    inner: Mutex<Inner>,
    cids: CommandIdSet,
    /// Weak back-reference to the owning controller; set exactly once by
    /// the handshake, never used to keep the controller alive.
    controller: OnceLock<Weak<dyn Controller>>,
    dispatch: Arc<dyn CommandDispatch>,
    counters: Counters,
    self_ref: Weak<QueuePair>,
}

impl QueuePair {
    /// Create a queue pair and allocate its transport handle.
    ///
    /// The queue pair is wired into the transport as the receive/error
    /// event sink. If the transport cannot allocate the handle the error is
    /// returned and nothing leaks; the queue pair is simply dropped.
    pub fn create(
        factory: &dyn TransportFactory,
        params: QueueParams,
        dispatch: Arc<dyn CommandDispatch>,
    ) -> Result<Arc<Self>> {
        params.validate()?;

        let qp = Arc::new_cyclic(|self_ref| QueuePair {
            id: params.queue_id,
            is_admin: params.is_admin,
            name: params.name.clone(),
            queue_size: params.queue_size,
            flow_control: params.flow_control,
            inner: Mutex::new(Inner {
                handle: None,
                sq_head: params.sq_head,
                sq_tail: params.sq_tail,
                transfers: VecDeque::new(),
                draining: false,
            }),
            cids: CommandIdSet::new(),
            controller: OnceLock::new(),
            dispatch,
            counters: Counters::default(),
            self_ref: self_ref.clone(),
        });

        let events: Weak<dyn QueueEvents> = qp.self_ref.clone();
        let handle = factory
            .allocate_queue(&params, events)
            .map_err(FabricqError::HandleAllocation)?;
        qp.inner.lock().expect(LOCK_MSG).handle = Some(handle);

        tracing::debug!(queue = %qp.name, admin = qp.is_admin, "queue pair created");
        Ok(qp)
    }

    // ── Identity accessors ──────────────────────────────────────────────

    /// Queue identifier, unique within the connection.
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Whether this is the admin queue.
    #[inline]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Diagnostic label.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Negotiated submission-queue size.
    #[inline]
    pub fn queue_size(&self) -> u16 {
        self.queue_size
    }

    /// Whether submission-queue flow control was negotiated.
    #[inline]
    pub fn flow_control_enabled(&self) -> bool {
        self.flow_control
    }

    /// Current submission-queue head shadow.
    pub fn sq_head(&self) -> u16 {
        self.inner.lock().expect(LOCK_MSG).sq_head
    }

    /// Submission-queue tail shadow as reported by the peer.
    pub fn sq_tail(&self) -> u16 {
        self.inner.lock().expect(LOCK_MSG).sq_tail
    }

    /// Whether the connect handshake has associated this queue pair with a
    /// controller.
    pub fn is_associated(&self) -> bool {
        self.controller.get().is_some()
    }

    /// The owning controller, if associated and still alive.
    pub fn controller(&self) -> Option<Arc<dyn Controller>> {
        self.controller.get().and_then(Weak::upgrade)
    }

    /// Whether the transport handle is still present (shutdown not begun).
    pub fn is_connected(&self) -> bool {
        self.inner.lock().expect(LOCK_MSG).handle.is_some()
    }

    /// Snapshot of the event counters.
    pub fn stats(&self) -> QueuePairStats {
        QueuePairStats {
            commands_admitted: self.counters.admitted.load(Ordering::Relaxed),
            responses_sent: self.counters.responses.load(Ordering::Relaxed),
            transfers_executed: self.counters.transfers_executed.load(Ordering::Relaxed),
            transfers_aborted: self.counters.transfers_aborted.load(Ordering::Relaxed),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Tear down the queue pair.
    ///
    /// Takes the transport handle out of its slot (subsequent transmit
    /// attempts fail with [`FabricqError::NotConnected`]) and aborts every
    /// transfer still queued. The draining task finishes any job already in
    /// progress and picks up nothing new. Idempotent: a second call finds
    /// nothing left to release or abort.
    pub fn shutdown(&self) {
        let (handle, drained) = {
            let mut inner = self.inner.lock().expect(LOCK_MSG);
            (inner.handle.take(), std::mem::take(&mut inner.transfers))
        };

        if handle.is_some() {
            tracing::debug!(queue = %self.name, pending_transfers = drained.len(), "queue pair shutdown");
        }
        // Long-lived slot reference released here; the transport is freed
        // once the last pinned reference drops.
        drop(handle);

        for job in drained {
            job.abort();
            self.counters.transfers_aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pin the transport handle for a transmit.
    ///
    /// Clones the `Arc` out of the slot under the lock; the clone keeps the
    /// handle alive for the duration of the call even if `shutdown` races
    /// in, and releases on every exit path when it drops.
    pub(crate) fn pinned_handle(&self) -> Result<Arc<dyn TransportQueue>> {
        self.inner
            .lock()
            .expect(LOCK_MSG)
            .handle
            .clone()
            .ok_or(FabricqError::NotConnected)
    }

    // ── Response emission ───────────────────────────────────────────────

    /// Send a completion for an admitted command.
    ///
    /// Retires the completion's command identifier (which must be
    /// outstanding) and transmits. Transmit failures are surfaced, not
    /// retried.
    pub fn send_response(&self, completion: Completion) -> Result<()> {
        self.cids.retire(completion.cid);
        self.transmit_completion(completion)?;
        self.counters.responses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Send a generic success completion for `cid`.
    pub fn send_success(&self, cid: u16) -> Result<()> {
        self.send_response(Completion::success(cid))
    }

    /// Send an error completion for `cid` with the given status.
    pub fn send_error(&self, cid: u16, status: CompletionStatus) -> Result<()> {
        self.send_response(Completion::error(cid, status))
    }

    /// Retire a command identifier without sending a completion.
    ///
    /// For commands whose identifier must be retired through internal
    /// bookkeeping rather than a peer-visible response.
    ///
    /// # Panics
    ///
    /// Panics if `cid` is not outstanding; completing a command twice is a
    /// bug in the interpretation layer.
    pub fn mark_completed(&self, cid: u16) {
        self.cids.retire(cid);
    }

    /// Transmit a completion, stamping the flow-control head.
    ///
    /// The head advances and is stamped under the same lock acquisition
    /// that pins the handle, so concurrent senders each transmit the head
    /// value current at their own transmission point.
    fn transmit_completion(&self, mut completion: Completion) -> Result<()> {
        let handle = {
            let mut inner = self.inner.lock().expect(LOCK_MSG);
            let handle = inner.handle.clone().ok_or(FabricqError::NotConnected)?;
            if self.flow_control {
                inner.sq_head = (inner.sq_head + 1) % self.queue_size;
                completion.sq_head = inner.sq_head;
            }
            handle
        };
        handle
            .transmit(&ResponseCapsule::Completion(completion))
            .map_err(FabricqError::Transmit)
    }

    /// Pre-admission rejection path.
    ///
    /// Transmits an error completion without touching the command-identifier
    /// set: the identifier was never admitted (or cannot be trusted at all).
    fn reject(&self, cid: u16, status: CompletionStatus) {
        if let Err(error) = self.transmit_completion(Completion::error(cid, status)) {
            tracing::debug!(queue = %self.name, cid, %error, "dropped rejection response");
        }
    }

    // ── Deferred transfers ──────────────────────────────────────────────

    /// Queue a data-transfer job for FIFO execution on the draining task.
    ///
    /// If shutdown has already cleared the transport handle the job is
    /// aborted immediately instead of queued. The draining task is
    /// scheduled only on the empty-to-non-empty transition; enqueues while
    /// it is already scheduled or running never schedule a second one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue_transfer(&self, job: Box<dyn TransferJob>) {
        let schedule = {
            let mut inner = self.inner.lock().expect(LOCK_MSG);
            if inner.handle.is_none() {
                drop(inner);
                job.abort();
                self.counters.transfers_aborted.fetch_add(1, Ordering::Relaxed);
                return;
            }
            inner.transfers.push_back(job);
            if inner.draining {
                false
            } else {
                inner.draining = true;
                true
            }
        };

        if schedule {
            if let Some(qp) = self.self_ref.upgrade() {
                tokio::spawn(async move { qp.drain_transfers().await });
            }
        }
    }

    /// Draining task body: pop and run jobs until the queue is empty.
    ///
    /// Single-flight per queue pair, so execution is FIFO and
    /// non-overlapping. A job popped after shutdown raced in is aborted
    /// instead of executed. The lock is never held across execute or abort.
    async fn drain_transfers(self: Arc<Self>) {
        loop {
            let (job, connected) = {
                let mut inner = self.inner.lock().expect(LOCK_MSG);
                match inner.transfers.pop_front() {
                    Some(job) => (job, inner.handle.is_some()),
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };
            if connected {
                job.execute().await;
                self.counters.transfers_executed.fetch_add(1, Ordering::Relaxed);
            } else {
                job.abort();
                self.counters.transfers_aborted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    // ── Association (used by the connect handshake) ─────────────────────

    /// Record the owning controller. Handshake-internal.
    ///
    /// # Panics
    ///
    /// Panics if the queue pair is already associated; association happens
    /// exactly once.
    pub(crate) fn associate(&self, controller: Weak<dyn Controller>) {
        assert!(
            self.controller.set(controller).is_ok(),
            "queue pair {} already associated",
            self.name
        );
    }
}

impl Drop for QueuePair {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for QueuePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePair")
            .field("id", &self.id)
            .field("is_admin", &self.is_admin)
            .field("name", &self.name)
            .field("queue_size", &self.queue_size)
            .field("flow_control", &self.flow_control)
            .field("associated", &self.is_associated())
            .finish()
    }
}

/// Some peer implementations reset the connection immediately after a clean
/// shutdown signal; report that reset as a normal disconnect. Nothing else
/// is remapped.
fn normalize_peer_reset(error: TransportError) -> TransportError {
    match error {
        TransportError::ConnectionReset => TransportError::Closed,
        other => other,
    }
}

impl QueueEvents for QueuePair {
    fn capsule_received(&self, capsule: CommandCapsule) {
        // Connect is the one command valid on an unassociated queue pair.
        if !self.is_associated() && !capsule.is_connect() {
            tracing::warn!(queue = %self.name, cid = capsule.cid(), opcode = capsule.opcode(),
                "command received before association");
            self.reject(capsule.cid(), CompletionStatus::sequence_error());
            return;
        }

        // Structural validation is external; a failed capsule's identifier
        // field cannot be trusted, so no admission bookkeeping happens.
        let verdict = self.dispatch.validate(&capsule);
        if !verdict.is_success() {
            self.reject(capsule.cid(), verdict);
            return;
        }

        if !self.cids.try_admit(capsule.cid()) {
            tracing::warn!(queue = %self.name, cid = capsule.cid(), "duplicate command identifier");
            self.reject(capsule.cid(), CompletionStatus::command_id_conflict());
            return;
        }
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);

        let Some(qp) = self.self_ref.upgrade() else {
            return;
        };
        if self.is_admin {
            self.dispatch.admin_command(qp, capsule);
        } else {
            self.dispatch.io_command(qp, capsule);
        }
    }

    fn transport_failed(&self, error: TransportError) {
        let error = normalize_peer_reset(error);
        match self.controller() {
            Some(controller) => controller.transport_failed(self, error),
            None => {
                tracing::debug!(queue = %self.name, %error,
                    "transport error on unassociated queue pair");
            }
        }
    }
}
