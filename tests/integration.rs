//! Integration tests for fabricq.
//!
//! These tests drive a queue pair end to end through an in-memory transport
//! and a small command-interpretation layer that implements the connect
//! handshake.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

use fabricq::transfer::BoxFuture;
use fabricq::{
    CommandCapsule, CommandDispatch, Completion, CompletionStatus, Controller, QueueEvents,
    QueuePair, QueueParams, ResponseCapsule, TransferJob, TransportError, TransportFactory,
    TransportQueue, CONNECT_OPCODE,
};

// ── In-memory transport ─────────────────────────────────────────────────

struct MemTransport {
    sent: Arc<Mutex<Vec<ResponseCapsule>>>,
    freed: Arc<AtomicU32>,
}

impl TransportQueue for MemTransport {
    fn transmit(&self, capsule: &ResponseCapsule) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(*capsule);
        Ok(())
    }
}

impl Drop for MemTransport {
    fn drop(&mut self) {
        self.freed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MemFactory {
    sent: Arc<Mutex<Vec<ResponseCapsule>>>,
    freed: Arc<AtomicU32>,
}

impl TransportFactory for MemFactory {
    fn allocate_queue(
        &self,
        _params: &QueueParams,
        _events: Weak<dyn QueueEvents>,
    ) -> Result<Arc<dyn TransportQueue>, TransportError> {
        Ok(Arc::new(MemTransport {
            sent: self.sent.clone(),
            freed: self.freed.clone(),
        }))
    }
}

// ── Controller and interpreters ─────────────────────────────────────────

struct TestController {
    id: u16,
    errors: Mutex<Vec<TransportError>>,
}

impl TestController {
    fn new(id: u16) -> Arc<Self> {
        Arc::new(Self {
            id,
            errors: Mutex::new(Vec::new()),
        })
    }
}

impl Controller for TestController {
    fn controller_id(&self) -> u16 {
        self.id
    }

    fn transport_failed(&self, _qp: &QueuePair, error: TransportError) {
        self.errors.lock().unwrap().push(error);
    }
}

/// Interpretation layer: accepts connect commands by finishing the
/// handshake against `controller`, records everything else.
struct TestDispatch {
    controller: Arc<TestController>,
    admin_cids: Mutex<Vec<u16>>,
    io_cids: Mutex<Vec<u16>>,
}

impl TestDispatch {
    fn new(controller: Arc<TestController>) -> Arc<Self> {
        Arc::new(Self {
            controller,
            admin_cids: Mutex::new(Vec::new()),
            io_cids: Mutex::new(Vec::new()),
        })
    }
}

impl CommandDispatch for TestDispatch {
    fn validate(&self, _capsule: &CommandCapsule) -> CompletionStatus {
        CompletionStatus::SUCCESS
    }

    fn admin_command(&self, qp: Arc<QueuePair>, capsule: CommandCapsule) {
        if capsule.is_connect() {
            let controller: Arc<dyn Controller> = self.controller.clone();
            qp.finish_accept(capsule.cid(), &controller).unwrap();
            qp.mark_completed(capsule.cid());
            return;
        }
        self.admin_cids.lock().unwrap().push(capsule.cid());
    }

    fn io_command(&self, qp: Arc<QueuePair>, capsule: CommandCapsule) {
        if capsule.is_connect() {
            let controller: Arc<dyn Controller> = self.controller.clone();
            qp.finish_accept(capsule.cid(), &controller).unwrap();
            qp.mark_completed(capsule.cid());
            return;
        }
        self.io_cids.lock().unwrap().push(capsule.cid());
    }
}

fn build_admin_qp(
    factory: &MemFactory,
    queue_size: u16,
    flow_control: bool,
) -> (Arc<QueuePair>, Arc<TestController>, Arc<TestDispatch>) {
    let controller = TestController::new(3);
    let dispatch = TestDispatch::new(controller.clone());
    let params = QueueParams::admin(queue_size, flow_control);
    let qp = QueuePair::create(factory, params, dispatch.clone()).unwrap();
    (qp, controller, dispatch)
}

fn capsule(cid: u16, opcode: u8) -> CommandCapsule {
    CommandCapsule::new(cid, opcode, Bytes::new())
}

// ── Transfer jobs ───────────────────────────────────────────────────────

struct SeqJob {
    tag: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicBool>,
}

impl TransferJob for SeqJob {
    fn execute(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            assert!(
                !self.active.swap(true, Ordering::SeqCst),
                "transfer jobs must not overlap"
            );
            self.log.lock().unwrap().push(format!("{}:start", self.tag));
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(format!("{}:end", self.tag));
            self.active.store(false, Ordering::SeqCst);
        })
    }

    fn abort(self: Box<Self>) {
        self.log.lock().unwrap().push(format!("{}:abort", self.tag));
    }
}

struct CountingJob {
    executed: Arc<AtomicU32>,
    aborted: Arc<AtomicU32>,
}

impl TransferJob for CountingJob {
    fn execute(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.executed.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn abort(self: Box<Self>) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────

/// Connect on a fresh admin queue pair: the success response echoes the
/// initial head and the controller's identifier, and the queue pair
/// transitions to Associated.
#[test]
fn test_connect_handshake() {
    let factory = MemFactory::default();
    let (qp, _controller, _dispatch) = build_admin_qp(&factory, 32, true);

    assert!(!qp.is_associated());
    qp.capsule_received(capsule(7, CONNECT_OPCODE));
    assert!(qp.is_associated());
    assert_eq!(qp.controller().unwrap().controller_id(), 3);

    let sent = factory.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        ResponseCapsule::Connect(rsp) => {
            assert!(rsp.is_accepted());
            assert_eq!(rsp.cid, 7);
            assert_eq!(rsp.controller_id, 3);
            assert_eq!(rsp.sq_head, 0);
        }
        _ => panic!("expected connect response"),
    }
}

/// A duplicate in-flight command identifier is rejected with a conflict
/// and the original admission is untouched.
#[test]
fn test_duplicate_command_identifier() {
    let factory = MemFactory::default();
    let (qp, _controller, dispatch) = build_admin_qp(&factory, 32, false);
    qp.capsule_received(capsule(1, CONNECT_OPCODE));

    qp.capsule_received(capsule(42, 0x06));
    qp.capsule_received(capsule(42, 0x06));

    assert_eq!(*dispatch.admin_cids.lock().unwrap(), vec![42]);

    let sent = factory.sent.lock().unwrap();
    // Connect response plus exactly one conflict rejection.
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].status(), CompletionStatus::command_id_conflict());

    drop(sent);
    // The first instance is still outstanding and completes normally.
    qp.send_success(42).unwrap();
}

/// Three responses on a flow-controlled queue: the stored head progresses
/// 0→1→2→3 mod 16 and each completion carries the head at its own
/// transmission point.
#[test]
fn test_flow_control_progression() {
    let factory = MemFactory::default();
    let (qp, _controller, _dispatch) = build_admin_qp(&factory, 16, true);
    qp.capsule_received(capsule(1, CONNECT_OPCODE));

    for cid in [10u16, 11, 12] {
        qp.capsule_received(capsule(cid, 0x06));
    }
    for cid in [10u16, 11, 12] {
        qp.send_response(Completion::success(cid)).unwrap();
    }
    assert_eq!(qp.sq_head(), 3);

    let sent = factory.sent.lock().unwrap();
    let heads: Vec<u16> = sent
        .iter()
        .filter_map(|c| match c {
            ResponseCapsule::Completion(c) => Some(c.sq_head),
            _ => None,
        })
        .collect();
    assert_eq!(heads, vec![1, 2, 3]);
}

/// Two transfers enqueued back to back execute FIFO on a single draining
/// task, with no overlap.
#[tokio::test]
async fn test_transfers_fifo_single_flight() {
    let factory = MemFactory::default();
    let (qp, _controller, _dispatch) = build_admin_qp(&factory, 32, false);

    let log = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicBool::new(false));
    for tag in ["A", "B"] {
        qp.enqueue_transfer(Box::new(SeqJob {
            tag,
            log: log.clone(),
            active: active.clone(),
        }));
    }

    while log.lock().unwrap().len() < 4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        *log.lock().unwrap(),
        vec!["A:start", "A:end", "B:start", "B:end"]
    );
}

/// A transfer enqueued and then shut down before the draining task runs is
/// aborted; its execute path is never invoked.
#[tokio::test]
async fn test_shutdown_aborts_pending_transfer() {
    let factory = MemFactory::default();
    let (qp, _controller, _dispatch) = build_admin_qp(&factory, 32, false);

    let log = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicBool::new(false));
    qp.enqueue_transfer(Box::new(SeqJob {
        tag: "A",
        log: log.clone(),
        active: active.clone(),
    }));
    // The current-thread runtime cannot run the drain task until the next
    // await point, so shutdown reaches the queue first.
    qp.shutdown();
    tokio::task::yield_now().await;

    assert_eq!(*log.lock().unwrap(), vec!["A:abort"]);
}

/// Concurrent enqueue and shutdown: every job either executes or aborts,
/// exactly once, never both, never neither.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_enqueue_race() {
    for _ in 0..50 {
        let factory = MemFactory::default();
        let (qp, _controller, _dispatch) = build_admin_qp(&factory, 32, false);

        let executed = Arc::new(AtomicU32::new(0));
        let aborted = Arc::new(AtomicU32::new(0));

        let enqueuer = {
            let qp = qp.clone();
            let executed = executed.clone();
            let aborted = aborted.clone();
            tokio::spawn(async move {
                qp.enqueue_transfer(Box::new(CountingJob { executed, aborted }));
            })
        };
        let stopper = {
            let qp = qp.clone();
            tokio::spawn(async move {
                qp.shutdown();
            })
        };
        enqueuer.await.unwrap();
        stopper.await.unwrap();

        // Drain any task still finishing up.
        while qp.stats().transfers_executed + qp.stats().transfers_aborted == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            executed.load(Ordering::SeqCst) + aborted.load(Ordering::SeqCst),
            1
        );
    }
}

/// The benign peer-reset-after-close condition is reported upstream as a
/// clean close; any other transport error is forwarded verbatim.
#[test]
fn test_peer_reset_downgraded() {
    let factory = MemFactory::default();
    let (qp, controller, _dispatch) = build_admin_qp(&factory, 32, false);
    qp.capsule_received(capsule(1, CONNECT_OPCODE));

    qp.transport_failed(TransportError::ConnectionReset);
    qp.transport_failed(TransportError::Transmit("io failure".to_string()));

    let errors = controller.errors.lock().unwrap();
    assert_eq!(errors[0], TransportError::Closed);
    assert_eq!(
        errors[1],
        TransportError::Transmit("io failure".to_string())
    );
}

/// Commands arriving before association are rejected to the peer without
/// tearing down the connection.
#[test]
fn test_pre_association_command_rejected() {
    let factory = MemFactory::default();
    let (qp, _controller, dispatch) = build_admin_qp(&factory, 32, false);

    qp.capsule_received(capsule(9, 0x06));

    assert!(dispatch.admin_cids.lock().unwrap().is_empty());
    let sent = factory.sent.lock().unwrap();
    assert_eq!(sent[0].status(), CompletionStatus::sequence_error());
    drop(sent);

    // The connection stays usable: the handshake still goes through.
    qp.capsule_received(capsule(9, CONNECT_OPCODE));
    assert!(qp.is_associated());
}

/// The transport handle is freed exactly once, after shutdown, even when
/// shutdown is called repeatedly.
#[test]
fn test_handle_freed_exactly_once() {
    let factory = MemFactory::default();
    let (qp, _controller, _dispatch) = build_admin_qp(&factory, 32, false);

    assert_eq!(factory.freed.load(Ordering::SeqCst), 0);
    qp.shutdown();
    qp.shutdown();
    assert_eq!(factory.freed.load(Ordering::SeqCst), 1);

    drop(qp);
    assert_eq!(factory.freed.load(Ordering::SeqCst), 1);
}

/// I/O queue pairs route admitted commands to the I/O interpreter with the
/// queue identity available to address the response.
#[test]
fn test_io_queue_routing() {
    let factory = MemFactory::default();
    let controller = TestController::new(3);
    let dispatch = TestDispatch::new(controller.clone());
    let params = QueueParams::io(4, 64, false).name("host-b:io-4");
    let qp = QueuePair::create(&factory, params, dispatch.clone()).unwrap();

    assert_eq!(qp.id(), 4);
    assert!(!qp.is_admin());
    assert_eq!(qp.name(), "host-b:io-4");

    qp.capsule_received(capsule(2, CONNECT_OPCODE));
    qp.capsule_received(capsule(17, 0x02));
    assert_eq!(*dispatch.io_cids.lock().unwrap(), vec![17]);
}
