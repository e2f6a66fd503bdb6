//! # Dispatch Loop Properties
//!
//! Behavioural guarantees of the processor against recording mocks:
//!
//! 1. Unbound processors are pure no-ops
//! 2. Queue order is dispatch order, once per item, within one tick
//! 3. Rebinding moves the respond subscription
//! 4. Responses are forwarded exactly once with the same identity
//! 5. Re-initializing with the same pair keeps a single subscription
//! 6. Concurrent ticks, responses and rebinds stay consistent, including
//!    unbinding a background unit manager while it is responding
//!
//! Run with: cargo test -p servo_core --test dispatch_properties

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use servo_core::{
    DispatchProcessor, ExecutionMode, ItemId, ItemManager, ItemStatus, ProcessorConfig,
    ProcessorState, QueueItemManager, RegistryUnitManager, RespondEvent, ServoItem, ServoResult,
    UnboundLogPolicy, UnitManager,
};

// ============================================================================
// FIXTURES
// ============================================================================

#[derive(Clone, Debug)]
struct Task {
    id: ItemId,
    kind: &'static str,
    status: ItemStatus,
    payload: Vec<u8>,
}

impl Task {
    fn new(raw: u64) -> Self {
        Self {
            id: ItemId::new(raw),
            kind: "task",
            status: ItemStatus::Pending,
            payload: raw.to_le_bytes().to_vec(),
        }
    }
}

impl ServoItem for Task {
    fn id(&self) -> ItemId {
        self.id
    }
    fn kind(&self) -> &str {
        self.kind
    }
    fn status(&self) -> &ItemStatus {
        &self.status
    }
    fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }
}

/// Item manager that records every call.
#[derive(Default)]
struct RecordingItems {
    pending: Mutex<Vec<Task>>,
    dequeue_calls: Mutex<u32>,
    responded: Mutex<Vec<ItemId>>,
}

impl RecordingItems {
    fn with_pending(count: u64) -> Arc<Self> {
        let items = Self::default();
        items.pending.lock().extend((1..=count).map(Task::new));
        Arc::new(items)
    }

    fn responded(&self) -> Vec<u64> {
        self.responded.lock().iter().map(|id| id.raw()).collect()
    }
}

impl ItemManager<Task> for RecordingItems {
    fn dequeue_items(&self, limit: Option<usize>) -> Vec<Task> {
        *self.dequeue_calls.lock() += 1;
        let mut pending = self.pending.lock();
        let count = limit.unwrap_or(usize::MAX).min(pending.len());
        pending.drain(..count).collect()
    }

    fn respond_item(&self, item: Task) {
        self.responded.lock().push(item.id);
    }
}

/// Unit manager that records executions and exposes its respond event.
#[derive(Default)]
struct RecordingUnits {
    executed: Mutex<Vec<ItemId>>,
    respond: RespondEvent<Task>,
}

impl RecordingUnits {
    fn executed(&self) -> Vec<u64> {
        self.executed.lock().iter().map(|id| id.raw()).collect()
    }
}

impl UnitManager<Task> for RecordingUnits {
    fn execute(&self, item: Task) {
        self.executed.lock().push(item.id);
    }

    fn respond_event(&self) -> &RespondEvent<Task> {
        &self.respond
    }
}

fn quiet_config() -> ProcessorConfig {
    ProcessorConfig {
        unbound_log: UnboundLogPolicy::Silent,
        ..ProcessorConfig::default()
    }
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

// ============================================================================
// PROPERTY 1: UNBOUND IS A NO-OP
// ============================================================================

#[test]
fn unbound_tick_and_respond_are_noops() {
    let processor = DispatchProcessor::<Task>::new("unbound", quiet_config());
    processor.tick();
    processor.on_unit_respond(Task::new(1));

    let stats = processor.stats();
    assert_eq!(stats.skipped_ticks, 1);
    assert_eq!(stats.dropped_responses, 1);
    assert_eq!(stats.dispatched, 0);
    assert_eq!(processor.state(), ProcessorState::Unbound);
}

#[test]
fn half_bound_tick_touches_nothing() {
    let items = RecordingItems::with_pending(3);
    let processor = DispatchProcessor::<Task>::new("half", quiet_config());
    processor.set_item_manager(Some(items.clone()));

    processor.tick();
    processor.on_unit_respond(Task::new(1));

    assert_eq!(*items.dequeue_calls.lock(), 0);
    assert!(items.responded().is_empty());
    assert_eq!(items.pending.lock().len(), 3);
}

#[test]
fn cleared_processor_resumes_after_rebind() {
    let items = RecordingItems::with_pending(2);
    let units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::<Task>::new("resume", quiet_config());

    processor.initialize(items.clone(), units.clone());
    processor.clear();
    processor.tick();
    assert!(units.executed().is_empty());

    processor.initialize(items.clone(), units.clone());
    processor.tick();
    assert_eq!(units.executed(), vec![1, 2]);
}

// ============================================================================
// PROPERTY 2: QUEUE ORDER PRESERVED
// ============================================================================

#[test]
fn single_tick_executes_in_queue_order_once_each() {
    let config = ProcessorConfig {
        unbounded_drain: true,
        ..quiet_config()
    };
    let items = RecordingItems::with_pending(100);
    let units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::new("order", config);
    processor.initialize(items.clone(), units.clone());

    processor.tick();

    assert_eq!(units.executed(), (1..=100).collect::<Vec<_>>());
    assert_eq!(*items.dequeue_calls.lock(), 1);
    assert_eq!(processor.stats().dispatched, 100);
}

#[test]
fn capped_ticks_continue_in_order() {
    let config = ProcessorConfig {
        max_items_per_tick: 4,
        ..quiet_config()
    };
    let items = RecordingItems::with_pending(10);
    let units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::new("capped", config);
    processor.initialize(items.clone(), units.clone());

    processor.tick();
    assert_eq!(units.executed(), vec![1, 2, 3, 4]);
    processor.tick();
    processor.tick();
    processor.tick();

    assert_eq!(units.executed(), (1..=10).collect::<Vec<_>>());
}

#[test]
fn empty_queue_ends_tick() {
    let items = RecordingItems::with_pending(0);
    let units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::new("empty", quiet_config());
    processor.initialize(items.clone(), units.clone());

    processor.tick();

    assert_eq!(*items.dequeue_calls.lock(), 1);
    assert!(units.executed().is_empty());
    assert_eq!(processor.stats().ticks, 1);
}

// ============================================================================
// PROPERTY 3: REBINDING UNSUBSCRIBES
// ============================================================================

#[test]
fn rebinding_unit_manager_moves_subscription() {
    let items = RecordingItems::with_pending(0);
    let old_units = Arc::new(RecordingUnits::default());
    let new_units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::new("rebind", quiet_config());

    processor.initialize(items.clone(), old_units.clone());
    processor.set_unit_manager(Some(new_units.clone()));

    assert_eq!(old_units.respond.listener_count(), 0);
    assert_eq!(new_units.respond.listener_count(), 1);

    old_units.respond.fire(Task::new(1));
    assert!(items.responded().is_empty());

    new_units.respond.fire(Task::new(2));
    assert_eq!(items.responded(), vec![2]);
}

#[test]
fn initialize_with_new_pair_unsubscribes_old() {
    let items = RecordingItems::with_pending(0);
    let old_units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::new("reinit", quiet_config());
    processor.initialize(items.clone(), old_units.clone());

    let other_items = RecordingItems::with_pending(0);
    processor.initialize(other_items.clone(), Arc::new(RecordingUnits::default()));

    old_units.respond.fire(Task::new(9));
    assert!(items.responded().is_empty());
    assert!(other_items.responded().is_empty());
}

// ============================================================================
// PROPERTY 4: RESPOND FORWARDING
// ============================================================================

#[test]
fn responses_forwarded_once_with_same_identity() {
    let items = RecordingItems::with_pending(0);
    let units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::new("forward", quiet_config());
    processor.initialize(items.clone(), units.clone());

    for raw in [5, 3, 8] {
        units.respond.fire(Task::new(raw));
    }

    assert_eq!(items.responded(), vec![5, 3, 8]);
    assert_eq!(processor.stats().responded, 3);
}

#[test]
fn full_loop_with_reference_managers() {
    let items = Arc::new(QueueItemManager::new(64));
    let units = Arc::new(RegistryUnitManager::inline());
    units.register(
        "task",
        Arc::new(|task: &mut Task| -> ServoResult<()> {
            task.payload.reverse();
            Ok(())
        }),
    );
    let processor = DispatchProcessor::new("loop", quiet_config());
    processor.initialize(items.clone(), units.clone());

    for raw in 1..=3 {
        items.enqueue(Task::new(raw)).unwrap();
    }
    processor.tick();

    let completed = items.drain_completed();
    let ids: Vec<u64> = completed.iter().map(|t| t.id.raw()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(completed.iter().all(|t| t.status == ItemStatus::Succeeded));
    assert_eq!(completed[0].payload[7], 1);
    assert_eq!(items.in_flight_count(), 0);
}

// ============================================================================
// PROPERTY 5: IDEMPOTENT REBINDING
// ============================================================================

#[test]
fn initialize_twice_same_pair_single_subscription() {
    let items = RecordingItems::with_pending(0);
    let units = Arc::new(RecordingUnits::default());
    let processor = DispatchProcessor::new("idem", quiet_config());

    processor.initialize(items.clone(), units.clone());
    processor.initialize(items.clone(), units.clone());

    assert_eq!(units.respond.listener_count(), 1);
    units.respond.fire(Task::new(1));
    assert_eq!(items.responded(), vec![1]);
}

// ============================================================================
// PROPERTY 6: CONCURRENT TICK / RESPOND
// ============================================================================

#[test]
fn background_units_respond_every_item_exactly_once() {
    let items = Arc::new(QueueItemManager::new(4096));
    let units = Arc::new(RegistryUnitManager::new(ExecutionMode::Background { workers: 4 }).unwrap());
    units.register("task", Arc::new(|_: &mut Task| -> ServoResult<()> { Ok(()) }));

    let config = ProcessorConfig {
        max_items_per_tick: 32,
        ..quiet_config()
    };
    let processor = DispatchProcessor::new("concurrent", config);
    processor.initialize(items.clone(), units.clone());

    for raw in 1..=1000 {
        items.enqueue(Task::new(raw)).unwrap();
    }

    let drained = wait_until(Duration::from_secs(10), || {
        processor.tick();
        items.pending_count() == 0 && items.in_flight_count() == 0
    });
    assert!(drained, "loop did not drain");

    let mut ids: Vec<u64> = items.drain_completed().iter().map(|t| t.id.raw()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=1000).collect::<Vec<_>>());
    assert_eq!(items.stats().unknown_responses, 0);
    assert_eq!(processor.stats().responded, 1000);
}

#[test]
fn concurrent_responses_ticks_and_rebinds_stay_consistent() {
    let items = RecordingItems::with_pending(0);
    let units_a = Arc::new(RecordingUnits::default());
    let units_b = Arc::new(RecordingUnits::default());
    let processor = Arc::new(DispatchProcessor::new("race", quiet_config()));
    processor.initialize(items.clone(), units_a.clone());

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    for worker in 0..4u64 {
        let processor = Arc::clone(&processor);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut sent = 0u64;
            while !stop.load(Ordering::Relaxed) {
                processor.on_unit_respond(Task::new(worker * 1_000_000 + sent));
                sent += 1;
            }
            sent
        }));
    }

    {
        let processor = Arc::clone(&processor);
        let stop = Arc::clone(&stop);
        let (units_a, units_b) = (units_a.clone(), units_b.clone());
        let items = items.clone();
        handles.push(thread::spawn(move || {
            let mut flip = false;
            while !stop.load(Ordering::Relaxed) {
                let units: Arc<dyn UnitManager<Task>> =
                    if flip { units_a.clone() } else { units_b.clone() };
                processor.initialize(items.clone(), units);
                processor.tick();
                flip = !flip;
            }
            0
        }));
    }

    thread::sleep(Duration::from_millis(200));
    stop.store(true, Ordering::Relaxed);
    let sent: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(processor.state(), ProcessorState::Bound);
    assert_eq!(items.responded.lock().len() as u64, sent);
    assert_eq!(
        units_a.respond.listener_count() + units_b.respond.listener_count(),
        1
    );
}

// ============================================================================
// PROPERTY 6b: UNBINDING WHILE A BACKGROUND RESPONSE IS IN PROGRESS
// ============================================================================

/// Background unit manager with one worker, a slow listener ahead of the
/// processor's forwarder, and one item already in flight.
///
/// The processor holds the only handle to the unit manager.
fn processor_with_response_in_progress() -> (
    Arc<QueueItemManager<Task>>,
    DispatchProcessor<Task>,
    Arc<Mutex<Vec<ItemId>>>,
) {
    let items = Arc::new(QueueItemManager::<Task>::default());
    let units = Arc::new(RegistryUnitManager::new(ExecutionMode::Background { workers: 1 }).unwrap());
    units.register("task", Arc::new(|_: &mut Task| -> ServoResult<()> { Ok(()) }));

    let slow_seen = Arc::new(Mutex::new(Vec::new()));
    let started = Arc::new(AtomicBool::new(false));
    let sink = Arc::clone(&slow_seen);
    let entered = Arc::clone(&started);
    units.respond_event().add_listener(Arc::new(move |task: Task| {
        entered.store(true, Ordering::Release);
        thread::sleep(Duration::from_millis(150));
        sink.lock().push(task.id);
    }));

    let processor = DispatchProcessor::new("unbind-race", quiet_config());
    processor.initialize(items.clone(), units);

    items.enqueue(Task::new(1)).unwrap();
    processor.tick();
    assert!(wait_until(Duration::from_secs(5), || started.load(Ordering::Acquire)));
    (items, processor, slow_seen)
}

#[test]
fn unbinding_sole_owned_background_manager_mid_response_returns() {
    let (items, processor, slow_seen) = processor_with_response_in_progress();
    let processor = Arc::new(processor);

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    {
        let processor = Arc::clone(&processor);
        thread::spawn(move || {
            processor.set_unit_manager(None);
            done_tx.send(()).ok();
        });
    }

    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "set_unit_manager(None) did not return"
    );
    assert_eq!(*slow_seen.lock(), vec![ItemId::new(1)]);
    // The response belongs to the previous binding.
    assert_eq!(processor.stats().dropped_responses, 1);
    assert_eq!(processor.stats().responded, 0);
    assert!(items.is_in_flight(ItemId::new(1)));
    assert_eq!(processor.state(), ProcessorState::Unbound);
}

#[test]
fn dropping_processor_mid_response_returns() {
    let (_items, processor, slow_seen) = processor_with_response_in_progress();

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        drop(processor);
        done_tx.send(()).ok();
    });

    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "dropping the processor did not return"
    );
    assert_eq!(*slow_seen.lock(), vec![ItemId::new(1)]);
}

#[test]
fn clearing_mid_response_then_rebinding_resumes() {
    let (items, processor, _slow_seen) = processor_with_response_in_progress();

    processor.clear();

    let units = Arc::new(RegistryUnitManager::<Task>::inline());
    units.register("task", Arc::new(|_: &mut Task| -> ServoResult<()> { Ok(()) }));
    processor.initialize(items.clone(), units);
    items.enqueue(Task::new(2)).unwrap();
    processor.tick();

    let done: Vec<u64> = items.drain_completed().iter().map(|t| t.id.raw()).collect();
    assert_eq!(done, vec![2]);
    assert_eq!(processor.stats().responded, 1);
}

#[test]
fn panicking_unit_leaves_nothing_in_flight() {
    let items = Arc::new(QueueItemManager::<Task>::default());
    let units = Arc::new(RegistryUnitManager::new(ExecutionMode::Background { workers: 1 }).unwrap());
    units.register(
        "task",
        Arc::new(|task: &mut Task| -> ServoResult<()> {
            assert_ne!(task.id.raw(), 1, "unit refuses task #1");
            Ok(())
        }),
    );
    let processor = DispatchProcessor::new("panics", quiet_config());
    processor.initialize(items.clone(), units);

    items.enqueue(Task::new(1)).unwrap();
    processor.tick();
    items.enqueue(Task::new(2)).unwrap();
    processor.tick();

    assert!(wait_until(Duration::from_secs(5), || items.in_flight_count() == 0));
    let mut done = items.drain_completed();
    done.sort_by_key(|t| t.id);
    assert!(matches!(&done[0].status, ItemStatus::Failed(r) if r.contains("refuses")));
    assert_eq!(done[1].status, ItemStatus::Succeeded);
}
