//! Debounced background reconciliation.
//!
//! Partitions and coloring are kept live synchronously on every edit. The heavier structure
//! extraction (macros, includes, bindings, diagnostics) runs here, after the user stops typing
//! for [`EditorConfig::reconcile_delay`](crate::EditorConfig::reconcile_delay).
//!
//! The pieces:
//!
//! - [`ReconcileScheduler`] is the debounce state machine (`Idle` → `Pending` → `Reconciling`).
//!   It takes the current time as an argument and never sleeps, so it can be driven by a real
//!   clock or a fake one.
//! - `SharedState` holds the committed [`PartitionSnapshot`] and [`TemplateStructure`] behind
//!   `ArcSwap`s and runs passes. A pass publishes only if the snapshot it read is still the
//!   current one; otherwise the result is dropped.
//! - `BackgroundReconciler` owns the `ftl-reconciler` thread. The debounce timer is the
//!   deadline of a `crossbeam-channel` receive.

use crate::delta::{DamageRegion, union_range};
use crate::partition::{Partition, PartitionSnapshot};
use crate::structure::{ReconcilingStrategy, TemplateStructure};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Published after a reconcile pass commits a new structure.
#[derive(Debug, Clone)]
pub struct ReconcileEvent {
    /// Document version the pass ran against.
    pub version: u64,
    /// Range touched by the edits this pass covers, in that version's coordinates.
    pub changed_range: Range<usize>,
    /// The partition list the pass ran against.
    pub new_partitions: Arc<[Partition]>,
    /// The freshly derived structure.
    pub structure: Arc<TemplateStructure>,
}

/// Callback invoked for each [`ReconcileEvent`].
pub type ReconcileListener = Box<dyn FnMut(&ReconcileEvent) + Send>;

/// How a reconcile pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The result was committed and listeners were notified.
    Published,
    /// The document changed while the pass ran; the result was dropped.
    Discarded,
}

/// Counters describing reconciler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    /// Passes started.
    pub passes: u64,
    /// Passes whose result was committed.
    pub published: u64,
    /// Passes whose result was dropped as stale.
    pub discarded: u64,
}

/// Debounce phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// Nothing to do.
    Idle,
    /// A pass is due at `deadline` unless another edit arrives first.
    Pending {
        /// When the timer fires.
        deadline: Instant,
    },
    /// A pass is running.
    Reconciling,
}

/// Debounce and single-flight bookkeeping for reconcile passes.
///
/// ```rust
/// use ftl_editor_core::reconciler::{PassOutcome, ReconcileScheduler};
/// use ftl_editor_core::DamageRegion;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let mut scheduler = ReconcileScheduler::new(Duration::from_millis(300));
/// scheduler.on_edit(start, &DamageRegion::new(0, 0, 1), 0..1);
/// assert_eq!(scheduler.poll(start + Duration::from_millis(100)), None);
/// assert_eq!(scheduler.poll(start + Duration::from_millis(300)), Some(0..1));
/// scheduler.finish(PassOutcome::Published);
/// assert!(scheduler.is_idle());
/// ```
#[derive(Debug, Clone)]
pub struct ReconcileScheduler {
    delay: Duration,
    phase: ReconcilePhase,
    changed: Option<Range<usize>>,
    in_flight: Option<Range<usize>>,
}

impl ReconcileScheduler {
    /// Create an idle scheduler with the given quiescence delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            phase: ReconcilePhase::Idle,
            changed: None,
            in_flight: None,
        }
    }

    /// Quiescence delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Current phase.
    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    /// `true` when no pass is pending or running.
    pub fn is_idle(&self) -> bool {
        self.phase == ReconcilePhase::Idle && self.in_flight.is_none()
    }

    /// When the armed timer fires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            ReconcilePhase::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Range accumulated for the next pass.
    pub fn pending_range(&self) -> Option<Range<usize>> {
        self.changed.clone()
    }

    /// Record an edit at `now`.
    ///
    /// `region` is the post-edit range the edit damaged. Ranges recorded earlier are mapped
    /// through `damage` before being merged with it. The timer is (re)armed to `now + delay`.
    pub fn on_edit(&mut self, now: Instant, damage: &DamageRegion, region: Range<usize>) {
        self.changed = Some(match self.changed.take() {
            Some(previous) => union_range(damage.map_range(previous), region),
            None => region,
        });
        if let Some(flight) = self.in_flight.as_mut() {
            *flight = damage.map_range(flight.clone());
        }

        match self.phase {
            ReconcilePhase::Idle => debug!("reconcile timer armed"),
            ReconcilePhase::Pending { .. } => debug!("reconcile timer reset"),
            ReconcilePhase::Reconciling => {
                debug!("edit arrived during reconcile pass; its result will be discarded")
            }
        }
        self.phase = ReconcilePhase::Pending {
            deadline: now + self.delay,
        };
    }

    /// Start a pass if the timer has fired and no pass is running.
    ///
    /// Returns the changed range the pass should cover.
    pub fn poll(&mut self, now: Instant) -> Option<Range<usize>> {
        match self.phase {
            ReconcilePhase::Pending { deadline } if now >= deadline && self.in_flight.is_none() => {
                let changed = self.changed.take().unwrap_or(0..0);
                debug!(
                    start = changed.start,
                    end = changed.end,
                    "reconcile pass started"
                );
                self.in_flight = Some(changed.clone());
                self.phase = ReconcilePhase::Reconciling;
                Some(changed)
            }
            _ => None,
        }
    }

    /// Mark the running pass as finished.
    ///
    /// A discarded pass hands its range back so the next pass still covers it.
    pub fn finish(&mut self, outcome: PassOutcome) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        if outcome == PassOutcome::Discarded {
            self.changed = Some(match self.changed.take() {
                Some(changed) => union_range(changed, flight),
                None => flight,
            });
        }
        if self.phase == ReconcilePhase::Reconciling {
            self.phase = ReconcilePhase::Idle;
        }
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    passes: AtomicU64,
    published: AtomicU64,
    discarded: AtomicU64,
}

/// State shared by the editor thread and the reconciler thread.
pub(crate) struct SharedState {
    snapshot: ArcSwap<PartitionSnapshot>,
    structure: ArcSwap<TemplateStructure>,
    /// Makes "compare version, then store structure" atomic against `commit`.
    publish_lock: Mutex<()>,
    /// Held for the whole pass; at most one pass runs at a time.
    strategy: Mutex<Box<dyn ReconcilingStrategy>>,
    listeners: Mutex<Vec<ReconcileListener>>,
    stats: StatsCounters,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("version", &self.snapshot.load().version)
            .field("structure_version", &self.structure.load().version)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl SharedState {
    pub(crate) fn new(snapshot: PartitionSnapshot, strategy: Box<dyn ReconcilingStrategy>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            structure: ArcSwap::from_pointee(TemplateStructure::default()),
            publish_lock: Mutex::new(()),
            strategy: Mutex::new(strategy),
            listeners: Mutex::new(Vec::new()),
            stats: StatsCounters::default(),
        }
    }

    /// Latest committed partition snapshot.
    pub(crate) fn snapshot(&self) -> Arc<PartitionSnapshot> {
        self.snapshot.load_full()
    }

    /// Latest published structure.
    pub(crate) fn structure(&self) -> Arc<TemplateStructure> {
        self.structure.load_full()
    }

    /// Swap in a new snapshot. Any pass still working on an older one will not publish.
    pub(crate) fn commit(&self, snapshot: PartitionSnapshot) {
        let _guard = self.publish_lock.lock();
        self.snapshot.store(Arc::new(snapshot));
    }

    pub(crate) fn subscribe(&self, listener: ReconcileListener) {
        self.listeners.lock().push(listener);
    }

    pub(crate) fn stats(&self) -> ReconcilerStats {
        ReconcilerStats {
            passes: self.stats.passes.load(Ordering::Relaxed),
            published: self.stats.published.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
        }
    }

    /// Run one reconcile pass against the current snapshot.
    pub(crate) fn run_pass(&self, changed: Range<usize>) -> PassOutcome {
        let mut strategy = self.strategy.lock();
        let snapshot = self.snapshot.load_full();
        self.stats.passes.fetch_add(1, Ordering::Relaxed);

        let structure = Arc::new(strategy.reconcile(&snapshot));
        drop(strategy);

        {
            let _guard = self.publish_lock.lock();
            let current = self.snapshot.load().version;
            if current != snapshot.version {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    pass_version = snapshot.version,
                    current_version = current,
                    "reconcile result discarded as stale"
                );
                return PassOutcome::Discarded;
            }
            self.structure.store(Arc::clone(&structure));
        }
        self.stats.published.fetch_add(1, Ordering::Relaxed);

        let len = snapshot.text.len_chars();
        let event = ReconcileEvent {
            version: snapshot.version,
            changed_range: changed.start.min(len)..changed.end.min(len),
            new_partitions: Arc::clone(&snapshot.partitions),
            structure,
        };
        debug!(
            version = event.version,
            start = event.changed_range.start,
            end = event.changed_range.end,
            macros = event.structure.macros.len(),
            diagnostics = event.structure.diagnostics.len(),
            "reconcile result published"
        );
        for listener in self.listeners.lock().iter_mut() {
            listener(&event);
        }
        PassOutcome::Published
    }
}

#[derive(Debug)]
enum ReconcileRequest {
    Edit {
        damage: DamageRegion,
        region: Range<usize>,
    },
    Shutdown,
}

/// Handle to the `ftl-reconciler` thread. Dropping it stops the thread.
#[derive(Debug)]
pub(crate) struct BackgroundReconciler {
    sender: Sender<ReconcileRequest>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundReconciler {
    pub(crate) fn spawn(shared: Arc<SharedState>, delay: Duration) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("ftl-reconciler".to_string())
            .spawn(move || reconcile_loop(&shared, &receiver, delay))?;
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Tell the thread about an applied edit.
    pub(crate) fn notify_edit(&self, damage: DamageRegion, region: Range<usize>) {
        if self
            .sender
            .send(ReconcileRequest::Edit { damage, region })
            .is_err()
        {
            warn!("reconciler thread is gone; edit will not be reconciled in the background");
        }
    }
}

impl Drop for BackgroundReconciler {
    fn drop(&mut self) {
        let _ = self.sender.send(ReconcileRequest::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("reconciler thread panicked");
        }
    }
}

fn reconcile_loop(shared: &SharedState, receiver: &Receiver<ReconcileRequest>, delay: Duration) {
    let mut scheduler = ReconcileScheduler::new(delay);
    loop {
        let request = match scheduler.deadline() {
            Some(deadline) => match receiver.recv_deadline(deadline) {
                Ok(request) => Some(request),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match receiver.recv() {
                Ok(request) => Some(request),
                Err(_) => break,
            },
        };

        match request {
            Some(ReconcileRequest::Edit { damage, region }) => {
                scheduler.on_edit(Instant::now(), &damage, region);
            }
            Some(ReconcileRequest::Shutdown) => break,
            None => {}
        }

        if let Some(changed) = scheduler.poll(Instant::now()) {
            let outcome = shared.run_pass(changed);
            scheduler.finish(outcome);
        }
    }
    debug!("reconciler thread stopped");
}
