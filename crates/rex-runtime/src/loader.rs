use std::cmp;
use std::collections::{BinaryHeap, VecDeque};
use std::error::Error;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use rayon::{ThreadPool, ThreadPoolBuilder};
use rex_scene::GpuCompiler;

use crate::engine::{EngineContext, FrameStamp};
use crate::request::{ApplyOutcome, Request};
use crate::state::RequestState;

pub type RequestRef = Arc<dyn Request>;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Lane {
    /// Loads that cannot be canceled (the tiles the terrain needs to exist at all).
    Mandatory,
    Background,
}

#[derive(Clone, Debug)]
pub struct LoaderConfig {
    pub mandatory_workers: usize,
    /// 0 picks from available parallelism.
    pub background_workers: usize,
    /// 0 merges everything that is ready each update.
    pub merges_per_frame: usize,
    pub precompile: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mandatory_workers: 1,
            background_workers: 0,
            merges_per_frame: 0,
            precompile: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub merged: usize,
    pub stale: usize,
    pub tile_expired: usize,
    pub no_data: usize,
    pub discarded: usize,
    pub precompiled: usize,
}

impl UpdateReport {
    /// Requests that went through `apply`.
    pub fn applied(&self) -> usize {
        self.merged + self.stale + self.tile_expired + self.no_data
    }

    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Merged => self.merged += 1,
            ApplyOutcome::Stale => self.stale += 1,
            ApplyOutcome::TileExpired => self.tile_expired += 1,
            ApplyOutcome::NoData => self.no_data += 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub queued_mandatory: usize,
    pub inflight_mandatory: usize,
    pub queued_background: usize,
    pub inflight_background: usize,
    pub awaiting_merge: usize,
    /// Requests dropped by a worker because they went idle while queued.
    pub skipped: usize,
}

/// Heap entry: highest priority first, FIFO among equals.
struct Queued {
    priority: f32,
    seq: u64,
    req: RequestRef,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == cmp::Ordering::Equal
    }
}

impl Eq for Queued {}

/// Pending work of one lane. The lane's channel carries one ticket per
/// entry; a worker holding a ticket pops the best entry.
#[derive(Default)]
struct LaneQueue {
    heap: Mutex<BinaryHeap<Queued>>,
    seq: AtomicU64,
    queued: AtomicUsize,
    inflight: AtomicUsize,
}

impl LaneQueue {
    fn push(&self, req: RequestRef) {
        let entry = Queued {
            priority: req.priority(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            req,
        };
        self.queued.fetch_add(1, Ordering::Relaxed);
        self.heap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// The popped request counts as in flight until `finish`.
    fn pop(&self) -> Option<RequestRef> {
        let entry = self
            .heap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()?;
        self.inflight.fetch_add(1, Ordering::Relaxed);
        self.queued.fetch_sub(1, Ordering::Relaxed);
        Some(entry.req)
    }

    fn finish(&self) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
    }
}

fn run_next(lane: &LaneQueue, skipped: &AtomicUsize, merge_tx: &Sender<RequestRef>) {
    if let Some(req) = lane.pop() {
        run_request(req, lane, skipped, merge_tx);
    }
}

fn run_request(
    req: RequestRef,
    lane: &LaneQueue,
    skipped: &AtomicUsize,
    merge_tx: &Sender<RequestRef>,
) {
    if !req.transition(RequestState::Pending, RequestState::Running) {
        skipped.fetch_add(1, Ordering::Relaxed);
        log::trace!(target: "loader", "skip {} (state {:?})", req.name(), req.state());
        lane.finish();
        return;
    }
    req.invoke();
    if req.state() == RequestState::Running {
        let _ = merge_tx.send(req);
    }
    lane.finish();
}

/// Paging worker pool. Workers run `invoke`; the owning (render) thread
/// calls [`Loader::update`] once per frame to merge finished requests.
pub struct Loader {
    job_tx_mandatory: Sender<()>,
    job_tx_bg: Sender<()>,
    merge_rx: Receiver<RequestRef>,
    _mandatory_pool: Arc<ThreadPool>,
    _bg_pool: Arc<ThreadPool>,
    mandatory: Arc<LaneQueue>,
    background: Arc<LaneQueue>,
    skipped: Arc<AtomicUsize>,
    ready: VecDeque<RequestRef>,
    merges_per_frame: usize,
    precompile: bool,
    pub w_mandatory: usize,
    pub w_bg: usize,
}

impl Loader {
    pub fn new(cfg: &LoaderConfig) -> Result<Self, Box<dyn Error>> {
        let (job_tx_mandatory, job_rx_mandatory) = unbounded::<()>();
        let (job_tx_bg, job_rx_bg) = unbounded::<()>();
        let (merge_tx, merge_rx) = unbounded::<RequestRef>();

        let w_mandatory = cfg.mandatory_workers.max(1);
        let w_bg = if cfg.background_workers > 0 {
            cfg.background_workers
        } else {
            let worker_count: usize = thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(8);
            worker_count.saturating_sub(w_mandatory).max(1)
        };

        let mandatory = Arc::new(LaneQueue::default());
        let background = Arc::new(LaneQueue::default());
        let skipped = Arc::new(AtomicUsize::new(0));

        let mandatory_pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(w_mandatory)
                .thread_name(|i| format!("rex-mandatory-{i}"))
                .build()?,
        );
        for _ in 0..w_mandatory {
            let rx = job_rx_mandatory.clone();
            let tx = merge_tx.clone();
            let lane = mandatory.clone();
            let skipped = skipped.clone();
            mandatory_pool.spawn(move || {
                while rx.recv().is_ok() {
                    run_next(&lane, &skipped, &tx);
                }
            });
        }

        // Background workers help drain the mandatory lane when idle.
        let bg_pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(w_bg)
                .thread_name(|i| format!("rex-bg-{i}"))
                .build()?,
        );
        for _ in 0..w_bg {
            let bg_rx = job_rx_bg.clone();
            let mandatory_rx = job_rx_mandatory.clone();
            let tx = merge_tx.clone();
            let bg_lane = background.clone();
            let mandatory_lane = mandatory.clone();
            let skipped = skipped.clone();
            bg_pool.spawn(move || {
                loop {
                    if mandatory_rx.try_recv().is_ok() {
                        run_next(&mandatory_lane, &skipped, &tx);
                        continue;
                    }
                    select! {
                        recv(bg_rx) -> res => match res {
                            Ok(()) => run_next(&bg_lane, &skipped, &tx),
                            Err(_) => break,
                        },
                        recv(mandatory_rx) -> res => match res {
                            Ok(()) => run_next(&mandatory_lane, &skipped, &tx),
                            Err(_) => break,
                        },
                    }
                }
            });
        }

        log::info!(
            target: "loader",
            "loader started: mandatory={} background={} merges_per_frame={} precompile={}",
            w_mandatory,
            w_bg,
            cfg.merges_per_frame,
            cfg.precompile
        );

        Ok(Self {
            job_tx_mandatory,
            job_tx_bg,
            merge_rx,
            _mandatory_pool: mandatory_pool,
            _bg_pool: bg_pool,
            mandatory,
            background,
            skipped,
            ready: VecDeque::new(),
            merges_per_frame: cfg.merges_per_frame,
            precompile: cfg.precompile,
            w_mandatory,
            w_bg,
        })
    }

    /// Queues `req` on the lane matching its cancel policy. Returns false if
    /// the request was already pending or running.
    pub fn submit(&self, req: RequestRef) -> bool {
        let lane = if req.enable_cancel() {
            Lane::Background
        } else {
            Lane::Mandatory
        };
        self.submit_to(lane, req)
    }

    /// Within a lane, higher `priority()` (read now) runs first.
    pub fn submit_to(&self, lane: Lane, req: RequestRef) -> bool {
        if !req.transition(RequestState::Idle, RequestState::Pending) {
            return false;
        }
        let (tx, queue) = match lane {
            Lane::Mandatory => (&self.job_tx_mandatory, &self.mandatory),
            Lane::Background => (&self.job_tx_bg, &self.background),
        };
        queue.push(req);
        if tx.send(()).is_err() {
            if let Some(req) = queue.pop() {
                req.set_state(RequestState::Idle);
            }
            return false;
        }
        true
    }

    /// Marks `req` unwanted. A queued request is skipped; a running one sees
    /// its progress token report canceled at the next poll.
    pub fn cancel(&self, req: &RequestRef) {
        req.set_state(RequestState::Idle);
    }

    /// Merges finished requests into the scene. Call on the render thread.
    pub fn update(
        &mut self,
        ctx: &EngineContext,
        stamp: &FrameStamp,
        mut compiler: Option<&mut dyn GpuCompiler>,
    ) -> UpdateReport {
        self.ready.extend(self.merge_rx.try_iter());
        let budget = if self.merges_per_frame == 0 {
            usize::MAX
        } else {
            self.merges_per_frame
        };
        let mut report = UpdateReport::default();
        while report.applied() < budget {
            let Some(req) = self.ready.pop_front() else {
                break;
            };
            if req.is_idle() {
                // canceled after its build finished
                req.discard();
                report.discarded += 1;
                continue;
            }
            if self.precompile {
                if let Some(c) = compiler.as_deref_mut() {
                    if let Some(adapter) = req.create_precompile(ctx) {
                        adapter.accept(c);
                        report.precompiled += 1;
                    }
                }
            }
            let outcome = req.apply(ctx, stamp);
            req.set_state(RequestState::Idle);
            report.record(outcome);
        }
        if report.applied() > 0 || report.discarded > 0 {
            log::debug!(
                target: "loader",
                "frame {} merged={} stale={} expired={} empty={} discarded={} backlog={}",
                stamp.frame_number,
                report.merged,
                report.stale,
                report.tile_expired,
                report.no_data,
                report.discarded,
                self.ready.len()
            );
        }
        report
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            queued_mandatory: self.mandatory.queued.load(Ordering::Relaxed),
            inflight_mandatory: self.mandatory.inflight.load(Ordering::Relaxed),
            queued_background: self.background.queued.load(Ordering::Relaxed),
            inflight_background: self.background.inflight.load(Ordering::Relaxed),
            awaiting_merge: self.ready.len() + self.merge_rx.len(),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Nothing queued, running, or waiting to merge.
    pub fn is_quiet(&self) -> bool {
        let s = self.stats();
        s.queued_mandatory == 0
            && s.inflight_mandatory == 0
            && s.queued_background == 0
            && s.inflight_background == 0
            && s.awaiting_merge == 0
    }
}
