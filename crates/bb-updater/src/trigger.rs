//! Debounced Trigger
//!
//! Change notifications arrive in bursts (a filter update touches many
//! lists, a settings page flips several switches). [`DebouncedTrigger`]
//! turns any burst into a single update cycle that starts once the inputs
//! have been quiet for the debounce period, measured from the last request.
//!
//! The timing logic lives in [`Debouncer`], a plain state machine driven by
//! an explicit clock. A single background task owns the cycle: it sleeps
//! until the current deadline, re-checks it (newer requests push it back),
//! runs the cycle on the blocking pool and checks again afterwards. Cycles
//! therefore never overlap, and requests made during a cycle schedule
//! exactly one follow-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::pipeline::UpdatePipeline;

/// Quiet period before an update cycle runs.
pub const DEBOUNCE_PERIOD: Duration = Duration::from_millis(500);

/// Deadline used when `now + period` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    /// A cycle is due at `deadline`; `seq` identifies the request that set it
    Pending { deadline: Instant, seq: u64 },
}

/// What the owner of a [`Debouncer`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Idle,
    Wait(Instant),
    /// Run now, on behalf of request `seq` and everything before it
    Fire(u64),
}

#[derive(Debug)]
pub struct Debouncer {
    period: Duration,
    state: DebounceState,
    seq: u64,
}

impl Debouncer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: DebounceState::Idle,
            seq: 0,
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Number of requests seen so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Records a request at `now`, replacing any pending deadline.
    pub fn request(&mut self, now: Instant) -> u64 {
        self.seq += 1;
        let deadline = now
            .checked_add(self.period)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.state = DebounceState::Pending {
            deadline,
            seq: self.seq,
        };
        self.seq
    }

    pub fn poll(&mut self, now: Instant) -> Poll {
        match self.state {
            DebounceState::Idle => Poll::Idle,
            DebounceState::Pending { deadline, seq } if now >= deadline => {
                self.state = DebounceState::Idle;
                Poll::Fire(seq)
            }
            DebounceState::Pending { deadline, .. } => Poll::Wait(deadline),
        }
    }
}

// =============================================================================
// Cycle runner
// =============================================================================

/// Work executed once per debounced burst. Runs on the blocking pool.
pub trait CycleRunner: Send + Sync + 'static {
    fn run_cycle(&self);
}

impl CycleRunner for UpdatePipeline {
    fn run_cycle(&self) {
        UpdatePipeline::run_cycle(self);
    }
}

impl<F> CycleRunner for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn run_cycle(&self) {
        self()
    }
}

// =============================================================================
// Trigger
// =============================================================================

struct Shared {
    debouncer: Mutex<Debouncer>,
    wake: Notify,
    stopped: AtomicBool,
    completed: watch::Sender<u64>,
}

impl Shared {
    fn debouncer(&self) -> MutexGuard<'_, Debouncer> {
        self.debouncer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sole entry point for update requests.
pub struct DebouncedTrigger {
    shared: Arc<Shared>,
    completed: watch::Receiver<u64>,
    worker: Option<JoinHandle<()>>,
}

impl DebouncedTrigger {
    /// Starts the background task with the default period.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(runner: Arc<dyn CycleRunner>) -> Self {
        Self::with_period(runner, DEBOUNCE_PERIOD)
    }

    pub fn with_period(runner: Arc<dyn CycleRunner>, period: Duration) -> Self {
        let (completed_tx, completed_rx) = watch::channel(0u64);
        let shared = Arc::new(Shared {
            debouncer: Mutex::new(Debouncer::new(period)),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
            completed: completed_tx,
        });

        let worker = tokio::spawn(run_worker(shared.clone(), runner));

        Self {
            shared,
            completed: completed_rx,
            worker: Some(worker),
        }
    }

    /// Asks for an update cycle. Always succeeds and never blocks.
    pub fn request_update(&self) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            log::debug!("Update requested after shutdown, ignoring");
            return;
        }

        let seq = self.shared.debouncer().request(Instant::now());
        log::debug!("Content blocker update requested (#{})", seq);
        self.shared.wake.notify_one();
    }

    pub fn state(&self) -> DebounceState {
        self.shared.debouncer().state()
    }

    /// Cycles finished so far, including ones that panicked.
    pub fn completed_cycles(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Waits until at least `count` cycles have completed.
    pub async fn wait_for_cycles(&self, count: u64) -> u64 {
        let mut completed = self.completed.clone();
        if completed.wait_for(|done| *done >= count).await.is_err() {
            log::debug!("Update trigger stopped before {} cycles completed", count);
        }
        let done = *completed.borrow();
        done
    }

    /// Stops the background task. A running cycle is allowed to finish; a
    /// pending request that has not fired yet is dropped.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log::error!("Update trigger task failed: {}", e);
            }
        }
    }

    fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

impl Drop for DebouncedTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_worker(shared: Arc<Shared>, runner: Arc<dyn CycleRunner>) {
    let mut last_fired = 0u64;

    loop {
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }

        let next = shared.debouncer().poll(Instant::now());
        match next {
            Poll::Idle => shared.wake.notified().await,
            Poll::Wait(deadline) => {
                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = shared.wake.notified() => {}
                }
            }
            Poll::Fire(seq) => {
                log::debug!("Running update cycle ({} requests coalesced)", seq - last_fired);
                last_fired = seq;

                let runner = runner.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || runner.run_cycle()).await {
                    log::error!("Update cycle failed: {}", e);
                }
                shared.completed.send_modify(|done| *done += 1);
            }
        }
    }

    log::debug!("Update trigger stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    use tokio::sync::mpsc as async_mpsc;
    use tokio::time::sleep;

    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn debouncer_waits_for_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(500));
        assert_eq!(debouncer.poll(start), Poll::Idle);

        debouncer.request(start);
        assert_eq!(debouncer.poll(start + ms(499)), Poll::Wait(start + ms(500)));

        // A newer request replaces the deadline.
        debouncer.request(start + ms(300));
        assert_eq!(debouncer.poll(start + ms(500)), Poll::Wait(start + ms(800)));

        assert_eq!(debouncer.poll(start + ms(800)), Poll::Fire(2));
        assert_eq!(debouncer.state(), DebounceState::Idle);
        assert_eq!(debouncer.poll(start + ms(2000)), Poll::Idle);
        assert_eq!(debouncer.seq(), 2);
    }

    #[test]
    fn debouncer_tracks_latest_request() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(10));
        for i in 0..5 {
            debouncer.request(start + ms(i));
        }
        assert_eq!(
            debouncer.state(),
            DebounceState::Pending {
                deadline: start + ms(14),
                seq: 5
            }
        );
    }

    #[test]
    fn huge_period_does_not_overflow_the_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::MAX);

        assert_eq!(debouncer.request(start), 1);
        assert_eq!(debouncer.poll(start), Poll::Wait(start + FAR_FUTURE));
    }

    fn counting_runner() -> (Arc<AtomicUsize>, Arc<dyn CycleRunner>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let runner: Arc<dyn CycleRunner> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (runs, runner)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_requests_runs_one_cycle_after_the_last() {
        let (runs, runner) = counting_runner();
        let trigger = DebouncedTrigger::spawn(runner);

        for _ in 0..10 {
            trigger.request_update();
            sleep(ms(100)).await;
        }
        let last_request = Instant::now();
        trigger.request_update();

        sleep(ms(499)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(trigger.completed_cycles(), 0);

        trigger.wait_for_cycles(1).await;
        assert!(Instant::now() >= last_request + DEBOUNCE_PERIOD);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        sleep(ms(5000)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(trigger.state(), DebounceState::Idle);

        trigger.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_run_separate_cycles() {
        let (runs, runner) = counting_runner();
        let trigger = DebouncedTrigger::with_period(runner, ms(50));

        trigger.request_update();
        trigger.wait_for_cycles(1).await;
        trigger.request_update();
        trigger.request_update();
        trigger.wait_for_cycles(2).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        trigger.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn requests_during_a_cycle_schedule_one_follow_up() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (started_tx, mut started_rx) = async_mpsc::unbounded_channel::<usize>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let runner: Arc<dyn CycleRunner> = {
            let running = running.clone();
            let max_running = max_running.clone();
            let runs = runs.clone();
            Arc::new(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = started_tx.send(run);
                if run == 1 {
                    let _ = release_rx.lock().unwrap().recv();
                }
                running.fetch_sub(1, Ordering::SeqCst);
            })
        };

        let trigger = DebouncedTrigger::spawn(runner);
        trigger.request_update();
        assert_eq!(started_rx.recv().await, Some(1));

        // First cycle is blocked; these must not start a concurrent one.
        trigger.request_update();
        trigger.request_update();
        release_tx.send(()).unwrap();

        trigger.wait_for_cycles(2).await;
        assert_eq!(started_rx.recv().await, Some(2));

        sleep(ms(5000)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        trigger.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_cycle_does_not_stop_the_trigger() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let runner: Arc<dyn CycleRunner> = Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first cycle blows up");
            }
        });

        let trigger = DebouncedTrigger::spawn(runner);
        trigger.request_update();
        trigger.wait_for_cycles(1).await;
        trigger.request_update();
        trigger.wait_for_cycles(2).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        trigger.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_request() {
        let (runs, runner) = counting_runner();
        let trigger = DebouncedTrigger::spawn(runner);

        trigger.request_update();
        sleep(ms(100)).await;
        trigger.shutdown().await;

        sleep(ms(5000)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drives_an_update_pipeline() {
        use bb_compiler::{CompilerAdapter, ConversionOutput, ConvertError, RuleConverter};
        use bb_core::{GroupingPolicy, RecordingNotifier, Rule, RuleAggregator, StaticSources};

        struct Passthrough;

        impl RuleConverter for Passthrough {
            fn convert(&self, rules: &[String], _: usize, _: bool) -> Result<ConversionOutput, ConvertError> {
                let json = serde_json::to_string(rules).map_err(ConvertError::Report)?;
                Ok(ConversionOutput {
                    converted: Some(json),
                    advanced_blocking: Some("[]".to_string()),
                    ..ConversionOutput::default()
                })
            }
        }

        let sources = Arc::new(StaticSources::new());
        sources.set_rules(vec![Rule::new(2, "||ads.example^")]);
        let recorder = Arc::new(RecordingNotifier::new());
        let pipeline = UpdatePipeline::new(
            RuleAggregator::new(sources.clone(), sources.clone(), sources.clone()),
            GroupingPolicy::safari_default(),
            CompilerAdapter::new(Arc::new(Passthrough)),
            recorder.clone(),
        );

        let trigger = DebouncedTrigger::spawn(Arc::new(pipeline));
        trigger.request_update();
        trigger.request_update();
        trigger.wait_for_cycles(1).await;

        assert_eq!(recorder.count("CYCLE_COMPLETE"), 1);
        assert_eq!(recorder.count("BUNDLE_UPDATE_REQUIRED"), 7);
        assert_eq!(
            recorder.bundle_json("com.betterblocker.safari.BlockerExtension"),
            Some(vec![serde_json::json!("||ads.example^")])
        );
        trigger.shutdown().await;
    }
}
