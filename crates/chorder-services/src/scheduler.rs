//! Playback scheduler: walks a plan on a worker thread
//!
//! Each run owns a playback token. `stop()` invalidates the token and drops
//! its cancel sender, which wakes any pending wait; the worker re-checks the
//! token before every trigger, so nothing new sounds once `stop()` returns.
//!
//! Events go to every receiver handed out by [`Scheduler::events`]; receivers
//! that were dropped are pruned on the next send.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chorder_core::{EntryId, PlaybackPlan, PlaybackStep};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sound::{SoundEngine, SoundError};

pub const DEFAULT_GRACE: Duration = Duration::from_millis(100);
pub const DEFAULT_HUSH_BEFORE: Duration = Duration::from_millis(150);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Nothing to play")]
    EmptyPlan,
    #[error("Start index {index} is out of range for {len} entries")]
    StartOutOfRange { index: usize, len: usize },
    #[error("Failed to spawn playback thread: {0}")]
    Spawn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Pause before the first trigger of a run, so the outgoing run's tail settles
    pub grace: Duration,
    /// Lead time of the hush before each entry ends
    pub hush_before: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
            hush_before: DEFAULT_HUSH_BEFORE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

/// Progress notifications for a UI or a CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { from: usize },
    EntryStarted { index: usize, entry_id: EntryId, label: String },
    EntryFailed { index: usize, label: String, message: String },
    Hush { index: usize },
    Completed,
    Stopped,
}

type Subscribers = Arc<Mutex<Vec<Sender<PlaybackEvent>>>>;

fn broadcast(subscribers: &Subscribers, event: PlaybackEvent) {
    let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
    subscribers.retain(|tx| tx.send(event.clone()).is_ok());
}

struct Run {
    live: Arc<Mutex<bool>>,
    /// Never sent on; dropping it cancels the run's waits
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

pub struct Scheduler {
    engine: Arc<dyn SoundEngine>,
    config: SchedulerConfig,
    current: Mutex<Option<Run>>,
    subscribers: Subscribers,
}

impl Scheduler {
    pub fn new(engine: Arc<dyn SoundEngine>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            current: Mutex::new(None),
            subscribers: Arc::default(),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// New receiver for playback events sent from now on
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn state(&self) -> PlaybackState {
        let playing = self
            .current
            .lock()
            .ok()
            .and_then(|run| run.as_ref().map(|r| r.live.lock().map(|l| *l).unwrap_or(false)))
            .unwrap_or(false);
        if playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Start playing `plan` from entry `start`, replacing any current run
    pub fn play(&self, plan: PlaybackPlan, start: usize) -> Result<(), SchedulerError> {
        if plan.is_empty() {
            return Err(SchedulerError::EmptyPlan);
        }
        if start >= plan.len() {
            return Err(SchedulerError::StartOutOfRange {
                index: start,
                len: plan.len(),
            });
        }

        self.stop();

        let live = Arc::new(Mutex::new(true));
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let worker = Worker {
            engine: self.engine.clone(),
            config: self.config,
            live: live.clone(),
            cancel: cancel_rx,
            subscribers: self.subscribers.clone(),
        };
        let guard = PanicGuard {
            live: live.clone(),
            subscribers: self.subscribers.clone(),
        };

        info!(tempo = plan.tempo, entries = plan.len(), from = start, "Playback started");
        let handle = thread::Builder::new()
            .name("chorder-playback".into())
            .spawn(move || {
                let _guard = guard;
                worker.run(&plan, start)
            })
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;

        if let Ok(mut current) = self.current.lock() {
            *current = Some(Run {
                live,
                cancel: Some(cancel_tx),
                handle: Some(handle),
            });
        }
        Ok(())
    }

    /// Cancel the current run and hush the engine. No-op when stopped.
    pub fn stop(&self) {
        let run = self.current.lock().ok().and_then(|mut c| c.take());
        let Some(mut run) = run else {
            return;
        };

        let was_live = match run.live.lock() {
            Ok(mut live) => std::mem::replace(&mut *live, false),
            Err(_) => false,
        };
        drop(run.cancel.take());
        if let Some(handle) = run.handle.take() {
            join_worker(handle);
        }

        if was_live {
            self.engine.hush();
            broadcast(&self.subscribers, PlaybackEvent::Stopped);
            info!("Playback stopped");
        }
    }

    /// Block until the current run finishes on its own or is stopped
    pub fn wait(&self) {
        let handle = self
            .current
            .lock()
            .ok()
            .and_then(|mut c| c.as_mut().and_then(|run| run.handle.take()));
        if let Some(handle) = handle {
            join_worker(handle);
        }
    }

    /// Manual one-off trigger; halts any run and silences the engine first
    pub fn preview(&self, step: &PlaybackStep) -> Result<(), SoundError> {
        self.stop();
        self.engine.hush();
        self.engine.trigger(step)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("Playback worker panicked");
    }
}

/// Ends the run when the worker unwinds, so listeners still see `Stopped`
struct PanicGuard {
    live: Arc<Mutex<bool>>,
    subscribers: Subscribers,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        *self.live.lock().unwrap_or_else(PoisonError::into_inner) = false;
        broadcast(&self.subscribers, PlaybackEvent::Stopped);
    }
}

struct Worker {
    engine: Arc<dyn SoundEngine>,
    config: SchedulerConfig,
    live: Arc<Mutex<bool>>,
    cancel: Receiver<()>,
    subscribers: Subscribers,
}

impl Worker {
    /// Sleep for `duration`; false when the run was cancelled meanwhile
    fn wait(&self, duration: Duration) -> bool {
        matches!(self.cancel.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }

    /// Run `f` only while the token is still valid
    fn while_live(&self, f: impl FnOnce()) -> bool {
        let Ok(live) = self.live.lock() else {
            return false;
        };
        if !*live {
            return false;
        }
        f();
        true
    }

    fn emit(&self, event: PlaybackEvent) {
        broadcast(&self.subscribers, event);
    }

    fn run(&self, plan: &PlaybackPlan, start: usize) {
        if !self.wait(self.config.grace) {
            return;
        }
        self.emit(PlaybackEvent::Started { from: start });

        for (index, step) in plan.steps.iter().enumerate().skip(start) {
            let triggered = self.while_live(|| match self.engine.trigger(step) {
                Ok(()) => {
                    debug!(index, label = %step.label, "Entry started");
                    self.emit(PlaybackEvent::EntryStarted {
                        index,
                        entry_id: step.entry_id,
                        label: step.label.clone(),
                    });
                }
                Err(e) => {
                    warn!(index, label = %step.label, error = %e, "Sound trigger failed, skipping");
                    self.emit(PlaybackEvent::EntryFailed {
                        index,
                        label: step.label.clone(),
                        message: e.to_string(),
                    });
                }
            });
            if !triggered {
                return;
            }

            let lead = step.duration.saturating_sub(self.config.hush_before);
            if !self.wait(lead) {
                return;
            }
            let hushed = self.while_live(|| {
                self.engine.hush();
                self.emit(PlaybackEvent::Hush { index });
            });
            if !hushed || !self.wait(step.duration - lead) {
                return;
            }
        }

        let finished = match self.live.lock() {
            Ok(mut live) => std::mem::replace(&mut *live, false),
            Err(_) => false,
        };
        if finished {
            self.emit(PlaybackEvent::Completed);
            info!("Playback completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use chorder_core::{Entry, EntryContent, RowId};

    use crate::sound::{RecordingEngine, SoundCall};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            grace: Duration::from_millis(5),
            hush_before: Duration::from_millis(10),
        }
    }

    /// One-bar code entries; at 2400 BPM a bar lasts 100 ms
    fn plan(labels: &[&str], bpm: u32) -> PlaybackPlan {
        let entries: Vec<Entry> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| Entry {
                id: EntryId(i as u64 + 10),
                row_id: RowId(1),
                label: label.to_string(),
                content: EntryContent::code(format!("note(\"{label}\")")),
                repeat_count: Some(1),
            })
            .collect();
        PlaybackPlan::from_entries(&entries, bpm, 0)
    }

    fn setup(engine: RecordingEngine) -> (Arc<RecordingEngine>, Scheduler) {
        let engine = Arc::new(engine);
        let scheduler = Scheduler::new(engine.clone(), fast_config());
        (engine, scheduler)
    }

    fn drain_until(events: &Receiver<PlaybackEvent>, last: &PlaybackEvent) -> Vec<PlaybackEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.recv_timeout(TIMEOUT) {
            let done = &event == last;
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }

    #[test]
    fn test_plays_in_order_and_completes() {
        let (engine, scheduler) = setup(RecordingEngine::new());
        let events = scheduler.events();
        scheduler.play(plan(&["a", "b", "c"], 2400), 0).unwrap();
        assert!(scheduler.is_playing());

        let seen = drain_until(&events, &PlaybackEvent::Completed);
        assert_eq!(seen.first(), Some(&PlaybackEvent::Started { from: 0 }));
        assert_eq!(seen.last(), Some(&PlaybackEvent::Completed));
        assert_eq!(engine.triggered(), vec!["a", "b", "c"]);
        // every trigger is followed by its hush
        assert_eq!(
            engine.calls(),
            vec![
                SoundCall::Trigger("a".into()),
                SoundCall::Hush,
                SoundCall::Trigger("b".into()),
                SoundCall::Hush,
                SoundCall::Trigger("c".into()),
                SoundCall::Hush,
            ]
        );
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_total_duration() {
        let (_engine, scheduler) = setup(RecordingEngine::new());
        let p = plan(&["a", "b", "c"], 2400);
        let expected = p.total_duration();
        let started = Instant::now();
        scheduler.play(p, 0).unwrap();
        scheduler.wait();
        let elapsed = started.elapsed();
        assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
        assert!(elapsed < expected + Duration::from_secs(1));
    }

    #[test]
    fn test_start_offset() {
        let (engine, scheduler) = setup(RecordingEngine::new());
        scheduler.play(plan(&["a", "b", "c"], 2400), 1).unwrap();
        scheduler.wait();
        assert_eq!(engine.triggered(), vec!["b", "c"]);
    }

    #[test]
    fn test_failed_trigger_is_skipped() {
        let (engine, scheduler) = setup(RecordingEngine::failing_on(&["b"]));
        let events = scheduler.events();
        scheduler.play(plan(&["a", "b", "c"], 2400), 0).unwrap();
        let seen = drain_until(&events, &PlaybackEvent::Completed);
        assert!(seen.iter().any(|e| matches!(e, PlaybackEvent::EntryFailed { index: 1, .. })));
        assert_eq!(engine.triggered(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stop_prevents_further_entries() {
        let (engine, scheduler) = setup(RecordingEngine::new());
        let events = scheduler.events();
        // 1 bar at 600 BPM = 400 ms
        scheduler.play(plan(&["a", "b", "c"], 600), 0).unwrap();
        drain_until(
            &events,
            &PlaybackEvent::EntryStarted {
                index: 0,
                entry_id: EntryId(10),
                label: "a".into(),
            },
        );
        scheduler.stop();
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        let after_stop = engine.triggered();

        thread::sleep(Duration::from_millis(600));
        assert_eq!(engine.triggered(), after_stop);
        assert_eq!(after_stop, vec!["a"]);
        assert_eq!(engine.calls().last(), Some(&SoundCall::Hush));
        assert!(events.try_iter().any(|e| e == PlaybackEvent::Stopped));
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let (engine, scheduler) = setup(RecordingEngine::new());
        scheduler.stop();
        scheduler.stop();
        assert!(engine.calls().is_empty());
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_play_replaces_current_run() {
        let (engine, scheduler) = setup(RecordingEngine::new());
        scheduler.play(plan(&["old1", "old2"], 60), 0).unwrap();
        thread::sleep(Duration::from_millis(50));
        scheduler.play(plan(&["new"], 2400), 0).unwrap();
        scheduler.wait();

        assert_eq!(engine.triggered(), vec!["old1", "new"]);
        // the outgoing run is hushed before the new one starts
        let calls = engine.calls();
        let new_at = calls.iter().position(|c| c == &SoundCall::Trigger("new".into())).unwrap();
        assert_eq!(calls[new_at - 1], SoundCall::Hush);
    }

    struct PanickingEngine;

    impl SoundEngine for PanickingEngine {
        fn trigger(&self, _step: &PlaybackStep) -> Result<(), SoundError> {
            panic!("synth crashed");
        }

        fn hush(&self) {}
    }

    #[test]
    fn test_worker_panic_reports_stopped() {
        let scheduler = Scheduler::new(Arc::new(PanickingEngine), fast_config());
        let events = scheduler.events();
        scheduler.play(plan(&["a", "b"], 2400), 0).unwrap();

        let seen = drain_until(&events, &PlaybackEvent::Stopped);
        assert_eq!(seen.last(), Some(&PlaybackEvent::Stopped));
        scheduler.wait();
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        scheduler.stop();
    }

    #[test]
    fn test_events_only_reach_live_receivers() {
        let (_engine, scheduler) = setup(RecordingEngine::new());
        scheduler.play(plan(&["a"], 2400), 0).unwrap();
        scheduler.wait();

        // nothing is buffered for receivers created after the fact
        let late = scheduler.events();
        assert!(late.try_recv().is_err());

        let dropped = scheduler.events();
        drop(dropped);
        scheduler.play(plan(&["b"], 2400), 0).unwrap();
        scheduler.wait();
        assert_eq!(late.try_iter().last(), Some(PlaybackEvent::Completed));
        assert_eq!(scheduler.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_start() {
        let (_engine, scheduler) = setup(RecordingEngine::new());
        assert!(matches!(
            scheduler.play(plan(&["a"], 120), 3),
            Err(SchedulerError::StartOutOfRange { index: 3, len: 1 })
        ));
        assert!(matches!(scheduler.play(plan(&[], 120), 0), Err(SchedulerError::EmptyPlan)));
    }

    #[test]
    fn test_preview_halts_playback() {
        let (engine, scheduler) = setup(RecordingEngine::new());
        scheduler.play(plan(&["a", "b"], 60), 0).unwrap();
        thread::sleep(Duration::from_millis(50));
        let p = plan(&["preview"], 120);
        scheduler.preview(&p.steps[0]).unwrap();
        assert!(!scheduler.is_playing());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.triggered(), vec!["a", "preview"]);
    }
}
