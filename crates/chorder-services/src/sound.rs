//! Sound engine seam shared by the scheduler and manual previews

use std::sync::Mutex;

use chorder_core::{PlaybackStep, StepPayload};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("Sound engine rejected '{label}': {message}")]
    Trigger { label: String, message: String },
}

/// A single shared synthesizer.
///
/// The engine keeps no queue: callers hush it before starting a new sound.
pub trait SoundEngine: Send + Sync {
    fn trigger(&self, step: &PlaybackStep) -> Result<(), SoundError>;

    /// Immediate all-sound-off
    fn hush(&self);
}

/// Engine that only logs what it would play
#[derive(Debug, Default)]
pub struct TracingEngine;

impl SoundEngine for TracingEngine {
    fn trigger(&self, step: &PlaybackStep) -> Result<(), SoundError> {
        match &step.payload {
            StepPayload::Notes(notes) => {
                info!(label = %step.label, notes = %notes, duration = ?step.duration, "play chord")
            }
            StepPayload::Code(code) => {
                info!(label = %step.label, code = %code, duration = ?step.duration, "play code")
            }
        }
        Ok(())
    }

    fn hush(&self) {
        debug!("hush");
    }
}

/// What a [`RecordingEngine`] saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundCall {
    Trigger(String),
    Hush,
}

/// Engine that records calls; labels listed in `failing` raise an error
#[derive(Debug, Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<SoundCall>>,
    failing: Vec<String>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(labels: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<SoundCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Labels of every trigger, in order (including failed ones)
    pub fn triggered(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SoundCall::Trigger(label) => Some(label),
                SoundCall::Hush => None,
            })
            .collect()
    }

    fn record(&self, call: SoundCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl SoundEngine for RecordingEngine {
    fn trigger(&self, step: &PlaybackStep) -> Result<(), SoundError> {
        self.record(SoundCall::Trigger(step.label.clone()));
        if self.failing.contains(&step.label) {
            return Err(SoundError::Trigger {
                label: step.label.clone(),
                message: "rejected".into(),
            });
        }
        Ok(())
    }

    fn hush(&self) {
        self.record(SoundCall::Hush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chorder_core::EntryId;

    fn step(label: &str) -> PlaybackStep {
        PlaybackStep {
            entry_id: EntryId(1),
            label: label.into(),
            payload: StepPayload::Code("s(\"bd\")".into()),
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_recording_engine() {
        let engine = RecordingEngine::failing_on(&["bad"]);
        assert!(engine.trigger(&step("ok")).is_ok());
        engine.hush();
        assert!(engine.trigger(&step("bad")).is_err());
        assert_eq!(
            engine.calls(),
            vec![
                SoundCall::Trigger("ok".into()),
                SoundCall::Hush,
                SoundCall::Trigger("bad".into())
            ]
        );
        assert_eq!(engine.triggered(), vec!["ok", "bad"]);
    }
}
