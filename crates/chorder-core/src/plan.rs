//! Playback plans: what to play, and for how long
//!
//! A [`PlaybackPlan`] is derived from a row and a tempo at play time and is
//! never persisted. Each step lasts `repeat_count` bars of four beats.

use std::time::Duration;

use serde::Serialize;

use crate::chord::NoteSet;
use crate::entry::{Entry, EntryContent, EntryId, RowId};
use crate::error::{ChorderError, Result};
use crate::progression::Progression;

pub const DEFAULT_TEMPO: u32 = 120;
pub const MAX_TEMPO: u32 = 300;
pub const DEFAULT_REPEAT: u32 = 8;
pub const BEATS_PER_BAR: u32 = 4;

/// Tempo accepted by preview, playback and export operations
pub fn validate_tempo(bpm: u32) -> Result<()> {
    if bpm == 0 || bpm > MAX_TEMPO {
        return Err(ChorderError::validation(format!(
            "Tempo must be greater than 0 or less than {}.",
            MAX_TEMPO + 1
        )));
    }
    Ok(())
}

/// Unset tempo falls back to the default
pub fn effective_tempo(bpm: u32) -> u32 {
    if bpm == 0 { DEFAULT_TEMPO } else { bpm }
}

/// Unset or zero repeat count falls back to the default
pub fn effective_repeat(repeat: Option<u32>) -> u32 {
    match repeat {
        Some(r) if r > 0 => r,
        _ => DEFAULT_REPEAT,
    }
}

/// Length of one bar: `60 / bpm * 4` seconds
pub fn bar_duration(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / effective_tempo(bpm) as f64 * BEATS_PER_BAR as f64)
}

/// Length of a step held for `repeat` bars
pub fn step_duration(bpm: u32, repeat: Option<u32>) -> Duration {
    bar_duration(bpm) * effective_repeat(repeat)
}

/// Sound to trigger for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPayload {
    Notes(NoteSet),
    Code(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStep {
    pub entry_id: EntryId,
    pub label: String,
    pub payload: StepPayload,
    pub duration: Duration,
}

/// Ordered (content, duration) pairs computed from a row and a tempo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackPlan {
    pub tempo: u32,
    pub steps: Vec<PlaybackStep>,
}

impl PlaybackPlan {
    /// Build steps from entries; chord entries are voiced with `transpose`
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a Entry>, bpm: u32, transpose: i32) -> Self {
        let tempo = effective_tempo(bpm);
        let steps = entries
            .into_iter()
            .map(|entry| {
                let payload = match &entry.content {
                    EntryContent::Chord { symbol, octave } => {
                        StepPayload::Notes(symbol.to_note_set(*octave, transpose))
                    }
                    EntryContent::Code { code } => StepPayload::Code(code.clone()),
                };
                PlaybackStep {
                    entry_id: entry.id,
                    label: entry.label.clone(),
                    payload,
                    duration: step_duration(tempo, entry.repeat_count),
                }
            })
            .collect();
        Self { tempo, steps }
    }

    /// Plan for one row at the progression's tempo
    pub fn from_row(progression: &Progression, row_id: RowId, transpose: i32) -> Result<Self> {
        let row = progression
            .get_row(row_id)
            .ok_or_else(|| ChorderError::validation(format!("Unknown row {row_id}")))?;
        if row.entries.is_empty() {
            return Err(ChorderError::validation("At least one entry has to be added to play."));
        }
        Ok(Self::from_entries(&row.entries, progression.tempo(), transpose))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the step for `entry_id`, used for "play from selection"
    pub fn index_of(&self, entry_id: EntryId) -> Option<usize> {
        self.steps.iter().position(|s| s.entry_id == entry_id)
    }

    /// Wall-clock length when played from `start`
    pub fn duration_from(&self, start: usize) -> Duration {
        self.steps.iter().skip(start).map(|s| s.duration).sum()
    }

    pub fn total_duration(&self) -> Duration {
        self.duration_from(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordSymbol;
    use crate::entry::EntryKind;

    #[test]
    fn test_bar_duration() {
        assert_eq!(bar_duration(120), Duration::from_secs(2));
        assert_eq!(bar_duration(60), Duration::from_secs(4));
        assert_eq!(bar_duration(0), Duration::from_secs(2));
    }

    #[test]
    fn test_step_duration_defaults() {
        assert_eq!(step_duration(120, None), Duration::from_secs(16));
        assert_eq!(step_duration(120, Some(0)), Duration::from_secs(16));
        assert_eq!(step_duration(240, Some(1)), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_tempo() {
        assert!(validate_tempo(0).is_err());
        assert!(validate_tempo(1).is_ok());
        assert!(validate_tempo(300).is_ok());
        assert!(validate_tempo(301).is_err());
    }

    #[test]
    fn test_plan_from_row() {
        let p = Progression::default().set_tempo(240);
        let row = p.rows()[0].id;
        assert!(PlaybackPlan::from_row(&p, row, 0).is_err());

        let p = p
            .add_entry(row, "C", EntryContent::chord(ChordSymbol::parse("C").unwrap(), 4))
            .unwrap()
            .add_entry(row, "G", EntryContent::chord(ChordSymbol::parse("G").unwrap(), 3))
            .unwrap();
        let g = p.get_row(row).unwrap().entries[1].id;
        let p = p.set_repeat_count(row, g, Some(2));

        let plan = PlaybackPlan::from_row(&p, row, 0).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].duration, Duration::from_secs(8));
        assert_eq!(plan.steps[1].duration, Duration::from_secs(2));
        assert_eq!(plan.total_duration(), Duration::from_secs(10));
        assert_eq!(plan.duration_from(1), Duration::from_secs(2));
        assert_eq!(plan.index_of(g), Some(1));
        match &plan.steps[1].payload {
            StepPayload::Notes(notes) => assert_eq!(notes.names(), vec!["G3", "B3", "D4"]),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_code_steps() {
        let p = Progression::new(EntryKind::Code);
        let row = p.rows()[0].id;
        let p = p.add_entry(row, "drums", EntryContent::code("s(\"bd sd\")")).unwrap();
        let plan = PlaybackPlan::from_row(&p, row, 0).unwrap();
        assert_eq!(plan.steps[0].payload, StepPayload::Code("s(\"bd sd\")".into()));
    }
}
