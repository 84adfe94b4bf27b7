//! chorder-core: Chord progression model, voicing and playback planning

pub mod builder;
pub mod chord;
pub mod document;
pub mod drag;
mod entry;
mod error;
pub mod plan;
mod progression;

pub use builder::{quality_from_tag, BuiltChord, ChordSelection, QUALITY_TAGS};
pub use chord::{ChordQuality, ChordSymbol, Note, NoteSet, PitchClass, Tension};
pub use document::{export_json, import_json, import_json_with_tempo, MAX_DOCUMENT_ID};
pub use drag::{DragEngine, DragEvent, DragHandle, DragItem, DragKind, DragOutcome, DragState, DropTarget};
pub use entry::{Entry, EntryContent, EntryId, EntryKind, Row, RowId};
pub use error::{ChorderError, Result};
pub use plan::{
    bar_duration, effective_repeat, effective_tempo, step_duration, validate_tempo,
    PlaybackPlan, PlaybackStep, StepPayload, DEFAULT_REPEAT, DEFAULT_TEMPO, MAX_TEMPO,
};
pub use progression::{Anchor, Progression};
