//! Drag-and-drop reordering of rows and entries
//!
//! Pointer events from the UI arrive as [`DragEvent`]s and drive a small
//! state machine: `Idle` → `Dragging` on start, `Dragging` → `Idle` on end or
//! cancel. The progression is only changed on a valid drop, exactly once.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::{EntryId, EntryKind, Row, RowId};
use crate::error::ChorderError;
use crate::progression::{Anchor, Progression};

/// Declared type of a dragged item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragKind {
    Row,
    Chord,
    Code,
}

impl From<EntryKind> for DragKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Chord => Self::Chord,
            EntryKind::Code => Self::Code,
        }
    }
}

/// Identifier of a draggable or droppable element.
///
/// String form, as emitted by the UI layer: `row:<row>`, `start:<row>`
/// (the "before-first" slot of a row) and `entry:<row>:<entry>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DragHandle {
    Row(RowId),
    RowStart(RowId),
    Entry { row: RowId, entry: EntryId },
}

impl fmt::Display for DragHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row(row) => write!(f, "row:{row}"),
            Self::RowStart(row) => write!(f, "start:{row}"),
            Self::Entry { row, entry } => write!(f, "entry:{row}:{entry}"),
        }
    }
}

impl FromStr for DragHandle {
    type Err = ChorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChorderError::validation(format!("Invalid drag handle '{s}'"));
        let number = |part: Option<&str>| -> Result<u64, ChorderError> {
            part.and_then(|p| p.parse().ok()).ok_or_else(invalid)
        };
        let mut parts = s.split(':');
        let handle = match parts.next() {
            Some("row") => Self::Row(RowId(number(parts.next())?)),
            Some("start") => Self::RowStart(RowId(number(parts.next())?)),
            Some("entry") => {
                let row = RowId(number(parts.next())?);
                let entry = EntryId(number(parts.next())?);
                Self::Entry { row, entry }
            }
            _ => return Err(invalid()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(handle)
    }
}

/// The item being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragItem {
    pub handle: DragHandle,
    pub kind: DragKind,
}

impl DragItem {
    pub fn row(row: &Row) -> Self {
        Self {
            handle: DragHandle::Row(row.id),
            kind: DragKind::Row,
        }
    }

    /// Returns `None` if the entry is not in `row`
    pub fn entry(row: &Row, entry: EntryId) -> Option<Self> {
        let found = row.get_entry(entry)?;
        Some(Self {
            handle: DragHandle::Entry { row: row.id, entry },
            kind: found.kind().into(),
        })
    }
}

/// A drop zone under the pointer and the item types it accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTarget {
    pub handle: DragHandle,
    pub accepts: Vec<DragKind>,
}

impl DropTarget {
    /// Drop zone of a whole row; accepts rows (dropped after it)
    pub fn row(row: &Row) -> Self {
        Self {
            handle: DragHandle::Row(row.id),
            accepts: vec![DragKind::Row],
        }
    }

    /// The slot before a row's first entry
    pub fn row_start(row: &Row) -> Self {
        Self {
            handle: DragHandle::RowStart(row.id),
            accepts: vec![row.kind.into()],
        }
    }

    /// An entry; items dropped here land right after it
    pub fn entry(row: &Row, entry: EntryId) -> Self {
        Self {
            handle: DragHandle::Entry { row: row.id, entry },
            accepts: vec![row.kind.into()],
        }
    }

    pub fn accepts(&self, kind: DragKind) -> bool {
        self.accepts.contains(&kind)
    }
}

/// Pointer events, already validated at the UI boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragEvent {
    Start(DragItem),
    Over(Option<DropTarget>),
    End(Option<DropTarget>),
    /// Pointer released outside any target or capture lost
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragItem),
}

/// Result of feeding one event to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// Nothing to do
    None,
    /// A drag began; any running playback must be stopped
    StopPlayback,
    /// A valid drop produced a new progression
    Commit(Progression),
}

/// Drag-reorder state machine
#[derive(Debug, Clone, Default)]
pub struct DragEngine {
    state: DragState,
    hover_invalid: bool,
}

impl DragEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// True while the pointer is over a target that rejects the active item
    pub fn hover_invalid(&self) -> bool {
        self.hover_invalid
    }

    pub fn handle(&mut self, event: DragEvent, progression: &Progression) -> DragOutcome {
        match (event, self.state) {
            (DragEvent::Start(item), DragState::Idle) => {
                self.state = DragState::Dragging(item);
                self.hover_invalid = false;
                debug!(item = %item.handle, "drag started");
                DragOutcome::StopPlayback
            }
            (DragEvent::Start(item), DragState::Dragging(_)) => {
                // A new drag replaces a stale one without touching the store
                self.state = DragState::Dragging(item);
                self.hover_invalid = false;
                DragOutcome::None
            }
            (DragEvent::Over(target), DragState::Dragging(active)) => {
                self.hover_invalid = target.is_some_and(|t| !t.accepts(active.kind));
                DragOutcome::None
            }
            (DragEvent::End(target), DragState::Dragging(active)) => {
                self.reset();
                match target {
                    Some(target) => Self::drop_on(active, &target, progression),
                    None => DragOutcome::None,
                }
            }
            (DragEvent::Cancel, _) => {
                self.reset();
                DragOutcome::None
            }
            (_, DragState::Idle) => DragOutcome::None,
        }
    }

    fn reset(&mut self) {
        self.state = DragState::Idle;
        self.hover_invalid = false;
    }

    fn drop_on(active: DragItem, target: &DropTarget, progression: &Progression) -> DragOutcome {
        if active.handle == target.handle || !target.accepts(active.kind) {
            return DragOutcome::None;
        }
        let next = match (active.handle, target.handle) {
            (DragHandle::Row(row), DragHandle::Row(over)) => {
                progression.move_row(row, Anchor::After(over))
            }
            (DragHandle::Entry { row, entry }, DragHandle::Entry { row: to, entry: after }) => {
                progression.move_entry(entry, row, to, Anchor::After(after))
            }
            (DragHandle::Entry { row, entry }, DragHandle::RowStart(to)) => {
                progression.move_entry(entry, row, to, Anchor::Start)
            }
            _ => return DragOutcome::None,
        };
        if &next == progression {
            return DragOutcome::None;
        }
        debug!(item = %active.handle, target = %target.handle, "drop committed");
        DragOutcome::Commit(next)
    }
}
