//! Rows and the entries placed in them

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chord::{ChordSymbol, NoteSet};

/// Unique identifier for rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

/// Unique identifier for entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry type; a row only accepts entries of its own kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Chord,
    Code,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chord => f.write_str("chord"),
            Self::Code => f.write_str("code"),
        }
    }
}

/// What an entry plays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryContent {
    Chord { symbol: ChordSymbol, octave: i32 },
    Code { code: String },
}

impl EntryContent {
    pub fn chord(symbol: ChordSymbol, octave: i32) -> Self {
        Self::Chord { symbol, octave }
    }

    pub fn code(code: impl Into<String>) -> Self {
        Self::Code { code: code.into() }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Chord { .. } => EntryKind::Chord,
            Self::Code { .. } => EntryKind::Code,
        }
    }
}

/// One chord or code block placed in a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    /// Owning row; kept in sync by the progression operations
    pub row_id: RowId,
    pub label: String,
    pub content: EntryContent,
    /// Bars to hold this entry during sequenced playback
    pub repeat_count: Option<u32>,
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        self.content.kind()
    }

    /// Voiced notes for chord entries, transposed by `transpose` semitones
    pub fn note_set(&self, transpose: i32) -> Option<NoteSet> {
        match &self.content {
            EntryContent::Chord { symbol, octave } => Some(symbol.to_note_set(*octave, transpose)),
            EntryContent::Code { .. } => None,
        }
    }
}

/// A named, ordered lane of entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub name: String,
    pub kind: EntryKind,
    pub entries: Vec<Entry>,
}

impl Row {
    pub fn new(id: RowId, kind: EntryKind) -> Self {
        Self {
            id,
            name: String::new(),
            kind,
            entries: Vec::new(),
        }
    }

    pub fn accepts(&self, kind: EntryKind) -> bool {
        self.kind == kind
    }

    pub fn get_entry(&self, entry_id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub fn get_entry_mut(&mut self, entry_id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == entry_id)
    }

    pub fn position(&self, entry_id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == entry_id)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}
