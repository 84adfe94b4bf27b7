//! JSON document form of a progression (export / import)
//!
//! ```json
//! {
//!   "tempo": 120,
//!   "currentRow": "1",
//!   "rows": {
//!     "1": {
//!       "name": "verse",
//!       "kind": "chord",
//!       "order": 0,
//!       "entries": [
//!         { "id": 2, "label": "CM7", "chord": "Cmaj7", "octave": 4, "order": 0 }
//!       ]
//!     }
//!   },
//!   "exportedAt": 1700000000
//! }
//! ```
//!
//! Rows and entries without an `order` field are ordered by their position
//! in the document.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chord::ChordSymbol;
use crate::entry::{Entry, EntryContent, EntryId, EntryKind, Row, RowId};
use crate::error::{ChorderError, Result};
use crate::plan::{validate_tempo, DEFAULT_TEMPO};
use crate::progression::Progression;

const DEFAULT_OCTAVE: i32 = 4;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentOut {
    tempo: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_row: Option<String>,
    rows: Map<String, Value>,
    exported_at: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentIn {
    #[serde(default)]
    tempo: Option<u32>,
    #[serde(default)]
    current_row: Option<String>,
    rows: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<u32>,
    #[serde(default)]
    entries: Vec<EntryDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryDocument {
    id: u64,
    #[serde(default)]
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chord: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    octave: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repeat_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<u32>,
}

impl From<&Entry> for EntryDocument {
    fn from(entry: &Entry) -> Self {
        let (chord, code, octave) = match &entry.content {
            EntryContent::Chord { symbol, octave } => (Some(symbol.to_string()), None, Some(*octave)),
            EntryContent::Code { code } => (None, Some(code.clone()), None),
        };
        Self {
            id: entry.id.0,
            label: entry.label.clone(),
            chord,
            code,
            octave,
            repeat_count: entry.repeat_count,
            order: None,
        }
    }
}

impl EntryDocument {
    fn into_entry(self, row: &Row) -> Result<Entry> {
        let content = match (self.chord, self.code) {
            (Some(chord), None) => {
                EntryContent::chord(ChordSymbol::parse(&chord)?, self.octave.unwrap_or(DEFAULT_OCTAVE))
            }
            (None, Some(code)) => EntryContent::code(code),
            _ => {
                return Err(ChorderError::format(format!(
                    "entry {} must have exactly one of 'chord' or 'code'",
                    self.id
                )));
            }
        };
        if !row.accepts(content.kind()) {
            return Err(ChorderError::format(format!(
                "entry {} is a {} entry inside {} row {}",
                self.id,
                content.kind(),
                row.kind,
                row.id
            )));
        }
        Ok(Entry {
            id: EntryId(self.id),
            row_id: row.id,
            label: self.label,
            content,
            repeat_count: self.repeat_count,
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Serialize the whole progression. Fails when it holds no entries.
pub fn export_json(progression: &Progression) -> Result<String> {
    if progression.is_empty() {
        return Err(ChorderError::validation("There is no data to export"));
    }

    let mut rows = Map::new();
    for (row_order, row) in progression.rows().iter().enumerate() {
        let entries = row
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| EntryDocument {
                order: Some(i as u32),
                ..EntryDocument::from(e)
            })
            .collect();
        let doc = RowDocument {
            name: row.name.clone(),
            kind: row.kind,
            order: Some(row_order as u32),
            entries,
        };
        let value = serde_json::to_value(doc).map_err(|e| ChorderError::format(e.to_string()))?;
        rows.insert(row.id.to_string(), value);
    }

    let document = DocumentOut {
        tempo: progression.tempo(),
        current_row: progression.current_row().map(|r| r.to_string()),
        rows,
        exported_at: unix_now(),
    };
    serde_json::to_string_pretty(&document).map_err(|e| ChorderError::format(e.to_string()))
}

/// Largest id accepted from a document (the integer range a JSON number
/// holds exactly)
pub const MAX_DOCUMENT_ID: u64 = (1 << 53) - 1;

fn check_id(id: u64) -> Result<u64> {
    if id > MAX_DOCUMENT_ID {
        return Err(ChorderError::format(format!("id {id} is out of range")));
    }
    Ok(id)
}

/// Rebuild a progression from an exported document
pub fn import_json(text: &str) -> Result<Progression> {
    import_json_with_tempo(text, DEFAULT_TEMPO)
}

/// Like [`import_json`], but a document without a usable tempo gets
/// `default_tempo` instead of the built-in default
pub fn import_json_with_tempo(text: &str, default_tempo: u32) -> Result<Progression> {
    let document: DocumentIn =
        serde_json::from_str(text).map_err(|e| ChorderError::format(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(document.rows.len());

    for (position, (key, value)) in document.rows.into_iter().enumerate() {
        let id: u64 = key
            .parse()
            .map_err(|_| ChorderError::format(format!("row key '{key}' is not a row id")))?;
        let id = check_id(id)?;
        let row_doc: RowDocument = serde_json::from_value(value)
            .map_err(|e| ChorderError::format(format!("row {key}: {e}")))?;
        if !seen.insert(id) {
            return Err(ChorderError::format(format!("duplicate id {id}")));
        }

        let mut row = Row::new(RowId(id), row_doc.kind);
        row.name = row_doc.name;

        let mut entries = Vec::with_capacity(row_doc.entries.len());
        for (entry_position, entry_doc) in row_doc.entries.into_iter().enumerate() {
            if !seen.insert(check_id(entry_doc.id)?) {
                return Err(ChorderError::format(format!("duplicate id {}", entry_doc.id)));
            }
            let order = entry_doc.order.unwrap_or(entry_position as u32);
            entries.push((order, entry_doc.into_entry(&row)?));
        }
        entries.sort_by_key(|(order, _)| *order);
        row.entries = entries.into_iter().map(|(_, e)| e).collect();

        rows.push((row_doc.order.unwrap_or(position as u32), row));
    }
    rows.sort_by_key(|(order, _)| *order);
    let rows: Vec<Row> = rows.into_iter().map(|(_, r)| r).collect();

    let current_row = document
        .current_row
        .and_then(|key| key.parse().ok())
        .map(RowId)
        .filter(|id| rows.iter().any(|r| r.id == *id))
        .or_else(|| rows.first().map(|r| r.id));

    let tempo = document
        .tempo
        .filter(|t| validate_tempo(*t).is_ok())
        .unwrap_or(default_tempo);
    Progression::from_parts(rows, current_row, tempo)
}
