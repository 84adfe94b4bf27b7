//! Progression store: the ordered rows of an editing session
//!
//! Every operation takes `&self` and returns a fresh [`Progression`]; the
//! receiver is never modified, so earlier snapshots stay valid for undo or
//! comparison.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::{Entry, EntryContent, EntryId, EntryKind, Row, RowId};
use crate::error::{ChorderError, Result};
use crate::plan::DEFAULT_TEMPO;

/// Insertion point inside an ordered list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor<T> {
    /// Synthetic "before-first" marker
    Start,
    /// Immediately after the given item
    After(T),
}

/// Aggregate root of the editor state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    rows: Vec<Row>,
    current_row: Option<RowId>,
    tempo: u32,
    next_id: u64,
}

impl Default for Progression {
    fn default() -> Self {
        Self::new(EntryKind::Chord)
    }
}

impl Progression {
    /// A progression with exactly one empty row, selected as current
    pub fn new(kind: EntryKind) -> Self {
        let row = Row::new(RowId(1), kind);
        Self {
            current_row: Some(row.id),
            rows: vec![row],
            tempo: DEFAULT_TEMPO,
            next_id: 2,
        }
    }

    /// Assemble a progression from already-validated parts (used by import)
    pub(crate) fn from_parts(rows: Vec<Row>, current_row: Option<RowId>, tempo: u32) -> Result<Self> {
        let max_id = rows
            .iter()
            .flat_map(|r| std::iter::once(r.id.0).chain(r.entries.iter().map(|e| e.id.0)))
            .max()
            .unwrap_or(0);
        let next_id = max_id
            .checked_add(1)
            .ok_or_else(|| ChorderError::format(format!("id {max_id} leaves no room for new ids")))?;
        Ok(Self {
            rows,
            current_row,
            tempo,
            next_id,
        })
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get_row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    fn get_row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| r.id == id)
    }

    fn row_index(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    /// Find an entry anywhere in the progression
    pub fn find_entry(&self, entry_id: EntryId) -> Option<&Entry> {
        self.rows.iter().find_map(|r| r.get_entry(entry_id))
    }

    pub fn current_row(&self) -> Option<RowId> {
        self.current_row
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn entry_count(&self) -> usize {
        self.rows.iter().map(|r| r.entries.len()).sum()
    }

    /// True when no row holds any entry
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    // ------------------------------------------------------------------
    // Row operations
    // ------------------------------------------------------------------

    /// Insert an empty row at the front. Current row is unchanged.
    pub fn add_row(&self, kind: EntryKind) -> Progression {
        let mut next = self.clone();
        let id = RowId(next.alloc_id());
        next.rows.insert(0, Row::new(id, kind));
        debug!(row = %id, "added row");
        next
    }

    /// Delete a row and all of its entries
    pub fn delete_row(&self, row_id: RowId) -> Progression {
        let mut next = self.clone();
        next.rows.retain(|r| r.id != row_id);
        if next.current_row == Some(row_id) {
            next.current_row = None;
        }
        next
    }

    /// Deep-copy a row under fresh identifiers, placed right after the original
    pub fn duplicate_row(&self, row_id: RowId) -> Progression {
        let Some(index) = self.row_index(row_id) else {
            return self.clone();
        };
        let mut next = self.clone();
        let mut copy = next.rows[index].clone();
        copy.id = RowId(next.alloc_id());
        for entry in &mut copy.entries {
            entry.id = EntryId(next.alloc_id());
            entry.row_id = copy.id;
        }
        debug!(from = %row_id, to = %copy.id, "duplicated row");
        next.rows.insert(index + 1, copy);
        next
    }

    pub fn rename_row(&self, row_id: RowId, name: impl Into<String>) -> Progression {
        let mut next = self.clone();
        if let Some(row) = next.get_row_mut(row_id) {
            row.name = name.into();
        }
        next
    }

    /// Reorder rows: `row_id` moves to `anchor`
    pub fn move_row(&self, row_id: RowId, anchor: Anchor<RowId>) -> Progression {
        if anchor == Anchor::After(row_id) {
            return self.clone();
        }
        let Some(index) = self.row_index(row_id) else {
            return self.clone();
        };
        let mut next = self.clone();
        let row = next.rows.remove(index);
        let insert_at = match anchor {
            Anchor::Start => 0,
            Anchor::After(target) => match next.row_index(target) {
                Some(i) => i + 1,
                None => return self.clone(),
            },
        };
        next.rows.insert(insert_at, row);
        next
    }

    /// Make `row_id` the default insertion/playback target
    pub fn select_row(&self, row_id: RowId) -> Progression {
        let mut next = self.clone();
        if next.get_row(row_id).is_some() {
            next.current_row = Some(row_id);
        }
        next
    }

    pub fn set_tempo(&self, tempo: u32) -> Progression {
        let mut next = self.clone();
        next.tempo = tempo;
        next
    }

    // ------------------------------------------------------------------
    // Entry operations
    // ------------------------------------------------------------------

    /// Append an entry to a row.
    ///
    /// Fails with a validation error when the row does not exist or does not
    /// accept this kind of content; the receiver is left as it was.
    pub fn add_entry(
        &self,
        row_id: RowId,
        label: impl Into<String>,
        content: EntryContent,
    ) -> Result<Progression> {
        let mut next = self.clone();
        let id = EntryId(next.alloc_id());
        let row = next
            .get_row_mut(row_id)
            .ok_or_else(|| ChorderError::validation("A row has to be selected"))?;
        if !row.accepts(content.kind()) {
            return Err(ChorderError::validation(format!(
                "A {} row cannot hold {} entries",
                row.kind,
                content.kind()
            )));
        }
        row.entries.push(Entry {
            id,
            row_id,
            label: label.into(),
            content,
            repeat_count: None,
        });
        Ok(next)
    }

    pub fn remove_entry(&self, row_id: RowId, entry_id: EntryId) -> Progression {
        let mut next = self.clone();
        if let Some(row) = next.get_row_mut(row_id) {
            row.entries.retain(|e| e.id != entry_id);
        }
        next
    }

    /// Move an entry into `to_row`, right after `anchor`.
    ///
    /// A no-op (returns an identical progression) when the entry or rows are
    /// unknown, or when the destination row does not accept the entry's kind.
    pub fn move_entry(
        &self,
        entry_id: EntryId,
        from_row: RowId,
        to_row: RowId,
        anchor: Anchor<EntryId>,
    ) -> Progression {
        if anchor == Anchor::After(entry_id) {
            return self.clone();
        }
        let Some(entry) = self.get_row(from_row).and_then(|r| r.get_entry(entry_id)) else {
            debug!(entry = %entry_id, row = %from_row, "move ignored: entry not in source row");
            return self.clone();
        };
        let Some(target) = self.get_row(to_row) else {
            return self.clone();
        };
        if !target.accepts(entry.kind()) {
            debug!(entry = %entry_id, row = %to_row, "move ignored: row does not accept entry");
            return self.clone();
        }

        let mut next = self.clone();
        let mut moved = entry.clone();
        moved.row_id = to_row;
        if let Some(source) = next.get_row_mut(from_row) {
            source.entries.retain(|e| e.id != entry_id);
        }
        if let Some(dest) = next.get_row_mut(to_row) {
            let insert_at = match anchor {
                Anchor::Start => 0,
                Anchor::After(after) => dest.position(after).map(|i| i + 1).unwrap_or(0),
            };
            dest.entries.insert(insert_at, moved);
        }
        next
    }

    fn edit_entry(&self, row_id: RowId, entry_id: EntryId, edit: impl FnOnce(&mut Entry)) -> Progression {
        let mut next = self.clone();
        if let Some(entry) = next.get_row_mut(row_id).and_then(|r| r.get_entry_mut(entry_id)) {
            edit(entry);
        }
        next
    }

    pub fn rename_entry(&self, row_id: RowId, entry_id: EntryId, label: impl Into<String>) -> Progression {
        let label = label.into();
        self.edit_entry(row_id, entry_id, |e| e.label = label)
    }

    /// Change the octave of a chord entry; code entries are left alone
    pub fn set_entry_octave(&self, row_id: RowId, entry_id: EntryId, octave: i32) -> Progression {
        self.edit_entry(row_id, entry_id, |e| {
            if let EntryContent::Chord { octave: o, .. } = &mut e.content {
                *o = octave;
            }
        })
    }

    pub fn set_repeat_count(&self, row_id: RowId, entry_id: EntryId, repeat: Option<u32>) -> Progression {
        self.edit_entry(row_id, entry_id, |e| e.repeat_count = repeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordSymbol;

    fn chord(label: &str) -> EntryContent {
        EntryContent::chord(ChordSymbol::parse(label).unwrap(), 4)
    }

    /// Two chord rows: first [C, F, G], second [Am]
    fn sample() -> (Progression, RowId, RowId) {
        let p = Progression::default();
        let first = p.rows()[0].id;
        let p = p.add_row(EntryKind::Chord);
        let second = p.rows()[0].id;
        let p = p
            .add_entry(first, "C", chord("C")).unwrap()
            .add_entry(first, "F", chord("F")).unwrap()
            .add_entry(first, "G", chord("G")).unwrap()
            .add_entry(second, "Am", chord("Am")).unwrap();
        (p, first, second)
    }

    fn ids(p: &Progression, row: RowId) -> Vec<EntryId> {
        p.get_row(row).unwrap().entries.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_new_has_one_selected_row() {
        let p = Progression::default();
        assert_eq!(p.rows().len(), 1);
        assert_eq!(p.current_row(), Some(p.rows()[0].id));
        assert_eq!(p.tempo(), DEFAULT_TEMPO);
    }

    #[test]
    fn test_add_row_inserts_at_front_keeps_selection() {
        let p = Progression::default();
        let original = p.rows()[0].id;
        let next = p.add_row(EntryKind::Chord);
        assert_eq!(next.rows().len(), 2);
        assert_eq!(next.rows()[1].id, original);
        assert_eq!(next.current_row(), Some(original));
        // snapshot untouched
        assert_eq!(p.rows().len(), 1);
    }

    #[test]
    fn test_add_entry_validation() {
        let p = Progression::default();
        let row = p.rows()[0].id;
        assert!(matches!(
            p.add_entry(RowId(99), "C", chord("C")),
            Err(ChorderError::Validation(_))
        ));
        assert!(matches!(
            p.add_entry(row, "s(\"bd\")", EntryContent::code("s(\"bd\")")),
            Err(ChorderError::Validation(_))
        ));
        let next = p.add_entry(row, "C", chord("C")).unwrap();
        let entry = &next.get_row(row).unwrap().entries[0];
        assert_eq!(entry.row_id, row);
        assert_eq!(entry.label, "C");
    }

    #[test]
    fn test_ids_are_never_reused() {
        let (p, first, _) = sample();
        let last = *ids(&p, first).last().unwrap();
        let p = p.remove_entry(first, last);
        let p = p.add_entry(first, "D", chord("D")).unwrap();
        assert_ne!(*ids(&p, first).last().unwrap(), last);
    }

    #[test]
    fn test_move_entry_across_rows() {
        let (p, first, second) = sample();
        let row = ids(&p, first);
        let (c, f, g) = (row[0], row[1], row[2]);
        let am = ids(&p, second)[0];

        let moved = p.move_entry(f, first, second, Anchor::After(am));
        assert_eq!(ids(&moved, first), vec![c, g]);
        assert_eq!(ids(&moved, second), vec![am, f]);
        assert_eq!(moved.find_entry(f).unwrap().row_id, second);
        assert_eq!(moved.entry_count(), p.entry_count());

        let to_front = p.move_entry(g, first, second, Anchor::Start);
        assert_eq!(ids(&to_front, second), vec![g, am]);
    }

    #[test]
    fn test_move_entry_within_row() {
        let (p, first, _) = sample();
        let row = ids(&p, first);
        let (c, f, g) = (row[0], row[1], row[2]);
        let moved = p.move_entry(c, first, first, Anchor::After(g));
        assert_eq!(ids(&moved, first), vec![f, g, c]);
        assert_eq!(p.move_entry(c, first, first, Anchor::After(c)), p);
    }

    #[test]
    fn test_move_entry_type_mismatch_is_noop() {
        let (p, first, _) = sample();
        let p = p.add_row(EntryKind::Code);
        let code_row = p.rows()[0].id;
        let c = ids(&p, first)[0];
        assert_eq!(p.move_entry(c, first, code_row, Anchor::Start), p);
    }

    #[test]
    fn test_move_entry_conserves_count() {
        let (p, first, second) = sample();
        let all: Vec<EntryId> = ids(&p, first).into_iter().chain(ids(&p, second)).collect();
        for &entry in &all {
            let from = p.find_entry(entry).unwrap().row_id;
            for to in [first, second] {
                let moved = p.move_entry(entry, from, to, Anchor::Start);
                assert_eq!(moved.entry_count(), p.entry_count());
                let holders = moved.rows().iter().filter(|r| r.get_entry(entry).is_some()).count();
                assert_eq!(holders, 1);
            }
        }
    }

    #[test]
    fn test_duplicate_row() {
        let (p, first, _) = sample();
        let p = p.rename_row(first, "verse");
        let dup = p.duplicate_row(first);
        let index = dup.rows().iter().position(|r| r.id == first).unwrap();
        let copy = &dup.rows()[index + 1];
        assert_ne!(copy.id, first);
        assert_eq!(copy.name, "verse");
        assert_eq!(copy.labels(), vec!["C", "F", "G"]);
        assert!(copy.entries.iter().all(|e| e.row_id == copy.id));
        assert!(copy.entries.iter().all(|e| p.find_entry(e.id).is_none()));
        assert_eq!(dup.get_row(first), p.get_row(first));
    }

    #[test]
    fn test_delete_row_cascades() {
        let (p, first, _) = sample();
        let gone = ids(&p, first);
        let p = p.delete_row(first);
        assert!(p.get_row(first).is_none());
        assert!(gone.iter().all(|&e| p.find_entry(e).is_none()));
        assert_eq!(p.current_row(), None);
    }

    #[test]
    fn test_move_row() {
        let (p, first, second) = sample();
        assert_eq!(p.rows()[0].id, second);
        let moved = p.move_row(second, Anchor::After(first));
        assert_eq!(moved.rows()[0].id, first);
        assert_eq!(moved.rows()[1].id, second);
        let back = moved.move_row(second, Anchor::Start);
        assert_eq!(back.rows()[0].id, second);
    }

    #[test]
    fn test_entry_edits() {
        let (p, first, _) = sample();
        let c = ids(&p, first)[0];
        let p = p
            .rename_entry(first, c, "C major")
            .set_entry_octave(first, c, 3)
            .set_repeat_count(first, c, Some(2));
        let entry = p.find_entry(c).unwrap();
        assert_eq!(entry.label, "C major");
        assert_eq!(entry.repeat_count, Some(2));
        assert_eq!(entry.note_set(0).unwrap().names(), vec!["C3", "E3", "G3"]);
    }
}
