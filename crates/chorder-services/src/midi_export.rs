//! Standard MIDI file export of a chord row

use chorder_core::{validate_tempo, ChorderError, Row};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use tracing::info;

pub const TICKS_PER_BEAT: u16 = 480;
const VELOCITY: u8 = 64;

/// An encoded `.mid` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiFile {
    /// Entry labels joined with `-`
    pub track_name: String,
    pub bytes: Vec<u8>,
}

impl MidiFile {
    pub fn file_name(&self) -> String {
        format!("{}.mid", self.track_name)
    }
}

/// One track, each chord entry held for a quarter note, in row order.
/// Code entries carry no notes and are skipped.
pub fn export_row(row: &Row, tempo: u32) -> Result<MidiFile, ChorderError> {
    validate_tempo(tempo)?;

    let chords: Vec<_> = row
        .entries
        .iter()
        .filter_map(|entry| entry.note_set(0).map(|notes| (entry.label.as_str(), notes)))
        .collect();
    if chords.is_empty() {
        return Err(ChorderError::validation("At least one chord has to be added to export."));
    }

    let track_name = chords.iter().map(|(label, _)| *label).collect::<Vec<_>>().join("-");
    let channel = u4::new(0);
    let quarter = u32::from(TICKS_PER_BEAT);

    let mut track = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(track_name.as_bytes())),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(60_000_000 / tempo))),
        },
    ];

    for (_, notes) in &chords {
        let keys = notes.midi_notes();
        for key in &keys {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(*key),
                        vel: u7::new(VELOCITY),
                    },
                },
            });
        }
        // the first note-off carries the whole quarter note
        for (i, key) in keys.iter().enumerate() {
            track.push(TrackEvent {
                delta: u28::new(if i == 0 { quarter } else { 0 }),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(*key),
                        vel: u7::new(0),
                    },
                },
            });
        }
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::new(TICKS_PER_BEAT)),
        },
        tracks: vec![track],
    };
    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| ChorderError::format(format!("MIDI encoding failed: {e:?}")))?;
    drop(smf);

    info!(track = %track_name, chords = chords.len(), tempo, "Exported MIDI");
    Ok(MidiFile { track_name, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorder_core::{ChordSymbol, EntryContent, EntryKind, Progression};

    fn row(labels: &[&str]) -> Row {
        let p = Progression::default();
        let id = p.rows()[0].id;
        let p = labels.iter().fold(p, |p, label| {
            p.add_entry(id, *label, EntryContent::chord(ChordSymbol::parse(label).unwrap(), 4))
                .unwrap()
        });
        p.get_row(id).unwrap().clone()
    }

    #[test]
    fn test_export_structure() {
        let file = export_row(&row(&["C", "Am7"]), 90).unwrap();
        assert_eq!(file.track_name, "C-Am7");
        assert_eq!(file.file_name(), "C-Am7.mid");

        let smf = Smf::parse(&file.bytes).unwrap();
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        assert_eq!(smf.tracks.len(), 1);

        let track = &smf.tracks[0];
        assert!(track.iter().any(|e| e.kind == TrackEventKind::Meta(MetaMessage::Tempo(u24::new(666_666)))));
        assert!(track.iter().any(|e| e.kind == TrackEventKind::Meta(MetaMessage::TrackName(b"C-Am7"))));

        let ons: Vec<u8> = track
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { key, .. }, .. } => Some(key.as_int()),
                _ => None,
            })
            .collect();
        // C4 E4 G4, then A4 C5 E5 G5
        assert_eq!(ons, vec![60, 64, 67, 69, 72, 76, 79]);

        let total_ticks: u32 = track.iter().map(|e| e.delta.as_int()).sum();
        assert_eq!(total_ticks, 2 * 480);
    }

    #[test]
    fn test_export_validation() {
        assert!(matches!(export_row(&row(&[]), 120), Err(ChorderError::Validation(_))));
        assert!(matches!(export_row(&row(&["C"]), 0), Err(ChorderError::Validation(_))));
        assert!(matches!(export_row(&row(&["C"]), 301), Err(ChorderError::Validation(_))));

        let p = Progression::new(EntryKind::Code);
        let id = p.rows()[0].id;
        let p = p.add_entry(id, "beat", EntryContent::code("s(\"bd\")")).unwrap();
        assert!(matches!(export_row(p.get_row(id).unwrap(), 120), Err(ChorderError::Validation(_))));
    }
}
