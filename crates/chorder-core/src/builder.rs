//! Chord builder: turns panel-style selections into a chord entry

use serde::{Deserialize, Serialize};

use crate::chord::{ChordQuality, ChordSymbol, PitchClass, Tension};
use crate::entry::{EntryContent, RowId};
use crate::error::{ChorderError, Result};
use crate::progression::Progression;

/// Short quality tags offered by the picker, in display order
pub const QUALITY_TAGS: [&str; 7] = ["M", "m", "dim", "aug", "7", "M7", "m7"];

const DEFAULT_OCTAVE: i32 = 4;

/// Quality for a short picker tag (`M`, `m7`, ...). Tags are case-sensitive.
pub fn quality_from_tag(tag: &str) -> Option<ChordQuality> {
    let quality = match tag {
        "M" => ChordQuality::Major,
        "m" => ChordQuality::Minor,
        "dim" => ChordQuality::Diminished,
        "aug" => ChordQuality::Augmented,
        "7" => ChordQuality::Dominant7,
        "M7" => ChordQuality::Major7,
        "m7" => ChordQuality::Minor7,
        _ => return None,
    };
    Some(quality)
}

fn short_tag(quality: ChordQuality) -> &'static str {
    match quality {
        ChordQuality::Major => "M",
        ChordQuality::Minor => "m",
        ChordQuality::Diminished => "dim",
        ChordQuality::Augmented => "aug",
        ChordQuality::Dominant7 => "7",
        ChordQuality::Major7 => "M7",
        ChordQuality::Minor7 => "m7",
    }
}

fn long_spelling(quality: ChordQuality) -> &'static str {
    match quality {
        ChordQuality::Major => "maj",
        other => other.suffix(),
    }
}

/// A chord built from a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltChord {
    /// Display label, short tag spelling (`CM7add9/E`)
    pub label: String,
    /// Playable chord text, long spelling (`Cmaj7add9/E`)
    pub text: String,
    pub symbol: ChordSymbol,
    pub octave: i32,
}

impl BuiltChord {
    pub fn content(&self) -> EntryContent {
        EntryContent::chord(self.symbol.clone(), self.octave)
    }
}

/// Current picker state: scale, quality, tensions and fraction bass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordSelection {
    pub scale: Option<PitchClass>,
    pub quality: Option<ChordQuality>,
    pub tensions: Vec<Tension>,
    pub fraction: Option<PitchClass>,
    pub octave: i32,
}

impl Default for ChordSelection {
    fn default() -> Self {
        Self {
            scale: None,
            quality: None,
            tensions: Vec::new(),
            fraction: None,
            octave: DEFAULT_OCTAVE,
        }
    }
}

impl ChordSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(mut self, scale: PitchClass) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_quality(mut self, quality: ChordQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_fraction(mut self, bass: Option<PitchClass>) -> Self {
        self.fraction = bass;
        self
    }

    pub fn with_octave(mut self, octave: i32) -> Self {
        self.octave = octave;
        self
    }

    /// Select a tension, or deselect it when already selected.
    /// Selection order is kept.
    pub fn toggle_tension(&mut self, tension: Tension) {
        if let Some(i) = self.tensions.iter().position(|t| *t == tension) {
            self.tensions.remove(i);
        } else {
            self.tensions.push(tension);
        }
    }

    /// Selecting the current fraction again clears it
    pub fn toggle_fraction(&mut self, bass: PitchClass) {
        self.fraction = if self.fraction == Some(bass) { None } else { Some(bass) };
    }

    pub fn build(&self) -> Result<BuiltChord> {
        let (Some(scale), Some(quality)) = (self.scale, self.quality) else {
            return Err(ChorderError::validation("Scale and intervals have to be selected"));
        };

        let mut tail = String::new();
        for tension in &self.tensions {
            tail.push_str("add");
            tail.push_str(tension.token());
        }
        if let Some(bass) = self.fraction {
            tail.push('/');
            tail.push_str(bass.name());
        }

        Ok(BuiltChord {
            label: format!("{scale}{}{tail}", short_tag(quality)),
            text: format!("{scale}{}{tail}", long_spelling(quality)),
            symbol: ChordSymbol::new(scale, quality, self.tensions.clone(), self.fraction),
            octave: self.octave,
        })
    }

    /// Build and append to `row`
    pub fn add_to(&self, progression: &Progression, row: RowId) -> Result<Progression> {
        let built = self.build()?;
        progression.add_entry(row, built.label.clone(), built.content())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc(name: &str) -> PitchClass {
        PitchClass::from_name(name).unwrap()
    }

    #[test]
    fn test_build_label_and_text() {
        let mut selection = ChordSelection::new()
            .with_scale(pc("C"))
            .with_quality(ChordQuality::Major7)
            .with_fraction(Some(pc("E")));
        selection.toggle_tension(Tension::Nine);

        let built = selection.build().unwrap();
        assert_eq!(built.label, "CM7add9/E");
        assert_eq!(built.text, "Cmaj7add9/E");
        assert_eq!(ChordSymbol::parse(&built.text).unwrap(), built.symbol);
    }

    #[test]
    fn test_major_spelling_parses_as_major() {
        let built = ChordSelection::new()
            .with_scale(pc("A#"))
            .with_quality(ChordQuality::Major)
            .build()
            .unwrap();
        assert_eq!(built.label, "A#M");
        assert_eq!(built.text, "A#maj");
        assert_eq!(ChordSymbol::parse(&built.text).unwrap().quality(), ChordQuality::Major);
    }

    #[test]
    fn test_tensions_joined_with_add() {
        let mut selection = ChordSelection::new().with_scale(pc("G")).with_quality(ChordQuality::Dominant7);
        selection.toggle_tension(Tension::Flat9);
        selection.toggle_tension(Tension::Flat13);
        selection.toggle_tension(Tension::Sharp11);
        selection.toggle_tension(Tension::Flat13);
        assert_eq!(selection.build().unwrap().text, "G7addb9add#11");
    }

    #[test]
    fn test_toggle_fraction() {
        let mut selection = ChordSelection::new();
        selection.toggle_fraction(pc("D"));
        assert_eq!(selection.fraction, Some(pc("D")));
        selection.toggle_fraction(pc("D"));
        assert_eq!(selection.fraction, None);
    }

    #[test]
    fn test_missing_selection() {
        let only_scale = ChordSelection::new().with_scale(pc("C"));
        let only_quality = ChordSelection::new().with_quality(ChordQuality::Minor);
        for selection in [only_scale, only_quality] {
            match selection.build() {
                Err(ChorderError::Validation(msg)) => {
                    assert_eq!(msg, "Scale and intervals have to be selected")
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_quality_tags() {
        for tag in QUALITY_TAGS {
            let quality = quality_from_tag(tag).unwrap();
            assert_eq!(short_tag(quality), tag);
        }
        assert_eq!(quality_from_tag("maj7"), None);
    }

    #[test]
    fn test_add_to_row() {
        let p = Progression::default();
        let row = p.rows()[0].id;
        let p = ChordSelection::new()
            .with_scale(pc("D"))
            .with_quality(ChordQuality::Minor7)
            .with_octave(3)
            .add_to(&p, row)
            .unwrap();
        let entry = &p.get_row(row).unwrap().entries[0];
        assert_eq!(entry.label, "Dm7");
        assert_eq!(entry.note_set(0).unwrap().names(), vec!["D3", "F3", "A3", "C4"]);
    }
}
