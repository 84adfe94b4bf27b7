//! Chord symbols and their voicings
//!
//! A chord label such as `Dm7add9/C` is parsed into a [`ChordSymbol`] (root,
//! quality, tensions, slash bass) and voiced into a [`NoteSet`] of concrete
//! pitches at a base octave.
//!
//! # Example
//! ```
//! use chorder_core::ChordSymbol;
//!
//! let chord = ChordSymbol::parse("Cmaj7").unwrap();
//! let notes = chord.to_note_set(4, 0);
//! assert_eq!(notes.names(), vec!["C4", "E4", "G4", "B4"]);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChorderError, Result};

// ============================================================================
// Pitch classes
// ============================================================================

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the twelve pitch classes, C = 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PitchClass(u8);

impl PitchClass {
    /// Wraps any semitone count into 0..12
    pub fn new(semitones: i32) -> Self {
        Self(semitones.rem_euclid(12) as u8)
    }

    /// Look up a note name. Sharp and flat spellings are synonyms.
    pub fn from_name(name: &str) -> Option<Self> {
        let value = match name {
            "C" => 0,
            "C#" | "Db" => 1,
            "D" => 2,
            "D#" | "Eb" => 3,
            "E" => 4,
            "F" => 5,
            "F#" | "Gb" => 6,
            "G" => 7,
            "G#" | "Ab" => 8,
            "A" => 9,
            "A#" | "Bb" => 10,
            "B" => 11,
            _ => return None,
        };
        Some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Canonical (sharp) spelling
    pub fn name(self) -> &'static str {
        SHARP_NAMES[self.0 as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Longest prefix made of note-name characters (`A`-`G`, `#`, `b`)
fn leading_note_token(text: &str) -> &str {
    let end = text
        .char_indices()
        .find(|(_, c)| !matches!(c, 'A'..='G' | '#' | 'b'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}

// ============================================================================
// Quality and tensions
// ============================================================================

/// Base chord quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Dominant7,
    Major7,
    Minor7,
}

impl ChordQuality {
    /// Intervals from the root in semitones
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Dominant7 => &[0, 4, 7, 10],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
        }
    }

    /// Suffix written after the root in a canonical label
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Major => "",
            Self::Minor => "m",
            Self::Diminished => "dim",
            Self::Augmented => "aug",
            Self::Dominant7 => "7",
            Self::Major7 => "maj7",
            Self::Minor7 => "m7",
        }
    }

    /// Detect the quality from the text between root and slash bass.
    ///
    /// Matching is case-insensitive and ordered so that longer tokens win:
    /// `maj7` is never read as `m7`, and `maj` is never read as minor.
    pub fn detect(text: &str) -> Self {
        let q = text.to_lowercase();
        if q.contains("dim") {
            Self::Diminished
        } else if q.contains("aug") {
            Self::Augmented
        } else if q.contains("maj7") {
            Self::Major7
        } else if q.contains("m7") {
            Self::Minor7
        } else if q.contains('7') {
            Self::Dominant7
        } else if q.contains('m') && !q.contains("maj") {
            Self::Minor
        } else {
            Self::Major
        }
    }
}

/// Added upper extension, written as `add<token>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tension {
    Flat9,
    Nine,
    Sharp9,
    Eleven,
    Sharp11,
    Flat13,
    Thirteen,
}

impl Tension {
    /// Order in which tokens are tried after an `add`
    const MATCH_ORDER: [Tension; 7] = [
        Self::Flat9,
        Self::Nine,
        Self::Sharp9,
        Self::Eleven,
        Self::Sharp11,
        Self::Flat13,
        Self::Thirteen,
    ];

    /// Interval above the root, folded into a single octave
    pub fn interval(&self) -> u8 {
        match self {
            Self::Nine => 2,
            Self::Flat9 => 1,
            Self::Sharp9 => 3,
            Self::Eleven => 5,
            Self::Sharp11 => 6,
            Self::Thirteen => 9,
            Self::Flat13 => 8,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::Flat9 => "b9",
            Self::Nine => "9",
            Self::Sharp9 => "#9",
            Self::Eleven => "11",
            Self::Sharp11 => "#11",
            Self::Flat13 => "b13",
            Self::Thirteen => "13",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::MATCH_ORDER.into_iter().find(|t| t.token() == token)
    }

    /// Collect every `add<tension>` occurrence, left to right.
    /// An `add` followed by an unknown token is skipped.
    fn scan(text: &str) -> Vec<Tension> {
        let lower = text.to_lowercase();
        let mut found = Vec::new();
        let mut rest = lower.as_str();
        while let Some(pos) = rest.find("add") {
            let after = &rest[pos + 3..];
            match Self::MATCH_ORDER.iter().find(|t| after.starts_with(t.token())) {
                Some(tension) => {
                    found.push(*tension);
                    rest = &after[tension.token().len()..];
                }
                None => rest = after,
            }
        }
        found
    }
}

// ============================================================================
// Chord symbol
// ============================================================================

/// Parsed chord label. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChordSymbol {
    root: PitchClass,
    quality: ChordQuality,
    tensions: Vec<Tension>,
    bass: Option<PitchClass>,
}

impl ChordSymbol {
    pub fn new(
        root: PitchClass,
        quality: ChordQuality,
        tensions: Vec<Tension>,
        bass: Option<PitchClass>,
    ) -> Self {
        Self {
            root,
            quality,
            tensions,
            bass,
        }
    }

    /// Parse a chord label such as `C`, `F#m7`, `Bbmaj7add9`, `Dm7/C`.
    ///
    /// Fails when the label does not start with a known root, or when a
    /// slash bass names an unknown note.
    pub fn parse(label: &str) -> Result<Self> {
        let root_token = leading_note_token(label);
        if root_token.is_empty() {
            return Err(ChorderError::parse(label, "label must start with a root note"));
        }
        let root = PitchClass::from_name(root_token)
            .ok_or_else(|| ChorderError::parse(label, format!("unknown root note '{root_token}'")))?;

        let rest = &label[root_token.len()..];
        let mut quality_text = rest.to_string();
        let mut bass = None;

        if let Some(slash) = rest.find('/') {
            let after = &rest[slash + 1..];
            let bass_token = leading_note_token(after);
            if !bass_token.is_empty() {
                let note = PitchClass::from_name(bass_token).ok_or_else(|| {
                    ChorderError::parse(label, format!("unknown bass note '{bass_token}'"))
                })?;
                bass = Some(note);
                quality_text = format!("{}{}", &rest[..slash], &after[bass_token.len()..]);
            }
        }

        Ok(Self {
            root,
            quality: ChordQuality::detect(&quality_text),
            tensions: Tension::scan(&quality_text),
            bass,
        })
    }

    pub fn root(&self) -> PitchClass {
        self.root
    }

    pub fn quality(&self) -> ChordQuality {
        self.quality
    }

    pub fn tensions(&self) -> &[Tension] {
        &self.tensions
    }

    pub fn bass(&self) -> Option<PitchClass> {
        self.bass
    }

    /// Base intervals followed by tension intervals
    pub fn intervals(&self) -> Vec<u8> {
        self.quality
            .intervals()
            .iter()
            .copied()
            .chain(self.tensions.iter().map(|t| t.interval()))
            .collect()
    }

    /// Voice the chord at `base_octave`, transposed by `transpose` semitones.
    ///
    /// The root always sits at `base_octave`; other chord tones never sound
    /// below it. A slash bass is appended last, one octave below the base.
    pub fn to_note_set(&self, base_octave: i32, transpose: i32) -> NoteSet {
        let root = self.root.value() as i32;
        let mut notes: Vec<Note> = self
            .intervals()
            .into_iter()
            .enumerate()
            .map(|(index, interval)| {
                let absolute = root + interval as i32;
                let octave = if index == 0 {
                    base_octave
                } else {
                    base_octave.saturating_add(absolute.div_euclid(12)).max(base_octave)
                };
                Note::new(PitchClass::new(absolute + transpose.rem_euclid(12)), octave)
            })
            .collect();

        if let Some(bass) = self.bass {
            notes.push(Note::new(bass, base_octave.saturating_sub(1)));
        }

        NoteSet(notes)
    }
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.quality.suffix())?;
        for tension in &self.tensions {
            write!(f, "add{}", tension.token())?;
        }
        if let Some(bass) = self.bass {
            write!(f, "/{bass}")?;
        }
        Ok(())
    }
}

impl FromStr for ChordSymbol {
    type Err = ChorderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChordSymbol {
    type Error = ChorderError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ChordSymbol> for String {
    fn from(chord: ChordSymbol) -> Self {
        chord.to_string()
    }
}

// ============================================================================
// Notes
// ============================================================================

/// A pitch class at a concrete octave (scientific pitch notation, C4 = MIDI 60)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl Note {
    pub fn new(pitch_class: PitchClass, octave: i32) -> Self {
        Self { pitch_class, octave }
    }

    /// MIDI note number, clamped to 0..=127
    pub fn midi(&self) -> u8 {
        let value = self
            .octave
            .saturating_add(1)
            .saturating_mul(12)
            .saturating_add(self.pitch_class.value() as i32);
        value.clamp(0, 127) as u8
    }

    /// Frequency in Hz (A4 = 440)
    pub fn frequency(&self) -> f32 {
        440.0 * 2f32.powf((self.midi() as f32 - 69.0) / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

/// Ordered notes of a voiced chord
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSet(Vec<Note>);

impl NoteSet {
    pub fn notes(&self) -> &[Note] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|n| n.to_string()).collect()
    }

    pub fn midi_notes(&self) -> Vec<u8> {
        self.0.iter().map(|n| n.midi()).collect()
    }
}

impl fmt::Display for NoteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" "))
    }
}
