// Key signatures and major-scale helpers.
//
// The composer works in one of twelve major keys, numbered 1-12 around the
// circle of fifths (C, G, D, A, E, B, Gb/F#, Db, Ab, Eb, Bb, F). Each key has
// a tonic pitch class and a tonic MIDI pitch in the octave starting at C3
// (MIDI 48), which is where the turtle's vertical position starts.
//
// Used by composer.rs (degree stepping, tonic start), corpus.rs (corpus keys
// and transposition) and chords.rs (triad spelling).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semitone offsets of the seven major-scale degrees from the tonic.
pub const MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Pitch class names, sharps and flats both given for black keys.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G", "G#/Ab", "A", "A#/Bb", "B",
];

const KEY_NAMES: [&str; 12] = [
    "C", "G", "D", "A", "E", "B", "Gb/F#", "Db", "Ab", "Eb", "Bb", "F",
];

/// A major key, stored as its position on the circle of fifths (0 = C).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Key(u8);

impl Key {
    pub const C: Key = Key(0);

    /// All twelve keys in circle-of-fifths order.
    pub fn all() -> impl Iterator<Item = Key> {
        (0..12).map(Key)
    }

    /// Key from its 1-based number (1 = C, 2 = G, ... 12 = F).
    pub fn from_number(number: u8) -> Option<Key> {
        (1..=12).contains(&number).then(|| Key(number - 1))
    }

    /// Key whose tonic is the given pitch class.
    pub fn from_tonic(pitch_class: u8) -> Key {
        // Walking fifths: index * 7 = pc (mod 12), and 7 is its own inverse mod 12.
        Key(((pitch_class % 12) * 7) % 12)
    }

    /// Parse a key name such as `"G"`, `"F#"`, `"Gb"`, `"bb"` or a number `"1"`-`"12"`.
    pub fn parse(name: &str) -> Result<Key> {
        let trimmed = name.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return Key::from_number(number).ok_or_else(|| Error::InvalidKey(name.to_string()));
        }
        if let Some(index) = KEY_NAMES.iter().position(|k| k.eq_ignore_ascii_case(trimmed)) {
            return Ok(Key(index as u8));
        }
        match crate::corpus::parse_pitch_class(trimmed) {
            Some(pc) if trimmed.len() <= 2 => Ok(Key::from_tonic(pc)),
            _ => Err(Error::InvalidKey(name.to_string())),
        }
    }

    /// 1-based key number, as shown to users.
    pub fn number(self) -> u8 {
        self.0 + 1
    }

    pub fn name(self) -> &'static str {
        KEY_NAMES[self.0 as usize]
    }

    /// Pitch class (0 = C) of the tonic.
    pub fn tonic_pitch_class(self) -> u8 {
        (self.0 * 7) % 12
    }

    /// MIDI pitch of the tonic in the C3 octave (C → 48, G → 55, F → 53).
    pub fn tonic_midi(self) -> i32 {
        48 + self.tonic_pitch_class() as i32
    }

    /// Pitch class of a 0-based scale degree (0 = tonic .. 6 = leading tone).
    pub fn degree_pitch_class(self, degree: usize) -> u8 {
        (self.tonic_pitch_class() + MAJOR_SCALE[degree % 7]) % 12
    }

    /// 1-based scale degree of a pitch class. Chromatic pitch classes sit
    /// halfway between their diatonic neighbours (e.g. `1.5` for C# in C).
    pub fn scale_degree(self, pitch_class: u8) -> f32 {
        let offset = (pitch_class % 12 + 12 - self.tonic_pitch_class()) % 12;
        match MAJOR_SCALE.iter().position(|&s| s == offset) {
            Some(d) => d as f32 + 1.0,
            // A chromatic offset is always one above a diatonic one.
            None => {
                let below = MAJOR_SCALE
                    .iter()
                    .position(|&s| s == offset - 1)
                    .unwrap_or(0);
                below as f32 + 1.5
            }
        }
    }

    /// Transpose a pitch class from C major into this key.
    pub fn transpose_from_c(self, pitch_class: u8) -> u8 {
        (pitch_class + self.tonic_pitch_class()) % 12
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Key::parse(&value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> String {
        key.name().to_string()
    }
}
