// Diatonic chord progressions from a fixed transition matrix.
//
// Six functional triads of the major key (I, V, IV, vi, iii, ii) are linked
// by percentage weights. A progression starts on the tonic, walks the matrix
// until it returns to the tonic, and is cut off (with a forced final tonic)
// after ten chords. In Markov mode the composer pulls chords from here one
// at a time and voices them in the harmony tracks.

use crate::key::Key;
use fractune_prng::ScoreRng;
use log::debug;
use std::fmt;

/// Longest progression before the tonic is forced.
pub const MAX_PROGRESSION: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordDegree {
    I,
    V,
    IV,
    Vi,
    Iii,
    Ii,
}

impl ChordDegree {
    /// Matrix order.
    pub const ALL: [ChordDegree; 6] = [
        ChordDegree::I,
        ChordDegree::V,
        ChordDegree::IV,
        ChordDegree::Vi,
        ChordDegree::Iii,
        ChordDegree::Ii,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// 0-based scale degree of the chord root.
    pub fn root_degree(self) -> usize {
        match self {
            ChordDegree::I => 0,
            ChordDegree::Ii => 1,
            ChordDegree::Iii => 2,
            ChordDegree::IV => 3,
            ChordDegree::V => 4,
            ChordDegree::Vi => 5,
        }
    }

    pub fn numeral(self) -> &'static str {
        match self {
            ChordDegree::I => "I",
            ChordDegree::V => "V",
            ChordDegree::IV => "IV",
            ChordDegree::Vi => "vi",
            ChordDegree::Iii => "iii",
            ChordDegree::Ii => "ii",
        }
    }

    /// Root, third and fifth pitch classes of the triad in `key`.
    pub fn triad(self, key: Key) -> [u8; 3] {
        let root = self.root_degree();
        [
            key.degree_pitch_class(root),
            key.degree_pitch_class(root + 2),
            key.degree_pitch_class(root + 4),
        ]
    }

    /// Transition weights (percent) out of this chord, in matrix order.
    pub fn transitions(self) -> &'static [f64; 6] {
        &TRANSITIONS[self.index()]
    }
}

impl fmt::Display for ChordDegree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.numeral())
    }
}

/// Rows and columns: I, V, IV, vi, iii, ii. Each row sums to 100.
const TRANSITIONS: [[f64; 6]; 6] = [
    [0.0, 35.0, 30.0, 20.0, 5.0, 10.0],
    [55.0, 0.0, 5.0, 30.0, 5.0, 5.0],
    [30.0, 40.0, 0.0, 5.0, 5.0, 20.0],
    [10.0, 15.0, 30.0, 0.0, 10.0, 35.0],
    [5.0, 10.0, 25.0, 50.0, 0.0, 10.0],
    [10.0, 70.0, 10.0, 5.0, 5.0, 0.0],
];

/// Streams chords from successive sampled progressions.
#[derive(Debug, Clone, Default)]
pub struct ChordProgressionSampler {
    progression: Vec<ChordDegree>,
    position: usize,
}

impl ChordProgressionSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample one progression: I, then matrix steps until I comes back or
    /// `MAX_PROGRESSION` chords have been drawn.
    pub fn sample(rng: &mut ScoreRng) -> Vec<ChordDegree> {
        let mut progression = vec![ChordDegree::I];
        let mut current = ChordDegree::I;
        loop {
            if progression.len() >= MAX_PROGRESSION {
                progression.push(ChordDegree::I);
                break;
            }
            let next = rng
                .choose_weighted(current.transitions())
                .map_or(ChordDegree::I, |i| ChordDegree::ALL[i]);
            progression.push(next);
            if next == ChordDegree::I {
                break;
            }
            current = next;
        }
        progression
    }

    /// The progression currently being played.
    pub fn progression(&self) -> &[ChordDegree] {
        &self.progression
    }

    /// Next chord, starting a fresh progression when the current one is
    /// used up.
    pub fn next_chord(&mut self, rng: &mut ScoreRng) -> ChordDegree {
        if self.position >= self.progression.len() {
            self.progression = Self::sample(rng);
            self.position = 0;
            let numerals: Vec<&str> = self.progression.iter().map(|c| c.numeral()).collect();
            debug!("chord progression: {}", numerals.join(" "));
        }
        let chord = self.progression[self.position];
        self.position += 1;
        chord
    }
}
