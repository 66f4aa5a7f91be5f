// Pitch-class Markov model trained from a melody corpus.
//
// A corpus is a set of melodies keyed by major key, each melody written as
// whitespace-separated note names ("C D E F D E C", octave digits and
// duration letters after the name are ignored). Training counts how often
// each pitch class follows the previous one (order 1) and the previous two
// (order 2), then normalises every row so it sums to one. Rows never seen in
// training stay all-zero; sampling from such a row yields `None`, which the
// composer treats as "no preference" and holds its previous pitch.
//
// When the corpus has no melodies for the requested key, the C-major
// melodies are transposed into it, so a single-key corpus serves all twelve.

use crate::error::Result;
use crate::key::Key;
use fractune_prng::ScoreRng;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Order-1 table: `[current][next]`.
pub type Table1 = [[f64; 12]; 12];
/// Order-2 table: `[previous][current][next]`.
pub type Table2 = [[[f64; 12]; 12]; 12];

/// Parse the pitch class at the start of a note token.
///
/// Accepts a letter A-G (either case) and an optional `#` or `b`; anything
/// after that is ignored. Rests (`R...`) and unparseable tokens give `None`.
pub fn parse_pitch_class(token: &str) -> Option<u8> {
    let mut chars = token.chars();
    let natural: i8 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let shift = match chars.next() {
        Some('#') => 1,
        Some('b') => -1,
        _ => 0,
    };
    Some((natural + shift).rem_euclid(12) as u8)
}

/// One melody as a sequence of pitch classes. Rests are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Melody {
    pub pitch_classes: Vec<u8>,
}

impl Melody {
    pub fn parse(text: &str) -> Melody {
        Melody {
            pitch_classes: text.split_whitespace().filter_map(parse_pitch_class).collect(),
        }
    }

    /// Shift every note up by `semitones`, wrapping within the octave.
    pub fn transposed(&self, semitones: u8) -> Melody {
        Melody {
            pitch_classes: self
                .pitch_classes
                .iter()
                .map(|pc| (pc + semitones) % 12)
                .collect(),
        }
    }
}

/// Melodies grouped by key, as stored in corpus files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub melodies: BTreeMap<Key, Vec<String>>,
}

impl Corpus {
    /// Load a corpus from a JSON file.
    pub fn load(path: &Path) -> Result<Corpus> {
        let data = std::fs::read_to_string(path)?;
        Corpus::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Corpus> {
        let corpus: Corpus = serde_json::from_str(data)?;
        debug!(
            "corpus loaded: {} keys, {} melodies",
            corpus.melodies.len(),
            corpus.melodies.values().map(Vec::len).sum::<usize>()
        );
        Ok(corpus)
    }

    /// A small C-major reference corpus in the style of two-part inventions.
    pub fn builtin() -> Corpus {
        const C_MAJOR: [&str; 6] = [
            "C D E F D E C G C5 B C5 D5 G A B C5 A B C5 D5 B C5 D5 E5",
            "E5 D5 C5 B A G F E D C D E F G A B C5",
            "G E C E G C5 B A G F E D C B3 C",
            "C E G E F D B3 D E C A3 C D B3 G3 B3 C",
            "E F G A G F E D C D E F E D C B3 C",
            "G A B C5 D5 C5 B A G F# G A G F E D C",
        ];
        let mut melodies = BTreeMap::new();
        melodies.insert(Key::C, C_MAJOR.iter().map(|m| m.to_string()).collect());
        Corpus { melodies }
    }

    /// Melodies for `key`, falling back to the C-major melodies transposed
    /// into the key when the corpus has none of its own.
    pub fn melodies_for(&self, key: Key) -> Vec<Melody> {
        if let Some(texts) = self.melodies.get(&key).filter(|t| !t.is_empty()) {
            return texts.iter().map(|t| Melody::parse(t)).collect();
        }
        let shift = key.tonic_pitch_class();
        self.melodies
            .get(&Key::C)
            .map(|texts| {
                texts
                    .iter()
                    .map(|t| Melody::parse(t).transposed(shift))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Normalised pitch-class transition tables for one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusModel {
    key: Option<Key>,
    order1: Table1,
    order2: Box<Table2>,
}

impl CorpusModel {
    /// Count transitions across `melodies` and normalise each row.
    pub fn analyze(melodies: &[Melody]) -> CorpusModel {
        let mut model = CorpusModel::default();
        for melody in melodies {
            let pcs = &melody.pitch_classes;
            for pair in pcs.windows(2) {
                model.order1[pair[0] as usize][pair[1] as usize] += 1.0;
            }
            for triple in pcs.windows(3) {
                model.order2[triple[0] as usize][triple[1] as usize][triple[2] as usize] += 1.0;
            }
        }
        for row in model.order1.iter_mut() {
            normalize(row);
        }
        for plane in model.order2.iter_mut() {
            for row in plane.iter_mut() {
                normalize(row);
            }
        }
        model
    }

    /// Model trained on the corpus melodies for `key`.
    pub fn for_key(key: Key, corpus: &Corpus) -> CorpusModel {
        let mut model = CorpusModel::analyze(&corpus.melodies_for(key));
        model.key = Some(key);
        model
    }

    /// Key the tables were last trained for, if any.
    pub fn key(&self) -> Option<Key> {
        self.key
    }

    /// Retrain for `key` unless already trained for it. Returns whether the
    /// tables were rebuilt.
    pub fn set_key(&mut self, key: Key, corpus: &Corpus) -> bool {
        if self.key == Some(key) {
            return false;
        }
        *self = CorpusModel::for_key(key, corpus);
        debug!("corpus model retrained for key {key}");
        true
    }

    /// Order-1 distribution of the pitch class following `current`.
    pub fn row(&self, current: u8) -> &[f64; 12] {
        &self.order1[current as usize % 12]
    }

    /// Order-2 distribution of the pitch class following `previous, current`.
    pub fn row2(&self, previous: u8, current: u8) -> &[f64; 12] {
        &self.order2[previous as usize % 12][current as usize % 12]
    }

    /// Order-1 probability of moving from `previous` to `next`.
    pub fn probability(&self, previous: u8, next: u8) -> f64 {
        self.row(previous)[next as usize % 12]
    }

    /// Draw the pitch class following `current`. `None` when `current` was
    /// never followed by anything in the corpus.
    pub fn sample_next(&self, current: u8, rng: &mut ScoreRng) -> Option<u8> {
        let next = rng.choose_weighted(self.row(current)).map(|i| i as u8);
        if next.is_none() {
            trace!("no order-1 transitions from pitch class {current}");
        }
        next
    }

    /// Draw the pitch class following `previous, current`, backing off to
    /// order 1 when that pair was never seen.
    pub fn sample_next2(&self, previous: u8, current: u8, rng: &mut ScoreRng) -> Option<u8> {
        match rng.choose_weighted(self.row2(previous, current)) {
            Some(i) => Some(i as u8),
            None => {
                trace!("order-2 row ({previous}, {current}) empty; backing off");
                self.sample_next(current, rng)
            }
        }
    }
}

fn normalize(row: &mut [f64; 12]) {
    let total: f64 = row.iter().sum();
    if total > 0.0 {
        for p in row.iter_mut() {
            *p /= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_class_parsing() {
        assert_eq!(parse_pitch_class("C"), Some(0));
        assert_eq!(parse_pitch_class("Db"), Some(1));
        assert_eq!(parse_pitch_class("F#5q"), Some(6));
        assert_eq!(parse_pitch_class("Cb"), Some(11));
        assert_eq!(parse_pitch_class("E#"), Some(5));
        assert_eq!(parse_pitch_class("bb"), Some(10));
        assert_eq!(parse_pitch_class("B3"), Some(11));
        assert_eq!(parse_pitch_class("Rq"), None);
        assert_eq!(parse_pitch_class("X"), None);
        assert_eq!(parse_pitch_class(""), None);
    }

    #[test]
    fn melody_parse_skips_rests() {
        let melody = Melody::parse("C  D Rq E\tG5h");
        assert_eq!(melody.pitch_classes, vec![0, 2, 4, 7]);
    }

    #[test]
    fn rows_sum_to_one_or_zero() {
        let model = CorpusModel::for_key(Key::C, &Corpus::builtin());
        for pc in 0..12u8 {
            let sum: f64 = model.row(pc).iter().sum();
            assert!(
                (sum - 1.0).abs() < 1e-9 || sum == 0.0,
                "row {pc} sums to {sum}"
            );
            for prev in 0..12u8 {
                let sum2: f64 = model.row2(prev, pc).iter().sum();
                assert!((sum2 - 1.0).abs() < 1e-9 || sum2 == 0.0);
            }
        }
        // C# never appears in the C-major reference melodies.
        assert_eq!(model.row(1).iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn counts_are_normalised() {
        let model = CorpusModel::analyze(&[Melody::parse("C D C E C D")]);
        assert!((model.probability(0, 2) - 2.0 / 3.0).abs() < 1e-12);
        assert!((model.probability(0, 4) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(model.probability(2, 0), 1.0);
        assert_eq!(model.row2(0, 2)[0], 1.0);
    }

    #[test]
    fn empty_rows_yield_none() {
        let model = CorpusModel::analyze(&[Melody::parse("C D")]);
        let mut rng = ScoreRng::new(1);
        assert_eq!(model.sample_next(2, &mut rng), None);
        assert_eq!(model.sample_next(0, &mut rng), Some(2));
    }

    #[test]
    fn order2_backs_off_to_order1() {
        let model = CorpusModel::analyze(&[Melody::parse("C D E"), Melody::parse("G E F")]);
        let mut rng = ScoreRng::new(5);
        // (C, D) was followed by E.
        assert_eq!(model.sample_next2(0, 2, &mut rng), Some(4));
        // (A, E) never occurred; order 1 from E says F.
        assert_eq!(model.sample_next2(9, 4, &mut rng), Some(5));
        // Nothing ever followed F.
        assert_eq!(model.sample_next2(4, 5, &mut rng), None);
    }

    #[test]
    fn missing_key_transposes_c_melodies() {
        let mut corpus = Corpus::default();
        corpus.melodies.insert(Key::C, vec!["C E G".to_string()]);
        let g = Key::parse("G").unwrap();
        let melodies = corpus.melodies_for(g);
        assert_eq!(melodies, vec![Melody { pitch_classes: vec![7, 11, 2] }]);

        corpus.melodies.insert(g, vec!["G A".to_string()]);
        assert_eq!(corpus.melodies_for(g)[0].pitch_classes, vec![7, 9]);
        assert!(Corpus::default().melodies_for(g).is_empty());
    }

    #[test]
    fn set_key_only_retrains_on_change() {
        let corpus = Corpus::builtin();
        let mut model = CorpusModel::default();
        assert!(model.set_key(Key::C, &corpus));
        assert!(!model.set_key(Key::C, &corpus));
        let d = Key::parse("D").unwrap();
        assert!(model.set_key(d, &corpus));
        assert_eq!(model.key(), Some(d));
        // In D the leading tone C# is used and C natural is not.
        assert!(model.row(1).iter().sum::<f64>() > 0.0);
        assert_eq!(model.row(0).iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn corpus_json_uses_key_names() {
        let corpus = Corpus::from_json(r#"{"melodies":{"C":["C D"],"Bb":["Bb C"]}}"#).unwrap();
        assert_eq!(corpus.melodies.len(), 2);
        let bb = Key::parse("Bb").unwrap();
        assert_eq!(corpus.melodies_for(bb)[0].pitch_classes, vec![10, 0]);
        assert!(Corpus::from_json(r#"{"melodies":{"H":["C"]}}"#).is_err());
    }
}
