// Data-driven composer configuration.
//
// Every tunable of a composition pass lives in `ComposerConfig`; a settings
// file wraps it together with the grammar to expand and the number of
// generations. All fields have defaults, so a settings file only needs the
// values it changes:
//
//   { "generations": 3, "composer": { "key": "G", "mode": "Markov" } }
//
// CLI flags (main.rs) override file values after loading. `validate()` runs
// before composing and turns out-of-range values into `Error::InvalidConfig`.
//
// Determinism: the score depends only on the settings and `seed`. Two runs
// with equal settings and seed write identical scores.

use crate::error::{Error, Result};
use crate::grammar::Grammar;
use crate::key::Key;
use crate::turtle::{HUE_MAX, HUE_MIN};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the composer chooses pitches and durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompositionMode {
    /// Pitch follows the turtle along the major scale; every event is an
    /// eighth note.
    #[default]
    Deterministic,
    /// Pitch classes come from the corpus model, durations from Euclidean
    /// rhythms, with periodic chords in the harmony voices.
    Markov,
}

/// Pulse-count bounds for the measure-by-measure Euclidean rhythms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    /// Sixteenth-note steps per measure.
    pub steps_per_measure: usize,
    pub min_pulses: usize,
    pub max_pulses: usize,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            steps_per_measure: 16,
            min_pulses: 3,
            max_pulses: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub key: Key,
    /// Beats per minute.
    pub tempo: u32,
    /// Degrees per turn symbol.
    pub angle: i32,
    pub mode: CompositionMode,
    /// 1 or 2 previous pitch classes of context in Markov mode.
    pub markov_order: u8,
    /// Lowest and highest MIDI pitch the melody may reach.
    pub lower_bound: i32,
    pub upper_bound: i32,
    /// Octaves to jump when the melody leaves its bounds.
    pub wrap_octaves: i32,
    /// General MIDI program for the melody voices.
    pub instrument: u8,
    /// General MIDI program for the harmony voices.
    pub harmony_instrument: u8,
    /// Hue change (nm) per `#` / `@`.
    pub hue_step: i32,
    pub initial_hue: i32,
    pub rhythm: RhythmConfig,
    /// Place a chord every this many measures in Markov mode; 0 disables
    /// chords.
    pub chord_interval_measures: usize,
    /// MIDI pitch range chord tones are voiced in.
    pub harmony_range: (i32, i32),
    /// PRNG seed. `None` composes with seed 0; the CLI fills it from the
    /// clock instead.
    pub seed: Option<u64>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            key: Key::C,
            tempo: 120,
            angle: 90,
            mode: CompositionMode::Deterministic,
            markov_order: 1,
            lower_bound: 24,
            upper_bound: 108,
            wrap_octaves: 5,
            instrument: 80,
            harmony_instrument: 87,
            hue_step: 10,
            initial_hue: 565,
            rhythm: RhythmConfig::default(),
            chord_interval_measures: 2,
            harmony_range: (48, 72),
            seed: None,
        }
    }
}

impl ComposerConfig {
    /// Reject values the composer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidConfig(msg));
        if self.tempo == 0 {
            return fail("tempo must be positive".into());
        }
        if !(0..=127).contains(&self.lower_bound)
            || !(0..=127).contains(&self.upper_bound)
            || self.upper_bound - self.lower_bound < 12
        {
            return fail(format!(
                "pitch bounds {}..{} must lie in 0..=127 and span an octave",
                self.lower_bound, self.upper_bound
            ));
        }
        if !(1..=10).contains(&self.wrap_octaves) {
            return fail(format!("wrap_octaves {} is not in 1..=10", self.wrap_octaves));
        }
        if !(-360..=360).contains(&self.angle) {
            return fail(format!("angle {} is not in -360..=360", self.angle));
        }
        if self.hue_step.unsigned_abs() > (HUE_MAX - HUE_MIN) as u32 {
            return fail(format!(
                "hue_step {} exceeds the hue span {}",
                self.hue_step,
                HUE_MAX - HUE_MIN
            ));
        }
        if !matches!(self.markov_order, 1 | 2) {
            return fail(format!("markov_order {} is not 1 or 2", self.markov_order));
        }
        if self.instrument > 127 || self.harmony_instrument > 127 {
            return fail("instruments are General MIDI programs 0..=127".into());
        }
        let rhythm = &self.rhythm;
        if rhythm.steps_per_measure == 0 || rhythm.min_pulses > rhythm.max_pulses {
            return fail(format!(
                "rhythm needs steps > 0 and min_pulses <= max_pulses (got {}, {}..{})",
                rhythm.steps_per_measure, rhythm.min_pulses, rhythm.max_pulses
            ));
        }
        let (low, high) = self.harmony_range;
        if !(0..=127).contains(&low) || !(0..=127).contains(&high) || high - low < 11 {
            return fail(format!(
                "harmony range {low}..{high} must lie in 0..=127 and span an octave"
            ));
        }
        Ok(())
    }
}

/// Everything a run needs: grammar, depth and composer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub grammar: Grammar,
    pub generations: usize,
    pub composer: ComposerConfig,
    /// Corpus file for Markov mode; the built-in corpus when absent.
    pub corpus: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grammar: Grammar::default(),
            generations: 4,
            composer: ComposerConfig::default(),
            corpus: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings> {
        let data = std::fs::read_to_string(path)?;
        Settings::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Settings> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_roundtrip() {
        let settings = Settings::default();
        let json = settings.to_json().unwrap();
        let restored = Settings::from_json(&json).unwrap();
        assert_eq!(settings, restored);
        assert!(settings.composer.validate().is_ok());
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let settings = Settings::from_json(
            r#"{
                "generations": 3,
                "composer": { "key": "G", "mode": "Markov", "rhythm": { "max_pulses": 9 } }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.generations, 3);
        assert_eq!(settings.grammar, Grammar::default());
        assert_eq!(settings.composer.key.name(), "G");
        assert_eq!(settings.composer.mode, CompositionMode::Markov);
        assert_eq!(settings.composer.tempo, 120);
        assert_eq!(settings.composer.rhythm.max_pulses, 9);
        assert_eq!(settings.composer.rhythm.steps_per_measure, 16);
    }

    #[test]
    fn bad_grammar_in_settings_is_rejected() {
        let result = Settings::from_json(
            r#"{ "grammar": { "alphabet": ["A", "B"], "axiom": "A", "rules": ["g"] } }"#,
        );
        assert!(matches!(result, Err(Error::Json(_))));
        assert!(matches!(
            Settings::from_json(r#"{ "composer": { "key": "Q" } }"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn validation_catches_bad_values() {
        let bad = [
            ComposerConfig {
                tempo: 0,
                ..ComposerConfig::default()
            },
            ComposerConfig {
                lower_bound: 60,
                upper_bound: 64,
                ..ComposerConfig::default()
            },
            ComposerConfig {
                markov_order: 3,
                ..ComposerConfig::default()
            },
            ComposerConfig {
                rhythm: RhythmConfig {
                    steps_per_measure: 16,
                    min_pulses: 8,
                    max_pulses: 4,
                },
                ..ComposerConfig::default()
            },
            ComposerConfig {
                harmony_range: (100, 140),
                ..ComposerConfig::default()
            },
            ComposerConfig {
                wrap_octaves: 1_000_000_000,
                ..ComposerConfig::default()
            },
            ComposerConfig {
                angle: i32::MAX,
                ..ComposerConfig::default()
            },
            ComposerConfig {
                hue_step: i32::MAX,
                ..ComposerConfig::default()
            },
            ComposerConfig {
                hue_step: i32::MIN,
                ..ComposerConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }
}
