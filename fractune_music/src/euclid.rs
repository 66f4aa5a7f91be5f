// Euclidean rhythms: maximally-even placement of pulses among steps.
//
// `EuclideanRhythm` builds the pattern in two stages. First every pulse takes
// an equal bucket of `pauses / pulses` trailing pauses. The leftover pauses
// are then spread over those groups by Bjorklund's pairing step, which
// repeats the same division one level down until at most one leftover group
// remains. When pulses outnumber pauses the roles are swapped for the
// arithmetic and the finished pattern is inverted.
//
// Patterns render in the Toussaint notation used for reference strings:
// `x` for a pulse, `.` for a pause, separated by single spaces, so E(3,8) is
// `x . . x . . x .`.
//
// `RhythmCursor` turns a stream of one-measure patterns into durations for
// the composer's Markov mode (see composer.rs).

use crate::error::{Error, Result};
use fractune_prng::ScoreRng;
use log::debug;
use std::fmt;

/// A boolean pulse pattern with exactly `pulses` onsets among `steps` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EuclideanRhythm {
    pulses: usize,
    steps: usize,
    pattern: Vec<bool>,
}

impl EuclideanRhythm {
    /// Build E(pulses, steps). Pulses beyond `steps` are clamped.
    pub fn new(pulses: usize, steps: usize) -> Self {
        let clamped = pulses.min(steps);
        if clamped != pulses {
            debug!("E({pulses},{steps}): clamping pulses to {clamped}");
        }
        let pulses = clamped;
        let pauses = steps - pulses;

        let pattern = if steps == 0 {
            Vec::new()
        } else if pulses == 0 {
            vec![false; steps]
        } else if pauses == 0 {
            vec![true; steps]
        } else if pulses > pauses {
            distribute(pauses, pulses).into_iter().map(|b| !b).collect()
        } else {
            distribute(pulses, pauses)
        };

        EuclideanRhythm {
            pulses,
            steps,
            pattern,
        }
    }

    /// Build E(pulses, steps) and rotate it to match a reference rendering.
    pub fn with_reference(pulses: usize, steps: usize, reference: &str) -> Result<Self> {
        let mut rhythm = Self::new(pulses, steps);
        rhythm.match_to_reference(reference)?;
        Ok(rhythm)
    }

    pub fn pattern(&self) -> &[bool] {
        &self.pattern
    }

    pub fn pulses(&self) -> usize {
        self.pulses
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Onsets actually present in the pattern.
    pub fn pulse_count(&self) -> usize {
        self.pattern.iter().filter(|&&p| p).count()
    }

    /// Whether the step at `index` is a pulse. Out-of-range steps are pauses.
    pub fn is_pulse(&self, index: usize) -> bool {
        self.pattern.get(index).copied().unwrap_or(false)
    }

    /// Cyclic right shift of the whole pattern by `n` steps.
    pub fn rotate_by_bits(&mut self, n: usize) {
        if self.pattern.is_empty() {
            return;
        }
        let shift = n % self.pattern.len();
        self.pattern.rotate_right(shift);
    }

    /// Rotate right `n` times, each time moving the final pulse together
    /// with its trailing pauses to the front as one unit.
    pub fn rotate_by_pulse_groups(&mut self, n: usize) {
        if !self.pattern.iter().any(|&b| b) {
            return;
        }
        for _ in 0..n {
            let trailing_pauses = self.pattern.iter().rev().take_while(|&&b| !b).count();
            self.rotate_by_bits(trailing_pauses + 1);
        }
    }

    /// Rotate by pulse groups until the pattern renders as `reference`.
    ///
    /// Gives up after `pulses` attempts, leaving the last rotation in place.
    /// Returns the number of group rotations applied.
    pub fn match_to_reference(&mut self, reference: &str) -> Result<usize> {
        if self.matches(reference) {
            return Ok(0);
        }
        for attempt in 1..=self.pulses {
            self.rotate_by_pulse_groups(1);
            if self.matches(reference) {
                return Ok(attempt);
            }
        }
        Err(Error::RhythmMismatch {
            pulses: self.pulses,
            steps: self.steps,
            expected: reference.to_string(),
        })
    }

    /// Find the single-step rotation that renders as `reference`, trying
    /// every offset once. The pattern is left at the matching rotation, or
    /// back at its starting rotation when nothing matched.
    pub fn verify_against(&mut self, reference: &str) -> Option<usize> {
        for offset in 0..self.pattern.len().max(1) {
            if self.matches(reference) {
                return Some(offset);
            }
            self.rotate_by_bits(1);
        }
        None
    }

    /// Cyclic distances between consecutive pulses.
    pub fn gaps(&self) -> Vec<usize> {
        let onsets: Vec<usize> = self
            .pattern
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        if onsets.is_empty() {
            return Vec::new();
        }
        let n = self.pattern.len();
        (0..onsets.len())
            .map(|i| {
                let next = onsets[(i + 1) % onsets.len()];
                (next + n - onsets[i] - 1) % n + 1
            })
            .collect()
    }

    /// Render as space-separated `x` / `.` tokens.
    pub fn render(&self) -> String {
        self.pattern
            .iter()
            .map(|&b| if b { "x" } else { "." })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn matches(&self, reference: &str) -> bool {
        let mut expected = reference.split_whitespace();
        for &b in &self.pattern {
            let symbol = if b { "x" } else { "." };
            match expected.next() {
                Some(token) if token.eq_ignore_ascii_case(symbol) => {}
                _ => return false,
            }
        }
        expected.next().is_none()
    }
}

impl fmt::Display for EuclideanRhythm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Spread `pulses` onsets over `pulses + pauses` steps. Requires
/// `0 < pulses <= pauses`.
fn distribute(pulses: usize, pauses: usize) -> Vec<bool> {
    let per_pulse = pauses / pulses;
    let remainder = pauses % pulses;

    let mut groups: Vec<Vec<bool>> = (0..pulses)
        .map(|_| {
            let mut group = vec![true];
            group.extend(std::iter::repeat_n(false, per_pulse));
            group
        })
        .collect();
    let mut leftovers: Vec<Vec<bool>> = (0..remainder).map(|_| vec![false]).collect();

    while leftovers.len() > 1 {
        let paired = groups.len().min(leftovers.len());
        let spare_groups = groups.split_off(paired);
        let spare_leftovers = leftovers.split_off(paired);
        for (group, leftover) in groups.iter_mut().zip(leftovers) {
            group.extend(leftover);
        }
        leftovers = if spare_groups.is_empty() {
            spare_leftovers
        } else {
            spare_groups
        };
    }

    groups.into_iter().chain(leftovers).flatten().collect()
}

// ---------------------------------------------------------------------------
// Measure-by-measure duration source
// ---------------------------------------------------------------------------

/// One step of output from a `RhythmCursor`, in rhythm steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RhythmStep {
    /// Silence before the next onset.
    Rest(u32),
    /// A measure boundary was crossed.
    Bar,
    /// The onset itself and the pauses it holds through.
    Sound(u32),
}

/// Walks Euclidean patterns one measure at a time, drawing a new pulse
/// count whenever a measure is used up.
#[derive(Debug, Clone)]
pub struct RhythmCursor {
    steps_per_measure: usize,
    min_pulses: usize,
    max_pulses: usize,
    current: EuclideanRhythm,
    position: usize,
    measures: usize,
}

impl RhythmCursor {
    /// Pulse bounds are clamped to `1..=steps_per_measure` so every measure
    /// has at least one onset.
    pub fn new(
        steps_per_measure: usize,
        min_pulses: usize,
        max_pulses: usize,
        rng: &mut ScoreRng,
    ) -> Self {
        let steps = steps_per_measure.max(1);
        let min = min_pulses.clamp(1, steps);
        let max = max_pulses.clamp(min, steps);
        let mut cursor = RhythmCursor {
            steps_per_measure: steps,
            min_pulses: min,
            max_pulses: max,
            current: EuclideanRhythm::new(min, steps),
            position: 0,
            measures: 0,
        };
        cursor.regenerate(rng);
        cursor
    }

    /// The pattern currently being consumed.
    pub fn current(&self) -> &EuclideanRhythm {
        &self.current
    }

    /// Number of measures fully consumed so far.
    pub fn measures_completed(&self) -> usize {
        self.measures
    }

    /// Whether the cursor sits at the first step of a measure.
    pub fn at_measure_start(&self) -> bool {
        self.position == 0
    }

    /// Advance to the next onset and return everything passed on the way:
    /// rests, bar lines, then the sounding duration (and a trailing bar
    /// line if the sound ends the measure).
    pub fn next_event(&mut self, rng: &mut ScoreRng) -> Vec<RhythmStep> {
        let mut steps = Vec::new();
        loop {
            let mut rest = 0u32;
            while self.position < self.current.len() && !self.current.is_pulse(self.position) {
                rest += 1;
                self.position += 1;
            }
            if rest > 0 {
                steps.push(RhythmStep::Rest(rest));
            }
            if self.position < self.current.len() {
                break;
            }
            self.finish_measure(rng);
            steps.push(RhythmStep::Bar);
        }

        let mut sound = 1u32;
        self.position += 1;
        while self.position < self.current.len() && !self.current.is_pulse(self.position) {
            sound += 1;
            self.position += 1;
        }
        steps.push(RhythmStep::Sound(sound));

        if self.position >= self.current.len() {
            self.finish_measure(rng);
            steps.push(RhythmStep::Bar);
        }
        steps
    }

    fn finish_measure(&mut self, rng: &mut ScoreRng) {
        self.measures += 1;
        self.regenerate(rng);
    }

    fn regenerate(&mut self, rng: &mut ScoreRng) {
        let pulses = rng.range_u32_inclusive(self.min_pulses as u32, self.max_pulses as u32);
        self.current = EuclideanRhythm::new(pulses as usize, self.steps_per_measure);
        self.position = 0;
        debug!("new measure rhythm: {}", self.current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tresillo_and_e_2_5() {
        assert_eq!(EuclideanRhythm::new(3, 8).render(), "x . . x . . x .");
        assert_eq!(EuclideanRhythm::new(2, 5).render(), "x . x . .");
    }

    #[test]
    fn known_rhythms_from_toussaint() {
        assert_eq!(EuclideanRhythm::new(4, 12).render(), "x . . x . . x . . x . .");
        assert_eq!(EuclideanRhythm::new(5, 13).render(), "x . . x . x . . x . x . .");
        assert_eq!(EuclideanRhythm::new(1, 4).render(), "x . . .");
    }

    #[test]
    fn exact_pulse_count_and_even_gaps() {
        for steps in 0..=32 {
            for pulses in 0..=steps {
                let rhythm = EuclideanRhythm::new(pulses, steps);
                assert_eq!(rhythm.len(), steps);
                let count = rhythm.pattern().iter().filter(|&&b| b).count();
                assert_eq!(count, pulses, "E({pulses},{steps}) pulse count");
                let gaps = rhythm.gaps();
                if let (Some(min), Some(max)) = (gaps.iter().min(), gaps.iter().max()) {
                    assert!(
                        max - min <= 1,
                        "E({pulses},{steps}) = {rhythm} has uneven gaps {gaps:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn dense_patterns_are_inverted_sparse_ones() {
        let dense = EuclideanRhythm::new(5, 8);
        let sparse = EuclideanRhythm::new(3, 8);
        let inverted: Vec<bool> = sparse.pattern().iter().map(|b| !b).collect();
        assert_eq!(dense.pattern(), inverted.as_slice());
    }

    #[test]
    fn degenerate_parameters_degrade() {
        assert!(EuclideanRhythm::new(0, 0).is_empty());
        assert_eq!(EuclideanRhythm::new(0, 4).render(), ". . . .");
        assert_eq!(EuclideanRhythm::new(4, 4).render(), "x x x x");
        let clamped = EuclideanRhythm::new(9, 4);
        assert_eq!(clamped.pulses(), 4);
        assert_eq!(clamped.render(), "x x x x");
    }

    #[test]
    fn full_rotation_is_identity() {
        for (pulses, steps) in [(3, 8), (5, 13), (7, 16), (2, 5)] {
            let original = EuclideanRhythm::new(pulses, steps);
            let mut rotated = original.clone();
            rotated.rotate_by_bits(steps);
            assert_eq!(rotated, original);
            rotated.rotate_by_bits(1);
            assert_ne!(rotated, original);
            rotated.rotate_by_bits(steps - 1);
            assert_eq!(rotated, original);
        }
    }

    #[test]
    fn pulse_group_rotation_moves_trailing_group() {
        let mut rhythm = EuclideanRhythm::new(3, 8);
        rhythm.rotate_by_pulse_groups(1);
        assert_eq!(rhythm.render(), "x . x . . x . .");
        rhythm.rotate_by_pulse_groups(2);
        assert_eq!(rhythm.render(), "x . . x . . x .");
    }

    #[test]
    fn match_to_reference_finds_rotation() {
        let mut rhythm = EuclideanRhythm::new(5, 13);
        let target = "x . x . . x . . x . x . .";
        let rotations = rhythm.match_to_reference(target).unwrap();
        assert!(rotations <= 5);
        assert_eq!(rhythm.render(), target);

        let built = EuclideanRhythm::with_reference(3, 8, "x . . x . x . .").unwrap();
        assert_eq!(built.render(), "x . . x . x . .");
    }

    #[test]
    fn match_to_reference_reports_impossible_target() {
        let mut rhythm = EuclideanRhythm::new(3, 8);
        let err = rhythm.match_to_reference("x x x . . . . .").unwrap_err();
        assert!(matches!(err, Error::RhythmMismatch { pulses: 3, steps: 8, .. }));
        assert_eq!(rhythm.pulses(), 3);
    }

    #[test]
    fn verify_against_tries_every_offset() {
        let mut rhythm = EuclideanRhythm::new(3, 8);
        assert_eq!(rhythm.verify_against(". x . . x . . x"), Some(1));
        assert_eq!(rhythm.verify_against("x x . . . . . x"), None);
    }

    #[test]
    fn cursor_durations_fill_whole_measures() {
        let mut rng = ScoreRng::new(11);
        let mut cursor = RhythmCursor::new(16, 3, 7, &mut rng);
        let mut filled = 0u32;
        let mut bars = 0;
        while bars < 8 {
            for step in cursor.next_event(&mut rng) {
                match step {
                    RhythmStep::Rest(n) | RhythmStep::Sound(n) => filled += n,
                    RhythmStep::Bar => {
                        bars += 1;
                        assert_eq!(filled % 16, 0, "bar line off the measure grid");
                    }
                }
            }
        }
        assert_eq!(cursor.measures_completed(), 8);
        assert_eq!(filled, 8 * 16);
    }

    #[test]
    fn cursor_clamps_pulse_bounds() {
        let mut rng = ScoreRng::new(3);
        let cursor = RhythmCursor::new(8, 0, 40, &mut rng);
        assert!(cursor.current().pulses() >= 1);
        assert!(cursor.current().pulses() <= 8);
    }
}
