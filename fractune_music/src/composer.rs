// Turtle interpretation of an L-system production into a score.
//
// The composer walks the production one symbol at a time, steering a turtle
// whose height is a MIDI pitch:
//
//   `-` / `+`   turn by the configured angle (towards up / towards down)
//   `g`         draw: facing forward or backward it sounds a note, facing
//               up or down it steps the pitch along the major scale
//   `f`         move: like `g`, but horizontal moves are silent
//   `r`         rest, when facing horizontally
//   `[` / `]`   open / close a branch: the turtle state is saved and a new
//               layer (or, once 16 layers are in use, a new voice) begins
//   `#` / `@`   shift the hue up / down; consecutive hue symbols are batched
//               into one `X1` controller change
//
// Anything else, grammar variables and whitespace included, is ignored.
//
// Two modes pick pitches and durations (see `CompositionMode`). In
// deterministic mode every event is an eighth note at the turtle's height.
// In Markov mode durations come from one-measure Euclidean rhythms, pitch
// classes are drawn from the corpus model and moved to the nearest octave of
// the turtle's height, and every few measures a triad from the chord sampler
// is voiced in three harmony voices (V13-V15) appended after the melody.
//
// A composer can be reused: each `compose` call starts from a fresh turtle,
// score and PRNG seeded from the config, so equal input gives equal output.

use crate::chords::ChordProgressionSampler;
use crate::config::{ComposerConfig, CompositionMode};
use crate::corpus::{Corpus, CorpusModel};
use crate::error::Result;
use crate::euclid::{RhythmCursor, RhythmStep};
use crate::grammar::{Grammar, check_brackets};
use crate::score::{Duration, MAX_LAYERS, MAX_VOICES, Score, Token};
use crate::turtle::{Direction, HUE_MAX, Turtle, TurtleState};
use fractune_prng::ScoreRng;
use log::{debug, info, trace};

/// First voice used for chord tones in Markov mode.
pub const HARMONY_VOICE: u8 = 13;
/// MIDI controller written for hue changes.
pub const HUE_CONTROLLER: u8 = 1;
/// Ticks per Euclidean rhythm step (a sixteenth note).
const STEP_TICKS: u32 = 8;

/// One production symbol, as the composer reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// `-`: yaw increases by the angle.
    TurnLeft,
    /// `+`: yaw decreases by the angle.
    TurnRight,
    Draw,
    Move,
    Rest,
    Push,
    Pop,
    HueUp,
    HueDown,
    Ignore,
}

impl From<char> for Symbol {
    fn from(c: char) -> Self {
        match c {
            '-' => Symbol::TurnLeft,
            '+' => Symbol::TurnRight,
            'g' => Symbol::Draw,
            'f' => Symbol::Move,
            'r' => Symbol::Rest,
            '[' => Symbol::Push,
            ']' => Symbol::Pop,
            '#' => Symbol::HueUp,
            '@' => Symbol::HueDown,
            _ => Symbol::Ignore,
        }
    }
}

impl Symbol {
    fn is_hue(self) -> bool {
        matches!(self, Symbol::HueUp | Symbol::HueDown)
    }
}

/// Chord tones collected for one harmony voice.
#[derive(Debug, Clone, Default)]
struct HarmonyLine {
    tokens: Vec<Token>,
    position: u32,
}

impl HarmonyLine {
    /// Place a note at `start`, padding with a rest from the end of the
    /// previous chord tone.
    fn place(&mut self, start: u32, pitch: u8, ticks: u32) {
        if start > self.position {
            self.tokens.push(Token::Rest {
                ticks: start - self.position,
            });
            self.position = start;
        }
        self.tokens.push(Token::Note { pitch, ticks });
        self.position += ticks;
    }
}

#[derive(Debug)]
pub struct ScoreComposer {
    config: ComposerConfig,
    corpus: Corpus,
    model: CorpusModel,
    turtle: Turtle,
    score: Score,
    rng: ScoreRng,
    rhythm: RhythmCursor,
    chords: ChordProgressionSampler,
    harmony: [HarmonyLine; 3],
    /// One entry per open `[`: whether it opened a turtle scope. Brackets
    /// past the voice ceiling open nothing, and neither does their `]`.
    brackets: Vec<bool>,
    /// Measure index that last received a chord.
    last_chord_measure: Option<usize>,
}

impl ScoreComposer {
    /// Composer using the built-in corpus for Markov mode.
    pub fn new(config: ComposerConfig) -> Self {
        Self::with_corpus(config, Corpus::builtin())
    }

    pub fn with_corpus(config: ComposerConfig, corpus: Corpus) -> Self {
        let mut rng = ScoreRng::new(config.seed.unwrap_or(0));
        let rhythm = RhythmCursor::new(
            config.rhythm.steps_per_measure,
            config.rhythm.min_pulses,
            config.rhythm.max_pulses,
            &mut rng,
        );
        let turtle = Turtle::new(Self::origin(&config), config.hue_step);
        let score = Score::new(config.key, config.tempo, config.instrument);
        ScoreComposer {
            config,
            corpus,
            model: CorpusModel::default(),
            turtle,
            score,
            rng,
            rhythm,
            chords: ChordProgressionSampler::new(),
            harmony: Default::default(),
            brackets: Vec::new(),
            last_chord_measure: None,
        }
    }

    fn origin(config: &ComposerConfig) -> TurtleState {
        TurtleState {
            y: config.key.tonic_midi(),
            angle: config.angle,
            hue: config.initial_hue,
            ..TurtleState::default()
        }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn corpus_model(&self) -> &CorpusModel {
        &self.model
    }

    /// Expand `grammar` and compose the resulting production.
    pub fn compose(&mut self, grammar: &Grammar, generations: usize) -> Result<Score> {
        let production = grammar.expand(generations);
        debug!(
            "expanded {generations} generations: {} symbols",
            production.chars().count()
        );
        self.compose_production(&production)
    }

    /// Compose an already expanded production.
    pub fn compose_production(&mut self, production: &str) -> Result<Score> {
        self.config.validate()?;
        check_brackets(production)?;
        self.reset();

        let symbols: Vec<Symbol> = production
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(Symbol::from)
            .collect();
        for (i, &symbol) in symbols.iter().enumerate() {
            match symbol {
                Symbol::TurnLeft => self.turtle.turn(1),
                Symbol::TurnRight => self.turtle.turn(-1),
                Symbol::Draw => self.draw(true),
                Symbol::Move => self.draw(false),
                Symbol::Rest => self.rest(),
                Symbol::Push => self.push_branch(),
                Symbol::Pop => self.pop_branch(),
                Symbol::HueUp | Symbol::HueDown => {
                    let batched = symbols.get(i + 1).is_some_and(|s| s.is_hue());
                    self.shift_hue(symbol == Symbol::HueUp, batched);
                }
                Symbol::Ignore => {}
            }
        }

        self.append_harmony();
        let fresh = Score::new(self.config.key, self.config.tempo, self.config.instrument);
        let score = std::mem::replace(&mut self.score, fresh);
        info!(
            "composed {} note events in {} tokens ({:?} mode, key {})",
            score.note_events(),
            score.tokens().len(),
            self.config.mode,
            self.config.key
        );
        Ok(score)
    }

    /// Back to the starting turtle, an empty score and a freshly seeded PRNG.
    fn reset(&mut self) {
        let config = &self.config;
        self.turtle = Turtle::new(Self::origin(config), config.hue_step);
        self.score = Score::new(config.key, config.tempo, config.instrument);
        self.rng = ScoreRng::new(config.seed.unwrap_or(0));
        self.rhythm = RhythmCursor::new(
            config.rhythm.steps_per_measure,
            config.rhythm.min_pulses,
            config.rhythm.max_pulses,
            &mut self.rng,
        );
        self.chords = ChordProgressionSampler::new();
        self.harmony = Default::default();
        self.brackets.clear();
        self.last_chord_measure = None;
        if config.mode == CompositionMode::Markov {
            self.model.set_key(config.key, &self.corpus);
        }
        self.score.degree = self.current_degree();
    }

    fn current_degree(&self) -> f32 {
        self.config
            .key
            .scale_degree(self.turtle.y().rem_euclid(12) as u8)
    }

    /// `g` and `f`: horizontal headings sound (or, for `f`, rest); vertical
    /// headings step the pitch; oblique headings do nothing.
    fn draw(&mut self, sounding: bool) {
        let direction = self.turtle.direction();
        if direction.is_horizontal() {
            if sounding {
                self.sound();
            } else {
                self.silence();
            }
        } else if direction.is_vertical() {
            self.step_pitch(direction == Direction::Up);
        }
    }

    fn rest(&mut self) {
        if self.turtle.direction().is_horizontal() {
            self.silence();
        }
    }

    /// Step the turtle's height one scale degree. Half steps lead from
    /// degrees 3 and 7 upwards and from 1 and 4 downwards; a chromatic
    /// pitch moves a half step onto its diatonic neighbour.
    fn step_pitch(&mut self, up: bool) {
        let degree = self.current_degree();
        let half = if degree.fract() != 0.0 {
            true
        } else if up {
            degree == 3.0 || degree == 7.0
        } else {
            degree == 1.0 || degree == 4.0
        };
        let step = if half { 1 } else { 2 };
        let y = self.turtle.y();
        let next = self.wrap_pitch(if up { y + step } else { y - step });
        self.turtle.set_y(next);
        self.score.degree = self.current_degree();
    }

    /// Fold a pitch that left the bounds back in by `wrap_octaves` octaves,
    /// then by single octaves.
    fn wrap_pitch(&self, pitch: i32) -> i32 {
        let config = &self.config;
        let mut pitch = pitch;
        if pitch > config.upper_bound {
            pitch -= 12 * config.wrap_octaves;
        } else if pitch < config.lower_bound {
            pitch += 12 * config.wrap_octaves;
        }
        while pitch > config.upper_bound {
            pitch -= 12;
        }
        while pitch < config.lower_bound {
            pitch += 12;
        }
        pitch
    }

    fn sound(&mut self) {
        match self.config.mode {
            CompositionMode::Deterministic => {
                let pitch = self.turtle.y().clamp(0, 127) as u8;
                self.score.add_note(pitch, Duration::Eighth.ticks(), true);
                self.score.set_note(pitch % 12);
            }
            CompositionMode::Markov => {
                let mut measure = self.rhythm.measures_completed();
                for step in self.rhythm.next_event(&mut self.rng) {
                    match step {
                        RhythmStep::Rest(steps) => self.score.add_rest(steps * STEP_TICKS),
                        RhythmStep::Bar => {
                            self.score.add_bar();
                            measure += 1;
                        }
                        RhythmStep::Sound(steps) => self.markov_sound(measure, steps * STEP_TICKS),
                    }
                }
            }
        }
    }

    fn silence(&mut self) {
        match self.config.mode {
            CompositionMode::Deterministic => self.score.add_rest(Duration::Eighth.ticks()),
            CompositionMode::Markov => {
                for step in self.rhythm.next_event(&mut self.rng) {
                    match step {
                        RhythmStep::Rest(steps) | RhythmStep::Sound(steps) => {
                            self.score.add_rest(steps * STEP_TICKS)
                        }
                        RhythmStep::Bar => self.score.add_bar(),
                    }
                }
            }
        }
    }

    fn markov_sound(&mut self, measure: usize, ticks: u32) {
        let interval = self.config.chord_interval_measures;
        if interval > 0 && measure % interval == 0 && self.last_chord_measure != Some(measure) {
            self.last_chord_measure = Some(measure);
            self.place_chord(ticks);
            return;
        }

        let current = self
            .score
            .note
            .unwrap_or_else(|| self.config.key.tonic_pitch_class());
        let next = match (self.config.markov_order, self.score.prev_note) {
            (2, Some(previous)) => self.model.sample_next2(previous, current, &mut self.rng),
            _ => self.model.sample_next(current, &mut self.rng),
        };
        let pitch_class = next.unwrap_or_else(|| {
            trace!("no transition from pitch class {current}; holding");
            current
        });
        let pitch = self.nearest_pitch(self.turtle.y(), pitch_class);
        self.turtle.set_y(pitch);
        self.score.set_note(pitch_class);
        self.score.add_note(pitch.clamp(0, 127) as u8, ticks, false);
    }

    /// The occurrence of `pitch_class` closest to `from`. A tritone is
    /// equally far both ways; then the step goes towards the middle of the
    /// range.
    fn nearest_pitch(&self, from: i32, pitch_class: u8) -> i32 {
        let up = (pitch_class as i32 - from).rem_euclid(12);
        let down = (12 - up) % 12;
        let middle = (self.config.lower_bound + self.config.upper_bound) / 2;
        let target = if up < down || (up == down && from < middle) {
            from + up
        } else {
            from - down
        };
        let mut pitch = target;
        while pitch > self.config.upper_bound {
            pitch -= 12;
        }
        while pitch < self.config.lower_bound {
            pitch += 12;
        }
        pitch
    }

    /// Voice the next chord in the harmony lines while the melody rests.
    fn place_chord(&mut self, ticks: u32) {
        let chord = self.chords.next_chord(&mut self.rng);
        let start = self.score.beat();
        let (low, high) = self.config.harmony_range;
        for (line, pitch_class) in self.harmony.iter_mut().zip(chord.triad(self.config.key)) {
            let mut pitch = low + (pitch_class as i32 - low).rem_euclid(12);
            if pitch > high {
                pitch -= 12;
            }
            line.place(start, pitch.clamp(0, 127) as u8, ticks);
        }
        trace!("chord {chord} at tick {start}");
        self.score.add_rest(ticks);
    }

    fn append_harmony(&mut self) {
        if self.harmony.iter().all(|line| line.tokens.is_empty()) {
            return;
        }
        let harmony = std::mem::take(&mut self.harmony);
        for (voice, line) in (HARMONY_VOICE..).zip(harmony) {
            self.score.switch_voice(voice);
            self.score.push(Token::Instrument(self.config.harmony_instrument));
            for token in line.tokens {
                match token {
                    Token::Note { pitch, ticks } => self.score.add_note(pitch, ticks, false),
                    Token::Rest { ticks } => self.score.add_rest(ticks),
                    other => self.score.push(other),
                }
            }
        }
    }

    /// `[`: save the turtle and open a new layer, or a new voice once the
    /// layers of this voice are used up.
    fn push_branch(&mut self) {
        let instrument = Token::Instrument(self.config.instrument);
        if self.score.voices >= MAX_VOICES {
            debug!("voice ceiling reached; bracket ignored");
            self.brackets.push(false);
            return;
        }
        self.turtle.save_state();
        if self.score.layers < MAX_LAYERS {
            self.score.switch_layer(self.score.layers);
            self.score.layers += 1;
        } else {
            self.score.switch_voice(self.score.voices);
            self.score.voices += 1;
            self.score.layers = 1;
        }
        self.score.push(instrument);
        self.brackets.push(true);
    }

    /// `]`: restore the turtle and return to the enclosing layer or voice.
    fn pop_branch(&mut self) {
        if !self.brackets.pop().unwrap_or(false) {
            return;
        }
        if self.score.layers > 1 {
            self.turtle.restore_state();
            self.score.layers -= 1;
            self.score.switch_layer(self.score.layers - 1);
        } else if self.score.voices > 1 {
            self.turtle.restore_state();
            self.score.voices -= 1;
            self.score.layers = MAX_LAYERS;
            self.score.switch_voice(self.score.voices - 1);
            self.score.switch_layer(self.score.layers - 1);
        }
        self.score.degree = self.current_degree();
    }

    /// `#` / `@`: move the hue one step. Unless another hue symbol follows,
    /// write the hue as a controller value (red 0 .. violet 123).
    fn shift_hue(&mut self, up: bool, batched: bool) {
        self.turtle.shift_hue(if up { 1 } else { -1 });
        if !batched {
            let value = (HUE_MAX - self.turtle.hue()) / 3;
            self.score.add_control(HUE_CONTROLLER, value);
        }
    }
}
