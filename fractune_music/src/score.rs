// The score: a symbolic token stream plus the composer's running state.
//
// Output is a whitespace-separated stream in a JFugue-like notation:
//
//   T120 V0 I80 [48]i [50]q L1 I80 [52]i Rs | X1=61
//
// - `T<bpm>` tempo, `V<n>` voice, `L<n>` layer within the voice,
//   `I<n>` General MIDI instrument
// - `[<midi pitch>]<codes>` a note, `R<codes>` a rest
// - `|` bar line, `X<controller>=<value>` a controller change
//
// Durations are strings of ladder codes whose lengths add up:
// `w h q i s t x o` = whole, half, quarter, eighth, 16th, 32nd, 64th, 128th.
// Internally every duration is counted in 128th-note ticks, so a whole note
// is 128 ticks and an eighth is 16.
//
// Each (voice, layer) pair keeps its own time cursor, since switching voice or
// layer in the stream restarts from wherever that line left off. The score is
// the source of truth; MIDI (midi.rs) is derived from the token list.

use crate::key::{Key, PITCH_CLASS_NAMES};
use std::collections::BTreeMap;
use std::fmt;

/// Ticks in a whole note.
pub const TICKS_PER_WHOLE: u32 = 128;
/// Highest voice and layer counter value.
pub const MAX_VOICES: u8 = 16;
pub const MAX_LAYERS: u8 = 16;

/// The duration ladder, longest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duration {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    HundredTwentyEighth,
}

impl Duration {
    pub const LADDER: [Duration; 8] = [
        Duration::Whole,
        Duration::Half,
        Duration::Quarter,
        Duration::Eighth,
        Duration::Sixteenth,
        Duration::ThirtySecond,
        Duration::SixtyFourth,
        Duration::HundredTwentyEighth,
    ];

    pub fn code(self) -> char {
        match self {
            Duration::Whole => 'w',
            Duration::Half => 'h',
            Duration::Quarter => 'q',
            Duration::Eighth => 'i',
            Duration::Sixteenth => 's',
            Duration::ThirtySecond => 't',
            Duration::SixtyFourth => 'x',
            Duration::HundredTwentyEighth => 'o',
        }
    }

    pub fn ticks(self) -> u32 {
        TICKS_PER_WHOLE >> (self as u32)
    }
}

/// Spell a tick count as ladder codes, longest first (24 ticks → `"is"`).
pub fn duration_codes(ticks: u32) -> String {
    let mut out = String::new();
    let mut remaining = ticks;
    for duration in Duration::LADDER {
        while remaining >= duration.ticks() {
            out.push(duration.code());
            remaining -= duration.ticks();
        }
    }
    out
}

//   T120 V0 I80 [48]i [50]q L1 I80 [52]i Rs | X1=61/// Note name with octave, MIDI 60 = C4.
pub fn pitch_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", PITCH_CLASS_NAMES[pitch as usize % 12], octave)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Tempo(u32),
    Voice(u8),
    Layer(u8),
    Instrument(u8),
    Note { pitch: u8, ticks: u32 },
    Rest { ticks: u32 },
    Bar,
    Control { controller: u8, value: i32 },
}

impl Token {
    /// Ticks this token occupies on its line.
    pub fn ticks(&self) -> u32 {
        match self {
            Token::Note { ticks, .. } | Token::Rest { ticks } => *ticks,
            _ => 0,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Tempo(bpm) => write!(f, "T{bpm}"),
            Token::Voice(v) => write!(f, "V{v}"),
            Token::Layer(l) => write!(f, "L{l}"),
            Token::Instrument(i) => write!(f, "I{i}"),
            Token::Note { pitch, ticks } => write!(f, "[{pitch}]{}", duration_codes(*ticks)),
            Token::Rest { ticks } => write!(f, "R{}", duration_codes(*ticks)),
            Token::Bar => f.write_str("|"),
            Token::Control { controller, value } => write!(f, "X{controller}={value}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Score {
    pub key: Key,
    pub tempo: u32,
    /// Current melodic pitch class.
    pub note: Option<u8>,
    pub prev_note: Option<u8>,
    /// Scale degree of the current pitch, 1-7; x.5 between diatonic degrees.
    pub degree: f32,
    /// Voice counter, 1..=16. The active voice is `voices - 1`.
    pub voices: u8,
    /// Layer counter, 1..=16. The active layer is `layers - 1`.
    pub layers: u8,
    tokens: Vec<Token>,
    /// Time cursor per (voice, layer), in ticks.
    cursors: BTreeMap<(u8, u8), u32>,
    /// Last layer selected in each voice.
    voice_layers: BTreeMap<u8, u8>,
    line: (u8, u8),
    note_events: usize,
}

impl Score {
    /// Empty score opening with `T<tempo> V0 I<instrument>`.
    pub fn new(key: Key, tempo: u32, instrument: u8) -> Self {
        let mut score = Score {
            key,
            tempo,
            note: None,
            prev_note: None,
            degree: 1.0,
            voices: 1,
            layers: 1,
            tokens: Vec::new(),
            cursors: BTreeMap::new(),
            voice_layers: BTreeMap::new(),
            line: (0, 0),
            note_events: 0,
        };
        score.tokens.push(Token::Tempo(tempo));
        score.tokens.push(Token::Voice(0));
        score.tokens.push(Token::Instrument(instrument));
        score
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of sounding events written, counting merged notes separately.
    pub fn note_events(&self) -> usize {
        self.note_events
    }

    /// Time position of the active line, in ticks.
    pub fn beat(&self) -> u32 {
        self.cursors.get(&self.line).copied().unwrap_or(0)
    }

    /// Longest line, in ticks.
    pub fn length_ticks(&self) -> u32 {
        self.cursors.values().copied().max().unwrap_or(0)
    }

    /// Active (voice, layer) pair.
    pub fn line(&self) -> (u8, u8) {
        self.line
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Switch to `voice`, keeping that voice's current layer.
    pub fn switch_voice(&mut self, voice: u8) {
        let layer = self.voice_layers.get(&voice).copied().unwrap_or(0);
        self.line = (voice, layer);
        self.tokens.push(Token::Voice(voice));
    }

    pub fn switch_layer(&mut self, layer: u8) {
        self.line.1 = layer;
        self.voice_layers.insert(self.line.0, layer);
        self.tokens.push(Token::Layer(layer));
    }

    fn advance(&mut self, ticks: u32) {
        *self.cursors.entry(self.line).or_insert(0) += ticks;
    }

    /// Write a note. With `merge`, a directly preceding note of the same
    /// pitch is lengthened instead of starting a new token.
    pub fn add_note(&mut self, pitch: u8, ticks: u32, merge: bool) {
        self.note_events += 1;
        self.advance(ticks);
        if merge {
            if let Some(Token::Note { pitch: last, ticks: held }) = self.tokens.last_mut() {
                if *last == pitch {
                    *held += ticks;
                    return;
                }
            }
        }
        self.tokens.push(Token::Note { pitch, ticks });
    }

    /// Write a rest, lengthening a directly preceding rest.
    pub fn add_rest(&mut self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        self.advance(ticks);
        if let Some(Token::Rest { ticks: held }) = self.tokens.last_mut() {
            *held += ticks;
            return;
        }
        self.tokens.push(Token::Rest { ticks });
    }

    pub fn add_bar(&mut self) {
        self.tokens.push(Token::Bar);
    }

    pub fn add_control(&mut self, controller: u8, value: i32) {
        self.tokens.push(Token::Control { controller, value });
    }

    /// Record a new melodic pitch class, shifting the old one to `prev_note`.
    pub fn set_note(&mut self, pitch_class: u8) {
        self.prev_note = self.note;
        self.note = Some(pitch_class);
        self.degree = self.key.scale_degree(pitch_class);
    }

    /// The token stream as text.
    pub fn render(&self) -> String {
        let parts: Vec<String> = self.tokens.iter().map(|t| t.to_string()).collect();
        parts.join(" ")
    }

    pub fn stats(&self) -> ScoreStats {
        let mut stats = ScoreStats {
            tokens: self.tokens.len(),
            note_events: self.note_events,
            lines: self.cursors.len(),
            length_ticks: self.length_ticks(),
            ..ScoreStats::default()
        };
        for token in &self.tokens {
            match token {
                Token::Note { pitch, .. } => {
                    stats.notes += 1;
                    stats.lowest = Some(stats.lowest.map_or(*pitch, |p| p.min(*pitch)));
                    stats.highest = Some(stats.highest.map_or(*pitch, |p| p.max(*pitch)));
                }
                Token::Rest { .. } => stats.rests += 1,
                Token::Bar => stats.bars += 1,
                _ => {}
            }
        }
        stats
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Counts describing a finished score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreStats {
    pub tokens: usize,
    pub note_events: usize,
    /// Note tokens after merging.
    pub notes: usize,
    pub rests: usize,
    pub bars: usize,
    /// Distinct (voice, layer) lines that hold notes or rests.
    pub lines: usize,
    pub length_ticks: u32,
    pub lowest: Option<u8>,
    pub highest: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_ticks() {
        let ticks: Vec<u32> = Duration::LADDER.iter().map(|d| d.ticks()).collect();
        assert_eq!(ticks, vec![128, 64, 32, 16, 8, 4, 2, 1]);
    }

    #[test]
    fn codes_decompose_greedily() {
        assert_eq!(duration_codes(16), "i");
        assert_eq!(duration_codes(24), "is");
        assert_eq!(duration_codes(32), "q");
        assert_eq!(duration_codes(56), "qis");
        assert_eq!(duration_codes(256), "ww");
        assert_eq!(duration_codes(0), "");
    }

    #[test]
    fn header_and_render() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(48, 16, true);
        score.add_rest(8);
        score.add_bar();
        score.add_control(1, 61);
        assert_eq!(score.render(), "T120 V0 I80 [48]i Rs | X1=61");
    }

    #[test]
    fn layered_stream_renders_as_documented() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(48, 16, true);
        score.add_note(50, 32, true);
        score.switch_layer(1);
        score.push(Token::Instrument(80));
        score.add_note(52, 16, true);
        score.add_rest(8);
        score.add_bar();
        score.add_control(1, 61);
        assert_eq!(
            score.render(),
            "T120 V0 I80 [48]i [50]q L1 I80 [52]i Rs | X1=61"
        );
    }

    #[test]
    fn merging_notes_and_rests() {
        let mut score = Score::new(Key::C, 100, 1);
        score.add_note(60, 16, true);
        score.add_note(60, 16, true);
        score.add_note(62, 16, true);
        score.add_note(62, 16, false);
        score.add_rest(16);
        score.add_rest(8);
        assert_eq!(score.render(), "T100 V0 I1 [60]q [62]i [62]i Ris");
        assert_eq!(score.note_events(), 4);
        assert_eq!(score.beat(), 88);
    }

    #[test]
    fn lines_keep_separate_cursors() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(60, 32, true);
        score.switch_layer(1);
        assert_eq!(score.beat(), 0);
        score.add_note(64, 16, true);
        score.switch_layer(0);
        assert_eq!(score.beat(), 32);
        score.switch_voice(1);
        assert_eq!(score.line(), (1, 0));
        assert_eq!(score.beat(), 0);
        assert_eq!(score.length_ticks(), 32);
        // Returning to a voice resumes its last layer.
        score.switch_voice(0);
        assert_eq!(score.line(), (0, 0));
        score.switch_layer(1);
        score.switch_voice(1);
        score.switch_voice(0);
        assert_eq!(score.line(), (0, 1));
        assert_eq!(score.beat(), 16);
    }

    #[test]
    fn set_note_tracks_degree() {
        let mut score = Score::new(Key::parse("G").unwrap(), 120, 80);
        score.set_note(7);
        score.set_note(6);
        assert_eq!(score.prev_note, Some(7));
        assert_eq!(score.note, Some(6));
        assert_eq!(score.degree, 7.0);
    }

    #[test]
    fn stats_count_tokens() {
        let mut score = Score::new(Key::C, 120, 80);
        score.add_note(50, 16, true);
        score.add_note(70, 16, true);
        score.add_rest(16);
        score.add_bar();
        let stats = score.stats();
        assert_eq!(stats.notes, 2);
        assert_eq!(stats.rests, 1);
        assert_eq!(stats.bars, 1);
        assert_eq!(stats.lowest, Some(50));
        assert_eq!(stats.highest, Some(70));
        assert_eq!(stats.length_ticks, 48);
    }

    #[test]
    fn pitch_names() {
        assert_eq!(pitch_name(60), "C4");
        assert_eq!(pitch_name(48), "C3");
        assert_eq!(pitch_name(61), "C#/Db4");
    }
}
