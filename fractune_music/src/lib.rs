// Fractune: music from L-system grammars.
//
// A grammar is expanded into a long symbol string (the production), and a
// turtle walks that string: turning, drawing and branching. The turtle's
// height is a MIDI pitch, so horizontal strokes become notes and vertical
// strokes move the melody along the major scale. Branches open new layers
// and voices. An optional Markov mode replaces the turtle's pitch choice
// with a corpus-trained pitch-class model, takes durations from Euclidean
// rhythms and adds chords from a functional-harmony progression sampler.
//
// Architecture:
// - grammar.rs: Alphabet/axiom/rules, parallel rewriting, built-in presets
// - turtle.rs: Turtle state (position, heading, hue, ...) with a scope stack
// - key.rs: The twelve major keys, tonic pitches, scale degrees
// - euclid.rs: Euclidean (Bjorklund) rhythms and the per-measure rhythm cursor
// - corpus.rs: Melody corpus and the order-1/order-2 pitch-class model
// - chords.rs: Chord progressions from a fixed diatonic transition matrix
// - score.rs: Token stream (notes, rests, voices, layers), durations, stats
// - composer.rs: Symbol interpretation; turns a production into a Score
// - config.rs: Composer configuration and JSON settings files
// - midi.rs: Standard MIDI File output from a Score
// - error.rs: Library error type
//
// The composer is deterministic given a seed, supporting reproducible output.

pub mod chords;
pub mod composer;
pub mod config;
pub mod corpus;
pub mod error;
pub mod euclid;
pub mod grammar;
pub mod key;
pub mod midi;
pub mod score;
pub mod turtle;

pub use composer::ScoreComposer;
pub use config::{ComposerConfig, CompositionMode, Settings};
pub use error::{Error, Result};
pub use grammar::Grammar;
pub use key::Key;
pub use score::Score;
