// Error type for the composer library.
//
// Configuration problems (grammar tables, key names, settings files) are
// reported here and refuse composition up front. Degenerate rhythm input and
// empty Markov rows are not errors; they degrade in place (see euclid.rs and
// corpus.rs).

use thiserror::Error;

/// Result type alias for composer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Every alphabet symbol needs exactly one replacement rule.
    #[error("alphabet has {symbols} symbols but {rules} rules were given")]
    RuleCountMismatch { symbols: usize, rules: usize },

    /// Alphabet entries are single characters.
    #[error("alphabet symbol {0:?} is not a single character")]
    MultiCharSymbol(String),

    /// `[` and `]` must pair up before a production can be composed.
    #[error("unbalanced bracket at symbol {position}")]
    UnbalancedBrackets { position: usize },

    #[error("unknown key signature {0:?}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No pulse-group rotation of the rhythm renders as the reference.
    #[error("rhythm E({pulses},{steps}) cannot be rotated to {expected:?}")]
    RhythmMismatch {
        pulses: usize,
        steps: usize,
        expected: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
