// L-system grammars: alphabet, axiom, rewrite rules and expansion.
//
// A grammar rewrites every alphabet symbol in parallel once per generation.
// Symbols are single characters. Whitespace is not special to the grammar
// (it simply isn't in any alphabet) but the composer ignores it, so rule
// tables are usually written with spaces between symbols for readability:
// `"g + g - g B"`.
//
// The composer's control alphabet (`g f r + - [ ] # @`, see composer.rs)
// passes through expansion unchanged unless a grammar deliberately rewrites
// one of those symbols.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Serialised form of a grammar, as written in settings files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarSpec {
    pub alphabet: Vec<String>,
    pub axiom: String,
    pub rules: Vec<String>,
}

/// A validated grammar: one rule per alphabet symbol, in alphabet order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GrammarSpec", into = "GrammarSpec")]
pub struct Grammar {
    alphabet: Vec<char>,
    axiom: String,
    rules: Vec<String>,
}

impl Grammar {
    /// Validate and build a grammar.
    pub fn new<S: AsRef<str>>(alphabet: &[S], axiom: &str, rules: &[S]) -> Result<Self> {
        if alphabet.len() != rules.len() {
            return Err(Error::RuleCountMismatch {
                symbols: alphabet.len(),
                rules: rules.len(),
            });
        }
        let mut symbols = Vec::with_capacity(alphabet.len());
        for entry in alphabet {
            let entry = entry.as_ref();
            let mut chars = entry.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => symbols.push(c),
                _ => return Err(Error::MultiCharSymbol(entry.to_string())),
            }
        }
        Ok(Grammar {
            alphabet: symbols,
            axiom: axiom.to_string(),
            rules: rules.iter().map(|r| r.as_ref().to_string()).collect(),
        })
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    pub fn axiom(&self) -> &str {
        &self.axiom
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Replacement for a symbol, or `None` if it is not in the alphabet.
    pub fn rule_for(&self, symbol: char) -> Option<&str> {
        self.alphabet
            .iter()
            .position(|&c| c == symbol)
            .map(|i| self.rules[i].as_str())
    }

    /// Rewrite the axiom `generations` times. Always starts over from the
    /// axiom, so equal inputs give equal productions.
    pub fn expand(&self, generations: usize) -> String {
        let mut current = self.axiom.clone();
        for _ in 0..generations {
            let mut next = String::with_capacity(current.len() * 2);
            for symbol in current.chars() {
                match self.rule_for(symbol) {
                    Some(replacement) => next.push_str(replacement),
                    None => next.push(symbol),
                }
            }
            current = next;
        }
        current
    }

    /// Alphabet, axiom and rules as an indented listing for display.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let alphabet: Vec<String> = self.alphabet.iter().map(|c| c.to_string()).collect();
        let _ = writeln!(out, "Alphabet: {}", alphabet.join(" "));
        let _ = writeln!(out, "Axiom: {}", self.axiom);
        let _ = writeln!(out, "Rules:");
        for (symbol, rule) in self.alphabet.iter().zip(&self.rules) {
            let _ = writeln!(out, "    {symbol}: {rule}");
        }
        out
    }

    /// The five grammars bundled with the generator.
    pub fn presets() -> Vec<Grammar> {
        const PRESETS: [(&[&str], &str, &[&str]); 5] = [
            (&["A", "B"], "A", &["g + g - g B", "+ g - g B"]),
            (
                &["A", "B"],
                "A",
                &["- B g + A g A + g B -", "+ A g - B g B - g A +"],
            ),
            (
                &["A", "B"],
                "A",
                &["A + g - g B - g + g + g -", "- g + g A - g +"],
            ),
            (
                &["A"],
                "A",
                &["g + g g - g + g g - g + g g g - g - g g g + g - g g + g - g g + g"],
            ),
            (
                &["A", "B", "C", "D"],
                "A C A",
                &[
                    "g - g B g + A g A + g B g - g",
                    "+ A g - B g B - g A +",
                    "+ C g + g - g - C g C - g - g + g C +",
                    "- g + g A - g +",
                ],
            ),
        ];
        PRESETS
            .iter()
            .filter_map(|(alphabet, axiom, rules)| Grammar::new(*alphabet, *axiom, *rules).ok())
            .collect()
    }

    /// Preset by 1-based number.
    pub fn preset(number: usize) -> Option<Grammar> {
        number
            .checked_sub(1)
            .and_then(|i| Grammar::presets().into_iter().nth(i))
    }
}

impl Default for Grammar {
    /// The second preset, a Hilbert-curve style grammar.
    fn default() -> Self {
        Grammar {
            alphabet: vec!['A', 'B'],
            axiom: "A".to_string(),
            rules: vec![
                "- B g + A g A + g B -".to_string(),
                "+ A g - B g B - g A +".to_string(),
            ],
        }
    }
}

impl TryFrom<GrammarSpec> for Grammar {
    type Error = Error;

    fn try_from(spec: GrammarSpec) -> Result<Self> {
        Grammar::new(spec.alphabet.as_slice(), &spec.axiom, spec.rules.as_slice())
    }
}

impl From<Grammar> for GrammarSpec {
    fn from(grammar: Grammar) -> Self {
        GrammarSpec {
            alphabet: grammar.alphabet.iter().map(|c| c.to_string()).collect(),
            axiom: grammar.axiom,
            rules: grammar.rules,
        }
    }
}

/// Expand `axiom` with an ad-hoc rule list, without building a `Grammar`.
pub fn expand(axiom: &str, rules: &[(char, &str)], generations: usize) -> String {
    let mut current = axiom.to_string();
    for _ in 0..generations {
        current = current
            .chars()
            .map(|symbol| {
                rules
                    .iter()
                    .find(|(c, _)| *c == symbol)
                    .map_or_else(|| symbol.to_string(), |(_, r)| (*r).to_string())
            })
            .collect();
    }
    current
}

/// Check that every `]` closes an earlier `[` and every `[` is closed.
/// The error carries the character index of the first offending bracket.
pub fn check_brackets(production: &str) -> Result<()> {
    let mut open: Vec<usize> = Vec::new();
    for (position, symbol) in production.chars().enumerate() {
        match symbol {
            '[' => open.push(position),
            ']' => {
                if open.pop().is_none() {
                    return Err(Error::UnbalancedBrackets { position });
                }
            }
            _ => {}
        }
    }
    match open.first() {
        Some(&position) => Err(Error::UnbalancedBrackets { position }),
        None => Ok(()),
    }
}
