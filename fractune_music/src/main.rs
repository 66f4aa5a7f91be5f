// Fractune generator: CLI entry point.
//
// Expands an L-system grammar, composes it into a symbolic score and writes
// the score as text and optionally as MIDI.
//
// Usage:
//   cargo run -p fractune_music --bin generate -- [--config settings.json]
//     [--preset N] [--iterations N] [--key K] [--tempo BPM] [--angle DEG]
//     [--markov] [--order 1|2] [--seed N] [--corpus corpus.json]
//     [--output score.txt] [--midi score.mid] [--show-production]
//
// Flags override values from the settings file. Without --seed (and no seed
// in the settings) the seed is taken from the clock and printed, so a run can
// be repeated.

use anyhow::{Context, Result};
use clap::Parser;
use fractune_music::corpus::Corpus;
use fractune_music::midi::write_midi;
use fractune_music::score::{TICKS_PER_WHOLE, pitch_name};
use fractune_music::{CompositionMode, Grammar, Key, ScoreComposer, Settings};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "generate")]
#[command(author, version, about = "Compose music from L-system grammars", long_about = None)]
struct Cli {
    /// Settings file (JSON) with grammar, generations and composer options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a built-in grammar (1-5) instead of the configured one
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
    preset: Option<u8>,

    /// Number of generations to expand the grammar
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Key signature: a name (C, G, F#, Bb, ...) or number 1-12
    #[arg(short, long)]
    key: Option<String>,

    /// Tempo in beats per minute
    #[arg(short, long)]
    tempo: Option<u32>,

    /// Turn angle in degrees
    #[arg(short, long, allow_negative_numbers = true)]
    angle: Option<i32>,

    /// Compose with the corpus Markov model and Euclidean rhythms
    #[arg(long)]
    markov: bool,

    /// Markov order (1 or 2)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    order: Option<u8>,

    /// PRNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Melody corpus (JSON) for Markov mode
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Write the score here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write a Standard MIDI File
    #[arg(long)]
    midi: Option<PathBuf>,

    /// Print the expanded production
    #[arg(long)]
    show_production: bool,

    /// List the built-in grammars and exit
    #[arg(long)]
    list_presets: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    if cli.list_presets {
        for (i, grammar) in Grammar::presets().iter().enumerate() {
            println!("Preset {}:", i + 1);
            print!("{}", grammar.describe());
        }
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    apply_overrides(&mut settings, &cli)?;
    let composer_config = &mut settings.composer;
    let seed = composer_config.seed.unwrap_or_else(clock_seed);
    composer_config.seed = Some(seed);
    composer_config
        .validate()
        .context("invalid composer configuration")?;

    let config = &settings.composer;
    println!("=== Fractune Generator ===");
    println!("Key: {} (#{})", config.key, config.key.number());
    println!("Tempo: {} BPM", config.tempo);
    println!("Angle: {}°", config.angle);
    match config.mode {
        CompositionMode::Deterministic => println!("Mode: deterministic"),
        CompositionMode::Markov => println!("Mode: Markov (order {})", config.markov_order),
    }
    println!("Seed: {seed}");
    println!();

    println!("[1/4] Expanding grammar ({} generations)...", settings.generations);
    for line in settings.grammar.describe().lines() {
        println!("  {line}");
    }
    let production = settings.grammar.expand(settings.generations);
    println!("  Production: {} symbols", production.chars().count());
    if cli.show_production {
        println!("{production}");
    }

    println!("[2/4] Loading corpus...");
    let corpus_path = cli.corpus.clone().or_else(|| settings.corpus.clone());
    let corpus = match &corpus_path {
        Some(path) => {
            let corpus = Corpus::load(path)
                .with_context(|| format!("failed to load corpus from {}", path.display()))?;
            println!("  Loaded {} keys from {}.", corpus.melodies.len(), path.display());
            corpus
        }
        None => {
            println!("  Using built-in corpus.");
            Corpus::builtin()
        }
    };

    println!("[3/4] Composing...");
    let mut composer = ScoreComposer::with_corpus(settings.composer.clone(), corpus);
    let score = composer
        .compose_production(&production)
        .context("composition failed")?;
    let stats = score.stats();
    println!(
        "  {} note events, {} tokens, {} bars",
        stats.note_events, stats.tokens, stats.bars
    );
    if let (Some(low), Some(high)) = (stats.lowest, stats.highest) {
        println!("  Range: {} to {}", pitch_name(low), pitch_name(high));
    }
    let quarters = stats.length_ticks as f64 / (TICKS_PER_WHOLE / 4) as f64;
    println!(
        "  Duration: {:.0}s at {} BPM",
        quarters * 60.0 / settings.composer.tempo as f64,
        settings.composer.tempo
    );

    println!("[4/4] Writing output...");
    let text = score.render();
    match &cli.output {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("failed to write score to {}", path.display()))?;
            println!("  Score written to {}", path.display());
        }
        None => {
            println!();
            println!("{text}");
        }
    }
    if let Some(path) = &cli.midi {
        write_midi(&score, path)
            .with_context(|| format!("failed to write MIDI to {}", path.display()))?;
        println!("  MIDI written to {}", path.display());
        println!("Play with: timidity {} (or any MIDI player)", path.display());
    }

    Ok(())
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) -> Result<()> {
    if let Some(number) = cli.preset {
        settings.grammar = Grammar::preset(number as usize)
            .with_context(|| format!("no built-in grammar {number}"))?;
    }
    if let Some(generations) = cli.iterations {
        settings.generations = generations;
    }
    let config = &mut settings.composer;
    if let Some(name) = &cli.key {
        config.key = Key::parse(name)?;
    }
    if let Some(tempo) = cli.tempo {
        config.tempo = tempo;
    }
    if let Some(angle) = cli.angle {
        config.angle = angle;
    }
    if cli.markov {
        config.mode = CompositionMode::Markov;
    }
    if let Some(order) = cli.order {
        config.markov_order = order;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    Ok(())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
