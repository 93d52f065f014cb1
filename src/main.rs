//! `tracescore`: scores TRACE word-activation logs.
//!
//! Examples:
//!   tracescore score sim-1000lex-word.csv.gz
//!   tracescore score sim-1000lex-word.csv.gz --alignment ad-hoc --choice-rule -k 13
//!   tracescore score sim.csv.gz --config run.json --on-malformed skip
//!   tracescore relatedness pseudo-lexicon.csv -o 1000lex_rhymes_cohorts.json
//!
//! Logging goes through `tracing`; set `RUST_LOG=debug` for per-chunk detail.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracescore::relatedness::{read_lexicon, RelatednessTable};
use tracescore::{AlignmentMode, AnalysisConfig, BatchProcessor, MalformedPolicy};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Calculates accuracy and reaction time from TRACE simulation files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score every trial of a word-activation log
    Score(ScoreArgs),

    /// Build the cohort/rhyme reference table from a lexicon CSV
    Relatedness(RelatednessArgs),
}

#[derive(Args)]
struct ScoreArgs {
    /// The (optionally gzip'd) CSV file to process
    #[arg(value_hint = ValueHint::FilePath)]
    file: PathBuf,

    /// JSON file with run settings; flags given here override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Type of alignment: specified, post-hoc or ad-hoc
    #[arg(short, long)]
    alignment: Option<AlignmentMode>,

    /// Word copy X when alignment is specified (1-based)
    #[arg(short, long, value_name = "COPY")]
    specified: Option<usize>,

    /// Luce choice rule k value
    #[arg(short = 'k', long = "lucek", value_name = "K")]
    luce_k: Option<f64>,

    /// Name for the output file [default: <FILE>_results_<THRESHOLD>.csv]
    #[arg(short = 'o', long = "outfile", value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Where to write sealed length-effects buffers [default: <FILE>_length_effects.json]
    #[arg(long, value_hint = ValueHint::FilePath)]
    length_effects: Option<PathBuf>,

    /// Use response probabilities rather than word activations
    #[arg(long = "choice-rule", visible_alias = "resp-prob")]
    choice_rule: bool,

    /// Cohort/rhyme reference table (JSON)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    relatedness: Option<PathBuf>,

    /// Number of words in lexicon, silence included (used to parse file)
    #[arg(short, long, value_name = "N")]
    words: Option<usize>,

    /// Number of cycles per simulation (used to parse file)
    #[arg(short, long, value_name = "N")]
    cycles: Option<usize>,

    /// Expected parameter combinations (progress estimate only)
    #[arg(long, value_name = "N")]
    combinations: Option<usize>,

    /// What to do with a trial that cannot be scored: abort or skip
    #[arg(long, value_name = "POLICY")]
    on_malformed: Option<MalformedPolicy>,
}

#[derive(Args)]
struct RelatednessArgs {
    /// Lexicon CSV with a `Phonology` column
    #[arg(value_hint = ValueHint::FilePath)]
    lexicon: PathBuf,

    /// Output JSON
    #[arg(short, long, default_value = "1000lex_rhymes_cohorts.json", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

impl ScoreArgs {
    fn into_config(self) -> tracescore::Result<AnalysisConfig> {
        let mut cfg = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::default(),
        };
        cfg.input = self.file;
        if let Some(a) = self.alignment {
            cfg.alignment = a;
        }
        if let Some(s) = self.specified {
            cfg.specified_copy = s;
        }
        if let Some(k) = self.luce_k {
            cfg.luce_k = k;
        }
        if self.output.is_some() {
            cfg.output = self.output;
        }
        if self.length_effects.is_some() {
            cfg.length_effects_output = self.length_effects;
        }
        if self.choice_rule {
            cfg.use_choice_rule = true;
        }
        if let Some(r) = self.relatedness {
            cfg.relatedness = r;
        }
        if let Some(w) = self.words {
            cfg.lexicon_size = w;
        }
        if let Some(c) = self.cycles {
            cfg.cycles = c;
        }
        if let Some(c) = self.combinations {
            cfg.combinations = c;
        }
        if let Some(p) = self.on_malformed {
            cfg.on_malformed = p;
        }
        Ok(cfg)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Command::Score(args) => {
            let cfg = args.into_config()?;
            info!(config = ?cfg, "effective configuration");
            let processor = BatchProcessor::from_config(cfg)?;
            let summary = processor.run_file()?;
            println!(
                "scored={} recognized={} silence={} malformed={} sealed_buffers={} dropped_columns={}",
                summary.scored,
                summary.recognized,
                summary.silence,
                summary.malformed,
                summary.sealed_buffers,
                summary.dropped_columns
            );
        }
        Command::Relatedness(args) => {
            let lexicon = read_lexicon(&args.lexicon)?;
            let table = RelatednessTable::from_lexicon(&lexicon);
            table.save(&args.output)?;
            info!(
                words = lexicon.len(),
                output = %args.output.display(),
                "relatedness table written"
            );
        }
    }
    Ok(())
}
