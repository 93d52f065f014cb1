use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// How one word's copies are collapsed into a single series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentMode {
    /// Always the configured copy.
    Specified,
    /// The copy holding the matrix-wide maximum, for every cycle.
    #[default]
    PostHoc,
    /// The maximum across copies, cycle by cycle.
    AdHoc,
}

impl AlignmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Specified => "specified",
            Self::PostHoc => "post-hoc",
            Self::AdHoc => "ad-hoc",
        }
    }
}

impl fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignmentMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "specified" => Ok(Self::Specified),
            "post-hoc" => Ok(Self::PostHoc),
            "ad-hoc" => Ok(Self::AdHoc),
            other => Err(AnalysisError::InvalidConfig(format!(
                "unknown alignment `{other}` (expected specified, post-hoc or ad-hoc)"
            ))),
        }
    }
}

/// What to do with a trial that cannot be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    #[default]
    Abort,
    /// Log, count, and move on to the next chunk.
    Skip,
}

impl FromStr for MalformedPolicy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(AnalysisError::InvalidConfig(format!(
                "unknown malformed-trial policy `{other}` (expected abort or skip)"
            ))),
        }
    }
}

fn default_specified_copy() -> usize {
    4
}

fn default_luce_k() -> f64 {
    13.0
}

fn default_threshold() -> f64 {
    0.41
}

fn default_top_slices() -> usize {
    1000
}

// 1000 words plus silence.
fn default_lexicon_size() -> usize {
    1001
}

fn default_cycles() -> usize {
    100
}

fn default_combinations() -> usize {
    2025
}

fn default_subsample_every() -> usize {
    5
}

fn default_class_floor() -> f64 {
    -1.0
}

fn default_silence_targets() -> Vec<String> {
    vec!["-".to_string(), "Q".to_string()]
}

fn default_relatedness() -> PathBuf {
    PathBuf::from("1000lex_rhymes_cohorts.json")
}

/// Run configuration for `tracescore score`.
///
/// Layout fields (`lexicon_size`, `cycles`) must match the simulator run that
/// produced the log; they decide where one trial ends and the next begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub input: PathBuf,
    #[serde(default)]
    pub alignment: AlignmentMode,
    /// 1-based copy label used by `AlignmentMode::Specified`.
    #[serde(default = "default_specified_copy")]
    pub specified_copy: usize,
    /// Luce choice rule steepness.
    #[serde(default = "default_luce_k")]
    pub luce_k: f64,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub length_effects_output: Option<PathBuf>,
    #[serde(default)]
    pub use_choice_rule: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Evaluation frame width, target included.
    #[serde(default = "default_top_slices")]
    pub top_slices: usize,
    #[serde(default = "default_lexicon_size")]
    pub lexicon_size: usize,
    #[serde(default = "default_cycles")]
    pub cycles: usize,
    /// Expected number of parameter combinations; only feeds the ETA.
    #[serde(default = "default_combinations")]
    pub combinations: usize,
    #[serde(default = "default_subsample_every")]
    pub subsample_every: usize,
    #[serde(default = "default_class_floor")]
    pub class_floor: f64,
    #[serde(default = "default_silence_targets")]
    pub silence_targets: Vec<String>,
    #[serde(default = "default_relatedness")]
    pub relatedness: PathBuf,
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            alignment: AlignmentMode::default(),
            specified_copy: default_specified_copy(),
            luce_k: default_luce_k(),
            output: None,
            length_effects_output: None,
            use_choice_rule: false,
            threshold: default_threshold(),
            top_slices: default_top_slices(),
            lexicon_size: default_lexicon_size(),
            cycles: default_cycles(),
            combinations: default_combinations(),
            subsample_every: default_subsample_every(),
            class_floor: default_class_floor(),
            silence_targets: default_silence_targets(),
            relatedness: default_relatedness(),
            on_malformed: MalformedPolicy::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| AnalysisError::json(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(AnalysisError::InvalidConfig("no input file given".into()));
        }
        if self.lexicon_size == 0 || self.cycles == 0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "lexicon_size ({}) and cycles ({}) must be positive",
                self.lexicon_size, self.cycles
            )));
        }
        if self.top_slices == 0 {
            return Err(AnalysisError::InvalidConfig(
                "top_slices must leave room for the target".into(),
            ));
        }
        if self.subsample_every == 0 {
            return Err(AnalysisError::InvalidConfig(
                "subsample_every must be positive".into(),
            ));
        }
        if self.alignment == AlignmentMode::Specified && self.specified_copy == 0 {
            return Err(AnalysisError::InvalidConfig(
                "copy labels start at 1".into(),
            ));
        }
        if !self.threshold.is_finite() || !self.luce_k.is_finite() {
            return Err(AnalysisError::InvalidConfig(
                "threshold and luce_k must be finite".into(),
            ));
        }
        Ok(())
    }

    /// Rows that make up one trial in the input log.
    pub fn rows_per_trial(&self) -> usize {
        self.lexicon_size * self.cycles
    }

    /// Scored trials that fill one length-effects buffer (silence excluded).
    pub fn words_per_combination(&self) -> usize {
        self.lexicon_size.saturating_sub(1)
    }

    pub fn is_silence(&self, target: &str) -> bool {
        self.silence_targets.iter().any(|s| s == target)
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(p) => p.clone(),
            None => suffixed(&self.input, &format!("_results_{}.csv", self.threshold)),
        }
    }

    pub fn length_effects_path(&self) -> PathBuf {
        match &self.length_effects_output {
            Some(p) => p.clone(),
            None => suffixed(&self.input, "_length_effects.json"),
        }
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_experimental_protocol() {
        let cfg = AnalysisConfig::new("sim-word.csv.gz");
        assert_eq!(cfg.alignment, AlignmentMode::PostHoc);
        assert_eq!(cfg.specified_copy, 4);
        assert_eq!(cfg.luce_k, 13.0);
        assert_eq!(cfg.threshold, 0.41);
        assert_eq!(cfg.top_slices, 1000);
        assert_eq!(cfg.lexicon_size, 1001);
        assert_eq!(cfg.cycles, 100);
        assert_eq!(cfg.rows_per_trial(), 100_100);
        assert_eq!(cfg.words_per_combination(), 1000);
        assert!(!cfg.use_choice_rule);
        assert!(cfg.is_silence("-"));
        assert!(cfg.is_silence("Q"));
        assert!(!cfg.is_silence("kat"));
        cfg.validate().unwrap();
    }

    #[test]
    fn derived_paths_follow_the_input() {
        let cfg = AnalysisConfig::new("runs/sim-word.csv.gz");
        assert_eq!(
            cfg.output_path(),
            PathBuf::from("runs/sim-word.csv.gz_results_0.41.csv")
        );
        assert_eq!(
            cfg.length_effects_path(),
            PathBuf::from("runs/sim-word.csv.gz_length_effects.json")
        );

        let cfg = AnalysisConfig {
            output: Some(PathBuf::from("out.csv")),
            ..cfg
        };
        assert_eq!(cfg.output_path(), PathBuf::from("out.csv"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: AnalysisConfig =
            serde_json::from_str(r#"{ "alignment": "ad-hoc", "cycles": 60 }"#).unwrap();
        assert_eq!(cfg.alignment, AlignmentMode::AdHoc);
        assert_eq!(cfg.cycles, 60);
        assert_eq!(cfg.lexicon_size, 1001);
        assert_eq!(cfg.on_malformed, MalformedPolicy::Abort);
    }

    #[test]
    fn alignment_parses_cli_spelling() {
        assert_eq!("post-hoc".parse::<AlignmentMode>().unwrap(), AlignmentMode::PostHoc);
        assert_eq!("ad-hoc".parse::<AlignmentMode>().unwrap(), AlignmentMode::AdHoc);
        assert_eq!(
            "specified".parse::<AlignmentMode>().unwrap(),
            AlignmentMode::Specified
        );
        assert!("posthoc".parse::<AlignmentMode>().is_err());
    }

    #[test]
    fn validate_rejects_degenerate_layouts() {
        let mut cfg = AnalysisConfig::new("x.csv");
        cfg.cycles = 0;
        assert!(matches!(cfg.validate(), Err(AnalysisError::InvalidConfig(_))));

        let mut cfg = AnalysisConfig::new("x.csv");
        cfg.top_slices = 0;
        assert!(cfg.validate().is_err());

        let cfg = AnalysisConfig::default();
        assert!(cfg.validate().is_err(), "missing input must be rejected");
    }
}
