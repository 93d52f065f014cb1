//! Chunked reading of the simulator's word-activation log.
//!
//! The log is a headerless CSV, one row per (word, cycle) of every trial:
//!
//! ```text
//! cycle, fullstring, target, alpha_if, alpha_pw, alpha_fp, alpha_wp,
//! gamma_f, gamma_p, gamma_w, param_combo, word, copy_1, copy_2, ...
//! ```
//!
//! A trial occupies exactly `lexicon_size * cycles` consecutive rows. Nothing in
//! the file marks trial boundaries, so the configured layout must match the run.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use hashbrown::HashMap;

use crate::error::{AnalysisError, Result};
use crate::selector::ActivationMatrix;

const TARGET_FIELD: usize = 2;
const PARAM_FIELDS: usize = 7;
const WORD_FIELD: usize = 11;
const FIRST_COPY_FIELD: usize = 12;

/// Connection-weight coefficients of one simulation, constant within a trial.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrialParams {
    pub alpha_if: f64,
    pub alpha_pw: f64,
    pub alpha_fp: f64,
    pub alpha_wp: f64,
    pub gamma_f: f64,
    pub gamma_p: f64,
    pub gamma_w: f64,
    pub param_combo: i64,
}

impl TrialParams {
    fn from_fields(fields: &[f64; PARAM_FIELDS], param_combo: i64) -> Self {
        Self {
            alpha_if: fields[0],
            alpha_pw: fields[1],
            alpha_fp: fields[2],
            alpha_wp: fields[3],
            gamma_f: fields[4],
            gamma_p: fields[5],
            gamma_w: fields[6],
            param_combo,
        }
    }
}

/// One fully parsed trial: every word's `cycles x copies` matrix.
#[derive(Debug, Clone)]
pub struct Trial {
    pub index: u64,
    pub target: String,
    pub params: TrialParams,
    /// Lexicon in order of first appearance.
    pub words: Vec<String>,
    pub matrices: Vec<ActivationMatrix>,
}

/// The raw lines of one trial, not yet parsed.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub index: u64,
    lines: Vec<String>,
}

impl RawChunk {
    /// Target of the first row; enough to recognize silence trials without parsing.
    pub fn target(&self) -> Result<&str> {
        self.lines
            .first()
            .and_then(|l| l.split(',').nth(TARGET_FIELD))
            .map(str::trim)
            .ok_or_else(|| AnalysisError::malformed(self.index, "first row has no target field"))
    }

    /// Parses every row and groups the activations by word.
    pub fn parse(&self, lexicon_size: usize, cycles: usize) -> Result<Trial> {
        let target = self.target()?.to_string();

        let mut params = None;
        let mut copies: Option<usize> = None;
        let mut index: HashMap<String, usize> = HashMap::with_capacity(lexicon_size);
        let mut words: Vec<String> = Vec::with_capacity(lexicon_size);
        let mut cells: Vec<Vec<f64>> = Vec::with_capacity(lexicon_size);
        let mut rows_seen: Vec<usize> = Vec::with_capacity(lexicon_size);

        for (n, line) in self.lines.iter().enumerate() {
            let row = ParsedRow::parse(line).map_err(|reason| {
                AnalysisError::malformed(self.index, format!("row {}: {reason}", n + 1))
            })?;

            if row.target != target {
                return Err(AnalysisError::mismatch(
                    format!("{} rows per trial for target `{target}`", self.lines.len()),
                    format!("target `{}` at row {}", row.target, n + 1),
                ));
            }
            match copies {
                None => copies = Some(row.activations.len()),
                Some(c) if c != row.activations.len() => {
                    return Err(AnalysisError::mismatch(
                        format!("{c} copies per row"),
                        format!("{} at row {}", row.activations.len(), n + 1),
                    ));
                }
                Some(_) => {}
            }
            if params.is_none() {
                params = Some(row.params);
            }

            let slot = match index.get(row.word) {
                Some(&i) => i,
                None => {
                    let i = words.len();
                    index.insert(row.word.to_string(), i);
                    words.push(row.word.to_string());
                    cells.push(Vec::with_capacity(cycles * row.activations.len()));
                    rows_seen.push(0);
                    i
                }
            };
            rows_seen[slot] += 1;
            cells[slot].extend_from_slice(&row.activations);
        }

        if words.len() != lexicon_size {
            return Err(AnalysisError::mismatch(
                format!("{lexicon_size} words per trial"),
                format!("{} distinct words in trial #{}", words.len(), self.index),
            ));
        }
        if let Some((w, &n)) = words.iter().zip(&rows_seen).find(|(_, n)| **n != cycles) {
            return Err(AnalysisError::mismatch(
                format!("{cycles} cycles per word"),
                format!("{n} rows for `{w}` in trial #{}", self.index),
            ));
        }

        let copies = copies.unwrap_or(0);
        let matrices = cells
            .into_iter()
            .map(|data| ActivationMatrix::new(cycles, copies, data))
            .collect::<Result<Vec<_>>>()?;

        Ok(Trial {
            index: self.index,
            target,
            params: params.unwrap_or_default(),
            words,
            matrices,
        })
    }
}

struct ParsedRow<'a> {
    target: &'a str,
    word: &'a str,
    params: TrialParams,
    activations: Vec<f64>,
}

impl<'a> ParsedRow<'a> {
    fn parse(line: &'a str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() <= FIRST_COPY_FIELD {
            return Err(format!(
                "{} fields, need at least {}",
                fields.len(),
                FIRST_COPY_FIELD + 1
            ));
        }

        let mut p = [0.0; PARAM_FIELDS];
        for (i, slot) in p.iter_mut().enumerate() {
            let f = fields[TARGET_FIELD + 1 + i];
            *slot = parse_value(f).ok_or_else(|| format!("bad parameter `{f}`"))?;
        }
        let combo_field = fields[TARGET_FIELD + 1 + PARAM_FIELDS];
        let combo = parse_combo(combo_field)
            .ok_or_else(|| format!("bad param_combo `{combo_field}`"))?;

        let activations = fields[FIRST_COPY_FIELD..]
            .iter()
            .map(|f| parse_value(f).ok_or_else(|| format!("bad activation `{f}`")))
            .collect::<std::result::Result<Vec<f64>, String>>()?;

        Ok(Self {
            target: fields[TARGET_FIELD],
            word: fields[WORD_FIELD],
            params: TrialParams::from_fields(&p, combo),
            activations,
        })
    }
}

/// Empty and `NaN`-style cells are missing values.
fn parse_value(s: &str) -> Option<f64> {
    match s {
        "" | "nan" | "NaN" | "NAN" => Some(f64::NAN),
        _ => s.parse().ok(),
    }
}

fn parse_combo(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        let v: f64 = s.parse().ok()?;
        (v.fract() == 0.0).then_some(v as i64)
    })
}

/// Opens a log, transparently decompressing `.gz` files.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let gz = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    if gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Splits a log into fixed-size trial chunks.
pub struct TrialReader<R> {
    reader: R,
    rows_per_trial: usize,
    next_index: u64,
    line: String,
    source: String,
}

impl<R: BufRead> TrialReader<R> {
    pub fn new(reader: R, rows_per_trial: usize) -> Self {
        Self {
            reader,
            rows_per_trial,
            next_index: 0,
            line: String::new(),
            source: "<input>".to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Chunks handed out so far.
    pub fn chunks_read(&self) -> u64 {
        self.next_index
    }

    /// Next trial's lines; `Ok(None)` at a clean end of input.
    ///
    /// A trailing chunk shorter than one trial is a malformed trial.
    pub fn next_chunk(&mut self) -> Result<Option<RawChunk>> {
        let index = self.next_index;
        let mut lines = Vec::with_capacity(self.rows_per_trial);

        while lines.len() < self.rows_per_trial {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| AnalysisError::io(self.source.as_str(), e))?;
            if n == 0 {
                break;
            }
            let trimmed = self.line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() {
                continue;
            }
            lines.push(trimmed.to_string());
        }

        if lines.is_empty() {
            return Ok(None);
        }
        self.next_index += 1;
        if lines.len() < self.rows_per_trial {
            return Err(AnalysisError::malformed(
                index,
                format!(
                    "input ended after {} of {} rows",
                    lines.len(),
                    self.rows_per_trial
                ),
            ));
        }
        Ok(Some(RawChunk { index, lines }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn row(cycle: usize, target: &str, combo: i64, word: &str, acts: &[f64]) -> String {
        let mut s = format!(
            "{cycle},-{target}-,{target},1.0,0.05,0.02,0.03,0.04,0.04,0.03,{combo},{word}"
        );
        for a in acts {
            s.push_str(&format!(",{a}"));
        }
        s
    }

    fn two_word_trial(target: &str) -> String {
        let mut out = String::new();
        for word in ["kat", "-"] {
            for t in 0..3 {
                out.push_str(&row(t, target, 7, word, &[0.1 * t as f64, 0.0]));
                out.push('\n');
            }
        }
        out
    }

    #[test]
    fn reads_fixed_size_chunks() {
        let text = format!("{}{}", two_word_trial("kat"), two_word_trial("-"));
        let mut reader = TrialReader::new(Cursor::new(text), 6);

        let first = reader.next_chunk().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.lines.len(), 6);
        assert_eq!(first.target().unwrap(), "kat");

        let second = reader.next_chunk().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.target().unwrap(), "-");

        assert!(reader.next_chunk().unwrap().is_none());
        assert_eq!(reader.chunks_read(), 2);
    }

    #[test]
    fn short_trailing_chunk_is_malformed() {
        let mut text = two_word_trial("kat");
        text.push_str(&row(0, "bit", 7, "kat", &[0.0, 0.0]));
        text.push('\n');
        let mut reader = TrialReader::new(Cursor::new(text), 6);
        reader.next_chunk().unwrap().unwrap();
        let err = reader.next_chunk().unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedTrial { trial: 1, .. }));
    }

    #[test]
    fn parses_matrices_and_params() {
        let mut reader = TrialReader::new(Cursor::new(two_word_trial("kat")), 6);
        let trial = reader.next_chunk().unwrap().unwrap().parse(2, 3).unwrap();

        assert_eq!(trial.target, "kat");
        assert_eq!(trial.words, vec!["kat".to_string(), "-".to_string()]);
        assert_eq!(trial.params.alpha_if, 1.0);
        assert_eq!(trial.params.gamma_w, 0.03);
        assert_eq!(trial.params.param_combo, 7);
        let m = &trial.matrices[trial.words.iter().position(|w| w == "kat").unwrap()];
        assert_eq!((m.cycles(), m.copies()), (3, 2));
        assert!((m.get(2, 0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn wrong_lexicon_size_is_a_config_mismatch() {
        let mut reader = TrialReader::new(Cursor::new(two_word_trial("kat")), 6);
        let chunk = reader.next_chunk().unwrap().unwrap();
        // Same row count, different split: 3 words x 2 cycles.
        let err = chunk.parse(3, 2).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigMismatch { .. }));
    }

    #[test]
    fn target_change_inside_chunk_is_a_config_mismatch() {
        let text = format!("{}{}", two_word_trial("kat"), two_word_trial("bit"));
        let mut reader = TrialReader::new(Cursor::new(text), 12);
        let err = reader.next_chunk().unwrap().unwrap().parse(2, 6).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigMismatch { .. }));
    }

    #[test]
    fn unparsable_activation_is_malformed() {
        let mut text = String::new();
        text.push_str(&row(0, "kat", 0, "kat", &[0.1]));
        text.push_str(",oops\n");
        let mut reader = TrialReader::new(Cursor::new(text), 1);
        let err = reader.next_chunk().unwrap().unwrap().parse(1, 1).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedTrial { .. }));
    }

    #[test]
    fn missing_cells_and_spacing_are_tolerated() {
        let text = "0, -kat-, kat, 1, 0.05, 0.02, 0.03, 0.04, 0.04, 0.03, 2.0, kat, 0.5, , NaN\n";
        let mut reader = TrialReader::new(Cursor::new(text), 1);
        let trial = reader.next_chunk().unwrap().unwrap().parse(1, 1).unwrap();
        assert_eq!(trial.params.param_combo, 2);
        let m = &trial.matrices[0];
        assert_eq!(m.get(0, 0), 0.5);
        assert!(m.get(0, 1).is_nan());
        assert!(m.get(0, 2).is_nan());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let text = format!("\n{}\n", two_word_trial("kat"));
        let mut reader = TrialReader::new(Cursor::new(text), 6);
        assert_eq!(reader.next_chunk().unwrap().unwrap().lines.len(), 6);
        assert!(reader.next_chunk().unwrap().is_none());
    }
}
