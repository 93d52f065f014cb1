use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};
use crate::scorer::{ClassPeak, TrialScore};
use crate::trial::TrialParams;

pub const RESULT_HEADER: [&str; 19] = [
    "alpha_if",
    "alpha_pw",
    "alpha_fp",
    "alpha_wp",
    "gamma_f",
    "gamma_p",
    "gamma_w",
    "param_combo",
    "Target",
    "Recognized",
    "RT",
    "max",
    "others_max",
    "cohort_peak_val",
    "cohort_peak_time",
    "rhyme_peak_val",
    "rhyme_peak_time",
    "unrelated_peak_val",
    "unrelated_peak_time",
];

/// One output line per scored trial.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub params: TrialParams,
    pub target: String,
    pub score: TrialScore,
}

impl ResultRow {
    pub fn to_csv_line(&self) -> String {
        let p = &self.params;
        let d = &self.score.decision;
        let c = &self.score.classes;

        let mut line = String::with_capacity(160);
        for v in [
            p.alpha_if, p.alpha_pw, p.alpha_fp, p.alpha_wp, p.gamma_f, p.gamma_p, p.gamma_w,
        ] {
            push_f64(&mut line, Some(v));
            line.push(',');
        }
        let _ = write!(line, "{},", p.param_combo);
        push_field(&mut line, &self.target);
        line.push(',');
        line.push_str(if d.recognized { "1," } else { "0," });
        if let Some(t) = d.crossing_time {
            let _ = write!(line, "{t}");
        }
        line.push(',');
        push_f64(&mut line, Some(d.target_max));
        line.push(',');
        push_f64(&mut line, Some(d.others_max));
        for peak in [&c.cohort, &c.rhyme, &c.unrelated] {
            line.push(',');
            push_peak(&mut line, peak);
        }
        line
    }
}

fn push_f64(line: &mut String, v: Option<f64>) {
    if let Some(v) = v.filter(|v| !v.is_nan()) {
        let _ = write!(line, "{v}");
    }
}

fn push_peak(line: &mut String, peak: &ClassPeak) {
    push_f64(line, peak.value);
    line.push(',');
    if let Some(t) = peak.time {
        let _ = write!(line, "{t}");
    }
}

// Phoneme strings may contain any ASCII symbol; quote the rare ones that clash with CSV.
fn push_field(line: &mut String, s: &str) {
    if s.contains([',', '"', '\n']) {
        line.push('"');
        line.push_str(&s.replace('"', "\"\""));
        line.push('"');
    } else {
        line.push_str(s);
    }
}

/// Incremental result table.
///
/// The file is created (truncating any previous run) with its header when the
/// first row arrives, and flushed after every row so an interrupted run keeps
/// all completed trials.
pub struct ResultWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    rows: u64,
}

impl ResultWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            out: None,
            rows: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn append(&mut self, row: &ResultRow) -> Result<()> {
        let path = &self.path;
        let out = match &mut self.out {
            Some(out) => out,
            slot => {
                let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
                let mut w = BufWriter::new(file);
                writeln!(w, "{}", RESULT_HEADER.join(",")).map_err(|e| AnalysisError::io(path, e))?;
                slot.insert(w)
            }
        };
        writeln!(out, "{}", row.to_csv_line()).map_err(|e| AnalysisError::io(path, e))?;
        out.flush().map_err(|e| AnalysisError::io(path, e))?;
        self.rows += 1;
        Ok(())
    }
}
