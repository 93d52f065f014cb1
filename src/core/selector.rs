//! Collapsing a word's copies into one activation series.
//!
//! The simulator reports every word once per copy (a candidate alignment of
//! the word template against the input). Scoring works on one series per
//! word, so each trial first reduces a `cycles x copies` matrix to a single
//! column according to the configured `AlignmentMode`.

use tracing::warn;

use crate::config::AlignmentMode;
use crate::error::{AnalysisError, Result};

/// Dense `cycles x copies` activation matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationMatrix {
    cycles: usize,
    copies: usize,
    data: Vec<f64>,
}

impl ActivationMatrix {
    /// `data` must hold exactly `cycles * copies` cells.
    pub fn new(cycles: usize, copies: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != cycles * copies {
            return Err(AnalysisError::mismatch(
                format!("{} cells ({cycles} cycles x {copies} copies)", cycles * copies),
                format!("{} cells", data.len()),
            ));
        }
        Ok(Self {
            cycles,
            copies,
            data,
        })
    }

    /// One row per cycle; every row must have the first row's copy count.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cycles = rows.len();
        let copies = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(cycles * copies);
        for (t, r) in rows.iter().enumerate() {
            if r.len() != copies {
                return Err(AnalysisError::mismatch(
                    format!("{copies} copies per cycle"),
                    format!("{} at cycle {t}", r.len()),
                ));
            }
            data.extend_from_slice(r);
        }
        Ok(Self {
            cycles,
            copies,
            data,
        })
    }

    #[inline]
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    #[inline]
    pub fn copies(&self) -> usize {
        self.copies
    }

    #[inline]
    pub fn get(&self, cycle: usize, copy: usize) -> f64 {
        self.data[cycle * self.copies + copy]
    }

    #[inline]
    pub fn row(&self, cycle: usize) -> &[f64] {
        let start = cycle * self.copies;
        &self.data[start..start + self.copies]
    }

    pub fn column(&self, copy: usize) -> Vec<f64> {
        (0..self.cycles).map(|t| self.get(t, copy)).collect()
    }

    /// Position of the largest non-NaN cell, first in row-major order on ties.
    pub fn argmax(&self) -> Option<(usize, usize)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            if v.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((i, v)),
            }
        }
        best.map(|(i, _)| (i / self.copies, i % self.copies))
    }
}

/// Largest non-NaN value, or NaN when there is none.
pub fn nan_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// Applies one alignment policy to every word of a trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopySelector {
    mode: AlignmentMode,
    /// 1-based copy label.
    specified_copy: usize,
}

impl CopySelector {
    pub fn new(mode: AlignmentMode, specified_copy: usize) -> Self {
        Self {
            mode,
            specified_copy,
        }
    }

    pub fn select(&self, word: &str, m: &ActivationMatrix) -> Result<Vec<f64>> {
        let series = match self.mode {
            AlignmentMode::Specified => {
                if self.specified_copy == 0 || self.specified_copy > m.copies() {
                    return Err(AnalysisError::mismatch(
                        format!("copy label {} to exist", self.specified_copy),
                        format!("{} copies per word", m.copies()),
                    ));
                }
                let series = m.column(self.specified_copy - 1);
                if series.iter().all(|v| v.is_nan()) {
                    warn!(word, copy = self.specified_copy, "specified copy has no activation values");
                }
                series
            }
            AlignmentMode::PostHoc => match m.argmax() {
                Some((_, copy)) => m.column(copy),
                None => {
                    warn!(word, "word has no activation values; post-hoc copy undefined");
                    vec![f64::NAN; m.cycles()]
                }
            },
            AlignmentMode::AdHoc => {
                let series: Vec<f64> = (0..m.cycles()).map(|t| nan_max(m.row(t))).collect();
                if let Some(t) = series.iter().position(|v| v.is_nan()) {
                    warn!(word, cycle = t, "all copies missing at cycle");
                }
                series
            }
        };
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ActivationMatrix {
        // cycles x 3 copies; global max 0.9 sits in copy index 1 at cycle 2.
        ActivationMatrix::from_rows(&[
            vec![0.1, 0.0, 0.3],
            vec![0.2, 0.4, 0.5],
            vec![0.0, 0.9, 0.6],
            vec![0.7, 0.8, 0.1],
        ])
        .unwrap()
    }

    #[test]
    fn specified_takes_the_labelled_copy() {
        let sel = CopySelector::new(AlignmentMode::Specified, 3);
        assert_eq!(sel.select("w", &sample()).unwrap(), vec![0.3, 0.5, 0.6, 0.1]);
    }

    #[test]
    fn specified_out_of_range_is_a_layout_mismatch() {
        let sel = CopySelector::new(AlignmentMode::Specified, 4);
        let err = sel.select("w", &sample()).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigMismatch { .. }));
    }

    #[test]
    fn post_hoc_follows_the_global_maximum_copy() {
        let sel = CopySelector::new(AlignmentMode::PostHoc, 4);
        assert_eq!(sel.select("w", &sample()).unwrap(), vec![0.0, 0.4, 0.9, 0.8]);
    }

    #[test]
    fn post_hoc_ignores_non_maximal_cells() {
        let sel = CopySelector::new(AlignmentMode::PostHoc, 4);
        let base = sample();
        let before = sel.select("w", &base).unwrap();

        let mut rows: Vec<Vec<f64>> = (0..base.cycles()).map(|t| base.row(t).to_vec()).collect();
        rows[0][0] = 0.85;
        rows[3][2] = -0.2;
        let after = sel.select("w", &ActivationMatrix::from_rows(&rows).unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn post_hoc_ties_resolve_to_first_cell() {
        let m = ActivationMatrix::from_rows(&[vec![0.2, 0.5], vec![0.5, 0.1]]).unwrap();
        let sel = CopySelector::new(AlignmentMode::PostHoc, 1);
        assert_eq!(sel.select("w", &m).unwrap(), vec![0.5, 0.1]);
    }

    #[test]
    fn ad_hoc_is_a_row_wise_maximum() {
        let sel = CopySelector::new(AlignmentMode::AdHoc, 4);
        assert_eq!(sel.select("w", &sample()).unwrap(), vec![0.3, 0.5, 0.9, 0.8]);

        // Each row stands alone.
        let m = ActivationMatrix::from_rows(&[vec![f64::NAN, -0.1], vec![0.2, f64::NAN]]).unwrap();
        assert_eq!(sel.select("w", &m).unwrap(), vec![-0.1, 0.2]);
    }

    #[test]
    fn mismatched_payloads_are_rejected() {
        let err = ActivationMatrix::new(2, 3, vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigMismatch { .. }));

        let err = ActivationMatrix::from_rows(&[vec![0.1, 0.2], vec![0.3]]).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigMismatch { .. }));
    }

    #[test]
    fn missing_values_yield_missing_series() {
        let m = ActivationMatrix::from_rows(&[vec![f64::NAN], vec![f64::NAN]]).unwrap();
        let sel = CopySelector::new(AlignmentMode::PostHoc, 1);
        let s = sel.select("w", &m).unwrap();
        assert!(s.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn nan_max_skips_missing() {
        assert_eq!(nan_max(&[f64::NAN, 0.2, -1.0]), 0.2);
        assert!(nan_max(&[f64::NAN]).is_nan());
        assert!(nan_max(&[]).is_nan());
    }
}
