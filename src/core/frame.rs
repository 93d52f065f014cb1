use std::cmp::Ordering;

use crate::selector::nan_max;

/// One word's selected series inside a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameColumn {
    pub word: String,
    pub values: Vec<f64>,
}

impl FrameColumn {
    pub fn new(word: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            word: word.into(),
            values,
        }
    }

    /// Column maximum, NaN cells skipped.
    pub fn peak(&self) -> f64 {
        nan_max(&self.values)
    }

    /// First cycle holding the column maximum.
    pub fn peak_time(&self) -> Option<usize> {
        let peak = self.peak();
        if peak.is_nan() {
            return None;
        }
        self.values.iter().position(|&v| v == peak)
    }
}

/// The target plus its strongest competitors for one trial.
///
/// Column 0 is always the target, whatever its rank; the remaining columns are
/// the `width - 1` other words with the highest peaks, descending, ties kept in
/// lexicon order.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationFrame {
    cycles: usize,
    columns: Vec<FrameColumn>,
}

impl EvaluationFrame {
    /// Returns `None` when `target` is not among `selected`.
    pub fn build(selected: Vec<FrameColumn>, target: &str, width: usize) -> Option<Self> {
        let cycles = selected.first().map_or(0, |c| c.values.len());
        let target_pos = selected.iter().position(|c| c.word == target)?;

        let mut others = selected;
        let target_col = others.remove(target_pos);

        let mut ranked: Vec<(f64, FrameColumn)> =
            others.into_iter().map(|c| (c.peak(), c)).collect();
        // Stable: equal peaks keep their lexicon order. Missing peaks rank last.
        ranked.sort_by(|(a, _), (b, _)| descending_nan_last(*a, *b));
        ranked.truncate(width.saturating_sub(1));

        let mut columns = Vec::with_capacity(ranked.len() + 1);
        columns.push(target_col);
        columns.extend(ranked.into_iter().map(|(_, c)| c));

        Some(Self { cycles, columns })
    }

    pub fn from_columns(columns: Vec<FrameColumn>) -> Self {
        let cycles = columns.first().map_or(0, |c| c.values.len());
        Self { cycles, columns }
    }

    #[inline]
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn target(&self) -> &FrameColumn {
        &self.columns[0]
    }

    pub fn columns(&self) -> &[FrameColumn] {
        &self.columns
    }

    pub fn value(&self, cycle: usize, column: usize) -> f64 {
        self.columns[column].values[cycle]
    }

    /// Target series at cycles `0, every, 2 * every, ...`.
    pub fn target_subsample(&self, every: usize) -> Vec<f64> {
        self.target().values.iter().step_by(every.max(1)).copied().collect()
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [FrameColumn] {
        &mut self.columns
    }
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> Vec<FrameColumn> {
        vec![
            FrameColumn::new("bi", vec![0.0, 0.2, 0.3]),
            FrameColumn::new("bit", vec![0.0, 0.1, 0.6]),
            FrameColumn::new("kru", vec![0.0, 0.0, 0.3]),
            FrameColumn::new("-", vec![0.1, 0.0, -0.1]),
            FrameColumn::new("sit", vec![0.0, 0.5, 0.2]),
        ]
    }

    fn words(frame: &EvaluationFrame) -> Vec<&str> {
        frame.columns().iter().map(|c| c.word.as_str()).collect()
    }

    #[test]
    fn target_leads_even_when_outranked() {
        let frame = EvaluationFrame::build(lexicon(), "kru", 3).unwrap();
        assert_eq!(words(&frame), vec!["kru", "bit", "sit"]);
        assert_eq!(frame.target().word, "kru");
        assert_eq!(frame.width(), 3);
    }

    #[test]
    fn width_is_capped_by_lexicon_size() {
        for width in 1..8 {
            let frame = EvaluationFrame::build(lexicon(), "bi", width).unwrap();
            assert_eq!(frame.width(), width.min(5));
            assert_eq!(frame.target().word, "bi");
        }
    }

    #[test]
    fn ties_keep_lexicon_order() {
        let frame = EvaluationFrame::build(lexicon(), "sit", 5).unwrap();
        // bi and kru both peak at 0.3.
        assert_eq!(words(&frame), vec!["sit", "bit", "bi", "kru", "-"]);
    }

    #[test]
    fn missing_target_is_reported() {
        assert!(EvaluationFrame::build(lexicon(), "blu", 3).is_none());
    }

    #[test]
    fn missing_peaks_rank_last() {
        let mut lex = lexicon();
        lex.push(FrameColumn::new("nan", vec![f64::NAN; 3]));
        lex.rotate_right(1);
        let frame = EvaluationFrame::build(lex, "bi", 10).unwrap();
        assert_eq!(frame.columns().last().unwrap().word, "nan");
    }

    #[test]
    fn subsample_starts_at_first_cycle() {
        let col = FrameColumn::new("t", (0..12).map(f64::from).collect());
        let frame = EvaluationFrame::from_columns(vec![col]);
        assert_eq!(frame.target_subsample(5), vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn peak_time_is_first_occurrence() {
        let col = FrameColumn::new("t", vec![0.1, 0.4, 0.4, 0.2]);
        assert_eq!(col.peak(), 0.4);
        assert_eq!(col.peak_time(), Some(1));
        assert_eq!(FrameColumn::new("n", vec![f64::NAN]).peak_time(), None);
    }
}
