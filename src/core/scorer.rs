//! Recognition decision and relatedness-class peaks for one trial.

use crate::frame::{EvaluationFrame, FrameColumn};
use crate::relatedness::Relatedness;

/// Outcome of the threshold race for one trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub recognized: bool,
    /// First cycle at which the target exceeds the threshold.
    pub crossing_time: Option<usize>,
    pub target_max: f64,
    pub others_max: f64,
}

/// Peak of a class-mean series. Both fields are `None` for an empty class.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassPeak {
    pub value: Option<f64>,
    pub time: Option<usize>,
}

impl ClassPeak {
    pub fn of_series(mean: &[Option<f64>]) -> Self {
        let mut best: Option<(usize, f64)> = None;
        for (t, v) in mean.iter().enumerate() {
            let Some(v) = *v else { continue };
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((t, v)),
            }
        }
        Self {
            value: best.map(|(_, v)| v),
            time: best.map(|(t, _)| t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassPeaks {
    pub cohort: ClassPeak,
    pub rhyme: ClassPeak,
    pub unrelated: ClassPeak,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialScore {
    pub decision: Decision,
    pub classes: ClassPeaks,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    threshold: f64,
    class_floor: f64,
}

impl Scorer {
    pub fn new(threshold: f64, class_floor: f64) -> Self {
        Self {
            threshold,
            class_floor,
        }
    }

    pub fn score(&self, frame: &EvaluationFrame, related: &Relatedness) -> TrialScore {
        TrialScore {
            decision: self.decide(frame),
            classes: self.class_peaks(frame, related),
        }
    }

    pub fn decide(&self, frame: &EvaluationFrame) -> Decision {
        let target = frame.target();
        let target_max = target.peak();

        let crossing_time = if target_max > self.threshold {
            target.values.iter().position(|&v| v > self.threshold)
        } else {
            None
        };

        let others_max = others_max(frame);
        let recognized = crossing_time.is_some() && others_max < self.threshold;

        Decision {
            recognized,
            crossing_time,
            target_max,
            others_max,
        }
    }

    /// Peaks of the cohort, rhyme and unrelated mean series.
    ///
    /// Every frame column takes part. The target is never its own cohort or
    /// rhyme, so it always falls into the unrelated class.
    pub fn class_peaks(&self, frame: &EvaluationFrame, related: &Relatedness) -> ClassPeaks {
        let floor = self.class_floor;
        let qualifies = |c: &&FrameColumn| c.peak() >= floor;

        let columns = frame.columns();
        let cohort: Vec<&FrameColumn> = columns
            .iter()
            .filter(|c| related.is_cohort(&c.word))
            .filter(qualifies)
            .collect();
        let rhyme: Vec<&FrameColumn> = columns
            .iter()
            .filter(|c| related.is_rhyme(&c.word))
            .filter(qualifies)
            .collect();
        let unrelated: Vec<&FrameColumn> = columns
            .iter()
            .filter(|c| !related.is_cohort(&c.word) && !related.is_rhyme(&c.word))
            .filter(qualifies)
            .collect();

        let cycles = frame.cycles();
        ClassPeaks {
            cohort: ClassPeak::of_series(&class_mean(&cohort, cycles)),
            rhyme: ClassPeak::of_series(&class_mean(&rhyme, cycles)),
            unrelated: ClassPeak::of_series(&class_mean(&unrelated, cycles)),
        }
    }
}

/// Maximum over the frame after removing the column that holds the overall peak.
///
/// The first column (in frame order) attaining the largest column maximum is
/// dropped; the result is the largest maximum among the rest. NaN when fewer
/// than two columns have values.
pub fn others_max(frame: &EvaluationFrame) -> f64 {
    let maxima: Vec<f64> = frame.columns().iter().map(FrameColumn::peak).collect();

    let mut top: Option<(usize, f64)> = None;
    for (i, &m) in maxima.iter().enumerate() {
        if m.is_nan() {
            continue;
        }
        match top {
            Some((_, b)) if m <= b => {}
            _ => top = Some((i, m)),
        }
    }
    let Some((top_idx, _)) = top else {
        return f64::NAN;
    };

    maxima
        .iter()
        .enumerate()
        .filter(|&(i, m)| i != top_idx && !m.is_nan())
        .map(|(_, &m)| m)
        .fold(f64::NAN, |acc, m| if acc.is_nan() || m > acc { m } else { acc })
}

/// Per-cycle mean over `members`, skipping NaN cells. `None` where nothing is defined.
pub fn class_mean(members: &[&FrameColumn], cycles: usize) -> Vec<Option<f64>> {
    (0..cycles)
        .map(|t| {
            let (sum, n) = members
                .iter()
                .map(|c| c.values[t])
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            (n > 0).then(|| sum / n as f64)
        })
        .collect()
}
