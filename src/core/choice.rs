//! Luce choice rule: activations to response probabilities.

use crate::frame::EvaluationFrame;

/// Replaces every value `v` by `exp(k * v)` and normalizes each cycle so the
/// frame's columns sum to 1.
///
/// Only the frame's own columns take part in the normalization, so the result
/// depends on the competitor budget.
pub fn response_probabilities(frame: &EvaluationFrame, k: f64) -> EvaluationFrame {
    let mut out = frame.clone();
    let width = out.width();
    let cycles = out.cycles();

    for t in 0..cycles {
        // Max-shifted; ratios are unchanged.
        let shift = (0..width)
            .map(|c| frame.value(t, c))
            .filter(|v| !v.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);
        let shift = if shift.is_finite() { shift } else { 0.0 };

        let mut sum = 0.0;
        for col in out.columns_mut() {
            let v = col.values[t];
            let e = if v.is_nan() { f64::NAN } else { (k * (v - shift)).exp() };
            col.values[t] = e;
            if !e.is_nan() {
                sum += e;
            }
        }
        for col in out.columns_mut() {
            col.values[t] /= sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameColumn;

    fn frame() -> EvaluationFrame {
        EvaluationFrame::from_columns(vec![
            FrameColumn::new("kat", vec![0.0, 0.3, 0.7, 0.9]),
            FrameColumn::new("kap", vec![0.0, 0.25, 0.3, 0.1]),
            FrameColumn::new("dog", vec![0.0, -0.1, -0.2, -0.2]),
        ])
    }

    #[test]
    fn rows_sum_to_one_inside_the_unit_interval() {
        let rp = response_probabilities(&frame(), 13.0);
        for t in 0..rp.cycles() {
            let row: Vec<f64> = (0..rp.width()).map(|c| rp.value(t, c)).collect();
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "cycle {t} sums to {sum}");
            assert!(row.iter().all(|&p| p > 0.0 && p < 1.0), "cycle {t}: {row:?}");
        }
    }

    #[test]
    fn equal_activations_share_evenly() {
        let rp = response_probabilities(&frame(), 13.0);
        for c in 0..3 {
            assert!((rp.value(0, c) - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn matches_the_unshifted_formula() {
        let f = frame();
        let k = 13.0;
        let rp = response_probabilities(&f, k);
        let t = 2;
        let denom: f64 = (0..3).map(|c| (k * f.value(t, c)).exp()).sum();
        for c in 0..3 {
            let expected = (k * f.value(t, c)).exp() / denom;
            assert!((rp.value(t, c) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn steeper_k_sharpens_the_leader() {
        let soft = response_probabilities(&frame(), 1.0);
        let sharp = response_probabilities(&frame(), 13.0);
        assert!(sharp.value(3, 0) > soft.value(3, 0));
    }
}
