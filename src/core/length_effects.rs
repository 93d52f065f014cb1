use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthEffectsColumn {
    pub target: String,
    /// Target activation at `LengthEffectsBuffer::cycles`. Missing values serialize as null.
    pub series: Vec<f64>,
}

/// Target series of one parameter combination, one column per scored word.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LengthEffectsBuffer {
    /// Combination id of the first column.
    pub param_combo: Option<i64>,
    /// Cycle index of every series entry.
    pub cycles: Vec<usize>,
    pub columns: Vec<LengthEffectsColumn>,
}

impl LengthEffectsBuffer {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Accumulates sub-sampled target series and seals a buffer every `capacity` words.
///
/// Only sealed buffers survive `finish`; whatever is still open at the end of
/// a run is discarded.
#[derive(Debug, Clone)]
pub struct LengthEffects {
    capacity: usize,
    every: usize,
    current: LengthEffectsBuffer,
    sealed: Vec<LengthEffectsBuffer>,
}

impl LengthEffects {
    pub fn new(capacity: usize, every: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            every: every.max(1),
            current: LengthEffectsBuffer::default(),
            sealed: Vec::new(),
        }
    }

    pub fn every(&self) -> usize {
        self.every
    }

    /// Columns in the open buffer.
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    pub fn sealed(&self) -> &[LengthEffectsBuffer] {
        &self.sealed
    }

    /// Adds one already sub-sampled series. Returns `true` if this sealed the buffer.
    pub fn push(&mut self, target: &str, param_combo: i64, series: Vec<f64>) -> bool {
        if self.current.is_empty() {
            self.current.param_combo = Some(param_combo);
            self.current.cycles = (0..series.len()).map(|i| i * self.every).collect();
        }
        self.current.columns.push(LengthEffectsColumn {
            target: target.to_string(),
            series,
        });

        if self.current.len() < self.capacity {
            return false;
        }
        let full = std::mem::take(&mut self.current);
        debug!(
            param_combo = ?full.param_combo,
            columns = full.len(),
            "length-effects buffer sealed"
        );
        self.sealed.push(full);
        true
    }

    /// Sealed buffers plus the number of columns dropped from the open one.
    pub fn finish(self) -> (Vec<LengthEffectsBuffer>, usize) {
        (self.sealed, self.current.len())
    }
}

pub fn write_buffers(path: &Path, buffers: &[LengthEffectsBuffer]) -> Result<()> {
    let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer(&mut w, buffers).map_err(|e| AnalysisError::json(path, e))?;
    w.flush().map_err(|e| AnalysisError::io(path, e))?;
    info!(path = %path.display(), buffers = buffers.len(), "length-effects artifact written");
    Ok(())
}
