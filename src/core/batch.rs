//! Streaming driver: one chunk in, one result row out.
//!
//! Trials are handled strictly in input order:
//!
//! 1. read the next `lexicon_size * cycles` rows,
//! 2. skip silence targets (the chunk is consumed, nothing else happens),
//! 3. collapse every word's copies, build the evaluation frame, score it,
//! 4. append the result row (flushed immediately),
//! 5. push the sub-sampled target series into the length-effects buffer,
//!    sealing it once it holds one column per non-silence word.
//!
//! Everything that outlives a trial lives in `RunState`, which the caller owns.

use std::io::BufRead;

use tracing::{debug, info, warn};

use crate::choice::response_probabilities;
use crate::config::{AnalysisConfig, MalformedPolicy};
use crate::error::{AnalysisError, Result};
use crate::frame::{EvaluationFrame, FrameColumn};
use crate::length_effects::{write_buffers, LengthEffects, LengthEffectsBuffer};
use crate::progress::Progress;
use crate::relatedness::RelatednessTable;
use crate::report::{ResultRow, ResultWriter};
use crate::scorer::Scorer;
use crate::selector::CopySelector;
use crate::trial::{open_input, RawChunk, Trial, TrialReader};

/// Run-wide state carried from one trial to the next.
#[derive(Debug, Clone)]
pub struct RunState {
    pub length_effects: LengthEffects,
    pub chunks: u64,
    pub scored: u64,
    pub recognized: u64,
    pub silence: u64,
    pub malformed: u64,
}

impl RunState {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            length_effects: LengthEffects::new(
                config.words_per_combination(),
                config.subsample_every,
            ),
            chunks: 0,
            scored: 0,
            recognized: 0,
            silence: 0,
            malformed: 0,
        }
    }

    /// Closes the run: sealed buffers are kept, the open one is dropped.
    pub fn finish(self) -> (RunSummary, Vec<LengthEffectsBuffer>) {
        let (sealed, dropped_columns) = self.length_effects.finish();
        let summary = RunSummary {
            chunks: self.chunks,
            scored: self.scored,
            recognized: self.recognized,
            silence: self.silence,
            malformed: self.malformed,
            sealed_buffers: sealed.len(),
            dropped_columns,
        };
        (summary, sealed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub chunks: u64,
    pub scored: u64,
    pub recognized: u64,
    pub silence: u64,
    pub malformed: u64,
    pub sealed_buffers: usize,
    /// Columns of the trailing, unsealed length-effects buffer.
    pub dropped_columns: usize,
}

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Scored { row: ResultRow, sealed: bool },
    Silence,
}

pub struct BatchProcessor {
    config: AnalysisConfig,
    selector: CopySelector,
    scorer: Scorer,
    relatedness: RelatednessTable,
}

impl BatchProcessor {
    pub fn new(config: AnalysisConfig, relatedness: RelatednessTable) -> Result<Self> {
        config.validate()?;
        if relatedness.is_empty() {
            warn!("relatedness table is empty; every non-silence trial will be malformed");
        }
        Ok(Self {
            selector: CopySelector::new(config.alignment, config.specified_copy),
            scorer: Scorer::new(config.threshold, config.class_floor),
            relatedness,
            config,
        })
    }

    /// Loads the relatedness table named by the configuration.
    pub fn from_config(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let relatedness = RelatednessTable::load(&config.relatedness)?;
        Self::new(config, relatedness)
    }

    /// One selected series per word, in lexicon order.
    pub fn select_series(&self, trial: &Trial) -> Result<Vec<FrameColumn>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            trial
                .words
                .par_iter()
                .zip(trial.matrices.par_iter())
                .map(|(w, m)| -> Result<FrameColumn> {
                    Ok(FrameColumn::new(w.clone(), self.selector.select(w, m)?))
                })
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            trial
                .words
                .iter()
                .zip(&trial.matrices)
                .map(|(w, m)| -> Result<FrameColumn> {
                    Ok(FrameColumn::new(w.clone(), self.selector.select(w, m)?))
                })
                .collect()
        }
    }

    /// Builds the raw evaluation frame of a parsed trial.
    pub fn evaluation_frame(&self, trial: &Trial) -> Result<EvaluationFrame> {
        let columns = self.select_series(trial)?;
        EvaluationFrame::build(columns, &trial.target, self.config.top_slices).ok_or_else(|| {
            AnalysisError::malformed(
                trial.index,
                format!("target `{}` has no activation rows", trial.target),
            )
        })
    }

    /// Scores one parsed trial. Returns the row and the raw frame.
    pub fn score_trial(&self, trial: &Trial) -> Result<(ResultRow, EvaluationFrame)> {
        let related = self.relatedness.get(&trial.target).ok_or_else(|| {
            AnalysisError::malformed(
                trial.index,
                format!("target `{}` missing from relatedness table", trial.target),
            )
        })?;
        let frame = self.evaluation_frame(trial)?;

        let score = if self.config.use_choice_rule {
            let rp = response_probabilities(&frame, self.config.luce_k);
            self.scorer.score(&rp, related)
        } else {
            self.scorer.score(&frame, related)
        };

        let row = ResultRow {
            params: trial.params,
            target: trial.target.clone(),
            score,
        };
        Ok((row, frame))
    }

    /// Handles one chunk end to end, mutating `state` and appending to `writer`.
    ///
    /// On error nothing has been written or buffered for this chunk.
    pub fn process_chunk(
        &self,
        chunk: &RawChunk,
        writer: &mut ResultWriter,
        state: &mut RunState,
    ) -> Result<Step> {
        let target = chunk.target()?;
        if self.config.is_silence(target) {
            debug!(chunk = chunk.index, target, "silence trial skipped");
            state.silence += 1;
            return Ok(Step::Silence);
        }

        let trial = chunk.parse(self.config.lexicon_size, self.config.cycles)?;
        let (row, frame) = self.score_trial(&trial)?;
        debug!(
            trial = trial.index,
            width = frame.width(),
            target_peak_time = ?frame.target().peak_time(),
            "frame scored"
        );

        writer.append(&row)?;
        state.scored += 1;
        if row.score.decision.recognized {
            state.recognized += 1;
        }

        // Length effects always see raw activation, even under the choice rule.
        let series = frame.target_subsample(state.length_effects.every());
        let sealed = state
            .length_effects
            .push(&trial.target, trial.params.param_combo, series);
        if sealed {
            info!(
                param_combo = trial.params.param_combo,
                buffers = state.length_effects.sealed().len(),
                "length-effects buffer sealed"
            );
        }

        Ok(Step::Scored { row, sealed })
    }

    /// Drains `reader`, one trial at a time.
    pub fn run<R: BufRead>(
        &self,
        mut reader: TrialReader<R>,
        writer: &mut ResultWriter,
        state: &mut RunState,
    ) -> Result<()> {
        let expected = (self.config.lexicon_size * self.config.combinations) as u64;
        let mut progress = Progress::new(expected);

        loop {
            progress.begin_chunk();
            let chunk = match reader.next_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    state.chunks += 1;
                    self.tolerate(e, state)?;
                    continue;
                }
            };
            state.chunks += 1;

            match self.process_chunk(&chunk, writer, state) {
                Ok(Step::Scored { row, .. }) => {
                    let p = progress.finish_chunk();
                    let d = &row.score.decision;
                    info!(
                        trial = chunk.index,
                        done = p.done,
                        target = %row.target,
                        param_combo = row.params.param_combo,
                        recognized = d.recognized,
                        rt = ?d.crossing_time,
                        max = d.target_max,
                        others_max = d.others_max,
                        secs = round2(p.last_chunk.as_secs_f64()),
                        secs_per_trial = round2(p.per_trial.as_secs_f64()),
                        to_go = p.remaining,
                        minutes_to_go = round2(p.eta.as_secs_f64() / 60.0),
                        "trial scored"
                    );
                }
                Ok(Step::Silence) => {}
                Err(e) => self.tolerate(e, state)?,
            }
        }

        info!(
            chunks = state.chunks,
            scored = state.scored,
            silence = state.silence,
            malformed = state.malformed,
            elapsed_secs = round2(progress.elapsed().as_secs_f64()),
            "input exhausted"
        );
        Ok(())
    }

    /// Applies the malformed-trial policy: `Ok` means the run goes on.
    fn tolerate(&self, err: AnalysisError, state: &mut RunState) -> Result<()> {
        if err.is_trial_local() && self.config.on_malformed == MalformedPolicy::Skip {
            warn!(error = %err, "skipping malformed trial");
            state.malformed += 1;
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Full run over the configured input: result table plus length-effects artifact.
    pub fn run_file(&self) -> Result<RunSummary> {
        let cfg = &self.config;
        let input = open_input(&cfg.input)?;
        let reader = TrialReader::new(input, cfg.rows_per_trial())
            .with_source(cfg.input.display().to_string());
        let mut writer = ResultWriter::new(cfg.output_path());
        let mut state = RunState::new(cfg);

        info!(
            input = %cfg.input.display(),
            output = %writer.path().display(),
            alignment = %cfg.alignment,
            choice_rule = cfg.use_choice_rule,
            "scoring run started"
        );
        self.run(reader, &mut writer, &mut state)?;

        let (summary, sealed) = state.finish();
        if summary.dropped_columns > 0 {
            warn!(
                columns = summary.dropped_columns,
                "trailing length-effects buffer incomplete; dropped"
            );
        }
        write_buffers(&cfg.length_effects_path(), &sealed)?;
        info!(
            rows = writer.rows_written(),
            recognized = summary.recognized,
            sealed = summary.sealed_buffers,
            "DONE"
        );
        Ok(summary)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
