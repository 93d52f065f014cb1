//! Cohort / rhyme reference data.
//!
//! The table is generated once from the lexicon (`RelatednessTable::from_lexicon`)
//! and stored as JSON next to the simulation output. A scoring run loads it a
//! single time and hands each trial the classes of its target.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};

/// One serialized row of the reference artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatednessRecord {
    pub phonology: String,
    #[serde(default)]
    pub cohorts: Vec<String>,
    #[serde(default)]
    pub rhymes: Vec<String>,
}

/// Cohort and rhyme membership for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relatedness {
    cohorts: HashSet<String>,
    rhymes: HashSet<String>,
}

impl Relatedness {
    pub fn new(cohorts: Vec<String>, rhymes: Vec<String>) -> Self {
        Self {
            cohorts: cohorts.into_iter().collect(),
            rhymes: rhymes.into_iter().collect(),
        }
    }

    pub fn is_cohort(&self, word: &str) -> bool {
        self.cohorts.contains(word)
    }

    pub fn is_rhyme(&self, word: &str) -> bool {
        self.rhymes.contains(word)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelatednessTable {
    entries: HashMap<String, Relatedness>,
    order: Vec<String>,
}

impl RelatednessTable {
    pub fn from_records(records: Vec<RelatednessRecord>) -> Self {
        let mut table = Self::default();
        for r in records {
            if !table.entries.contains_key(&r.phonology) {
                table.order.push(r.phonology.clone());
            }
            table
                .entries
                .insert(r.phonology, Relatedness::new(r.cohorts, r.rhymes));
        }
        table
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        let records: Vec<RelatednessRecord> =
            serde_json::from_str(&text).map_err(|e| AnalysisError::json(path, e))?;
        let table = Self::from_records(records);
        info!(path = %path.display(), entries = table.len(), "relatedness table loaded");
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut w, &self.records())
            .map_err(|e| AnalysisError::json(path, e))?;
        w.flush().map_err(|e| AnalysisError::io(path, e))
    }

    pub fn get(&self, phonology: &str) -> Option<&Relatedness> {
        self.entries.get(phonology)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in insertion order, members sorted for stable output.
    pub fn records(&self) -> Vec<RelatednessRecord> {
        self.order
            .iter()
            .filter_map(|p| {
                let rel = self.entries.get(p)?;
                let mut cohorts: Vec<String> = rel.cohorts.iter().cloned().collect();
                let mut rhymes: Vec<String> = rel.rhymes.iter().cloned().collect();
                cohorts.sort();
                rhymes.sort();
                Some(RelatednessRecord {
                    phonology: p.clone(),
                    cohorts,
                    rhymes,
                })
            })
            .collect()
    }

    /// Derives cohorts and rhymes for every lexicon entry.
    pub fn from_lexicon(lexicon: &[String]) -> Self {
        let chars: Vec<Vec<char>> = lexicon.iter().map(|w| w.chars().collect()).collect();
        let records = lexicon
            .iter()
            .zip(&chars)
            .map(|(target, t)| {
                let mut cohorts = Vec::new();
                let mut rhymes = Vec::new();
                for (word, w) in lexicon.iter().zip(&chars) {
                    if word == target {
                        continue;
                    }
                    if is_cohort_of(t, w) {
                        cohorts.push(word.clone());
                    }
                    if is_rhyme_of(t, w) {
                        rhymes.push(word.clone());
                    }
                }
                debug!(target = %target, cohorts = cohorts.len(), rhymes = rhymes.len(), "classes");
                RelatednessRecord {
                    phonology: target.clone(),
                    cohorts,
                    rhymes,
                }
            })
            .collect();
        Self::from_records(records)
    }
}

/// Shares the target's first two phonemes.
fn is_cohort_of(target: &[char], word: &[char]) -> bool {
    target.len() > 1 && word.starts_with(&target[..2])
}

/// Shares everything after the target's onset, within one phoneme of length,
/// or is the target with one extra onset phoneme.
fn is_rhyme_of(target: &[char], word: &[char]) -> bool {
    let end = if target.len() > 1 { &target[1..] } else { target };
    let same_or_shorter = word.len() == target.len() || word.len() + 1 == target.len();
    if word.ends_with(end) && same_or_shorter {
        return true;
    }
    word.len() == target.len() + 1 && &word[1..] == target
}

/// Reads the `Phonology` column of a lexicon CSV (header row required).
pub fn read_lexicon(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|e| AnalysisError::io(path, e))?,
        None => return Ok(Vec::new()),
    };
    let col = header
        .split(',')
        .position(|h| h.trim().trim_start_matches('\u{feff}') == "Phonology")
        .ok_or_else(|| {
            AnalysisError::InvalidConfig(format!(
                "{}: no `Phonology` column in header",
                path.display()
            ))
        })?;

    let mut words = Vec::new();
    for line in lines {
        let line = line.map_err(|e| AnalysisError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(w) = line.split(',').nth(col).map(str::trim).filter(|w| !w.is_empty()) {
            words.push(w.to_string());
        }
    }
    Ok(words)
}
