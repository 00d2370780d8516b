use crate::cost::classifier::ModelClass;
use crate::cost::entry::UsageEntry;
use crate::cost::pricing::{CostBreakdown, PricingTable, TokenUsage};
use crate::cost::reader::{JsonlReader, LineOutcome, DEFAULT_CHUNK_SIZE};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

const SESSION_LOG_EXTENSION: &str = ".jsonl";
const DELETED_MARKER: &str = ".deleted";

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("failed to read sessions directory {}: {source}", path.display())]
    SessionsDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Buckets stay separate per raw model id even when they share a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatsKey {
    pub class: ModelClass,
    pub model: String,
}

impl StatsKey {
    pub fn for_model(model: &str) -> Self {
        Self {
            class: ModelClass::classify(model),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelStats {
    pub tokens: TokenUsage,
    pub cost: CostBreakdown,
    pub message_count: u64,
}

impl ModelStats {
    pub fn record(&mut self, entry: &UsageEntry) {
        self.tokens.add(&entry.tokens);
        self.cost.add(&entry.cost);
        self.message_count += 1;
    }

    pub fn merge(&mut self, other: &ModelStats) {
        self.tokens.add(&other.tokens);
        self.cost.add(&other.cost);
        self.message_count += other.message_count;
    }

    pub fn total_tokens(&self) -> u64 {
        self.tokens.total()
    }

    pub fn total_cost(&self) -> f64 {
        self.cost.total()
    }
}

/// Unrounded totals for one calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub date: NaiveDate,
    pub models: BTreeMap<StatsKey, ModelStats>,
    pub totals: ModelStats,
    pub sessions: BTreeSet<String>,
    pub failed_files: Vec<PathBuf>,
    pub malformed_lines: usize,
}

impl AggregateResult {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            models: BTreeMap::new(),
            totals: ModelStats::default(),
            sessions: BTreeSet::new(),
            failed_files: Vec::new(),
            malformed_lines: 0,
        }
    }

    pub fn includes(&self, entry: &UsageEntry) -> bool {
        entry.date() == Some(self.date)
    }

    /// Folds the entry in if it falls on this result's date.
    pub fn record(&mut self, entry: &UsageEntry) -> bool {
        if !self.includes(entry) {
            return false;
        }

        self.models
            .entry(StatsKey::for_model(&entry.model))
            .or_default()
            .record(entry);
        self.totals.record(entry);

        if !entry.session_id.is_empty() {
            self.sessions.insert(entry.session_id.clone());
        }
        true
    }

    pub fn merge(&mut self, other: AggregateResult) {
        for (key, stats) in other.models {
            self.models.entry(key).or_default().merge(&stats);
        }
        self.totals.merge(&other.totals);
        self.sessions.extend(other.sessions);
        self.failed_files.extend(other.failed_files);
        self.malformed_lines += other.malformed_lines;
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub sessions_dir: PathBuf,
    pub chunk_size: usize,
    pub pricing: PricingTable,
}

impl AggregatorConfig {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pricing: PricingTable::default(),
        }
    }
}

/// Rebuilds a day's totals from the session logs on every call.
///
/// Holds no state between runs, so concurrent runs need no coordination.
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn is_session_log(file_name: &str) -> bool {
        file_name.ends_with(SESSION_LOG_EXTENSION) && !file_name.contains(DELETED_MARKER)
    }

    /// Eligible log files in sorted order so float sums are reproducible.
    pub fn session_files(&self) -> Result<Vec<PathBuf>, AggregateError> {
        let dir = &self.config.sessions_dir;
        let entries = std::fs::read_dir(dir).map_err(|source| AggregateError::SessionsDir {
            path: dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(?dir, error = %e, "Failed to read directory entry");
                    continue;
                }
            };

            let name = entry.file_name();
            if name.to_str().is_some_and(Self::is_session_log) {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn scan_file(&self, path: &Path, date: NaiveDate) -> io::Result<AggregateResult> {
        let mut partial = AggregateResult::new(date);
        let reader = JsonlReader::open(path, &self.config.pricing, self.config.chunk_size)?;

        for outcome in reader {
            match outcome? {
                LineOutcome::Entry(entry) => {
                    partial.record(&entry);
                }
                LineOutcome::Skipped => {}
                LineOutcome::Malformed(err) => {
                    tracing::trace!(?path, error = %err, "Skipping malformed line");
                    partial.malformed_lines += 1;
                }
            }
        }

        Ok(partial)
    }

    pub fn aggregate(&self, date: NaiveDate) -> Result<AggregateResult, AggregateError> {
        let files = self.session_files()?;
        tracing::debug!(
            dir = ?self.config.sessions_dir,
            count = files.len(),
            %date,
            "Aggregating session logs"
        );

        let mut result = AggregateResult::new(date);

        for file in files {
            match self.scan_file(&file, date) {
                Ok(partial) => result.merge(partial),
                Err(e) => {
                    tracing::warn!(?file, error = %e, "Failed to read session log, skipping");
                    result.failed_files.push(file);
                }
            }
        }

        tracing::debug!(
            %date,
            messages = result.totals.message_count,
            sessions = result.active_sessions(),
            malformed = result.malformed_lines,
            failed = result.failed_files.len(),
            "Aggregation finished"
        );

        Ok(result)
    }
}
