use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::assembler::assemble;
use crate::cache::ReferenceCache;
use crate::error::{BatchError, Result};
use crate::grouper::group_lines;
use crate::models::{
    BatchAnalysisResult, DimensionDefinition, EntryGroup, ErrorType, LineRecord, RawImportRow, Suggestion,
    ValidationError,
};
use crate::normalizer::normalize_rows;
use crate::reference::{ReferenceData, Resolved};
use crate::settings::Settings;
use crate::suggester::{AnomalyThresholds, Suggester};
use crate::validator::validate_group;

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub client_id: String,
    pub group_key_column: Option<String>,
    pub thresholds: AnomalyThresholds,
    /// Groups analyzed in parallel. `1` runs on the calling thread.
    pub workers: usize,
    /// Groups not started by this instant are marked `TIMEOUT`.
    pub deadline: Option<Instant>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl AnalyzeOptions {
    /// Options from persisted settings. A configured timeout starts counting now.
    ///
    /// Unusable thresholds fall back to their defaults and `workers` is at least 1.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            group_key_column: settings.group_key_column.clone(),
            thresholds: AnomalyThresholds {
                std_devs: settings.anomaly_std_devs,
                high_value_cents: settings.high_value_threshold_cents,
            }
            .sanitized(),
            workers: settings.workers.max(1),
            deadline: settings
                .timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
        }
    }
}

enum GroupOutcome {
    Processed {
        errors: Vec<ValidationError>,
        suggestions: Vec<Suggestion>,
    },
    TimedOut,
}

/// Everything shared by the workers of one batch.
struct BatchContext<'a> {
    cache: ReferenceCache<'a>,
    dimensions: Vec<DimensionDefinition>,
    suggester: Suggester,
    deadline: Option<Instant>,
}

impl BatchContext<'_> {
    fn process(&self, group: &EntryGroup) -> Resolved<GroupOutcome> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(GroupOutcome::TimedOut);
        }
        let errors = validate_group(group, &self.cache, &self.dimensions)?;
        let suggestions = self.suggester.suggest_group(group, &self.cache)?;
        Ok(GroupOutcome::Processed { errors, suggestions })
    }

    fn run(&self, groups: &[EntryGroup], workers: usize) -> Resolved<Vec<GroupOutcome>> {
        if workers <= 1 || groups.len() <= 1 {
            return groups.iter().map(|g| self.process(g)).collect();
        }

        let next = &AtomicUsize::new(0);
        let failed = &AtomicBool::new(false);
        let finished: Vec<Vec<(usize, Resolved<GroupOutcome>)>> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers.min(groups.len()))
                .map(|_| {
                    s.spawn(move || {
                        let mut done = Vec::new();
                        while !failed.load(Ordering::Relaxed) {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            let Some(group) = groups.get(i) else {
                                break;
                            };
                            let outcome = self.process(group);
                            if outcome.is_err() {
                                failed.store(true, Ordering::Relaxed);
                            }
                            done.push((i, outcome));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut slots: Vec<Option<GroupOutcome>> = groups.iter().map(|_| None).collect();
        let mut first_failure: Option<(usize, _)> = None;
        for (i, outcome) in finished.into_iter().flatten() {
            match outcome {
                Ok(o) => slots[i] = Some(o),
                Err(e) => {
                    if first_failure.as_ref().map_or(true, |(j, _)| i < *j) {
                        first_failure = Some((i, e));
                    }
                }
            }
        }
        if let Some((_, e)) = first_failure {
            return Err(e);
        }
        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or(GroupOutcome::TimedOut))
            .collect())
    }
}

fn checksum(lines: &[LineRecord]) -> Result<String> {
    let bytes = serde_json::to_vec(lines)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Group, validate and annotate one batch of imported rows.
///
/// Row and group defects are reported inside the result. The call itself fails
/// only for an empty batch or when the chart of accounts or dimension list
/// cannot be reached at all. Nothing is written anywhere.
pub fn analyze_batch(
    rows: &[RawImportRow],
    reference: &dyn ReferenceData,
    options: &AnalyzeOptions,
) -> Result<BatchAnalysisResult> {
    if rows.is_empty() {
        return Err(BatchError::EmptyInput);
    }
    let lines = normalize_rows(rows, options.group_key_column.as_deref());
    if lines.is_empty() {
        return Err(BatchError::EmptyInput);
    }
    let input_checksum = checksum(&lines)?;

    let mut groups = group_lines(lines);

    let dimensions = reference.list_dimensions(&options.client_id)?;
    let vocabulary = reference
        .account_vocabulary(&options.client_id)
        .unwrap_or_else(|e| {
            warn!(error = %e, "account vocabulary unavailable; skipping account recommendations");
            Vec::new()
        });

    let ctx = BatchContext {
        cache: ReferenceCache::new(reference, &options.client_id),
        suggester: Suggester::new(vocabulary, &dimensions, options.thresholds),
        dimensions,
        deadline: options.deadline,
    };

    debug!(groups = groups.len(), workers = options.workers, "analyzing groups");
    let outcomes = ctx.run(&groups, options.workers)?;

    let mut timed_out = false;
    for (group, outcome) in groups.iter_mut().zip(outcomes) {
        match outcome {
            GroupOutcome::Processed { errors, suggestions } => {
                group.is_valid = group.balance_cents == 0 && errors.is_empty();
                group.errors = errors;
                group.ai_suggestions = suggestions;
            }
            GroupOutcome::TimedOut => {
                timed_out = true;
                group.is_valid = false;
                group.errors = vec![ValidationError::new(
                    ErrorType::Timeout,
                    group.first_row(),
                    "Deadline passed before this entry was analyzed",
                )];
            }
        }
    }

    let result = assemble(groups, input_checksum, timed_out);
    let summary = &result.batch_summary;
    info!(
        entries = summary.total_entries,
        valid = summary.valid_entries,
        with_errors = summary.entries_with_errors,
        suggestions = summary.total_suggestions,
        anomalies = summary.total_anomalies,
        lookups = ctx.cache.lookups(),
        timed_out,
        "batch analyzed"
    );
    Ok(result)
}
