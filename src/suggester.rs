use regex::Regex;
use serde_json::json;
use tracing::warn;

use crate::cache::ReferenceCache;
use crate::fmt::money;
use crate::models::{
    AccountRule, ActionType, DimensionDefinition, EntryGroup, LineRecord, MatchType, Suggestion,
    SuggestionAction, SuggestionType,
};
use crate::reference::{find_dimension, ResolveError};

const NAME_MATCH_CONFIDENCE: f64 = 0.7;
const CODE_MATCH_CONFIDENCE: f64 = 0.6;
const REGEX_RULE_CONFIDENCE: f64 = 0.8;
const NEW_VALUE_CONFIDENCE: f64 = 1.0;
const HIGH_VALUE_CONFIDENCE: f64 = 0.6;
const MIN_CODE_MATCH_LEN: usize = 3;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyThresholds {
    /// Standard deviations from the account mean before a line is flagged.
    pub std_devs: f64,
    /// Fixed absolute threshold in minor units, used when no baseline exists.
    pub high_value_cents: i64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            std_devs: 3.0,
            high_value_cents: 1_000_000,
        }
    }
}

impl AnomalyThresholds {
    /// Replace values that cannot describe a threshold. `std_devs` must be a
    /// positive finite number; the high-value threshold is taken as a magnitude.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let std_devs = if self.std_devs.is_finite() && self.std_devs > 0.0 {
            self.std_devs
        } else {
            warn!(std_devs = self.std_devs, fallback = defaults.std_devs, "ignoring invalid anomaly threshold");
            defaults.std_devs
        };
        Self {
            std_devs,
            high_value_cents: self.high_value_cents.saturating_abs(),
        }
    }
}

struct CompiledRule {
    rule: AccountRule,
    regex: Option<Regex>,
}

impl CompiledRule {
    /// Confidence of a match against `description`, or `None` when the rule does not match.
    fn score(&self, description: &str) -> Option<f64> {
        let desc_upper = description.to_uppercase();
        let pat_upper = self.rule.pattern.to_uppercase();
        let coverage = (pat_upper.chars().count() as f64 / desc_upper.chars().count().max(1) as f64).min(1.0);
        match self.rule.match_type {
            MatchType::Contains => desc_upper
                .contains(&pat_upper)
                .then(|| round2(0.5 + 0.4 * coverage)),
            MatchType::StartsWith => desc_upper
                .starts_with(&pat_upper)
                .then(|| round2(0.55 + 0.4 * coverage)),
            MatchType::Regex => self
                .regex
                .as_ref()
                .filter(|re| re.is_match(description))
                .map(|_| REGEX_RULE_CONFIDENCE),
        }
    }
}

struct ValuePattern {
    code: String,
    regex: Regex,
    confidence: f64,
}

struct DimensionVocabulary {
    dimension: String,
    patterns: Vec<ValuePattern>,
}

fn word_regex(text: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(text.trim()))).ok()
}

/// Advisory annotations for each line of a group. Built once per batch.
pub struct Suggester {
    rules: Vec<CompiledRule>,
    vocabulary: Vec<DimensionVocabulary>,
    dimensions: Vec<DimensionDefinition>,
    thresholds: AnomalyThresholds,
}

impl Suggester {
    pub fn new(mut rules: Vec<AccountRule>, dimensions: &[DimensionDefinition], thresholds: AnomalyThresholds) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        let rules = rules
            .into_iter()
            .filter(|r| !r.pattern.trim().is_empty())
            .filter_map(|rule| {
                let regex = match rule.match_type {
                    MatchType::Regex => match Regex::new(&rule.pattern) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            warn!(pattern = %rule.pattern, error = %e, "skipping rule with invalid regex");
                            return None;
                        }
                    },
                    _ => None,
                };
                Some(CompiledRule { rule, regex })
            })
            .collect();

        let vocabulary = dimensions
            .iter()
            .map(|def| {
                let mut patterns = Vec::new();
                for value in &def.values {
                    if let Some(name) = value.name.as_deref().filter(|n| !n.trim().is_empty()) {
                        if let Some(regex) = word_regex(name) {
                            patterns.push(ValuePattern {
                                code: value.code.clone(),
                                regex,
                                confidence: NAME_MATCH_CONFIDENCE,
                            });
                        }
                    }
                }
                for value in &def.values {
                    if value.code.trim().chars().count() >= MIN_CODE_MATCH_LEN {
                        if let Some(regex) = word_regex(&value.code) {
                            patterns.push(ValuePattern {
                                code: value.code.clone(),
                                regex,
                                confidence: CODE_MATCH_CONFIDENCE,
                            });
                        }
                    }
                }
                DimensionVocabulary {
                    dimension: def.name.clone(),
                    patterns,
                }
            })
            .collect();

        Self {
            rules,
            vocabulary,
            dimensions: dimensions.to_vec(),
            thresholds: thresholds.sanitized(),
        }
    }

    /// Every suggestion for the group, sorted by original row.
    ///
    /// Fails only when the dimension source is unavailable as a whole.
    pub fn suggest_group(&self, group: &EntryGroup, refs: &ReferenceCache) -> Result<Vec<Suggestion>, ResolveError> {
        let mut suggestions = Vec::new();
        for line in &group.lines {
            suggestions.extend(self.account_suggestion(line));
            suggestions.extend(self.dimension_suggestions(line));
            suggestions.extend(self.new_value_suggestions(line, refs)?);
            suggestions.extend(self.anomaly(line, refs));
        }
        suggestions.sort_by_key(|s| s.original_row);
        Ok(suggestions)
    }

    fn account_suggestion(&self, line: &LineRecord) -> Option<Suggestion> {
        if line.description.trim().is_empty() {
            return None;
        }
        let (compiled, confidence) = self
            .rules
            .iter()
            .find_map(|c| c.score(&line.description).map(|conf| (c, conf)))?;
        let rule = &compiled.rule;
        if line.account_code.as_deref() == Some(rule.account_code.as_str()) {
            return None;
        }
        let vendor_note = rule
            .vendor
            .as_deref()
            .map(|v| format!(" ({v})"))
            .unwrap_or_default();
        Some(Suggestion {
            suggestion_type: SuggestionType::Suggestion,
            message: format!(
                "Description matches '{}'{vendor_note}; consider account {}",
                rule.pattern, rule.account_code
            ),
            confidence,
            original_row: line.original_row,
            action: Some(SuggestionAction {
                action_type: ActionType::ChangeAccount,
                payload: json!({
                    "accountCode": rule.account_code,
                    "vendor": rule.vendor,
                    "pattern": rule.pattern,
                }),
            }),
        })
    }

    fn dimension_suggestions(&self, line: &LineRecord) -> Vec<Suggestion> {
        if line.description.trim().is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for vocab in &self.vocabulary {
            let already_tagged = line
                .dimensions
                .keys()
                .any(|name| name.trim().eq_ignore_ascii_case(&vocab.dimension));
            if already_tagged {
                continue;
            }
            let Some(hit) = vocab.patterns.iter().find(|p| p.regex.is_match(&line.description)) else {
                continue;
            };
            out.push(Suggestion {
                suggestion_type: SuggestionType::Suggestion,
                message: format!(
                    "Description mentions {} value {}; consider tagging it",
                    vocab.dimension, hit.code
                ),
                confidence: hit.confidence,
                original_row: line.original_row,
                action: Some(SuggestionAction {
                    action_type: ActionType::AddDimensionTag,
                    payload: json!({ "dimension": vocab.dimension, "value": hit.code }),
                }),
            });
        }
        out
    }

    fn new_value_suggestions(&self, line: &LineRecord, refs: &ReferenceCache) -> Result<Vec<Suggestion>, ResolveError> {
        let mut out = Vec::new();
        for (name, value) in &line.dimensions {
            let Some(def) = find_dimension(&self.dimensions, name) else {
                continue;
            };
            match refs.dimension_value_exists(&def.name, value) {
                Ok(true) => {}
                Ok(false) => out.push(Suggestion {
                    suggestion_type: SuggestionType::Suggestion,
                    message: format!("'{value}' is not an existing {} value; create it", def.name),
                    confidence: NEW_VALUE_CONFIDENCE,
                    original_row: line.original_row,
                    action: Some(SuggestionAction {
                        action_type: ActionType::CreateDimensionValue,
                        payload: json!({ "dimension": def.name, "value": value }),
                    }),
                }),
                Err(ResolveError::Lookup(reason)) => {
                    warn!(row = line.original_row, dimension = %def.name, %value, %reason, "dimension value lookup failed");
                }
                Err(e @ ResolveError::Unavailable(_)) => return Err(e),
            }
        }
        Ok(out)
    }

    fn anomaly(&self, line: &LineRecord, refs: &ReferenceCache) -> Option<Suggestion> {
        if !line.missing_fields.is_empty() || line.amount_cents == 0 {
            return None;
        }
        let abs = line.amount_cents.unsigned_abs() as f64;

        let baseline = line.account_code.as_deref().and_then(|code| match refs.baseline(code) {
            Ok(baseline) => baseline,
            Err(e) => {
                warn!(row = line.original_row, account = %code, error = %e, "baseline lookup failed");
                None
            }
        });

        if let (Some(code), Some(b)) = (line.account_code.as_deref(), baseline.filter(|b| b.stddev_cents > 0.0)) {
            let z = (abs - b.mean_cents).abs() / b.stddev_cents;
            if z <= self.thresholds.std_devs {
                return None;
            }
            return Some(Suggestion {
                suggestion_type: SuggestionType::Anomaly,
                message: format!(
                    "Amount {} is {z:.1} standard deviations from the usual {} for account {code}",
                    money(line.amount_cents),
                    money(b.mean_cents.round() as i64),
                ),
                confidence: round2(0.5 + 0.5 * (1.0 - self.thresholds.std_devs / z)).clamp(0.0, 1.0),
                original_row: line.original_row,
                action: None,
            });
        }

        if line.amount_cents.unsigned_abs() > self.thresholds.high_value_cents.unsigned_abs() {
            return Some(Suggestion {
                suggestion_type: SuggestionType::Anomaly,
                message: format!(
                    "Amount {} exceeds the high-value threshold of {}",
                    money(line.amount_cents),
                    money(self.thresholds.high_value_cents),
                ),
                confidence: HIGH_VALUE_CONFIDENCE,
                original_row: line.original_row,
                action: None,
            });
        }
        None
    }
}
