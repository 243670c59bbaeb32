use std::collections::HashMap;

use crate::models::{
    ActionType, BatchAnalysisResult, BatchSummary, EntryGroup, NewDimensionValue, SuggestionType,
};

/// Collect processed groups into the batch result.
///
/// Groups keep their input order. New dimension values are de-duplicated by
/// dimension (ignoring case) and value, ordered by the first row that proposed them.
pub fn assemble(groups: Vec<EntryGroup>, input_checksum: String, timed_out: bool) -> BatchAnalysisResult {
    let mut new_values: Vec<NewDimensionValue> = Vec::new();
    let mut seen: HashMap<(String, String), usize> = HashMap::new();

    let mut all: Vec<_> = groups
        .iter()
        .flat_map(|g| g.ai_suggestions.iter())
        .filter_map(|s| {
            let action = s.action.as_ref()?;
            if action.action_type != ActionType::CreateDimensionValue {
                return None;
            }
            let dimension = action.payload.get("dimension")?.as_str()?;
            let value = action.payload.get("value")?.as_str()?;
            Some((s.original_row, dimension, value))
        })
        .collect();
    all.sort_by_key(|(row, _, _)| *row);

    for (row, dimension, value) in all {
        let key = (dimension.to_lowercase(), value.to_string());
        match seen.get(&key) {
            Some(&idx) => {
                let rows = &mut new_values[idx].rows;
                if !rows.contains(&row) {
                    rows.push(row);
                }
            }
            None => {
                seen.insert(key, new_values.len());
                new_values.push(NewDimensionValue {
                    dimension: dimension.to_string(),
                    value: value.to_string(),
                    rows: vec![row],
                });
            }
        }
    }

    let suggestions = groups.iter().flat_map(|g| g.ai_suggestions.iter());
    let batch_summary = BatchSummary {
        total_entries: groups.len(),
        valid_entries: groups.iter().filter(|g| g.is_valid).count(),
        entries_with_errors: groups.iter().filter(|g| !g.errors.is_empty()).count(),
        new_dimension_values: new_values.len(),
        total_suggestions: suggestions
            .clone()
            .filter(|s| s.suggestion_type == SuggestionType::Suggestion)
            .count(),
        total_anomalies: suggestions
            .filter(|s| s.suggestion_type == SuggestionType::Anomaly)
            .count(),
    };

    BatchAnalysisResult {
        batch_summary,
        entry_groups: groups,
        new_dimension_value_suggestions: new_values,
        input_checksum,
        timed_out,
    }
}
