use std::collections::HashSet;

use tracing::{debug, warn};

use crate::models::{Boundary, EntryGroup, LineRecord};

/// Partition the ordered line stream into entry groups.
///
/// Contiguous runs sharing a non-blank group key become one group each. Runs of
/// unkeyed lines are cut greedily at the earliest row where the running balance
/// returns to zero with at least two lines buffered. Lines left open when a run
/// ends form a final `EndOfStream` group.
pub fn group_lines(lines: Vec<LineRecord>) -> Vec<EntryGroup> {
    let mut groups = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut run: Vec<LineRecord> = Vec::new();
    let mut run_key: Option<String> = None;

    for line in lines {
        if !run.is_empty() && line.group_key != run_key {
            flush_run(std::mem::take(&mut run), run_key.take(), &mut groups, &mut seen_keys);
        }
        if run.is_empty() {
            run_key = line.group_key.clone();
        }
        run.push(line);
    }
    if !run.is_empty() {
        flush_run(run, run_key, &mut groups, &mut seen_keys);
    }

    debug!(groups = groups.len(), "grouped batch");
    groups
}

fn flush_run(
    run: Vec<LineRecord>,
    key: Option<String>,
    groups: &mut Vec<EntryGroup>,
    seen_keys: &mut HashSet<String>,
) {
    match key {
        Some(key) => {
            if !seen_keys.insert(key.clone()) {
                warn!(group_key = %key, row = run[0].original_row, "group key reappears after a different key; starting a new group");
            }
            let index = groups.len();
            groups.push(EntryGroup::new(index, Some(key), Boundary::GroupKey, run));
        }
        None => partition_zero_balance(run, groups),
    }
}

fn partition_zero_balance(run: Vec<LineRecord>, groups: &mut Vec<EntryGroup>) {
    let mut buffer: Vec<LineRecord> = Vec::new();
    // i128 so that no run of i64 amounts can wrap back to a false zero
    let mut balance: i128 = 0;

    for line in run {
        balance += i128::from(line.amount_cents);
        buffer.push(line);
        if balance == 0 && buffer.len() >= 2 {
            let index = groups.len();
            groups.push(EntryGroup::new(index, None, Boundary::ZeroBalance, std::mem::take(&mut buffer)));
        }
    }

    if !buffer.is_empty() {
        let index = groups.len();
        groups.push(EntryGroup::new(index, None, Boundary::EndOfStream, buffer));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;

    fn line(row: u32, account: &str, cents: i64) -> LineRecord {
        LineRecord {
            original_row: row,
            account_code: Some(account.to_string()),
            amount_cents: cents,
            description: String::new(),
            date: None,
            group_key: None,
            dimensions: BTreeMap::new(),
            missing_fields: Vec::new(),
        }
    }

    fn keyed(row: u32, key: &str, cents: i64) -> LineRecord {
        LineRecord {
            group_key: Some(key.to_string()),
            ..line(row, "1000", cents)
        }
    }

    fn sizes(groups: &[EntryGroup]) -> Vec<usize> {
        groups.iter().map(|g| g.lines.len()).collect()
    }

    #[test]
    fn test_single_balanced_pair() {
        let groups = group_lines(vec![line(1, "A", 10000), line(2, "B", -10000)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].lines.len(), 2);
        assert_eq!(groups[0].balance_cents, 0);
        assert_eq!(groups[0].boundary, Boundary::ZeroBalance);
    }

    #[test]
    fn test_greedy_earliest_boundary() {
        let groups = group_lines(vec![
            line(1, "A", 50000),
            line(2, "B", -50000),
            line(3, "A", 75000),
            line(4, "B", -75000),
        ]);
        assert_eq!(sizes(&groups), vec![2, 2]);
        assert_eq!(groups[0].last_row(), 2);
        assert_eq!(groups[1].last_row(), 4);
        assert_eq!(groups[1].group_index, 1);
    }

    #[test]
    fn test_multi_line_entry_closes_on_return_to_zero() {
        let groups = group_lines(vec![
            line(1, "A", 30000),
            line(2, "B", -10000),
            line(3, "C", -20000),
            line(4, "A", 500),
            line(5, "B", -500),
        ]);
        assert_eq!(sizes(&groups), vec![3, 2]);
    }

    #[test]
    fn test_trailing_open_rows_form_end_of_stream_group() {
        let groups = group_lines(vec![line(1, "A", 100), line(2, "B", -100), line(3, "C", 4200)]);
        assert_eq!(sizes(&groups), vec![2, 1]);
        assert_eq!(groups[1].boundary, Boundary::EndOfStream);
        assert_eq!(groups[1].balance_cents, 4200);
    }

    #[test]
    fn test_lone_zero_row_is_not_its_own_group() {
        let groups = group_lines(vec![line(1, "A", 0), line(2, "B", 100), line(3, "C", -100)]);
        assert_eq!(sizes(&groups), vec![3]);
        assert_eq!(groups[0].lines[0].original_row, 1);
        assert_eq!(groups[0].balance_cents, 0);
    }

    #[test]
    fn test_trailing_lone_zero_row_stays_open() {
        let groups = group_lines(vec![line(1, "A", 100), line(2, "B", -100), line(3, "C", 0)]);
        assert_eq!(sizes(&groups), vec![2, 1]);
        assert_eq!(groups[1].boundary, Boundary::EndOfStream);
        assert_eq!(groups[1].balance_cents, 0);
    }

    #[test]
    fn test_explicit_keys_group_contiguous_runs() {
        let groups = group_lines(vec![
            keyed(1, "J1", 100),
            keyed(2, "J1", -50),
            keyed(3, "J1", -50),
            keyed(4, "J2", 100),
            keyed(5, "J2", -100),
        ]);
        assert_eq!(sizes(&groups), vec![3, 2]);
        assert_eq!(groups[0].group_key.as_deref(), Some("J1"));
        assert_eq!(groups[1].boundary, Boundary::GroupKey);
    }

    #[test]
    fn test_explicit_key_overrides_zero_balance_cut() {
        let groups = group_lines(vec![
            keyed(1, "J1", 100),
            keyed(2, "J1", -100),
            keyed(3, "J1", 200),
            keyed(4, "J1", -200),
        ]);
        assert_eq!(sizes(&groups), vec![4]);
    }

    #[test]
    fn test_reappearing_key_starts_new_group() {
        let groups = group_lines(vec![
            keyed(1, "J1", 100),
            keyed(2, "J2", -100),
            keyed(3, "J1", -100),
        ]);
        assert_eq!(sizes(&groups), vec![1, 1, 1]);
    }

    #[test]
    fn test_unkeyed_rows_between_keys_fall_back_to_zero_balance() {
        let groups = group_lines(vec![
            keyed(1, "J1", 100),
            keyed(2, "J1", -100),
            line(3, "A", 10),
            line(4, "B", -10),
            line(5, "A", 7),
            line(6, "B", -7),
        ]);
        assert_eq!(sizes(&groups), vec![2, 2, 2]);
        assert_eq!(groups[1].boundary, Boundary::ZeroBalance);
    }

    #[test]
    fn test_extreme_amounts_do_not_overflow_or_fake_a_boundary() {
        let groups = group_lines(vec![
            line(1, "A", i64::MAX),
            line(2, "A", i64::MAX),
            line(3, "B", 2),
            line(4, "B", i64::MIN),
            line(5, "B", i64::MIN),
        ]);
        assert_eq!(sizes(&groups), vec![5]);
        assert_eq!(groups[0].boundary, Boundary::ZeroBalance);
        assert_eq!(groups[0].balance_cents, 0);

        let open = group_lines(vec![line(1, "A", i64::MAX), line(2, "A", i64::MAX), line(3, "B", -1)]);
        assert_eq!(sizes(&open), vec![3]);
        assert_eq!(open[0].boundary, Boundary::EndOfStream);
        assert_eq!(open[0].balance_cents, i64::MAX);
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        assert!(group_lines(Vec::new()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_partition_preserves_lines(amounts in prop::collection::vec(-500i64..500, 0..60)) {
            let lines: Vec<LineRecord> = amounts
                .iter()
                .enumerate()
                .map(|(i, a)| line(i as u32 + 2, "1000", *a))
                .collect();
            let groups = group_lines(lines.clone());
            let rejoined: Vec<LineRecord> = groups.iter().flat_map(|g| g.lines.clone()).collect();
            prop_assert_eq!(rejoined, lines);
            for (i, g) in groups.iter().enumerate() {
                prop_assert_eq!(g.group_index, i);
                prop_assert_eq!(g.balance_cents, g.lines.iter().map(|l| l.amount_cents).sum::<i64>());
            }
        }

        #[test]
        fn prop_closed_groups_are_minimal_and_balanced(amounts in prop::collection::vec(-300i64..300, 0..60)) {
            let lines: Vec<LineRecord> = amounts
                .iter()
                .enumerate()
                .map(|(i, a)| line(i as u32 + 2, "1000", *a))
                .collect();
            for g in group_lines(lines) {
                if g.boundary == Boundary::ZeroBalance {
                    prop_assert_eq!(g.balance_cents, 0);
                    prop_assert!(g.lines.len() >= 2);
                    let mut running = 0i64;
                    for (i, l) in g.lines.iter().enumerate().take(g.lines.len() - 1) {
                        running += l.amount_cents;
                        prop_assert!(!(running == 0 && i >= 1), "group could have closed earlier");
                    }
                }
            }
        }
    }
}
