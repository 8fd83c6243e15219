//! Resume filtering over a prior run's row log.
//!
//! Only rows whose most recent entry is `OK` are skipped on resume. WARN,
//! ERROR, and DRY_RUN rows are always re-attempted: a dry run writes
//! nothing, and a degraded row deserves a second pass.

use std::collections::BTreeSet;

use crate::core::csvline;
use crate::core::types::Stage;

/// Column order of the row log. Resume parsing and ledger writing must
/// agree on this.
pub const ROW_LOG_COLUMNS: [&str; 9] = [
    "ts",
    "row_index",
    "stage",
    "reason_code",
    "idsbr",
    "nama",
    "match_value",
    "note",
    "screenshot",
];

/// One parsed row-log entry. Unparseable lines are dropped by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeRecord {
    pub row_index: u32,
    pub stage: Stage,
}

/// Parse row-log CSV text into records, in file order.
///
/// Lines that do not carry a numeric `row_index` and a known stage are
/// ignored; a prior run that crashed mid-write must not poison resume.
pub fn parse_row_log(text: &str) -> Vec<ResumeRecord> {
    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns = csvline::split(header);
    let Some(index_col) = columns.iter().position(|c| c == "row_index") else {
        return Vec::new();
    };
    let Some(stage_col) = columns.iter().position(|c| c == "stage") else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = csvline::split(line);
        let Some(row_index) = fields.get(index_col).and_then(|v| v.parse::<u32>().ok()) else {
            continue;
        };
        let Some(stage) = fields.get(stage_col).and_then(|v| Stage::parse(v)) else {
            continue;
        };
        records.push(ResumeRecord { row_index, stage });
    }
    records
}

/// Rows to skip: most recent entry is OK and the row falls inside the
/// inclusive `[start, end]` display range.
pub fn eligible_rows(records: &[ResumeRecord], start: u32, end: u32) -> BTreeSet<u32> {
    let mut latest: std::collections::BTreeMap<u32, Stage> = std::collections::BTreeMap::new();
    for record in records {
        latest.insert(record.row_index, record.stage);
    }
    latest
        .into_iter()
        .filter(|(idx, stage)| *idx >= start && *idx <= end && *stage == Stage::Ok)
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn log(rows: &[(u32, &str)]) -> String {
        let mut text = ROW_LOG_COLUMNS.join(",");
        text.push('\n');
        for (idx, stage) in rows {
            text.push_str(&format!(
                "2026-08-29T10:00:00,{idx},{stage},,123,Toko,{idx},note,\n"
            ));
        }
        text
    }

    #[test]
    fn parses_rows_and_ignores_garbage() {
        let mut text = log(&[(1, "OK"), (2, "ERROR")]);
        text.push_str("not,a,valid,line\n");
        let records = parse_row_log(&text);
        assert_eq!(
            records,
            vec![
                ResumeRecord {
                    row_index: 1,
                    stage: Stage::Ok
                },
                ResumeRecord {
                    row_index: 2,
                    stage: Stage::Error
                },
            ]
        );
    }

    #[test]
    fn only_ok_rows_are_eligible() {
        let records = parse_row_log(&log(&[(1, "OK"), (2, "ERROR"), (3, "WARN"), (4, "DRY_RUN")]));
        let eligible = eligible_rows(&records, 1, 10);
        assert_eq!(eligible.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn latest_entry_per_row_wins() {
        // Row 2 failed first, then succeeded in a later attempt.
        let records = parse_row_log(&log(&[(2, "ERROR"), (2, "OK"), (3, "OK"), (3, "ERROR")]));
        let eligible = eligible_rows(&records, 1, 10);
        assert_eq!(eligible.into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn range_filter_is_inclusive() {
        let records = parse_row_log(&log(&[(1, "OK"), (5, "OK"), (9, "OK")]));
        let eligible = eligible_rows(&records, 5, 9);
        assert_eq!(eligible.into_iter().collect::<Vec<_>>(), vec![5, 9]);
    }

    #[test]
    fn missing_header_yields_nothing() {
        assert!(parse_row_log("").is_empty());
        assert!(parse_row_log("a,b,c\n1,2,3\n").is_empty());
    }
}
