//! Source B aggregator: the API-usage (Workbench) ledger, plus the optional
//! questions CSV.
//!
//! The ledger's timestamps are shifted by a fixed +5 hours before the
//! calendar day is extracted, moving US-recorded events onto the reporting
//! timezone's day boundary. Each record's model is classified as embedding
//! vs. normal; embedding calls are indexing traffic and are kept out of the
//! adoption-intensity totals.

use crate::dates::{parse_timestamp, Period};
use crate::models::{WorkbenchAccumulator, WorkbenchRecord};
use crate::records::extract_records;
use crate::roster::Roster;
use anyhow::{Context, Result};
use chrono::Duration;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Hours added to each ledger timestamp before extracting the calendar day.
const LEDGER_DAY_SHIFT_HOURS: i64 = 5;

const EMBEDDING_PREFIXES: [&str; 4] = [
    "text-embedding-",
    "amazon.titan-embed-",
    "titan-embed-",
    "cohere.embed-",
];

/// Classify a model name as an embedding model.
pub fn is_embedding_model(model: &str) -> bool {
    if model.is_empty() {
        return false;
    }
    let lower = model.to_lowercase();
    if lower.contains("embed") {
        return true;
    }
    EMBEDDING_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Load and aggregate the API ledger into per-user accumulators keyed by
/// lowercased email. Records without an email or a parseable in-window date
/// are counted and skipped.
pub fn load_workbench_data(
    path: &Path,
    roster: &Roster,
    period: &Period,
) -> Result<HashMap<String, WorkbenchAccumulator>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Workbench usage file '{}' not found", path.display()))?;
    let (raw_records, skipped_lines) = extract_records(&content);

    let mut users: HashMap<String, WorkbenchAccumulator> = HashMap::new();
    let mut malformed_records = 0usize;
    let mut no_email = 0usize;
    let mut no_date = 0usize;
    let mut date_parse_errors = 0usize;
    let mut out_of_range = 0usize;
    let mut filtered_out = 0usize;
    let mut processed = 0usize;

    let total_records = raw_records.len();
    for raw in raw_records {
        let record: WorkbenchRecord = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(%err, "skipping malformed workbench record");
                malformed_records += 1;
                continue;
            }
        };

        let email = record.email.to_lowercase();
        if email.is_empty() {
            no_email += 1;
            continue;
        }
        if record.date.is_empty() {
            no_date += 1;
            continue;
        }

        let day = match parse_timestamp(&record.date) {
            Ok(ts) => (ts + Duration::hours(LEDGER_DAY_SHIFT_HOURS)).date(),
            Err(err) => {
                if date_parse_errors < 3 {
                    warn!(email, date = record.date, %err, "workbench date parse error");
                }
                date_parse_errors += 1;
                continue;
            }
        };
        if !period.contains(day) {
            out_of_range += 1;
            continue;
        }
        if !roster.is_allowed(&email) {
            filtered_out += 1;
            continue;
        }

        let user = users.entry(email).or_insert_with(WorkbenchAccumulator::new);
        user.active_days.insert(day);

        let embedding = is_embedding_model(&record.model);
        if !record.model.is_empty() {
            user.models_used.insert(record.model.clone());
            *user.models_requests.entry(record.model.clone()).or_default() +=
                record.api_requests;
        }

        user.api_requests_total += record.api_requests;
        user.spend_total += record.spend;
        user.cache_read_tokens += record.cache_read_input_tokens;
        user.cache_creation_tokens += record.cache_creation_input_tokens;
        if embedding {
            user.api_requests_embedding += record.api_requests;
        } else {
            user.api_requests_normal += record.api_requests;
        }
        processed += 1;
    }

    info!(
        total_records,
        processed,
        malformed_records,
        no_email,
        no_date,
        date_parse_errors,
        out_of_range,
        filtered_out,
        skipped_lines,
        users = users.len(),
        "loaded workbench usage data"
    );
    Ok(users)
}

/// Load per-user question counts from the optional questions CSV. Reads the
/// `workbench_questions` column, falling back per row to the legacy
/// `workbench_prompts` column when the preferred cell is blank.
/// Emails outside the allow-list are excluded and listed once as a warning:
/// they are usually new hires missing from the roster.
pub fn load_workbench_questions(
    path: Option<&Path>,
    roster: &Roster,
) -> Result<HashMap<String, u64>> {
    let Some(path) = path else {
        info!("no workbench questions CSV provided; all users will have 0 questions");
        return Ok(HashMap::new());
    };
    if !path.exists() {
        warn!(path = %path.display(), "workbench questions CSV not found; all users will have 0 questions");
        return Ok(HashMap::new());
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let email_idx = headers
        .iter()
        .position(|h| h == "email")
        .with_context(|| format!("questions CSV '{}' has no 'email' column", path.display()))?;
    let questions_idx = headers.iter().position(|h| h == "workbench_questions");
    let prompts_idx = headers.iter().position(|h| h == "workbench_prompts");

    let mut questions = HashMap::new();
    let mut filtered: Vec<String> = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        let email = record
            .get(email_idx)
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if email.is_empty() {
            continue;
        }
        // Fall back to the legacy column cell by cell: a blank
        // workbench_questions value defers to workbench_prompts on that row.
        let count: u64 = questions_idx
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| {
                prompts_idx
                    .and_then(|idx| record.get(idx))
                    .map(str::trim)
            })
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        if roster.is_allowed(&email) {
            questions.insert(email, count);
        } else {
            filtered.push(email);
        }
    }

    info!(users = questions.len(), "loaded workbench questions");
    if !filtered.is_empty() {
        filtered.sort();
        filtered.dedup();
        warn!(
            count = filtered.len(),
            emails = ?filtered,
            "questions CSV users not in roster; excluded from the report"
        );
    }
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    fn september() -> Period {
        crate::dates::month_period("2025-09").unwrap()
    }

    #[test]
    fn classifies_embedding_models() {
        assert!(is_embedding_model("text-embedding-3-large"));
        assert!(is_embedding_model("amazon.titan-embed-text-v1"));
        assert!(is_embedding_model("Cohere.Embed-English"));
        assert!(is_embedding_model("voyage-embedding"));
        assert!(!is_embedding_model("gpt-4o"));
        assert!(!is_embedding_model(""));
    }

    #[test]
    fn splits_embedding_and_normal_requests() {
        let (_dir, path) = write_file(
            "api_usage.json",
            r#"[
                {"email":"a@x.com","date":"2025-09-02T10:00:00Z","model":"gpt-4o","api_requests":4,"spend":1.5},
                {"email":"a@x.com","date":"2025-09-02T11:00:00Z","model":"text-embedding-3-large","api_requests":100}
            ]"#,
        );
        let roster = Roster::from_emails(["a@x.com"]);
        let users = load_workbench_data(&path, &roster, &september()).unwrap();
        let user = &users["a@x.com"];
        assert_eq!(user.api_requests_total, 104);
        assert_eq!(user.api_requests_normal, 4);
        assert_eq!(user.api_requests_embedding, 100);
        assert_eq!(user.active_days.len(), 1);
        assert!((user.spend_total - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn day_shift_moves_late_evening_events_to_next_day() {
        // 20:00 UTC + 5h lands on the following calendar day.
        let (_dir, path) = write_file(
            "api_usage.json",
            r#"[{"email":"a@x.com","date":"2025-09-02T20:00:00Z","model":"gpt-4o","api_requests":1}]"#,
        );
        let roster = Roster::from_emails(["a@x.com"]);
        let users = load_workbench_data(&path, &roster, &september()).unwrap();
        let day = *users["a@x.com"].active_days.iter().next().unwrap();
        assert_eq!(day, chrono::NaiveDate::from_ymd_opt(2025, 9, 3).unwrap());
    }

    #[test]
    fn sql_export_wrapper_is_unwrapped() {
        let (_dir, path) = write_file(
            "api_usage.json",
            r#"{"SELECT * FROM ledger": [{"email":"a@x.com","date":"2025-09-02T10:00:00Z","model":"gpt-4o","api_requests":2}]}"#,
        );
        let roster = Roster::from_emails(["a@x.com"]);
        let users = load_workbench_data(&path, &roster, &september()).unwrap();
        assert_eq!(users["a@x.com"].api_requests_normal, 2);
    }

    #[test]
    fn records_without_email_or_date_are_skipped() {
        let (_dir, path) = write_file(
            "api_usage.json",
            r#"[
                {"date":"2025-09-02T10:00:00Z","model":"gpt-4o","api_requests":9},
                {"email":"a@x.com","model":"gpt-4o","api_requests":9},
                {"email":"a@x.com","date":"bogus","api_requests":9},
                {"email":"a@x.com","date":"2025-09-02T10:00:00Z","model":"gpt-4o","api_requests":1}
            ]"#,
        );
        let roster = Roster::from_emails(["a@x.com"]);
        let users = load_workbench_data(&path, &roster, &september()).unwrap();
        assert_eq!(users["a@x.com"].api_requests_total, 1);
    }

    #[test]
    fn undeserializable_records_skipped_without_losing_good_ones() {
        // api_requests as a string fails typed deserialization; the record
        // is dropped while the rest of the file still aggregates.
        let (_dir, path) = write_file(
            "api_usage.json",
            r#"[
                {"email":"a@x.com","date":"2025-09-02T10:00:00Z","model":"gpt-4o","api_requests":"lots"},
                {"email":"a@x.com","date":"2025-09-02T11:00:00Z","model":"gpt-4o","api_requests":3}
            ]"#,
        );
        let roster = Roster::from_emails(["a@x.com"]);
        let users = load_workbench_data(&path, &roster, &september()).unwrap();
        assert_eq!(users["a@x.com"].api_requests_total, 3);
    }

    #[test]
    fn blank_questions_cell_falls_back_to_prompts_column() {
        let (_dir, path) = write_file(
            "questions.csv",
            "email,workbench_questions,workbench_prompts\na@x.com,,7\nb@x.com,3,9\n",
        );
        let roster = Roster::from_emails(["a@x.com", "b@x.com"]);
        let questions = load_workbench_questions(Some(&path), &roster).unwrap();
        assert_eq!(questions.get("a@x.com"), Some(&7));
        assert_eq!(questions.get("b@x.com"), Some(&3));
    }

    #[test]
    fn questions_csv_supports_legacy_column_and_roster_filter() {
        let (_dir, path) = write_file(
            "questions.csv",
            "email,workbench_prompts\na@x.com,12\nstranger@x.com,9\n",
        );
        let roster = Roster::from_emails(["a@x.com"]);
        let questions = load_workbench_questions(Some(&path), &roster).unwrap();
        assert_eq!(questions.get("a@x.com"), Some(&12));
        assert!(!questions.contains_key("stranger@x.com"));
    }

    #[test]
    fn missing_questions_csv_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let roster = Roster::from_emails(["a@x.com"]);
        let questions =
            load_workbench_questions(Some(&dir.path().join("missing.csv")), &roster).unwrap();
        assert!(questions.is_empty());
    }
}
