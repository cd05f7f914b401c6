//! Source A aggregator: the IDE-plugin (GitHub Copilot) event ledger.
//!
//! Streams newline-delimited JSON, resolves logins to canonical emails,
//! filters by allow-list and date window, and folds each record into one
//! accumulator per user. Two per-user booleans are derived from the nested
//! breakdowns: agent-mode usage, and use of the unofficial Roo integration
//! (a `chat_panel_unknown_mode` feature paired with a non-placeholder model).

use crate::dates::{parse_day, Period};
use crate::identity::IdentityMap;
use crate::models::{GithubAccumulator, GithubEventRecord};
use crate::roster::Roster;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Extract the report availability window from the export's first line.
/// Absent metadata is not an error; the requested window is used as-is.
pub fn extract_report_range(path: &Path) -> Option<Period> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader.read_line(&mut first_line).ok()?;
    let record: GithubEventRecord = serde_json::from_str(first_line.trim()).ok()?;
    let start = parse_day(record.report_start_day.as_deref()?).ok()?;
    let end = parse_day(record.report_end_day.as_deref()?).ok()?;
    info!(%start, %end, "source report data availability");
    Some(Period::new(start, end))
}

/// Load and aggregate the event ledger into per-user accumulators keyed by
/// canonical email. Per-record failures are counted and skipped.
pub fn load_github_data(
    path: &Path,
    roster: &Roster,
    identities: &mut IdentityMap,
    period: Option<&Period>,
) -> Result<HashMap<String, GithubAccumulator>> {
    let file = File::open(path)
        .with_context(|| format!("GitHub usage file '{}' not found", path.display()))?;
    let reader = BufReader::new(file);

    let mut users: HashMap<String, GithubAccumulator> = HashMap::new();
    let mut parse_failures = 0usize;
    let mut filtered_out = 0usize;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: GithubEventRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = line_number + 1, %err, "invalid JSON line in GitHub usage file");
                parse_failures += 1;
                continue;
            }
        };

        if record.user_login.is_empty() {
            continue;
        }

        // Malformed or out-of-window days discard the record, not the run.
        if let Some(period) = period {
            if !record.day.is_empty() {
                match parse_day(&record.day) {
                    Ok(day) if period.contains(day) => {}
                    _ => continue,
                }
            }
        }

        let email = identities.resolve(&record.user_login);
        if !roster.is_allowed(&email) {
            filtered_out += 1;
            continue;
        }

        let user = users.entry(email).or_insert_with(GithubAccumulator::new);
        user.github_login = record.user_login.clone();

        if !record.day.is_empty() {
            user.active_days.insert(record.day.clone());
        }

        user.total_requests += record.user_initiated_interaction_count;
        user.code_generated += record.code_generation_activity_count;
        user.code_accepted += record.code_acceptance_activity_count;
        user.loc_added += record.loc_added_sum;
        user.loc_deleted += record.loc_deleted_sum;
        if record.used_agent {
            user.used_agent = true;
        }

        for feature in &record.totals_by_feature {
            if !feature.feature.is_empty() {
                *user
                    .features_requests
                    .entry(feature.feature.clone())
                    .or_default() += feature.user_initiated_interaction_count;
            }
        }

        for mf in &record.totals_by_model_feature {
            if !mf.model.is_empty() {
                *user.models_requests.entry(mf.model.clone()).or_default() += mf.count;
            }
            if mf.feature.to_lowercase().contains("chat_panel_unknown_mode")
                && !mf.model.is_empty()
                && mf.model.to_lowercase() != "unknown"
            {
                user.roo_in_use = true;
            }
        }
    }

    info!(
        users = users.len(),
        parse_failures,
        filtered_out,
        date_filtered = period.is_some(),
        "loaded GitHub usage data"
    );
    identities.report_suspicious();
    Ok(users)
}
