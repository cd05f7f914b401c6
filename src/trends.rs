//! Month-over-month trend file: one row per (user, period), upserted in place.
//!
//! The header is a durable contract consumed positionally by downstream
//! sheets, so schema changes go through the migration steps below instead of
//! a plain rewrite. Every read-then-write cycle re-applies the migrations,
//! which are no-ops on an already-current file:
//!
//! - `API Normal` is renamed to `API Normal (Non-Cursor)`;
//! - a missing `Manager` column is inserted at position 0, backfilled with
//!   `Unknown`;
//! - a missing `Target` column is inserted after `GitHub Login`, backfilled
//!   with `400`;
//! - the three Cursor columns are appended, backfilled with empty strings.
//!
//! Row lengths are normalized to the header length before any positional
//! insertion and again after all migrations, so `len(row) == len(header)`
//! holds for every written row even when the input file was ragged.

use crate::dates::month_to_year_and_abbrev;
use crate::models::EnrichedUser;
use crate::report::render_breakdown;
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

pub const TREND_HEADER: [&str; 26] = [
    "Manager",
    "Year",
    "Month",
    "Email",
    "Chapter",
    "Current Squad",
    "GitHub Login",
    "Target",
    "Days Active",
    "WB Days Active",
    "Workbench Questions",
    "API Normal (Non-Cursor)",
    "GitHub Requests",
    "GH Acceptance Rate (%)",
    "GH LOC Added",
    "GH LOC Deleted",
    "GitHub Agent",
    "GitHub via Roo",
    "API Embedding",
    "Prompt Caching",
    "Total Spend",
    "Models Breakdown",
    "GH Features Breakdown",
    "Cursor Total Requests",
    "Cursor Agent Completions",
    "Cursor LOC",
];

const CURSOR_COLUMNS: [&str; 3] =
    ["Cursor Total Requests", "Cursor Agent Completions", "Cursor LOC"];

const DEFAULT_TARGET: u32 = 400;

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn build_rows(users: &[EnrichedUser], year: &str, month_abbrev: &str) -> Vec<Vec<String>> {
    users
        .iter()
        .map(|enriched| {
            let user = &enriched.user;
            let manager = if user.manager.trim().is_empty() {
                "Unknown".to_string()
            } else {
                user.manager.clone()
            };
            vec![
                manager,
                year.to_string(),
                month_abbrev.to_string(),
                user.email.clone(),
                user.chapter.clone(),
                user.squad.clone(),
                user.github_login.clone(),
                user.target_threshold.unwrap_or(DEFAULT_TARGET).to_string(),
                user.days_active.to_string(),
                enriched.wb_days_active.to_string(),
                user.workbench_questions.to_string(),
                user.workbench_requests_normal.to_string(),
                user.github_requests.to_string(),
                user.github_acceptance_rate.to_string(),
                user.loc_added.to_string(),
                user.loc_deleted.to_string(),
                yes_no(user.used_agent).to_string(),
                yes_no(user.roo_in_use).to_string(),
                user.workbench_requests_embedding.to_string(),
                yes_no(user.uses_prompt_caching).to_string(),
                user.workbench_spend.to_string(),
                render_breakdown(&user.combined_models),
                render_breakdown(&user.features_requests),
                "0".to_string(),
                "0".to_string(),
                "0".to_string(),
            ]
        })
        .collect()
}

/// Read a delimited file into (header, rows), tolerating ragged rows.
fn read_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => bail!("file '{}' is empty (no header row)", path.display()),
    };
    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((header, rows))
}

fn write_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn normalize_row_lengths(rows: &mut [Vec<String>], len: usize) {
    for row in rows {
        row.resize(len, String::new());
    }
}

/// Apply the schema migrations to a legacy header, backfilling every
/// preserved row. Rows must already be normalized to the header length.
fn migrate_schema(header: &mut Vec<String>, rows: &mut [Vec<String>]) {
    if let Some(idx) = header.iter().position(|h| h == "API Normal") {
        header[idx] = "API Normal (Non-Cursor)".to_string();
    }

    if !header.iter().any(|h| h == "Manager") {
        header.insert(0, "Manager".to_string());
        for row in rows.iter_mut() {
            row.insert(0, "Unknown".to_string());
        }
    }

    if !header.iter().any(|h| h == "Target") {
        let insert_idx = header
            .iter()
            .position(|h| h == "GitHub Login")
            .map(|idx| idx + 1)
            .or_else(|| header.iter().position(|h| h == "Days Active"))
            .unwrap_or(7)
            .min(header.len());
        header.insert(insert_idx, "Target".to_string());
        for row in rows.iter_mut() {
            row.insert(insert_idx, DEFAULT_TARGET.to_string());
        }
    }

    let missing: Vec<&str> = CURSOR_COLUMNS
        .iter()
        .copied()
        .filter(|col| !header.iter().any(|h| h == col))
        .collect();
    if !missing.is_empty() {
        header.extend(missing.iter().map(|col| col.to_string()));
        for row in rows.iter_mut() {
            row.extend(std::iter::repeat(String::new()).take(missing.len()));
        }
    }
}

/// Upsert this period's per-user rows into the trend file.
///
/// Rows keyed by the same (Year, Month) are discarded and replaced; all other
/// periods are preserved after schema migration. Running the same period
/// twice back-to-back leaves the file byte-identical.
pub fn upsert_trends(path: &Path, users: &[EnrichedUser], month: &str) -> Result<()> {
    let (year, month_abbrev) = month_to_year_and_abbrev(month)?;
    let mut new_rows = build_rows(users, &year, &month_abbrev);

    if !path.exists() {
        let header: Vec<String> = TREND_HEADER.iter().map(|h| h.to_string()).collect();
        write_table(path, &header, &new_rows)?;
        info!(path = %path.display(), rows = new_rows.len(), "created trend file");
        return Ok(());
    }

    let (mut header, rows) = read_table(path)?;
    let year_idx = header.iter().position(|h| h == "Year");
    let month_idx = header.iter().position(|h| h == "Month");
    let (Some(year_idx), Some(month_idx)) = (year_idx, month_idx) else {
        warn!(path = %path.display(), "existing trend file has no Year/Month columns; rewriting");
        let header: Vec<String> = TREND_HEADER.iter().map(|h| h.to_string()).collect();
        write_table(path, &header, &new_rows)?;
        return Ok(());
    };

    let (replaced, mut preserved): (Vec<_>, Vec<_>) = rows.into_iter().partition(|row| {
        row.get(year_idx).map(String::as_str) == Some(year.as_str())
            && row.get(month_idx).map(String::as_str) == Some(month_abbrev.as_str())
    });
    if !replaced.is_empty() {
        info!(rows = replaced.len(), year, month = month_abbrev, "replacing existing period rows");
    }

    // Normalize before positional insertion, migrate, then normalize again.
    normalize_row_lengths(&mut preserved, header.len());
    migrate_schema(&mut header, &mut preserved);
    normalize_row_lengths(&mut preserved, header.len());
    normalize_row_lengths(&mut new_rows, header.len());

    let preserved_count = preserved.len();
    preserved.extend(new_rows);
    write_table(path, &header, &preserved)?;
    info!(
        path = %path.display(),
        written = users.len(),
        preserved = preserved_count,
        "updated trend file"
    );
    Ok(())
}

fn is_zero_or_empty(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    trimmed.parse::<i64>().map(|n| n == 0).unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Default)]
struct CursorTotals {
    total_requests: i64,
    agent_completions: i64,
    total_ai_lines: i64,
}

fn require_columns<'a>(
    header: &[String],
    names: &[&'a str],
    path: &Path,
) -> Result<HashMap<&'a str, usize>> {
    let mut indices = HashMap::new();
    let mut missing = Vec::new();
    for name in names {
        match header.iter().position(|h| h == name) {
            Some(idx) => {
                indices.insert(*name, idx);
            }
            None => missing.push(*name),
        }
    }
    if !missing.is_empty() {
        bail!(
            "missing required columns in '{}': {}",
            path.display(),
            missing.join(", ")
        );
    }
    Ok(indices)
}

/// Load one period's rows from a cursor-tool trend export, keyed by
/// lowercased email. Unparsable counters default to 0; later duplicate
/// emails win.
fn load_cursor_trends(
    path: &Path,
    year: &str,
    month_abbrev: &str,
) -> Result<HashMap<String, CursorTotals>> {
    let (header, rows) = read_table(path)?;
    let idx = require_columns(
        &header,
        &["Year", "Month", "Email", "Total Requests", "Agent Completions", "Total AI Lines"],
        path,
    )?;

    let cell = |row: &Vec<String>, name: &str| -> String {
        row.get(idx[name]).map(|s| s.trim().to_string()).unwrap_or_default()
    };
    let count = |row: &Vec<String>, name: &str| -> i64 {
        cell(row, name).parse().unwrap_or(0)
    };

    let mut data = HashMap::new();
    for row in &rows {
        if cell(row, "Year") != year || cell(row, "Month") != month_abbrev {
            continue;
        }
        let email = cell(row, "Email").to_lowercase();
        if email.is_empty() {
            continue;
        }
        data.insert(
            email,
            CursorTotals {
                total_requests: count(row, "Total Requests"),
                agent_completions: count(row, "Agent Completions"),
                total_ai_lines: count(row, "Total AI Lines"),
            },
        );
    }
    info!(rows = data.len(), year, month = month_abbrev, "loaded cursor trend rows");
    Ok(data)
}

/// Fold a cursor-tool export's counters into the combined trend file for one
/// period. A row is only overwritten when all three of its Cursor cells are
/// zero or empty; manually corrected values are never clobbered.
///
/// Returns (updated, skipped, unmatched) counts.
pub fn merge_cursor_columns(
    trends_path: &Path,
    cursor_path: &Path,
    month: &str,
) -> Result<(usize, usize, usize)> {
    let (year, month_abbrev) = month_to_year_and_abbrev(month)?;
    let cursor_data = load_cursor_trends(cursor_path, &year, &month_abbrev)?;

    let (header, mut rows) = read_table(trends_path)?;
    let idx = require_columns(&header, &["Year", "Month", "Email"], trends_path)?;
    let cursor_idx = require_columns(&header, &CURSOR_COLUMNS, trends_path)?;

    let mut updated = 0usize;
    let mut skipped = 0usize;
    let mut unmatched: HashSet<&String> = cursor_data.keys().collect();

    for row in &mut rows {
        let matches_period = row.get(idx["Year"]).map(|s| s.trim()) == Some(year.as_str())
            && row.get(idx["Month"]).map(|s| s.trim()) == Some(month_abbrev.as_str());
        if !matches_period {
            continue;
        }
        let email = row
            .get(idx["Email"])
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let Some(totals) = cursor_data.get(&email) else {
            continue;
        };
        unmatched.remove(&email);

        let all_blank = CURSOR_COLUMNS
            .iter()
            .all(|col| is_zero_or_empty(row.get(cursor_idx[col]).map_or("", String::as_str)));
        if !all_blank {
            skipped += 1;
            continue;
        }

        row.resize(header.len().max(row.len()), String::new());
        row[cursor_idx["Cursor Total Requests"]] = totals.total_requests.to_string();
        row[cursor_idx["Cursor Agent Completions"]] = totals.agent_completions.to_string();
        row[cursor_idx["Cursor LOC"]] = totals.total_ai_lines.to_string();
        updated += 1;
    }

    write_table(trends_path, &header, &rows)?;
    info!(updated, skipped, unmatched = unmatched.len(), "merged cursor columns");
    Ok((updated, skipped, unmatched.len()))
}
