//! Core Data Models
//!
//! This module defines the primary data structures used throughout the
//! adoption-report pipeline. The data flows through these models in sequence:
//!
//! 1. **Raw records**: [`GithubEventRecord`], [`WorkbenchRecord`] - parsed from
//!    the source exports
//! 2. **Aggregation**: [`GithubAccumulator`], [`WorkbenchAccumulator`] - one per
//!    user per source, built while streaming records
//! 3. **Merge**: [`MergedUser`] - one per allowed user per period, combining
//!    both sources with the roster
//! 4. **Enrichment**: [`EnrichedUser`] - merge output plus second-pass derived
//!    fields
//! 5. **Summary**: [`AdoptionMetrics`], [`ChapterStats`] - period-level
//!    aggregates feeding the report writers
//!
//! All optional input fields default to zero/empty via `#[serde(default)]` so
//! partially-populated records never fail the load.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

/// One line of the IDE-plugin (GitHub Copilot) NDJSON export.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubEventRecord {
    #[serde(default)]
    pub user_login: String,
    /// Calendar day as `YYYY-MM-DD`.
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub user_initiated_interaction_count: u64,
    #[serde(default)]
    pub code_generation_activity_count: u64,
    #[serde(default)]
    pub code_acceptance_activity_count: u64,
    #[serde(default)]
    pub loc_added_sum: u64,
    #[serde(default)]
    pub loc_deleted_sum: u64,
    #[serde(default)]
    pub used_agent: bool,
    #[serde(default)]
    pub totals_by_feature: Vec<FeatureTotals>,
    #[serde(default)]
    pub totals_by_model_feature: Vec<ModelFeatureTotals>,
    /// Report availability metadata, present on the first line only.
    #[serde(default)]
    pub report_start_day: Option<String>,
    #[serde(default)]
    pub report_end_day: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureTotals {
    #[serde(default)]
    pub feature: String,
    #[serde(default)]
    pub user_initiated_interaction_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelFeatureTotals {
    #[serde(default)]
    pub feature: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub count: u64,
}

/// One record of the API-ledger (Workbench) export.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkbenchRecord {
    #[serde(default)]
    pub email: String,
    /// ISO-8601 timestamp, optionally `Z`-suffixed.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_requests: u64,
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// Per-user accumulator for the IDE-plugin source.
///
/// Active days stay as a set of day strings; the merge stage parses them to
/// dates and unions them with the other source's day set.
#[derive(Debug, Clone, Default)]
pub struct GithubAccumulator {
    pub github_login: String,
    pub active_days: BTreeSet<String>,
    pub total_requests: u64,
    pub code_generated: u64,
    pub code_accepted: u64,
    pub loc_added: u64,
    pub loc_deleted: u64,
    pub used_agent: bool,
    pub roo_in_use: bool,
    pub models_requests: BTreeMap<String, u64>,
    pub features_requests: BTreeMap<String, u64>,
}

impl GithubAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-user accumulator for the API-ledger source.
#[derive(Debug, Clone, Default)]
pub struct WorkbenchAccumulator {
    pub active_days: BTreeSet<NaiveDate>,
    pub api_requests_total: u64,
    pub api_requests_normal: u64,
    pub api_requests_embedding: u64,
    pub spend_total: f64,
    pub models_used: BTreeSet<String>,
    pub models_requests: BTreeMap<String, u64>,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

impl WorkbenchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-employee metadata carried alongside the roster email.
#[derive(Debug, Clone, Default)]
pub struct UserMetadata {
    pub chapter: String,
    pub squad: String,
    pub manager: String,
    pub target_threshold: Option<u32>,
}

/// Unified per-user record for one reporting period.
///
/// Built once per allowed email by the merge stage, even for users with no
/// activity: the roster, not activity, drives existence. Frequency maps are
/// kept as data; the comma-joined breakdown strings are a render-boundary
/// concern (see the `report` module).
#[derive(Debug, Clone)]
pub struct MergedUser {
    pub email: String,
    pub chapter: String,
    pub squad: String,
    pub manager: String,
    pub target_threshold: Option<u32>,
    pub github_login: String,

    pub days_active: u32,
    pub github_days_active: u32,
    pub business_days: u32,
    pub consistency_rate: f64,
    pub is_active: bool,

    // IDE-plugin metrics; `github_requests` carries the activity floor
    // max(raw, github_days_active) while the raw value is kept for the
    // Roo suppression rule.
    pub github_requests: u64,
    pub github_requests_raw: u64,
    pub code_generated: u64,
    pub code_accepted: u64,
    pub github_acceptance_rate: f64,
    pub loc_added: u64,
    pub loc_deleted: u64,
    pub used_agent: bool,
    pub roo_in_use: bool,

    // API-ledger metrics
    pub workbench_requests_total: u64,
    pub workbench_requests_normal: u64,
    pub workbench_requests_embedding: u64,
    pub workbench_spend: f64,
    pub workbench_models: Vec<String>,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub uses_prompt_caching: bool,

    /// Combined non-embedding requests: adjusted IDE requests + normal API
    /// requests. Embedding traffic never contributes here.
    pub total_requests: u64,

    pub combined_models: BTreeMap<String, u64>,
    pub features_requests: BTreeMap<String, u64>,

    pub workbench_questions: u64,
}

impl MergedUser {
    /// Request-like sum used as the secondary sort key for report ordering.
    pub fn request_sum(&self) -> u64 {
        self.workbench_questions + self.github_requests + self.workbench_requests_normal
    }
}

/// Merge output plus the second-pass derived activity estimate.
///
/// A separate type rather than in-place mutation: the derived field depends
/// on a run-wide average only known after the first pass over all users.
#[derive(Debug, Clone)]
pub struct EnrichedUser {
    pub user: MergedUser,
    /// Questions-derived active-day estimate, capped at business days.
    pub wb_days_active: u32,
}

impl EnrichedUser {
    pub fn max_days_active(&self) -> u32 {
        self.user.days_active.max(self.wb_days_active)
    }
}

/// Period-level aggregates over the merged user set. Immutable once computed.
#[derive(Debug, Clone, Default)]
pub struct AdoptionMetrics {
    pub report_period: String,
    pub business_days: u32,
    pub total_users: usize,
    pub mau: usize,
    pub adoption_rate: f64,

    // Consistency over combined active days
    pub median_consistency: f64,
    pub mean_consistency: f64,
    pub p75_consistency: f64,
    pub p90_consistency: f64,
    pub users_threshold_days: usize,
    pub pct_threshold_days: f64,

    // Consistency over max(days_active, wb_days_active)
    pub wb_median_consistency: f64,
    pub wb_mean_consistency: f64,
    pub wb_p75_consistency: f64,
    pub wb_users_threshold_days: usize,
    pub wb_pct_threshold_days: f64,

    // Intensity (non-embedding only)
    pub total_requests_non_embedding: u64,
    pub avg_requests_per_user: f64,
    pub median_requests_per_user: f64,
    pub p75_requests_per_user: f64,
    pub total_workbench_questions: u64,
    pub avg_workbench_questions_per_user: f64,
    pub avg_workbench_questions_per_user_per_business_day: f64,
    pub github_acceptance_rate: f64,
    pub total_code_generated: u64,
    pub total_code_accepted: u64,
    pub total_loc_added: u64,
    pub total_loc_deleted: u64,
    pub total_loc_net: i64,

    // Platform usage
    pub github_users: usize,
    pub workbench_users: usize,
    pub both_platforms_users: usize,
    pub agent_users: usize,
    pub roo_users: usize,
    pub embedding_users: usize,
    pub prompt_caching_users: usize,
    pub users_with_workbench_questions: usize,
}

/// Per-chapter roll-up with threshold pass/fail.
#[derive(Debug, Clone, Default)]
pub struct ChapterStats {
    pub total_users: usize,
    pub active_users: usize,
    pub total_requests: u64,
    pub total_code_generated: u64,
    pub total_code_accepted: u64,
    pub total_loc_added: u64,
    pub total_loc_deleted: u64,
    pub total_spend: f64,
    pub total_active_days: u64,
    pub threshold: u64,
    pub threshold_percentage: f64,
    pub threshold_gap: i64,
    pub meets_threshold: bool,
}

/// Round to one decimal place, matching the report's display precision.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places (currency and per-user averages).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn optional_fields_default_to_zero() {
        let record: GithubEventRecord = serde_json::from_str(r#"{"user_login":"alice"}"#).unwrap();
        assert_eq!(record.user_login, "alice");
        assert_eq!(record.user_initiated_interaction_count, 0);
        assert!(!record.used_agent);
        assert!(record.totals_by_feature.is_empty());
        assert!(record.report_start_day.is_none());
    }

    #[test]
    fn workbench_record_tolerates_missing_counters() {
        let record: WorkbenchRecord =
            serde_json::from_str(r#"{"email":"a@x.com","date":"2025-09-01T10:00:00Z"}"#).unwrap();
        assert_eq!(record.api_requests, 0);
        assert_eq!(record.spend, 0.0);
        assert_eq!(record.cache_read_input_tokens, 0);
    }

    #[test]
    fn request_sum_combines_all_request_like_fields() {
        let mut user = test_user();
        user.workbench_questions = 5;
        user.github_requests = 10;
        user.workbench_requests_normal = 7;
        assert_eq!(user.request_sum(), 22);
    }

    pub(crate) fn test_user() -> MergedUser {
        MergedUser {
            email: "u@x.com".to_string(),
            chapter: String::new(),
            squad: String::new(),
            manager: String::new(),
            target_threshold: None,
            github_login: String::new(),
            days_active: 0,
            github_days_active: 0,
            business_days: 22,
            consistency_rate: 0.0,
            is_active: false,
            github_requests: 0,
            github_requests_raw: 0,
            code_generated: 0,
            code_accepted: 0,
            github_acceptance_rate: 0.0,
            loc_added: 0,
            loc_deleted: 0,
            used_agent: false,
            roo_in_use: false,
            workbench_requests_total: 0,
            workbench_requests_normal: 0,
            workbench_requests_embedding: 0,
            workbench_spend: 0.0,
            workbench_models: Vec::new(),
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            uses_prompt_caching: false,
            total_requests: 0,
            combined_models: BTreeMap::new(),
            features_requests: BTreeMap::new(),
            workbench_questions: 0,
        }
    }
}
