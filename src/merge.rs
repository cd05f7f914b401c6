//! Cross-source merger: one unified record per allowed user per period.
//!
//! The roster drives existence: every allowed email gets a record even with
//! zero activity. When the roster is empty (filtering disabled), the union of
//! emails seen by either source is used instead.
//!
//! Business rules applied here:
//! - active days are the union of both sources' day sets (source A day
//!   strings parsed to dates, unparsable ones dropped silently);
//! - the IDE request count is floored at that source's active-day count, so a
//!   user active on N days never shows fewer than N units of activity;
//! - the combined request total excludes embedding traffic;
//! - the Roo flag is suppressed unless the raw (pre-floor) IDE request count
//!   is strictly below the IDE active-day count.

use crate::dates::{parse_day, Period};
use crate::models::{
    round1, round2, GithubAccumulator, MergedUser, WorkbenchAccumulator,
};
use crate::roster::Roster;
use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

/// Build one [`MergedUser`] per in-scope email and sort them for the report:
/// days active descending, then the request-like sum descending. The sort is
/// stable, so ties preserve input (email) order.
pub fn merge_user_data(
    roster: &Roster,
    github: &HashMap<String, GithubAccumulator>,
    workbench: &HashMap<String, WorkbenchAccumulator>,
    questions: &HashMap<String, u64>,
    period: &Period,
) -> Vec<MergedUser> {
    let emails: BTreeSet<String> = if roster.is_empty() {
        github.keys().chain(workbench.keys()).cloned().collect()
    } else {
        roster.emails().clone()
    };
    let business_days = period.business_days();

    let mut merged: Vec<MergedUser> = emails
        .iter()
        .map(|email| merge_one(email, roster, github, workbench, questions, business_days))
        .collect();

    merged.sort_by_key(|user| Reverse((user.days_active, user.request_sum())));

    let active = merged.iter().filter(|u| u.is_active).count();
    info!(users = merged.len(), active, "merged user data");
    merged
}

fn merge_one(
    email: &str,
    roster: &Roster,
    github: &HashMap<String, GithubAccumulator>,
    workbench: &HashMap<String, WorkbenchAccumulator>,
    questions: &HashMap<String, u64>,
    business_days: u32,
) -> MergedUser {
    let gh = github.get(email);
    let wb = workbench.get(email);

    // Union of active days across sources; source A tracks day strings.
    let github_dates: BTreeSet<NaiveDate> = gh
        .map(|gh| {
            gh.active_days
                .iter()
                .filter_map(|day| parse_day(day).ok())
                .collect()
        })
        .unwrap_or_default();
    let github_days_active = github_dates.len() as u32;
    let combined_days: BTreeSet<NaiveDate> = match wb {
        Some(wb) => github_dates.union(&wb.active_days).copied().collect(),
        None => github_dates,
    };
    let days_active = combined_days.len() as u32;

    let consistency_rate = if business_days > 0 {
        round1((days_active as f64 / business_days as f64 * 100.0).min(100.0))
    } else {
        0.0
    };

    let github_requests_raw = gh.map_or(0, |gh| gh.total_requests);
    let github_requests = github_requests_raw.max(github_days_active as u64);

    let workbench_requests_normal = wb.map_or(0, |wb| wb.api_requests_normal);
    let total_requests = github_requests + workbench_requests_normal;

    let workbench_questions = questions.get(email).copied().unwrap_or(0);
    let is_active = days_active > 0 || workbench_questions > 0;

    let roo_in_use = gh.is_some_and(|gh| gh.roo_in_use)
        && github_requests_raw < github_days_active as u64;

    let mut combined_models: BTreeMap<String, u64> = BTreeMap::new();
    if let Some(gh) = gh {
        for (model, count) in &gh.models_requests {
            *combined_models.entry(model.clone()).or_default() += count;
        }
    }
    if let Some(wb) = wb {
        for (model, count) in &wb.models_requests {
            *combined_models.entry(model.clone()).or_default() += count;
        }
    }

    let code_generated = gh.map_or(0, |gh| gh.code_generated);
    let code_accepted = gh.map_or(0, |gh| gh.code_accepted);
    let github_acceptance_rate = if code_generated > 0 {
        round1(code_accepted as f64 / code_generated as f64 * 100.0)
    } else {
        0.0
    };

    let metadata = roster.metadata(email).cloned().unwrap_or_default();
    let cache_read_tokens = wb.map_or(0, |wb| wb.cache_read_tokens);
    let cache_creation_tokens = wb.map_or(0, |wb| wb.cache_creation_tokens);

    MergedUser {
        email: email.to_string(),
        chapter: metadata.chapter,
        squad: metadata.squad,
        manager: metadata.manager,
        target_threshold: metadata.target_threshold,
        github_login: gh.map(|gh| gh.github_login.clone()).unwrap_or_default(),
        days_active,
        github_days_active,
        business_days,
        consistency_rate,
        is_active,
        github_requests,
        github_requests_raw,
        code_generated,
        code_accepted,
        github_acceptance_rate,
        loc_added: gh.map_or(0, |gh| gh.loc_added),
        loc_deleted: gh.map_or(0, |gh| gh.loc_deleted),
        used_agent: gh.is_some_and(|gh| gh.used_agent),
        roo_in_use,
        workbench_requests_total: wb.map_or(0, |wb| wb.api_requests_total),
        workbench_requests_normal,
        workbench_requests_embedding: wb.map_or(0, |wb| wb.api_requests_embedding),
        workbench_spend: round2(wb.map_or(0.0, |wb| wb.spend_total)),
        workbench_models: wb
            .map(|wb| wb.models_used.iter().cloned().collect())
            .unwrap_or_default(),
        cache_read_tokens,
        cache_creation_tokens,
        uses_prompt_caching: cache_read_tokens > 0 || cache_creation_tokens > 0,
        total_requests,
        combined_models,
        features_requests: gh.map(|gh| gh.features_requests.clone()).unwrap_or_default(),
        workbench_questions,
    }
}
