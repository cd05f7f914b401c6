//! Period-level summary statistics over the merged user set.
//!
//! Two consistency distributions are produced. The first is over the observed
//! active-day union. The second folds in an activity estimate derived from
//! question counts: once the run-wide questions-per-user-per-business-day
//! average is known, each user's questions are converted into an equivalent
//! day count (capped at business days) and the distribution is recomputed
//! over `max(observed, derived)`. That second pass is why enrichment is a
//! separate phase producing [`EnrichedUser`] rather than an in-place update.

use crate::dates::Period;
use crate::models::{
    round1, round2, AdoptionMetrics, ChapterStats, EnrichedUser, MergedUser,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::info;

/// Share of business days a user must be active on to count as consistent.
const CONSISTENT_DAYS_RATIO: f64 = 0.65;

/// Linear-interpolation percentile over a sorted ascending slice.
/// Empty input yields 0 for any `p`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let k = (sorted.len() - 1) as f64 * p / 100.0;
    let f = k.floor() as usize;
    let c = (f + 1).min(sorted.len() - 1);
    sorted[f] + (k - f as f64) * (sorted[c] - sorted[f])
}

/// Agent-completions threshold per chapter. The two large engineering
/// chapters carry a higher bar than everyone else.
pub fn completions_threshold(chapter: &str) -> u64 {
    match chapter.to_uppercase().as_str() {
        "BE" | "FE" => 1000,
        _ => 400,
    }
}

/// Request-count threshold per chapter: requests run well above completions,
/// so the bar is a 5x multiple of the completions threshold.
pub fn requests_threshold(chapter: &str) -> u64 {
    completions_threshold(chapter) * 5
}

/// Compute the period summary and the enriched, re-sorted user list.
///
/// Most statistics run over active users only; `total_users` and the
/// percentage denominators count the whole roster. The returned users are
/// sorted descending by (max active days, observed active days, request-like
/// sum); the sort is stable so ties keep the merge-stage order.
pub fn calculate_adoption_metrics(
    merged_users: Vec<MergedUser>,
    period: &Period,
) -> (AdoptionMetrics, Vec<EnrichedUser>) {
    let business_days = period.business_days();
    let total_users = merged_users.len();
    let active: Vec<&MergedUser> = merged_users.iter().filter(|u| u.is_active).collect();
    let mau = active.len();

    let mut consistency_rates: Vec<f64> = active.iter().map(|u| u.consistency_rate).collect();
    consistency_rates.sort_by(f64::total_cmp);
    let mean_consistency = mean(&consistency_rates);

    let users_threshold_days = active
        .iter()
        .filter(|u| day_ratio(u.days_active, business_days) >= CONSISTENT_DAYS_RATIO)
        .count();

    // Intensity, non-embedding only. Zero-request users are excluded from
    // the median/p75 sample but the mean divides by the full roster.
    let total_requests_non_embedding: u64 = active
        .iter()
        .map(|u| u.github_requests + u.workbench_requests_normal)
        .sum();
    let mut requests_per_user: Vec<f64> = active
        .iter()
        .filter(|u| u.total_requests > 0)
        .map(|u| u.total_requests as f64)
        .collect();
    requests_per_user.sort_by(f64::total_cmp);

    let total_code_generated: u64 = active.iter().map(|u| u.code_generated).sum();
    let total_code_accepted: u64 = active.iter().map(|u| u.code_accepted).sum();
    // Ratio of sums, not an average of per-user rates.
    let github_acceptance_rate = if total_code_generated > 0 {
        total_code_accepted as f64 / total_code_generated as f64 * 100.0
    } else {
        0.0
    };
    let total_loc_added: u64 = active.iter().map(|u| u.loc_added).sum();
    let total_loc_deleted: u64 = active.iter().map(|u| u.loc_deleted).sum();

    let total_workbench_questions: u64 = active.iter().map(|u| u.workbench_questions).sum();
    let avg_questions_per_user = ratio(total_workbench_questions as f64, total_users);
    let avg_questions_per_user_per_business_day =
        ratio(total_workbench_questions as f64, total_users * business_days as usize);

    let github_users = active.iter().filter(|u| u.github_requests > 0).count();
    let workbench_users = active.iter().filter(|u| u.workbench_requests_total > 0).count();
    let both_platforms_users = active
        .iter()
        .filter(|u| u.github_requests > 0 && u.workbench_requests_total > 0)
        .count();
    let agent_users = active.iter().filter(|u| u.used_agent).count();
    let roo_users = active.iter().filter(|u| u.roo_in_use).count();
    let embedding_users = active
        .iter()
        .filter(|u| u.workbench_requests_embedding > 0)
        .count();
    let prompt_caching_users = active.iter().filter(|u| u.uses_prompt_caching).count();
    let users_with_workbench_questions = active
        .iter()
        .filter(|u| u.workbench_questions > 0)
        .count();

    // Second pass: questions converted into an equivalent active-day count.
    let mut enriched: Vec<EnrichedUser> = merged_users
        .into_iter()
        .map(|user| {
            let wb_days_active = if avg_questions_per_user_per_business_day > 0.0 {
                let estimated = (user.workbench_questions as f64
                    / avg_questions_per_user_per_business_day)
                    .min(business_days as f64);
                estimated.ceil() as u32
            } else {
                0
            };
            EnrichedUser { user, wb_days_active }
        })
        .collect();

    let mut wb_consistency_rates: Vec<f64> = enriched
        .iter()
        .filter(|e| e.user.is_active)
        .map(|e| {
            if business_days > 0 {
                (e.max_days_active() as f64 / business_days as f64 * 100.0).min(100.0)
            } else {
                0.0
            }
        })
        .collect();
    wb_consistency_rates.sort_by(f64::total_cmp);
    let wb_mean_consistency = mean(&wb_consistency_rates);

    let wb_users_threshold_days = enriched
        .iter()
        .filter(|e| e.user.is_active)
        .filter(|e| day_ratio(e.max_days_active(), business_days) >= CONSISTENT_DAYS_RATIO)
        .count();

    enriched.sort_by_key(|e| {
        Reverse((e.max_days_active(), e.user.days_active, e.user.request_sum()))
    });

    let metrics = AdoptionMetrics {
        report_period: period.to_string(),
        business_days,
        total_users,
        mau,
        adoption_rate: round1(pct(mau, total_users)),

        median_consistency: round1(percentile(&consistency_rates, 50.0)),
        mean_consistency: round1(mean_consistency),
        p75_consistency: round1(percentile(&consistency_rates, 75.0)),
        p90_consistency: round1(percentile(&consistency_rates, 90.0)),
        users_threshold_days,
        pct_threshold_days: round1(pct(users_threshold_days, total_users)),

        wb_median_consistency: round1(percentile(&wb_consistency_rates, 50.0)),
        wb_mean_consistency: round1(wb_mean_consistency),
        wb_p75_consistency: round1(percentile(&wb_consistency_rates, 75.0)),
        wb_users_threshold_days,
        wb_pct_threshold_days: round1(pct(wb_users_threshold_days, total_users)),

        total_requests_non_embedding,
        avg_requests_per_user: round2(ratio(total_requests_non_embedding as f64, total_users)),
        median_requests_per_user: round2(percentile(&requests_per_user, 50.0)),
        p75_requests_per_user: round2(percentile(&requests_per_user, 75.0)),
        total_workbench_questions,
        avg_workbench_questions_per_user: round2(avg_questions_per_user),
        avg_workbench_questions_per_user_per_business_day: round2(
            avg_questions_per_user_per_business_day,
        ),
        github_acceptance_rate: round1(github_acceptance_rate),
        total_code_generated,
        total_code_accepted,
        total_loc_added,
        total_loc_deleted,
        total_loc_net: total_loc_added as i64 - total_loc_deleted as i64,

        github_users,
        workbench_users,
        both_platforms_users,
        agent_users,
        roo_users,
        embedding_users,
        prompt_caching_users,
        users_with_workbench_questions,
    };

    info!(
        total_users,
        mau,
        adoption_rate = metrics.adoption_rate,
        total_requests = total_requests_non_embedding,
        "calculated adoption metrics"
    );
    (metrics, enriched)
}

/// Per-chapter roll-up. Blank chapters land in a literal `Unknown` bucket;
/// the pass/fail compares summed code completions against the chapter's
/// threshold.
pub fn calculate_chapter_breakdown(users: &[EnrichedUser]) -> BTreeMap<String, ChapterStats> {
    let mut chapters: BTreeMap<String, ChapterStats> = BTreeMap::new();
    for enriched in users {
        let user = &enriched.user;
        let chapter = if user.chapter.trim().is_empty() {
            "Unknown".to_string()
        } else {
            user.chapter.clone()
        };
        let stats = chapters.entry(chapter).or_default();
        stats.total_users += 1;
        if user.is_active {
            stats.active_users += 1;
        }
        stats.total_requests += user.total_requests;
        stats.total_code_generated += user.code_generated;
        stats.total_code_accepted += user.code_accepted;
        stats.total_loc_added += user.loc_added;
        stats.total_loc_deleted += user.loc_deleted;
        stats.total_spend += user.workbench_spend;
        stats.total_active_days += u64::from(user.days_active);
    }

    for (chapter, stats) in &mut chapters {
        let threshold = completions_threshold(chapter);
        stats.threshold = threshold;
        stats.threshold_percentage =
            round1(stats.total_code_accepted as f64 / threshold as f64 * 100.0);
        stats.threshold_gap = stats.total_code_accepted as i64 - threshold as i64;
        stats.meets_threshold = stats.total_code_accepted >= threshold;
    }
    chapters
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn pct(count: usize, total: usize) -> f64 {
    if total > 0 {
        count as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator / denominator as f64
    } else {
        0.0
    }
}

fn day_ratio(days: u32, business_days: u32) -> f64 {
    if business_days > 0 {
        f64::from(days) / f64::from(business_days)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::month_period;
    use crate::models::tests::test_user;

    fn september() -> Period {
        month_period("2025-09").unwrap()
    }

    #[test]
    fn percentile_boundaries() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[], 90.0), 0.0);
        assert_eq!(percentile(&[10.0], 50.0), 10.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 100.0), 4.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.0), 1.0);
    }

    #[test]
    fn chapter_thresholds_favor_large_chapters() {
        assert_eq!(completions_threshold("BE"), 1000);
        assert_eq!(completions_threshold("fe"), 1000);
        assert_eq!(completions_threshold("QA"), 400);
        assert_eq!(completions_threshold(""), 400);
        assert_eq!(requests_threshold("BE"), 5000);
        assert_eq!(requests_threshold("Data"), 2000);
    }

    #[test]
    fn adoption_rate_counts_whole_roster_in_denominator() {
        let mut active = test_user();
        active.is_active = true;
        active.days_active = 11;
        active.consistency_rate = 50.0;
        let idle = test_user();
        let (metrics, _) =
            calculate_adoption_metrics(vec![active, idle.clone(), idle], &september());
        assert_eq!(metrics.total_users, 3);
        assert_eq!(metrics.mau, 1);
        assert_eq!(metrics.adoption_rate, 33.3);
        assert_eq!(metrics.median_consistency, 50.0);
    }

    #[test]
    fn zero_request_users_excluded_from_median_but_not_mean() {
        let mut heavy = test_user();
        heavy.is_active = true;
        heavy.total_requests = 100;
        heavy.github_requests = 100;
        let mut idle_active = test_user();
        idle_active.is_active = true;
        let (metrics, _) = calculate_adoption_metrics(vec![heavy, idle_active], &september());
        assert_eq!(metrics.median_requests_per_user, 100.0);
        assert_eq!(metrics.avg_requests_per_user, 50.0);
    }

    #[test]
    fn acceptance_rate_is_ratio_of_sums() {
        let mut big = test_user();
        big.is_active = true;
        big.code_generated = 1000;
        big.code_accepted = 100;
        let mut small = test_user();
        small.is_active = true;
        small.code_generated = 10;
        small.code_accepted = 10;
        let (metrics, _) = calculate_adoption_metrics(vec![big, small], &september());
        // 110/1010, not the 55% a per-user average would give.
        assert_eq!(metrics.github_acceptance_rate, 10.9);
    }

    #[test]
    fn question_derived_days_capped_at_business_days() {
        // One user, 220 questions over 22 business days: the average is
        // 10/user/day, so 220 questions estimate to exactly 22 days.
        let mut user = test_user();
        user.is_active = true;
        user.workbench_questions = 220;
        let (metrics, enriched) = calculate_adoption_metrics(vec![user], &september());
        assert_eq!(metrics.avg_workbench_questions_per_user_per_business_day, 10.0);
        assert_eq!(enriched[0].wb_days_active, 22);
        assert_eq!(metrics.wb_median_consistency, 100.0);
    }

    #[test]
    fn enriched_resort_puts_question_heavy_users_first() {
        let mut talker = test_user();
        talker.email = "talker@x.com".to_string();
        talker.is_active = true;
        talker.workbench_questions = 300;
        let mut coder = test_user();
        coder.email = "coder@x.com".to_string();
        coder.is_active = true;
        coder.days_active = 2;
        coder.github_requests = 5;
        let (_, enriched) = calculate_adoption_metrics(vec![coder, talker], &september());
        // talker's derived day count dwarfs coder's two observed days.
        assert_eq!(enriched[0].user.email, "talker@x.com");
    }

    #[test]
    fn platform_usage_counts_cover_only_active_users() {
        let mut dual = test_user();
        dual.email = "dual@x.com".to_string();
        dual.is_active = true;
        dual.github_requests = 10;
        dual.workbench_requests_total = 20;
        dual.workbench_requests_embedding = 5;
        dual.used_agent = true;
        dual.uses_prompt_caching = true;
        dual.workbench_questions = 3;
        let mut roo = test_user();
        roo.email = "roo@x.com".to_string();
        roo.is_active = true;
        roo.github_requests = 2;
        roo.roo_in_use = true;
        // Inactive usage must not leak into the platform counts.
        let mut idle = test_user();
        idle.github_requests = 99;
        idle.used_agent = true;

        let (metrics, enriched) =
            calculate_adoption_metrics(vec![dual, roo, idle], &september());
        assert_eq!(metrics.github_users, 2);
        assert_eq!(metrics.workbench_users, 1);
        assert_eq!(metrics.both_platforms_users, 1);
        assert_eq!(metrics.agent_users, 1);
        assert_eq!(metrics.roo_users, 1);
        assert_eq!(metrics.embedding_users, 1);
        assert_eq!(metrics.prompt_caching_users, 1);
        assert_eq!(metrics.users_with_workbench_questions, 1);
        assert_eq!(enriched.len(), 3);
    }

    #[test]
    fn empty_input_yields_zeroed_metrics() {
        let (metrics, enriched) = calculate_adoption_metrics(Vec::new(), &september());
        assert_eq!(metrics.total_users, 0);
        assert_eq!(metrics.adoption_rate, 0.0);
        assert_eq!(metrics.median_consistency, 0.0);
        assert!(enriched.is_empty());
    }

    #[test]
    fn chapter_breakdown_buckets_blank_chapters_as_unknown() {
        let mut be = test_user();
        be.chapter = "BE".to_string();
        be.is_active = true;
        be.code_accepted = 1500;
        be.code_generated = 2000;
        let blank = test_user();
        let users: Vec<EnrichedUser> = [be, blank]
            .into_iter()
            .map(|user| EnrichedUser { user, wb_days_active: 0 })
            .collect();
        let chapters = calculate_chapter_breakdown(&users);

        let be_stats = &chapters["BE"];
        assert_eq!(be_stats.threshold, 1000);
        assert!(be_stats.meets_threshold);
        assert_eq!(be_stats.threshold_gap, 500);
        assert_eq!(be_stats.threshold_percentage, 150.0);

        let unknown = &chapters["Unknown"];
        assert_eq!(unknown.total_users, 1);
        assert_eq!(unknown.threshold, 400);
        assert!(!unknown.meets_threshold);
        assert_eq!(unknown.threshold_gap, -400);
    }
}
