//! Report rendering: the per-user CSV report and the end-of-run terminal
//! summary.
//!
//! This is the render boundary. Frequency maps stay as data everywhere else
//! in the pipeline; they only become comma-joined breakdown strings here and
//! in the trend writer.

use crate::models::{AdoptionMetrics, ChapterStats, EnrichedUser};
use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

const PER_USER_HEADER: [&str; 19] = [
    "Email",
    "Chapter",
    "Current Squad",
    "GitHub Login",
    "Days Active",
    "WB Days Active",
    "Workbench Questions",
    "API Normal",
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
];

/// Render a frequency map as a `name: count` list, descending by count with
/// ties broken by name. Deterministic so report diffs stay meaningful.
pub fn render_breakdown(map: &BTreeMap<String, u64>) -> String {
    let mut entries: Vec<(&String, &u64)> = map.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .iter()
        .map(|(name, count)| format!("{name}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Write the adoption report CSV: summary-statistics sections followed by the
/// per-user table, in the order the users were given.
pub fn generate_csv_report(
    users: &[EnrichedUser],
    metrics: &AdoptionMetrics,
    output_path: &Path,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(output_path)
        .with_context(|| format!("failed to write report '{}'", output_path.display()))?;

    let mut row = |cells: &[&str]| writer.write_record(cells);

    row(&["ADOPTION SUMMARY STATISTICS"])?;
    row(&["Metric", "Value"])?;
    row(&["Report Period", &metrics.report_period])?;
    row(&["Business Days in Period", &metrics.business_days.to_string()])?;
    row(&["Total Users", &metrics.total_users.to_string()])?;
    row(&["Monthly Active Users (MAU)", &metrics.mau.to_string()])?;
    row(&["Adoption Rate (%)", &metrics.adoption_rate.to_string()])?;
    row(&[""])?;

    row(&["AGENTIC CONSISTENCY METRICS (observed active days)"])?;
    row(&["Median User Consistency (%)", &metrics.median_consistency.to_string()])?;
    row(&["Mean User Consistency (%)", &metrics.mean_consistency.to_string()])?;
    row(&["75th Percentile Consistency (%)", &metrics.p75_consistency.to_string()])?;
    row(&[
        "Users with 65% Active Days",
        &format!("{} ({}%)", metrics.users_threshold_days, metrics.pct_threshold_days),
    ])?;
    row(&[""])?;

    row(&["CONSISTENCY METRICS (including question-derived days)"])?;
    row(&["Median User Consistency (%)", &metrics.wb_median_consistency.to_string()])?;
    row(&["Mean User Consistency (%)", &metrics.wb_mean_consistency.to_string()])?;
    row(&["75th Percentile Consistency (%)", &metrics.wb_p75_consistency.to_string()])?;
    row(&[
        "Users with 65% Active Days",
        &format!("{} ({}%)", metrics.wb_users_threshold_days, metrics.wb_pct_threshold_days),
    ])?;
    row(&[""])?;

    row(&["INTENSITY METRICS"])?;
    row(&["Total Requests", &metrics.total_requests_non_embedding.to_string()])?;
    row(&["Mean Requests per User", &metrics.avg_requests_per_user.to_string()])?;
    row(&["Median Requests per User", &metrics.median_requests_per_user.to_string()])?;
    row(&["75th Percentile Requests per User", &metrics.p75_requests_per_user.to_string()])?;
    row(&["Total Workbench Questions", &metrics.total_workbench_questions.to_string()])?;
    row(&[
        "Mean Workbench Questions per User",
        &metrics.avg_workbench_questions_per_user.to_string(),
    ])?;
    row(&["GitHub Acceptance Rate (%)", &metrics.github_acceptance_rate.to_string()])?;
    row(&["GitHub Total Lines of Code Added", &metrics.total_loc_added.to_string()])?;
    row(&["GitHub Total Lines of Code Deleted", &metrics.total_loc_deleted.to_string()])?;
    row(&["GitHub Net Lines of Code", &metrics.total_loc_net.to_string()])?;
    row(&[""])?;

    row(&["PLATFORM USAGE"])?;
    row(&["GitHub Copilot Users", &metrics.github_users.to_string()])?;
    row(&["API Users", &metrics.workbench_users.to_string()])?;
    row(&["Both Platforms Users", &metrics.both_platforms_users.to_string()])?;
    row(&["GitHub Agent Users", &metrics.agent_users.to_string()])?;
    row(&["Embedding/Indexing Users", &metrics.embedding_users.to_string()])?;
    row(&["Prompt Caching Users", &metrics.prompt_caching_users.to_string()])?;
    row(&[
        "Workbench Questions Users",
        &metrics.users_with_workbench_questions.to_string(),
    ])?;
    row(&[""])?;
    row(&[""])?;

    row(&["PER-USER ADOPTION STATISTICS"])?;
    writer.write_record(PER_USER_HEADER)?;
    for enriched in users {
        let user = &enriched.user;
        let record = [
            user.email.clone(),
            user.chapter.clone(),
            user.squad.clone(),
            user.github_login.clone(),
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
        ];
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path = %output_path.display(), users = users.len(), "generated adoption report CSV");
    Ok(())
}

/// Print the end-of-run overview to the terminal.
pub fn print_summary(
    metrics: &AdoptionMetrics,
    chapters: &BTreeMap<String, ChapterStats>,
    csv_path: &Path,
    trends_path: &Path,
) {
    let rule = "=".repeat(60);
    println!("\n{}", rule.bright_cyan());
    println!("{}", "COMBINED ADOPTION REPORT SUMMARY".bright_cyan().bold());
    println!("{}", rule.bright_cyan());
    println!("Report Period: {}", metrics.report_period.bright_white().bold());
    println!("Business Days: {}", metrics.business_days);

    println!("\n{}", "Adoption Overview:".bold());
    println!("  Total Users: {}", metrics.total_users);
    println!("  Monthly Active Users (MAU): {}", metrics.mau);
    println!(
        "  Adoption Rate: {}",
        format!("{}%", metrics.adoption_rate).bright_green().bold()
    );

    println!("\n{}", "Consistency Metrics:".bold());
    println!("  Median Consistency: {}%", metrics.median_consistency);
    println!("  Mean Consistency: {}%", metrics.mean_consistency);
    println!("  75th Percentile: {}%", metrics.p75_consistency);
    println!("  90th Percentile: {}%", metrics.p90_consistency);
    println!(
        "  Users with 65% active days: {} ({}%)",
        metrics.users_threshold_days, metrics.pct_threshold_days
    );

    println!("\n{}", "Platform Usage:".bold());
    println!("  GitHub Copilot users: {}", metrics.github_users);
    println!("  Workbench users: {}", metrics.workbench_users);
    println!("  Both platforms: {}", metrics.both_platforms_users);
    println!("  Agent mode users: {}", metrics.agent_users);
    println!("  Embedding/Indexing users: {}", metrics.embedding_users);
    println!(
        "  Workbench questions users: {}",
        metrics.users_with_workbench_questions
    );

    println!("\n{}", "Intensity:".bold());
    println!("  Total requests: {}", metrics.total_requests_non_embedding);
    println!("  Mean requests per user: {}", metrics.avg_requests_per_user);
    println!("  Median requests per user: {}", metrics.median_requests_per_user);
    println!("  P75 requests per user: {}", metrics.p75_requests_per_user);
    println!("  Total workbench questions: {}", metrics.total_workbench_questions);
    println!(
        "  GitHub acceptance rate: {}%",
        metrics.github_acceptance_rate
    );

    if !chapters.is_empty() {
        println!("\n{}", "Chapter Thresholds:".bold());
        for (chapter, stats) in chapters {
            let verdict = if stats.meets_threshold {
                "PASS".bright_green().bold()
            } else {
                "MISS".bright_red().bold()
            };
            println!(
                "  {chapter}: {} completions vs {} threshold ({}%) {verdict}",
                stats.total_code_accepted, stats.threshold, stats.threshold_percentage
            );
        }
    }

    println!("\n{}", "Reports generated:".bold());
    println!("  CSV: {}", csv_path.display());
    println!("  Trends CSV: {}", trends_path.display());
    println!("{}", rule.bright_cyan());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::test_user;

    #[test]
    fn breakdown_orders_by_count_then_name() {
        let mut map = BTreeMap::new();
        map.insert("zephyr".to_string(), 5);
        map.insert("alpha".to_string(), 5);
        map.insert("mid".to_string(), 9);
        assert_eq!(render_breakdown(&map), "mid: 9, alpha: 5, zephyr: 5");
        assert_eq!(render_breakdown(&BTreeMap::new()), "");
    }

    #[test]
    fn csv_report_contains_summary_and_user_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        let mut user = test_user();
        user.days_active = 4;
        user.used_agent = true;
        user.combined_models.insert("gpt-4o".to_string(), 7);
        let users = vec![EnrichedUser { user, wb_days_active: 2 }];
        let metrics = AdoptionMetrics {
            report_period: "2025-09-01 to 2025-09-30".to_string(),
            business_days: 22,
            total_users: 1,
            mau: 1,
            adoption_rate: 100.0,
            ..AdoptionMetrics::default()
        };

        generate_csv_report(&users, &metrics, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("ADOPTION SUMMARY STATISTICS"));
        assert!(content.contains("Report Period,2025-09-01 to 2025-09-30"));
        assert!(content.contains("PER-USER ADOPTION STATISTICS"));
        assert!(content.contains("u@x.com"));
        assert!(content.contains("gpt-4o: 7"));
        // Boolean flags render as Yes/No words.
        assert!(content.contains(",Yes,No,"));
    }
}
