use ai_adoption_report::config::Config;
use ai_adoption_report::dates::{constrain_period, derive_period};
use ai_adoption_report::github::{extract_report_range, load_github_data};
use ai_adoption_report::identity::IdentityMap;
use ai_adoption_report::merge::merge_user_data;
use ai_adoption_report::metrics::{calculate_adoption_metrics, calculate_chapter_breakdown};
use ai_adoption_report::report::{generate_csv_report, print_summary};
use ai_adoption_report::roster::{find_leaderboard_file, load_leaderboard_emails, Roster};
use ai_adoption_report::trends::{merge_cursor_columns, upsert_trends};
use ai_adoption_report::workbench::{load_workbench_data, load_workbench_questions};
use ai_adoption_report::logging;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process;
use tracing::info;

#[derive(Parser)]
#[command(name = "adoption-report")]
#[command(about = "Combined AI adoption reporting from IDE-plugin and API usage exports")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the combined adoption report for one period
    Report(ReportArgs),
    /// Fold a cursor-tool trend export into the combined trend file
    MergeCursor(MergeCursorArgs),
}

#[derive(Args)]
struct ReportArgs {
    /// GitHub Copilot usage JSON file (under the input directory)
    #[arg(long)]
    github_json: String,
    /// Workbench (API) usage JSON file (under the input directory)
    #[arg(long)]
    workbench_json: String,
    /// Optional CSV with per-user workbench question counts
    #[arg(long)]
    workbench_questions_csv: Option<String>,
    /// Month in YYYY-MM format (alternative to start/end dates)
    #[arg(long)]
    month: Option<String>,
    /// Start date in YYYY-MM-DD format
    #[arg(long)]
    start_date: Option<String>,
    /// End date in YYYY-MM-DD format
    #[arg(long)]
    end_date: Option<String>,
    /// File name for the CSV report (under the output directory)
    #[arg(long, default_value = "combined_adoption_report.csv")]
    csv_output: String,
}

#[derive(Args)]
struct MergeCursorArgs {
    /// Cursor trend export CSV (under the input directory)
    #[arg(long)]
    cursor_csv: String,
    /// Month in YYYY-MM format
    #[arg(long)]
    month: String,
}

fn main() {
    logging::init_logging();
    let cli = Cli::parse();

    let result = Config::load().and_then(|config| match cli.command {
        Commands::Report(args) => run_report(&config, &args),
        Commands::MergeCursor(args) => run_merge_cursor(&config, &args),
    });

    if let Err(err) = result {
        eprintln!("{} {err:#}", "Error:".bright_red().bold());
        process::exit(1);
    }
}

fn run_report(config: &Config, args: &ReportArgs) -> Result<()> {
    // Validate the period argument before touching any file.
    let requested = derive_period(
        args.month.as_deref(),
        args.start_date.as_deref(),
        args.end_date.as_deref(),
    )?;

    let github_path = config.input_path(&args.github_json);
    if !github_path.exists() {
        bail!("GitHub JSON file '{}' not found", github_path.display());
    }
    let workbench_path = config.input_path(&args.workbench_json);
    if !workbench_path.exists() {
        bail!("Workbench JSON file '{}' not found", workbench_path.display());
    }
    let questions_path: Option<PathBuf> = args
        .workbench_questions_csv
        .as_deref()
        .map(|name| config.input_path(name));

    info!(%requested, "requested analysis period");
    let period = constrain_period(requested, extract_report_range(&github_path))?;

    let mut roster = Roster::load(&config.roster_path())?;
    if let Some(leaderboard) =
        find_leaderboard_file(&config.paths.input_dir, &config.files.leaderboard_pattern)
    {
        let emails = load_leaderboard_emails(&leaderboard)?;
        roster = roster.intersect_with(&emails);
    }
    let mut identities = IdentityMap::load(&config.email_mappings_path())?;

    let github_data = load_github_data(&github_path, &roster, &mut identities, Some(&period))?;
    let workbench_data = load_workbench_data(&workbench_path, &roster, &period)?;
    let questions = load_workbench_questions(questions_path.as_deref(), &roster)?;

    let merged = merge_user_data(&roster, &github_data, &workbench_data, &questions, &period);
    let (metrics, enriched) = calculate_adoption_metrics(merged, &period);
    let chapters = calculate_chapter_breakdown(&enriched);

    config.ensure_output_dir()?;
    let csv_path = config.output_path(&args.csv_output);
    generate_csv_report(&enriched, &metrics, &csv_path)?;

    let trends_month = args
        .month
        .clone()
        .unwrap_or_else(|| period.start.format("%Y-%m").to_string());
    let trends_path = config.trends_path();
    upsert_trends(&trends_path, &enriched, &trends_month)?;

    print_summary(&metrics, &chapters, &csv_path, &trends_path);
    Ok(())
}

fn run_merge_cursor(config: &Config, args: &MergeCursorArgs) -> Result<()> {
    let cursor_path = config.input_path(&args.cursor_csv);
    if !cursor_path.exists() {
        bail!("Cursor trends CSV '{}' not found", cursor_path.display());
    }
    let trends_path = config.trends_path();
    if !trends_path.exists() {
        bail!(
            "Trend file '{}' not found; run the report first",
            trends_path.display()
        );
    }

    let (updated, skipped, unmatched) =
        merge_cursor_columns(&trends_path, &cursor_path, &args.month)?;

    println!("\n{}", "CURSOR MERGE SUMMARY".bright_cyan().bold());
    println!("Rows updated: {updated}");
    println!("Rows skipped (non-zero values already present): {skipped}");
    println!("Unmatched cursor rows (no matching trend row): {unmatched}");
    Ok(())
}
