use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use starwatch::{
    AuditOptions, FollowSource, Report, ReportAssembler, RepositoryReport, RepositoryStatus,
    UsernameCase, UsernameSet,
};

use crate::AuditArgs;
use crate::commands::shared::{OutputFormat, github_client};
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Handle the audit command.
pub(crate) async fn handle_audit(
    args: AuditArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = audit_options(&args, config);
    tracing::debug!(?options, "Resolved audit options");

    let client = github_client(config, args.no_rate_limit)?;
    let reporter = Arc::new(ProgressReporter::new());
    let assembler = ReportAssembler::new(client, options).with_progress(Some(reporter.as_callback()));

    let result = assembler.run(&args.username).await;
    reporter.finish();
    let report = result?;

    match args.output {
        OutputFormat::Table => print!("{}", render_table(&report, args.show_stargazers)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}

/// Merge CLI flags over configured defaults.
pub(crate) fn audit_options(args: &AuditArgs, config: &Config) -> AuditOptions {
    let timeout = match args.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.timeout(),
    };
    let case = if args.ignore_case {
        UsernameCase::Lowercase
    } else {
        config.username_case()
    };

    AuditOptions {
        concurrency: args.concurrency.unwrap_or(config.audit.concurrency).max(1),
        timeout,
        follow_source: args
            .follow_source
            .map(FollowSource::from)
            .unwrap_or(config.audit.follow_source),
        case,
        retry: config.retry_config(),
        preflight: !args.no_preflight,
    }
}

/// Repository row for table output.
#[derive(Debug, Clone, tabled::Tabled)]
pub(crate) struct RepositoryRow {
    #[tabled(rename = "Repository")]
    pub name: String,
    #[tabled(rename = "Stars")]
    pub star_count: u64,
    #[tabled(rename = "Collected")]
    pub collected: usize,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl From<&RepositoryReport> for RepositoryRow {
    fn from(repo: &RepositoryReport) -> Self {
        Self {
            name: repo.name.clone(),
            star_count: repo.star_count,
            collected: repo.stargazers.len(),
            status: match &repo.status {
                RepositoryStatus::Complete => "ok".to_string(),
                RepositoryStatus::Failed { error } => format!("failed: {error}"),
            },
        }
    }
}

/// Stargazer listing row for `--show-stargazers`.
#[derive(Debug, Clone, tabled::Tabled)]
pub(crate) struct StargazerRow {
    #[tabled(rename = "Repository")]
    pub name: String,
    #[tabled(rename = "Stargazers")]
    pub stargazers: String,
}

fn join(users: &UsernameSet) -> String {
    if users.is_empty() {
        "-".to_string()
    } else {
        users.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Render the report for a terminal.
pub(crate) fn render_table(report: &Report, show_stargazers: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Audit of {}", report.username);

    if report.repositories.is_empty() {
        let _ = writeln!(out, "No public repositories.");
    } else {
        let rows: Vec<RepositoryRow> = report.repositories.iter().map(RepositoryRow::from).collect();
        let mut table = tabled::Table::new(rows);
        table.with(tabled::settings::Style::rounded());
        let _ = writeln!(out, "{table}");
    }

    if show_stargazers && !report.repositories.is_empty() {
        let rows: Vec<StargazerRow> = report
            .repositories
            .iter()
            .map(|r| StargazerRow {
                name: r.name.clone(),
                stargazers: join(&r.stargazers),
            })
            .collect();
        let mut table = tabled::Table::new(rows);
        table.with(tabled::settings::Style::rounded());
        let _ = writeln!(out, "{table}");
    }

    let _ = writeln!(
        out,
        "Followers: {}  Following: {}  Stargazers collected: {}",
        report.follow.followers.len(),
        report.follow.following.len(),
        report.total_stargazers()
    );
    let diff = &report.follow_diff;
    let _ = writeln!(
        out,
        "Not following back ({}): {}",
        diff.not_following_back.len(),
        join(&diff.not_following_back)
    );
    let _ = writeln!(
        out,
        "Not followed back ({}): {}",
        diff.not_followed_back.len(),
        join(&diff.not_followed_back)
    );

    let failed = report.failed_repositories().count();
    if failed > 0 {
        let _ = writeln!(out, "{failed} repositories could not be collected");
    }

    out
}
