use colored::Colorize;
use conformance::{CheckStatus, ComparisonResult, ControlResult, ControlStatus, RunReport};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Report Rendering
// ============================================================================

fn control_icon(status: ControlStatus) -> String {
    match status {
        ControlStatus::Passed => "✓".green().to_string(),
        ControlStatus::Failed => "✗".red().to_string(),
        ControlStatus::Skipped => "↷".yellow().to_string(),
    }
}

/// Impact rendered the way profiles declare it
pub fn format_impact(impact: f64) -> String {
    format!("{impact:.1}")
}

/// One-line description of a failed check
pub fn describe_check(check: &ComparisonResult) -> String {
    let expected = check
        .expected
        .as_ref()
        .map_or_else(|| "<unchecked>".to_string(), ToString::to_string);
    let actual = check
        .actual
        .as_ref()
        .map_or_else(|| "<missing>".to_string(), ToString::to_string);
    let mut line = format!(
        "{} [{}]: expected {expected}, got {actual}",
        check.path, check.instance
    );
    if let Some(detail) = &check.detail {
        line.push_str(&format!(" ({detail})"));
    }
    line
}

fn print_control(result: &ControlResult, verbose: bool) {
    println!(
        "  {} {} {} {}",
        control_icon(result.status),
        result.id.bold(),
        result.title,
        format!("[impact {}]", format_impact(result.impact)).dimmed()
    );

    if result.status == ControlStatus::Skipped {
        if let Some(reason) = result.checks.iter().find_map(|c| c.detail.as_deref()) {
            println!("      {}", reason.dimmed());
        }
        return;
    }

    for diagnostic in &result.diagnostics {
        println!("      {} {}", "!".red().bold(), diagnostic);
    }
    for check in &result.checks {
        match check.status {
            CheckStatus::Fail => println!("      {} {}", "✗".red(), describe_check(check)),
            CheckStatus::Pass if verbose => println!(
                "      {} {} [{}]",
                "✓".green(),
                check.path.dimmed(),
                check.instance.dimmed()
            ),
            _ => {}
        }
    }
}

/// Print a run report as text
///
/// Passing checks are listed only when `verbose` is set.
pub fn print_report(report: &RunReport, threshold: f64, verbose: bool) {
    header("Conformance Report");
    kv("Started", &report.started_at.to_rfc3339());
    println!();

    for result in &report.controls {
        print_control(result, verbose);
    }

    let summary = report.summary();
    section("Summary");
    kv("Controls", &summary.total().to_string());
    kv("Passed", &summary.passed.to_string().green().to_string());
    kv("Failed", &summary.failed.to_string().red().to_string());
    kv("Skipped", &summary.skipped.to_string().yellow().to_string());
    kv("Checks", &summary.total_checks().to_string());
    println!();

    if summary.skipped > 0 {
        info(&format!("{} control(s) skipped", summary.skipped));
    }
    if !report.conformant() {
        warn("A full-impact control failed; the cluster is not conformant");
    }

    let blocking = report.failed_at_or_above(threshold);
    if blocking.is_empty() {
        success(&format!(
            "No control with impact ≥ {} failed",
            format_impact(threshold)
        ));
    } else {
        let ids: Vec<&str> = blocking.iter().map(|r| r.id.as_str()).collect();
        error(&format!(
            "{} control(s) with impact ≥ {} failed: {}",
            blocking.len(),
            format_impact(threshold),
            ids.join(", ")
        ));
    }
}
