//! `check` - evaluate controls against an observation snapshot

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use conformance::{ControlResult, Declaration, Observer, ProgressCallback, RunReport, Runner};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::sync::Arc;

use crate::Context;
use crate::cli::{CheckArgs, OutputFormat};
use crate::config::Settings;
use crate::controls;
use crate::paths;
use crate::snapshot;
use crate::ui;

/// Progress bar fed from the runner's worker threads
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: usize, visible: bool) -> Self {
        if !visible {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_control_start(&self, id: &str) {
        self.bar.set_message(id.to_string());
    }

    fn on_control_complete(&self, result: &ControlResult) {
        if result.failed() {
            self.bar.println(format!("  {} {}", "✗".red(), result.id));
        }
        self.bar.inc(1);
    }
}

/// Settings from the file, overridden by command line flags
fn settings_for(args: &CheckArgs) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load_from(&paths::expand_path(path))?,
        None => Settings::load()?,
    };
    if let Some(jobs) = args.jobs {
        settings.jobs = jobs.max(1);
    }
    if let Some(timeout) = args.timeout {
        settings.timeout_secs = timeout.max(1);
    }
    if let Some(threshold) = args.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("--threshold must be between 0.0 and 1.0, got {threshold}");
        }
        settings.threshold = threshold;
    }
    Ok(settings)
}

/// Load inputs, build the catalogue and run it
fn evaluate<P: ProgressCallback>(
    args: &CheckArgs,
    settings: &Settings,
    progress: impl FnOnce(usize) -> P,
) -> Result<(RunReport, P)> {
    let declaration_path = paths::expand_path(&args.declaration);
    let declaration = Declaration::load(&declaration_path).with_context(|| {
        format!("Failed to load declaration: {}", declaration_path.display())
    })?;

    let catalogue = controls::build(args.profile, &declaration)
        .with_context(|| format!("Declaration does not support profile '{}'", args.profile))?;
    let registry = catalogue.registry.select(args.controls.as_deref())?;

    let provider = snapshot::load(&paths::expand_path(&args.observations))?;
    let observer = Observer::new(Arc::new(provider), settings.call_policy());

    let progress = progress(registry.len());
    let report = Runner::new(&declaration, &catalogue.flags, observer)
        .with_options(settings.run_options())
        .run_with_progress(&registry, &progress)
        .context("Run aborted")?;
    Ok((report, progress))
}

pub fn run(ctx: &Context, args: CheckArgs) -> Result<()> {
    let settings = settings_for(&args)?;
    let show_progress = !ctx.quiet && args.format == OutputFormat::Text;

    let (report, progress) = evaluate(&args, &settings, |total| {
        BarProgress::new(total, show_progress)
    })?;
    progress.finish();

    match args.format {
        OutputFormat::Json => {
            let document = json!({
                "started_at": report.started_at,
                "conformant": report.conformant(),
                "summary": report.summary(),
                "controls": report.controls,
            });
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        OutputFormat::Text if ctx.quiet => {}
        OutputFormat::Text => ui::print_report(&report, settings.threshold, ctx.verbose > 0),
    }

    let blocking = report.failed_at_or_above(settings.threshold);
    if !blocking.is_empty() {
        bail!(
            "{} control(s) with impact >= {} failed",
            blocking.len(),
            ui::format_impact(settings.threshold)
        );
    }
    Ok(())
}
