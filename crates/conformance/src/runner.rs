//! Control runner - evaluates registered controls in parallel

use crate::comparator::{CheckStatus, ComparisonResult, compare};
use crate::control::{Control, Target};
use crate::correlator::{Correlation, Correlator};
use crate::declaration::Declaration;
use crate::entity::{Expected, ObservedEntity};
use crate::error::{Error, Result};
use crate::flags::FeatureFlags;
use crate::provider::{Observer, Selector};
use crate::registry::Registry;
use crate::report::{ControlResult, RunReport};
use crate::resolver::{Scope, resolve};
use chrono::Utc;
use rayon::prelude::*;
use serde_json::Value;

/// Options for a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Number of controls evaluated concurrently
    pub jobs: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { jobs: 4 }
    }
}

/// Receives progress updates from worker threads
pub trait ProgressCallback: Sync {
    /// Called when a control starts
    fn on_control_start(&self, _id: &str) {}

    /// Called when a control finishes
    fn on_control_complete(&self, _result: &ControlResult) {}
}

/// Progress callback that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

/// Evaluates controls against one declaration and one observer
pub struct Runner<'a> {
    declaration: &'a Declaration,
    flags: &'a FeatureFlags,
    observer: Observer,
    options: RunOptions,
}

impl<'a> Runner<'a> {
    /// Create a runner with default options
    pub fn new(declaration: &'a Declaration, flags: &'a FeatureFlags, observer: Observer) -> Self {
        Self {
            declaration,
            flags,
            observer,
            options: RunOptions::default(),
        }
    }

    /// Override run options
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Run every registered control without progress reporting
    pub fn run(&self, registry: &Registry) -> Result<RunReport> {
        self.run_with_progress(registry, &NoProgress)
    }

    /// Run every registered control
    ///
    /// Fails only on errors that invalidate the whole run (for example a
    /// required declaration key that is missing). Correlation and
    /// observation failures are recorded against their control.
    pub fn run_with_progress<P: ProgressCallback>(
        &self,
        registry: &Registry,
        progress: &P,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let jobs = self.options.jobs.max(1);
        log::info!("Running {} controls with {} jobs", registry.len(), jobs);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create thread pool: {e}")))?;

        let results = pool.install(|| {
            registry
                .controls()
                .par_iter()
                .map(|control| {
                    progress.on_control_start(&control.id);
                    let result = self.run_control(control)?;
                    progress.on_control_complete(&result);
                    Ok(result)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(RunReport::new(started_at, results))
    }

    /// Evaluate a single control
    pub fn run_control(&self, control: &Control) -> Result<ControlResult> {
        if let Some(reason) = control.skip_reason(self.flags) {
            log::debug!("Skipping control '{}': {}", control.id, reason);
            let checks = control
                .rules
                .paths()
                .map(|path| ComparisonResult::skipped(path, "", reason))
                .collect();
            return Ok(ControlResult::new(
                &control.id,
                &control.title,
                control.impact,
                checks,
                Vec::new(),
            ));
        }

        let mut evaluation = Evaluation::default();
        match &control.target {
            Target::Entities { kind, names } => {
                self.run_entities(control, kind, names, &mut evaluation)?;
            }
            Target::Groups { kind } => {
                let correlator = Correlator::exact(control.groups.keys().cloned())?;
                self.run_correlated(control, kind, &correlator, &mut evaluation)?;
            }
            Target::Prefixed { kind, prefix } => {
                let correlator = Correlator::prefix(prefix)?;
                self.run_correlated(control, kind, &correlator, &mut evaluation)?;
            }
        }

        let result = ControlResult::new(
            &control.id,
            &control.title,
            control.impact,
            evaluation.checks,
            evaluation.diagnostics,
        );
        log::debug!("Control '{}' {}", control.id, result.status);
        Ok(result)
    }

    fn run_entities(
        &self,
        control: &Control,
        kind: &str,
        names: &[String],
        evaluation: &mut Evaluation,
    ) -> Result<()> {
        for name in names {
            let selector = Selector::name(name);
            let exists = match self.observer.exists(kind, &selector) {
                Ok(exists) => exists,
                Err(e) => {
                    evaluation.diagnose(&control.id, Error::from(e))?;
                    continue;
                }
            };
            evaluation.checks.push(exists_check(name, exists));
            if !exists {
                continue;
            }

            let observed = match self.observer.get(kind, &selector) {
                Ok(observed) => observed,
                Err(e) => {
                    evaluation.diagnose(&control.id, Error::from(e))?;
                    continue;
                }
            };
            let scope = Scope {
                declaration: self.declaration,
                flags: self.flags,
                settings: &control.settings,
                group_name: None,
                group: None,
                instance: name,
            };
            let expected = resolve(&control.rules, &scope)?;
            evaluation.checks.extend(compare(&expected, &observed, name));
        }
        Ok(())
    }

    fn run_correlated(
        &self,
        control: &Control,
        kind: &str,
        correlator: &Correlator,
        evaluation: &mut Evaluation,
    ) -> Result<()> {
        let listed = match self
            .observer
            .list(kind, &Selector::pattern(correlator.pattern()))
        {
            Ok(listed) => listed,
            Err(e) => return evaluation.diagnose(&control.id, Error::from(e)),
        };

        // Correlation completes before any instance is compared
        let correlation: Correlation =
            correlator.correlate(listed.iter().filter_map(ObservedEntity::name));
        if let Err(errors) = correlation.require_all() {
            for error in errors {
                evaluation.diagnose(&control.id, error)?;
            }
        }

        for (logical, instance) in correlation.pairs() {
            let Some(observed) = listed.iter().find(|e| e.name() == Some(instance)) else {
                continue;
            };
            let group = control.groups.get(logical);
            let flags = match group {
                Some(group) => self.flags.overlay(&group.flags),
                None => self.flags.clone(),
            };
            let scope = Scope {
                declaration: self.declaration,
                flags: &flags,
                settings: &control.settings,
                group_name: group.map(|_| logical),
                group: group.map(|g| &g.spec),
                instance,
            };
            let expected = resolve(&control.rules, &scope)?;
            evaluation.checks.extend(compare(&expected, observed, instance));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Evaluation {
    checks: Vec<ComparisonResult>,
    diagnostics: Vec<String>,
}

impl Evaluation {
    /// Record a per-control failure, or propagate a fatal one
    fn diagnose(&mut self, control_id: &str, error: Error) -> Result<()> {
        if error.is_fatal() {
            return Err(error);
        }
        log::warn!("Control '{}': {}", control_id, error);
        self.diagnostics.push(error.to_string());
        Ok(())
    }
}

fn exists_check(name: &str, exists: bool) -> ComparisonResult {
    ComparisonResult {
        path: "exists".to_string(),
        expected: Some(Expected::from(true)),
        actual: Some(Value::Bool(exists)),
        status: if exists {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        },
        instance: name.to_string(),
        detail: (!exists).then(|| format!("'{name}' was not found")),
    }
}
