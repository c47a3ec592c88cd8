//! # Conformance
//!
//! A framework for checking observed infrastructure against its declaration.
//!
//! This crate computes what each resource attribute should be from a set of
//! declared values and feature toggles, matches platform-named instances to
//! the logical names they were declared under, and compares the two with
//! explicit absence semantics.
//!
//! ## Core Concepts
//!
//! - **Declaration**: Immutable named values, usually infrastructure outputs
//! - **FeatureFlags**: Toggles that select which expectations apply
//! - **RuleTable**: Ordered `(predicate, resolution)` arms per attribute path
//! - **Correlator**: Maps `<name>-<revision>` instances to logical names
//! - **Control**: A named, impact-weighted set of checks against one target
//! - **Runner**: Evaluates controls in parallel and produces a [`RunReport`]
//!
//! ## Example
//!
//! ```ignore
//! use conformance::{
//!     AttributeRule, CallPolicy, Control, Declaration, FeatureFlags, MemoryProvider,
//!     Observer, Predicate, Registry, Resolution, RuleTable, Runner, Target,
//! };
//! use std::sync::Arc;
//!
//! let rules = RuleTable::new("container.cluster").rule(
//!     AttributeRule::new("initial_node_count")
//!         .when(Predicate::Enabled("autopilot"), Resolution::Absent)
//!         .otherwise(Resolution::fixed(1)),
//! );
//! let target = Target::Entities {
//!     kind: "container.cluster".into(),
//!     names: vec!["demo".into()],
//! };
//!
//! let mut registry = Registry::new();
//! registry.register(Control::new("cluster", "Cluster", 1.0, target, rules))?;
//!
//! let provider = MemoryProvider::new()
//!     .with("container.cluster", serde_json::json!({"name": "demo"}));
//! let observer = Observer::new(Arc::new(provider), CallPolicy::default());
//!
//! let declaration = Declaration::default();
//! let flags = FeatureFlags::new().with_bool("autopilot", true);
//! let report = Runner::new(&declaration, &flags, observer).run(&registry)?;
//! assert!(report.conformant());
//! ```
//!
//! ## Provider Traits
//!
//! - [`ObservationProvider`]: Read-only access to observed state
//! - [`ProgressCallback`]: Receives per-control progress from worker threads
//!
//! This allows the crate to be used without hard dependencies on any
//! particular cloud API client or terminal UI.

pub mod comparator;
pub mod control;
pub mod correlator;
pub mod declaration;
pub mod entity;
pub mod error;
pub mod flags;
pub mod provider;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod runner;

// Re-export main types at crate root
pub use comparator::{CheckStatus, ComparisonResult, compare};
pub use control::{Control, Group, Skip, Target};
pub use correlator::{Correlation, Correlator};
pub use declaration::{Declaration, KeyStyle};
pub use entity::{Expected, ExpectedEntity, ObservedEntity, Order};
pub use error::{Error, ErrorCategory, ObservationError, Result};
pub use flags::{FeatureFlags, Flag, Predicate};
pub use provider::{CallPolicy, MemoryProvider, ObservationProvider, Observer, Selector};
pub use registry::Registry;
pub use report::{ControlResult, ControlStatus, RunReport, Summary};
pub use resolver::{
    AttributeRule, Resolution, RuleTable, Scope, merge_labels, override_value, resolve,
};
pub use retry::RetryPolicy;
pub use runner::{NoProgress, ProgressCallback, RunOptions, Runner};
