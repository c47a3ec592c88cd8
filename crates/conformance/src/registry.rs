//! Control registry - validated, ordered set of controls for a run

use crate::control::Control;
use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Controls registered for a run, kept in registration order
#[derive(Debug, Clone, Default)]
pub struct Registry {
    controls: Vec<Control>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a control
    ///
    /// Rejects duplicate ids, impacts outside `[0.0, 1.0]` and controls
    /// without checks.
    pub fn register(&mut self, control: Control) -> Result<()> {
        if !(0.0..=1.0).contains(&control.impact) {
            return Err(Error::InvalidControl {
                id: control.id,
                message: format!("impact {} is outside [0.0, 1.0]", control.impact),
            });
        }
        if self.contains(&control.id) {
            return Err(Error::InvalidControl {
                id: control.id,
                message: "duplicate control id".to_string(),
            });
        }
        if control.rules.is_empty() {
            return Err(Error::InvalidControl {
                id: control.id,
                message: "control has no checks".to_string(),
            });
        }
        log::trace!("Registered control '{}'", control.id);
        self.controls.push(control);
        Ok(())
    }

    /// Register several controls, stopping at the first rejection
    pub fn register_all(&mut self, controls: impl IntoIterator<Item = Control>) -> Result<()> {
        for control in controls {
            self.register(control)?;
        }
        Ok(())
    }

    /// Keep only the named controls; no filter keeps everything
    pub fn select(self, ids: Option<&[String]>) -> Result<Self> {
        let Some(ids) = ids else {
            return Ok(self);
        };
        if let Some(unknown) = ids.iter().find(|id| !self.contains(id)) {
            return Err(Error::UnknownControl(unknown.clone()));
        }
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let controls = self
            .controls
            .into_iter()
            .filter(|c| wanted.contains(c.id.as_str()))
            .collect();
        Ok(Self { controls })
    }

    /// Whether a control id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.controls.iter().any(|c| c.id == id)
    }

    /// Registered controls
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.controls.iter().map(|c| c.id.as_str())
    }

    /// Number of registered controls
    pub fn len(&self) -> usize {
        self.controls.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}
