//! In-process cases registered per group id.
//!
//! A matched unit whose group has no registrations yields zero cases. Cases write their output through the capture
//! macros ([`crate::cprintln!`] and friends) so it lands in the worker's sink.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{CaseFailure, CatalogError, TestCatalog, Unit};

type CaseFn = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

#[derive(Default, Clone)]
pub struct RegistryCatalog {
    groups: BTreeMap<String, Vec<(String, CaseFn)>>,
    rejected: BTreeMap<String, String>,
}

impl RegistryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `case` under `group`. Cases are listed in registration order.
    pub fn case<F>(mut self, group: &str, case: &str, body: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.groups
            .entry(group.to_string())
            .or_default()
            .push((case.to_string(), Arc::new(body)));
        self
    }

    /// Makes discovery of `group` fail with `message`.
    pub fn reject(mut self, group: &str, message: &str) -> Self {
        self.rejected.insert(group.to_string(), message.to_string());
        self
    }
}

impl TestCatalog for RegistryCatalog {
    fn discover(&self, unit: &Unit) -> Result<Vec<String>, CatalogError> {
        if let Some(message) = self.rejected.get(unit.group.as_str()) {
            return Err(CatalogError::Rejected {
                group: unit.group.clone(),
                message: message.clone(),
            });
        }
        Ok(self
            .groups
            .get(unit.group.as_str())
            .map(|cases| cases.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    fn invoke(&self, unit: &Unit, case: &str) -> Result<(), CaseFailure> {
        let body = self
            .groups
            .get(unit.group.as_str())
            .and_then(|cases| cases.iter().find(|(name, _)| name == case))
            .map(|(_, body)| Arc::clone(body))
            .ok_or_else(|| CaseFailure::new(format!("no case `{case}` in group `{}`", unit.group)))?;
        body().map_err(CaseFailure::new)
    }
}

impl fmt::Debug for RegistryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self.groups.iter().map(|(g, cases)| (g.as_str(), cases.len())).collect();
        f.debug_struct("RegistryCatalog")
            .field("groups", &counts)
            .field("rejected", &self.rejected.keys().collect::<Vec<_>>())
            .finish()
    }
}
