// SPDX-License-Identifier: MIT

//! Tool registry for declarative flows
//!
//! Documents refer to tools either by registered name or by an importable
//! target path. The registry resolves both: instances registered up front
//! are returned as-is, and target paths go through registered factories.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tool::Tool;

/// Builds a tool from the name and description stored in a document.
pub type ToolFactory = Arc<dyn Fn(&str, &str) -> Arc<dyn Tool> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    factories: HashMap<String, ToolFactory>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool instance under its own name, replacing any
    /// previous registration.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        log::debug!("Registering tool '{}'", tool.name());
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Registers a factory for a target path used by function and
    /// constructor tool documents.
    pub fn register_target<F>(&mut self, target: impl Into<String>, factory: F)
    where
        F: Fn(&str, &str) -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        self.factories.insert(target.into(), Arc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Rebuilds a tool from a target path, passing through the document's
    /// name and description.
    pub fn resolve(&self, target: &str, name: &str, description: &str) -> Option<Arc<dyn Tool>> {
        self.factories
            .get(target)
            .map(|factory| factory(name, description))
    }

    /// Returns the registered name of this exact instance, if any.
    /// Matches by identity, not by name, so a look-alike tool does not
    /// pass as a registered one.
    pub fn name_of(&self, tool: &Arc<dyn Tool>) -> Option<&str> {
        let needle = Arc::as_ptr(tool) as *const ();
        self.tools
            .iter()
            .find(|(_, candidate)| Arc::as_ptr(candidate) as *const () == needle)
            .map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
