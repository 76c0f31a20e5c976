//! Registry validation.
//!
//! Problems are collected as human-readable issues instead of failing on the
//! first one; callers decide whether to abort.

use std::collections::HashSet;

use aiserver_common::error::{OrchestratorError, Result};
use aiserver_common::types::ModuleType;

use crate::graph::DependencyGraph;
use crate::schema::ModuleSchema;

/// Returns every issue found in `modules`.
///
/// Checks required fields, module type, template shape, name uniqueness,
/// and dependency cycles. Unknown dependencies are only warned about.
pub fn validate(modules: &[ModuleSchema]) -> Vec<String> {
    tracing::debug!(count = modules.len(), "validating module registry");
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    for module in modules {
        let errors = check_module(module);
        if !errors.is_empty() {
            let label = if module.name.is_empty() { "?" } else { &module.name };
            issues.push(format!("[{label}] {}", errors.join(", ")));
        }
        if !module.name.is_empty() && !seen.insert(module.name.as_str()) {
            issues.push(format!("duplicate module name: {}", module.name));
        }
    }
    let graph = DependencyGraph::from_modules(modules);
    for (module, path) in graph.cycles() {
        issues.push(format!("E_DEP_CYCLE: {module} ({})", path.join(" -> ")));
    }
    issues
}

/// Fails with every issue if the registry is not valid.
///
/// # Errors
///
/// Returns [`OrchestratorError::Validation`] carrying all issues.
pub fn ensure_valid(modules: &[ModuleSchema]) -> Result<()> {
    let issues = validate(modules);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(OrchestratorError::Validation { issues })
    }
}

fn check_module(module: &ModuleSchema) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if module.name.trim().is_empty() {
        errors.push("name is required");
    }
    if module.module_type == ModuleType::Unknown {
        errors.push("type must be basic|feature");
    }
    if let Some(template) = &module.template {
        if template.file.is_none() && template.fragment.is_none() {
            errors.push("template.file|fragment required");
        }
    } else if module.image.is_none() {
        errors.push("image or template is required");
    }
    errors
}
