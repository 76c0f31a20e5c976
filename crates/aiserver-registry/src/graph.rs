//! Dependency graph management using `petgraph`.
//!
//! Edges point from a module to each module it depends on. Cycle detection
//! is a three-color depth-first search that reconstructs the offending path;
//! chain resolution is a post-order walk that honours declaration order.

use std::collections::{HashMap, HashSet};

use aiserver_common::error::{OrchestratorError, Result};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::schema::ModuleSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// A dependency graph of modules.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the graph from modules in declaration order.
    ///
    /// References to unknown modules are skipped with a warning.
    #[must_use]
    pub fn from_modules(modules: &[ModuleSchema]) -> Self {
        let mut graph = Self::default();
        for module in modules {
            let _ = graph.add_module(&module.name);
        }
        for module in modules {
            for dep in &module.depends_on {
                if graph.index.contains_key(dep) {
                    graph.add_dependency(&module.name, dep);
                } else {
                    tracing::warn!(module = %module.name, dependency = %dep, "ignoring unknown dependency");
                }
            }
        }
        graph
    }

    /// Adds a module node, returning the existing index if already present.
    pub fn add_module(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        let _ = self.index.insert(name.to_string(), idx);
        idx
    }

    /// Adds an edge: `dependent` depends on `dependency`.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        let from = self.add_module(dependent);
        let to = self.add_module(dependency);
        let _ = self.graph.add_edge(from, to, ());
    }

    /// Number of modules in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no modules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of `node` in declaration order.
    ///
    /// `petgraph` yields neighbours most-recent-first.
    fn dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        deps.reverse();
        deps
    }

    fn name(&self, node: NodeIndex) -> String {
        self.graph.node_weight(node).cloned().unwrap_or_default()
    }

    /// Finds a cycle reachable from `start`.
    ///
    /// The returned path begins and ends at the repeated module, e.g.
    /// `["b", "c", "b"]` for `a -> b -> c -> b`.
    #[must_use]
    pub fn find_cycle_from(&self, start: &str) -> Option<Vec<String>> {
        let &start = self.index.get(start)?;
        let mut color = vec![Color::White; self.graph.node_count()];
        let mut stack = Vec::new();
        self.visit(start, &mut color, &mut stack)
    }

    fn visit(
        &self,
        node: NodeIndex,
        color: &mut [Color],
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        color[node.index()] = Color::Gray;
        stack.push(node);
        for dep in self.dependencies(node) {
            match color[dep.index()] {
                Color::Gray => {
                    let pos = stack.iter().position(|&n| n == dep)?;
                    let mut path: Vec<String> =
                        stack[pos..].iter().map(|&n| self.name(n)).collect();
                    path.push(self.name(dep));
                    return Some(path);
                }
                Color::White => {
                    if let Some(path) = self.visit(dep, color, stack) {
                        return Some(path);
                    }
                }
                Color::Black => {}
            }
        }
        let _ = stack.pop();
        color[node.index()] = Color::Black;
        None
    }

    /// Returns every module from which a cycle is reachable, with its path,
    /// in insertion order.
    #[must_use]
    pub fn cycles(&self) -> Vec<(String, Vec<String>)> {
        self.graph
            .node_indices()
            .filter_map(|idx| {
                let name = self.name(idx);
                self.find_cycle_from(&name).map(|path| (name, path))
            })
            .collect()
    }

    /// Fails with a dependency-cycle error if `module` reaches a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::DependencyCycle`] carrying the cycle path.
    pub fn ensure_acyclic_from(&self, module: &str) -> Result<()> {
        match self.find_cycle_from(module) {
            Some(path) => Err(OrchestratorError::DependencyCycle {
                module: module.to_string(),
                path,
            }),
            None => Ok(()),
        }
    }

    /// Returns the transitive dependencies of `target`, each exactly once,
    /// dependencies before their dependents, following declaration order.
    ///
    /// The target itself is not included. Cycles must be ruled out first;
    /// a visited set still bounds the walk if they were not.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for an unknown target.
    pub fn resolve_chain(&self, target: &str) -> Result<Vec<String>> {
        let &start = self
            .index
            .get(target)
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "module",
                id: target.to_string(),
            })?;
        let mut visited = HashSet::from([start]);
        let mut order = Vec::new();
        self.post_order(start, &mut visited, &mut order);
        Ok(order.into_iter().map(|idx| self.name(idx)).collect())
    }

    fn post_order(&self, node: NodeIndex, visited: &mut HashSet<NodeIndex>, out: &mut Vec<NodeIndex>) {
        for dep in self.dependencies(node) {
            if visited.insert(dep) {
                self.post_order(dep, visited, out);
                out.push(dep);
            }
        }
    }

    /// Modules that directly depend on `module`.
    #[must_use]
    pub fn dependents(&self, module: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(module) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|n| self.name(n))
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut g = DependencyGraph::default();
        for (name, _) in edges {
            let _ = g.add_module(name);
        }
        for (name, deps) in edges {
            for dep in *deps {
                g.add_dependency(name, dep);
            }
        }
        g
    }

    #[test]
    fn empty_graph_has_no_cycles() {
        let g = DependencyGraph::default();
        assert!(g.is_empty());
        assert!(g.cycles().is_empty());
    }

    #[test]
    fn chain_lists_dependencies_before_dependents() {
        let g = graph(&[
            ("app", &["cache", "db"]),
            ("cache", &["db"]),
            ("db", &[]),
        ]);
        let chain = g.resolve_chain("app").expect("should resolve");
        assert_eq!(chain, vec!["db", "cache"]);
    }

    #[test]
    fn chain_follows_declaration_order() {
        let g = graph(&[("app", &["redis", "mysql", "minio"]), ("redis", &[]), ("mysql", &[]), ("minio", &[])]);
        let chain = g.resolve_chain("app").expect("should resolve");
        assert_eq!(chain, vec!["redis", "mysql", "minio"]);
    }

    #[test]
    fn diamond_returns_each_dependency_once() {
        let g = graph(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        let chain = g.resolve_chain("top").expect("should resolve");
        assert_eq!(chain, vec!["base", "left", "right"]);
    }

    #[test]
    fn unknown_target_is_not_found() {
        let g = graph(&[("a", &[])]);
        let err = g.resolve_chain("zzz").unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { .. }), "got: {err}");
    }

    #[test]
    fn cycle_path_is_trimmed_to_repeated_node() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["b"])]);
        let path = g.find_cycle_from("a").expect("cycle");
        assert_eq!(path, vec!["b", "c", "b"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        assert_eq!(g.find_cycle_from("a"), Some(vec!["a".to_string(), "a".to_string()]));
    }

    #[test]
    fn every_module_reaching_a_cycle_is_reported() {
        let g = graph(&[("x", &["a"]), ("a", &["b"]), ("b", &["a"]), ("free", &[])]);
        let names: Vec<String> = g.cycles().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["x", "a", "b"]);
        let err = g.ensure_acyclic_from("x").unwrap_err();
        assert!(err.to_string().contains("a -> b -> a"), "got: {err}");
        assert!(g.ensure_acyclic_from("free").is_ok());
    }

    #[test]
    fn chain_terminates_even_with_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let chain = g.resolve_chain("a").expect("bounded");
        assert_eq!(chain, vec!["b"]);
    }

    #[test]
    fn dependents_are_sorted() {
        let g = graph(&[("n8n", &["db"]), ("dify", &["db"]), ("db", &[])]);
        assert_eq!(g.dependents("db"), vec!["dify", "n8n"]);
    }
}
