//! Project dependency graph
//!
//! Handles cycle detection, build order, and the inverse (downstream)
//! adjacency used by change propagation and the build scheduler.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::WorkspaceError;

/// Dependency graph over project names
#[derive(Debug, Default)]
pub struct ProjectGraph {
    /// Adjacency list: project -> local dependencies
    edges: BTreeMap<String, Vec<String>>,
    /// All known projects
    nodes: BTreeSet<String>,
}

impl ProjectGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project and its local dependencies
    pub fn add_project(&mut self, name: &str, dependencies: Vec<String>) {
        self.nodes.insert(name.to_string());
        for dep in &dependencies {
            self.nodes.insert(dep.clone());
        }
        self.edges.insert(name.to_string(), dependencies);
    }

    /// Direct dependencies of a project
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Compute topological sort (build order)
    ///
    /// Returns projects in order such that dependencies come before
    /// dependents. Fails with the offending path if a cycle exists.
    pub fn topological_sort(&self) -> Result<Vec<String>, WorkspaceError> {
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();
        let mut result = Vec::new();
        let mut cycle_path = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                self.visit(
                    node,
                    &mut visited,
                    &mut temp_visited,
                    &mut result,
                    &mut cycle_path,
                )?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
        cycle_path: &mut Vec<String>,
    ) -> Result<(), WorkspaceError> {
        if temp_visited.contains(node) {
            // Found a cycle
            cycle_path.push(node.to_string());
            return Err(WorkspaceError::CircularDependency {
                cycle: cycle_path.clone(),
            });
        }

        if visited.contains(node) {
            return Ok(());
        }

        temp_visited.insert(node.to_string());
        cycle_path.push(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.visit(dep, visited, temp_visited, result, cycle_path)?;
            }
        }

        cycle_path.pop();
        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());

        Ok(())
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Inverse adjacency: project -> projects that depend on it
    pub fn downstream(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut downstream: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for node in &self.nodes {
            downstream.entry(node.clone()).or_default();
        }
        for (consumer, deps) in &self.edges {
            for dep in deps {
                downstream
                    .entry(dep.clone())
                    .or_default()
                    .insert(consumer.clone());
            }
        }
        downstream
    }

    /// All transitive dependencies of `name`, excluding itself
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            for dep in self.dependencies_of(&current) {
                if out.insert(dep.clone()) {
                    stack.push(dep.clone());
                }
            }
        }
        out
    }

    /// All transitive dependents of `name`, excluding itself
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let downstream = self.downstream();
        let mut out = BTreeSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(dependents) = downstream.get(&current) {
                for dependent in dependents {
                    if out.insert(dependent.clone()) {
                        stack.push(dependent.clone());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_dependency_order() {
        let mut graph = ProjectGraph::new();
        graph.add_project("app", vec!["lib".to_string()]);
        graph.add_project("lib", vec![]);

        let order = graph.topological_sort().unwrap();
        let lib_pos = order.iter().position(|x| x == "lib").unwrap();
        let app_pos = order.iter().position(|x| x == "app").unwrap();

        assert!(lib_pos < app_pos, "lib should be built before app");
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = ProjectGraph::new();
        graph.add_project("a", vec!["b".to_string()]);
        graph.add_project("b", vec!["c".to_string()]);
        graph.add_project("c", vec!["a".to_string()]);

        assert!(graph.has_cycle());
        let err = graph.topological_sort().unwrap_err();
        match err {
            WorkspaceError::CircularDependency { cycle } => {
                assert!(cycle.len() >= 3, "cycle path should name its members: {cycle:?}");
            }
            other => panic!("expected CircularDependency, got {other}"),
        }
    }

    #[test]
    fn test_downstream_inverse() {
        let mut graph = ProjectGraph::new();
        graph.add_project("app", vec!["lib".to_string(), "util".to_string()]);
        graph.add_project("lib", vec!["util".to_string()]);
        graph.add_project("util", vec![]);

        let downstream = graph.downstream();
        let util_dependents = downstream.get("util").unwrap();
        assert!(util_dependents.contains("app"));
        assert!(util_dependents.contains("lib"));
        assert!(downstream.get("app").unwrap().is_empty());
    }

    #[test]
    fn test_transitive_closures() {
        let mut graph = ProjectGraph::new();
        graph.add_project("a", vec!["b".to_string()]);
        graph.add_project("b", vec!["c".to_string()]);
        graph.add_project("c", vec![]);

        let deps = graph.transitive_dependencies("a");
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("b") && deps.contains("c"));

        let dependents = graph.transitive_dependents("c");
        assert_eq!(dependents.len(), 2);
        assert!(dependents.contains("a") && dependents.contains("b"));
    }
}
