//! # Plugin Dependency Graph
//!
//! Directed graph of `plugin -> dependency` edges with the reverse adjacency
//! kept alongside for impact queries.
//!
//! A plugin is *registered* once it is added explicitly or appears as the
//! source of an edge. Dependencies that are not registered are leaves: they
//! take part in no cycle and are skipped by [`activation_order`].
//!
//! ## Cycle Detection
//!
//! Depth-first traversal with three colors:
//!
//! - **White**: not visited
//! - **Gray**: on the current path
//! - **Black**: fully explored
//!
//! Reaching a gray node closes a cycle; the path from that node back to
//! itself is returned.
//!
//! [`activation_order`]: PluginDependencyGraph::activation_order

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

#[derive(Debug, Clone, Default)]
pub struct PluginDependencyGraph {
    /// Registered plugin -> its dependencies.
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// Plugin -> plugins that depend on it.
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl PluginDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin with no edges. Returns `false` if already present.
    pub fn add_plugin(&mut self, plugin: &str) -> bool {
        if self.dependencies.contains_key(plugin) {
            return false;
        }
        self.dependencies.insert(plugin.to_string(), BTreeSet::new());
        true
    }

    /// Record `plugin -> dependency`, registering `plugin` if needed.
    ///
    /// Returns `false` if the edge already existed.
    pub fn add_dependency(&mut self, plugin: &str, dependency: &str) -> bool {
        let added = self
            .dependencies
            .entry(plugin.to_string())
            .or_default()
            .insert(dependency.to_string());

        self.dependents
            .entry(dependency.to_string())
            .or_default()
            .insert(plugin.to_string());

        added
    }

    /// Remove a plugin and every edge touching it.
    pub fn remove_plugin(&mut self, plugin: &str) -> bool {
        let Some(dependencies) = self.dependencies.remove(plugin) else {
            return false;
        };

        for dependency in dependencies {
            if let Some(set) = self.dependents.get_mut(&dependency) {
                set.remove(plugin);
                if set.is_empty() {
                    self.dependents.remove(&dependency);
                }
            }
        }

        if let Some(dependents) = self.dependents.remove(plugin) {
            for dependent in dependents {
                if let Some(set) = self.dependencies.get_mut(&dependent) {
                    set.remove(plugin);
                }
            }
        }

        true
    }

    pub fn has_plugin(&self, plugin: &str) -> bool {
        self.dependencies.contains_key(plugin)
    }

    /// Registered plugins, sorted.
    pub fn plugins(&self) -> Vec<String> {
        self.dependencies.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }

    /// Direct dependencies of `plugin`.
    pub fn get_dependencies(&self, plugin: &str) -> Vec<String> {
        self.dependencies
            .get(plugin)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Plugins depending directly on `plugin`.
    pub fn get_dependents(&self, plugin: &str) -> Vec<String> {
        self.dependents
            .get(plugin)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every plugin affected, directly or transitively, if `plugin` goes away.
    pub fn get_all_dependents(&self, plugin: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([plugin]);

        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.dependents.get(current) {
                for dependent in dependents {
                    if dependent != plugin && seen.insert(dependent.clone()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        seen.into_iter().collect()
    }

    /// `(plugin, dependency)` pairs whose dependency is not registered.
    pub fn missing_dependencies(&self) -> Vec<(String, String)> {
        self.dependencies
            .iter()
            .flat_map(|(plugin, deps)| {
                deps.iter()
                    .filter(|dep| !self.dependencies.contains_key(*dep))
                    .map(move |dep| (plugin.clone(), dep.clone()))
            })
            .collect()
    }

    /// The first cycle found, as `[a, b, ..., a]`; empty if acyclic.
    pub fn validate_dependencies(&self) -> Vec<String> {
        let mut colors: HashMap<&str, Color> = self
            .dependencies
            .keys()
            .map(|k| (k.as_str(), Color::White))
            .collect();
        let mut path = Vec::new();

        for plugin in self.dependencies.keys() {
            if colors.get(plugin.as_str()) == Some(&Color::White) {
                if let Some(cycle) = self.visit(plugin, &mut colors, &mut path) {
                    return cycle;
                }
            }
        }

        Vec::new()
    }

    fn visit<'a>(
        &'a self,
        plugin: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        colors.insert(plugin, Color::Gray);
        path.push(plugin);

        if let Some(dependencies) = self.dependencies.get(plugin) {
            for dependency in dependencies {
                match colors.get(dependency.as_str()) {
                    Some(Color::Gray) => {
                        let start = path.iter().position(|p| *p == dependency.as_str())?;
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|p| p.to_string()).collect();
                        cycle.push(dependency.clone());
                        return Some(cycle);
                    }
                    Some(Color::White) => {
                        if let Some(cycle) = self.visit(dependency, colors, path) {
                            return Some(cycle);
                        }
                    }
                    // Done, or not registered
                    Some(Color::Black) | None => {}
                }
            }
        }

        path.pop();
        colors.insert(plugin, Color::Black);
        None
    }

    /// Registered plugins with dependencies before dependents.
    ///
    /// # Errors
    ///
    /// The cycle, if the graph has one.
    pub fn activation_order(&self) -> Result<Vec<String>, Vec<String>> {
        let cycle = self.validate_dependencies();
        if !cycle.is_empty() {
            return Err(cycle);
        }

        let mut order = Vec::with_capacity(self.dependencies.len());
        let mut visited = BTreeSet::new();

        fn visit<'a>(
            plugin: &'a str,
            dependencies: &'a BTreeMap<String, BTreeSet<String>>,
            visited: &mut BTreeSet<&'a str>,
            order: &mut Vec<String>,
        ) {
            if !visited.insert(plugin) {
                return;
            }
            let Some(deps) = dependencies.get(plugin) else {
                return;
            };
            for dep in deps {
                visit(dep, dependencies, visited, order);
            }
            order.push(plugin.to_string());
        }

        for plugin in self.dependencies.keys() {
            visit(plugin, &self.dependencies, &mut visited, &mut order);
        }

        Ok(order)
    }

    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
    }
}
