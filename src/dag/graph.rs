// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::config::model::TaskSpec;
use crate::engine::TaskName;
use crate::errors::{OrchestrateError, Result};
use crate::types::TaskKind;

/// Validated, read-only dependency graph. Owns the task specs.
///
/// Edge direction in the underlying petgraph graph is dependency -> dependent:
/// for `web.depends_on = ["setup"]` there is an edge `setup -> web`.
///
/// Built once at startup by [`DependencyGraph::build`] and never mutated.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    specs: Vec<TaskSpec>,
    index: HashMap<TaskName, NodeIndex>,
    dependents: HashMap<TaskName, Vec<TaskName>>,
    graph: DiGraph<TaskName, ()>,
    order: Vec<TaskName>,
}

impl DependencyGraph {
    /// Validate `specs` and build the graph.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// 1. duplicate task names
    /// 2. `depends_on` entries naming unknown tasks
    /// 3. `ready_cmd` on a task that is not a service
    /// 4. dependency cycles (reported with the full cycle path)
    pub fn build(specs: Vec<TaskSpec>) -> Result<Self> {
        let mut graph: DiGraph<TaskName, ()> = DiGraph::new();
        let mut index: HashMap<TaskName, NodeIndex> = HashMap::new();

        for spec in &specs {
            if index.contains_key(&spec.name) {
                return Err(OrchestrateError::DuplicateTask(spec.name.clone()));
            }
            let node = graph.add_node(spec.name.clone());
            index.insert(spec.name.clone(), node);
        }

        let mut dependents: HashMap<TaskName, Vec<TaskName>> = specs
            .iter()
            .map(|s| (s.name.clone(), Vec::new()))
            .collect();

        for spec in &specs {
            for dep in &spec.depends_on {
                let Some(&dep_node) = index.get(dep) else {
                    return Err(OrchestrateError::UnknownDependency {
                        task: spec.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                graph.add_edge(dep_node, index[&spec.name], ());
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(spec.name.clone());
                }
            }
        }

        for spec in &specs {
            if spec.ready_cmd.is_some() && spec.kind != TaskKind::Service {
                return Err(OrchestrateError::ReadyCmdOnNonService {
                    task: spec.name.clone(),
                    kind: spec.kind,
                });
            }
        }

        let mut dag = Self {
            specs,
            index,
            dependents,
            graph,
            order: Vec::new(),
        };

        if let Some(cycle) = dag.detect_cycle() {
            return Err(OrchestrateError::DependencyCycle { cycle });
        }

        dag.order = match toposort(&dag.graph, None) {
            Ok(nodes) => nodes.into_iter().map(|n| dag.graph[n].clone()).collect(),
            Err(cycle) => {
                let name = dag.graph[cycle.node_id()].clone();
                return Err(OrchestrateError::DependencyCycle {
                    cycle: vec![name.clone(), name],
                });
            }
        };

        Ok(dag)
    }

    /// Depth-first search with recursion-stack marking.
    ///
    /// Returns the first cycle found, following `depends_on` edges, as a path
    /// that starts and ends with the same task (`a -> b -> c -> a` means `a`
    /// depends on `b`, `b` on `c`, and `c` on `a`).
    pub fn detect_cycle(&self) -> Option<Vec<TaskName>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        fn visit<'a>(
            dag: &'a DependencyGraph,
            name: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<TaskName>> {
            marks.insert(name, Mark::OnStack);
            stack.push(name);

            for dep in dag.dependencies_of(name) {
                match marks.get(dep.as_str()).copied().unwrap_or(Mark::Unvisited) {
                    Mark::OnStack => {
                        let start = stack.iter().position(|n| *n == dep.as_str())?;
                        let mut cycle: Vec<TaskName> =
                            stack[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.clone());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(dag, dep, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }

            stack.pop();
            marks.insert(name, Mark::Done);
            None
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();

        for spec in &self.specs {
            if marks.get(spec.name.as_str()).copied().unwrap_or(Mark::Unvisited) == Mark::Unvisited
            {
                if let Some(cycle) = visit(self, &spec.name, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// Whether `to` can be reached from `from` along dependency -> dependent
    /// edges, i.e. whether `to` (transitively) depends on `from`.
    ///
    /// Unknown names are never reachable. A task does not reach itself.
    pub fn is_reachable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    /// Task specs in declaration order.
    pub fn specs(&self) -> impl Iterator<Item = &TaskSpec> {
        self.specs.iter()
    }

    pub fn spec(&self, name: &str) -> Option<&TaskSpec> {
        let node = self.index.get(name)?;
        self.specs.get(node.index())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Task names, dependencies before dependents.
    pub fn topological_order(&self) -> &[TaskName] {
        &self.order
    }

    /// Tasks without dependencies, in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.specs
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| s.name.as_str())
    }

    /// Immediate dependencies of a task (its `depends_on`).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.spec(name)
            .map(|s| s.depends_on.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list it in `depends_on`).
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.dependents
            .get(name)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }
}
