//! Parallel task scheduler
//!
//! A DAG executor with bounded concurrency. Nodes live in a flat arena
//! and refer to each other by index; all state mutation happens on the
//! coordinator, which suspends only while awaiting the next completion
//! event. Ready tasks start in descending critical-path order so the
//! longest chains begin first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::diagnostics::{Diagnostic, DisplayMode};
use crate::error::SchedulerError;
use crate::infra::interleaver::{OutputInterleaver, TaskWriter};

/// Lifecycle of a task node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for dependencies
    Ready,
    /// Currently running
    Executing,
    /// Finished cleanly
    Success,
    /// Finished cleanly but wrote to stderr
    SuccessWithWarnings,
    /// Inputs unchanged; nothing ran
    Skipped,
    /// A transitive dependency failed
    Blocked,
    /// The task itself failed
    Failure,
}

impl TaskStatus {
    /// Has the node reached a terminal state?
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Ready | Self::Executing)
    }
}

/// Terminal result reported by a runner
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    SuccessWithWarnings,
    Skipped,
    Failure(Vec<Diagnostic>),
}

/// Everything a runner receives from the coordinator
pub struct TaskContext {
    /// Buffered writer; output is flushed in finish order
    pub writer: TaskWriter,
    /// False when an upstream Success invalidated this task's inputs
    pub incremental_allowed: bool,
}

/// A unit of schedulable work
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome;
}

struct Node {
    name: String,
    runner: Arc<dyn TaskRunner>,
    /// Unfinished dependencies (indices)
    deps: HashSet<usize>,
    /// Dependents (indices); the inverse of `deps`
    dependents: HashSet<usize>,
    status: TaskStatus,
    errors: Vec<Diagnostic>,
    critical_path_length: usize,
    incremental_allowed: bool,
}

/// The DAG executor
pub struct TaskScheduler {
    nodes: Vec<Node>,
    by_name: HashMap<String, usize>,
    parallelism: usize,
    display_mode: DisplayMode,
    interleaver: OutputInterleaver,
    /// Console flushing can be disabled for quiet flows
    quiet: bool,
}

impl TaskScheduler {
    /// Create a scheduler with concurrency `parallelism` (0 means the
    /// host CPU count).
    pub fn new(parallelism: usize, display_mode: DisplayMode) -> Self {
        let parallelism = if parallelism == 0 {
            num_cpus::get()
        } else {
            parallelism
        };
        Self {
            nodes: Vec::new(),
            by_name: HashMap::new(),
            parallelism,
            display_mode,
            interleaver: OutputInterleaver::new(),
            quiet: false,
        }
    }

    /// Suppress console flushing (tests, machine output)
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Register a task. Duplicate names are an error.
    pub fn add_task(
        &mut self,
        name: &str,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<(), SchedulerError> {
        if self.by_name.contains_key(name) {
            return Err(SchedulerError::DuplicateTask {
                name: name.to_string(),
            });
        }
        let index = self.nodes.len();
        self.by_name.insert(name.to_string(), index);
        self.nodes.push(Node {
            name: name.to_string(),
            runner,
            deps: HashSet::new(),
            dependents: HashSet::new(),
            status: TaskStatus::Ready,
            errors: Vec::new(),
            critical_path_length: 0,
            incremental_allowed: true,
        });
        Ok(())
    }

    /// Wire dependency edges, maintaining the inverse edges.
    pub fn add_dependencies(&mut self, name: &str, deps: &[&str]) -> Result<(), SchedulerError> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownDependency {
                name: name.to_string(),
                dependency: name.to_string(),
            })?;
        for dep in deps {
            let dep_index =
                *self
                    .by_name
                    .get(*dep)
                    .ok_or_else(|| SchedulerError::UnknownDependency {
                        name: name.to_string(),
                        dependency: (*dep).to_string(),
                    })?;
            self.nodes[index].deps.insert(dep_index);
            self.nodes[dep_index].dependents.insert(index);
        }
        Ok(())
    }

    /// Status of a task after (or during) execution
    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.by_name.get(name).map(|&i| self.nodes[i].status)
    }

    /// Diagnostics collected from a failed task
    pub fn errors_of(&self, name: &str) -> Option<&[Diagnostic]> {
        self.by_name.get(name).map(|&i| self.nodes[i].errors.as_slice())
    }

    /// Critical-path length per task; available after `execute`
    pub fn critical_path_lengths(&self) -> HashMap<String, usize> {
        self.nodes
            .iter()
            .map(|n| (n.name.clone(), n.critical_path_length))
            .collect()
    }

    /// Run the graph to completion.
    ///
    /// Resolves `Ok` when every eligible task succeeded or was skipped;
    /// resolves `Err` after the full run when any task failed. Peers of a
    /// failed task are not cancelled; they finish naturally.
    pub async fn execute(&mut self) -> Result<(), SchedulerError> {
        self.check_for_cycles()?;
        self.compute_critical_paths();

        // Furthest-from-finished first
        let mut queue: Vec<usize> = (0..self.nodes.len()).collect();
        queue.sort_by(|&a, &b| {
            self.nodes[b]
                .critical_path_length
                .cmp(&self.nodes[a].critical_path_length)
        });

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, TaskOutcome)>();
        let mut executing = 0usize;

        while self
            .nodes
            .iter()
            .any(|n| matches!(n.status, TaskStatus::Ready | TaskStatus::Executing))
        {
            // Remove stale entries: anything no longer Ready
            queue.retain(|&i| self.nodes[i].status == TaskStatus::Ready);

            // Start as many ready tasks as the budget allows
            let startable: Vec<usize> = queue
                .iter()
                .copied()
                .filter(|&i| self.nodes[i].deps.is_empty())
                .take(self.parallelism.saturating_sub(executing))
                .collect();

            for index in startable {
                self.nodes[index].status = TaskStatus::Executing;
                executing += 1;

                let name = self.nodes[index].name.clone();
                let runner = Arc::clone(&self.nodes[index].runner);
                let ctx = TaskContext {
                    writer: self.interleaver.register(&name),
                    incremental_allowed: self.nodes[index].incremental_allowed,
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = runner.run(ctx).await;
                    // The receiver outlives every spawned task
                    let _ = tx.send((index, outcome));
                });
            }

            if executing == 0 {
                // No progress possible: Ready nodes remain but none are
                // startable. The cycle check rules this out.
                break;
            }

            let Some((index, outcome)) = rx.recv().await else {
                break;
            };
            executing -= 1;
            if !self.quiet {
                self.interleaver.flush_to_console(&self.nodes[index].name);
            }
            self.apply_outcome(index, outcome);
        }

        self.report();

        let failed = self.count(TaskStatus::Failure);
        let blocked = self.count(TaskStatus::Blocked);
        if failed > 0 {
            Err(SchedulerError::TasksFailed { failed, blocked })
        } else {
            Ok(())
        }
    }

    fn apply_outcome(&mut self, index: usize, outcome: TaskOutcome) {
        match outcome {
            // A rebuilt parent stales its dependents' inputs by fiat; a
            // skipped parent preserved its outputs, so dependents keep
            // their incremental eligibility.
            TaskOutcome::Success => self.unblock_dependents(index, TaskStatus::Success, true),
            TaskOutcome::SuccessWithWarnings => {
                self.unblock_dependents(index, TaskStatus::SuccessWithWarnings, true)
            }
            TaskOutcome::Skipped => self.unblock_dependents(index, TaskStatus::Skipped, false),
            TaskOutcome::Failure(errors) => {
                self.nodes[index].status = TaskStatus::Failure;
                self.nodes[index].errors = errors;
                self.block_dependents(index);
            }
        }
    }

    fn unblock_dependents(&mut self, index: usize, status: TaskStatus, invalidate: bool) {
        self.nodes[index].status = status;
        let dependents: Vec<usize> = self.nodes[index].dependents.iter().copied().collect();
        for dependent in dependents {
            self.nodes[dependent].deps.remove(&index);
            if invalidate {
                self.nodes[dependent].incremental_allowed = false;
            }
        }
    }

    fn block_dependents(&mut self, index: usize) {
        let mut stack: Vec<usize> = self.nodes[index].dependents.iter().copied().collect();
        while let Some(current) = stack.pop() {
            if self.nodes[current].status == TaskStatus::Ready {
                self.nodes[current].status = TaskStatus::Blocked;
                stack.extend(self.nodes[current].dependents.iter().copied());
            }
        }
    }

    /// Recursive descent over dependents; a back edge is a cycle.
    fn check_for_cycles(&self) -> Result<(), SchedulerError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }
        let mut marks = vec![Mark::White; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::White {
                continue;
            }
            // Iterative DFS keeping the gray path for the error message
            let mut stack = vec![(start, false)];
            let mut path = Vec::new();
            while let Some((node, children_done)) = stack.pop() {
                if children_done {
                    marks[node] = Mark::Black;
                    path.pop();
                    continue;
                }
                if marks[node] == Mark::Gray {
                    continue;
                }
                marks[node] = Mark::Gray;
                path.push(node);
                stack.push((node, true));
                for &dependent in &self.nodes[node].dependents {
                    match marks[dependent] {
                        Mark::Gray => {
                            let mut cycle: Vec<String> = path
                                .iter()
                                .map(|&i| self.nodes[i].name.clone())
                                .collect();
                            cycle.push(self.nodes[dependent].name.clone());
                            return Err(SchedulerError::CircularDependency { cycle });
                        }
                        Mark::White => stack.push((dependent, false)),
                        Mark::Black => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// CPL over dependents: a leaf-dependent node has length 0.
    fn compute_critical_paths(&mut self) {
        fn walk(nodes: &[Node], memo: &mut [Option<usize>], index: usize) -> usize {
            if let Some(value) = memo[index] {
                return value;
            }
            let value = nodes[index]
                .dependents
                .iter()
                .map(|&d| walk(nodes, memo, d) + 1)
                .max()
                .unwrap_or(0);
            memo[index] = Some(value);
            value
        }

        let mut memo = vec![None; self.nodes.len()];
        for index in 0..self.nodes.len() {
            let value = walk(&self.nodes, &mut memo, index);
            self.nodes[index].critical_path_length = value;
        }
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }

    fn report(&self) {
        if self.quiet {
            return;
        }
        let succeeded = self.count(TaskStatus::Success) + self.count(TaskStatus::Skipped);
        let warned = self.count(TaskStatus::SuccessWithWarnings);
        let failed = self.count(TaskStatus::Failure);
        let blocked = self.count(TaskStatus::Blocked);
        println!(
            "{} succeeded, {} with warnings, {} failed, {} blocked",
            succeeded, warned, failed, blocked
        );
        for node in &self.nodes {
            if node.status == TaskStatus::Failure {
                println!("--- {} failed ---", node.name);
                for diagnostic in &node.errors {
                    println!("{}", diagnostic.render(self.display_mode));
                }
            }
        }
    }
}
