//! Task schedulers.

use std::collections::{BTreeMap, HashMap};

use jagged_core::NodeKey;
use jagged_graph::TaskGraph;
use jagged_tracer::Datum;

use crate::error::ExecError;

/// Evaluates a task graph for `outputs`, returning one result per output key
/// in the same order.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(&self, tasks: &TaskGraph, outputs: &[NodeKey]) -> Result<Vec<Datum>, ExecError>;
}

/// Tasks needed for `outputs`, dependencies first.
pub(crate) fn plan_order(tasks: &TaskGraph, outputs: &[NodeKey]) -> Result<Vec<NodeKey>, ExecError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&NodeKey, Mark> = HashMap::new();
    let mut order = Vec::new();

    for root in outputs {
        let mut stack: Vec<(&NodeKey, bool)> = vec![(root, false)];
        while let Some((key, expanded)) = stack.pop() {
            let task = tasks
                .get_key_value(key)
                .ok_or_else(|| ExecError::MissingTask(key.clone()))?;
            let (key, task) = task;
            if expanded {
                marks.insert(key, Mark::Done);
                order.push(key.clone());
                continue;
            }
            match marks.get(key) {
                Some(Mark::Done) => continue,
                Some(Mark::Visiting) => {
                    return Err(ExecError::Invalid(format!("dependency cycle through {key}")))
                }
                None => {}
            }
            marks.insert(key, Mark::Visiting);
            stack.push((key, true));
            for arg in task.args.iter().rev() {
                match marks.get(arg) {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        return Err(ExecError::Invalid(format!("dependency cycle through {arg}")))
                    }
                    None => stack.push((arg, false)),
                }
            }
        }
    }
    Ok(order)
}

/// How many times each needed key will still be read: once per consuming
/// argument plus once per appearance in `outputs`.
pub(crate) fn use_counts(
    tasks: &TaskGraph,
    order: &[NodeKey],
    outputs: &[NodeKey],
) -> BTreeMap<NodeKey, usize> {
    let mut uses: BTreeMap<NodeKey, usize> = BTreeMap::new();
    for key in order {
        if let Some(task) = tasks.get(key) {
            for arg in &task.args {
                *uses.entry(arg.clone()).or_default() += 1;
            }
        }
    }
    for out in outputs {
        *uses.entry(out.clone()).or_default() += 1;
    }
    uses
}

/// Sequential scheduler: dependency order, memoized, eager release.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncScheduler;

impl SyncScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for SyncScheduler {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn execute(&self, tasks: &TaskGraph, outputs: &[NodeKey]) -> Result<Vec<Datum>, ExecError> {
        let order = plan_order(tasks, outputs)?;
        let mut uses = use_counts(tasks, &order, outputs);
        let mut results: HashMap<NodeKey, Datum> = HashMap::new();

        for key in &order {
            let task = tasks
                .get(key)
                .ok_or_else(|| ExecError::MissingTask(key.clone()))?;
            let inputs = task
                .args
                .iter()
                .map(|a| {
                    results
                        .get(a)
                        .cloned()
                        .ok_or_else(|| ExecError::MissingTask(a.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            tracing::trace!(task = %key, func = %task.func.label(), "running task");
            let out = task
                .run(&inputs)
                .map_err(|e| ExecError::partition(key, e))?;
            results.insert(key.clone(), out);

            for arg in &task.args {
                if let Some(n) = uses.get_mut(arg) {
                    *n -= 1;
                    if *n == 0 {
                        results.remove(arg);
                    }
                }
            }
        }

        outputs
            .iter()
            .map(|o| {
                results
                    .get(o)
                    .cloned()
                    .ok_or_else(|| ExecError::MissingTask(o.clone()))
            })
            .collect()
    }
}

#[cfg(feature = "async-scheduler")]
pub use async_impl::AsyncScheduler;

#[cfg(feature = "async-scheduler")]
mod async_impl {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use tokio::task::JoinSet;

    use jagged_core::{Error, NodeKey};
    use jagged_graph::TaskGraph;
    use jagged_tracer::Datum;

    use super::{plan_order, use_counts, Scheduler};
    use crate::error::ExecError;

    /// Concurrent scheduler. Ready tasks run on tokio's blocking pool, at
    /// most `max_parallel` at a time.
    ///
    /// Owns its runtime; calling `execute` from inside another tokio runtime
    /// panics.
    pub struct AsyncScheduler {
        runtime: tokio::runtime::Runtime,
        max_parallel: usize,
    }

    impl AsyncScheduler {
        pub fn new(max_parallel: usize) -> Result<Self, ExecError> {
            let max_parallel = max_parallel.max(1);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(max_parallel)
                .max_blocking_threads(max_parallel)
                .build()
                .map_err(|e| ExecError::Invalid(format!("tokio runtime: {e}")))?;
            Ok(Self {
                runtime,
                max_parallel,
            })
        }

        async fn run(
            &self,
            tasks: &TaskGraph,
            outputs: &[NodeKey],
        ) -> Result<Vec<Datum>, ExecError> {
            let order = plan_order(tasks, outputs)?;
            let mut uses = use_counts(tasks, &order, outputs);

            let mut pending: HashMap<NodeKey, usize> = HashMap::new();
            let mut dependents: HashMap<NodeKey, Vec<NodeKey>> = HashMap::new();
            for key in &order {
                let task = tasks
                    .get(key)
                    .ok_or_else(|| ExecError::MissingTask(key.clone()))?;
                pending.insert(key.clone(), task.args.len());
                for arg in &task.args {
                    dependents.entry(arg.clone()).or_default().push(key.clone());
                }
            }
            let mut ready: VecDeque<NodeKey> = order
                .iter()
                .filter(|k| pending.get(*k) == Some(&0))
                .cloned()
                .collect();

            let mut results: HashMap<NodeKey, Arc<Datum>> = HashMap::new();
            let mut running: JoinSet<(NodeKey, Result<Datum, Error>)> = JoinSet::new();

            loop {
                while running.len() < self.max_parallel {
                    let Some(key) = ready.pop_front() else { break };
                    let task = tasks
                        .get(&key)
                        .cloned()
                        .ok_or_else(|| ExecError::MissingTask(key.clone()))?;
                    let inputs = task
                        .args
                        .iter()
                        .map(|a| {
                            results
                                .get(a)
                                .cloned()
                                .ok_or_else(|| ExecError::MissingTask(a.clone()))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    tracing::trace!(task = %key, func = %task.func.label(), "spawning task");
                    running.spawn_blocking(move || {
                        let inputs: Vec<Datum> = inputs.iter().map(|d| (**d).clone()).collect();
                        let out = task.run(&inputs);
                        (key, out)
                    });
                }

                let Some(joined) = running.join_next().await else {
                    break;
                };
                let (key, outcome) =
                    joined.map_err(|e| ExecError::Invalid(format!("task panicked: {e}")))?;
                let datum = outcome.map_err(|e| ExecError::partition(&key, e))?;

                if let Some(task) = tasks.get(&key) {
                    for arg in &task.args {
                        if let Some(n) = uses.get_mut(arg) {
                            // Counts only reach zero for keys not in `outputs`.
                            *n -= 1;
                            if *n == 0 {
                                results.remove(arg);
                            }
                        }
                    }
                }
                results.insert(key.clone(), Arc::new(datum));

                for dep in dependents.get(&key).into_iter().flatten() {
                    if let Some(n) = pending.get_mut(dep) {
                        *n -= 1;
                        if *n == 0 {
                            ready.push_back(dep.clone());
                        }
                    }
                }
            }

            outputs
                .iter()
                .map(|o| {
                    results
                        .get(o)
                        .map(|d| (**d).clone())
                        .ok_or_else(|| ExecError::MissingTask(o.clone()))
                })
                .collect()
        }
    }

    impl Scheduler for AsyncScheduler {
        fn name(&self) -> &'static str {
            "async"
        }

        fn execute(
            &self,
            tasks: &TaskGraph,
            outputs: &[NodeKey],
        ) -> Result<Vec<Datum>, ExecError> {
            self.runtime.block_on(self.run(tasks, outputs))
        }
    }
}
