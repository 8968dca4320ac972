//! Per-caller execution state for a [`StaticModule`](crate::runtime::StaticModule).
//!
//! A runtime owns one value table indexed by the module's slots. Constants
//! are written once at construction; inputs are bound at the start of each
//! call and every non-constant slot is cleared when the call ends, whether
//! it succeeded or not. Planner-managed slots keep their tensor shells with
//! released storage between calls so the next call can rebind them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::ir::OpKind;
use crate::runtime::static_module::CompiledModule;
use crate::runtime::{MemoryPlanner, RuntimeError};
use crate::value::Value;

/// Keyword arguments keyed by graph input name.
pub type Kwargs = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStats {
    pub completed_runs: usize,
    pub failed_runs: usize,
}

#[derive(Debug, Clone)]
pub struct NodeProfile {
    pub kind: OpKind,
    pub total: Duration,
}

/// Wall-clock timings collected by [`StaticRuntime::profile`].
#[derive(Debug, Clone)]
pub struct ProfileReport {
    pub iterations: usize,
    pub total: Duration,
    pub nodes: Vec<NodeProfile>,
}

impl ProfileReport {
    /// Mean time of one call.
    pub fn mean(&self) -> Duration {
        match u32::try_from(self.iterations) {
            Ok(iterations) if iterations > 0 => self.total / iterations,
            _ => Duration::ZERO,
        }
    }

    /// Time per operator kind, slowest first.
    pub fn by_kind(&self) -> Vec<(OpKind, Duration)> {
        let mut totals = HashMap::<OpKind, Duration>::new();
        for node in &self.nodes {
            *totals.entry(node.kind.clone()).or_default() += node.total;
        }
        let mut totals = totals.into_iter().collect::<Vec<_>>();
        totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        totals
    }
}

pub struct StaticRuntime {
    module: Arc<CompiledModule>,
    values: Vec<Value>,
    constant: Vec<bool>,
    planner: Option<MemoryPlanner>,
    state: RunState,
    stats: RuntimeStats,
}

impl StaticRuntime {
    pub(crate) fn new(module: Arc<CompiledModule>) -> Self {
        let mut values = vec![Value::None; module.num_slots];
        let mut constant = vec![false; module.num_slots];
        for (slot, value) in &module.constants {
            values[usize::from(*slot)] = value.clone();
            constant[usize::from(*slot)] = true;
        }
        Self {
            module,
            values,
            constant,
            planner: None,
            state: RunState::Idle,
            stats: RuntimeStats::default(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// The planner, once a call has completed.
    pub fn memory_planner(&self) -> Option<&MemoryPlanner> {
        self.planner.as_ref()
    }

    /// Runs the module and returns every graph output.
    pub fn run(&mut self, args: Vec<Value>, kwargs: Kwargs) -> Result<Vec<Value>, RuntimeError> {
        self.execute(args, kwargs, None)
    }

    /// Runs the module. A single output is returned as is, several are
    /// packed into a tuple.
    pub fn invoke(&mut self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, RuntimeError> {
        let mut outputs = self.run(args, kwargs)?;
        if outputs.len() == 1 {
            Ok(outputs.remove(0))
        } else {
            Ok(Value::tuple(outputs))
        }
    }

    /// Runs the module `iterations` times with the same arguments and
    /// records per-node wall-clock time.
    pub fn profile(
        &mut self,
        args: Vec<Value>,
        kwargs: Kwargs,
        iterations: usize,
    ) -> Result<ProfileReport, RuntimeError> {
        let mut timings = vec![Duration::ZERO; self.module.nodes.len()];
        let start = Instant::now();
        for _ in 0..iterations {
            self.execute(args.clone(), kwargs.clone(), Some(&mut timings))?;
        }
        let total = start.elapsed();
        let nodes = self
            .module
            .nodes
            .iter()
            .zip(timings)
            .map(|(node, total)| NodeProfile {
                kind: node.kind().clone(),
                total,
            })
            .collect();
        Ok(ProfileReport {
            iterations,
            total,
            nodes,
        })
    }

    fn execute(
        &mut self,
        args: Vec<Value>,
        kwargs: Kwargs,
        mut timings: Option<&mut [Duration]>,
    ) -> Result<Vec<Value>, RuntimeError> {
        if self.state == RunState::Running {
            // A kernel panicked during the previous call.
            self.roll_back();
        }
        let bound = self.bind_inputs(args, kwargs)?;
        self.state = RunState::Running;
        for (slot, value) in bound {
            self.values[usize::from(slot)] = value;
        }
        if let Some(planner) = &self.planner {
            planner.allocate(&mut self.values);
        }

        let module = Arc::clone(&self.module);
        for (index, node) in module.nodes.iter().enumerate() {
            trace!(node = index, kind = %node.kind(), "running node");
            let started = timings.as_ref().map(|_| Instant::now());
            if let Err(err) = node.run(&mut self.values) {
                warn!(node = index, kind = %node.kind(), error = %err, "static runtime call failed");
                self.roll_back();
                self.state = RunState::Failed;
                self.stats.failed_runs += 1;
                return Err(RuntimeError::Operator(err));
            }
            if let (Some(timings), Some(started)) = (timings.as_deref_mut(), started) {
                timings[index] += started.elapsed();
            }
        }

        let outputs = module
            .outputs
            .iter()
            .map(|slot| self.values[usize::from(*slot)].clone())
            .collect::<Vec<_>>();
        let planner = self.planner.get_or_insert_with(|| {
            MemoryPlanner::new(&module.managed, &self.values, module.options.optimize_memory)
        });
        planner.deallocate(&mut self.values);
        self.clear_slots();
        self.state = RunState::Completed;
        self.stats.completed_runs += 1;
        Ok(outputs)
    }

    /// Matches positional and keyword arguments to input slots.
    fn bind_inputs(
        &self,
        args: Vec<Value>,
        mut kwargs: Kwargs,
    ) -> Result<Vec<(u16, Value)>, RuntimeError> {
        let inputs = &self.module.inputs;
        if args.len() > inputs.len() {
            return Err(RuntimeError::ArgumentCount {
                expected: inputs.len(),
                actual: args.len(),
            });
        }
        let positional = args.len();
        let mut args = args.into_iter();
        let mut bound = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let name = input.name.clone().unwrap_or_else(|| format!("input{index}"));
            let value = if index < positional {
                args.next()
            } else {
                kwargs.remove(&name)
            };
            let Some(value) = value else {
                return Err(RuntimeError::MissingArgument { name });
            };
            if !input.ty.accepts(&value) {
                return Err(RuntimeError::ArgumentType {
                    name,
                    expected: input.ty.to_string(),
                    actual: value.type_name(),
                });
            }
            bound.push((input.slot, value));
        }
        if let Some(name) = kwargs.into_keys().min() {
            return Err(RuntimeError::UnexpectedKeyword { name });
        }
        Ok(bound)
    }

    fn is_managed(&self, slot: usize) -> bool {
        self.planner
            .as_ref()
            .is_some_and(|planner| planner.manages(slot as u16))
    }

    /// Clears every slot except constants and planner-managed shells.
    fn clear_slots(&mut self) {
        for slot in 0..self.values.len() {
            if !self.constant[slot] && !self.is_managed(slot) {
                self.values[slot] = Value::None;
            }
        }
    }

    /// Returns the value table to its between-calls state after a failure.
    fn roll_back(&mut self) {
        if let Some(planner) = &self.planner {
            planner.release(&mut self.values);
        }
        self.clear_slots();
    }

    /// Checks that no call left anything behind: every non-constant slot is
    /// empty, except managed slots, whose storage must be released or owned
    /// by the planner.
    pub fn check_for_memory_leak(&self) -> Result<(), RuntimeError> {
        for (slot, value) in self.values.iter().enumerate() {
            if self.constant[slot] || value.is_none() {
                continue;
            }
            let Some(planner) = self.planner.as_ref().filter(|_| self.is_managed(slot)) else {
                return Err(RuntimeError::MemoryLeak {
                    slot,
                    detail: format!("holds a {} after the call", value.type_name()),
                });
            };
            let Value::Tensor(tensor) = value else {
                return Err(RuntimeError::MemoryLeak {
                    slot,
                    detail: format!("managed slot holds a {}", value.type_name()),
                });
            };
            let storage = tensor.storage();
            if !storage.is_released() && !planner.owns(storage) {
                return Err(RuntimeError::MemoryLeak {
                    slot,
                    detail: format!("managed tensor still owns {} bytes", storage.capacity()),
                });
            }
        }
        Ok(())
    }
}
