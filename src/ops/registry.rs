use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ir::OpKind;
use crate::ops::{OpError, containers, elementwise, join, reduction, shape};
use crate::value::Value;

pub type KernelFn = Arc<dyn Fn(&[Value], &mut [Value]) -> Result<(), OpError> + Send + Sync>;

/// How an operator's outputs relate to its inputs' storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasBehavior {
    /// Outputs never share storage with inputs.
    #[default]
    Fresh,
    /// Outputs may be views of, or containers holding, the inputs.
    MayAliasInputs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperatorSchema {
    pub alias: AliasBehavior,
    /// The operator mutates its first input in place.
    pub mutates_input: bool,
}

impl OperatorSchema {
    pub const FRESH: OperatorSchema = OperatorSchema {
        alias: AliasBehavior::Fresh,
        mutates_input: false,
    };
    pub const ALIASING: OperatorSchema = OperatorSchema {
        alias: AliasBehavior::MayAliasInputs,
        mutates_input: false,
    };
    pub const MUTATING: OperatorSchema = OperatorSchema {
        alias: AliasBehavior::MayAliasInputs,
        mutates_input: true,
    };
}

#[derive(Clone)]
pub struct OperatorEntry {
    pub schema: OperatorSchema,
    pub native: KernelFn,
    pub out_variant: Option<KernelFn>,
}

impl fmt::Debug for OperatorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorEntry")
            .field("schema", &self.schema)
            .field("out_variant", &self.out_variant.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct OperatorRegistry {
    entries: HashMap<OpKind, OperatorEntry>,
}

static BUILTINS: Lazy<OperatorRegistry> = Lazy::new(|| {
    let mut registry = OperatorRegistry::new();
    elementwise::register(&mut registry);
    reduction::register(&mut registry);
    join::register(&mut registry);
    shape::register(&mut registry);
    containers::register(&mut registry);
    registry
});

/// The process-wide builtin operator table.
pub fn builtin_registry() -> &'static OperatorRegistry {
    &BUILTINS
}

impl OperatorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the builtin table that callers may extend.
    #[must_use]
    pub fn with_builtins() -> Self {
        BUILTINS.clone()
    }

    /// Registers an operator with only a native implementation.
    pub fn register_native<F>(&mut self, kind: impl Into<OpKind>, schema: OperatorSchema, kernel: F)
    where
        F: Fn(&[Value], &mut [Value]) -> Result<(), OpError> + Send + Sync + 'static,
    {
        self.entries.insert(
            kind.into(),
            OperatorEntry {
                schema,
                native: native_wrapper(Arc::new(kernel)),
                out_variant: None,
            },
        );
    }

    /// Registers an operator whose kernel can write into pre-bound outputs.
    /// The native entry runs the same kernel on empty outputs.
    pub fn register_out_variant<F>(
        &mut self,
        kind: impl Into<OpKind>,
        schema: OperatorSchema,
        kernel: F,
    ) where
        F: Fn(&[Value], &mut [Value]) -> Result<(), OpError> + Send + Sync + 'static,
    {
        let kernel: KernelFn = Arc::new(kernel);
        self.entries.insert(
            kind.into(),
            OperatorEntry {
                schema,
                native: native_wrapper(Arc::clone(&kernel)),
                out_variant: Some(kernel),
            },
        );
    }

    pub fn get(&self, kind: &OpKind) -> Option<&OperatorEntry> {
        self.entries.get(kind)
    }

    pub fn contains(&self, kind: &OpKind) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&OpKind> {
        let mut kinds = self.entries.keys().collect::<Vec<_>>();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn native_wrapper(kernel: KernelFn) -> KernelFn {
    Arc::new(move |inputs: &[Value], outputs: &mut [Value]| {
        for output in outputs.iter_mut() {
            *output = Value::None;
        }
        kernel(inputs, outputs)
    })
}
