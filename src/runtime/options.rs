/// Compile-time policies of a [`StaticModule`](crate::runtime::StaticModule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticModuleOptions {
    /// Prefer out-variant kernels so outputs can be planner managed.
    pub enable_out_variant: bool,
    /// Rewrite internal `reshape`/`flatten`/`to` views into copy variants.
    pub replace_with_copy: bool,
    /// Fuse constant-key lookups into immutable dict inputs.
    pub remove_immutable_dict_lookups: bool,
    /// Fuse adjacent tuple unpacks.
    pub use_var_tuple_unpack: bool,
    /// Rewrite `cat`/`stack` over fresh lists into variadic ops.
    pub use_variadic_ops: bool,
    /// Let managed tensors with disjoint lifetimes share arena space.
    pub optimize_memory: bool,
}

impl Default for StaticModuleOptions {
    fn default() -> Self {
        Self {
            enable_out_variant: true,
            replace_with_copy: true,
            remove_immutable_dict_lookups: true,
            use_var_tuple_unpack: true,
            use_variadic_ops: true,
            optimize_memory: false,
        }
    }
}

impl StaticModuleOptions {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enable_out_variant: read_bool("STASIS_OUT_VARIANT", defaults.enable_out_variant),
            replace_with_copy: read_bool("STASIS_REPLACE_WITH_COPY", defaults.replace_with_copy),
            remove_immutable_dict_lookups: read_bool(
                "STASIS_DICT_UNPACK",
                defaults.remove_immutable_dict_lookups,
            ),
            use_var_tuple_unpack: read_bool(
                "STASIS_VAR_TUPLE_UNPACK",
                defaults.use_var_tuple_unpack,
            ),
            use_variadic_ops: read_bool("STASIS_VARIADIC_OPS", defaults.use_variadic_ops),
            optimize_memory: read_bool("STASIS_OPTIMIZE_MEMORY", defaults.optimize_memory),
        }
    }

    /// Every rewrite and the out-variant preference turned off.
    pub fn disabled() -> Self {
        Self {
            enable_out_variant: false,
            replace_with_copy: false,
            remove_immutable_dict_lookups: false,
            use_var_tuple_unpack: false,
            use_variadic_ops: false,
            optimize_memory: false,
        }
    }
}

fn read_bool(key: &str, default_value: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(default_value)
}
