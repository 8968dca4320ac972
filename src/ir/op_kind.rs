use std::borrow::Cow;
use std::fmt;

/// Operator identifier, e.g. `aten::add` or `static_runtime::dict_unpack`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpKind(Cow<'static, str>);

impl OpKind {
    pub const CONSTANT: OpKind = OpKind::from_static("prim::Constant");
    pub const LIST_CONSTRUCT: OpKind = OpKind::from_static("prim::ListConstruct");
    pub const TUPLE_CONSTRUCT: OpKind = OpKind::from_static("prim::TupleConstruct");
    pub const DICT_CONSTRUCT: OpKind = OpKind::from_static("prim::DictConstruct");
    pub const TUPLE_UNPACK: OpKind = OpKind::from_static("prim::TupleUnpack");

    pub const ADD: OpKind = OpKind::from_static("aten::add");
    pub const SUB: OpKind = OpKind::from_static("aten::sub");
    pub const MUL: OpKind = OpKind::from_static("aten::mul");
    pub const DIV: OpKind = OpKind::from_static("aten::div");
    pub const REMAINDER: OpKind = OpKind::from_static("aten::remainder");
    pub const RELU: OpKind = OpKind::from_static("aten::relu");
    pub const TANH: OpKind = OpKind::from_static("aten::tanh");
    pub const SIGMOID: OpKind = OpKind::from_static("aten::sigmoid");
    pub const ABS: OpKind = OpKind::from_static("aten::abs");
    pub const NEG: OpKind = OpKind::from_static("aten::neg");
    pub const EXP: OpKind = OpKind::from_static("aten::exp");
    pub const LOG: OpKind = OpKind::from_static("aten::log");
    pub const CLONE: OpKind = OpKind::from_static("aten::clone");
    pub const SUM: OpKind = OpKind::from_static("aten::sum");
    pub const SOFTMAX: OpKind = OpKind::from_static("aten::softmax");
    pub const MATMUL: OpKind = OpKind::from_static("aten::matmul");
    pub const CAT: OpKind = OpKind::from_static("aten::cat");
    pub const STACK: OpKind = OpKind::from_static("aten::stack");
    pub const RESHAPE: OpKind = OpKind::from_static("aten::reshape");
    pub const FLATTEN: OpKind = OpKind::from_static("aten::flatten");
    pub const TRANSPOSE: OpKind = OpKind::from_static("aten::transpose");
    pub const TO: OpKind = OpKind::from_static("aten::to");
    pub const SIZE: OpKind = OpKind::from_static("aten::size");
    pub const GETITEM: OpKind = OpKind::from_static("aten::__getitem__");
    pub const SET_ITEM: OpKind = OpKind::from_static("aten::_set_item");
    pub const APPEND: OpKind = OpKind::from_static("aten::append");

    pub const RESHAPE_COPY: OpKind = OpKind::from_static("static_runtime::reshape_copy");
    pub const FLATTEN_COPY: OpKind = OpKind::from_static("static_runtime::flatten_copy");
    pub const TO_COPY: OpKind = OpKind::from_static("static_runtime::to_copy");
    pub const DICT_UNPACK: OpKind = OpKind::from_static("static_runtime::dict_unpack");
    pub const VAR_TUPLE_UNPACK: OpKind = OpKind::from_static("static_runtime::VarTupleUnpack");
    pub const VAR_CAT: OpKind = OpKind::from_static("static_runtime::var_cat");
    pub const VAR_STACK: OpKind = OpKind::from_static("static_runtime::var_stack");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `::`, e.g. `aten`.
    pub fn namespace(&self) -> &str {
        self.0.split_once("::").map_or("", |(namespace, _)| namespace)
    }
}

impl From<&'static str> for OpKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl AsRef<str> for OpKind {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
