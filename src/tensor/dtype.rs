use std::fmt;
use std::ops::{Add, Mul, Sub};

use bytemuck::Pod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    I64,
}

/// Partition key for planner arenas. Floating and integral tensors are laid out
/// in separate regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageClass {
    Floating,
    Integral,
}

impl DType {
    pub const fn size_bytes(self) -> usize {
        match self {
            DType::F32 => std::mem::size_of::<f32>(),
            DType::I64 => std::mem::size_of::<i64>(),
        }
    }

    pub const fn storage_class(self) -> StorageClass {
        match self {
            DType::F32 => StorageClass::Floating,
            DType::I64 => StorageClass::Integral,
        }
    }

    /// Integer code used when a dtype travels through the graph as an `int` argument.
    pub const fn code(self) -> i64 {
        match self {
            DType::F32 => 6,
            DType::I64 => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            6 => Some(DType::F32),
            4 => Some(DType::I64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::I64 => write!(f, "i64"),
        }
    }
}

/// Element types that can live in tensor storage.
pub trait Element:
    Pod
    + Copy
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Send
    + Sync
    + 'static
{
    const DTYPE: DType;

    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
    fn to_i64(self) -> i64;
    fn from_i64(value: i64) -> Self;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_i64(value: i64) -> Self {
        value as f32
    }
}

impl Element for i64 {
    const DTYPE: DType = DType::I64;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value as i64
    }

    fn to_i64(self) -> i64 {
        self
    }

    fn from_i64(value: i64) -> Self {
        value
    }
}
