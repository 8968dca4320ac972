use std::fmt;

use crate::tensor::{DType, Element, Storage, TensorError};

/// A strided view over shared [`Storage`].
///
/// Offsets and strides are counted in elements. Cloning a tensor clones the
/// storage handle, so both tensors see the same bytes.
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
}

impl Tensor {
    pub fn from_vec<T: Element>(shape: Vec<usize>, data: Vec<T>) -> Result<Self, TensorError> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(TensorError::ElementCount {
                shape,
                expected,
                actual: data.len(),
            });
        }
        let tensor = Self::uninit(T::DTYPE, shape)?;
        tensor.write(&data)?;
        Ok(tensor)
    }

    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Result<Self, TensorError> {
        Self::uninit(dtype, shape)
    }

    pub fn scalar<T: Element>(value: T) -> Self {
        let storage = Storage::new(T::DTYPE.size_bytes());
        let tensor = Self {
            storage,
            dtype: T::DTYPE,
            shape: Vec::new(),
            strides: Vec::new(),
            offset: 0,
        };
        // A fresh single-element storage always accepts one element.
        let _ = tensor.write(&[value]);
        tensor
    }

    /// Contiguous tensor over fresh zeroed storage.
    fn uninit(dtype: DType, shape: Vec<usize>) -> Result<Self, TensorError> {
        let numel = element_count(&shape)?;
        let nbytes = numel
            .checked_mul(dtype.size_bytes())
            .ok_or_else(|| TensorError::Overflow(shape.clone()))?;
        Ok(Self {
            storage: Storage::new(nbytes),
            dtype,
            strides: contiguous_strides(&shape),
            shape,
            offset: 0,
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype.size_bytes()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn shares_storage_with(&self, other: &Tensor) -> bool {
        self.storage.same_storage(&other.storage)
    }

    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1usize;
        for (dim, stride) in self.shape.iter().zip(&self.strides).rev() {
            if *dim != 1 && *stride != expected {
                return false;
            }
            expected *= *dim;
        }
        true
    }

    fn check_dtype(&self, expected: DType) -> Result<(), TensorError> {
        if self.dtype == expected {
            Ok(())
        } else {
            Err(TensorError::DTypeMismatch {
                expected,
                actual: self.dtype,
            })
        }
    }

    /// One past the largest element index this view touches.
    fn required_elements(&self) -> usize {
        if self.numel() == 0 {
            return self.offset;
        }
        self.offset
            + 1
            + self
                .shape
                .iter()
                .zip(&self.strides)
                .map(|(dim, stride)| (dim - 1) * stride)
                .sum::<usize>()
    }

    /// Gathers the logical elements of this view in row-major order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        self.check_dtype(T::DTYPE)?;
        let numel = self.numel();
        if numel == 0 {
            return Ok(Vec::new());
        }
        let required = self.required_elements();
        self.storage.with_elements::<T, _>(|data| {
            if data.len() < required {
                return Err(TensorError::StorageTooSmall {
                    available: data.len(),
                    required,
                });
            }
            if self.is_contiguous() {
                return Ok(data[self.offset..self.offset + numel].to_vec());
            }
            let rank = self.rank();
            let mut out = Vec::with_capacity(numel);
            let mut index = vec![0usize; rank];
            for _ in 0..numel {
                let position = self.offset
                    + index
                        .iter()
                        .zip(&self.strides)
                        .map(|(i, stride)| i * stride)
                        .sum::<usize>();
                out.push(data[position]);
                for axis in (0..rank).rev() {
                    index[axis] += 1;
                    if index[axis] < self.shape[axis] {
                        break;
                    }
                    index[axis] = 0;
                }
            }
            Ok(out)
        })?
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        match self.dtype {
            DType::F32 => self.to_vec::<f32>(),
            DType::I64 => Ok(self
                .to_vec::<i64>()?
                .into_iter()
                .map(Element::to_f32)
                .collect()),
        }
    }

    pub fn to_i64_vec(&self) -> Result<Vec<i64>, TensorError> {
        match self.dtype {
            DType::F32 => Ok(self
                .to_vec::<f32>()?
                .into_iter()
                .map(Element::to_i64)
                .collect()),
            DType::I64 => self.to_vec::<i64>(),
        }
    }

    /// Overwrites the elements of a contiguous tensor.
    pub fn write<T: Element>(&self, data: &[T]) -> Result<(), TensorError> {
        self.check_dtype(T::DTYPE)?;
        if !self.is_contiguous() {
            return Err(TensorError::InvalidView(
                "cannot write through a non-contiguous view".to_string(),
            ));
        }
        let numel = self.numel();
        if data.len() != numel {
            return Err(TensorError::ElementCount {
                shape: self.shape.clone(),
                expected: numel,
                actual: data.len(),
            });
        }
        if numel == 0 {
            return Ok(());
        }
        let required = self.offset + numel;
        self.storage.with_elements_mut::<T, _>(|dst| {
            if dst.len() < required {
                return Err(TensorError::StorageTooSmall {
                    available: dst.len(),
                    required,
                });
            }
            dst[self.offset..required].copy_from_slice(data);
            Ok(())
        })?
    }

    /// Hands the elements of a contiguous tensor to `fill` for writing in
    /// place. The storage stays locked while `fill` runs, so `fill` must not
    /// read or write other tensors.
    pub fn write_with<T, E>(&self, fill: impl FnOnce(&mut [T]) -> Result<(), E>) -> Result<(), E>
    where
        T: Element,
        E: From<TensorError>,
    {
        self.check_dtype(T::DTYPE)?;
        if !self.is_contiguous() {
            return Err(TensorError::InvalidView(
                "cannot write through a non-contiguous view".to_string(),
            )
            .into());
        }
        let numel = self.numel();
        if numel == 0 {
            return fill(&mut []);
        }
        let range = self.offset..self.offset + numel;
        self.storage.with_elements_mut::<T, _>(|dst| {
            if dst.len() < range.end {
                return Err(TensorError::StorageTooSmall {
                    available: dst.len(),
                    required: range.end,
                }
                .into());
            }
            fill(&mut dst[range])
        })?
    }

    /// Reshapes in place to a contiguous layout of `shape`, growing the
    /// storage when needed. Existing contents are unspecified afterwards.
    pub fn resize_(&mut self, shape: &[usize]) -> Result<(), TensorError> {
        let numel = element_count(shape)?;
        let nbytes = numel
            .checked_mul(self.dtype.size_bytes())
            .ok_or_else(|| TensorError::Overflow(shape.to_vec()))?;
        self.shape = shape.to_vec();
        self.strides = contiguous_strides(shape);
        self.offset = 0;
        self.storage.resize(nbytes);
        Ok(())
    }

    /// A view with a new shape over the same storage. Requires a contiguous
    /// source with the same element count.
    pub fn view(&self, shape: Vec<usize>) -> Result<Self, TensorError> {
        let numel = element_count(&shape)?;
        if numel != self.numel() {
            return Err(TensorError::ElementCount {
                shape,
                expected: numel,
                actual: self.numel(),
            });
        }
        if !self.is_contiguous() {
            return Err(TensorError::InvalidView(format!(
                "cannot view shape {:?} with strides {:?} as {shape:?}",
                self.shape, self.strides
            )));
        }
        Ok(Self {
            storage: self.storage.clone(),
            dtype: self.dtype,
            strides: contiguous_strides(&shape),
            shape,
            offset: self.offset,
        })
    }

    /// Swaps two dimensions by permuting strides. Shares storage.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self, TensorError> {
        let rank = self.rank();
        for dim in [dim0, dim1] {
            if dim >= rank {
                return Err(TensorError::DimOutOfRange {
                    dim: dim as i64,
                    rank,
                });
            }
        }
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape.swap(dim0, dim1);
        strides.swap(dim0, dim1);
        Ok(Self {
            storage: self.storage.clone(),
            dtype: self.dtype,
            shape,
            strides,
            offset: self.offset,
        })
    }

    /// Copies the logical contents into fresh contiguous storage.
    pub fn deep_clone(&self) -> Result<Self, TensorError> {
        match self.dtype {
            DType::F32 => Self::from_vec(self.shape.clone(), self.to_vec::<f32>()?),
            DType::I64 => Self::from_vec(self.shape.clone(), self.to_vec::<i64>()?),
        }
    }

    /// Converts to `dtype`, returning a fresh tensor.
    pub fn cast(&self, dtype: DType) -> Result<Self, TensorError> {
        match dtype {
            DType::F32 => Self::from_vec(self.shape.clone(), self.to_f32_vec()?),
            DType::I64 => Self::from_vec(self.shape.clone(), self.to_i64_vec()?),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("storage", &self.storage)
            .finish()
    }
}

pub fn element_count(shape: &[usize]) -> Result<usize, TensorError> {
    shape
        .iter()
        .try_fold(1usize, |count, dim| count.checked_mul(*dim))
        .ok_or_else(|| TensorError::Overflow(shape.to_vec()))
}

pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1].max(1);
    }
    strides
}

/// Resolves a possibly negative dimension index against `rank`.
pub fn normalize_dim(dim: i64, rank: usize) -> Result<usize, TensorError> {
    let signed_rank = rank as i64;
    let resolved = if dim < 0 { dim + signed_rank } else { dim };
    if (0..signed_rank).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(TensorError::DimOutOfRange { dim, rank })
    }
}

/// Numpy-style broadcast of two shapes.
pub fn broadcast_shapes(left: &[usize], right: &[usize]) -> Result<Vec<usize>, TensorError> {
    let rank = left.len().max(right.len());
    let mut out = vec![0usize; rank];
    for axis in 0..rank {
        let l = axis
            .checked_sub(rank - left.len())
            .map_or(1, |index| left[index]);
        let r = axis
            .checked_sub(rank - right.len())
            .map_or(1, |index| right[index]);
        out[axis] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => {
                return Err(TensorError::Broadcast {
                    left: left.to_vec(),
                    right: right.to_vec(),
                });
            }
        };
    }
    Ok(out)
}
