//! Shared tensor storage.
//!
//! A [`Storage`] is a reference-counted handle to a byte buffer. The buffer is
//! either an independent heap allocation, a window into a planner-owned
//! [`ArenaBuffer`], or released (zero bytes, no backing). Every buffer is built
//! out of 64-byte blocks, so a typed view of any storage is aligned for every
//! [`Element`] type and for wide vector stores.

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;

use crate::tensor::{Element, TensorError};

pub const STORAGE_ALIGNMENT: usize = 64;

#[must_use]
pub fn align_up(nbytes: usize) -> usize {
    nbytes.div_ceil(STORAGE_ALIGNMENT) * STORAGE_ALIGNMENT
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(64))]
struct Block([u8; STORAGE_ALIGNMENT]);

fn zeroed_blocks(nbytes: usize) -> Vec<Block> {
    vec![Block::zeroed(); align_up(nbytes) / STORAGE_ALIGNMENT]
}

/// A contiguous planner-owned region that storages can be bound into.
#[derive(Clone)]
pub struct ArenaBuffer {
    blocks: Arc<Mutex<Vec<Block>>>,
    nbytes: usize,
}

impl ArenaBuffer {
    #[must_use]
    pub fn with_bytes(nbytes: usize) -> Self {
        let nbytes = align_up(nbytes);
        Self {
            blocks: Arc::new(Mutex::new(zeroed_blocks(nbytes))),
            nbytes,
        }
    }

    pub fn nbytes(&self) -> usize {
        self.nbytes
    }

    pub fn ptr_eq(&self, other: &ArenaBuffer) -> bool {
        Arc::ptr_eq(&self.blocks, &other.blocks)
    }
}

impl fmt::Debug for ArenaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaBuffer")
            .field("nbytes", &self.nbytes)
            .finish()
    }
}

enum Backing {
    Released,
    Heap(Vec<Block>),
    Arena {
        buffer: ArenaBuffer,
        offset: usize,
        capacity: usize,
    },
}

struct StorageState {
    backing: Backing,
    nbytes: usize,
}

impl StorageState {
    fn capacity(&self) -> usize {
        match &self.backing {
            Backing::Released => 0,
            Backing::Heap(blocks) => blocks.len() * STORAGE_ALIGNMENT,
            Backing::Arena { capacity, .. } => *capacity,
        }
    }

    fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let len = self.nbytes;
        match &self.backing {
            Backing::Released => f(&[]),
            Backing::Heap(blocks) => f(&bytemuck::cast_slice::<Block, u8>(blocks)[..len]),
            Backing::Arena { buffer, offset, .. } => {
                let guard = buffer.blocks.lock();
                let bytes = bytemuck::cast_slice::<Block, u8>(guard.as_slice());
                f(&bytes[*offset..*offset + len])
            }
        }
    }

    fn with_bytes_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let len = self.nbytes;
        match &mut self.backing {
            Backing::Released => f(&mut []),
            Backing::Heap(blocks) => f(&mut bytemuck::cast_slice_mut::<Block, u8>(blocks)[..len]),
            Backing::Arena { buffer, offset, .. } => {
                let mut guard = buffer.blocks.lock();
                let bytes = bytemuck::cast_slice_mut::<Block, u8>(guard.as_mut_slice());
                f(&mut bytes[*offset..*offset + len])
            }
        }
    }
}

/// Reference-counted tensor storage. Clones share the same bytes.
#[derive(Clone)]
pub struct Storage {
    state: Arc<Mutex<StorageState>>,
}

impl Storage {
    /// Allocates `nbytes` of zeroed heap memory.
    #[must_use]
    pub fn new(nbytes: usize) -> Self {
        Self::from_state(StorageState {
            backing: Backing::Heap(zeroed_blocks(nbytes)),
            nbytes,
        })
    }

    #[must_use]
    pub fn released() -> Self {
        Self::from_state(StorageState {
            backing: Backing::Released,
            nbytes: 0,
        })
    }

    fn from_state(state: StorageState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn nbytes(&self) -> usize {
        self.state.lock().nbytes
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state.lock().backing, Backing::Released)
    }

    pub fn is_arena_backed(&self) -> bool {
        matches!(self.state.lock().backing, Backing::Arena { .. })
    }

    /// Returns true when this storage currently lives inside `buffer`.
    pub fn is_bound_to(&self, buffer: &ArenaBuffer) -> bool {
        match &self.state.lock().backing {
            Backing::Arena { buffer: bound, .. } => bound.ptr_eq(buffer),
            _ => false,
        }
    }

    pub fn same_storage(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Number of live handles to this storage.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }

    /// Sets the logical size to `nbytes`, keeping existing contents.
    ///
    /// The current backing is reused when it is large enough. Otherwise the
    /// storage moves to a fresh heap allocation, which also detaches it from
    /// any arena it was bound to.
    pub fn resize(&self, nbytes: usize) {
        let mut state = self.state.lock();
        if nbytes <= state.capacity() {
            state.nbytes = nbytes;
            return;
        }
        let mut blocks = zeroed_blocks(nbytes);
        let keep = state.nbytes;
        state.with_bytes(|old| {
            bytemuck::cast_slice_mut::<Block, u8>(&mut blocks)[..keep].copy_from_slice(old);
        });
        state.backing = Backing::Heap(blocks);
        state.nbytes = nbytes;
    }

    /// Rebinds this storage to `capacity` bytes at `offset` inside `buffer`.
    /// The logical size is reset to zero.
    pub fn bind_arena(&self, buffer: &ArenaBuffer, offset: usize, capacity: usize) {
        debug_assert_eq!(offset % STORAGE_ALIGNMENT, 0);
        debug_assert!(offset + capacity <= buffer.nbytes());
        let mut state = self.state.lock();
        state.backing = Backing::Arena {
            buffer: buffer.clone(),
            offset,
            capacity,
        };
        state.nbytes = 0;
    }

    /// Drops the backing memory and resets the logical size to zero.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.backing = Backing::Released;
        state.nbytes = 0;
    }

    pub fn with_elements<T: Element, R>(
        &self,
        f: impl FnOnce(&[T]) -> R,
    ) -> Result<R, TensorError> {
        let state = self.state.lock();
        if state.nbytes == 0 {
            return Ok(f(&[]));
        }
        state.with_bytes(|bytes| {
            bytemuck::try_cast_slice::<u8, T>(bytes)
                .map(f)
                .map_err(|err| TensorError::StorageView(format!("{err:?}")))
        })
    }

    pub fn with_elements_mut<T: Element, R>(
        &self,
        f: impl FnOnce(&mut [T]) -> R,
    ) -> Result<R, TensorError> {
        let mut state = self.state.lock();
        if state.nbytes == 0 {
            return Ok(f(&mut []));
        }
        state.with_bytes_mut(|bytes| {
            bytemuck::try_cast_slice_mut::<u8, T>(bytes)
                .map(f)
                .map_err(|err| TensorError::StorageView(format!("{err:?}")))
        })
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let backing = match &state.backing {
            Backing::Released => "released",
            Backing::Heap(_) => "heap",
            Backing::Arena { .. } => "arena",
        };
        f.debug_struct("Storage")
            .field("backing", &backing)
            .field("nbytes", &state.nbytes)
            .field("capacity", &state.capacity())
            .finish()
    }
}
