//! Arena-backed storage for planner-managed tensors.
//!
//! After the first successful run the planner records how many bytes each
//! managed slot needed, groups the slots (one group per slot, or shared
//! between slots with disjoint lifetimes), and lays the groups out in one
//! arena per [`StorageClass`] at 64-byte aligned offsets. Every later run
//! binds the managed tensors into the arena before execution and releases
//! them afterwards. A run that needs more than a group's capacity grows the
//! group and reallocates the affected arena once.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::runtime::liveness::{ManagedSlot, SlotUsage, assign_groups};
use crate::tensor::{ArenaBuffer, Storage, StorageClass, align_up};
use crate::value::Value;

#[derive(Debug, Clone)]
struct StorageGroup {
    class: StorageClass,
    capacity: usize,
    offset: usize,
}

#[derive(Debug, Default)]
struct Region {
    buffer: Option<ArenaBuffer>,
}

impl Region {
    fn nbytes(&self) -> usize {
        self.buffer.as_ref().map_or(0, ArenaBuffer::nbytes)
    }
}

#[derive(Debug)]
pub struct MemoryPlanner {
    slots: Vec<ManagedSlot>,
    group_of: Vec<usize>,
    groups: Vec<StorageGroup>,
    regions: BTreeMap<StorageClass, Region>,
    /// Groups a slot has used under other storage classes, so a slot that
    /// alternates dtypes returns to its earlier group.
    previous_groups: BTreeMap<(usize, StorageClass), usize>,
    resize_count: usize,
}

impl MemoryPlanner {
    /// Builds a plan from the tensors a completed run left in `values`.
    /// Managed slots that do not hold a tensor are left unmanaged.
    pub fn new(managed: &[ManagedSlot], values: &[Value], share: bool) -> Self {
        let (slots, usage): (Vec<_>, Vec<_>) = managed
            .iter()
            .filter_map(|managed| {
                let tensor = values.get(usize::from(managed.slot))?.as_tensor()?;
                let usage = SlotUsage {
                    class: tensor.dtype().storage_class(),
                    nbytes: align_up(tensor.storage().nbytes()),
                };
                Some((*managed, usage))
            })
            .unzip();

        let group_of = assign_groups(&slots, &usage, share);
        let group_count = group_of.iter().map(|group| group + 1).max().unwrap_or(0);
        let mut groups = vec![
            StorageGroup {
                class: StorageClass::Floating,
                capacity: 0,
                offset: 0,
            };
            group_count
        ];
        for (group, usage) in group_of.iter().zip(&usage) {
            groups[*group].class = usage.class;
            groups[*group].capacity = groups[*group].capacity.max(usage.nbytes);
        }

        let mut planner = Self {
            slots,
            group_of,
            groups,
            regions: BTreeMap::new(),
            previous_groups: BTreeMap::new(),
            resize_count: 0,
        };
        let classes = planner
            .groups
            .iter()
            .map(|group| group.class)
            .collect::<BTreeSet<_>>();
        for class in classes {
            planner.allocate_region(class);
        }
        info!(
            managed = planner.slots.len(),
            groups = planner.num_storage_groups(),
            bytes = planner.total_managed_bytes(),
            "memory planner initialized"
        );
        planner
    }

    fn allocate_region(&mut self, class: StorageClass) -> usize {
        let mut offset = 0;
        for group in self.groups.iter_mut().filter(|group| group.class == class) {
            group.offset = offset;
            offset += group.capacity;
        }
        let buffer = (offset > 0).then(|| ArenaBuffer::with_bytes(offset));
        self.regions.insert(class, Region { buffer });
        offset
    }

    /// Binds every managed tensor's storage into its arena window.
    pub fn allocate(&self, values: &mut [Value]) {
        for (managed, group) in self.slots.iter().zip(&self.group_of) {
            let Some(Value::Tensor(tensor)) = values.get(usize::from(managed.slot)) else {
                continue;
            };
            let group = &self.groups[*group];
            if let Some(buffer) = self
                .regions
                .get(&group.class)
                .and_then(|region| region.buffer.as_ref())
                && group.capacity > 0
            {
                tensor.storage().bind_arena(buffer, group.offset, group.capacity);
            }
        }
    }

    /// Records what each managed tensor used, grows groups that overflowed
    /// and releases the storages. Arenas are reallocated only for storage
    /// classes whose layout changed.
    pub fn deallocate(&mut self, values: &mut [Value]) {
        let mut dirty = BTreeSet::new();
        for index in 0..self.slots.len() {
            let Some(Value::Tensor(tensor)) = values.get(usize::from(self.slots[index].slot))
            else {
                continue;
            };
            let class = tensor.dtype().storage_class();
            let nbytes = align_up(tensor.storage().nbytes());
            let current = self.group_of[index];
            let previous_class = self.groups[current].class;
            if previous_class != class {
                // The slot's dtype moved to another storage class.
                self.previous_groups.insert((index, previous_class), current);
                let group = match self.previous_groups.get(&(index, class)) {
                    Some(group) => *group,
                    None => {
                        self.groups.push(StorageGroup {
                            class,
                            capacity: 0,
                            offset: 0,
                        });
                        self.groups.len() - 1
                    }
                };
                self.group_of[index] = group;
            }
            let group = &mut self.groups[self.group_of[index]];
            if nbytes > group.capacity {
                group.capacity = nbytes;
                dirty.insert(class);
            }
            tensor.storage().release();
        }

        for class in dirty {
            let previous = self.region_bytes(class);
            let total = self.allocate_region(class);
            self.resize_count += 1;
            debug!(?class, previous, total, "managed region resized");
        }
    }

    /// Drops managed storage without recording sizes. Used when a run fails.
    pub fn release(&self, values: &mut [Value]) {
        for managed in &self.slots {
            if let Some(Value::Tensor(tensor)) = values.get(usize::from(managed.slot)) {
                tensor.storage().release();
            }
        }
    }

    pub fn manages(&self, slot: u16) -> bool {
        self.slots.iter().any(|managed| managed.slot == slot)
    }

    /// True when `storage` currently lives in one of the planner's arenas.
    pub fn owns(&self, storage: &Storage) -> bool {
        self.regions
            .values()
            .filter_map(|region| region.buffer.as_ref())
            .any(|buffer| storage.is_bound_to(buffer))
    }

    pub fn managed_slots(&self) -> &[ManagedSlot] {
        &self.slots
    }

    pub fn num_managed_tensors(&self) -> usize {
        self.slots.len()
    }

    pub fn num_storage_groups(&self) -> usize {
        self.group_of.iter().collect::<BTreeSet<_>>().len()
    }

    pub fn region_bytes(&self, class: StorageClass) -> usize {
        self.regions.get(&class).map_or(0, Region::nbytes)
    }

    pub fn total_managed_bytes(&self) -> usize {
        self.regions.values().map(Region::nbytes).sum()
    }

    /// How many times an arena had to be reallocated after planning.
    pub fn resize_count(&self) -> usize {
        self.resize_count
    }
}
