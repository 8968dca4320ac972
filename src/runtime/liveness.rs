//! Lifetimes of planner-managed slots and the greedy grouping that lets
//! slots with disjoint lifetimes share one storage group.

use crate::tensor::StorageClass;

/// A value-table slot whose tensor storage is owned by the memory planner.
///
/// `start` is the index of the defining node and `end` the last node that
/// touches any value that may alias it. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedSlot {
    pub slot: u16,
    pub start: usize,
    pub end: usize,
}

impl ManagedSlot {
    pub fn overlaps(&self, other: &ManagedSlot) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Storage observed in a managed slot at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotUsage {
    pub class: StorageClass,
    pub nbytes: usize,
}

/// Assigns every slot a storage group index.
///
/// Without `share` each slot gets its own group. With it, slots are visited
/// in start order and take the first group of the same storage class that
/// went free before they start, preferring one already large enough.
pub fn assign_groups(slots: &[ManagedSlot], usage: &[SlotUsage], share: bool) -> Vec<usize> {
    debug_assert_eq!(slots.len(), usage.len());
    if !share {
        return (0..slots.len()).collect();
    }

    let mut order = (0..slots.len()).collect::<Vec<_>>();
    order.sort_by_key(|index| (slots[*index].start, slots[*index].end));

    let mut groups = vec![0; slots.len()];
    let mut next_group = 0usize;
    // (group, class, free_after, largest member so far)
    let mut reusable = Vec::<(usize, StorageClass, usize, usize)>::new();

    for index in order {
        let slot = slots[index];
        let SlotUsage { class, nbytes } = usage[index];
        let candidates = || {
            reusable
                .iter()
                .enumerate()
                .filter(move |(_, entry)| entry.1 == class && entry.2 < slot.start)
        };
        let position = candidates()
            .find(|(_, entry)| entry.3 >= nbytes)
            .or_else(|| candidates().next())
            .map(|(position, _)| position);

        let (group, largest) = match position {
            Some(position) => {
                let (group, _, _, largest) = reusable.remove(position);
                (group, largest.max(nbytes))
            }
            None => {
                let group = next_group;
                next_group += 1;
                (group, nbytes)
            }
        };
        groups[index] = group;
        reusable.push((group, class, slot.end, largest));
    }
    groups
}
