use std::fmt;
use std::ops::Deref;

/// Largest input count stored without a heap allocation.
pub const INLINE_CAPACITY: usize = 5;

/// Value-table slot indices of a processed node's inputs.
///
/// Up to [`INLINE_CAPACITY`] indices live inline; longer lists move to a
/// boxed slice.
pub struct ProcessedNodeInputs {
    repr: Repr,
}

enum Repr {
    Inline {
        len: u8,
        items: [u16; INLINE_CAPACITY],
    },
    Outline(Box<[u16]>),
}

impl ProcessedNodeInputs {
    pub const fn new() -> Self {
        Self {
            repr: Repr::Inline {
                len: 0,
                items: [0; INLINE_CAPACITY],
            },
        }
    }

    pub fn from_slice(indices: &[u16]) -> Self {
        Self {
            repr: Repr::from_slice(indices),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline { .. })
    }

    pub fn as_slice(&self) -> &[u16] {
        match &self.repr {
            Repr::Inline { len, items } => &items[..usize::from(*len)],
            Repr::Outline(items) => items,
        }
    }
}

impl Repr {
    fn from_slice(indices: &[u16]) -> Self {
        if indices.len() <= INLINE_CAPACITY {
            let mut items = [0; INLINE_CAPACITY];
            items[..indices.len()].copy_from_slice(indices);
            Repr::Inline {
                len: indices.len() as u8,
                items,
            }
        } else {
            Repr::Outline(indices.into())
        }
    }
}

impl Default for ProcessedNodeInputs {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ProcessedNodeInputs {
    fn clone(&self) -> Self {
        Self::from_slice(self.as_slice())
    }

    fn clone_from(&mut self, source: &Self) {
        match (&mut self.repr, &source.repr) {
            (
                Repr::Inline { len, items },
                Repr::Inline {
                    len: source_len,
                    items: source_items,
                },
            ) => {
                *len = *source_len;
                *items = *source_items;
                return;
            }
            (Repr::Outline(items), Repr::Outline(source_items))
                if items.len() == source_items.len() =>
            {
                items.copy_from_slice(source_items);
                return;
            }
            _ => {}
        }
        // Inline into outline, outline into inline, or outline of another length.
        self.repr = match &source.repr {
            Repr::Outline(source_items) => Repr::Outline(source_items.clone()),
            Repr::Inline { .. } => Repr::from_slice(source.as_slice()),
        };
    }
}

impl Deref for ProcessedNodeInputs {
    type Target = [u16];

    fn deref(&self) -> &[u16] {
        self.as_slice()
    }
}

impl PartialEq for ProcessedNodeInputs {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ProcessedNodeInputs {}

impl fmt::Debug for ProcessedNodeInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl FromIterator<u16> for ProcessedNodeInputs {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let indices = iter.into_iter().collect::<Vec<_>>();
        Self::from_slice(&indices)
    }
}

impl<'a> IntoIterator for &'a ProcessedNodeInputs {
    type Item = &'a u16;
    type IntoIter = std::slice::Iter<'a, u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{INLINE_CAPACITY, ProcessedNodeInputs};

    fn sequence(len: usize) -> Vec<u16> {
        (0..len).map(|index| (index * 7 + 3) as u16).collect()
    }

    const LENGTHS: [usize; 5] = [0, 2, INLINE_CAPACITY, INLINE_CAPACITY + 1, 100];

    #[test]
    fn representation_switches_at_capacity() {
        assert!(ProcessedNodeInputs::from_slice(&sequence(INLINE_CAPACITY)).is_inline());
        assert!(!ProcessedNodeInputs::from_slice(&sequence(INLINE_CAPACITY + 1)).is_inline());
    }

    #[test]
    fn copy_and_move_preserve_contents() {
        for len in LENGTHS {
            let expected = sequence(len);
            let original = ProcessedNodeInputs::from_slice(&expected);

            let copied = original.clone();
            assert_eq!(copied.as_slice(), expected.as_slice());
            assert_eq!(copied.len(), len);

            let moved = original;
            assert_eq!(moved.as_slice(), expected.as_slice());
            assert_eq!(moved, copied);
        }
    }

    #[test]
    fn assignment_across_representations() {
        for source_len in LENGTHS {
            for target_len in LENGTHS {
                let expected = sequence(source_len);
                let source = ProcessedNodeInputs::from_slice(&expected);

                let mut copy_target = ProcessedNodeInputs::from_slice(&sequence(target_len));
                copy_target.clone_from(&source);
                assert_eq!(copy_target.as_slice(), expected.as_slice());
                assert_eq!(copy_target.len(), source_len);
                assert_eq!(copy_target.is_inline(), source_len <= INLINE_CAPACITY);

                let mut move_target = ProcessedNodeInputs::from_slice(&sequence(target_len));
                assert_eq!(move_target.len(), target_len);
                move_target = source;
                assert_eq!(move_target.as_slice(), expected.as_slice());
            }
        }
    }

    #[test]
    fn equality_is_elementwise() {
        let a = ProcessedNodeInputs::from_slice(&[1, 2, 3]);
        let b: ProcessedNodeInputs = [1u16, 2, 3].into_iter().collect();
        let c = ProcessedNodeInputs::from_slice(&[1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a[2], 3);
    }
}
