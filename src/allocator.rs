//! Input index allocation

use std::collections::BTreeSet;

/// Hands out small integer indices for packer inputs
///
/// Indices are reused lowest-first once released. Each packer owns its own
/// allocator, so independent packers never share index space.
#[derive(Debug, Clone, Default)]
pub struct IndexAllocator {
    in_use: BTreeSet<usize>,
}

impl IndexAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the lowest free index
    pub fn acquire(&mut self) -> usize {
        let index = (0..)
            .find(|i| !self.in_use.contains(i))
            .unwrap_or(self.in_use.len());
        self.in_use.insert(index);
        log::debug!("Acquired input index {index}");
        index
    }

    /// Free `index`, returning false if it was not reserved
    pub fn release(&mut self, index: usize) -> bool {
        let released = self.in_use.remove(&index);
        if released {
            log::debug!("Released input index {index}");
        } else {
            log::warn!("Release of unknown input index {index}");
        }
        released
    }

    /// Currently reserved indices in ascending order
    pub fn in_use(&self) -> impl Iterator<Item = usize> + '_ {
        self.in_use.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_lowest_first() {
        let mut alloc = IndexAllocator::new();
        assert_eq!(alloc.acquire(), 0);
        assert_eq!(alloc.acquire(), 1);
        assert_eq!(alloc.acquire(), 2);

        assert!(alloc.release(1));
        assert_eq!(alloc.acquire(), 1);
        assert_eq!(alloc.in_use().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_release_unknown() {
        let mut alloc = IndexAllocator::new();
        assert!(!alloc.release(7));
        let index = alloc.acquire();
        assert!(alloc.release(index));
        assert!(!alloc.release(index));
        assert!(alloc.is_empty());
    }

    #[test]
    fn test_independent_instances() {
        let mut a = IndexAllocator::new();
        let mut b = IndexAllocator::new();
        assert_eq!(a.acquire(), 0);
        assert_eq!(b.acquire(), 0);
        assert_eq!(a.len(), 1);
    }
}
