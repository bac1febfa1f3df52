//! # Pool Allocator
//!
//! Fixed-capacity slot allocator for records that are recycled every few
//! frames. Handles carry a generation so a handle to a freed slot can never
//! observe the slot's next occupant.

/// A pool allocator for fixed-size records.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: PoolAllocator<Vec<u8>> = PoolAllocator::new(64);
///
/// let handle = pool.allocate(vec![0; 256]).ok_or(Full)?;
/// let bytes = pool.free(handle);
/// assert!(pool.get(handle).is_none()); // stale generation
/// ```
pub struct PoolAllocator<T> {
    /// Slot storage.
    slots: Box<[Slot<T>]>,
    /// Free list - indices of available slots.
    free_list: Vec<usize>,
    /// Number of allocated records.
    allocated_count: usize,
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

/// Handle to an allocated record in a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: usize,
    generation: u32,
}

impl PoolHandle {
    /// Slot index (stable while the record is allocated).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl<T> PoolAllocator<T> {
    /// Creates a new pool with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");

        let slots: Vec<Slot<T>> = (0..capacity)
            .map(|_| Slot { value: None, generation: 0 })
            .collect();

        Self {
            slots: slots.into_boxed_slice(),
            free_list: (0..capacity).rev().collect(),
            allocated_count: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of currently allocated records.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns true when nothing is allocated.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }

    /// Stores `value` in a free slot.
    ///
    /// # Returns
    ///
    /// A handle to the record, or `None` if the pool is full.
    pub fn allocate(&mut self, value: T) -> Option<PoolHandle> {
        let index = self.free_list.pop()?;
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.allocated_count += 1;

        Some(PoolHandle { index, generation: slot.generation })
    }

    /// Frees an allocated record.
    ///
    /// # Returns
    ///
    /// The freed record, or `None` if the handle is stale or invalid.
    pub fn free(&mut self, handle: PoolHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.allocated_count -= 1;

        Some(value)
    }

    /// Gets a reference to an allocated record.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to an allocated record.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns the first allocated record matching `pred`.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<PoolHandle> {
        self.iter().find(|(_, v)| pred(v)).map(|(h, _)| h)
    }

    /// Frees every record for which `pred` returns true.
    ///
    /// # Returns
    ///
    /// The freed records, in slot order.
    pub fn free_where(&mut self, mut pred: impl FnMut(&mut T) -> bool) -> Vec<T> {
        let doomed: Vec<PoolHandle> = self
            .iter_mut()
            .filter_map(|(h, v)| pred(v).then_some(h))
            .collect();
        doomed.into_iter().filter_map(|h| self.free(h)).collect()
    }

    /// Iterates over all allocated records.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|v| (PoolHandle { index, generation: slot.generation }, v))
        })
    }

    /// Iterates mutably over all allocated records.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|v| (PoolHandle { index, generation }, v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocate_free() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(10);

        let h1 = pool.allocate(42).unwrap();
        assert_eq!(*pool.get(h1).unwrap(), 42);
        assert_eq!(pool.allocated_count(), 1);

        assert_eq!(pool.free(h1), Some(42));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_full() {
        let mut pool: PoolAllocator<u8> = PoolAllocator::new(2);

        let _ = pool.allocate(1).unwrap();
        let _ = pool.allocate(2).unwrap();
        assert!(pool.allocate(3).is_none());
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(1);

        let h1 = pool.allocate(1).unwrap();
        pool.free(h1);

        let h2 = pool.allocate(2).unwrap();
        assert_eq!(h1.index(), h2.index()); // Same slot reused
        assert!(pool.get(h1).is_none());
        assert!(pool.free(h1).is_none());
        assert_eq!(*pool.get(h2).unwrap(), 2);
    }

    #[test]
    fn test_free_where() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(8);
        for v in 0..6 {
            pool.allocate(v).unwrap();
        }

        let freed = pool.free_where(|v| *v % 2 == 0);
        assert_eq!(freed, vec![0, 2, 4]);
        assert_eq!(pool.allocated_count(), 3);
        assert!(pool.find(|v| *v == 3).is_some());
        assert!(pool.find(|v| *v == 4).is_none());
    }
}
