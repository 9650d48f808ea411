// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity instance pool.
//!
//! Every object type keeps its instances in an [`InstancePool`]: a slot arena
//! allocated once at startup and split into a `free` stack and a `used` list.
//! The pool never grows. Running out of slots is reported as
//! [`PoolError::NoCapacity`].
//!
//! ```text
//! slots: [ A(id 5) | B(free) | C(id 0) ]
//! used:  [2, 0]        (slot indices, sorted by instance ID)
//! free:  [1]
//! ```
//!
//! Invariants (checked in debug builds after every mutation):
//! - `used.len() + free.len() == capacity`
//! - every slot index appears in exactly one of the two lists
//! - instance IDs in `used` are unique and sorted

use std::mem;

use thiserror::Error;

/// ID marking an unassigned slot. Never handed out.
pub const UNASSIGNED_ID: u16 = u16::MAX;

/// Largest assignable instance ID.
pub const MAX_INSTANCE_ID: u16 = u16::MAX - 1;

/// Pool level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("no free slot")]
    NoCapacity,
    #[error("instance ID {0} already in use")]
    IdInUse(u16),
    #[error("instance ID {0} is reserved")]
    IdTooLarge(u16),
    #[error("instance {0} not found")]
    NotFound(u16),
}

struct Slot<T> {
    id: u16,
    data: T,
}

/// Fixed-size arena of object instances.
pub struct InstancePool<T> {
    slots: Vec<Slot<T>>,
    used: Vec<usize>,
    free: Vec<usize>,
}

impl<T: Default> InstancePool<T> {
    /// Create a pool with `capacity` zeroed, free slots.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                id: UNASSIGNED_ID,
                data: T::default(),
            })
            .collect();
        // Reverse so the lowest slot is popped first.
        let free = (0..capacity).rev().collect();

        Self {
            slots,
            used: Vec::with_capacity(capacity),
            free,
        }
    }

    /// Take a free slot and assign it an ID.
    ///
    /// With `None`, the smallest ID not currently used is assigned.
    pub fn allocate(&mut self, requested: Option<u16>) -> Result<(u16, &mut T), PoolError> {
        let id = match requested {
            Some(id) if id > MAX_INSTANCE_ID => return Err(PoolError::IdTooLarge(id)),
            Some(id) if self.position(id).is_ok() => return Err(PoolError::IdInUse(id)),
            Some(id) => id,
            None => {
                if self.free.is_empty() {
                    return Err(PoolError::NoCapacity);
                }
                self.next_free_id().ok_or(PoolError::NoCapacity)?
            }
        };

        let insert_at = self.position(id).err().ok_or(PoolError::IdInUse(id))?;
        let slot_index = self.free.pop().ok_or(PoolError::NoCapacity)?;
        self.used.insert(insert_at, slot_index);

        let slot = &mut self.slots[slot_index];
        debug_assert_eq!(slot.id, UNASSIGNED_ID, "free slot carried an ID");
        slot.id = id;
        self.check_invariants();

        Ok((id, &mut self.slots[slot_index].data))
    }

    /// Return an instance to the free list, resetting it to its zero value.
    ///
    /// The previous contents are handed back to the caller.
    pub fn release(&mut self, id: u16) -> Result<T, PoolError> {
        let pos = self.position(id).map_err(|_| PoolError::NotFound(id))?;
        let slot_index = self.used.remove(pos);

        let slot = &mut self.slots[slot_index];
        slot.id = UNASSIGNED_ID;
        let old = mem::take(&mut slot.data);
        self.free.push(slot_index);
        self.check_invariants();

        Ok(old)
    }
}

impl<T> InstancePool<T> {
    /// Find a used instance.
    pub fn find(&self, id: u16) -> Option<&T> {
        let pos = self.position(id).ok()?;
        Some(&self.slots[self.used[pos]].data)
    }

    /// Find a used instance for mutation.
    pub fn find_mut(&mut self, id: u16) -> Option<&mut T> {
        let pos = self.position(id).ok()?;
        let slot_index = self.used[pos];
        Some(&mut self.slots[slot_index].data)
    }

    /// True if `id` is used.
    pub fn contains(&self, id: u16) -> bool {
        self.position(id).is_ok()
    }

    /// Smallest ID not currently used, or `None` if every ID is taken.
    pub fn next_free_id(&self) -> Option<u16> {
        let mut candidate: u16 = 0;
        for &slot_index in &self.used {
            let id = self.slots[slot_index].id;
            if id != candidate {
                break;
            }
            if candidate == MAX_INSTANCE_ID {
                return None;
            }
            candidate += 1;
        }
        Some(candidate)
    }

    /// Used instance IDs in ascending order.
    pub fn ids(&self) -> Vec<u16> {
        self.used.iter().map(|&i| self.slots[i].id).collect()
    }

    /// Iterate used instances in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &T)> + '_ {
        self.used.iter().map(move |&i| {
            let slot = &self.slots[i];
            (slot.id, &slot.data)
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of used instances.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Number of free slots.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    // Binary search over `used`, which is kept sorted by instance ID.
    fn position(&self, id: u16) -> Result<usize, usize> {
        self.used.binary_search_by_key(&id, |&i| self.slots[i].id)
    }

    fn check_invariants(&self) {
        debug_assert_eq!(
            self.used.len() + self.free.len(),
            self.slots.len(),
            "instance pool lost or duplicated a slot"
        );
        debug_assert!(
            self.used
                .windows(2)
                .all(|w| self.slots[w[0]].id < self.slots[w[1]].id),
            "used instance IDs not unique and sorted"
        );
        debug_assert!(
            self.free.iter().all(|&i| self.slots[i].id == UNASSIGNED_ID),
            "free slot carries an instance ID"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn test_new_pool_is_free() {
        let pool: InstancePool<Dummy> = InstancePool::new(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.free_len(), 3);
        assert!(pool.is_empty());
        assert_eq!(pool.next_free_id(), Some(0));
    }

    #[test]
    fn test_explicit_then_automatic_ids() {
        let mut pool: InstancePool<Dummy> = InstancePool::new(2);

        let (id, _) = pool.allocate(Some(5)).unwrap();
        assert_eq!(id, 5);
        let (id, _) = pool.allocate(None).unwrap();
        assert_eq!(id, 0);
        assert_eq!(pool.allocate(None).unwrap_err(), PoolError::NoCapacity);
        assert_eq!(pool.allocate(Some(9)).unwrap_err(), PoolError::NoCapacity);
        assert_eq!(pool.ids(), vec![0, 5]);
    }

    #[test]
    fn test_smallest_free_id_fills_gaps() {
        let mut pool: InstancePool<Dummy> = InstancePool::new(4);
        pool.allocate(Some(0)).unwrap();
        pool.allocate(Some(1)).unwrap();
        pool.allocate(Some(3)).unwrap();
        assert_eq!(pool.allocate(None).unwrap().0, 2);
    }

    #[test]
    fn test_id_errors() {
        let mut pool: InstancePool<Dummy> = InstancePool::new(2);
        pool.allocate(Some(1)).unwrap();
        assert_eq!(pool.allocate(Some(1)).unwrap_err(), PoolError::IdInUse(1));
        assert_eq!(
            pool.allocate(Some(UNASSIGNED_ID)).unwrap_err(),
            PoolError::IdTooLarge(UNASSIGNED_ID)
        );
        assert_eq!(pool.allocate(Some(MAX_INSTANCE_ID)).unwrap().0, MAX_INSTANCE_ID);
        assert_eq!(pool.release(7).unwrap_err(), PoolError::NotFound(7));
    }

    #[test]
    fn test_release_resets_instance() {
        let mut pool: InstancePool<Dummy> = InstancePool::new(1);
        let (id, inst) = pool.allocate(None).unwrap();
        inst.value = 42;

        let old = pool.release(id).unwrap();
        assert_eq!(old.value, 42);
        assert!(pool.find(id).is_none());

        let (_, inst) = pool.allocate(None).unwrap();
        assert_eq!(*inst, Dummy::default());
    }

    #[test]
    fn test_find_mut_and_iter_order() {
        let mut pool: InstancePool<Dummy> = InstancePool::new(3);
        pool.allocate(Some(8)).unwrap();
        pool.allocate(Some(2)).unwrap();
        pool.find_mut(8).unwrap().value = 80;

        let seen: Vec<(u16, u32)> = pool.iter().map(|(id, d)| (id, d.value)).collect();
        assert_eq!(seen, vec![(2, 0), (8, 80)]);
        assert!(pool.contains(2));
        assert!(!pool.contains(3));
    }

    #[test]
    fn test_random_sequences_conserve_slots() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let capacity = 5;
        let mut pool: InstancePool<Dummy> = InstancePool::new(capacity);

        for _ in 0..2000 {
            if rng.bool() {
                let requested = if rng.bool() {
                    Some(rng.u16(0..12))
                } else {
                    None
                };
                let expected_auto = pool.next_free_id();
                match pool.allocate(requested) {
                    Ok((id, _)) => {
                        if requested.is_none() {
                            assert_eq!(Some(id), expected_auto);
                        }
                    }
                    Err(PoolError::NoCapacity) => assert_eq!(pool.free_len(), 0),
                    Err(PoolError::IdInUse(id)) => assert!(pool.contains(id)),
                    Err(e) => panic!("unexpected error {:?}", e),
                }
            } else {
                let id = rng.u16(0..12);
                let was_used = pool.contains(id);
                assert_eq!(pool.release(id).is_ok(), was_used);
            }

            assert_eq!(pool.len() + pool.free_len(), capacity);
            let ids = pool.ids();
            let mut dedup = ids.clone();
            dedup.dedup();
            assert_eq!(ids, dedup);
        }
    }
}
