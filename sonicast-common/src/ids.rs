//! Controller id allocation
//!
//! Controller ids are one byte wide and global to the process. Every emitter
//! carries one; several emitters may share an id, so the pool keeps a
//! reference count per id and only returns an id to the free list when the
//! last holder releases it.
//!
//! Free ids are kept in a min-heap so leases always hand out the lowest
//! available id (stable, predictable ids across restarts).

use crate::{Error, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

/// Number of distinct controller ids
const ID_SPACE: usize = u8::MAX as usize + 1;

/// Reference-counted allocator over the one-byte controller id space
#[derive(Debug, Clone)]
pub struct ControllerIdPool {
    /// First leasable id; ids below it are reserved for the host
    first: u8,

    /// Holders per id (0 = free)
    refcounts: Box<[u16; ID_SPACE]>,

    /// Free ids, lowest first
    available: BinaryHeap<Reverse<u8>>,
}

impl ControllerIdPool {
    /// Create a pool leasing ids `first..=255`
    pub fn new(first: u8) -> Self {
        let available = (first..=u8::MAX).map(Reverse).collect();
        Self {
            first,
            refcounts: Box::new([0; ID_SPACE]),
            available,
        }
    }

    /// Lease the lowest free id with a reference count of one
    pub fn lease(&mut self) -> Result<u8> {
        while let Some(Reverse(id)) = self.available.pop() {
            // Skip stale entries for ids that were retained after being freed
            if self.refcounts[id as usize] == 0 {
                self.refcounts[id as usize] = 1;
                debug!("Leased controller id {}", id);
                return Ok(id);
            }
        }
        Err(Error::Exhausted(format!(
            "all controller ids {}..=255 are leased",
            self.first
        )))
    }

    /// Add a holder to an id that is already leased
    pub fn retain(&mut self, id: u8) -> Result<()> {
        let count = &mut self.refcounts[id as usize];
        if *count == 0 {
            return Err(Error::InvalidInput(format!(
                "controller id {} is not leased",
                id
            )));
        }
        *count = count.saturating_add(1);
        Ok(())
    }

    /// Drop one holder of `id`.
    ///
    /// Returns `true` when this was the last holder and the id is free again.
    /// Freeing an id that is not leased is a no-op returning `false`.
    pub fn free(&mut self, id: u8) -> bool {
        let count = &mut self.refcounts[id as usize];
        match *count {
            0 => false,
            1 => {
                *count = 0;
                if id >= self.first {
                    self.available.push(Reverse(id));
                }
                debug!("Released controller id {}", id);
                true
            }
            _ => {
                *count -= 1;
                false
            }
        }
    }

    /// Release every lease regardless of holder count.
    ///
    /// Returns how many distinct ids were leased.
    pub fn free_all(&mut self) -> usize {
        let released = self.refcounts.iter().filter(|c| **c > 0).count();
        self.refcounts.fill(0);
        self.available = (self.first..=u8::MAX).map(Reverse).collect();
        released
    }

    /// Whether `id` currently has at least one holder
    pub fn is_leased(&self, id: u8) -> bool {
        self.refcounts[id as usize] > 0
    }

    /// Number of holders of `id`
    pub fn holders(&self, id: u8) -> u16 {
        self.refcounts[id as usize]
    }

    /// Number of ids that can still be leased
    pub fn available(&self) -> usize {
        (self.first..=u8::MAX)
            .filter(|id| self.refcounts[*id as usize] == 0)
            .count()
    }
}

impl Default for ControllerIdPool {
    fn default() -> Self {
        Self::new(0)
    }
}
