// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Retention policies: the discipline deciding which cells are strong and which are weak.
//!
//! A policy is notified after every structural event (access, insert, remove) and adjusts
//! retention through the O(1) primitives of [`PolicyContext`]. Callbacks must not iterate
//! the whole cache. Evictions performed through the context do not re-enter the policy;
//! the running callback is responsible for its own follow-up bookkeeping.

use std::{fmt, hash::Hash};

use ahash::AHashMap;

use crate::{
    cache::{
        CacheStats,
        cell::CellId,
        index::SecondaryIndex,
        list::AccessList,
        memory::MemoryManager,
    },
    correctness::{check_in_range_inclusive_f64, check_positive_usize, check_predicate_true},
    enums::Strength,
};

/// The restricted cache view handed to policy callbacks.
///
/// Exposes recency and strength primitives plus hard eviction; every operation is O(1)
/// (eviction is O(i) in the number of registered indexes).
pub struct PolicyContext<'a, K, V> {
    pub(crate) list: &'a mut AccessList<K, V>,
    pub(crate) map: &'a mut AHashMap<K, CellId>,
    pub(crate) indexes: &'a mut Vec<Box<dyn SecondaryIndex<V>>>,
    pub(crate) manager: &'a mut dyn MemoryManager<V>,
    pub(crate) stats: &'a mut CacheStats,
}

impl<K, V> fmt::Debug for PolicyContext<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(PolicyContext))
            .field("len", &self.list.len())
            .field("strong", &self.list.strong_len())
            .field("weak", &self.list.weak_len())
            .finish()
    }
}

impl<K: Eq + Hash, V> PolicyContext<'_, K, V> {
    /// Returns the total live cell count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Returns the strong cell count.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        self.list.strong_len()
    }

    /// Returns the weak cell count.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.list.weak_len()
    }

    /// Returns the current strength of `cell`.
    #[must_use]
    pub fn strength(&self, cell: CellId) -> Strength {
        self.list.cell(cell).strength()
    }

    /// Moves `cell` to the head of the access list.
    pub fn touch(&mut self, cell: CellId) {
        self.list.touch(cell);
    }

    /// Ensures the just-touched `cell` is strong, as the most recent strong cell.
    ///
    /// Returns `false` (and leaves the cell weak) if its value has been reclaimed.
    pub fn strengthen_touched(&mut self, cell: CellId) -> bool {
        if self.list.promote_front(cell) {
            self.manager.forget(cell);
            true
        } else {
            false
        }
    }

    /// Weakens the least recent strong cell, transferring its value to the memory manager.
    pub fn demote_oldest_strong(&mut self) -> Option<CellId> {
        let cell = self.list.oldest_strong()?;
        let released = self.list.demote(cell)?;
        self.manager.retain(cell, released);
        Some(cell)
    }

    /// Strengthens the most recent weak cell, as the least recent strong cell.
    ///
    /// A weak cell found reclaimed (its notification still pending) is evicted and the
    /// next one is tried.
    pub fn promote_newest_weak(&mut self) -> Option<CellId> {
        while let Some(cell) = self.list.newest_weak() {
            if self.list.promote_back(cell) {
                self.manager.forget(cell);
                return Some(cell);
            }
            self.evict(cell);
            self.stats.reclamations += 1;
        }
        None
    }

    /// Hard-evicts the least recent weak cell from the cache entirely.
    pub fn evict_oldest_weak(&mut self) -> Option<CellId> {
        let cell = self.list.oldest_weak()?;
        self.evict(cell);
        self.stats.evictions += 1;
        Some(cell)
    }

    /// Hard-evicts the least recent cell of either strength from the cache entirely.
    pub fn evict_oldest(&mut self) -> Option<CellId> {
        let cell = self.list.oldest()?;
        self.evict(cell);
        self.stats.evictions += 1;
        Some(cell)
    }

    fn evict(&mut self, cell: CellId) {
        let removed = self.list.remove(cell);
        self.map.remove(&removed.key);
        for index in self.indexes.iter_mut() {
            index.remove(cell);
        }
        self.manager.forget(cell);
    }
}

/// The pluggable retention discipline consumed by the primary store.
///
/// Callbacks run after the corresponding structural change has been applied: `on_insert`
/// after the new cell is linked at the head as strong, `on_remove` after the cell has been
/// fully detached (the `cell` handle is informational and no longer resolvable).
pub trait RetentionPolicy<K, V>: fmt::Debug {
    /// Called on a successful `get` and on `put` of a key already present.
    fn on_access(&mut self, ctx: &mut PolicyContext<'_, K, V>, cell: CellId);

    /// Called after a new cell has been added.
    fn on_insert(&mut self, ctx: &mut PolicyContext<'_, K, V>, cell: CellId);

    /// Called after a cell has been removed, including reclaim-driven eviction.
    fn on_remove(&mut self, ctx: &mut PolicyContext<'_, K, V>, cell: CellId, strength: Strength);
}

/// The default fraction-based retention policy with lower and upper clamps.
///
/// On insert, weakens the least recent strong cells until the strong count is down to
/// `len - round(softness * len)` (ties rounded away from zero), clamped to
/// `[min_hard, max_hard]`. On access, strengthens the touched cell and weakens the least
/// recent strong cell only when that breaches `max_hard`. On removal, restores the clamps:
/// the most recent weak cells are promoted while the strong count is below `min_hard`.
/// Weak cells beyond `max_soft` are hard-evicted in access order, oldest first. All
/// parameters are runtime-mutable and take effect on the operations that follow.
#[derive(Clone, Debug, PartialEq)]
pub struct SoftRetentionPolicy {
    softness: f64,
    min_hard: usize,
    max_hard: Option<usize>,
    max_soft: Option<usize>,
}

impl Default for SoftRetentionPolicy {
    /// Creates a new default [`SoftRetentionPolicy`] instance.
    fn default() -> Self {
        Self {
            softness: 0.5,
            min_hard: 2,
            max_hard: None,
            max_soft: None,
        }
    }
}

impl SoftRetentionPolicy {
    /// Creates a new [`SoftRetentionPolicy`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `softness` is outside `[0, 1]`, if `max_hard` is zero, or if
    /// `min_hard` exceeds `max_hard`.
    pub fn new(
        softness: f64,
        min_hard: usize,
        max_hard: Option<usize>,
        max_soft: Option<usize>,
    ) -> anyhow::Result<Self> {
        check_in_range_inclusive_f64(softness, 0.0, 1.0, stringify!(softness))?;
        if let Some(max_hard) = max_hard {
            check_positive_usize(max_hard, stringify!(max_hard))?;
            check_predicate_true(
                min_hard <= max_hard,
                &format!("invalid bounds: 'min_hard' {min_hard} exceeds 'max_hard' {max_hard}"),
            )?;
        }
        Ok(Self {
            softness,
            min_hard,
            max_hard,
            max_soft,
        })
    }

    #[must_use]
    pub const fn softness(&self) -> f64 {
        self.softness
    }

    #[must_use]
    pub const fn min_hard(&self) -> usize {
        self.min_hard
    }

    #[must_use]
    pub const fn max_hard(&self) -> Option<usize> {
        self.max_hard
    }

    #[must_use]
    pub const fn max_soft(&self) -> Option<usize> {
        self.max_soft
    }

    /// Sets the target weak fraction.
    ///
    /// The new value takes effect on the next cache operation.
    ///
    /// # Errors
    ///
    /// Returns an error if `softness` is outside `[0, 1]`.
    pub fn set_softness(&mut self, softness: f64) -> anyhow::Result<()> {
        check_in_range_inclusive_f64(softness, 0.0, 1.0, stringify!(softness))?;
        self.softness = softness;
        Ok(())
    }

    /// Sets the floor on the strong cell count.
    ///
    /// # Errors
    ///
    /// Returns an error if `min_hard` exceeds the current `max_hard`.
    pub fn set_min_hard(&mut self, min_hard: usize) -> anyhow::Result<()> {
        if let Some(max_hard) = self.max_hard {
            check_predicate_true(
                min_hard <= max_hard,
                &format!("invalid bounds: 'min_hard' {min_hard} exceeds 'max_hard' {max_hard}"),
            )?;
        }
        self.min_hard = min_hard;
        Ok(())
    }

    /// Sets the ceiling on the strong cell count (`None` for unbounded).
    ///
    /// # Errors
    ///
    /// Returns an error if `max_hard` is zero or below the current `min_hard`.
    pub fn set_max_hard(&mut self, max_hard: Option<usize>) -> anyhow::Result<()> {
        if let Some(max_hard) = max_hard {
            check_positive_usize(max_hard, stringify!(max_hard))?;
            check_predicate_true(
                self.min_hard <= max_hard,
                &format!(
                    "invalid bounds: 'min_hard' {} exceeds 'max_hard' {max_hard}",
                    self.min_hard
                ),
            )?;
        }
        self.max_hard = max_hard;
        Ok(())
    }

    /// Sets the ceiling on the weak cell count (`None` for unbounded).
    pub fn set_max_soft(&mut self, max_soft: Option<usize>) {
        self.max_soft = max_soft;
    }

    /// Returns the strong cell count the discipline targets for `len` total cells.
    #[must_use]
    pub fn desired_strong(&self, len: usize) -> usize {
        let target_weak = (self.softness * len as f64).round() as usize;
        let mut desired = len.saturating_sub(target_weak).max(self.min_hard);
        if let Some(max_hard) = self.max_hard {
            desired = desired.min(max_hard);
        }
        desired.min(len)
    }

    fn enforce_max_soft<K: Eq + Hash, V>(&self, ctx: &mut PolicyContext<'_, K, V>) {
        if let Some(max_soft) = self.max_soft {
            while ctx.weak_count() > max_soft {
                if ctx.evict_oldest_weak().is_none() {
                    break;
                }
            }
        }
    }
}

impl<K: Eq + Hash, V> RetentionPolicy<K, V> for SoftRetentionPolicy {
    fn on_access(&mut self, ctx: &mut PolicyContext<'_, K, V>, cell: CellId) {
        ctx.touch(cell);
        if ctx.strength(cell) == Strength::Weak && ctx.strengthen_touched(cell) {
            // The touched cell heads the strong chain, so it is never the demotion
            // target and its strength cannot flip twice within one operation
            if let Some(max_hard) = self.max_hard {
                while ctx.strong_count() > max_hard {
                    if ctx.demote_oldest_strong().is_none() {
                        break;
                    }
                }
            }
        }
        self.enforce_max_soft(ctx);
    }

    fn on_insert(&mut self, ctx: &mut PolicyContext<'_, K, V>, _cell: CellId) {
        let desired = self.desired_strong(ctx.len());
        while ctx.strong_count() > desired {
            if ctx.demote_oldest_strong().is_none() {
                break;
            }
        }
        self.enforce_max_soft(ctx);
    }

    fn on_remove(&mut self, ctx: &mut PolicyContext<'_, K, V>, _cell: CellId, strength: Strength) {
        match strength {
            Strength::Strong => {
                while ctx.strong_count() < self.min_hard && ctx.weak_count() > 0 {
                    if ctx.promote_newest_weak().is_none() {
                        break;
                    }
                }
            }
            Strength::Weak => {
                if let Some(max_hard) = self.max_hard {
                    while ctx.strong_count() > max_hard {
                        if ctx.demote_oldest_strong().is_none() {
                            break;
                        }
                    }
                }
            }
        }
        self.enforce_max_soft(ctx);
    }
}

/// A fixed-capacity LRU retention policy.
///
/// Keeps every cell strong and hard-evicts the least recently used cell once the capacity
/// is exceeded. Demonstrates an alternate discipline behind [`RetentionPolicy`]; no cell is
/// ever weakened, so the memory manager retains nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LruRetentionPolicy {
    capacity: usize,
}

impl LruRetentionPolicy {
    /// Creates a new [`LruRetentionPolicy`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn new(capacity: usize) -> anyhow::Result<Self> {
        check_positive_usize(capacity, stringify!(capacity))?;
        Ok(Self { capacity })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K: Eq + Hash, V> RetentionPolicy<K, V> for LruRetentionPolicy {
    fn on_access(&mut self, ctx: &mut PolicyContext<'_, K, V>, cell: CellId) {
        ctx.touch(cell);
    }

    fn on_insert(&mut self, ctx: &mut PolicyContext<'_, K, V>, _cell: CellId) {
        while ctx.len() > self.capacity {
            if ctx.evict_oldest().is_none() {
                break;
            }
        }
    }

    fn on_remove(&mut self, _ctx: &mut PolicyContext<'_, K, V>, _cell: CellId, _strength: Strength) {
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0.5, 2, None, 0, 0)]
    #[case(0.5, 2, None, 1, 1)]
    #[case(0.5, 2, None, 2, 2)]
    #[case(0.5, 2, None, 3, 2)]
    #[case(0.5, 2, None, 4, 2)]
    #[case(0.5, 2, None, 10, 5)]
    #[case(0.0, 0, None, 10, 10)]
    #[case(1.0, 2, None, 10, 2)]
    #[case(1.0, 0, None, 10, 0)]
    #[case(0.5, 0, Some(3), 10, 3)]
    #[case(0.25, 0, None, 10, 7)] // target_weak = round(2.5) = 3
    fn test_desired_strong(
        #[case] softness: f64,
        #[case] min_hard: usize,
        #[case] max_hard: Option<usize>,
        #[case] len: usize,
        #[case] expected: usize,
    ) {
        let policy = SoftRetentionPolicy::new(softness, min_hard, max_hard, None).unwrap();
        assert_eq!(policy.desired_strong(len), expected);
    }

    #[rstest]
    fn test_invalid_softness_rejected() {
        assert!(SoftRetentionPolicy::new(-0.1, 2, None, None).is_err());
        assert!(SoftRetentionPolicy::new(1.1, 2, None, None).is_err());
        assert!(SoftRetentionPolicy::new(f64::NAN, 2, None, None).is_err());
    }

    #[rstest]
    fn test_invalid_bounds_rejected() {
        assert!(SoftRetentionPolicy::new(0.5, 4, Some(2), None).is_err());
        assert!(SoftRetentionPolicy::new(0.5, 0, Some(0), None).is_err());
    }

    #[rstest]
    fn test_runtime_parameter_mutation() {
        let mut policy = SoftRetentionPolicy::default();
        policy.set_softness(0.75).unwrap();
        policy.set_max_hard(Some(8)).unwrap();
        policy.set_min_hard(4).unwrap();
        policy.set_max_soft(Some(16));
        assert_eq!(policy.softness(), 0.75);
        assert_eq!(policy.min_hard(), 4);
        assert_eq!(policy.max_hard(), Some(8));
        assert_eq!(policy.max_soft(), Some(16));

        assert!(policy.set_min_hard(9).is_err());
        assert!(policy.set_max_hard(Some(3)).is_err());
        assert!(policy.set_softness(2.0).is_err());
    }

    #[rstest]
    fn test_lru_policy_requires_positive_capacity() {
        assert!(LruRetentionPolicy::new(0).is_err());
        assert_eq!(LruRetentionPolicy::new(8).unwrap().capacity(), 8);
    }
}
