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

//! A two-tier in-memory `SoftCache` with pluggable retention and secondary indexes.
//!
//! The primary store maps caller-supplied keys to cells held in the access-order list's
//! arena. Every public operation first drains the reclaim notification queue, so cells
//! whose values the memory manager has reclaimed are observable as absent from any call
//! made after the draining operation returns. Values are shared out as [`Rc`] handles;
//! callers distinguishing "null" from "absent" choose `V = Option<T>`.

pub mod config;
pub mod error;
pub mod memory;
pub mod policy;

mod cell;
mod index;
mod list;


use std::{fmt, hash::Hash, rc::Rc};

use ahash::AHashMap;
pub use cell::CellId;
pub use config::CacheConfig;
pub use error::CacheError;
pub use index::{IndexHandle, MultiIndex, UniqueIndex};
use index::{IndexInsert, SecondaryIndex};
use list::{AccessIter, AccessList};
pub use memory::{BoundedMemoryManager, MemoryManager, ReclaimQueue};
pub use policy::{LruRetentionPolicy, PolicyContext, RetentionPolicy, SoftRetentionPolicy};

use crate::{cache::cell::NIL, enums::Strength};

/// Running operation counters for a `SoftCache`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups which found a live value.
    pub hits: u64,
    /// Lookups which found no key or a reclaimed value.
    pub misses: u64,
    /// Inserts of new keys.
    pub insertions: u64,
    /// Overwrites of present keys.
    pub updates: u64,
    /// Explicit removals (by key, by derived key, or through a cursor).
    pub removals: u64,
    /// Hard evictions (weak ceiling, unique-index displacement, policy capacity).
    pub evictions: u64,
    /// Cells finalized after their value was reclaimed by the memory manager.
    pub reclamations: u64,
}

impl CacheStats {
    /// Returns the hit rate as a fraction in `[0, 1]`, or 0.0 if no lookups occurred.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A two-tier in-memory key/value cache.
///
/// Entries are held in cells which are either *strong* (unconditionally retained) or *weak*
/// (retained only while the memory manager chooses). The retention policy `P` flips cell
/// strengths as a side effect of every access and mutation; registered secondary indexes
/// allow lookup by derived keys and stay coherent with inserts, removals, and
/// reclaim-driven evictions.
///
/// The cache is single-threaded and not internally synchronized.
///
/// ```
/// use softcache::SoftCache;
///
/// let mut cache: SoftCache<u32, &str> = SoftCache::new(None).unwrap();
/// cache.put(1, "alpha");
/// assert_eq!(cache.get(&1).as_deref(), Some(&"alpha"));
/// ```
pub struct SoftCache<K, V, P = SoftRetentionPolicy> {
    config: CacheConfig,
    map: AHashMap<K, CellId>,
    list: AccessList<K, V>,
    indexes: Vec<Box<dyn SecondaryIndex<V>>>,
    policy: P,
    manager: Box<dyn MemoryManager<V>>,
    queue: ReclaimQueue,
    stats: CacheStats,
}

impl<K, V, P> fmt::Debug for SoftCache<K, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(SoftCache))
            .field("len", &self.list.len())
            .field("strong", &self.list.strong_len())
            .field("weak", &self.list.weak_len())
            .field("indexes", &self.indexes.len())
            .finish()
    }
}

impl<K, V> Default for SoftCache<K, V>
where
    K: Eq + Hash + Clone,
    V: 'static,
{
    /// Creates a new default [`SoftCache`] instance.
    fn default() -> Self {
        Self::new(None).expect("default cache configuration is valid")
    }
}

impl<K, V> SoftCache<K, V>
where
    K: Eq + Hash + Clone,
    V: 'static,
{
    /// Creates a new [`SoftCache`] instance with the default fraction-based retention
    /// policy configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails to validate.
    pub fn new(config: Option<CacheConfig>) -> anyhow::Result<Self> {
        let config = config.unwrap_or_default();
        let policy = SoftRetentionPolicy::new(
            config.softness,
            config.min_hard,
            config.max_hard,
            config.max_soft,
        )?;
        Self::with_policy(Some(config), policy)
    }
}

impl<K, V, P> SoftCache<K, V, P>
where
    K: Eq + Hash + Clone,
    V: 'static,
    P: RetentionPolicy<K, V>,
{
    /// Creates a new [`SoftCache`] instance with the given retention policy and the
    /// default memory manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails to validate.
    pub fn with_policy(config: Option<CacheConfig>, policy: P) -> anyhow::Result<Self> {
        let config = config.unwrap_or_default();
        let manager = BoundedMemoryManager::new(config.retained_capacity);
        Self::with_memory_manager(Some(config), policy, Box::new(manager))
    }

    /// Creates a new [`SoftCache`] instance with the given retention policy and memory
    /// manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails to validate.
    pub fn with_memory_manager(
        config: Option<CacheConfig>,
        policy: P,
        mut manager: Box<dyn MemoryManager<V>>,
    ) -> anyhow::Result<Self> {
        let config = config.unwrap_or_default();
        config.validate()?;
        let queue = ReclaimQueue::new();
        manager.bind(queue.clone());
        Ok(Self {
            map: AHashMap::with_capacity(config.initial_capacity),
            list: AccessList::with_capacity(config.initial_capacity),
            indexes: Vec::new(),
            policy,
            manager,
            queue,
            stats: CacheStats::default(),
            config,
        })
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the retention policy.
    #[must_use]
    pub const fn policy(&self) -> &P {
        &self.policy
    }

    /// Returns the retention policy for runtime parameter mutation.
    ///
    /// Parameter changes take effect on the next cache operation.
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Returns the memory manager, for host-driven reclaim.
    ///
    /// Reclaims performed through this reference are observed by the cache at the start
    /// of its next operation.
    pub fn memory_manager_mut(&mut self) -> &mut dyn MemoryManager<V> {
        self.manager.as_mut()
    }

    /// Returns the operation counters.
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Resets the operation counters.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    // -- QUERIES ---------------------------------------------------------------------------------

    /// Returns the count of live entries.
    pub fn len(&mut self) -> usize {
        self.drain_reclaimed();
        self.list.len()
    }

    /// Returns whether the cache holds no entries.
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Returns the count of strong entries.
    pub fn strong_count(&mut self) -> usize {
        self.drain_reclaimed();
        self.list.strong_len()
    }

    /// Returns the count of weak entries.
    pub fn weak_count(&mut self) -> usize {
        self.drain_reclaimed();
        self.list.weak_len()
    }

    /// Returns the value for `key`, refreshing its recency and retention.
    pub fn get(&mut self, key: &K) -> Option<Rc<V>> {
        self.drain_reclaimed();
        let Some(&cell) = self.map.get(key) else {
            self.stats.misses += 1;
            return None;
        };
        self.access_cell(cell)
    }

    /// Returns the value for `key` without refreshing recency or retention.
    pub fn peek(&mut self, key: &K) -> Option<Rc<V>> {
        self.drain_reclaimed();
        let &cell = self.map.get(key)?;
        self.list.cell(cell).value()
    }

    /// Returns whether `key` maps to a live entry.
    ///
    /// Treated as a non-access: recency is not refreshed.
    pub fn contains_key(&mut self, key: &K) -> bool {
        self.drain_reclaimed();
        self.map
            .get(key)
            .is_some_and(|&cell| !self.list.cell(cell).is_reclaimed())
    }

    /// Returns whether `key` maps to a live entry equal to `value`.
    pub fn contains_entry(&mut self, key: &K, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.drain_reclaimed();
        self.map.get(key).is_some_and(|&cell| {
            self.list
                .cell(cell)
                .value()
                .is_some_and(|live| *live == *value)
        })
    }

    /// Returns the strength of the entry for `key`, or `None` if absent or reclaimed.
    pub fn strength(&mut self, key: &K) -> Option<Strength> {
        self.drain_reclaimed();
        let &cell = self.map.get(key)?;
        let cell = self.list.cell(cell);
        if cell.is_reclaimed() {
            None
        } else {
            Some(cell.strength())
        }
    }

    /// Returns whether the entry for `key` is weak, or `None` if absent or reclaimed.
    pub fn is_weak(&mut self, key: &K) -> Option<bool> {
        self.strength(key).map(|strength| strength == Strength::Weak)
    }

    // -- COMMANDS --------------------------------------------------------------------------------

    /// Inserts or overwrites the entry for `key`, returning the previous value if any.
    ///
    /// A new entry is created strong at the head of the access list; an overwrite keeps
    /// the cell in place, refreshes it as an access, and re-installs it in every
    /// registered index. Overwriting a key whose weak cell has been reclaimed behaves as
    /// a new insert.
    pub fn put(&mut self, key: K, value: V) -> Option<Rc<V>> {
        self.drain_reclaimed();
        if let Some(&cell) = self.map.get(&key) {
            if !self.list.cell(cell).is_reclaimed() {
                return self.update(cell, value);
            }
            // Reclaimed with the notification still pending: finalize, then insert fresh
            self.evict_cell(cell);
            self.stats.reclamations += 1;
            self.notify_remove(cell, Strength::Weak);
        }
        self.insert(key, value);
        None
    }

    /// Removes the entry for `key`, returning its value if still retained.
    pub fn remove(&mut self, key: &K) -> Option<Rc<V>> {
        self.drain_reclaimed();
        let Some(&cell) = self.map.get(key) else {
            return None;
        };
        self.remove_cell(cell)
    }

    /// Drops all entries and empties all indexes.
    pub fn clear(&mut self) {
        log::debug!("Clearing cache");
        self.map.clear();
        self.list.clear();
        for index in self.indexes.iter_mut() {
            index.clear();
        }
        self.manager.clear();
        self.queue.clear();
    }

    /// Drops every weak entry from the cache and updates all indexes.
    ///
    /// This is the externally observable equivalent of a full memory-pressure reclaim:
    /// every currently weak cell is dropped, even if its value is still reachable through
    /// handles held by callers.
    pub fn clear_weak(&mut self) {
        self.drain_reclaimed();
        let mut dropped = Vec::new();
        while let Some(cell) = self.list.oldest_weak() {
            self.evict_cell(cell);
            dropped.push(cell);
        }
        log::debug!("Cleared {} weak cell(s)", dropped.len());
        self.stats.evictions += dropped.len() as u64;
        // Notify after the sweep so the policy cannot strengthen cells scheduled to drop
        for cell in dropped {
            self.notify_remove(cell, Strength::Weak);
        }
    }

    // -- INDEXES ---------------------------------------------------------------------------------

    /// Registers a unique (one-to-one) secondary index over `attribute`, indexing all
    /// live entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AttributeConflict`] if two live entries map to the same
    /// derived key; no index is registered in that case.
    pub fn register_unique_index<D>(
        &mut self,
        attribute: impl Fn(&V) -> Option<D> + 'static,
    ) -> Result<IndexHandle<D>, CacheError>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.drain_reclaimed();
        let mut index = UniqueIndex::new(Box::new(attribute));
        for cell in self.cells_oldest_first() {
            let Some(value) = self.list.cell(cell).value() else {
                continue;
            };
            if let Some(derived) = index.derive(&value) {
                if let Some(existing) = index.cell_for(&derived) {
                    return Err(CacheError::AttributeConflict(format!(
                        "derived key {derived:?} maps both cell {existing} and cell {cell}"
                    )));
                }
                index.insert(cell, &value);
            }
        }
        let slot = self.indexes.len();
        self.indexes.push(Box::new(index));
        log::debug!("Registered unique index at slot {slot}");
        Ok(IndexHandle::new(slot))
    }

    /// Registers a multi (one-to-many) secondary index over `attribute`, indexing all
    /// live entries.
    pub fn register_multi_index<D>(
        &mut self,
        attribute: impl Fn(&V) -> Option<D> + 'static,
    ) -> IndexHandle<D>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.drain_reclaimed();
        let mut index = MultiIndex::new(Box::new(attribute));
        for cell in self.cells_oldest_first() {
            if let Some(value) = self.list.cell(cell).value() {
                index.insert(cell, &value);
            }
        }
        let slot = self.indexes.len();
        self.indexes.push(Box::new(index));
        log::debug!("Registered multi index at slot {slot}");
        IndexHandle::new(slot)
    }

    /// Returns the value under `derived` in a unique index, through the same
    /// policy-notifying path as [`Self::get`].
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not produced by this cache's [`Self::register_unique_index`].
    pub fn get_by<D>(&mut self, handle: &IndexHandle<D>, derived: &D) -> Option<Rc<V>>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.drain_reclaimed();
        let Some(cell) = self.unique_index(handle).cell_for(derived) else {
            self.stats.misses += 1;
            return None;
        };
        self.access_cell(cell)
    }

    /// Returns the values under `derived` in a multi index, in bucket order, each through
    /// the same policy-notifying path as [`Self::get`].
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not produced by this cache's [`Self::register_multi_index`].
    pub fn get_all_by<D>(&mut self, handle: &IndexHandle<D>, derived: &D) -> Vec<Rc<V>>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.drain_reclaimed();
        let cells = self.multi_index(handle).cells_for(derived);
        let mut values = Vec::with_capacity(cells.len());
        for cell in cells {
            // The policy may evict later bucket members while earlier ones are accessed
            if !self.list.is_occupied(cell) {
                continue;
            }
            if let Some(value) = self.access_cell(cell) {
                values.push(value);
            }
        }
        values
    }

    /// Removes the entry under `derived` in a unique index from the cache entirely,
    /// returning its value if still retained.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not produced by this cache's [`Self::register_unique_index`].
    pub fn remove_by<D>(&mut self, handle: &IndexHandle<D>, derived: &D) -> Option<Rc<V>>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.drain_reclaimed();
        let cell = self.unique_index(handle).cell_for(derived)?;
        self.remove_cell(cell)
    }

    /// Removes every entry under `derived` in a multi index from the cache entirely,
    /// returning the values still retained.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not produced by this cache's [`Self::register_multi_index`].
    pub fn remove_all_by<D>(&mut self, handle: &IndexHandle<D>, derived: &D) -> Vec<Rc<V>>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.drain_reclaimed();
        let cells = self.multi_index(handle).cells_for(derived);
        let mut values = Vec::with_capacity(cells.len());
        for cell in cells {
            if !self.list.is_occupied(cell) {
                continue;
            }
            if let Some(value) = self.remove_cell(cell) {
                values.push(value);
            }
        }
        values
    }

    // -- VIEWS -----------------------------------------------------------------------------------

    /// Iterates keys in access order, most recent first.
    pub fn keys(&mut self) -> Keys<'_, K, V> {
        self.drain_reclaimed();
        Keys {
            iter: self.list.iter(),
        }
    }

    /// Iterates values in access order, most recent first, silently skipping entries
    /// whose values can no longer be reached.
    pub fn values(&mut self) -> Values<'_, K, V> {
        self.drain_reclaimed();
        Values {
            iter: self.list.iter(),
        }
    }

    /// Iterates entries in access order, most recent first, silently skipping entries
    /// whose values can no longer be reached.
    pub fn iter(&mut self) -> Iter<'_, K, V> {
        self.drain_reclaimed();
        Iter {
            iter: self.list.iter(),
        }
    }

    /// Returns a stepping cursor over the entries in access order which supports removal
    /// of the current entry.
    pub fn cursor(&mut self) -> Cursor<'_, K, V, P> {
        self.drain_reclaimed();
        let next = self.list.newest().map_or(NIL, |cell| cell.0);
        Cursor {
            cache: self,
            next,
            current: NIL,
        }
    }

    // -- DIAGNOSTICS -----------------------------------------------------------------------------

    /// Checks integrity of the cache's internal structures.
    ///
    /// If an error is found then a log error message will also be produced.
    #[must_use]
    pub fn check_integrity(&mut self) -> bool {
        self.drain_reclaimed();
        let mut error_count = 0;
        let failure = "Integrity failure";

        if self.map.len() != self.list.len() {
            log::error!(
                "{failure}: map len {} != list len {}",
                self.map.len(),
                self.list.len()
            );
            error_count += 1;
        }

        let mut walked = 0;
        let mut strong = 0;
        let mut weak = 0;
        for (cell, entry) in self.list.iter() {
            walked += 1;
            match entry.strength() {
                Strength::Strong => strong += 1,
                Strength::Weak => weak += 1,
            }
            if self.map.get(&entry.key) != Some(&cell) {
                log::error!("{failure}: cell {cell} not mapped to its key");
                error_count += 1;
            }
        }
        if walked != self.list.len() {
            log::error!(
                "{failure}: walked {walked} cells, expected {}",
                self.list.len()
            );
            error_count += 1;
        }
        if strong != self.list.strong_len() {
            log::error!(
                "{failure}: counted {strong} strong cells, expected {}",
                self.list.strong_len()
            );
            error_count += 1;
        }
        if weak != self.list.weak_len() {
            log::error!(
                "{failure}: counted {weak} weak cells, expected {}",
                self.list.weak_len()
            );
            error_count += 1;
        }

        for (slot, index) in self.indexes.iter().enumerate() {
            if !index.verify() {
                log::error!("{failure}: index {slot} forward/reverse maps are incoherent");
                error_count += 1;
            }
            for cell in index.member_cells() {
                if !self.list.is_occupied(cell) {
                    log::error!("{failure}: index {slot} references dead cell {cell}");
                    error_count += 1;
                }
            }
        }

        error_count == 0
    }

    // -- INTERNAL --------------------------------------------------------------------------------

    /// Drains the reclaim notification queue, finalizing the eviction of reclaimed cells.
    fn drain_reclaimed(&mut self) -> usize {
        let mut drained = 0;
        while let Some(cell) = self.queue.pop() {
            // Evictions during the drain may have already vacated the slot
            if !self.list.is_occupied(cell) {
                continue;
            }
            if !self.list.cell(cell).is_reclaimed() {
                continue;
            }
            self.evict_cell(cell);
            self.stats.reclamations += 1;
            drained += 1;
            self.notify_remove(cell, Strength::Weak);
        }
        if drained > 0 {
            log::trace!("Drained {drained} reclaimed cell(s)");
        }
        drained
    }

    /// Accesses a live cell: reads its value, refreshes recency and retention.
    fn access_cell(&mut self, cell: CellId) -> Option<Rc<V>> {
        match self.list.cell(cell).value() {
            Some(value) => {
                self.notify_access(cell);
                self.stats.hits += 1;
                Some(value)
            }
            None => {
                // Reclaimed with the notification still pending
                self.evict_cell(cell);
                self.stats.reclamations += 1;
                self.notify_remove(cell, Strength::Weak);
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Overwrites the value of a live cell in place.
    fn update(&mut self, cell: CellId, value: V) -> Option<Rc<V>> {
        let value = Rc::new(value);
        let previous = {
            let entry = self.list.cell_mut(cell);
            let previous = entry.value();
            entry.replace_value(value.clone());
            previous
        };
        if self.list.cell(cell).strength() == Strength::Weak {
            // The manager owns weak values; swap the retained value for the new one
            self.manager.forget(cell);
            self.manager.retain(cell, value.clone());
        }
        self.reindex(cell, &value);
        self.notify_access(cell);
        self.stats.updates += 1;
        previous
    }

    /// Inserts a fresh cell for `key`, strong at the head of the access list.
    fn insert(&mut self, key: K, value: V) {
        let value = Rc::new(value);
        let cell = self.list.insert_head(key.clone(), value.clone());
        self.map.insert(key, cell);
        let mut displaced = Vec::new();
        for index in self.indexes.iter_mut() {
            if let IndexInsert::Displaced(previous) = index.insert(cell, &value) {
                displaced.push(previous);
            }
        }
        self.invalidate_displaced(displaced);
        self.notify_insert(cell);
        self.stats.insertions += 1;
    }

    /// Re-installs a cell in every index after its value changed.
    fn reindex(&mut self, cell: CellId, value: &V) {
        let mut displaced = Vec::new();
        for index in self.indexes.iter_mut() {
            index.remove(cell);
            if let IndexInsert::Displaced(previous) = index.insert(cell, value) {
                displaced.push(previous);
            }
        }
        self.invalidate_displaced(displaced);
    }

    /// Invalidates cells displaced from a unique index bucket.
    fn invalidate_displaced(&mut self, displaced: Vec<CellId>) {
        for cell in displaced {
            if !self.list.is_occupied(cell) {
                continue;
            }
            let strength = self.list.cell(cell).strength();
            self.evict_cell(cell);
            self.stats.evictions += 1;
            self.notify_remove(cell, strength);
        }
    }

    /// Removes a live cell on behalf of the caller, returning its value if retained.
    fn remove_cell(&mut self, cell: CellId) -> Option<Rc<V>> {
        let entry = self.list.cell(cell);
        let strength = entry.strength();
        let previous = entry.value();
        self.evict_cell(cell);
        if previous.is_some() {
            self.stats.removals += 1;
        } else {
            self.stats.reclamations += 1;
        }
        self.notify_remove(cell, strength);
        previous
    }

    /// Detaches a cell from the primary map, the access list, every index, and the
    /// memory manager.
    fn evict_cell(&mut self, cell: CellId) {
        let removed = self.list.remove(cell);
        self.map.remove(&removed.key);
        for index in self.indexes.iter_mut() {
            index.remove(cell);
        }
        self.manager.forget(cell);
    }

    fn cells_oldest_first(&self) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self.list.iter().map(|(cell, _)| cell).collect();
        cells.reverse();
        cells
    }

    fn unique_index<D>(&self, handle: &IndexHandle<D>) -> &UniqueIndex<V, D>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.indexes[handle.slot]
            .as_any()
            .downcast_ref::<UniqueIndex<V, D>>()
            .expect("index handle does not match a unique index of this cache")
    }

    fn multi_index<D>(&self, handle: &IndexHandle<D>) -> &MultiIndex<V, D>
    where
        D: Clone + Eq + Hash + fmt::Debug + 'static,
    {
        self.indexes[handle.slot]
            .as_any()
            .downcast_ref::<MultiIndex<V, D>>()
            .expect("index handle does not match a multi index of this cache")
    }

    fn notify_access(&mut self, cell: CellId) {
        let Self {
            list,
            map,
            indexes,
            manager,
            stats,
            policy,
            ..
        } = self;
        let mut ctx = PolicyContext {
            list,
            map,
            indexes,
            manager: manager.as_mut(),
            stats,
        };
        policy.on_access(&mut ctx, cell);
    }

    fn notify_insert(&mut self, cell: CellId) {
        let Self {
            list,
            map,
            indexes,
            manager,
            stats,
            policy,
            ..
        } = self;
        let mut ctx = PolicyContext {
            list,
            map,
            indexes,
            manager: manager.as_mut(),
            stats,
        };
        policy.on_insert(&mut ctx, cell);
    }

    fn notify_remove(&mut self, cell: CellId, strength: Strength) {
        let Self {
            list,
            map,
            indexes,
            manager,
            stats,
            policy,
            ..
        } = self;
        let mut ctx = PolicyContext {
            list,
            map,
            indexes,
            manager: manager.as_mut(),
            stats,
        };
        policy.on_remove(&mut ctx, cell, strength);
    }
}

/// Iterator over cache keys in access order.
#[derive(Debug)]
pub struct Keys<'a, K, V> {
    iter: AccessIter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(_, cell)| &cell.key)
    }
}

/// Iterator over cache values in access order.
#[derive(Debug)]
pub struct Values<'a, K, V> {
    iter: AccessIter<'a, K, V>,
}

impl<K, V> Iterator for Values<'_, K, V> {
    type Item = Rc<V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, cell) = self.iter.next()?;
            if let Some(value) = cell.value() {
                return Some(value);
            }
        }
    }
}

/// Iterator over cache entries in access order.
#[derive(Debug)]
pub struct Iter<'a, K, V> {
    iter: AccessIter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, Rc<V>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, cell) = self.iter.next()?;
            if let Some(value) = cell.value() {
                return Some((&cell.key, value));
            }
        }
    }
}

/// A stepping view over cache entries in access order supporting removal.
///
/// Structural changes made by the cache itself (reclaim drain before iteration, policy
/// strength flips during removal) do not invalidate the cursor; any other mutation is
/// prevented by the borrow for the cursor's lifetime.
#[derive(Debug)]
pub struct Cursor<'a, K, V, P = SoftRetentionPolicy> {
    cache: &'a mut SoftCache<K, V, P>,
    next: usize,
    current: usize,
}

impl<K, V, P> Cursor<'_, K, V, P>
where
    K: Eq + Hash + Clone,
    V: 'static,
    P: RetentionPolicy<K, V>,
{
    /// Steps to the next entry, returning its value.
    ///
    /// Entries whose values can no longer be reached are skipped silently.
    pub fn advance(&mut self) -> Option<Rc<V>> {
        self.current = NIL;
        loop {
            if self.next == NIL {
                return None;
            }
            // A policy may only hard-evict the least recent cell during a removal, so a
            // vacated successor means the remainder of the chain is gone
            if !self.cache.list.is_occupied(CellId(self.next)) {
                self.next = NIL;
                return None;
            }
            let ix = self.next;
            let cell = self.cache.list.cell(CellId(ix));
            self.next = cell.next;
            if let Some(value) = cell.value() {
                self.current = ix;
                return Some(value);
            }
        }
    }

    /// Returns the key of the current entry, if positioned on one.
    pub fn key(&self) -> Option<&K> {
        if self.current == NIL {
            None
        } else {
            Some(&self.cache.list.cell(CellId(self.current)).key)
        }
    }

    /// Removes the current entry from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidCursorState`] if called before a successful step,
    /// after a skip or exhaustion, or twice for the same step.
    pub fn remove_current(&mut self) -> Result<(), CacheError> {
        if self.current == NIL {
            return Err(CacheError::InvalidCursorState(
                "remove requires a successful step and may run once per step",
            ));
        }
        let cell = CellId(self.current);
        self.current = NIL;
        let strength = self.cache.list.cell(cell).strength();
        self.cache.evict_cell(cell);
        self.cache.stats.removals += 1;
        self.cache.notify_remove(cell, strength);
        Ok(())
    }
}
