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

use std::{
    fmt::{Display, Formatter},
    rc::{Rc, Weak},
};

use crate::enums::Strength;

/// Sentinel for absent links in the intrusive chains.
pub(crate) const NIL: usize = usize::MAX;

/// A stable handle to a cell slot within a cache's arena.
///
/// Handles are only meaningful for the cache instance that produced them.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CellId(pub(crate) usize);

impl Display for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The cache's internal holder for one value.
///
/// A cell owns its value through the strong slot while [`Strength::Strong`], and through the
/// revivable weak handle only while [`Strength::Weak`] (the memory manager then owns the
/// sole [`Rc`]). The intrusive links thread the cell into the access-order chain and into
/// the chain for its current strength.
pub(crate) struct Cell<K, V> {
    pub(crate) key: K,
    strong: Option<Rc<V>>,
    handle: Weak<V>,
    /// Main access-order chain, most-recent first.
    pub(crate) prev: usize,
    pub(crate) next: usize,
    /// Strength chain for the cell's current strength, most-recent first.
    pub(crate) chain_prev: usize,
    pub(crate) chain_next: usize,
}

impl<K, V> Cell<K, V> {
    /// Creates a new strong [`Cell`] instance holding `value`.
    pub fn new(key: K, value: Rc<V>) -> Self {
        Self {
            key,
            handle: Rc::downgrade(&value),
            strong: Some(value),
            prev: NIL,
            next: NIL,
            chain_prev: NIL,
            chain_next: NIL,
        }
    }

    /// Returns the current strength of the cell.
    pub fn strength(&self) -> Strength {
        if self.strong.is_some() {
            Strength::Strong
        } else {
            Strength::Weak
        }
    }

    /// Returns the value if still retained.
    ///
    /// Always present for a strong cell; present for a weak cell iff not reclaimed.
    pub fn value(&self) -> Option<Rc<V>> {
        self.strong.clone().or_else(|| self.handle.upgrade())
    }

    /// Returns whether the cell was weakened and its value has since been reclaimed.
    pub fn is_reclaimed(&self) -> bool {
        self.strong.is_none() && self.handle.strong_count() == 0
    }

    /// Releases the strong slot, leaving only the weak handle.
    ///
    /// Returns the released [`Rc`] for transfer to the memory manager. No-op returning
    /// `None` if the cell is already weak.
    pub fn release_strong(&mut self) -> Option<Rc<V>> {
        self.strong.take()
    }

    /// Restores the strong slot by reviving the weak handle.
    ///
    /// Fails silently (treated as reclaimed) returning `false` if the value is gone.
    /// No-op returning `true` if the cell is already strong.
    pub fn restore_strong(&mut self) -> bool {
        if self.strong.is_some() {
            return true;
        }
        match self.handle.upgrade() {
            Some(value) => {
                self.strong = Some(value);
                true
            }
            None => false,
        }
    }

    /// Replaces the cell's value, preserving the current strength.
    ///
    /// For a weak cell the caller transfers the returned previous strength state to the
    /// memory manager and retains the new value there instead.
    pub fn replace_value(&mut self, value: Rc<V>) {
        self.handle = Rc::downgrade(&value);
        if self.strong.is_some() {
            self.strong = Some(value);
        }
        // A weak cell keeps only the handle; the caller retains `value` in the manager
    }
}

impl<K: std::fmt::Debug, V> std::fmt::Debug for Cell<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("key", &self.key)
            .field("strength", &self.strength())
            .field("reclaimed", &self.is_reclaimed())
            .finish()
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
    fn test_new_cell_is_strong() {
        let cell = Cell::new(1u32, Rc::new("a".to_string()));
        assert_eq!(cell.strength(), Strength::Strong);
        assert!(!cell.is_reclaimed());
        assert_eq!(cell.value().as_deref(), Some(&"a".to_string()));
    }

    #[rstest]
    fn test_release_and_restore_strong() {
        let mut cell = Cell::new(1u32, Rc::new("a".to_string()));
        let released = cell.release_strong().unwrap();
        assert_eq!(cell.strength(), Strength::Weak);
        assert!(!cell.is_reclaimed());
        assert!(cell.value().is_some());

        assert!(cell.restore_strong());
        assert_eq!(cell.strength(), Strength::Strong);
        drop(released);
        assert_eq!(cell.value().as_deref(), Some(&"a".to_string()));
    }

    #[rstest]
    fn test_weak_cell_reclaimed_when_value_dropped() {
        let mut cell = Cell::new(1u32, Rc::new("a".to_string()));
        let released = cell.release_strong().unwrap();
        drop(released);

        assert!(cell.is_reclaimed());
        assert!(cell.value().is_none());
        assert!(!cell.restore_strong());
        assert_eq!(cell.strength(), Strength::Weak);
    }

    #[rstest]
    fn test_release_strong_is_noop_when_weak() {
        let mut cell = Cell::new(1u32, Rc::new("a".to_string()));
        let _retained = cell.release_strong().unwrap();
        assert!(cell.release_strong().is_none());
    }

    #[rstest]
    fn test_replace_value_preserves_strength() {
        let mut cell = Cell::new(1u32, Rc::new("a".to_string()));
        cell.replace_value(Rc::new("b".to_string()));
        assert_eq!(cell.strength(), Strength::Strong);
        assert_eq!(cell.value().as_deref(), Some(&"b".to_string()));
    }
}
