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

//! A two-tier in-memory key/value cache for [NautilusTrader](http://nautilustrader.io).
//!
//! The `softcache` crate provides an in-process cache which keeps a bounded working set of
//! entries *strongly* retained while allowing a larger, elastic set of hot-but-evictable
//! entries to be held *weakly*, so that the host memory manager may reclaim them under
//! pressure. Lookups by one or more derived keys are supported through registered secondary
//! indexes which stay coherent with inserts, removals, and reclaim-driven evictions.
//!
//! The main components are:
//!
//! - [`cache::SoftCache`]: the primary key/value store coordinating all lower components.
//! - [`cache::RetentionPolicy`]: the pluggable discipline deciding which cells are strong and
//!   which are weak, with [`cache::SoftRetentionPolicy`] as the fraction-based default and
//!   [`cache::LruRetentionPolicy`] as a fixed-capacity alternative.
//! - [`cache::MemoryManager`]: the host-side collaborator owning the values of weak cells,
//!   with [`cache::BoundedMemoryManager`] as the default implementation.
//! - [`cache::UniqueIndex`] and [`cache::MultiIndex`]: secondary indexes from derived keys to
//!   one or many cells respectively.
//!
//! The cache is single-threaded by design: values are shared as [`std::rc::Rc`] handles and
//! all public operations execute to completion without yielding. Callers wanting
//! multi-threaded access wrap the cache in their own mutual-exclusion discipline.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cache;
pub mod correctness;
pub mod enums;

pub use cache::{
    BoundedMemoryManager, CacheConfig, CacheError, CacheStats, CellId, IndexHandle,
    LruRetentionPolicy, MemoryManager, PolicyContext, ReclaimQueue, RetentionPolicy, SoftCache,
    SoftRetentionPolicy,
};
pub use enums::Strength;
