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

//! Error types produced by cache operations.

use thiserror::Error;

/// A typed error enumeration for the cache.
///
/// Missing keys, missing derived keys, and reclaimed values are not errors; they are
/// surfaced as `None` in return types. An erroring operation never leaves the cache
/// partially mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A cursor mutator was called in a state where it is not permitted.
    #[error("Invalid cursor state: {0}")]
    InvalidCursorState(&'static str),
    /// Registering a unique index found two live cells with the same derived key.
    #[error("Attribute conflict on unique index: {0}")]
    AttributeConflict(String),
}
