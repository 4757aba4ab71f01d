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

//! Enumerations for the cache components.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr};

/// The retention state of a cache cell.
#[repr(C)]
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    FromRepr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Strength {
    /// The cache unconditionally keeps the value reachable.
    Strong = 1,
    /// The host memory manager may reclaim the value; reclaim triggers cache-side eviction.
    Weak = 2,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Strength::Strong, "STRONG")]
    #[case(Strength::Weak, "WEAK")]
    fn test_strength_display(#[case] strength: Strength, #[case] expected: &str) {
        assert_eq!(strength.to_string(), expected);
    }

    #[rstest]
    #[case("STRONG", Strength::Strong)]
    #[case("weak", Strength::Weak)]
    fn test_strength_from_str(#[case] input: &str, #[case] expected: Strength) {
        assert_eq!(Strength::from_str(input).unwrap(), expected);
    }
}
