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

use serde::{Deserialize, Serialize};

use crate::correctness::{
    check_in_range_inclusive_f64, check_positive_usize, check_predicate_true,
};

/// Configuration for `SoftCache` instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// The target fraction of total entries that should be weak, in `[0, 1]`.
    pub softness: f64,
    /// The floor on the strong cell count (clamped to the total entry count when smaller).
    pub min_hard: usize,
    /// The ceiling on the strong cell count, or `None` for unbounded.
    pub max_hard: Option<usize>,
    /// The ceiling on the weak cell count, or `None` for unbounded. Weak cells above the
    /// ceiling are hard-evicted in access order, oldest first.
    pub max_soft: Option<usize>,
    /// The number of weak values the default memory manager retains before it reclaims
    /// the oldest retained value, or `None` for unbounded.
    pub retained_capacity: Option<usize>,
    /// The initial capacity for the primary map and cell arena.
    pub initial_capacity: usize,
}

impl Default for CacheConfig {
    /// Creates a new default [`CacheConfig`] instance.
    fn default() -> Self {
        Self {
            softness: 0.5,
            min_hard: 2,
            max_hard: None,
            max_soft: None,
            retained_capacity: None,
            initial_capacity: 64,
        }
    }
}

impl CacheConfig {
    /// Creates a new [`CacheConfig`] instance.
    #[must_use]
    pub const fn new(
        softness: f64,
        min_hard: usize,
        max_hard: Option<usize>,
        max_soft: Option<usize>,
        retained_capacity: Option<usize>,
        initial_capacity: usize,
    ) -> Self {
        Self {
            softness,
            min_hard,
            max_hard,
            max_soft,
            retained_capacity,
            initial_capacity,
        }
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `softness` is outside `[0, 1]` (or non-finite).
    /// - `max_hard` is zero (a cache holding any entry must be able to hold it strong
    ///   for the duration of the operation that created it).
    /// - `min_hard` exceeds `max_hard`.
    pub fn validate(&self) -> anyhow::Result<()> {
        check_in_range_inclusive_f64(self.softness, 0.0, 1.0, stringify!(softness))?;
        if let Some(max_hard) = self.max_hard {
            check_positive_usize(max_hard, stringify!(max_hard))?;
            check_predicate_true(
                self.min_hard <= max_hard,
                &format!(
                    "invalid bounds: 'min_hard' {} exceeds 'max_hard' {max_hard}",
                    self.min_hard
                ),
            )?;
        }
        Ok(())
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
    fn test_default_config_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.softness, 0.5);
        assert_eq!(config.min_hard, 2);
        assert_eq!(config.max_hard, None);
        assert_eq!(config.max_soft, None);
    }

    #[rstest]
    #[case(-0.5)]
    #[case(1.5)]
    #[case(f64::NAN)]
    fn test_invalid_softness(#[case] softness: f64) {
        let config = CacheConfig {
            softness,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_min_hard_exceeding_max_hard() {
        let config = CacheConfig {
            min_hard: 8,
            max_hard: Some(4),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_zero_max_hard() {
        let config = CacheConfig {
            min_hard: 0,
            max_hard: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_serde_round_trip() {
        let config = CacheConfig::new(0.75, 4, Some(16), Some(128), Some(256), 32);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[rstest]
    fn test_serde_defaults_for_missing_fields() {
        let parsed: CacheConfig = serde_json::from_str("{\"softness\": 0.25}").unwrap();
        assert_eq!(parsed.softness, 0.25);
        assert_eq!(parsed.min_hard, 2);
        assert_eq!(parsed.initial_capacity, 64);
    }
}
