// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Subscription tier catalog.
//!
//! The tier set is closed: adding a tier is a code change and a release.
//! `-1` denotes an unlimited quota.

use serde::{Deserialize, Serialize};

/// Quota sentinel for "no limit".
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Premium,
    Enterprise,
}

/// Per-tier quotas and feature grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// API calls per trailing hour.
    pub per_hour: i64,
    /// API calls per trailing day.
    pub per_day: i64,
    /// API calls per trailing 30 days.
    pub per_month: i64,
    /// Stored journal entries. `0` means no persistence at all.
    pub journal_entries: i64,
    pub storage_mb: i64,
    pub features: &'static [&'static str],
}

const FREE_FEATURES: &[&str] = &["portfolio_view", "price_check", "basic_analysis"];

const STARTER_FEATURES: &[&str] = &[
    "portfolio_view",
    "price_check",
    "basic_analysis",
    "journal_persistence",
    "historical_analysis",
];

const PREMIUM_FEATURES: &[&str] = &[
    "portfolio_view",
    "price_check",
    "basic_analysis",
    "journal_persistence",
    "historical_analysis",
    "performance_metrics",
    "risk_analysis",
    "advanced_charts",
    "export_data",
    "custom_alerts",
];

const ENTERPRISE_FEATURES: &[&str] = &[
    "portfolio_view",
    "price_check",
    "basic_analysis",
    "journal_persistence",
    "historical_analysis",
    "performance_metrics",
    "risk_analysis",
    "advanced_charts",
    "export_data",
    "custom_alerts",
    "api_access",
    "bulk_operations",
    "priority_support",
];

impl Tier {
    pub fn limits(self) -> TierLimits {
        match self {
            Tier::Free => TierLimits {
                per_hour: 60,
                per_day: 1_000,
                per_month: 20_000,
                journal_entries: 0,
                storage_mb: 0,
                features: FREE_FEATURES,
            },
            Tier::Starter => TierLimits {
                per_hour: 300,
                per_day: 5_000,
                per_month: 100_000,
                journal_entries: 100,
                storage_mb: 50,
                features: STARTER_FEATURES,
            },
            Tier::Premium => TierLimits {
                per_hour: 1_000,
                per_day: 20_000,
                per_month: 500_000,
                journal_entries: UNLIMITED,
                storage_mb: 1_000,
                features: PREMIUM_FEATURES,
            },
            Tier::Enterprise => TierLimits {
                per_hour: UNLIMITED,
                per_day: UNLIMITED,
                per_month: UNLIMITED,
                journal_entries: UNLIMITED,
                storage_mb: UNLIMITED,
                features: ENTERPRISE_FEATURES,
            },
        }
    }

    pub fn has_feature(self, feature: &str) -> bool {
        self.limits().features.contains(&feature)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Parse a tier name. `basic` is accepted as a legacy alias for starter.
    pub fn parse(s: &str) -> Option<Tier> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Tier::Free),
            "starter" | "basic" => Some(Tier::Starter),
            "premium" => Some(Tier::Premium),
            "enterprise" => Some(Tier::Enterprise),
            _ => None,
        }
    }
}

impl TierLimits {
    /// True when every rate window is unlimited.
    pub fn is_unmetered(&self) -> bool {
        self.per_hour == UNLIMITED && self.per_day == UNLIMITED && self.per_month == UNLIMITED
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_monotonic_across_tiers() {
        let free = Tier::Free.limits();
        let starter = Tier::Starter.limits();
        let premium = Tier::Premium.limits();
        assert!(free.per_hour < starter.per_hour);
        assert!(starter.per_hour < premium.per_hour);
        assert!(Tier::Enterprise.limits().is_unmetered());
        assert!(!premium.is_unmetered());
    }

    #[test]
    fn feature_grants() {
        assert!(Tier::Free.has_feature("price_check"));
        assert!(!Tier::Free.has_feature("journal_persistence"));
        assert!(Tier::Starter.has_feature("journal_persistence"));
        assert!(Tier::Enterprise.has_feature("api_access"));
        assert!(!Tier::Premium.has_feature("api_access"));
    }

    #[test]
    fn parse_accepts_legacy_alias() {
        assert_eq!(Tier::parse("basic"), Some(Tier::Starter));
        assert_eq!(Tier::parse(" Premium "), Some(Tier::Premium));
        assert_eq!(Tier::parse("gold"), None);
    }
}
