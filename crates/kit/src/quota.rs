//! Per-family vCPU quota table.

use std::collections::HashMap;

use crate::catalog::UsageEntry;

/// Usage key holding the region-wide vCPU limit.
pub const REGIONAL_CORES: &str = "cores";

/// Limit and consumption of one quota family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaEntry {
    pub limit: i64,
    pub current_value: i64,
}

impl QuotaEntry {
    /// Whether `vcpus` in total fit under the limit.
    pub fn admits(&self, vcpus: u64) -> bool {
        i64::try_from(vcpus).is_ok_and(|v| v <= self.limit)
    }

    /// vCPUs not yet consumed.
    pub fn headroom(&self) -> i64 {
        self.limit.saturating_sub(self.current_value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("usage list has no \"{REGIONAL_CORES}\" entry for the regional vCPU limit")]
    MissingCores,
    #[error("usage list has no entry for family {0}")]
    MissingFamily(String),
}

/// Family name to quota, remembering the order families were first seen.
#[derive(Debug, Clone, Default)]
pub struct QuotaTable {
    order: Vec<String>,
    entries: HashMap<String, QuotaEntry>,
}

impl QuotaTable {
    pub fn new(usage: &[UsageEntry]) -> Self {
        let mut table = Self::default();
        for u in usage {
            let entry = QuotaEntry {
                limit: u.limit,
                current_value: u.current_value,
            };
            if table.entries.insert(u.name.value.clone(), entry).is_none() {
                table.order.push(u.name.value.clone());
            }
        }
        table
    }

    pub fn get(&self, family: &str) -> Option<&QuotaEntry> {
        self.entries.get(family)
    }

    /// Like [`Self::get`], for callers that require the family to exist.
    pub fn require(&self, family: &str) -> Result<&QuotaEntry, QuotaError> {
        self.get(family)
            .ok_or_else(|| QuotaError::MissingFamily(family.to_owned()))
    }

    /// The region-wide limit entry.
    pub fn regional_cores(&self) -> Result<&QuotaEntry, QuotaError> {
        self.get(REGIONAL_CORES).ok_or(QuotaError::MissingCores)
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuotaEntry)> {
        self.order
            .iter()
            .map(|name| (name.as_str(), &self.entries[name]))
    }

    /// Families whose limit is at least `vcpus`, in first-seen order.
    pub fn families_with_limit(&self, vcpus: u32) -> Vec<&str> {
        self.iter()
            .filter(|(_, q)| q.admits(vcpus.into()))
            .map(|(name, _)| name)
            .collect()
    }
}
