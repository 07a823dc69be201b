//! How many instances of a SKU cover the requested vCPUs.
//!
//! With a memory floor `m`, a SKU with `memory` GB is treated as able to back
//! at most `floor(memory / m)` vCPUs, so its usable vCPU count is the smaller
//! of that and its actual vCPUs. The instance count is the requested vCPUs
//! divided by usable vCPUs, rounded up. A placement is only offered when the
//! full vCPU count of all instances fits under the family quota.

use std::fmt;

use crate::capability::Candidate;
use crate::catalog::Sku;
use crate::quota::QuotaEntry;

/// A viable way to serve the request with one SKU.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement<'a> {
    pub sku: &'a Sku,
    /// Number of instances
    pub vms: u64,
    /// vCPUs per instance usable under the memory floor
    pub usable_vcpus: u64,
    /// Memory per instance in GB
    pub memory_gb: f64,
    /// vCPUs charged against quota: instances times the SKU's full vCPUs
    pub total_vcpus: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SizingError {
    #[error(
        "usable vCPUs * memory floor ({usable_vcpus} * {memory_floor_gb}) > memory ({memory_gb}) for {sku}"
    )]
    InvariantViolation {
        sku: String,
        usable_vcpus: u64,
        memory_floor_gb: u32,
        memory_gb: f64,
    },
}

/// vCPUs per instance that the memory floor lets us use.
pub fn usable_vcpus(vcpus: u64, memory_gb: f64, memory_floor_gb: u32) -> u64 {
    if memory_floor_gb == 0 {
        return vcpus;
    }
    // Non-negative and finite for catalog values, so the cast only floors.
    let by_memory = (memory_gb / f64::from(memory_floor_gb)).floor() as u64;
    vcpus.min(by_memory)
}

/// Size `candidate` for `requested_vcpus`, or `None` when it cannot serve the
/// request within `quota`.
pub fn size<'a>(
    candidate: &Candidate<'a>,
    requested_vcpus: u32,
    memory_floor_gb: u32,
    quota: &QuotaEntry,
) -> Result<Option<Placement<'a>>, SizingError> {
    let Candidate { sku, spec } = *candidate;
    let vcpus = u64::try_from(spec.vcpus).unwrap_or(0);
    let usable = usable_vcpus(vcpus, spec.memory_gb, memory_floor_gb);
    if usable == 0 {
        tracing::debug!("{}: no usable vCPUs at {memory_floor_gb} GB each", sku.name);
        return Ok(None);
    }

    let vms = u64::from(requested_vcpus).div_ceil(usable);
    let total_vcpus = vms.saturating_mul(vcpus);
    if vms == 0 || !quota.admits(total_vcpus) {
        tracing::debug!(
            "{}: {vms} VMs need {total_vcpus} vCPUs, family limit is {} ({} free)",
            sku.name,
            quota.limit,
            quota.headroom()
        );
        return Ok(None);
    }

    if usable as f64 * f64::from(memory_floor_gb) > spec.memory_gb {
        return Err(SizingError::InvariantViolation {
            sku: sku.name.clone(),
            usable_vcpus: usable,
            memory_floor_gb,
            memory_gb: spec.memory_gb,
        });
    }

    Ok(Some(Placement {
        sku,
        vms,
        usable_vcpus: usable,
        memory_gb: spec.memory_gb,
        total_vcpus,
    }))
}

impl fmt::Display for Placement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{:?}` keeps the fractional part on whole numbers: 16.0, not 16.
        write!(
            f,
            "{} ({}), number of VMs: {}, vCPUs per VM: {}, memory per VM: {:?} GB, requested vCPUs: {}",
            self.sku.name,
            self.sku.tier,
            self.vms,
            self.usable_vcpus,
            self.memory_gb,
            self.total_vcpus
        )
    }
}
