//! One pass from the two source documents to a list of viable placements.

use std::io::Write;

use color_eyre::eyre::{Context, Result};

use crate::capability;
use crate::catalog::{Sku, UsageEntry};
use crate::provider::CatalogProvider;
use crate::quota::QuotaTable;
use crate::sizing::{self, Placement};

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Total vCPUs to provision, at least 1
    pub vcpu: u32,
    /// Memory floor in GB. Applied to a SKU's total memory when filtering and
    /// as GB-per-usable-vCPU when sizing.
    pub memory_gb: u32,
    /// Region passed to the catalog provider
    pub location: String,
}

/// Source documents for one region.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub skus: Vec<Sku>,
    pub usage: Vec<UsageEntry>,
}

impl Inputs {
    pub fn load(provider: &dyn CatalogProvider, location: &str) -> Result<Self> {
        let skus = provider.fetch_skus(location).context("Loading SKU list")?;
        let usage = provider
            .fetch_usage(location)
            .context("Loading usage list")?;
        tracing::debug!(
            "Loaded {} SKUs and {} usage entries for {location}",
            skus.len(),
            usage.len()
        );
        Ok(Self { skus, usage })
    }
}

/// The request cannot be met in this region at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Infeasible {
    #[error("Total vCPUs in region ({limit}) is less than requested vCPUs ({requested})")]
    InsufficientRegionalCores { limit: i64, requested: u32 },
    #[error("No SKUs found with vCPU limit less than or equal to {requested}")]
    NoQualifyingFamilies { requested: u32 },
}

/// Result of a successful pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice<'a> {
    pub vcpu: u32,
    pub memory_gb: u32,
    /// Families whose limit covers the request
    pub families: Vec<&'a str>,
    /// SKUs passing the capability filter
    pub candidates: usize,
    pub placements: Vec<Placement<'a>>,
}

/// Run the quota, capability and sizing stages over `inputs`.
///
/// The outer error is fatal (malformed data or a broken invariant); the inner
/// one means the region cannot serve the request.
pub fn evaluate<'a>(
    inputs: &'a Inputs,
    table: &'a QuotaTable,
    request: &Request,
) -> Result<Result<Advice<'a>, Infeasible>> {
    let cores = table.regional_cores()?;
    if !cores.admits(request.vcpu.into()) {
        return Ok(Err(Infeasible::InsufficientRegionalCores {
            limit: cores.limit,
            requested: request.vcpu,
        }));
    }

    let families = table.families_with_limit(request.vcpu);
    if families.is_empty() {
        return Ok(Err(Infeasible::NoQualifyingFamilies {
            requested: request.vcpu,
        }));
    }

    let candidates = capability::select(&families, &inputs.skus, request.memory_gb)?;

    let mut placements = Vec::new();
    for candidate in &candidates {
        let family = candidate.sku.family.as_deref().unwrap_or_default();
        let quota = table.require(family)?;
        if let Some(p) = sizing::size(candidate, request.vcpu, request.memory_gb, quota)? {
            placements.push(p);
        }
    }

    Ok(Ok(Advice {
        vcpu: request.vcpu,
        memory_gb: request.memory_gb,
        families,
        candidates: candidates.len(),
        placements,
    }))
}

impl Advice<'_> {
    /// Write the human-readable report.
    pub fn write_report(&self, mut w: impl Write) -> std::io::Result<()> {
        writeln!(
            w,
            "-- Found {} SKU families with vCPU limit >= {}",
            self.families.len(),
            self.vcpu
        )?;
        writeln!(
            w,
            "-- Found {} SKUs with vCPU >= 1 and memory >= {} GB in those families",
            self.candidates, self.memory_gb
        )?;
        for p in &self.placements {
            writeln!(w, "{p}")?;
        }
        Ok(())
    }
}
