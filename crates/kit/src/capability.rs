//! Selecting SKUs from qualifying families by their capabilities.

use crate::catalog::{CapabilityError, Sku, SkuSpec};

/// A SKU that passed the capability filter, with its parsed spec.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub sku: &'a Sku,
    pub spec: SkuSpec,
}

/// Keep SKUs from `families` with at least one vCPU and at least
/// `memory_floor_gb` of memory.
///
/// Results are grouped by family in the order of `families`, and within a
/// family follow catalog order. Only SKUs of those families are parsed, so a
/// malformed SKU elsewhere in the catalog goes unnoticed.
pub fn select<'a>(
    families: &[&str],
    skus: &'a [Sku],
    memory_floor_gb: u32,
) -> Result<Vec<Candidate<'a>>, CapabilityError> {
    let mut selected = Vec::new();
    for family in families {
        for sku in skus.iter().filter(|s| s.in_family(family)) {
            let spec = sku.spec()?;
            if spec.vcpus >= 1 && spec.memory_gb >= f64::from(memory_floor_gb) {
                selected.push(Candidate { sku, spec });
            } else {
                tracing::trace!("{} filtered out by capabilities", sku.name);
            }
        }
    }
    Ok(selected)
}
