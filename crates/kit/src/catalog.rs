//! Catalog and usage documents as emitted by the cloud CLI.
//!
//! `vm list-skus` yields an array of [`Sku`] and `vm list-usage` an array of
//! [`UsageEntry`]. Only the fields the advisor reads are modelled; anything
//! else in the documents is ignored.

use std::collections::HashMap;

use serde::Deserialize;

/// Capability name holding the vCPU count, an integer-valued string.
pub const VCPUS_CAPABILITY: &str = "vCPUs";

/// Capability name holding the memory size in GB, a float-valued string.
pub const MEMORY_GB_CAPABILITY: &str = "MemoryGB";

/// A single VM size offered in a region.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sku {
    /// SKU name, e.g. `Standard_D4_v3`
    pub name: String,

    /// Pricing tier, e.g. `Standard`
    #[serde(default)]
    pub tier: String,

    /// Quota family this SKU draws from, e.g. `standardDv3Family`
    #[serde(default)]
    pub family: Option<String>,

    /// Ordered name/value capability pairs
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// One `{name, value}` capability entry of a [`Sku`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Capability {
    pub name: String,
    pub value: String,
}

/// A per-family quota row from `vm list-usage`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub name: UsageName,
    #[serde(deserialize_with = "integer_or_string")]
    pub limit: i64,
    #[serde(deserialize_with = "integer_or_string")]
    pub current_value: i64,
}

/// The `name` object of a [`UsageEntry`]; `value` is the family key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsageName {
    pub value: String,
}

/// Typed view of the capabilities the advisor relies on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkuSpec {
    /// Signed as listed; SKUs below one vCPU are filtered, not rejected.
    pub vcpus: i64,
    pub memory_gb: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("SKU {sku} has no {capability} capability")]
    Missing { sku: String, capability: &'static str },
    #[error("SKU {sku} has unparseable {capability} capability: {value:?}")]
    Invalid {
        sku: String,
        capability: &'static str,
        value: String,
    },
}

impl Sku {
    /// Whether this SKU draws from the given quota family.
    pub fn in_family(&self, family: &str) -> bool {
        self.family.as_deref() == Some(family)
    }

    /// Capabilities keyed by name. A repeated name keeps its last value.
    pub fn capability_map(&self) -> HashMap<&str, &str> {
        self.capabilities
            .iter()
            .map(|c| (c.name.as_str(), c.value.as_str()))
            .collect()
    }

    /// Extract and parse the vCPU and memory capabilities.
    pub fn spec(&self) -> Result<SkuSpec, CapabilityError> {
        let caps = self.capability_map();
        let lookup = |capability: &'static str| {
            caps.get(capability)
                .map(|v| v.trim())
                .ok_or_else(|| CapabilityError::Missing {
                    sku: self.name.clone(),
                    capability,
                })
        };
        let invalid = |capability: &'static str, value: &str| CapabilityError::Invalid {
            sku: self.name.clone(),
            capability,
            value: value.to_owned(),
        };

        let vcpus = lookup(VCPUS_CAPABILITY)?;
        let vcpus = vcpus
            .parse::<i64>()
            .map_err(|_| invalid(VCPUS_CAPABILITY, vcpus))?;

        let memory = lookup(MEMORY_GB_CAPABILITY)?;
        let memory_gb = memory
            .parse::<f64>()
            .ok()
            .filter(|m| m.is_finite())
            .ok_or_else(|| invalid(MEMORY_GB_CAPABILITY, memory))?;

        Ok(SkuSpec { vcpus, memory_gb })
    }
}

/// Usage counters have been seen both as JSON numbers and as numeric strings.
fn integer_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid integer {s:?}"))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Build a SKU with the two capabilities the advisor reads.
    pub(crate) fn sku(name: &str, family: &str, vcpus: &str, memory_gb: &str) -> Sku {
        serde_json::from_value(json!({
            "name": name,
            "tier": "Standard",
            "family": family,
            "capabilities": [
                {"name": "MaxResourceVolumeMB", "value": "32768"},
                {"name": "vCPUs", "value": vcpus},
                {"name": "MemoryGB", "value": memory_gb},
            ]
        }))
        .unwrap()
    }

    pub(crate) fn usage(family: &str, limit: i64) -> UsageEntry {
        serde_json::from_value(json!({
            "currentValue": 0,
            "limit": limit,
            "localName": family,
            "name": {"localizedValue": family, "value": family}
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_cli_sku_document() {
        let doc = json!([{
            "apiVersions": null,
            "capabilities": [
                {"name": "vCPUs", "value": "4"},
                {"name": "MemoryGB", "value": "16"}
            ],
            "family": "standardDv3Family",
            "kind": null,
            "locations": ["eastus"],
            "name": "Standard_D4_v3",
            "resourceType": "virtualMachines",
            "size": "D4_v3",
            "tier": "Standard"
        }]);
        let skus: Vec<Sku> = serde_json::from_value(doc).unwrap();
        assert_eq!(skus.len(), 1);
        assert!(skus[0].in_family("standardDv3Family"));
        assert!(!skus[0].in_family("standardDv4Family"));
        assert_eq!(
            skus[0].spec().unwrap(),
            SkuSpec {
                vcpus: 4,
                memory_gb: 16.0
            }
        );
    }

    #[test]
    fn test_usage_accepts_string_counters() {
        let entry: UsageEntry = serde_json::from_value(json!({
            "currentValue": "3",
            "limit": "350",
            "name": {"value": "cores"}
        }))
        .unwrap();
        assert_eq!(entry.name.value, "cores");
        assert_eq!(entry.limit, 350);
        assert_eq!(entry.current_value, 3);

        let bad = serde_json::from_value::<UsageEntry>(json!({
            "currentValue": 0,
            "limit": "lots",
            "name": {"value": "cores"}
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_spec_negative_vcpus_parse() {
        let s = sku("Odd", "dFamily", "-1", "8");
        assert_eq!(s.spec().unwrap().vcpus, -1);
    }

    #[test]
    fn test_spec_fractional_memory() {
        let s = sku("Standard_B1ls", "standardBSFamily", "1", "0.5");
        assert_eq!(s.spec().unwrap().memory_gb, 0.5);
    }

    #[test]
    fn test_spec_last_capability_wins() {
        let mut s = sku("Standard_D2_v3", "standardDv3Family", "2", "8");
        s.capabilities.push(Capability {
            name: "vCPUs".into(),
            value: "3".into(),
        });
        assert_eq!(s.spec().unwrap().vcpus, 3);
    }

    #[test]
    fn test_spec_missing_capability() {
        let mut s = sku("Standard_D2_v3", "standardDv3Family", "2", "8");
        s.capabilities.retain(|c| c.name != MEMORY_GB_CAPABILITY);
        match s.spec() {
            Err(CapabilityError::Missing { sku, capability }) => {
                assert_eq!(sku, "Standard_D2_v3");
                assert_eq!(capability, MEMORY_GB_CAPABILITY);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_spec_invalid_values() {
        let s = sku("Standard_X", "standardXFamily", "2.5", "8");
        assert!(matches!(
            s.spec(),
            Err(CapabilityError::Invalid {
                capability: VCPUS_CAPABILITY,
                ..
            })
        ));

        let s = sku("Standard_X", "standardXFamily", "2", "eight");
        assert!(matches!(
            s.spec(),
            Err(CapabilityError::Invalid {
                capability: MEMORY_GB_CAPABILITY,
                ..
            })
        ));
    }

    #[test]
    fn test_sku_without_family_matches_nothing() {
        let s: Sku = serde_json::from_value(json!({
            "name": "Standard_Odd",
            "capabilities": []
        }))
        .unwrap();
        assert!(!s.in_family(""));
        assert!(s.tier.is_empty());
    }
}
