//! Where the SKU catalog and quota usage come from.
//!
//! [`CatalogProvider`] is the seam between the advisor and the outside world.
//! [`AzCli`] shells out to the cloud CLI, [`Sources`] prefers pre-fetched
//! JSON files and falls back to a CLI query for whichever document was not
//! supplied.

use std::fs::File;
use std::io::BufReader;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, Result};
use serde::de::DeserializeOwned;

use crate::catalog::{Sku, UsageEntry};
use crate::command_run::CommandRun;

/// Default cloud CLI executable.
pub const DEFAULT_AZ_PROGRAM: &str = "az";

/// Supplies the two documents the advisor works from.
pub trait CatalogProvider {
    /// Virtual machine SKUs available in `location`.
    fn fetch_skus(&self, location: &str) -> Result<Vec<Sku>>;

    /// Per-family vCPU quota usage in `location`.
    fn fetch_usage(&self, location: &str) -> Result<Vec<UsageEntry>>;
}

/// Queries the cloud CLI.
#[derive(Debug, Clone)]
pub struct AzCli {
    program: String,
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new(DEFAULT_AZ_PROGRAM)
    }
}

impl AzCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `vm list-skus` restricted to virtual machines in `location`.
    pub fn list_skus_command(&self, location: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "vm",
            "list-skus",
            "--location",
            location,
            "--resource-type",
            "virtualMachines",
            "--output",
            "json",
        ]);
        cmd
    }

    /// `vm list-usage` for `location`.
    pub fn list_usage_command(&self, location: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["vm", "list-usage", "--location", location, "--output", "json"]);
        cmd
    }
}

impl CatalogProvider for AzCli {
    fn fetch_skus(&self, location: &str) -> Result<Vec<Sku>> {
        tracing::debug!("Querying {} for SKUs in {location}", self.program);
        self.list_skus_command(location)
            .run_and_parse_json()
            .with_context(|| format!("Listing VM SKUs in {location}"))
    }

    fn fetch_usage(&self, location: &str) -> Result<Vec<UsageEntry>> {
        tracing::debug!("Querying {} for usage in {location}", self.program);
        self.list_usage_command(location)
            .run_and_parse_json()
            .with_context(|| format!("Listing VM usage in {location}"))
    }
}

/// Pre-fetched documents where given, the CLI otherwise.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub skus: Option<Utf8PathBuf>,
    pub usage: Option<Utf8PathBuf>,
    pub remote: AzCli,
}

impl CatalogProvider for Sources {
    fn fetch_skus(&self, location: &str) -> Result<Vec<Sku>> {
        match self.skus.as_deref() {
            Some(path) => load_json_file(path),
            None => self.remote.fetch_skus(location),
        }
    }

    fn fetch_usage(&self, location: &str) -> Result<Vec<UsageEntry>> {
        match self.usage.as_deref() {
            Some(path) => load_json_file(path),
            None => self.remote.fetch_usage(location),
        }
    }
}

/// Read and parse a JSON document from disk.
pub fn load_json_file<T: DeserializeOwned>(path: &Utf8Path) -> Result<T> {
    tracing::debug!("Loading {path}");
    let f = File::open(path).with_context(|| format!("Opening {path}"))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("Parsing {path}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::io::Write;

    /// In-memory provider for exercising the advisor.
    pub(crate) struct StaticProvider {
        pub skus: Vec<Sku>,
        pub usage: Vec<UsageEntry>,
    }

    impl CatalogProvider for StaticProvider {
        fn fetch_skus(&self, _location: &str) -> Result<Vec<Sku>> {
            Ok(self.skus.clone())
        }

        fn fetch_usage(&self, _location: &str) -> Result<Vec<UsageEntry>> {
            Ok(self.usage.clone())
        }
    }

    fn write_json(value: &Value) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        serde_json::to_writer(&mut f, value).unwrap();
        f.flush().unwrap();
        f
    }

    fn cores_usage() -> Value {
        json!([{"name": {"value": "cores"}, "limit": 100, "currentValue": 0}])
    }

    fn utf8_path(f: &tempfile::NamedTempFile) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(f.path().to_owned()).unwrap()
    }

    #[test]
    fn test_cli_arguments() {
        let az = AzCli::default();
        let cmd = az.list_skus_command("westeurope");
        assert_eq!(cmd.get_program(), "az");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            [
                "vm",
                "list-skus",
                "--location",
                "westeurope",
                "--resource-type",
                "virtualMachines",
                "--output",
                "json"
            ]
        );

        let cmd = AzCli::new("/opt/az/bin/az").list_usage_command("eastus");
        assert_eq!(cmd.get_program(), "/opt/az/bin/az");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            ["vm", "list-usage", "--location", "eastus", "--output", "json"]
        );
    }

    #[test]
    fn test_sources_prefer_files() {
        let skus = write_json(&json!([{
            "name": "Standard_D4_v3",
            "tier": "Standard",
            "family": "standardDv3Family",
            "capabilities": [
                {"name": "vCPUs", "value": "4"},
                {"name": "MemoryGB", "value": "16"}
            ]
        }]));
        let usage_doc = write_json(&cores_usage());
        let sources = Sources {
            skus: Some(utf8_path(&skus)),
            usage: Some(utf8_path(&usage_doc)),
            remote: AzCli::new("/nonexistent/az"),
        };
        let loaded = sources.fetch_skus("eastus").unwrap();
        assert_eq!(loaded[0].name, "Standard_D4_v3");
        let loaded = sources.fetch_usage("eastus").unwrap();
        assert_eq!(loaded[0].limit, 100);
    }

    #[test]
    fn test_sources_fall_back_to_cli() {
        let usage_doc = write_json(&cores_usage());
        let sources = Sources {
            skus: None,
            usage: Some(utf8_path(&usage_doc)),
            remote: AzCli::new("/nonexistent/az"),
        };
        assert!(sources.fetch_usage("eastus").is_ok());
        let err = sources.fetch_skus("eastus").unwrap_err();
        assert!(format!("{err:?}").contains("Listing VM SKUs in eastus"));
    }

    #[test]
    fn test_load_malformed_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"[{\"name\": ").unwrap();
        f.flush().unwrap();
        let r: Result<Vec<Sku>> = load_json_file(&utf8_path(&f));
        assert!(r.is_err());

        let r: Result<Vec<Sku>> = load_json_file(Utf8Path::new("/nonexistent/skus.json"));
        assert!(r.is_err());
    }
}
