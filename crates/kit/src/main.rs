//! findsku - pick a VM SKU and instance count for a vCPU request
//!
//! Reads the region's SKU catalog and per-family vCPU quota, either from the
//! cloud CLI or from pre-fetched JSON, and prints every SKU that can serve the
//! requested vCPUs without exceeding its family quota.

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::{eyre::Context as _, Report, Result};

mod advisor;
mod capability;
mod catalog;
mod command_run;
mod provider;
mod quota;
mod sizing;

use advisor::{Inputs, Request};
use provider::{AzCli, Sources, DEFAULT_AZ_PROGRAM};
use quota::QuotaTable;

/// Find VM SKUs able to provide a total vCPU count within regional quota.
///
/// Without -s/-u the SKU list and usage are queried from the cloud CLI for
/// the given location.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Total number of vCPUs
    #[clap(short = 'v', long, value_parser = clap::value_parser!(u32).range(1..))]
    vcpu: u32,

    /// Minimum required memory in GB per vCPU
    #[clap(short = 'm', long, default_value_t = 0)]
    memory: u32,

    /// Location
    #[clap(short = 'l', long, default_value = "eastus")]
    location: String,

    /// JSON file containing list of SKUs
    #[clap(short = 's', long)]
    list_skus_json: Option<Utf8PathBuf>,

    /// JSON file containing list of usage
    #[clap(short = 'u', long)]
    list_usage_json: Option<Utf8PathBuf>,

    /// Cloud CLI executable used when a JSON file is not given
    #[clap(long, env = "FINDSKU_AZ", default_value = DEFAULT_AZ_PROGRAM)]
    az: String,
}

impl Cli {
    fn request(&self) -> Request {
        Request {
            vcpu: self.vcpu,
            memory_gb: self.memory,
            location: self.location.clone(),
        }
    }

    fn sources(&self) -> Sources {
        Sources {
            skus: self.list_skus_json.clone(),
            usage: self.list_usage_json.clone(),
            remote: AzCli::new(self.az.as_str()),
        }
    }
}

/// Install and configure the tracing/logging system.
///
/// Diagnostics go to stderr so stdout carries only the report. Logs are
/// filtered by the RUST_LOG environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let format = fmt::format().without_time().with_target(false).compact();

    let fmt_layer = fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr);
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();
    let request = cli.request();
    tracing::debug!("{request:?}");

    let inputs = Inputs::load(&cli.sources(), &request.location)?;
    let table = QuotaTable::new(&inputs.usage);

    match advisor::evaluate(&inputs, &table, &request)? {
        Ok(advice) => {
            advice
                .write_report(std::io::stdout().lock())
                .context("Writing report")?;
        }
        Err(infeasible) => {
            println!("{infeasible}");
            std::process::exit(1);
        }
    }
    tracing::debug!("exiting");
    Ok(())
}
