//! Command-line surface of the floating license sample host.

use anyhow::{Result, bail};
use clap::{ArgGroup, Parser, Subcommand};
use floatlease_client::{IdentitySource, LeaseError};
use floatlease_types::Rejection;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "floatlease-cli")]
#[command(about = "Lease a floating license seat from a license server")]
pub struct Args {
    /// Enable verbose debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lease a seat and hold it until Ctrl-C
    #[command(group(
        ArgGroup::new("product")
            .required(true)
            .args(["product_id", "product_file"]),
    ))]
    Lease {
        /// License server host
        #[arg(long, default_value = "localhost")]
        host: String,

        /// License server port
        #[arg(long, default_value = "8090")]
        port: u16,

        /// Product id from the vendor dashboard
        #[arg(long)]
        product_id: Option<String>,

        /// Product descriptor file
        #[arg(long, requires = "version_id")]
        product_file: Option<PathBuf>,

        /// Version identifier (a GUID in descriptor mode)
        #[arg(long)]
        version_id: Option<String>,

        /// JSON lease config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Metadata field to print once leased (repeatable)
        #[arg(long = "metadata", value_name = "KEY")]
        metadata: Vec<String>,

        /// Print the lease snapshot as JSON after acquiring
        #[arg(long)]
        json: bool,
    },
}

/// Resolved options of the `lease` subcommand.
#[derive(Debug)]
pub struct LeaseArgs {
    pub host: String,
    pub port: u16,
    pub source: IdentitySource,
    pub version_id: Option<String>,
    pub config: Option<PathBuf>,
    pub metadata: Vec<String>,
    pub json: bool,
}

impl Command {
    /// Turns the parsed `lease` flags into the identity source and options
    /// the host runs with.
    ///
    /// # Errors
    ///
    /// Fails if neither a product id nor a product file was given.
    pub fn into_lease_args(self) -> Result<LeaseArgs> {
        match self {
            Command::Lease {
                host,
                port,
                product_id,
                product_file,
                version_id,
                config,
                metadata,
                json,
            } => {
                let source = match (product_id, product_file) {
                    (Some(id), _) => IdentitySource::ProductId(id),
                    (None, Some(path)) => IdentitySource::ProductFile(path),
                    (None, None) => bail!("either --product-id or --product-file is required"),
                };
                Ok(LeaseArgs {
                    host,
                    port,
                    source,
                    version_id,
                    config,
                    metadata,
                    json,
                })
            }
        }
    }
}

/// Describes an acquire or metadata failure the way the host reports it.
pub fn describe(e: &LeaseError) -> String {
    match e {
        LeaseError::Rejected(Rejection::NoFreeLicense) => "No free license is available.".into(),
        LeaseError::Rejected(Rejection::LicenseExists) => "A license is already leased.".into(),
        LeaseError::Rejected(Rejection::MetadataKeyNotFound) => "Metadata key not found.".into(),
        LeaseError::ClockTampered(_) => "System time has been tampered with.".into(),
        LeaseError::Protocol(_) => format!("Unexpected reply from the license server: {e}"),
        e if e.is_transient() => format!("Could not reach the license server: {e}"),
        e => format!("Error: {e}"),
    }
}
