//! Floating license sample host
//!
//! Leases one seat, prints lease status, and keeps the lease renewed until
//! Ctrl-C or until the lease is lost.
//!
//! Usage:
//!   floatlease-cli lease --host localhost --port 8090 --product-id PID-123
//!   floatlease-cli lease --host localhost --port 8090 \
//!       --product-file product.dat --version-id <GUID> --metadata tier

use anyhow::{Context, Result, bail};
use clap::Parser;
use floatlease_cli::{Args, LeaseArgs, describe};
use floatlease_client::{ChannelDispatch, ExpiryReason, LeaseClient, LeaseConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let result = match args.command.into_lease_args() {
        Ok(lease) => run_lease(lease).await,
        Err(e) => Err(e),
    };

    floatlease_client::global_cleanup();
    result
}

async fn run_lease(args: LeaseArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => LeaseConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LeaseConfig::default(),
    };
    debug!("Using config {:?}", config);

    let client = LeaseClient::new(config)?;
    client
        .set_identity_source(args.source)
        .context("setting product identity")?;
    let handle = client
        .bind_version(args.version_id.as_deref())
        .await
        .context("binding product identity")?;
    debug!("Bound handle {}", handle);
    client
        .configure_endpoint(&args.host, args.port)
        .await
        .context("setting license server address")?;

    // Expiry notifications are delivered on this task, not the renewal task.
    let (dispatch, mut queue) = ChannelDispatch::new();
    client.set_renewal_failure_callback_on(
        |reason: ExpiryReason| println!("{}", reason.message()),
        Arc::new(dispatch),
    );

    match client.acquire().await {
        Ok(_) => println!("Success: license leased."),
        Err(e) => {
            println!("{}", describe(&e));
            return Err(e.into());
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&client.lease_info())?);
    }

    for key in &args.metadata {
        match client.get_metadata_field(key).await {
            Ok(value) => println!("Metadata {key}: {value}"),
            Err(e) => println!("Metadata {key}: {}", describe(&e)),
        }
    }

    info!("Holding lease on {}:{}; press Ctrl-C to release", args.host, args.port);

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            println!();
            client.release().await.context("releasing lease")?;
            println!("License released.");
            Ok(())
        }
        reason = queue.run_next() => {
            if let Err(e) = client.release().await {
                warn!("Release after expiry failed: {}", e);
            }
            match reason {
                Some(reason) => bail!("lease lost: {reason}"),
                None => bail!("lease notifications stopped"),
            }
        }
    }
}
