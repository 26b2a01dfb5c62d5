//! Gatehouse - transfer authorization gateway for Git LFS object storage

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse::auth::{IdentityDirectory, MembershipOracle};
use gatehouse::config::Args;
use gatehouse::registry::{ProjectRegistry, SeedFile};
use gatehouse::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gatehouse={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Gatehouse - Git LFS gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("External URL: {}", args.external_url_base());
    info!("Storage: {}", args.storage_path.display());
    info!("LFS enabled: {}", args.lfs_enabled);
    info!("======================================");

    let registry = ProjectRegistry::new();
    let identities = IdentityDirectory::new();
    let oracle = MembershipOracle::new();

    if let Some(ref seed_path) = args.seed_file {
        let seed = SeedFile::load(seed_path)?;
        seed.apply(&registry, &identities, &oracle);
    }

    let state = AppState::with_collaborators(args, registry, identities, Arc::new(oracle))?;

    server::run(Arc::new(state)).await?;

    Ok(())
}
