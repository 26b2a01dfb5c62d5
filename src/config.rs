//! Configuration for gatehouse
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

/// Gatehouse - transfer authorization gateway for Git LFS object storage
#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse")]
#[command(about = "Transfer authorization gateway for Git LFS object storage")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// External URL clients use to reach this gateway
    /// Embedded in the hypermedia links handed back to LFS clients
    #[arg(long, env = "EXTERNAL_URL", default_value = "http://localhost:8080")]
    pub external_url: String,

    /// Root directory for content-addressed blob storage and the object index
    #[arg(long, env = "STORAGE_PATH", default_value = "./data/lfs-objects")]
    pub storage_path: PathBuf,

    /// Master switch for the LFS API
    /// When disabled every transfer operation answers 501, before any other check
    #[arg(long, env = "LFS_ENABLED", default_value = "true")]
    pub lfs_enabled: bool,

    /// Seed file with users, projects, and memberships (JSON)
    #[arg(long, env = "SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// External URL without a trailing slash, ready for link construction
    pub fn external_url_base(&self) -> &str {
        self.external_url.trim_end_matches('/')
    }

    /// Documentation URL echoed in JSON error bodies
    pub fn documentation_url(&self) -> String {
        format!("{}/help", self.external_url_base())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.external_url.starts_with("http://") && !self.external_url.starts_with("https://") {
            return Err("EXTERNAL_URL must be an http(s) URL".to_string());
        }

        if self.external_url_base().is_empty() {
            return Err("EXTERNAL_URL must not be empty".to_string());
        }

        Ok(())
    }
}
