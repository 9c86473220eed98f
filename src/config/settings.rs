//! Runtime settings for the web application.
//!
//! Network addresses derive from the Docker host IP and topology given on
//! the command line; everything else comes from environment variables with
//! defaults matching the sample network.

use crate::workflow::{DeploymentDescriptor, EngineOptions, WorkflowPlan};
use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use std::env;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

const MEMBERSRVC_PORT: u16 = 7054;
const EVENT_HUB_PORT: u16 = 7053;
const PEER_PORTS: [u16; 4] = [7051, 8051, 9051, 10051];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkTopology {
    SinglePeer,
    FourPeer,
}

impl NetworkTopology {
    pub fn peer_count(self) -> usize {
        match self {
            NetworkTopology::SinglePeer => 1,
            NetworkTopology::FourPeer => PEER_PORTS.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Docker host running membersrvc and the peers
    pub docker_host: IpAddr,

    pub topology: NetworkTopology,

    pub chain_name: String,

    /// Pre-registered registrar identity
    pub admin_name: String,
    pub admin_secret: String,

    /// Identity registered and used for transactions
    pub user_name: String,
    pub affiliation: String,

    pub api_host: String,
    pub api_port: u16,

    pub tcert_batch_size: Option<NonZeroUsize>,

    pub operation_timeout: Option<Duration>,

    /// Wait for the commit event before answering a transaction request
    pub confirm_commits: bool,

    /// Crowd-fund account credited by transactions
    pub account: String,
}

impl Settings {
    /// Load settings from the process environment and a `.env` file.
    pub fn from_env(docker_host: IpAddr, topology: NetworkTopology) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(docker_host, topology, |key| env::var(key).ok())
    }

    /// Load settings through `lookup`, so callers can supply variables
    /// without touching the process environment.
    pub fn from_lookup<F>(docker_host: IpAddr, topology: NetworkTopology, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let tcert_batch_size = match lookup("TCERT_BATCH_SIZE") {
            Some(raw) => Some(
                raw.parse::<NonZeroUsize>()
                    .context("Invalid TCERT_BATCH_SIZE (expected a positive integer)")?,
            ),
            None => None,
        };
        let operation_timeout = match lookup("OPERATION_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(
                raw.parse().context("Invalid OPERATION_TIMEOUT_SECS")?,
            )),
            None => None,
        };

        let settings = Settings {
            docker_host,
            topology,
            chain_name: or("CHAIN_NAME", "testChain"),
            admin_name: or("ADMIN_NAME", "WebAppAdmin"),
            admin_secret: or("ADMIN_SECRET", "DJY27pEnl16d"),
            user_name: or("APP_USER", "WebApp_user1"),
            affiliation: or("APP_AFFILIATION", "bank_a"),
            api_host: or("APP_HOST", "0.0.0.0"),
            api_port: or("APP_PORT", "3000")
                .parse()
                .context("Invalid APP_PORT")?,
            tcert_batch_size,
            operation_timeout,
            confirm_commits: or("CONFIRM_COMMITS", "false")
                .parse()
                .context("Invalid CONFIRM_COMMITS (expected true/false)")?,
            account: or("ACCOUNT", "account"),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            bail!("APP_PORT must be greater than 0");
        }
        if self.operation_timeout == Some(Duration::ZERO) {
            bail!("OPERATION_TIMEOUT_SECS must be greater than 0");
        }
        for (key, value) in [
            ("CHAIN_NAME", &self.chain_name),
            ("ADMIN_NAME", &self.admin_name),
            ("APP_USER", &self.user_name),
            ("APP_AFFILIATION", &self.affiliation),
            ("ACCOUNT", &self.account),
        ] {
            if value.trim().is_empty() {
                bail!("{} must not be empty", key);
            }
        }
        Ok(())
    }

    pub fn membersrvc_address(&self) -> String {
        format!("grpc://{}:{}", self.docker_host, MEMBERSRVC_PORT)
    }

    pub fn peer_addresses(&self) -> Vec<String> {
        PEER_PORTS
            .iter()
            .take(self.topology.peer_count())
            .map(|port| format!("grpc://{}:{}", self.docker_host, port))
            .collect()
    }

    pub fn event_hub_address(&self) -> String {
        format!("grpc://{}:{}", self.docker_host, EVENT_HUB_PORT)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            operation_timeout: self.operation_timeout,
            tcert_batch_size: self.tcert_batch_size,
        }
    }

    /// Engine options whose TCert batch size falls back to `batch_size`
    /// when `TCERT_BATCH_SIZE` is unset.
    pub fn engine_options_with_batch(&self, batch_size: NonZeroUsize) -> EngineOptions {
        EngineOptions {
            tcert_batch_size: Some(self.tcert_batch_size.unwrap_or(batch_size)),
            ..self.engine_options()
        }
    }

    pub fn workflow_plan(&self, deployment: DeploymentDescriptor) -> WorkflowPlan {
        WorkflowPlan {
            admin_name: self.admin_name.clone(),
            admin_secret: self.admin_secret.clone(),
            user_name: self.user_name.clone(),
            affiliation: self.affiliation.clone(),
            deployment,
        }
    }
}
