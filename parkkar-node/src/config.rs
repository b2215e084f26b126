//! Command-line / environment configuration for the node.

use crate::lots::LotRegistry;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use parkkar_bridge::{BridgeConfig, LauncherConfig, Runtime};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RuntimeArg {
    Container,
    Local,
}

impl From<RuntimeArg> for Runtime {
    fn from(arg: RuntimeArg) -> Self {
        match arg {
            RuntimeArg::Container => Runtime::Container,
            RuntimeArg::Local => Runtime::Local,
        }
    }
}

/// ParkKar slot detection node
#[derive(Parser, Debug)]
#[command(name = "parkkar-node", version, about)]
pub struct Cli {
    /// Address to serve HTTP on
    #[arg(long, env = "PARKKAR_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Working directory of the detectors
    #[arg(long, env = "PARKKAR_PROJECT_ROOT", default_value = ".")]
    pub project_root: PathBuf,

    /// Directory holding detector scripts, relative to the project root
    #[arg(long, env = "PARKKAR_SCRIPTS_DIR", default_value = "app/detection/scripts")]
    pub scripts_dir: PathBuf,

    /// JSON lot table replacing the built-in one
    #[arg(long, env = "PARKKAR_LOTS")]
    pub lots: Option<PathBuf>,

    /// Interpreter override; otherwise chosen from the runtime
    #[arg(long, env = "PARKKAR_INTERPRETER")]
    pub interpreter: Option<PathBuf>,

    /// Deployment runtime; detected when omitted
    #[arg(long, value_enum, env = "PARKKAR_RUNTIME")]
    pub runtime: Option<RuntimeArg>,

    /// Base URL of the backend receiving slot updates
    #[arg(long, env = "PARKKAR_NOTIFIER_URL", default_value = parkkar_notify::DEFAULT_BASE_URL)]
    pub notifier_url: String,

    #[arg(long, env = "PARKKAR_NOTIFIER_TIMEOUT_MS", default_value = "2000")]
    pub notifier_timeout_ms: u64,

    /// Time a detector gets to exit before it is killed
    #[arg(long, env = "PARKKAR_GRACE_MS", default_value = "5000")]
    pub grace_ms: u64,

    /// Stream read quantum in bytes
    #[arg(long, env = "PARKKAR_CHUNK_SIZE", default_value = "8192")]
    pub chunk_size: usize,
}

impl Cli {
    pub fn launcher_config(&self) -> Result<LauncherConfig> {
        let project_root = self
            .project_root
            .canonicalize()
            .with_context(|| format!("Project root {:?} is not accessible", self.project_root))?;
        Ok(LauncherConfig {
            project_root,
            interpreter: self.interpreter.clone(),
            ..Default::default()
        })
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime.map_or_else(Runtime::detect, Runtime::from)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            grace_period_ms: self.grace_ms,
            chunk_size: self.chunk_size,
        }
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_millis(self.notifier_timeout_ms)
    }

    pub fn lot_registry(&self) -> Result<LotRegistry> {
        match &self.lots {
            Some(path) => LotRegistry::from_json_file(&self.scripts_dir, path),
            None => Ok(LotRegistry::builtin(&self.scripts_dir)),
        }
    }
}
