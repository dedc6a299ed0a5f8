use crate::core::config::ConfigOverrides;
use crate::core::types::RiskLevel;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Bridge configuration file (TOML with a [bridge] table)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:53001 (overrides BRIDGE_BIND)
    #[arg(long, value_name = "ADDR", help_heading = "Listener")]
    pub bind: Option<String>,

    /// Listen port on the configured host (overrides PORT)
    #[arg(long, value_name = "PORT", help_heading = "Listener")]
    pub port: Option<u16>,

    /// Command template for the backing CLI (overrides BRIDGE_CLI_CMD)
    #[arg(long, value_name = "TEMPLATE", help_heading = "Execution")]
    pub command: Option<String>,

    /// Per-request timeout, e.g. 600 or 10m (overrides BRIDGE_TIMEOUT)
    #[arg(long, value_name = "DURATION", help_heading = "Execution")]
    pub timeout: Option<String>,

    /// Default working directory for the backing CLI (overrides BRIDGE_WORKDIR)
    #[arg(long, value_name = "DIR", help_heading = "Execution")]
    pub workdir: Option<PathBuf>,
}

impl ServeArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind: self.bind.clone(),
            port: self.port,
            command: self.command.clone(),
            timeout: self.timeout.clone(),
            workdir: self.workdir.clone(),
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct InvokeArgs {
    /// Bridge configuration file (TOML with a [bridge] table)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Command template for the backing CLI (overrides BRIDGE_CLI_CMD)
    #[arg(long, value_name = "TEMPLATE", help_heading = "Execution")]
    pub command: Option<String>,

    /// Timeout for this run, e.g. 30 or 2m (overrides BRIDGE_TIMEOUT)
    #[arg(long, value_name = "DURATION", help_heading = "Execution")]
    pub timeout: Option<String>,

    /// Default working directory for the backing CLI
    #[arg(long, value_name = "DIR", help_heading = "Execution")]
    pub workdir: Option<PathBuf>,

    /// Instruction passed verbatim to the backing CLI
    #[arg(long, value_name = "TEXT")]
    pub prompt: String,

    /// Working directory for this run (relative paths join the workdir)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Risk level for this run: read-only, low, medium, high
    #[arg(long, value_name = "LEVEL")]
    pub risk: Option<RiskLevel>,
}

impl InvokeArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind: None,
            port: None,
            command: self.command.clone(),
            timeout: self.timeout.clone(),
            workdir: self.workdir.clone(),
        }
    }
}
