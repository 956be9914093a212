//! Process-start configuration.
//!
//! Loaded once via the `config` crate layered over `config/gateway.yaml`,
//! environment variables (`RELAYCRATE_*`), and `clap`-parsed CLI flags, in
//! that increasing order of precedence. This is distinct from
//! [`crate::core::types::Setting`]: `Config` is how the process learns to
//! start, `Setting` is what an operator can change while it runs.

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::utils::error::{GatewayError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: num_cpus(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sea-orm connection string, e.g. `sqlite://gateway.db?mode=rwc`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://gateway.db?mode=rwc".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Operator login username. JWTs are signed with `username || password`,
    /// so rotating either invalidates every previously issued token.
    pub admin_username: String,
    pub admin_password: String,
    /// Build-constant app name embedded in issued API keys: `sk-<app>-<random>`.
    pub app_name: String,
    /// Operator JWT default time-to-live, minutes. `-1` means 30 days.
    pub jwt_default_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_string(),
            admin_password: "change-me".to_string(),
            app_name: "relay".to_string(),
            jwt_default_ttl_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load layered configuration: defaults < YAML file < `RELAYCRATE_*` env < CLI flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default()).map_err(|e| GatewayError::config(e.to_string()))?);

        let path = cli.config.as_deref().unwrap_or("config/gateway.yaml");
        if std::path::Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RELAYCRATE")
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: Config = builder
            .build()
            .map_err(|e| GatewayError::config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| GatewayError::config(e.to_string()))?;

        if let Some(listen) = &cli.listen {
            let (host, port) = listen
                .rsplit_once(':')
                .ok_or_else(|| GatewayError::config("--listen must be host:port"))?;
            cfg.server.host = host.to_string();
            cfg.server.port = port
                .parse()
                .map_err(|_| GatewayError::config("--listen port must be numeric"))?;
        }
        if let Some(level) = &cli.log_level {
            cfg.logging.level = level.clone();
        }

        Ok(cfg)
    }
}

/// CLI flags, parsed before config layering (teacher's `dotenvy` + `clap` bootstrap order).
#[derive(Debug, Parser)]
#[command(name = "gateway", about = "Multi-provider LLM relay gateway")]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long)]
    pub config: Option<String>,
    /// Override the listen address, `host:port`.
    #[arg(long)]
    pub listen: Option<String>,
    /// Override the log level (error|warn|info|debug|trace).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_well_formed() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.database.url.starts_with("sqlite://"));
    }
}
