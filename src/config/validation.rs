use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use garde::Validate;
use serde_json::{Map, Value, json};

use super::AppConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "http-o11y", version, about = "HTTP service with access logging, trace propagation and Prometheus metrics")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, env = "APP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    pub bind: Option<String>,

    /// Log level filter
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json or pretty)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Span exporter (NOOP, STDOUT, JAEGER, OTLP, OTLP_GRPC)
    #[arg(long)]
    pub exporter: Option<String>,
}

impl Cli {
    /// Flags that were given, shaped like [`AppConfig`].
    fn overrides(&self) -> Value {
        let mut server = Map::new();
        if let Some(port) = self.port {
            server.insert("port".into(), json!(port));
        }
        if let Some(bind) = &self.bind {
            server.insert("bind".into(), json!(bind));
        }

        let mut logging = Map::new();
        if let Some(level) = &self.log_level {
            logging.insert("level".into(), json!(level));
        }
        if let Some(format) = &self.log_format {
            logging.insert("format".into(), json!(format));
        }

        let mut tracing = Map::new();
        if let Some(exporter) = &self.exporter {
            tracing.insert("exporter".into(), json!(exporter));
        }

        json!({ "server": server, "logging": logging, "tracing": tracing })
    }
}

/// Load configuration, lowest priority first:
/// 1. embedded defaults
/// 2. the TOML file given by `--config` / `APP_CONFIG`
/// 3. `APP_`-prefixed environment variables, `__` separating nested keys
/// 4. command-line flags
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

    if let Some(path) = &cli.config {
        if !path.exists() {
            bail!("configuration file {} does not exist", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("APP_").split("__"))
        .merge(Serialized::defaults(cli.overrides()))
        .extract()?;

    config.validate()?;

    Ok(config)
}
