use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Real-time chat relay server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "relay-server", version, about = "Real-time chat relay server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "RELAY_PORT", default_value = "8000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "RELAY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RELAY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for the SQLite database
    #[arg(long, env = "RELAY_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Messages replayed to a client when it joins
    #[arg(long, env = "RELAY_HISTORY_LIMIT", default_value = "20")]
    pub history_limit: u32,

    /// Frames buffered per connection before it is treated as a slow consumer
    #[arg(long, env = "RELAY_OUTBOUND_BUFFER", default_value = "256")]
    pub outbound_buffer: usize,

    /// Seconds a single socket write may take before the connection is dropped
    #[arg(long, env = "RELAY_SEND_TIMEOUT_SECS", default_value = "10")]
    pub send_timeout_secs: u64,

    /// Seconds between liveness pings to each client
    #[arg(long, env = "RELAY_PING_INTERVAL_SECS", default_value = "30")]
    pub ping_interval_secs: u64,

    /// Seconds a client has to answer a ping before it is dropped
    #[arg(long, env = "RELAY_PONG_TIMEOUT_SECS", default_value = "10")]
    pub pong_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            config: "./relay.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            history_limit: 20,
            outbound_buffer: 256,
            send_timeout_secs: 10,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    ///
    /// Only flags given on the command line override the lower layers;
    /// clap's own defaults do not mask the TOML file.
    pub fn load() -> Result<Self, figment::Error> {
        let matches = Config::command().get_matches();
        let cli = Config::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("RELAY_"));

        let cli_values = Figment::from(Serialized::defaults(&cli));
        for id in matches.ids() {
            if matches.value_source(id.as_str()) != Some(ValueSource::CommandLine) {
                continue;
            }
            if let Ok(value) = cli_values.find_value(id.as_str()) {
                figment = figment.merge(Serialized::default(id.as_str(), value));
            }
        }

        figment.extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chat relay server configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# Messages replayed to a client when it joins
# history_limit = 20

# Frames buffered per connection; a client that falls this far behind is dropped
# outbound_buffer = 256

# Seconds a single socket write may take
# send_timeout_secs = 10

# Seconds between liveness pings, and how long a client has to answer one
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
