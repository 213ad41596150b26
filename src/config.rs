//! Configuration module for the echo-beacon server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Registry endpoint used when registration is mandatory and no URL is given.
pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:8500";

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "echo-beacon")]
#[command(author = "echo-beacon authors")]
#[command(version = "0.1.0")]
#[command(about = "An HTTP echo server that announces itself to a service registry", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Service name used for registry announcement
    #[arg(long)]
    pub name: Option<String>,

    /// Address to listen on, in `[host]:port` form (e.g., :8181)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Service registry (Consul) base URL
    #[arg(long = "consul-url")]
    pub consul_url: Option<String>,

    /// Treat registry announcement failures as fatal
    #[arg(long)]
    pub registry_required: bool,

    /// ACL token sent with the registration request
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub consul_token: Option<String>,

    /// Registry datacenter to register into
    #[arg(long)]
    pub datacenter: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Service-related configuration
#[derive(Debug, Deserialize)]
pub struct ServiceSection {
    /// Service name
    #[serde(default = "default_name")]
    pub name: String,
    /// Address to listen on
    #[serde(default = "default_address")]
    pub address: String,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            address: default_address(),
            workers: None,
        }
    }
}

/// Registry-related configuration
#[derive(Debug, Deserialize, Default)]
pub struct RegistrySection {
    /// Registry base URL
    pub url: Option<String>,
    /// Whether a failed announcement stops the process
    #[serde(default)]
    pub required: bool,
    /// ACL token
    pub token: Option<String>,
    /// Target datacenter
    pub datacenter: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_name() -> String {
    "echo-01".to_string()
}

fn default_address() -> String {
    ":8181".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Identity of this service as announced to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl ServiceIdentity {
    /// Derive the identity from a service name and a listen address.
    pub fn new(name: impl Into<String>, address: &str) -> Self {
        let (host, port) = split_host_port(address);
        Self {
            name: name.into(),
            host,
            port,
        }
    }
}

/// Registry announcement settings.
///
/// `url` is `None` only when registration is optional and no registry
/// was configured; mandatory mode always carries a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub url: Option<String>,
    pub required: bool,
    pub token: Option<String>,
    pub datacenter: Option<String>,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub identity: ServiceIdentity,
    pub registry: RegistryConfig,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let name = cli.name.unwrap_or(toml_config.service.name);
        let address = cli.address.unwrap_or(toml_config.service.address);
        let required = cli.registry_required || toml_config.registry.required;

        // An empty URL means "not configured"
        let url = cli
            .consul_url
            .or(toml_config.registry.url)
            .filter(|url| !url.is_empty());
        let url = match url {
            None if required => Some(DEFAULT_REGISTRY_URL.to_string()),
            url => url,
        };

        Config {
            identity: ServiceIdentity::new(name, &address),
            address,
            registry: RegistryConfig {
                url,
                required,
                token: cli
                    .consul_token
                    .or(toml_config.registry.token)
                    .filter(|token| !token.is_empty()),
                datacenter: cli.datacenter.or(toml_config.registry.datacenter),
            },
            workers: cli.workers.or(toml_config.service.workers),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }
}

/// Split a listen address into host and port on the first colon.
///
/// The host may be empty (all interfaces). A port that does not parse
/// degrades to 0, as does a missing one.
pub fn split_host_port(address: &str) -> (String, u16) {
    match address.split_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(0)),
        None => (address.to_string(), 0),
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["echo-beacon"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port(":8181"), (String::new(), 8181));
        assert_eq!(
            split_host_port("127.0.0.1:9000"),
            ("127.0.0.1".to_string(), 9000)
        );
        assert_eq!(split_host_port("localhost"), ("localhost".to_string(), 0));
        assert_eq!(split_host_port(""), (String::new(), 0));
    }

    #[test]
    fn test_split_host_port_lenient_port() {
        assert_eq!(split_host_port("host:http"), ("host".to_string(), 0));
        assert_eq!(split_host_port("host:"), ("host".to_string(), 0));
        assert_eq!(split_host_port("host:70000"), ("host".to_string(), 0));
        // Everything after the first colon is the port
        assert_eq!(split_host_port("a:1:2"), ("a".to_string(), 0));
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.service.name, "echo-01");
        assert_eq!(config.service.address, ":8181");
        assert_eq!(config.registry.url, None);
        assert!(!config.registry.required);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [service]
            name = "echo-07"
            address = "0.0.0.0:9090"
            workers = 2

            [registry]
            url = "http://consul.service:8500"
            required = true
            datacenter = "dc2"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.name, "echo-07");
        assert_eq!(config.service.address, "0.0.0.0:9090");
        assert_eq!(config.service.workers, Some(2));
        assert_eq!(
            config.registry.url.as_deref(),
            Some("http://consul.service:8500")
        );
        assert!(config.registry.required);
        assert_eq!(config.registry.datacenter.as_deref(), Some("dc2"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_merge_defaults() {
        let config = Config::merge(cli(&[]), TomlConfig::default());
        assert_eq!(config.address, ":8181");
        assert_eq!(
            config.identity,
            ServiceIdentity {
                name: "echo-01".to_string(),
                host: String::new(),
                port: 8181,
            }
        );
        assert_eq!(config.registry.url, None);
        assert!(!config.registry.required);
        assert_eq!(config.workers, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_merge_cli_takes_precedence() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [service]
            name = "from-file"
            address = "10.0.0.1:80"

            [registry]
            url = "http://file:8500"

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let config = Config::merge(
            cli(&[
                "--name",
                "from-cli",
                "--address",
                "127.0.0.1:9999",
                "--consul-url",
                "http://cli:8500",
                "--log-level",
                "trace",
            ]),
            toml_config,
        );

        assert_eq!(config.identity.name, "from-cli");
        assert_eq!(config.identity.host, "127.0.0.1");
        assert_eq!(config.identity.port, 9999);
        assert_eq!(config.registry.url.as_deref(), Some("http://cli:8500"));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_file_values_fill_missing_cli() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [service]
            name = "from-file"

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let config = Config::merge(cli(&[]), toml_config);
        assert_eq!(config.identity.name, "from-file");
        assert_eq!(config.address, ":8181");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_optional_registry_empty_url_is_unset() {
        let config = Config::merge(cli(&["--consul-url", ""]), TomlConfig::default());
        assert_eq!(config.registry.url, None);
        assert!(!config.registry.required);
    }

    #[test]
    fn test_required_registry_defaults_url() {
        let config = Config::merge(cli(&["--registry-required"]), TomlConfig::default());
        assert!(config.registry.required);
        assert_eq!(config.registry.url.as_deref(), Some(DEFAULT_REGISTRY_URL));
    }

    #[test]
    fn test_required_registry_keeps_explicit_url() {
        let config = Config::merge(
            cli(&["--registry-required", "--consul-url", "consul:8500"]),
            TomlConfig::default(),
        );
        assert_eq!(config.registry.url.as_deref(), Some("consul:8500"));
    }
}
