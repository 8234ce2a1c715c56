//! Router connection configuration
//!
//! A small key=value format, one setting per line, `#` starting a comment:
//!
//! ```text
//! connection.type          = tcpip
//! connection.enable.tcpip  = true
//! connection.name.tcpip    = router
//! connection.address.tcpip = 127.0.0.1
//! connection.port.tcpip    = 8181
//! ```
//!
//! Keys may appear in any order, unknown keys are ignored. Remote routing is
//! off unless `connection.type` names the supported `tcpip` transport and it
//! is not explicitly disabled.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// The only transport the router speaks.
pub const CONNECTION_TYPE_TCPIP: &str = "tcpip";

/// Router address used when the configuration does not name one.
pub const DEFAULT_ROUTER_ADDRESS: &str = "127.0.0.1";

/// Router port used when the configuration does not name one.
pub const DEFAULT_ROUTER_PORT: u16 = 8181;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("cannot read router configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A non-comment line is not a `key = value` pair.
    #[error("malformed setting on line {line}")]
    MalformedLine {
        /// 1-based line number of the offending line.
        line: usize,
    },

    /// A recognized key carries an unparsable value.
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue {
        /// The setting key.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Parsed router connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Configured transport, `None` when the file names none.
    pub connection_type: Option<String>,
    /// Whether the transport is enabled.
    pub enabled: bool,
    /// Logical name of the connection.
    pub name: String,
    /// Router host name or IPv4 address.
    pub address: String,
    /// Router TCP port.
    pub port: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            connection_type: Some(CONNECTION_TYPE_TCPIP.to_string()),
            enabled: true,
            name: "router".to_string(),
            address: DEFAULT_ROUTER_ADDRESS.to_string(),
            port: DEFAULT_ROUTER_PORT,
        }
    }
}

impl RouterConfig {
    /// True when these settings allow connecting to a router.
    pub fn is_remote_enabled(&self) -> bool {
        self.connection_type.as_deref() == Some(CONNECTION_TYPE_TCPIP) && self.enabled
    }

    /// The `host:port` endpoint of the router.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Parse a router configuration file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<RouterConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse router configuration from a string.
pub fn parse_str(content: &str) -> Result<RouterConfig> {
    let mut config = RouterConfig {
        connection_type: None,
        ..RouterConfig::default()
    };

    for (index, raw) in content.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::MalformedLine { line: index + 1 });
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "connection.type" => config.connection_type = Some(value.to_string()),
            "connection.enable.tcpip" => {
                config.enabled = parse_bool(key, value)?;
            }
            "connection.name.tcpip" => config.name = value.to_string(),
            "connection.address.tcpip" => config.address = value.to_string(),
            "connection.port.tcpip" => {
                config.port = value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            _ => debug!(key, "ignoring unknown router setting"),
        }
    }

    Ok(config)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_file() {
        let config = parse_str(
            "# router endpoint\n\
             connection.type          = tcpip\n\
             connection.enable.tcpip  = true\n\
             connection.name.tcpip    = backbone\n\
             connection.address.tcpip = 10.0.0.5\n\
             connection.port.tcpip    = 9200\n",
        )
        .unwrap();

        assert!(config.is_remote_enabled());
        assert_eq!(config.name, "backbone");
        assert_eq!(config.endpoint(), "10.0.0.5:9200");
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = parse_str("connection.type = tcpip\n").unwrap();
        assert!(config.is_remote_enabled());
        assert_eq!(config.endpoint(), "127.0.0.1:8181");
    }

    #[test]
    fn missing_type_disables_routing() {
        let config = parse_str("connection.address.tcpip = 10.0.0.5\n").unwrap();
        assert!(!config.is_remote_enabled());
    }

    #[test]
    fn explicit_disable_wins() {
        let config = parse_str(
            "connection.type = tcpip\n\
             connection.enable.tcpip = false\n",
        )
        .unwrap();
        assert!(!config.is_remote_enabled());
    }

    #[test]
    fn unknown_type_is_kept_but_not_enabled() {
        let config = parse_str("connection.type = pipe\n").unwrap();
        assert_eq!(config.connection_type.as_deref(), Some("pipe"));
        assert!(!config.is_remote_enabled());
    }

    #[test]
    fn unknown_keys_and_comments_are_ignored() {
        let config = parse_str(
            "connection.type = tcpip # trailing comment\n\
             connection.timeout.tcpip = 500\n\
             \n\
             # a full comment line\n",
        )
        .unwrap();
        assert!(config.is_remote_enabled());
    }

    #[test]
    fn malformed_lines_are_reported_with_their_number() {
        let err = parse_str("connection.type = tcpip\nnot a setting\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedLine { line: 2 }));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            parse_str("connection.port.tcpip = lots\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_str("connection.enable.tcpip = yes\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn reads_from_a_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connection.type = tcpip").unwrap();
        writeln!(file, "connection.port.tcpip = 9000").unwrap();

        let config = parse_file(file.path()).unwrap();
        assert_eq!(config.port, 9000);
    }
}
