//! Load node config from file and environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use apphost_core::Identity;
use serde::Deserialize;

/// Node configuration. File: ~/.config/apphost/config.toml or /etc/apphost/config.toml.
/// Env overrides: APPHOST_NODE_NAME, APPHOST_LISTEN_PORT, APPHOST_BIND_ADDRESS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Name this node answers to in resolve and node info (default "localnode").
    #[serde(default = "default_name")]
    pub name: String,
    /// Router TCP port (default 8625; 0 picks a free port).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Router bind address (default 127.0.0.1).
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Connect and query-handshake timeout in milliseconds (default 10000).
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Known peers, used for resolve, node info and routing queries by identity.
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

/// A known peer node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contact {
    pub name: String,
    pub identity: Identity,
    pub address: SocketAddr,
}

fn default_name() -> String {
    "localnode".to_string()
}
fn default_listen_port() -> u16 {
    8625
}
fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_query_timeout_ms() -> u64 {
    10_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            listen_port: default_listen_port(),
            bind_address: default_bind_address(),
            query_timeout_ms: default_query_timeout_ms(),
            contacts: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> NodeConfig {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

/// Load an explicit config file, then apply env vars. Unlike [`load`], a bad file is an error.
pub fn load_from(path: &Path) -> Result<NodeConfig, ConfigError> {
    let mut c = parse_file(path)?;
    apply_env(&mut c, |k| std::env::var(k).ok());
    Ok(c)
}

fn apply_env(c: &mut NodeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("APPHOST_NODE_NAME") {
        if !s.is_empty() {
            c.name = s;
        }
    }
    if let Some(s) = var("APPHOST_LISTEN_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.listen_port = p;
        }
    }
    if let Some(s) = var("APPHOST_BIND_ADDRESS") {
        if let Ok(a) = s.parse::<IpAddr>() {
            c.bind_address = a;
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/apphost/config.toml"));
    }
    out.push(PathBuf::from("/etc/apphost/config.toml"));
    out
}

fn parse_file(path: &Path) -> Result<NodeConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_file() -> Option<NodeConfig> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match parse_file(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring config file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults() {
        let c = NodeConfig::default();
        assert_eq!(c.name, "localnode");
        assert_eq!(c.listen_port, 8625);
        assert_eq!(c.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(c.query_timeout(), Duration::from_secs(10));
        assert!(c.contacts.is_empty());
    }

    #[test]
    fn parses_file_with_contacts() {
        let id = "ab".repeat(32);
        let f = write_config(&format!(
            r#"
name = "desk"
listen_port = 0

[[contacts]]
name = "laptop"
identity = "{id}"
address = "192.168.1.20:8625"
"#
        ));
        let c = parse_file(f.path()).unwrap();
        assert_eq!(c.name, "desk");
        assert_eq!(c.listen_port, 0);
        assert_eq!(c.query_timeout_ms, 10_000);
        assert_eq!(
            c.contacts,
            vec![Contact {
                name: "laptop".into(),
                identity: Identity::from_hex(&id).unwrap(),
                address: "192.168.1.20:8625".parse().unwrap(),
            }]
        );
    }

    #[test]
    fn rejects_unknown_keys_and_bad_identities() {
        let f = write_config("proxy_port = 3128\n");
        assert!(matches!(parse_file(f.path()), Err(ConfigError::Parse { .. })));
        let f = write_config(
            "[[contacts]]\nname = \"x\"\nidentity = \"beef\"\naddress = \"127.0.0.1:1\"\n",
        );
        assert!(matches!(parse_file(f.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("APPHOST_NODE_NAME", "override"),
            ("APPHOST_LISTEN_PORT", "9000"),
            ("APPHOST_BIND_ADDRESS", "0.0.0.0"),
        ]
        .into_iter()
        .collect();
        let mut c = NodeConfig::default();
        apply_env(&mut c, |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(c.name, "override");
        assert_eq!(c.listen_port, 9000);
        assert_eq!(c.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let mut c = NodeConfig::default();
        apply_env(&mut c, |k| {
            (k == "APPHOST_LISTEN_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(c.listen_port, 8625);
    }
}
