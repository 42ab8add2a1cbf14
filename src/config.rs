//! Configuration resolution for the syringe server and client.
//!
//! Values follow a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SYRINGE_HOST` | `0.0.0.0` / `localhost` | Address to bind (server) or dial (client) |
//! | `SYRINGE_PORT` | 2222 / 22 | Port to bind (server) or dial (client) |
//! | `SYRINGE_HOST_KEY_PATH` | `.ssh/syringe_host_ed25519` | Server host key |
//! | `SYRINGE_ALLOWED_CLIENTS` | `SSH-2.0-Syringe` | Comma-separated client banners |
//! | `SYRINGE_KEY_ALGORITHMS` | `ssh-rsa` | Comma-separated user key algorithms |
//! | `SYRINGE_IDLE_TIMEOUT` | 30s | Per-connection inactivity timeout |
//! | `SYRINGE_SHUTDOWN_GRACE` | 30s | Grace period for in-flight sessions |
//! | `SYRINGE_DATA_DIR` | unset | Directory for store snapshots |
//! | `SYRINGE_CONNECT_TIMEOUT` | 30s | Client connection timeout |
//! | `SYRINGE_IDENTITY` | `~/.ssh/id_rsa` | Client identity (key path without `.pub`) |
//! | `SYRINGE_KNOWN_HOSTS` | `~/.ssh/known_hosts` | Client trust-on-first-use host key file |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Banner the syringe client announces during the SSH handshake.
pub const CLIENT_BANNER: &str = "SSH-2.0-Syringe";

/// Default server bind host
pub(crate) const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default client dial host
pub(crate) const DEFAULT_CLIENT_HOST: &str = "localhost";

/// Default server bind port
pub(crate) const DEFAULT_SERVER_PORT: u16 = 2222;

/// Default client dial port
pub(crate) const DEFAULT_CLIENT_PORT: u16 = 22;

/// Default host key location, relative to the working directory
pub(crate) const DEFAULT_HOST_KEY_PATH: &str = ".ssh/syringe_host_ed25519";

/// Default accepted user key algorithm
pub(crate) const DEFAULT_KEY_ALGORITHM: &str = "ssh-rsa";

/// Default per-connection inactivity timeout in seconds
pub(crate) const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Default graceful shutdown period in seconds
pub(crate) const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Default client connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

pub(crate) const HOST_ENV_VAR: &str = "SYRINGE_HOST";
pub(crate) const PORT_ENV_VAR: &str = "SYRINGE_PORT";
pub(crate) const HOST_KEY_PATH_ENV_VAR: &str = "SYRINGE_HOST_KEY_PATH";
pub(crate) const ALLOWED_CLIENTS_ENV_VAR: &str = "SYRINGE_ALLOWED_CLIENTS";
pub(crate) const KEY_ALGORITHMS_ENV_VAR: &str = "SYRINGE_KEY_ALGORITHMS";
pub(crate) const IDLE_TIMEOUT_ENV_VAR: &str = "SYRINGE_IDLE_TIMEOUT";
pub(crate) const SHUTDOWN_GRACE_ENV_VAR: &str = "SYRINGE_SHUTDOWN_GRACE";
pub(crate) const DATA_DIR_ENV_VAR: &str = "SYRINGE_DATA_DIR";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SYRINGE_CONNECT_TIMEOUT";
pub(crate) const IDENTITY_ENV_VAR: &str = "SYRINGE_IDENTITY";
pub(crate) const KNOWN_HOSTS_ENV_VAR: &str = "SYRINGE_KNOWN_HOSTS";

/// Resolve a string value with priority: parameter -> env var -> default
fn resolve_string(param: Option<String>, env_var: &str, default: &str) -> String {
    if let Some(value) = param {
        return value;
    }

    if let Ok(value) = env::var(env_var)
        && !value.trim().is_empty()
    {
        return value;
    }

    default.to_string()
}

/// Resolve a number of seconds with priority: parameter -> env var -> default
fn resolve_secs(param: Option<u64>, env_var: &str, default: u64) -> Duration {
    if let Some(secs) = param {
        return Duration::from_secs(secs);
    }

    if let Ok(value) = env::var(env_var)
        && let Ok(secs) = value.parse::<u64>()
    {
        return Duration::from_secs(secs);
    }

    Duration::from_secs(default)
}

/// Resolve a comma-separated list with priority: parameter -> env var -> default
fn resolve_list(param: Option<Vec<String>>, env_var: &str, default: &str) -> Vec<String> {
    if let Some(values) = param {
        return values;
    }

    let raw = env::var(env_var).unwrap_or_else(|_| default.to_string());
    let values: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    if values.is_empty() {
        vec![default.to_string()]
    } else {
        values
    }
}

/// Resolve the port with priority: parameter -> env var -> default
pub(crate) fn resolve_port(port_param: Option<u16>, default: u16) -> u16 {
    if let Some(port) = port_param {
        return port;
    }

    if let Ok(env_port) = env::var(PORT_ENV_VAR)
        && let Ok(port) = env_port.parse::<u16>()
    {
        return port;
    }

    default
}

/// Server settings, resolved once at startup and passed to constructors.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub host_key_path: PathBuf,
    pub allowed_clients: Vec<String>,
    pub key_algorithms: Vec<String>,
    pub idle_timeout: Duration,
    pub shutdown_grace: Duration,
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Resolve every server setting from the environment and defaults.
    pub fn from_env() -> Self {
        Self {
            host: resolve_string(None, HOST_ENV_VAR, DEFAULT_SERVER_HOST),
            port: resolve_port(None, DEFAULT_SERVER_PORT),
            host_key_path: PathBuf::from(resolve_string(
                None,
                HOST_KEY_PATH_ENV_VAR,
                DEFAULT_HOST_KEY_PATH,
            )),
            allowed_clients: resolve_list(None, ALLOWED_CLIENTS_ENV_VAR, CLIENT_BANNER),
            key_algorithms: resolve_list(None, KEY_ALGORITHMS_ENV_VAR, DEFAULT_KEY_ALGORITHM),
            idle_timeout: resolve_secs(None, IDLE_TIMEOUT_ENV_VAR, DEFAULT_IDLE_TIMEOUT_SECS),
            shutdown_grace: resolve_secs(
                None,
                SHUTDOWN_GRACE_ENV_VAR,
                DEFAULT_SHUTDOWN_GRACE_SECS,
            ),
            data_dir: env::var(DATA_DIR_ENV_VAR)
                .ok()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Client settings. Explicit values (command line) win over the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub identity: PathBuf,
    pub known_hosts: PathBuf,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn resolve(
        host: Option<String>,
        port: Option<u16>,
        identity: Option<PathBuf>,
        connect_timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            host: resolve_string(host, HOST_ENV_VAR, DEFAULT_CLIENT_HOST),
            port: resolve_port(port, DEFAULT_CLIENT_PORT),
            identity: identity.unwrap_or_else(|| {
                PathBuf::from(resolve_string(None, IDENTITY_ENV_VAR, &home_ssh("id_rsa")))
            }),
            known_hosts: PathBuf::from(resolve_string(
                None,
                KNOWN_HOSTS_ENV_VAR,
                &home_ssh("known_hosts"),
            )),
            connect_timeout: resolve_secs(
                connect_timeout_secs,
                CONNECT_TIMEOUT_ENV_VAR,
                DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
        }
    }
}

/// `file` under the user's `~/.ssh` directory.
fn home_ssh(file: &str) -> String {
    match env::var("HOME") {
        Ok(home) => format!("{}/.ssh/{}", home, file),
        Err(_) => format!(".ssh/{}", file),
    }
}
