//! Layered configuration: built in defaults, then the environment, then
//! command line flags. Resolved once, then read only.

use crate::LdapError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_HOSTNAME: &str = "ldap.puppetlabs.com";
pub const DEFAULT_PORT: u16 = 389;
pub const DEFAULT_SEARCH_BASE: &str = "dc=puppetlabs,dc=com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const USERNAME_ENV: &str = "puppetpass_username";
pub const PASSWORD_ENV: &str = "puppetpass_password";

/// Bind DN for a user in the people container.
pub fn user_dn(username: &str) -> String {
    format!("uid={},ou=users,dc=puppetlabs,dc=com", username)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Values supplied on the command line. Anything left as `None` falls
/// through to the environment or the defaults.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub url: Option<Url>,
    pub search_base: Option<String>,
    pub user_dn: Option<String>,
    pub password: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub size_limit: Option<i32>,
    pub time_limit: Option<i32>,
    pub json: bool,
    pub query: Option<String>,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub hostname: String,
    pub port: u16,
    pub search_base: String,
    pub bind_dn: String,
    pub bind_password: Option<String>,
    pub query: String,
    pub attributes: Vec<String>,
    pub ca_file: Option<PathBuf>,
    pub timeout: Duration,
    pub size_limit: i32,
    pub time_limit: i32,
    pub output: OutputFormat,
}

impl Config {
    /// Resolve from the process environment.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, LdapError> {
        Self::resolve(overrides, |k| std::env::var(k).ok())
    }

    /// Resolve with an explicit environment lookup. Fails with
    /// `UsageError` when no query was given, before anything else is read.
    pub fn resolve<F>(overrides: ConfigOverrides, env: F) -> Result<Self, LdapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let query = overrides.query.ok_or(LdapError::UsageError)?;

        let (url_host, url_port) = match &overrides.url {
            Some(u) => {
                let (h, p) = host_port_from_url(u)?;
                (Some(h), p)
            }
            None => (None, None),
        };

        let hostname = overrides
            .hostname
            .or(url_host)
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());
        let port = overrides.port.or(url_port).unwrap_or(DEFAULT_PORT);

        let username = env(USERNAME_ENV).unwrap_or_default();
        let bind_dn = overrides.user_dn.unwrap_or_else(|| user_dn(&username));

        let bind_password = overrides
            .password
            .or_else(|| env(PASSWORD_ENV))
            .filter(|p| !p.is_empty());

        let config = Config {
            hostname,
            port,
            search_base: overrides
                .search_base
                .unwrap_or_else(|| DEFAULT_SEARCH_BASE.to_string()),
            bind_dn,
            bind_password,
            query,
            attributes: overrides.attributes,
            ca_file: overrides.ca_file,
            timeout: Duration::from_secs(overrides.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            size_limit: overrides.size_limit.unwrap_or(0),
            time_limit: overrides.time_limit.unwrap_or(0),
            output: if overrides.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
        };

        debug!(
            hostname = %config.hostname,
            port = config.port,
            search_base = %config.search_base,
            bind_dn = %config.bind_dn,
            "resolved configuration"
        );
        Ok(config)
    }
}

fn host_port_from_url(url: &Url) -> Result<(String, Option<u16>), LdapError> {
    if url.scheme() != "ldap" {
        error!(scheme = %url.scheme(), "unsupported url scheme, StartTLS requires ldap://");
        return Err(LdapError::InvalidUrl);
    }
    let host = url.host_str().ok_or_else(|| {
        error!(%url, "url has no host");
        LdapError::InvalidUrl
    })?;
    Ok((host.to_string(), url.port()))
}
