#![warn(unused_extern_crates)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use serde::Serialize;
use std::fmt;

pub use std::time::Duration;
pub use tracing::{debug, error, info, trace, warn};

pub mod client;
pub mod config;
pub mod output;

pub use crate::client::{LdapClient, SearchParams};
pub use crate::config::{Config, ConfigOverrides, OutputFormat};
pub use crate::output::{write_entries, write_entries_json, Attribute, Entry};

/// Failure of any stage of a query run. The discriminant is the process
/// exit code reported by the `ldapq` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum LdapError {
    UsageError = 2,
    InvalidUrl = 3,
    ConnectError = 4,
    TlsError = 5,
    PasswordNotFound = 6,
    BindError = 7,
    InvalidFilter = 8,
    SearchError = 9,
    Timeout = 10,
    InvalidProtocolState = 11,
    OutputError = 12,
}

impl fmt::Display for LdapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LdapError::UsageError => write!(f, "usage: ldapq <query> [attribute attribute...]"),
            LdapError::InvalidUrl => write!(f, "Invalid URL, only ldap:// is supported"),
            LdapError::ConnectError => write!(f, "Failed to connect to host"),
            LdapError::TlsError => write!(f, "Failed to establish TLS with StartTLS"),
            LdapError::PasswordNotFound => write!(f, "No password was provided"),
            LdapError::BindError => write!(f, "Bind was rejected by the directory"),
            LdapError::InvalidFilter => write!(f, "Invalid search filter"),
            LdapError::SearchError => write!(f, "Search failed"),
            LdapError::Timeout => write!(f, "Operation timed out"),
            LdapError::InvalidProtocolState => {
                write!(f, "Directory sent an unexpected or invalid response")
            }
            LdapError::OutputError => write!(f, "Failed to write results"),
        }
    }
}

impl LdapError {
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

/// Install the stderr tracing subscriber. `RUST_LOG` overrides the level
/// picked by `verbose`.
pub fn start_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Connect, secure, then hand over to `run_on`. The connection is closed on
/// every path once it has been opened.
pub async fn run_query<W: std::io::Write>(config: &Config, out: &mut W) -> Result<usize, LdapError> {
    let client = LdapClient::connect(&config.hostname, config.port, config.timeout).await?;
    let client = client
        .start_tls(&config.hostname, config.ca_file.as_deref())
        .await?;

    run_on(client, config, out).await
}

/// Bind, search, write the entries and unbind on an established client.
/// Entries are written before the unbind is sent.
pub async fn run_on<S, W>(
    mut client: LdapClient<S>,
    config: &Config,
    out: &mut W,
) -> Result<usize, LdapError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    W: std::io::Write,
{
    let password = config.bind_password.as_deref().unwrap_or_default();
    client.bind(&config.bind_dn, password).await?;

    let entries = client.search(&SearchParams::from(config)).await?;
    info!(count = entries.len(), "search complete");

    match config.output {
        OutputFormat::Text => write_entries(out, &entries),
        OutputFormat::Json => write_entries_json(out, &entries),
    }
    .map_err(|e| {
        error!(?e, "failed to write entries");
        LdapError::OutputError
    })?;

    if let Err(e) = client.unbind().await {
        // Results are already out; a failed unbind does not change the outcome.
        debug!(?e, "unbind failed");
    }

    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{jdoe_entry, serve, Directory, JDOE_DN, JDOE_PW, TIMEOUT};
    use ldap3_proto::proto::LdapOp;
    use std::io::{self, Write};
    use tokio::io::duplex;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn jdoe_config(output: OutputFormat) -> Config {
        Config::resolve(
            ConfigOverrides {
                user_dn: Some(JDOE_DN.to_string()),
                password: Some(JDOE_PW.to_string()),
                query: Some("(uid=jdoe)".to_string()),
                attributes: vec!["mail".to_string()],
                json: output == OutputFormat::Json,
                ..Default::default()
            },
            |_| None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn run_on_writes_entries_then_unbinds() {
        let (client_io, server_io) = duplex(64 * 1024);
        let server = serve(
            server_io,
            Directory {
                entries: vec![jdoe_entry()],
                ..Default::default()
            },
        );

        let mut out = Vec::new();
        let client = LdapClient::new(client_io, TIMEOUT);
        let count = run_on(client, &jdoe_config(OutputFormat::Text), &mut out)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "dn: uid=jdoe,ou=users,dc=puppetlabs,dc=com\nmail: jdoe@example.com\n"
        );

        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], LdapOp::BindRequest(_)));
        assert!(matches!(seen[1], LdapOp::SearchRequest(_)));
        assert!(matches!(seen[2], LdapOp::UnbindRequest));
    }

    #[tokio::test]
    async fn run_on_json_output() {
        let (client_io, server_io) = duplex(64 * 1024);
        let _server = serve(
            server_io,
            Directory {
                entries: vec![jdoe_entry()],
                ..Default::default()
            },
        );

        let mut out = Vec::new();
        let client = LdapClient::new(client_io, TIMEOUT);
        run_on(client, &jdoe_config(OutputFormat::Json), &mut out)
            .await
            .unwrap();

        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v[0]["dn"], JDOE_DN);
        assert_eq!(v[0]["attributes"][0]["values"][0], "jdoe@example.com");
    }

    #[tokio::test]
    async fn run_on_write_failure_is_output_error() {
        let (client_io, server_io) = duplex(64 * 1024);
        let server = serve(
            server_io,
            Directory {
                entries: vec![jdoe_entry()],
                ..Default::default()
            },
        );

        let client = LdapClient::new(client_io, TIMEOUT);
        let r = run_on(client, &jdoe_config(OutputFormat::Text), &mut BrokenPipe).await;
        assert_eq!(r, Err(LdapError::OutputError));

        // The client was dropped without an unbind once writing failed.
        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen.iter().any(|op| matches!(op, LdapOp::UnbindRequest)));
    }

    #[tokio::test]
    async fn run_on_stops_at_rejected_bind() {
        let (client_io, server_io) = duplex(64 * 1024);
        let server = serve(server_io, Directory::default());

        let mut config = jdoe_config(OutputFormat::Text);
        config.bind_password = Some("wrong".to_string());

        let mut out = Vec::new();
        let client = LdapClient::new(client_io, TIMEOUT);
        let r = run_on(client, &config, &mut out).await;
        assert_eq!(r, Err(LdapError::BindError));
        assert!(out.is_empty());

        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn exit_codes_are_non_zero_and_distinct() {
        let all = [
            LdapError::UsageError,
            LdapError::InvalidUrl,
            LdapError::ConnectError,
            LdapError::TlsError,
            LdapError::PasswordNotFound,
            LdapError::BindError,
            LdapError::InvalidFilter,
            LdapError::SearchError,
            LdapError::Timeout,
            LdapError::InvalidProtocolState,
            LdapError::OutputError,
        ];
        let mut codes: Vec<i32> = all.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn usage_error_displays_usage_line() {
        assert_eq!(
            LdapError::UsageError.to_string(),
            "usage: ldapq <query> [attribute attribute...]"
        );
    }

    #[test]
    fn errors_serialise_by_name() {
        let s = serde_json::to_string(&LdapError::BindError).unwrap();
        assert_eq!(s, "\"BindError\"");
    }
}
