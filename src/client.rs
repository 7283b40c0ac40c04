use crate::config::Config;
use crate::output::Entry;
use crate::LdapError;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use ldap3_proto::proto::{
    LdapBindCred, LdapBindRequest, LdapDerefAliases, LdapExtendedRequest, LdapMsg, LdapOp,
    LdapResult, LdapResultCode, LdapSearchRequest, LdapSearchScope,
};
use ldap3_proto::{parse_ldap_filter_str, LdapCodec};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

pub const STARTTLS_OID: &str = "1.3.6.1.4.1.1466.20037";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub base: String,
    pub filter: String,
    pub attributes: Vec<String>,
    pub size_limit: i32,
    pub time_limit: i32,
}

impl From<&Config> for SearchParams {
    fn from(c: &Config) -> Self {
        SearchParams {
            base: c.search_base.clone(),
            filter: c.query.clone(),
            attributes: c.attributes.clone(),
            size_limit: c.size_limit,
            time_limit: c.time_limit,
        }
    }
}

/// A single LDAP connection. Every operation waits for its response before
/// returning, and dropping the client closes the underlying stream.
pub struct LdapClient<S> {
    framed: Framed<S, LdapCodec>,
    msgid: i32,
    timeout: Duration,
}

fn is_success(res: &LdapResult) -> bool {
    matches!(res.code, LdapResultCode::Success)
}

impl LdapClient<TcpStream> {
    pub async fn connect(hostname: &str, port: u16, op_timeout: Duration) -> Result<Self, LdapError> {
        debug!(%hostname, port, "connecting");
        let stream = timeout(op_timeout, TcpStream::connect((hostname, port)))
            .await
            .map_err(|_| {
                error!(%hostname, port, "timed out connecting");
                LdapError::Timeout
            })?
            .map_err(|e| {
                error!(?e, %hostname, port, "unable to connect");
                LdapError::ConnectError
            })?;

        info!(%hostname, port, "connected");
        Ok(LdapClient::new(stream, op_timeout))
    }
}

impl<S> LdapClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, op_timeout: Duration) -> Self {
        LdapClient {
            framed: Framed::new(stream, LdapCodec::default()),
            msgid: 0,
            timeout: op_timeout,
        }
    }

    async fn send(&mut self, op: LdapOp) -> Result<i32, LdapError> {
        self.msgid += 1;
        let msgid = self.msgid;
        let msg = LdapMsg {
            msgid,
            op,
            ctrl: Vec::new(),
        };

        match timeout(self.timeout, self.framed.send(msg)).await {
            Ok(Ok(())) => {
                trace!(msgid, "sent");
                Ok(msgid)
            }
            Ok(Err(e)) => {
                error!(?e, msgid, "unable to send request");
                Err(LdapError::ConnectError)
            }
            Err(_) => {
                error!(msgid, "timed out sending request");
                Err(LdapError::Timeout)
            }
        }
    }

    async fn recv(&mut self, msgid: i32) -> Result<LdapOp, LdapError> {
        let msg = match timeout(self.timeout, self.framed.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                error!(?e, msgid, "invalid response from directory");
                return Err(LdapError::InvalidProtocolState);
            }
            Ok(None) => {
                error!(msgid, "connection closed by directory");
                return Err(LdapError::ConnectError);
            }
            Err(_) => {
                error!(msgid, "timed out waiting for response");
                return Err(LdapError::Timeout);
            }
        };

        if msg.msgid != msgid {
            // Notice of disconnection is sent unsolicited with message id 0.
            match msg.op {
                LdapOp::ExtendedResponse(ext) => error!(
                    code = ?ext.res.code,
                    message = %ext.res.message,
                    "unsolicited notification from directory"
                ),
                op => error!(expected = msgid, got = msg.msgid, ?op, "response id mismatch"),
            }
            return Err(LdapError::InvalidProtocolState);
        }

        trace!(msgid, "received");
        Ok(msg.op)
    }

    /// Ask the directory to begin TLS, then perform the handshake over the
    /// same stream. The certificate must be valid for `hostname`.
    pub async fn start_tls(
        mut self,
        hostname: &str,
        ca_file: Option<&Path>,
    ) -> Result<LdapClient<SslStream<S>>, LdapError> {
        let msgid = self
            .send(LdapOp::ExtendedRequest(LdapExtendedRequest {
                name: STARTTLS_OID.to_string(),
                value: None,
            }))
            .await?;

        match self.recv(msgid).await? {
            LdapOp::ExtendedResponse(ext) if is_success(&ext.res) => {
                debug!("directory accepted StartTLS");
            }
            LdapOp::ExtendedResponse(ext) => {
                error!(
                    code = ?ext.res.code,
                    message = %ext.res.message,
                    "directory refused StartTLS"
                );
                return Err(LdapError::TlsError);
            }
            op => {
                error!(?op, "unexpected response to StartTLS");
                return Err(LdapError::InvalidProtocolState);
            }
        }

        let LdapClient {
            framed,
            msgid,
            timeout: op_timeout,
        } = self;

        let parts = framed.into_parts();
        if !parts.read_buf.is_empty() {
            error!("directory sent data before the TLS handshake");
            return Err(LdapError::InvalidProtocolState);
        }

        let ssl = tls_connector(ca_file)?
            .configure()
            .and_then(|c| c.into_ssl(hostname))
            .map_err(|e| {
                error!(?e, %hostname, "unable to configure TLS session");
                LdapError::TlsError
            })?;

        let mut tls = SslStream::new(ssl, parts.io).map_err(|e| {
            error!(?e, "unable to create TLS stream");
            LdapError::TlsError
        })?;

        match timeout(op_timeout, Pin::new(&mut tls).connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(?e, %hostname, "TLS handshake failed");
                return Err(LdapError::TlsError);
            }
            Err(_) => {
                error!(%hostname, "timed out during TLS handshake");
                return Err(LdapError::Timeout);
            }
        }

        info!(%hostname, "TLS established");
        Ok(LdapClient {
            framed: Framed::new(tls, LdapCodec::default()),
            msgid,
            timeout: op_timeout,
        })
    }

    /// Simple bind. The first message after securing the connection.
    pub async fn bind(&mut self, dn: &str, password: &str) -> Result<(), LdapError> {
        let msgid = self
            .send(LdapOp::BindRequest(LdapBindRequest {
                dn: dn.to_string(),
                cred: LdapBindCred::Simple(password.to_string()),
            }))
            .await?;

        match self.recv(msgid).await? {
            LdapOp::BindResponse(res) if is_success(&res.res) => {
                info!(%dn, "bind success");
                Ok(())
            }
            LdapOp::BindResponse(res) => {
                error!(
                    code = ?res.res.code,
                    message = %res.res.message,
                    %dn,
                    "bind rejected"
                );
                Err(LdapError::BindError)
            }
            op => {
                error!(?op, "unexpected response to bind");
                Err(LdapError::InvalidProtocolState)
            }
        }
    }

    /// One subtree search. Aliases are never dereferenced and only values
    /// are requested, not just types.
    pub async fn search(&mut self, params: &SearchParams) -> Result<Vec<Entry>, LdapError> {
        let filter = parse_ldap_filter_str(&params.filter).map_err(|e| {
            error!(?e, filter = %params.filter, "unable to parse filter");
            LdapError::InvalidFilter
        })?;

        let msgid = self
            .send(LdapOp::SearchRequest(LdapSearchRequest {
                base: params.base.clone(),
                scope: LdapSearchScope::Subtree,
                aliases: LdapDerefAliases::Never,
                sizelimit: params.size_limit,
                timelimit: params.time_limit,
                typesonly: false,
                filter,
                attrs: params.attributes.clone(),
            }))
            .await?;

        let mut entries = Vec::new();
        loop {
            match self.recv(msgid).await? {
                LdapOp::SearchResultEntry(e) => {
                    trace!(dn = %e.dn, "entry");
                    entries.push(Entry::from(e));
                }
                LdapOp::SearchResultReference(r) => {
                    debug!(?r, "skipping continuation reference");
                }
                LdapOp::SearchResultDone(res) if is_success(&res) => {
                    return Ok(entries);
                }
                LdapOp::SearchResultDone(res)
                    if matches!(res.code, LdapResultCode::SizeLimitExceeded) =>
                {
                    warn!(count = entries.len(), "size limit reached, results are incomplete");
                    return Ok(entries);
                }
                LdapOp::SearchResultDone(res) => {
                    error!(
                        code = ?res.code,
                        message = %res.message,
                        base = %params.base,
                        "search failed"
                    );
                    return Err(LdapError::SearchError);
                }
                op => {
                    error!(?op, "unexpected response to search");
                    return Err(LdapError::InvalidProtocolState);
                }
            }
        }
    }

    /// Send an unbind and shut the stream down. The directory does not
    /// reply to an unbind.
    pub async fn unbind(mut self) -> Result<(), LdapError> {
        self.send(LdapOp::UnbindRequest).await?;
        self.framed.get_mut().shutdown().await.map_err(|e| {
            debug!(?e, "error shutting down stream");
            LdapError::ConnectError
        })
    }
}

fn tls_connector(ca_file: Option<&Path>) -> Result<SslConnector, LdapError> {
    let mut builder = SslConnector::builder(SslMethod::tls_client()).map_err(|e| {
        error!(?e, "unable to create TLS connector");
        LdapError::TlsError
    })?;
    builder.set_verify(SslVerifyMode::PEER);

    if let Some(path) = ca_file {
        builder.set_ca_file(path).map_err(|e| {
            error!(?e, path = %path.display(), "unable to load CA file");
            LdapError::TlsError
        })?;
    }

    Ok(builder.build())
}
