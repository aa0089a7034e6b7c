//! Internal module for establishing TLS connections to the mail server.
//!
//! Supports both direct connections and SOCKS5 proxy connections.

use crate::config::ServerAddress;
use crate::error::{Error, Result};
use crate::proxy::Socks5Proxy;
use rustls::ClientConfig;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP communication.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Opens a TLS connection to `server`, routed through `proxy` when one is set.
#[instrument(
    name = "connection::open_tls",
    skip_all,
    fields(server = %server, proxy_enabled = proxy.is_some())
)]
pub(crate) async fn open_tls(server: &ServerAddress, proxy: Option<&Socks5Proxy>) -> Result<TlsStream> {
    let target = server.to_string();
    let server_name = parse_server_name(&server.host)?;
    let tcp_stream = connect_tcp(&target, proxy).await?;

    debug!("Performing TLS handshake");

    tls_connector()
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| Error::TlsConnect { target, source })
}

/// Creates a TLS connector trusting the webpki root set.
fn tls_connector() -> TlsConnector {
    let mut root_cert_store = rustls::RootCertStore::empty();
    root_cert_store.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(tls_config))
}

/// Parses server name for TLS SNI.
fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}

async fn connect_tcp(target: &str, proxy: Option<&Socks5Proxy>) -> Result<TcpStream> {
    match proxy {
        Some(proxy) => connect_via_socks5(target, proxy).await,
        None => {
            debug!(target, "Establishing direct TCP connection");
            TcpStream::connect(target)
                .await
                .map_err(|source| Error::TcpConnect {
                    target: target.to_string(),
                    source,
                })
        }
    }
}

#[instrument(
    name = "connection::socks5",
    skip_all,
    fields(proxy_host = %proxy.host, has_auth = proxy.requires_auth())
)]
async fn connect_via_socks5(target: &str, proxy: &Socks5Proxy) -> Result<TcpStream> {
    debug!(proxy = %proxy, target, "Connecting via SOCKS5 proxy");

    let proxy_addr = (proxy.host.as_str(), proxy.port);

    let stream = match &proxy.auth {
        Some(auth) => {
            Socks5Stream::connect_with_password(proxy_addr, target, &auth.username, auth.password())
                .await
        }
        None => Socks5Stream::connect(proxy_addr, target).await,
    };

    stream
        .map(Socks5Stream::into_inner)
        .map_err(|source| Error::Socks5Connect {
            proxy_host: proxy.host.clone(),
            target: target.to_string(),
            source,
        })
}
