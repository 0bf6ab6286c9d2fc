//! TCP and TLS transport setup.
//!
//! The pipeline only needs a byte stream; this module produces one from a
//! [`ServerConfig`], optionally wrapped in TLS with a client certificate.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::ServerConfig;
use crate::irc::error::SessionError;

/// An open connection to the server, not yet speaking IRC.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

pub async fn connect(server: &ServerConfig) -> Result<Transport, SessionError> {
    let addr = server.addr();
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| SessionError::Connect {
            addr: addr.clone(),
            source: Arc::new(e),
        })?;
    tracing::info!(%addr, tls = server.tls, "tcp connected");

    if !server.tls {
        return Ok(Transport::Plain(tcp));
    }

    let tls_err = |reason: String| SessionError::Tls {
        host: server.host.clone(),
        reason,
    };
    let config = client_config(server)?;
    let connector = TlsConnector::from(Arc::new(config));
    let name = ServerName::try_from(server.host.clone()).map_err(|e| tls_err(e.to_string()))?;
    let stream = connector
        .connect(name, tcp)
        .await
        .map_err(|e| tls_err(e.to_string()))?;
    tracing::info!(host = %server.host, verify = !server.accept_invalid_certs, "tls handshake complete");

    Ok(Transport::Tls(Box::new(stream)))
}

fn client_config(server: &ServerConfig) -> Result<ClientConfig, SessionError> {
    let builder = if server.accept_invalid_certs {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
    } else {
        ClientConfig::builder().with_root_certificates(native_roots())
    };

    match (&server.client_cert, &server.client_key) {
        (Some(cert), Some(key)) => {
            let certs = load_certs(cert)?;
            let key = load_key(key)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| SessionError::Certificate(e.to_string()))
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        tracing::warn!(error = %e, "error loading native certs");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            tracing::warn!(error = %e, "failed to add root cert");
        }
    }
    roots
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, SessionError> {
    let file = File::open(path)
        .map_err(|e| SessionError::Certificate(format!("{}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SessionError::Certificate(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(SessionError::Certificate(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, SessionError> {
    let file = File::open(path)
        .map_err(|e| SessionError::Certificate(format!("{}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| SessionError::Certificate(format!("{}: {e}", path.display())))?
        .ok_or_else(|| {
            SessionError::Certificate(format!("no private key found in {}", path.display()))
        })
}

/// Verifier for `accept_invalid_certs`: trusts whatever the server presents.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_certs_rejects_empty_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();
        assert!(matches!(
            load_certs(file.path()),
            Err(SessionError::Certificate(_))
        ));
    }

    #[test]
    fn test_load_key_missing_file() {
        let err = load_key(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/key.pem"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let server = ServerConfig {
            host: "127.0.0.1".into(),
            port,
            tls: false,
            ..ServerConfig::default()
        };
        assert!(matches!(
            connect(&server).await,
            Err(SessionError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_plain() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = ServerConfig {
            host: "127.0.0.1".into(),
            port,
            tls: false,
            ..ServerConfig::default()
        };
        let (accepted, connected) = tokio::join!(listener.accept(), connect(&server));
        accepted.unwrap();
        assert!(matches!(connected, Ok(Transport::Plain(_))));
    }
}
