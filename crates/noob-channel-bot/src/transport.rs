//! QUIC ingress for anonymous single-use requests.
//!
//! Each bidirectional stream carries exactly one request: the requester writes
//! its payload and finishes the stream, the bot answers with the serialized
//! channel definition and finishes its side. A failed admission resets the
//! stream instead of answering.
//!
//! # Security
//!
//! TLS 1.3 via `rustls`, ALPN `noob-channel`. Self-signed certificates
//! (generated when no PEM files are configured) are only suitable for local
//! testing.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use quinn::{ClientConfig, Endpoint, SendStream, ServerConfig, VarInt};

use crate::{
    dispatch::{
        DEFAULT_RESPONSE_TIMEOUT, SendError, SingleUseCallback, SingleUseRequest,
        SingleUseResponder,
    },
    error::TransportError,
};

/// ALPN protocol identifier
pub const ALPN_PROTOCOL: &[u8] = b"noob-channel";

/// Largest accepted request body
pub const MAX_REQUEST_BYTES: usize = 4096;

/// Largest accepted response body on the client side
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Stream reset code sent when a request gets no reply
const NO_REPLY: u32 = 1;

/// QUIC endpoint serving single-use requests.
pub struct QuinnTransport {
    endpoint: Endpoint,
    /// Longest wait for a requester to finish sending its payload
    read_timeout: Duration,
}

impl QuinnTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// If `cert_path` and `key_path` are provided, they will be used for TLS.
    /// Otherwise, a self-signed certificate will be generated for testing.
    pub fn bind(
        address: &str,
        cert_path: Option<&Path>,
        key_path: Option<&Path>,
    ) -> Result<Self, TransportError> {
        let addr: SocketAddr = address.parse().map_err(|e| {
            TransportError::Config(format!("invalid bind address '{address}': {e}"))
        })?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(cert, key)?,
            _ => generate_self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| TransportError::Connection(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        Ok(Self { endpoint, read_timeout: DEFAULT_RESPONSE_TIMEOUT })
    }

    /// Drop request streams whose payload is not complete within `timeout`.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.endpoint
            .local_addr()
            .map_err(|e| TransportError::Connection(format!("failed to get local address: {e}")))
    }

    /// Accept connections and hand every request stream to `handler` until
    /// the endpoint is closed.
    pub async fn serve(&self, handler: Arc<dyn SingleUseCallback>) -> Result<(), TransportError> {
        while let Some(incoming) = self.endpoint.accept().await {
            let handler = Arc::clone(&handler);
            let read_timeout = self.read_timeout;
            tokio::spawn(async move {
                match incoming.await {
                    Ok(connection) => handle_connection(connection, handler, read_timeout).await,
                    Err(e) => tracing::warn!("Incoming connection failed: {}", e),
                }
            });
        }

        Err(TransportError::Connection("endpoint closed".to_string()))
    }

    /// Stop accepting and close every open connection.
    pub fn close(&self) {
        self.endpoint.close(VarInt::from_u32(0), b"shutdown");
    }
}

async fn handle_connection(
    connection: quinn::Connection,
    handler: Arc<dyn SingleUseCallback>,
    read_timeout: Duration,
) {
    let remote = connection.remote_address();
    tracing::debug!("Connection from {}", remote);

    loop {
        let (send, mut recv) = match connection.accept_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                tracing::debug!("Connection from {} closed: {}", remote, e);
                return;
            },
        };

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut responder =
                QuicResponder { stream: Some(send), runtime: tokio::runtime::Handle::current() };

            let read = tokio::time::timeout(read_timeout, recv.read_to_end(MAX_REQUEST_BYTES));
            let payload = match read.await {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => {
                    tracing::warn!("Dropping request from {}: {}", remote, e);
                    responder.reset();
                    return;
                },
                Err(_) => {
                    tracing::warn!(
                        "Dropping request from {}: payload incomplete after {:?}",
                        remote,
                        read_timeout
                    );
                    responder.reset();
                    return;
                },
            };

            let request = SingleUseRequest {
                origin: remote.to_string(),
                payload,
                responder: Box::new(responder),
            };

            // Admission does synchronous storage and filesystem I/O
            if let Err(e) = tokio::task::spawn_blocking(move || handler.callback(request)).await {
                tracing::error!("Single-use handler for {} failed: {}", remote, e);
            }
        });
    }
}

/// Reply path over one QUIC stream. Resets the stream if dropped unanswered.
struct QuicResponder {
    stream: Option<SendStream>,
    runtime: tokio::runtime::Handle,
}

impl QuicResponder {
    fn reset(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Already closed by the peer; nothing to tell them
            let _ = stream.reset(VarInt::from_u32(NO_REPLY));
        }
    }
}

impl SingleUseResponder for QuicResponder {
    fn respond(mut self: Box<Self>, payload: &[u8], timeout: Duration) -> Result<(), SendError> {
        let Some(mut stream) = self.stream.take() else {
            return Err(SendError("stream already answered".to_string()));
        };

        self.runtime.block_on(async move {
            let write = async {
                stream
                    .write_all(payload)
                    .await
                    .map_err(|e| SendError(format!("write failed: {e}")))?;
                stream.finish().map_err(|e| SendError(format!("finish failed: {e}")))
            };

            tokio::time::timeout(timeout, write)
                .await
                .map_err(|_| SendError(format!("response timed out after {timeout:?}")))?
        })
    }
}

impl Drop for QuicResponder {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Request the current channel from a bot at `server`.
///
/// Returns the serialized channel definition.
pub async fn request_channel(
    server: SocketAddr,
    server_name: &str,
    client_config: ClientConfig,
    payload: &[u8],
) -> Result<Vec<u8>, TransportError> {
    let bind: SocketAddr = if server.is_ipv6() {
        SocketAddr::from(([0u16; 8], 0))
    } else {
        SocketAddr::from(([0u8; 4], 0))
    };
    let mut endpoint = Endpoint::client(bind)
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(client_config);

    let connection = endpoint
        .connect(server, server_name)
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (mut send, mut recv) = connection
        .open_bi()
        .await
        .map_err(|e| TransportError::Connection(format!("open_bi failed: {e}")))?;
    send.write_all(payload)
        .await
        .map_err(|e| TransportError::Connection(format!("write failed: {e}")))?;
    send.finish().map_err(|e| TransportError::Connection(format!("finish failed: {e}")))?;

    let response = recv
        .read_to_end(MAX_RESPONSE_BYTES)
        .await
        .map_err(|e| TransportError::Connection(format!("no reply: {e}")))?;

    connection.close(VarInt::from_u32(0), b"done");
    endpoint.wait_idle().await;

    Ok(response)
}

/// Client config that accepts any server certificate.
///
/// WARNING: Development only. Pairs with the self-signed server certificate.
pub fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Config(format!("QUIC config error: {e}")))?;
    Ok(ClientConfig::new(Arc::new(quic)))
}

/// Load TLS configuration from certificate and key files.
fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig, TransportError> {
    use std::fs;

    let cert_pem = fs::read(cert_path).map_err(|e| {
        TransportError::Config(format!("failed to read cert '{}': {e}", cert_path.display()))
    })?;

    let key_pem = fs::read(key_path).map_err(|e| {
        TransportError::Config(format!("failed to read key '{}': {e}", key_path.display()))
    })?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| TransportError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| TransportError::Config("no private key found".to_string()))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TransportError::Config(format!("invalid TLS config: {e}")))?;

    quic_server_config(tls_config)
}

/// Generate a self-signed certificate for testing.
fn generate_self_signed_config() -> Result<ServerConfig, TransportError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).map_err(|e| {
        TransportError::Config(format!("failed to generate self-signed cert: {e}"))
    })?;

    let cert_der = cert.cert.der().clone();
    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key.into())
        .map_err(|e| TransportError::Config(format!("invalid TLS config: {e}")))?;

    tracing::warn!("Using self-signed certificate - not for production use!");

    quic_server_config(tls_config)
}

fn quic_server_config(
    mut tls_config: rustls::ServerConfig,
) -> Result<ServerConfig, TransportError> {
    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
        .map_err(|e| TransportError::Config(format!("QUIC config error: {e}")))?;
    Ok(ServerConfig::with_crypto(Arc::new(crypto)))
}

/// Certificate verifier that accepts any certificate.
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
