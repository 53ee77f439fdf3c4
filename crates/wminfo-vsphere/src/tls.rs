//! TLS probe and certificate thumbprints.
//!
//! The probe only completes a handshake and records the peer chain;
//! no HTTP request is sent.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::{InventoryError, InventoryResult};
use crate::session::CertificateChain;
use crate::types::FingerprintAlgorithm;

/// Handshake with `host:port` and return the presented chain, leaf first.
pub async fn probe_certificate_chain(
    host: &str,
    port: u16,
    insecure: bool,
    timeout: Duration,
) -> InventoryResult<CertificateChain> {
    let config = client_config(insecure)?;
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| InventoryError::connection(format!("Invalid server name '{host}': {e}")))?;

    log::debug!("Probing TLS certificate of {host}:{port}");
    let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| InventoryError::timeout(format!("TCP connect to {host}:{port} timed out")))??;
    let mut tls = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| InventoryError::timeout(format!("TLS handshake with {host}:{port} timed out")))?
        .map_err(|e| InventoryError::connection(format!("TLS handshake with {host}:{port} failed: {e}")))?;

    let chain: Vec<Vec<u8>> = tls
        .get_ref()
        .1
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
        .unwrap_or_default();
    let _ = tls.shutdown().await;

    if chain.is_empty() {
        return Err(InventoryError::connection(format!(
            "{host}:{port} presented no certificate"
        )));
    }
    log::debug!("{host}:{port} presented {} certificate(s)", chain.len());
    Ok(CertificateChain(chain))
}

fn client_config(insecure: bool) -> InventoryResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?;

    if insecure {
        log::warn!("TLS certificate verification disabled, accepting any certificate");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        log::debug!("Skipping native root: {err}");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    log::debug!("Loaded {added} native root(s), ignored {ignored}");
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

/// Accepts any server certificate. Used only when the caller opted out
/// of verification.
#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
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
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ── Thumbprints ─────────────────────────────────────────────────────

/// Hash a DER certificate and format it as `AA:BB:...`.
pub fn fingerprint(der: &[u8], algorithm: FingerprintAlgorithm) -> String {
    match algorithm {
        FingerprintAlgorithm::Sha1 => format_fingerprint(&Sha1::digest(der)),
        FingerprintAlgorithm::Sha256 => format_fingerprint(&Sha256::digest(der)),
    }
}

/// Uppercase hex byte pairs joined by colons.
pub fn format_fingerprint(digest: &[u8]) -> String {
    let hex: Vec<String> = digest.iter().map(|b| format!("{b:02X}")).collect();
    hex.join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_empty_input() {
        assert_eq!(
            fingerprint(b"", FingerprintAlgorithm::Sha1),
            "DA:39:A3:EE:5E:6B:4B:0D:32:55:BF:EF:95:60:18:90:AF:D8:07:09"
        );
    }

    #[test]
    fn sha256_has_32_pairs() {
        let fp = fingerprint(b"certificate", FingerprintAlgorithm::Sha256);
        assert_eq!(fp.split(':').count(), 32);
        assert!(fp.chars().all(|c| c == ':' || c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn format_pads_single_digits() {
        assert_eq!(format_fingerprint(&[0x0a, 0xff, 0x00]), "0A:FF:00");
        assert_eq!(format_fingerprint(&[]), "");
    }

    #[test]
    fn both_configs_build() {
        assert!(client_config(true).is_ok());
        assert!(client_config(false).is_ok());
    }

    #[tokio::test]
    async fn probe_of_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = probe_certificate_chain("127.0.0.1", port, true, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(!err.message.is_empty());
    }
}
