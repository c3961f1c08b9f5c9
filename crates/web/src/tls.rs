//! TLS configuration loading.

use anyhow::{bail, Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::aws_lc_rs::default_provider;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{version, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

fn open(path: &str) -> Result<BufReader<File>> {
    Ok(BufReader::new(
        File::open(path).with_context(|| format!("open {path}"))?,
    ))
}

/// First private key in `path`, PKCS#8 then PKCS#1.
fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    if let Some(key) = pkcs8_private_keys(&mut open(path)?).flatten().next() {
        return Ok(PrivateKeyDer::from(key));
    }
    if let Some(key) = rsa_private_keys(&mut open(path)?).flatten().next() {
        return Ok(PrivateKeyDer::from(key));
    }
    bail!("no private key found in {path} (tried PKCS#8, PKCS#1)");
}

fn load_cert_chain(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let chain = certs(&mut open(path)?)
        .collect::<Result<Vec<CertificateDer>, _>>()
        .with_context(|| format!("parse certificates in {path}"))?;
    if chain.is_empty() {
        bail!("no certificates found in {path}");
    }
    Ok(chain)
}

/// TLS 1.2 + 1.3 server config with ALPN for h2 and http/1.1.
pub fn rustls_config_from_paths(cert_path: &str, key_path: &str) -> Result<RustlsConfig> {
    let certs = load_cert_chain(cert_path)?;
    let key = load_private_key(key_path)?;

    // Explicit provider: reqwest pulls in ring, so there is no single process default.
    let provider = <Arc<CryptoProvider>>::from(default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&version::TLS13, &version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(config)))
}
