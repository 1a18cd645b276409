//! Relaxed TLS parameters for talking to the exchange.
//!
//! The exchange's factory certificate and default Diffie-Hellman parameters
//! are rejected by modern OpenSSL defaults (`DH_KEY_TOO_SMALL`). We lower
//! the security level and disable hostname/certificate verification; the
//! exchange is reached over a trusted internal network, not the public
//! internet.

use native_tls::TlsConnector;

use crate::error::Result;

pub fn build_connector() -> Result<TlsConnector> {
    // native_tls has no portable equivalent of OpenSSL's `SECLEVEL=1` cipher
    // string; disabling cert/hostname verification is the reachable subset
    // of the original client's relaxation on this platform-independent API.
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| crate::error::MonitorError::internal(format!("failed to build TLS connector: {e}")))?;
    Ok(connector)
}
