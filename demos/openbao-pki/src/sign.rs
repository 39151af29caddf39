use std::{str::FromStr, time::Duration};

use der::{Decode, DecodePem};
use ecdsa::SigningKey;
use p256::NistP256;
use pkcs8::DecodePrivateKey;
use rcgen::KeyPair;
use spki::SubjectPublicKeyInfoOwned;
use tracing::{debug, warn};
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    name::Name,
    request::CertReq,
    serial_number::SerialNumber,
    time::Validity,
};

use crate::error::Error;

/// Extracts the subject public key (and, if present, the subject name) out
/// of an opaque CSR byte blob, tolerating both PEM and raw DER PKCS#10
/// encodings — callers of `Signer::sign` don't constrain which one a
/// request carries.
pub fn parse_csr(csr: &[u8]) -> Result<(SubjectPublicKeyInfoOwned, Option<Name>), Error> {
    let looks_pem = csr.starts_with(b"-----BEGIN");
    let req = if looks_pem {
        let text = std::str::from_utf8(csr).map_err(|_| Error::Signing("CSR is not valid UTF-8 PEM".into()))?;
        CertReq::from_pem(text).map_err(Error::Der)?
    } else {
        CertReq::from_der(csr).map_err(Error::Der)?
    };
    Ok((req.info.public_key, Some(req.info.subject)))
}

/// Signs a leaf certificate for `subject_public_key` using an intermediate
/// CA certificate and an explicit common name.
pub fn sign_certificate(
    subject_public_key: SubjectPublicKeyInfoOwned,
    ca_cert_pem: &str,
    ca_keypair: &KeyPair,
    cn: &str,
) -> Result<x509_cert::Certificate, Error> {
    debug!("Signing certificate for CN={}", cn);

    let ca_cert = x509_cert::Certificate::from_pem(ca_cert_pem).map_err(|e| {
        warn!("Failed to parse CA certificate from PEM: {:?}", e);
        Error::Der(e)
    })?;
    let issuer_name = ca_cert.tbs_certificate.subject.clone();

    let cn_formatted = if cn.is_empty() {
        "CN=certificate-request".to_string()
    } else {
        format!("CN={cn}")
    };
    let subject = Name::from_str(&cn_formatted)
        .unwrap_or_else(|_| Name::from_str("CN=certificate-request").unwrap());
    let serial_number = SerialNumber::from(u64::from_be_bytes(rand::random::<[u8; 8]>()));
    let validity = Validity::from_now(Duration::from_secs(86400)).map_err(|e| {
        warn!("Failed to create validity period: {:?}", e);
        Error::Der(e)
    })?;
    let ca_key_der = ca_keypair.serialize_der();
    let signing_key = SigningKey::<NistP256>::from_pkcs8_der(&ca_key_der).map_err(|e| {
        warn!("Failed to convert CA keypair to ECDSA signing key: {:?}", e);
        Error::Signing(format!("key conversion failed: {e}"))
    })?;

    let builder = CertificateBuilder::new(
        Profile::Leaf {
            issuer: issuer_name,
            enable_key_agreement: false,
            enable_key_encipherment: false,
        },
        serial_number,
        validity,
        subject,
        subject_public_key,
        &signing_key,
    )
    .map_err(|e| {
        warn!("Failed to create certificate builder: {:?}", e);
        Error::Signing(format!("certificate builder creation failed: {e}"))
    })?;

    builder.build::<p256::ecdsa::DerSignature>().map_err(|e| {
        warn!("Failed to sign certificate: {:?}", e);
        Error::Signing(format!("certificate signing failed: {e}"))
    })
}
