use thiserror::Error;

/// Errors internal to this demo's OpenBao/Vault signer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Vault request failed: {0}")]
    VaultRequestFailed(#[source] vaultrs::error::ClientError),
    #[error("CSR creation failed: {0}")]
    CsrCreate(#[source] rcgen::Error),
    #[error("DER encoding failed: {0}")]
    Der(#[source] der::Error),
    #[error("PEM decoding failed: {0}")]
    Pem(#[source] pem::PemError),
    #[error("failed to sign certificate: {0}")]
    Signing(String),
}
