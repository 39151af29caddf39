//! An `issuer_lib::Signer<Issuer>` implementation: generates its own
//! in-memory intermediate CA from an OpenBao root the first time it's
//! needed, then signs leaf certificates against it, driven by the engine's
//! `Check`/`Sign` contract instead of a bespoke reconcile loop.

use std::sync::Arc;

use async_trait::async_trait;
use der::EncodePem;
use issuer_lib::{CheckError, PemBundle, RequestView, Signer, SignerError};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vaultrs::{api::pki::requests::SignIntermediateRequestBuilder, client::VaultClient};

use crate::{ca_certificate::CaCertificate, error::Error, issuer::Issuer, sign};

/// A client that manages its own in-memory intermediate CA, generated from
/// an OpenBao/Vault root CA the first time a leaf certificate is needed.
/// The PKI mount and CA common name come from the registered `Issuer`
/// resource's spec.
pub struct OpenBaoSigner {
    bao: VaultClient,
    ca: Arc<RwLock<Option<CaCertificate>>>,
}

impl OpenBaoSigner {
    pub fn new(bao: VaultClient) -> Self {
        Self {
            bao,
            ca: Arc::new(RwLock::new(None)),
        }
    }

    async fn issue_ca_certificate(&self, issuer: &Issuer) -> Result<(), Error> {
        debug!("generating CA KeyPair");
        let ca_key_pair = KeyPair::generate().map_err(|e| {
            warn!("Failed to generate CA keypair: {:?}", e);
            Error::CsrCreate(e)
        })?;

        let common_name = issuer
            .spec
            .common_name
            .clone()
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());

        let mut params = CertificateParams::new(vec![common_name.clone()]).map_err(|e| {
            warn!("Failed to create certificate params: {:?}", e);
            Error::CsrCreate(e)
        })?;
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, &common_name);

        let csr = params.serialize_request(&ca_key_pair).map_err(|e| {
            warn!("Failed to serialize CSR: {:?}", e);
            Error::CsrCreate(e)
        })?;
        let csr_pem = csr.pem().map_err(|e| {
            warn!("Failed to encode CSR to PEM: {:?}", e);
            Error::CsrCreate(e)
        })?;

        let mut request_options = SignIntermediateRequestBuilder::default();
        request_options.ttl("168h");

        let intermediate = vaultrs::pki::cert::ca::sign_intermediate(
            &self.bao,
            &issuer.spec.mount,
            &csr_pem,
            &common_name,
            Some(&mut request_options),
        )
        .await
        .map_err(|e| {
            warn!("Vault failed to sign intermediate CA: {:?}", e);
            Error::VaultRequestFailed(e)
        })?;

        info!(mount = %issuer.spec.mount, "intermediate CA certificate issued from Vault");
        self.ca.write().await.replace((ca_key_pair, intermediate).into());
        Ok(())
    }

    async fn ensure_ca(&self, issuer: &Issuer) -> Result<(), Error> {
        if self.ca.read().await.is_none() {
            info!("issuing intermediate CA certificate");
            self.issue_ca_certificate(issuer).await?;
        } else if self.ca.read().await.as_ref().is_some_and(CaCertificate::is_expired) {
            info!("renewing expired intermediate CA certificate");
            self.issue_ca_certificate(issuer).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Signer<Issuer> for OpenBaoSigner {
    async fn check(&self, issuer: &Issuer) -> Result<(), CheckError> {
        self.ensure_ca(issuer).await.map_err(|e| CheckError::Retryable(e.into()))
    }

    async fn sign(&self, request: RequestView<'_>, issuer: &Issuer) -> Result<PemBundle, SignerError> {
        // A failure here, reached only via the `Sign` path (the preceding
        // `Check` on this issuer having last succeeded), looks like the
        // issuer's fault rather than this request's — route it through the
        // `EventRouter` instead of retrying the request in place.
        self.ensure_ca(issuer)
            .await
            .map_err(|e| SignerError::Issuer(e.into()))?;

        let ca_guard = self.ca.read().await;
        let ca_cert = ca_guard
            .as_ref()
            .ok_or_else(|| SignerError::Retryable(anyhow::anyhow!("intermediate CA not yet available")))?;

        let (subject_public_key, subject) =
            sign::parse_csr(request.csr).map_err(|e| SignerError::Permanent(e.into()))?;
        let cn = subject
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("{}.{}", request.namespace.unwrap_or(""), request.name));

        let cert = sign::sign_certificate(subject_public_key, &ca_cert.certificate_pem, &ca_cert.key_pair, &cn)
            .map_err(|e| SignerError::Retryable(e.into()))?;

        let chain_pem = cert
            .to_pem(der::pem::LineEnding::LF)
            .map_err(|e| SignerError::Retryable(Error::Der(e).into()))?;

        Ok(PemBundle {
            chain: chain_pem.into_bytes(),
            ca: ca_cert.certificate_pem.clone().into_bytes(),
        })
    }
}
