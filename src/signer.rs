//! The two pure functions a CA integration implements: `Check` and `Sign`.
//! Everything else in this crate is machinery that calls these.

use async_trait::async_trait;

use crate::error::{CheckError, SignerError};

/// The signed chain and (optionally) the issuing CA certificate, as
/// returned by `Sign`.
#[derive(Clone, Debug, Default)]
pub struct PemBundle {
    /// The full signed certificate chain, PEM-encoded.
    pub chain: Vec<u8>,
    /// The CA certificate, PEM-encoded, if the signer has one to offer.
    pub ca: Vec<u8>,
}

/// A read-only view of the request being signed, assembled by the engine
/// from whichever request variant is being reconciled.
#[derive(Clone, Copy, Debug)]
pub struct RequestView<'a> {
    pub namespace: Option<&'a str>,
    pub name: &'a str,
    /// The opaque CSR bytes.
    pub csr: &'a [u8],
}

/// A CA integration: `Check` validates that an issuer is usable, `Sign`
/// returns a signed PEM chain for a CSR.
///
/// `I` is the concrete issuer type (a `CustomResource`-derived struct)
/// this signer knows how to talk to. One `Signer` implementation is
/// registered per issuer kind in `CombinedController`.
#[async_trait]
pub trait Signer<I>: Send + Sync + 'static {
    /// Validates that `issuer` is usable right now. Called by
    /// `IssuerController` unless a reported `IssuerError` from a
    /// concurrent `Sign` call takes precedence.
    async fn check(&self, issuer: &I) -> Result<(), CheckError>;

    /// Signs `request` against `issuer`, returning the chain to write to
    /// the request's status.
    async fn sign(&self, request: RequestView<'_>, issuer: &I) -> Result<PemBundle, SignerError>;
}
