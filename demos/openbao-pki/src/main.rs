//! Demo binary wiring `issuer_lib::CombinedController` to an OpenBao/Vault
//! PKI backend: read Vault connection details from the environment, build
//! the client, and run the controller until shut down by signal.

mod ca_certificate;
mod error;
mod intermediate_ca;
mod issuer;
mod sign;

use std::sync::Arc;

use anyhow::Context;
use issuer_lib::{CombinedController, IssuerScope, Options};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};

use crate::intermediate_ca::OpenBaoSigner;
use crate::issuer::Issuer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let bao_addr = std::env::var("BAO_ADDR").context("BAO_ADDR must be set to the OpenBao/Vault server address")?;
    let bao_token = std::env::var("BAO_TOKEN").context("BAO_TOKEN must be set to a Vault token with PKI access")?;

    let bao = VaultClient::new(
        VaultClientSettingsBuilder::default()
            .address(bao_addr)
            .token(bao_token)
            .build()
            .context("failed to build Vault client settings")?,
    )
    .context("failed to build Vault client")?;

    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client from the ambient kubeconfig")?;

    let signer = Arc::new(OpenBaoSigner::new(bao));

    let mut controller = CombinedController::new(
        client,
        Options {
            field_owner: "openbao-pki-demo".to_string(),
            ..Options::default()
        },
    );
    controller.register_issuer::<Issuer, OpenBaoSigner>(signer, IssuerScope::Namespaced);

    tracing::info!("openbao-pki-demo starting");
    controller.run().await;
    Ok(())
}
