//! The `Issuer` custom resource this demo registers with `issuer-lib`'s
//! `CombinedController`: a namespaced pointer at an OpenBao/Vault PKI
//! mount, defined with the usual `kube::CustomResource` + `schemars`
//! derive shape.

use chrono::{DateTime, Utc};
use issuer_lib::{ConditionStatus, ConditionView, IssuerObject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::api::Api;
use kube::{Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "openbao-pki.example.com",
    version = "v1",
    kind = "Issuer",
    namespaced,
    status = "IssuerStatus",
    shortname = "obpki"
)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSpec {
    /// Name of the PKI secrets engine mount this issuer signs against
    /// (e.g. `"pki"`).
    pub mount: String,
    /// Common name used when requesting the intermediate CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

fn condition_to_view(c: &Condition) -> ConditionView {
    ConditionView {
        type_: c.type_.clone(),
        status: match c.status.as_str() {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        },
        reason: c.reason.clone(),
        message: c.message.clone(),
        observed_generation: c.observed_generation,
        last_transition_time: Some(c.last_transition_time.0),
    }
}

impl IssuerObject for Issuer {
    fn kind_id() -> &'static str {
        "openbao-pki.example.com/Issuer"
    }

    fn ready_condition(&self) -> Option<ConditionView> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|cs| cs.iter().find(|c| c.type_ == "Ready"))
            .map(condition_to_view)
    }

    fn build_ready_patch(
        &self,
        status: ConditionStatus,
        reason: &str,
        message: String,
        now: DateTime<Utc>,
    ) -> serde_json::Value {
        let existing = self.ready_condition();
        let last_transition_time = issuer_lib::condition::transition_time(existing.as_ref(), status, now);
        serde_json::json!({
            "apiVersion": "openbao-pki.example.com/v1",
            "kind": "Issuer",
            "status": {
                "conditions": [{
                    "type": "Ready",
                    "status": status.as_str(),
                    "reason": reason,
                    "message": message,
                    "observedGeneration": self.generation(),
                    "lastTransitionTime": last_transition_time.to_rfc3339(),
                }],
            },
        })
    }

    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}
