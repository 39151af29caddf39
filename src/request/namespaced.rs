//! The namespaced request variant: a `cert-manager.io`-shaped
//! `CertificateRequest` custom resource, approved/denied via condition
//! types and carrying a `Ready` condition plus a `FailureTime` stamp.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::ByteString;
use kube::api::Api;
use kube::{Client, CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{did_transition, reason, transition_time, ConditionStatus, ConditionView};
use crate::keys::IssuerRef;

use super::{IssuerScope, RequestObject, RequestPatchBuilder};

/// Names the issuer a `CertificateRequest` targets, mirroring
/// cert-manager's `ObjectReference` (group defaults to `cert-manager.io`,
/// kind defaults to `Issuer`, both omittable in the common case).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct CertificateRequestIssuerRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "CertificateRequest",
    namespaced,
    status = "CertificateRequestStatus",
    shortname = "cr"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestSpec {
    /// The PEM-encoded CSR bytes.
    pub request: ByteString,
    pub issuer_ref: CertificateRequestIssuerRef,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<ByteString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<ByteString>,
    /// Stamped on `SetPermanentError` and on a Denied-terminal write; the
    /// namespaced variant's only field the cluster variant lacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_time: Option<Time>,
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

impl RequestObject for CertificateRequest {
    type PatchBuilder = CertificateRequestPatchBuilder;

    const ALLOWED_ISSUER_SCOPES: &'static [IssuerScope] = &[IssuerScope::Namespaced, IssuerScope::Cluster];

    fn is_approved(&self) -> bool {
        self.conditions_ref()
            .iter()
            .any(|c| c.type_ == "Approved" && c.status == ConditionStatus::True)
    }

    fn is_denied(&self) -> bool {
        self.conditions_ref()
            .iter()
            .any(|c| c.type_ == "Denied" && c.status == ConditionStatus::True)
    }

    fn is_ready(&self) -> bool {
        self.ready_condition()
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    fn is_terminal(&self) -> bool {
        self.ready_condition().is_some_and(|c| {
            c.status == ConditionStatus::False && (c.reason == reason::FAILED || c.reason == reason::DENIED)
        })
    }

    fn issuer_ref(&self) -> Option<IssuerRef> {
        let r = &self.spec.issuer_ref;
        if r.name.is_empty() {
            return None;
        }
        let group = r.group.as_deref().unwrap_or("cert-manager.io");
        let kind = r.kind.as_deref().unwrap_or("Issuer");
        let namespace = if kind == "ClusterIssuer" {
            None
        } else {
            self.namespace()
        };
        Some(IssuerRef {
            kind_id: format!("{group}/{kind}"),
            namespace,
            name: r.name.clone(),
        })
    }

    fn csr(&self) -> &[u8] {
        &self.spec.request.0
    }

    fn conditions_ref(&self) -> Vec<ConditionView> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .map(|cs| cs.iter().map(condition_to_view).collect())
            .unwrap_or_default()
    }

    fn patch_builder(&self, now: DateTime<Utc>) -> Self::PatchBuilder {
        CertificateRequestPatchBuilder {
            now,
            existing: self.conditions_ref(),
            ready: None,
            custom: Vec::new(),
            certificate: None,
            ca: None,
            stamp_failure_time: false,
        }
    }

    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        match namespace {
            // A concrete namespace is only ever passed when patching a
            // specific request already known to live there; the
            // controller-level watch passes `None` and must see requests
            // across every namespace, not just `"default"`.
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

/// `RequestPatchBuilder` for `CertificateRequest`: accumulates condition
/// writes and renders them into a single server-side-apply status patch.
pub struct CertificateRequestPatchBuilder {
    now: DateTime<Utc>,
    existing: Vec<ConditionView>,
    ready: Option<(ConditionStatus, &'static str, String)>,
    custom: Vec<(String, ConditionStatus, String, String)>,
    certificate: Option<Vec<u8>>,
    ca: Option<Vec<u8>>,
    stamp_failure_time: bool,
}

impl CertificateRequestPatchBuilder {
    fn condition_json(&self, type_: &str, status: ConditionStatus, reason: &str, message: &str) -> serde_json::Value {
        let existing = ConditionView::find(&self.existing, type_);
        let last_transition_time = transition_time(existing, status, self.now);
        serde_json::json!({
            "type": type_,
            "status": status.as_str(),
            "reason": reason,
            "message": message,
            "lastTransitionTime": last_transition_time.to_rfc3339(),
        })
    }
}

impl RequestPatchBuilder for CertificateRequestPatchBuilder {
    fn set_initializing(&mut self) {
        self.ready = Some((ConditionStatus::Unknown, reason::INITIALIZING, String::new()));
    }

    fn set_denied_terminal(&mut self) {
        self.ready = Some((ConditionStatus::False, reason::DENIED, "The request was denied".to_string()));
        self.stamp_failure_time = true;
    }

    fn set_waiting_for_issuer_exist(&mut self, message: String) {
        self.ready = Some((ConditionStatus::False, reason::PENDING, message));
    }

    fn set_waiting_for_issuer_ready(&mut self, message: String) {
        self.ready = Some((ConditionStatus::False, reason::PENDING, message));
    }

    fn set_custom_condition(&mut self, type_: &str, status: ConditionStatus, reason: &str, message: String) -> bool {
        let transitioned = did_transition(ConditionView::find(&self.existing, type_), status);
        self.custom.push((type_.to_string(), status, reason.to_string(), message));
        transitioned
    }

    fn set_pending(&mut self, message: String) {
        self.ready = Some((ConditionStatus::False, reason::PENDING, message));
    }

    fn set_retryable_error(&mut self, message: String) {
        self.ready = Some((ConditionStatus::False, reason::PENDING, message));
    }

    fn set_permanent_error(&mut self, message: String) {
        self.ready = Some((ConditionStatus::False, reason::FAILED, message));
        self.stamp_failure_time = true;
    }

    fn set_issued(&mut self, chain: Vec<u8>) {
        self.ready = Some((ConditionStatus::True, reason::ISSUED, "The certificate has been issued".to_string()));
        self.certificate = Some(chain);
    }

    fn set_ca(&mut self, ca: Vec<u8>) {
        self.ca = Some(ca);
    }

    fn build(self: Box<Self>) -> serde_json::Value {
        let mut conditions = Vec::new();
        if let Some((status, reason, message)) = &self.ready {
            conditions.push(self.condition_json("Ready", *status, reason, message));
        }
        for (type_, status, reason, message) in &self.custom {
            conditions.push(self.condition_json(type_, *status, reason, message));
        }

        let mut status = serde_json::Map::new();
        if !conditions.is_empty() {
            status.insert("conditions".to_string(), serde_json::Value::Array(conditions));
        }
        if let Some(chain) = &self.certificate {
            status.insert("certificate".to_string(), serde_json::json!(ByteString(chain.clone())));
        }
        if let Some(ca) = &self.ca {
            status.insert("ca".to_string(), serde_json::json!(ByteString(ca.clone())));
        }
        if self.stamp_failure_time {
            status.insert("failureTime".to_string(), serde_json::json!(self.now.to_rfc3339()));
        }

        serde_json::json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "CertificateRequest",
            "status": status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestObject;
    use chrono::Utc;

    fn request_with(issuer_ref: CertificateRequestIssuerRef, conditions: Vec<Condition>) -> CertificateRequest {
        let mut r = CertificateRequest::new(
            "test",
            CertificateRequestSpec {
                request: ByteString(b"csr-bytes".to_vec()),
                issuer_ref,
            },
        );
        r.status = Some(CertificateRequestStatus {
            conditions: Some(conditions),
            ..Default::default()
        });
        r
    }

    fn cond(type_: &str, status: &str, reason: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: String::new(),
            observed_generation: None,
            last_transition_time: Time(Utc::now()),
        }
    }

    #[test]
    fn defaults_issuer_group_and_kind() {
        let r = request_with(
            CertificateRequestIssuerRef {
                name: "my-issuer".to_string(),
                kind: None,
                group: None,
            },
            vec![],
        );
        let issuer_ref = r.issuer_ref().unwrap();
        assert_eq!(issuer_ref.kind_id, "cert-manager.io/Issuer");
        assert_eq!(issuer_ref.name, "my-issuer");
    }

    #[test]
    fn cluster_issuer_kind_has_no_namespace() {
        let r = request_with(
            CertificateRequestIssuerRef {
                name: "ci".to_string(),
                kind: Some("ClusterIssuer".to_string()),
                group: None,
            },
            vec![],
        );
        assert_eq!(r.issuer_ref().unwrap().namespace, None);
    }

    #[test]
    fn approved_xor_denied_detection() {
        let approved = request_with(
            CertificateRequestIssuerRef {
                name: "i".to_string(),
                kind: None,
                group: None,
            },
            vec![cond("Approved", "True", "UserApproved")],
        );
        assert!(approved.is_approved());
        assert!(!approved.is_denied());
    }

    #[test]
    fn denied_condition_is_terminal_after_ready_false_denied_written() {
        let r = request_with(
            CertificateRequestIssuerRef {
                name: "i".to_string(),
                kind: None,
                group: None,
            },
            vec![cond("Ready", "False", reason::DENIED)],
        );
        assert!(r.is_terminal());
        assert!(!r.is_ready());
    }

    #[test]
    fn build_denied_patch_stamps_failure_time() {
        let r = request_with(
            CertificateRequestIssuerRef {
                name: "i".to_string(),
                kind: None,
                group: None,
            },
            vec![],
        );
        let mut builder = r.patch_builder(Utc::now());
        builder.set_denied_terminal();
        let patch = Box::new(builder).build();
        assert!(patch["status"]["failureTime"].is_string());
        assert_eq!(patch["status"]["conditions"][0]["reason"], reason::DENIED);
    }
}
