//! The cluster-wide request variant: the real, built-in
//! `k8s_openapi::api::certificates::v1::CertificateSigningRequest`.
//! Approval/denial live in conditions the engine never writes (they're
//! set externally, by an approver); the engine only ever writes `Failed`
//! and the `certificate` field, and tracks no `Ready` condition at all.

use chrono::{DateTime, Utc};
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestStatus,
};
use k8s_openapi::ByteString;
use kube::api::Api;
use kube::{Client, ResourceExt};

use crate::condition::{did_transition, reason, transition_time, ConditionStatus, ConditionView};
use crate::keys::IssuerRef;

use super::{IssuerScope, RequestObject, RequestPatchBuilder};

fn condition_to_view(c: &CertificateSigningRequestCondition) -> ConditionView {
    ConditionView {
        type_: c.type_.clone(),
        status: match c.status.as_str() {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        },
        reason: c.reason.clone().unwrap_or_default(),
        message: c.message.clone().unwrap_or_default(),
        // The upstream API carries no observedGeneration on CSR
        // conditions; the issuer-readiness staleness check only applies
        // to the issuer side, never to the request itself.
        observed_generation: None,
        last_transition_time: c.last_transition_time.as_ref().map(|t| t.0),
    }
}

impl RequestObject for CertificateSigningRequest {
    type PatchBuilder = CertificateSigningRequestPatchBuilder;

    const ALLOWED_ISSUER_SCOPES: &'static [IssuerScope] = &[IssuerScope::Cluster];
    const HAS_READY_CONDITION: bool = false;

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
        self.status
            .as_ref()
            .and_then(|s| s.certificate.as_ref())
            .is_some_and(|c| !c.0.is_empty())
    }

    fn is_terminal(&self) -> bool {
        // Denied is itself set by the approver, not by this engine; there
        // is nothing further to write, so it's terminal the moment it's
        // observed (no `Ready`/`FailureTime` to stamp, unlike the
        // namespaced variant).
        self.is_denied()
            || self
                .conditions_ref()
                .iter()
                .any(|c| c.type_ == "Failed" && c.status == ConditionStatus::True)
    }

    fn issuer_ref(&self) -> Option<IssuerRef> {
        IssuerRef::parse_signer_name(&self.spec.signer_name)
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
        CertificateSigningRequestPatchBuilder {
            now,
            existing: self.conditions_ref(),
            failed: None,
            custom: Vec::new(),
            certificate: None,
        }
    }

    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

/// `RequestPatchBuilder` for `CertificateSigningRequest`. Most state-
/// machine transitions the engine writes for the namespaced variant have
/// no field to land in here (no `Ready`, no `CA`): those become no-ops,
/// leaving the accompanying Kubernetes Event as the only visible trace.
pub struct CertificateSigningRequestPatchBuilder {
    now: DateTime<Utc>,
    existing: Vec<ConditionView>,
    failed: Option<String>,
    custom: Vec<(String, ConditionStatus, String, String)>,
    certificate: Option<Vec<u8>>,
}

impl RequestPatchBuilder for CertificateSigningRequestPatchBuilder {
    fn set_initializing(&mut self) {}

    fn set_denied_terminal(&mut self) {}

    fn set_waiting_for_issuer_exist(&mut self, _message: String) {}

    fn set_waiting_for_issuer_ready(&mut self, _message: String) {}

    fn set_custom_condition(&mut self, type_: &str, status: ConditionStatus, reason: &str, message: String) -> bool {
        let transitioned = did_transition(ConditionView::find(&self.existing, type_), status);
        self.custom.push((type_.to_string(), status, reason.to_string(), message));
        transitioned
    }

    fn set_pending(&mut self, _message: String) {}

    fn set_retryable_error(&mut self, _message: String) {}

    fn set_permanent_error(&mut self, message: String) {
        self.failed = Some(message);
    }

    fn set_issued(&mut self, chain: Vec<u8>) {
        self.certificate = Some(chain);
    }

    fn set_ca(&mut self, _ca: Vec<u8>) {}

    fn build(self: Box<Self>) -> serde_json::Value {
        let mut conditions = Vec::new();
        if let Some(message) = &self.failed {
            let existing = ConditionView::find(&self.existing, "Failed");
            conditions.push(serde_json::json!({
                "type": "Failed",
                "status": ConditionStatus::True.as_str(),
                "reason": reason::FAILED,
                "message": message,
                "lastTransitionTime": transition_time(existing, ConditionStatus::True, self.now).to_rfc3339(),
            }));
        }
        for (type_, status, reason, message) in &self.custom {
            let existing = ConditionView::find(&self.existing, type_);
            conditions.push(serde_json::json!({
                "type": type_,
                "status": status.as_str(),
                "reason": reason,
                "message": message,
                "lastTransitionTime": transition_time(existing, *status, self.now).to_rfc3339(),
            }));
        }

        let mut status = serde_json::Map::new();
        if !conditions.is_empty() {
            status.insert("conditions".to_string(), serde_json::Value::Array(conditions));
        }
        if let Some(chain) = &self.certificate {
            status.insert("certificate".to_string(), serde_json::json!(ByteString(chain.clone())));
        }

        serde_json::json!({
            "apiVersion": "certificates.k8s.io/v1",
            "kind": "CertificateSigningRequest",
            "status": status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestObject;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::api::certificates::v1::CertificateSigningRequestSpec;

    fn csr_with(signer_name: &str, conditions: Vec<CertificateSigningRequestCondition>) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some("test".to_string()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                signer_name: signer_name.to_string(),
                request: ByteString(b"csr-bytes".to_vec()),
                ..Default::default()
            },
            status: Some(CertificateSigningRequestStatus {
                conditions: Some(conditions),
                ..Default::default()
            }),
        }
    }

    fn cond(type_: &str, status: &str) -> CertificateSigningRequestCondition {
        CertificateSigningRequestCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: None,
            message: None,
            last_transition_time: Some(Time(Utc::now())),
            last_update_time: None,
        }
    }

    #[test]
    fn issuer_ref_parsed_from_signer_name() {
        let csr = csr_with("acme.example.com/my-issuer", vec![]);
        let issuer_ref = csr.issuer_ref().unwrap();
        assert_eq!(issuer_ref.kind_id, "acme.example.com");
        assert_eq!(issuer_ref.name, "my-issuer");
    }

    #[test]
    fn unparseable_signer_name_has_no_issuer_ref() {
        let csr = csr_with("no-slash", vec![]);
        assert!(csr.issuer_ref().is_none());
    }

    #[test]
    fn ready_means_certificate_populated() {
        let mut csr = csr_with("acme.example.com/my-issuer", vec![cond("Approved", "True")]);
        assert!(!csr.is_ready());
        csr.status.as_mut().unwrap().certificate = Some(ByteString(b"cert".to_vec()));
        assert!(csr.is_ready());
    }

    #[test]
    fn denied_is_immediately_terminal_with_no_write() {
        let csr = csr_with("acme.example.com/my-issuer", vec![cond("Denied", "True")]);
        assert!(csr.is_terminal());
    }

    #[test]
    fn failed_condition_true_is_terminal() {
        let csr = csr_with("acme.example.com/my-issuer", vec![cond("Failed", "True")]);
        assert!(csr.is_terminal());
    }

    #[test]
    fn build_permanent_error_writes_failed_condition_not_ready() {
        let csr = csr_with("acme.example.com/my-issuer", vec![]);
        let mut builder = csr.patch_builder(Utc::now());
        builder.set_permanent_error("nope".to_string());
        let patch = Box::new(builder).build();
        assert_eq!(patch["status"]["conditions"][0]["type"], "Failed");
        assert_eq!(patch["status"]["conditions"][0]["status"], "True");
    }

    #[test]
    fn waiting_for_issuer_writes_are_no_ops() {
        let csr = csr_with("acme.example.com/my-issuer", vec![]);
        let mut builder = csr.patch_builder(Utc::now());
        builder.set_waiting_for_issuer_exist("not found".to_string());
        let patch = Box::new(builder).build();
        assert!(patch["status"].as_object().unwrap().is_empty());
    }

    #[test]
    fn has_no_ready_condition_tracking() {
        assert!(!<CertificateSigningRequest as RequestObject>::HAS_READY_CONDITION);
    }
}
