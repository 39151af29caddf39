//! Small identity types threaded through the engine: which object a
//! reconcile is for, and which issuer a request names.

use std::fmt;

/// A namespaced-or-cluster-scoped object identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<String>, name: String) -> Self {
        Self { namespace, name }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// How a request names the issuer it wants to sign against: either a
/// `group+kind` plus a name (namespaced variant's `issuerRef`), or the
/// `<kindId>/[<namespace>.]<name>` form of `signerName` (cluster variant).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IssuerRef {
    /// Identifies which registered issuer *kind* this request targets
    /// (e.g. `"example.com/ClusterIssuer"` or a `signerName` prefix).
    pub kind_id: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl IssuerRef {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Parses a `signerName` of the shape `<kindId>/[<namespace>.]<name>`
    /// by splitting on the *first* `/` only. An issuer name containing a
    /// `/` of its own is an accepted ambiguity.
    pub fn parse_signer_name(signer_name: &str) -> Option<Self> {
        let (kind_id, rest) = signer_name.split_once('/')?;
        if kind_id.is_empty() || rest.is_empty() {
            return None;
        }
        let (namespace, name) = match rest.split_once('.') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => (Some(ns.to_string()), name.to_string()),
            _ => (None, rest.to_string()),
        };
        Some(Self {
            kind_id: kind_id.to_string(),
            namespace,
            name,
        })
    }
}

/// Key used by the `EventRouter` to correlate a reported issuer-level
/// error with the issuer it concerns: the issuer's registered kind
/// identifier plus its object key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouterKey {
    pub kind_id: String,
    pub object: ObjectKey,
}

impl RouterKey {
    pub fn new(kind_id: impl Into<String>, object: ObjectKey) -> Self {
        Self {
            kind_id: kind_id.into(),
            object,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cluster_signer_name() {
        let r = IssuerRef::parse_signer_name("acme.example.com/my-issuer").unwrap();
        assert_eq!(r.kind_id, "acme.example.com");
        assert_eq!(r.namespace, None);
        assert_eq!(r.name, "my-issuer");
    }

    #[test]
    fn parses_namespaced_form_in_signer_name() {
        let r = IssuerRef::parse_signer_name("acme.example.com/team-a.my-issuer").unwrap();
        assert_eq!(r.kind_id, "acme.example.com");
        assert_eq!(r.namespace.as_deref(), Some("team-a"));
        assert_eq!(r.name, "my-issuer");
    }

    #[test]
    fn splits_on_first_slash_only() {
        // An issuer name that itself contains `/` is ambiguous; splitting
        // on the first `/` only means anything after it - including
        // further slashes - belongs to the name portion.
        let r = IssuerRef::parse_signer_name("acme.example.com/ns.name/with/slashes").unwrap();
        assert_eq!(r.kind_id, "acme.example.com");
        assert_eq!(r.namespace.as_deref(), Some("ns"));
        assert_eq!(r.name, "name/with/slashes");
    }

    #[test]
    fn rejects_missing_slash() {
        assert!(IssuerRef::parse_signer_name("no-slash-here").is_none());
    }
}
