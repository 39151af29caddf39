//! Cross-controller error propagation.
//!
//! When `Sign` surfaces an `IssuerError`, `RequestController` cannot
//! rewrite the issuer's status itself — that would race the
//! `IssuerController`'s own server-side-apply writes. Instead it reports
//! the error here, which (a) remembers it keyed by the issuer's kind and
//! object key, and (b) pings every registered consumer for that kind so
//! the issuer controller re-runs and has a chance to observe it.
//!
//! The map is a `dashmap::DashMap`, the same concurrent-map primitive
//! `kube_runtime`'s own reflector store (`kube_runtime::reflector::store`)
//! uses for its watch cache, since this router has exactly the same
//! shape of problem: many concurrent writers (request reconciles), one
//! reader-and-deleter (the issuer reconciler) per key.

use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::ControllerError;
use crate::keys::RouterKey;

/// Process-local error-routing table shared by every registered request
/// and issuer controller in a `CombinedController`.
///
/// Lives only as long as the process: a restart silently drops any
/// in-flight reported error, and the system re-converges on the next
/// ordinary `Check`.
#[derive(Default)]
pub struct EventRouter {
    errors: DashMap<RouterKey, anyhow::Error>,
    consumers: DashMap<String, mpsc::UnboundedSender<()>>,
    /// One sender per registered request-variant controller
    /// (`CertificateRequest`, `CertificateSigningRequest`), pinged whenever
    /// any issuer's `Ready` signal changes so requests blocked on
    /// `WaitingForIssuerReady` reconcile promptly instead of waiting out
    /// the resync period. See `predicates::linked_issuer_ready_change`.
    ready_listeners: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `kind_id` as a consumer, returning a receiver that the
    /// `IssuerController` for that kind feeds into its controller's
    /// trigger stream (via `reconcile_all_on`) so a reported error causes
    /// a fresh reconcile pass.
    pub fn register_consumer(&self, kind_id: impl Into<String>) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.consumers.insert(kind_id.into(), tx);
        rx
    }

    /// Stores `err` for `key`, overwriting any previously stored error for
    /// the same key (at most one stored error per key survives), and pings
    /// that kind's registered consumer.
    ///
    /// Fails if no consumer has been registered for `key.kind_id` — this
    /// only happens if a signer reports an `IssuerError` against an issuer
    /// kind the `CombinedController` never registered, which is a wiring
    /// bug in the embedding application.
    pub fn report_error(&self, key: RouterKey, err: anyhow::Error) -> Result<(), ControllerError> {
        let consumer = self
            .consumers
            .get(&key.kind_id)
            .ok_or_else(|| ControllerError::UnknownIssuerKind(key.kind_id.clone()))?;
        self.errors.insert(key, err);
        // The receiver may have been dropped if the issuer controller has
        // shut down; that's not this call's problem to report.
        let _ = consumer.send(());
        Ok(())
    }

    /// Atomically removes and returns the stored error for `key`, if any.
    /// The error survives exactly one call: whether or not it's used, it
    /// is gone afterwards, so the caller must consume it on every issuer
    /// reconcile regardless of outcome.
    pub fn consume_error(&self, key: &RouterKey) -> Option<anyhow::Error> {
        self.errors.remove(key).map(|(_, err)| err)
    }

    /// Registers a request-variant controller as a ready-change listener,
    /// returning a receiver its `reconcile_all_on` trigger stream consumes.
    pub fn register_ready_listener(&self) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ready_listeners.lock().unwrap().push(tx);
        rx
    }

    /// Pings every registered request-variant controller so requests
    /// waiting on an issuer's readiness reconcile promptly. Called by
    /// `IssuerController` whenever a `Ready` write changes the issuer's
    /// ready signal (added, removed, or `status` changed).
    pub fn broadcast_ready_change(&self) {
        self.ready_listeners
            .lock()
            .unwrap()
            .retain(|tx| tx.send(()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ObjectKey;

    fn key(name: &str) -> RouterKey {
        RouterKey::new("test.example.com/Issuer", ObjectKey::cluster(name))
    }

    #[test]
    fn report_without_consumer_fails() {
        let router = EventRouter::new();
        let err = router.report_error(key("a"), anyhow::anyhow!("boom"));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn report_then_consume_round_trips_and_pings() {
        let router = EventRouter::new();
        let mut rx = router.register_consumer("test.example.com/Issuer");

        router
            .report_error(key("a"), anyhow::anyhow!("outage"))
            .unwrap();
        rx.recv().await.expect("consumer pinged");

        let err = router.consume_error(&key("a")).expect("error present");
        assert_eq!(err.to_string(), "outage");
        assert!(router.consume_error(&key("a")).is_none());
    }

    #[test]
    fn later_report_overwrites_earlier() {
        let router = EventRouter::new();
        let _rx = router.register_consumer("test.example.com/Issuer");
        router.report_error(key("a"), anyhow::anyhow!("first")).unwrap();
        router.report_error(key("a"), anyhow::anyhow!("second")).unwrap();
        let err = router.consume_error(&key("a")).unwrap();
        assert_eq!(err.to_string(), "second");
    }

    #[test]
    fn consume_without_report_is_none() {
        let router = EventRouter::new();
        assert!(router.consume_error(&key("missing")).is_none());
    }

    #[tokio::test]
    async fn ready_broadcast_pings_every_registered_listener() {
        let router = EventRouter::new();
        let mut a = router.register_ready_listener();
        let mut b = router.register_ready_listener();
        router.broadcast_ready_change();
        a.recv().await.expect("listener a pinged");
        b.recv().await.expect("listener b pinged");
    }

    #[tokio::test]
    async fn ready_broadcast_with_no_listeners_is_a_no_op() {
        let router = EventRouter::new();
        router.broadcast_ready_change();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reports_are_serialized_per_key() {
        let router = std::sync::Arc::new(EventRouter::new());
        let _rx = router.register_consumer("test.example.com/Issuer");

        let mut handles = Vec::new();
        for i in 0..50 {
            let router = router.clone();
            handles.push(tokio::spawn(async move {
                router
                    .report_error(key("shared"), anyhow::anyhow!("err-{i}"))
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // Exactly one survives; which one is a race, but there must be
        // precisely one stored value left, not zero and not a panic.
        assert!(router.consume_error(&key("shared")).is_some());
        assert!(router.consume_error(&key("shared")).is_none());
    }
}
