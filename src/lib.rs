//! Reusable certificate-issuance controller engine.
//!
//! An author of a custom Certificate Authority integration implements two
//! pure functions, [`Signer::check`] and [`Signer::sign`], and registers
//! them with a [`controller::CombinedController`]. Everything else here is
//! the machinery that watches signing-request objects of two standard
//! shapes, correlates them with the right issuer, drives each through a
//! well-defined state machine to a terminal state (`Issued`, `Failed`,
//! `Denied`) or back off and retry, and propagates signer errors between
//! requests and issuers so that a bad issuer state is learned from request
//! failures and heals when a later check succeeds.
//!
//! See `request::RequestController` and `issuer::IssuerController` for the
//! two reconcile loops, `event_router::EventRouter` for how they talk to
//! each other, and `predicates` for the event filtering that keeps the two
//! from looping on each other's status writes.

pub mod clock;
pub mod condition;
pub mod controller;
pub mod error;
pub mod event_router;
pub mod issuer;
pub mod keys;
pub mod predicates;
pub mod request;
pub mod signer;
mod util;

pub use clock::{Clock, ManualClock, UtcClock};
pub use condition::{ConditionStatus, ConditionView};
pub use controller::{CombinedController, Options};
pub use error::{CheckError, ControllerError, SignerError};
pub use event_router::EventRouter;
pub use issuer::IssuerObject;
pub use keys::{IssuerRef, ObjectKey, RouterKey};
pub use request::{IssuerScope, RequestObject};
pub use signer::{PemBundle, RequestView, Signer};
