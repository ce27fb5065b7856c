//! The environment capability surface the core runs against.
//!
//! A [`Platform`] bundles everything the request pipelines cannot provide
//! themselves: randomness, a clock, the user-interaction callbacks and the
//! credential store.  The handlers never block except through
//! [`Platform::user_presence`], [`Platform::user_verification`] and the
//! store's `persist`; strict step ordering is preserved around these calls.

use rand_core::CryptoRngCore;

use crate::ctap2::Error;
use crate::sizes::PIN_HASH_LENGTH;
use crate::store::CredentialStore;
use crate::webauthn::PublicKeyCredentialUserEntity;

/// What a user-presence prompt is about.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PresenceIntent {
    MakeCredential,
    GetAssertion,
    Reset,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PresenceResult {
    Accepted,
    Denied,
    Timeout,
    Cancelled,
}

/// Outcome of the built-in user-verification method.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VerificationResult {
    Accepted,
    Denied,
    RetriesExhausted,
}

pub trait Platform {
    type Rng: CryptoRngCore;
    type Store: CredentialStore;

    fn rng(&mut self) -> &mut Self::Rng;

    fn store(&mut self) -> &mut Self::Store;

    /// Monotonic wall clock, in milliseconds.
    fn millis(&mut self) -> u64;

    /// Blocks until the user answers a presence check, the method times out,
    /// or a transport cancels the request.
    fn user_presence(
        &mut self,
        intent: PresenceIntent,
        rp_id: Option<&str>,
        user: Option<&PublicKeyCredentialUserEntity>,
    ) -> PresenceResult;

    /// Runs the built-in user-verification method.  The retry policy is the
    /// method's own; only called when the authenticator is configured with
    /// built-in UV.
    fn user_verification(&mut self) -> VerificationResult;

    /// The stored PIN hash, `LEFT(SHA-256(pin), 16)`, if a PIN is set.
    fn load_pin_hash(&mut self) -> Option<[u8; PIN_HASH_LENGTH]>;

    /// Persists the PIN hash; `None` clears it.
    fn store_pin_hash(&mut self, hash: Option<[u8; PIN_HASH_LENGTH]>) -> Result<(), Error>;
}
