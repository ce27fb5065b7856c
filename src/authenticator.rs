//! The authenticator core: the request-processing policy machines.

mod client_pin;
mod get_assertion;
mod make_credential;

use crate::crypto::Algorithm;
use crate::ctap2::{self, get_info, Error, Result};
use crate::pin::{KeyAgreementKey, PinProtocolVersion, PinUvAuthToken};
use crate::platform::{Platform, PresenceIntent, PresenceResult};
use crate::sizes::*;
use crate::store::{CredentialId, CredentialStore};
use crate::webauthn::PublicKeyCredentialParameters;
use crate::{Bytes, String, Vec};

/// Which attestation statement MakeCredential produces.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttestationKind {
    /// `attStmt` is the empty map.
    None,
    /// Surrogate attestation, signed with the freshly minted credential key.
    SelfSigned,
}

/// Boot-time description of the authenticator's shape.
#[derive(Clone, Debug)]
pub struct Config {
    pub aaguid: [u8; 16],
    /// Supported algorithms; requests pick in *platform* preference order.
    pub algorithms: Vec<Algorithm, 4>,
    pub attestation: AttestationKind,
    /// Discoverable-credential storage is available.
    pub supports_rk: bool,
    /// A built-in user-verification method is wired up.
    pub supports_uv: bool,
    /// Client PIN, and thereby pinUvAuthToken, support.
    pub supports_client_pin: bool,
    /// Every credential operation must be UV-verified.
    pub always_uv: bool,
    /// UV is not required for creating non-discoverable credentials.
    pub make_cred_uv_not_rqd: bool,
    /// With a client PIN set, mc/ga permissions cannot be obtained.
    pub no_mc_ga_permissions_with_client_pin: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut algorithms = Vec::new();
        algorithms.push(Algorithm::Es256).ok();
        algorithms.push(Algorithm::Ed25519).ok();
        Self {
            aaguid: [0; 16],
            algorithms,
            attestation: AttestationKind::None,
            supports_rk: true,
            supports_uv: false,
            supports_client_pin: true,
            always_uv: false,
            make_cred_uv_not_rqd: true,
            no_mc_ga_permissions_with_client_pin: false,
        }
    }
}

pub(crate) const MAX_PIN_RETRIES: u8 = 8;

/// Continuation state consumed by authenticatorGetNextAssertion.
pub(crate) struct AssertionState {
    pub(crate) credential_ids: Vec<CredentialId, MAX_CREDENTIAL_COUNT_IN_LIST>,
    pub(crate) next: usize,
    pub(crate) client_data_hash: Bytes<32>,
    pub(crate) user_verified: bool,
}

/// Process-wide authenticator state over a [`Platform`].
///
/// Exactly one command is in flight at a time; the transport layer
/// serializes requests.
pub struct Authenticator<P: Platform> {
    pub(crate) platform: P,
    pub(crate) config: Config,
    pub(crate) key_agreement: KeyAgreementKey,
    pub(crate) tokens: [PinUvAuthToken; 2],
    pub(crate) pin_retries: u8,
    pub(crate) assertions: Option<AssertionState>,
}

impl<P: Platform> Authenticator<P> {
    pub fn new(mut platform: P, config: Config) -> Self {
        let key_agreement = KeyAgreementKey::generate(platform.rng());
        let tokens = [
            PinUvAuthToken::new(PinProtocolVersion::V1, platform.rng()),
            PinUvAuthToken::new(PinProtocolVersion::V2, platform.rng()),
        ];
        Self {
            platform,
            config,
            key_agreement,
            tokens,
            pin_retries: MAX_PIN_RETRIES,
            assertions: None,
        }
    }

    pub fn platform(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn token(&self, version: PinProtocolVersion) -> &PinUvAuthToken {
        match version {
            PinProtocolVersion::V1 => &self.tokens[0],
            PinProtocolVersion::V2 => &self.tokens[1],
        }
    }

    pub(crate) fn token_mut(&mut self, version: PinProtocolVersion) -> &mut PinUvAuthToken {
        match version {
            PinProtocolVersion::V1 => &mut self.tokens[0],
            PinProtocolVersion::V2 => &mut self.tokens[1],
        }
    }

    pub(crate) fn pin_is_set(&mut self) -> bool {
        self.platform.load_pin_hash().is_some()
    }

    /// Whether some form of user verification guards this authenticator.
    pub(crate) fn protected(&self) -> bool {
        self.config.supports_uv || self.config.supports_client_pin
    }

    /// The status for "authenticate first": pinRequired, or operationDenied
    /// when mc/ga permissions are withheld from PIN tokens.
    pub(crate) fn pin_gate_error(&mut self) -> Error {
        if self.config.no_mc_ga_permissions_with_client_pin && self.pin_is_set() {
            Error::OperationDenied
        } else {
            Error::PinRequired
        }
    }

    /// Steps 1 and 2 shared by MakeCredential and GetAssertion: answer the
    /// zero-length pinUvAuthParam probe and validate the protocol selector.
    /// Returns the protocol version when a usable pinUvAuthParam came along.
    pub(crate) fn preflight_pin_uv_auth(
        &mut self,
        param: Option<&serde_bytes::Bytes>,
        protocol: Option<u32>,
        intent: PresenceIntent,
        rp_id: Option<&str>,
    ) -> Result<Option<PinProtocolVersion>> {
        let Some(param) = param else {
            return Ok(None);
        };
        if param.is_empty() && self.config.supports_client_pin {
            // the platform probes for PIN support; a touch gates the answer
            if self.platform.user_presence(intent, rp_id, None) != PresenceResult::Accepted {
                return Err(Error::OperationDenied);
            }
            return Err(if self.pin_is_set() {
                Error::PinInvalid
            } else {
                Error::PinNotSet
            });
        }
        let Some(protocol) = protocol else {
            return Err(Error::MissingParameter);
        };
        let version = PinProtocolVersion::from_wire(protocol).ok_or(Error::InvalidParameter)?;
        if !self.config.supports_client_pin {
            // no token slot can match
            return Err(Error::InvalidParameter);
        }
        Ok(Some(version))
    }

    fn get_info_impl(&mut self) -> get_info::Response {
        let mut versions = Vec::new();
        versions.push(String::from("FIDO_2_0")).ok();
        versions.push(String::from("FIDO_2_1")).ok();
        let mut extensions = Vec::new();
        extensions.push(String::from("credProtect")).ok();
        extensions.push(String::from("hmac-secret")).ok();

        let aaguid = Bytes::from_slice(&self.config.aaguid).unwrap();
        let mut response = get_info::ResponseBuilder { versions, aaguid }.build();

        let pin_set = self.pin_is_set();
        response.extensions = Some(extensions);
        response.options = Some(get_info::CtapOptions {
            rk: self.config.supports_rk,
            up: true,
            uv: self.config.supports_uv.then_some(true),
            plat: None,
            always_uv: Some(self.config.always_uv),
            client_pin: self.config.supports_client_pin.then_some(pin_set),
            pin_uv_auth_token: Some(self.config.supports_client_pin),
            make_cred_uv_not_rqd: Some(self.config.make_cred_uv_not_rqd),
            no_mc_ga_permissions_with_client_pin: Some(
                self.config.no_mc_ga_permissions_with_client_pin,
            ),
        });
        response.max_msg_size = Some(MAX_MESSAGE_SIZE);
        if self.config.supports_client_pin {
            let mut protocols = Vec::new();
            protocols.push(1).ok();
            protocols.push(2).ok();
            response.pin_protocols = Some(protocols);
        }
        response.max_creds_in_list = Some(MAX_CREDENTIAL_COUNT_IN_LIST);
        response.max_cred_id_length = Some(MAX_CREDENTIAL_ID_LENGTH);
        response.algorithms = Some(
            self.config
                .algorithms
                .iter()
                .map(|algorithm| PublicKeyCredentialParameters::public_key_with_alg(algorithm.id()))
                .collect(),
        );
        response
    }

    fn reset_impl(&mut self) -> Result<()> {
        if self.platform.user_presence(PresenceIntent::Reset, None, None)
            != PresenceResult::Accepted
        {
            return Err(Error::OperationDenied);
        }
        self.platform.store().wipe()?;
        self.platform.store().persist().map_err(|_| Error::Other)?;
        self.platform.store_pin_hash(None)?;
        self.pin_retries = MAX_PIN_RETRIES;
        self.key_agreement = KeyAgreementKey::generate(self.platform.rng());
        let rng = self.platform.rng();
        for token in &mut self.tokens {
            token.regenerate(rng);
        }
        self.assertions = None;
        info!("authenticator reset");
        Ok(())
    }
}

impl<P: Platform> ctap2::Authenticator for Authenticator<P> {
    fn get_info(&mut self) -> get_info::Response {
        self.get_info_impl()
    }

    fn make_credential(
        &mut self,
        request: &ctap2::make_credential::Request,
    ) -> Result<ctap2::make_credential::Response> {
        self.make_credential_impl(request)
    }

    fn get_assertion(
        &mut self,
        request: &ctap2::get_assertion::Request,
    ) -> Result<ctap2::get_assertion::Response> {
        self.get_assertion_impl(request)
    }

    fn get_next_assertion(&mut self) -> Result<ctap2::get_assertion::Response> {
        self.get_next_assertion_impl()
    }

    fn client_pin(
        &mut self,
        request: &ctap2::client_pin::Request,
    ) -> Result<ctap2::client_pin::Response> {
        self.client_pin_impl(request)
    }

    fn reset(&mut self) -> Result<()> {
        self.reset_impl()
    }
}
