//! The authenticatorClientPin command: PIN lifecycle and token issuance.
//!
//! Everything here runs over an ECDH shared secret between the platform and
//! the authenticator's per-boot key-agreement key; PINs never cross the
//! wire in the clear, only `LEFT(SHA-256(pin), 16)` ever touches storage.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::crypto;
use crate::ctap2::client_pin::{Request, Response, Subcommand};
use crate::ctap2::{Error, Result};
use crate::pin::{KeyAgreementKey, Permissions, PinProtocolVersion, SharedSecret};
use crate::platform::{Platform, VerificationResult};
use crate::sizes::{MAX_RP_ID_LENGTH, PIN_HASH_LENGTH};
use crate::Bytes;

use super::{Authenticator, MAX_PIN_RETRIES};

/// The PIN, padded, is always transported in 64 bytes.
const PADDED_PIN_LENGTH: usize = 64;

impl<P: Platform> Authenticator<P> {
    pub(crate) fn client_pin_impl(&mut self, request: &Request) -> Result<Response> {
        if !self.config.supports_client_pin {
            return Err(Error::InvalidCommand);
        }
        match request.sub_command {
            Subcommand::GetPinRetries => Ok(Response {
                retries: Some(self.pin_retries),
                ..Default::default()
            }),
            Subcommand::GetKeyAgreement => {
                self.protocol_param(request)?;
                Ok(Response {
                    key_agreement: Some(self.key_agreement.public_key()),
                    ..Default::default()
                })
            }
            Subcommand::SetPin => self.set_pin(request),
            Subcommand::ChangePin => self.change_pin(request),
            Subcommand::GetPinToken => self.get_pin_token(request),
            Subcommand::GetPinUvAuthTokenUsingUvWithPermissions => {
                self.get_token_using_uv(request)
            }
            Subcommand::GetUvRetries => {
                if !self.config.supports_uv {
                    return Err(Error::InvalidSubcommand);
                }
                Ok(Response {
                    uv_retries: Some(MAX_PIN_RETRIES),
                    ..Default::default()
                })
            }
            Subcommand::GetPinUvAuthTokenUsingPinWithPermissions => {
                self.get_token_using_pin(request)
            }
        }
    }

    fn protocol_param(&self, request: &Request) -> Result<PinProtocolVersion> {
        let protocol = request.pin_protocol.ok_or(Error::MissingParameter)?;
        PinProtocolVersion::from_wire(protocol.into()).ok_or(Error::InvalidParameter)
    }

    fn set_pin(&mut self, request: &Request) -> Result<Response> {
        let version = self.protocol_param(request)?;
        if self.pin_is_set() {
            return Err(Error::PinAuthInvalid);
        }
        let key_agreement = request.key_agreement.as_ref().ok_or(Error::MissingParameter)?;
        let pin_auth = request.pin_auth.ok_or(Error::MissingParameter)?;
        let new_pin_enc = request.new_pin_enc.ok_or(Error::MissingParameter)?;

        let shared = self.key_agreement.agree(key_agreement, version)?;
        if !shared.verify(&[new_pin_enc], pin_auth) {
            return Err(Error::PinAuthInvalid);
        }
        let hash = self.decrypt_and_hash_new_pin(&shared, new_pin_enc)?;
        self.platform.store_pin_hash(Some(hash))?;
        self.pin_retries = MAX_PIN_RETRIES;
        info!("PIN set");
        Ok(Response::default())
    }

    fn change_pin(&mut self, request: &Request) -> Result<Response> {
        let version = self.protocol_param(request)?;
        let key_agreement = request.key_agreement.as_ref().ok_or(Error::MissingParameter)?;
        let pin_auth = request.pin_auth.ok_or(Error::MissingParameter)?;
        let new_pin_enc = request.new_pin_enc.ok_or(Error::MissingParameter)?;
        let pin_hash_enc = request.pin_hash_enc.ok_or(Error::MissingParameter)?;

        let shared = self.key_agreement.agree(key_agreement, version)?;
        if !shared.verify(&[new_pin_enc, pin_hash_enc], pin_auth) {
            return Err(Error::PinAuthInvalid);
        }
        self.check_pin_hash(&shared, pin_hash_enc)?;
        let hash = self.decrypt_and_hash_new_pin(&shared, new_pin_enc)?;
        self.platform.store_pin_hash(Some(hash))?;
        // changing the PIN retires outstanding tokens
        let rng = self.platform.rng();
        for token in &mut self.tokens {
            token.regenerate(rng);
        }
        info!("PIN changed");
        Ok(Response::default())
    }

    fn get_pin_token(&mut self, request: &Request) -> Result<Response> {
        let version = self.protocol_param(request)?;
        if self.config.no_mc_ga_permissions_with_client_pin {
            // the default mc+ga grant is exactly what this option forbids
            return Err(Error::NotAllowed);
        }
        let key_agreement = request.key_agreement.as_ref().ok_or(Error::MissingParameter)?;
        let pin_hash_enc = request.pin_hash_enc.ok_or(Error::MissingParameter)?;

        let shared = self.key_agreement.agree(key_agreement, version)?;
        self.check_pin_hash(&shared, pin_hash_enc)?;
        self.issue_token(
            version,
            &shared,
            Permissions::MAKE_CREDENTIAL | Permissions::GET_ASSERTION,
            None,
            false,
        )
    }

    fn get_token_using_pin(&mut self, request: &Request) -> Result<Response> {
        let version = self.protocol_param(request)?;
        let key_agreement = request.key_agreement.as_ref().ok_or(Error::MissingParameter)?;
        let pin_hash_enc = request.pin_hash_enc.ok_or(Error::MissingParameter)?;
        let permissions = self.requested_permissions(request)?;

        let shared = self.key_agreement.agree(key_agreement, version)?;
        self.check_pin_hash(&shared, pin_hash_enc)?;
        self.issue_token(version, &shared, permissions, request.rp_id, false)
    }

    fn get_token_using_uv(&mut self, request: &Request) -> Result<Response> {
        let version = self.protocol_param(request)?;
        if !self.config.supports_uv {
            return Err(Error::NotAllowed);
        }
        let key_agreement = request.key_agreement.as_ref().ok_or(Error::MissingParameter)?;
        let permissions = self.requested_permissions(request)?;

        match self.platform.user_verification() {
            VerificationResult::Accepted => {}
            VerificationResult::Denied => return Err(Error::UvInvalid),
            VerificationResult::RetriesExhausted => return Err(Error::UvBlocked),
        }
        let shared = self.key_agreement.agree(key_agreement, version)?;
        // the built-in method collects evidence of presence along the way
        self.issue_token(version, &shared, permissions, request.rp_id, true)
    }

    fn requested_permissions(&self, request: &Request) -> Result<Permissions> {
        let bits = request.permissions.ok_or(Error::MissingParameter)?;
        if bits == 0 {
            return Err(Error::InvalidParameter);
        }
        let permissions = Permissions::from_bits_truncate(bits);
        if self.config.no_mc_ga_permissions_with_client_pin
            && permissions
                .intersects(Permissions::MAKE_CREDENTIAL | Permissions::GET_ASSERTION)
        {
            return Err(Error::UnauthorizedPermission);
        }
        // no bio enrollment, credential management or authenticator config
        // surfaces exist to use these with
        if permissions.intersects(
            Permissions::BIO_ENROLLMENT
                | Permissions::CREDENTIAL_MANAGEMENT
                | Permissions::AUTHENTICATOR_CONFIGURATION,
        ) {
            return Err(Error::UnauthorizedPermission);
        }
        Ok(permissions)
    }

    /// Decrypts a pinHashEnc and burns a retry on mismatch; a mismatch also
    /// retires the key-agreement key.
    fn check_pin_hash(&mut self, shared: &SharedSecret, pin_hash_enc: &[u8]) -> Result<()> {
        let Some(stored) = self.platform.load_pin_hash() else {
            return Err(Error::PinNotSet);
        };
        if self.pin_retries == 0 {
            return Err(Error::PinBlocked);
        }
        self.pin_retries -= 1;

        let mut decrypted: Bytes<PIN_HASH_LENGTH> = Bytes::new();
        if shared.decrypt(pin_hash_enc, &mut decrypted).is_err()
            || !bool::from(decrypted.ct_eq(&stored))
        {
            self.key_agreement = KeyAgreementKey::generate(self.platform.rng());
            return Err(if self.pin_retries == 0 {
                Error::PinBlocked
            } else {
                Error::PinInvalid
            });
        }
        self.pin_retries = MAX_PIN_RETRIES;
        Ok(())
    }

    fn decrypt_and_hash_new_pin(
        &mut self,
        shared: &SharedSecret,
        new_pin_enc: &[u8],
    ) -> Result<[u8; PIN_HASH_LENGTH]> {
        let mut padded: Bytes<PADDED_PIN_LENGTH> = Bytes::new();
        shared.decrypt(new_pin_enc, &mut padded)?;
        if padded.len() != PADDED_PIN_LENGTH {
            return Err(Error::PinPolicyViolation);
        }
        let length = padded
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(PADDED_PIN_LENGTH);
        let pin = &padded[..length];
        let code_points = core::str::from_utf8(pin)
            .map_err(|_| Error::PinPolicyViolation)?
            .chars()
            .count();
        if code_points < 4 {
            return Err(Error::PinPolicyViolation);
        }

        let digest = crypto::sha256(pin);
        let mut hash = [0u8; PIN_HASH_LENGTH];
        hash.copy_from_slice(&digest[..PIN_HASH_LENGTH]);
        let padded: &mut [u8] = &mut padded;
        padded.zeroize();
        Ok(hash)
    }

    fn issue_token(
        &mut self,
        version: PinProtocolVersion,
        shared: &SharedSecret,
        permissions: Permissions,
        rp_id: Option<&str>,
        user_present: bool,
    ) -> Result<Response> {
        if rp_id.map(str::len).unwrap_or(0) > MAX_RP_ID_LENGTH {
            return Err(Error::InvalidParameter);
        }
        let index = match version {
            PinProtocolVersion::V1 => 0,
            PinProtocolVersion::V2 => 1,
        };
        let rng = self.platform.rng();
        self.tokens[index].regenerate(rng);
        self.tokens[index].begin_session(permissions, rp_id, user_present);

        let mut encrypted: Bytes<48> = Bytes::new();
        shared.encrypt(
            self.platform.rng(),
            self.tokens[index].secret(),
            &mut encrypted,
        )?;
        Ok(Response {
            pin_token: Some(encrypted),
            ..Default::default()
        })
    }
}
