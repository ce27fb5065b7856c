//! The authenticatorGetAssertion and authenticatorGetNextAssertion
//! pipelines.
//!
//! The front half mirrors MakeCredential's gates (with the getAssertion
//! permission and no enterprise-attestation step); the back half locates
//! candidate credentials, applies their credProtect policies against the
//! achieved UV state, and signs.  When discovery turns up several
//! credentials, the remainder is parked for GetNextAssertion.

use crate::crypto::{self, Algorithm, PrivateKey};
use crate::ctap2::get_assertion::{
    AuthenticatorData, ExtensionsOutput, HmacSecretInput, Request, Response,
};
use crate::ctap2::{AuthenticatorDataFlags, Error, Result};
use crate::pin::{Permissions, PinProtocolVersion};
use crate::platform::{Platform, PresenceIntent, PresenceResult, VerificationResult};
use crate::sizes::MAX_CREDENTIAL_COUNT_IN_LIST;
use crate::store::{CredentialField, CredentialId, CredentialProtectionPolicy, CredentialStore};
use crate::webauthn::{PublicKeyCredentialDescriptor, PublicKeyCredentialUserEntity};
use crate::{Bytes, Vec};

use super::{AssertionState, Authenticator};

impl<P: Platform> Authenticator<P> {
    pub(crate) fn get_assertion_impl(&mut self, request: &Request) -> Result<Response> {
        // a new request drops any parked continuation state
        self.assertions = None;

        // 1-2. pinUvAuthParam probe and protocol validation
        let token_version = self.preflight_pin_uv_auth(
            request.pin_uv_auth_param,
            request.pin_uv_auth_protocol,
            PresenceIntent::GetAssertion,
            Some(request.rp_id.as_str()),
        )?;

        // 4.
        let mut uv_response = false;
        let mut up_response = false;

        // 5. effective options; "rk" is not defined for assertions
        let options = request.options.as_ref();
        if options.and_then(|options| options.rk).is_some() {
            return Err(Error::UnsupportedOption);
        }
        let up = options.and_then(|options| options.up).unwrap_or(true);
        let mut uv = options.and_then(|options| options.uv).unwrap_or(false);
        if token_version.is_some() {
            uv = false;
        }
        if uv && !self.config.supports_uv {
            return Err(Error::InvalidOption);
        }

        // 6. alwaysUv
        if self.config.always_uv && token_version.is_none() && !uv {
            if !self.protected() {
                return Err(Error::OperationDenied);
            }
            if self.config.supports_uv {
                uv = true;
            } else {
                return Err(self.pin_gate_error());
            }
        }

        // 10-11. user verification; skipped entirely for unauthenticated
        // requests, which instead see only unprotected credentials
        if let (Some(version), Some(param)) = (token_version, request.pin_uv_auth_param) {
            let token = self.token_mut(version);
            if !token.verify(&request.client_data_hash, param) {
                return Err(Error::PinAuthInvalid);
            }
            if !token.permissions().contains(Permissions::GET_ASSERTION) {
                return Err(Error::PinAuthInvalid);
            }
            if let Some(bound_rp_id) = token.rp_id() {
                if bound_rp_id != request.rp_id.as_str() {
                    return Err(Error::PinAuthInvalid);
                }
            }
            if !token.user_verified() {
                return Err(Error::PinAuthInvalid);
            }
            uv_response = true;
            if token.rp_id().is_none() {
                token.set_rp_id(&request.rp_id);
            }
        } else if uv {
            match self.platform.user_verification() {
                VerificationResult::Accepted => uv_response = true,
                _ => return Err(Error::UvInvalid),
            }
        }

        // locate candidates for this RP, visibility per credProtect
        let now = self.platform.millis();
        let allow_list = request
            .allow_list
            .as_ref()
            .filter(|allow_list| !allow_list.is_empty());
        let discovery = allow_list.is_none();
        let mut credential_ids: Vec<CredentialId, MAX_CREDENTIAL_COUNT_IN_LIST> = Vec::new();
        if let Some(allow_list) = allow_list {
            for descriptor in allow_list {
                if descriptor.key_type != "public-key" {
                    continue;
                }
                let Some(entry) = self.platform.store().get_entry(descriptor.id) else {
                    continue;
                };
                if self.platform.store().get_field(&entry, CredentialField::RpId, now)
                    != Some(request.rp_id.as_bytes())
                {
                    continue;
                }
                let policy = self.entry_policy(&entry, now);
                if policy == CredentialProtectionPolicy::Required && !uv_response {
                    continue;
                }
                let id = *self.platform.store().entry_id(&entry);
                if credential_ids.iter().all(|existing| existing != &id) {
                    credential_ids.push(id).ok();
                }
            }
        } else {
            let mut index = 0;
            while let Some(entry) = self.platform.store().nth_entry(&request.rp_id, index) {
                index += 1;
                // without an allowList, anything above "optional" stays
                // hidden from unverified callers
                let policy = self.entry_policy(&entry, now);
                if policy != CredentialProtectionPolicy::Optional && !uv_response {
                    continue;
                }
                if credential_ids.push(*self.platform.store().entry_id(&entry)).is_err() {
                    debug!("credential list truncated");
                    break;
                }
            }
        }

        // user presence, as in MakeCredential step 14
        if up {
            let up_satisfied = up_response
                || token_version
                    .map(|version| self.token(version).user_present())
                    .unwrap_or(false);
            if !up_satisfied
                && self.platform.user_presence(
                    PresenceIntent::GetAssertion,
                    Some(request.rp_id.as_str()),
                    None,
                ) != PresenceResult::Accepted
            {
                return Err(Error::OperationDenied);
            }
            up_response = true;
            if let Some(version) = token_version {
                let token = self.token_mut(version);
                token.clear_user_present_flag();
                token.clear_user_verified_flag();
                token.clear_permissions_except_lbw();
            }
        }

        if credential_ids.is_empty() {
            return Err(Error::NoCredentials);
        }

        let number_of_credentials =
            (discovery && credential_ids.len() > 1).then(|| credential_ids.len() as u32);
        let hmac_secret = request
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.hmac_secret.as_ref());

        let response = self.sign_assertion(
            &credential_ids[0],
            &request.client_data_hash,
            uv_response,
            up_response,
            hmac_secret,
            discovery,
            number_of_credentials,
        )?;

        if discovery && credential_ids.len() > 1 {
            self.assertions = Some(AssertionState {
                credential_ids,
                next: 1,
                client_data_hash: request.client_data_hash.clone(),
                user_verified: uv_response,
            });
        }
        Ok(response)
    }

    pub(crate) fn get_next_assertion_impl(&mut self) -> Result<Response> {
        let Some(mut state) = self.assertions.take() else {
            return Err(Error::NotAllowed);
        };
        if state.next >= state.credential_ids.len() {
            return Err(Error::NotAllowed);
        }
        let credential_id = state.credential_ids[state.next];
        let client_data_hash = state.client_data_hash.clone();
        let user_verified = state.user_verified;

        // follow-up assertions carry no fresh user-presence evidence
        let response = self.sign_assertion(
            &credential_id,
            &client_data_hash,
            user_verified,
            false,
            None,
            true,
            None,
        )?;

        state.next += 1;
        if state.next < state.credential_ids.len() {
            self.assertions = Some(state);
        }
        Ok(response)
    }

    fn entry_policy(
        &mut self,
        entry: &<P::Store as CredentialStore>::Entry,
        now: u64,
    ) -> CredentialProtectionPolicy {
        self.platform
            .store()
            .get_field(entry, CredentialField::Policy, now)
            .and_then(|value| value.first().copied())
            .and_then(|byte| CredentialProtectionPolicy::try_from(byte).ok())
            .unwrap_or_default()
    }

    /// Builds one assertion: bumps the credential's usage counter, assembles
    /// the authenticator data and signs it together with the client data
    /// hash.
    #[allow(clippy::too_many_arguments)]
    fn sign_assertion(
        &mut self,
        credential_id: &CredentialId,
        client_data_hash: &[u8],
        user_verified: bool,
        user_present: bool,
        hmac_secret: Option<&HmacSecretInput>,
        include_user: bool,
        number_of_credentials: Option<u32>,
    ) -> Result<Response> {
        let now = self.platform.millis();
        let Some(mut entry) = self.platform.store().get_entry(credential_id) else {
            return Err(Error::NoCredentials);
        };

        let rp_id_hash = self
            .platform
            .store()
            .get_field(&entry, CredentialField::RpId, now)
            .map(crypto::sha256)
            .ok_or(Error::Other)?;
        let algorithm = self
            .platform
            .store()
            .get_field(&entry, CredentialField::Algorithm, now)
            .and_then(|value| value.try_into().ok())
            .map(i32::from_be_bytes)
            .and_then(Algorithm::from_id)
            .ok_or(Error::Other)?;
        let private_key = self
            .platform
            .store()
            .get_field(&entry, CredentialField::PrivateKey, now)
            .map(PrivateKey::from_bytes)
            .ok_or(Error::Other)??;
        let user_id = self
            .platform
            .store()
            .get_field(&entry, CredentialField::UserId, now)
            .and_then(|value| Bytes::from_slice(value).ok());
        let cred_random_field = if user_verified {
            CredentialField::CredRandomWithUv
        } else {
            CredentialField::CredRandomWithoutUv
        };
        let cred_random: Option<[u8; 32]> = self
            .platform
            .store()
            .get_field(&entry, cred_random_field, now)
            .and_then(|value| value.try_into().ok());

        let extensions = match (hmac_secret, cred_random) {
            (Some(input), Some(cred_random)) => {
                let output = self.process_hmac_secret(input, &cred_random)?;
                Some(ExtensionsOutput {
                    hmac_secret: Some(output),
                })
            }
            _ => None,
        };

        // the monotonic signature counter
        let sign_count = self
            .platform
            .store()
            .get_field(&entry, CredentialField::UsageCount, now)
            .and_then(|value| value.try_into().ok())
            .map(u32::from_be_bytes)
            .unwrap_or(1);
        let store = self.platform.store();
        store.add_field(
            &mut entry,
            CredentialField::UsageCount,
            &sign_count.wrapping_add(1).to_be_bytes(),
            now,
        )?;
        store.add_entry(entry)?;
        store.persist().map_err(|_| Error::Other)?;

        let mut flags = AuthenticatorDataFlags::empty();
        if user_present {
            flags |= AuthenticatorDataFlags::USER_PRESENCE;
        }
        if user_verified {
            flags |= AuthenticatorDataFlags::USER_VERIFIED;
        }
        if extensions.is_some() {
            flags |= AuthenticatorDataFlags::EXTENSION_DATA;
        }

        let auth_data = AuthenticatorData {
            rp_id_hash: &rp_id_hash,
            flags,
            sign_count,
            attested_credential_data: None,
            extensions,
        };
        let auth_data = auth_data.serialize()?;

        let signature = algorithm.sign(&private_key, &[&auth_data, client_data_hash])?;

        Ok(Response {
            credential: PublicKeyCredentialDescriptor::public_key(credential_id),
            auth_data,
            signature,
            user: include_user
                .then(|| user_id.map(PublicKeyCredentialUserEntity::from_id))
                .flatten(),
            number_of_credentials,
        })
    }

    /// The hmac-secret extension: decrypt the platform's salts under the
    /// shared secret, answer with HMACs keyed by the credential's secret.
    fn process_hmac_secret(
        &mut self,
        input: &HmacSecretInput,
        cred_random: &[u8; 32],
    ) -> Result<Bytes<80>> {
        let version = match input.pin_protocol {
            None => PinProtocolVersion::V1,
            Some(wire) => PinProtocolVersion::from_wire(wire).ok_or(Error::InvalidParameter)?,
        };
        let shared = self.key_agreement.agree(&input.key_agreement, version)?;
        if !shared.verify(&[&input.salt_enc], &input.salt_auth) {
            return Err(Error::PinAuthInvalid);
        }
        let mut salts: Bytes<64> = Bytes::new();
        shared.decrypt(&input.salt_enc, &mut salts)?;
        if salts.len() != 32 && salts.len() != 64 {
            return Err(Error::InvalidParameter);
        }

        let mut outputs: Bytes<64> = Bytes::new();
        outputs
            .extend_from_slice(&crypto::hmac_sha256(cred_random, &[&salts[..32]]))
            .map_err(|_| Error::Other)?;
        if salts.len() == 64 {
            outputs
                .extend_from_slice(&crypto::hmac_sha256(cred_random, &[&salts[32..]]))
                .map_err(|_| Error::Other)?;
        }

        let mut encrypted: Bytes<80> = Bytes::new();
        shared.encrypt(self.platform.rng(), &outputs, &mut encrypted)?;
        Ok(encrypted)
    }
}
