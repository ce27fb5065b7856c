//! The authenticatorMakeCredential pipeline.
//!
//! An ordered sequence of policy gates (numbered as in CTAP 2.1 §6.1.2);
//! the first gate that fails aborts the request with its status and no
//! response bytes are produced.

use crate::crypto;
use rand_core::RngCore;
use crate::ctap2::make_credential::{
    AttestedCredentialData, AuthenticatorData, Extensions, Request, Response,
};
use crate::ctap2::{
    AttestationStatement, AuthenticatorDataFlags, Error, NoneAttestationStatement,
    PackedAttestationStatement, Result,
};
use crate::pin::Permissions;
use crate::platform::{Platform, PresenceIntent, PresenceResult, VerificationResult};
use crate::sizes::CREDENTIAL_ID_LENGTH;
use crate::store::{CredentialField, CredentialProtectionPolicy, CredentialStore};
use crate::String;

use super::{AttestationKind, Authenticator};

impl<P: Platform> Authenticator<P> {
    pub(crate) fn make_credential_impl(&mut self, request: &Request) -> Result<Response> {
        // 1-2. pinUvAuthParam probe and protocol validation
        let token_version = self.preflight_pin_uv_auth(
            request.pin_uv_auth_param,
            request.pin_uv_auth_protocol,
            PresenceIntent::MakeCredential,
            Some(request.rp.id.as_str()),
        )?;

        // 3. first mutually supported algorithm, in platform order
        let algorithm = request
            .pub_key_cred_params
            .iter()
            .filter(|params| params.is_public_key())
            .find_map(|params| {
                self.config
                    .algorithms
                    .iter()
                    .copied()
                    .find(|algorithm| algorithm.id() == params.alg)
            })
            .ok_or(Error::UnsupportedAlgorithm)?;

        // 4.
        let mut uv_response = false;
        let mut up_response = false;

        // 5. effective options
        let options = request.options.as_ref();
        let rk = options.and_then(|options| options.rk).unwrap_or(false);
        let up = options.and_then(|options| options.up).unwrap_or(true);
        let mut uv = options.and_then(|options| options.uv).unwrap_or(false);
        if token_version.is_some() {
            // authorization comes from the token, not from built-in UV
            uv = false;
        }
        if uv && !self.config.supports_uv {
            return Err(Error::InvalidOption);
        }
        if rk && !self.config.supports_rk {
            return Err(Error::InvalidOption);
        }
        if !up {
            // user presence is not negotiable for credential creation
            return Err(Error::InvalidOption);
        }

        // 6. alwaysUv
        let mut make_cred_uv_not_rqd = self.config.make_cred_uv_not_rqd;
        if self.config.always_uv {
            make_cred_uv_not_rqd = false;
            if !self.protected() {
                return Err(Error::OperationDenied);
            }
            if token_version.is_none() && !uv {
                if self.config.supports_uv {
                    uv = true;
                } else {
                    return Err(self.pin_gate_error());
                }
            }
        }

        // 7-8. a protected authenticator requires authentication, except for
        // non-discoverable creation when makeCredUvNotRqd allows it
        let authenticated = uv || token_version.is_some();
        if !authenticated && self.protected() && (!make_cred_uv_not_rqd || rk) {
            return Err(self.pin_gate_error());
        }

        // 9. enterprise attestation is not supported
        if request.enterprise_attestation.is_some() {
            return Err(Error::InvalidParameter);
        }

        // 10.
        let skip_auth = !rk && !uv && make_cred_uv_not_rqd && token_version.is_none();

        // 11. user verification
        if !skip_auth {
            if let (Some(version), Some(param)) = (token_version, request.pin_uv_auth_param) {
                let rp_id = &request.rp.id;
                let token = self.token_mut(version);
                if !token.verify(request.client_data_hash, param) {
                    return Err(Error::PinAuthInvalid);
                }
                if !token.permissions().contains(Permissions::MAKE_CREDENTIAL) {
                    return Err(Error::PinAuthInvalid);
                }
                if let Some(bound_rp_id) = token.rp_id() {
                    if bound_rp_id != rp_id.as_str() {
                        return Err(Error::PinAuthInvalid);
                    }
                }
                if !token.user_verified() {
                    return Err(Error::PinAuthInvalid);
                }
                uv_response = true;
                if token.rp_id().is_none() {
                    token.set_rp_id(rp_id);
                }
            } else if uv {
                match self.platform.user_verification() {
                    VerificationResult::Accepted => uv_response = true,
                    _ => return Err(Error::UvInvalid),
                }
            } else {
                // the gates above guarantee one of the two paths
                return Err(Error::Other);
            }
        }

        // 12. excludeList
        if let Some(exclude_list) = &request.exclude_list {
            let now = self.platform.millis();
            for descriptor in exclude_list {
                if descriptor.key_type != "public-key" {
                    continue;
                }
                let Some(entry) = self.platform.store().get_entry(descriptor.id) else {
                    continue;
                };
                if self.platform.store().get_field(&entry, CredentialField::RpId, now)
                    != Some(request.rp.id.as_bytes())
                {
                    continue;
                }
                let policy = self
                    .platform
                    .store()
                    .get_field(&entry, CredentialField::Policy, now)
                    .and_then(|value| value.first().copied())
                    .and_then(|byte| CredentialProtectionPolicy::try_from(byte).ok())
                    .unwrap_or_default();
                if policy == CredentialProtectionPolicy::Required && !uv_response {
                    // invisible without user verification
                    continue;
                }
                let up_satisfied = up_response
                    || token_version
                        .map(|version| self.token(version).user_present())
                        .unwrap_or(false);
                if !up_satisfied {
                    // the user learns of the collision regardless of consent
                    let _ = self.platform.user_presence(
                        PresenceIntent::MakeCredential,
                        Some(request.rp.id.as_str()),
                        Some(&request.user),
                    );
                }
                info!("excluded credential matched");
                return Err(Error::CredentialExcluded);
            }
        }

        // 13. (reserved)

        // 14. user presence
        if up {
            let up_satisfied = up_response
                || token_version
                    .map(|version| self.token(version).user_present())
                    .unwrap_or(false);
            if !up_satisfied
                && self.platform.user_presence(
                    PresenceIntent::MakeCredential,
                    Some(request.rp.id.as_str()),
                    Some(&request.user),
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

        // 15. extensions
        let mut extensions = Extensions::default();
        let mut policy = None;
        let mut cred_randoms = None;
        if let Some(requested) = &request.extensions {
            if let Some(level) = requested.cred_protect {
                policy = Some(CredentialProtectionPolicy::try_from(level)?);
                extensions.cred_protect = Some(level);
            }
            if requested.hmac_secret == Some(true) {
                let mut with_uv = [0u8; 32];
                let mut without_uv = [0u8; 32];
                let rng = self.platform.rng();
                rng.fill_bytes(&mut with_uv);
                rng.fill_bytes(&mut without_uv);
                cred_randoms = Some((with_uv, without_uv));
                extensions.hmac_secret = Some(true);
            }
        }

        // 16. mint the credential
        let mut credential_id = [0u8; CREDENTIAL_ID_LENGTH];
        self.platform.rng().fill_bytes(&mut credential_id);
        let key_pair = algorithm.generate(self.platform.rng())?;
        let now = self.platform.millis();

        let store = self.platform.store();
        let mut entry = store.create_entry(&credential_id)?;
        store.add_field(&mut entry, CredentialField::RpId, request.rp.id.as_bytes(), now)?;
        store.add_field(&mut entry, CredentialField::UserId, &request.user.id, now)?;
        store.add_field(
            &mut entry,
            CredentialField::PrivateKey,
            key_pair.private.as_bytes(),
            now,
        )?;
        store.add_field(
            &mut entry,
            CredentialField::Algorithm,
            &algorithm.id().to_be_bytes(),
            now,
        )?;
        if let Some(policy) = policy {
            store.add_field(&mut entry, CredentialField::Policy, &[policy as u8], now)?;
        }
        if let Some((with_uv, without_uv)) = &cred_randoms {
            store.add_field(&mut entry, CredentialField::CredRandomWithUv, with_uv, now)?;
            store.add_field(
                &mut entry,
                CredentialField::CredRandomWithoutUv,
                without_uv,
                now,
            )?;
        }
        store.add_field(
            &mut entry,
            CredentialField::UsageCount,
            &1u32.to_be_bytes(),
            now,
        )?;

        // 17-18. commit, then make it durable
        store.add_entry(entry)?;
        store.persist().map_err(|_| Error::Other)?;

        // 19. attestation object
        let rp_id_hash = crypto::sha256(request.rp.id.as_bytes());
        let mut flags = AuthenticatorDataFlags::ATTESTED_CREDENTIAL_DATA;
        if up_response {
            flags |= AuthenticatorDataFlags::USER_PRESENCE;
        }
        if uv_response {
            flags |= AuthenticatorDataFlags::USER_VERIFIED;
        }
        if !extensions.is_empty() {
            flags |= AuthenticatorDataFlags::EXTENSION_DATA;
        }

        let credential_public_key = crypto::serialize_cose_key(&key_pair.public)?;
        let auth_data = AuthenticatorData {
            rp_id_hash: &rp_id_hash,
            flags,
            sign_count: 0,
            attested_credential_data: Some(AttestedCredentialData {
                aaguid: &self.config.aaguid,
                credential_id: &credential_id,
                credential_public_key: &credential_public_key,
            }),
            extensions: (!extensions.is_empty()).then_some(extensions),
        };
        let auth_data = auth_data.serialize()?;

        let att_stmt = match self.config.attestation {
            AttestationKind::None => AttestationStatement::None(NoneAttestationStatement {}),
            AttestationKind::SelfSigned => {
                let signature = algorithm.sign(
                    &key_pair.private,
                    &[&auth_data, &request.client_data_hash[..]],
                )?;
                AttestationStatement::Packed(PackedAttestationStatement {
                    alg: algorithm.id(),
                    sig: signature,
                    x5c: None,
                })
            }
        };

        // the key pair, and with it the private key, is dropped (zeroized)
        // here, before response encoding
        Ok(Response {
            fmt: String::from("packed"),
            auth_data,
            att_stmt,
        })
    }
}
