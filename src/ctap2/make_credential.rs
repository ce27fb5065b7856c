use crate::{String, Vec};

use serde::{Deserialize, Serialize};
use serde_indexed::{DeserializeIndexed, SerializeIndexed};

use super::{AttestationStatement, AuthenticatorOptions, Error};
use crate::sizes::*;
use crate::store::CredentialProtectionPolicy;
use crate::webauthn::*;

impl TryFrom<u8> for CredentialProtectionPolicy {
    type Error = super::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => CredentialProtectionPolicy::Optional,
            2 => CredentialProtectionPolicy::OptionalWithCredentialIdList,
            3 => CredentialProtectionPolicy::Required,
            _ => return Err(Self::Error::InvalidParameter),
        })
    }
}

/// Extension inputs, and also the extension outputs echoed inside the
/// authenticator data (the `ed` flag is set iff any output is present).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(rename = "credProtect")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cred_protect: Option<u8>,
    #[serde(rename = "hmac-secret")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac_secret: Option<bool>,
}

impl Extensions {
    pub fn is_empty(&self) -> bool {
        self.cred_protect.is_none() && self.hmac_secret.is_none()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, SerializeIndexed, DeserializeIndexed)]
#[serde_indexed(offset = 1)]
pub struct Request<'a> {
    // 0x01
    pub client_data_hash: &'a serde_bytes::Bytes,
    // 0x02
    pub rp: PublicKeyCredentialRpEntity,
    // 0x03
    pub user: PublicKeyCredentialUserEntity,
    // 0x04
    pub pub_key_cred_params: PublicKeyCredentialParametersList,
    // 0x05
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_list: Option<Vec<PublicKeyCredentialDescriptorRef<'a>, 16>>,
    // 0x06
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
    // 0x07
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<AuthenticatorOptions>,
    // 0x08
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_uv_auth_param: Option<&'a serde_bytes::Bytes>,
    // 0x09
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_uv_auth_protocol: Option<u32>,
    // 0x0A
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enterprise_attestation: Option<u32>,
}

pub type AttestationObject = Response;

pub type AuthenticatorData<'a> =
    super::AuthenticatorData<'a, AttestedCredentialData<'a>, Extensions>;

// NOTE: This is not CBOR, it has a custom encoding...
// https://www.w3.org/TR/webauthn/#sec-attested-credential-data
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttestedCredentialData<'a> {
    pub aaguid: &'a [u8],
    pub credential_id: &'a [u8],
    pub credential_public_key: &'a [u8],
}

impl<'a> super::SerializeAttestedCredentialData for AttestedCredentialData<'a> {
    fn serialize(&self, buffer: &mut super::SerializedAuthenticatorData) -> Result<(), Error> {
        let credential_id_length =
            u16::try_from(self.credential_id.len()).map_err(|_| Error::Other)?;
        // aaguid, 16-bit big-endian id length, the id, then the COSE key map
        super::extend(buffer, self.aaguid)?;
        super::extend(buffer, &credential_id_length.to_be_bytes())?;
        super::extend(buffer, self.credential_id)?;
        super::extend(buffer, self.credential_public_key)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, SerializeIndexed)]
#[non_exhaustive]
#[serde_indexed(offset = 1)]
pub struct Response {
    // 0x01
    pub fmt: String<32>,
    // 0x02
    pub auth_data: super::SerializedAuthenticatorData,
    // 0x03
    pub att_stmt: AttestationStatement,
}
