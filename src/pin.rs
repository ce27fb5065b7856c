//! PIN/UV auth tokens and the PIN/UV auth protocols.
//!
//! The authenticator keeps one token per protocol version.  A token becomes
//! usable when the ClientPin command issues it after successful PIN or
//! built-in UV evidence; MakeCredential and GetAssertion then authorize
//! requests by verifying the platform's MAC over the client data hash and
//! consulting the token's permissions, RP binding and UP/UV flags
//! (CTAP 2.1 §6.5.5.7).

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use rand_core::CryptoRngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::cose::EcdhEsHkdf256PublicKey;
use crate::crypto::{hmac_sha256, sha256};
use crate::ctap2::Error;
use crate::sizes::{MAX_RP_ID_LENGTH, PIN_TOKEN_LENGTH};
use crate::{Bytes, String};

pub use crate::ctap2::client_pin::Permissions;

type Aes256CbcEncryptor = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDecryptor = cbc::Decryptor<aes::Aes256>;

const AES_BLOCK_LENGTH: usize = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinProtocolVersion {
    V1,
    V2,
}

impl PinProtocolVersion {
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    /// MACs are truncated to 16 bytes under protocol 1 and kept at the full
    /// 32 bytes under protocol 2.
    pub const fn mac_length(self) -> usize {
        match self {
            Self::V1 => 16,
            Self::V2 => 32,
        }
    }
}

/// Session secret agreed between the platform and the authenticator
/// key-agreement key.  Zeroized on drop.
pub struct SharedSecret {
    version: PinProtocolVersion,
    aes_key: [u8; 32],
    hmac_key: [u8; 32],
}

impl SharedSecret {
    /// kdf(Z): protocol 1 hashes the shared point's x-coordinate, protocol 2
    /// expands it into distinct HMAC and AES keys.
    pub fn derive(version: PinProtocolVersion, z: &[u8; 32]) -> Self {
        match version {
            PinProtocolVersion::V1 => {
                let key = sha256(z);
                Self {
                    version,
                    aes_key: key,
                    hmac_key: key,
                }
            }
            PinProtocolVersion::V2 => {
                let kdf = Hkdf::<Sha256>::new(Some(&[0u8; 32]), z);
                let mut hmac_key = [0u8; 32];
                let mut aes_key = [0u8; 32];
                // 32-byte outputs cannot exceed the HKDF limit
                kdf.expand(b"CTAP2 HMAC key", &mut hmac_key).unwrap();
                kdf.expand(b"CTAP2 AES key", &mut aes_key).unwrap();
                Self {
                    version,
                    aes_key,
                    hmac_key,
                }
            }
        }
    }

    pub fn version(&self) -> PinProtocolVersion {
        self.version
    }

    /// authenticate(key, message): HMAC-SHA-256, truncated per version.
    pub fn authenticate(&self, parts: &[&[u8]]) -> [u8; 32] {
        hmac_sha256(&self.hmac_key, parts)
    }

    /// Constant-time check of a platform-supplied MAC.
    pub fn verify(&self, parts: &[&[u8]], mac: &[u8]) -> bool {
        let full = self.authenticate(parts);
        let expected = &full[..self.version.mac_length()];
        mac.len() == expected.len() && bool::from(expected.ct_eq(mac))
    }

    /// AES-256-CBC encryption; protocol 1 uses an all-zero IV, protocol 2
    /// prepends a fresh random IV.
    pub fn encrypt<const N: usize>(
        &self,
        rng: &mut impl CryptoRngCore,
        plaintext: &[u8],
        out: &mut Bytes<N>,
    ) -> Result<(), Error> {
        if plaintext.is_empty() || plaintext.len() % AES_BLOCK_LENGTH != 0 {
            return Err(Error::InvalidParameter);
        }
        let mut iv = [0u8; AES_BLOCK_LENGTH];
        if self.version == PinProtocolVersion::V2 {
            rng.fill_bytes(&mut iv);
            out.extend_from_slice(&iv).map_err(|_| Error::Other)?;
        }
        let start = out.len();
        out.extend_from_slice(plaintext).map_err(|_| Error::Other)?;
        Aes256CbcEncryptor::new(&self.aes_key.into(), &iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut out[start..], plaintext.len())
            .map_err(|_| Error::Other)?;
        Ok(())
    }

    /// The inverse of [`encrypt`][Self::encrypt]; strips the IV under
    /// protocol 2.
    pub fn decrypt<const N: usize>(
        &self,
        ciphertext: &[u8],
        out: &mut Bytes<N>,
    ) -> Result<(), Error> {
        let (iv, ciphertext) = match self.version {
            PinProtocolVersion::V1 => ([0u8; AES_BLOCK_LENGTH], ciphertext),
            PinProtocolVersion::V2 => {
                if ciphertext.len() < AES_BLOCK_LENGTH {
                    return Err(Error::InvalidParameter);
                }
                let (iv, rest) = ciphertext.split_at(AES_BLOCK_LENGTH);
                let mut array = [0u8; AES_BLOCK_LENGTH];
                array.copy_from_slice(iv);
                (array, rest)
            }
        };
        if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_LENGTH != 0 {
            return Err(Error::InvalidParameter);
        }
        out.extend_from_slice(ciphertext).map_err(|_| Error::Other)?;
        Aes256CbcDecryptor::new(&self.aes_key.into(), &iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut out[..])
            .map_err(|_| Error::Other)?;
        Ok(())
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.aes_key.zeroize();
        self.hmac_key.zeroize();
    }
}

/// The authenticator's ECDH key-agreement key.  Regenerated at boot, after
/// a PIN mismatch, and on reset.
pub struct KeyAgreementKey(p256::ecdh::EphemeralSecret);

impl KeyAgreementKey {
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        Self(p256::ecdh::EphemeralSecret::random(rng))
    }

    pub fn public_key(&self) -> EcdhEsHkdf256PublicKey {
        use p256::elliptic_curve::sec1::ToEncodedPoint as _;
        let point = self.0.public_key().to_encoded_point(false);
        EcdhEsHkdf256PublicKey {
            x: Bytes::from_slice(point.x().expect("key agreement key is not the identity"))
                .expect("x coordinate is 32 bytes"),
            y: Bytes::from_slice(point.y().expect("key agreement key is not compressed"))
                .expect("y coordinate is 32 bytes"),
        }
    }

    /// ecdh(peerCoseKey) followed by the protocol's kdf.
    pub fn agree(
        &self,
        peer: &EcdhEsHkdf256PublicKey,
        version: PinProtocolVersion,
    ) -> Result<SharedSecret, Error> {
        use p256::elliptic_curve::sec1::FromEncodedPoint as _;

        if peer.x.len() != 32 || peer.y.len() != 32 {
            return Err(Error::InvalidParameter);
        }
        let point = p256::EncodedPoint::from_affine_coordinates(
            p256::FieldBytes::from_slice(&peer.x),
            p256::FieldBytes::from_slice(&peer.y),
            false,
        );
        let peer_key = Option::<p256::PublicKey>::from(p256::PublicKey::from_encoded_point(&point))
            .ok_or(Error::InvalidParameter)?;
        let shared_point = self.0.diffie_hellman(&peer_key);
        let mut z = [0u8; 32];
        z.copy_from_slice(shared_point.raw_secret_bytes());
        let secret = SharedSecret::derive(version, &z);
        z.zeroize();
        Ok(secret)
    }
}

/// A per-boot PIN/UV auth token with its session state.
pub struct PinUvAuthToken {
    version: PinProtocolVersion,
    token: [u8; PIN_TOKEN_LENGTH],
    permissions: Permissions,
    rp_id: Option<String<MAX_RP_ID_LENGTH>>,
    user_present: bool,
    user_verified: bool,
    in_use: bool,
}

impl PinUvAuthToken {
    pub fn new(version: PinProtocolVersion, rng: &mut impl CryptoRngCore) -> Self {
        let mut token = [0u8; PIN_TOKEN_LENGTH];
        rng.fill_bytes(&mut token);
        Self {
            version,
            token,
            permissions: Permissions::empty(),
            rp_id: None,
            user_present: false,
            user_verified: false,
            in_use: false,
        }
    }

    pub fn version(&self) -> PinProtocolVersion {
        self.version
    }

    /// Rotates the token secret and ends any session.
    pub fn regenerate(&mut self, rng: &mut impl CryptoRngCore) {
        self.token.zeroize();
        rng.fill_bytes(&mut self.token);
        self.permissions = Permissions::empty();
        self.rp_id = None;
        self.user_present = false;
        self.user_verified = false;
        self.in_use = false;
    }

    /// Starts a session after PIN or UV evidence was collected.
    /// `user_present` is true only when the collection method itself proved
    /// presence (e.g. on-device biometrics); PIN entry on the platform does
    /// not.
    pub fn begin_session(
        &mut self,
        permissions: Permissions,
        rp_id: Option<&str>,
        user_present: bool,
    ) {
        self.permissions = permissions;
        self.rp_id = rp_id.map(String::from);
        self.user_present = user_present;
        self.user_verified = true;
        self.in_use = true;
    }

    /// Constant-time MAC verification over `message`; always fails while no
    /// session is active.
    pub fn verify(&self, message: &[u8], mac: &[u8]) -> bool {
        if !self.in_use {
            return false;
        }
        let full = hmac_sha256(&self.token, &[message]);
        let expected = &full[..self.version.mac_length()];
        mac.len() == expected.len() && bool::from(expected.ct_eq(mac))
    }

    pub(crate) fn secret(&self) -> &[u8; PIN_TOKEN_LENGTH] {
        &self.token
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn rp_id(&self) -> Option<&str> {
        self.rp_id.as_deref()
    }

    /// Binds an unbound token to the RP of its first use.
    pub fn set_rp_id(&mut self, rp_id: &str) {
        self.rp_id = Some(String::from(rp_id));
    }

    pub fn user_present(&self) -> bool {
        self.user_present
    }

    pub fn user_verified(&self) -> bool {
        self.user_verified
    }

    pub fn clear_user_present_flag(&mut self) {
        self.user_present = false;
    }

    pub fn clear_user_verified_flag(&mut self) {
        self.user_verified = false;
    }

    /// Drops every permission except largeBlobWrite; the RP binding goes
    /// with them unless largeBlobWrite survives (CTAP 2.1 §6.5.5.7).
    pub fn clear_permissions_except_lbw(&mut self) {
        self.permissions &= Permissions::LARGE_BLOB_WRITE;
        if self.permissions.is_empty() {
            self.rp_id = None;
        }
    }
}

impl Drop for PinUvAuthToken {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}
