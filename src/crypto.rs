//! Key generation, signing and hashing for the supported COSE algorithms.

use ed25519_dalek::Signer as _;
use p256::ecdsa::signature::DigestSigner as _;
use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::cose;
use crate::ctap2::{Error, Result};
use crate::sizes::*;
use crate::Bytes;

pub type HmacSha256 = hmac::Hmac<Sha256>;

/// Maximal length of the data signed by an assertion or attestation:
/// authenticator data followed by the 32-byte client data hash.
const SIGNED_MESSAGE_LENGTH: usize = AUTHENTICATOR_DATA_LENGTH + 32;

/// A COSE algorithm this authenticator can mint credentials for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Algorithm {
    Es256,
    Ed25519,
}

impl Algorithm {
    pub const fn id(self) -> i32 {
        match self {
            Algorithm::Es256 => -7,
            Algorithm::Ed25519 => -8,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            -7 => Some(Algorithm::Es256),
            -8 => Some(Algorithm::Ed25519),
            _ => None,
        }
    }

    /// Generates a fresh credential key pair.
    pub fn generate(self, rng: &mut impl CryptoRngCore) -> Result<KeyPair> {
        match self {
            Algorithm::Es256 => {
                let signing_key = p256::ecdsa::SigningKey::random(rng);
                let point = signing_key.verifying_key().to_encoded_point(false);
                let (Some(x), Some(y)) = (point.x(), point.y()) else {
                    return Err(Error::Other);
                };
                let public = cose::P256PublicKey {
                    x: Bytes::from_slice(x).map_err(|_| Error::Other)?,
                    y: Bytes::from_slice(y).map_err(|_| Error::Other)?,
                };
                Ok(KeyPair {
                    public: public.into(),
                    private: PrivateKey(signing_key.to_bytes().into()),
                })
            }
            Algorithm::Ed25519 => {
                let signing_key = ed25519_dalek::SigningKey::generate(rng);
                let public = cose::Ed25519PublicKey {
                    x: Bytes::from_slice(signing_key.verifying_key().as_bytes())
                        .map_err(|_| Error::Other)?,
                };
                Ok(KeyPair {
                    public: public.into(),
                    private: PrivateKey(signing_key.to_bytes()),
                })
            }
        }
    }

    /// Signs the concatenation of `parts`, left to right, without separators.
    ///
    /// ES256 signatures are ASN.1 DER encoded, Ed25519 signatures are the
    /// raw 64 bytes, both as WebAuthn expects them.
    pub fn sign(self, key: &PrivateKey, parts: &[&[u8]]) -> Result<Bytes<ASN1_SIGNATURE_LENGTH>> {
        match self {
            Algorithm::Es256 => {
                let signing_key =
                    p256::ecdsa::SigningKey::from_slice(&key.0).map_err(|_| Error::Other)?;
                let mut digest = Sha256::new();
                for part in parts {
                    digest.update(part);
                }
                let signature: p256::ecdsa::Signature = signing_key.sign_digest(digest);
                Bytes::from_slice(signature.to_der().as_bytes()).map_err(|_| Error::Other)
            }
            Algorithm::Ed25519 => {
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&key.0);
                // Ed25519 hashes internally, so the message must be assembled
                let mut message = Bytes::<SIGNED_MESSAGE_LENGTH>::new();
                for part in parts {
                    message.extend_from_slice(part).map_err(|_| Error::Other)?;
                }
                let signature = signing_key.sign(&message);
                Bytes::from_slice(&signature.to_bytes()).map_err(|_| Error::Other)
            }
        }
    }
}

/// Raw private key material; both supported algorithms use 32-byte secrets.
/// Zeroized on drop.
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut key = [0u8; 32];
        if bytes.len() != key.len() {
            return Err(Error::Other);
        }
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl core::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

pub struct KeyPair {
    pub public: cose::PublicKey,
    pub private: PrivateKey,
}

/// Serializes a COSE public key the way it is embedded in attested
/// credential data.
pub fn serialize_cose_key(key: &cose::PublicKey) -> Result<Bytes<COSE_KEY_LENGTH>> {
    cbor_smol::cbor_serialize_bytes(key).map_err(|_| Error::Other)
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// HMAC-SHA-256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    use hmac::Mac;
    let mut mac = HmacSha256::new_from_slice(key).expect("any key size is valid");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub struct TestRng(u64);

    impl rand_core::RngCore for TestRng {
        fn next_u32(&mut self) -> u32 {
            self.next_u64() as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    impl rand_core::CryptoRng for TestRng {}

    #[test]
    fn es256_sign_verify() {
        use p256::ecdsa::signature::DigestVerifier;

        let mut rng = TestRng(1);
        let key_pair = Algorithm::Es256.generate(&mut rng).unwrap();
        let signature = Algorithm::Es256
            .sign(&key_pair.private, &[b"auth data", b"client data hash"])
            .unwrap();

        let signing_key = p256::ecdsa::SigningKey::from_slice(key_pair.private.as_bytes()).unwrap();
        let parsed = p256::ecdsa::Signature::from_der(&signature).unwrap();
        let mut digest = Sha256::new();
        digest.update(b"auth data");
        digest.update(b"client data hash");
        assert!(signing_key
            .verifying_key()
            .verify_digest(digest, &parsed)
            .is_ok());
    }

    #[test]
    fn ed25519_sign_verify() {
        use ed25519_dalek::Verifier as _;

        let mut rng = TestRng(2);
        let key_pair = Algorithm::Ed25519.generate(&mut rng).unwrap();
        let signature = Algorithm::Ed25519
            .sign(&key_pair.private, &[b"auth data", b"client data hash"])
            .unwrap();
        assert_eq!(signature.len(), 64);

        let signing_key = ed25519_dalek::SigningKey::from_bytes(key_pair.private.as_bytes());
        let parsed = ed25519_dalek::Signature::from_slice(&signature).unwrap();
        let mut message = Vec::new();
        message.extend_from_slice(b"auth data");
        message.extend_from_slice(b"client data hash");
        assert!(signing_key.verify(&message, &parsed).is_ok());
    }

    #[test]
    fn cose_key_is_a_cbor_map() {
        let mut rng = TestRng(3);
        let key_pair = Algorithm::Es256.generate(&mut rng).unwrap();
        let serialized = serialize_cose_key(&key_pair.public).unwrap();
        // a five-entry map: kty, alg, crv, x, y
        assert_eq!(serialized[0], 0xa5);
    }

    #[test]
    fn independent_keys_differ() {
        let mut rng = TestRng(4);
        let first = Algorithm::Es256.generate(&mut rng).unwrap();
        let second = Algorithm::Es256.generate(&mut rng).unwrap();
        assert_ne!(first.private.as_bytes(), second.private.as_bytes());
    }
}
