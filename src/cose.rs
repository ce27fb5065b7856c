//! COSE_Key serde for the three key kinds this authenticator handles.
//!
//! <https://tools.ietf.org/html/rfc8152#section-7>
//!
//! Credential public keys (ES256 and Ed25519) are only ever produced, and
//! the ECDH-ES+HKDF-256 key-agreement key of the PIN protocols is both
//! produced and consumed, so this module hand-rolls exactly those maps
//! instead of modeling the whole COSE registry.  Labels are emitted in
//! canonical CBOR order (1, 3, -1, -2, -3) and are demanded in that order
//! when parsing; CTAP requires platforms to send keyAgreement keys without
//! extra parameters.

use crate::Bytes;
use serde::de::{Error as _, MapAccess, Unexpected};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

const LABEL_KTY: i8 = 1;
const LABEL_ALG: i8 = 3;
const LABEL_CRV: i8 = -1;
const LABEL_X: i8 = -2;
const LABEL_Y: i8 = -3;

const KTY_OKP: i8 = 1;
const KTY_EC2: i8 = 2;

const ALG_ES256: i8 = -7;
const ALG_EDDSA: i8 = -8;
const ALG_ECDH_ES_HKDF_256: i8 = -25;

const CRV_P256: i8 = 1;
const CRV_ED25519: i8 = 6;

/// A public key as embedded in attested credential data.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PublicKey {
    P256Key(P256PublicKey),
    EcdhEsHkdf256Key(EcdhEsHkdf256PublicKey),
    Ed25519Key(Ed25519PublicKey),
}

impl From<P256PublicKey> for PublicKey {
    fn from(key: P256PublicKey) -> Self {
        PublicKey::P256Key(key)
    }
}

impl From<EcdhEsHkdf256PublicKey> for PublicKey {
    fn from(key: EcdhEsHkdf256PublicKey) -> Self {
        PublicKey::EcdhEsHkdf256Key(key)
    }
}

impl From<Ed25519PublicKey> for PublicKey {
    fn from(key: Ed25519PublicKey) -> Self {
        PublicKey::Ed25519Key(key)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct P256PublicKey {
    pub x: Bytes<32>,
    pub y: Bytes<32>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EcdhEsHkdf256PublicKey {
    pub x: Bytes<32>,
    pub y: Bytes<32>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ed25519PublicKey {
    pub x: Bytes<32>,
}

fn serialize_ec2_key<S>(
    serializer: S,
    alg: i8,
    x: &Bytes<32>,
    y: &Bytes<32>,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let mut map = serializer.serialize_map(Some(5))?;
    map.serialize_entry(&LABEL_KTY, &KTY_EC2)?;
    map.serialize_entry(&LABEL_ALG, &alg)?;
    map.serialize_entry(&LABEL_CRV, &CRV_P256)?;
    map.serialize_entry(&LABEL_X, x)?;
    map.serialize_entry(&LABEL_Y, y)?;
    map.end()
}

impl Serialize for P256PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_ec2_key(serializer, ALG_ES256, &self.x, &self.y)
    }
}

impl Serialize for EcdhEsHkdf256PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_ec2_key(serializer, ALG_ECDH_ES_HKDF_256, &self.x, &self.y)
    }
}

impl Serialize for Ed25519PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(&LABEL_KTY, &KTY_OKP)?;
        map.serialize_entry(&LABEL_ALG, &ALG_EDDSA)?;
        map.serialize_entry(&LABEL_CRV, &CRV_ED25519)?;
        map.serialize_entry(&LABEL_X, &self.x)?;
        map.end()
    }
}

/// Demands the next map entry to carry `label`; canonical order means a
/// different label is an error, not something to search past.
fn labeled_value<'de, V, T>(map: &mut V, label: i8, name: &'static str) -> Result<T, V::Error>
where
    V: MapAccess<'de>,
    T: Deserialize<'de>,
{
    match map.next_key::<i8>()? {
        Some(key) if key == label => map.next_value(),
        Some(key) => Err(V::Error::invalid_value(
            Unexpected::Signed(key.into()),
            &name,
        )),
        None => Err(V::Error::missing_field(name)),
    }
}

impl<'de> Deserialize<'de> for EcdhEsHkdf256PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct KeyAgreementVisitor;

        impl<'de> serde::de::Visitor<'de> for KeyAgreementVisitor {
            type Value = EcdhEsHkdf256PublicKey;

            fn expecting(&self, formatter: &mut core::fmt::Formatter) -> core::fmt::Result {
                formatter.write_str("a COSE_Key map for ECDH-ES+HKDF-256")
            }

            fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
            where
                V: MapAccess<'de>,
            {
                let kty: i8 = labeled_value(&mut map, LABEL_KTY, "kty")?;
                if kty != KTY_EC2 {
                    return Err(V::Error::invalid_value(
                        Unexpected::Signed(kty.into()),
                        &"the EC2 key type",
                    ));
                }
                let alg: i8 = labeled_value(&mut map, LABEL_ALG, "alg")?;
                if alg != ALG_ECDH_ES_HKDF_256 {
                    return Err(V::Error::invalid_value(
                        Unexpected::Signed(alg.into()),
                        &"the ECDH-ES+HKDF-256 algorithm",
                    ));
                }
                let crv: i8 = labeled_value(&mut map, LABEL_CRV, "crv")?;
                if crv != CRV_P256 {
                    return Err(V::Error::invalid_value(
                        Unexpected::Signed(crv.into()),
                        &"the P-256 curve",
                    ));
                }
                let x = labeled_value(&mut map, LABEL_X, "x")?;
                let y = labeled_value(&mut map, LABEL_Y, "y")?;
                // trailing unknown labels stay unread; cbor-smol cannot
                // skip over arbitrary values anyway
                Ok(EcdhEsHkdf256PublicKey { x, y })
            }
        }

        deserializer.deserialize_map(KeyAgreementVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinate(byte: u8) -> Bytes<32> {
        Bytes::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn es256_key_serializes_canonically() {
        let key = P256PublicKey {
            x: coordinate(0xAA),
            y: coordinate(0xBB),
        };
        let serialized: Bytes<128> = cbor_smol::cbor_serialize_bytes(&key).unwrap();
        // {1: 2, 3: -7, -1: 1, -2: x, -3: y}
        assert_eq!(
            &serialized[..10],
            &[0xa5, 0x01, 0x02, 0x03, 0x26, 0x20, 0x01, 0x21, 0x58, 0x20]
        );
        assert_eq!(&serialized[10..42], &[0xAA; 32]);
        assert_eq!(&serialized[42..45], &[0x22, 0x58, 0x20]);
        assert_eq!(&serialized[45..], &[0xBB; 32]);
    }

    #[test]
    fn ed25519_key_serializes_canonically() {
        let key = Ed25519PublicKey {
            x: coordinate(0xCC),
        };
        let serialized: Bytes<128> = cbor_smol::cbor_serialize_bytes(&key).unwrap();
        // {1: 1, 3: -8, -1: 6, -2: x}
        assert_eq!(
            &serialized[..10],
            &[0xa4, 0x01, 0x01, 0x03, 0x27, 0x20, 0x06, 0x21, 0x58, 0x20]
        );
        assert_eq!(&serialized[10..], &[0xCC; 32]);
    }

    #[test]
    fn key_agreement_key_round_trips() {
        let key = EcdhEsHkdf256PublicKey {
            x: coordinate(0x11),
            y: coordinate(0x22),
        };
        let serialized: Bytes<128> = cbor_smol::cbor_serialize_bytes(&key).unwrap();
        let deserialized: EcdhEsHkdf256PublicKey =
            cbor_smol::cbor_deserialize(&serialized).unwrap();
        assert_eq!(key, deserialized);
    }

    #[test]
    fn wrong_algorithm_is_rejected() {
        let key = P256PublicKey {
            x: coordinate(0x11),
            y: coordinate(0x22),
        };
        let serialized: Bytes<128> = cbor_smol::cbor_serialize_bytes(&key).unwrap();
        // an ES256 signing key is not a key-agreement key
        let result: Result<EcdhEsHkdf256PublicKey, _> = cbor_smol::cbor_deserialize(&serialized);
        assert!(result.is_err());
    }
}
