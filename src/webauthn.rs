//! Subset of WebAuthn types that crept into CTAP.

use crate::sizes::*;
use crate::{Bytes, String, Vec};
use serde::{de::Deserializer, Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublicKeyCredentialRpEntity {
    pub id: String<MAX_RP_ID_LENGTH>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_truncated"
    )]
    pub name: Option<String<64>>,
    /// Removed in WebAuthn 2, but CTAP 2.2 still requires implementors to
    /// accept it.  The content must not be stored, hence [`Icon`][].
    #[serde(skip_serializing, alias = "url")]
    pub icon: Option<Icon>,
}

/// Parses the `icon` field of an entity and forgets it on the spot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Icon;

impl<'de> Deserialize<'de> for Icon {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let _url: &'de str = Deserialize::deserialize(deserializer)?;
        Ok(Self)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialUserEntity {
    pub id: Bytes<64>,
    #[serde(default, deserialize_with = "deserialize_or_drop")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String<128>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_truncated"
    )]
    pub name: Option<String<64>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_truncated"
    )]
    pub display_name: Option<String<64>>,
}

impl PublicKeyCredentialUserEntity {
    pub fn from_id(id: Bytes<64>) -> Self {
        Self {
            id,
            icon: None,
            name: None,
            display_name: None,
        }
    }
}

/// Names may exceed our buffers; WebAuthn §6.4.1 wants them truncated at a
/// character boundary rather than refused.
fn deserialize_truncated<'de, D, const L: usize>(
    deserializer: D,
) -> Result<Option<String<L>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<&str> = serde::Deserialize::deserialize(deserializer)?;
    Ok(value.map(truncated))
}

/// `icon` values are unbounded URLs; one too large for its buffer is
/// dropped instead of failing the request.
fn deserialize_or_drop<'de, D, const L: usize>(
    deserializer: D,
) -> Result<Option<String<L>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde::Deserialize::deserialize(deserializer) {
        Ok(string) => Some(string),
        Err(_error) => {
            info_now!("dropping oversized field: {:?}", _error);
            None
        }
    })
}

fn truncated<const L: usize>(s: &str) -> String<L> {
    let mut end = 0;
    for (index, character) in s.char_indices() {
        let next = index + character.len_utf8();
        if next > L {
            break;
        }
        end = next;
    }
    let mut string = String::new();
    // end is a character boundary at most L bytes in
    string.push_str(&s[..end]).unwrap();
    string
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublicKeyCredentialParameters {
    pub alg: i32,
    #[serde(rename = "type")]
    pub key_type: String<32>,
}

impl PublicKeyCredentialParameters {
    pub fn public_key_with_alg(alg: i32) -> Self {
        Self {
            alg,
            key_type: String::from("public-key"),
        }
    }

    pub fn is_public_key(&self) -> bool {
        self.key_type == "public-key"
    }
}

/// The `pubKeyCredParams` list, in platform preference order.
pub type PublicKeyCredentialParametersList = Vec<PublicKeyCredentialParameters, 12>;

/// A credential reference as returned to the platform.  Foreign
/// authenticators wrap key material in their ids, so descriptors accept far
/// longer ids than the 32 bytes minted here.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialDescriptor {
    pub id: Bytes<MAX_CREDENTIAL_ID_LENGTH>,
    #[serde(rename = "type")]
    pub key_type: String<32>,
}

impl PublicKeyCredentialDescriptor {
    pub fn public_key(id: &[u8]) -> Option<Self> {
        Some(Self {
            id: Bytes::from_slice(id).ok()?,
            key_type: String::from("public-key"),
        })
    }
}

/// Borrowing flavor of [`PublicKeyCredentialDescriptor`][], for the
/// allowList and excludeList entries of incoming requests.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialDescriptorRef<'a> {
    pub id: &'a serde_bytes::Bytes,
    #[serde(rename = "type")]
    pub key_type: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_character_boundaries() {
        // example from § 6.4.1 String Truncation in the WebAuthn spec:
        // "ag" followed by U+0308 (combining diaeresis, two bytes)
        let v = vec![0x61, 0x67, 0xcc, 0x88];
        let s = std::str::from_utf8(&v).unwrap();

        assert_eq!(truncated::<1>(s), "a");
        assert_eq!(truncated::<2>(s), "ag");
        assert_eq!(truncated::<3>(s), "ag");
        assert_eq!(truncated::<4>(s), s);
        assert_eq!(truncated::<5>(s), s);
        assert_eq!(truncated::<64>(s), s);
    }
}
