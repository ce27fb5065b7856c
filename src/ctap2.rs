//! The CTAP2 wire surface: requests, responses, statuses, dispatch.
//!
//! Implementing [`Authenticator`] is all it takes; the blanket impls turn
//! any implementor into an [`crate::Rpc`] endpoint over [`Request`] and
//! [`Response`].
use bitflags::bitflags;
use cbor_smol::cbor_deserialize;
use serde::{Deserialize, Serialize};

use crate::{sizes::*, Bytes, Vec};

pub use crate::operation::{Operation, VendorOperation};

pub mod client_pin;
pub mod get_assertion;
pub mod get_info;
pub mod make_credential;

pub type Result<T> = core::result::Result<T, Error>;

/// Every request this authenticator answers, in command-code order.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
// the MakeCredential and GetAssertion payloads dwarf the parameterless
// variants
#[allow(clippy::large_enum_variant)]
pub enum Request<'a> {
    // 0x1
    MakeCredential(make_credential::Request<'a>),
    // 0x2
    GetAssertion(get_assertion::Request<'a>),
    // 0x4
    GetInfo,
    // 0x6
    ClientPin(client_pin::Request<'a>),
    // 0x7
    Reset,
    // 0x8
    GetNextAssertion,
}

fn parse<'de, T: serde::Deserialize<'de>>(data: &'de [u8]) -> Result<T> {
    cbor_deserialize(data).map_err(|error| match error {
        cbor_smol::Error::SerdeMissingField => Error::MissingParameter,
        _ => Error::InvalidCbor,
    })
}

impl<'a> Request<'a> {
    /// Deserialize from CBOR where the first byte denotes the operation.
    #[inline(never)]
    pub fn deserialize(data: &'a [u8]) -> Result<Self> {
        let (&op, data) = data.split_first().ok_or(Error::InvalidCbor)?;

        let operation = Operation::try_from(op).map_err(|_| {
            debug_now!("invalid operation {}", op);
            Error::InvalidCommand
        })?;

        info!("deser {:?}", operation);
        Ok(match operation {
            Operation::MakeCredential => Request::MakeCredential(parse(data)?),
            Operation::GetAssertion => Request::GetAssertion(parse(data)?),
            Operation::GetInfo => Request::GetInfo,
            Operation::ClientPin => Request::ClientPin(parse(data)?),
            Operation::Reset => Request::Reset,
            Operation::GetNextAssertion => Request::GetNextAssertion,

            // vendor codes are recognized on the wire but not implemented
            Operation::Vendor(_vendor_operation) => {
                debug_now!("unhandled vendor operation {:?}", _vendor_operation);
                return Err(Error::InvalidCommand);
            }
        })
    }
}

/// The successful responses, one per request kind.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
#[allow(clippy::large_enum_variant)]
pub enum Response {
    MakeCredential(make_credential::Response),
    GetAssertion(get_assertion::Response),
    GetInfo(get_info::Response),
    ClientPin(client_pin::Response),
    Reset,
    GetNextAssertion(get_assertion::Response),
}

impl Response {
    /// Serialize, prepending the status byte.  On any non-success status the
    /// payload is exactly one byte.
    #[inline(never)]
    pub fn serialize<const N: usize>(&self, buffer: &mut Vec<u8, N>) {
        use cbor_smol::cbor_serialize;
        use Response::*;

        buffer.resize_default(buffer.capacity()).ok();
        let (status, payload) = buffer.split_first_mut().unwrap();
        let written = match self {
            MakeCredential(response) => cbor_serialize(response, payload).map(<[u8]>::len),
            GetAssertion(response) | GetNextAssertion(response) => {
                cbor_serialize(response, payload).map(<[u8]>::len)
            }
            GetInfo(response) => cbor_serialize(response, payload).map(<[u8]>::len),
            ClientPin(response) => cbor_serialize(response, payload).map(<[u8]>::len),
            Reset => Ok(0),
        };
        let length = match written {
            Err(_) => {
                *status = Error::Other as u8;
                0
            }
            // a bare empty map carries no information; drop it
            Ok(1) if payload[0] == 0xA0 => {
                *status = Error::Success as u8;
                0
            }
            Ok(length) => {
                *status = Error::Success as u8;
                length
            }
        };
        buffer.resize_default(length + 1).ok();
    }
}

/// The `options` map of MakeCredential and GetAssertion requests; absent
/// keys fall back to per-command defaults.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatorOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rk: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up: Option<bool>,
    /// Requests *built-in* user verification (biometrics, on-device PIN
    /// entry); token-based authorization travels in pinUvAuthParam instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv: Option<bool>,
}

bitflags! {
    pub struct AuthenticatorDataFlags: u8 {
        const USER_PRESENCE = 1 << 0;
        const USER_VERIFIED = 1 << 2;
        const ATTESTED_CREDENTIAL_DATA = 1 << 6;
        const EXTENSION_DATA = 1 << 7;
    }
}

pub trait SerializeAttestedCredentialData {
    fn serialize(&self, buffer: &mut SerializedAuthenticatorData) -> Result<()>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthenticatorData<'a, A, E> {
    pub rp_id_hash: &'a [u8; 32],
    pub flags: AuthenticatorDataFlags,
    pub sign_count: u32,
    pub attested_credential_data: Option<A>,
    pub extensions: Option<E>,
}

pub type SerializedAuthenticatorData = Bytes<AUTHENTICATOR_DATA_LENGTH>;

/// Appends raw bytes to serialized authenticator data, collapsing overflow
/// to the catch-all status.
pub(crate) fn extend(buffer: &mut SerializedAuthenticatorData, bytes: &[u8]) -> Result<()> {
    buffer.extend_from_slice(bytes).map_err(|_| Error::Other)
}

// The reason for this non-use of CBOR is for compatibility with
// FIDO U2F authentication signatures.
impl<'a, A: SerializeAttestedCredentialData, E: serde::Serialize> AuthenticatorData<'a, A, E> {
    #[inline(never)]
    pub fn serialize(&self) -> Result<SerializedAuthenticatorData> {
        let mut data = SerializedAuthenticatorData::new();

        // the 37 fixed bytes: rpIdHash, flags, signCount big-endian
        extend(&mut data, self.rp_id_hash)?;
        extend(&mut data, &[self.flags.bits()])?;
        extend(&mut data, &self.sign_count.to_be_bytes())?;

        if let Some(attested_credential_data) = &self.attested_credential_data {
            attested_credential_data.serialize(&mut data)?;
        }

        if let Some(extensions) = &self.extensions {
            cbor_smol::cbor_serialize_extending_bytes(extensions, &mut data)
                .map_err(|_| Error::Other)?;
        }

        Ok(data)
    }
}

/// `attStmt` in the attestation object; untagged, the format is named by
/// the sibling `fmt` field.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[non_exhaustive]
#[serde(untagged)]
#[allow(clippy::large_enum_variant)]
pub enum AttestationStatement {
    None(NoneAttestationStatement),
    Packed(PackedAttestationStatement),
}

/// Serializes as the empty map.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NoneAttestationStatement {}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PackedAttestationStatement {
    pub alg: i32,
    pub sig: Bytes<ASN1_SIGNATURE_LENGTH>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<Bytes<1024>, 1>>,
}

/// The subset of the CTAP status-code registry this authenticator emits;
/// discriminants are the official wire values.  As the core never decodes
/// a status byte, codes for surfaces it does not implement (U2F channels,
/// bio enrollment, credential management, large blobs) are not modeled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    Success = 0x00,
    InvalidCommand = 0x01,
    InvalidParameter = 0x02,
    InvalidCbor = 0x12,
    MissingParameter = 0x14,
    CredentialExcluded = 0x19,
    UnsupportedAlgorithm = 0x26,
    OperationDenied = 0x27,
    KeyStoreFull = 0x28,
    UnsupportedOption = 0x2B,
    InvalidOption = 0x2C,
    NoCredentials = 0x2E,
    NotAllowed = 0x30,
    PinInvalid = 0x31,
    PinBlocked = 0x32,
    PinAuthInvalid = 0x33,
    PinNotSet = 0x35,
    PinRequired = 0x36,
    PinPolicyViolation = 0x37,
    UvBlocked = 0x3C,
    InvalidSubcommand = 0x3E,
    UvInvalid = 0x3F,
    UnauthorizedPermission = 0x40,
    Other = 0x7F,
}

/// The CTAP2 authenticator API, one method per implemented command.
///
/// [`call_ctap2`][Self::call_ctap2] routes decoded requests; implementors
/// also get [`crate::Rpc`] over [`Request`]/[`Response`] for free.
pub trait Authenticator {
    fn make_credential(
        &mut self,
        request: &make_credential::Request,
    ) -> Result<make_credential::Response>;
    fn get_assertion(
        &mut self,
        request: &get_assertion::Request,
    ) -> Result<get_assertion::Response>;
    fn get_info(&mut self) -> get_info::Response;
    fn client_pin(&mut self, request: &client_pin::Request) -> Result<client_pin::Response>;
    fn reset(&mut self) -> Result<()>;
    fn get_next_assertion(&mut self) -> Result<get_assertion::Response>;

    /// Routes a decoded request to its handler and logs any failure status.
    #[inline(never)]
    fn call_ctap2(&mut self, request: &Request) -> Result<Response> {
        let response = match request {
            Request::MakeCredential(request) => {
                debug_now!("CTAP2.MC");
                self.make_credential(request).map(Response::MakeCredential)
            }
            Request::GetAssertion(request) => {
                debug_now!("CTAP2.GA");
                self.get_assertion(request).map(Response::GetAssertion)
            }
            Request::GetInfo => {
                debug_now!("CTAP2.GI");
                Ok(Response::GetInfo(self.get_info()))
            }
            Request::ClientPin(request) => {
                debug_now!("CTAP2.PIN");
                self.client_pin(request).map(Response::ClientPin)
            }
            Request::Reset => {
                debug_now!("CTAP2.RST");
                self.reset().map(|_| Response::Reset)
            }
            Request::GetNextAssertion => {
                debug_now!("CTAP2.GNA");
                self.get_next_assertion().map(Response::GetNextAssertion)
            }
        };
        response.inspect_err(|_error| {
            debug!("error: {:?}", _error);
        })
    }
}

impl<'a, A: Authenticator> crate::Rpc<Error, Request<'a>, Response> for A {
    #[inline(never)]
    fn call(&mut self, request: &Request) -> Result<Response> {
        self.call_ctap2(request)
    }
}
