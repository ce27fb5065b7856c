#![cfg_attr(not(test), no_std)]

//! A CTAP2 authenticator core built on `heapless` data types.
//!
//! The crate implements the request-processing half of a FIDO2 authenticator:
//! the `authenticatorMakeCredential` and `authenticatorGetAssertion` policy
//! pipelines, PIN/UV auth tokens for PIN protocols 1 and 2, and attestation
//! object assembly, all in terms of a [`platform::Platform`] capability trait
//! supplying randomness, a millisecond clock, user interaction and credential
//! storage.
//!
//! The various transport protocols (USB, NFC, BLE) are expected to handle
//! low-level protocol details; they deliver a command byte plus CBOR payload
//! to [`ctap2::Request::deserialize`] and ship the serialized response back,
//! so the authenticator logic is decoupled from these details.

#[macro_use]
extern crate delog;
generate_macros!();

pub use heapless;
pub use heapless::{String, Vec};
pub use heapless_bytes;
pub use heapless_bytes::Bytes;

pub mod authenticator;
pub mod cose;
pub mod crypto;
pub mod ctap2;
pub(crate) mod operation;
pub mod pin;
pub mod platform;
pub use cbor_smol as serde;
pub mod sizes;
pub mod store;
pub mod webauthn;

pub use authenticator::{Authenticator, Config};
pub use ctap2::{Error, Result};

/// Call a remote procedure with a request, receive a response, maybe.
pub trait Rpc<Error, Request, Response> {
    fn call(&mut self, request: &Request) -> core::result::Result<Response, Error>;
}
