//! Shared scaffolding: a scripted platform, request builders, and the
//! platform side of the PIN/UV auth protocols.

#![allow(dead_code)]

use ctap_authenticator::cose::EcdhEsHkdf256PublicKey;
use ctap_authenticator::ctap2::{client_pin, get_assertion, make_credential, AuthenticatorOptions};
use ctap_authenticator::pin::{PinProtocolVersion, SharedSecret};
use ctap_authenticator::platform::{
    Platform, PresenceIntent, PresenceResult, VerificationResult,
};
use ctap_authenticator::store::MemoryStore;
use ctap_authenticator::webauthn::{
    PublicKeyCredentialParameters, PublicKeyCredentialRpEntity, PublicKeyCredentialUserEntity,
};
use ctap_authenticator::{Authenticator, Bytes, Config, Error, String, Vec};

pub const CLIENT_DATA_HASH: [u8; 32] = [0xAA; 32];
pub const RP_ID: &str = "example.com";

pub struct TestRng(pub u64);

impl rand_core::RngCore for TestRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift*, deterministic per seed
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl rand_core::CryptoRng for TestRng {}

pub struct TestPlatform {
    pub rng: TestRng,
    pub store: MemoryStore<8>,
    pub now: u64,
    pub presence: PresenceResult,
    pub verification: VerificationResult,
    pub presence_checks: usize,
    pub pin_hash: Option<[u8; 16]>,
}

impl Default for TestPlatform {
    fn default() -> Self {
        Self {
            rng: TestRng(0x8765_4321_0fed_cba9),
            store: MemoryStore::new(),
            now: 1_690_000_000_000,
            presence: PresenceResult::Accepted,
            verification: VerificationResult::Accepted,
            presence_checks: 0,
            pin_hash: None,
        }
    }
}

impl Platform for TestPlatform {
    type Rng = TestRng;
    type Store = MemoryStore<8>;

    fn rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }

    fn store(&mut self) -> &mut Self::Store {
        &mut self.store
    }

    fn millis(&mut self) -> u64 {
        self.now += 1;
        self.now
    }

    fn user_presence(
        &mut self,
        _intent: PresenceIntent,
        _rp_id: Option<&str>,
        _user: Option<&PublicKeyCredentialUserEntity>,
    ) -> PresenceResult {
        self.presence_checks += 1;
        self.presence
    }

    fn user_verification(&mut self) -> VerificationResult {
        self.verification
    }

    fn load_pin_hash(&mut self) -> Option<[u8; 16]> {
        self.pin_hash
    }

    fn store_pin_hash(&mut self, hash: Option<[u8; 16]>) -> Result<(), Error> {
        self.pin_hash = hash;
        Ok(())
    }
}

pub fn authenticator(config: Config) -> Authenticator<TestPlatform> {
    Authenticator::new(TestPlatform::default(), config)
}

/// No PIN, no built-in UV: nothing guards the authenticator.
pub fn unprotected_config() -> Config {
    Config {
        supports_client_pin: false,
        ..Config::default()
    }
}

/// Built-in UV wired up, no client PIN.
pub fn uv_config() -> Config {
    Config {
        supports_uv: true,
        supports_client_pin: false,
        ..Config::default()
    }
}

/// Built-in UV plus client PIN (and thereby a key-agreement key).
pub fn uv_and_pin_config() -> Config {
    Config {
        supports_uv: true,
        ..Config::default()
    }
}

pub fn rp() -> PublicKeyCredentialRpEntity {
    PublicKeyCredentialRpEntity {
        id: String::from(RP_ID),
        name: None,
        icon: None,
    }
}

pub fn user() -> PublicKeyCredentialUserEntity {
    PublicKeyCredentialUserEntity::from_id(Bytes::from_slice(&[0x01]).unwrap())
}

pub fn params(algorithms: &[i32]) -> Vec<PublicKeyCredentialParameters, 12> {
    let mut params = Vec::new();
    for &algorithm in algorithms {
        params
            .push(PublicKeyCredentialParameters::public_key_with_alg(algorithm))
            .unwrap();
    }
    params
}

pub fn make_credential_request<'a>(
    client_data_hash: &'a serde_bytes::Bytes,
    algorithms: &[i32],
) -> make_credential::Request<'a> {
    make_credential::Request {
        client_data_hash,
        rp: rp(),
        user: user(),
        pub_key_cred_params: params(algorithms),
        exclude_list: None,
        extensions: None,
        options: None,
        pin_uv_auth_param: None,
        pin_uv_auth_protocol: None,
        enterprise_attestation: None,
    }
}

pub fn options(rk: bool, up: bool, uv: bool) -> AuthenticatorOptions {
    AuthenticatorOptions {
        rk: Some(rk),
        up: Some(up),
        uv: Some(uv),
    }
}

pub fn get_assertion_request(client_data_hash: &[u8; 32]) -> get_assertion::Request<'static> {
    get_assertion::Request {
        rp_id: String::from(RP_ID),
        client_data_hash: Bytes::from_slice(client_data_hash).unwrap(),
        allow_list: None,
        extensions: None,
        options: None,
        pin_uv_auth_param: None,
        pin_uv_auth_protocol: None,
    }
}

/// The fixed offsets of §sec-authenticator-data.
pub mod auth_data {
    pub const FLAGS: usize = 32;
    pub const SIGN_COUNT: usize = 33;
    pub const AAGUID: usize = 37;
    pub const CREDENTIAL_ID_LENGTH: usize = 53;
    pub const CREDENTIAL_ID: usize = 55;

    pub const UP: u8 = 1 << 0;
    pub const UV: u8 = 1 << 2;
    pub const AT: u8 = 1 << 6;
    pub const ED: u8 = 1 << 7;

    pub fn credential_id(auth_data: &[u8]) -> &[u8] {
        let length =
            u16::from_be_bytes([auth_data[CREDENTIAL_ID_LENGTH], auth_data[CREDENTIAL_ID_LENGTH + 1]])
                as usize;
        &auth_data[CREDENTIAL_ID..CREDENTIAL_ID + length]
    }

    pub fn credential_public_key(auth_data: &[u8]) -> &[u8] {
        let length =
            u16::from_be_bytes([auth_data[CREDENTIAL_ID_LENGTH], auth_data[CREDENTIAL_ID_LENGTH + 1]])
                as usize;
        &auth_data[CREDENTIAL_ID + length..]
    }
}

/// The platform half of the PIN/UV auth protocol key agreement.
pub struct PlatformKeyAgreement {
    secret: p256::ecdh::EphemeralSecret,
}

impl PlatformKeyAgreement {
    pub fn generate(rng: &mut TestRng) -> Self {
        Self {
            secret: p256::ecdh::EphemeralSecret::random(rng),
        }
    }

    pub fn public_key(&self) -> EcdhEsHkdf256PublicKey {
        use p256::elliptic_curve::sec1::ToEncodedPoint as _;
        let point = self.secret.public_key().to_encoded_point(false);
        EcdhEsHkdf256PublicKey {
            x: Bytes::from_slice(point.x().unwrap()).unwrap(),
            y: Bytes::from_slice(point.y().unwrap()).unwrap(),
        }
    }

    pub fn agree(
        &self,
        authenticator_key: &EcdhEsHkdf256PublicKey,
        version: PinProtocolVersion,
    ) -> SharedSecret {
        use p256::elliptic_curve::sec1::FromEncodedPoint as _;
        let point = p256::EncodedPoint::from_affine_coordinates(
            p256::FieldBytes::from_slice(&authenticator_key.x),
            p256::FieldBytes::from_slice(&authenticator_key.y),
            false,
        );
        let peer = Option::<p256::PublicKey>::from(p256::PublicKey::from_encoded_point(&point))
            .expect("authenticator key agreement key is a valid point");
        let shared = self.secret.diffie_hellman(&peer);
        let mut z = [0u8; 32];
        z.copy_from_slice(shared.raw_secret_bytes());
        SharedSecret::derive(version, &z)
    }
}

pub fn client_pin_request(sub_command: client_pin::Subcommand) -> client_pin::Request<'static> {
    client_pin::Request::new(sub_command)
}

pub fn pin_hash(pin: &[u8]) -> [u8; 16] {
    use sha2::Digest as _;
    let digest = sha2::Sha256::digest(pin);
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&digest[..16]);
    hash
}

pub fn padded_pin(pin: &[u8]) -> [u8; 64] {
    let mut padded = [0u8; 64];
    padded[..pin.len()].copy_from_slice(pin);
    padded
}
