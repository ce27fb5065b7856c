pub const AUTHENTICATOR_DATA_LENGTH: usize = 676;

pub const ASN1_SIGNATURE_LENGTH: usize = 77;

pub const COSE_KEY_LENGTH: usize = 256;

/// Length of the credential ids minted by this authenticator.
pub const CREDENTIAL_ID_LENGTH: usize = 32;

/// Maximum length of credential ids accepted in descriptors; other
/// authenticators wrap key material in theirs, so these run long.
pub const MAX_CREDENTIAL_ID_LENGTH: usize = 255;

pub const MAX_CREDENTIAL_COUNT_IN_LIST: usize = 10;

pub const MAX_RP_ID_LENGTH: usize = 256;

pub const PIN_HASH_LENGTH: usize = 16;
pub const PIN_TOKEN_LENGTH: usize = 32;

pub const PACKET_SIZE: usize = 64;

/// Practical maximal message size, compatible with the buffer sizes of
/// usbd-ctaphid.
pub const MAX_MESSAGE_SIZE: usize = 3072;
