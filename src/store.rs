//! The credential store contract.
//!
//! Credentials are opaque records keyed by 32-byte ids minted uniformly at
//! random, each holding a set of named byte-string fields.  The handlers
//! depend only on the operations below; where the data lives and how it is
//! made durable is the store implementation's business.  The one contract
//! that matters for correctness: an [`add_entry`][CredentialStore::add_entry]
//! that returns success followed by a successful
//! [`persist`][CredentialStore::persist] makes the entry visible to every
//! subsequent [`get_entry`][CredentialStore::get_entry], and a failed
//! `persist` leaves the observable state consistent (all-or-nothing across
//! the batch produced by a single request).

use serde_repr::{Deserialize_repr, Serialize_repr};
use zeroize::Zeroize;

use crate::ctap2::Error;
use crate::sizes::{CREDENTIAL_ID_LENGTH, MAX_RP_ID_LENGTH};
use crate::{Bytes, Vec};

pub type CredentialId = [u8; CREDENTIAL_ID_LENGTH];

/// The RP id is the longest field a credential carries.
pub const MAX_FIELD_LENGTH: usize = MAX_RP_ID_LENGTH;

pub type FieldValue = Bytes<MAX_FIELD_LENGTH>;

/// The named fields of a credential entry.
///
/// `Algorithm` holds the COSE identifier as 4 bytes big-endian signed,
/// `UsageCount` a big-endian u32, `Policy` a single
/// [`CredentialProtectionPolicy`] byte; everything else is opaque bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CredentialField {
    RpId,
    UserId,
    PrivateKey,
    Algorithm,
    Policy,
    CredRandomWithUv,
    CredRandomWithoutUv,
    UsageCount,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CredentialProtectionPolicy {
    #[default]
    Optional = 1,
    OptionalWithCredentialIdList = 2,
    Required = 3,
}

pub trait CredentialStore {
    /// Handle to a credential record and its staged fields.
    type Entry;

    /// Returns a fresh, uncommitted entry bound to `id`.  Dropping the entry
    /// without a successful [`add_entry`][Self::add_entry] releases it.
    fn create_entry(&mut self, id: &CredentialId) -> Result<Self::Entry, Error>;

    /// Adds or overwrites a named field; `now` is recorded as update time.
    fn add_field(
        &mut self,
        entry: &mut Self::Entry,
        field: CredentialField,
        value: &[u8],
        now: u64,
    ) -> Result<(), Error>;

    /// The current field value.  `now` may be used by the store for expiry;
    /// the core never interprets it.
    fn get_field<'a>(
        &mut self,
        entry: &'a Self::Entry,
        field: CredentialField,
        now: u64,
    ) -> Option<&'a [u8]>;

    /// Looks up a committed entry by credential id.
    fn get_entry(&mut self, id: &[u8]) -> Option<Self::Entry>;

    /// Enumerates the committed entries bound to `rp_id`, newest first.
    fn nth_entry(&mut self, rp_id: &str, n: usize) -> Option<Self::Entry>;

    /// The credential id an entry is bound to.
    fn entry_id<'a>(&self, entry: &'a Self::Entry) -> &'a CredentialId;

    /// Commits the entry to the in-memory index.  Exhausted capacity, or a
    /// *fresh* entry whose id collides with a committed one, is rejected
    /// with [`Error::KeyStoreFull`]; re-committing an entry obtained from
    /// [`get_entry`][Self::get_entry] replaces the stored record.
    fn add_entry(&mut self, entry: Self::Entry) -> Result<(), Error>;

    /// Atomically flushes all in-memory mutations to durable storage.
    fn persist(&mut self) -> Result<(), Error>;

    /// Deletes every entry, zeroizing key material.
    fn wipe(&mut self) -> Result<(), Error>;
}

const MAX_FIELDS: usize = 8;

#[derive(Clone, Debug)]
pub struct MemoryEntry {
    id: CredentialId,
    fields: Vec<(CredentialField, FieldValue), MAX_FIELDS>,
    updated_at: u64,
    fresh: bool,
}

/// Reference store: a heapless in-memory index of up to `N` credentials.
///
/// `persist` snapshots the index; an injected persist failure rolls the
/// index back to the last snapshot, modeling the all-or-nothing durability
/// contract.
pub struct MemoryStore<const N: usize> {
    entries: Vec<MemoryEntry, N>,
    durable: Vec<MemoryEntry, N>,
    fail_next_persist: bool,
}

impl<const N: usize> Default for MemoryStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MemoryStore<N> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            durable: Vec::new(),
            fail_next_persist: false,
        }
    }

    /// Makes the next `persist` fail, for exercising rollback paths.
    pub fn inject_persist_error(&mut self) {
        self.fail_next_persist = true;
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl<const N: usize> CredentialStore for MemoryStore<N> {
    type Entry = MemoryEntry;

    fn create_entry(&mut self, id: &CredentialId) -> Result<Self::Entry, Error> {
        Ok(MemoryEntry {
            id: *id,
            fields: Vec::new(),
            updated_at: 0,
            fresh: true,
        })
    }

    fn add_field(
        &mut self,
        entry: &mut Self::Entry,
        field: CredentialField,
        value: &[u8],
        now: u64,
    ) -> Result<(), Error> {
        let value = FieldValue::from_slice(value).map_err(|_| Error::Other)?;
        entry.updated_at = now;
        if let Some(slot) = entry.fields.iter_mut().find(|(name, _)| *name == field) {
            slot.1 = value;
            return Ok(());
        }
        entry.fields.push((field, value)).map_err(|_| Error::Other)
    }

    fn get_field<'a>(
        &mut self,
        entry: &'a Self::Entry,
        field: CredentialField,
        _now: u64,
    ) -> Option<&'a [u8]> {
        entry
            .fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| &value[..])
    }

    fn get_entry(&mut self, id: &[u8]) -> Option<Self::Entry> {
        self.entries.iter().find(|entry| entry.id[..] == *id).map(|entry| {
            let mut entry = entry.clone();
            entry.fresh = false;
            entry
        })
    }

    fn nth_entry(&mut self, rp_id: &str, n: usize) -> Option<Self::Entry> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| {
                entry
                    .fields
                    .iter()
                    .any(|(name, value)| {
                        *name == CredentialField::RpId && value[..] == *rp_id.as_bytes()
                    })
            })
            .nth(n)
            .map(|entry| {
                let mut entry = entry.clone();
                entry.fresh = false;
                entry
            })
    }

    fn entry_id<'a>(&self, entry: &'a Self::Entry) -> &'a CredentialId {
        &entry.id
    }

    fn add_entry(&mut self, entry: Self::Entry) -> Result<(), Error> {
        if let Some(stored) = self.entries.iter_mut().find(|stored| stored.id == entry.id) {
            if entry.fresh {
                // a random id collided with a committed credential
                return Err(Error::KeyStoreFull);
            }
            *stored = entry;
            return Ok(());
        }
        self.entries.push(entry).map_err(|_| Error::KeyStoreFull)
    }

    fn persist(&mut self) -> Result<(), Error> {
        if self.fail_next_persist {
            self.fail_next_persist = false;
            self.entries = self.durable.clone();
            return Err(Error::Other);
        }
        self.durable = self.entries.clone();
        Ok(())
    }

    fn wipe(&mut self) -> Result<(), Error> {
        for entry in self
            .entries
            .iter_mut()
            .chain(self.durable.iter_mut())
        {
            for (_, value) in entry.fields.iter_mut() {
                let bytes: &mut [u8] = value;
                bytes.zeroize();
            }
        }
        self.entries.clear();
        self.durable.clear();
        Ok(())
    }
}
