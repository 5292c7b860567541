//! # redb-backed Registry Storage
//!
//! A disk-backed registry using the redb embedded database.
//!
//! redb provides what the registration flow needs from its store:
//! - ACID transactions (one write transaction per registry operation)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - A single file, created on first open
//!
//! ## Tables
//!
//! | Table | Key | Value |
//! |---|---|---|
//! | `users` | user id | postcard `UserRecord` |
//! | `phone_index` | phone number | user id |
//! | `stacks` | stack id | postcard `StackRecord` |
//! | `cems_instruments` | instrument id | postcard `InstrumentRecord` |
//! | `metadata` | counter name | last assigned id |

use crate::registry::RegistryStore;
use crate::{
    CemsError, IndustryDetails, InstrumentDetails, InstrumentId, InstrumentRecord,
    RegistryCounts, StackDetails, StackId, StackRecord, UserId, UserRecord,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Table for users: user id -> serialized UserRecord
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: phone number -> user id
const PHONE_INDEX: TableDefinition<&str, &str> = TableDefinition::new("phone_index");

/// Table for stacks: stack id -> serialized StackRecord
const STACKS: TableDefinition<u64, &[u8]> = TableDefinition::new("stacks");

/// Table for instruments: cems id -> serialized InstrumentRecord
const INSTRUMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("cems_instruments");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const LAST_STACK_ID: &str = "last_stack_id";
const LAST_INSTRUMENT_ID: &str = "last_instrument_id";

fn io_err(e: impl std::fmt::Display) -> CemsError {
    CemsError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CemsError> {
    postcard::to_allocvec(value).map_err(|e| CemsError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CemsError> {
    postcard::from_bytes(bytes).map_err(|e| CemsError::SerializationError(e.to_string()))
}

/// A disk-backed registry store using redb.
pub struct RedbRegistry {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRegistry").finish_non_exhaustive()
    }
}

impl RedbRegistry {
    /// Open or create a registry database at the given path.
    ///
    /// Every table is created if missing, so opening is idempotent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CemsError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let write_txn = db.begin_write().map_err(io_err)?;
        {
            let _ = write_txn.open_table(USERS).map_err(io_err)?;
            let _ = write_txn.open_table(PHONE_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(STACKS).map_err(io_err)?;
            let _ = write_txn.open_table(INSTRUMENTS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), CemsError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    /// Scan a table of serialized records, decoding every value.
    fn scan<T: DeserializeOwned>(
        &self,
        table: TableDefinition<u64, &[u8]>,
        mut keep: impl FnMut(&T) -> bool,
    ) -> Result<Vec<T>, CemsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(table).map_err(io_err)?;

        let mut rows = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let row: T = decode(value.value())?;
            if keep(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

// =============================================================================
// REGISTRYSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl RegistryStore for RedbRegistry {
    fn create_user(&mut self, phone_number: &str) -> Result<UserId, CemsError> {
        let user_id = UserId::generate();
        let record = UserRecord {
            user_id: user_id.clone(),
            phone_number: phone_number.to_string(),
            details: None,
        };
        let bytes = encode(&record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut phones = write_txn.open_table(PHONE_INDEX).map_err(io_err)?;
            if phones.get(phone_number).map_err(io_err)?.is_some() {
                // Dropping the transaction without commit aborts it.
                return Err(CemsError::DuplicatePhone(phone_number.to_string()));
            }
            phones
                .insert(phone_number, user_id.as_str())
                .map_err(io_err)?;

            let mut users = write_txn.open_table(USERS).map_err(io_err)?;
            users
                .insert(user_id.as_str(), bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        Ok(user_id)
    }

    fn update_user_details(
        &mut self,
        user_id: &UserId,
        details: &IndustryDetails,
    ) -> Result<bool, CemsError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let updated = {
            let mut users = write_txn.open_table(USERS).map_err(io_err)?;
            let existing: Option<UserRecord> = match users.get(user_id.as_str()).map_err(io_err)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };

            match existing {
                Some(mut record) => {
                    record.details = Some(details.clone());
                    let bytes = encode(&record)?;
                    users
                        .insert(user_id.as_str(), bytes.as_slice())
                        .map_err(io_err)?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit().map_err(io_err)?;

        Ok(updated)
    }

    fn insert_stack(
        &mut self,
        user_id: &UserId,
        details: &StackDetails,
    ) -> Result<StackId, CemsError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let stack_id = {
            let users = write_txn.open_table(USERS).map_err(io_err)?;
            if users.get(user_id.as_str()).map_err(io_err)?.is_none() {
                return Err(CemsError::UserNotFound(user_id.clone()));
            }

            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            let last = meta
                .get(LAST_STACK_ID)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let stack_id = StackId(last.saturating_add(1));
            meta.insert(LAST_STACK_ID, stack_id.0).map_err(io_err)?;

            let record = StackRecord {
                stack_id,
                user_id: user_id.clone(),
                details: details.clone(),
            };
            let bytes = encode(&record)?;
            let mut stacks = write_txn.open_table(STACKS).map_err(io_err)?;
            stacks
                .insert(stack_id.0, bytes.as_slice())
                .map_err(io_err)?;
            stack_id
        };
        write_txn.commit().map_err(io_err)?;

        Ok(stack_id)
    }

    fn insert_instrument(
        &mut self,
        stack_id: StackId,
        details: &InstrumentDetails,
    ) -> Result<InstrumentId, CemsError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let cems_id = {
            let stacks = write_txn.open_table(STACKS).map_err(io_err)?;
            if stacks.get(stack_id.0).map_err(io_err)?.is_none() {
                return Err(CemsError::StackNotFound(stack_id));
            }

            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            let last = meta
                .get(LAST_INSTRUMENT_ID)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let cems_id = InstrumentId(last.saturating_add(1));
            meta.insert(LAST_INSTRUMENT_ID, cems_id.0).map_err(io_err)?;

            let record = InstrumentRecord {
                cems_id,
                stack_id,
                details: details.clone(),
            };
            let bytes = encode(&record)?;
            let mut instruments = write_txn.open_table(INSTRUMENTS).map_err(io_err)?;
            instruments
                .insert(cems_id.0, bytes.as_slice())
                .map_err(io_err)?;
            cems_id
        };
        write_txn.commit().map_err(io_err)?;

        Ok(cems_id)
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<UserRecord>, CemsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let users = read_txn.open_table(USERS).map_err(io_err)?;

        match users.get(user_id.as_str()).map_err(io_err)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<UserRecord>, CemsError> {
        let user_id = {
            let read_txn = self.db.begin_read().map_err(io_err)?;
            let phones = read_txn.open_table(PHONE_INDEX).map_err(io_err)?;
            phones
                .get(phone_number)
                .map_err(io_err)?
                .map(|v| UserId(v.value().to_string()))
        };

        match user_id {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    fn users(&self) -> Result<Vec<UserRecord>, CemsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let users = read_txn.open_table(USERS).map_err(io_err)?;

        let mut rows = Vec::new();
        for entry in users.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }

    fn stacks_for_user(&self, user_id: &UserId) -> Result<Vec<StackRecord>, CemsError> {
        self.scan(STACKS, |s: &StackRecord| &s.user_id == user_id)
    }

    fn instruments_for_stack(
        &self,
        stack_id: StackId,
    ) -> Result<Vec<InstrumentRecord>, CemsError> {
        self.scan(INSTRUMENTS, |i: &InstrumentRecord| i.stack_id == stack_id)
    }

    fn counts(&self) -> Result<RegistryCounts, CemsError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let users = read_txn.open_table(USERS).map_err(io_err)?;
        let stacks = read_txn.open_table(STACKS).map_err(io_err)?;
        let instruments = read_txn.open_table(INSTRUMENTS).map_err(io_err)?;

        Ok(RegistryCounts {
            users: users.len().map_err(io_err)? as usize,
            stacks: stacks.len().map_err(io_err)? as usize,
            instruments: instruments.len().map_err(io_err)? as usize,
        })
    }
}
