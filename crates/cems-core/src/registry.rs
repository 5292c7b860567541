//! # Registry Store
//!
//! The relational core of the portal: three tables (`users`, `stacks`,
//! `cems_instruments`) behind the `RegistryStore` trait.
//!
//! This module implements the trait for the in-memory `MemoryRegistry`.
//! The disk-backed implementation lives in `storage::RedbRegistry`.
//! Both backends enforce the same constraints:
//! - `phone_number` is unique across users
//! - a stack must reference an existing user
//! - an instrument must reference an existing stack
//! - identifiers are assigned in increasing order and never reused

use crate::{
    CemsError, IndustryDetails, InstrumentDetails, InstrumentId, InstrumentRecord,
    RegistryCounts, StackDetails, StackId, StackRecord, UserId, UserRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// REGISTRYSTORE TRAIT
// =============================================================================

/// Persistence operations of the registration wizard.
///
/// Every write is a single atomic operation; no write spans two calls.
pub trait RegistryStore {
    /// Insert a sparse user row (id + phone only). Returns the new id.
    fn create_user(&mut self, phone_number: &str) -> Result<UserId, CemsError>;

    /// Replace every non-key attribute of a user.
    ///
    /// Returns `false` when no row matched; a missing user is not an error.
    fn update_user_details(
        &mut self,
        user_id: &UserId,
        details: &IndustryDetails,
    ) -> Result<bool, CemsError>;

    /// Insert one stack row for the user. Returns the store-assigned id.
    fn insert_stack(
        &mut self,
        user_id: &UserId,
        details: &StackDetails,
    ) -> Result<StackId, CemsError>;

    /// Insert one instrument row for the stack.
    ///
    /// Duplicate parameters for the same stack are accepted.
    fn insert_instrument(
        &mut self,
        stack_id: StackId,
        details: &InstrumentDetails,
    ) -> Result<InstrumentId, CemsError>;

    /// Fetch a user row by id.
    fn get_user(&self, user_id: &UserId) -> Result<Option<UserRecord>, CemsError>;

    /// Fetch a user row by phone number.
    fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<UserRecord>, CemsError>;

    /// All user rows, ordered by user id.
    fn users(&self) -> Result<Vec<UserRecord>, CemsError>;

    /// Stack rows of one user, in insertion order.
    fn stacks_for_user(&self, user_id: &UserId) -> Result<Vec<StackRecord>, CemsError>;

    /// Instrument rows of one stack, in insertion order.
    fn instruments_for_stack(&self, stack_id: StackId)
    -> Result<Vec<InstrumentRecord>, CemsError>;

    /// Row counts of the three tables.
    fn counts(&self) -> Result<RegistryCounts, CemsError>;
}

// =============================================================================
// REGISTRATION TREE (read model)
// =============================================================================

/// One stack with its instruments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRegistration {
    pub stack: StackRecord,
    pub instruments: Vec<InstrumentRecord>,
}

/// A user with every stack and instrument hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub user: UserRecord,
    pub stacks: Vec<StackRegistration>,
}

/// Assemble the full registration tree of one user.
pub fn load_registration<S: RegistryStore + ?Sized>(
    store: &S,
    user: UserRecord,
) -> Result<Registration, CemsError> {
    let mut stacks = Vec::new();
    for stack in store.stacks_for_user(&user.user_id)? {
        let instruments = store.instruments_for_stack(stack.stack_id)?;
        stacks.push(StackRegistration { stack, instruments });
    }
    Ok(Registration { user, stacks })
}

/// Assemble the registration trees of every user.
pub fn load_all_registrations<S: RegistryStore + ?Sized>(
    store: &S,
) -> Result<Vec<Registration>, CemsError> {
    store
        .users()?
        .into_iter()
        .map(|user| load_registration(store, user))
        .collect()
}

// =============================================================================
// MEMORY REGISTRY
// =============================================================================

/// In-memory registry.
///
/// Uses `BTreeMap` so listing order is stable between runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    users: BTreeMap<UserId, UserRecord>,
    phone_index: BTreeMap<String, UserId>,
    stacks: BTreeMap<StackId, StackRecord>,
    instruments: BTreeMap<InstrumentId, InstrumentRecord>,
    /// Last assigned stack id (0 = none yet).
    last_stack_id: u64,
    /// Last assigned instrument id (0 = none yet).
    last_instrument_id: u64,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryRegistry {
    fn create_user(&mut self, phone_number: &str) -> Result<UserId, CemsError> {
        if self.phone_index.contains_key(phone_number) {
            return Err(CemsError::DuplicatePhone(phone_number.to_string()));
        }

        let user_id = UserId::generate();
        self.phone_index
            .insert(phone_number.to_string(), user_id.clone());
        self.users.insert(
            user_id.clone(),
            UserRecord {
                user_id: user_id.clone(),
                phone_number: phone_number.to_string(),
                details: None,
            },
        );
        Ok(user_id)
    }

    fn update_user_details(
        &mut self,
        user_id: &UserId,
        details: &IndustryDetails,
    ) -> Result<bool, CemsError> {
        match self.users.get_mut(user_id) {
            Some(user) => {
                user.details = Some(details.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_stack(
        &mut self,
        user_id: &UserId,
        details: &StackDetails,
    ) -> Result<StackId, CemsError> {
        if !self.users.contains_key(user_id) {
            return Err(CemsError::UserNotFound(user_id.clone()));
        }

        let stack_id = StackId(self.last_stack_id.saturating_add(1));
        self.last_stack_id = stack_id.0;
        self.stacks.insert(
            stack_id,
            StackRecord {
                stack_id,
                user_id: user_id.clone(),
                details: details.clone(),
            },
        );
        Ok(stack_id)
    }

    fn insert_instrument(
        &mut self,
        stack_id: StackId,
        details: &InstrumentDetails,
    ) -> Result<InstrumentId, CemsError> {
        if !self.stacks.contains_key(&stack_id) {
            return Err(CemsError::StackNotFound(stack_id));
        }

        let cems_id = InstrumentId(self.last_instrument_id.saturating_add(1));
        self.last_instrument_id = cems_id.0;
        self.instruments.insert(
            cems_id,
            InstrumentRecord {
                cems_id,
                stack_id,
                details: details.clone(),
            },
        );
        Ok(cems_id)
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<UserRecord>, CemsError> {
        Ok(self.users.get(user_id).cloned())
    }

    fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<UserRecord>, CemsError> {
        Ok(self
            .phone_index
            .get(phone_number)
            .and_then(|id| self.users.get(id))
            .cloned())
    }

    fn users(&self) -> Result<Vec<UserRecord>, CemsError> {
        Ok(self.users.values().cloned().collect())
    }

    fn stacks_for_user(&self, user_id: &UserId) -> Result<Vec<StackRecord>, CemsError> {
        Ok(self
            .stacks
            .values()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect())
    }

    fn instruments_for_stack(
        &self,
        stack_id: StackId,
    ) -> Result<Vec<InstrumentRecord>, CemsError> {
        Ok(self
            .instruments
            .values()
            .filter(|i| i.stack_id == stack_id)
            .cloned()
            .collect())
    }

    fn counts(&self) -> Result<RegistryCounts, CemsError> {
        Ok(RegistryCounts {
            users: self.users.len(),
            stacks: self.stacks.len(),
            instruments: self.instruments.len(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
