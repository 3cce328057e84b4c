//! In-process [`RecordBackend`].
//!
//! Enforces the same uniqueness rule on `random_id` as the real store and
//! counts every request, which makes at-most-once and idempotency properties
//! observable in tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use super::{BackendError, RecordBackend};
use crate::config::Credentials;
use crate::record::{StatusUpdate, TelemetryRecord};
use crate::timestamp;

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<String, TelemetryRecord>,
    next_id: u64,
    accounts: Vec<(String, Credentials)>,
    authenticated_as: Option<String>,
    require_auth: bool,
    offline: bool,
    failing: BTreeSet<String>,
    requests: usize,
    mutations: usize,
}

/// Record store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RefCell<State>,
}

impl MemoryBackend {
    /// Create an empty store that accepts anonymous requests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account in an auth collection.
    #[must_use]
    pub fn with_account(self, auth_collection: &str, credentials: Credentials) -> Self {
        self.state
            .borrow_mut()
            .accounts
            .push((auth_collection.to_string(), credentials));
        self
    }

    /// Reject every unauthenticated request.
    #[must_use]
    pub fn requiring_auth(self) -> Self {
        self.state.borrow_mut().require_auth = true;
        self
    }

    /// Simulate a network outage.
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    /// Make creation of the given session token fail with a server error.
    pub fn fail_random_id(&self, random_id: &str) {
        self.state
            .borrow_mut()
            .failing
            .insert(random_id.to_string());
    }

    /// Auth collection of the last successful authentication.
    #[must_use]
    pub fn authenticated_as(&self) -> Option<String> {
        self.state.borrow().authenticated_as.clone()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().records.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests received, successful or not.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.borrow().requests
    }

    /// Number of create and update requests received.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.state.borrow().mutations
    }

    /// Look up a record by session token.
    #[must_use]
    pub fn get_by_random_id(&self, random_id: &str) -> Option<TelemetryRecord> {
        self.state
            .borrow()
            .records
            .values()
            .find(|record| record.random_id == random_id)
            .cloned()
    }

    /// Insert a record directly, bypassing request accounting.
    pub fn seed(&self, record: TelemetryRecord) -> String {
        let mut state = self.state.borrow_mut();
        Self::insert(&mut state, record)
    }

    fn insert(state: &mut State, mut record: TelemetryRecord) -> String {
        state.next_id += 1;
        let id = format!("rec{:012}", state.next_id);
        let now = timestamp::now();
        record.id = Some(id.clone());
        record.created.get_or_insert_with(|| now.clone());
        record.updated.get_or_insert(now);
        state.records.insert(id.clone(), record);
        id
    }

    fn admit(&self, mutation: bool) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.requests += 1;
        if mutation {
            state.mutations += 1;
        }
        if state.offline {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        if state.require_auth && state.authenticated_as.is_none() {
            return Err(BackendError::Unauthorized { status: 401 });
        }
        Ok(())
    }
}

impl RecordBackend for MemoryBackend {
    fn authenticate(
        &mut self,
        auth_collection: &str,
        credentials: &Credentials,
    ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.requests += 1;
        if state.offline {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        let known = state
            .accounts
            .iter()
            .any(|(collection, account)| collection == auth_collection && account == credentials);
        if !known {
            return Err(BackendError::Status {
                status: 400,
                message: "Failed to authenticate.".to_string(),
            });
        }
        state.authenticated_as = Some(auth_collection.to_string());
        Ok(())
    }

    fn probe(&self) -> Result<(), BackendError> {
        self.admit(false)
    }

    fn create(&self, record: &TelemetryRecord) -> Result<String, BackendError> {
        self.admit(true)?;
        let mut state = self.state.borrow_mut();
        if state.failing.contains(&record.random_id) {
            return Err(BackendError::Status {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        if state
            .records
            .values()
            .any(|existing| existing.random_id == record.random_id)
        {
            return Err(BackendError::Conflict {
                field: "random_id".to_string(),
            });
        }
        Ok(Self::insert(&mut state, record.clone()))
    }

    fn update(&self, id: &str, update: &StatusUpdate) -> Result<(), BackendError> {
        self.admit(true)?;
        let mut state = self.state.borrow_mut();
        let record = state.records.get_mut(id).ok_or(BackendError::Status {
            status: 404,
            message: "The requested resource wasn't found.".to_string(),
        })?;
        record.status = update.status;
        record.error.clone_from(&update.error);
        record.exit_code = update.exit_code;
        record.updated = Some(timestamp::now());
        Ok(())
    }

    fn find_by_random_id(&self, random_id: &str) -> Result<Option<String>, BackendError> {
        self.admit(false)?;
        Ok(self.get_by_random_id(random_id).and_then(|record| record.id))
    }
}
