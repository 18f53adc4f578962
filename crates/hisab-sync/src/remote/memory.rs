//! # In-Memory Remote Store
//!
//! An in-process [`RemoteStore`] with fault injection. Ids are assigned by
//! the store on create, so local and remote ids diverge exactly as they do
//! against the real service.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use hisab_core::{Record, TenantScope};

use super::{RemoteError, RemoteResult, RemoteStore};

/// First id handed out by [`MemoryRemoteStore::create`].
const FIRST_REMOTE_ID: i64 = 1_000;

#[derive(Debug)]
struct MemoryState<T> {
    records: BTreeMap<i64, T>,
    next_id: i64,
    unreachable: bool,
    fail_lists: bool,
    /// Lists succeed this many more times, then fail.
    lists_before_failure: Option<usize>,
    reject_creates: bool,
    list_calls: usize,
    create_calls: usize,
}

/// Remote store held in memory. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryRemoteStore<T> {
    state: Arc<Mutex<MemoryState<T>>>,
}

impl<T: Record> Default for MemoryRemoteStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryRemoteStore<T> {
    pub fn new() -> Self {
        MemoryRemoteStore {
            state: Arc::new(Mutex::new(MemoryState {
                records: BTreeMap::new(),
                next_id: FIRST_REMOTE_ID,
                unreachable: false,
                fail_lists: false,
                lists_before_failure: None,
                reject_creates: false,
                list_calls: 0,
                create_calls: 0,
            })),
        }
    }

    /// A store pre-populated with `records`, keeping their ids.
    pub fn with_records(records: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a record under its own id, as another device would have.
    pub fn insert(&self, record: T) {
        let mut state = self.state();
        state.next_id = state.next_id.max(record.id() + 1);
        state.records.insert(record.id(), record);
    }

    /// Removes a record out-of-band (administrative delete).
    pub fn remove(&self, id: i64) -> Option<T> {
        self.state().records.remove(&id)
    }

    /// Every stored record, ordered by id.
    pub fn records(&self) -> Vec<T> {
        self.state().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Every call fails with [`RemoteError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// `list` fails with a transport error.
    pub fn fail_lists(&self, fail: bool) {
        self.state().fail_lists = fail;
    }

    /// `list` succeeds `calls` more times, then fails.
    pub fn fail_lists_after(&self, calls: usize) {
        self.state().lists_before_failure = Some(calls);
    }

    /// `create` answers with a 409 rejection.
    pub fn reject_creates(&self, reject: bool) {
        self.state().reject_creates = reject;
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    fn check_reachable(state: &MemoryState<T>) -> RemoteResult<()> {
        if state.unreachable {
            return Err(RemoteError::Unreachable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Record> RemoteStore<T> for MemoryRemoteStore<T> {
    async fn list(&self, scope: TenantScope, include_archived: bool) -> RemoteResult<Vec<T>> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.list_calls += 1;

        if state.fail_lists {
            return Err(RemoteError::Unreachable("connection reset by peer".into()));
        }
        if let Some(remaining) = state.lists_before_failure {
            if remaining == 0 {
                return Err(RemoteError::Unreachable("connection reset by peer".into()));
            }
            state.lists_before_failure = Some(remaining - 1);
        }

        Ok(state
            .records
            .values()
            .filter(|record| record.is_visible(scope, include_archived))
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> RemoteResult<Option<T>> {
        let state = self.state();
        Self::check_reachable(&state)?;
        Ok(state.records.get(&id).cloned())
    }

    async fn create(&self, record: &T) -> RemoteResult<T> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.create_calls += 1;

        if state.reject_creates {
            return Err(RemoteError::Rejected {
                status: 409,
                message: "duplicate key value violates unique constraint".into(),
            });
        }

        let mut stored = record.clone();
        stored.set_id(state.next_id);
        state.next_id += 1;
        state.records.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: i64, record: &T) -> RemoteResult<T> {
        let mut state = self.state();
        Self::check_reachable(&state)?;

        if !state.records.contains_key(&id) {
            return Err(RemoteError::NotFound { kind: T::KIND, id });
        }
        let mut stored = record.clone();
        stored.set_id(id);
        state.records.insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: i64) -> RemoteResult<()> {
        let mut state = self.state();
        Self::check_reachable(&state)?;
        state.records.remove(&id);
        Ok(())
    }
}
