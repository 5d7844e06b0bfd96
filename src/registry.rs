use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::endpoint::{EndpointIdentity, TransactionHandle};
use crate::error::DataApiError;

struct Entry<T> {
    endpoint: EndpointIdentity,
    conn: Arc<T>,
    last_used: Instant,
}

/// Open transactions of a local backend, keyed by handle.
///
/// Dropping an entry drops its connection, which is how the backends abandon a
/// transaction: the engine rolls back uncommitted work when the connection goes
/// away. Entries idle for longer than the timeout are swept on the next access.
pub(crate) struct TransactionRegistry<T> {
    entries: Mutex<HashMap<TransactionHandle, Entry<T>>>,
    idle_timeout: Option<Duration>,
}

impl<T> TransactionRegistry<T> {
    pub(crate) fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TransactionHandle, Entry<T>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            // Clear the poison and continue with the recovered data
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn insert(&self, endpoint: &EndpointIdentity, conn: T) -> TransactionHandle {
        let handle = TransactionHandle::generate();
        let mut entries = self.lock();
        self.sweep_locked(&mut entries);
        entries.insert(
            handle.clone(),
            Entry {
                endpoint: endpoint.clone(),
                conn: Arc::new(conn),
                last_used: Instant::now(),
            },
        );
        handle
    }

    /// Borrow the connection behind `handle` for one statement.
    pub(crate) fn checkout(
        &self,
        endpoint: &EndpointIdentity,
        handle: &TransactionHandle,
    ) -> Result<Arc<T>, DataApiError> {
        let mut entries = self.lock();
        self.sweep_locked(&mut entries);
        let entry = entries
            .get_mut(handle)
            .ok_or_else(|| unknown_handle(handle))?;
        if &entry.endpoint != endpoint {
            return Err(DataApiError::TransactionError(format!(
                "transaction {handle} belongs to database {}",
                entry.endpoint.database()
            )));
        }
        entry.last_used = Instant::now();
        Ok(entry.conn.clone())
    }

    /// Take the connection out for commit; the handle is dead afterwards.
    pub(crate) fn remove(
        &self,
        endpoint: &EndpointIdentity,
        handle: &TransactionHandle,
    ) -> Result<Arc<T>, DataApiError> {
        let mut entries = self.lock();
        self.sweep_locked(&mut entries);
        match entries.get(handle) {
            None => Err(unknown_handle(handle)),
            Some(entry) if &entry.endpoint != endpoint => Err(DataApiError::TransactionError(
                format!(
                    "transaction {handle} belongs to database {}",
                    entry.endpoint.database()
                ),
            )),
            Some(_) => entries
                .remove(handle)
                .map(|entry| entry.conn)
                .ok_or_else(|| unknown_handle(handle)),
        }
    }

    /// Forget `handle`, abandoning its transaction.
    pub(crate) fn discard(&self, handle: &TransactionHandle) {
        if self.lock().remove(handle).is_some() {
            debug!(transaction_id = %handle, "transaction abandoned");
        }
    }

    /// Abandon every open transaction on `database` of `resource`.
    #[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
    pub(crate) fn discard_database(&self, resource: &str, database: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            !(entry.endpoint.resource() == resource && entry.endpoint.database() == database)
        });
        before - entries.len()
    }

    /// Whether any live transaction is bound to `database` of `resource`.
    #[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
    pub(crate) fn has_database(&self, resource: &str, database: &str) -> bool {
        let mut entries = self.lock();
        self.sweep_locked(&mut entries);
        entries.values().any(|entry| {
            entry.endpoint.resource() == resource && entry.endpoint.database() == database
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn sweep_locked(&self, entries: &mut HashMap<TransactionHandle, Entry<T>>) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };
        entries.retain(|handle, entry| {
            let alive = entry.last_used.elapsed() < timeout;
            if !alive {
                warn!(transaction_id = %handle, "transaction expired after {timeout:?} idle");
            }
            alive
        });
    }
}

fn unknown_handle(handle: &TransactionHandle) -> DataApiError {
    DataApiError::TransactionError(format!(
        "transaction {handle} is unknown or already terminated"
    ))
}
