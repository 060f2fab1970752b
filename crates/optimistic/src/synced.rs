use crate::{
    CancelOutcome, CommitOutcome, CommitRequest, ItemId, ListEntity, ListError, OptimisticList,
    Pending, RemovePlan, ReorderRequest,
};
use parking_lot::Mutex;
use std::sync::Arc;
use studio_api::ApiError;

/// Server side of a synced list
#[async_trait::async_trait]
pub trait ListBackend<T: ListEntity>: Send + Sync {
    async fn reorder(&self, request: &ReorderRequest) -> Result<(), ApiError>;

    /// Returns the id the server assigned.
    async fn create(&self, item: &T) -> Result<u64, ApiError>;

    async fn update(&self, item: &T) -> Result<(), ApiError>;

    async fn delete(&self, id: u64) -> Result<(), ApiError>;
}

/// [`OptimisticList`] wired to a [`ListBackend`].
///
/// The state lock is only held between awaits, so readers always see the
/// optimistic state while a save is running.
pub struct SyncedList<T: ListEntity> {
    state: Arc<Mutex<OptimisticList<T>>>,
    backend: Arc<dyn ListBackend<T>>,
}

/// Hands an abandoned mutation back to the list when its future is dropped
/// before the server answered.
struct PendingGuard<'a, T: ListEntity, R> {
    state: &'a Mutex<OptimisticList<T>>,
    request: R,
    pending: Option<Pending<T, R>>,
}

impl<'a, T: ListEntity, R: Clone> PendingGuard<'a, T, R> {
    fn new(state: &'a Mutex<OptimisticList<T>>, pending: Pending<T, R>) -> Self {
        Self {
            state,
            request: pending.request().clone(),
            pending: Some(pending),
        }
    }

    /// Disarm; `None` only if already taken.
    fn into_pending(mut self) -> Option<Pending<T, R>> {
        self.pending.take()
    }
}

impl<T: ListEntity, R> Drop for PendingGuard<'_, T, R> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!("save dropped before the server answered; rolling back");
            self.state.lock().abandon(pending);
        }
    }
}

impl<T: ListEntity> Clone for SyncedList<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<T: ListEntity> SyncedList<T> {
    pub fn new(list: OptimisticList<T>, backend: Arc<dyn ListBackend<T>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(list)),
            backend,
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.state.lock().items().to_vec()
    }

    pub fn with<R>(&self, f: impl FnOnce(&OptimisticList<T>) -> R) -> R {
        f(&*self.state.lock())
    }

    pub fn replace_all(&self, items: Vec<T>) {
        self.state.lock().replace_all(items);
    }

    pub fn insert_provisional(&self, item: T) -> Result<ItemId, ListError> {
        self.state.lock().insert_provisional(item)
    }

    pub fn begin_edit(&self, id: ItemId) -> Result<(), ListError> {
        self.state.lock().begin_edit(id)
    }

    pub fn cancel_edit(&self, id: ItemId) -> Result<CancelOutcome, ListError> {
        self.state.lock().cancel_edit(id)
    }

    /// `Ok(false)` when nothing moved.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<bool, ListError> {
        let pending = match self.state.lock().begin_reorder(from, to)? {
            Some(pending) => pending,
            None => return Ok(false),
        };
        let guard = PendingGuard::new(&self.state, pending);
        let result = self.backend.reorder(&guard.request).await;
        if let Some(pending) = guard.into_pending() {
            self.state.lock().finish_reorder(pending, result)?;
        }
        Ok(true)
    }

    pub async fn commit_edit(
        &self,
        id: ItemId,
        patch: &T::Patch,
    ) -> Result<CommitOutcome, ListError> {
        let pending = self.state.lock().begin_commit(id, patch)?;
        let guard = PendingGuard::new(&self.state, pending);
        let result = match &guard.request {
            CommitRequest::Create { item, .. } => self.backend.create(item).await.map(Some),
            CommitRequest::Update { item } => self.backend.update(item).await.map(|_| None),
        };
        let outcome = match guard.into_pending() {
            Some(pending) => self.state.lock().finish_commit(pending, result)?,
            None => return Err(ListError::Busy),
        };

        if let CommitOutcome::Discarded {
            server_id: Some(server_id),
        } = outcome
        {
            if let Err(err) = self.backend.delete(server_id).await {
                tracing::warn!(server_id, %err, "could not delete cancelled item");
            }
        }
        Ok(outcome)
    }

    pub async fn remove(&self, id: ItemId) -> Result<(), ListError> {
        let plan = self.state.lock().begin_remove(id)?;
        match plan {
            RemovePlan::Local => Ok(()),
            RemovePlan::Remote(pending) => {
                let server_id = *pending.request();
                let guard = PendingGuard::new(&self.state, pending);
                let result = self.backend.delete(server_id).await;
                match guard.into_pending() {
                    Some(pending) => self.state.lock().finish_remove(pending, result),
                    None => Ok(()),
                }
            }
        }
    }
}
