use crate::{ItemId, ListError, PatchError, ProvisionalIds};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use studio_api::ApiError;

/// Entry of an [`OptimisticList`]
pub trait ListEntity: Clone + Send + Sync + 'static {
    type Patch: Clone + Send + Sync + 'static;

    fn id(&self) -> ItemId;
    fn set_id(&mut self, id: ItemId);
    fn order_index(&self) -> usize;
    fn set_order_index(&mut self, index: usize);

    /// Validate and apply; on error `self` must be left unchanged.
    fn apply_patch(&mut self, patch: &Self::Patch) -> Result<(), PatchError>;
}

/// Where `insert_provisional` puts new entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Newest first
    #[default]
    Head,
    Tail,
}

/// What a reorder tells the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReorderMode {
    /// Full server-id order after the move
    #[default]
    IdOrder,
    /// Moved entry and its new 1-based position
    MovedTo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderRequest {
    IdOrder(Vec<u64>),
    MovedTo { id: u64, order: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRequest<T> {
    Create { provisional: ItemId, item: T },
    Update { item: T },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Reorder,
    Create(ItemId),
    Update(ItemId),
    Delete(ItemId),
}

/// A mutation already applied locally and waiting for the server.
///
/// Hand it back to the matching `finish_*` call exactly once.
#[derive(Debug)]
#[must_use = "a pending mutation keeps the list busy until finished"]
pub struct Pending<T, R> {
    request: R,
    snapshot: Vec<T>,
    epoch: u64,
}

impl<T, R> Pending<T, R> {
    pub fn request(&self) -> &R {
        &self.request
    }
}

#[derive(Debug)]
pub enum RemovePlan<T> {
    /// Provisional entry, already gone
    Local,
    /// Server entry, removed once the delete succeeds
    Remote(Pending<T, u64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Saved { id: ItemId },
    /// Create finished after the user cancelled it; the entry stays gone.
    /// `server_id` is what the server assigned, if it got that far.
    Discarded { server_id: Option<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Provisional entry dropped locally
    Removed,
    /// Create in flight; its response will be discarded
    Deferred,
    /// Server entry left as is, edit mode closed
    Closed,
}

/// Ordered entries with optimistic mutation and verbatim rollback.
///
/// At most one server mutation is in flight; a second one fails with
/// [`ListError::Busy`] before touching any state. `order_index` always equals
/// the entry's position.
#[derive(Debug, Clone)]
pub struct OptimisticList<T: ListEntity> {
    items: Vec<T>,
    placement: Placement,
    reorder_mode: ReorderMode,
    ids: ProvisionalIds,
    editing: Option<ItemId>,
    in_flight: Option<MutationKind>,
    cancelled: HashSet<ItemId>,
    epoch: u64,
}

impl<T: ListEntity> Default for OptimisticList<T> {
    fn default() -> Self {
        Self::new(Placement::default(), ReorderMode::default())
    }
}

impl<T: ListEntity> OptimisticList<T> {
    pub fn new(placement: Placement, reorder_mode: ReorderMode) -> Self {
        Self {
            items: Vec::new(),
            placement,
            reorder_mode,
            ids: ProvisionalIds::new(),
            editing: None,
            in_flight: None,
            cancelled: HashSet::new(),
            epoch: 0,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn editing(&self) -> Option<ItemId> {
        self.editing
    }

    pub fn in_flight(&self) -> Option<MutationKind> {
        self.in_flight
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Replace the contents with a fresh server load.
    ///
    /// Entries are ordered by their `order_index`; ties keep the order they
    /// arrived in. A mutation started before the reload will not roll back
    /// over it, and no longer keeps the list busy.
    pub fn replace_all(&mut self, mut items: Vec<T>) {
        items.sort_by_key(|item| item.order_index());
        self.items = items;
        self.renumber();
        self.epoch += 1;
        self.in_flight = None;
        self.cancelled.clear();
        if let Some(editing) = self.editing {
            if self.position(editing).is_none() {
                self.editing = None;
            }
        }
    }

    /// Add a local entry under a fresh provisional id and start editing it.
    pub fn insert_provisional(&mut self, mut item: T) -> Result<ItemId, ListError> {
        self.ensure_idle()?;
        let id = self.ids.next();
        item.set_id(id);
        match self.placement {
            Placement::Head => self.items.insert(0, item),
            Placement::Tail => self.items.push(item),
        }
        self.renumber();
        self.editing = Some(id);
        Ok(id)
    }

    pub fn begin_edit(&mut self, id: ItemId) -> Result<(), ListError> {
        self.position(id).ok_or(ListError::NotFound(id))?;
        self.editing = Some(id);
        Ok(())
    }

    /// Move one entry. `Ok(None)` means nothing moved and nothing needs sending.
    pub fn begin_reorder(
        &mut self,
        from: usize,
        to: usize,
    ) -> Result<Option<Pending<T, ReorderRequest>>, ListError> {
        self.ensure_idle()?;
        let len = self.items.len();
        for index in [from, to] {
            if index >= len {
                return Err(ListError::IndexOutOfBounds { index, len });
            }
        }
        if from == to {
            return Ok(None);
        }
        let moved = self.items[from].id();
        if self.reorder_mode == ReorderMode::MovedTo && moved.is_provisional() {
            return Err(ListError::Unsaved(moved));
        }

        let pending_snapshot = self.items.clone();
        let item = self.items.remove(from);
        self.items.insert(to, item);
        self.renumber();

        let request = match self.reorder_mode {
            ReorderMode::IdOrder => ReorderRequest::IdOrder(
                self.items.iter().filter_map(|item| item.id().server()).collect(),
            ),
            ReorderMode::MovedTo => ReorderRequest::MovedTo {
                id: moved.server().unwrap_or_default(),
                order: to + 1,
            },
        };
        self.in_flight = Some(MutationKind::Reorder);
        Ok(Some(self.pending(request, pending_snapshot)))
    }

    pub fn finish_reorder(
        &mut self,
        pending: Pending<T, ReorderRequest>,
        result: Result<(), ApiError>,
    ) -> Result<(), ListError> {
        self.settle(pending.epoch);
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.rollback(pending.snapshot, pending.epoch);
                Err(err.into())
            }
        }
    }

    /// Apply `patch` locally and produce the create/update to send.
    pub fn begin_commit(
        &mut self,
        id: ItemId,
        patch: &T::Patch,
    ) -> Result<Pending<T, CommitRequest<T>>, ListError> {
        self.ensure_idle()?;
        let pos = self.position(id).ok_or(ListError::NotFound(id))?;
        let mut updated = self.items[pos].clone();
        updated.apply_patch(patch)?;

        let snapshot = self.items.clone();
        self.items[pos] = updated.clone();
        let (kind, request) = if id.is_provisional() {
            (
                MutationKind::Create(id),
                CommitRequest::Create {
                    provisional: id,
                    item: updated,
                },
            )
        } else {
            (MutationKind::Update(id), CommitRequest::Update { item: updated })
        };
        self.in_flight = Some(kind);
        Ok(self.pending(request, snapshot))
    }

    /// `server_id` is the id a create returned; updates pass `None`.
    pub fn finish_commit(
        &mut self,
        pending: Pending<T, CommitRequest<T>>,
        result: Result<Option<u64>, ApiError>,
    ) -> Result<CommitOutcome, ListError> {
        self.settle(pending.epoch);
        match (pending.request, result) {
            (CommitRequest::Create { provisional, .. }, result)
                if self.cancelled.remove(&provisional) =>
            {
                if let Some(pos) = self.position(provisional) {
                    self.items.remove(pos);
                    self.renumber();
                }
                let server_id = result.ok().flatten();
                Ok(CommitOutcome::Discarded { server_id })
            }
            (CommitRequest::Create { provisional, .. }, Ok(Some(server_id))) => {
                let id = ItemId::Server(server_id);
                if let Some(pos) = self.position(provisional) {
                    self.items[pos].set_id(id);
                }
                if self.editing == Some(provisional) {
                    self.editing = None;
                }
                Ok(CommitOutcome::Saved { id })
            }
            (CommitRequest::Create { .. }, Ok(None)) => {
                self.rollback(pending.snapshot, pending.epoch);
                Err(ApiError::Decode("create returned no id".into()).into())
            }
            (CommitRequest::Update { item }, Ok(_)) => {
                if self.editing == Some(item.id()) {
                    self.editing = None;
                }
                Ok(CommitOutcome::Saved { id: item.id() })
            }
            (_, Err(err)) => {
                self.rollback(pending.snapshot, pending.epoch);
                Err(err.into())
            }
        }
    }

    /// Provisional entries go immediately; server entries wait for the delete.
    pub fn begin_remove(&mut self, id: ItemId) -> Result<RemovePlan<T>, ListError> {
        if self.in_flight == Some(MutationKind::Create(id)) {
            self.cancel_edit(id)?;
            return Ok(RemovePlan::Local);
        }
        self.ensure_idle()?;
        let pos = self.position(id).ok_or(ListError::NotFound(id))?;
        match id {
            ItemId::Provisional(_) => {
                self.items.remove(pos);
                self.renumber();
                if self.editing == Some(id) {
                    self.editing = None;
                }
                Ok(RemovePlan::Local)
            }
            ItemId::Server(server_id) => {
                self.in_flight = Some(MutationKind::Delete(id));
                let snapshot = self.items.clone();
                Ok(RemovePlan::Remote(self.pending(server_id, snapshot)))
            }
        }
    }

    pub fn finish_remove(
        &mut self,
        pending: Pending<T, u64>,
        result: Result<(), ApiError>,
    ) -> Result<(), ListError> {
        self.settle(pending.epoch);
        match result {
            Ok(()) => {
                let id = ItemId::Server(pending.request);
                if let Some(pos) = self.position(id) {
                    self.items.remove(pos);
                    self.renumber();
                }
                if self.editing == Some(id) {
                    self.editing = None;
                }
                Ok(())
            }
            Err(err) => {
                self.rollback(pending.snapshot, pending.epoch);
                Err(err.into())
            }
        }
    }

    /// Leave edit mode for `id`, dropping it if it never reached the server.
    pub fn cancel_edit(&mut self, id: ItemId) -> Result<CancelOutcome, ListError> {
        if self.editing == Some(id) {
            self.editing = None;
        }
        if !id.is_provisional() {
            return Ok(CancelOutcome::Closed);
        }
        if self.in_flight == Some(MutationKind::Create(id)) {
            self.cancelled.insert(id);
            if let Some(pos) = self.position(id) {
                self.items.remove(pos);
                self.renumber();
            }
            return Ok(CancelOutcome::Deferred);
        }
        self.ensure_idle()?;
        let pos = self.position(id).ok_or(ListError::NotFound(id))?;
        self.items.remove(pos);
        self.renumber();
        Ok(CancelOutcome::Removed)
    }

    /// Give up on a mutation whose response will never arrive.
    ///
    /// The pre-mutation state comes back unless the list was reloaded in
    /// the meantime.
    pub fn abandon<R>(&mut self, pending: Pending<T, R>) {
        if pending.epoch != self.epoch {
            return;
        }
        let kind = self.in_flight.take();
        self.rollback(pending.snapshot, pending.epoch);
        if let Some(MutationKind::Create(id)) = kind {
            self.cancelled.remove(&id);
        }
    }

    /// A reload already released the list for mutations started before it.
    fn settle(&mut self, epoch: u64) {
        if epoch == self.epoch {
            self.in_flight = None;
        }
    }

    fn ensure_idle(&self) -> Result<(), ListError> {
        match self.in_flight {
            Some(_) => Err(ListError::Busy),
            None => Ok(()),
        }
    }

    fn pending<R>(&self, request: R, snapshot: Vec<T>) -> Pending<T, R> {
        Pending {
            request,
            snapshot,
            epoch: self.epoch,
        }
    }

    fn rollback(&mut self, mut snapshot: Vec<T>, epoch: u64) {
        if epoch != self.epoch {
            tracing::debug!("list reloaded while saving; keeping the fresh load");
            return;
        }
        if !self.cancelled.is_empty() {
            snapshot.retain(|item| !self.cancelled.contains(&item.id()));
        }
        self.items = snapshot;
        if let Some(editing) = self.editing {
            if self.position(editing).is_none() {
                self.editing = None;
            }
        }
    }

    fn renumber(&mut self) {
        for (index, item) in self.items.iter_mut().enumerate() {
            item.set_order_index(index);
        }
    }
}
