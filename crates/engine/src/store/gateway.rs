//! Per-entity staged change buffer.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Entity, StoreError, Table};

/// A write waiting to be flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<E: Entity> {
    Insert(E),
    Update(E),
    Delete(E::Id),
}

/// Buffers writes for one entity kind until they are flushed.
///
/// Reads take the transaction (or any other [`Table`]) explicitly and layer
/// the staged changes over what the store returns, so a caller sees its own
/// unflushed writes.
#[derive(Debug)]
pub struct Gateway<E: Entity> {
    changes: Vec<Change<E>>,
}

impl<E: Entity> Default for Gateway<E> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
        }
    }
}

impl<E: Entity> Gateway<E> {
    /// Stage an insert, assigning an id if the entity has none.
    pub fn add(&mut self, mut entity: E) -> E {
        entity.assign_id();
        self.changes.push(Change::Insert(entity.clone()));
        entity
    }

    /// Stage an update.
    pub fn update(&mut self, entity: E) {
        self.changes.push(Change::Update(entity));
    }

    /// Stage a delete.
    pub fn delete(&mut self, id: E::Id) {
        self.changes.push(Change::Delete(id));
    }

    /// Number of staged changes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.changes.len()
    }

    /// Drop every staged change.
    pub fn discard(&mut self) {
        self.changes.clear();
    }

    /// The latest staged state of `id`.
    ///
    /// `None` if nothing is staged for it, `Some(None)` if it is staged for
    /// deletion.
    fn staged(&self, id: E::Id) -> Option<Option<&E>> {
        self.changes.iter().rev().find_map(|change| match change {
            Change::Insert(e) | Change::Update(e) if e.id() == id => Some(Some(e)),
            Change::Delete(deleted) if *deleted == id => Some(None),
            _ => None,
        })
    }

    /// Read one entity, staged changes first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn get_by_id<T: Table<E>>(
        &self,
        table: &mut T,
        id: E::Id,
    ) -> Result<Option<E>, StoreError> {
        if let Some(staged) = self.staged(id) {
            return Ok(staged.cloned());
        }
        table.find(id).await
    }

    /// Read every entity with staged changes applied, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn get_all<T: Table<E>>(&self, table: &mut T) -> Result<Vec<E>, StoreError> {
        let mut rows: BTreeMap<E::Id, E> = table
            .find_all()
            .await?
            .into_iter()
            .map(|e| (e.id(), e))
            .collect();

        for change in &self.changes {
            match change {
                Change::Insert(e) | Change::Update(e) => {
                    rows.insert(e.id(), e.clone());
                }
                Change::Delete(id) => {
                    rows.remove(id);
                }
            }
        }

        Ok(rows.into_values().collect())
    }

    /// Write every staged change in order and clear the buffer.
    ///
    /// The buffer is emptied even if a write fails; the caller is expected to
    /// roll the transaction back.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub async fn flush<T: Table<E>>(&mut self, table: &mut T) -> Result<usize, StoreError> {
        let changes = std::mem::take(&mut self.changes);
        let count = changes.len();

        for change in changes {
            match change {
                Change::Insert(e) => table.insert(&e).await?,
                Change::Update(e) => table.update(&e).await?,
                Change::Delete(id) => table.delete(id).await?,
            }
        }

        if count > 0 {
            debug!(kind = E::KIND, count, "Flushed staged changes");
        }
        Ok(count)
    }
}
