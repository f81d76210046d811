use crate::models::{AstRecord, DocDatabase, DocumentRecord};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when the Doc Database is modified.
#[derive(Clone, Debug, PartialEq)]
pub enum DocChange {
    /// Records were appended by the pipeline.
    RecordsAppended { added: usize, total: usize },

    /// The record list was replaced wholesale (`onHandleDocData`).
    RecordsReplaced { total: usize },

    /// The derived index changed.
    IndexUpdated { keys: usize },

    /// The database was cleared for a new pass.
    Reset { generation: u64 },
}

/// Shared handle to the Doc Database of the current run.
///
/// Cloning the store clones the handle, not the data: every clone observes
/// the same database, and [`reset`](Self::reset) clears that database in
/// place, so handles kept by plugins stay valid across regeneration.
///
/// The lock is only held inside the closures passed to [`read`](Self::read)
/// and [`update`](Self::update); never across an `.await`.
pub struct DocStore {
    db: Arc<RwLock<DocDatabase>>,
    change_tx: broadcast::Sender<DocChange>,
}

impl DocStore {
    /// Create a store with an empty database and a 100 event buffer.
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            db: Arc::new(RwLock::new(DocDatabase::default())),
            change_tx,
        }
    }

    /// Clone of the whole database.
    pub fn snapshot(&self) -> DocDatabase {
        self.read(DocDatabase::clone)
    }

    /// Execute a function with read access to the database.
    ///
    /// # Example
    /// ```ignore
    /// let count = store.read(|db| db.len());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&DocDatabase) -> R,
    {
        let db = self.db.read().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }

    /// Mutate the database and emit change events.
    ///
    /// Returns the events that were emitted.
    pub fn update<F>(&self, update_fn: F) -> Vec<DocChange>
    where
        F: FnOnce(&mut DocDatabase),
    {
        let mut db = self.db.write().unwrap_or_else(PoisonError::into_inner);
        let before = Shape::of(&db);

        update_fn(&mut db);

        let changes = before.diff(&Shape::of(&db));
        drop(db);

        for change in &changes {
            // No listeners is fine
            let _ = self.change_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<DocChange> {
        self.change_tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.read(DocDatabase::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(DocDatabase::is_empty)
    }

    pub fn generation(&self) -> u64 {
        self.read(|db| db.generation)
    }

    /// Append records (and the AST they came from) in order.
    pub fn append(&self, records: Vec<DocumentRecord>, ast: Option<AstRecord>) -> Vec<DocChange> {
        self.update(|db| {
            db.records.extend(records);
            db.asts.extend(ast);
        })
    }

    /// Move the record list out, leaving the database empty of records.
    ///
    /// Paired with [`replace_records`](Self::replace_records) to hand records
    /// to plugins by value.
    pub fn take_records(&self) -> Vec<DocumentRecord> {
        let mut db = self.db.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut db.records)
    }

    pub fn replace_records(&self, records: Vec<DocumentRecord>) -> Vec<DocChange> {
        let total = records.len();
        {
            let mut db = self.db.write().unwrap_or_else(PoisonError::into_inner);
            db.records = records;
        }

        let change = DocChange::RecordsReplaced { total };
        let _ = self.change_tx.send(change.clone());
        vec![change]
    }

    /// Clear the database in place for a new pass.
    pub fn reset(&self) -> Vec<DocChange> {
        let mut changes = self.update(DocDatabase::reset);

        // `update` only reports shape changes; always report the reset itself
        let generation = self.generation();
        if !changes.iter().any(|c| matches!(c, DocChange::Reset { .. })) {
            let change = DocChange::Reset { generation };
            let _ = self.change_tx.send(change.clone());
            changes.push(change);
        }

        changes
    }

    /// Whether two handles refer to the same database.
    pub fn same_store(&self, other: &DocStore) -> bool {
        Arc::ptr_eq(&self.db, &other.db)
    }
}

impl Default for DocStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DocStore {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            change_tx: self.change_tx.clone(),
        }
    }
}

impl std::fmt::Debug for DocStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.read(|db| {
            f.debug_struct("DocStore")
                .field("records", &db.len())
                .field("generation", &db.generation)
                .finish()
        })
    }
}

/// Cheap summary used to detect what an update changed.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Shape {
    records: usize,
    index_keys: usize,
    generation: u64,
}

impl Shape {
    fn of(db: &DocDatabase) -> Self {
        Self {
            records: db.records.len(),
            index_keys: db.index.len(),
            generation: db.generation,
        }
    }

    fn diff(self, after: &Shape) -> Vec<DocChange> {
        let mut changes = Vec::new();

        if self.generation != after.generation {
            changes.push(DocChange::Reset {
                generation: after.generation,
            });
        } else if after.records > self.records {
            changes.push(DocChange::RecordsAppended {
                added: after.records - self.records,
                total: after.records,
            });
        } else if after.records != self.records {
            changes.push(DocChange::RecordsReplaced {
                total: after.records,
            });
        }

        if self.generation == after.generation && self.index_keys != after.index_keys {
            changes.push(DocChange::IndexUpdated {
                keys: after.index_keys,
            });
        }

        changes
    }
}
