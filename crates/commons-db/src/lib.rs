pub mod error;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod news;
pub mod notifications;
pub mod queries;
pub mod questions;
pub mod votes;

use std::ops::Deref;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{info, trace};

pub use error::StoreError;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Action deferred until the enclosing transaction has committed.
pub type CommitHook = Box<dyn FnOnce() + Send + 'static>;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private database with the full schema. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one immediate transaction.
    ///
    /// Returning `Ok` commits and then runs every hook queued with
    /// [`UnitOfWork::on_commit`], in order, after the connection lock is
    /// released. Returning `Err` rolls back and drops the hooks unrun.
    pub fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let (value, hooks) = {
            let mut conn = self.lock()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;
            let mut uow = UnitOfWork {
                tx,
                hooks: Vec::new(),
            };

            let value = f(&mut uow)?;

            let UnitOfWork { tx, hooks } = uow;
            tx.commit().map_err(StoreError::from)?;
            (value, hooks)
        };

        if !hooks.is_empty() {
            trace!("Running {} commit hooks", hooks.len());
        }
        for hook in hooks {
            hook();
        }

        Ok(value)
    }
}

/// An open write transaction plus its queue of post-commit actions.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    hooks: Vec<CommitHook>,
}

impl UnitOfWork<'_> {
    /// Queue `hook` to run only once this transaction has durably committed.
    pub fn on_commit<F>(&mut self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    pub fn pending_hooks(&self) -> usize {
        self.hooks.len()
    }
}

impl Deref for UnitOfWork<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hooks_run_after_commit() {
        let db = Database::open_in_memory().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        db.transaction(|uow| {
            queries::insert_user(uow, "alice")?;
            uow.on_commit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(uow.pending_hooks(), 1);
            Ok::<_, StoreError>(())
        })
        .unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(db.get_user_by_username("alice").unwrap().is_some());
    }

    #[test]
    fn rollback_drops_hooks_and_rows() {
        let db = Database::open_in_memory().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let result: Result<()> = db.transaction(|uow| {
            queries::insert_user(uow, "alice")?;
            uow.on_commit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            Err(StoreError::Integrity("forced".into()))
        });

        assert!(result.is_err());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(db.get_user_by_username("alice").unwrap().is_none());
    }

    #[test]
    fn hooks_may_reenter_the_database() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let seen = Arc::new(AtomicUsize::new(0));

        let (db2, seen2) = (db.clone(), seen.clone());
        db.transaction(|uow| {
            queries::insert_user(uow, "alice")?;
            uow.on_commit(move || {
                // The writer lock is free by the time hooks run.
                if db2.get_user_by_username("alice").unwrap().is_some() {
                    seen2.fetch_add(1, Ordering::SeqCst);
                }
            });
            Ok::<_, StoreError>(())
        })
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
