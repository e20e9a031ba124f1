//! SQLite store handle and scoped unit of work.
//!
//! A single connection is shared behind a mutex. Every compound write goes through
//! [`Database::unit_of_work`], which commits only when the closure succeeds and rolls back
//! on every other exit path, including early returns via `?`.
//!
//! A handle derived with [`Database::cancellable`] also gives up once its [`CancelFlag`] is
//! raised: it stops waiting for the connection and never commits afterwards.

use crate::constants::SCHEMA;
use crate::error::{ClinicError, ClinicResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

/// Poll interval while a cancellable handle waits for the connection.
const LOCK_POLL: Duration = Duration::from_millis(2);

/// Shared signal telling store work that its caller has stopped waiting.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    cancel: Option<CancelFlag>,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    ///
    /// `busy_timeout` bounds how long any statement waits on a lock held by another
    /// connection before failing with a store error.
    pub fn open(path: &Path, busy_timeout: Duration) -> ClinicResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and tooling.
    pub fn open_in_memory() -> ClinicResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> ClinicResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("clinic schema applied");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            cancel: None,
        })
    }

    /// Handle on the same connection that abandons its work once `flag` is raised.
    pub fn cancellable(&self, flag: &CancelFlag) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            cancel: Some(flag.clone()),
        }
    }

    fn check_cancelled(&self) -> ClinicResult<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(ClinicError::StoreCancelled),
            _ => Ok(()),
        }
    }

    fn lock(&self) -> ClinicResult<MutexGuard<'_, Connection>> {
        if self.cancel.is_none() {
            return self.conn.lock().map_err(|_| ClinicError::StorePoisoned);
        }
        loop {
            self.check_cancelled()?;
            match self.conn.try_lock() {
                Ok(guard) => {
                    self.check_cancelled()?;
                    return Ok(guard);
                }
                Err(TryLockError::Poisoned(_)) => return Err(ClinicError::StorePoisoned),
                Err(TryLockError::WouldBlock) => std::thread::sleep(LOCK_POLL),
            }
        }
    }

    /// Runs a read or a single-statement write against the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> ClinicResult<T>) -> ClinicResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok` and the handle has not been cancelled; otherwise rolls
    /// back and returns the error. A rollback failure is logged and the original error is
    /// still returned.
    pub fn unit_of_work<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> ClinicResult<T>,
    ) -> ClinicResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        match f(&tx).and_then(|value| self.check_cancelled().map(|()| value)) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!("rollback failed after {err}: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

/// Canonical stored form of a timestamp. Fixed width so text ordering is chronological.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Canonical stored form of an appointment instant (seconds precision).
pub(crate) fn appointment_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_timestamp(entity: &'static str, raw: &str) -> ClinicResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ClinicError::corrupt(entity, format!("timestamp {raw:?}: {e}")))
}

pub(crate) fn now() -> String {
    timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_departments(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM departments", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn unit_of_work_commits_on_success() {
        let db = Database::open_in_memory().unwrap();
        db.unit_of_work(|tx| {
            tx.execute(
                "INSERT INTO departments (name, created_at, updated_at) VALUES ('A', ?1, ?1)",
                [now()],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count_departments(&db), 1);
    }

    #[test]
    fn unit_of_work_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .unit_of_work(|tx| -> ClinicResult<()> {
                tx.execute(
                    "INSERT INTO departments (name, created_at, updated_at) VALUES ('A', ?1, ?1)",
                    [now()],
                )?;
                Err(ClinicError::InvalidInput("abort".into()))
            })
            .unwrap_err();
        assert!(matches!(err, ClinicError::InvalidInput(_)));
        assert_eq!(count_departments(&db), 0);
    }

    #[test]
    fn cancelled_unit_of_work_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let flag = CancelFlag::new();
        let handle = db.cancellable(&flag);
        let err = handle
            .unit_of_work(|tx| {
                tx.execute(
                    "INSERT INTO departments (name, created_at, updated_at) VALUES ('A', ?1, ?1)",
                    [now()],
                )?;
                flag.cancel();
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ClinicError::StoreCancelled));
        assert_eq!(count_departments(&db), 0);
    }

    #[test]
    fn cancelled_handle_stops_waiting_for_the_connection() {
        let db = Database::open_in_memory().unwrap();
        let flag = CancelFlag::new();
        let handle = db.cancellable(&flag);
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let holder = {
            let db = db.clone();
            std::thread::spawn(move || {
                db.with_conn(|_| {
                    held_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                })
                .unwrap();
            })
        };
        held_rx.recv().unwrap();
        flag.cancel();
        let err = handle.with_conn(|_| Ok(())).unwrap_err();
        assert!(matches!(err, ClinicError::StoreCancelled));
        holder.join().unwrap();
    }

    #[test]
    fn open_on_disk_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");
        Database::open(&path, Duration::from_millis(100)).unwrap();
        let db = Database::open(&path, Duration::from_millis(100)).unwrap();
        assert_eq!(count_departments(&db), 0);
    }

    #[test]
    fn timestamps_round_trip() {
        let at = Utc::now();
        let parsed = parse_timestamp("test", &timestamp(at)).unwrap();
        assert_eq!(parsed.timestamp_micros(), at.timestamp_micros());
    }
}
