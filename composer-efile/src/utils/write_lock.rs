//! Write-lock contention on the index database
//!
//! An index commit takes SQLite's write lock up front with `BEGIN IMMEDIATE`
//! and releases it with `COMMIT`. Another writer can fail either statement
//! with `SQLITE_BUSY` once the connection's busy timeout has run out, and a
//! stale WAL snapshot fails immediately. Failures at those two statements are
//! retried with jittered backoff; a failure while writing rows is returned
//! as is.

use composer_common::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

const FIRST_PAUSE_MS: u64 = 50;
const MAX_PAUSE_MS: u64 = 800;

/// Statement at which a commit attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStep {
    Begin,
    Write,
    Commit,
}

#[derive(Debug)]
pub struct CommitFailure {
    pub step: CommitStep,
    pub error: Error,
}

impl CommitFailure {
    pub fn new(step: CommitStep, error: impl Into<Error>) -> Self {
        Self {
            step,
            error: error.into(),
        }
    }

    /// Map a driver error raised at `step`
    pub fn at(step: CommitStep) -> impl FnOnce(sqlx::Error) -> Self {
        move |error| Self::new(step, error)
    }

    /// Another writer holds the lock at the begin or commit statement
    pub fn is_lock_contention(&self) -> bool {
        self.step != CommitStep::Write && is_busy(&self.error)
    }
}

/// `SQLITE_BUSY` or `SQLITE_LOCKED`, including extended codes
fn is_busy(err: &Error) -> bool {
    let Error::Database(db_err) = err else {
        return false;
    };

    let code = db_err
        .as_database_error()
        .and_then(|e| e.code())
        .and_then(|code| code.parse::<i32>().ok());
    match code {
        Some(code) => matches!(code & 0xff, 5 | 6),
        None => db_err.to_string().contains("database is locked"),
    }
}

/// What a commit is about to write, for log context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedCounts {
    pub changes: usize,
    pub superseded: usize,
}

/// Run commit attempts until one succeeds, a non-contention failure occurs,
/// or `max_wait_ms` has passed.
///
/// Each call of `attempt` must run a complete transaction of its own.
pub async fn commit_with_lock_retry<F, Fut>(
    staged: StagedCounts,
    max_wait_ms: u64,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), CommitFailure>>,
{
    let started = Instant::now();
    let deadline = started + Duration::from_millis(max_wait_ms);
    let mut pause_ms = FIRST_PAUSE_MS;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let failure = match attempt().await {
            Ok(()) => {
                if attempts > 1 {
                    tracing::info!(
                        attempts,
                        waited_ms = started.elapsed().as_millis(),
                        changes = staged.changes,
                        superseded = staged.superseded,
                        "Index commit went through after lock contention"
                    );
                }
                return Ok(());
            }
            Err(failure) => failure,
        };

        if !failure.is_lock_contention() {
            return Err(failure.error);
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::error!(
                attempts,
                step = ?failure.step,
                changes = staged.changes,
                superseded = staged.superseded,
                max_wait_ms,
                "Index still locked by another writer; staged changes not committed"
            );
            return Err(Error::Internal(format!(
                "index commit: database locked at {:?} after {} attempts ({} ms)",
                failure.step,
                attempts,
                started.elapsed().as_millis()
            )));
        }

        let jittered = rand::thread_rng().gen_range(pause_ms / 2..=pause_ms);
        let pause = Duration::from_millis(jittered).min(deadline.saturating_duration_since(now));
        tracing::warn!(
            attempts,
            step = ?failure.step,
            pause_ms = pause.as_millis(),
            changes = staged.changes,
            superseded = staged.superseded,
            "Index locked by another writer, retrying commit"
        );
        tokio::time::sleep(pause).await;
        pause_ms = (pause_ms * 2).min(MAX_PAUSE_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::ConnectOptions;
    use tempfile::TempDir;

    const STAGED: StagedCounts = StagedCounts {
        changes: 3,
        superseded: 1,
    };

    fn locked(step: CommitStep) -> CommitFailure {
        CommitFailure::new(
            step,
            sqlx::Error::Protocol("database is locked".to_string()),
        )
    }

    #[tokio::test]
    async fn test_begin_contention_is_retried() {
        let mut attempts = 0;
        let result = commit_with_lock_retry(STAGED, 5000, || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(locked(CommitStep::Begin))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_commit_contention_is_retried() {
        let mut attempts = 0;
        let result = commit_with_lock_retry(STAGED, 5000, || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 2 {
                    Err(locked(CommitStep::Commit))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_lock_error_while_writing_rows_is_not_retried() {
        let mut attempts = 0;
        let result = commit_with_lock_retry(STAGED, 5000, || {
            attempts += 1;
            async { Err(locked(CommitStep::Write)) }
        })
        .await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_other_errors_fail_immediately() {
        let mut attempts = 0;
        let result = commit_with_lock_retry(STAGED, 5000, || {
            attempts += 1;
            async { Err(CommitFailure::new(CommitStep::Begin, Error::Internal("boom".to_string()))) }
        })
        .await;

        assert!(matches!(result, Err(Error::Internal(msg)) if msg == "boom"));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_wait() {
        let result =
            commit_with_lock_retry(STAGED, 60, || async { Err(locked(CommitStep::Begin)) }).await;

        match result {
            Err(Error::Internal(msg)) => assert!(msg.contains("database locked at Begin")),
            other => panic!("expected Internal error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sqlite_busy_is_contention() {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("state.sqlite"))
            .create_if_missing(true)
            .busy_timeout(Duration::ZERO);
        let mut holder = options.clone().connect().await.unwrap();
        let mut waiter = options.connect().await.unwrap();

        sqlx::query("BEGIN IMMEDIATE").execute(&mut holder).await.unwrap();
        let err = sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut waiter)
            .await
            .unwrap_err();

        assert!(CommitFailure::at(CommitStep::Begin)(err).is_lock_contention());
        sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();
    }
}
