use rusqlite::Connection;
use std::time::Duration;
use tracing::warn;

use crate::decode::{BatchRecord, LinkRecord, TeacherRecord};

/// Outcome of one committed chunk: rows newly inserted vs rows skipped
/// because their conflict key already existed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub inserted: usize,
    pub skipped: usize,
}

/// Why a chunk could not be committed. Conflicting keys never land here;
/// those are absorbed in SQL by `ON CONFLICT ... DO NOTHING`.
#[derive(Debug)]
pub enum ChunkError {
    /// Lock contention on the store (SQLITE_BUSY / SQLITE_LOCKED).
    Transient(rusqlite::Error),
    /// The chunk's own data tripped a non-key constraint or type check.
    Data(rusqlite::Error),
}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkError::Transient(e) => write!(f, "transient store error: {}", e),
            ChunkError::Data(e) => write!(f, "chunk data error: {}", e),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Transient(e) | ChunkError::Data(e) => Some(e),
        }
    }
}

/// Retry only transient failures, with linear backoff. Data errors are final
/// for the chunk they hit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

pub fn write_teachers(
    conn: &Connection,
    retry: RetryPolicy,
    chunk: &[TeacherRecord],
) -> Result<ChunkStats, ChunkError> {
    if chunk.is_empty() {
        return Ok(ChunkStats::default());
    }
    run_with_retry(conn, retry, "teachers", |c| {
        let mut stmt = c.prepare_cached(
            "INSERT INTO teachers(teacher_id, teacher_name, mobile, district, service_type, training_group)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(mobile) DO NOTHING",
        )?;
        let mut stats = ChunkStats::default();
        for r in chunk {
            let changed = stmt.execute((
                &r.teacher_id,
                &r.teacher_name,
                &r.mobile,
                &r.district,
                &r.service_type,
                &r.training_group,
            ))?;
            tally(&mut stats, changed);
        }
        Ok(stats)
    })
}

pub fn write_batches(
    conn: &Connection,
    retry: RetryPolicy,
    chunk: &[BatchRecord],
) -> Result<ChunkStats, ChunkError> {
    if chunk.is_empty() {
        return Ok(ChunkStats::default());
    }
    run_with_retry(conn, retry, "batches", |c| {
        let mut stmt = c.prepare_cached(
            "INSERT INTO batches(batch_name, district, coordinator_name, service_type, training_group)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(batch_name) DO NOTHING",
        )?;
        let mut stats = ChunkStats::default();
        for r in chunk {
            let changed = stmt.execute((
                &r.batch_name,
                &r.district,
                &r.coordinator_name,
                &r.service_type,
                &r.training_group,
            ))?;
            tally(&mut stats, changed);
        }
        Ok(stats)
    })
}

pub fn write_links(
    conn: &Connection,
    retry: RetryPolicy,
    chunk: &[LinkRecord],
) -> Result<ChunkStats, ChunkError> {
    if chunk.is_empty() {
        return Ok(ChunkStats::default());
    }
    run_with_retry(conn, retry, "batch_teachers", |c| {
        let mut stmt = c.prepare_cached(
            "INSERT INTO batch_teachers(batch_name, teacher_mobile, teacher_name, district)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(batch_name, teacher_mobile) DO NOTHING",
        )?;
        let mut stats = ChunkStats::default();
        for r in chunk {
            let changed = stmt.execute((
                &r.batch_name,
                &r.teacher_mobile,
                &r.teacher_name,
                &r.district,
            ))?;
            tally(&mut stats, changed);
        }
        Ok(stats)
    })
}

fn tally(stats: &mut ChunkStats, changed: usize) {
    if changed == 0 {
        stats.skipped += 1;
    } else {
        stats.inserted += 1;
    }
}

/// One transaction per attempt: commit on success, roll back on any failure
/// so a bad chunk leaves no partial state behind.
fn run_with_retry<F>(
    conn: &Connection,
    retry: RetryPolicy,
    table: &str,
    body: F,
) -> Result<ChunkStats, ChunkError>
where
    F: Fn(&Connection) -> rusqlite::Result<ChunkStats>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match write_once(conn, &body) {
            Ok(stats) => return Ok(stats),
            Err(err) => match classify(err) {
                ChunkError::Transient(e) if attempt < max_attempts => {
                    warn!(
                        "attempt {} on {} chunk hit transient error, retrying: {}",
                        attempt, table, e
                    );
                    std::thread::sleep(retry.backoff * attempt);
                    attempt += 1;
                }
                final_err => return Err(final_err),
            },
        }
    }
}

fn write_once<F>(conn: &Connection, body: &F) -> rusqlite::Result<ChunkStats>
where
    F: Fn(&Connection) -> rusqlite::Result<ChunkStats>,
{
    let tx = conn.unchecked_transaction()?;
    match body(&tx) {
        Ok(stats) => {
            tx.commit()?;
            Ok(stats)
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn classify(err: rusqlite::Error) -> ChunkError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if matches!(
            e.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return ChunkError::Transient(err);
        }
    }
    ChunkError::Data(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn busy_and_locked_classify_as_transient() {
        assert!(matches!(
            classify(failure(rusqlite::ffi::SQLITE_BUSY)),
            ChunkError::Transient(_)
        ));
        assert!(matches!(
            classify(failure(rusqlite::ffi::SQLITE_LOCKED)),
            ChunkError::Transient(_)
        ));
    }

    #[test]
    fn constraint_violation_classifies_as_data() {
        assert!(matches!(
            classify(failure(rusqlite::ffi::SQLITE_CONSTRAINT)),
            ChunkError::Data(_)
        ));
    }
}
