use anyhow::Context;
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::ChunkBuffer;
use crate::decode::{decode_row, BatchRecord, LinkRecord, SeenBatches, TeacherRecord};
use crate::writer::{self, ChunkStats, RetryPolicy};

/// Flush thresholds and progress cadence for one run. Batches flush far more
/// eagerly than teachers/links since they are rarer and a small chunk keeps
/// the open-transaction window short.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub teacher_chunk: usize,
    pub batch_chunk: usize,
    pub link_chunk: usize,
    pub progress_every: usize,
    pub retry: RetryPolicy,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            teacher_chunk: 1000,
            batch_chunk: 50,
            link_chunk: 1000,
            progress_every: 5000,
            retry: RetryPolicy::default(),
        }
    }
}

impl ImportOptions {
    /// Defaults with environment overrides for operators tuning a run.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(v) = env_usize("BATCHLOAD_TEACHER_CHUNK") {
            opts.teacher_chunk = v;
        }
        if let Some(v) = env_usize("BATCHLOAD_BATCH_CHUNK") {
            opts.batch_chunk = v;
        }
        if let Some(v) = env_usize("BATCHLOAD_LINK_CHUNK") {
            opts.link_chunk = v;
        }
        if let Some(v) = env_usize("BATCHLOAD_PROGRESS_EVERY") {
            opts.progress_every = v;
        }
        opts
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

/// Per-table counters accumulated over the whole run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TableTally {
    pub candidates: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub chunks_written: usize,
    pub chunks_discarded: usize,
    pub rows_discarded: usize,
}

/// Read-only aggregate counts taken after the final flush. Reporting only;
/// a failure here never fails the run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Verification {
    pub teacher_rows: i64,
    pub distinct_districts: i64,
    pub batch_rows: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub source_sha256: String,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub teachers: TableTally,
    pub batches: TableTally,
    pub links: TableTally,
    pub verified: Option<Verification>,
}

/// Import one delimited file end to end. Fatal only when the source file
/// cannot be read; row rejections and chunk failures are absorbed into the
/// report.
pub fn run_import(
    conn: &Connection,
    csv_path: &Path,
    opts: &ImportOptions,
) -> anyhow::Result<ImportReport> {
    let source_sha256 = file_sha256(csv_path)
        .with_context(|| format!("failed to read input file {}", csv_path.to_string_lossy()))?;
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open input file {}", csv_path.to_string_lossy()))?;
    run_stream(conn, file, source_sha256, opts)
}

/// The streaming pipeline behind `run_import`, split out so tests can drive
/// it from any reader.
pub fn run_stream(
    conn: &Connection,
    source: impl Read,
    source_sha256: String,
    opts: &ImportOptions,
) -> anyhow::Result<ImportReport> {
    let started = std::time::Instant::now();
    let started_at = Utc::now().to_rfc3339();
    let run_id = Uuid::new_v4().to_string();

    println!("Starting import (run {})...", run_id);

    // First line is a header; short rows come through as records for the
    // decoder to reject rather than as reader errors.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let mut seen = SeenBatches::new();
    let mut teacher_buf: ChunkBuffer<TeacherRecord> = ChunkBuffer::new(opts.teacher_chunk);
    let mut batch_buf: ChunkBuffer<BatchRecord> = ChunkBuffer::new(opts.batch_chunk);
    let mut link_buf: ChunkBuffer<LinkRecord> = ChunkBuffer::new(opts.link_chunk);

    let mut rows_read = 0usize;
    let mut rows_skipped = 0usize;
    let mut teachers = TableTally::default();
    let mut batches = TableTally::default();
    let mut links = TableTally::default();

    for record in rdr.records() {
        rows_read += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                rows_skipped += 1;
                warn!("skipping unreadable row {}: {}", rows_read, e);
                continue;
            }
        };

        match decode_row(&record, &mut seen) {
            Some(decoded) => {
                teachers.candidates += 1;
                if let Some(chunk) = teacher_buf.push(decoded.teacher) {
                    apply_chunk(conn, opts.retry, "teachers", &chunk, writer::write_teachers, &mut teachers);
                }
                if let Some(b) = decoded.batch {
                    batches.candidates += 1;
                    if let Some(chunk) = batch_buf.push(b) {
                        apply_chunk(conn, opts.retry, "batches", &chunk, writer::write_batches, &mut batches);
                    }
                }
                if let Some(l) = decoded.link {
                    links.candidates += 1;
                    if let Some(chunk) = link_buf.push(l) {
                        apply_chunk(conn, opts.retry, "batch_teachers", &chunk, writer::write_links, &mut links);
                    }
                }
            }
            None => {
                rows_skipped += 1;
                debug!("rejected row {}", rows_read);
            }
        }

        if opts.progress_every > 0 && rows_read % opts.progress_every == 0 {
            println!("Processed {} rows...", rows_read);
        }
    }

    // Final flush: whatever is still buffered goes out even below threshold.
    apply_chunk(conn, opts.retry, "teachers", &teacher_buf.drain(), writer::write_teachers, &mut teachers);
    apply_chunk(conn, opts.retry, "batches", &batch_buf.drain(), writer::write_batches, &mut batches);
    apply_chunk(conn, opts.retry, "batch_teachers", &link_buf.drain(), writer::write_links, &mut links);

    let verified = match verify_counts(conn) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("verification queries failed: {}", e);
            None
        }
    };

    Ok(ImportReport {
        run_id,
        started_at,
        elapsed_ms: started.elapsed().as_millis() as u64,
        source_sha256,
        rows_read,
        rows_skipped,
        teachers,
        batches,
        links,
        verified,
    })
}

/// Send one chunk through the writer; a failed chunk is discarded with a
/// warning and the run moves on.
fn apply_chunk<T>(
    conn: &Connection,
    retry: RetryPolicy,
    table: &str,
    chunk: &[T],
    write: fn(&Connection, RetryPolicy, &[T]) -> Result<ChunkStats, writer::ChunkError>,
    tally: &mut TableTally,
) {
    if chunk.is_empty() {
        return;
    }
    match write(conn, retry, chunk) {
        Ok(stats) => {
            tally.inserted += stats.inserted;
            tally.skipped_existing += stats.skipped;
            tally.chunks_written += 1;
        }
        Err(e) => {
            warn!("discarding {} chunk of {} records: {}", table, chunk.len(), e);
            tally.chunks_discarded += 1;
            tally.rows_discarded += chunk.len();
        }
    }
}

fn verify_counts(conn: &Connection) -> anyhow::Result<Verification> {
    let teacher_rows = conn.query_row("SELECT COUNT(*) FROM teachers", [], |r| r.get(0))?;
    let distinct_districts =
        conn.query_row("SELECT COUNT(DISTINCT district) FROM teachers", [], |r| {
            r.get(0)
        })?;
    let batch_rows = conn.query_row("SELECT COUNT(*) FROM batches", [], |r| r.get(0))?;
    Ok(Verification {
        teacher_rows,
        distinct_districts,
        batch_rows,
    })
}

fn file_sha256(path: &Path) -> anyhow::Result<String> {
    let mut f = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut f, &mut hasher)?;
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    Ok(out)
}

pub fn print_report(report: &ImportReport) {
    println!("\nImport completed!");
    println!(
        "Rows read: {} ({} skipped)",
        report.rows_read, report.rows_skipped
    );
    println!(
        "Teachers: {} inserted, {} already present",
        report.teachers.inserted, report.teachers.skipped_existing
    );
    println!(
        "Batches: {} inserted, {} already present",
        report.batches.inserted, report.batches.skipped_existing
    );
    println!(
        "Batch-teacher links: {} inserted, {} already present",
        report.links.inserted, report.links.skipped_existing
    );

    let discarded_chunks = report.teachers.chunks_discarded
        + report.batches.chunks_discarded
        + report.links.chunks_discarded;
    let discarded_rows = report.teachers.rows_discarded
        + report.batches.rows_discarded
        + report.links.rows_discarded;
    if discarded_chunks > 0 {
        println!(
            "Warning: {} chunks ({} records) were discarded and are missing from the counts above",
            discarded_chunks, discarded_rows
        );
    }

    if let Some(v) = &report.verified {
        println!("Total teachers: {}", v.teacher_rows);
        println!("Total districts: {}", v.distinct_districts);
        println!("Total batches: {}", v.batch_rows);
    }
    println!("Source SHA-256: {}", report.source_sha256);
    println!("Elapsed: {} ms", report.elapsed_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_replace_defaults() {
        std::env::set_var("BATCHLOAD_TEACHER_CHUNK", "250");
        std::env::set_var("BATCHLOAD_BATCH_CHUNK", "not-a-number");
        let opts = ImportOptions::from_env();
        std::env::remove_var("BATCHLOAD_TEACHER_CHUNK");
        std::env::remove_var("BATCHLOAD_BATCH_CHUNK");

        assert_eq!(opts.teacher_chunk, 250);
        // Unparseable values fall back to the default.
        assert_eq!(opts.batch_chunk, 50);
    }

    #[test]
    fn default_thresholds_match_observed_policy() {
        let opts = ImportOptions::default();
        assert_eq!(opts.teacher_chunk, 1000);
        assert_eq!(opts.link_chunk, 1000);
        assert_eq!(opts.batch_chunk, 50);
        assert_eq!(opts.progress_every, 5000);
    }
}
