//! Upload engine: chunk planning and parallel posting
//!
//! Planning is single-threaded: parts are read in ordinal order, sliced
//! into article-sized chunks and numbered globally 1..C. Execution fans the
//! job list out to `max_connections` workers; each worker leases a client,
//! joins the group, yEnc-encodes the chunk, renders the subject and runs one
//! POST transaction. The first error closes the job queue; already-completed
//! segments are drained and the error is surfaced.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{PostingConfig, ServerConfig};
use crate::error::{PostError, Result};
use crate::pool::NntpPool;
use crate::segments::Segment;
use crate::splitter::{sha256_file, FilePart};
use crate::subject::{self, SubjectVars};
use crate::yenc;

/// Sink for upload progress events
///
/// Implementations must be cheap and thread-safe; workers call
/// [`chunk_posted`](Self::chunk_posted) from every task.
pub trait ProgressSink: Send + Sync {
    /// One chunk was accepted by the server
    fn chunk_posted(&self, chunk_number: u32, bytes: u64);
    /// Every chunk of the batch was posted
    fn completed(&self) {}
}

/// Sink that swallows all events
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn chunk_posted(&self, _chunk_number: u32, _bytes: u64) {}
}

/// One article-sized unit of work
#[derive(Debug, Clone)]
struct Job {
    payload: Vec<u8>,
    part_ordinal: u32,
    part_total: u32,
    chunk_number: u32,
    total_chunks: u32,
    file_name: String,
    total_bytes: u64,
}

/// Posting parameters shared by all workers
struct WorkerContext {
    pool: NntpPool,
    group: String,
    from: String,
    subject_template: String,
    line_length: usize,
    custom_headers: BTreeMap<String, String>,
}

/// Upload all `parts` through `pool`, returning the posted segments
///
/// `workers` normally equals the server's `max_connections`; the pool caps
/// concurrent sockets either way.
///
/// # Errors
///
/// The first worker error is returned after in-flight successes drain. Part
/// hash mismatches surface as [`PostError::ChecksumMismatch`] before any
/// article is posted for that part.
pub async fn upload_parts(
    pool: &NntpPool,
    server: &ServerConfig,
    parts: &[FilePart],
    posting: &PostingConfig,
    progress: Arc<dyn ProgressSink>,
) -> Result<Vec<Segment>> {
    let jobs = plan_jobs(parts, posting.effective_article_size()).await?;
    let total_jobs = jobs.len();
    if total_jobs == 0 {
        return Ok(Vec::new());
    }

    let workers = server.max_connections.max(1) as usize;
    info!(
        chunks = total_jobs,
        workers, "Starting parallel upload"
    );

    // All jobs are queued up front; the channel doubles as the work list
    let (job_tx, job_rx) = mpsc::channel::<Job>(total_jobs);
    for job in jobs {
        job_tx.send(job).await.map_err(|_| {
            PostError::Io(std::io::Error::other("job queue closed during planning"))
        })?;
    }
    drop(job_tx);
    let job_rx = Arc::new(Mutex::new(job_rx));

    let (result_tx, mut result_rx) = mpsc::channel::<Result<Segment>>(total_jobs);

    let context = Arc::new(WorkerContext {
        pool: pool.clone(),
        group: posting.group.clone(),
        from: posting.from_header(),
        subject_template: posting.subject_template.clone(),
        line_length: posting.max_line_length,
        custom_headers: posting.custom_headers.clone(),
    });

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let context = context.clone();
        let progress = progress.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else { break };

                match post_chunk(&context, &job).await {
                    Ok(segment) => {
                        progress.chunk_posted(job.chunk_number, job.payload.len() as u64);
                        if result_tx.send(Ok(segment)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(worker_id, chunk = job.chunk_number, "Failed to upload chunk: {}", e);
                        let _ = result_tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        }));
    }
    drop(result_tx);

    let mut segments: Vec<Segment> = Vec::with_capacity(total_jobs);
    let mut first_error: Option<PostError> = None;

    while let Some(outcome) = result_rx.recv().await {
        match outcome {
            Ok(segment) => segments.push(segment),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                    // Cancel pending work: close the queue AND throw away
                    // the buffered jobs (close alone still lets receivers
                    // drain them)
                    let mut rx = job_rx.lock().await;
                    rx.close();
                    while rx.try_recv().is_ok() {}
                }
            }
        }
    }

    for handle in handles {
        let _ = handle.await;
    }

    if let Some(e) = first_error {
        warn!(
            posted = segments.len(),
            total = total_jobs,
            "Upload aborted after first error"
        );
        return Err(e);
    }

    progress.completed();
    info!(chunks = segments.len(), "Upload complete");
    Ok(segments)
}

/// Read parts, verify their hashes and slice them into numbered jobs
async fn plan_jobs(parts: &[FilePart], max_article_size: u64) -> Result<Vec<Job>> {
    let max_article_size = max_article_size.max(1) as usize;
    let total_bytes: u64 = parts.iter().map(|p| p.len).sum();
    let part_total = parts.len() as u32;

    let mut jobs = Vec::new();
    let mut chunk_number = 0u32;

    for part in parts {
        let data = tokio::fs::read(&part.path).await?;

        // The part was hashed as it was written; refuse to post anything
        // that changed on disk since
        let actual = sha256_file(&part.path)?;
        if actual != part.sha256 {
            return Err(PostError::ChecksumMismatch(format!(
                "part {} changed on disk (expected {}, found {})",
                part.path.display(),
                part.sha256,
                actual
            )));
        }

        for chunk in data.chunks(max_article_size) {
            chunk_number += 1;
            jobs.push(Job {
                payload: chunk.to_vec(),
                part_ordinal: part.ordinal,
                part_total,
                chunk_number,
                total_chunks: 0, // patched below once C is known
                file_name: part.file_name.clone(),
                total_bytes,
            });
        }
    }

    let total_chunks = jobs.len() as u32;
    for job in &mut jobs {
        job.total_chunks = total_chunks;
    }

    debug!(parts = parts.len(), chunks = total_chunks, "Planned upload jobs");
    Ok(jobs)
}

/// Post a single chunk: lease, join, encode, render subject, POST
async fn post_chunk(context: &WorkerContext, job: &Job) -> Result<Segment> {
    let mut client = context.pool.acquire().await?;
    client.join_group(&context.group).await?;

    let encoded = yenc::encode(
        &job.payload,
        &job.file_name,
        job.part_ordinal,
        job.part_total,
        context.line_length,
    )?;

    let vars = SubjectVars {
        index: job.part_ordinal,
        total: job.part_total,
        filename: job.file_name.clone(),
        size: subject::human_size(job.total_bytes),
        chunk_index: job.chunk_number,
        total_chunks: job.total_chunks,
    };
    let subject_line = subject::render(&context.subject_template, &vars)
        .unwrap_or_else(|| subject::fallback(&vars));

    let message_id = client
        .post_article(
            &context.group,
            &subject_line,
            &context.from,
            &encoded,
            &context.custom_headers,
        )
        .await?;

    Ok(Segment {
        message_id: message_id
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string(),
        number: job.chunk_number,
        total: job.total_chunks,
        file_name: job.file_name.clone(),
        subject: subject_line,
        posted_at: Utc::now(),
        bytes: job.payload.len() as u64,
    })
}
