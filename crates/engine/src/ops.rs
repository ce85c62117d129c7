use crate::engine::EngineInner;
use crate::ignore::IgnorePatterns;
use crate::walker::{collect_files, WalkedFile};
use crate::worker::{execute_batch, FileWork};
use chrono::Utc;
use docsentry_extract::{classify, extract, extract_text, fingerprint_file, ExtractError};
use docsentry_protocol::{OperationSnapshot, OperationStatus, SimilarityConfig, SkipCounts, ThreadingConfig};
use docsentry_similarity::{best_match, term_counts, CorpusEntry, SparseVector, TermCounts, Vocabulary};
use docsentry_storage::{NewDocument, NewScanResult, StorageBackend, StorageError};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Everything one operation needs, snapshotted at start time. Config
/// mutations made while the operation runs do not affect it.
pub(crate) struct OperationContext {
    pub inner: Arc<EngineInner>,
    pub id: String,
    pub directory: PathBuf,
    pub similarity: SimilarityConfig,
    pub threading: ThreadingConfig,
    pub ignore: Arc<IgnorePatterns>,
    pub storage: Arc<dyn StorageBackend>,
}

#[derive(Debug, Clone)]
enum SkipReason {
    Ignored,
    Unchanged,
    Extraction(String),
    Read(String),
}

enum IndexOutcome {
    Indexed(Box<NewDocument>),
    Skipped(PathBuf, SkipReason),
}

enum ScanOutcome {
    Matched(Box<NewScanResult>),
    NoMatch(PathBuf),
    Skipped(PathBuf, SkipReason),
}

fn note_skip(counts: &mut SkipCounts, reason: &SkipReason) {
    match reason {
        SkipReason::Ignored => counts.ignored += 1,
        SkipReason::Unchanged => counts.unchanged += 1,
        SkipReason::Extraction(_) => counts.extraction_failed += 1,
        SkipReason::Read(_) => counts.read_failed += 1,
    }
}

/// Update the live snapshot and persist it to operation history.
async fn publish(ctx: &OperationContext, mutate: impl FnOnce(&mut OperationSnapshot)) {
    let Some(snapshot) = ctx.inner.progress.update(&ctx.id, mutate) else {
        return;
    };
    let storage = Arc::clone(&ctx.storage);
    let persisted =
        tokio::task::spawn_blocking(move || storage.put_operation(&snapshot)).await;
    match persisted {
        Ok(Err(e)) => log::warn!("operation {} history write failed: {e}", ctx.id),
        Err(e) => log::warn!("operation {} history task failed: {e}", ctx.id),
        Ok(Ok(())) => {}
    }
}

async fn fail(ctx: &OperationContext, message: String) {
    log::error!("operation {} failed: {message}", ctx.id);
    publish(ctx, |s| {
        s.status = OperationStatus::Error;
        s.error_message = Some(message);
        s.completed_at = Some(Utc::now());
        s.current_file.clear();
    })
    .await;
}

/// Run a blocking storage closure off the async thread.
async fn with_storage<T: Send + 'static>(
    storage: Arc<dyn StorageBackend>,
    f: impl FnOnce(&dyn StorageBackend) -> Result<T, StorageError> + Send + 'static,
) -> Result<T, String> {
    match tokio::task::spawn_blocking(move || f(storage.as_ref())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("storage task failed: {e}")),
    }
}

async fn enumerate(ctx: &OperationContext) -> Result<Vec<WalkedFile>, String> {
    publish(ctx, |s| s.status = OperationStatus::Counting).await;

    let root = ctx.directory.clone();
    let ignore = Arc::clone(&ctx.ignore);
    tokio::task::spawn_blocking(move || collect_files(&root, &ignore))
        .await
        .map_err(|e| format!("directory enumeration failed: {e}"))
}

/// Split one batch into pre-skipped (ignored) outcomes and paths for the
/// worker pool.
fn split_batch<T>(
    chunk: &[WalkedFile],
    skipped: impl Fn(PathBuf) -> T,
) -> (Vec<T>, Vec<PathBuf>) {
    let mut pre = Vec::new();
    let mut to_run = Vec::new();
    for file in chunk {
        if file.ignored {
            pre.push(skipped(file.path.clone()));
        } else {
            to_run.push(file.path.clone());
        }
    }
    (pre, to_run)
}

// ---------------------------------------------------------------------------
// Index operations
// ---------------------------------------------------------------------------

pub(crate) async fn run_index(ctx: OperationContext) {
    if let Err(message) = drive_index(&ctx).await {
        fail(&ctx, message).await;
    }
}

async fn drive_index(ctx: &OperationContext) -> Result<(), String> {
    let files = enumerate(ctx).await?;
    let total = files.len() as u64;
    publish(ctx, |s| {
        s.status = OperationStatus::Processing;
        s.total_files = total;
    })
    .await;

    let stop = ctx.inner.progress.stop_flag(&ctx.id);
    let vocabulary = ctx.inner.vocabulary();

    let work: FileWork<IndexOutcome> = {
        let storage = Arc::clone(&ctx.storage);
        let config = ctx.similarity.clone();
        let vocabulary = Arc::clone(&vocabulary);
        Arc::new(move |path| index_file(path, storage.as_ref(), &config, &vocabulary))
    };
    let on_failure: FileWork<IndexOutcome> = Arc::new(|path| {
        IndexOutcome::Skipped(
            path.to_path_buf(),
            SkipReason::Extraction("extraction worker panicked".to_string()),
        )
    });

    let mut stopped = false;
    for chunk in files.chunks(ctx.threading.batch_size.max(1)) {
        if stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            stopped = true;
            break;
        }

        let (mut outcomes, to_run) = split_batch(chunk, |path| {
            IndexOutcome::Skipped(path, SkipReason::Ignored)
        });
        outcomes
            .extend(execute_batch(ctx.threading, to_run, Arc::clone(&work), Arc::clone(&on_failure)).await);

        // Single writer: batch results land in storage serially even when
        // extraction ran in parallel.
        let mut documents = Vec::new();
        let mut skips: Vec<SkipReason> = Vec::new();
        let mut last_file = String::new();
        for outcome in outcomes {
            match outcome {
                IndexOutcome::Indexed(doc) => {
                    last_file.clone_from(&doc.path);
                    documents.push(*doc);
                }
                IndexOutcome::Skipped(path, reason) => {
                    last_file = path.display().to_string();
                    if let SkipReason::Extraction(detail) | SkipReason::Read(detail) = &reason {
                        log::debug!("skipped {}: {detail}", path.display());
                    }
                    skips.push(reason);
                }
            }
        }

        let indexed = documents.len() as u64;
        with_storage(Arc::clone(&ctx.storage), move |storage| {
            for doc in &documents {
                storage.upsert_document(doc)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| format!("storage write failed: {e}"))?;

        let processed = chunk.len() as u64;
        publish(ctx, |s| {
            s.files_processed += processed;
            s.files_indexed += indexed;
            s.files_skipped += skips.len() as u64;
            for reason in &skips {
                note_skip(&mut s.skip_counts, reason);
            }
            s.current_file = last_file;
        })
        .await;
    }

    if stopped {
        log::info!("index operation {} stopped by operator", ctx.id);
        publish(ctx, |s| {
            s.status = OperationStatus::Stopped;
            s.completed_at = Some(Utc::now());
            s.current_file.clear();
        })
        .await;
        return Ok(());
    }

    // Corpus changed: re-fit the vocabulary and rewrite every stored vector
    // before the operation is observable as completed.
    refit_vocabulary(ctx)
        .await
        .map_err(|e| format!("vocabulary refit failed: {e}"))?;

    publish(ctx, |s| {
        s.status = OperationStatus::Completed;
        s.completed_at = Some(Utc::now());
        s.current_file.clear();
    })
    .await;
    Ok(())
}

fn index_file(
    path: &Path,
    storage: &dyn StorageBackend,
    config: &SimilarityConfig,
    vocabulary: &Vocabulary,
) -> IndexOutcome {
    let skipped = |reason| IndexOutcome::Skipped(path.to_path_buf(), reason);

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => return skipped(SkipReason::Read(e.to_string())),
    };
    let last_modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0.0, |d| d.as_secs_f64());

    let path_str = path.to_string_lossy().into_owned();
    let kind = classify(path);

    // Unmodified files with an up-to-date record are skipped; a comparable
    // file missing its vector is re-indexed.
    match storage.document_by_path(&path_str) {
        Ok(Some(existing)) => {
            let unchanged = (existing.last_modified - last_modified).abs() < 1e-6;
            if unchanged && (existing.vector.is_some() || !kind.is_extractable()) {
                return skipped(SkipReason::Unchanged);
            }
        }
        Ok(None) => {}
        Err(e) => log::warn!("lookup failed for {path_str}: {e}"),
    }

    let extraction = match extract(path, config.min_content_length) {
        Ok(extraction) => extraction,
        Err(ExtractError::ReadFailure(e)) => return skipped(SkipReason::Read(e.to_string())),
        Err(e) => return skipped(SkipReason::Extraction(e.to_string())),
    };

    let (vector, counts) = if extraction.comparable {
        let counts = term_counts(&extraction.text, config.ngram_min, config.ngram_max);
        let vector = vocabulary.transform(&counts);
        (Some(vector), Some(counts))
    } else {
        (None, None)
    };

    IndexOutcome::Indexed(Box::new(NewDocument {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.clone()),
        path: path_str,
        size_bytes: extraction.size_bytes,
        fingerprint: extraction.fingerprint,
        vector,
        term_counts: counts,
        last_modified,
    }))
}

async fn refit_vocabulary(ctx: &OperationContext) -> Result<(), String> {
    let storage = Arc::clone(&ctx.storage);
    let config = ctx.similarity.clone();
    let next_version = ctx.inner.vocabulary().version() + 1;

    let vocabulary = with_storage(storage, move |storage| {
        let corpus = storage.fetch_corpus()?;
        let documents: Vec<&TermCounts> =
            corpus.iter().filter_map(|r| r.term_counts.as_ref()).collect();
        let vocabulary = Vocabulary::fit(&documents, &config, next_version);

        let updates: Vec<(i64, SparseVector)> = corpus
            .iter()
            .filter_map(|r| {
                r.term_counts
                    .as_ref()
                    .map(|tc| (r.id, vocabulary.transform(tc)))
            })
            .collect();
        storage.rewrite_vectors(&updates)?;
        Ok(vocabulary)
    })
    .await?;

    log::info!(
        "vocabulary v{} active: {} terms",
        vocabulary.version(),
        vocabulary.len()
    );
    ctx.inner.swap_vocabulary(Arc::new(vocabulary));
    Ok(())
}

// ---------------------------------------------------------------------------
// Scan operations
// ---------------------------------------------------------------------------

pub(crate) async fn run_scan(ctx: OperationContext) {
    if let Err(message) = drive_scan(&ctx).await {
        fail(&ctx, message).await;
    }
}

async fn drive_scan(ctx: &OperationContext) -> Result<(), String> {
    let files = enumerate(ctx).await?;

    // The comparison set is whatever was committed when the scan starts; a
    // concurrently running index neither blocks this scan nor feeds it
    // mid-flight writes.
    let corpus: Arc<Vec<CorpusEntry>> = Arc::new(
        with_storage(Arc::clone(&ctx.storage), |storage| {
            Ok(storage
                .fetch_corpus()?
                .into_iter()
                .map(|r| CorpusEntry {
                    id: r.id,
                    fingerprint: r.fingerprint,
                    vector: r.vector,
                })
                .collect())
        })
        .await
        .map_err(|e| format!("indexed corpus unavailable: {e}"))?,
    );
    let vocabulary = ctx.inner.vocabulary();

    let total = files.len() as u64;
    publish(ctx, |s| {
        s.status = OperationStatus::Scanning;
        s.total_files = total;
    })
    .await;

    let stop = ctx.inner.progress.stop_flag(&ctx.id);
    let work: FileWork<ScanOutcome> = {
        let corpus = Arc::clone(&corpus);
        let vocabulary = Arc::clone(&vocabulary);
        let config = ctx.similarity.clone();
        Arc::new(move |path| scan_file(path, &corpus, &vocabulary, &config))
    };
    let on_failure: FileWork<ScanOutcome> = Arc::new(|path| {
        ScanOutcome::Skipped(
            path.to_path_buf(),
            SkipReason::Extraction("extraction worker panicked".to_string()),
        )
    });

    let mut stopped = false;
    for chunk in files.chunks(ctx.threading.batch_size.max(1)) {
        if stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            stopped = true;
            break;
        }

        let (mut outcomes, to_run) =
            split_batch(chunk, |path| ScanOutcome::Skipped(path, SkipReason::Ignored));
        outcomes
            .extend(execute_batch(ctx.threading, to_run, Arc::clone(&work), Arc::clone(&on_failure)).await);

        let mut matches = Vec::new();
        let mut skips: Vec<SkipReason> = Vec::new();
        let mut last_file = String::new();
        for outcome in outcomes {
            match outcome {
                ScanOutcome::Matched(result) => {
                    last_file.clone_from(&result.file_path);
                    matches.push(*result);
                }
                ScanOutcome::NoMatch(path) => last_file = path.display().to_string(),
                ScanOutcome::Skipped(path, reason) => {
                    last_file = path.display().to_string();
                    skips.push(reason);
                }
            }
        }

        let found = matches.len() as u64;
        let scan_id = ctx.id.clone();
        with_storage(Arc::clone(&ctx.storage), move |storage| {
            for mut result in matches {
                result.scan_id.clone_from(&scan_id);
                let id = storage.add_scan_result(&result)?;
                log::info!(
                    "{} match: {} -> indexed file {} (result {id}, score {:.3})",
                    result.match_kind,
                    result.file_path,
                    result.matched_file_id,
                    result.score
                );
            }
            Ok(())
        })
        .await
        .map_err(|e| format!("storage write failed: {e}"))?;

        let processed = chunk.len() as u64;
        publish(ctx, |s| {
            s.files_processed += processed;
            s.matches_found += found;
            s.files_skipped += skips.len() as u64;
            for reason in &skips {
                note_skip(&mut s.skip_counts, reason);
            }
            s.current_file = last_file;
        })
        .await;
    }

    let final_status = if stopped {
        log::info!("scan operation {} stopped by operator", ctx.id);
        OperationStatus::Stopped
    } else {
        OperationStatus::Completed
    };
    publish(ctx, |s| {
        s.status = final_status;
        s.completed_at = Some(Utc::now());
        s.current_file.clear();
    })
    .await;
    Ok(())
}

fn scan_file(
    path: &Path,
    corpus: &[CorpusEntry],
    vocabulary: &Vocabulary,
    config: &SimilarityConfig,
) -> ScanOutcome {
    let skipped = |reason| ScanOutcome::Skipped(path.to_path_buf(), reason);

    let fingerprint = match fingerprint_file(path) {
        Ok((fingerprint, _)) => fingerprint,
        Err(e) => return skipped(SkipReason::Read(e.to_string())),
    };

    // Exact check first: identical bytes match without any parsing.
    if let Some(outcome) = best_match(&fingerprint, None, corpus, config) {
        return ScanOutcome::Matched(Box::new(NewScanResult {
            scan_id: String::new(),
            file_path: path.display().to_string(),
            match_kind: outcome.kind,
            score: outcome.score,
            matched_file_id: outcome.matched_id,
        }));
    }

    let kind = classify(path);
    if !kind.is_extractable() {
        return ScanOutcome::NoMatch(path.to_path_buf());
    }

    let text = match extract_text(path, kind) {
        Ok(text) => text,
        Err(ExtractError::ReadFailure(e)) => return skipped(SkipReason::Read(e.to_string())),
        Err(e) => return skipped(SkipReason::Extraction(e.to_string())),
    };
    if text.trim().chars().count() < config.min_content_length {
        return ScanOutcome::NoMatch(path.to_path_buf());
    }

    let counts = term_counts(&text, config.ngram_min, config.ngram_max);
    let vector = vocabulary.transform(&counts);

    match best_match(&fingerprint, Some(&vector), corpus, config) {
        Some(outcome) => ScanOutcome::Matched(Box::new(NewScanResult {
            scan_id: String::new(),
            file_path: path.display().to_string(),
            match_kind: outcome.kind,
            score: outcome.score,
            matched_file_id: outcome.matched_id,
        })),
        None => ScanOutcome::NoMatch(path.to_path_buf()),
    }
}
