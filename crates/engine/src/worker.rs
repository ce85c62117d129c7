use docsentry_protocol::ThreadingConfig;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-file work shared with blocking workers.
pub type FileWork<T> = Arc<dyn Fn(&Path) -> T + Send + Sync>;

/// Process one batch of files, returning exactly one outcome per input.
///
/// With threading disabled the batch runs sequentially on one blocking
/// thread; enabled, files fan out across at most `max_workers` concurrent
/// blocking tasks. Document parsers can panic on malformed input, so every
/// invocation is unwind-caught and `on_failure` supplies the outcome for a
/// crashed worker, so no file is silently dropped.
///
/// Outcome order is not guaranteed to follow input order when parallel.
pub async fn execute_batch<T: Send + 'static>(
    threading: ThreadingConfig,
    batch: Vec<PathBuf>,
    work: FileWork<T>,
    on_failure: FileWork<T>,
) -> Vec<T> {
    if !threading.enabled || threading.max_workers <= 1 || batch.len() <= 1 {
        return run_sequential(batch, work, on_failure).await;
    }

    let semaphore = Arc::new(Semaphore::new(threading.max_workers));
    let mut tasks: JoinSet<T> = JoinSet::new();
    for path in batch {
        let semaphore = Arc::clone(&semaphore);
        let work = Arc::clone(&work);
        let on_failure = Arc::clone(&on_failure);
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return on_failure(&path);
            };
            let work_path = path.clone();
            let worker_failure = Arc::clone(&on_failure);
            let handle =
                tokio::task::spawn_blocking(move || guarded(&work, &work_path, &worker_failure));
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // spawn_blocking only fails on runtime shutdown; the
                    // unwind guard already absorbed worker panics.
                    log::error!("worker task failed for {}: {e}", path.display());
                    on_failure(&path)
                }
            }
        });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => log::error!("worker join failed: {e}"),
        }
    }
    outcomes
}

async fn run_sequential<T: Send + 'static>(
    batch: Vec<PathBuf>,
    work: FileWork<T>,
    on_failure: FileWork<T>,
) -> Vec<T> {
    let handle = tokio::task::spawn_blocking(move || {
        batch
            .iter()
            .map(|path| guarded(&work, path, &on_failure))
            .collect::<Vec<T>>()
    });
    match handle.await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            log::error!("sequential batch task failed: {e}");
            Vec::new()
        }
    }
}

fn guarded<T>(work: &FileWork<T>, path: &Path, on_failure: &FileWork<T>) -> T {
    catch_unwind(AssertUnwindSafe(|| work(path))).unwrap_or_else(|_| {
        log::warn!("extraction panicked for {}", path.display());
        on_failure(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn name_of(path: &Path) -> String {
        path.file_name().unwrap().to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn sequential_processes_every_file() {
        let threading = ThreadingConfig {
            enabled: false,
            ..ThreadingConfig::default()
        };
        let out = execute_batch(
            threading,
            paths(&["a", "b", "c"]),
            Arc::new(name_of),
            Arc::new(|_: &Path| "failed".to_string()),
        )
        .await;
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn parallel_accounts_for_every_file() {
        let threading = ThreadingConfig {
            enabled: true,
            max_workers: 3,
            batch_size: 50,
        };
        let out = execute_batch(
            threading,
            paths(&["a", "b", "c", "d", "e"]),
            Arc::new(name_of),
            Arc::new(|_: &Path| "failed".to_string()),
        )
        .await;
        let unique: HashSet<String> = out.into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[tokio::test]
    async fn panicking_worker_falls_back_instead_of_dropping() {
        let threading = ThreadingConfig {
            enabled: true,
            max_workers: 2,
            batch_size: 50,
        };
        let work: FileWork<String> = Arc::new(|path: &Path| {
            if path.ends_with("boom") {
                panic!("malformed document");
            }
            name_of(path)
        });
        let out = execute_batch(
            threading,
            paths(&["ok", "boom"]),
            work,
            Arc::new(|path: &Path| format!("fallback:{}", name_of(path))),
        )
        .await;

        let set: HashSet<String> = out.into_iter().collect();
        assert!(set.contains("ok"));
        assert!(set.contains("fallback:boom"));
    }
}
