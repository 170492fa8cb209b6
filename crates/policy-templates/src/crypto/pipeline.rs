//! Bounded-concurrency decryption of protected values
//!
//! Workers pull occurrences from a shared queue and report `(index, result)`
//! on a results channel sized to the number of occurrences, so a worker never
//! blocks on a send while the consumer is still reading. The first failure
//! cancels every worker and fails the whole batch; partial results are
//! dropped.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::CipherError;
use crate::error::{TemplateError, TemplateResult};

/// One protected value found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Discovery order, left to right
    pub index: usize,
    /// Byte offset of the marker in the source text
    pub start: usize,
    /// Byte offset one past the end of the payload
    pub end: usize,
    /// Marker plus payload, as it appears in the text
    pub literal: String,
    /// Base64 ciphertext
    pub payload: String,
}

struct DecryptTask {
    index: usize,
    payload: String,
}

struct DecryptResult {
    index: usize,
    outcome: Result<String, CipherError>,
}

/// Decrypts a batch of occurrences with at most `concurrency` workers.
#[derive(Debug, Clone, Copy)]
pub struct DecryptionPipeline {
    concurrency: usize,
}

impl DecryptionPipeline {
    /// A limit of 0 or 1 processes occurrences sequentially.
    pub fn new(concurrency: u8) -> Self {
        Self {
            concurrency: usize::from(concurrency),
        }
    }

    /// Number of workers spawned for `occurrences` values
    pub fn worker_count(&self, occurrences: usize) -> usize {
        self.concurrency.min(occurrences).max(1)
    }

    /// Decrypt every occurrence.
    ///
    /// Returns the plaintexts ordered like `occurrences`, independent of the
    /// order in which workers finished.
    pub async fn resolve_all<F>(
        &self,
        occurrences: &[Occurrence],
        decrypt: F,
    ) -> TemplateResult<Vec<String>>
    where
        F: Fn(&str) -> Result<String, CipherError> + Send + Sync + 'static,
    {
        let total = occurrences.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let workers = self.worker_count(total);
        debug!("Will decrypt {} value(s) with {} worker(s)", total, workers);

        let decrypt = Arc::new(decrypt);
        let (task_tx, task_rx) = mpsc::channel::<DecryptTask>(total);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<DecryptResult>(total);

        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            pool.spawn(decrypt_worker(
                task_rx.clone(),
                result_tx.clone(),
                decrypt.clone(),
                cancel.child_token(),
            ));
        }
        drop(result_tx);

        for (index, occurrence) in occurrences.iter().enumerate() {
            let task = DecryptTask {
                index,
                payload: occurrence.payload.clone(),
            };
            if task_tx.send(task).await.is_err() {
                break;
            }
        }
        // Idle workers exit once the queue drains.
        drop(task_tx);

        let mut plaintexts: Vec<Option<String>> = vec![None; total];
        let mut received = 0;

        while received < total {
            let Some(result) = result_rx.recv().await else {
                break;
            };

            match result.outcome {
                Ok(plaintext) => {
                    plaintexts[result.index] = Some(plaintext);
                    received += 1;
                }
                Err(source) => {
                    cancel.cancel();
                    pool.abort_all();

                    let occurrence = occurrences[result.index].literal.clone();
                    error!("Decryption of {} failed: {}", occurrence, source);
                    return Err(TemplateError::Decryption { occurrence, source });
                }
            }
        }

        let mut resolved = Vec::with_capacity(total);
        for (occurrence, plaintext) in occurrences.iter().zip(plaintexts) {
            match plaintext {
                Some(plaintext) => resolved.push(plaintext),
                None => {
                    return Err(TemplateError::Decryption {
                        occurrence: occurrence.literal.clone(),
                        source: CipherError::Backend(
                            "decryption worker exited before producing a result".to_string(),
                        ),
                    });
                }
            }
        }

        debug!("Finished decrypting {} value(s)", total);
        Ok(resolved)
    }
}

async fn decrypt_worker<F>(
    queue: Arc<Mutex<mpsc::Receiver<DecryptTask>>>,
    results: mpsc::Sender<DecryptResult>,
    decrypt: Arc<F>,
    cancel: CancellationToken,
) where
    F: Fn(&str) -> Result<String, CipherError> + Send + Sync + 'static,
{
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            task = async { queue.lock().await.recv().await } => task,
        };

        let Some(task) = task else {
            return;
        };
        if cancel.is_cancelled() {
            return;
        }

        // The cipher is CPU bound; running it off the async thread also lets
        // the consumer observe a failure before the next task is started.
        let decrypt = decrypt.clone();
        let payload = task.payload;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            joined = tokio::task::spawn_blocking(move || decrypt(&payload)) => match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(CipherError::Backend(format!("decryption task failed: {}", e))),
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = results.send(DecryptResult { index: task.index, outcome }) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn occurrences(payloads: &[&str]) -> Vec<Occurrence> {
        payloads
            .iter()
            .enumerate()
            .map(|(index, payload)| Occurrence {
                index,
                start: 0,
                end: 0,
                literal: format!("$ocm_encrypted:{}", payload),
                payload: payload.to_string(),
            })
            .collect()
    }

    fn upper(payload: &str) -> Result<String, CipherError> {
        Ok(payload.to_uppercase())
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(DecryptionPipeline::new(0).worker_count(5), 1);
        assert_eq!(DecryptionPipeline::new(1).worker_count(5), 1);
        assert_eq!(DecryptionPipeline::new(3).worker_count(5), 3);
        assert_eq!(DecryptionPipeline::new(8).worker_count(5), 5);
        assert_eq!(DecryptionPipeline::new(8).worker_count(0), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let resolved = DecryptionPipeline::new(4)
            .resolve_all(&[], upper)
            .await
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_results_follow_discovery_order() {
        let occ = occurrences(&["a", "b", "c", "d", "e"]);
        for limit in [0u8, 1, 2, 5, 16] {
            let resolved = DecryptionPipeline::new(limit)
                .resolve_all(&occ, upper)
                .await
                .unwrap();
            assert_eq!(resolved, vec!["A", "B", "C", "D", "E"], "limit {}", limit);
        }
    }

    #[tokio::test]
    async fn test_duplicates_are_resolved_independently() {
        let occ = occurrences(&["same", "same", "same"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let resolved = DecryptionPipeline::new(2)
            .resolve_all(&occ, move |payload| {
                counter.fetch_add(1, Ordering::SeqCst);
                upper(payload)
            })
            .await
            .unwrap();

        assert_eq!(resolved, vec!["SAME", "SAME", "SAME"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_error_fails_batch() {
        let occ = occurrences(&["ok1", "bad", "ok2", "ok3"]);
        for limit in [1u8, 2, 4] {
            let err = DecryptionPipeline::new(limit)
                .resolve_all(&occ, |payload| {
                    if payload == "bad" {
                        Err(CipherError::InvalidPadding)
                    } else {
                        upper(payload)
                    }
                })
                .await
                .unwrap_err();

            match err {
                TemplateError::Decryption { occurrence, source } => {
                    assert_eq!(occurrence, "$ocm_encrypted:bad");
                    assert_eq!(source, CipherError::InvalidPadding);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    /// Runs a batch whose first value fails; returns how many decrypts ran.
    async fn calls_after_first_failure(limit: u8) -> usize {
        let payloads: Vec<String> = (0..20).map(|i| format!("p{}", i)).collect();
        let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
        let occ = occurrences(&refs);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let err = DecryptionPipeline::new(limit)
            .resolve_all(&occ, move |payload| {
                counter.fetch_add(1, Ordering::SeqCst);
                if payload == "p0" {
                    return Err(CipherError::InvalidPadding);
                }
                std::thread::sleep(Duration::from_millis(5));
                upper(payload)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::Decryption { .. }));
        calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_work_current_thread() {
        for limit in [1u8, 2, 4] {
            let calls = calls_after_first_failure(limit).await;
            assert!(calls < 20, "limit {} decrypted {} of 20", limit, calls);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_stops_remaining_work_multi_thread() {
        for limit in [1u8, 2, 4] {
            let calls = calls_after_first_failure(limit).await;
            assert!(calls < 20, "limit {} decrypted {} of 20", limit, calls);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let occ = occurrences(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());

        let resolved = DecryptionPipeline::new(2)
            .resolve_all(&occ, move |payload| {
                let now = in_flight_c.fetch_add(1, Ordering::SeqCst) + 1;
                peak_c.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                in_flight_c.fetch_sub(1, Ordering::SeqCst);
                upper(payload)
            })
            .await
            .unwrap();

        assert_eq!(resolved.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
