//! Concurrent checksum pipeline: N worker threads tee one read into many digest
//! accumulators, submitted and drained over bounded `std::sync::mpsc` channels.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::thread::JoinHandle;

use crate::ocfl::digest::{DigestAlgorithm, HexDigest, MultiDigestWriter};
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs_capability::CancellationToken;

/// A job submitted to the pipeline: a caller-chosen name plus a way to open the bytes
/// to digest, and the set of algorithms to compute simultaneously.
pub struct ChecksumJob<O> {
    pub name: String,
    pub opener: O,
    pub algorithms: Vec<DigestAlgorithm>,
}

impl<O> ChecksumJob<O> {
    pub fn new(name: impl Into<String>, opener: O, algorithms: Vec<DigestAlgorithm>) -> Self {
        Self {
            name: name.into(),
            opener,
            algorithms,
        }
    }
}

/// The outcome of digesting a single job.
pub struct ChecksumResult {
    pub name: String,
    pub outcome: std::result::Result<std::collections::HashMap<DigestAlgorithm, HexDigest>, OcflError>,
}

/// A pool of worker threads that digest submitted jobs, teeing each byte read into every
/// requested algorithm's accumulator at once.
pub struct ChecksumPipeline<O>
where
    O: FnOnce() -> io::Result<Box<dyn Read>> + Send + 'static,
{
    job_tx: Sender<ChecksumJob<O>>,
    result_rx: Receiver<ChecksumResult>,
    workers: Vec<JoinHandle<()>>,
}

impl<O> ChecksumPipeline<O>
where
    O: FnOnce() -> io::Result<Box<dyn Read>> + Send + 'static,
{
    /// Spawns `worker_count` threads. Channel capacity equals `worker_count`, so a slow
    /// consumer naturally backpressures submission.
    pub fn new(worker_count: usize, cancel: CancellationToken) -> Self {
        let worker_count = worker_count.max(1);

        let (job_tx, job_rx) = mpsc::sync_channel::<ChecksumJob<O>>(worker_count);
        let (result_tx, result_rx) = mpsc::sync_channel::<ChecksumResult>(worker_count);

        // `Receiver` is not `Sync`; share it across workers behind a mutex so each worker
        // pulls the next available job rather than being statically assigned one.
        let job_rx = std::sync::Arc::new(std::sync::Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();

            workers.push(thread::spawn(move || loop {
                let job = {
                    let rx = job_rx.lock().unwrap();
                    rx.recv()
                };

                let job = match job {
                    Ok(job) => job,
                    Err(_) => break,
                };

                if cancel.is_cancelled() {
                    let _ = result_tx.send(ChecksumResult {
                        name: job.name,
                        outcome: Err(OcflError::Cancelled("checksum pipeline".to_string())),
                    });
                    continue;
                }

                let outcome = digest_one(job.opener, &job.algorithms);
                if result_tx
                    .send(ChecksumResult {
                        name: job.name,
                        outcome,
                    })
                    .is_err()
                {
                    break;
                }
            }));
        }

        // Drop our copy so the channel closes once all workers finish.
        drop(result_tx);

        Self {
            job_tx,
            result_rx,
            workers,
        }
    }

    pub fn submit(&self, job: ChecksumJob<O>) -> Result<()> {
        self.job_tx
            .send(job)
            .map_err(|e| OcflError::Wrapped(Box::new(io::Error::new(io::ErrorKind::Other, e.to_string()))))
    }

    pub fn results(&self) -> &Receiver<ChecksumResult> {
        &self.result_rx
    }

    /// Closes the submission side and waits for every in-flight job to drain, returning
    /// every remaining result.
    pub fn shutdown(self) -> Vec<ChecksumResult> {
        drop(self.job_tx);

        let mut remaining = Vec::new();
        while let Ok(result) = self.result_rx.recv() {
            remaining.push(result);
        }

        for worker in self.workers {
            let _ = worker.join();
        }

        remaining
    }
}

fn digest_one<O>(
    opener: O,
    algorithms: &[DigestAlgorithm],
) -> std::result::Result<std::collections::HashMap<DigestAlgorithm, HexDigest>, OcflError>
where
    O: FnOnce() -> io::Result<Box<dyn Read>>,
{
    let mut reader = opener()?;
    let mut writer = MultiDigestWriter::new(algorithms, io::sink());
    io::copy(&mut reader, &mut writer)?;
    Ok(writer.finalize_hex())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    type Opener = Box<dyn FnOnce() -> io::Result<Box<dyn Read>> + Send>;

    #[test]
    fn digests_multiple_jobs_with_multiple_algorithms() {
        let cancel = CancellationToken::new();
        let pipeline: ChecksumPipeline<Opener> = ChecksumPipeline::new(2, cancel);

        for (name, content) in [("a", "hello"), ("b", "world")] {
            let content = content.to_string();
            let opener: Opener = Box::new(move || Ok(Box::new(Cursor::new(content.into_bytes())) as Box<dyn Read>));
            pipeline
                .submit(ChecksumJob::new(
                    name,
                    opener,
                    vec![DigestAlgorithm::Sha256, DigestAlgorithm::Md5],
                ))
                .unwrap();
        }

        let results = pipeline.shutdown();
        assert_eq!(2, results.len());
        for result in results {
            let digests = result.outcome.unwrap();
            assert!(digests.contains_key(&DigestAlgorithm::Sha256));
            assert!(digests.contains_key(&DigestAlgorithm::Md5));
        }
    }

    #[test]
    fn cancellation_surfaces_as_cancelled_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline: ChecksumPipeline<Opener> = ChecksumPipeline::new(1, cancel);

        let opener: Opener = Box::new(|| Ok(Box::new(Cursor::new(b"x".to_vec())) as Box<dyn Read>));
        pipeline
            .submit(ChecksumJob::new("x", opener, vec![DigestAlgorithm::Sha256]))
            .unwrap();

        let results = pipeline.shutdown();
        assert_eq!(1, results.len());
        assert!(matches!(results[0].outcome, Err(OcflError::Cancelled(_))));
    }
}
