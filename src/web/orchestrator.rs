//! Fan-out of the page worker over every search candidate.
//!
//! One thread per candidate. Every candidate gets exactly one outcome slot,
//! in candidate order: a failing, panicking or overdue page only ever
//! affects its own slot.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::types::WebCandidate;
use crate::web::worker::{PageExtraction, PageWorker};

/// A page that produced no extraction.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{url}: {error}")]
pub struct FetchFailure {
    pub url: String,
    pub error: String,
}

pub type FetchOutcome = Result<PageExtraction, FetchFailure>;

pub struct FetchOrchestrator {
    worker: Arc<dyn PageWorker>,
    /// Slots still running after this long are reported as timed out
    deadline: Option<Duration>,
}

impl FetchOrchestrator {
    pub fn new(worker: Arc<dyn PageWorker>, deadline: Option<Duration>) -> Self {
        Self { worker, deadline }
    }

    /// Work every candidate concurrently and wait for all of them.
    pub fn run(&self, query: &str, candidates: &[WebCandidate], max_chars: usize) -> Vec<FetchOutcome> {
        if candidates.is_empty() {
            return vec![];
        }

        let started = Instant::now();
        let (tx, rx) = mpsc::channel::<(usize, FetchOutcome)>();

        for (slot, candidate) in candidates.iter().enumerate() {
            let slot_tx = tx.clone();
            let worker = self.worker.clone();
            let query = query.to_string();
            let candidate = candidate.clone();

            let spawned = thread::Builder::new()
                .name(format!("fetch-{slot}"))
                .spawn(move || {
                    let outcome = work(worker.as_ref(), &query, &candidate, max_chars);
                    // receiver is gone once the deadline passed
                    let _ = slot_tx.send((slot, outcome));
                });

            if let Err(err) = spawned {
                log::error!("failed to spawn fetch thread for {}: {err}", candidates[slot].url);
                let _ = tx.send((
                    slot,
                    Err(FetchFailure {
                        url: candidates[slot].url.clone(),
                        error: format!("could not start worker: {err}"),
                    }),
                ));
            }
        }
        drop(tx);

        let mut slots: Vec<Option<FetchOutcome>> = vec![None; candidates.len()];
        let mut pending = candidates.len();

        while pending > 0 {
            let received = match self.deadline {
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                        break;
                    };
                    match rx.recv_timeout(remaining) {
                        Ok(msg) => msg,
                        Err(_) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };

            let (slot, outcome) = received;
            if slots[slot].is_none() {
                pending -= 1;
            }
            slots[slot] = Some(outcome);
        }

        if pending > 0 {
            log::warn!("{pending} of {} pages did not finish in time", candidates.len());
        }

        let outcomes: Vec<FetchOutcome> = slots
            .into_iter()
            .zip(candidates)
            .map(|(slot, candidate)| {
                slot.unwrap_or_else(|| {
                    Err(FetchFailure {
                        url: candidate.url.clone(),
                        error: "timed out".to_string(),
                    })
                })
            })
            .collect();

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        log::info!(
            "fetched pages={} failed={failed} took={}ms",
            outcomes.len(),
            started.elapsed().as_millis()
        );

        outcomes
    }
}

fn work(worker: &dyn PageWorker, query: &str, candidate: &WebCandidate, max_chars: usize) -> FetchOutcome {
    let url = &candidate.url;
    let result = catch_unwind(AssertUnwindSafe(|| {
        worker.fetch_and_extract(query, url, &candidate.snippet, max_chars)
    }));

    match result {
        Ok(Ok(extraction)) => Ok(extraction),
        Ok(Err(err)) => {
            log::warn!("page failed url={url} err={err}");
            Err(FetchFailure {
                url: url.clone(),
                error: err.to_string(),
            })
        }
        Err(_) => {
            log::error!("page worker panicked url={url}");
            Err(FetchFailure {
                url: url.clone(),
                error: "worker panicked".to_string(),
            })
        }
    }
}
