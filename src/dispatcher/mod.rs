use std::cmp;
use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task;

use crate::probe::options::RequestOptions;
use crate::probe::transport::ProbeTransport;
use crate::probe::{MatchRecord, ProbeConfig, ProbeExecutor};
use crate::ratelimit::RateGate;
use crate::worker::{self, WorkerContext, WorkerEvent};

/// Below this aggregate rate the intra-worker pool collapses to a single loop.
pub const RATE_PARALLEL_THRESHOLD_RPM: u64 = 100_000;

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub target: String,
    pub options: RequestOptions,
    pub filter_codes: HashSet<u16>,
    pub filesize_filter: u64,
    pub workers: usize,
    pub parallel: usize,
    pub requests_per_minute: u64,
    pub spoof_ip: bool,
    pub retries: u32,
    pub tcp_port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker context crashed: {source}")]
    WorkerCrashed {
        #[source]
        source: task::JoinError,
    },
}

/// Events the dispatcher forwards to its caller, in arrival order.
#[derive(Clone, Debug)]
pub enum DispatchEvent {
    Progress(u64),
    Match(MatchRecord),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchSummary {
    pub completed: u64,
    pub matches: u64,
}

/// Contiguous equal-size partition: `ceil(len / workers)` entries per chunk,
/// the tail chunks shorter or empty. Concatenating the chunks in order
/// reproduces the wordlist exactly.
pub fn split_chunks(wordlist: &[String], workers: usize) -> Vec<Vec<String>> {
    let workers = workers.max(1);
    let chunk_size = (wordlist.len() + workers - 1) / workers;
    let mut out = Vec::with_capacity(workers);
    for i in 0..workers {
        let start = cmp::min(i.saturating_mul(chunk_size), wordlist.len());
        let end = cmp::min(start + chunk_size, wordlist.len());
        out.push(wordlist[start..end].to_vec());
    }
    out
}

/// The aggregate ceiling split evenly across workers, floored at one request
/// per minute.
pub fn per_worker_rate(aggregate_rpm: u64, workers: usize) -> u64 {
    cmp::max(aggregate_rpm / workers.max(1) as u64, 1)
}

/// Intra-worker parallelism is only allowed when the aggregate ceiling is
/// high enough that the rate limit is effectively disabled.
pub fn effective_pool_size(parallel: usize, aggregate_rpm: u64) -> usize {
    if aggregate_rpm >= RATE_PARALLEL_THRESHOLD_RPM {
        parallel.max(1)
    } else {
        1
    }
}

/// Splits the wordlist across worker contexts, streams progress and matches
/// back through `events` as they arrive, and completes only once every worker
/// has signalled `Done`. A worker that dies without finishing its chunk is a
/// fatal error; chunks are never retried.
pub async fn dispatch(
    config: DispatchConfig,
    wordlist: Vec<String>,
    transport: Arc<dyn ProbeTransport>,
    events: mpsc::Sender<DispatchEvent>,
) -> Result<DispatchSummary, DispatchError> {
    let chunks = split_chunks(&wordlist, config.workers);
    let pool_size = effective_pool_size(config.parallel, config.requests_per_minute);
    let worker_rpm = per_worker_rate(config.requests_per_minute, config.workers);

    let (event_tx, mut event_rx) = mpsc::channel::<WorkerEvent>(1024);

    let mut workers = Vec::new();
    for chunk in chunks.into_iter().filter(|chunk| !chunk.is_empty()) {
        let probe_config = ProbeConfig {
            target: config.target.clone(),
            options: config.options.clone(),
            filter_codes: config.filter_codes.clone(),
            filesize_filter: config.filesize_filter,
            spoof_ip: config.spoof_ip,
            retries: config.retries,
            tcp_port: config.tcp_port,
        };
        let executor = Arc::new(ProbeExecutor::new(
            probe_config,
            Arc::clone(&transport),
            Arc::new(RateGate::new(worker_rpm)),
        ));
        let ctx = WorkerContext {
            chunk,
            pool_size,
            executor,
            events: event_tx.clone(),
        };
        workers.push(task::spawn(worker::run_worker(ctx)));
    }
    drop(event_tx);

    let mut summary = DispatchSummary::default();
    let mut done = 0usize;
    while let Some(event) = event_rx.recv().await {
        match event {
            WorkerEvent::Progress(count) => {
                summary.completed += count;
                let _ = events.send(DispatchEvent::Progress(count)).await;
            }
            WorkerEvent::Match(record) => {
                summary.matches += 1;
                let _ = events.send(DispatchEvent::Match(record)).await;
            }
            WorkerEvent::Done => {
                done += 1;
            }
        }
    }

    let spawned = workers.len();
    for handle in workers {
        handle
            .await
            .map_err(|source| DispatchError::WorkerCrashed { source })?;
    }
    debug_assert_eq!(done, spawned);

    Ok(summary)
}
