use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::probe::{MatchRecord, ProbeExecutor, ProbeOutcome};

/// Messages a worker context streams back to the dispatcher.
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    /// Completed-probe count, matches and no-matches alike.
    Progress(u64),
    Match(MatchRecord),
    /// Emitted exactly once, after every entry of the chunk is terminal.
    Done,
}

/// Claim-and-increment index into a worker's chunk. The only way pool loops
/// pick up work, so each index is handed out at most once.
pub struct SharedCursor {
    next: AtomicUsize,
    len: usize,
}

impl SharedCursor {
    pub fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
        }
    }

    pub fn claim_next(&self) -> Option<usize> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        (idx < self.len).then_some(idx)
    }
}

pub struct WorkerContext {
    pub chunk: Vec<String>,
    pub pool_size: usize,
    pub executor: Arc<ProbeExecutor>,
    pub events: mpsc::Sender<WorkerEvent>,
}

/// Drains one chunk through `pool_size` concurrent probe loops sharing a
/// cursor, then signals completion.
pub async fn run_worker(ctx: WorkerContext) {
    let WorkerContext {
        chunk,
        pool_size,
        executor,
        events,
    } = ctx;

    let _ = events.send(WorkerEvent::Progress(0)).await;

    let chunk = Arc::new(chunk);
    let cursor = Arc::new(SharedCursor::new(chunk.len()));

    let mut loops = FuturesUnordered::new();
    for _ in 0..pool_size.max(1) {
        let chunk = Arc::clone(&chunk);
        let cursor = Arc::clone(&cursor);
        let executor = Arc::clone(&executor);
        let events = events.clone();
        loops.push(probe_loop(chunk, cursor, executor, events));
    }
    while loops.next().await.is_some() {}

    let _ = events.send(WorkerEvent::Done).await;
}

async fn probe_loop(
    chunk: Arc<Vec<String>>,
    cursor: Arc<SharedCursor>,
    executor: Arc<ProbeExecutor>,
    events: mpsc::Sender<WorkerEvent>,
) {
    while let Some(idx) = cursor.claim_next() {
        let word = &chunk[idx];
        let outcome = executor.probe(word).await;
        if let ProbeOutcome::Match(record) = outcome {
            if events.send(WorkerEvent::Match(record)).await.is_err() {
                return;
            }
        }
        if events.send(WorkerEvent::Progress(1)).await.is_err() {
            return;
        }
    }
}
