use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::dispatcher::{self, DispatchEvent};
use crate::probe::options::RequestOptions;
use crate::probe::transport::{HttpProbeResponse, NetTransport, ProbeTransport, TransportError};
use crate::probe::{MatchStatus, ProbeConfig, ProbeExecutor, ProbeOutcome};
use crate::ratelimit::RateGate;
use crate::runner::{Options, Runner, WordlistSource};

/// Deterministic transport keyed by resolved URL; unknown URLs 404.
struct MapTransport {
    responses: HashMap<String, HttpProbeResponse>,
    hits: AtomicUsize,
}

impl MapTransport {
    fn new(entries: &[(&str, u16, u64)]) -> Self {
        let responses = entries
            .iter()
            .map(|(url, status, size)| {
                (
                    url.to_string(),
                    HttpProbeResponse {
                        status: *status,
                        size: *size,
                    },
                )
            })
            .collect();
        Self {
            responses,
            hits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProbeTransport for MapTransport {
    async fn http(
        &self,
        url: &str,
        _options: &RequestOptions,
    ) -> Result<HttpProbeResponse, TransportError> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .responses
            .get(url)
            .copied()
            .unwrap_or(HttpProbeResponse {
                status: 404,
                size: 0,
            }))
    }

    async fn tcp_connect(&self, _host: &str, _port: u16) -> Result<(), TransportError> {
        Err(TransportError::Failed("http-only transport".to_string()))
    }
}

/// Counts connect attempts and always refuses.
struct RefusingTcpTransport {
    attempts: AtomicUsize,
}

#[async_trait]
impl ProbeTransport for RefusingTcpTransport {
    async fn http(
        &self,
        _url: &str,
        _options: &RequestOptions,
    ) -> Result<HttpProbeResponse, TransportError> {
        Err(TransportError::Failed("tcp-only transport".to_string()))
    }

    async fn tcp_connect(&self, _host: &str, _port: u16) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(TransportError::Failed("connection refused".to_string()))
    }
}

/// Panics on first use, standing in for a worker-context fault.
struct PanickingTransport;

#[async_trait]
impl ProbeTransport for PanickingTransport {
    async fn http(
        &self,
        _url: &str,
        _options: &RequestOptions,
    ) -> Result<HttpProbeResponse, TransportError> {
        panic!("worker context fault");
    }

    async fn tcp_connect(&self, _host: &str, _port: u16) -> Result<(), TransportError> {
        panic!("worker context fault");
    }
}

fn scenario_options(words: &[&str]) -> Options {
    Options {
        target: "http://example.test/FUZZ".to_string(),
        wordlist: WordlistSource::Inline(words.iter().map(|s| s.to_string()).collect()),
        filter_codes: [404].into_iter().collect(),
        workers: 2,
        ..Default::default()
    }
}

async fn run_scenario(
    options: Options,
    transport: Arc<dyn ProbeTransport>,
) -> (crate::runner::ScanResult, Vec<DispatchEvent>) {
    let runner = Runner::new(options).unwrap();
    let wordlist = crate::runner::load_wordlist(&runner.options().wordlist)
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::channel::<DispatchEvent>(1024);
    let drain = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });
    let result = runner
        .run_with_transport(wordlist, transport, tx)
        .await
        .unwrap();
    (result, drain.await.unwrap())
}

#[test]
fn partitioning_round_trips_for_all_shapes() {
    for total in [0usize, 1, 2, 7, 100, 101] {
        let wordlist: Vec<String> = (0..total).map(|i| format!("w{i}")).collect();
        for workers in 1..=12 {
            let chunks = dispatcher::split_chunks(&wordlist, workers);
            assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), total);
            let rejoined: Vec<String> = chunks.into_iter().flatten().collect();
            assert_eq!(rejoined, wordlist, "total={total} workers={workers}");
        }
    }
}

#[tokio::test]
async fn end_to_end_scenario_reports_duplicate_matches() {
    let transport = Arc::new(MapTransport::new(&[
        ("http://example.test/admin", 200, 10),
        ("http://example.test/login", 404, 0),
    ]));
    let options = scenario_options(&["admin", "login", "admin"]);
    let (result, events) = run_scenario(options, transport).await;

    assert_eq!(result.total_words, 3);
    assert_eq!(result.completed, 3);
    assert_eq!(result.matches.len(), 2);
    for record in result.matches.iter() {
        assert_eq!(record.url, "http://example.test/admin");
        assert_eq!(record.status, MatchStatus::Http(200));
        assert_eq!(record.size, 10);
    }

    let progress: u64 = events
        .iter()
        .map(|e| match e {
            DispatchEvent::Progress(count) => *count,
            DispatchEvent::Match(_) => 0,
        })
        .sum();
    assert_eq!(progress, 3);
}

#[tokio::test]
async fn identical_runs_produce_identical_match_sets() {
    let entries = [
        ("http://example.test/admin", 200, 10),
        ("http://example.test/backup", 200, 77),
        ("http://example.test/login", 404, 0),
    ];
    let words = ["admin", "login", "backup", "missing", "admin"];

    let mut observed = Vec::new();
    for _ in 0..2 {
        let transport = Arc::new(MapTransport::new(&entries));
        let (result, _) = run_scenario(scenario_options(&words), transport).await;
        let mut urls: Vec<String> = result.matches.iter().map(|m| m.url.clone()).collect();
        urls.sort();
        observed.push((urls, result.completed));
    }
    assert_eq!(observed[0], observed[1]);
}

#[tokio::test]
async fn every_word_is_probed_exactly_once_across_workers() {
    let words: Vec<String> = (0..500).map(|i| format!("w{i}")).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let transport = Arc::new(MapTransport::new(&[]));
    let mut options = scenario_options(&word_refs);
    options.workers = 7;
    options.retries = 1;
    let (result, _) = run_scenario(options, transport.clone()).await;

    assert_eq!(result.completed, 500);
    // One attempt per word: 404 resolves without retrying.
    assert_eq!(transport.hits.load(Ordering::Relaxed), 500);
}

#[tokio::test]
async fn open_port_yields_one_match_per_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let _ = listener.accept().await;
        }
    });

    let transport = Arc::new(NetTransport::new(Duration::from_millis(2000), None).unwrap());
    let mut options = scenario_options(&["127.0.0.1"]);
    options.target = "FUZZ".to_string();
    options.tcp_port = Some(port);
    let (result, _) = run_scenario(options, transport).await;

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].status, MatchStatus::TcpOpen);
    assert_eq!(result.matches[0].url, "127.0.0.1");
}

#[tokio::test]
async fn refused_port_is_no_match_without_retry() {
    let transport = Arc::new(RefusingTcpTransport {
        attempts: AtomicUsize::new(0),
    });
    let executor = ProbeExecutor::new(
        ProbeConfig {
            target: "FUZZ.example.test".to_string(),
            options: RequestOptions::default(),
            filter_codes: [404].into_iter().collect(),
            filesize_filter: 0,
            spoof_ip: false,
            retries: 4,
            tcp_port: Some(9),
        },
        transport.clone(),
        Arc::new(RateGate::new(u64::MAX)),
    );

    assert_eq!(executor.probe("refused").await, ProbeOutcome::NoMatch);
    assert_eq!(transport.attempts.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn worker_context_fault_is_fatal_for_the_run() {
    let transport = Arc::new(PanickingTransport);
    let options = scenario_options(&["admin"]);
    let runner = Runner::new(options).unwrap();
    let (tx, _rx) = mpsc::channel::<DispatchEvent>(1024);

    let err = runner
        .run_with_transport(vec!["admin".to_string()], transport, tx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("worker context crashed"));
}
