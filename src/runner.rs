use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Instant;

use crate::dispatcher::{self, DispatchConfig, DispatchError, DispatchEvent};
use crate::probe::options::{self, RequestOptions};
use crate::probe::transport::{NetTransport, ProbeTransport};
use crate::probe::MatchRecord;
use crate::utils;

#[derive(Clone, Debug)]
pub enum WordlistSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Target template: an http(s) URL, or a bare host template in TCP mode.
    pub target: String,
    pub wordlist: WordlistSource,
    pub request_options: RequestOptions,
    pub filter_codes: HashSet<u16>,
    pub filesize_filter: u64,
    pub workers: usize,
    pub parallel: usize,
    pub requests_per_minute: u64,
    pub timeout_ms: u64,
    pub retries: u32,
    pub proxy: Option<String>,
    pub spoof_ip: bool,
    pub tcp_port: Option<u16>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            target: String::new(),
            wordlist: WordlistSource::Inline(Vec::new()),
            request_options: RequestOptions::default(),
            filter_codes: [400, 401, 403, 404, 405].into_iter().collect(),
            filesize_filter: 0,
            workers: utils::default_worker_count(),
            parallel: 150,
            requests_per_minute: 1_000_000,
            timeout_ms: 5000,
            retries: 4,
            proxy: None,
            spoof_ip: false,
            tcp_port: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("target is required")]
    MissingTarget,

    #[error("target URL must use http or https when using HTTP mode")]
    MissingHttpScheme,

    #[error("invalid target URL: {url}")]
    InvalidUrl { url: String },

    #[error("TCP mode does not support http/https targets")]
    TcpWithHttpScheme,

    #[error("TCP port must be between 1 and 65535")]
    InvalidTcpPort,

    #[error("FUZZ placeholder not found in URL or request options")]
    MissingPlaceholder,

    #[error("invalid proxy URL: {proxy}")]
    InvalidProxy { proxy: String },

    #[error("failed to open wordlist: {path}: {source}")]
    WordlistOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read wordlist: {path}: {source}")]
    WordlistRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Clone, Debug)]
pub struct ScanResult {
    pub elapsed: Duration,
    pub total_words: usize,
    pub completed: u64,
    pub matches: Vec<MatchRecord>,
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.target.trim().is_empty() {
            return Err(RunnerError::MissingTarget);
        }
        match options.tcp_port {
            Some(port) => {
                if options.target.contains("http://") || options.target.contains("https://") {
                    return Err(RunnerError::TcpWithHttpScheme);
                }
                if port == 0 {
                    return Err(RunnerError::InvalidTcpPort);
                }
            }
            None => {
                if !options.target.starts_with("http://")
                    && !options.target.starts_with("https://")
                {
                    return Err(RunnerError::MissingHttpScheme);
                }
                if reqwest::Url::parse(&options.target).is_err() {
                    return Err(RunnerError::InvalidUrl {
                        url: options.target.clone(),
                    });
                }
                if !options.target.contains(options::PLACEHOLDER)
                    && !options.request_options.contains_placeholder()
                {
                    return Err(RunnerError::MissingPlaceholder);
                }
            }
        }
        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            if reqwest::Url::parse(proxy).is_err() {
                return Err(RunnerError::InvalidProxy {
                    proxy: proxy.to_string(),
                });
            }
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Loads the wordlist, builds the network transport, and runs the scan,
    /// streaming progress and matches through `events` as they arrive.
    pub async fn run(
        &self,
        events: mpsc::Sender<DispatchEvent>,
    ) -> Result<ScanResult, RunnerError> {
        let wordlist = load_wordlist(&self.options.wordlist).await?;
        let transport = NetTransport::new(
            Duration::from_millis(self.options.timeout_ms),
            self.options.proxy.as_deref(),
        )
        .map_err(|source| RunnerError::HttpClientBuild { source })?;
        self.run_with_transport(wordlist, Arc::new(transport), events)
            .await
    }

    /// Same as [`run`](Self::run), with the transport injected. The seam the
    /// deterministic tests drive.
    pub async fn run_with_transport(
        &self,
        wordlist: Vec<String>,
        transport: Arc<dyn ProbeTransport>,
        events: mpsc::Sender<DispatchEvent>,
    ) -> Result<ScanResult, RunnerError> {
        let started_at = Instant::now();
        let total_words = wordlist.len();

        let config = DispatchConfig {
            target: self.options.target.clone(),
            options: self.options.request_options.clone(),
            filter_codes: self.options.filter_codes.clone(),
            filesize_filter: self.options.filesize_filter,
            workers: self.options.workers,
            parallel: self.options.parallel,
            requests_per_minute: self.options.requests_per_minute,
            spoof_ip: self.options.spoof_ip,
            retries: self.options.retries,
            tcp_port: self.options.tcp_port,
        };

        let (event_tx, mut event_rx) = mpsc::channel::<DispatchEvent>(1024);
        let collect_handle = task::spawn(async move {
            let mut matches: Vec<MatchRecord> = Vec::new();
            while let Some(event) = event_rx.recv().await {
                if let DispatchEvent::Match(record) = &event {
                    matches.push(record.clone());
                }
                if events.send(event).await.is_err() {
                    // Caller stopped listening; keep collecting for the result.
                    while let Some(event) = event_rx.recv().await {
                        if let DispatchEvent::Match(record) = event {
                            matches.push(record);
                        }
                    }
                    break;
                }
            }
            matches
        });

        let summary = dispatcher::dispatch(config, wordlist, transport, event_tx).await?;
        let matches = collect_handle.await.unwrap_or_default();

        Ok(ScanResult {
            elapsed: started_at.elapsed(),
            total_words,
            completed: summary.completed,
            matches,
        })
    }
}

pub async fn load_wordlist(source: &WordlistSource) -> Result<Vec<String>, RunnerError> {
    match source {
        WordlistSource::Inline(values) => Ok(values
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()),
        WordlistSource::FilePath(path) => {
            let path = crate::config::expand_tilde_string(path.as_str());
            let handle = File::open(&path)
                .await
                .map_err(|e| RunnerError::WordlistOpen {
                    path: path.clone(),
                    source: e,
                })?;
            let mut out = Vec::new();
            let mut lines = BufReader::new(handle).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        out.push(line.to_string());
                    }
                    Ok(None) => break,
                    Err(e) => {
                        return Err(RunnerError::WordlistRead { path, source: e });
                    }
                }
            }
            Ok(out)
        }
    }
}
