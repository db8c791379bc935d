pub mod options;
pub mod transport;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time;

use crate::ratelimit::RateGate;
use self::options::RequestOptions;
use self::transport::{ProbeTransport, TransportError};

/// How a candidate matched: a non-filtered HTTP status, or an open TCP port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStatus {
    Http(u16),
    TcpOpen,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchRecord {
    pub url: String,
    pub status: MatchStatus,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Match(MatchRecord),
    NoMatch,
}

#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Target template carrying the placeholder.
    pub target: String,
    pub options: RequestOptions,
    pub filter_codes: HashSet<u16>,
    pub filesize_filter: u64,
    pub spoof_ip: bool,
    pub retries: u32,
    /// TCP mode when set; the port is fixed for the whole run.
    pub tcp_port: Option<u16>,
}

/// Runs one probe per candidate word: placeholder substitution, rate gating
/// per attempt, retry with exponential backoff on transient HTTP failures, a
/// single connect attempt in TCP mode.
pub struct ProbeExecutor {
    config: ProbeConfig,
    transport: Arc<dyn ProbeTransport>,
    gate: Arc<RateGate>,
}

impl ProbeExecutor {
    pub fn new(config: ProbeConfig, transport: Arc<dyn ProbeTransport>, gate: Arc<RateGate>) -> Self {
        Self {
            config,
            transport,
            gate,
        }
    }

    pub async fn probe(&self, word: &str) -> ProbeOutcome {
        let url = options::substitute(&self.config.target, word);
        match self.config.tcp_port {
            Some(port) => self.probe_tcp(url, port).await,
            None => self.probe_http(url, word).await,
        }
    }

    /// TCP probes are a single attempt: a failed connect is definitive, only
    /// HTTP probes enter the retry loop.
    async fn probe_tcp(&self, url: String, port: u16) -> ProbeOutcome {
        self.gate.wait().await;
        let host = url.split(':').next().unwrap_or(url.as_str()).to_string();
        match self.transport.tcp_connect(&host, port).await {
            Ok(()) => ProbeOutcome::Match(MatchRecord {
                url,
                status: MatchStatus::TcpOpen,
                size: 0,
            }),
            Err(_) => ProbeOutcome::NoMatch,
        }
    }

    async fn probe_http(&self, url: String, word: &str) -> ProbeOutcome {
        for attempt in 0..self.config.retries {
            self.gate.wait().await;

            let mut opts = options::resolve(&self.config.options, word);
            if self.config.spoof_ip {
                let ip = options::random_spoof_ip();
                opts.headers
                    .insert("X-Forwarded-For".to_string(), ip.clone());
                opts.headers.insert("X-Real-IP".to_string(), ip);
            }

            let response = match self.transport.http(&url, &opts).await {
                Ok(response) => response,
                Err(TransportError::TimedOut) => {
                    if attempt + 1 < self.config.retries {
                        backoff(attempt).await;
                        continue;
                    }
                    return ProbeOutcome::NoMatch;
                }
                // Hard transport faults (resolution, refusal, TLS) are
                // definitive, not transient.
                Err(TransportError::Failed(_)) => return ProbeOutcome::NoMatch,
            };

            // The remote is shedding load; always retry, up to the attempt cap.
            if response.status == 429 {
                backoff(attempt).await;
                continue;
            }
            if self.config.filter_codes.contains(&response.status) {
                return ProbeOutcome::NoMatch;
            }
            if !(200..300).contains(&response.status) {
                if attempt + 1 < self.config.retries {
                    backoff(attempt).await;
                    continue;
                }
                return ProbeOutcome::NoMatch;
            }
            if response.size == self.config.filesize_filter {
                return ProbeOutcome::NoMatch;
            }
            return ProbeOutcome::Match(MatchRecord {
                url,
                status: MatchStatus::Http(response.status),
                size: response.size,
            });
        }
        ProbeOutcome::NoMatch
    }
}

/// `100 * 2^attempt` ms plus up to a second of jitter.
async fn backoff(attempt: u32) {
    let jitter = rand::thread_rng().gen_range(0..1000u64);
    let base = 100u64.saturating_mul(2u64.saturating_pow(attempt));
    time::sleep(Duration::from_millis(base.saturating_add(jitter))).await;
}
