use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Instant;

use crate::cli::args::{CliArgs, Command};
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::dispatcher::DispatchEvent;
use crate::output;
use crate::probe::options::RequestOptions;
use crate::probe::transport::NetTransport;
use crate::runner::{self, Runner, WordlistSource};
use crate::update::{self, UpdateStatus};
use crate::utils;

const ISSUES_URL: &str = "https://github.com/hexfuzz/fuzzbuster/issues";

fn print_banner() {
    const BANNER: &str = r#"
  __                _               _
 / _|_   _ _______ | |__  _   _ ___| |_ ___ _ __
| |_| | | |_  /_  /| '_ \| | | / __| __/ _ \ '__|
|  _| |_| |/ / / / | |_) | |_| \__ \ ||  __/ |
|_|  \__,_/___/___||_.__/ \__,_|___/\__\___|_|
"#;
    println!("{}", BANNER.magenta().bold());
    println!(
        "       v{} - fast web & TCP fuzzer",
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

#[derive(Clone, Debug)]
struct RunConfig {
    target: String,
    wordlist: String,
    request_options: RequestOptions,
    filter_codes: HashSet<u16>,
    filesize: u64,
    threads: usize,
    parallel: usize,
    requests_per_minute: u64,
    timeout: u64,
    retries: u32,
    output_file: Option<String>,
    proxy: Option<String>,
    spoofip: bool,
    tcp_port: Option<u16>,
    no_color: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);

    let target = args
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| "target URL is required (add --help for additional information)".to_string())?;

    let wordlist = args
        .wordlist
        .or(cfg.wordlist)
        .map(|p| config::expand_tilde_string(&p))
        .ok_or_else(|| {
            "Wordlist required. Please provide it using the -w argument.".to_string()
        })?;

    let filtercodes_raw = args
        .filtercodes
        .or(cfg.filtercodes)
        .unwrap_or_else(|| "400,401,403,404,405".to_string());
    let filter_codes = utils::parse_u16_set_csv(&filtercodes_raw)
        .map_err(|e| format!("invalid --filtercodes '{filtercodes_raw}': {e}"))?;

    let threads = args
        .threads
        .or(cfg.threads)
        .unwrap_or_else(utils::default_worker_count)
        .max(1);
    let parallel = args.parallel.or(cfg.parallel).unwrap_or(150).max(1);
    let requests_per_minute = args
        .requests_per_minute
        .or(cfg.requests_per_minute)
        .unwrap_or(1_000_000);
    let filesize = args.filesize.or(cfg.filesize).unwrap_or(0);
    let timeout = args.timeout.or(cfg.timeout).unwrap_or(5000);
    let retries = args.retries.or(cfg.retries).unwrap_or(4);

    let output_file = args
        .output_file
        .or(cfg.output_file)
        .filter(|p| !p.trim().is_empty())
        .map(|p| config::expand_tilde_string(&p));
    let proxy = args
        .proxy
        .or(cfg.proxy)
        .filter(|p| !p.trim().is_empty());
    let spoofip = args.spoofip || cfg.spoofip.unwrap_or(false);
    let tcp_port = args.tcp.map(|port| port as u16);

    let opts_raw = args.opts.or(cfg.opts).unwrap_or_else(|| "{}".to_string());
    let mut request_options =
        RequestOptions::parse(&opts_raw).map_err(|_| "Unable to parse options".to_string())?;
    if args.verbose {
        request_options.verbose = Some(true);
    }
    if let Some(proxy) = proxy.as_ref() {
        request_options.proxy = Some(proxy.clone());
    }

    Ok(RunConfig {
        target,
        wordlist,
        request_options,
        filter_codes,
        filesize,
        threads,
        parallel,
        requests_per_minute,
        timeout,
        retries,
        output_file,
        proxy,
        spoofip,
        tcp_port,
        no_color,
    })
}

fn print_crash_report(err: &str) {
    eprintln!("{}{} {}", "error".red().bold(), ":".dimmed(), err.bold());
    eprintln!("{}", "┌───────────────────────────────────────┐".dimmed());
    eprintln!(
        "{}      {}        {}",
        "│".dimmed(),
        "Please report this crash:".bold(),
        "│".dimmed()
    );
    eprintln!(
        "{} {} {}",
        "│".dimmed(),
        ISSUES_URL.red().bold(),
        "│".dimmed()
    );
    eprintln!("{}", "└───────────────────────────────────────┘".dimmed());
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let engine_options = runner::Options {
        target: run.target.clone(),
        wordlist: WordlistSource::FilePath(run.wordlist.clone()),
        request_options: run.request_options.clone(),
        filter_codes: run.filter_codes.clone(),
        filesize_filter: run.filesize,
        workers: run.threads,
        parallel: run.parallel,
        requests_per_minute: run.requests_per_minute,
        timeout_ms: run.timeout,
        retries: run.retries,
        proxy: run.proxy.clone(),
        spoof_ip: run.spoofip,
        tcp_port: run.tcp_port,
    };
    let runner = Runner::new(engine_options).map_err(|e| e.to_string())?;

    let wordlist = runner::load_wordlist(&WordlistSource::FilePath(run.wordlist.clone()))
        .await
        .map_err(|e| e.to_string())?;

    let mode = match run.tcp_port {
        Some(_) => "TCP".to_string(),
        None => run
            .request_options
            .method
            .as_deref()
            .unwrap_or("GET")
            .to_uppercase(),
    };
    let display_target = match run.tcp_port {
        Some(port) => format!("{}:{}", run.target, port),
        None => run.target.clone(),
    };
    println!(
        "{}",
        format!("{mode} {display_target} ({} words)", wordlist.len()).dimmed()
    );
    println!();

    let outfile = match run.output_file.as_ref() {
        Some(path) => {
            let mut handle = tokio::fs::File::create(path)
                .await
                .map_err(|e| format!("failed to open output file '{path}': {e}"))?;
            handle
                .write_all(output::CSV_HEADER.as_bytes())
                .await
                .map_err(|e| format!("failed to write output file '{path}': {e}"))?;
            Some(handle)
        }
        None => None,
    };

    let pb = ProgressBar::new(wordlist.len().max(1) as u64);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}]",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );

    let transport = NetTransport::new(
        Duration::from_millis(run.timeout),
        run.proxy.as_deref(),
    )
    .map_err(|e| format!("failed to build HTTP client: {e}"))?;

    let (event_tx, mut event_rx) = mpsc::channel::<DispatchEvent>(1024);
    let printer_pb = pb.clone();
    let printer_handle = task::spawn(async move {
        let mut outfile = outfile;
        let mut results: u64 = 0;
        while let Some(event) = event_rx.recv().await {
            match event {
                DispatchEvent::Progress(count) => {
                    printer_pb.inc(count);
                }
                DispatchEvent::Match(record) => {
                    results += 1;
                    printer_pb.println(output::render_match_line(&record));
                    if let Some(outfile) = outfile.as_mut() {
                        let _ = outfile
                            .write_all(output::csv_record(&record).as_bytes())
                            .await;
                    }
                }
            }
        }
        results
    });

    let started = Instant::now();
    let scan = runner
        .run_with_transport(wordlist, Arc::new(transport), event_tx)
        .await;
    let result = match scan {
        Ok(result) => result,
        Err(e) => {
            pb.finish_and_clear();
            print_crash_report(&e.to_string());
            return Err("fuzzing run aborted".to_string());
        }
    };
    let results_count = printer_handle
        .await
        .unwrap_or(result.matches.len() as u64);
    pb.finish_and_clear();

    println!();
    if results_count == 0 {
        println!("{}", "No results found".red().bold());
    } else {
        println!(
            "{}",
            format!(
                "{} result{} found",
                results_count,
                if results_count == 1 { "" } else { "s" }
            )
            .bold()
        );
    }
    println!(
        "Fuzzing complete {}",
        format!("in {:.2}s", started.elapsed().as_secs_f64()).dimmed()
    );

    Ok(())
}

fn run_update() -> Result<(), String> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;
    rt.block_on(async {
        let current = format!("v{}", env!("CARGO_PKG_VERSION"));
        match update::check(update::RELEASE_FEED, &current).await {
            Ok(UpdateStatus::UpToDate) => {
                println!(
                    "{} You're already on the latest version of fuzzbuster {}",
                    "Congrats!".green(),
                    format!("(which is {current})").dimmed()
                );
                Ok(())
            }
            Ok(UpdateStatus::Available(release)) => {
                let name = release
                    .name
                    .as_deref()
                    .map(|n| format!(" {}", format!("({n})").dimmed()))
                    .unwrap_or_default();
                println!(
                    "{} {}{}",
                    "New version available:".green().bold(),
                    release.tag_name,
                    name
                );
                println!();
                println!("Install at: {}", release.html_url);
                update::open_in_browser(&release.html_url);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    })
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    if let Some(Command::Update) = args.command {
        return run_update();
    }

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));
    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.threads)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::parse_from(argv)
    }

    #[test]
    fn defaults_follow_the_documented_surface() {
        let args = parse(&["fuzzbuster", "http://t/FUZZ", "-w", "words.txt"]);
        let run = build_run_config(args, ConfigFile::default()).unwrap();
        assert_eq!(run.parallel, 150);
        assert_eq!(run.requests_per_minute, 1_000_000);
        assert_eq!(run.timeout, 5000);
        assert_eq!(run.retries, 4);
        assert_eq!(run.filesize, 0);
        assert_eq!(
            run.filter_codes,
            [400, 401, 403, 404, 405].into_iter().collect()
        );
        assert!(run.output_file.is_none());
        assert!(run.tcp_port.is_none());
    }

    #[test]
    fn missing_wordlist_is_a_configuration_fault() {
        let args = parse(&["fuzzbuster", "http://t/FUZZ"]);
        let err = build_run_config(args, ConfigFile::default()).unwrap_err();
        assert!(err.contains("Wordlist required"));
    }

    #[test]
    fn verbose_and_proxy_are_forwarded_into_the_request_options() {
        let args = parse(&[
            "fuzzbuster",
            "http://t/FUZZ",
            "-w",
            "words.txt",
            "--verbose",
            "--proxy",
            "http://127.0.0.1:8080",
        ]);
        let run = build_run_config(args, ConfigFile::default()).unwrap();
        assert_eq!(run.request_options.verbose, Some(true));
        assert_eq!(
            run.request_options.proxy.as_deref(),
            Some("http://127.0.0.1:8080")
        );
    }

    #[test]
    fn config_file_fills_gaps_but_cli_wins() {
        let cfg = ConfigFile {
            retries: Some(9),
            timeout: Some(100),
            ..Default::default()
        };
        let args = parse(&[
            "fuzzbuster",
            "http://t/FUZZ",
            "-w",
            "words.txt",
            "--timeout",
            "250",
        ]);
        let run = build_run_config(args, cfg).unwrap();
        assert_eq!(run.retries, 9);
        assert_eq!(run.timeout, 250);
    }

    #[test]
    fn malformed_opts_are_rejected_before_dispatch() {
        let args = parse(&["fuzzbuster", "http://t/FUZZ", "-w", "w.txt", "-o", "{oops"]);
        assert!(build_run_config(args, ConfigFile::default()).is_err());
    }
}
