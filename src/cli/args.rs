use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fuzzbuster",
    version,
    about = "fast web & TCP fuzzer",
    long_about = "Fuzzbuster is a fast web & TCP fuzzer designed for brute-forcing directories, subdomains, and files on web servers.\n\nExamples:\n  fuzzbuster https://target.tld/FUZZ -w wordlist.txt\n  fuzzbuster https://FUZZ.target.tld/ -w subdomains.txt -rpm 60000\n  fuzzbuster target.tld --tcp 22 -w hosts.txt\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(
        value_name = "URL",
        help_heading = "Input",
        help = "Target URL or host template (use FUZZ as the placeholder)."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Wordlist path (one candidate per line)."
    )]
    pub wordlist: Option<String>,

    #[arg(
        short = 'o',
        long = "opts",
        value_name = "JSON",
        help_heading = "Input",
        help = "Request options in JSON (use FUZZ as a placeholder, if applicable)."
    )]
    pub opts: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.fuzzbuster/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'c',
        long = "filtercodes",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Status codes to omit from results (comma-separated)."
    )]
    pub filtercodes: Option<String>,

    #[arg(
        long = "filesize",
        visible_alias = "fs",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Response size in bytes to filter out of results."
    )]
    pub filesize: Option<u64>,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of workers to use (defaults to the logical core count)."
    )]
    pub threads: Option<usize>,

    #[arg(
        short = 'p',
        long = "parallel",
        value_name = "N",
        help_heading = "Performance",
        help = "Parallel requests per worker when not ratelimiting."
    )]
    pub parallel: Option<usize>,

    #[arg(
        long = "requests-per-minute",
        visible_alias = "rpm",
        value_name = "RPM",
        help_heading = "Performance",
        help = "Maximum aggregate requests per minute."
    )]
    pub requests_per_minute: Option<u64>,

    #[arg(
        long = "timeout",
        value_name = "MS",
        help_heading = "Performance",
        help = "Request timeout in milliseconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "retries",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of attempts for a failed request."
    )]
    pub retries: Option<u32>,

    #[arg(
        long = "output-file",
        visible_alias = "out",
        value_name = "FILE",
        help_heading = "Output",
        help = "File where results will be stored (CSV)."
    )]
    pub output_file: Option<String>,

    #[arg(
        long = "verbose",
        help_heading = "Output",
        help = "Forward a verbose flag into the request options, useful for debugging."
    )]
    pub verbose: bool,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Route requests through a proxy."
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "spoofip",
        help_heading = "HTTP",
        help = "Set X-Forwarded-For and X-Real-IP headers with a random fake IP."
    )]
    pub spoofip: bool,

    #[arg(
        long = "tcp",
        value_name = "PORT",
        help_heading = "TCP",
        help = "Use a TCP connect probe on the given port instead of HTTP."
    )]
    pub tcp: Option<u32>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check the release feed for a newer version.
    Update,
}
