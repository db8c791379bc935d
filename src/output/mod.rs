use colored::{ColoredString, Colorize};

use crate::probe::{MatchRecord, MatchStatus};

/// Header written when the result log is truncated at startup.
pub const CSV_HEADER: &str = "code,url,size";

fn escape_url(url: &str) -> String {
    url.replace('"', "\\\"")
}

/// One CSV record per match, appended to the result log. TCP matches record
/// `open` in the status column.
pub fn csv_record(record: &MatchRecord) -> String {
    let status = match record.status {
        MatchStatus::Http(code) => code.to_string(),
        MatchStatus::TcpOpen => "open".to_string(),
    };
    format!("\n{},\"{}\",{}", status, escape_url(&record.url), record.size)
}

/// Human-readable size with two decimals above a kilobyte.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.2}gb", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}mb", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}kb", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}b")
    }
}

/// `[status]` tag colored by status class; `[TCP]` for port matches.
pub fn status_tag(status: MatchStatus) -> ColoredString {
    match status {
        MatchStatus::TcpOpen => "[TCP]".blue(),
        MatchStatus::Http(code) => {
            let tag = format!("[{code}]");
            match code / 100 {
                1 => tag.blue(),
                2 => tag.green(),
                3 => tag.yellow(),
                _ => tag.red(),
            }
        }
    }
}

/// The line printed for one match: colored status tag, URL, optional size.
pub fn render_match_line(record: &MatchRecord) -> String {
    let size = if record.size > 0 {
        format!(" {}", format!("({})", format_size(record.size)).dimmed())
    } else {
        String::new()
    };
    format!("{} {}{}", status_tag(record.status), record.url, size)
}
