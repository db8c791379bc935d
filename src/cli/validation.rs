use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(port) = args.tcp {
        if !(1..=65535).contains(&port) {
            return Err("TCP port must be between 1 and 65535".to_string());
        }
    }
    if let Some(raw) = args.filtercodes.as_deref() {
        crate::utils::parse_u16_set_csv(raw)
            .map_err(|e| format!("invalid --filtercodes '{raw}': {e}"))?;
    }
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err("invalid --threads, expected positive integer".to_string());
        }
    }
    if let Some(parallel) = args.parallel {
        if parallel == 0 {
            return Err("invalid --parallel, expected positive integer".to_string());
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid --timeout, expected positive milliseconds".to_string());
        }
    }
    if let Some(raw) = args.opts.as_deref() {
        crate::probe::options::RequestOptions::parse(raw)
            .map_err(|_| "Unable to parse options".to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn tcp_port_range_is_enforced() {
        let args = CliArgs::parse_from(["fuzzbuster", "target.tld", "--tcp", "70000"]);
        assert!(validate(&args).is_err());
        let args = CliArgs::parse_from(["fuzzbuster", "target.tld", "--tcp", "22"]);
        assert!(validate(&args).is_ok());
    }

    #[test]
    fn malformed_opts_payload_is_rejected() {
        let args = CliArgs::parse_from(["fuzzbuster", "http://t/FUZZ", "-o", "{not json"]);
        assert!(validate(&args).is_err());
    }
}
