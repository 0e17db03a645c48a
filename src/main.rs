//! CLI entry point. Positional dataset root directory, `-p <port>` /
//! `-p<port>` flag (default 9001), matching the original's argument
//! parsing (SPEC_FULL §10.3) rather than pulling in a CLI framework the
//! teacher crate doesn't carry.

use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_PORT: u16 = 9001;

struct Args {
    root: PathBuf,
    port: u16,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut root = None;
    let mut port = DEFAULT_PORT;
    while let Some(arg) = argv.next() {
        if let Some(rest) = arg.strip_prefix("-p") {
            let value = if rest.is_empty() {
                argv.next().ok_or("-p requires a port number")?
            } else {
                rest.to_string()
            };
            port = value.parse().map_err(|_| format!("invalid port `{value}`"))?;
        } else {
            root = Some(PathBuf::from(arg));
        }
    }
    Ok(Args {
        root: root.ok_or("missing dataset root directory argument")?,
        port,
    })
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("usage: coldataset-server [-p <port>] <dataset-root>");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = runtime.block_on(coldataset::server::run(&args.root, args.port)) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_as_separate_argument() {
        let args = parse_args(vec!["-p".to_string(), "9100".to_string(), "/tmp/ds".to_string()].into_iter()).unwrap();
        assert_eq!(args.port, 9100);
        assert_eq!(args.root, PathBuf::from("/tmp/ds"));
    }

    #[test]
    fn parses_port_glued_to_flag() {
        let args = parse_args(vec!["-p9100".to_string(), "/tmp/ds".to_string()].into_iter()).unwrap();
        assert_eq!(args.port, 9100);
    }

    #[test]
    fn defaults_port_when_omitted() {
        let args = parse_args(vec!["/tmp/ds".to_string()].into_iter()).unwrap();
        assert_eq!(args.port, DEFAULT_PORT);
    }

    #[test]
    fn rejects_missing_root() {
        assert!(parse_args(std::iter::empty()).is_err());
    }
}
