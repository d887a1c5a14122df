//! Hand-rolled argument parsing, kept out of main for testability.

use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct ParsedArgs {
    pub sock: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub sar: Option<String>,
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "hangwatch_sampler".into());
    let mut parsed = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                return Err(format!(
                    "Usage: {prog} [--sock PATH|-s PATH] [--config PATH|-c PATH] [--sar CMD]"
                ));
            }
            "--sock" | "-s" => {
                parsed.sock = it.next().map(PathBuf::from);
            }
            "--config" | "-c" => {
                parsed.config = it.next().map(PathBuf::from);
            }
            "--sar" => {
                parsed.sar = it.next();
            }
            _ if arg.starts_with("--sock=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.sock = Some(PathBuf::from(v));
                    }
                }
            }
            _ if arg.starts_with("--config=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.config = Some(PathBuf::from(v));
                    }
                }
            }
            _ if arg.starts_with("--sar=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.sar = Some(v.to_string());
                    }
                }
            }
            _ => {
                return Err(format!(
                    "Unexpected argument {arg:?}. Usage: {prog} [--sock PATH|-s PATH] [--config PATH|-c PATH] [--sar CMD]"
                ));
            }
        }
    }
    Ok(parsed)
}
