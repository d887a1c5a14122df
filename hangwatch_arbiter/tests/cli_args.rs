//! CLI arg handling: the parse function directly, plus a --help probe of
//! the built binary.

use std::path::PathBuf;
use std::process::Command;

use hangwatch_arbiter::args::parse_args;

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[test]
fn long_short_and_assign_forms_parse() {
    let p = parse_args(owned(&["arbiter", "--sock", "/tmp/a.sock"])).expect("parse");
    assert_eq!(p.sock, Some(PathBuf::from("/tmp/a.sock")));

    let p = parse_args(owned(&["arbiter", "-s", "/tmp/b.sock", "--config=/tmp/cfg.json"]))
        .expect("parse");
    assert_eq!(p.sock, Some(PathBuf::from("/tmp/b.sock")));
    assert_eq!(p.config, Some(PathBuf::from("/tmp/cfg.json")));
}

#[test]
fn unknown_argument_is_rejected() {
    assert!(parse_args(owned(&["arbiter", "--bogus"])).is_err());
}

#[test]
fn help_mentions_the_flags() {
    let output = Command::new(env!("CARGO_BIN_EXE_hangwatch_arbiter"))
        .arg("--help")
        .output()
        .expect("run hangwatch_arbiter --help");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        text.contains("--sock") && text.contains("--config"),
        "help text missing expected flags\n{text}"
    );
}
