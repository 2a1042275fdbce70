use anyhow::Result;

use super::build;
use super::format_session;
use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::Session;

#[test]
fn it_formats_sessions_for_listing() {
    let mut session = Session::new("Rust projects");
    session.created_at = 1_700_000_000_000;
    session.messages.push(Message::new(Role::User, "What did Ada build?"));
    session.messages.push(Message::new(Role::Assistant, "A compiler."));

    insta::assert_snapshot!(format_session(0, &session), @"1. Rust projects (2023-11-14 22:13, 2 messages)");
}

#[test]
fn it_truncates_long_titles() {
    let session = Session::new(&"a".repeat(80));
    let res = format_session(4, &session);

    assert!(res.starts_with(&format!("5. {}...", "a".repeat(57))));
}

#[test]
fn it_rejects_unknown_backends() {
    let res = build().try_get_matches_from(vec!["folio", "--primary-backend", "ollama"]);
    assert!(res.is_err());
}

#[test]
fn it_accepts_config_flags_on_subcommands() -> Result<()> {
    let matches = build().try_get_matches_from(vec![
        "folio",
        "sessions",
        "list",
        "--tone",
        "casual",
        "-c",
        "./config.example.toml",
    ])?;

    let (_, sessions) = match matches.subcommand() {
        Some(subcommand) => subcommand,
        None => anyhow::bail!("expected a subcommand"),
    };
    assert_eq!(
        sessions.get_one::<String>("tone").map(|tone| return tone.as_str()),
        Some("casual")
    );

    return Ok(());
}
