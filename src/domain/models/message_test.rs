use anyhow::Result;

use super::Message;
use super::Role;
use super::Widget;

#[test]
fn it_appends_streamed_text() {
    let mut msg = Message::placeholder();
    assert!(msg.is_empty());
    assert_eq!(msg.role, Role::Assistant);

    msg.append("Hello");
    msg.append(", world");

    assert_eq!(msg.content, "Hello, world");
    assert!(!msg.is_empty());
}

#[test]
fn it_generates_unique_ids() {
    let first = Message::new(Role::User, "hi");
    let second = Message::new(Role::User, "hi");
    assert_ne!(first.id, second.id);
}

#[test]
fn it_serializes_roles_and_widgets_for_stored_sessions() -> Result<()> {
    let mut msg = Message::new(Role::Assistant, "Here are my projects");
    msg.id = "abc".to_string();
    msg.timestamp = 1700000000000;
    msg.widget = Some(Widget::Projects);

    let json = serde_json::to_string(&msg)?;
    insta::assert_snapshot!(json, @r###"{"id":"abc","role":"model","content":"Here are my projects","timestamp":1700000000000,"uiComponent":"projects"}"###);

    let parsed: Message = serde_json::from_str(&json)?;
    assert_eq!(parsed, msg);

    return Ok(());
}

#[test]
fn it_omits_missing_widgets() -> Result<()> {
    let mut msg = Message::new(Role::User, "hey");
    msg.id = "u1".to_string();
    msg.timestamp = 1;

    let json = serde_json::to_string(&msg)?;
    insta::assert_snapshot!(json, @r###"{"id":"u1","role":"user","content":"hey","timestamp":1}"###);

    return Ok(());
}

#[test]
fn it_parses_widget_names() -> Result<()> {
    assert_eq!("story".parse::<Widget>()?, Widget::Story);
    assert_eq!(Widget::Experience.to_string(), "experience");
    return Ok(());
}
