use serde_json::json;

use super::BackendName;
use super::BackendPrompt;
use super::FallbackCursor;
use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolContinuation;
use crate::domain::models::ToolOutcome;
use crate::domain::models::ToolResult;

#[test]
fn it_parses_backend_names() {
    assert_eq!(BackendName::parse("openai"), Some(BackendName::OpenAI));
    assert_eq!(BackendName::parse("gemini"), Some(BackendName::Gemini));
    assert_eq!(BackendName::parse("ollama"), None);
    assert_eq!(BackendName::OpenAI.to_string(), "openai");
}

#[test]
fn it_walks_the_cascade_once() {
    let mut cursor = FallbackCursor::new(3);
    assert_eq!(cursor.position(), 0);
    assert!(cursor.advance());
    assert!(cursor.advance());
    assert_eq!(cursor.position(), 2);
    assert!(cursor.is_last());
    assert!(!cursor.advance());
    assert_eq!(cursor.position(), 2);
}

#[test]
fn it_treats_a_single_provider_as_last() {
    let mut cursor = FallbackCursor::new(1);
    assert!(cursor.is_last());
    assert!(!cursor.advance());
}

#[test]
fn it_keeps_the_original_prompt_when_continuing() {
    let history = vec![Message::new(Role::User, "hi"), Message::new(Role::Assistant, "hello")];
    let prompt = BackendPrompt::new("be nice", &history, "show projects", &[]);

    let call = ToolCall::new("1", "showProjects", json!({}));
    let result = ToolResult::new(&call, ToolOutcome::Success("ok".to_string()));
    let next = prompt.with_continuation(ToolContinuation {
        calls: vec![call],
        results: vec![result],
    });

    assert!(prompt.continuation.is_none());
    assert_eq!(next.history, prompt.history);
    assert_eq!(next.text, "show projects");
    assert_eq!(next.continuation.unwrap().results.len(), 1);
}
