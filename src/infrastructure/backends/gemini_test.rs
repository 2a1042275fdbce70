use anyhow::bail;
use anyhow::Result;
use mockito::Matcher;
use serde_json::json;
use tokio::sync::mpsc;

use super::build_contents;
use super::Gemini;
use crate::domain::models::Backend;
use crate::domain::models::BackendPrompt;
use crate::domain::models::BackendResponse;
use crate::domain::models::ErrorKind;
use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolContinuation;
use crate::domain::models::ToolDeclaration;
use crate::domain::models::ToolOutcome;
use crate::domain::models::ToolResult;

impl Gemini {
    fn with_url(url: String) -> Gemini {
        return Gemini {
            url,
            token: "abc".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout: "200".to_string(),
        };
    }
}

fn prompt() -> BackendPrompt {
    let history = vec![
        Message::new(Role::User, "Hi"),
        Message::new(Role::Assistant, "Hello! Ask me anything."),
    ];
    let tools = vec![ToolDeclaration::new("showProjects", "Show projects.")];
    return BackendPrompt::new("Be nice.", &history, "What did Ada build?", &tools);
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BackendResponse>) -> Vec<BackendResponse> {
    let mut res = vec![];
    while let Ok(msg) = rx.try_recv() {
        res.push(msg);
    }
    return res;
}

#[tokio::test]
async fn it_successfully_health_checks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1beta/models/gemini-2.5-flash")
        .match_query(Matcher::UrlEncoded("key".to_string(), "abc".to_string()))
        .with_status(200)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_ok());
    mock.assert_async().await;
}

#[tokio::test]
async fn it_fails_health_checks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1beta/models/gemini-2.5-flash")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_err());
    mock.assert_async().await;
}

#[test]
fn it_maps_history_roles() -> Result<()> {
    let contents = serde_json::to_value(build_contents(&prompt()))?;

    assert_eq!(
        contents,
        json!([
            { "role": "user", "parts": [{ "text": "Hi" }] },
            { "role": "model", "parts": [{ "text": "Hello! Ask me anything." }] },
            { "role": "user", "parts": [{ "text": "What did Ada build?" }] },
        ])
    );

    return Ok(());
}

#[test]
fn it_builds_function_responses() -> Result<()> {
    let call = ToolCall::new("call-0", "showProjects", json!({}));
    let continuation = ToolContinuation {
        calls: vec![call.clone()],
        results: vec![ToolResult::new(
            &call,
            ToolOutcome::Failure("Failed to execute tool".to_string()),
        )],
    };
    let prompt = BackendPrompt::new("Be nice.", &[], "Projects?", &[]).with_continuation(continuation);

    let contents = serde_json::to_value(build_contents(&prompt))?;
    assert_eq!(
        contents[1],
        json!({
            "role": "model",
            "parts": [{ "functionCall": { "name": "showProjects", "args": {} } }],
        })
    );
    assert_eq!(
        contents[2],
        json!({
            "role": "user",
            "parts": [{
                "functionResponse": {
                    "name": "showProjects",
                    "response": { "error": "Failed to execute tool" },
                },
            }],
        })
    );

    return Ok(());
}

#[tokio::test]
async fn it_gets_completions() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.5-flash:streamGenerateContent")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("alt".to_string(), "sse".to_string()),
            Matcher::UrlEncoded("key".to_string(), "abc".to_string()),
        ]))
        .match_body(Matcher::PartialJson(json!({
            "systemInstruction": { "parts": [{ "text": "Be nice." }] },
            "generationConfig": { "temperature": 0.7 },
        })))
        .with_status(200)
        .with_body(test_utils::gemini_text_stream())
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel::<BackendResponse>();

    let backend = Gemini::with_url(server.url());
    backend.get_completion(&prompt(), &tx).await?;

    mock.assert_async().await;
    assert_eq!(
        drain(&mut rx),
        vec![
            BackendResponse::Text("Hello ".to_string()),
            BackendResponse::Text("World".to_string()),
            BackendResponse::Done,
        ]
    );

    return Ok(());
}

#[tokio::test]
async fn it_receives_function_calls() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.5-flash:streamGenerateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(test_utils::gemini_tool_call_stream())
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel::<BackendResponse>();

    let backend = Gemini::with_url(server.url());
    backend.get_completion(&prompt(), &tx).await?;

    mock.assert_async().await;
    assert_eq!(
        drain(&mut rx),
        vec![
            BackendResponse::ToolCall(ToolCall::new("call-0", "showProjects", json!({}))),
            BackendResponse::Done,
        ]
    );

    return Ok(());
}

#[tokio::test]
async fn it_classifies_overloaded_models() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.5-flash:streamGenerateContent")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body(r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#)
        .create_async()
        .await;

    let (tx, _rx) = mpsc::unbounded_channel::<BackendResponse>();

    let backend = Gemini::with_url(server.url());
    let err = match backend.get_completion(&prompt(), &tx).await {
        Ok(_) => bail!("completion should fail"),
        Err(err) => err,
    };

    mock.assert_async().await;
    assert_eq!(err.kind, ErrorKind::Overloaded);
    assert_eq!(err.status, Some(503));

    return Ok(());
}

#[tokio::test]
async fn it_fails_on_errors_inside_the_stream() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.5-flash:streamGenerateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(test_utils::sse_body(&[
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"}]}}]}"#,
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        ]))
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel::<BackendResponse>();

    let backend = Gemini::with_url(server.url());
    let err = match backend.get_completion(&prompt(), &tx).await {
        Ok(_) => bail!("completion should fail"),
        Err(err) => err,
    };

    mock.assert_async().await;
    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert_eq!(drain(&mut rx), vec![BackendResponse::Text("Hel".to_string())]);

    return Ok(());
}

#[tokio::test]
async fn it_generates_text() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.5-flash:generateContent")
        .match_query(Matcher::UrlEncoded("key".to_string(), "abc".to_string()))
        .with_status(200)
        .with_body(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Rust Careers"}]}}]}"#)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let res = backend.generate_text("Title this").await?;

    mock.assert_async().await;
    assert_eq!(res, "Rust Careers");

    return Ok(());
}
