/// Wraps each payload in a `data:` line the way server sent event streams
/// deliver them.
pub fn sse_body(payloads: &[&str]) -> String {
    return payloads
        .iter()
        .map(|payload| return format!("data: {payload}\n\n"))
        .collect::<Vec<String>>()
        .join("");
}

/// OpenAI chat stream answering with two text deltas.
pub fn openai_text_stream() -> String {
    return sse_body(&[
        r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
        r#"{"choices":[{"delta":{"content":"Hello "}}]}"#,
        r#"{"choices":[{"delta":{"content":"World"}}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);
}

/// OpenAI chat stream requesting one tool call, split over several chunks.
pub fn openai_tool_call_stream() -> String {
    return sse_body(&[
        r#"{"choices":[{"delta":{"role":"assistant","content":null,"tool_calls":[{"index":0,"id":"call_abc","type":"function","function":{"name":"sendMessage","arguments":""}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"name\":\"Grace\","}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"email\":\"grace@example.com\",\"message\":\"Hi\"}"}}]}}]}"#,
        r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        "[DONE]",
    ]);
}

/// Gemini stream answering with two text chunks.
pub fn gemini_text_stream() -> String {
    return sse_body(&[
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "}]}}]}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"World"}]},"finishReason":"STOP"}]}"#,
    ]);
}

/// Gemini stream requesting a parameterless function.
pub fn gemini_tool_call_stream() -> String {
    return sse_body(&[
        r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"showProjects","args":{}}}]}}]}"#,
    ]);
}
