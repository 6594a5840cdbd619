use agent_chat_stream_schema::{classify, Classification, StreamEvent, KNOWN_EVENT_KINDS};
use serde_json::{json, Value};

/// One minimal, valid record per event kind, as the backend sends them.
fn fixtures() -> Vec<Value> {
    vec![
        json!({ "type": "assistant_message", "sessionId": "s1", "content": "Hello" }),
        json!({ "type": "thinking_start", "sessionId": "s1" }),
        json!({ "type": "thinking_delta", "content": "hmm" }),
        json!({
            "type": "tool_use",
            "toolId": "toolu_01",
            "toolName": "Bash",
            "toolInput": { "command": "ls" }
        }),
        json!({ "type": "token_update", "outputTokens": 128 }),
        json!({ "type": "result", "sessionId": "s1" }),
        json!({ "type": "error", "sessionId": "s1", "message": "529 Overloaded" }),
        json!({ "type": "timeout_warning", "message": "Still working", "elapsedSeconds": 300 }),
        json!({
            "type": "retry_attempt",
            "attempt": 1,
            "maxAttempts": 3,
            "message": "overloaded",
            "errorType": "overloaded_error"
        }),
        json!({ "type": "exit_plan_mode", "plan": "1. Read\n2. Edit" }),
        json!({ "type": "permission_mode_changed", "mode": "bypassPermissions" }),
        json!({
            "type": "background_process_started",
            "sessionId": "s1",
            "bashId": "bash_1",
            "command": "npm run dev",
            "startTime": "2024-01-01T00:00:00Z"
        }),
        json!({ "type": "background_process_killed", "bashId": "bash_1" }),
        json!({ "type": "background_process_exited", "bashId": "bash_1", "exitCode": 0 }),
        json!({
            "type": "long_running_command_started",
            "bashId": "bash_2",
            "command": "cargo build",
            "commandType": "build"
        }),
        json!({ "type": "command_output_chunk", "bashId": "bash_2", "chunk": "Compiling\n" }),
        json!({ "type": "long_running_command_completed", "bashId": "bash_2", "exitCode": 0 }),
        json!({ "type": "long_running_command_failed", "bashId": "bash_2", "error": "killed" }),
        json!({ "type": "compact_start", "trigger": "auto", "preTokens": 180000 }),
        json!({ "type": "compact_loading", "sessionId": "s1" }),
        json!({ "type": "compact_complete", "preTokens": 180000 }),
        json!({
            "type": "context_usage",
            "sessionId": "s1",
            "inputTokens": 100000,
            "outputTokens": 2000,
            "contextWindow": 200000,
            "contextPercentage": 50.0
        }),
        json!({ "type": "keepalive", "elapsedSeconds": 15 }),
    ]
}

#[test]
fn every_known_kind_classifies() {
    let fixtures = fixtures();
    assert_eq!(fixtures.len(), KNOWN_EVENT_KINDS.len());

    for (raw, expected) in fixtures.iter().zip(KNOWN_EVENT_KINDS) {
        match classify(raw) {
            Classification::Event(event) => assert_eq!(event.kind(), *expected),
            other => panic!("{expected} did not classify: {other:?}"),
        }
    }
}

#[test]
fn aliases_normalize_to_canonical_fields() {
    let chunk = classify(&json!({ "type": "command_output_chunk", "bashId": "b", "chunk": "x" }));
    match chunk.into_event() {
        Some(StreamEvent::CommandOutputChunk(data)) => assert_eq!(data.output, "x"),
        other => panic!("unexpected: {other:?}"),
    }

    let usage = classify(&json!({
        "type": "context_usage",
        "inputTokens": 50000,
        "contextWindow": 200000
    }));
    match usage.into_event() {
        Some(StreamEvent::ContextUsage(data)) => assert_eq!(data.percentage(), 25.0),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn schema_lists_every_kind() {
    let schema = serde_json::to_string(&schemars::schema_for!(StreamEvent)).expect("schema");
    for kind in KNOWN_EVENT_KINDS {
        assert!(schema.contains(&format!("\"{kind}\"")), "{kind} missing from schema");
    }
}
