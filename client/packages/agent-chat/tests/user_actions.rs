mod common;

use agent_chat::compaction::COMPACTION_SENTINEL_ID;
use agent_chat::{
    BackendErrorKind, ClientError, ContentUnit, OutboundRequest, PermissionMode, Role, Signal,
    ToastLevel,
};
use agent_chat_stream_schema::{
    ApprovePlanRequest, ChatRequest, KillBackgroundProcessRequest, SetPermissionModeRequest,
    StopGenerationRequest,
};
use serde_json::json;

use common::*;

#[test]
fn send_message_appends_user_turn_and_requests_chat() {
    let mut harness = Harness::visible("s1");
    let session_id = harness.reconciler.send_message("hello").expect("send");
    assert_eq!(session_id, "s1");

    let messages = harness.messages("s1");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text(), "hello");
    assert!(harness.reconciler.session("s1").expect("session").is_loading);
    assert_eq!(
        harness.requests(),
        vec![OutboundRequest::Chat(ChatRequest {
            session_id: "s1".to_string(),
            content: "hello".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            timezone: "UTC".to_string(),
        })]
    );
}

#[test]
fn actions_without_a_visible_session_fail() {
    let mut harness = Harness::new();
    assert!(matches!(
        harness.reconciler.send_message("hello"),
        Err(ClientError::NoActiveSession)
    ));
    assert!(matches!(
        harness.reconciler.stop_generation(),
        Err(ClientError::NoActiveSession)
    ));
    assert!(matches!(
        harness.reconciler.request_permission_mode(PermissionMode::Bypass),
        Err(ClientError::NoActiveSession)
    ));
    assert!(harness.requests().is_empty());
}

#[test]
fn token_count_resets_at_end_of_turn() {
    let mut harness = Harness::visible("s1");
    harness.reconciler.send_message("hello").expect("send");
    harness.apply(json!({ "type": "token_update", "outputTokens": 42 }));
    assert_eq!(harness.reconciler.snapshot().live_token_count, 42);

    harness.apply(result("s1"));
    let snapshot = harness.reconciler.snapshot();
    assert_eq!(snapshot.live_token_count, 0);
    assert!(!snapshot.is_loading);
}

#[test]
fn stop_generation_clears_loading_immediately() {
    let mut harness = Harness::visible("s1");
    harness.reconciler.send_message("hello").expect("send");
    harness.reconciler.stop_generation().expect("stop");

    assert!(!harness.reconciler.session("s1").expect("session").is_loading);
    assert_eq!(
        harness.requests().last(),
        Some(&OutboundRequest::StopGeneration(StopGenerationRequest {
            session_id: "s1".to_string(),
        }))
    );
}

#[test]
fn background_processes_follow_their_lifecycle() {
    let mut harness = Harness::visible("s1");
    harness.apply_all([
        process_started("s1", "bash_1", "npm run dev"),
        process_started("s1", "bash_2", "tail -f log"),
    ]);

    let processes = harness.reconciler.background_processes("s1");
    assert_eq!(processes.len(), 2);
    assert_eq!(processes[0].started_at, 1_704_067_200_000);

    assert!(harness.reconciler.kill_background_process("bash_1"));
    assert_eq!(harness.reconciler.background_processes("s1").len(), 1);
    assert_eq!(
        harness.requests(),
        vec![OutboundRequest::KillBackgroundProcess(
            KillBackgroundProcessRequest {
                bash_id: "bash_1".to_string(),
            }
        )]
    );

    harness.apply(json!({
        "type": "background_process_exited",
        "sessionId": "s1",
        "bashId": "bash_2",
        "exitCode": 0
    }));
    assert!(harness.reconciler.snapshot().background_processes.is_empty());

    assert!(!harness.reconciler.kill_background_process("bash_9"));
}

#[test]
fn plan_approval_waits_for_backend_confirmation() {
    let mut harness = Harness::visible("s1");
    harness.reconciler.send_message("refactor it").expect("send");

    let signals = harness.apply(json!({ "type": "exit_plan_mode", "plan": "1. Split module" }));
    assert_eq!(
        signals,
        vec![Signal::PlanApprovalRequested {
            session_id: "s1".to_string(),
            plan: "1. Split module".to_string(),
        }]
    );
    assert_eq!(
        harness.reconciler.snapshot().pending_plan.as_deref(),
        Some("1. Split module")
    );

    assert!(harness.reconciler.approve_plan());
    assert!(harness.reconciler.snapshot().pending_plan.is_none());
    assert_eq!(
        harness.requests().last(),
        Some(&OutboundRequest::ApprovePlan(ApprovePlanRequest {
            session_id: "s1".to_string(),
        }))
    );
    assert_eq!(
        harness.reconciler.session("s1").expect("session").permission_mode,
        PermissionMode::Plan
    );

    let signals = harness.apply(json!({
        "type": "permission_mode_changed",
        "mode": "bypassPermissions"
    }));
    assert_eq!(
        harness.reconciler.session("s1").expect("session").permission_mode,
        PermissionMode::Bypass
    );
    assert!(signals.contains(&Signal::PermissionModeChanged {
        session_id: "s1".to_string(),
        mode: PermissionMode::Bypass,
    }));
}

#[test]
fn rejecting_a_plan_stops_waiting_without_a_request() {
    let mut harness = Harness::visible("s1");
    harness.reconciler.send_message("refactor it").expect("send");
    harness.apply(json!({ "type": "exit_plan_mode", "plan": "1. Rewrite everything" }));

    assert!(harness.reconciler.reject_plan());
    assert!(!harness.reconciler.reject_plan());
    assert!(!harness.reconciler.session("s1").expect("session").is_loading);
    assert_eq!(harness.requests().len(), 1, "only the chat request was sent");
}

#[test]
fn permission_request_does_not_change_local_mode() {
    let mut harness = Harness::visible("s1");
    harness
        .reconciler
        .request_permission_mode(PermissionMode::Bypass)
        .expect("request");

    assert_eq!(
        harness.requests(),
        vec![OutboundRequest::SetPermissionMode(SetPermissionModeRequest {
            session_id: "s1".to_string(),
            mode: PermissionMode::Bypass,
        })]
    );
    assert_eq!(
        harness.reconciler.session("s1").expect("session").permission_mode,
        PermissionMode::Plan
    );
}

#[test]
fn compaction_swaps_sentinel_for_divider() {
    let mut harness = Harness::visible("s1");
    harness.reconciler.send_message("keep going").expect("send");
    harness.apply(text("s1", "Working"));

    let signals = harness.apply(json!({
        "type": "compact_start",
        "trigger": "auto",
        "preTokens": 150000
    }));
    assert!(matches!(
        signals.as_slice(),
        [Signal::Toast { level: ToastLevel::Info, .. }]
    ));
    assert_eq!(harness.messages("s1").len(), 2);

    let manual = harness.apply(json!({ "type": "compact_start", "trigger": "manual" }));
    assert!(manual.is_empty());

    harness.apply_all([
        json!({ "type": "compact_loading" }),
        json!({ "type": "compact_loading" }),
    ]);
    let messages = harness.messages("s1");
    let sentinels = messages
        .iter()
        .filter(|message| message.id == COMPACTION_SENTINEL_ID)
        .count();
    assert_eq!(sentinels, 1);
    assert!(!messages[1].open, "sentinel closes the streaming message");

    harness.apply(json!({ "type": "compact_complete", "preTokens": 150000 }));
    let messages = harness.messages("s1");
    assert!(messages.iter().all(|message| message.id != COMPACTION_SENTINEL_ID));
    assert_eq!(
        messages.last().map(|message| message.text()),
        Some("Conversation compacted (150000 tokens before compaction)".to_string())
    );

    harness.apply(text("s1", "Resumed"));
    let messages = harness.messages("s1");
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].text(), "Resumed");
}

#[test]
fn compaction_for_hidden_session_is_dropped() {
    let mut harness = Harness::visible("s1");
    harness.apply_all([
        json!({ "type": "compact_loading", "sessionId": "s2" }),
        json!({ "type": "compact_complete", "sessionId": "s2", "preTokens": 10 }),
    ]);
    assert!(harness.messages("s2").is_empty());

    // A completion without its sentinel still leaves a divider.
    harness.apply(json!({ "type": "compact_complete" }));
    assert_eq!(harness.messages("s1")[0].text(), "Conversation compacted");
}

#[test]
fn compaction_for_cached_hidden_session_is_dropped() {
    let mut harness = Harness::visible("s1");
    harness.reconciler.send_message("keep going").expect("send");
    harness.reconciler.activate_session("s2");
    assert!(harness.reconciler.is_cached("s1"));

    harness.apply_all([
        json!({ "type": "compact_loading", "sessionId": "s1" }),
        json!({ "type": "compact_complete", "sessionId": "s1", "preTokens": 10 }),
        text("s1", "more"),
    ]);
    assert!(harness.messages("s2").is_empty());

    harness.reconciler.activate_session("s1");
    let messages = harness.messages("s1");
    assert!(messages.iter().all(|message| message.id != COMPACTION_SENTINEL_ID));
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text(), "more");
}

#[test]
fn backend_error_ends_the_turn() {
    let mut harness = Harness::visible("s1");
    harness.reconciler.send_message("hello").expect("send");
    harness.apply(text("s1", "partial"));

    let signals = harness.apply(error("s1", None, "429 Too Many Requests"));
    assert_eq!(
        signals,
        vec![
            Signal::Toast {
                level: ToastLevel::Error,
                message: "Rate Limited: 429 Too Many Requests".to_string(),
            },
            Signal::TimelineChanged {
                session_id: "s1".to_string(),
            },
        ]
    );

    harness.apply(text("s1", "more"));
    let messages = harness.messages("s1");
    assert_eq!(messages.len(), 2);
    assert!(!messages[1].open);
    assert_eq!(
        messages[1].units,
        vec![
            ContentUnit::text("partial"),
            ContentUnit::Error {
                error_kind: BackendErrorKind::RateLimit,
                message: "429 Too Many Requests".to_string(),
            },
        ]
    );
    assert!(!harness.reconciler.snapshot().is_loading);
}

#[test]
fn transport_notices_are_toasts_only() {
    let mut harness = Harness::visible("s1");
    let signals = harness.apply_all([
        json!({ "type": "timeout_warning", "message": "Still working", "elapsedSeconds": 60 }),
        json!({
            "type": "retry_attempt",
            "attempt": 2,
            "maxAttempts": 3,
            "message": "overloaded",
            "errorType": "overloaded_error"
        }),
        json!({ "type": "keepalive", "elapsedSeconds": 30 }),
    ]);

    assert_eq!(
        signals,
        vec![
            Signal::Toast {
                level: ToastLevel::Warning,
                message: "Still working".to_string(),
            },
            Signal::Toast {
                level: ToastLevel::Info,
                message: "Retrying (2/3): overloaded".to_string(),
            },
        ]
    );
    assert!(harness.messages("s1").is_empty());
}
