// Integration tests for the conversation turn state machine
//
// These tests verify history ordering, the always-a-reply guarantee,
// fallback routing and voice delivery against scripted backends.

mod common;

use anyhow::Result;
use common::{orchestrator, CollectingSink, ScriptedRenderer, ScriptedResponder};
use rosa_voice::{
    AssistantReply, Delivery, FailureSource, ReplyRoute, Scenario, Transcript, VoiceError,
};

#[tokio::test]
async fn test_user_message_precedes_reply() -> Result<()> {
    let responder = ScriptedResponder::new();
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    let outcome = orch
        .handle_transcript(&Transcript::new("Hvar er næsta strætóstöð?"))
        .await
        .expect("non-empty transcript");

    let history = orch.history();
    let user_index = history.index_of(outcome.user_message.id).unwrap();
    let reply_index = history.index_of(outcome.reply.message.id).unwrap();
    assert!(user_index < reply_index);
    assert!(outcome.user_message.is_user);
    assert_eq!(outcome.user_message.scenario, None);
    assert!(!outcome.reply.message.is_user);
    assert!(outcome.reply.message.scenario.is_some());

    let calls = responder.calls.lock().unwrap();
    assert_eq!(calls[0].scenario, Scenario::BusInfo);
    assert_eq!(calls[0].history_len, 0, "History excludes the current message");

    Ok(())
}

#[tokio::test]
async fn test_history_passed_to_responder_grows() -> Result<()> {
    let responder = ScriptedResponder::new();
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    orch.handle_transcript(&Transcript::new("Halló")).await;
    orch.handle_transcript(&Transcript::new("Hvenær er sorphirða?"))
        .await;

    let calls = responder.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].history_len, 2);
    assert_eq!(calls[1].scenario, Scenario::WasteInfo);
    Ok(())
}

#[tokio::test]
async fn test_reply_scenario_comes_from_reply_text() -> Result<()> {
    let responder = ScriptedResponder::new();
    responder.push(Ok(AssistantReply {
        text: "Takk fyrir og bless!".to_string(),
        scenario: Some(Scenario::Greeting),
    }));
    let mut orch = orchestrator(
        responder,
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    let outcome = orch
        .handle_transcript(&Transcript::new("Góðan dag"))
        .await
        .unwrap();
    assert_eq!(outcome.reply.route, ReplyRoute::Primary);
    assert_eq!(outcome.reply.message.scenario, Some(Scenario::Farewell));
    Ok(())
}

#[tokio::test]
async fn test_exactly_one_reply_per_turn() -> Result<()> {
    let responder = ScriptedResponder::new();
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::failing(),
        CollectingSink::new(),
    );

    let inputs = [
        ("Halló", true),
        ("Hvar er strætó?", false),
        ("", true),
        ("Bless", false),
        ("   ", true),
        ("Segðu mér meira", true),
        ("Appið virkar ekki", false),
    ];

    for (text, succeed) in inputs {
        if !succeed {
            responder.fail_next(1);
        }
        let before = orch.history().len();
        let outcome = orch.handle_transcript(&Transcript::new(text)).await;

        if text.trim().is_empty() {
            assert!(outcome.is_none());
            assert_eq!(orch.history().len(), before);
            continue;
        }

        let outcome = outcome.unwrap();
        assert!(!outcome.reply.message.text.trim().is_empty());
        let added = &orch.history().messages()[before..];
        assert_eq!(added.len(), 2, "one user and one assistant message for {:?}", text);
        assert!(added[0].is_user);
        assert!(!added[1].is_user);
    }

    Ok(())
}

#[tokio::test]
async fn test_empty_primary_reply_counts_as_failure() -> Result<()> {
    let responder = ScriptedResponder::new();
    responder.push(Ok(AssistantReply::new("  ")));
    let sink = CollectingSink::new();
    let mut orch = orchestrator(responder, ScriptedRenderer::working(), sink.clone());

    let outcome = orch
        .handle_transcript(&Transcript::new("Hæ"))
        .await
        .unwrap();
    assert_eq!(outcome.reply.route, ReplyRoute::Fallback);
    assert_eq!(outcome.reply.message.scenario, Some(Scenario::Greeting));
    assert_eq!(orch.failure_state().retry_count, 1);
    assert_eq!(sink.events.lock().unwrap()[0].source, FailureSource::Response);
    Ok(())
}

#[tokio::test]
async fn test_fallback_mode_skips_primary_until_reconnect() -> Result<()> {
    let responder = ScriptedResponder::new();
    responder.fail_next(4);
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    for i in 0..4 {
        let outcome = orch
            .handle_transcript(&Transcript::new(format!("Spurning {}", i)))
            .await
            .unwrap();
        assert_eq!(outcome.reply.route, ReplyRoute::Fallback);
        assert_eq!(outcome.reply.message.scenario, Some(Scenario::General));
    }
    assert!(orch.is_fallback(), "4 failures exceed the threshold of 3");
    assert_eq!(responder.call_count(), 4);

    let outcome = orch
        .handle_transcript(&Transcript::new("Bless"))
        .await
        .unwrap();
    assert_eq!(outcome.reply.route, ReplyRoute::Fallback);
    assert_eq!(outcome.reply.message.scenario, Some(Scenario::Farewell));
    assert_eq!(responder.call_count(), 4, "Primary path is not attempted in fallback");

    assert!(orch.reconnect().await);
    assert!(!orch.is_fallback());
    let outcome = orch
        .handle_transcript(&Transcript::new("Ertu komin aftur?"))
        .await
        .unwrap();
    assert_eq!(outcome.reply.route, ReplyRoute::Primary);
    Ok(())
}

#[tokio::test]
async fn test_three_failures_do_not_trigger_fallback() -> Result<()> {
    let responder = ScriptedResponder::new();
    responder.fail_next(3);
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    for _ in 0..3 {
        orch.handle_transcript(&Transcript::new("Halló")).await;
    }
    assert!(!orch.is_fallback());

    let outcome = orch
        .handle_transcript(&Transcript::new("Halló"))
        .await
        .unwrap();
    assert_eq!(outcome.reply.route, ReplyRoute::Primary);
    Ok(())
}

#[tokio::test]
async fn test_render_failure_is_sticky_until_reconnect() -> Result<()> {
    let renderer = ScriptedRenderer::failing();
    let mut orch = orchestrator(
        ScriptedResponder::new(),
        renderer.clone(),
        CollectingSink::new(),
    );

    let first = orch
        .handle_transcript(&Transcript::new("Halló"))
        .await
        .unwrap();
    assert_eq!(first.reply.delivery, Delivery::RenderFailed);
    assert!(first.reply.notice().is_some());
    assert_eq!(orch.history().len(), 2, "Reply stays in history");

    let second = orch
        .handle_transcript(&Transcript::new("Hvar er sundlaugin?"))
        .await
        .unwrap();
    assert_eq!(second.reply.delivery, Delivery::TextOnly);
    assert_eq!(second.reply.route, ReplyRoute::Primary);
    assert_eq!(renderer.call_count(), 1);

    orch.reconnect().await;
    assert!(orch.voice_enabled());
    orch.handle_transcript(&Transcript::new("Takk")).await;
    assert_eq!(renderer.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_voice_params_use_persona_and_reply_scenario() -> Result<()> {
    let renderer = ScriptedRenderer::working();
    let responder = ScriptedResponder::new();
    responder.push(Ok(AssistantReply::new("Strætó númer 14 fer þangað.")));
    let mut orch = orchestrator(responder, renderer.clone(), CollectingSink::new());

    let outcome = orch
        .handle_transcript(&Transcript::new("Hvernig kemst ég í Laugardal?"))
        .await
        .unwrap();
    assert!(matches!(outcome.reply.delivery, Delivery::Spoken(ref audio) if !audio.is_empty()));

    let calls = renderer.calls.lock().unwrap();
    assert_eq!(calls[0].voice, "nova");
    assert_eq!(calls[0].scenario, Scenario::BusInfo);
    Ok(())
}

#[tokio::test]
async fn test_initialization_failure_is_hard() -> Result<()> {
    let responder = ScriptedResponder::new();
    responder.fail_init(1);
    let sink = CollectingSink::new();
    let mut orch = orchestrator(responder.clone(), ScriptedRenderer::working(), sink.clone());

    assert!(!orch.initialize().await);
    assert!(orch.is_fallback());
    assert_eq!(orch.failure_state().retry_count, 1);
    assert!(sink.events.lock().unwrap()[0].fallback_mode);

    let outcome = orch
        .handle_transcript(&Transcript::new("Halló"))
        .await
        .unwrap();
    assert_eq!(outcome.reply.route, ReplyRoute::Fallback);
    assert_eq!(responder.call_count(), 0);

    assert!(orch.reconnect().await);
    assert!(!orch.is_fallback());
    Ok(())
}

#[tokio::test]
async fn test_reset_conversation_keeps_failure_state() -> Result<()> {
    let responder = ScriptedResponder::new();
    responder.fail_next(1);
    let mut orch = orchestrator(responder, ScriptedRenderer::working(), CollectingSink::new());

    orch.handle_transcript(&Transcript::new("Halló")).await;
    let session_before = orch.context().session_id().to_string();

    orch.reset_conversation();
    assert!(orch.history().is_empty());
    assert_ne!(orch.context().session_id(), session_before);
    assert_eq!(orch.failure_state().retry_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_external_failures_count_toward_fallback() -> Result<()> {
    let mut orch = orchestrator(
        ScriptedResponder::new(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    for _ in 0..4 {
        orch.record_failure(&VoiceError::Transcription("502".to_string()));
    }
    assert!(orch.is_fallback());
    Ok(())
}

#[tokio::test]
async fn test_fallback_greets_when_greeting_is_not_first_match() -> Result<()> {
    let responder = ScriptedResponder::new();
    responder.fail_next(1);
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    let outcome = orch
        .handle_transcript(&Transcript::new("Halló, hvar er strætó?"))
        .await
        .unwrap();
    assert_eq!(responder.calls.lock().unwrap()[0].scenario, Scenario::BusInfo);
    assert_eq!(outcome.reply.route, ReplyRoute::Fallback);
    assert_eq!(outcome.reply.message.scenario, Some(Scenario::Greeting));
    assert!(outcome.reply.message.text.starts_with("Halló! Ég heiti Rósa"));
    Ok(())
}

#[tokio::test]
async fn test_first_spoken_greeting_is_answered_by_opening_greeting() -> Result<()> {
    let responder = ScriptedResponder::new();
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    let user = orch
        .accept_transcript(&Transcript::new("Halló Rósa"))
        .unwrap();
    assert!(orch.greeting_due());
    let reply = orch.reply_to_spoken(&user).await;
    assert_eq!(reply.route, ReplyRoute::Greeting);
    assert_eq!(reply.message.scenario, Some(Scenario::Greeting));
    assert!(matches!(reply.delivery, Delivery::Spoken(_)));
    assert_eq!(orch.history().len(), 2, "One reply for the turn");
    assert_eq!(responder.call_count(), 0);
    assert!(!orch.greeting_due());

    // Later greetings go to the response service
    let user = orch
        .accept_transcript(&Transcript::new("Halló aftur"))
        .unwrap();
    let reply = orch.reply_to_spoken(&user).await;
    assert_eq!(reply.route, ReplyRoute::Primary);
    assert_eq!(orch.history().len(), 4);
    assert_eq!(responder.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_spoken_question_after_typed_greeting_gets_normal_reply() -> Result<()> {
    let responder = ScriptedResponder::new();
    let mut orch = orchestrator(
        responder.clone(),
        ScriptedRenderer::working(),
        CollectingSink::new(),
    );

    orch.handle_transcript(&Transcript::new("Hæ")).await;
    assert!(orch.greeting_due());

    let user = orch
        .accept_transcript(&Transcript::new("Hvenær er sorphirða?"))
        .unwrap();
    let reply = orch.reply_to_spoken(&user).await;
    assert_eq!(reply.route, ReplyRoute::Primary);
    assert_eq!(orch.history().len(), 4);
    assert_eq!(
        orch.history().messages().iter().filter(|m| !m.is_user).count(),
        2
    );
    assert!(orch.greeting_due(), "Opening greeting waits for a spoken greeting");
    Ok(())
}
