//! Dialogue flow tests against a scripted backend.
//!
//! These cover the request path end to end:
//! - Cache hits skip the backend
//! - Failures produce fallbacks that are never cached
//! - Sessions stay bounded
//! - Status and cache administration

use std::sync::Arc;
use std::time::Duration;
use whisper_core::cache::{InMemorySharedCache, SharedCache};
use whisper_core::testing::{sample_personas, ScriptedBackend, ScriptedReply, TestHarness};
use whisper_core::{
    DialogueContext, DialogueRequest, InMemoryMemoryStore, Mood, ReplySource, ServiceError,
    WhisperConfig, WhisperService,
};

// =============================================================================
// CACHE
// =============================================================================

#[tokio::test]
async fn test_repeated_greeting_is_served_from_cache() {
    let harness = TestHarness::new([ScriptedReply::text("你好呀，今天想聊什麼？")]);

    let first = harness.say("npc-1", "你好", None).await.unwrap();
    assert!(!first.cached);
    assert_eq!(harness.backend().calls(), 1);

    let second = harness.say("npc-1", "你好", None).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.reply, first.reply);
    assert_eq!(second.source, ReplySource::LocalCache);
    assert_eq!(harness.backend().calls(), 1);
}

#[tokio::test]
async fn test_cache_is_per_actor() {
    let harness = TestHarness::new([ScriptedReply::text("a"), ScriptedReply::text("b")]);

    harness.say("npc-1", "你好", None).await.unwrap();
    let other = harness.say("npc-2", "你好", None).await.unwrap();

    assert!(!other.cached);
    assert_eq!(other.reply, "b");
    assert_eq!(harness.backend().calls(), 2);
}

#[tokio::test]
async fn test_local_cache_evicts_least_recent() {
    let config = WhisperConfig::default().with_local_cache_capacity(2);
    let harness = TestHarness::with_config(
        config,
        [
            ScriptedReply::text("one"),
            ScriptedReply::text("two"),
            ScriptedReply::text("three"),
            ScriptedReply::text("two again"),
        ],
    );

    harness.say("npc-3", "第一個問題", None).await.unwrap();
    harness.say("npc-3", "第二個問題", None).await.unwrap();
    // Touch the first so the second becomes least recent.
    assert!(harness.say("npc-3", "第一個問題", None).await.unwrap().cached);
    harness.say("npc-3", "第三個問題", None).await.unwrap();

    assert!(harness.say("npc-3", "第一個問題", None).await.unwrap().cached);
    let evicted = harness.say("npc-3", "第二個問題", None).await.unwrap();
    assert!(!evicted.cached);
    assert_eq!(evicted.reply, "two again");
}

#[tokio::test]
async fn test_shared_tier_serves_another_instance() {
    let shared = Arc::new(InMemorySharedCache::new());

    let build = |script: Vec<ScriptedReply>| {
        let shared: Arc<dyn SharedCache> = shared.clone();
        async move {
            let backend = Arc::new(ScriptedBackend::new(script));
            let service = WhisperService::with_shared_cache(
                WhisperConfig::default(),
                sample_personas(),
                backend.clone(),
                Arc::new(InMemoryMemoryStore::new()),
                shared,
            )
            .await;
            (service, backend)
        }
    };

    let (first, _) = build(vec![ScriptedReply::text("共享的回覆")]).await;
    let (second, second_backend) = build(vec![]).await;

    first
        .generate(DialogueRequest::new("npc-2", "最近怎麼樣"))
        .await
        .unwrap();
    let response = second
        .generate(DialogueRequest::new("npc-2", "今天如何？"))
        .await
        .unwrap();

    assert_eq!(response.source, ReplySource::SharedCache);
    assert_eq!(response.reply, "共享的回覆");
    assert_eq!(second_backend.calls(), 0);
}

#[tokio::test]
async fn test_clear_cache_forces_regeneration() {
    let harness = TestHarness::new([ScriptedReply::text("a"), ScriptedReply::text("b")]);

    harness.say("npc-1", "hello", None).await.unwrap();
    harness.service().clear_cache().await;
    assert_eq!(harness.service().status().cache_size, 0);

    let again = harness.say("npc-1", "hello", None).await.unwrap();
    assert!(!again.cached);
    assert_eq!(again.reply, "b");
}

// =============================================================================
// FALLBACKS
// =============================================================================

#[tokio::test]
async fn test_empty_backend_output_uses_fallback_without_caching() {
    let harness = TestHarness::new([ScriptedReply::Empty]);

    let response = harness.say("npc-1", "你好", None).await.unwrap();
    assert!(!response.reply.trim().is_empty());
    assert!(matches!(response.source, ReplySource::Fallback { .. }));
    assert_eq!(harness.service().status().cache_size, 0);
}

#[tokio::test]
async fn test_fallbacks_are_never_cached() {
    let harness = TestHarness::new([ScriptedReply::fail("down"), ScriptedReply::fail("down")]);

    let first = harness.say("npc-2", "你喜歡什麼", None).await.unwrap();
    let second = harness.say("npc-2", "你喜歡什麼", None).await.unwrap();

    assert!(!first.cached && !second.cached);
    assert!(matches!(second.source, ReplySource::Fallback { .. }));
    assert_eq!(harness.backend().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_yields_fallback_for_every_actor_and_mood() {
    let config = WhisperConfig::default().with_generation_timeout(Duration::from_secs(15));
    let backend = ScriptedBackend::new([]).with_default(ScriptedReply::Hang);
    let harness = TestHarness::with_backend(config, backend);

    for actor in ["npc-1", "npc-2", "npc-3"] {
        for mood in Mood::ALL {
            let request = DialogueRequest::new(actor, "你在做什麼")
                .with_context(DialogueContext::new().with_mood(mood));
            let response = harness.service().generate(request).await.unwrap();
            assert!(!response.reply.trim().is_empty(), "{actor}/{mood}");
            assert!(matches!(response.source, ReplySource::Fallback { .. }));
        }
    }
    assert_eq!(harness.service().status().cache_size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_queued_requests_share_one_deadline() {
    let config = WhisperConfig::default()
        .with_generation_timeout(Duration::from_secs(15))
        .with_max_concurrent_generations(1);
    let backend = ScriptedBackend::new([]).with_default(ScriptedReply::Hang);
    let harness = TestHarness::with_backend(config, backend);

    let started = tokio::time::Instant::now();
    let (a, b, c) = tokio::join!(
        harness.say("npc-1", "第一句", None),
        harness.say("npc-1", "第二句", None),
        harness.say("npc-1", "第三句", None),
    );

    assert!(started.elapsed() < Duration::from_secs(16));
    for response in [a.unwrap(), b.unwrap(), c.unwrap()] {
        assert!(matches!(response.source, ReplySource::Fallback { .. }));
        assert!(
            (15_000..16_000).contains(&response.elapsed_ms),
            "elapsed {} ms",
            response.elapsed_ms
        );
    }
}

#[tokio::test]
async fn test_unknown_actor_is_client_error() {
    let harness = TestHarness::new([]);
    let err = harness.say("npc-99", "hi", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::UnknownActor(id) if id == "npc-99"));
    assert_eq!(harness.backend().calls(), 0);
}

// =============================================================================
// SESSIONS
// =============================================================================

#[tokio::test]
async fn test_session_history_is_bounded() {
    let config = WhisperConfig::default().with_session_max_turns(20);
    let harness = TestHarness::with_config(config, []);

    for i in 0..13 {
        harness
            .say("npc-3", &format!("問題 {i}"), Some("long"))
            .await
            .unwrap();
    }

    let turns = harness
        .service()
        .orchestrator()
        .sessions()
        .turns("long")
        .unwrap();
    assert_eq!(turns.len(), 20);
    assert_eq!(turns[0].text, "問題 3");
    assert_eq!(turns[18].text, "問題 12");
}

#[tokio::test]
async fn test_cache_hit_still_records_exchange() {
    let harness = TestHarness::new([ScriptedReply::text("嗨！")]);

    harness.say("npc-2", "你好", Some("s1")).await.unwrap();
    harness.say("npc-2", "你好", Some("s1")).await.unwrap();

    let turns = harness
        .service()
        .orchestrator()
        .sessions()
        .turns("s1")
        .unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(harness.service().status().sessions_active, 1);
}

#[tokio::test]
async fn test_status_snapshot() {
    let harness = TestHarness::new([ScriptedReply::text("ok")]);
    harness.say("npc-1", "hi", Some("s1")).await.unwrap();

    let status = harness.service().status();
    assert_eq!(status.cache_size, 1);
    assert_eq!(status.sessions_active, 1);
    assert_eq!(status.personas_loaded, 3);
    assert!(!status.shared_cache_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_idle_sessions_are_evicted_on_next_request() {
    let config = WhisperConfig::default().with_session_idle_timeout(Duration::from_secs(60));
    let harness = TestHarness::with_config(config, []);

    harness.say("npc-1", "早安", Some("old")).await.unwrap();
    tokio::time::advance(Duration::from_secs(120)).await;
    harness.say("npc-1", "晚安", Some("new")).await.unwrap();

    let sessions = harness.service().orchestrator().sessions();
    assert!(sessions.turns("old").is_none());
    assert!(sessions.turns("new").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_idle_eviction_runs_at_most_once_per_quarter_timeout() {
    let config = WhisperConfig::default().with_session_idle_timeout(Duration::from_secs(60));
    let harness = TestHarness::with_config(config, []);
    let sessions = harness.service().orchestrator().sessions();

    harness.say("npc-1", "早安", Some("old")).await.unwrap();
    tokio::time::advance(Duration::from_secs(50)).await;
    harness.say("npc-1", "午安", Some("mid")).await.unwrap();

    // "old" is idle past the timeout, but the last sweep was 11s ago.
    tokio::time::advance(Duration::from_secs(11)).await;
    harness.say("npc-1", "晚安", Some("new")).await.unwrap();
    assert!(sessions.turns("old").is_some());

    tokio::time::advance(Duration::from_secs(5)).await;
    harness.say("npc-1", "晚安", Some("new")).await.unwrap();
    assert!(sessions.turns("old").is_none());
    assert!(sessions.turns("mid").is_some());
    assert!(sessions.turns("new").is_some());
}

#[tokio::test]
async fn test_concurrent_sessions_do_not_leak() {
    let backend = ScriptedBackend::new([]).with_default(ScriptedReply::Delayed(
        Duration::from_millis(10),
        "好的".to_string(),
    ));
    let harness = TestHarness::with_backend(WhisperConfig::default(), backend);

    let a = harness.say("npc-1", "我是 A", Some("a"));
    let b = harness.say("npc-2", "我是 B", Some("b"));
    let (a, b) = tokio::join!(a, b);
    a.unwrap();
    b.unwrap();

    let sessions = harness.service().orchestrator().sessions();
    assert_eq!(sessions.turns("a").unwrap()[0].text, "我是 A");
    assert_eq!(sessions.turns("b").unwrap()[0].text, "我是 B");
    assert_eq!(sessions.turns("a").unwrap().len(), 2);
}
