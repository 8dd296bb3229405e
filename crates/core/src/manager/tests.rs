use std::sync::{Arc, Mutex};
use std::time::Duration;

use streamchat_model::{ConversationHistory, ErrorKind, Role, StreamState};
use streamchat_test_transport::{
    BodyStep, DONE_EVENT, PresetFailure, PresetResponse, TestTransport,
    delta_event,
};
use tokio::time::sleep;

use crate::{
    SendError, SessionConfig, SessionConfigBuilder, SessionHandle,
    SessionManager, SessionManagerBuilder,
};

fn manager(transport: &TestTransport) -> SessionManager {
    SessionManagerBuilder::with_transport(transport.clone()).build()
}

fn fallback() -> String {
    SessionConfig::default().fallback_message().to_owned()
}

async fn collect_updates(handle: &mut SessionHandle) -> Vec<String> {
    let mut contents = vec![];
    while let Some(event) = handle.updates().recv().await {
        assert_eq!(event.message_id, handle.message_id());
        contents.push(event.content);
    }
    contents
}

fn last_content(manager: &SessionManager) -> String {
    manager.history().last().unwrap().content.clone()
}

#[tokio::test]
async fn test_streams_into_placeholder() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        delta_event("Hel"),
        delta_event("lo"),
        DONE_EVENT.to_owned(),
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hi").unwrap();
    // Both messages are there before anything went over the wire.
    let history = manager.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.messages()[0].role, Role::User);
    assert_eq!(history.messages()[0].content, "Hi");
    assert_eq!(history.messages()[1].id, handle.message_id());
    assert!(history.messages()[1].is_placeholder());
    assert!(manager.is_streaming());

    let updates = collect_updates(&mut handle).await;
    assert_eq!(updates, ["Hel", "Hello"]);
    assert_eq!(handle.join().await.unwrap(), StreamState::Done);

    let history = manager.history();
    assert_eq!(history.last().unwrap().content, "Hello");
    assert_eq!(history.in_progress(), None);
    assert!(!manager.is_streaming());
}

#[tokio::test]
async fn test_update_matches_history() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::text(delta_event("one")),
        BodyStep::Delay(10),
        BodyStep::text(delta_event(" two")),
        BodyStep::text(DONE_EVENT),
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("count").unwrap();
    let event = handle.updates().recv().await.unwrap();
    assert_eq!(event.content, "one");
    assert_eq!(last_content(&manager), "one");
    let event = handle.updates().recv().await.unwrap();
    assert_eq!(event.content, "one two");
    handle.join().await.unwrap();
    assert_eq!(last_content(&manager), "one two");
}

#[tokio::test]
async fn test_sentinel_stops_reading() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        delta_event("Hi"),
        DONE_EVENT.to_owned(),
        delta_event(" there"),
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hello").unwrap();
    assert_eq!(collect_updates(&mut handle).await, ["Hi"]);
    assert_eq!(handle.join().await.unwrap(), StreamState::Done);
    assert_eq!(last_content(&manager), "Hi");
}

#[tokio::test]
async fn test_split_frame() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        "data: {\"cho",
        "ices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        "\ndata: [DONE]\n\n",
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hello").unwrap();
    assert_eq!(collect_updates(&mut handle).await, ["ok"]);
    assert_eq!(handle.join().await.unwrap(), StreamState::Done);
}

#[tokio::test]
async fn test_split_utf8() {
    let event = delta_event("héllo 👋");
    let bytes = event.as_bytes();
    // Cut in the middle of the emoji.
    let cut = event.find('👋').unwrap() + 2;
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::Chunk(bytes[..cut].to_vec()),
        BodyStep::Chunk(bytes[cut..].to_vec()),
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hello").unwrap();
    assert_eq!(collect_updates(&mut handle).await, ["héllo 👋"]);
    assert_eq!(handle.join().await.unwrap(), StreamState::Done);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_suppresses_updates() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::text(delta_event("Hel")),
        BodyStep::Delay(100),
        BodyStep::text(delta_event("lo")),
        BodyStep::text(DONE_EVENT),
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hi").unwrap();
    let event = handle.updates().recv().await.unwrap();
    assert_eq!(event.content, "Hel");

    assert!(handle.cancel());
    assert_eq!(handle.state(), StreamState::Aborted);
    assert!(!manager.is_streaming());
    let history = manager.history();

    assert!(handle.updates().recv().await.is_none());
    sleep(Duration::from_millis(500)).await;
    assert_eq!(manager.history(), history);
    assert_eq!(last_content(&manager), "Hel");

    assert!(!handle.cancel());
    assert_eq!(handle.join().await.unwrap(), StreamState::Aborted);
}

#[tokio::test]
async fn test_cancel_drops_queued_updates() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::text(delta_event("A")),
        BodyStep::text(delta_event("B")),
        BodyStep::Hang,
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hi").unwrap();
    let mut history_rx = manager.subscribe();
    history_rx
        .wait_for(|history| {
            history.last().is_some_and(|msg| msg.content == "AB")
        })
        .await
        .unwrap();

    // Both updates are queued, and none of them has been received.
    assert!(handle.cancel());
    assert_eq!(handle.state(), StreamState::Aborted);
    assert_eq!(handle.updates().try_latest(), None);
    assert!(collect_updates(&mut handle).await.is_empty());
    assert_eq!(handle.join().await.unwrap(), StreamState::Aborted);
    assert_eq!(last_content(&manager), "AB");
}

#[tokio::test]
async fn test_stream_of_updates_ends_on_cancel() {
    use futures_util::StreamExt as _;

    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::text(delta_event("A")),
        BodyStep::text(delta_event("B")),
        BodyStep::Hang,
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hi").unwrap();
    let mut history_rx = manager.subscribe();
    history_rx
        .wait_for(|history| {
            history.last().is_some_and(|msg| msg.content == "AB")
        })
        .await
        .unwrap();

    let canceller = handle.canceller();
    assert!(canceller.cancel());
    assert_eq!(handle.updates().next().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_awaiting() {
    let transport = TestTransport::default();
    transport.push_response(
        PresetResponse::with_chunks([delta_event("late"), DONE_EVENT.to_owned()])
            .with_delay_ms(1000),
    );
    let manager = manager(&transport);

    let handle = manager.send("Hi").unwrap();
    assert_eq!(handle.state(), StreamState::Awaiting);
    let canceller = handle.canceller();
    assert!(manager.cancel_current());
    assert!(!manager.cancel_current());
    assert!(!canceller.cancel());

    assert_eq!(handle.join().await.unwrap(), StreamState::Aborted);
    // Aborting is silent: no fallback.
    assert!(manager.history().last().unwrap().is_placeholder());
}

#[tokio::test]
async fn test_cancel_after_done_is_noop() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        delta_event("Hi"),
        DONE_EVENT.to_owned(),
    ]));
    let manager = manager(&transport);

    let handle = manager.send("Hello").unwrap();
    let state_rx = handle.watch_state();
    let canceller = handle.canceller();
    assert_eq!(handle.join().await.unwrap(), StreamState::Done);

    assert!(!canceller.cancel());
    assert_eq!(*state_rx.borrow(), StreamState::Done);
    assert_eq!(last_content(&manager), "Hi");
}

#[tokio::test]
async fn test_new_send_cancels_previous() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::text(delta_event("A")),
        BodyStep::Hang,
    ]));
    transport.push_response(PresetResponse::with_chunks([
        delta_event("B"),
        DONE_EVENT.to_owned(),
    ]));
    let manager = manager(&transport);

    let mut first = manager.send("one").unwrap();
    assert_eq!(first.updates().recv().await.unwrap().content, "A");
    let mut second = manager.send("two").unwrap();
    assert_eq!(first.state(), StreamState::Aborted);
    assert!(manager.is_streaming());

    assert_eq!(collect_updates(&mut second).await, ["B"]);
    assert_eq!(first.join().await.unwrap(), StreamState::Aborted);
    assert_eq!(second.join().await.unwrap(), StreamState::Done);

    let contents: Vec<_> = manager
        .history()
        .messages()
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect();
    assert_eq!(
        contents,
        [
            (Role::User, "one".to_owned()),
            (Role::Assistant, "A".to_owned()),
            (Role::User, "two".to_owned()),
            (Role::Assistant, "B".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_placeholders_are_not_sent() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([BodyStep::Hang]));
    transport.push_response(PresetResponse::with_steps([BodyStep::Hang]));
    let manager = manager(&transport);

    let first = manager.send("hi").unwrap();
    let second = manager.send("again").unwrap();

    let history = manager.history();
    let placeholders: Vec<_> = history
        .messages()
        .iter()
        .filter(|m| m.is_placeholder())
        .collect();
    assert_eq!(placeholders.len(), 1);
    assert_eq!(placeholders[0].id, second.message_id());
    assert!(history.get(first.message_id()).is_none());

    let requests = transport.requests();
    let sent: Vec<_> = requests[1]
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(sent, [(Role::User, "hi"), (Role::User, "again")]);
    assert!(requests[1].stream);

    manager.cancel_current();
    assert_eq!(second.join().await.unwrap(), StreamState::Aborted);
}

#[tokio::test]
async fn test_failure_before_content() {
    let cases = [
        (PresetFailure::Status(500), ErrorKind::HttpStatus, Some(500)),
        (PresetFailure::Network, ErrorKind::Network, None),
        (PresetFailure::EmptyBody, ErrorKind::EmptyBody, None),
    ];
    for (failure, kind, status) in cases {
        let transport = TestTransport::default();
        transport.push_response(PresetResponse::failing(failure));
        let manager = manager(&transport);

        let mut handle = manager.send("Hi").unwrap();
        assert!(collect_updates(&mut handle).await.is_empty());
        let state_rx = handle.watch_state();
        let err = handle.join().await.unwrap_err();
        assert_eq!(err.kind(), kind);
        assert_eq!(err.status(), status);
        assert_eq!(*state_rx.borrow(), StreamState::Failed(kind));

        assert_eq!(last_content(&manager), fallback());
        assert!(!manager.is_streaming());
    }
}

#[tokio::test]
async fn test_failure_mid_stream_keeps_content() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::text(delta_event("Hel")),
        BodyStep::Fail("connection reset".to_owned()),
    ]));
    let manager = manager(&transport);

    let handle = manager.send("Hi").unwrap();
    let err = handle.join().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(last_content(&manager), "Hel");
}

#[tokio::test]
async fn test_custom_fallback() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::failing(PresetFailure::Network));
    let manager = SessionManagerBuilder::with_transport(transport)
        .with_config(
            SessionConfigBuilder::new()
                .with_model("test")
                .with_fallback_message("Oops.")
                .build(),
        )
        .build();

    manager.send("Hi").unwrap().join().await.unwrap_err();
    assert_eq!(last_content(&manager), "Oops.");
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout() {
    let config = SessionConfigBuilder::new()
        .with_model("test")
        .with_idle_timeout(Some(Duration::from_secs(5)))
        .build();
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_steps([
        BodyStep::text(delta_event("Hi")),
        BodyStep::Hang,
    ]));
    transport.push_response(PresetResponse::with_steps([BodyStep::Hang]));
    let manager = SessionManagerBuilder::with_transport(transport)
        .with_config(config)
        .build();

    let err = manager.send("one").unwrap().join().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdleTimeout);
    assert_eq!(last_content(&manager), "Hi");

    let err = manager.send("two").unwrap().join().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdleTimeout);
    assert_eq!(last_content(&manager), fallback());
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout() {
    let config = SessionConfigBuilder::new()
        .with_model("test")
        .with_request_timeout(Some(Duration::from_secs(1)))
        .build();
    let transport = TestTransport::default();
    transport.push_response(
        PresetResponse::with_chunks([DONE_EVENT]).with_delay_ms(10_000),
    );
    let manager = SessionManagerBuilder::with_transport(transport)
        .with_config(config)
        .build();

    let mut handle = manager.send("Hi").unwrap();
    let state_rx = handle.watch_state();
    assert!(collect_updates(&mut handle).await.is_empty());
    let err = handle.join().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RequestTimeout);
    assert_eq!(err.status(), None);
    assert_eq!(
        *state_rx.borrow(),
        StreamState::Failed(ErrorKind::RequestTimeout)
    );
    assert_eq!(last_content(&manager), fallback());
}

#[tokio::test]
async fn test_eof_without_sentinel() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        delta_event("a"),
        r#"data: {"choices":[{"delta":{"content":"b"}}]}"#.to_owned(),
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hi").unwrap();
    assert_eq!(collect_updates(&mut handle).await, ["a", "ab"]);
    assert_eq!(handle.join().await.unwrap(), StreamState::Done);
}

#[tokio::test]
async fn test_skips_noise() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        ": keep-alive\n\n",
        "event: message\nid: 1\n",
        "data: not json\n\n",
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        delta_event("ok").as_str(),
        DONE_EVENT,
    ]));
    let manager = manager(&transport);

    let mut handle = manager.send("Hi").unwrap();
    assert_eq!(collect_updates(&mut handle).await, ["ok"]);
    assert_eq!(handle.join().await.unwrap(), StreamState::Done);
}

#[tokio::test]
async fn test_upstream_error() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        "data: {\"error\":{\"message\":\"model overloaded\"}}\n\n",
    ]));
    let manager = manager(&transport);

    let err = manager.send("Hi").unwrap().join().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(err.message(), "model overloaded");
    assert_eq!(last_content(&manager), fallback());
}

#[tokio::test]
async fn test_empty_input() {
    let transport = TestTransport::default();
    let manager = manager(&transport);

    assert_eq!(manager.send("").err(), Some(SendError::EmptyInput));
    assert_eq!(manager.send(" \n\t").err(), Some(SendError::EmptyInput));
    assert!(manager.history().is_empty());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_input_is_kept_verbatim() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([DONE_EVENT]));
    let manager = manager(&transport);

    manager.send("  hi  ").unwrap().join().await.unwrap();
    assert_eq!(manager.history().messages()[0].content, "  hi  ");
    assert_eq!(transport.requests()[0].messages[0].content, "  hi  ");
}

#[tokio::test]
async fn test_system_prompt_and_model() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([DONE_EVENT]));
    let manager = SessionManagerBuilder::with_transport(transport.clone())
        .with_system_prompt("Be brief.")
        .with_config(SessionConfigBuilder::new().with_model("tiny").build())
        .build();

    manager.send("hi").unwrap().join().await.unwrap();
    let request = &transport.requests()[0];
    assert_eq!(request.model, "tiny");
    let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::System, Role::User]);
}

#[tokio::test]
async fn test_callbacks() {
    let contents = Arc::new(Mutex::new(vec![]));
    let streaming = Arc::new(Mutex::new(vec![]));
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        delta_event("Hi"),
        DONE_EVENT.to_owned(),
    ]));
    let manager = SessionManagerBuilder::with_transport(transport)
        .on_messages_changed({
            let contents = Arc::clone(&contents);
            move |history: &ConversationHistory| {
                let last = history.last().unwrap().content.clone();
                contents.lock().unwrap().push((history.len(), last));
            }
        })
        .on_streaming_changed({
            let streaming = Arc::clone(&streaming);
            move |value: bool| streaming.lock().unwrap().push(value)
        })
        .build();

    manager.send("Hello").unwrap().join().await.unwrap();

    assert_eq!(
        *contents.lock().unwrap(),
        [(2, String::new()), (2, "Hi".to_owned())]
    );
    assert_eq!(*streaming.lock().unwrap(), [true, false]);
}

#[tokio::test]
async fn test_clear() {
    let transport = TestTransport::default();
    transport.push_response(PresetResponse::with_chunks([
        delta_event("Hi"),
        DONE_EVENT.to_owned(),
    ]));
    transport.push_response(PresetResponse::with_steps([BodyStep::Hang]));
    let manager = manager(&transport);

    manager.send("Hello").unwrap().join().await.unwrap();
    let handle = manager.send("Again").unwrap();
    let mut history_rx = manager.subscribe();

    manager.clear();
    assert!(history_rx.has_changed().unwrap());
    assert!(history_rx.borrow_and_update().is_empty());
    assert!(!manager.is_streaming());
    assert_eq!(handle.join().await.unwrap(), StreamState::Aborted);
    assert!(manager.history().is_empty());
}
