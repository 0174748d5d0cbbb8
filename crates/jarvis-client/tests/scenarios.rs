//! End-to-end scenarios driving a `Workspace` against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use jarvis_client::mock::{MockBackend, MockReply};
use jarvis_client::{
    Backend, ClientConfig, ConversationStatus, SendEvent, StreamOutcome, Transition, TurnEvent,
    Workspace, WorkspaceError, ERROR_MARKER,
};
use jarvis_core::{Message, Role, ValidationError};
use tokio::sync::mpsc::UnboundedReceiver;

fn workspace(backend: &Arc<MockBackend>) -> (Workspace, UnboundedReceiver<TurnEvent>) {
    let config = ClientConfig {
        context_window: 4,
        ..ClientConfig::default()
    };
    Workspace::new(Arc::clone(backend) as Arc<dyn Backend>, config)
}

/// Apply events until the running turn ends, returning every transition seen.
async fn drain(ws: &mut Workspace, rx: &mut UnboundedReceiver<TurnEvent>) -> Vec<Transition> {
    let mut transitions = Vec::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.event.is_terminal();
        if let Some(t) = ws.apply_turn_event(event) {
            transitions.push(t);
        }
        if terminal {
            break;
        }
    }
    transitions
}

/// Apply events until the reply stream has been opened.
async fn until_streaming(ws: &mut Workspace, rx: &mut UnboundedReceiver<TurnEvent>) {
    while let Some(event) = rx.recv().await {
        let accepted = event.event == SendEvent::Accepted;
        ws.apply_turn_event(event);
        if accepted {
            return;
        }
    }
}

fn transcript(ws: &Workspace) -> Vec<(Role, String)> {
    ws.conversation()
        .unwrap()
        .messages()
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect()
}

#[tokio::test]
async fn demo_project_hello_round_trip() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::chunks(["He", "llo", "!"]));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;

    let project_id = ws.create_project("Demo", "", "").await.unwrap();
    let chats = ws.cache().chats(project_id);
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].display_title(), "New Chat");
    assert_eq!(ws.active_chat(), Some(chats[0].id));
    assert_eq!(ws.active_project().map(|p| p.name.as_str()), Some("Demo"));

    ws.submit("hello").unwrap();
    assert_eq!(ws.conversation().unwrap().status(), ConversationStatus::Sending);

    let transitions = drain(&mut ws, &mut rx).await;
    assert_eq!(transitions.first(), Some(&Transition::StreamOpened));
    assert_eq!(
        transitions.last(),
        Some(&Transition::Finished(StreamOutcome::Completed))
    );

    assert_eq!(
        transcript(&ws),
        vec![
            (Role::User, "hello".to_string()),
            (Role::Assistant, "Hello!".to_string()),
        ]
    );
    assert_eq!(ws.conversation().unwrap().status(), ConversationStatus::Idle);
}

#[tokio::test]
async fn multibyte_split_across_chunks() {
    let backend = Arc::new(MockBackend::new());
    let bytes = "naïve ☕".as_bytes().to_vec();
    // Split inside 'ï' and inside the cup.
    backend.push_reply(MockReply::chunks([&bytes[..3], &bytes[3..9], &bytes[9..]]));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();

    ws.submit("coffee?").unwrap();
    drain(&mut ws, &mut rx).await;
    assert_eq!(transcript(&ws)[1].1, "naïve ☕");
}

#[tokio::test]
async fn stop_before_any_delta_keeps_empty_reply() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::chunks_then_hang(Vec::<&[u8]>::new()));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();

    ws.submit("ping").unwrap();
    until_streaming(&mut ws, &mut rx).await;
    assert_eq!(ws.conversation().unwrap().status(), ConversationStatus::Streaming);

    assert_eq!(ws.request_stop(), Some(Transition::StopRequested));
    let transitions = drain(&mut ws, &mut rx).await;
    assert_eq!(
        transitions,
        vec![Transition::Finished(StreamOutcome::Cancelled)]
    );

    assert_eq!(
        transcript(&ws),
        vec![
            (Role::User, "ping".to_string()),
            (Role::Assistant, String::new()),
        ]
    );
    assert!(!ws.conversation().unwrap().messages()[1]
        .content
        .contains(ERROR_MARKER));
}

#[tokio::test]
async fn stop_mid_stream_freezes_content() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::chunks_then_hang(["Once upon"]));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();

    ws.submit("story").unwrap();
    while let Some(event) = rx.recv().await {
        let delta = matches!(event.event, SendEvent::Delta(_));
        ws.apply_turn_event(event);
        if delta {
            break;
        }
    }
    ws.request_stop();
    drain(&mut ws, &mut rx).await;

    let conversation = ws.conversation().unwrap();
    assert!(conversation.is_idle());
    assert_eq!(conversation.messages()[1].content, "Once upon");
}

#[tokio::test]
async fn rejected_send_writes_marker() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::Reject {
        status: 500,
        body: "model offline".into(),
    });
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();

    ws.submit("hello").unwrap();
    let transitions = drain(&mut ws, &mut rx).await;
    assert_eq!(
        transitions,
        vec![Transition::Finished(StreamOutcome::Failed)]
    );

    let reply = &transcript(&ws)[1];
    assert_eq!(reply.0, Role::Assistant);
    assert!(reply.1.starts_with(ERROR_MARKER));
    assert!(reply.1.contains("model offline"));
}

#[tokio::test]
async fn body_failure_without_deltas_writes_marker() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::chunks_then_error(
        Vec::<&[u8]>::new(),
        "connection reset",
    ));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();

    ws.submit("hello").unwrap();
    drain(&mut ws, &mut rx).await;

    assert_eq!(
        transcript(&ws)[1].1,
        format!("{ERROR_MARKER}\nconnection reset")
    );
}

#[tokio::test]
async fn second_send_while_streaming_is_rejected() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::chunks_then_hang(["..."]));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();

    ws.submit("first").unwrap();
    until_streaming(&mut ws, &mut rx).await;

    let err = ws.submit("second").unwrap_err();
    assert!(matches!(err, WorkspaceError::Validation(ValidationError::Busy)));
    assert_eq!(ws.conversation().unwrap().messages().len(), 2);
    assert_eq!(backend.sent().len(), 1);
}

#[tokio::test]
async fn blank_submit_is_noop() {
    let backend = Arc::new(MockBackend::new());
    let (mut ws, _rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();

    let err = ws.submit("   ").unwrap_err();
    assert!(matches!(
        err,
        WorkspaceError::Validation(ValidationError::EmptyMessage)
    ));
    assert!(ws.conversation().unwrap().messages().is_empty());
    assert!(ws.conversation().unwrap().is_idle());
    assert!(backend.sent().is_empty());
}

#[tokio::test]
async fn outbound_context_is_windowed() {
    let backend = Arc::new(MockBackend::new());
    let project = backend.seed_project("Demo");
    let history: Vec<Message> = (0..6)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("q{i}"))
            } else {
                Message::assistant(format!("a{i}"))
            }
        })
        .collect();
    let chat = backend.seed_chat(project.id, "Long", history);
    backend.push_reply(MockReply::chunks(["ok"]));

    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.select_project(project.id).await;
    ws.open_chat(chat.id).await.unwrap();

    ws.submit("latest").unwrap();
    drain(&mut ws, &mut rx).await;

    let (sent_to, request) = backend.sent().remove(0);
    assert_eq!(sent_to, chat.id);
    let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["a3", "q4", "a5", "latest"]);
    // The visible transcript keeps everything.
    assert_eq!(ws.conversation().unwrap().messages().len(), 8);
}

#[tokio::test]
async fn chat_list_loads_once_per_project() {
    let backend = Arc::new(MockBackend::new());
    let project = backend.seed_project("Demo");
    backend.seed_chat(project.id, "one", Vec::new());
    let (mut ws, _rx) = workspace(&backend);
    ws.refresh_projects().await;

    assert!(ws.expand_project(project.id).await);
    assert!(!ws.expand_project(project.id).await);
    ws.select_project(project.id).await;
    assert_eq!(backend.calls("list_chats"), 1);
    assert_eq!(ws.cache().chats(project.id).len(), 1);
}

#[tokio::test]
async fn deleting_active_chat_clears_reference() {
    let backend = Arc::new(MockBackend::new());
    let project = backend.seed_project("Other");
    let stray = backend.seed_chat(project.id, "stray", vec![Message::user("hi")]);
    let (mut ws, _rx) = workspace(&backend);
    ws.refresh_projects().await;

    // Opened without expanding its project first.
    ws.open_chat(stray.id).await.unwrap();
    assert_eq!(ws.active_chat(), Some(stray.id));
    assert_eq!(ws.active_project_id(), Some(project.id));
    assert!(ws.cache().find_chat(stray.id).is_some());

    ws.delete_chat(stray.id).await.unwrap();
    assert_eq!(ws.active_chat(), None);
    assert!(ws.conversation().is_none());
    assert!(ws.cache().find_chat(stray.id).is_none());
    assert!(!backend.has_chat(stray.id));
}

#[tokio::test]
async fn deleting_project_evicts_its_chats() {
    let backend = Arc::new(MockBackend::new());
    let keep = backend.seed_project("Keep");
    let (mut ws, _rx) = workspace(&backend);
    ws.refresh_projects().await;
    let doomed = ws.create_project("Doomed", "", "").await.unwrap();
    let chat_id = ws.active_chat().unwrap();

    ws.delete_project(doomed).await.unwrap();
    assert!(ws.cache().project(doomed).is_none());
    assert!(ws.cache().chats(doomed).is_empty());
    assert!(ws.cache().find_chat(chat_id).is_none());
    assert_eq!(ws.active_chat(), None);
    assert_eq!(ws.active_project_id(), None);
    assert!(ws.cache().project(keep.id).is_some());
}

#[tokio::test]
async fn failed_delete_leaves_cache_alone() {
    let backend = Arc::new(MockBackend::new());
    let (mut ws, _rx) = workspace(&backend);
    ws.refresh_projects().await;
    let project_id = ws.create_project("Demo", "", "").await.unwrap();
    let chat_id = ws.active_chat().unwrap();

    backend.fail("delete_chat", 500);
    assert!(ws.delete_chat(chat_id).await.is_err());
    assert!(ws.cache().find_chat(chat_id).is_some());
    assert_eq!(ws.active_chat(), Some(chat_id));
    assert_eq!(ws.cache().chats(project_id).len(), 1);
}

#[tokio::test]
async fn navigating_away_detaches_running_turn() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::chunks(["background reply"]));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    let project_id = ws.create_project("Demo", "", "").await.unwrap();
    let first = ws.active_chat().unwrap();

    ws.submit("hello").unwrap();
    let second = ws.create_chat(project_id, "Second").await.unwrap();
    assert_eq!(ws.active_chat(), Some(second));

    let transitions = drain(&mut ws, &mut rx).await;
    assert!(transitions.is_empty());
    assert!(!ws.is_in_flight(first));
    assert!(ws.conversation().unwrap().messages().is_empty());
}

#[tokio::test]
async fn reopened_chat_can_stop_its_detached_turn() {
    let backend = Arc::new(MockBackend::new());
    backend.push_reply(MockReply::chunks_then_hang(["partial"]));
    let (mut ws, mut rx) = workspace(&backend);
    ws.refresh_projects().await;
    ws.create_project("Demo", "", "").await.unwrap();
    let chat_id = ws.active_chat().unwrap();

    ws.submit("hello").unwrap();
    until_streaming(&mut ws, &mut rx).await;
    let delta = rx.recv().await.unwrap();
    assert_eq!(delta.event, SendEvent::Delta("partial".into()));
    ws.apply_turn_event(delta);

    ws.close_chat();
    ws.open_chat(chat_id).await.unwrap();
    assert!(ws.has_detached_turn());
    let err = ws.submit("again").unwrap_err();
    assert!(matches!(err, WorkspaceError::Validation(ValidationError::Busy)));

    assert_eq!(ws.request_stop(), Some(Transition::StopRequested));
    assert_eq!(ws.request_stop(), None);

    let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("cancellation reaches the running turn")
        .unwrap();
    assert_eq!(event.event, SendEvent::Cancelled);
    assert_eq!(ws.apply_turn_event(event), None);
    assert!(!ws.is_in_flight(chat_id));
    assert!(!ws.has_detached_turn());

    backend.push_reply(MockReply::chunks(["ok"]));
    ws.submit("again").unwrap();
    let transitions = drain(&mut ws, &mut rx).await;
    assert_eq!(
        transitions.last(),
        Some(&Transition::Finished(StreamOutcome::Completed))
    );
}
