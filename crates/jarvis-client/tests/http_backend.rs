//! HTTP contract tests for `HttpBackend` against a local mock server.
//!
//! Run with:
//!   cargo test -p jarvis-client --test http_backend

use futures::StreamExt;
use jarvis_client::{Backend, ClientConfig, HttpBackend, TransportError};
use jarvis_core::{
    ChatId, CreateChatRequest, CreateProjectRequest, Message, NewTodo, ProjectId, PromptMode,
    PromptUpdate, RenameChatRequest, SendMessageRequest, TodoPatch,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend() -> (MockServer, HttpBackend) {
    let server = MockServer::start().await;
    let config = ClientConfig {
        base_url: server.uri(),
        ..ClientConfig::default()
    };
    let backend = HttpBackend::new(&config).unwrap();
    (server, backend)
}

// =============================================================================
// Projects
// =============================================================================

#[tokio::test]
async fn list_projects_tolerates_nulls_and_extra_fields() {
    let (server, backend) = backend().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1,
                "name": "Demo",
                "description": null,
                "system_prompt": "You are J.A.R.V.I.S.",
                "created_at": "2025-01-02T03:04:05.123456",
                "chats": []
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let projects = backend.list_projects().await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, ProjectId::new(1));
    assert_eq!(projects[0].description, "");
    assert!(projects[0].created_at.is_some());
}

#[tokio::test]
async fn create_project_posts_body() {
    let (server, backend) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/projects/"))
        .and(body_json(json!({
            "name": "Demo",
            "description": "",
            "system_prompt": ""
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "name": "Demo",
            "description": "",
            "system_prompt": "You are J.A.R.V.I.S."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let project = backend
        .create_project(&CreateProjectRequest {
            name: "Demo".into(),
            description: String::new(),
            system_prompt: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(project.id, ProjectId::new(5));
    assert_eq!(project.system_prompt, "You are J.A.R.V.I.S.");
}

#[tokio::test]
async fn update_prompt_puts_mode_and_content() {
    let (server, backend) = backend().await;
    Mock::given(method("PUT"))
        .and(path("/api/projects/5/prompt"))
        .and(body_json(json!({ "mode": "json_merge", "content": "{}" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "system_prompt": "{\"role\": \"butler\"}"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend
        .update_prompt(
            ProjectId::new(5),
            &PromptUpdate {
                mode: PromptMode::JsonMerge,
                content: "{}".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.status.as_deref(), Some("success"));
    assert_eq!(response.system_prompt.as_deref(), Some("{\"role\": \"butler\"}"));
}

#[tokio::test]
async fn delete_project_surfaces_status_and_body() {
    let (server, backend) = backend().await;
    Mock::given(method("DELETE"))
        .and(path("/api/projects/9"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string(r#"{"detail":"Project not found"}"#),
        )
        .mount(&server)
        .await;

    let err = backend.delete_project(ProjectId::new(9)).await.unwrap_err();
    match err {
        TransportError::Status { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("Project not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// =============================================================================
// Chats
// =============================================================================

#[tokio::test]
async fn chat_history_and_fetch() {
    let (server, backend) = backend().await;
    Mock::given(method("GET"))
        .and(path("/api/chat/history/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 3, "project_id": 1, "title": null, "created_at": null },
            { "id": 2, "project_id": 1, "title": "Older" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chat/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 3,
            "project_id": 1,
            "title": null,
            "messages": [
                { "id": 10, "role": "user", "content": "hi", "created_at": "2025-01-02T03:04:05" },
                { "id": 11, "role": "assistant", "content": "Hello!" }
            ]
        })))
        .mount(&server)
        .await;

    let chats = backend.list_chats(ProjectId::new(1)).await.unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].display_title(), "Untitled Chat");
    assert_eq!(chats[1].display_title(), "Older");

    let chat = backend.get_chat(ChatId::new(3)).await.unwrap();
    assert_eq!(
        chat.messages,
        vec![Message::user("hi"), Message::assistant("Hello!")]
    );
}

#[tokio::test]
async fn create_and_rename_chat() {
    let (server, backend) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/new"))
        .and(body_json(json!({ "project_id": 1, "title": "New Chat" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4, "project_id": 1, "title": "New Chat"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/chat/4"))
        .and(body_json(json!({ "project_id": 1, "title": "Renamed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4, "project_id": 1, "title": "Renamed", "messages": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = backend
        .create_chat(&CreateChatRequest {
            project_id: ProjectId::new(1),
            title: "New Chat".into(),
        })
        .await
        .unwrap();
    assert_eq!(chat.id, ChatId::new(4));

    let renamed = backend
        .rename_chat(
            chat.id,
            &RenameChatRequest {
                project_id: ProjectId::new(1),
                title: "Renamed".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.and_then(|c| c.title).as_deref(), Some("Renamed"));
}

#[tokio::test]
async fn rename_with_unexpected_body_is_still_ok() {
    let (server, backend) = backend().await;
    Mock::given(method("PUT"))
        .and(path("/api/chat/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let renamed = backend
        .rename_chat(
            ChatId::new(4),
            &RenameChatRequest {
                project_id: ProjectId::new(1),
                title: "x".into(),
            },
        )
        .await
        .unwrap();
    assert!(renamed.is_none());
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let (server, backend) = backend().await;
    Mock::given(method("GET"))
        .and(path("/api/chat/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = backend.get_chat(ChatId::new(1)).await.unwrap_err();
    assert!(matches!(err, TransportError::Parse(_)));
}

// =============================================================================
// Streaming
// =============================================================================

fn send_request() -> SendMessageRequest {
    SendMessageRequest {
        model: "qwen2.5-coder:7b".into(),
        messages: vec![Message::user("hello")],
        stream: true,
    }
}

#[tokio::test]
async fn send_message_streams_raw_body() {
    let (server, backend) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/3/message"))
        .and(body_json(json!({
            "model": "qwen2.5-coder:7b",
            "messages": [{ "role": "user", "content": "hello" }],
            "stream": true
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain; charset=utf-8")
                .set_body_string("Hello! ✓"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let mut body = backend
        .send_message(ChatId::new(3), &send_request(), &cancel)
        .await
        .unwrap();

    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend(chunk.unwrap());
    }
    assert_eq!(String::from_utf8(bytes).unwrap(), "Hello! ✓");
}

#[tokio::test]
async fn send_message_rejects_error_status() {
    let (server, backend) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/3/message"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model offline"))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let err = backend
        .send_message(ChatId::new(3), &send_request(), &cancel)
        .await
        .err()
        .unwrap();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("model offline"));
}

#[tokio::test]
async fn send_message_honours_cancellation_before_head() {
    let (server, backend) = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/3/message"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = backend
        .send_message(ChatId::new(3), &send_request(), &cancel)
        .await
        .err()
        .unwrap();
    assert!(err.is_cancelled());
}

// =============================================================================
// Models & Tools
// =============================================================================

#[tokio::test]
async fn models_and_todos() {
    let (server, backend) = backend().await;
    Mock::given(method("GET"))
        .and(path("/api/models/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "models": ["qwen2.5-coder:7b", "llama3"] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tools/todos"))
        .and(body_json(json!({ "text": "walk" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "a1", "text": "walk", "completed": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/tools/todos/a1"))
        .and(body_json(json!({ "completed": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "a1", "text": "walk", "completed": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/tools/todos/a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tools/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "summary": "Sunny" })))
        .mount(&server)
        .await;

    assert_eq!(
        backend.list_models().await.unwrap(),
        vec!["qwen2.5-coder:7b".to_string(), "llama3".to_string()]
    );

    let todo = backend
        .add_todo(&NewTodo {
            text: "walk".into(),
        })
        .await
        .unwrap();
    let todo_id = todo.id.as_deref().unwrap();
    let done = backend
        .update_todo(
            todo_id,
            &TodoPatch {
                text: None,
                completed: Some(true),
            },
        )
        .await
        .unwrap();
    assert!(done.completed);
    backend.delete_todo(todo_id).await.unwrap();

    assert_eq!(backend.weather().await.unwrap().summary, "Sunny");
}
