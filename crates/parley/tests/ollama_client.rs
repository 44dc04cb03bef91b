use std::time::Duration;

use earshot::Descriptors;
use parley::{DialogueError, DialogueGenerator, DialogueRequest, DialogueTurn, OllamaDialogue, Role};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OllamaDialogue {
    OllamaDialogue::new(Some(&server.uri()), "llama3", Duration::from_secs(5))
        .unwrap()
        .with_system_prompt("You are a bard.")
}

fn request<'a>(descriptors: &'a Descriptors, history: &'a [DialogueTurn]) -> DialogueRequest<'a> {
    DialogueRequest {
        emotion_label: "tense",
        chord_label: "Dm",
        descriptors,
        history,
    }
}

#[tokio::test]
async fn posts_chat_and_returns_assistant_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "  The shadows lengthen.  "},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let descriptors = Descriptors::new();
    let turn = client(&server).generate(request(&descriptors, &[])).await.unwrap();

    assert_eq!(turn.role, Role::Assistant);
    assert_eq!(turn.content, "The shadows lengthen.");
}

#[tokio::test]
async fn history_is_sent_in_order_between_system_and_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Again?"}
        })))
        .mount(&server)
        .await;

    let descriptors = Descriptors::new();
    let history = vec![DialogueTurn::assistant("one"), DialogueTurn::assistant("two")];
    client(&server)
        .generate(request(&descriptors, &history))
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: Value = received[0].body_json().unwrap();
    let messages = body["messages"].as_array().unwrap();

    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], "You are a bard.");
    assert_eq!(messages[1]["content"], "one");
    assert_eq!(messages[2]["content"], "two");
    assert_eq!(messages[3]["role"], "user");
    assert!(messages[3]["content"].as_str().unwrap().contains("Dm"));
}

#[tokio::test]
async fn non_success_status_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let descriptors = Descriptors::new();
    let err = client(&server).generate(request(&descriptors, &[])).await.unwrap_err();

    match err {
        DialogueError::Status { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "model not found");
        }
        other => panic!("expected Status, got {:?}", other),
    }
}

#[tokio::test]
async fn blank_content_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "   "}
        })))
        .mount(&server)
        .await;

    let descriptors = Descriptors::new();
    let err = client(&server).generate(request(&descriptors, &[])).await.unwrap_err();
    assert!(matches!(err, DialogueError::Malformed(_)));
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let descriptors = Descriptors::new();
    let err = client(&server).generate(request(&descriptors, &[])).await.unwrap_err();
    assert!(matches!(err, DialogueError::Malformed(_)));
}

#[tokio::test]
async fn refused_connection_is_unavailable() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let base = format!("http://127.0.0.1:{}", port);
    let dialogue = OllamaDialogue::new(Some(&base), "llama3", Duration::from_secs(2)).unwrap();

    let descriptors = Descriptors::new();
    let err = dialogue.generate(request(&descriptors, &[])).await.unwrap_err();
    assert!(matches!(err, DialogueError::Unavailable(_)));
}

#[test]
fn trailing_slash_trimmed_from_base_url() {
    let dialogue =
        OllamaDialogue::new(Some("http://gpu:11434/"), "mistral", Duration::from_secs(1)).unwrap();
    assert_eq!(dialogue.base_url(), "http://gpu:11434");
}
