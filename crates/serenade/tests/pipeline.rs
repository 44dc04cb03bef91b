use std::f32::consts::PI;
use std::path::Path;

use serde_json::{json, Value};
use serenade::emotion::DEFAULT_FEATURE_KEYS;
use serenade::{Engine, EngineError};
use serenade_conf::GameConfig;
use tokio::net::UdpSocket;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_wav(path: &Path, freqs: &[f32], seconds: f32, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (seconds * sample_rate as f32) as usize;
    for i in 0..n {
        let t = i as f32 / sample_rate as f32;
        let v: f32 = freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() * 0.2;
        writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Format-0 SMF at 480 PPQ holding the given pitches for two beats.
fn held_chord_midi(pitches: &[u8]) -> Vec<u8> {
    let mut track = Vec::new();
    for &p in pitches {
        track.extend_from_slice(&[0x00, 0x90, p, 90]);
    }
    for (i, &p) in pitches.iter().enumerate() {
        // 960 ticks as a VLQ is 0x87 0x40
        if i == 0 {
            track.extend_from_slice(&[0x87, 0x40]);
        } else {
            track.push(0x00);
        }
        track.extend_from_slice(&[0x80, p, 0]);
    }
    track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&480u16.to_be_bytes());
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&track);
    bytes
}

async fn ollama(reply: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": reply},
            "done": true
        })))
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer, dir: &Path) -> GameConfig {
    let mut config = GameConfig::default();
    config.confidence_threshold = 0.0;
    config.dialogue.base_url = server.uri();
    config.dialogue.timeout_secs = 5;
    config.archive.path = Some(dir.join("archive/results.jsonl"));
    config
}

#[tokio::test]
async fn wav_runs_through_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("dm.wav");
    write_wav(&wav, &[293.66, 349.23, 440.0], 2.0, 22050);

    let server = ollama("The air grows heavy.").await;
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut config = config_for(&server, dir.path());
    config.broadcast.enabled = true;
    config.broadcast.address = "127.0.0.1".into();
    config.broadcast.port = receiver.local_addr().unwrap().port();

    let engine = Engine::from_config(&config).await.unwrap();
    assert_eq!(engine.sink_names(), vec!["osc", "archive"]);

    let result = engine.process_file(&wav).await.unwrap();

    assert_eq!(result.chord_label(), Some("Dm"));
    let emotion = result.emotion.as_ref().unwrap();
    let labels: Vec<&str> = emotion.probabilities.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, vec!["joyful", "melancholic", "tense", "calm"]);
    assert_eq!(result.dialogue.as_ref().unwrap().content, "The air grows heavy.");
    assert!(result.descriptors.number("tempo").is_some());
    assert_eq!(engine.history().await.len(), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    let state = body["messages"].as_array().unwrap().last().unwrap()["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(state.contains("Dm chord"), "{state}");

    let mut buf = [0u8; 512];
    let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
    assert!(buf[..n].starts_with(b"/music/chord/label\0"));

    let archived = std::fs::read_to_string(dir.path().join("archive/results.jsonl")).unwrap();
    let line: Value = serde_json::from_str(archived.lines().next().unwrap()).unwrap();
    assert_eq!(line["result"]["chord"]["label"], "Dm");
    assert_eq!(line["result"]["dialogue"]["content"], "The air grows heavy.");
}

#[tokio::test]
async fn midi_chord_uses_zeroed_descriptors() {
    let dir = tempfile::tempdir().unwrap();
    let midi = dir.path().join("dm.mid");
    std::fs::write(&midi, held_chord_midi(&[62, 65, 69])).unwrap();

    let server = ollama("Softly now.").await;
    let engine = Engine::from_config(&config_for(&server, dir.path())).await.unwrap();

    let result = engine.process_file(&midi).await.unwrap();

    assert_eq!(result.chord_label(), Some("Dm"));
    assert!(result.emotion.is_some());
    assert_eq!(result.dialogue.as_ref().unwrap().content, "Softly now.");
    let keys: Vec<&str> = result.descriptors.keys().collect();
    assert_eq!(keys, DEFAULT_FEATURE_KEYS.to_vec());
    assert!(result.descriptors.iter().all(|(_, v)| v.as_number() == Some(0.0)));
}

#[tokio::test]
async fn midi_without_notes_makes_no_backend_call() {
    let dir = tempfile::tempdir().unwrap();
    let midi = dir.path().join("silence.mid");
    std::fs::write(&midi, held_chord_midi(&[])).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let engine = Engine::from_config(&config_for(&server, dir.path())).await.unwrap();
    let result = engine.process_file(&midi).await.unwrap();

    assert!(result.chord.is_none());
    assert!(result.emotion.is_none());
    assert!(result.dialogue.is_none());
}

#[tokio::test]
async fn backend_down_still_returns_result() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("dm.wav");
    write_wav(&wav, &[293.66, 349.23, 440.0], 1.0, 22050);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .mount(&server)
        .await;

    let engine = Engine::from_config(&config_for(&server, dir.path())).await.unwrap();
    let result = engine.process_file(&wav).await.unwrap();

    assert_eq!(result.chord_label(), Some("Dm"));
    assert!(result.emotion.is_some());
    assert!(result.dialogue.is_none());
    assert!(engine.history().await.is_empty());
}

#[tokio::test]
async fn corrupt_wav_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("broken.wav");
    std::fs::write(&wav, b"RIFF\x00\x00\x00\x00WAVEjunk").unwrap();

    let server = ollama("unused").await;
    let engine = Engine::from_config(&config_for(&server, dir.path())).await.unwrap();

    let err = engine.process_file(&wav).await.unwrap_err();
    assert!(matches!(err, EngineError::Decode { .. }), "{err:?}");
}

#[tokio::test]
async fn mismatched_emotion_model_fails_setup() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("emotion.json");
    std::fs::write(
        &model,
        r#"{"feature_keys":["tempo"],"labels":["happy"],"means":[0.0],"scales":[1.0],"weights":[[1.0]],"biases":[0.0]}"#,
    )
    .unwrap();

    let server = MockServer::start().await;
    let mut config = config_for(&server, dir.path());
    config.emotion.model_path = Some(model);

    let err = Engine::from_config(&config).await.err().unwrap();
    assert!(matches!(err, EngineError::Emotion(_)), "{err:?}");
}
