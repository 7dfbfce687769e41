use std::time::Duration;

use serde_json::{Value, json};
use thumbgen_core::locator::ResourceLocator;
use thumbgen_core::protocol::{Decoded, Envelope, Message};
use thumbgen_core::task::{FrameResult, Toast};

fn jpeg_stub() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9]
}

#[test]
fn test_messages_from_foreign_json() {
    let requests = [
        (r#"{"task":"fetchList","arguments":null}"#, Message::FetchList),
        (r#""fetchList""#, Message::FetchList),
        (
            r#"{"task":"getFirstFrame","arguments":"abc123"}"#,
            Message::GetFirstFrame("abc123".into()),
        ),
        (
            r#"{"task":"addToast","arguments":["Generated 2 video thumbnail(s)","success",null,4000]}"#,
            Message::AddToast(
                Toast::new("Generated 2 video thumbnail(s)", "success")
                    .with_duration(Duration::from_millis(4000)),
            ),
        ),
    ];

    for (text, expected) in requests {
        let data: Value = serde_json::from_str(text).unwrap();
        assert_eq!(Envelope::new(data).decode(), Decoded::Message(expected), "{text}");
    }
}

#[test]
fn test_set_frame_survives_json_transport() {
    let envelope = Message::SetFrame(FrameResult::new("abc123", jpeg_stub()).unwrap()).into_envelope();
    assert_eq!(envelope.task(), Some("setFrame"));

    // The payload travels beside the JSON, never inside it.
    let text = serde_json::to_string(&envelope.data).unwrap();
    assert!(!text.contains("255"), "{text}");

    let rebuilt = Envelope::with_transfer(serde_json::from_str(&text).unwrap(), envelope.transfer);
    let Decoded::Message(Message::SetFrame(frame)) = rebuilt.decode() else {
        panic!("setFrame did not decode");
    };
    assert_eq!(frame.id(), "abc123");
    assert_eq!(frame.payload(), jpeg_stub().as_slice());
}

#[test]
fn test_set_frame_rejects_non_jpeg_payload() {
    let data = json!({ "task": "setFrame", "arguments": { "id": "abc", "payload": { "$transfer": 0 } } });
    let envelope = Envelope::with_transfer(data, vec![b"GIF89a".to_vec()]);
    assert_eq!(envelope.decode(), Decoded::Malformed);
}

#[test]
fn test_toast_without_duration() {
    let data = json!({ "task": "addToast", "arguments": ["Saved", "info"] });
    let Decoded::Message(Message::AddToast(toast)) = Envelope::new(data).decode() else {
        panic!("toast did not decode");
    };
    assert_eq!(toast.message, "Saved");
    assert_eq!(toast.duration, None);
}

#[test]
fn test_locator_for_capture() {
    let locator = ResourceLocator::new("https://cdn.example/videos/", "abc123", 0.1);
    assert_eq!(locator.media_url(), "https://cdn.example/videos/abc123.mp4");
    assert_eq!(locator.to_string(), "https://cdn.example/videos/abc123.mp4#t=0.1");
}
