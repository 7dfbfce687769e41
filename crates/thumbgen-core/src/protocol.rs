//! Tagged messages exchanged between the worker process and the main context.
//!
//! On the wire every message is a structured value of the form
//! `{"task": <tag>, "arguments": <args>}` carried in an [`Envelope`] together
//! with a transfer list of binary buffers. Buffers are referenced from the
//! structured value as `{"$transfer": <index>}` and are moved out of the
//! envelope when it is decoded.
//!
//! Decoding is deliberately lenient: anything that is not a well-formed
//! message decodes to [`Decoded::Malformed`], and tags this side does not know
//! decode to [`Decoded::Unknown`]. Receivers drop both without raising an error.

use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::task::{FrameResult, Toast};

pub const TASK_KEY: &str = "task";
pub const ARGUMENTS_KEY: &str = "arguments";
pub const TRANSFER_KEY: &str = "$transfer";

/// Tags understood by this crate.
pub mod tags {
    pub const FETCH_LIST: &str = "fetchList";
    pub const GET_FIRST_FRAME: &str = "getFirstFrame";
    pub const SET_FRAME: &str = "setFrame";
    pub const ADD_TOAST: &str = "addToast";
    pub const ABANDON_FRAME: &str = "abandonFrame";
}

/// The unit carried by the bridge transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub data: Value,
    /// Buffers handed over with the message. Ownership moves with the envelope.
    pub transfer: Vec<Vec<u8>>,
}

impl Envelope {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            transfer: Vec::new(),
        }
    }

    pub fn with_transfer(data: Value, transfer: Vec<Vec<u8>>) -> Self {
        Self { data, transfer }
    }

    /// The `task` tag, if the envelope carries one.
    pub fn task(&self) -> Option<&str> {
        self.data.get(TASK_KEY).and_then(Value::as_str)
    }

    /// Decode into a [`Message`], moving any transferred buffers out.
    pub fn decode(self) -> Decoded {
        let Envelope { data, mut transfer } = self;

        let mut object = match data {
            // Older workers kick things off with a bare string.
            Value::String(s) if s == tags::FETCH_LIST => {
                return Decoded::Message(Message::FetchList);
            }
            Value::Object(object) => object,
            _ => return Decoded::Malformed,
        };

        if !object.contains_key(TASK_KEY) || !object.contains_key(ARGUMENTS_KEY) {
            return Decoded::Malformed;
        }
        let Some(Value::String(task)) = object.remove(TASK_KEY) else {
            return Decoded::Malformed;
        };
        let arguments = object.remove(ARGUMENTS_KEY).unwrap_or(Value::Null);

        let message = match task.as_str() {
            tags::FETCH_LIST => Some(Message::FetchList),
            tags::GET_FIRST_FRAME => match arguments {
                Value::String(id) if !id.is_empty() => Some(Message::GetFirstFrame(id)),
                _ => None,
            },
            tags::SET_FRAME => decode_set_frame(arguments, &mut transfer).map(Message::SetFrame),
            tags::ADD_TOAST => decode_toast(&arguments).map(Message::AddToast),
            tags::ABANDON_FRAME => match arguments {
                Value::String(id) if !id.is_empty() => Some(Message::AbandonFrame(id)),
                _ => None,
            },
            _ => return Decoded::Unknown(task),
        };

        message.map_or(Decoded::Malformed, Decoded::Message)
    }
}

/// Result of decoding an [`Envelope`].
#[derive(Debug, PartialEq)]
pub enum Decoded {
    Message(Message),
    /// Well-formed, but the tag is not one this side understands.
    Unknown(String),
    /// Not a message at all, or arguments of the wrong shape.
    Malformed,
}

#[derive(Debug, PartialEq)]
pub enum Message {
    /// Main context → worker: pull the pending list.
    FetchList,
    /// Worker → main context: capture the first frame of this video.
    GetFirstFrame(String),
    /// Main context → worker: the captured frame.
    SetFrame(FrameResult),
    /// Worker → main context: show a notification.
    AddToast(Toast),
    /// Main context → worker: no frame will come for this video.
    AbandonFrame(String),
}

impl Message {
    pub fn tag(&self) -> &'static str {
        match self {
            Message::FetchList => tags::FETCH_LIST,
            Message::GetFirstFrame(_) => tags::GET_FIRST_FRAME,
            Message::SetFrame(_) => tags::SET_FRAME,
            Message::AddToast(_) => tags::ADD_TOAST,
            Message::AbandonFrame(_) => tags::ABANDON_FRAME,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let tag = self.tag();
        let (arguments, transfer) = match self {
            Message::FetchList => (Value::Null, Vec::new()),
            Message::GetFirstFrame(id) | Message::AbandonFrame(id) => {
                (Value::String(id), Vec::new())
            }
            Message::SetFrame(frame) => {
                let (id, payload) = frame.into_parts();
                (
                    json!({ "id": id, "payload": { TRANSFER_KEY: 0 } }),
                    vec![payload],
                )
            }
            Message::AddToast(toast) => {
                let duration_ms = toast
                    .duration
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
                // Slot 2 is unused; existing workers put the duration in slot 3.
                (
                    json!([toast.message, toast.category, Value::Null, duration_ms]),
                    Vec::new(),
                )
            }
        };

        let mut data = Map::new();
        data.insert(TASK_KEY.into(), Value::String(tag.into()));
        data.insert(ARGUMENTS_KEY.into(), arguments);
        Envelope::with_transfer(Value::Object(data), transfer)
    }
}

fn decode_set_frame(arguments: Value, transfer: &mut [Vec<u8>]) -> Option<FrameResult> {
    let id = arguments.get("id")?.as_str()?;
    let index = arguments.get("payload")?.get(TRANSFER_KEY)?.as_u64()? as usize;
    let payload = std::mem::take(transfer.get_mut(index)?);
    FrameResult::new(id, payload).ok()
}

fn decode_toast(arguments: &Value) -> Option<Toast> {
    let args = arguments.as_array()?;
    let message = args.first()?.as_str()?;
    let category = args.get(1).and_then(Value::as_str).unwrap_or_default();
    let mut toast = Toast::new(message, category);
    if let Some(ms) = args.get(3).and_then(Value::as_u64) {
        toast = toast.with_duration(Duration::from_millis(ms));
    }
    Some(toast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_arguments_is_malformed() {
        let env = Envelope::new(json!({ "task": "getFirstFrame" }));
        assert_eq!(env.decode(), Decoded::Malformed);
    }

    #[test]
    fn test_missing_task_is_malformed() {
        let env = Envelope::new(json!({ "arguments": "abc" }));
        assert_eq!(env.decode(), Decoded::Malformed);
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert_eq!(Envelope::new(json!(42)).decode(), Decoded::Malformed);
        assert_eq!(Envelope::new(json!("getFirstFrame")).decode(), Decoded::Malformed);
        assert_eq!(Envelope::new(Value::Null).decode(), Decoded::Malformed);
    }

    #[test]
    fn test_null_arguments_are_present() {
        let env = Envelope::new(json!({ "task": "fetchList", "arguments": null }));
        assert_eq!(env.decode(), Decoded::Message(Message::FetchList));
    }

    #[test]
    fn test_bare_fetch_list_string() {
        let env = Envelope::new(json!("fetchList"));
        assert_eq!(env.decode(), Decoded::Message(Message::FetchList));
    }

    #[test]
    fn test_unknown_tag() {
        let env = Envelope::new(json!({ "task": "resizeAll", "arguments": [] }));
        assert_eq!(env.decode(), Decoded::Unknown("resizeAll".into()));
    }

    #[test]
    fn test_get_first_frame_requires_string_id() {
        let env = Envelope::new(json!({ "task": "getFirstFrame", "arguments": 7 }));
        assert_eq!(env.decode(), Decoded::Malformed);

        let env = Envelope::new(json!({ "task": "getFirstFrame", "arguments": "abc123" }));
        assert_eq!(
            env.decode(),
            Decoded::Message(Message::GetFirstFrame("abc123".into()))
        );
    }

    #[test]
    fn test_set_frame_moves_payload_out_of_transfer_list() {
        let frame = FrameResult::new("abc123", vec![0xFF, 0xD8, 1, 2, 3]).unwrap();
        let env = Message::SetFrame(frame).into_envelope();
        assert_eq!(env.task(), Some(tags::SET_FRAME));
        assert_eq!(env.transfer.len(), 1);
        assert_eq!(env.data["arguments"]["payload"]["$transfer"], 0);

        match env.decode() {
            Decoded::Message(Message::SetFrame(frame)) => {
                assert_eq!(frame.id(), "abc123");
                assert_eq!(frame.payload(), &[0xFF, 0xD8, 1, 2, 3]);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_set_frame_with_dangling_transfer_index() {
        let env = Envelope::new(json!({
            "task": "setFrame",
            "arguments": { "id": "a", "payload": { "$transfer": 3 } }
        }));
        assert_eq!(env.decode(), Decoded::Malformed);
    }

    #[test]
    fn test_toast_duration_in_slot_three() {
        let env = Envelope::new(json!({
            "task": "addToast",
            "arguments": ["Uploaded", "success", "ignored", 4000]
        }));
        let Decoded::Message(Message::AddToast(toast)) = env.decode() else {
            panic!("expected a toast");
        };
        assert_eq!(toast.message, "Uploaded");
        assert_eq!(toast.category, "success");
        assert_eq!(toast.duration, Some(Duration::from_millis(4000)));

        let env = Message::AddToast(Toast::new("hi", "info")).into_envelope();
        assert_eq!(env.data["arguments"], json!(["hi", "info", null, null]));
    }

    #[test]
    fn test_oversized_toast_duration_saturates() {
        let env = Message::AddToast(Toast::new("later", "info").with_duration(Duration::MAX))
            .into_envelope();
        assert_eq!(env.data["arguments"][3], json!(u64::MAX));
    }

    #[test]
    fn test_empty_frame_id_is_malformed() {
        for task in [tags::GET_FIRST_FRAME, tags::ABANDON_FRAME] {
            let env = Envelope::new(json!({ "task": task, "arguments": "" }));
            assert_eq!(env.decode(), Decoded::Malformed, "{task}");
        }
    }

    #[test]
    fn test_abandon_frame_carries_id() {
        let env = Message::AbandonFrame("broken".into()).into_envelope();
        assert_eq!(env.task(), Some(tags::ABANDON_FRAME));
        assert_eq!(
            env.decode(),
            Decoded::Message(Message::AbandonFrame("broken".into()))
        );
    }
}
