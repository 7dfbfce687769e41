use serde_json::{Map, Value, json};
use thumbgen_core::protocol::{ARGUMENTS_KEY, Envelope, TASK_KEY};

/// Builder for raw envelopes, including ones that are not valid messages.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    task: Option<Value>,
    arguments: Option<Value>,
    transfer: Vec<Vec<u8>>,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task: &str) -> Self {
        self.task = Some(Value::String(task.into()));
        self
    }

    pub fn raw_task(mut self, task: Value) -> Self {
        self.task = Some(task);
        self
    }

    pub fn arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn transfer(mut self, buffer: Vec<u8>) -> Self {
        self.transfer.push(buffer);
        self
    }

    pub fn build(self) -> Envelope {
        let mut data = Map::new();
        if let Some(task) = self.task {
            data.insert(TASK_KEY.into(), task);
        }
        if let Some(arguments) = self.arguments {
            data.insert(ARGUMENTS_KEY.into(), arguments);
        }
        Envelope::with_transfer(Value::Object(data), self.transfer)
    }
}

/// A `getFirstFrame` request for `id`.
pub fn get_first_frame(id: &str) -> Envelope {
    EnvelopeBuilder::new()
        .task("getFirstFrame")
        .arguments(json!(id))
        .build()
}

/// The envelopes a defensive receiver must drop without complaint.
pub fn malformed_envelopes() -> Vec<Envelope> {
    vec![
        Envelope::new(Value::Null),
        Envelope::new(json!(17)),
        Envelope::new(json!(["getFirstFrame", "abc"])),
        EnvelopeBuilder::new().task("getFirstFrame").build(),
        EnvelopeBuilder::new().arguments(json!("abc")).build(),
        EnvelopeBuilder::new()
            .raw_task(json!(3))
            .arguments(json!("abc"))
            .build(),
        EnvelopeBuilder::new()
            .task("getFirstFrame")
            .arguments(json!({ "id": "abc" }))
            .build(),
    ]
}
