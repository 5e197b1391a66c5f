use std::fmt;

/// Opaque token used to acknowledge (delete) a message from its queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw message as delivered by a queue backend, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    pub handle: ReceiptHandle,
}

/// A validated scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct QueueMessage {
    pub file_path: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub notify_channels: Vec<String>,
}

impl QueueMessage {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            notify_channels: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.notify_channels = channels;
        self
    }
}
