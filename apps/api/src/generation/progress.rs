//! Progress stream emitter: newline-delimited JSON events pushed to the
//! client while a run is in flight.
//!
//! A run emits any number of `progress` events followed by exactly one
//! terminal `error` or `complete` event. The emitter enforces that: anything
//! sent after the terminal event is dropped.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress { step: f32, message: String },
    Error { error: String },
    Complete { data: Value },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }

    /// One line of the response body.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","error":"failed to encode event: {e}"}}"#)
        });
        line.push('\n');
        line
    }
}

pub struct ProgressEmitter {
    tx: mpsc::Sender<ProgressEvent>,
    finished: bool,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx, finished: false }
    }

    /// Channel-backed emitter plus the receiving end the HTTP body streams from.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Closes a stream the run left open with an `error` event. A stream
    /// that already ended is left alone.
    pub async fn finish_open(&mut self, error: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        warn!("Run ended without a terminal event");
        self.error(error).await;
    }

    pub async fn progress(&mut self, step: f32, message: impl Into<String>) {
        let message = message.into();
        debug!("Progress {step}: {message}");
        self.send(ProgressEvent::Progress { step, message }).await;
    }

    pub async fn error(&mut self, error: impl Into<String>) {
        self.send(ProgressEvent::Error {
            error: error.into(),
        })
        .await;
    }

    pub async fn complete(&mut self, data: Value) {
        self.send(ProgressEvent::Complete { data }).await;
    }

    async fn send(&mut self, event: ProgressEvent) {
        if self.finished {
            warn!("Dropping event after terminal event: {event:?}");
            return;
        }
        self.finished = event.is_terminal();
        // A closed receiver means the client went away; the run still finishes.
        if self.tx.send(event).await.is_err() {
            debug!("Progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let progress = ProgressEvent::Progress {
            step: 4.5,
            message: "Analyzing".into(),
        };
        assert_eq!(
            progress.to_line(),
            "{\"type\":\"progress\",\"step\":4.5,\"message\":\"Analyzing\"}\n"
        );

        let error = ProgressEvent::Error {
            error: "boom".into(),
        };
        assert_eq!(error.to_line(), "{\"type\":\"error\",\"error\":\"boom\"}\n");
    }

    #[tokio::test]
    async fn test_nothing_after_terminal_event() {
        let (mut emitter, mut rx) = ProgressEmitter::channel(8);
        emitter.progress(1.0, "one").await;
        emitter.complete(json!({"title": "T"})).await;
        emitter.error("late").await;
        emitter.progress(2.0, "late").await;
        drop(emitter);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn test_open_stream_is_closed_with_error() {
        let (mut emitter, mut rx) = ProgressEmitter::channel(8);
        emitter.progress(3.0, "merging").await;
        emitter.finish_open("run ended early").await;
        drop(emitter);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Error {
                error: "run ended early".into()
            })
        );
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_finished_stream_is_not_closed_twice() {
        let (mut emitter, mut rx) = ProgressEmitter::channel(8);
        emitter.complete(json!({"title": "T"})).await;
        emitter.finish_open("run ended early").await;
        drop(emitter);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProgressEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_is_ignored() {
        let (mut emitter, rx) = ProgressEmitter::channel(1);
        drop(rx);
        emitter.error("nobody listening").await;
        assert!(emitter.is_finished());
    }
}
