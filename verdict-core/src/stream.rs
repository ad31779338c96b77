//! Ordered session event stream.
//!
//! A session emits either one `cached` event, or a non-decreasing run of
//! `progress` events followed by exactly one `complete` or `error`. The
//! emitter enforces this: regressing progress is dropped, `cached` after
//! progress is rejected, and the channel closes on the terminal event.

use crate::error::StreamError;
use crate::progress::{TERMINAL_STEP, label_for, percent_for};
use crate::types::{AnalysisResult, RoleStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Fixed code of the terminal error event.
pub const ANALYSIS_FAILED: &str = "ANALYSIS_FAILED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    Progress {
        step: u8,
        label: String,
        percent: u8,
        elapsed_ms: u64,
        roles: BTreeMap<String, RoleStatus>,
    },
    Cached {
        result: Box<AnalysisResult>,
    },
    Complete {
        result: Box<AnalysisResult>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Progress { .. })
    }

    /// Encode as one server-sent-events frame: `data: {json}\n\n`.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Single-producer side of a session's event channel.
#[derive(Debug)]
pub struct StreamEmitter {
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
    last_step: Option<u8>,
}

impl StreamEmitter {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            tx: Some(tx),
            last_step: None,
        }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    pub fn last_step(&self) -> Option<u8> {
        self.last_step
    }

    /// Emit a progress event. Returns `Ok(false)` when the step regresses and
    /// the event was dropped.
    pub fn progress(
        &mut self,
        step: u8,
        elapsed_ms: u64,
        roles: BTreeMap<String, RoleStatus>,
    ) -> Result<bool, StreamError> {
        if step > TERMINAL_STEP {
            return Err(StreamError::InvalidStep { index: step });
        }
        let tx = self.tx.as_ref().ok_or(StreamError::Closed)?;
        if self.last_step.is_some_and(|last| step < last) {
            debug!(step, last = ?self.last_step, "Dropping regressing progress event");
            return Ok(false);
        }
        let event = StreamEvent::Progress {
            step,
            label: label_for(step).to_string(),
            percent: percent_for(step),
            elapsed_ms,
            roles,
        };
        if tx.send(event).is_err() {
            self.tx = None;
            return Err(StreamError::Disconnected);
        }
        self.last_step = Some(step);
        Ok(true)
    }

    /// Short-circuit the session with a cached result. Only valid before any
    /// progress was sent.
    pub fn cached(&mut self, result: AnalysisResult) -> Result<(), StreamError> {
        if self.last_step.is_some() {
            return Err(StreamError::OutOfOrder {
                message: "cached event after progress".to_string(),
            });
        }
        self.send_terminal(StreamEvent::Cached {
            result: Box::new(result),
        })
    }

    pub fn complete(&mut self, result: AnalysisResult) -> Result<(), StreamError> {
        self.send_terminal(StreamEvent::Complete {
            result: Box::new(result),
        })
    }

    pub fn error(&mut self, code: &str, message: impl Into<String>) -> Result<(), StreamError> {
        self.send_terminal(StreamEvent::Error {
            code: code.to_string(),
            message: message.into(),
        })
    }

    fn send_terminal(&mut self, event: StreamEvent) -> Result<(), StreamError> {
        let tx = self.tx.take().ok_or(StreamError::Closed)?;
        tx.send(event).map_err(|_| StreamError::Disconnected)
    }
}
