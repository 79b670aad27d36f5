//! Scripted HTTP transport for testing
//!
//! Replays queued responses in order and records every request. Clones share
//! state.

use crate::error::ControlPlaneError;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Result<ApiResponse, ControlPlaneError>>,
    requests: Vec<ApiRequest>,
}

/// Transport answering from a queue of scripted responses
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, response: Result<ApiResponse, ControlPlaneError>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.responses.push_back(response);
        }
        self
    }

    /// Queue a response
    pub fn respond(self, response: ApiResponse) -> Self {
        self.push(Ok(response))
    }

    /// Queue a response with a JSON body
    pub fn respond_json(self, status: u16, body: Value) -> Self {
        self.respond(ApiResponse::new(status, body.to_string()))
    }

    /// Queue a transport failure
    pub fn fail(self, message: &str) -> Self {
        self.push(Err(ControlPlaneError::Transport(message.to_string())))
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    /// Responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.state.lock().map(|s| s.responses.len()).unwrap_or(0)
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ControlPlaneError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ControlPlaneError::Transport("script lock poisoned".to_string()))?;
        state.requests.push(request.clone());

        state.responses.pop_front().unwrap_or_else(|| {
            Err(ControlPlaneError::Transport(format!(
                "no scripted response for {} {}",
                request.method.as_str(),
                request.url
            )))
        })
    }
}
