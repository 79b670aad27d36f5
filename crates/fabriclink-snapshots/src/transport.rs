//! HTTP transport seam
//!
//! The client speaks [`ApiRequest`]/[`ApiResponse`] through an
//! [`HttpTransport`]. [`ReqwestTransport`] is the production implementation;
//! tests script responses with [`crate::ScriptedTransport`].

use crate::error::ControlPlaneError;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// Outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body),
        }
    }

    pub fn patch(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Patch,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Response with lowercased header names
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON; an empty body is `null`
    pub fn json(&self) -> Result<Value, ControlPlaneError> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body).map_err(|e| {
            ControlPlaneError::InvalidResponse(format!("HTTP {} body is not JSON: {}", self.status, e))
        })
    }

    /// Error for non-success statuses
    pub fn error_for_status(self) -> Result<Self, ControlPlaneError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ControlPlaneError::Http {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Sends control-plane requests
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ControlPlaneError>;
}

/// Blocking reqwest transport with bearer authentication
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    token: String,
}

impl ReqwestTransport {
    pub fn new(token: impl Into<String>) -> Result<Self, ControlPlaneError> {
        Self::with_timeout(token, None)
    }

    pub fn with_timeout(
        token: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ControlPlaneError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            token: token.into(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ControlPlaneError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Patch => self.client.patch(&request.url),
        }
        .bearer_auth(&self.token)
        .header(CONTENT_TYPE, "application/json");

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}
