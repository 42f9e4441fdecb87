//! Chat payloads and the streaming client boundary for OpenAI-compatible
//! backends.

pub mod client;
pub mod models;

pub use client::{ChatClient, HttpChatClient};
pub use models::{ChatMessage, ChatRequest, ChatResponse, ModelInfo};

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Transport-level failure.
    Http(String),
    /// The backend answered with a non-success status.
    Status { code: u16, body: String },
    /// The backend answered with something we could not parse.
    InvalidResponse(String),
    Cancelled,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(message) => write!(f, "request failed: {message}"),
            ApiError::Status { code, body } => write!(f, "backend returned {code}: {body}"),
            ApiError::InvalidResponse(message) => {
                write!(f, "unexpected response: {message}")
            }
            ApiError::Cancelled => f.write_str("request cancelled"),
        }
    }
}

impl std::error::Error for ApiError {}
