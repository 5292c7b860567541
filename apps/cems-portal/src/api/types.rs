//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//! Request bodies are the page forms of `cems_core::pages`.

use cems_core::{PageView, RegistryCounts};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Registry row counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub users: usize,
    pub stacks: usize,
    pub instruments: usize,
    /// Wizard sessions currently held in memory.
    pub sessions: usize,
}

impl StatusResponse {
    #[must_use]
    pub fn new(counts: RegistryCounts, sessions: usize) -> Self {
        Self {
            users: counts.users,
            stacks: counts.stacks,
            instruments: counts.instruments,
            sessions,
        }
    }
}

// =============================================================================
// SESSION RESPONSE
// =============================================================================

/// A wizard session and the page it is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub view: PageView,
}

// =============================================================================
// ACTION RESPONSE
// =============================================================================

/// Result of pressing a button.
///
/// `view` is the page to show next: the new page on success, the unchanged
/// page on a rejected action. It is absent only for unknown sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<PageView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    /// Create a success response.
    #[must_use]
    pub fn success(view: PageView, message: String) -> Self {
        Self {
            success: true,
            view: Some(view),
            message: Some(message),
            error: None,
        }
    }

    /// Create a rejection that still shows the current page.
    #[must_use]
    pub fn rejected(view: PageView, error: String) -> Self {
        Self {
            success: false,
            view: Some(view),
            message: None,
            error: Some(error),
        }
    }

    /// Create an error response without a page.
    #[must_use]
    pub fn error(error: String) -> Self {
        Self {
            success: false,
            view: None,
            message: None,
            error: Some(error),
        }
    }
}
