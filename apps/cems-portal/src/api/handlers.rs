//! # API Endpoint Handlers
//!
//! One handler per wizard button. Every action handler goes through
//! `run_action`: look up the session, run the page handler against the
//! store, then either keep the new state or report why the old one stays.

use super::{
    AppState, DynStore, SessionEntry,
    types::{ActionResponse, HealthResponse, SessionResponse, StatusResponse},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cems_core::{
    Action, CemsError, IndustryForm, InstrumentForm, LoginForm, OtpForm, SelectionForm, StackForm,
    Step, WizardState, pages, render,
};
use std::sync::PoisonError;
use std::time::Instant;

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// HTTP status for a rejected action.
pub(crate) fn error_status(err: &CemsError) -> StatusCode {
    if err.is_validation() {
        return StatusCode::BAD_REQUEST;
    }
    match err {
        CemsError::InvalidTransition { .. } | CemsError::DuplicatePhone(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Message shown to the user. Storage details stay in the logs.
pub(crate) fn user_message(err: &CemsError) -> String {
    match err {
        CemsError::DuplicatePhone(_) => {
            "This phone number is already registered. Please use a different number.".to_string()
        }
        e if error_status(e).is_server_error() => {
            "Your details could not be saved. Please try again.".to_string()
        }
        e => e.to_string(),
    }
}

fn session_not_found(id: &str) -> (StatusCode, Json<ActionResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ActionResponse::error(format!("Session not found: {}", id))),
    )
}

// =============================================================================
// ACTION RUNNER
// =============================================================================

/// Apply one button press to a session.
async fn run_action<F>(
    app: &AppState,
    id: &str,
    action: Action,
    apply: F,
) -> (StatusCode, Json<ActionResponse>)
where
    F: FnOnce(&WizardState, &mut DynStore) -> Result<Step, CemsError>,
{
    let mut sessions = app.sessions.write().await;
    let Some(entry) = sessions.touch(id, Instant::now()) else {
        return session_not_found(id);
    };

    let result = {
        let mut store = app.store.write().await;
        apply(&entry.state, &mut **store)
    };

    match result {
        Ok(step) => {
            tracing::info!(
                event = "transition",
                session = %id,
                action = action.name(),
                from = entry.state.current_page_name(),
                to = step.state.current_page_name(),
                "Page transition"
            );
            if action == Action::SendOtp {
                tracing::debug!(session = %id, "{}", step.message);
            }
            entry.state = step.state;
            (
                StatusCode::OK,
                Json(ActionResponse::success(render(&entry.state), step.message)),
            )
        }
        Err(err) => reject(id, entry, action, &err),
    }
}

/// Keep the old state and explain why.
fn reject(
    id: &str,
    entry: &mut SessionEntry,
    action: Action,
    err: &CemsError,
) -> (StatusCode, Json<ActionResponse>) {
    let status = error_status(err);

    if matches!(err, CemsError::IncorrectOtp) {
        entry.failed_otp_attempts = entry.failed_otp_attempts.saturating_add(1);
        tracing::warn!(
            session = %id,
            attempts = entry.failed_otp_attempts,
            "OTP verification failed"
        );
    } else if status.is_server_error() {
        tracing::error!(session = %id, action = action.name(), error = %err, "Store operation failed");
    } else {
        tracing::info!(session = %id, action = action.name(), error = %err, "Action rejected");
    }

    (
        status,
        Json(ActionResponse::rejected(
            render(&entry.state),
            user_message(err),
        )),
    )
}

// =============================================================================
// HEALTH / STATUS HANDLERS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Registry row counts.
pub async fn status_handler(State(app): State<AppState>) -> Response {
    let sessions = app.sessions.read().await.len();
    let counts = app.store.read().await.counts();

    match counts {
        Ok(counts) => (StatusCode::OK, Json(StatusResponse::new(counts, sessions))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Cannot count registry rows");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActionResponse::error(user_message(&e))),
            )
                .into_response()
        }
    }
}

// =============================================================================
// SESSION HANDLERS
// =============================================================================

/// Start a new wizard on the login page.
pub async fn create_session_handler(State(app): State<AppState>) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();
    let now = Instant::now();
    let entry = SessionEntry::new(now);
    let view = render(&entry.state);

    app.sessions
        .write()
        .await
        .insert(session_id.clone(), entry, now);
    tracing::info!(session = %session_id, "Session created");

    (StatusCode::CREATED, Json(SessionResponse { session_id, view }))
}

/// Render the current page of a session.
pub async fn get_session_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let mut sessions = app.sessions.write().await;
    match sessions.touch(&id, Instant::now()) {
        Some(entry) => Json(SessionResponse {
            view: render(&entry.state),
            session_id: id,
        })
        .into_response(),
        None => session_not_found(&id).into_response(),
    }
}

// =============================================================================
// LOGIN PAGE
// =============================================================================

/// "Send OTP".
pub async fn send_otp_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<LoginForm>,
) -> impl IntoResponse {
    run_action(&app, &id, Action::SendOtp, |state, _| {
        let mut codes = app.codes.lock().unwrap_or_else(PoisonError::into_inner);
        pages::send_otp(state, &form, &mut **codes)
    })
    .await
}

/// "Verify OTP".
pub async fn verify_otp_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<OtpForm>,
) -> impl IntoResponse {
    run_action(&app, &id, Action::VerifyOtp, |state, store| {
        pages::verify_otp(state, &form, store)
    })
    .await
}

// =============================================================================
// DETAIL PAGES
// =============================================================================

/// "Submit Industry Details".
pub async fn industry_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<IndustryForm>,
) -> impl IntoResponse {
    run_action(&app, &id, Action::SubmitIndustry, |state, store| {
        pages::submit_industry(state, &form, store)
    })
    .await
}

/// "Submit Stack Details".
pub async fn stack_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<StackForm>,
) -> impl IntoResponse {
    run_action(&app, &id, Action::SubmitStack, |state, store| {
        pages::submit_stack(state, &form, store)
    })
    .await
}

/// Parameter multiselect of the instrument page.
pub async fn parameters_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<SelectionForm>,
) -> impl IntoResponse {
    run_action(&app, &id, Action::SelectParameters, |state, _| {
        pages::select_parameters(state, &form)
    })
    .await
}

/// "Submit CEMS Details for {parameter}".
pub async fn instrument_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<InstrumentForm>,
) -> impl IntoResponse {
    run_action(&app, &id, Action::SubmitInstrument, |state, store| {
        pages::submit_instrument(state, &form, store)
    })
    .await
}

/// "Complete CEMS Details".
pub async fn complete_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    run_action(&app, &id, Action::CompleteCems, |state, _| {
        pages::complete_cems(state)
    })
    .await
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cems_core::{StackId, UserId};

    #[test]
    fn validation_errors_are_bad_requests() {
        assert_eq!(error_status(&CemsError::IncorrectOtp), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(&CemsError::EmptyPhoneNumber),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&CemsError::ParameterNotSelected("HF".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn conflicts() {
        let err = CemsError::InvalidTransition {
            page: "Login or Sign Up",
            action: "submit_stack",
        };
        assert_eq!(error_status(&err), StatusCode::CONFLICT);
        assert_eq!(
            error_status(&CemsError::DuplicatePhone("1".to_string())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn store_failures_hide_details() {
        let err = CemsError::IoError("disk full at page 4096".to_string());
        assert_eq!(error_status(&err), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!user_message(&err).contains("4096"));
        assert_eq!(
            error_status(&CemsError::StackNotFound(StackId(3))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            error_status(&CemsError::UserNotFound(UserId("u".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn duplicate_phone_message_is_friendly() {
        let msg = user_message(&CemsError::DuplicatePhone("9999999999".to_string()));
        assert!(msg.starts_with("This phone number is already registered"));
    }
}
