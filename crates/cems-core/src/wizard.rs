//! # Wizard State Machine
//!
//! The page flow of a registration session:
//!
//! ```text
//! LoginOrSignup -> IndustryDetails -> StackDetails -> CemsInstrumentDetails
//!                                          ^                   |
//!                                          +---- next stack ---+--> RegistrationComplete
//! ```
//!
//! `WizardState` is a plain value. Every transition takes `&self` and returns
//! a new state, so a handler that fails leaves the caller's state untouched.
//! Each page after login carries the keys it writes against (`user_id`,
//! `stack_id`), which makes "Stack Details without a user" unrepresentable.

use crate::{CemsError, Choice, Parameter, StackId, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// ACTIONS
// =============================================================================

/// A button the user can press somewhere in the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SendOtp,
    VerifyOtp,
    SubmitIndustry,
    SubmitStack,
    SelectParameters,
    SubmitInstrument,
    CompleteCems,
}

impl Action {
    /// Stable machine name, used in errors and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SendOtp => "send_otp",
            Self::VerifyOtp => "verify_otp",
            Self::SubmitIndustry => "submit_industry",
            Self::SubmitStack => "submit_stack",
            Self::SelectParameters => "select_parameters",
            Self::SubmitInstrument => "submit_instrument",
            Self::CompleteCems => "complete_cems",
        }
    }

    /// Button caption.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SendOtp => "Send OTP",
            Self::VerifyOtp => "Verify OTP",
            Self::SubmitIndustry => "Submit Industry Details",
            Self::SubmitStack => "Submit Stack Details",
            Self::SelectParameters => "Select Parameters",
            Self::SubmitInstrument => "Submit CEMS Details",
            Self::CompleteCems => "Complete CEMS Details",
        }
    }

    /// Path segment of the action, relative to its session.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::SendOtp => "otp",
            Self::VerifyOtp => "otp/verify",
            Self::SubmitIndustry => "industry",
            Self::SubmitStack => "stack",
            Self::SelectParameters => "parameters",
            Self::SubmitInstrument => "instruments",
            Self::CompleteCems => "complete",
        }
    }
}

// =============================================================================
// PAGES
// =============================================================================

/// Position in the per-stack loop. `current_stack` is 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackProgress {
    pub current_stack: u32,
    pub num_stacks: u32,
}

impl StackProgress {
    /// Start the loop at stack 1. A declared count of 0 is treated as 1.
    #[must_use]
    pub fn start(num_stacks: u32) -> Self {
        Self {
            current_stack: 1,
            num_stacks: num_stacks.max(1),
        }
    }

    /// Whether the current stack is the last declared one.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current_stack >= self.num_stacks
    }

    /// Move on to the next stack.
    #[must_use]
    pub fn advance(self) -> Self {
        Self {
            current_stack: self.current_stack.saturating_add(1),
            ..self
        }
    }
}

/// The page currently shown, with the keys that page writes against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Page {
    #[default]
    LoginOrSignup,
    IndustryDetails {
        user_id: UserId,
    },
    StackDetails {
        user_id: UserId,
        progress: StackProgress,
    },
    CemsInstrumentDetails {
        user_id: UserId,
        progress: StackProgress,
        stack_id: StackId,
        /// Parameters whose sub-forms are shown, in canonical order.
        selected: Vec<Parameter>,
        /// Parameters submitted at least once during this visit.
        submitted: Vec<Parameter>,
    },
    RegistrationComplete {
        user_id: UserId,
    },
}

impl Page {
    /// Display name of the page.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoginOrSignup => "Login or Sign Up",
            Self::IndustryDetails { .. } => "Industry Details",
            Self::StackDetails { .. } => "Stack Details",
            Self::CemsInstrumentDetails { .. } => "CEMS Instrument Details",
            Self::RegistrationComplete { .. } => "Registration Complete",
        }
    }

    /// The registrant, once logged in.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::LoginOrSignup => None,
            Self::IndustryDetails { user_id }
            | Self::StackDetails { user_id, .. }
            | Self::CemsInstrumentDetails { user_id, .. }
            | Self::RegistrationComplete { user_id } => Some(user_id),
        }
    }

    /// The stack loop position, on the two per-stack pages.
    #[must_use]
    pub fn progress(&self) -> Option<StackProgress> {
        match self {
            Self::StackDetails { progress, .. } | Self::CemsInstrumentDetails { progress, .. } => {
                Some(*progress)
            }
            _ => None,
        }
    }
}

// =============================================================================
// OTP STATE
// =============================================================================

/// Login progress of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OtpState {
    /// No code requested yet.
    #[default]
    Idle,
    /// A code was sent and is waiting for verification.
    Pending { phone_number: String, code: u16 },
    /// The code was verified.
    Verified { phone_number: String },
}

// =============================================================================
// WIZARD STATE
// =============================================================================

/// Everything a session remembers between button presses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WizardState {
    page: Page,
    otp: OtpState,
}

impl WizardState {
    /// A fresh session on the login page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current page.
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Display name of the current page.
    #[must_use]
    pub fn current_page_name(&self) -> &'static str {
        self.page.name()
    }

    /// Login progress.
    #[must_use]
    pub fn otp(&self) -> &OtpState {
        &self.otp
    }

    /// The registrant, once logged in.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.page.user_id()
    }

    /// Whether the wizard reached its terminal page.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.page, Page::RegistrationComplete { .. })
    }

    /// The error for pressing `action` on the current page.
    #[must_use]
    pub fn reject(&self, action: Action) -> CemsError {
        CemsError::InvalidTransition {
            page: self.page.name(),
            action: action.name(),
        }
    }

    /// Record a freshly issued code, replacing any pending one.
    pub fn with_pending_otp(&self, phone_number: String, code: u16) -> Result<Self, CemsError> {
        if self.page != Page::LoginOrSignup {
            return Err(self.reject(Action::SendOtp));
        }
        Ok(Self {
            page: Page::LoginOrSignup,
            otp: OtpState::Pending { phone_number, code },
        })
    }

    /// LoginOrSignup -> IndustryDetails, after the user row was created.
    pub fn after_login(&self, user_id: UserId) -> Result<Self, CemsError> {
        let OtpState::Pending { phone_number, .. } = &self.otp else {
            return Err(self.reject(Action::VerifyOtp));
        };
        if self.page != Page::LoginOrSignup {
            return Err(self.reject(Action::VerifyOtp));
        }
        Ok(Self {
            page: Page::IndustryDetails { user_id },
            otp: OtpState::Verified {
                phone_number: phone_number.clone(),
            },
        })
    }

    /// IndustryDetails -> StackDetails for stack 1 of `num_stacks`.
    pub fn after_industry(&self, num_stacks: u32) -> Result<Self, CemsError> {
        match &self.page {
            Page::IndustryDetails { user_id } => Ok(self.to(Page::StackDetails {
                user_id: user_id.clone(),
                progress: StackProgress::start(num_stacks),
            })),
            _ => Err(self.reject(Action::SubmitIndustry)),
        }
    }

    /// StackDetails -> CemsInstrumentDetails for the stack just stored.
    pub fn after_stack(&self, stack_id: StackId) -> Result<Self, CemsError> {
        match &self.page {
            Page::StackDetails { user_id, progress } => Ok(self.to(Page::CemsInstrumentDetails {
                user_id: user_id.clone(),
                progress: *progress,
                stack_id,
                selected: Vec::new(),
                submitted: Vec::new(),
            })),
            _ => Err(self.reject(Action::SubmitStack)),
        }
    }

    /// Replace the parameter selection of the instrument page.
    ///
    /// The selection is deduplicated and kept in canonical parameter order.
    pub fn with_selection(&self, parameters: &[Parameter]) -> Result<Self, CemsError> {
        match &self.page {
            Page::CemsInstrumentDetails {
                user_id,
                progress,
                stack_id,
                submitted,
                ..
            } => {
                let selected = Parameter::ALL
                    .iter()
                    .copied()
                    .filter(|p| parameters.contains(p))
                    .collect();
                Ok(self.to(Page::CemsInstrumentDetails {
                    user_id: user_id.clone(),
                    progress: *progress,
                    stack_id: *stack_id,
                    selected,
                    submitted: submitted.clone(),
                }))
            }
            _ => Err(self.reject(Action::SelectParameters)),
        }
    }

    /// The stack an instrument for `parameter` would be attached to.
    ///
    /// Only parameters currently selected have a sub-form to submit.
    pub fn instrument_target(&self, parameter: Parameter) -> Result<StackId, CemsError> {
        match &self.page {
            Page::CemsInstrumentDetails {
                stack_id, selected, ..
            } => {
                if selected.contains(&parameter) {
                    Ok(*stack_id)
                } else {
                    Err(CemsError::ParameterNotSelected(parameter.label().to_string()))
                }
            }
            _ => Err(self.reject(Action::SubmitInstrument)),
        }
    }

    /// Mark `parameter` as submitted. The page itself does not change.
    pub fn with_submitted(&self, parameter: Parameter) -> Result<Self, CemsError> {
        match &self.page {
            Page::CemsInstrumentDetails {
                user_id,
                progress,
                stack_id,
                selected,
                submitted,
            } => {
                let mut submitted = submitted.clone();
                if !submitted.contains(&parameter) {
                    submitted.push(parameter);
                }
                Ok(self.to(Page::CemsInstrumentDetails {
                    user_id: user_id.clone(),
                    progress: *progress,
                    stack_id: *stack_id,
                    selected: selected.clone(),
                    submitted,
                }))
            }
            _ => Err(self.reject(Action::SubmitInstrument)),
        }
    }

    /// CemsInstrumentDetails -> StackDetails (next stack) or RegistrationComplete.
    pub fn complete_cems(&self) -> Result<Self, CemsError> {
        match &self.page {
            Page::CemsInstrumentDetails {
                user_id, progress, ..
            } => {
                let next = if progress.is_last() {
                    Page::RegistrationComplete {
                        user_id: user_id.clone(),
                    }
                } else {
                    Page::StackDetails {
                        user_id: user_id.clone(),
                        progress: progress.advance(),
                    }
                };
                Ok(self.to(next))
            }
            _ => Err(self.reject(Action::CompleteCems)),
        }
    }

    fn to(&self, page: Page) -> Self {
        Self {
            page,
            otp: self.otp.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn logged_in() -> WizardState {
        WizardState::new()
            .with_pending_otp("9999999999".to_string(), 1234)
            .unwrap()
            .after_login(UserId("u-1".to_string()))
            .unwrap()
    }

    #[test]
    fn starts_on_login_page() {
        let state = WizardState::new();
        assert_eq!(state.current_page_name(), "Login or Sign Up");
        assert!(state.user_id().is_none());
        assert_eq!(state.otp(), &OtpState::Idle);
    }

    #[test]
    fn login_requires_pending_code() {
        let err = WizardState::new()
            .after_login(UserId("u".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            CemsError::InvalidTransition {
                action: "verify_otp",
                ..
            }
        ));
    }

    #[test]
    fn login_moves_to_industry_details() {
        let state = logged_in();
        assert_eq!(state.current_page_name(), "Industry Details");
        assert_eq!(
            state.otp(),
            &OtpState::Verified {
                phone_number: "9999999999".to_string()
            }
        );
    }

    #[test]
    fn industry_starts_stack_loop_at_one() {
        let state = logged_in().after_industry(3).unwrap();
        assert_eq!(
            state.page().progress(),
            Some(StackProgress {
                current_stack: 1,
                num_stacks: 3
            })
        );
    }

    #[test]
    fn zero_stacks_is_treated_as_one() {
        let state = logged_in().after_industry(0).unwrap();
        assert_eq!(state.page().progress().map(|p| p.num_stacks), Some(1));
    }

    #[test]
    fn transitions_leave_the_input_state_unchanged() {
        let before = logged_in();
        let after = before.after_industry(2).unwrap();
        assert_eq!(before.current_page_name(), "Industry Details");
        assert_eq!(after.current_page_name(), "Stack Details");
    }

    #[test]
    fn loop_visits_each_stack_then_completes() {
        let mut state = logged_in().after_industry(2).unwrap();
        let mut visits = 0;
        for id in 1..=2 {
            assert_eq!(state.current_page_name(), "Stack Details");
            visits += 1;
            state = state.after_stack(StackId(id)).unwrap();
            state = state.complete_cems().unwrap();
        }
        assert_eq!(visits, 2);
        assert!(state.is_complete());
    }

    #[test]
    fn selection_is_canonical_and_deduplicated() {
        let state = logged_in()
            .after_industry(1)
            .unwrap()
            .after_stack(StackId(9))
            .unwrap()
            .with_selection(&[Parameter::Nox, Parameter::Pm, Parameter::Nox])
            .unwrap();
        match state.page() {
            Page::CemsInstrumentDetails { selected, .. } => {
                assert_eq!(selected, &vec![Parameter::Pm, Parameter::Nox]);
            }
            other => panic!("unexpected page {other:?}"),
        }
    }

    #[test]
    fn instrument_target_requires_selection() {
        let state = logged_in()
            .after_industry(1)
            .unwrap()
            .after_stack(StackId(4))
            .unwrap()
            .with_selection(&[Parameter::Sox])
            .unwrap();
        assert_eq!(state.instrument_target(Parameter::Sox).unwrap(), StackId(4));
        assert!(matches!(
            state.instrument_target(Parameter::Pm),
            Err(CemsError::ParameterNotSelected(p)) if p == "PM"
        ));
    }

    #[test]
    fn actions_on_wrong_page_are_rejected() {
        let state = logged_in();
        assert!(state.after_stack(StackId(1)).is_err());
        assert!(state.complete_cems().is_err());
        assert!(state.with_selection(&[Parameter::Pm]).is_err());
        assert!(state.with_pending_otp("1".to_string(), 1000).is_err());
    }

    #[test]
    fn complete_is_terminal() {
        let done = logged_in()
            .after_industry(1)
            .unwrap()
            .after_stack(StackId(1))
            .unwrap()
            .complete_cems()
            .unwrap();
        assert!(done.is_complete());
        assert!(done.complete_cems().is_err());
        assert!(done.after_industry(1).is_err());
    }
}
