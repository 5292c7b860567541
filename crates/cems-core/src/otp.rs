//! # OTP Gate
//!
//! One-time code login tied to a wizard session.
//!
//! The gate issues a 4-digit code for a phone number and later checks a
//! submitted code against it. Delivery is the caller's concern: the issued
//! code is handed back in `OtpIssued` so it can be shown to the user or
//! forwarded to an SMS gateway.
//!
//! Attempts are unlimited and pending codes never expire.

use crate::primitives::{OTP_MAX, OTP_MAX_CHARS, OTP_MIN, PHONE_MAX_CHARS, clip};
use crate::registry::RegistryStore;
use crate::wizard::{Action, OtpState, Page, WizardState};
use crate::CemsError;
use rand::Rng;
use std::collections::VecDeque;

// =============================================================================
// CODE SOURCES
// =============================================================================

/// Supplies one-time codes.
pub trait CodeSource {
    /// The next code, in `OTP_MIN..=OTP_MAX`.
    fn next_code(&mut self) -> u16;
}

/// Uniformly random codes from the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&mut self) -> u16 {
        rand::rng().random_range(OTP_MIN..=OTP_MAX)
    }
}

/// Replays a fixed list of codes, then keeps repeating the last one.
///
/// Codes outside the 4-digit range are clamped into it.
#[derive(Debug, Clone)]
pub struct FixedCodes {
    queue: VecDeque<u16>,
    last: u16,
}

impl FixedCodes {
    #[must_use]
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            queue: codes.into_iter().collect(),
            last: OTP_MIN,
        }
    }
}

impl CodeSource for FixedCodes {
    fn next_code(&mut self) -> u16 {
        if let Some(code) = self.queue.pop_front() {
            self.last = code.clamp(OTP_MIN, OTP_MAX);
        }
        self.last
    }
}

// =============================================================================
// GATE OPERATIONS
// =============================================================================

/// A code that was just issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpIssued {
    pub phone_number: String,
    pub code: u16,
}

impl OtpIssued {
    /// The notice shown in place of real delivery.
    #[must_use]
    pub fn notice(&self) -> String {
        format!(
            "OTP sent to {} (for testing, the OTP is {})",
            self.phone_number, self.code
        )
    }
}

/// Issue a code for `phone_number`, replacing any pending one.
///
/// Fails with `EmptyPhoneNumber` when the input is blank.
pub fn request_code(
    state: &WizardState,
    phone_number: &str,
    source: &mut dyn CodeSource,
) -> Result<(WizardState, OtpIssued), CemsError> {
    if state.page() != &Page::LoginOrSignup {
        return Err(state.reject(Action::SendOtp));
    }

    let phone_number = clip(phone_number, PHONE_MAX_CHARS);
    if phone_number.is_empty() {
        return Err(CemsError::EmptyPhoneNumber);
    }

    let code = source.next_code();
    let next = state.with_pending_otp(phone_number.clone(), code)?;
    Ok((next, OtpIssued { phone_number, code }))
}

/// Check `submitted` against the pending code.
///
/// On a match the user row is created for the pending phone number and the
/// returned state is on Industry Details. On a mismatch nothing is written.
pub fn verify_code<S: RegistryStore + ?Sized>(
    state: &WizardState,
    submitted: &str,
    store: &mut S,
) -> Result<WizardState, CemsError> {
    if state.page() != &Page::LoginOrSignup {
        return Err(state.reject(Action::VerifyOtp));
    }

    let OtpState::Pending { phone_number, code } = state.otp() else {
        return Err(CemsError::NoPendingOtp);
    };

    if clip(submitted, OTP_MAX_CHARS) != code.to_string() {
        return Err(CemsError::IncorrectOtp);
    }

    let user_id = store.create_user(phone_number)?;
    state.after_login(user_id)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    #[test]
    fn random_codes_are_four_digits() {
        let mut source = RandomCodes;
        for _ in 0..200 {
            let code = source.next_code();
            assert!((OTP_MIN..=OTP_MAX).contains(&code));
        }
    }

    #[test]
    fn fixed_codes_replay_then_repeat() {
        let mut source = FixedCodes::new([4321, 1111]);
        assert_eq!(source.next_code(), 4321);
        assert_eq!(source.next_code(), 1111);
        assert_eq!(source.next_code(), 1111);
        assert_eq!(FixedCodes::new([7]).next_code(), OTP_MIN);
    }

    #[test]
    fn empty_phone_is_rejected() {
        let state = WizardState::new();
        let err = request_code(&state, "   ", &mut FixedCodes::new([1234])).unwrap_err();
        assert!(matches!(err, CemsError::EmptyPhoneNumber));
    }

    #[test]
    fn request_stores_pending_code() {
        let state = WizardState::new();
        let (next, issued) =
            request_code(&state, "9999999999", &mut FixedCodes::new([4321])).unwrap();
        assert_eq!(issued.code, 4321);
        assert_eq!(
            issued.notice(),
            "OTP sent to 9999999999 (for testing, the OTP is 4321)"
        );
        assert_eq!(
            next.otp(),
            &OtpState::Pending {
                phone_number: "9999999999".to_string(),
                code: 4321
            }
        );
    }

    #[test]
    fn second_request_overwrites_first() {
        let mut source = FixedCodes::new([1111, 2222]);
        let (s1, _) = request_code(&WizardState::new(), "1", &mut source).unwrap();
        let (s2, _) = request_code(&s1, "1", &mut source).unwrap();
        let mut store = MemoryRegistry::new();

        assert!(matches!(
            verify_code(&s2, "1111", &mut store),
            Err(CemsError::IncorrectOtp)
        ));
        assert!(verify_code(&s2, "2222", &mut store).is_ok());
    }

    #[test]
    fn correct_code_creates_exactly_one_user() {
        let (state, issued) =
            request_code(&WizardState::new(), "9999999999", &mut FixedCodes::new([5678]))
                .unwrap();
        let mut store = MemoryRegistry::new();

        let next = verify_code(&state, &issued.code.to_string(), &mut store).unwrap();

        assert_eq!(next.current_page_name(), "Industry Details");
        let user = store.find_user_by_phone("9999999999").unwrap().unwrap();
        assert_eq!(next.user_id(), Some(&user.user_id));
        assert_eq!(store.counts().unwrap().users, 1);
    }

    #[test]
    fn wrong_code_writes_nothing() {
        let (state, _) =
            request_code(&WizardState::new(), "9999999999", &mut FixedCodes::new([5678]))
                .unwrap();
        let mut store = MemoryRegistry::new();

        for guess in ["0000", "5679", "", "567"] {
            let result = verify_code(&state, guess, &mut store);
            assert!(matches!(result, Err(CemsError::IncorrectOtp)));
            assert_eq!(store.counts().unwrap().users, 0);
            assert_eq!(state.current_page_name(), "Login or Sign Up");
        }
    }

    #[test]
    fn submitted_code_is_cut_to_widget_length() {
        let (state, _) =
            request_code(&WizardState::new(), "9999999999", &mut FixedCodes::new([5678]))
                .unwrap();
        let mut store = MemoryRegistry::new();
        assert!(verify_code(&state, " 56789", &mut store).is_ok());
    }

    #[test]
    fn verify_without_request_fails() {
        let mut store = MemoryRegistry::new();
        let err = verify_code(&WizardState::new(), "1234", &mut store).unwrap_err();
        assert!(matches!(err, CemsError::NoPendingOtp));
    }

    #[test]
    fn returning_phone_is_a_duplicate() {
        let mut store = MemoryRegistry::new();
        store.create_user("9999999999").unwrap();
        let (state, _) =
            request_code(&WizardState::new(), "9999999999", &mut FixedCodes::new([1234]))
                .unwrap();
        let err = verify_code(&state, "1234", &mut store).unwrap_err();
        assert!(matches!(err, CemsError::DuplicatePhone(_)));
    }
}
