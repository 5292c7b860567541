//! # Form Primitives
//!
//! Fixed limits and labels of the registration forms.
//!
//! These mirror the input widgets: a value longer than a widget allows is
//! cut to the widget length before it reaches the wizard.

/// Title shown above every page.
pub const PORTAL_TITLE: &str = "Industry Registration Portal";

/// Maximum characters accepted by the phone number input.
pub const PHONE_MAX_CHARS: usize = 10;

/// Maximum characters accepted by the OTP input.
pub const OTP_MAX_CHARS: usize = 4;

/// Smallest code the OTP gate issues.
pub const OTP_MIN: u16 = 1000;

/// Largest code the OTP gate issues.
pub const OTP_MAX: u16 = 9999;

/// Minimum declared stack count on the industry form.
pub const MIN_NUM_STACKS: u32 = 1;

/// Cut `input` to at most `max_chars` characters, after trimming whitespace.
#[must_use]
pub fn clip(input: &str, max_chars: usize) -> String {
    input.trim().chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_range_is_four_digits() {
        assert_eq!(OTP_MIN.to_string().len(), OTP_MAX_CHARS);
        assert_eq!(OTP_MAX.to_string().len(), OTP_MAX_CHARS);
    }

    #[test]
    fn clip_trims_and_truncates() {
        assert_eq!(clip("  98765432101234 ", PHONE_MAX_CHARS), "9876543210");
        assert_eq!(clip("12", OTP_MAX_CHARS), "12");
        assert_eq!(clip("   ", PHONE_MAX_CHARS), "");
    }
}
