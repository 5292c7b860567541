//! # Core Type Definitions
//!
//! This module contains all core types for the CEMS registration portal:
//! - Record identifiers (`UserId`, `StackId`, `InstrumentId`)
//! - Fixed option lists of the forms (`Parameter`, `StackCondition`, ...)
//! - Row shapes of the three tables (`UserRecord`, `StackRecord`, `InstrumentRecord`)
//! - Error types (`CemsError`)
//!
//! ## Storage Compatibility
//!
//! Every persisted type is serialized with postcard, so enums stay externally
//! tagged and no field is conditionally skipped.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// RECORD IDENTIFIERS
// =============================================================================

/// Opaque identifier of a registrant, generated at first successful OTP check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Generate a fresh random (UUID v4) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned identifier of a stack row. Starts at 1, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackId(pub u64);

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of an instrument row. Starts at 1, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u64);

// =============================================================================
// CHOICE LISTS
// =============================================================================

/// A closed list of options offered by a select widget.
///
/// The first entry of `ALL` is the widget default and the fallback for
/// labels that match no option.
pub trait Choice: Sized + Copy + 'static {
    /// Every option, in display order.
    const ALL: &'static [Self];

    /// The label shown to the user and stored in exports.
    fn label(self) -> &'static str;

    /// Find the option with exactly this label.
    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.label() == label)
    }

    /// Parse a submitted label, falling back to the default option.
    fn coerce(label: Option<&str>) -> Self {
        label
            .and_then(|l| Self::from_label(l.trim()))
            .unwrap_or(Self::ALL[0])
    }

    /// All labels, in display order.
    fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.label()).collect()
    }
}

/// A pollutant or reference parameter measured by one CEMS instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Parameter {
    #[serde(rename = "PM")]
    Pm,
    #[serde(rename = "SOx")]
    Sox,
    #[serde(rename = "NOx")]
    Nox,
    #[serde(rename = "HCL")]
    Hcl,
    #[serde(rename = "HF")]
    Hf,
    #[serde(rename = "Cl2")]
    Cl2,
    #[serde(rename = "O2")]
    O2,
    Others,
}

impl Choice for Parameter {
    const ALL: &'static [Self] = &[
        Self::Pm,
        Self::Sox,
        Self::Nox,
        Self::Hcl,
        Self::Hf,
        Self::Cl2,
        Self::O2,
        Self::Others,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Pm => "PM",
            Self::Sox => "SOx",
            Self::Nox => "NOx",
            Self::Hcl => "HCL",
            Self::Hf => "HF",
            Self::Cl2 => "Cl2",
            Self::O2 => "O2",
            Self::Others => "Others",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Flue gas condition inside the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackCondition {
    Wet,
    Dry,
}

impl Choice for StackCondition {
    const ALL: &'static [Self] = &[Self::Wet, Self::Dry];

    fn label(self) -> &'static str {
        match self {
            Self::Wet => "Wet",
            Self::Dry => "Dry",
        }
    }
}

/// Cross-section shape selector on the stack form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackShape {
    Circular,
    Rectangular,
}

impl Choice for StackShape {
    const ALL: &'static [Self] = &[Self::Circular, Self::Rectangular];

    fn label(self) -> &'static str {
        match self {
            Self::Circular => "Circular",
            Self::Rectangular => "Rectangular",
        }
    }
}

/// Physical cross-section of a stack. Dimensions in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StackGeometry {
    Circular { diameter: f64 },
    Rectangular { length: f64, width: f64 },
}

impl StackGeometry {
    /// The shape selector matching this geometry.
    #[must_use]
    pub fn shape(&self) -> StackShape {
        match self {
            Self::Circular { .. } => StackShape::Circular,
            Self::Rectangular { .. } => StackShape::Rectangular,
        }
    }
}

/// How the manual monitoring platform can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformAccess {
    #[serde(rename = "Yes - Ladder")]
    Ladder,
    #[serde(rename = "Yes - Lift")]
    Lift,
    #[serde(rename = "Yes - Staircase")]
    Staircase,
    #[serde(rename = "No - Must be Approachable, Follow CPCB Guidelines")]
    NotApproachable,
}

impl Choice for PlatformAccess {
    const ALL: &'static [Self] = &[
        Self::Ladder,
        Self::Lift,
        Self::Staircase,
        Self::NotApproachable,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Ladder => "Yes - Ladder",
            Self::Lift => "Yes - Lift",
            Self::Staircase => "Yes - Staircase",
            Self::NotApproachable => "No - Must be Approachable, Follow CPCB Guidelines",
        }
    }
}

/// Where the analyser is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CemsLocation {
    #[serde(rename = "Stack/Chimney")]
    Stack,
    Duct,
    Both,
}

impl Choice for CemsLocation {
    const ALL: &'static [Self] = &[Self::Stack, Self::Duct, Self::Both];

    fn label(self) -> &'static str {
        match self {
            Self::Stack => "Stack/Chimney",
            Self::Duct => "Duct",
            Self::Both => "Both",
        }
    }
}

/// Answer to an installation guideline question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compliance {
    Yes,
    #[serde(rename = "No - Refer CPCB Guidelines")]
    No,
}

impl Choice for Compliance {
    const ALL: &'static [Self] = &[Self::Yes, Self::No];

    fn label(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No - Refer CPCB Guidelines",
        }
    }
}

/// Upper-case YES/NO flag used by the instrument form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YesNo {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl Choice for YesNo {
    const ALL: &'static [Self] = &[Self::Yes, Self::No];

    fn label(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }
}

/// Default output protocol of an analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "4-20 mA")]
    CurrentLoop,
    #[serde(rename = "RS-485")]
    Rs485,
    #[serde(rename = "RS-423")]
    Rs423,
}

impl Choice for Protocol {
    const ALL: &'static [Self] = &[Self::CurrentLoop, Self::Rs485, Self::Rs423];

    fn label(self) -> &'static str {
        match self {
            Self::CurrentLoop => "4-20 mA",
            Self::Rs485 => "RS-485",
            Self::Rs423 => "RS-423",
        }
    }
}

/// Sampling approach of an analyser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementMethod {
    #[serde(rename = "In-situ")]
    InSitu,
    Extractive,
}

impl Choice for MeasurementMethod {
    const ALL: &'static [Self] = &[Self::InSitu, Self::Extractive];

    fn label(self) -> &'static str {
        match self {
            Self::InSitu => "In-situ",
            Self::Extractive => "Extractive",
        }
    }
}

// =============================================================================
// USER / INDUSTRY
// =============================================================================

/// Industry profile collected on the Industry Details page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndustryDetails {
    pub industry_category: String,
    pub state_ocmms_id: String,
    pub industry_name: String,
    pub address: String,
    pub state: String,
    pub district: String,
    pub production_capacity: u64,
    /// Declared stack count. Never reconciled with the stored stack rows.
    pub num_stacks: u32,
    pub env_head: String,
    pub instrument_head: String,
    pub cems_person: String,
    pub representative_email: String,
}

/// One row of the `users` table.
///
/// `details` is `None` between OTP verification and the industry submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub phone_number: String,
    pub details: Option<IndustryDetails>,
}

// =============================================================================
// STACK
// =============================================================================

/// Everything the Stack Details page collects for one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDetails {
    pub process_attached: String,
    pub apcd_details: String,
    pub latitude: f64,
    pub longitude: f64,
    pub stack_condition: StackCondition,
    pub geometry: StackGeometry,
    pub construction_material: String,
    pub stack_height: f64,
    pub platform_height: f64,
    pub platform_accessibility: PlatformAccess,
    pub cems_installed: CemsLocation,
    pub compliance_8d_2d: Compliance,
    pub monitoring_port_installed: Compliance,
    pub cems_below_monitoring: Compliance,
    /// Free-text list of parameters required to be monitored.
    pub parameters: String,
}

/// One row of the `stacks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRecord {
    pub stack_id: StackId,
    pub user_id: UserId,
    pub details: StackDetails,
}

// =============================================================================
// INSTRUMENT
// =============================================================================

/// One parameter sub-form of the CEMS Instrument Details page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDetails {
    pub parameter: Parameter,
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub measuring_range_low: f64,
    /// Never below `measuring_range_low` when built from a form; the store
    /// accepts any value.
    pub measuring_range_high: f64,
    pub certified: YesNo,
    pub certification_agency_name: String,
    pub communication_protocol: Protocol,
    pub measurement_method: MeasurementMethod,
    pub technology: String,
    pub connected_bspcb: YesNo,
    pub connected_cpcb: YesNo,
}

/// One row of the `cems_instruments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub cems_id: InstrumentId,
    pub stack_id: StackId,
    pub details: InstrumentDetails,
}

/// Row counts of the three tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryCounts {
    pub users: usize,
    pub stacks: usize,
    pub instruments: usize,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the registration core.
#[derive(Debug, Error)]
pub enum CemsError {
    /// `send_otp` was pressed with an empty phone number.
    #[error("Please enter a valid phone number.")]
    EmptyPhoneNumber,

    /// `verify_otp` was pressed before any code was requested.
    #[error("No OTP has been requested for this session.")]
    NoPendingOtp,

    /// The submitted code does not match the pending one.
    #[error("Incorrect OTP. Please try again.")]
    IncorrectOtp,

    /// An instrument was submitted for a parameter that is not selected.
    #[error("Parameter '{0}' is not selected on this page")]
    ParameterNotSelected(String),

    /// The action is not available on the current page.
    #[error("Action '{action}' is not available on page '{page}'")]
    InvalidTransition {
        page: &'static str,
        action: &'static str,
    },

    /// A user with this phone number already exists.
    #[error("Phone number {0} is already registered")]
    DuplicatePhone(String),

    /// The referenced user row does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The referenced stack row does not exist.
    #[error("Stack not found: {0}")]
    StackNotFound(StackId),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage engine error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CemsError {
    /// Inline, recoverable input errors: the wizard state is left untouched.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPhoneNumber
                | Self::NoPendingOtp
                | Self::IncorrectOtp
                | Self::ParameterNotSelected(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn choice_labels_round_trip() {
        for p in Parameter::ALL {
            assert_eq!(Parameter::from_label(p.label()), Some(*p));
        }
        assert_eq!(
            PlatformAccess::from_label("Yes - Staircase"),
            Some(PlatformAccess::Staircase)
        );
    }

    #[test]
    fn coerce_falls_back_to_first_option() {
        assert_eq!(Protocol::coerce(None), Protocol::CurrentLoop);
        assert_eq!(Protocol::coerce(Some("carrier pigeon")), Protocol::CurrentLoop);
        assert_eq!(Protocol::coerce(Some(" RS-485 ")), Protocol::Rs485);
    }

    #[test]
    fn choices_survive_postcard() {
        let bytes = postcard::to_allocvec(&Parameter::Sox).expect("encode");
        let back: Parameter = postcard::from_bytes(&bytes).expect("decode");
        assert_eq!(back.label(), "SOx");
    }

    #[test]
    fn geometry_reports_shape() {
        let g = StackGeometry::Rectangular {
            length: 2.0,
            width: 1.5,
        };
        assert_eq!(g.shape(), StackShape::Rectangular);
    }

    #[test]
    fn generated_user_ids_are_distinct() {
        let a = UserId::generate();
        let b = UserId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn validation_classification() {
        assert!(CemsError::IncorrectOtp.is_validation());
        assert!(CemsError::EmptyPhoneNumber.is_validation());
        assert!(!CemsError::DuplicatePhone("1".to_string()).is_validation());
    }
}
