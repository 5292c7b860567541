//! # cems-core
//!
//! The registration engine of the CEMS portal - THE LOGIC.
//!
//! Industries register their emission stacks and the Continuous Emission
//! Monitoring System (CEMS) instruments installed on them through a
//! five-page wizard:
//!
//! ```text
//! Login or Sign Up -> Industry Details -> (Stack Details -> CEMS Instrument Details) x N
//!                                                                  -> Registration Complete
//! ```
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: NO async, NO network dependencies
//! - The wizard state is a value; handlers return the next one
//! - Persistence only through `RegistryStore`, one atomic write per action
//! - OTP delivery is out of scope; issued codes are handed back to the caller

// =============================================================================
// MODULES
// =============================================================================

pub mod otp;
pub mod pages;
pub mod primitives;
pub mod registry;
pub mod storage;
pub mod types;
pub mod wizard;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CemsError, CemsLocation, Choice, Compliance, IndustryDetails, InstrumentDetails, InstrumentId,
    InstrumentRecord, MeasurementMethod, Parameter, PlatformAccess, Protocol, RegistryCounts,
    StackCondition, StackDetails, StackGeometry, StackId, StackRecord, StackShape, UserId,
    UserRecord, YesNo,
};

// =============================================================================
// RE-EXPORTS: Wizard + OTP
// =============================================================================

pub use otp::{CodeSource, FixedCodes, OtpIssued, RandomCodes};
pub use wizard::{Action, OtpState, Page, StackProgress, WizardState};

// =============================================================================
// RE-EXPORTS: Pages
// =============================================================================

pub use pages::{
    ActionSpec, FieldKind, FieldSpec, IndustryForm, InstrumentForm, LoginForm, OtpForm, PageView,
    SelectionForm, ShownWhen, StackForm, Step, SubForm, render,
};

// =============================================================================
// RE-EXPORTS: Registry
// =============================================================================

pub use registry::{
    MemoryRegistry, Registration, RegistryStore, StackRegistration, load_all_registrations,
    load_registration,
};
pub use storage::RedbRegistry;
