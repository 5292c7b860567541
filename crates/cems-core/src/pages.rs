//! # Page Renderers
//!
//! The five pages of the registration wizard.
//!
//! Each page has two halves:
//! - `render` turns the current `WizardState` into a `PageView`: the form the
//!   page shows, with its defaults and buttons.
//! - a submit handler takes the posted form, coerces it into a typed record,
//!   calls exactly one `RegistryStore` operation and returns the next state.
//!
//! Forms are deliberately loose (`#[serde(default)]`, optional numbers,
//! choice labels as strings). Coercion fills defaults, applies the widget
//! minimums and maps unknown choice labels to the first option. Nothing else
//! is validated.

use crate::otp::{self, CodeSource};
use crate::primitives::{MIN_NUM_STACKS, OTP_MAX_CHARS, PHONE_MAX_CHARS, PORTAL_TITLE};
use crate::registry::RegistryStore;
use crate::wizard::{Action, OtpState, Page, StackProgress, WizardState};
use crate::{
    CemsError, CemsLocation, Choice, Compliance, IndustryDetails, InstrumentDetails,
    MeasurementMethod, Parameter, PlatformAccess, Protocol, StackCondition, StackDetails,
    StackGeometry, StackShape, YesNo,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// PAGE VIEW
// =============================================================================

/// What a field looks like and what it starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        default: String,
        max_chars: Option<usize>,
    },
    TextArea {
        default: String,
    },
    Number {
        default: f64,
        min: Option<f64>,
        /// The minimum is the current value of this field instead.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_key: Option<String>,
    },
    Select {
        options: Vec<String>,
        default: String,
    },
    MultiSelect {
        options: Vec<String>,
        selected: Vec<String>,
    },
    /// Not shown; posted back as is.
    Hidden {
        value: String,
    },
}

/// Show a field only while another field holds a given value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShownWhen {
    pub key: String,
    pub equals: String,
}

/// One input of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shown_when: Option<ShownWhen>,
}

/// A button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub action: Action,
    pub label: String,
    /// Path segment relative to the session.
    pub endpoint: String,
}

impl From<Action> for ActionSpec {
    fn from(action: Action) -> Self {
        Self {
            action,
            label: action.label().to_string(),
            endpoint: action.endpoint().to_string(),
        }
    }
}

/// One per-parameter sub-form of the instrument page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubForm {
    pub parameter: Parameter,
    pub heading: String,
    pub fields: Vec<FieldSpec>,
    pub submit: ActionSpec,
    /// Whether this parameter was already submitted during this visit.
    pub submitted: bool,
}

/// Everything needed to draw the current page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    pub title: String,
    pub page: String,
    pub header: String,
    pub fields: Vec<FieldSpec>,
    pub sub_forms: Vec<SubForm>,
    pub actions: Vec<ActionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl PageView {
    fn new(page: &Page, header: impl Into<String>) -> Self {
        Self {
            title: PORTAL_TITLE.to_string(),
            page: page.name().to_string(),
            header: header.into(),
            fields: Vec::new(),
            sub_forms: Vec::new(),
            actions: Vec::new(),
            info: None,
        }
    }

    /// Look up a top-level field by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }
}

// Field constructors. Keys double as the form struct field names.

fn text(key: &str, label: &str) -> FieldSpec {
    FieldSpec {
        key: key.to_string(),
        label: label.to_string(),
        kind: FieldKind::Text {
            default: String::new(),
            max_chars: None,
        },
        shown_when: None,
    }
}

fn limited_text(key: &str, label: &str, max_chars: usize) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Text {
            default: String::new(),
            max_chars: Some(max_chars),
        },
        ..text(key, label)
    }
}

fn text_area(key: &str, label: &str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::TextArea {
            default: String::new(),
        },
        ..text(key, label)
    }
}

fn number(key: &str, label: &str, default: f64, min: Option<f64>) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Number {
            default,
            min,
            min_key: None,
        },
        ..text(key, label)
    }
}

/// A number whose minimum follows another field of the same form.
fn number_at_least(key: &str, label: &str, min_key: &str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Number {
            default: 0.0,
            min: Some(0.0),
            min_key: Some(min_key.to_string()),
        },
        ..text(key, label)
    }
}

fn hidden(key: &str, value: &str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Hidden {
            value: value.to_string(),
        },
        ..text(key, "")
    }
}

fn select<C: Choice>(key: &str, label: &str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Select {
            options: C::labels().into_iter().map(str::to_string).collect(),
            default: C::ALL[0].label().to_string(),
        },
        ..text(key, label)
    }
}

fn shown_when(field: FieldSpec, key: &str, equals: &str) -> FieldSpec {
    FieldSpec {
        shown_when: Some(ShownWhen {
            key: key.to_string(),
            equals: equals.to_string(),
        }),
        ..field
    }
}

// =============================================================================
// RENDER
// =============================================================================

/// Render the page the session is currently on.
#[must_use]
pub fn render(state: &WizardState) -> PageView {
    let page = state.page();
    match page {
        Page::LoginOrSignup => render_login(page, state.otp()),
        Page::IndustryDetails { .. } => render_industry(page),
        Page::StackDetails { progress, .. } => render_stack(page, *progress),
        Page::CemsInstrumentDetails {
            progress,
            selected,
            submitted,
            ..
        } => render_instruments(page, *progress, selected, submitted),
        Page::RegistrationComplete { .. } => {
            let mut view = PageView::new(page, "Registration Complete");
            view.info = Some(
                "Thank you for registering. Your details have been successfully saved. \
                 You can now exit or start a new registration if needed."
                    .to_string(),
            );
            view
        }
    }
}

fn render_login(page: &Page, otp: &OtpState) -> PageView {
    let mut view = PageView::new(page, "Welcome! Please log in or sign up to continue.");
    view.fields.push(limited_text(
        "phone_number",
        "Enter your phone number",
        PHONE_MAX_CHARS,
    ));
    view.actions.push(Action::SendOtp.into());

    if matches!(otp, OtpState::Pending { .. }) {
        view.fields.push(limited_text(
            "code",
            "Enter the OTP you received",
            OTP_MAX_CHARS,
        ));
        view.actions.push(Action::VerifyOtp.into());
    }
    view
}

fn render_industry(page: &Page) -> PageView {
    let mut view = PageView::new(page, "Industry Basic Details");
    view.fields = vec![
        text("industry_category", "Industry Category"),
        text("state_ocmms_id", "State OCMMS ID"),
        text("industry_name", "Industry Name"),
        text_area("address", "Address"),
        text("state", "State"),
        text("district", "District"),
        number("production_capacity", "Production Capacity", 0.0, Some(0.0)),
        number(
            "num_stacks",
            "Number of Stacks",
            f64::from(MIN_NUM_STACKS),
            Some(f64::from(MIN_NUM_STACKS)),
        ),
        text("env_head", "Industry Environment Head"),
        text("instrument_head", "Industry Instrument Head"),
        text("cems_person", "Concerned Person for CEMS"),
        text("representative_email", "Industry Representative Email ID"),
    ];
    view.actions.push(Action::SubmitIndustry.into());
    view
}

fn render_stack(page: &Page, progress: StackProgress) -> PageView {
    let mut view = PageView::new(
        page,
        format!(
            "Stack Details - Stack {} of {}",
            progress.current_stack, progress.num_stacks
        ),
    );
    let circular = StackShape::Circular.label();
    let rectangular = StackShape::Rectangular.label();
    view.fields = vec![
        text("process_attached", "Process Attached"),
        text("apcd_details", "APCD Details"),
        number("latitude", "Latitude", 0.0, None),
        number("longitude", "Longitude", 0.0, None),
        select::<StackCondition>("stack_condition", "Stack Condition"),
        select::<StackShape>("stack_type", "Is it a Circular Stack/Rectangular Stack"),
        shown_when(
            number("diameter", "Diameter (if Circular)", 0.0, None),
            "stack_type",
            circular,
        ),
        shown_when(
            number("length", "Length (if Rectangular)", 0.0, None),
            "stack_type",
            rectangular,
        ),
        shown_when(
            number("width", "Width (if Rectangular)", 0.0, None),
            "stack_type",
            rectangular,
        ),
        text("construction_material", "Stack Construction Material"),
        number("stack_height", "Stack Height (in meters)", 0.0, None),
        number(
            "platform_height",
            "Platform for Manual Monitoring Location Height from Ground (in meters)",
            0.0,
            None,
        ),
        select::<PlatformAccess>("platform_accessibility", "Is Platform Approachable?"),
        select::<CemsLocation>("cems_installed", "Where is CEMS Installed?"),
        select::<Compliance>(
            "compliance_8d_2d",
            "Does the Installation Follow 8D/2D Formula?",
        ),
        select::<Compliance>(
            "monitoring_port_installed",
            "Has a Manual Monitoring Port Been Installed in the Duct?",
        ),
        select::<Compliance>(
            "cems_below_monitoring",
            "Is CEMS Installation Point at Least 500mm Below the Manual Monitoring Point?",
        ),
        text_area(
            "parameters",
            "What are the Parameters Required to be Monitored?",
        ),
    ];
    view.actions.push(Action::SubmitStack.into());
    view
}

fn render_instruments(
    page: &Page,
    progress: StackProgress,
    selected: &[Parameter],
    submitted: &[Parameter],
) -> PageView {
    let mut view = PageView::new(
        page,
        format!(
            "CEMS Instrument Details for Stack {} of {}",
            progress.current_stack, progress.num_stacks
        ),
    );
    view.fields.push(FieldSpec {
        kind: FieldKind::MultiSelect {
            options: Parameter::labels().into_iter().map(str::to_string).collect(),
            selected: selected.iter().map(|p| p.label().to_string()).collect(),
        },
        ..text("parameters", "Select Parameters")
    });
    view.actions.push(Action::SelectParameters.into());

    view.sub_forms = selected
        .iter()
        .map(|&parameter| instrument_sub_form(parameter, submitted.contains(&parameter)))
        .collect();

    view.actions.push(Action::CompleteCems.into());
    view
}

fn instrument_sub_form(parameter: Parameter, submitted: bool) -> SubForm {
    let p = parameter.label();
    let labelled = |label: &str| format!("{label} for {p}");

    // Keys are the `InstrumentForm` field names; `SubForm::parameter` scopes them.
    let fields = vec![
        hidden("parameter", p),
        text("make", &labelled("Make")),
        text("model", &labelled("Model")),
        text("serial_number", &labelled("Serial Number")),
        number(
            "measuring_range_low",
            &labelled("Measuring Range Low"),
            0.0,
            Some(0.0),
        ),
        number_at_least(
            "measuring_range_high",
            &labelled("Measuring Range High"),
            "measuring_range_low",
        ),
        select::<YesNo>("certified", &labelled("Certified")),
        text(
            "certification_agency_name",
            &labelled("Certification Agency Name"),
        ),
        select::<Protocol>(
            "communication_protocol",
            &labelled("Default Communication Protocol"),
        ),
        select::<MeasurementMethod>("measurement_method", &labelled("Measurement Method")),
        text("technology", &labelled("Technology")),
        select::<YesNo>("connected_bspcb", &labelled("Connected to BSPCB Server")),
        select::<YesNo>("connected_cpcb", &labelled("Connected to CPCB Server")),
    ];

    let mut submit = ActionSpec::from(Action::SubmitInstrument);
    submit.label = format!("Submit CEMS Details for {p}");

    SubForm {
        parameter,
        heading: format!("Details for Parameter: {p}"),
        fields,
        submit,
        submitted,
    }
}

// =============================================================================
// FORMS
// =============================================================================

/// Login page: phone number input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub phone_number: String,
}

/// Login page: OTP input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpForm {
    pub code: String,
}

/// Industry Details page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndustryForm {
    pub industry_category: String,
    pub state_ocmms_id: String,
    pub industry_name: String,
    pub address: String,
    pub state: String,
    pub district: String,
    pub production_capacity: Option<f64>,
    pub num_stacks: Option<f64>,
    pub env_head: String,
    pub instrument_head: String,
    pub cems_person: String,
    pub representative_email: String,
}

impl IndustryForm {
    /// Coerce into a record: whole numbers, capacity at least 0, stack count
    /// at least 1.
    #[must_use]
    pub fn to_details(&self) -> IndustryDetails {
        let min_stacks = f64::from(MIN_NUM_STACKS);
        // `as` truncates toward zero and saturates at the target bounds.
        let num_stacks = self.num_stacks.unwrap_or(min_stacks).max(min_stacks) as u32;
        let production_capacity = self.production_capacity.unwrap_or(0.0).max(0.0) as u64;

        IndustryDetails {
            industry_category: self.industry_category.clone(),
            state_ocmms_id: self.state_ocmms_id.clone(),
            industry_name: self.industry_name.clone(),
            address: self.address.clone(),
            state: self.state.clone(),
            district: self.district.clone(),
            production_capacity,
            num_stacks,
            env_head: self.env_head.clone(),
            instrument_head: self.instrument_head.clone(),
            cems_person: self.cems_person.clone(),
            representative_email: self.representative_email.clone(),
        }
    }
}

/// Stack Details page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackForm {
    pub process_attached: String,
    pub apcd_details: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub stack_condition: Option<String>,
    pub stack_type: Option<String>,
    pub diameter: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub construction_material: String,
    pub stack_height: Option<f64>,
    pub platform_height: Option<f64>,
    pub platform_accessibility: Option<String>,
    pub cems_installed: Option<String>,
    pub compliance_8d_2d: Option<String>,
    pub monitoring_port_installed: Option<String>,
    pub cems_below_monitoring: Option<String>,
    pub parameters: String,
}

impl StackForm {
    /// Coerce into a record. Only the dimensions of the chosen shape are kept.
    #[must_use]
    pub fn to_details(&self) -> StackDetails {
        let geometry = match StackShape::coerce(self.stack_type.as_deref()) {
            StackShape::Circular => StackGeometry::Circular {
                diameter: self.diameter.unwrap_or(0.0),
            },
            StackShape::Rectangular => StackGeometry::Rectangular {
                length: self.length.unwrap_or(0.0),
                width: self.width.unwrap_or(0.0),
            },
        };

        StackDetails {
            process_attached: self.process_attached.clone(),
            apcd_details: self.apcd_details.clone(),
            latitude: self.latitude.unwrap_or(0.0),
            longitude: self.longitude.unwrap_or(0.0),
            stack_condition: StackCondition::coerce(self.stack_condition.as_deref()),
            geometry,
            construction_material: self.construction_material.clone(),
            stack_height: self.stack_height.unwrap_or(0.0),
            platform_height: self.platform_height.unwrap_or(0.0),
            platform_accessibility: PlatformAccess::coerce(
                self.platform_accessibility.as_deref(),
            ),
            cems_installed: CemsLocation::coerce(self.cems_installed.as_deref()),
            compliance_8d_2d: Compliance::coerce(self.compliance_8d_2d.as_deref()),
            monitoring_port_installed: Compliance::coerce(
                self.monitoring_port_installed.as_deref(),
            ),
            cems_below_monitoring: Compliance::coerce(self.cems_below_monitoring.as_deref()),
            parameters: self.parameters.clone(),
        }
    }
}

/// CEMS Instrument Details page: the parameter multiselect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionForm {
    pub parameters: Vec<String>,
}

impl SelectionForm {
    /// Known parameters only; unknown labels are dropped.
    #[must_use]
    pub fn to_parameters(&self) -> Vec<Parameter> {
        self.parameters
            .iter()
            .filter_map(|l| Parameter::from_label(l.trim()))
            .collect()
    }
}

/// CEMS Instrument Details page: one parameter sub-form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentForm {
    pub parameter: String,
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub measuring_range_low: Option<f64>,
    pub measuring_range_high: Option<f64>,
    pub certified: Option<String>,
    pub certification_agency_name: String,
    pub communication_protocol: Option<String>,
    pub measurement_method: Option<String>,
    pub technology: String,
    pub connected_bspcb: Option<String>,
    pub connected_cpcb: Option<String>,
}

impl InstrumentForm {
    /// The parameter this sub-form belongs to. No fallback: it selects the row.
    pub fn parameter(&self) -> Result<Parameter, CemsError> {
        Parameter::from_label(self.parameter.trim())
            .ok_or_else(|| CemsError::ParameterNotSelected(self.parameter.clone()))
    }

    /// Coerce into a record: range low at least 0, range high at least low.
    pub fn to_details(&self) -> Result<InstrumentDetails, CemsError> {
        let low = self.measuring_range_low.unwrap_or(0.0).max(0.0);
        let high = self.measuring_range_high.unwrap_or(low).max(low);

        Ok(InstrumentDetails {
            parameter: self.parameter()?,
            make: self.make.clone(),
            model: self.model.clone(),
            serial_number: self.serial_number.clone(),
            measuring_range_low: low,
            measuring_range_high: high,
            certified: YesNo::coerce(self.certified.as_deref()),
            certification_agency_name: self.certification_agency_name.clone(),
            communication_protocol: Protocol::coerce(self.communication_protocol.as_deref()),
            measurement_method: MeasurementMethod::coerce(self.measurement_method.as_deref()),
            technology: self.technology.clone(),
            connected_bspcb: YesNo::coerce(self.connected_bspcb.as_deref()),
            connected_cpcb: YesNo::coerce(self.connected_cpcb.as_deref()),
        })
    }
}

// =============================================================================
// SUBMIT HANDLERS
// =============================================================================

/// Result of a successful button press.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// The state to keep for the next request.
    pub state: WizardState,
    /// Inline success message.
    pub message: String,
}

impl Step {
    fn new(state: WizardState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// "Send OTP" on the login page.
pub fn send_otp(
    state: &WizardState,
    form: &LoginForm,
    codes: &mut dyn CodeSource,
) -> Result<Step, CemsError> {
    let (next, issued) = otp::request_code(state, &form.phone_number, codes)?;
    Ok(Step::new(next, issued.notice()))
}

/// "Verify OTP" on the login page. Creates the user row.
pub fn verify_otp<S: RegistryStore + ?Sized>(
    state: &WizardState,
    form: &OtpForm,
    store: &mut S,
) -> Result<Step, CemsError> {
    let next = otp::verify_code(state, &form.code, store)?;
    Ok(Step::new(next, "OTP Verified!"))
}

/// "Submit Industry Details". Fills the user row and starts the stack loop.
pub fn submit_industry<S: RegistryStore + ?Sized>(
    state: &WizardState,
    form: &IndustryForm,
    store: &mut S,
) -> Result<Step, CemsError> {
    let Page::IndustryDetails { user_id } = state.page() else {
        return Err(state.reject(Action::SubmitIndustry));
    };

    let details = form.to_details();
    store.update_user_details(user_id, &details)?;
    let next = state.after_industry(details.num_stacks)?;
    Ok(Step::new(next, "Industry details submitted successfully!"))
}

/// "Submit Stack Details". Inserts one stack row.
pub fn submit_stack<S: RegistryStore + ?Sized>(
    state: &WizardState,
    form: &StackForm,
    store: &mut S,
) -> Result<Step, CemsError> {
    let Page::StackDetails { user_id, .. } = state.page() else {
        return Err(state.reject(Action::SubmitStack));
    };

    let stack_id = store.insert_stack(user_id, &form.to_details())?;
    let next = state.after_stack(stack_id)?;
    Ok(Step::new(next, "Stack details submitted successfully!"))
}

/// The parameter multiselect. Writes nothing.
pub fn select_parameters(state: &WizardState, form: &SelectionForm) -> Result<Step, CemsError> {
    let parameters = form.to_parameters();
    let next = state.with_selection(&parameters)?;
    let message = if parameters.is_empty() {
        "No parameters selected.".to_string()
    } else {
        let labels: Vec<_> = parameters.iter().map(|p| p.label()).collect();
        format!("Selected parameters: {}", labels.join(", "))
    };
    Ok(Step::new(next, message))
}

/// "Submit CEMS Details for {parameter}". Inserts one instrument row.
///
/// Submitting the same parameter twice stores two rows.
pub fn submit_instrument<S: RegistryStore + ?Sized>(
    state: &WizardState,
    form: &InstrumentForm,
    store: &mut S,
) -> Result<Step, CemsError> {
    if !matches!(state.page(), Page::CemsInstrumentDetails { .. }) {
        return Err(state.reject(Action::SubmitInstrument));
    }

    let details = form.to_details()?;
    let stack_id = state.instrument_target(details.parameter)?;
    store.insert_instrument(stack_id, &details)?;
    let next = state.with_submitted(details.parameter)?;
    Ok(Step::new(
        next,
        format!(
            "CEMS details for {} submitted successfully!",
            details.parameter
        ),
    ))
}

/// "Complete CEMS Details". Next stack or the end of the wizard.
pub fn complete_cems(state: &WizardState) -> Result<Step, CemsError> {
    let next = state.complete_cems()?;
    let message = if next.is_complete() {
        "All details submitted. Registration is complete."
    } else {
        "Proceeding to the next stack."
    };
    Ok(Step::new(next, message))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::otp::FixedCodes;
    use crate::registry::MemoryRegistry;

    fn on_industry(store: &mut MemoryRegistry) -> WizardState {
        let step = send_otp(
            &WizardState::new(),
            &LoginForm {
                phone_number: "9999999999".to_string(),
            },
            &mut FixedCodes::new([2468]),
        )
        .unwrap();
        verify_otp(
            &step.state,
            &OtpForm {
                code: "2468".to_string(),
            },
            store,
        )
        .unwrap()
        .state
    }

    fn on_instruments(store: &mut MemoryRegistry, num_stacks: u32) -> WizardState {
        let state = on_industry(store);
        let state = submit_industry(
            &state,
            &IndustryForm {
                num_stacks: Some(f64::from(num_stacks)),
                ..IndustryForm::default()
            },
            store,
        )
        .unwrap()
        .state;
        submit_stack(&state, &StackForm::default(), store)
            .unwrap()
            .state
    }

    #[test]
    fn login_view_shows_otp_input_only_after_send() {
        let view = render(&WizardState::new());
        assert_eq!(view.page, "Login or Sign Up");
        assert!(view.field("phone_number").is_some());
        assert!(view.field("code").is_none());
        assert_eq!(view.actions.len(), 1);

        let step = send_otp(
            &WizardState::new(),
            &LoginForm {
                phone_number: "123".to_string(),
            },
            &mut FixedCodes::new([1000]),
        )
        .unwrap();
        let view = render(&step.state);
        assert!(view.field("code").is_some());
        assert_eq!(view.actions[1].action, Action::VerifyOtp);
    }

    #[test]
    fn industry_view_defaults() {
        let mut store = MemoryRegistry::new();
        let view = render(&on_industry(&mut store));
        assert_eq!(view.header, "Industry Basic Details");
        assert_eq!(view.fields.len(), 12);
        assert_eq!(
            view.field("num_stacks").unwrap().kind,
            FieldKind::Number {
                default: 1.0,
                min: Some(1.0),
                min_key: None,
            }
        );
    }

    #[test]
    fn industry_form_accepts_advertised_number_defaults() {
        let form: IndustryForm =
            serde_json::from_str(r#"{"num_stacks": 1.0, "production_capacity": 0.0}"#).unwrap();
        let details = form.to_details();
        assert_eq!(details.num_stacks, 1);
        assert_eq!(details.production_capacity, 0);

        let form: IndustryForm =
            serde_json::from_str(r#"{"num_stacks": 2.9, "production_capacity": 1200}"#).unwrap();
        let details = form.to_details();
        assert_eq!(details.num_stacks, 2);
        assert_eq!(details.production_capacity, 1200);
    }

    #[test]
    fn industry_submit_updates_user_and_starts_loop() {
        let mut store = MemoryRegistry::new();
        let state = on_industry(&mut store);
        let form = IndustryForm {
            industry_name: "Patna Power".to_string(),
            production_capacity: Some(-5.0),
            num_stacks: Some(3.0),
            ..IndustryForm::default()
        };

        let step = submit_industry(&state, &form, &mut store).unwrap();

        let user = store.find_user_by_phone("9999999999").unwrap().unwrap();
        let details = user.details.unwrap();
        assert_eq!(details.industry_name, "Patna Power");
        assert_eq!(details.production_capacity, 0);
        assert_eq!(details.num_stacks, 3);
        assert_eq!(
            render(&step.state).header,
            "Stack Details - Stack 1 of 3"
        );
    }

    #[test]
    fn stack_form_keeps_only_chosen_geometry() {
        let form = StackForm {
            stack_type: Some("Rectangular".to_string()),
            diameter: Some(9.0),
            length: Some(3.0),
            width: Some(2.0),
            ..StackForm::default()
        };
        assert_eq!(
            form.to_details().geometry,
            StackGeometry::Rectangular {
                length: 3.0,
                width: 2.0
            }
        );

        let defaults = StackForm::default().to_details();
        assert_eq!(defaults.geometry, StackGeometry::Circular { diameter: 0.0 });
        assert_eq!(defaults.stack_condition, StackCondition::Wet);
        assert_eq!(defaults.platform_accessibility, PlatformAccess::Ladder);
    }

    #[test]
    fn stack_view_marks_shape_dependent_fields() {
        let mut store = MemoryRegistry::new();
        let state = on_industry(&mut store);
        let state = submit_industry(&state, &IndustryForm::default(), &mut store)
            .unwrap()
            .state;
        let view = render(&state);
        let width = view.field("width").unwrap();
        assert_eq!(
            width.shown_when,
            Some(ShownWhen {
                key: "stack_type".to_string(),
                equals: "Rectangular".to_string()
            })
        );
        assert!(view.field("stack_height").unwrap().shown_when.is_none());
    }

    #[test]
    fn instrument_range_is_coerced() {
        let form = InstrumentForm {
            parameter: "SOx".to_string(),
            measuring_range_low: Some(-3.0),
            measuring_range_high: None,
            ..InstrumentForm::default()
        };
        let details = form.to_details().unwrap();
        assert_eq!(details.measuring_range_low, 0.0);
        assert_eq!(details.measuring_range_high, 0.0);

        let form = InstrumentForm {
            parameter: "SOx".to_string(),
            measuring_range_low: Some(50.0),
            measuring_range_high: Some(10.0),
            ..InstrumentForm::default()
        };
        assert_eq!(form.to_details().unwrap().measuring_range_high, 50.0);
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let form = InstrumentForm {
            parameter: "CO2".to_string(),
            ..InstrumentForm::default()
        };
        assert!(matches!(
            form.to_details(),
            Err(CemsError::ParameterNotSelected(p)) if p == "CO2"
        ));
    }

    #[test]
    fn sub_forms_follow_selection() {
        let mut store = MemoryRegistry::new();
        let state = on_instruments(&mut store, 1);
        let state = select_parameters(
            &state,
            &SelectionForm {
                parameters: vec!["NOx".to_string(), "PM".to_string(), "bogus".to_string()],
            },
        )
        .unwrap()
        .state;

        let view = render(&state);
        assert_eq!(view.header, "CEMS Instrument Details for Stack 1 of 1");
        let params: Vec<_> = view.sub_forms.iter().map(|f| f.parameter).collect();
        assert_eq!(params, vec![Parameter::Pm, Parameter::Nox]);
        assert_eq!(view.sub_forms[0].heading, "Details for Parameter: PM");
        assert_eq!(view.sub_forms[0].fields[1].key, "make");
        assert_eq!(view.sub_forms[0].fields[1].label, "Make for PM");
        assert_eq!(
            view.sub_forms[0].fields[0].kind,
            FieldKind::Hidden {
                value: "PM".to_string()
            }
        );
        assert_eq!(view.sub_forms[1].submit.label, "Submit CEMS Details for NOx");
        assert_eq!(
            view.actions.last().map(|a| a.action),
            Some(Action::CompleteCems)
        );
    }

    /// Fill a sub-form the way a client would: only from the advertised keys.
    fn fill(sub_form: &SubForm) -> serde_json::Value {
        let body: serde_json::Map<String, serde_json::Value> = sub_form
            .fields
            .iter()
            .map(|f| {
                let value = match &f.kind {
                    FieldKind::Text { .. } | FieldKind::TextArea { .. } => {
                        serde_json::json!(format!("FILLED {}", f.key))
                    }
                    FieldKind::Number { min_key: None, .. } => serde_json::json!(42.0),
                    FieldKind::Number { .. } => serde_json::json!(84.0),
                    FieldKind::Select { options, .. } => {
                        serde_json::json!(options.last().unwrap())
                    }
                    FieldKind::MultiSelect { options, .. } => serde_json::json!(options),
                    FieldKind::Hidden { value } => serde_json::json!(value),
                };
                (f.key.clone(), value)
            })
            .collect();
        serde_json::Value::Object(body)
    }

    #[test]
    fn sub_form_keys_reach_the_stored_row() {
        let mut store = MemoryRegistry::new();
        let state = on_instruments(&mut store, 1);
        let state = select_parameters(
            &state,
            &SelectionForm {
                parameters: vec!["SOx".to_string(), "PM".to_string()],
            },
        )
        .unwrap()
        .state;

        let view = render(&state);
        let sub_form = &view.sub_forms[1];
        assert_eq!(sub_form.parameter, Parameter::Sox);
        let form: InstrumentForm = serde_json::from_value(fill(sub_form)).unwrap();
        let state = submit_instrument(&state, &form, &mut store).unwrap().state;

        let Page::CemsInstrumentDetails { stack_id, .. } = state.page() else {
            panic!("left the instrument page");
        };
        let rows = store.instruments_for_stack(*stack_id).unwrap();
        assert_eq!(rows.len(), 1);
        let d = &rows[0].details;
        assert_eq!(d.parameter, Parameter::Sox);
        assert_eq!(d.make, "FILLED make");
        assert_eq!(d.model, "FILLED model");
        assert_eq!(d.serial_number, "FILLED serial_number");
        assert_eq!(d.measuring_range_low, 42.0);
        assert_eq!(d.measuring_range_high, 84.0);
        assert_eq!(d.certified, *YesNo::ALL.last().unwrap());
        assert_eq!(d.certification_agency_name, "FILLED certification_agency_name");
        assert_eq!(d.communication_protocol, *Protocol::ALL.last().unwrap());
        assert_eq!(d.measurement_method, *MeasurementMethod::ALL.last().unwrap());
        assert_eq!(d.technology, "FILLED technology");
        assert_eq!(d.connected_bspcb, *YesNo::ALL.last().unwrap());
        assert_eq!(d.connected_cpcb, *YesNo::ALL.last().unwrap());
    }

    #[test]
    fn range_high_minimum_follows_range_low() {
        let mut store = MemoryRegistry::new();
        let state = on_instruments(&mut store, 1);
        let state = select_parameters(
            &state,
            &SelectionForm {
                parameters: vec!["PM".to_string()],
            },
        )
        .unwrap()
        .state;

        let view = render(&state);
        let high = view.sub_forms[0]
            .fields
            .iter()
            .find(|f| f.key == "measuring_range_high")
            .unwrap();
        assert!(matches!(
            &high.kind,
            FieldKind::Number { min_key: Some(k), .. } if k == "measuring_range_low"
        ));
    }

    #[test]
    fn two_parameters_make_two_rows_on_one_stack() {
        let mut store = MemoryRegistry::new();
        let state = on_instruments(&mut store, 1);
        let state = select_parameters(
            &state,
            &SelectionForm {
                parameters: vec!["PM".to_string(), "NOx".to_string()],
            },
        )
        .unwrap()
        .state;

        let mut state = state;
        for p in ["PM", "NOx"] {
            let form = InstrumentForm {
                parameter: p.to_string(),
                make: "Durag".to_string(),
                ..InstrumentForm::default()
            };
            state = submit_instrument(&state, &form, &mut store).unwrap().state;
        }

        let Page::CemsInstrumentDetails {
            stack_id, submitted, ..
        } = state.page()
        else {
            panic!("left the instrument page");
        };
        let rows = store.instruments_for_stack(*stack_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.stack_id == *stack_id));
        assert_eq!(submitted, &vec![Parameter::Pm, Parameter::Nox]);
        assert!(render(&state).sub_forms.iter().all(|f| f.submitted));
    }

    #[test]
    fn unselected_parameter_writes_nothing() {
        let mut store = MemoryRegistry::new();
        let state = on_instruments(&mut store, 1);
        let form = InstrumentForm {
            parameter: "HF".to_string(),
            ..InstrumentForm::default()
        };
        let err = submit_instrument(&state, &form, &mut store).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.counts().unwrap().instruments, 0);
    }

    #[test]
    fn complete_messages() {
        let mut store = MemoryRegistry::new();
        let state = on_instruments(&mut store, 2);
        let step = complete_cems(&state).unwrap();
        assert_eq!(step.message, "Proceeding to the next stack.");
        assert_eq!(render(&step.state).header, "Stack Details - Stack 2 of 2");

        let state = submit_stack(&step.state, &StackForm::default(), &mut store)
            .unwrap()
            .state;
        let step = complete_cems(&state).unwrap();
        assert_eq!(step.message, "All details submitted. Registration is complete.");
        let view = render(&step.state);
        assert_eq!(view.page, "Registration Complete");
        assert!(view.actions.is_empty());
        assert!(view.info.is_some());
    }

    #[test]
    fn wrong_page_submit_is_rejected_without_writes() {
        let mut store = MemoryRegistry::new();
        let state = WizardState::new();
        let err = submit_stack(&state, &StackForm::default(), &mut store).unwrap_err();
        assert!(matches!(
            err,
            CemsError::InvalidTransition {
                page: "Login or Sign Up",
                action: "submit_stack"
            }
        ));
        assert_eq!(store.counts().unwrap(), crate::RegistryCounts::default());
    }
}
