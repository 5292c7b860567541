//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, AppState};
use crate::config::PortalConfig;
use cems_core::{
    CemsError, Choice, RedbRegistry, Registration, RegistryStore, StackGeometry,
    load_all_registrations, load_registration,
};
use std::path::{Path, PathBuf};

// =============================================================================
// PATH VALIDATION
// =============================================================================

/// Validate an output path: its parent directory must exist.
///
/// Returns the path with a canonical parent, so ".." and symlinks in the
/// directory part are resolved before writing.
fn validate_output_path(path: &Path) -> Result<PathBuf, CemsError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        CemsError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(CemsError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| CemsError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &PortalConfig) -> Result<(), CemsError> {
    let store = RedbRegistry::open(&config.database)?;

    println!("CEMS Industry Registration Portal Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:       {}", config.host);
    println!("  Port:       {}", config.port);
    println!("  Database:   {:?}", config.database);
    println!("  Rate limit: {} req/s", config.rate_limit);
    println!(
        "  Sessions:   {} max, idle expiry {}s",
        config.max_sessions, config.session_ttl_secs
    );
    println!();
    println!("Endpoints:");
    println!("  GET  /health                       - Health check");
    println!("  GET  /status                       - Registry counts");
    println!("  POST /sessions                     - Start a registration");
    println!("  GET  /sessions/{{id}}                - Current page");
    println!("  POST /sessions/{{id}}/otp            - Send OTP");
    println!("  POST /sessions/{{id}}/otp/verify     - Verify OTP");
    println!("  POST /sessions/{{id}}/industry       - Submit Industry Details");
    println!("  POST /sessions/{{id}}/stack          - Submit Stack Details");
    println!("  POST /sessions/{{id}}/parameters     - Select parameters");
    println!("  POST /sessions/{{id}}/instruments    - Submit CEMS details for one parameter");
    println!("  POST /sessions/{{id}}/complete       - Complete CEMS Details");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = AppState::new(store)
        .with_rate_limit(config.rate_limit)
        .with_session_limits(config.session_ttl(), config.max_sessions);
    api::run_server(&config.addr(), state).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the database file and every table.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), CemsError> {
    if db_path.exists() {
        if !force {
            return Err(CemsError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| CemsError::IoError(format!("Remove old database: {}", e)))?;
    }

    let _store = RedbRegistry::open(db_path)?;
    println!("Initialized new registry at {:?}", db_path);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show registry row counts.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), CemsError> {
    let store = RedbRegistry::open(db_path)?;
    let counts = store.counts()?;

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "users": counts.users,
            "stacks": counts.stacks,
            "instruments": counts.instruments,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("CEMS Registry Status");
    println!("====================");
    println!("Database: {:?}", db_path);
    println!();
    println!("Users:       {}", counts.users);
    println!("Stacks:      {}", counts.stacks);
    println!("Instruments: {}", counts.instruments);

    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Print the registration tree of one phone number.
pub fn cmd_show(db_path: &Path, phone: &str, json_mode: bool) -> Result<(), CemsError> {
    let store = RedbRegistry::open(db_path)?;

    let Some(user) = store.find_user_by_phone(phone.trim())? else {
        if json_mode {
            println!("null");
        } else {
            println!("No registration for phone number {}", phone);
        }
        return Ok(());
    };
    let registration = load_registration(&store, user)?;

    if json_mode {
        let json = serde_json::to_string_pretty(&registration)
            .map_err(|e| CemsError::SerializationError(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    print!("{}", describe(&registration));
    Ok(())
}

/// Human-readable summary of one registration.
fn describe(registration: &Registration) -> String {
    let user = &registration.user;
    let mut out = format!("Registration for {}\n", user.phone_number);
    out.push_str("========================================\n");
    out.push_str(&format!("User ID: {}\n", user.user_id));

    match &user.details {
        Some(d) => {
            out.push_str(&format!(
                "Industry: {} ({})\n",
                d.industry_name, d.industry_category
            ));
            out.push_str(&format!("Location: {}, {}\n", d.district, d.state));
            out.push_str(&format!("Declared stacks: {}\n", d.num_stacks));
        }
        None => out.push_str("Industry details not submitted\n"),
    }

    for (i, entry) in registration.stacks.iter().enumerate() {
        let stack = &entry.stack.details;
        let dimensions = match stack.geometry {
            StackGeometry::Circular { diameter } => format!("diameter {} m", diameter),
            StackGeometry::Rectangular { length, width } => {
                format!("{} m x {} m", length, width)
            }
        };
        out.push_str(&format!(
            "\nStack {} (id {}): {}, {} {}, height {} m\n",
            i.saturating_add(1),
            entry.stack.stack_id,
            stack.process_attached,
            stack.geometry.shape().label(),
            dimensions,
            stack.stack_height
        ));
        for instrument in &entry.instruments {
            let d = &instrument.details;
            out.push_str(&format!(
                "  - {}: {} {} (S/N {}), range {} to {}, {}\n",
                d.parameter,
                d.make,
                d.model,
                d.serial_number,
                d.measuring_range_low,
                d.measuring_range_high,
                d.measurement_method.label()
            ));
        }
    }
    out
}

// =============================================================================
// COMPACT COMMAND
// =============================================================================

/// Reclaim free space in the database file.
pub fn cmd_compact(db_path: &Path) -> Result<(), CemsError> {
    let size = |p: &Path| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
    let before = size(db_path);

    let mut store = RedbRegistry::open(db_path)?;
    store.compact()?;
    drop(store);

    println!(
        "Compacted {:?}: {} bytes -> {} bytes",
        db_path,
        before,
        size(db_path)
    );
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write every registration as pretty JSON.
pub fn cmd_export(db_path: &Path, output: &Path) -> Result<(), CemsError> {
    let validated_output = validate_output_path(output)?;

    let store = RedbRegistry::open(db_path)?;
    let registrations = load_all_registrations(&store)?;

    let data = serde_json::to_vec_pretty(&registrations)
        .map_err(|e| CemsError::SerializationError(e.to_string()))?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| CemsError::IoError(format!("Write file: {}", e)))?;

    println!(
        "Exported {} registrations ({} bytes) to {:?}",
        registrations.len(),
        data.len(),
        validated_output
    );

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use cems_core::pages::{complete_cems, select_parameters, submit_instrument, submit_stack};
    use cems_core::{
        FixedCodes, IndustryForm, InstrumentForm, LoginForm, OtpForm, SelectionForm, StackForm,
        WizardState,
    };
    use tempfile::tempdir;

    fn register(db_path: &Path) {
        let mut store = RedbRegistry::open(db_path).unwrap();
        let sent = cems_core::pages::send_otp(
            &WizardState::new(),
            &LoginForm {
                phone_number: "9999999999".to_string(),
            },
            &mut FixedCodes::new([4242]),
        )
        .unwrap();
        let state = cems_core::pages::verify_otp(
            &sent.state,
            &OtpForm {
                code: "4242".to_string(),
            },
            &mut store,
        )
        .unwrap()
        .state;
        let state = cems_core::pages::submit_industry(
            &state,
            &IndustryForm {
                industry_name: "Patna Thermal".to_string(),
                ..IndustryForm::default()
            },
            &mut store,
        )
        .unwrap()
        .state;
        let state = submit_stack(&state, &StackForm::default(), &mut store)
            .unwrap()
            .state;
        let state = select_parameters(
            &state,
            &SelectionForm {
                parameters: vec!["SOx".to_string()],
            },
        )
        .unwrap()
        .state;
        let state = submit_instrument(
            &state,
            &InstrumentForm {
                parameter: "SOx".to_string(),
                make: "Horiba".to_string(),
                ..InstrumentForm::default()
            },
            &mut store,
        )
        .unwrap()
        .state;
        assert!(complete_cems(&state).unwrap().state.is_complete());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("cems.redb");

        cmd_init(&db, false).unwrap();
        assert!(cmd_init(&db, false).is_err());

        register(&db);
        cmd_init(&db, true).unwrap();
        let store = RedbRegistry::open(&db).unwrap();
        assert_eq!(store.counts().unwrap().users, 0);
    }

    #[test]
    fn export_writes_registration_tree() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("cems.redb");
        register(&db);

        let out = dir.path().join("export.json");
        cmd_export(&db, &out).unwrap();

        let data = std::fs::read(&out).unwrap();
        let registrations: Vec<Registration> = serde_json::from_slice(&data).unwrap();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].user.phone_number, "9999999999");
        assert_eq!(registrations[0].stacks.len(), 1);
        assert_eq!(registrations[0].stacks[0].instruments.len(), 1);
    }

    #[test]
    fn compact_keeps_registrations() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("cems.redb");
        register(&db);

        cmd_compact(&db).unwrap();

        let store = RedbRegistry::open(&db).unwrap();
        let counts = store.counts().unwrap();
        assert_eq!((counts.users, counts.stacks, counts.instruments), (1, 1, 1));
    }

    #[test]
    fn export_rejects_missing_directory() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("cems.redb");
        let out = dir.path().join("missing").join("export.json");
        assert!(matches!(cmd_export(&db, &out), Err(CemsError::IoError(_))));
    }

    #[test]
    fn describe_lists_stacks_and_instruments() {
        let dir = tempdir().expect("temp dir");
        let db = dir.path().join("cems.redb");
        register(&db);

        let store = RedbRegistry::open(&db).unwrap();
        let user = store.find_user_by_phone("9999999999").unwrap().unwrap();
        let text = describe(&load_registration(&store, user).unwrap());

        assert!(text.starts_with("Registration for 9999999999\n"));
        assert!(text.contains("Industry: Patna Thermal"));
        assert!(text.contains("Stack 1 (id 1): , Circular diameter 0 m, height 0 m"));
        assert!(text.contains("  - SOx: Horiba"));
    }
}
