//! CLI command implementations

pub mod cache;
pub mod hardware;
pub mod run;
pub mod validate;

use doodle_core::DoodleError;
use doodle_gen::ScriptResult;
use std::process::ExitCode;

/// Configuration, IO and other unexpected errors
pub const EXIT_FAILURE: u8 = 1;
/// The script is malformed; nothing was generated
pub const EXIT_VALIDATION: u8 = 2;
/// Some scenes are missing an artifact
pub const EXIT_PARTIAL: u8 = 3;
/// No scene produced any artifact
pub const EXIT_TOTAL_FAILURE: u8 = 4;

pub fn exit_code_for_result(result: &ScriptResult) -> ExitCode {
    ExitCode::from(result_code(result))
}

pub fn exit_code_for_error(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(error_code(err))
}

fn result_code(result: &ScriptResult) -> u8 {
    if result.is_success() {
        0
    } else if result.is_total_failure() {
        EXIT_TOTAL_FAILURE
    } else {
        EXIT_PARTIAL
    }
}

fn error_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<DoodleError>() {
        Some(e) if e.is_validation() => EXIT_VALIDATION,
        _ => EXIT_FAILURE,
    }
}
