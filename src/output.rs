//! JSON output envelope for the CLI.
//!
//! Every command prints exactly one JSON object to stdout:
//!
//! ```json
//! {"ok": true, "result": {...}}
//! {"ok": false, "error": {"code": 3, "message": "name 'x' not found ..."}}
//! ```
//!
//! The error code doubles as the process exit code, so scripts can branch
//! without parsing the body.

use std::process::ExitCode;

use serde::Serialize;
use serde_json::Value;

use sift_core::error::SiftError;

#[derive(Serialize)]
struct SuccessEnvelope {
    ok: bool,
    result: Value,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    ok: bool,
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: u8,
    message: String,
}

/// Render an outcome to stdout and produce the matching exit code.
pub fn emit(outcome: Result<Value, SiftError>) -> ExitCode {
    match outcome {
        Ok(result) => {
            let envelope = SuccessEnvelope { ok: true, result };
            println!("{}", render(&envelope));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = err.error_code().code();
            let envelope = ErrorEnvelope {
                ok: false,
                error: ErrorBody {
                    code,
                    message: err.to_string(),
                },
            };
            println!("{}", render(&envelope));
            ExitCode::from(code)
        }
    }
}

fn render(envelope: &impl Serialize) -> String {
    serde_json::to_string_pretty(envelope)
        .unwrap_or_else(|err| format!(r#"{{"ok":false,"error":{{"code":10,"message":"{err}"}}}}"#))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelopes_carry_the_code() {
        let err = SiftError::ModuleNotFound {
            name: "pkg.gone".to_string(),
        };
        let envelope = ErrorEnvelope {
            ok: false,
            error: ErrorBody {
                code: err.error_code().code(),
                message: err.to_string(),
            },
        };
        let value: Value = serde_json::from_str(&render(&envelope)).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], 3);
    }
}
