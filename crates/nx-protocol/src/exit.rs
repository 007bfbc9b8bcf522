// exit.rs - Process exit codes for the CLI.

use crate::codes::{ErrorCategory, ErrorCode};
use crate::envelope::{Command, ResponseEnvelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GenericError = 1,
    PolicyDenied = 2,
    TestsFailed = 3,
    InvalidArgs = 4,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for a failed request with the given numeric error code.
    pub fn for_error_code(code: u16) -> Self {
        match ErrorCode::from_u16(code) {
            Some(ErrorCode::InvalidArgs) | Some(ErrorCode::UnknownCommand) => ExitCode::InvalidArgs,
            Some(ErrorCode::TestFailed) => ExitCode::TestsFailed,
            Some(c) if c.category() == ErrorCategory::Policy => ExitCode::PolicyDenied,
            _ => ExitCode::GenericError,
        }
    }

    /// Exit code for a completed exchange.
    ///
    /// A `test` command whose payload reports `success: false` exits with
    /// [`ExitCode::TestsFailed`] even though the response status is `ok`.
    pub fn for_response(command: Command, response: &ResponseEnvelope) -> Self {
        if let Some(error) = &response.error {
            return error
                .code_number()
                .map(Self::for_error_code)
                .unwrap_or(ExitCode::GenericError);
        }
        if !response.is_ok() {
            return ExitCode::GenericError;
        }
        let tests_failed = command == Command::Test
            && response
                .result
                .as_ref()
                .and_then(|r| r.get("success"))
                .and_then(|s| s.as_bool())
                == Some(false);
        if tests_failed {
            ExitCode::TestsFailed
        } else {
            ExitCode::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NexxonError;
    use serde_json::json;

    #[test]
    fn error_codes_map_to_exit_codes() {
        assert_eq!(ExitCode::for_error_code(4001), ExitCode::PolicyDenied);
        assert_eq!(ExitCode::for_error_code(4002), ExitCode::PolicyDenied);
        assert_eq!(ExitCode::for_error_code(6100), ExitCode::InvalidArgs);
        assert_eq!(ExitCode::for_error_code(5002), ExitCode::GenericError);
        assert_eq!(ExitCode::for_error_code(9999), ExitCode::GenericError);
    }

    #[test]
    fn failing_test_payload_exits_three() {
        let resp = ResponseEnvelope::ok("t", json!({"exit_code": 1, "success": false}));
        assert_eq!(ExitCode::for_response(Command::Test, &resp), ExitCode::TestsFailed);
        assert_eq!(ExitCode::for_response(Command::Test, &resp).as_i32(), 3);

        let resp = ResponseEnvelope::ok("t", json!({"exit_code": 0, "success": true}));
        assert_eq!(ExitCode::for_response(Command::Test, &resp), ExitCode::Success);
    }

    #[test]
    fn denied_response_exits_two() {
        let resp = ResponseEnvelope::error("a", &NexxonError::policy_denied("no"));
        assert_eq!(ExitCode::for_response(Command::Apply, &resp), ExitCode::PolicyDenied);
    }
}
