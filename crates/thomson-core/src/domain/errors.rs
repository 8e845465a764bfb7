use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ThomsonResult<T> = Result<T, ThomsonError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl ErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }
}

/// Pipeline error carrying a category and a stable dotted diagnostic code
/// such as `CONFIG.CHANNEL_COUNT` or `RUN.ZERO_NOISE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThomsonError {
    category: ErrorCategory,
    code: &'static str,
    message: String,
}

impl ThomsonError {
    pub fn new(category: ErrorCategory, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn input_validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InputValidationError, code, message)
    }

    pub fn io_system(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::IoSystemError, code, message)
    }

    pub fn computation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ComputationError, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InternalError, code, message)
    }

    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.code, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for ThomsonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.code,
            self.message
        )
    }
}

impl Error for ThomsonError {}

#[cfg(test)]
mod tests {
    use super::{ErrorCategory, ThomsonError};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (ErrorCategory::InputValidationError, 2, "InputValidationError"),
            (ErrorCategory::IoSystemError, 3, "IoSystemError"),
            (ErrorCategory::ComputationError, 4, "ComputationError"),
            (ErrorCategory::InternalError, 5, "InternalError"),
        ];

        for (category, exit_code, name) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.as_str(), name);
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = ThomsonError::input_validation(
            "CONFIG.CHANNEL_COUNT",
            "fiber 'eqTS_42_G10' has 4 channels but 5 windows",
        );

        assert_eq!(error.category(), ErrorCategory::InputValidationError);
        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [CONFIG.CHANNEL_COUNT] fiber 'eqTS_42_G10' has 4 channels but 5 windows"
        );
        assert_eq!(error.fatal_exit_line(), "FATAL EXIT CODE: 2");
    }

    #[test]
    fn computation_errors_display_their_category() {
        let error = ThomsonError::computation("RUN.ZERO_NOISE", "channel 2 noise is zero");
        assert_eq!(error.exit_code(), 4);
        assert_eq!(
            error.to_string(),
            "ComputationError [RUN.ZERO_NOISE] channel 2 noise is zero"
        );
    }
}
