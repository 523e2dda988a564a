/// Axiom core error types
/// Layered the way the surrounding toolchain does it: one leaf enum per
/// subsystem, all wrapped by a single top-level error the evaluator's
/// exception channel can match on (spec §7).

use std::fmt;

// ---------------------------------------------------------------------------
// Numeric errors (C1)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum NumericError {
    ZeroDivisor,
    UnsupportedExactRational,
    ShiftAmountTooLarge,
    DomainError { message: String },
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericError::ZeroDivisor => write!(f, "division by zero"),
            NumericError::UnsupportedExactRational => {
                write!(f, "rationals are not implemented")
            }
            NumericError::ShiftAmountTooLarge => {
                write!(f, "shift amount does not fit a machine int")
            }
            NumericError::DomainError { message } => write!(f, "domain error: {}", message),
        }
    }
}

impl std::error::Error for NumericError {}

// ---------------------------------------------------------------------------
// Struct-system errors (C2, C3)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum StructError {
    ContractViolation { expected: String, found: String },
    ArityMismatch { expected: usize, found: usize },
    ImmutableFieldMutation { field: usize, type_name: String },
    DuplicatePrefabKey,
}

impl fmt::Display for StructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructError::ContractViolation { expected, found } => {
                write!(f, "contract violation: expected {}, found {}", expected, found)
            }
            StructError::ArityMismatch { expected, found } => {
                write!(f, "arity mismatch: expected {} fields, found {}", expected, found)
            }
            StructError::ImmutableFieldMutation { field, type_name } => {
                write!(f, "cannot mutate immutable field {} of struct type '{}'", field, type_name)
            }
            StructError::DuplicatePrefabKey => {
                write!(f, "prefab key collision with incompatible shape")
            }
        }
    }
}

impl std::error::Error for StructError {}

// ---------------------------------------------------------------------------
// Chaperone/impersonator errors (C4)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum ChaperoneError {
    CannotImpersonateImmutable,
    ArityMismatch { expected: String, found: usize },
    NotCallable,
    InvalidOverride { detail: String },
    InvalidPropertyList,
}

impl fmt::Display for ChaperoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChaperoneError::CannotImpersonateImmutable => {
                write!(f, "cannot impersonate an immutable value (chaperone it instead)")
            }
            ChaperoneError::ArityMismatch { expected, found } => {
                write!(f, "wrapper construction expected {}, found {} arguments", expected, found)
            }
            ChaperoneError::NotCallable => write!(f, "supplied handler is not callable"),
            ChaperoneError::InvalidOverride { detail } => {
                write!(f, "not a valid field accessor/mutator override: {}", detail)
            }
            ChaperoneError::InvalidPropertyList => {
                write!(f, "impersonator property list is malformed")
            }
        }
    }
}

impl std::error::Error for ChaperoneError {}

// ---------------------------------------------------------------------------
// Hash-table errors (C5)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum HashError {
    KeyNotFound,
    ImmutableTable,
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::KeyNotFound => write!(f, "key not found"),
            HashError::ImmutableTable => write!(f, "hash table is immutable"),
        }
    }
}

impl std::error::Error for HashError {}

// ---------------------------------------------------------------------------
// CoreError — top-level wrapper, the evaluator's exception channel
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    Numeric(NumericError),
    Struct(StructError),
    Chaperone(ChaperoneError),
    Hash(HashError),
    /// A documented non-goal (spec §1) or a stub the original left
    /// unimplemented — surfaced as a distinct, user-visible error rather
    /// than a panic (spec §7).
    NotImplemented { what: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Numeric(e) => write!(f, "{}", e),
            CoreError::Struct(e) => write!(f, "{}", e),
            CoreError::Chaperone(e) => write!(f, "{}", e),
            CoreError::Hash(e) => write!(f, "{}", e),
            CoreError::NotImplemented { what } => write!(f, "not implemented: {}", what),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<NumericError> for CoreError {
    fn from(e: NumericError) -> Self {
        CoreError::Numeric(e)
    }
}

impl From<StructError> for CoreError {
    fn from(e: StructError) -> Self {
        CoreError::Struct(e)
    }
}

impl From<ChaperoneError> for CoreError {
    fn from(e: ChaperoneError) -> Self {
        CoreError::Chaperone(e)
    }
}

impl From<HashError> for CoreError {
    fn from(e: HashError) -> Self {
        CoreError::Hash(e)
    }
}

// ---------------------------------------------------------------------------
// Diagnostic — structured rendering a host CLI/REPL can pretty-print
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn from_error(err: &CoreError) -> Self {
        Diagnostic {
            level: DiagnosticLevel::Error,
            message: err.to_string(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
        };
        write!(f, "[{}] {}", prefix, self.message)?;
        if let Some(ref hint) = self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_display_delegates() {
        let e = CoreError::from(NumericError::ZeroDivisor);
        assert_eq!(e.to_string(), "division by zero");
    }

    #[test]
    fn diagnostic_from_error_carries_message() {
        let e = CoreError::from(StructError::ImmutableFieldMutation {
            field: 0,
            type_name: "point".to_string(),
        });
        let d = Diagnostic::from_error(&e).with_hint("fields listed in `immutables` cannot be set");
        assert!(d.to_string().contains("hint:"));
        assert_eq!(d.level, DiagnosticLevel::Error);
    }
}
