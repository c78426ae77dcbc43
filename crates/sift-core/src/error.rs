//! Error handling for the Sift engine
//!
//! Every error here is fatal for the operation that raised it: schema errors abort the
//! running tick, query or startup pass and propagate to the caller. Conditions that are
//! part of normal evaluation (empty operands, unification conflicts) never surface as
//! errors.

use crate::fact::FactId;
use thiserror::Error;

/// Error type for engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A fact or pattern names a type the world never allocated
    #[error("Unknown fact type {fact_type}")]
    UnknownFactType { fact_type: FactId },

    /// Argument count disagrees with the declared arity of the fact type
    #[error("Arity mismatch for {name}: expected {expected} arguments, got {actual}")]
    ArityMismatch { name: String, expected: usize, actual: usize },

    /// Indexed access past the end of a fact
    #[error("Field {index} out of range for fact of arity {arity}")]
    FieldOutOfRange { index: usize, arity: usize },

    /// A value of the wrong variant reached a place that requires a specific one
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },

    /// Comparison or arithmetic between values that have no common numeric domain
    #[error("Cannot apply {operator} to {left} and {right}")]
    Incomparable { operator: &'static str, left: &'static str, right: &'static str },

    /// Integer arithmetic that overflowed or divided by zero
    #[error("Arithmetic error in {operator}: {message}")]
    Arithmetic { operator: &'static str, message: &'static str },

    /// A local variable slot was read before any pattern bound it
    #[error("Local variable slot {slot} read before it was bound")]
    UnboundVariable { slot: usize },

    /// A condition refers to a combination position that does not exist
    #[error("Operand {operand} out of range for a join of {width} operands")]
    OperandOutOfRange { operand: usize, width: usize },

    /// `request` for a query name that was never registered
    #[error("Unknown query: {name}")]
    UnknownQuery { name: String },

    /// A rule or query failed validation on registration
    #[error("Invalid rule {rule}: {message}")]
    InvalidRule { rule: String, message: String },

    /// `init` called more than once
    #[error("World already initialised")]
    AlreadyInitialized,

    /// Configuration could not be applied
    #[error("Configuration error: {message}")]
    Configuration { message: String, setting: Option<String> },
}

impl EngineError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::UnknownFactType { .. }
            | EngineError::ArityMismatch { .. }
            | EngineError::FieldOutOfRange { .. } => "schema",
            EngineError::TypeMismatch { .. }
            | EngineError::Incomparable { .. }
            | EngineError::Arithmetic { .. }
            | EngineError::UnboundVariable { .. }
            | EngineError::OperandOutOfRange { .. } => "evaluation",
            EngineError::UnknownQuery { .. } => "query",
            EngineError::InvalidRule { .. } => "rule",
            EngineError::AlreadyInitialized => "lifecycle",
            EngineError::Configuration { .. } => "configuration",
        }
    }

    /// Create a rule validation error
    pub fn invalid_rule(rule: &str, message: impl Into<String>) -> Self {
        Self::InvalidRule { rule: rule.to_string(), message: message.into() }
    }

    /// Create a configuration error for a specific setting
    pub fn configuration(setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), setting: Some(setting.to_string()) }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
