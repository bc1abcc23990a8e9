//! Engine errors
//!
//! Errors raised while matching or compiling. Which of them abort a
//! compilation run:
//!
//! | Error                        | Effect                                  |
//! |------------------------------|-----------------------------------------|
//! | `UnknownPointcut`            | aborts the run                          |
//! | `InvalidPointcutExpression`  | aborts the run                          |
//! | `CircularReference`          | recovered as a non-match                |
//! | `Reflection`                 | recorded for the class, run continues   |
//! | `Codegen`, `Cache` on write  | recorded for the class, run continues   |
//! | `AccessDenied`               | propagated to the caller                |

use thiserror::Error;

use crate::aop::Exception;
use crate::compiler::CacheError;
use crate::config::SettingsError;
use crate::reflect::ReflectionError;

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum AopError {
    /// A named pointcut reference could not be resolved
    #[error("Unknown pointcut \"{pointcut}\" referenced in aspect {aspect}")]
    UnknownPointcut {
        /// Aspect class the reference points into
        aspect: String,
        /// Pointcut name that was not found
        pointcut: String,
    },

    /// A pointcut expression is malformed or refers to something that does not exist
    #[error("Invalid pointcut expression \"{expression}\": {reason}")]
    InvalidPointcutExpression {
        /// Expression as written
        expression: String,
        /// What is wrong with it
        reason: String,
    },

    /// A named pointcut references itself, directly or transitively
    #[error("Circular pointcut reference: {0}")]
    CircularReference(String),

    /// A class could not be loaded or reflected
    #[error("Reflection failed for {class}: {source}")]
    Reflection {
        /// Fully qualified class name
        class: String,
        /// Underlying reflection failure
        #[source]
        source: ReflectionError,
    },

    /// The wrapper source of a class could not be rendered
    #[error("Code generation failed for {class}: {source}")]
    Codegen {
        /// Fully qualified class name
        class: String,
        /// Underlying formatting failure
        #[source]
        source: std::fmt::Error,
    },

    /// The artifact cache failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The configuration could not be read
    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    /// Invalid compiler or policy configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The security policy denied access to a join point
    #[error("Access denied: {0}")]
    AccessDenied(String),
}

impl AopError {
    /// Build an `InvalidPointcutExpression` error
    pub fn invalid_expression(expression: &str, reason: impl Into<String>) -> Self {
        AopError::InvalidPointcutExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error aborts a whole compilation run
    pub fn is_fatal_to_run(&self) -> bool {
        !matches!(
            self,
            AopError::CircularReference(_)
                | AopError::Reflection { .. }
                | AopError::Codegen { .. }
                | AopError::AccessDenied(_)
        )
    }
}

impl From<AopError> for Exception {
    fn from(error: AopError) -> Self {
        match error {
            AopError::AccessDenied(message) => Exception::access_denied(message),
            other => Exception::new("AopError", other.to_string()),
        }
    }
}

/// Result type for engine operations
pub type AopResult<T> = Result<T, AopError>;
