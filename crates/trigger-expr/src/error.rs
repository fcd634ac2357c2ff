use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("type error: {0}")]
    TypeError(String),
    #[error("unknown field: {0}")]
    UnknownName(String),
    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(String),
}
