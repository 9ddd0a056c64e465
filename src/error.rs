use parse_display::Display;

/// Errors raised by the binding engine.
#[non_exhaustive]
#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Structural setup error, e.g. a cache capacity of zero or a malformed repeat expression.
    #[display("configuration error: {0}")]
    Configuration(String),

    /// An event or method handler was not found on the scope chain nor as a global.
    #[display("handler not found: {0}")]
    MissingHandler(String),

    /// The evaluator could not parse an expression.
    #[display("invalid expression: `{0}`")]
    Expression(String),

    /// Error raised by a user supplied hook.
    #[display("{0}")]
    Hook(String),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;
