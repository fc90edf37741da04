use sqlparser::parser::ParserError;
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Invalid query: {0}")]
    InvalidQuery(ParserError),

    #[error("Query not stubbed")]
    Unstubbed,

    #[error("Query matched but no stub data")]
    Unresolved,

    #[error("{0}")]
    Stubbed(Arc<dyn std::error::Error + Send + Sync>),

    #[error("Last insert id not set")]
    NoLastInsertId,

    #[error("Rows affected not set")]
    NoRowsAffected,
}

pub type Result<T = ()> = std::result::Result<T, Error>;

impl From<ParserError> for Error {
    fn from(value: ParserError) -> Self {
        Error::InvalidQuery(value)
    }
}

impl Error {
    /// Wraps an arbitrary error for returning verbatim from a matched stub.
    pub fn stubbed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Stubbed(Arc::new(err))
    }
}
