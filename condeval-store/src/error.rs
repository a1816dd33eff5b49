/// Errors that can occur in the store layer.
#[derive(Debug)]
pub enum StoreError {
    Database(Box<dyn std::error::Error + Send + Sync>),
    Decode(String),
    Other(String),
}

impl StoreError {
    /// Construct a `Database` variant from any driver error type.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Database(Box::new(err))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(err) => write!(f, "Database error: {err}"),
            StoreError::Decode(msg) => write!(f, "Decode error: {msg}"),
            StoreError::Other(msg) => write!(f, "Store error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::database(err)
    }
}
