use condeval_store::StoreError;

/// Errors from graph operations and coordinator lookups.
#[derive(Debug)]
pub enum GraphError {
    /// A campaign or branch id failed input validation. Fatal to the
    /// request; never retried.
    InvalidId(String),
    /// `add_edge` referenced a source node that is not in the graph.
    MissingSource(String),
    /// `add_edge` referenced a target node that is not in the graph.
    MissingTarget(String),
    /// The store failed while building or patching a graph.
    Store(StoreError),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::InvalidId(msg) => write!(f, "{msg}"),
            GraphError::MissingSource(id) => write!(f, "source node {id} does not exist"),
            GraphError::MissingTarget(id) => write!(f, "target node {id} does not exist"),
            GraphError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for GraphError {
    fn from(err: StoreError) -> Self {
        GraphError::Store(err)
    }
}
