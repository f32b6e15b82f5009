#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    NotFound(String),
    InvalidPath(String),
    Serialization(String),
    DynamoDb(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(path) => write!(f, "Document not found: {}", path),
            StoreError::InvalidPath(msg) => write!(f, "Invalid field path: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StoreError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}
