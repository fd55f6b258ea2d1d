use std::fmt;

#[derive(Debug)]
pub enum CardbaseError {
    SqliteError(rusqlite::Error),
    JsonError(String),
    Database(String),
    KvStore(String),
    Serialization(String),
    IO(String),
    Migration(String),
    InvalidInput(String),
    NotFound(String),
    Other(String),
}

impl fmt::Display for CardbaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardbaseError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            CardbaseError::JsonError(e) => write!(f, "JSON error: {}", e),
            CardbaseError::Database(e) => write!(f, "Database error: {}", e),
            CardbaseError::KvStore(e) => write!(f, "KV store error: {}", e),
            CardbaseError::Serialization(e) => write!(f, "Serialization error: {}", e),
            CardbaseError::IO(e) => write!(f, "IO error: {}", e),
            CardbaseError::Migration(e) => write!(f, "Migration error: {}", e),
            CardbaseError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            CardbaseError::NotFound(e) => write!(f, "Not found: {}", e),
            CardbaseError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for CardbaseError {}

impl From<rusqlite::Error> for CardbaseError {
    fn from(error: rusqlite::Error) -> Self {
        CardbaseError::SqliteError(error)
    }
}

impl From<serde_json::Error> for CardbaseError {
    fn from(error: serde_json::Error) -> Self {
        CardbaseError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for CardbaseError {
    fn from(error: std::io::Error) -> Self {
        CardbaseError::IO(error.to_string())
    }
}

impl From<sled::Error> for CardbaseError {
    fn from(error: sled::Error) -> Self {
        CardbaseError::KvStore(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CardbaseError>;
