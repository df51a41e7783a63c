/// Errors from the local state stores.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file error: {0}")]
    Io(#[from] std::io::Error),
}
