use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("no free reference id left for base name '{base}'")]
    ReferenceIdExhausted { base: String },

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}
