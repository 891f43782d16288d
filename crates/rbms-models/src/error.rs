/// Errors raised while rebuilding models or chains from named tensors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("parameter keys mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    MissingOrExtraParameterKeys {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("chain keys mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    MissingOrExtraChainKeys {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("tensor '{name}': {reason}")]
    ShapeMismatch { name: String, reason: String },
}
