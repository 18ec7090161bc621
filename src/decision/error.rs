// ABOUTME: Error types for infrastructure shape decisions.
// ABOUTME: Raised when facts are insufficient or name an unsupported provider.

/// The decision engine could not classify the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    /// Mandatory facts are missing or contradictory.
    #[error("unresolvable shape: {reason}")]
    UnresolvableShape { reason: String },

    /// The message names a cloud the pipeline does not target.
    #[error("unresolvable shape: provider '{0}' is not supported (only AWS)")]
    UnsupportedProvider(String),
}
