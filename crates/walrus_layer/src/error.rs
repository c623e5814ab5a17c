//! Layer-tree error types.

/// Errors raised while building or extending a layer tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    /// A child was added before any root existed.
    #[error("no current layer to attach a child to; add a root first")]
    NoCursor,

    /// No live layer carries the requested name.
    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    /// A live layer already carries this name.
    #[error("duplicate layer name: {0}")]
    DuplicateName(String),
}
