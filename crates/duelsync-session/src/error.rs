//! Error types for the session layer.

/// Errors that can occur while restoring session state.
///
/// Applying ordinary events never fails; only a `state` snapshot can be
/// unusable.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The snapshot was written by a peer with a different schema.
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshotVersion { found: u64, expected: u64 },

    /// The payload is not a snapshot at all.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(#[source] serde_json::Error),
}
