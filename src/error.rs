//! Crate-wide error types.
//!
//! Each subsystem has its own `thiserror` enum ([`StorageError`],
//! [`ResolveError`], [`TransportError`], [`PresenceError`],
//! [`PlatformError`]); this module aggregates them for callers that cross
//! subsystem boundaries, like the command facade and service assembly.
//!
//! [`StorageError`]: crate::storage::StorageError
//! [`ResolveError`]: crate::resolver::ResolveError
//! [`TransportError`]: crate::transport::TransportError
//! [`PresenceError`]: crate::presence::PresenceError
//! [`PlatformError`]: crate::platform::PlatformError

use std::time::Duration;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// State persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// A query could not be turned into a playable track
    #[error("resolve error: {0}")]
    Resolve(#[from] crate::resolver::ResolveError),

    /// The voice transport refused or failed
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// The assistant could not be made ready
    #[error("presence error: {0}")]
    Presence(#[from] crate::presence::PresenceError),

    /// The messaging platform refused or failed
    #[error("platform error: {0}")]
    Platform(#[from] crate::platform::PlatformError),

    /// The requester must wait before playing again
    #[error("rate limited, retry in {retry_in:?}")]
    RateLimited { retry_in: Duration },
}
