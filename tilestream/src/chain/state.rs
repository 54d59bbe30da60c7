//! Per-key request state and request errors.

use thiserror::Error;

use crate::coord::CoordError;
use crate::delivery::TileCallback;
use crate::provider::FetchError;

/// Why a tile request produced no image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    #[error("Invalid tile key: {0}")]
    InvalidKey(#[from] CoordError),

    #[error("No providers configured")]
    NoProviders,

    #[error("All providers failed after {attempts} attempt(s){}", describe_last(.last))]
    AllProvidersFailed {
        attempts: u32,
        last: Option<FetchError>,
    },

    /// Displaced from a full provider queue by a newer request.
    #[error("Request dropped from a full queue")]
    Dropped,

    #[error("Tile pipeline is shutting down")]
    ShuttingDown,
}

fn describe_last(last: &Option<FetchError>) -> String {
    match last {
        Some(e) => format!(": {}", e),
        None => String::new(),
    }
}

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Waiting in the queue of provider `provider`.
    Queued { provider: usize },
    /// A worker of provider `provider` is fetching it.
    InProgress { provider: usize },
    Done,
    Failed,
}

/// Bookkeeping for one in-flight key.
///
/// Exists from the first cache miss until the request is finished; every
/// consumer that asked for the key while it existed is notified once.
pub struct RequestState {
    pub status: RequestStatus,
    pub consumers: Vec<TileCallback>,
    pub attempts: u32,
    pub provider_index: usize,
    pub last_error: Option<FetchError>,
}

impl RequestState {
    pub fn new(first: TileCallback) -> Self {
        Self {
            status: RequestStatus::Queued { provider: 0 },
            consumers: vec![first],
            attempts: 0,
            provider_index: 0,
            last_error: None,
        }
    }
}

impl std::fmt::Debug for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestState")
            .field("status", &self.status)
            .field("consumers", &self.consumers.len())
            .field("attempts", &self.attempts)
            .field("provider_index", &self.provider_index)
            .field("last_error", &self.last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_failed_message_includes_last_error() {
        let err = TileError::AllProvidersFailed {
            attempts: 2,
            last: Some(FetchError::Status {
                status: 404,
                url: "http://x/1".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "All providers failed after 2 attempt(s): HTTP 404 from http://x/1"
        );

        let bare = TileError::AllProvidersFailed {
            attempts: 0,
            last: None,
        };
        assert_eq!(bare.to_string(), "All providers failed after 0 attempt(s)");
    }

    #[test]
    fn test_new_state_has_one_consumer() {
        let state = RequestState::new(Box::new(|_| {}));
        assert_eq!(state.consumers.len(), 1);
        assert_eq!(state.status, RequestStatus::Queued { provider: 0 });
        assert_eq!(state.attempts, 0);
    }
}
