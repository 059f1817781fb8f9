// Error types shared by the remote store implementations.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`RemoteStoreError`] failures.
pub type RemoteResult<T> = Result<T, RemoteStoreError>;

/// Failures that can occur while talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build remote store client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send remote store request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The remote store answered with an unexpected status code.
    #[error("unexpected remote store response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// The response body was not valid JSON.
    #[error("failed to decode remote store response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The store refused the write.
    #[error("remote store rejected write to `{auction_id}`: {message}")]
    Rejected { auction_id: String, message: String },
}
