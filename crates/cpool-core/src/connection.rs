//! Connection trait implemented by transports

use crate::Result;
use async_trait::async_trait;

/// A single client connection to a remote endpoint
///
/// The pool owns membership and timing; the transport owns everything that
/// happens on the wire. Requests and responses are opaque to the pool, which
/// only moves them between the caller and the connection.
///
/// All methods take `&self`: a connection whose call timed out is closed by
/// the pool while the abandoned call may still be running on another task.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Payload accepted by [`Connection::call`]
    type Request: Send + 'static;

    /// Payload produced by a successful [`Connection::call`]
    type Response: Send + 'static;

    /// Stable unique identifier, used as the pool's tracking key
    fn name(&self) -> &str;

    /// Execute one request/response cycle over this connection
    async fn call(&self, request: Self::Request) -> Result<Self::Response>;

    /// Release the underlying transport resource
    ///
    /// Must be safe to call on an already closed connection. Closing is also
    /// the only cancellation signal an in-flight [`Connection::call`] gets.
    async fn close(&self) -> Result<()>;

    /// Whether the resource has already been released
    fn is_closed(&self) -> bool;
}
