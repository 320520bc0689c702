//! The seam between the engine and request dispatch.

use std::error::Error;

use async_trait::async_trait;

use crate::connection::Exchange;

/// Serves one request.
///
/// The handler reads the request and its body through the [`Exchange`] and writes the
/// response into it. It doesn't need to close the response or read the whole body: the
/// connection does both once the handler returns. A returned error is logged, and a `500`
/// replaces the response when nothing was committed yet.
#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, exchange: &mut Exchange<'_>) -> Result<(), Self::Error>;
}

#[async_trait]
impl<H: Handler> Handler for std::sync::Arc<H> {
    type Error = H::Error;

    async fn call(&self, exchange: &mut Exchange<'_>) -> Result<(), Self::Error> {
        (**self).call(exchange).await
    }
}
