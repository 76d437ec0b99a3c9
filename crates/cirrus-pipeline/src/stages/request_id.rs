//! Client request id stage.
//!
//! Stamps every outgoing request with an `x-ms-client-request-id` header so
//! a call can be correlated with service-side logs. A caller-supplied id is
//! left alone; otherwise a new UUID v7 is generated.

use crate::stage::{Next, PipelineRequest, PipelineResponse, Stage};
use cirrus_core::{BoxFuture, ClientRequestId, ClientResult};

/// Stage that ensures every request carries a client request id.
///
/// # Example
///
/// ```
/// use cirrus_pipeline::stages::ClientRequestIdStage;
/// use cirrus_pipeline::Stage;
///
/// assert_eq!(ClientRequestIdStage::new().name(), "client_request_id");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientRequestIdStage {
    _private: (),
}

impl ClientRequestIdStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for ClientRequestIdStage {
    fn name(&self) -> &'static str {
        "client_request_id"
    }

    fn process<'a>(
        &'a self,
        mut request: PipelineRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, ClientResult<PipelineResponse>> {
        Box::pin(async move {
            if request.request.header(ClientRequestId::HEADER).is_none() {
                let id = ClientRequestId::new();
                request
                    .request
                    .set_header(ClientRequestId::HEADER, &id.to_string())?;
            }
            next.run(request).await
        })
    }
}
