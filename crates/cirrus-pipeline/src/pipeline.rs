//! Ordered stage pipeline.
//!
//! A [`Pipeline`] owns an ordered list of stages and the transport that
//! terminates the chain. Order is part of the contract: the authentication
//! stage must come after any stage that finalises the body, because the
//! signature covers the body bytes.
//!
//! ```text
//! request ─► stage 1 ─► stage 2 ─► … ─► stage N ─► transport
//!                                                      │
//! result  ◄─ stage 1 ◄─ stage 2 ◄─ … ◄─ stage N ◄──────┘
//! ```
//!
//! A failing stage ends the chain immediately. Only stages already entered
//! see the failure on the way back up, and they propagate it unless they
//! exist to recover from it.

use crate::stage::{Next, PipelineRequest, PipelineResponse, Stage};
use cirrus_core::{ClientResult, Context, HttpRequest, Transport};
use std::sync::Arc;

/// A type-erased stage that can be stored in a vector.
pub type BoxedStage = Arc<dyn Stage>;

/// An immutable, shareable pipeline.
///
/// The stage list is fixed at construction; clones share stages and the
/// transport, so one pipeline serves any number of concurrent calls.
///
/// # Example
///
/// ```
/// use cirrus_pipeline::{Pipeline, stages::ClientRequestIdStage};
/// use cirrus_test::MockTransport;
/// use std::sync::Arc;
///
/// let pipeline = Pipeline::builder(Arc::new(MockTransport::new()))
///     .add_stage(ClientRequestIdStage::new())
///     .build();
///
/// assert_eq!(pipeline.stage_names(), vec!["client_request_id"]);
/// ```
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<BoxedStage>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Creates a pipeline builder around `transport`.
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder::new(transport)
    }

    /// Runs `request` through every stage and the transport.
    pub async fn run(&self, request: HttpRequest, context: Context) -> ClientResult<PipelineResponse> {
        Next::new(&self.stages, self.transport.as_ref())
            .run(PipelineRequest::new(request, context))
            .await
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the transport terminating the chain.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Pipeline`].
pub struct PipelineBuilder {
    stages: Vec<BoxedStage>,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    /// Creates a builder with no stages.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            stages: Vec::new(),
            transport,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn add_stage<S: Stage>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn add_boxed_stage(mut self, stage: BoxedStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends every stage in `stages`, in order.
    #[must_use]
    pub fn add_stages(mut self, stages: impl IntoIterator<Item = BoxedStage>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            transport: self.transport,
        }
    }
}
