//! The analysis pipeline: annotation, filtering, alignment, aggregation
//! and notification, run as queued stage jobs.

pub mod aggregate;
pub mod alignment;
pub mod annotation;
pub mod filter;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod stage;

pub use aggregate::{Aggregator, EnzymeFinding, Report, ReportArtifacts};
pub use alignment::{best_hits, AlignmentEngine, AlignmentOutput, AlignmentRow};
pub use annotation::{AnnotationExecutor, AnnotationOutput};
pub use filter::{FilteredOutput, ResultFilter};
pub use notify::{DeliveryInfo, LogNotifier, Notifier, Outcome, OutboxNotifier};
pub use orchestrator::{
    Acknowledgement, AnalysisRequest, Orchestrator, OrchestratorBuilder, PendingRun, PipelinePlan,
    PlanStep, StageDescriptor, StageKind, ACKNOWLEDGEMENT,
};
pub use stage::{Artifact, StageFailure, StageResult};
