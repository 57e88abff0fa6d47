pub mod config;
pub mod paths;

pub use config::{
    AlignmentConfig, AnnotationTool, Config, ContainerStageConfig, MetadataConfig, PipelineConfig,
    RetryPolicy, Topology,
};
