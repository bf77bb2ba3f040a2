pub mod artifacts;
pub mod config;
pub mod error;
pub mod item;
pub mod retry;

pub use artifacts::{Artifact, ArtifactStore};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use item::ItemRecord;
pub use retry::RetryPolicy;
