pub mod blast;
pub mod container;
pub mod process;
pub mod testing;
pub mod traits;

pub use blast::BlastAligner;
pub use container::{CliRuntime, ContainerInvocation, ContainerOutput, ContainerRuntime};
pub use testing::{FakeRuntime, MockAligner};
pub use traits::{AlignmentHit, Aligner};
