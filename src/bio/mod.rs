pub mod annotation;
pub mod fasta;
pub mod sequence;

pub use annotation::{AnnotationRecord, AnnotationTable};
pub use sequence::Sequence;
