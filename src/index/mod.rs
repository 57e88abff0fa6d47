pub mod reference_db;

pub use reference_db::{
    DatabaseStatus, Fingerprint, ReferenceDatabase, ReferenceDatabaseBuilder, INDEX_NAME,
    REFERENCE_FASTA,
};
