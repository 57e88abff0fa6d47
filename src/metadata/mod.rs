//! Reference enzyme/plastic corpus and the service it is fetched from

pub mod client;
pub mod corpus;

pub use client::{fetch_or_permissive, CorpusSource, MetadataClient, StaticCorpus};
pub use corpus::{Enzyme, ReferenceCorpus, ReferenceProtein};
