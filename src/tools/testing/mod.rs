//! In-process stand-ins for the external tools, for tests and dry runs

pub mod mock;

pub use mock::{FakeRuntime, MockAligner};
