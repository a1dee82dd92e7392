//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mainframe_test::prelude::*;` to import all essential types.

pub use crate::{
    InMemoryBackends, MockManifestLoader, MockPrompt, MockSurface, MockWindow, MockWindowFactory,
    TestDaemon, init_test_logging,
};
