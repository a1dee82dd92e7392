//! Mainframe Test - Shared test utilities.
//!
//! Mock windows, render surfaces, prompts and manifest loaders for the
//! launcher, in-memory capability backends for the daemon, and a harness
//! that runs a daemon in a temporary environment.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! mainframe-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use mainframe_test::{TestDaemon, MockWindowFactory};
//!
//! #[tokio::test]
//! async fn launches() {
//!     let daemon = TestDaemon::start().await;
//!     let client = daemon.client().await;
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod backends;
pub mod harness;
pub mod mocks;

pub use backends::*;
pub use harness::*;
pub use mocks::*;
