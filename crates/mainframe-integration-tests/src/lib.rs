//! End-to-end scenarios for Mainframe.
//!
//! A real daemon listens on a temporary Unix socket and a launcher registry
//! drives it through mock windows, surfaces and prompts. The scenarios live
//! under `tests/`; this library is empty.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
