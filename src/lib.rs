//! cmakeup - provisions CMake and drives cmake/ctest for native projects
//!
//! This crate provides the core library functionality for cmakeup,
//! including release downloads, archive extraction, toolchain resolution
//! and CTest report conversion.

pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

pub use crate::core::{Classifier, Environment, Platform, ReleaseCoordinate};
pub use util::context::GlobalContext;
