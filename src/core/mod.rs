//! Core data structures for cmakeup.
//!
//! - Platform classifiers, executable conventions and environments
//! - Release coordinates on the CMake download mirror

pub mod platform;
pub mod release;

pub use platform::{Classifier, Environment, Platform, PlatformError};
pub use release::{ReleaseCoordinate, VersionError, DEFAULT_CMAKE_VERSION};
