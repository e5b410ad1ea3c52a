//! Core data structures flowing through the feature pipeline.
//!
//! - [`types`] – Periodic table elements and bond order classifications.
//! - [`atom`] – Atom with charge, hydrogen count, aromaticity and radical state.
//! - [`molecule`] – Connectivity graph parsed from a structural identifier.
//! - [`geometry`] – A molecule paired with one set of 2D or 3D coordinates.
//! - [`record`] – One input row: sanitized id, raw identifier, accepted geometry.
//! - [`representation`] – The selectable feature-generation modes.

pub mod atom;
pub mod geometry;
pub mod molecule;
pub mod record;
pub mod representation;
pub mod types;
