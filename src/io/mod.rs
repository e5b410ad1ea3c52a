//! File formats exchanged between pipeline stages.
//!
//! - [`molfile`] – V2000 connection-table blocks holding one geometry.
//! - [`column`] – Single-column value files (shift lists, histograms, fingerprint bits).

use std::fmt;

pub mod column;
pub mod error;
pub mod molfile;

pub use error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Molfile,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Molfile => write!(f, "molfile"),
        }
    }
}
