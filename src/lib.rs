//! A pure Rust library for turning tables of SMILES strings into fixed-width
//! feature matrices built from simulated NMR spectra or hashed path
//! fingerprints, and for querying ensembles of regression models with them.
//!
//! # Features
//!
//! - **Input normalization** — Delimiter sniffing, decimal-comma repair,
//!   identifier sanitization, and row-level reporting of everything dropped
//! - **Structure embedding** — SMILES parsing, seeded 3D coordinate generation
//!   with bounded retries, a deterministic 2D fallback, and hazard-driven
//!   routing to an external layout tool
//! - **Spectral discretization** — 250-bin histograms over fixed ¹H and ¹³C
//!   shift windows
//! - **Matrix assembly** — Merging, header renumbering, and id-keyed hybrid
//!   concatenation with reported anomalies
//! - **Model dispatch** — SVR, gradient-boosted tree, dense and convolutional
//!   network backends read from JSON artifacts, aggregated per property
//!
//! # Quick Start
//!
//! Individual stages are usable on their own. Bucketing a shift series:
//!
//! ```
//! use shift_forge::bucket::{BIN_COUNT, SpectralWindow, bucket};
//!
//! let histogram = bucket(&["1.25", "7.26", "14", "15.3", "n/a"], SpectralWindow::PROTON);
//!
//! assert_eq!(histogram.counts.len(), BIN_COUNT);
//! // The upper bound is counted in the last bin.
//! assert_eq!(histogram.counts[BIN_COUNT - 1], 1);
//! // Out-of-window and unparseable values are kept aside.
//! assert_eq!(histogram.rejected.len(), 2);
//! assert_eq!(histogram.total(), 3);
//! ```
//!
//! Parsing an identifier and fingerprinting it:
//!
//! ```
//! use shift_forge::fingerprint::{FingerprintConfig, fingerprint};
//! use shift_forge::smiles;
//!
//! let ethanol = smiles::parse("CCO")?;
//! assert_eq!(ethanol.heavy_atom_count(), 3);
//!
//! let fp = fingerprint(&ethanol, &FingerprintConfig::default());
//! assert_eq!(fp.len(), 2048);
//! assert!(fp.count_ones() > 0);
//! # Ok::<(), shift_forge::smiles::ParseError>(())
//! ```
//!
//! A full run is driven by [`pipeline::Pipeline`], which sequences the
//! stages for one [`Representation`] and removes its intermediate files when
//! it ends.
//!
//! # Module Organization
//!
//! - [`normalize`] — Input table cleaning and record loading
//! - [`smiles`] — SMILES parsing and canonical output
//! - [`embed`] — Geometry generation, hazard detection, and molfile output
//! - [`fingerprint`] — Hashed path fingerprints
//! - [`bucket`] — Shift histograms
//! - [`assemble`] — Feature matrix merge, header, and hybrid join
//! - [`predict`] — Shift predictor invocation, model registry, and backends
//! - [`pipeline`] — Stage orchestration, configuration, and artifact cleanup
//! - [`io`] — Molfile and single-column file formats
//! - [`process`] — Bounded external command execution
//! - [`progress`] — Per-item progress reporting

pub mod assemble;
pub mod bucket;
pub mod embed;
pub mod fingerprint;
pub mod io;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod predict;
pub mod process;
pub mod progress;
pub mod smiles;

pub use model::atom::Atom;
pub use model::geometry::{Dimensionality, Geometry};
pub use model::molecule::{Bond, Molecule};
pub use model::record::StructureRecord;
pub use model::representation::{Nucleus, Representation};
pub use model::types::{BondOrder, Element, ParseElementError};

pub use pipeline::{Error as PipelineError, Pipeline, PipelineConfig, RunSummary};
