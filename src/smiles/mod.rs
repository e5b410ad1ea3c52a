//! Line-notation structural identifiers.
//!
//! [`parse`] turns a SMILES string into a [`Molecule`](crate::model::molecule::Molecule)
//! with implicit hydrogens and radical electrons resolved; [`canonical_smiles`]
//! writes a molecule back out in a stable, stereo-free form.

mod canon;
mod parser;

pub use canon::canonical_smiles;
pub use parser::{ParseError, parse};
