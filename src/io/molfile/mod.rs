//! V2000 connection tables.
//!
//! Geometry files carry explicit hydrogens, zeroed stereo columns, and
//! `M  CHG` / `M  RAD` / `M  ISO` property lines for charged, radical and
//! isotopically labelled atoms.

mod reader;
mod writer;

pub use reader::read;
pub use writer::write;

use crate::model::types::BondOrder;

pub(crate) const PROGRAM: &str = "sforge";

pub(crate) fn bond_order_to_code(order: BondOrder) -> u8 {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Aromatic => 4,
        BondOrder::Quadruple => 8,
    }
}

pub(crate) fn bond_order_from_code(code: u8) -> Option<BondOrder> {
    match code {
        1 => Some(BondOrder::Single),
        2 => Some(BondOrder::Double),
        3 => Some(BondOrder::Triple),
        4 => Some(BondOrder::Aromatic),
        8 => Some(BondOrder::Quadruple),
        _ => None,
    }
}

/// Radical multiplicity code used by `M  RAD` lines.
pub(crate) fn radical_to_code(electrons: u8) -> u8 {
    match electrons {
        0 => 0,
        1 => 2,
        _ => 3,
    }
}

pub(crate) fn radical_from_code(code: u8) -> u8 {
    match code {
        2 => 1,
        1 | 3 => 2,
        _ => 0,
    }
}
