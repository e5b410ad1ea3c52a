use super::{PROGRAM, bond_order_to_code, radical_to_code};
use crate::io::error::Error;
use crate::model::geometry::{Dimensionality, Geometry};
use std::io::Write;

const PROPERTY_ENTRIES_PER_LINE: usize = 8;

pub fn write<W: Write>(mut writer: W, name: &str, geometry: &Geometry) -> Result<(), Error> {
    let molecule = geometry.molecule();
    let dim = match geometry.dimensionality() {
        Dimensionality::Two => "2D",
        Dimensionality::Three => "3D",
    };

    writeln!(writer, "{name}")?;
    writeln!(writer, "  {PROGRAM:<8}{:>10}{dim}", "")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000",
        molecule.atom_count(),
        molecule.bond_count()
    )?;

    for (atom, pos) in molecule.atoms.iter().zip(geometry.coordinates()) {
        writeln!(
            writer,
            "{:>10.4}{:>10.4}{:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
            pos[0],
            pos[1],
            pos[2],
            atom.element.symbol()
        )?;
    }

    for bond in &molecule.bonds {
        writeln!(
            writer,
            "{:>3}{:>3}{:>3}  0  0  0  0",
            bond.i + 1,
            bond.j + 1,
            bond_order_to_code(bond.order)
        )?;
    }

    let charges: Vec<(usize, i32)> = molecule
        .atoms
        .iter()
        .enumerate()
        .filter(|(_, a)| a.charge != 0)
        .map(|(i, a)| (i + 1, i32::from(a.charge)))
        .collect();
    write_property(&mut writer, "CHG", &charges)?;

    let radicals: Vec<(usize, i32)> = molecule
        .atoms
        .iter()
        .enumerate()
        .filter(|(_, a)| a.radical_electrons > 0)
        .map(|(i, a)| (i + 1, i32::from(radical_to_code(a.radical_electrons))))
        .collect();
    write_property(&mut writer, "RAD", &radicals)?;

    let isotopes: Vec<(usize, i32)> = molecule
        .atoms
        .iter()
        .enumerate()
        .filter_map(|(i, a)| a.isotope.map(|m| (i + 1, i32::from(m))))
        .collect();
    write_property(&mut writer, "ISO", &isotopes)?;

    writeln!(writer, "M  END")?;
    Ok(())
}

fn write_property<W: Write>(
    writer: &mut W,
    tag: &str,
    entries: &[(usize, i32)],
) -> Result<(), Error> {
    for chunk in entries.chunks(PROPERTY_ENTRIES_PER_LINE) {
        write!(writer, "M  {tag}{:>3}", chunk.len())?;
        for (atom, value) in chunk {
            write!(writer, " {atom:>3} {value:>3}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}
