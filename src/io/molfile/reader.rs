use super::{bond_order_from_code, radical_from_code};
use crate::io::{Format, error::Error};
use crate::model::{
    atom::Atom,
    geometry::{Dimensionality, Geometry},
    molecule::{Bond, Molecule},
    types::Element,
};
use std::io::BufRead;

/// Reads the first connection table from `reader`.
pub fn read<R: BufRead>(reader: R) -> Result<Geometry, Error> {
    let lines = collect_block(reader)?;
    if lines.len() < 4 {
        return Err(Error::parse(
            Format::Molfile,
            1,
            "block must contain a header and counts line",
        ));
    }

    let (counts_line_no, counts_line) = (&lines[3].0, &lines[3].1);
    if counts_line.contains("V3000") {
        return Err(Error::parse(
            Format::Molfile,
            *counts_line_no,
            "V3000 is not supported",
        ));
    }

    let (atom_count, bond_count) = parse_counts(counts_line, *counts_line_no)?;
    let atom_start = 4;
    let bond_start = atom_start + atom_count;
    if lines.len() < bond_start + bond_count {
        return Err(Error::parse(
            Format::Molfile,
            lines.last().map(|(ln, _)| *ln).unwrap_or(*counts_line_no),
            "block ended before atoms and bonds were fully specified",
        ));
    }

    let (atoms, coordinates) = parse_atoms(&lines[atom_start..bond_start])?;
    let bonds = parse_bonds(&lines[bond_start..bond_start + bond_count], atom_count)?;
    let mut molecule = Molecule { atoms, bonds };
    apply_properties(&mut molecule, &lines[bond_start + bond_count..])?;

    let dimensionality = match lines[1].1.get(20..22) {
        Some("3D") => Dimensionality::Three,
        Some("2D") => Dimensionality::Two,
        _ if coordinates.iter().any(|c| c[2].abs() > 1e-6) => Dimensionality::Three,
        _ => Dimensionality::Two,
    };

    Ok(Geometry::new(molecule, coordinates, dimensionality))
}

fn collect_block<R: BufRead>(reader: R) -> Result<Vec<(usize, String)>, Error> {
    let mut lines = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let content = line?;
        let trimmed = content.trim();
        if trimmed == "M  END" || (trimmed == "$$$$" && !lines.is_empty()) {
            break;
        }
        lines.push((i + 1, content));
    }
    Ok(lines)
}

fn parse_counts(line: &str, line_no: usize) -> Result<(usize, usize), Error> {
    let field = |range: std::ops::Range<usize>, what: &str| {
        line.get(range)
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| Error::parse(Format::Molfile, line_no, format!("invalid {what} count")))
    };
    Ok((field(0..3, "atom")?, field(3..6, "bond")?))
}

fn parse_atoms(lines: &[(usize, String)]) -> Result<(Vec<Atom>, Vec<[f64; 3]>), Error> {
    let mut atoms = Vec::with_capacity(lines.len());
    let mut coordinates = Vec::with_capacity(lines.len());
    for (ln, raw) in lines {
        let padded = format!("{raw:<40}");
        let coord = |range: std::ops::Range<usize>, axis: char| {
            padded[range].trim().parse::<f64>().map_err(|_| {
                Error::parse(Format::Molfile, *ln, format!("invalid {axis} coordinate"))
            })
        };
        let position = [coord(0..10, 'x')?, coord(10..20, 'y')?, coord(20..30, 'z')?];
        let symbol = padded[31..34].trim();
        let element = symbol.parse::<Element>().map_err(|_| {
            Error::parse(Format::Molfile, *ln, format!("unknown element '{symbol}'"))
        })?;
        atoms.push(Atom::new(element));
        coordinates.push(position);
    }
    Ok((atoms, coordinates))
}

fn parse_bonds(lines: &[(usize, String)], atom_count: usize) -> Result<Vec<Bond>, Error> {
    let mut bonds = Vec::with_capacity(lines.len());
    for (ln, raw) in lines {
        let padded = format!("{raw:<9}");
        let field = |range: std::ops::Range<usize>, what: &str| {
            padded[range]
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::parse(Format::Molfile, *ln, format!("invalid {what}")))
        };
        let a1 = field(0..3, "first atom index")?;
        let a2 = field(3..6, "second atom index")?;
        let code = field(6..9, "bond order")?;

        let order = u8::try_from(code)
            .ok()
            .and_then(bond_order_from_code)
            .ok_or_else(|| Error::parse(Format::Molfile, *ln, "unsupported bond order"))?;

        if a1 == 0 || a2 == 0 || a1 > atom_count || a2 > atom_count {
            return Err(Error::parse(
                Format::Molfile,
                *ln,
                "bond references atom outside declared range",
            ));
        }
        bonds.push(Bond::new(a1 - 1, a2 - 1, order));
    }
    Ok(bonds)
}

fn apply_properties(molecule: &mut Molecule, lines: &[(usize, String)]) -> Result<(), Error> {
    for (ln, raw) in lines {
        let Some(tag) = raw.get(3..6).filter(|_| raw.starts_with("M  ")) else {
            continue;
        };
        if !matches!(tag, "CHG" | "RAD" | "ISO") {
            continue;
        }
        let values: Vec<i32> = raw[6..]
            .split_whitespace()
            .skip(1)
            .map(|t| t.parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|_| Error::parse(Format::Molfile, *ln, "invalid property entry"))?;

        for pair in values.chunks_exact(2) {
            let idx = usize::try_from(pair[0] - 1)
                .ok()
                .filter(|&i| i < molecule.atom_count())
                .ok_or_else(|| {
                    Error::parse(Format::Molfile, *ln, "property references unknown atom")
                })?;
            let atom = &mut molecule.atoms[idx];
            match tag {
                "CHG" => atom.charge = pair[1].clamp(-15, 15) as i8,
                "RAD" => atom.radical_electrons = radical_from_code(pair[1].clamp(0, 3) as u8),
                _ => atom.isotope = u16::try_from(pair[1]).ok(),
            }
        }
    }
    Ok(())
}
