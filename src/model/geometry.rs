use super::molecule::Molecule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimensionality {
    Two,
    Three,
}

/// Per-atom metadata exposed alongside coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomSummary {
    pub symbol: &'static str,
    pub valence: u32,
    pub radical_electrons: u8,
}

/// A molecule paired with exactly one coordinate set.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    molecule: Molecule,
    coordinates: Vec<[f64; 3]>,
    dimensionality: Dimensionality,
}

impl Geometry {
    pub fn new(
        molecule: Molecule,
        coordinates: Vec<[f64; 3]>,
        dimensionality: Dimensionality,
    ) -> Self {
        debug_assert_eq!(molecule.atom_count(), coordinates.len());
        Self {
            molecule,
            coordinates,
            dimensionality,
        }
    }

    pub fn molecule(&self) -> &Molecule {
        &self.molecule
    }

    pub fn coordinates(&self) -> &[[f64; 3]] {
        &self.coordinates
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.dimensionality
    }

    pub fn atom_count(&self) -> usize {
        self.molecule.atom_count()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.molecule.heavy_atom_count()
    }

    pub fn atom_summaries(&self) -> impl Iterator<Item = AtomSummary> + '_ {
        (0..self.molecule.atom_count()).map(|i| {
            let atom = &self.molecule.atoms[i];
            AtomSummary {
                symbol: atom.element.symbol(),
                valence: self.molecule.total_valence(i),
                radical_electrons: atom.radical_electrons,
            }
        })
    }

    /// True when every atom sits within `tolerance` of the origin.
    pub fn is_collapsed(&self, tolerance: f64) -> bool {
        self.coordinates
            .iter()
            .all(|c| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt() < tolerance)
    }

    pub fn distance(&self, a: usize, b: usize) -> f64 {
        let (p, q) = (self.coordinates[a], self.coordinates[b]);
        ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2) + (p[2] - q[2]).powi(2)).sqrt()
    }

    pub fn into_parts(self) -> (Molecule, Vec<[f64; 3]>, Dimensionality) {
        (self.molecule, self.coordinates, self.dimensionality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::atom::Atom;
    use crate::model::molecule::Bond;
    use crate::model::types::{BondOrder, Element};

    fn ethane_like(coords: Vec<[f64; 3]>) -> Geometry {
        let mut mol = Molecule::new();
        mol.atoms.push(Atom::new(Element::C));
        mol.atoms.push(Atom::new(Element::C));
        mol.atoms[0].hydrogens = 3;
        mol.atoms[1].hydrogens = 3;
        mol.bonds.push(Bond::new(0, 1, BondOrder::Single));
        Geometry::new(mol, coords, Dimensionality::Three)
    }

    #[test]
    fn collapsed_when_all_atoms_near_origin() {
        let geom = ethane_like(vec![[0.01, 0.0, 0.0], [0.0, 0.02, 0.0]]);
        assert!(geom.is_collapsed(0.1));
        let geom = ethane_like(vec![[0.0, 0.0, 0.0], [1.54, 0.0, 0.0]]);
        assert!(!geom.is_collapsed(0.1));
    }

    #[test]
    fn summaries_report_symbol_and_valence() {
        let geom = ethane_like(vec![[0.0; 3], [1.54, 0.0, 0.0]]);
        let summaries: Vec<_> = geom.atom_summaries().collect();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].symbol, "C");
        assert_eq!(summaries[0].valence, 4);
        assert_eq!(summaries[1].radical_electrons, 0);
        assert!((geom.distance(0, 1) - 1.54).abs() < 1e-12);
    }
}
