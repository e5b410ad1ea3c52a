use super::atom::Atom;
use super::types::{BondOrder, Element};

/// Directional marker carried by single bonds adjacent to a double bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BondStereo {
    #[default]
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bond {
    pub i: usize,
    pub j: usize,
    pub order: BondOrder,
    pub stereo: BondStereo,
}

impl Bond {
    pub fn new(i: usize, j: usize, order: BondOrder) -> Self {
        Self {
            i,
            j,
            order,
            stereo: BondStereo::None,
        }
    }

    /// Returns the partner of `atom` in this bond.
    #[inline]
    pub fn other(&self, atom: usize) -> usize {
        if self.i == atom { self.j } else { self.i }
    }

    #[inline]
    pub fn contains(&self, atom: usize) -> bool {
        self.i == atom || self.j == atom
    }
}

/// Connectivity graph of one structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| a.is_heavy()).count()
    }

    /// Adjacency list of `(neighbor, bond index)` pairs per atom.
    pub fn adjacency(&self) -> Vec<Vec<(usize, usize)>> {
        let mut adj = vec![Vec::new(); self.atoms.len()];
        for (b, bond) in self.bonds.iter().enumerate() {
            adj[bond.i].push((bond.j, b));
            adj[bond.j].push((bond.i, b));
        }
        adj
    }

    pub fn neighbors(&self, atom: usize) -> impl Iterator<Item = usize> + '_ {
        self.bonds
            .iter()
            .filter(move |b| b.contains(atom))
            .map(move |b| b.other(atom))
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.neighbors(atom).count()
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&Bond> {
        self.bonds
            .iter()
            .find(|bond| bond.contains(a) && bond.other(a) == b && a != b)
    }

    /// Valence contributed by explicit bonds, aromatic bonds counting one.
    pub fn explicit_valence(&self, atom: usize) -> u32 {
        self.bonds
            .iter()
            .filter(|b| b.contains(atom))
            .map(|b| u32::from(b.order.valence()))
            .sum()
    }

    /// Extra unit of valence an aromatic atom gains from its share of the pi system.
    pub fn pi_bonus(&self, atom: usize) -> u32 {
        let a = &self.atoms[atom];
        if !a.aromatic || !pi_capable(a.element) {
            return 0;
        }
        let used = self.explicit_valence(atom) + u32::from(a.hydrogens) + 1;
        match a.element.allowed_valences(a.charge).first() {
            Some(&first) if used <= u32::from(first) => 1,
            _ => 0,
        }
    }

    /// Bond valence plus attached hydrogens plus the aromatic bonus.
    pub fn total_valence(&self, atom: usize) -> u32 {
        self.explicit_valence(atom) + u32::from(self.atoms[atom].hydrogens) + self.pi_bonus(atom)
    }

    /// Hydrogens implied for an atom written without brackets.
    pub fn implied_hydrogens(&self, atom: usize) -> u8 {
        let a = &self.atoms[atom];
        let explicit = self.explicit_valence(atom);
        let allowed = a.element.allowed_valences(a.charge);
        let missing = if a.aromatic && pi_capable(a.element) {
            match allowed.first() {
                Some(&first) if explicit < u32::from(first) => u32::from(first) - explicit - 1,
                _ => 0,
            }
        } else {
            allowed
                .iter()
                .map(|&v| u32::from(v))
                .find(|&v| v >= explicit)
                .map(|v| v - explicit)
                .unwrap_or(0)
        };
        u8::try_from(missing).unwrap_or(0)
    }

    /// Unpaired electrons for a bracket atom whose valence falls short of its lowest allowed state.
    pub fn implied_radicals(&self, atom: usize) -> u8 {
        let a = &self.atoms[atom];
        let allowed = a.element.allowed_valences(a.charge);
        let total = self.total_valence(atom);
        match allowed.first() {
            Some(&min) if total < u32::from(min) => u8::try_from(u32::from(min) - total).unwrap_or(0),
            _ => 0,
        }
    }

    pub fn has_radicals(&self) -> bool {
        self.atoms.iter().any(|a| a.radical_electrons > 0)
    }

    /// Connected components as sorted atom index lists, ordered by their lowest atom.
    pub fn fragments(&self) -> Vec<Vec<usize>> {
        let adj = self.adjacency();
        let mut seen = vec![false; self.atoms.len()];
        let mut out = Vec::new();
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut members = Vec::new();
            while let Some(cur) = stack.pop() {
                members.push(cur);
                for &(next, _) in &adj[cur] {
                    if !seen[next] {
                        seen[next] = true;
                        stack.push(next);
                    }
                }
            }
            members.sort_unstable();
            out.push(members);
        }
        out
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments().len()
    }

    /// Copy with every implicit hydrogen promoted to an explicit atom bonded to its parent.
    pub fn with_explicit_hydrogens(&self) -> Molecule {
        let mut atoms: Vec<Atom> = self
            .atoms
            .iter()
            .map(|a| Atom {
                hydrogens: 0,
                ..a.clone()
            })
            .collect();
        let mut bonds = self.bonds.clone();
        for (parent, atom) in self.atoms.iter().enumerate() {
            for _ in 0..atom.hydrogens {
                atoms.push(Atom::new(Element::H));
                bonds.push(Bond::new(parent, atoms.len() - 1, BondOrder::Single));
            }
        }
        Molecule { atoms, bonds }
    }

    /// Copy with chirality and double-bond direction markers cleared.
    pub fn without_stereo(&self) -> Molecule {
        let mut out = self.clone();
        for atom in &mut out.atoms {
            atom.chirality = Default::default();
        }
        for bond in &mut out.bonds {
            bond.stereo = BondStereo::None;
        }
        out
    }
}

fn pi_capable(element: Element) -> bool {
    matches!(
        element,
        Element::B | Element::C | Element::N | Element::P | Element::As
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(elements: &[Element], order: BondOrder) -> Molecule {
        let mut mol = Molecule::new();
        for &e in elements {
            mol.atoms.push(Atom::new(e));
        }
        for i in 1..elements.len() {
            mol.bonds.push(Bond::new(i - 1, i, order));
        }
        mol
    }

    fn aromatic_ring(n: usize) -> Molecule {
        let mut mol = chain(&vec![Element::C; n], BondOrder::Aromatic);
        mol.bonds.push(Bond::new(n - 1, 0, BondOrder::Aromatic));
        for atom in &mut mol.atoms {
            atom.aromatic = true;
        }
        mol
    }

    #[test]
    fn bond_other_returns_partner() {
        let bond = Bond::new(2, 5, BondOrder::Double);
        assert_eq!(bond.other(2), 5);
        assert_eq!(bond.other(5), 2);
        assert!(bond.contains(5));
        assert!(!bond.contains(3));
    }

    #[test]
    fn implied_hydrogens_fill_lowest_valence() {
        let ethanol = chain(&[Element::C, Element::C, Element::O], BondOrder::Single);
        assert_eq!(ethanol.implied_hydrogens(0), 3);
        assert_eq!(ethanol.implied_hydrogens(1), 2);
        assert_eq!(ethanol.implied_hydrogens(2), 1);
    }

    #[test]
    fn implied_hydrogens_use_next_valence_state() {
        let mut mol = chain(&[Element::S, Element::O], BondOrder::Double);
        mol.atoms.push(Atom::new(Element::O));
        mol.bonds.push(Bond::new(0, 2, BondOrder::Double));
        assert_eq!(mol.explicit_valence(0), 4);
        assert_eq!(mol.implied_hydrogens(0), 0);
    }

    #[test]
    fn aromatic_carbon_gets_one_hydrogen_in_benzene() {
        let mut benzene = aromatic_ring(6);
        assert_eq!(benzene.implied_hydrogens(0), 1);
        benzene.atoms[0].hydrogens = 1;
        assert_eq!(benzene.pi_bonus(0), 1);
        assert_eq!(benzene.total_valence(0), 4);
    }

    #[test]
    fn radicals_fill_missing_valence_of_bracket_atoms() {
        let mut mol = Molecule::new();
        let mut carbon = Atom::new(Element::C);
        carbon.hydrogens = 3;
        carbon.bracket = true;
        mol.atoms.push(carbon);
        assert_eq!(mol.implied_radicals(0), 1);
    }

    #[test]
    fn valence_counts_past_u8_range() {
        let mut mol = Molecule::new();
        mol.atoms.push(Atom::new(Element::C));
        for i in 1..=300 {
            mol.atoms.push(Atom::new(Element::Cl));
            mol.bonds.push(Bond::new(0, i, BondOrder::Double));
        }
        assert_eq!(mol.explicit_valence(0), 600);
        assert_eq!(mol.total_valence(0), 600);
        assert_eq!(mol.implied_hydrogens(0), 0);
        assert_eq!(mol.implied_radicals(0), 0);
    }

    #[test]
    fn fragments_split_disconnected_components() {
        let mut mol = chain(&[Element::C, Element::C], BondOrder::Single);
        mol.atoms.push(Atom::new(Element::Na));
        let fragments = mol.fragments();
        assert_eq!(fragments, vec![vec![0, 1], vec![2]]);
        assert_eq!(mol.fragment_count(), 2);
    }

    #[test]
    fn explicit_hydrogens_are_bonded_to_parent() {
        let mut mol = chain(&[Element::C, Element::O], BondOrder::Single);
        mol.atoms[0].hydrogens = 3;
        mol.atoms[1].hydrogens = 1;
        let full = mol.with_explicit_hydrogens();
        assert_eq!(full.atom_count(), 6);
        assert_eq!(full.bond_count(), 5);
        assert_eq!(full.heavy_atom_count(), 2);
        assert!(full.atoms.iter().all(|a| a.hydrogens == 0));
        assert_eq!(full.degree(0), 4);
        assert_eq!(full.degree(1), 2);
    }

    #[test]
    fn without_stereo_clears_markers() {
        let mut mol = chain(&[Element::C, Element::C], BondOrder::Single);
        mol.atoms[0].chirality = super::super::atom::Chirality::Clockwise;
        mol.bonds[0].stereo = BondStereo::Up;
        let flat = mol.without_stereo();
        assert_eq!(flat.atoms[0].chirality, Default::default());
        assert_eq!(flat.bonds[0].stereo, BondStereo::None);
    }
}
