use crate::model::{molecule::Molecule, types::BondOrder};

/// Writes a stable SMILES for `mol`, independent of input atom order.
///
/// Stereo marks are not written.
pub fn canonical_smiles(mol: &Molecule) -> String {
    if mol.atoms.is_empty() {
        return String::new();
    }
    let ranks = canonical_ranks(mol);
    let adj = sorted_adjacency(mol, &ranks);
    let mut writer = Writer::new(mol, &adj);

    let mut fragments = mol.fragments();
    for fragment in &mut fragments {
        fragment.sort_by_key(|&a| ranks[a]);
    }
    fragments.sort_by_key(|f| ranks[f[0]]);

    let parts: Vec<String> = fragments.iter().map(|f| writer.fragment(f[0])).collect();
    parts.join(".")
}

fn invariant(mol: &Molecule, atom: usize) -> (u8, usize, u8, i8, bool, u16, u8) {
    let a = &mol.atoms[atom];
    (
        a.element.atomic_number(),
        mol.degree(atom),
        a.hydrogens,
        a.charge,
        a.aromatic,
        a.isotope.unwrap_or(0),
        a.radical_electrons,
    )
}

/// Assigns dense ranks to sortable keys, equal keys sharing a rank.
fn dense_ranks<K: Ord + Clone>(keys: &[K]) -> Vec<usize> {
    let mut sorted: Vec<K> = keys.to_vec();
    sorted.sort();
    sorted.dedup();
    keys.iter()
        .map(|k| sorted.binary_search(k).unwrap_or(0))
        .collect()
}

fn class_count(ranks: &[usize]) -> usize {
    let mut seen = ranks.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn refine(adj: &[Vec<(usize, usize)>], mut ranks: Vec<usize>) -> Vec<usize> {
    loop {
        let keys: Vec<(usize, Vec<usize>)> = (0..ranks.len())
            .map(|i| {
                let mut around: Vec<usize> = adj[i].iter().map(|&(n, _)| ranks[n]).collect();
                around.sort_unstable();
                (ranks[i], around)
            })
            .collect();
        let next = dense_ranks(&keys);
        if class_count(&next) == class_count(&ranks) {
            return next;
        }
        ranks = next;
    }
}

/// Ranks atoms by refined graph invariants, breaking remaining ties one class at a time.
fn canonical_ranks(mol: &Molecule) -> Vec<usize> {
    let adj = mol.adjacency();
    let initial: Vec<_> = (0..mol.atom_count()).map(|i| invariant(mol, i)).collect();
    let mut ranks = refine(&adj, dense_ranks(&initial));

    while class_count(&ranks) < ranks.len() {
        let tied = ranks
            .iter()
            .copied()
            .filter(|&r| ranks.iter().filter(|&&o| o == r).count() > 1)
            .min();
        let Some(chosen) = tied.and_then(|t| ranks.iter().position(|&r| r == t)) else {
            break;
        };
        let doubled: Vec<usize> = ranks
            .iter()
            .enumerate()
            .map(|(i, &r)| if i == chosen { 2 * r } else { 2 * r + 1 })
            .collect();
        ranks = refine(&adj, dense_ranks(&doubled));
    }
    ranks
}

fn sorted_adjacency(mol: &Molecule, ranks: &[usize]) -> Vec<Vec<(usize, usize)>> {
    let mut adj = mol.adjacency();
    for list in &mut adj {
        list.sort_by_key(|&(n, _)| ranks[n]);
    }
    adj
}

struct Writer<'a> {
    mol: &'a Molecule,
    adj: &'a [Vec<(usize, usize)>],
    visited: Vec<bool>,
    children: Vec<Vec<(usize, usize)>>,
    ring_bonds: Vec<Vec<usize>>,
    closed: Vec<bool>,
    labels: Vec<Option<u16>>,
    free: Vec<bool>,
}

impl<'a> Writer<'a> {
    fn new(mol: &'a Molecule, adj: &'a [Vec<(usize, usize)>]) -> Self {
        Self {
            mol,
            adj,
            visited: vec![false; mol.atom_count()],
            children: vec![Vec::new(); mol.atom_count()],
            ring_bonds: vec![Vec::new(); mol.atom_count()],
            closed: vec![false; mol.bond_count()],
            labels: vec![None; mol.bond_count()],
            free: Vec::new(),
        }
    }

    fn fragment(&mut self, root: usize) -> String {
        self.discover(root, None);
        let mut out = String::new();
        self.emit(root, None, &mut out);
        out
    }

    fn discover(&mut self, atom: usize, via: Option<usize>) {
        self.visited[atom] = true;
        for &(next, bond) in &self.adj[atom] {
            if Some(bond) == via {
                continue;
            }
            if self.visited[next] {
                if !self.closed[bond] {
                    self.closed[bond] = true;
                    self.ring_bonds[next].push(bond);
                    self.ring_bonds[atom].push(bond);
                }
            } else {
                self.children[atom].push((next, bond));
                self.discover(next, Some(bond));
            }
        }
    }

    fn emit(&mut self, atom: usize, via: Option<usize>, out: &mut String) {
        if let Some(bond) = via {
            out.push_str(self.bond_symbol(bond));
        }
        out.push_str(&self.atom_token(atom));

        for bond in self.ring_bonds[atom].clone() {
            match self.labels[bond] {
                Some(label) => {
                    push_label(out, label);
                    self.free[usize::from(label)] = true;
                }
                None => {
                    let label = self.allocate();
                    self.labels[bond] = Some(label);
                    out.push_str(self.bond_symbol(bond));
                    push_label(out, label);
                }
            }
        }

        let children = self.children[atom].clone();
        for (k, &(child, bond)) in children.iter().enumerate() {
            if k + 1 < children.len() {
                out.push('(');
                self.emit(child, Some(bond), out);
                out.push(')');
            } else {
                self.emit(child, Some(bond), out);
            }
        }
    }

    fn allocate(&mut self) -> u16 {
        if let Some(idx) = (1..self.free.len()).find(|&i| self.free[i]) {
            self.free[idx] = false;
            return idx as u16;
        }
        if self.free.is_empty() {
            self.free.push(false);
        }
        self.free.push(false);
        (self.free.len() - 1) as u16
    }

    fn bond_symbol(&self, bond: usize) -> &'static str {
        let b = &self.mol.bonds[bond];
        let both_aromatic = self.mol.atoms[b.i].aromatic && self.mol.atoms[b.j].aromatic;
        match b.order {
            BondOrder::Single if both_aromatic => "-",
            BondOrder::Single => "",
            BondOrder::Aromatic if both_aromatic => "",
            BondOrder::Aromatic => ":",
            BondOrder::Double => "=",
            BondOrder::Triple => "#",
            BondOrder::Quadruple => "$",
        }
    }

    fn atom_token(&self, atom: usize) -> String {
        let a = &self.mol.atoms[atom];
        let symbol = if a.aromatic {
            a.element.symbol().to_ascii_lowercase()
        } else {
            a.element.symbol().to_string()
        };
        let organic = matches!(
            a.element.symbol(),
            "B" | "C" | "N" | "O" | "P" | "S" | "F" | "Cl" | "Br" | "I"
        );
        let plain = organic
            && a.charge == 0
            && a.isotope.is_none()
            && a.radical_electrons == 0
            && a.hydrogens == self.mol.implied_hydrogens(atom);
        if plain {
            return symbol;
        }

        let mut token = String::from("[");
        if let Some(mass) = a.isotope {
            token.push_str(&mass.to_string());
        }
        token.push_str(&symbol);
        match a.hydrogens {
            0 => {}
            1 => token.push('H'),
            n => token.push_str(&format!("H{n}")),
        }
        match a.charge {
            0 => {}
            1 => token.push('+'),
            -1 => token.push('-'),
            c if c > 0 => token.push_str(&format!("+{c}")),
            c => token.push_str(&format!("-{}", -i16::from(c))),
        }
        token.push(']');
        token
    }
}

fn push_label(out: &mut String, label: u16) {
    if label < 10 {
        out.push_str(&label.to_string());
    } else {
        out.push_str(&format!("%{label}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse;

    fn canon(smiles: &str) -> String {
        canonical_smiles(&parse(smiles).unwrap())
    }

    #[test]
    fn equivalent_inputs_share_one_form() {
        assert_eq!(canon("OCC"), canon("CCO"));
        assert_eq!(canon("C(C)O"), canon("CCO"));
        assert_eq!(canon("c1ccncc1"), canon("n1ccccc1"));
        assert_eq!(canon("CC(=O)O"), canon("OC(C)=O"));
    }

    #[test]
    fn distinct_structures_stay_distinct() {
        assert_ne!(canon("CCO"), canon("COC"));
        assert_ne!(canon("c1ccccc1"), canon("C1CCCCC1"));
    }

    #[test]
    fn output_reparses_to_same_graph_size() {
        for smiles in ["c1ccc2ccccc2c1", "CC(C)(C)C(=O)[O-]", "[Na+].[Cl-]", "C#N", "[13CH3]O"] {
            let written = canon(smiles);
            let again = parse(&written).unwrap();
            let original = parse(smiles).unwrap();
            assert_eq!(again.atom_count(), original.atom_count(), "{smiles} -> {written}");
            assert_eq!(again.bond_count(), original.bond_count(), "{smiles} -> {written}");
            assert_eq!(canonical_smiles(&again), written);
        }
    }

    #[test]
    fn stereo_marks_are_dropped() {
        let written = canon("F/C=C/F");
        assert!(!written.contains('/'));
        assert_eq!(written, canon("FC=CF"));
        assert!(!canon("N[C@@H](C)C(=O)O").contains('@'));
    }

    #[test]
    fn charged_atoms_use_brackets() {
        assert!(canon("C[N+](C)(C)C").contains("[N+]"));
        assert_eq!(canon("[Fe+3]"), "[Fe+3]");
    }

    #[test]
    fn empty_molecule_writes_nothing() {
        assert_eq!(canonical_smiles(&Molecule::new()), "");
    }
}
