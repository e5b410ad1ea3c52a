use std::collections::BTreeMap;
use std::fmt;

use crate::model::{molecule::Molecule, types::Element};

/// Valence above which these elements are routed to the external layout tool.
const HYPERVALENT_LIMIT: u32 = 4;
const HYPERVALENT_ELEMENTS: [Element; 4] = [Element::S, Element::P, Element::As, Element::Se];

/// A structural property that forces the external 2D layout route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hazard {
    Empty,
    HyperValent { element: Element, valence: u32 },
    TransitionMetal(Element),
    Radical { electrons: u32 },
    TooManyHeavyAtoms { count: usize, ceiling: usize },
    DisconnectedFragments { components: usize },
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hazard::Empty => write!(f, "no atoms"),
            Hazard::HyperValent { element, valence } => {
                write!(f, "hyper-valent {element} (valence {valence})")
            }
            Hazard::TransitionMetal(element) => write!(f, "transition metal {element}"),
            Hazard::Radical { electrons } => write!(f, "radical ({electrons} unpaired electrons)"),
            Hazard::TooManyHeavyAtoms { count, ceiling } => {
                write!(f, "{count} heavy atoms (ceiling {ceiling})")
            }
            Hazard::DisconnectedFragments { components } => {
                write!(f, "disconnected fragments ({components} components)")
            }
        }
    }
}

/// Returns every hazard present in `mol`, one entry per kind and element.
pub fn detect(mol: &Molecule, heavy_atom_ceiling: usize) -> Vec<Hazard> {
    let mut hazards = Vec::new();
    if mol.atoms.is_empty() {
        hazards.push(Hazard::Empty);
        return hazards;
    }

    let mut hypervalent: BTreeMap<Element, u32> = BTreeMap::new();
    let mut metals: Vec<Element> = Vec::new();
    let mut electrons = 0u32;
    for (i, atom) in mol.atoms.iter().enumerate() {
        if HYPERVALENT_ELEMENTS.contains(&atom.element) {
            let valence = mol.total_valence(i);
            if valence > HYPERVALENT_LIMIT {
                let entry = hypervalent.entry(atom.element).or_insert(valence);
                *entry = (*entry).max(valence);
            }
        }
        if atom.element.is_transition_metal() && !metals.contains(&atom.element) {
            metals.push(atom.element);
        }
        electrons += u32::from(atom.radical_electrons);
    }

    hazards.extend(
        hypervalent
            .into_iter()
            .map(|(element, valence)| Hazard::HyperValent { element, valence }),
    );
    hazards.extend(metals.into_iter().map(Hazard::TransitionMetal));
    if electrons > 0 {
        hazards.push(Hazard::Radical { electrons });
    }
    let heavy = mol.heavy_atom_count();
    if heavy > heavy_atom_ceiling {
        hazards.push(Hazard::TooManyHeavyAtoms {
            count: heavy,
            ceiling: heavy_atom_ceiling,
        });
    }
    let components = mol.fragment_count();
    if components > 1 {
        hazards.push(Hazard::DisconnectedFragments { components });
    }
    hazards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse;

    fn hazards(smiles: &str) -> Vec<Hazard> {
        detect(&parse(smiles).unwrap(), 150)
    }

    #[test]
    fn ordinary_molecules_are_clean() {
        assert!(hazards("CCO").is_empty());
        assert!(hazards("c1ccccc1O").is_empty());
        assert!(hazards("CS(C)=O").is_empty());
    }

    #[test]
    fn chiral_centers_with_hydrogen_are_not_radicals() {
        assert!(hazards("N[C@H](C)C(=O)O").is_empty());
        assert!(hazards("N[C@@H](C)C(=O)O").is_empty());
        assert!(hazards("C[C@TH1H](O)CC").is_empty());
    }

    #[test]
    fn flags_hypervalent_sulfur() {
        let found = hazards("CS(=O)(=O)C");
        assert_eq!(
            found,
            vec![Hazard::HyperValent {
                element: Element::S,
                valence: 6
            }]
        );
    }

    #[test]
    fn flags_transition_metals_once_per_element() {
        let found = hazards("[Fe]([Cl])([Cl])[Fe]");
        assert_eq!(found, vec![Hazard::TransitionMetal(Element::Fe)]);
    }

    #[test]
    fn flags_disconnected_fragments() {
        let found = hazards("CC(=O)[O-].[Na+]");
        assert_eq!(found, vec![Hazard::DisconnectedFragments { components: 2 }]);
        assert_eq!(
            found[0].to_string(),
            "disconnected fragments (2 components)"
        );
    }

    #[test]
    fn reports_every_independent_hazard() {
        let mol = parse("[CH]CCCCC").unwrap();
        let found = detect(&mol, 3);
        assert_eq!(
            found,
            vec![
                Hazard::Radical { electrons: 2 },
                Hazard::TooManyHeavyAtoms {
                    count: 6,
                    ceiling: 3
                },
            ]
        );
    }

    #[test]
    fn empty_structure_is_a_hazard() {
        assert_eq!(detect(&Molecule::new(), 150), vec![Hazard::Empty]);
    }
}
