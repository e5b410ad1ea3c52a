use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::model::{molecule::Molecule, types::Element};

/// Candidate turn angles (degrees) relative to the incoming bond, in preference order.
const CANDIDATE_TURNS: [f64; 12] = [
    0.0, 60.0, -60.0, 120.0, -120.0, 30.0, -30.0, 90.0, -90.0, 150.0, -150.0, 180.0,
];

/// Closest a newly placed atom may come to an existing one, as a fraction of the bond length.
const CLEARANCE_FRACTION: f64 = 0.6;

/// Deterministic 2D depiction used for the fallback geometry and the flattened copy.
///
/// Atoms are placed depth-first from the lowest-index atom of each fragment.
/// Ring bonds continue with a constant exterior turn so simple rings close
/// as regular polygons; other substituents take the free direction farthest
/// from every bond already drawn at their parent. Fragments are laid out
/// left to right.
#[derive(Debug, Clone, Copy)]
pub struct LayoutEngine {
    bond_length: f64,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self { bond_length: 1.5 }
    }
}

impl LayoutEngine {
    pub fn new(bond_length: f64) -> Self {
        Self { bond_length }
    }

    pub fn depict(&self, mol: &Molecule) -> Vec<[f64; 3]> {
        let n = mol.atom_count();
        let mut state = LayoutState {
            mol,
            adj: mol.adjacency(),
            ring_size: smallest_ring_per_bond(mol),
            pos: vec![None; n],
            bond_length: self.bond_length,
        };

        let mut offset_x = 0.0;
        for fragment in mol.fragments() {
            let root = fragment[0];
            state.pos[root] = Some([0.0, 0.0]);
            state.place_from(root, None);

            let (min_x, max_x) = fragment
                .iter()
                .filter_map(|&a| state.pos[a])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                    (lo.min(p[0]), hi.max(p[0]))
                });
            let shift = offset_x - min_x;
            for &a in &fragment {
                if let Some(p) = state.pos[a].as_mut() {
                    p[0] += shift;
                }
            }
            offset_x += (max_x - min_x) + 2.0 * self.bond_length;
        }

        state
            .pos
            .into_iter()
            .map(|p| {
                let [x, y] = p.unwrap_or([0.0, 0.0]);
                [x, y, 0.0]
            })
            .collect()
    }
}

struct LayoutState<'a> {
    mol: &'a Molecule,
    adj: Vec<Vec<(usize, usize)>>,
    ring_size: Vec<usize>,
    pos: Vec<Option<[f64; 2]>>,
    bond_length: f64,
}

impl LayoutState<'_> {
    fn place_from(&mut self, atom: usize, incoming: Option<f64>) {
        let mut children: Vec<(usize, usize)> = self.adj[atom]
            .iter()
            .copied()
            .filter(|&(n, _)| self.pos[n].is_none())
            .collect();
        children.sort_by_key(|&(n, b)| {
            let ring = self.ring_size[b];
            (
                ring == 0,
                ring,
                self.mol.atoms[n].element == Element::H,
                n,
            )
        });

        let heading = incoming.unwrap_or(0.0);
        let mut ring_continued = false;
        for (child, bond) in children {
            if self.pos[child].is_some() {
                continue;
            }
            let ring = self.ring_size[bond];
            let direction = if ring > 0 && !ring_continued {
                ring_continued = true;
                match incoming {
                    Some(h) => h + 2.0 * PI / ring as f64,
                    None => self.free_direction(atom, heading),
                }
            } else {
                self.free_direction(atom, heading)
            };

            let Some(origin) = self.pos[atom] else {
                continue;
            };
            self.pos[child] = Some([
                origin[0] + self.bond_length * direction.cos(),
                origin[1] + self.bond_length * direction.sin(),
            ]);
            self.place_from(child, Some(direction));
        }
    }

    /// Picks the candidate direction whose smallest angle to any drawn bond at
    /// `atom` is largest, skipping directions that would land on a placed atom.
    fn free_direction(&self, atom: usize, heading: f64) -> f64 {
        let Some(origin) = self.pos[atom] else {
            return heading;
        };
        let occupied: Vec<f64> = self.adj[atom]
            .iter()
            .filter_map(|&(n, _)| self.pos[n])
            .map(|p| (p[1] - origin[1]).atan2(p[0] - origin[0]))
            .collect();
        if occupied.is_empty() {
            return heading;
        }

        let min_clearance = CLEARANCE_FRACTION * self.bond_length;
        let mut best: Option<(f64, f64)> = None;
        let mut roomiest = (heading, f64::NEG_INFINITY);
        for turn in CANDIDATE_TURNS {
            let candidate = heading + turn.to_radians();
            let target = [
                origin[0] + self.bond_length * candidate.cos(),
                origin[1] + self.bond_length * candidate.sin(),
            ];
            let clearance = self
                .pos
                .iter()
                .flatten()
                .map(|p| ((p[0] - target[0]).powi(2) + (p[1] - target[1]).powi(2)).sqrt())
                .fold(f64::INFINITY, f64::min);
            if clearance > roomiest.1 + 1e-9 {
                roomiest = (candidate, clearance);
            }
            if clearance < min_clearance {
                continue;
            }
            let score = occupied
                .iter()
                .map(|&o| angular_distance(candidate, o))
                .fold(f64::INFINITY, f64::min);
            if best.is_none_or(|(_, s)| score > s + 1e-9) {
                best = Some((candidate, score));
            }
        }
        best.map(|(direction, _)| direction).unwrap_or(roomiest.0)
    }
}

fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(2.0 * PI);
    d.min(2.0 * PI - d)
}

/// Length of the smallest cycle through each bond, or 0 for acyclic bonds.
fn smallest_ring_per_bond(mol: &Molecule) -> Vec<usize> {
    let adj = mol.adjacency();
    mol.bonds
        .iter()
        .enumerate()
        .map(|(b, bond)| {
            let mut dist = vec![usize::MAX; mol.atom_count()];
            let mut queue = VecDeque::new();
            dist[bond.i] = 0;
            queue.push_back(bond.i);
            while let Some(cur) = queue.pop_front() {
                if cur == bond.j {
                    return dist[cur] + 1;
                }
                for &(next, via) in &adj[cur] {
                    if via != b && dist[next] == usize::MAX {
                        dist[next] = dist[cur] + 1;
                        queue.push_back(next);
                    }
                }
            }
            0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse;

    fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
    }

    #[test]
    fn bonded_atoms_sit_one_bond_length_apart() {
        let mol = parse("CC(C)O").unwrap().with_explicit_hydrogens();
        let coords = LayoutEngine::new(1.5).depict(&mol);
        for bond in &mol.bonds {
            let d = distance(coords[bond.i], coords[bond.j]);
            assert!((d - 1.5).abs() < 1e-9, "bond {bond:?} has length {d}");
        }
        assert!(coords.iter().all(|c| c[2] == 0.0));
    }

    #[test]
    fn six_membered_ring_closes_as_hexagon() {
        let mol = parse("C1CCCCC1").unwrap();
        let coords = LayoutEngine::new(1.5).depict(&mol);
        for bond in &mol.bonds {
            let d = distance(coords[bond.i], coords[bond.j]);
            assert!((d - 1.5).abs() < 1e-6, "ring bond length {d}");
        }
    }

    #[test]
    fn ring_sizes_are_detected_per_bond() {
        let mol = parse("C1CC1CC").unwrap();
        let sizes = smallest_ring_per_bond(&mol);
        assert_eq!(&sizes[..2], &[3, 3]);
        assert!(sizes.contains(&0));
    }

    #[test]
    fn fragments_do_not_overlap() {
        let mol = parse("[Na+].[Cl-]").unwrap();
        let coords = LayoutEngine::new(1.5).depict(&mol);
        assert!(distance(coords[0], coords[1]) >= 3.0 - 1e-9);
    }

    #[test]
    fn layout_is_deterministic() {
        let mol = parse("c1ccccc1CC(=O)N").unwrap().with_explicit_hydrogens();
        let engine = LayoutEngine::default();
        assert_eq!(engine.depict(&mol), engine.depict(&mol));
    }

    #[test]
    fn no_two_atoms_share_a_position() {
        let mol = parse("CC(C)(C)C").unwrap().with_explicit_hydrogens();
        let coords = LayoutEngine::default().depict(&mol);
        for i in 0..coords.len() {
            for j in i + 1..coords.len() {
                assert!(distance(coords[i], coords[j]) > 0.1, "atoms {i} and {j} overlap");
            }
        }
    }
}
