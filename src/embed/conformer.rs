use std::collections::{HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{molecule::Molecule, types::BondOrder};

/// Relative deviation from the target length a bond may keep after relaxation.
const BOND_TOLERANCE: f64 = 0.25;
/// Closest any two atoms may sit in an accepted geometry (Å).
const MIN_SEPARATION: f64 = 0.5;
const STEP: f64 = 0.05;
const MAX_DISPLACEMENT: f64 = 0.25;
const BOND_WEIGHT: f64 = 1.0;
const ANGLE_WEIGHT: f64 = 0.3;
const REPULSION_WEIGHT: f64 = 0.3;

/// Generates 3D coordinates for a fully hydrogenated molecule.
pub trait ConformerEmbedder {
    /// One embedding attempt. `None` means the attempt produced no valid geometry.
    fn embed(&self, mol: &Molecule, seed: u64) -> Option<Vec<[f64; 3]>>;
}

/// Distance-geometry style embedder.
///
/// Atoms are grown outward from each fragment root along random directions
/// at their bonded distance, then relaxed by gradient descent on bond
/// lengths, ideal 1-3 distances and a soft non-bonded repulsion.
#[derive(Debug, Clone, Copy)]
pub struct DistanceEmbedder {
    iterations: usize,
}

impl Default for DistanceEmbedder {
    fn default() -> Self {
        Self { iterations: 1000 }
    }
}

impl DistanceEmbedder {
    pub fn new(iterations: usize) -> Self {
        Self { iterations }
    }
}

impl ConformerEmbedder for DistanceEmbedder {
    fn embed(&self, mol: &Molecule, seed: u64) -> Option<Vec<[f64; 3]>> {
        if mol.atoms.is_empty() {
            return None;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let restraints = Restraints::build(mol);
        let mut coords = initial_coordinates(mol, &restraints, &mut rng);

        for _ in 0..self.iterations {
            let grad = restraints.gradient(&coords);
            for (p, g) in coords.iter_mut().zip(&grad) {
                let mut step = [STEP * g[0], STEP * g[1], STEP * g[2]];
                let len = norm(step);
                if len > MAX_DISPLACEMENT {
                    let scale = MAX_DISPLACEMENT / len;
                    step = [step[0] * scale, step[1] * scale, step[2] * scale];
                }
                for k in 0..3 {
                    p[k] -= step[k];
                }
            }
        }

        restraints.accepts(&coords).then(|| centered(coords))
    }
}

struct Restraints {
    /// `(i, j, target)` for bonded pairs.
    bonds: Vec<(usize, usize, f64)>,
    /// `(i, k, target)` for atoms sharing a neighbor.
    angles: Vec<(usize, usize, f64)>,
    /// `(i, j, minimum)` for every other pair.
    contacts: Vec<(usize, usize, f64)>,
}

impl Restraints {
    fn build(mol: &Molecule) -> Self {
        let n = mol.atom_count();
        let adj = mol.adjacency();
        let bonds: Vec<(usize, usize, f64)> = mol
            .bonds
            .iter()
            .map(|b| (b.i, b.j, bond_target(mol, b.i, b.j, b.order)))
            .collect();
        let mut near: HashSet<(usize, usize)> = bonds.iter().map(|&(i, j, _)| pair(i, j)).collect();

        let mut angles = Vec::new();
        for center in 0..n {
            let theta = ideal_angle(mol, center);
            for (x, &(a, ba)) in adj[center].iter().enumerate() {
                for &(c, bc) in &adj[center][x + 1..] {
                    if a == c || !near.insert(pair(a, c)) {
                        continue;
                    }
                    let la = bonds[ba].2;
                    let lc = bonds[bc].2;
                    let d = (la * la + lc * lc - 2.0 * la * lc * theta.cos()).sqrt();
                    angles.push((a, c, d));
                }
            }
        }

        let mut contacts = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                if near.contains(&(i, j)) {
                    continue;
                }
                let ri = mol.atoms[i].element.covalent_radius();
                let rj = mol.atoms[j].element.covalent_radius();
                contacts.push((i, j, (ri + rj).max(1.0) + 0.8));
            }
        }

        Self {
            bonds,
            angles,
            contacts,
        }
    }

    fn gradient(&self, coords: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let mut grad = vec![[0.0; 3]; coords.len()];
        let mut spring = |i: usize, j: usize, target: f64, weight: f64, repulsive_only: bool| {
            let delta = sub(coords[i], coords[j]);
            let d = norm(delta);
            if d < 1e-9 || (repulsive_only && d >= target) {
                return;
            }
            let f = 2.0 * weight * (d - target) / d;
            for k in 0..3 {
                grad[i][k] += f * delta[k];
                grad[j][k] -= f * delta[k];
            }
        };
        for &(i, j, t) in &self.bonds {
            spring(i, j, t, BOND_WEIGHT, false);
        }
        for &(i, j, t) in &self.angles {
            spring(i, j, t, ANGLE_WEIGHT, false);
        }
        for &(i, j, t) in &self.contacts {
            spring(i, j, t, REPULSION_WEIGHT, true);
        }
        grad
    }

    fn accepts(&self, coords: &[[f64; 3]]) -> bool {
        if coords.iter().flatten().any(|v| !v.is_finite()) {
            return false;
        }
        let bonds_ok = self.bonds.iter().all(|&(i, j, t)| {
            let d = norm(sub(coords[i], coords[j]));
            (d - t).abs() <= BOND_TOLERANCE * t
        });
        bonds_ok
            && (0..coords.len()).all(|i| {
                (i + 1..coords.len()).all(|j| norm(sub(coords[i], coords[j])) >= MIN_SEPARATION)
            })
    }
}

fn bond_target(mol: &Molecule, i: usize, j: usize, order: BondOrder) -> f64 {
    let single = mol.atoms[i].element.covalent_radius() + mol.atoms[j].element.covalent_radius();
    let factor = match order {
        BondOrder::Single => 1.0,
        BondOrder::Aromatic => 0.93,
        BondOrder::Double => 0.87,
        BondOrder::Triple | BondOrder::Quadruple => 0.78,
    };
    single * factor
}

fn ideal_angle(mol: &Molecule, center: usize) -> f64 {
    let orders: Vec<BondOrder> = mol
        .bonds
        .iter()
        .filter(|b| b.contains(center))
        .map(|b| b.order)
        .collect();
    let doubles = orders.iter().filter(|&&o| o == BondOrder::Double).count();
    let degrees = if orders.contains(&BondOrder::Triple) || doubles >= 2 {
        180.0
    } else if doubles == 1 || mol.atoms[center].aromatic || orders.contains(&BondOrder::Aromatic) {
        120.0
    } else {
        109.47
    };
    f64::to_radians(degrees)
}

fn initial_coordinates(mol: &Molecule, restraints: &Restraints, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let n = mol.atom_count();
    let spread = (n as f64).cbrt() * 2.0;
    let adj = mol.adjacency();
    let mut coords: Vec<Option<[f64; 3]>> = vec![None; n];

    for fragment in mol.fragments() {
        let root = fragment[0];
        coords[root] = Some([
            rng.gen_range(-spread..spread),
            rng.gen_range(-spread..spread),
            rng.gen_range(-spread..spread),
        ]);
        let mut queue = VecDeque::from([root]);
        while let Some(cur) = queue.pop_front() {
            let Some(origin) = coords[cur] else { continue };
            for &(next, bond) in &adj[cur] {
                if coords[next].is_some() {
                    continue;
                }
                let u = random_unit(rng);
                let length = restraints.bonds[bond].2;
                coords[next] = Some([
                    origin[0] + length * u[0],
                    origin[1] + length * u[1],
                    origin[2] + length * u[2],
                ]);
                queue.push_back(next);
            }
        }
    }
    coords.into_iter().map(|c| c.unwrap_or([0.0; 3])).collect()
}

fn random_unit(rng: &mut StdRng) -> [f64; 3] {
    loop {
        let v = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        let len = norm(v);
        if len > 0.1 && len <= 1.0 {
            return [v[0] / len, v[1] / len, v[2] / len];
        }
    }
}

fn centered(mut coords: Vec<[f64; 3]>) -> Vec<[f64; 3]> {
    let n = coords.len() as f64;
    let mut c = [0.0; 3];
    for p in &coords {
        for k in 0..3 {
            c[k] += p[k] / n;
        }
    }
    for p in &mut coords {
        for k in 0..3 {
            p[k] -= c[k];
        }
    }
    coords
}

fn pair(i: usize, j: usize) -> (usize, usize) {
    if i < j { (i, j) } else { (j, i) }
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse;

    fn hydrogenated(smiles: &str) -> Molecule {
        parse(smiles).unwrap().with_explicit_hydrogens()
    }

    #[test]
    fn embeds_ethanol_with_valid_bond_lengths() {
        let mol = hydrogenated("CCO");
        let coords = DistanceEmbedder::default().embed(&mol, 42).unwrap();
        assert_eq!(coords.len(), mol.atom_count());
        for bond in &mol.bonds {
            let target = bond_target(&mol, bond.i, bond.j, bond.order);
            let d = norm(sub(coords[bond.i], coords[bond.j]));
            assert!((d - target).abs() <= BOND_TOLERANCE * target);
        }
    }

    #[test]
    fn embedding_is_reproducible_per_seed() {
        let mol = hydrogenated("CC(=O)N");
        let embedder = DistanceEmbedder::default();
        assert_eq!(embedder.embed(&mol, 7), embedder.embed(&mol, 7));
    }

    #[test]
    fn coordinates_are_centered_and_three_dimensional() {
        let mol = hydrogenated("CCCC");
        let coords = DistanceEmbedder::default().embed(&mol, 42).unwrap();
        let n = coords.len() as f64;
        for k in 0..3 {
            let mean: f64 = coords.iter().map(|c| c[k]).sum::<f64>() / n;
            assert!(mean.abs() < 1e-9);
        }
        assert!(coords.iter().any(|c| c[2].abs() > 0.05));
    }

    #[test]
    fn empty_molecule_cannot_be_embedded() {
        assert!(DistanceEmbedder::default().embed(&Molecule::new(), 42).is_none());
    }

    #[test]
    fn rejects_overlapping_atoms() {
        let mol = hydrogenated("CC");
        let restraints = Restraints::build(&mol);
        let coords = vec![[0.0; 3]; mol.atom_count()];
        assert!(!restraints.accepts(&coords));
    }

    #[test]
    fn linear_centers_use_straight_angles() {
        let mol = parse("C#N").unwrap();
        assert!((ideal_angle(&mol, 0) - std::f64::consts::PI).abs() < 1e-12);
        let mol = parse("CC").unwrap();
        assert!((ideal_angle(&mol, 0).to_degrees() - 109.47).abs() < 1e-9);
    }
}
