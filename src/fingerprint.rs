//! Path-based hashed structural fingerprints.
//!
//! Every simple linear bond path of `min_path..=max_path` bonds is encoded as
//! a sequence of atom and bond invariants, oriented so that both traversal
//! directions produce the same key, hashed with FNV-1a and folded into a
//! fixed-width bit vector.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::io::column;
use crate::model::molecule::Molecule;
use crate::model::record::StructureRecord;
use crate::progress::{PercentThrottle, Progress};
use crate::smiles::{self, ParseError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to prepare fingerprint directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] crate::io::Error),

    #[error("fingerprint width must be positive")]
    ZeroWidth,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FingerprintConfig {
    pub bits: usize,
    pub min_path: usize,
    pub max_path: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            bits: 2048,
            min_path: 1,
            max_path: 7,
        }
    }
}

/// Fixed-width bit vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    bits: Vec<bool>,
}

impl Fingerprint {
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn is_set(&self, idx: usize) -> bool {
        self.bits.get(idx).copied().unwrap_or(false)
    }

    /// One `0`/`1` per element, in bit order.
    pub fn as_digits(&self) -> Vec<u8> {
        self.bits.iter().map(|&b| u8::from(b)).collect()
    }
}

pub fn fingerprint(mol: &Molecule, config: &FingerprintConfig) -> Fingerprint {
    let mut bits = vec![false; config.bits];
    if config.bits == 0 {
        return Fingerprint { bits };
    }
    let adj = mol.adjacency();
    let mut path = Vec::with_capacity(config.max_path + 1);
    let mut visited = vec![false; mol.atom_count()];
    for start in 0..mol.atom_count() {
        path.push(start);
        visited[start] = true;
        extend_paths(mol, &adj, config, &mut path, &mut visited, &mut bits);
        visited[start] = false;
        path.pop();
    }
    Fingerprint { bits }
}

fn extend_paths(
    mol: &Molecule,
    adj: &[Vec<(usize, usize)>],
    config: &FingerprintConfig,
    path: &mut Vec<usize>,
    visited: &mut [bool],
    bits: &mut [bool],
) {
    let bonds = path.len() - 1;
    if bonds >= config.min_path.max(1) {
        let idx = (path_hash(mol, path) % bits.len() as u64) as usize;
        bits[idx] = true;
    }
    if bonds >= config.max_path {
        return;
    }
    let Some(&tail) = path.last() else {
        return;
    };
    for &(next, _) in &adj[tail] {
        if visited[next] {
            continue;
        }
        visited[next] = true;
        path.push(next);
        extend_paths(mol, adj, config, path, visited, bits);
        path.pop();
        visited[next] = false;
    }
}

fn atom_key(mol: &Molecule, atom: usize) -> u64 {
    let a = &mol.atoms[atom];
    (u64::from(a.element.atomic_number()) << 8) | (u64::from(a.aromatic) << 7)
}

fn bond_key(mol: &Molecule, a: usize, b: usize) -> u64 {
    mol.bond_between(a, b)
        .map(|bond| (bond.order.value() * 2.0) as u64)
        .unwrap_or(0)
}

fn encode<I: Iterator<Item = usize>>(mol: &Molecule, atoms: I) -> Vec<u64> {
    let order: Vec<usize> = atoms.collect();
    let mut key = Vec::with_capacity(order.len() * 2);
    for (k, &atom) in order.iter().enumerate() {
        if k > 0 {
            key.push(bond_key(mol, order[k - 1], atom));
        }
        key.push(atom_key(mol, atom));
    }
    key
}

fn path_hash(mol: &Molecule, path: &[usize]) -> u64 {
    let forward = encode(mol, path.iter().copied());
    let backward = encode(mol, path.iter().rev().copied());
    let key = forward.min(backward);
    let mut hash = FNV_OFFSET;
    for value in key {
        for byte in value.to_le_bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

#[derive(Debug, Clone)]
pub struct FingerprintFailure {
    pub id: String,
    pub error: ParseError,
    pub report: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintReport {
    pub output_dir: PathBuf,
    pub written: Vec<PathBuf>,
    pub failures: Vec<FingerprintFailure>,
}

/// Writes `<out_dir>/<id>.csv` per record; parse failures leave `<id>_error.txt` instead.
pub fn write_all(
    records: &[StructureRecord],
    out_dir: &Path,
    config: &FingerprintConfig,
    progress: &mut dyn Progress,
) -> Result<FingerprintReport, Error> {
    if config.bits == 0 {
        return Err(Error::ZeroWidth);
    }
    fs::create_dir_all(out_dir).map_err(|source| Error::OutputDir {
        path: out_dir.to_path_buf(),
        source,
    })?;
    info!(count = records.len(), bits = config.bits, "generating fingerprints");

    let mut report = FingerprintReport {
        output_dir: out_dir.to_path_buf(),
        ..Default::default()
    };
    let mut throttle = PercentThrottle::new(progress, records.len());
    for (idx, record) in records.iter().enumerate() {
        match smiles::parse(&record.raw_identifier) {
            Ok(mol) => {
                let fp = fingerprint(&mol, config);
                let path = out_dir.join(format!("{}.csv", record.id));
                column::write_lines(&path, &fp.as_digits())?;
                debug!(id = %record.id, set = fp.count_ones(), "fingerprint written");
                report.written.push(path);
            }
            Err(error) => {
                warn!(id = %record.id, identifier = %record.raw_identifier, "fingerprint failed: {error}");
                let path = out_dir.join(format!("{}_error.txt", record.id));
                fs::write(&path, format!("Error processing {}: {error}", record.id))
                    .map_err(|e| crate::io::Error::file(&path, e))?;
                report.failures.push(FingerprintFailure {
                    id: record.id.clone(),
                    error,
                    report: path,
                });
            }
        }
        throttle.tick(idx + 1);
    }
    throttle.finish();
    info!(
        written = report.written.len(),
        failed = report.failures.len(),
        "fingerprints finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::TempDir;

    fn fp(smiles: &str) -> Fingerprint {
        fingerprint(&smiles::parse(smiles).unwrap(), &FingerprintConfig::default())
    }

    #[test]
    fn width_matches_configuration() {
        let config = FingerprintConfig {
            bits: 64,
            ..Default::default()
        };
        let fp = fingerprint(&smiles::parse("CCO").unwrap(), &config);
        assert_eq!(fp.len(), 64);
        assert!(fp.count_ones() > 0);
    }

    #[test]
    fn identical_structures_share_fingerprints_regardless_of_atom_order() {
        assert_eq!(fp("OCC"), fp("CCO"));
        assert_eq!(fp("c1ccccc1O"), fp("Oc1ccccc1"));
    }

    #[test]
    fn different_structures_differ() {
        assert_ne!(fp("CCO"), fp("CCN"));
        assert_ne!(fp("CC=O"), fp("CCO"));
    }

    #[test]
    fn single_atom_has_no_paths() {
        assert_eq!(fp("C").count_ones(), 0);
    }

    #[test]
    fn ethane_sets_exactly_one_bit() {
        let config = FingerprintConfig::default();
        let fp = fingerprint(&smiles::parse("CC").unwrap(), &config);
        assert_eq!(fp.count_ones(), 1);
    }

    #[test]
    fn path_length_limit_bounds_features() {
        let short = FingerprintConfig {
            max_path: 1,
            ..Default::default()
        };
        let long = FingerprintConfig::default();
        let mol = smiles::parse("CCCCCCCC").unwrap();
        assert!(fingerprint(&mol, &short).count_ones() < fingerprint(&mol, &long).count_ones());
    }

    #[test]
    fn write_all_reports_failures_per_structure() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("fp");
        let records = vec![
            StructureRecord::new("good", "CCO"),
            StructureRecord::new("bad", "C(("),
        ];
        let report = write_all(&records, &out, &FingerprintConfig::default(), &mut NoProgress).unwrap();
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "bad");

        let lines: Vec<String> = fs::read_to_string(out.join("good.csv"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines.len(), 2048);
        assert!(lines.iter().all(|l| l == "0" || l == "1"));
        assert!(out.join("bad_error.txt").exists());
        assert!(!out.join("bad.csv").exists());
    }

    #[test]
    fn zero_width_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = FingerprintConfig {
            bits: 0,
            ..Default::default()
        };
        assert!(matches!(
            write_all(&[], dir.path(), &config, &mut NoProgress),
            Err(Error::ZeroWidth)
        ));
    }
}
