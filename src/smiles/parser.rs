use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::{
    atom::{Atom, Chirality},
    molecule::{Bond, BondStereo, Molecule},
    types::{BondOrder, Element},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unknown element '{symbol}' at position {pos}")]
    InvalidElement { symbol: String, pos: usize },

    #[error("bracket atom opened at position {pos} is never closed")]
    UnterminatedBracket { pos: usize },

    #[error("ring bond {label} opened at position {pos} is never closed")]
    UnclosedRing { label: u16, pos: usize },

    #[error("ring bond {label} closed at position {pos} with a conflicting bond order")]
    RingBondConflict { label: u16, pos: usize },

    #[error("ring bond {label} at position {pos} would bond an atom to itself")]
    SelfBond { label: u16, pos: usize },

    #[error("unbalanced branch at position {pos}")]
    UnbalancedBranch { pos: usize },

    #[error("bond at position {pos} has no partner atom")]
    DanglingBond { pos: usize },

    #[error("charge at position {pos} is outside -15..=+15")]
    ChargeOutOfRange { pos: usize },
}

const MAX_CHARGE: i8 = 15;

/// Tetrahedral, allene, square-planar, trigonal-bipyramidal and octahedral classes.
const CHIRAL_CLASSES: [&str; 5] = ["TH", "AL", "SP", "TB", "OH"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BondSpec {
    order: BondOrder,
    stereo: BondStereo,
}

#[derive(Debug, Clone, Copy)]
struct RingOpen {
    atom: usize,
    bond: Option<BondSpec>,
    pos: usize,
}

/// Parses a SMILES string. Parsing stops at the first whitespace character.
pub fn parse(input: &str) -> Result<Molecule, ParseError> {
    let mut parser = Parser::new(input);
    parser.run()?;
    Ok(parser.finish())
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    mol: Molecule,
    prev: Option<usize>,
    pending: Option<(BondSpec, usize)>,
    branches: Vec<(Option<usize>, usize)>,
    rings: BTreeMap<u16, RingOpen>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            mol: Molecule::new(),
            prev: None,
            pending: None,
            branches: Vec::new(),
            rings: BTreeMap::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                break;
            }
            let start = self.pos;
            match ch {
                '(' => {
                    self.bump();
                    if self.prev.is_none() || self.pending.is_some() {
                        return Err(ParseError::UnbalancedBranch { pos: start });
                    }
                    self.branches.push((self.prev, start));
                }
                ')' => {
                    self.bump();
                    if let Some((_, pos)) = self.pending {
                        return Err(ParseError::DanglingBond { pos });
                    }
                    let (prev, _) = self
                        .branches
                        .pop()
                        .ok_or(ParseError::UnbalancedBranch { pos: start })?;
                    self.prev = prev;
                }
                '-' | '=' | '#' | '$' | ':' | '/' | '\\' => {
                    self.bump();
                    if self.prev.is_none() || self.pending.is_some() {
                        return Err(ParseError::DanglingBond { pos: start });
                    }
                    self.pending = Some((bond_spec(ch), start));
                }
                '.' => {
                    self.bump();
                    if let Some((_, pos)) = self.pending {
                        return Err(ParseError::DanglingBond { pos });
                    }
                    self.prev = None;
                }
                '0'..='9' | '%' => self.ring_bond(start)?,
                '[' => {
                    let atom = self.bracket_atom(start)?;
                    self.add_atom(atom);
                }
                _ => {
                    let atom = self.organic_atom(start)?;
                    self.add_atom(atom);
                }
            }
        }

        if let Some((_, pos)) = self.pending {
            return Err(ParseError::DanglingBond { pos });
        }
        if let Some(&(_, pos)) = self.branches.last() {
            return Err(ParseError::UnbalancedBranch { pos });
        }
        if let Some(open) = self.rings.iter().min_by_key(|(_, open)| open.pos) {
            return Err(ParseError::UnclosedRing {
                label: *open.0,
                pos: open.1.pos,
            });
        }
        Ok(())
    }

    fn add_atom(&mut self, atom: Atom) {
        self.mol.atoms.push(atom);
        let idx = self.mol.atoms.len() - 1;
        if let Some(prev) = self.prev {
            let spec = self.pending.take().map(|(spec, _)| spec);
            let bond = self.make_bond(prev, idx, spec);
            self.mol.bonds.push(bond);
        }
        self.prev = Some(idx);
    }

    fn make_bond(&self, a: usize, b: usize, spec: Option<BondSpec>) -> Bond {
        let spec = spec.unwrap_or_else(|| BondSpec {
            order: if self.mol.atoms[a].aromatic && self.mol.atoms[b].aromatic {
                BondOrder::Aromatic
            } else {
                BondOrder::Single
            },
            stereo: BondStereo::None,
        });
        Bond {
            i: a,
            j: b,
            order: spec.order,
            stereo: spec.stereo,
        }
    }

    fn ring_bond(&mut self, start: usize) -> Result<(), ParseError> {
        let label = self.ring_label(start)?;
        let Some(atom) = self.prev else {
            return Err(ParseError::UnexpectedChar {
                ch: self.src[start..].chars().next().unwrap_or('?'),
                pos: start,
            });
        };
        let spec = self.pending.take().map(|(spec, _)| spec);

        match self.rings.remove(&label) {
            Some(open) => {
                if open.atom == atom {
                    return Err(ParseError::SelfBond { label, pos: start });
                }
                let spec = match (open.bond, spec) {
                    (Some(a), Some(b)) if a.order != b.order => {
                        return Err(ParseError::RingBondConflict { label, pos: start });
                    }
                    (Some(a), _) => Some(a),
                    (None, b) => b,
                };
                let bond = self.make_bond(open.atom, atom, spec);
                self.mol.bonds.push(bond);
            }
            None => {
                self.rings.insert(
                    label,
                    RingOpen {
                        atom,
                        bond: spec,
                        pos: start,
                    },
                );
            }
        }
        Ok(())
    }

    fn ring_label(&mut self, start: usize) -> Result<u16, ParseError> {
        match self.bump() {
            Some('%') => {
                let mut label = 0u16;
                for _ in 0..2 {
                    match self.bump() {
                        Some(d @ '0'..='9') => label = label * 10 + d.to_digit(10).unwrap_or(0) as u16,
                        Some(ch) => {
                            return Err(ParseError::UnexpectedChar {
                                ch,
                                pos: self.pos - ch.len_utf8(),
                            });
                        }
                        None => return Err(ParseError::UnexpectedChar { ch: '%', pos: start }),
                    }
                }
                Ok(label)
            }
            Some(d) => Ok(d.to_digit(10).unwrap_or(0) as u16),
            None => Err(ParseError::UnexpectedChar { ch: '%', pos: start }),
        }
    }

    fn organic_atom(&mut self, start: usize) -> Result<Atom, ParseError> {
        let ch = self.peek().unwrap_or(' ');
        let next = self.peek_at(1);
        let (symbol, aromatic, len) = match (ch, next) {
            ('C', Some('l')) => ("Cl", false, 2),
            ('B', Some('r')) => ("Br", false, 2),
            ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I', _) => (&self.src[start..start + 1], false, 1),
            ('b' | 'c' | 'n' | 'o' | 'p' | 's', _) => (&self.src[start..start + 1], true, 1),
            _ => return Err(ParseError::UnexpectedChar { ch, pos: start }),
        };
        let element = if aromatic {
            element_for(&capitalize(symbol), start)?
        } else {
            element_for(symbol, start)?
        };
        self.pos += len;
        let mut atom = Atom::new(element);
        atom.aromatic = aromatic;
        Ok(atom)
    }

    fn bracket_atom(&mut self, start: usize) -> Result<Atom, ParseError> {
        let close = self.src[start..]
            .find(']')
            .map(|off| start + off)
            .ok_or(ParseError::UnterminatedBracket { pos: start })?;
        self.bump();

        let mut isotope = 0u32;
        let mut has_isotope = false;
        while let Some(d @ '0'..='9') = self.peek() {
            isotope = isotope.saturating_mul(10).saturating_add(d.to_digit(10).unwrap_or(0));
            has_isotope = true;
            self.bump();
        }

        let (element, aromatic) = self.bracket_symbol()?;
        let mut atom = Atom::new(element);
        atom.aromatic = aromatic;
        atom.bracket = true;
        atom.isotope = has_isotope.then(|| u16::try_from(isotope).unwrap_or(u16::MAX));

        if self.peek() == Some('@') {
            self.bump();
            atom.chirality = Chirality::CounterClockwise;
            if self.peek() == Some('@') {
                self.bump();
                atom.chirality = Chirality::Clockwise;
            } else if self.chiral_class() {
                atom.chirality = Chirality::Other;
            }
        }

        if self.peek() == Some('H') {
            self.bump();
            atom.hydrogens = 1;
            if let Some(d @ '0'..='9') = self.peek() {
                atom.hydrogens = d.to_digit(10).unwrap_or(1) as u8;
                self.bump();
            }
        }

        if let Some(sign @ ('+' | '-')) = self.peek() {
            let charge_pos = self.pos;
            self.bump();
            let unit: i8 = if sign == '+' { 1 } else { -1 };
            let mut magnitude: i8 = 1;
            if let Some(d @ '0'..='9') = self.peek() {
                magnitude = d.to_digit(10).unwrap_or(1) as i8;
                self.bump();
                if let Some(d2 @ '0'..='9') = self.peek() {
                    magnitude = magnitude * 10 + d2.to_digit(10).unwrap_or(0) as i8;
                    self.bump();
                }
            } else {
                while self.peek() == Some(sign) {
                    magnitude = magnitude.saturating_add(1);
                    self.bump();
                }
            }
            if magnitude > MAX_CHARGE {
                return Err(ParseError::ChargeOutOfRange { pos: charge_pos });
            }
            atom.charge = unit * magnitude;
        }

        if self.peek() == Some(':') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }

        if self.pos != close {
            let ch = self.peek().unwrap_or(']');
            return Err(ParseError::UnexpectedChar { ch, pos: self.pos });
        }
        self.bump();
        Ok(atom)
    }

    /// Consumes a chirality class such as `TH1` or `OH12` after `@`. A bare
    /// `H` is the hydrogen count and is left in place.
    fn chiral_class(&mut self) -> bool {
        let rest = &self.src[self.pos..];
        let is_class = CHIRAL_CLASSES.iter().any(|class| rest.starts_with(class))
            && rest[2..].starts_with(|c: char| c.is_ascii_digit());
        if !is_class {
            return false;
        }
        self.pos += 2;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        true
    }

    fn bracket_symbol(&mut self) -> Result<(Element, bool), ParseError> {
        let start = self.pos;
        let rest = &self.src[start..];
        for aromatic in ["se", "as", "te"] {
            if rest.starts_with(aromatic) {
                self.pos += 2;
                return Ok((element_for(&capitalize(aromatic), start)?, true));
            }
        }
        match self.peek() {
            Some(c @ ('b' | 'c' | 'n' | 'o' | 'p' | 's')) => {
                self.bump();
                Ok((element_for(&c.to_ascii_uppercase().to_string(), start)?, true))
            }
            Some(c) if c.is_ascii_uppercase() => {
                let two_letter = rest
                    .get(..2)
                    .filter(|two| two.chars().nth(1).is_some_and(|l| l.is_ascii_lowercase()))
                    .and_then(|two| two.parse::<Element>().ok());
                if let Some(element) = two_letter {
                    self.pos += 2;
                    return Ok((element, false));
                }
                self.bump();
                Ok((element_for(&c.to_string(), start)?, false))
            }
            Some(ch) => Err(ParseError::UnexpectedChar { ch, pos: start }),
            None => Err(ParseError::UnterminatedBracket { pos: start }),
        }
    }

    fn finish(mut self) -> Molecule {
        for i in 0..self.mol.atoms.len() {
            if !self.mol.atoms[i].bracket {
                self.mol.atoms[i].hydrogens = self.mol.implied_hydrogens(i);
            }
        }
        for i in 0..self.mol.atoms.len() {
            if self.mol.atoms[i].bracket {
                self.mol.atoms[i].radical_electrons = self.mol.implied_radicals(i);
            }
        }
        self.mol
    }
}

fn bond_spec(ch: char) -> BondSpec {
    let (order, stereo) = match ch {
        '=' => (BondOrder::Double, BondStereo::None),
        '#' => (BondOrder::Triple, BondStereo::None),
        '$' => (BondOrder::Quadruple, BondStereo::None),
        ':' => (BondOrder::Aromatic, BondStereo::None),
        '/' => (BondOrder::Single, BondStereo::Up),
        '\\' => (BondOrder::Single, BondStereo::Down),
        _ => (BondOrder::Single, BondStereo::None),
    };
    BondSpec { order, stereo }
}

fn element_for(symbol: &str, pos: usize) -> Result<Element, ParseError> {
    symbol
        .parse::<Element>()
        .map_err(|_| ParseError::InvalidElement {
            symbol: symbol.to_string(),
            pos,
        })
}

fn capitalize(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
