use super::types::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Chirality {
    #[default]
    None,
    CounterClockwise,
    Clockwise,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element: Element,
    pub charge: i8,
    pub isotope: Option<u16>,
    /// Attached hydrogens not present as explicit atoms.
    pub hydrogens: u8,
    pub aromatic: bool,
    pub chirality: Chirality,
    pub radical_electrons: u8,
    /// Written inside brackets in the source identifier.
    pub bracket: bool,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            charge: 0,
            isotope: None,
            hydrogens: 0,
            aromatic: false,
            chirality: Chirality::None,
            radical_electrons: 0,
            bracket: false,
        }
    }

    #[inline]
    pub fn is_heavy(&self) -> bool {
        self.element != Element::H
    }
}
