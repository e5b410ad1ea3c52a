use std::fmt;

use crate::bucket::SpectralWindow;

/// Nucleus observed by a simulated spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nucleus {
    Proton,
    Carbon,
}

impl Nucleus {
    pub fn tag(&self) -> &'static str {
        match self {
            Nucleus::Proton => "1H",
            Nucleus::Carbon => "13C",
        }
    }

    pub fn window(&self) -> SpectralWindow {
        match self {
            Nucleus::Proton => SpectralWindow::PROTON,
            Nucleus::Carbon => SpectralWindow::CARBON,
        }
    }

    /// Column prefix used when the two spectra are concatenated.
    pub fn hybrid_prefix(&self) -> &'static str {
        match self {
            Nucleus::Proton => "H",
            Nucleus::Carbon => "C",
        }
    }
}

impl fmt::Display for Nucleus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Feature-generation mode selected for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// Histogram of predicted ¹H shifts.
    Proton,
    /// Histogram of predicted ¹³C shifts.
    Carbon,
    /// Hashed path fingerprint computed from the identifier.
    Fingerprint,
    /// ¹H and ¹³C histograms concatenated column-wise.
    Hybrid,
}

impl Representation {
    pub fn tag(&self) -> &'static str {
        match self {
            Representation::Proton => "1H",
            Representation::Carbon => "13C",
            Representation::Fingerprint => "FP",
            Representation::Hybrid => "hybrid",
        }
    }

    pub fn nucleus(&self) -> Option<Nucleus> {
        match self {
            Representation::Proton => Some(Nucleus::Proton),
            Representation::Carbon => Some(Nucleus::Carbon),
            Representation::Fingerprint | Representation::Hybrid => None,
        }
    }

    /// Spectra whose full stage sequence this representation runs.
    pub fn spectra(&self) -> &'static [Nucleus] {
        match self {
            Representation::Proton => &[Nucleus::Proton],
            Representation::Carbon => &[Nucleus::Carbon],
            Representation::Fingerprint => &[],
            Representation::Hybrid => &[Nucleus::Proton, Nucleus::Carbon],
        }
    }

    pub fn needs_geometry(&self) -> bool {
        !self.spectra().is_empty()
    }
}

impl From<Nucleus> for Representation {
    fn from(nucleus: Nucleus) -> Self {
        match nucleus {
            Nucleus::Proton => Representation::Proton,
            Nucleus::Carbon => Representation::Carbon,
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
