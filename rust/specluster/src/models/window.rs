use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

/// Summary of one persisted, mass-sorted window file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub path: PathBuf,
    pub min_mass: f64,
    pub max_mass: f64,
    pub item_count: usize,
}

impl WindowDescriptor {
    pub fn span(&self) -> f64 {
        self.max_mass - self.min_mass
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}

pub fn sort_by_min_mass(windows: &mut [WindowDescriptor]) {
    windows.sort_by(|a, b| {
        a.min_mass
            .total_cmp(&b.min_mass)
            .then_with(|| a.max_mass.total_cmp(&b.max_mass))
    });
}

/// Half open precursor mass range `[min, max)`. A missing `max` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassRange {
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

impl MassRange {
    pub fn new(min: f64, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: None,
        }
    }

    pub fn contains(&self, mass: f64) -> bool {
        !self.is_below(mass) && !self.is_above(mass)
    }

    pub fn is_below(&self, mass: f64) -> bool {
        mass < self.min
    }

    pub fn is_above(&self, mass: f64) -> bool {
        match self.max {
            Some(max) => mass >= max,
            None => false,
        }
    }
}
