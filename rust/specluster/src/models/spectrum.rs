use serde::{
    Deserialize,
    Serialize,
};

/// A single fragment peak.
///
/// Serialized as a `[mz, intensity]` pair, both in the NDJSON spectra files
/// and inside binary cluster streams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f32)", into = "(f64, f32)")]
pub struct Peak {
    pub mz: f64,
    pub intensity: f32,
}

impl Peak {
    pub fn new(mz: f64, intensity: f32) -> Self {
        Self { mz, intensity }
    }
}

impl From<(f64, f32)> for Peak {
    fn from((mz, intensity): (f64, f32)) -> Self {
        Self { mz, intensity }
    }
}

impl From<Peak> for (f64, f32) {
    fn from(p: Peak) -> Self {
        (p.mz, p.intensity)
    }
}

/// A fragment spectrum as provided by a spectrum source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub id: String,
    pub precursor_mz: f64,
    #[serde(default)]
    pub charge: Option<u8>,
    pub peaks: Vec<Peak>,
    /// Peptide annotation, when the spectrum has been identified.
    #[serde(default)]
    pub identification: Option<String>,
}

impl Spectrum {
    pub fn new(id: impl Into<String>, precursor_mz: f64, peaks: Vec<Peak>) -> Self {
        Self {
            id: id.into(),
            precursor_mz,
            charge: None,
            peaks,
            identification: None,
        }
    }

    pub fn with_identification(mut self, identification: impl Into<String>) -> Self {
        self.identification = Some(identification.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectrum_json_uses_peak_pairs() {
        let line = r#"{"id": "s1", "precursor_mz": 500.25, "peaks": [[100.0, 10.0], [200.5, 3.5]]}"#;
        let spec: Spectrum = serde_json::from_str(line).unwrap();
        assert_eq!(spec.id, "s1");
        assert_eq!(spec.charge, None);
        assert_eq!(spec.identification, None);
        assert_eq!(spec.peaks, vec![Peak::new(100.0, 10.0), Peak::new(200.5, 3.5)]);
    }
}
