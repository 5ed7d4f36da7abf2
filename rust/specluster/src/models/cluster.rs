use super::spectrum::{
    Peak,
    Spectrum,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeSet;

/// How consensus spectra are built when clusters absorb each other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSettings {
    /// Peaks closer than this (in m/z) are combined into one consensus peak.
    pub fragment_tolerance: f64,
    /// The consensus keeps only the most intense peaks.
    pub max_peaks: usize,
    /// Keep every member's own peak list next to the consensus.
    /// When disabled only the member ids are kept.
    pub store_member_peaks: bool,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            fragment_tolerance: 0.5,
            max_peaks: 100,
            store_member_peaks: false,
        }
    }
}

/// The peak list of one member, kept only when member peaks are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPeaks {
    pub id: String,
    pub peaks: Vec<Peak>,
}

/// A group of spectra believed to come from the same peptide.
///
/// A cluster only changes through [`Cluster::absorb`]; once written to a
/// window file it is treated as immutable.
/// `member_count` always equals the number of member ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    id: String,
    precursor_mass: f64,
    member_ids: BTreeSet<String>,
    /// Precursor mass of every member, in `member_ids` order. Empty for
    /// clusters read from streams that did not record them.
    #[serde(default)]
    member_masses: Vec<f64>,
    member_count: usize,
    /// Members carrying a peptide identification.
    identified_ids: BTreeSet<String>,
    consensus: Vec<Peak>,
    #[serde(default)]
    member_peaks: Vec<MemberPeaks>,
}

impl Cluster {
    /// A cluster holding exactly one spectrum. Its id is the spectrum id.
    pub fn singleton(spectrum: &Spectrum, settings: &ConsensusSettings) -> Self {
        let mut consensus: Vec<Peak> = spectrum
            .peaks
            .iter()
            .copied()
            .filter(|p| p.mz.is_finite() && p.intensity.is_finite())
            .collect();
        retain_most_intense(&mut consensus, settings.max_peaks);

        let member_peaks = if settings.store_member_peaks {
            vec![MemberPeaks {
                id: spectrum.id.clone(),
                peaks: spectrum.peaks.clone(),
            }]
        } else {
            Vec::new()
        };

        Self {
            id: spectrum.id.clone(),
            precursor_mass: spectrum.precursor_mz,
            member_ids: BTreeSet::from([spectrum.id.clone()]),
            member_masses: vec![spectrum.precursor_mz],
            member_count: 1,
            identified_ids: if spectrum.identification.is_some() {
                BTreeSet::from([spectrum.id.clone()])
            } else {
                BTreeSet::new()
            },
            consensus,
            member_peaks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn precursor_mass(&self) -> f64 {
        self.precursor_mass
    }

    pub fn member_ids(&self) -> &BTreeSet<String> {
        &self.member_ids
    }

    pub fn member_count(&self) -> usize {
        self.member_count
    }

    pub fn identified_count(&self) -> usize {
        self.identified_ids.len()
    }

    pub fn consensus(&self) -> &[Peak] {
        &self.consensus
    }

    pub fn member_peaks(&self) -> &[MemberPeaks] {
        &self.member_peaks
    }

    /// Member id used to key comparisons that should outlive later merges.
    pub fn anchor_id(&self) -> &str {
        self.member_ids
            .iter()
            .next()
            .map(|x| x.as_str())
            .unwrap_or(self.id.as_str())
    }

    pub fn contains_member(&self, id: &str) -> bool {
        self.member_ids.contains(id)
    }

    /// Merges `other` into this cluster.
    ///
    /// The precursor mass stays the mean over the distinct members and the
    /// consensus peaks are combined weighted by member counts. Members
    /// already in this cluster are not counted a second time, so absorbing
    /// a subset changes nothing but the identifications. This cluster keeps
    /// its id.
    pub fn absorb(&mut self, mut other: Cluster, settings: &ConsensusSettings) {
        let added = other
            .member_ids
            .iter()
            .filter(|id| !self.member_ids.contains(id.as_str()))
            .count();
        self.identified_ids.extend(std::mem::take(&mut other.identified_ids));
        if added == 0 {
            return;
        }
        let overlaps = added < other.member_ids.len();

        let self_weight = self.member_count.max(1) as f64;
        let other_weight = added as f64;
        let total = self_weight + other_weight;

        let member_masses = if self.has_member_masses() && other.has_member_masses() {
            merge_member_masses(
                &self.member_ids,
                &self.member_masses,
                &other.member_ids,
                &other.member_masses,
            )
        } else {
            Vec::new()
        };
        self.precursor_mass = if overlaps && !member_masses.is_empty() {
            member_masses.iter().sum::<f64>() / member_masses.len() as f64
        } else {
            // Without member masses, shared members are taken to sit at the
            // mean of `other`.
            (self.precursor_mass * self_weight + other.precursor_mass * other_weight) / total
        };
        self.consensus = merge_consensus(
            &self.consensus,
            self_weight,
            &other.consensus,
            other_weight,
            settings,
        );

        if settings.store_member_peaks {
            let new_peaks: Vec<MemberPeaks> = other
                .member_peaks
                .into_iter()
                .filter(|p| !self.member_ids.contains(&p.id))
                .collect();
            self.member_peaks.extend(new_peaks);
        } else {
            self.member_peaks.clear();
        }
        self.member_ids.extend(other.member_ids);
        self.member_masses = member_masses;
        self.member_count = self.member_ids.len();
    }

    fn has_member_masses(&self) -> bool {
        self.member_masses.len() == self.member_ids.len()
    }

    /// m/z values of the `n` most intense consensus peaks.
    pub fn major_peaks(&self, n: usize) -> Vec<f64> {
        let mut peaks = self.consensus.clone();
        peaks.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
        peaks.into_iter().take(n).map(|p| p.mz).collect()
    }

    /// True when any of the top `n` peaks of both clusters are within `tolerance`.
    pub fn shares_major_peak(&self, other: &Cluster, n: usize, tolerance: f64) -> bool {
        let ours = self.major_peaks(n);
        let theirs = other.major_peaks(n);
        ours.iter()
            .any(|a| theirs.iter().any(|b| (a - b).abs() <= tolerance))
    }
}

/// Keeps the `max_peaks` most intense peaks and leaves them sorted by m/z.
fn retain_most_intense(peaks: &mut Vec<Peak>, max_peaks: usize) {
    if peaks.len() > max_peaks {
        peaks.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
        peaks.truncate(max_peaks);
    }
    peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
}

fn merge_consensus(
    left: &[Peak],
    left_weight: f64,
    right: &[Peak],
    right_weight: f64,
    settings: &ConsensusSettings,
) -> Vec<Peak> {
    let total = left_weight + right_weight;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut li = 0;
    let mut ri = 0;

    while li < left.len() || ri < right.len() {
        match (left.get(li), right.get(ri)) {
            (Some(l), Some(r)) if (l.mz - r.mz).abs() <= settings.fragment_tolerance => {
                let lw = l.intensity as f64 * left_weight;
                let rw = r.intensity as f64 * right_weight;
                let mz = if lw + rw > 0.0 {
                    (l.mz * lw + r.mz * rw) / (lw + rw)
                } else {
                    (l.mz + r.mz) / 2.0
                };
                out.push(Peak::new(mz, ((lw + rw) / total) as f32));
                li += 1;
                ri += 1;
            }
            (Some(l), Some(r)) if l.mz < r.mz => {
                out.push(scaled(l, left_weight / total));
                li += 1;
            }
            (Some(_), Some(r)) => {
                out.push(scaled(r, right_weight / total));
                ri += 1;
            }
            (Some(l), None) => {
                out.push(scaled(l, left_weight / total));
                li += 1;
            }
            (None, Some(r)) => {
                out.push(scaled(r, right_weight / total));
                ri += 1;
            }
            (None, None) => break,
        }
    }

    retain_most_intense(&mut out, settings.max_peaks);
    out
}

/// Sorted merge of two id aligned mass lists. Shared ids keep the left mass.
fn merge_member_masses(
    left_ids: &BTreeSet<String>,
    left: &[f64],
    right_ids: &BTreeSet<String>,
    right: &[f64],
) -> Vec<f64> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut lhs = left_ids.iter().zip(left.iter()).peekable();
    let mut rhs = right_ids.iter().zip(right.iter()).peekable();
    loop {
        match (lhs.peek(), rhs.peek()) {
            (Some((l_id, l_mass)), Some((r_id, _))) => match l_id.cmp(r_id) {
                std::cmp::Ordering::Less => {
                    out.push(**l_mass);
                    lhs.next();
                }
                std::cmp::Ordering::Greater => {
                    if let Some((_, r_mass)) = rhs.next() {
                        out.push(*r_mass);
                    }
                }
                std::cmp::Ordering::Equal => {
                    out.push(**l_mass);
                    lhs.next();
                    rhs.next();
                }
            },
            (Some((_, l_mass)), None) => {
                out.push(**l_mass);
                lhs.next();
            }
            (None, Some((_, r_mass))) => {
                out.push(**r_mass);
                rhs.next();
            }
            (None, None) => break,
        }
    }
    out
}

fn scaled(peak: &Peak, factor: f64) -> Peak {
    Peak::new(peak.mz, (peak.intensity as f64 * factor) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(id: &str, mz: f64, peaks: &[(f64, f32)]) -> Spectrum {
        Spectrum::new(
            id,
            mz,
            peaks.iter().map(|&(m, i)| Peak::new(m, i)).collect(),
        )
    }

    #[test]
    fn test_absorb_updates_mass_and_members() {
        let settings = ConsensusSettings::default();
        let mut a = Cluster::singleton(&spectrum("a", 100.0, &[(200.0, 10.0)]), &settings);
        let b = Cluster::singleton(&spectrum("b", 100.3, &[(200.2, 10.0)]), &settings);
        let c = Cluster::singleton(&spectrum("c", 100.6, &[(300.0, 4.0)]), &settings);

        a.absorb(b, &settings);
        assert_eq!(a.id(), "a");
        assert_eq!(a.member_count(), 2);
        assert!((a.precursor_mass() - 100.15).abs() < 1e-9);
        assert_eq!(a.consensus().len(), 1);

        a.absorb(c, &settings);
        assert_eq!(a.member_count(), 3);
        assert_eq!(a.member_count(), a.member_ids().len());
        // (100.15 * 2 + 100.6) / 3
        assert!((a.precursor_mass() - 100.3).abs() < 1e-9);
        assert_eq!(a.consensus().len(), 2);
        assert!(a.consensus().windows(2).all(|w| w[0].mz <= w[1].mz));
    }

    #[test]
    fn test_absorbing_overlapping_members_counts_them_once() {
        let settings = ConsensusSettings::default();
        let single = |id: &str, mz: f64| Cluster::singleton(&spectrum(id, mz, &[(200.0, 10.0)]), &settings);
        let mut a = single("s1", 100.0);
        a.absorb(single("s2", 102.0), &settings);
        let mut b = single("s1", 100.0);
        b.absorb(single("s3", 104.0), &settings);

        a.absorb(b, &settings);
        assert_eq!(a.member_count(), 3);
        assert!((a.precursor_mass() - 102.0).abs() < 1e-9);

        // A subset adds nothing.
        let before = a.clone();
        a.absorb(single("s2", 102.0), &settings);
        assert_eq!(a, before);
    }

    #[test]
    fn test_member_peaks_elision_keeps_ids() {
        let settings = ConsensusSettings::default();
        let mut a = Cluster::singleton(&spectrum("a", 100.0, &[(200.0, 10.0)]), &settings);
        let b = Cluster::singleton(&spectrum("b", 100.1, &[(210.0, 10.0)]), &settings);
        a.absorb(b, &settings);
        assert!(a.member_peaks().is_empty());
        assert!(a.contains_member("a") && a.contains_member("b"));

        let keep = ConsensusSettings {
            store_member_peaks: true,
            ..settings
        };
        let mut a = Cluster::singleton(&spectrum("a", 100.0, &[(200.0, 10.0)]), &keep);
        let b = Cluster::singleton(&spectrum("b", 100.1, &[(210.0, 10.0)]), &keep);
        a.absorb(b, &keep);
        assert_eq!(a.member_peaks().len(), 2);
    }

    #[test]
    fn test_consensus_is_capped() {
        let settings = ConsensusSettings {
            max_peaks: 2,
            ..Default::default()
        };
        let c = Cluster::singleton(
            &spectrum("a", 100.0, &[(100.0, 1.0), (200.0, 5.0), (300.0, 3.0)]),
            &settings,
        );
        let mzs: Vec<f64> = c.consensus().iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![200.0, 300.0]);
    }

    #[test]
    fn test_shares_major_peak() {
        let settings = ConsensusSettings::default();
        let a = Cluster::singleton(
            &spectrum("a", 100.0, &[(100.0, 1.0), (200.0, 50.0), (300.0, 30.0)]),
            &settings,
        );
        let b = Cluster::singleton(
            &spectrum("b", 100.0, &[(100.1, 90.0), (400.0, 1.0)]),
            &settings,
        );
        assert!(a.shares_major_peak(&b, 3, 0.5));
        // 100.0 is not among a's top two peaks.
        assert!(!a.shares_major_peak(&b, 2, 0.5));
    }
}
