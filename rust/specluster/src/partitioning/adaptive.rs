use super::Partitioner;
use crate::models::ItemReference;
use tracing::debug;

/// Multi-level splitting into size-bounded bins.
///
/// Starts from one bin with every item and re-splits any bin holding more
/// than `max_items` with each width in turn (widest first). Bins still over
/// the cap at the narrowest width are returned as they are.
#[derive(Debug, Clone)]
pub struct AdaptivePartitioner {
    widths: Vec<f64>,
    max_items: usize,
}

impl AdaptivePartitioner {
    pub fn new(widths: Vec<f64>, max_items: usize) -> Self {
        Self { widths, max_items }
    }
}

impl Partitioner for AdaptivePartitioner {
    fn partition(&self, items: Vec<ItemReference>) -> Vec<Vec<ItemReference>> {
        if items.is_empty() {
            return Vec::new();
        }
        let mut bins = vec![items];
        for &width in &self.widths {
            let mut next = Vec::with_capacity(bins.len());
            for bin in bins {
                if bin.len() > self.max_items {
                    next.extend(split_bin(bin, width));
                } else {
                    next.push(bin);
                }
            }
            debug!("Partitioning at width {} produced {} bins", width, next.len());
            bins = next;
        }
        bins
    }
}

/// Splits a mass-sorted bin into consecutive `[lo, lo + width)` sub-bins.
///
/// Sub-bins start at `floor(first / width) * width` and continue up to the
/// one holding the last item; empty sub-bins are kept.
fn split_bin(bin: Vec<ItemReference>, width: f64) -> Vec<Vec<ItemReference>> {
    let (first, last) = match (bin.first(), bin.last()) {
        (Some(f), Some(l)) => (f.precursor_mass, l.precursor_mass),
        _ => return vec![bin],
    };
    if !(width > 0.0) || !first.is_finite() || !last.is_finite() || last < first {
        return vec![bin];
    }

    let start = (first / width).floor() * width;
    let n_bins = ((last - start) / width).floor() as usize + 1;
    let mut out: Vec<Vec<ItemReference>> = (0..n_bins).map(|_| Vec::new()).collect();
    for item in bin {
        let idx = ((item.precursor_mass - start) / width).floor().max(0.0) as usize;
        out[idx.min(n_bins - 1)].push(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(masses: &[f64]) -> Vec<ItemReference> {
        masses
            .iter()
            .enumerate()
            .map(|(i, &m)| ItemReference::new(0, i as u64, m, format!("s{}", i)))
            .collect()
    }

    #[test]
    fn test_small_input_stays_in_one_bin() {
        let bins = AdaptivePartitioner::new(vec![25.0, 10.0, 4.0], 10).partition(items(&[400.0]));
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].len(), 1);
    }

    #[test]
    fn test_splits_until_under_cap() {
        // Items at 400-403 and 440 -> first split at 25 separates 440,
        // second split at 10 leaves 400-403 together, then 4 leaves them too.
        let input = items(&[400.0, 401.0, 402.0, 403.0, 440.0]);
        let bins = AdaptivePartitioner::new(vec![25.0, 10.0, 4.0], 2).partition(input.clone());

        let total: usize = bins.iter().map(|b| b.len()).sum();
        assert_eq!(total, input.len());
        // The oversized group cannot be split any further and passes through.
        assert!(bins.iter().any(|b| b.len() == 4));
        let last_nonempty = bins.iter().rev().find(|b| !b.is_empty()).unwrap();
        assert_eq!(last_nonempty[0].precursor_mass, 440.0);
    }

    #[test]
    fn test_split_keeps_empty_sub_bins_and_boundaries() {
        // start = 100, width 4: [100,104) [104,108) [108,112)
        let input = items(&[100.5, 104.0, 111.9]);
        let bins = split_bin(input, 4.0);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0][0].precursor_mass, 100.5);
        assert_eq!(bins[1][0].precursor_mass, 104.0);
        assert_eq!(bins[2][0].precursor_mass, 111.9);

        let bins = split_bin(items(&[100.5, 112.0]), 4.0);
        assert_eq!(bins.len(), 4);
        assert!(bins[1].is_empty() && bins[2].is_empty());
        assert_eq!(bins[3][0].precursor_mass, 112.0);
    }

    #[test]
    fn test_partition_is_complete() {
        let masses: Vec<f64> = (0..500).map(|i| 300.0 + (i as f64) * 0.37).collect();
        let input = items(&masses);
        let bins = AdaptivePartitioner::new(vec![25.0, 10.0, 4.0], 20).partition(input.clone());
        let mut seen: Vec<String> = bins.into_iter().flatten().map(|x| x.stable_id).collect();
        let mut expected: Vec<String> = input.into_iter().map(|x| x.stable_id).collect();
        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
    }
}
