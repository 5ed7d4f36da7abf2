//! Timing and throughput measurements for window jobs.

use serde::Serialize;
use std::time::Duration;

/// Timings of one window job, or the sum over several jobs.
///
/// # Example
///
/// ```ignore
/// let (output, timings) = job.run(&cancel)?;
/// println!("{} items at {:.0} items/s", timings.input_items, timings.items_per_second());
/// ```
#[derive(Debug, Default, Clone)]
pub struct JobTimings {
    /// Wall time of the whole job.
    pub total: Duration,

    /// Wall time of each clustering round, in round order.
    pub rounds: Vec<Duration>,

    /// Items read in the first round.
    pub input_items: usize,

    /// Oracle calls over all rounds.
    pub comparisons: usize,
}

impl JobTimings {
    pub fn items_per_second(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs > 0.0 {
            self.input_items as f64 / secs
        } else {
            0.0
        }
    }
}

impl Serialize for JobTimings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let round_ms: Vec<u128> = self.rounds.iter().map(|d| d.as_millis()).collect();
        let mut state = serializer.serialize_struct("JobTimings", 5)?;
        state.serialize_field("total_ms", &self.total.as_millis())?;
        state.serialize_field("round_ms", &round_ms)?;
        state.serialize_field("input_items", &self.input_items)?;
        state.serialize_field("comparisons", &self.comparisons)?;
        state.serialize_field("items_per_second", &self.items_per_second())?;
        state.end()
    }
}

impl std::ops::AddAssign for JobTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        if self.rounds.len() < rhs.rounds.len() {
            self.rounds.resize(rhs.rounds.len(), Duration::ZERO);
        }
        for (acc, d) in self.rounds.iter_mut().zip(rhs.rounds) {
            *acc += d;
        }
        self.input_items += rhs.input_items;
        self.comparisons += rhs.comparisons;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_serialize() {
        let mut acc = JobTimings::default();
        acc += JobTimings {
            total: Duration::from_millis(500),
            rounds: vec![Duration::from_millis(300), Duration::from_millis(200)],
            input_items: 100,
            comparisons: 40,
        };
        acc += JobTimings {
            total: Duration::from_millis(500),
            rounds: vec![Duration::from_millis(100)],
            input_items: 50,
            comparisons: 10,
        };
        assert_eq!(acc.rounds, vec![Duration::from_millis(400), Duration::from_millis(200)]);
        assert_eq!(acc.input_items, 150);
        assert!((acc.items_per_second() - 150.0).abs() < 1e-9);

        let json = serde_json::to_value(&acc).unwrap();
        assert_eq!(json["total_ms"], 1000);
        assert_eq!(json["round_ms"][0], 400);
    }
}
