//! Result Aggregator
//!
//! Reduces a conversation's evaluation records to one `SummaryRecord`.

use crate::error::{CounselError, Result};
use crate::scoring::{EvaluationRecord, ScoreVector};
use serde::{Deserialize, Serialize};

/// File-level statistics over all scored utterances of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub source_id: String,
    pub turn_count: usize,
    pub overall_average: f64,
    pub per_dimension_average: ScoreVector,
}

/// Summarizes `records`, rounding averages to `precision` decimal places.
///
/// Returns `CounselError::EmptyResult` when there is nothing to summarize.
/// The result depends only on the records, so repeated calls are identical.
pub fn aggregate(
    source_id: &str,
    records: &[EvaluationRecord],
    precision: u32,
) -> Result<SummaryRecord> {
    let first = records.first().ok_or(CounselError::EmptyResult)?;
    let count = records.len() as f64;

    let mut totals = vec![0.0; first.scores.len()];
    for record in records {
        for (total, score) in totals.iter_mut().zip(record.scores.values()) {
            *total += score;
        }
    }
    let per_dimension_average = totals
        .into_iter()
        .map(|total| round_to(total / count, precision))
        .collect();

    let overall = records.iter().map(|r| r.turn_average).sum::<f64>() / count;

    Ok(SummaryRecord {
        source_id: source_id.to_string(),
        turn_count: records.len(),
        overall_average: round_to(overall, precision),
        per_dimension_average: ScoreVector::new(per_dimension_average),
    })
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(index: usize, scores: &[f64]) -> EvaluationRecord {
        EvaluationRecord::new(index, "reply", ScoreVector::new(scores.to_vec()))
    }

    #[test]
    fn test_empty_records() {
        assert!(matches!(
            aggregate("a.json", &[], 4),
            Err(CounselError::EmptyResult)
        ));
    }

    #[test]
    fn test_per_dimension_means() {
        let records = vec![
            record(1, &[1.0, 2.0, 1.5, 3.0, 0.0, 2.0, 2.0]),
            record(3, &[2.0, 2.0, 2.5, 3.0, 1.0, 2.0, 3.0]),
            record(5, &[3.0, 0.5, 2.0, 3.0, 0.5, 1.0, 2.5]),
        ];
        let summary = aggregate("a.json", &records, 4).unwrap();

        assert_eq!(summary.source_id, "a.json");
        assert_eq!(summary.turn_count, 3);
        for d in 0..7 {
            let mean = records.iter().map(|r| r.scores.values()[d]).sum::<f64>() / 3.0;
            assert_relative_eq!(
                summary.per_dimension_average.values()[d],
                mean,
                epsilon = 1e-4
            );
        }
        let overall = records.iter().map(|r| r.turn_average).sum::<f64>() / 3.0;
        assert_relative_eq!(summary.overall_average, overall, epsilon = 1e-4);
    }

    #[test]
    fn test_rounding_and_idempotence() {
        let records = vec![record(1, &[1.0, 2.0, 1.5, 3.0, 0.0, 2.0, 2.0])];
        let first = aggregate("a.json", &records, 4).unwrap();
        let second = aggregate("a.json", &records, 4).unwrap();

        assert_eq!(first.overall_average, 1.6429);
        assert_eq!(
            first.overall_average.to_bits(),
            second.overall_average.to_bits()
        );
        assert_eq!(first, second);
    }
}
