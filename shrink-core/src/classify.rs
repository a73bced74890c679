use serde::{Deserialize, Serialize};

use crate::domain::Bucket;
use crate::error::{ErrorKind, Result, ShrinkError};

/// Minimum reduction ratio (`1 - result/original`) for each bucket.
/// Anything above zero but below `moderate` is `low`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub excellent: f64,
    pub good: f64,
    pub moderate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            excellent: 0.5,
            good: 0.3,
            moderate: 0.1,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let ordered = self.excellent <= 1.0
            && self.excellent > self.good
            && self.good > self.moderate
            && self.moderate > 0.0;
        if !ordered {
            return Err(ShrinkError::Config(format!(
                "thresholds must satisfy 1 >= excellent > good > moderate > 0, got {}/{}/{}",
                self.excellent, self.good, self.moderate
            )));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub bucket: Bucket,
    pub error_kind: Option<ErrorKind>,
}

/// What the driver observed for one task.
#[derive(Copy, Clone, Debug)]
pub enum Observation {
    Transformed { original: u64, result: u64 },
    Failed { original: u64 },
}

pub fn reduction_ratio(original: u64, result: u64) -> f64 {
    // saved/original keeps exact fractions like 30/100 on the nearest double
    (original as f64 - result as f64) / original as f64
}

pub fn classify(obs: Observation, t: &Thresholds) -> Classification {
    match obs {
        Observation::Transformed { original: 0, .. } | Observation::Failed { original: 0 } => {
            Classification {
                bucket: Bucket::Error,
                error_kind: Some(ErrorKind::EmptyInput),
            }
        }
        Observation::Failed { .. } => Classification {
            bucket: Bucket::Error,
            error_kind: Some(ErrorKind::TransformFailure),
        },
        Observation::Transformed { original, result } => {
            if result >= original {
                return Classification {
                    bucket: Bucket::None,
                    error_kind: Some(ErrorKind::OutputLarger),
                };
            }
            let ratio = reduction_ratio(original, result);
            let bucket = if ratio >= t.excellent {
                Bucket::Excellent
            } else if ratio >= t.good {
                Bucket::Good
            } else if ratio >= t.moderate {
                Bucket::Moderate
            } else {
                Bucket::Low
            };
            Classification {
                bucket,
                error_kind: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(original: u64, result: u64) -> Bucket {
        classify(
            Observation::Transformed { original, result },
            &Thresholds::default(),
        )
        .bucket
    }

    #[test]
    fn exact_boundaries_fall_into_the_higher_bucket() {
        assert_eq!(bucket(200, 100), Bucket::Excellent);
        assert_eq!(bucket(100, 70), Bucket::Good);
        assert_eq!(bucket(1000, 700), Bucket::Good);
        assert_eq!(bucket(100, 90), Bucket::Moderate);
        assert_eq!(bucket(100, 99), Bucket::Low);
        assert_eq!(bucket(100, 51), Bucket::Good);
    }

    #[test]
    fn no_gain_or_growth_is_none() {
        let same = classify(
            Observation::Transformed {
                original: 100,
                result: 100,
            },
            &Thresholds::default(),
        );
        assert_eq!(same.bucket, Bucket::None);
        assert_eq!(same.error_kind, Some(ErrorKind::OutputLarger));
        assert_eq!(bucket(100, 150), Bucket::None);
    }

    #[test]
    fn zero_byte_input_is_empty_input_error() {
        for obs in [
            Observation::Transformed {
                original: 0,
                result: 0,
            },
            Observation::Failed { original: 0 },
        ] {
            let c = classify(obs, &Thresholds::default());
            assert_eq!(c.bucket, Bucket::Error);
            assert_eq!(c.error_kind, Some(ErrorKind::EmptyInput));
        }
    }

    #[test]
    fn failure_is_transform_failure() {
        let c = classify(Observation::Failed { original: 10 }, &Thresholds::default());
        assert_eq!(c.bucket, Bucket::Error);
        assert_eq!(c.error_kind, Some(ErrorKind::TransformFailure));
    }

    #[test]
    fn custom_thresholds_are_honoured_and_validated() {
        let t = Thresholds {
            excellent: 0.8,
            good: 0.6,
            moderate: 0.2,
        };
        assert!(t.validate().is_ok());
        let c = classify(
            Observation::Transformed {
                original: 100,
                result: 50,
            },
            &t,
        );
        assert_eq!(c.bucket, Bucket::Moderate);

        let bad = Thresholds {
            excellent: 0.3,
            good: 0.5,
            moderate: 0.1,
        };
        assert!(bad.validate().is_err());
    }
}
