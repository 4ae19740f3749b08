use crate::error::SignalRejection;
use crate::models::Pattern;

/// Volume gate applied to every detected pattern before sizing
#[derive(Debug, Clone, PartialEq)]
pub struct SignalValidator {
    pub min_volume: f64,
    pub volume_spike_threshold: f64, // Multiple of average volume
}

impl Default for SignalValidator {
    fn default() -> Self {
        Self {
            min_volume: 50_000.0,
            volume_spike_threshold: 1.5,
        }
    }
}

impl SignalValidator {
    pub fn new(min_volume: f64, volume_spike_threshold: f64) -> Self {
        Self {
            min_volume,
            volume_spike_threshold,
        }
    }

    /// Accept or reject a signal based on the candle volume
    ///
    /// The spike check only applies once an average is known (> 0).
    pub fn validate(
        &self,
        volume: f64,
        average_volume: f64,
        pattern: Pattern,
    ) -> Result<(), SignalRejection> {
        if !volume.is_finite() || !average_volume.is_finite() {
            return Err(SignalRejection::InvalidInput {
                volume,
                average_volume,
            });
        }

        if volume < self.min_volume {
            return Err(SignalRejection::VolumeTooLow {
                volume,
                min_volume: self.min_volume,
            });
        }

        if average_volume > 0.0 {
            let ratio = volume / average_volume;
            if ratio < self.volume_spike_threshold {
                return Err(SignalRejection::WeakVolumeSpike {
                    pattern,
                    ratio,
                    threshold: self.volume_spike_threshold,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_too_low_regardless_of_pattern() {
        let validator = SignalValidator::default();

        for pattern in Pattern::ALL {
            let result = validator.validate(40_000.0, 10_000.0, pattern);
            assert!(matches!(
                result,
                Err(SignalRejection::VolumeTooLow { volume, min_volume })
                    if volume == 40_000.0 && min_volume == 50_000.0
            ));
            assert!(result.unwrap_err().to_string().contains("volume too low"));
        }
    }

    #[test]
    fn test_weak_spike_rejected() {
        let validator = SignalValidator::default();
        let result = validator.validate(60_000.0, 50_000.0, Pattern::Hammer);

        match result {
            Err(SignalRejection::WeakVolumeSpike { ratio, threshold, .. }) => {
                assert!((ratio - 1.2).abs() < 1e-9);
                assert_eq!(threshold, 1.5);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_spike_check_skipped_without_average() {
        let validator = SignalValidator::default();
        assert!(validator.validate(60_000.0, 0.0, Pattern::Hammer).is_ok());
    }

    #[test]
    fn test_strong_spike_accepted() {
        let validator = SignalValidator::default();
        assert!(validator
            .validate(150_000.0, 50_000.0, Pattern::ShootingStar)
            .is_ok());
    }

    #[test]
    fn test_non_finite_input_is_a_rejection() {
        let validator = SignalValidator::default();
        assert!(matches!(
            validator.validate(f64::NAN, 1.0, Pattern::Hammer),
            Err(SignalRejection::InvalidInput { .. })
        ));
        assert!(matches!(
            validator.validate(1e6, f64::INFINITY, Pattern::Hammer),
            Err(SignalRejection::InvalidInput { .. })
        ));
    }
}
