// SPDX-License-Identifier: GPL-3.0-or-later

/// Fit returned when either duration is unknown.
pub const UNKNOWN_DURATION_FIT: f32 = 0.5;

/// Scores how well two durations agree. Used to tell edition variants
/// ("Radio Edit" vs "Extended Mix") apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationReconciler {
    tolerance_seconds: f64,
}

impl Default for DurationReconciler {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl DurationReconciler {
    /// A non-finite tolerance falls back to the default; a non-positive one
    /// accepts exact matches only.
    pub fn new(tolerance_seconds: f64) -> Self {
        let tolerance_seconds = if tolerance_seconds.is_finite() {
            tolerance_seconds.max(0.0)
        } else {
            10.0
        };
        Self { tolerance_seconds }
    }

    pub fn tolerance_seconds(&self) -> f64 {
        self.tolerance_seconds
    }

    /// `1 - min(1, |delta| / tolerance)`, or 0.5 when either side is unknown.
    pub fn fit(&self, local: Option<f64>, candidate: Option<f64>) -> f32 {
        let (Some(local), Some(candidate)) = (usable(local), usable(candidate)) else {
            return UNKNOWN_DURATION_FIT;
        };

        let delta = (local - candidate).abs();
        if self.tolerance_seconds <= 0.0 {
            return if delta == 0.0 { 1.0 } else { 0.0 };
        }

        (1.0 - (delta / self.tolerance_seconds).min(1.0)) as f32
    }
}

fn usable(seconds: Option<f64>) -> Option<f64> {
    seconds.filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_out_of_tolerance() {
        let reconciler = DurationReconciler::default();
        assert_eq!(reconciler.fit(Some(120.0), Some(120.0)), 1.0);
        assert_eq!(reconciler.fit(Some(120.0), Some(130.0)), 0.0);
        assert_eq!(reconciler.fit(Some(120.0), Some(400.0)), 0.0);
        assert!((reconciler.fit(Some(120.0), Some(125.0)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unknown_durations_are_neutral() {
        let reconciler = DurationReconciler::default();
        assert_eq!(reconciler.fit(Some(120.0), None), UNKNOWN_DURATION_FIT);
        assert_eq!(reconciler.fit(None, Some(120.0)), UNKNOWN_DURATION_FIT);
        assert_eq!(reconciler.fit(Some(f64::NAN), Some(120.0)), UNKNOWN_DURATION_FIT);
        assert_eq!(reconciler.fit(Some(-3.0), Some(120.0)), UNKNOWN_DURATION_FIT);
    }

    #[test]
    fn fit_is_symmetric() {
        let reconciler = DurationReconciler::new(7.5);
        let samples = [0.0, 3.0, 45.0, 180.0, 181.2, 320.0];
        for left in samples {
            for right in samples {
                assert_eq!(
                    reconciler.fit(Some(left), Some(right)),
                    reconciler.fit(Some(right), Some(left))
                );
            }
        }
    }

    #[test]
    fn zero_tolerance_requires_exact_match() {
        let reconciler = DurationReconciler::new(0.0);
        assert_eq!(reconciler.fit(Some(60.0), Some(60.0)), 1.0);
        assert_eq!(reconciler.fit(Some(60.0), Some(60.5)), 0.0);
    }
}
