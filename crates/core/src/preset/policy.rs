use super::QualityPreset;

/// Similarity score an adaptive attempt must reach to be accepted outright.
pub const SSIM_THRESHOLD: f64 = 0.95;

/// How a submitted preset is turned into conversion attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum PresetPolicy {
    /// A single explicitly requested preset. Accepted after one attempt.
    Fixed(QualityPreset),
    /// An ordered escalation ladder of base presets.
    Adaptive {
        ladder: Vec<QualityPreset>,
        threshold: f64,
    },
}

impl PresetPolicy {
    pub fn for_preset(preset: QualityPreset) -> Self {
        match preset {
            QualityPreset::BalancedPlus => Self::Adaptive {
                ladder: vec![QualityPreset::Balanced, QualityPreset::High],
                threshold: SSIM_THRESHOLD,
            },
            QualityPreset::HighPlus => Self::Adaptive {
                ladder: vec![QualityPreset::High],
                threshold: SSIM_THRESHOLD,
            },
            base => Self::Fixed(base),
        }
    }

    /// The preset of the first conversion attempt.
    pub fn first_preset(&self) -> QualityPreset {
        match self {
            Self::Fixed(preset) => *preset,
            Self::Adaptive { ladder, .. } => ladder[0],
        }
    }

    /// Presets this policy may ever request, in order.
    pub fn ladder(&self) -> &[QualityPreset] {
        match self {
            Self::Fixed(preset) => std::slice::from_ref(preset),
            Self::Adaptive { ladder, .. } => ladder,
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive { .. })
    }
}

impl From<QualityPreset> for PresetPolicy {
    fn from(preset: QualityPreset) -> Self {
        Self::for_preset(preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_plus_ladder() {
        let policy = PresetPolicy::for_preset(QualityPreset::BalancedPlus);
        assert_eq!(
            policy.ladder(),
            &[QualityPreset::Balanced, QualityPreset::High]
        );
        assert_eq!(policy.first_preset(), QualityPreset::Balanced);
        assert!(policy.is_adaptive());
    }

    #[test]
    fn test_high_plus_has_single_rung() {
        let policy = PresetPolicy::for_preset(QualityPreset::HighPlus);
        assert_eq!(policy.ladder(), &[QualityPreset::High]);
    }

    #[test]
    fn test_base_presets_are_fixed() {
        for preset in [
            QualityPreset::Compression,
            QualityPreset::Balanced,
            QualityPreset::High,
        ] {
            let policy = PresetPolicy::from(preset);
            assert_eq!(policy, PresetPolicy::Fixed(preset));
            assert_eq!(policy.first_preset(), preset);
        }
    }
}
