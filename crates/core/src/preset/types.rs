use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named transcoding quality target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityPreset {
    #[serde(rename = "compression")]
    Compression,
    #[serde(rename = "balanced")]
    Balanced,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "balanced+")]
    BalancedPlus,
    #[serde(rename = "high+")]
    HighPlus,
}

/// Relative quality tier of a preset. Ordering is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Compression,
    Balanced,
    High,
}

/// Encoder parameters handed to the transcoding engine for a base preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncoderSettings {
    /// Target codec.
    pub codec: &'static str,
    /// Peak bitrate in bits per second.
    pub max_bitrate_bps: u64,
    /// Quality-defined VBR level (1-10, higher is better).
    pub qvbr_quality_level: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown quality preset: {0}")]
pub struct UnknownPreset(pub String);

impl QualityPreset {
    /// Every preset accepted at submission, in declaration order.
    pub const ALL: [QualityPreset; 5] = [
        QualityPreset::Compression,
        QualityPreset::Balanced,
        QualityPreset::High,
        QualityPreset::BalancedPlus,
        QualityPreset::HighPlus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compression => "compression",
            Self::Balanced => "balanced",
            Self::High => "high",
            Self::BalancedPlus => "balanced+",
            Self::HighPlus => "high+",
        }
    }

    /// Whether this preset escalates on low similarity scores.
    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::BalancedPlus | Self::HighPlus)
    }

    /// Tier used to break ties between attempts. Adaptive presets report the
    /// tier of the rung they start on.
    pub fn tier(&self) -> QualityTier {
        match self {
            Self::Compression => QualityTier::Compression,
            Self::Balanced | Self::BalancedPlus => QualityTier::Balanced,
            Self::High | Self::HighPlus => QualityTier::High,
        }
    }

    /// Encoder settings for base presets; `None` for adaptive ones, which are
    /// never sent to the engine directly.
    pub fn encoder_settings(&self) -> Option<EncoderSettings> {
        let (max_bitrate_bps, qvbr_quality_level) = match self {
            Self::Compression => (10_000_000, 5),
            Self::Balanced => (20_000_000, 7),
            Self::High => (50_000_000, 9),
            Self::BalancedPlus | Self::HighPlus => return None,
        };
        Some(EncoderSettings {
            codec: "h265",
            max_bitrate_bps,
            qvbr_quality_level,
        })
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityPreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_presets() {
        assert_eq!("balanced".parse(), Ok(QualityPreset::Balanced));
        assert_eq!("high+".parse(), Ok(QualityPreset::HighPlus));
        assert_eq!(
            "ultra".parse::<QualityPreset>(),
            Err(UnknownPreset("ultra".to_string()))
        );
    }

    #[test]
    fn test_serde_names_match_display() {
        for preset in QualityPreset::ALL {
            let json = serde_json::to_string(&preset).unwrap();
            assert_eq!(json, format!("\"{}\"", preset));
        }
    }

    #[test]
    fn test_tier_ordering() {
        assert!(QualityPreset::High.tier() > QualityPreset::Balanced.tier());
        assert!(QualityPreset::Balanced.tier() > QualityPreset::Compression.tier());
    }

    #[test]
    fn test_encoder_settings() {
        let high = QualityPreset::High.encoder_settings().unwrap();
        assert_eq!(high.max_bitrate_bps, 50_000_000);
        assert_eq!(high.qvbr_quality_level, 9);
        assert_eq!(high.codec, "h265");

        assert!(QualityPreset::BalancedPlus.encoder_settings().is_none());
    }
}
