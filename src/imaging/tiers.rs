#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityTier {
    Hd,
    FullHd,
    Uhd4k,
    Uhd8k,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Hd,
        QualityTier::FullHd,
        QualityTier::Uhd4k,
        QualityTier::Uhd8k,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.key().eq_ignore_ascii_case(key))
    }

    pub fn key(self) -> &'static str {
        match self {
            QualityTier::Hd => "HD",
            QualityTier::FullHd => "1080p",
            QualityTier::Uhd4k => "4K",
            QualityTier::Uhd8k => "8K",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityTier::Hd => "HD (720p)",
            QualityTier::FullHd => "Full HD (1080p)",
            QualityTier::Uhd4k => "4K UHD",
            QualityTier::Uhd8k => "8K UHD",
        }
    }

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            QualityTier::Hd => (1280, 720),
            QualityTier::FullHd => (1920, 1080),
            QualityTier::Uhd4k => (3840, 2160),
            QualityTier::Uhd8k => (7680, 4320),
        }
    }
}

/// 16:9 wallpaper targets, smallest first.
pub const WALLPAPER_TIERS: [(u32, u32); 3] = [(1920, 1080), (2560, 1440), (3840, 2160)];

/// Starts at the smallest tier and steps up while the source holds at least
/// half of the next tier's pixels.
pub fn select_wallpaper_tier(width: u32, height: u32) -> (u32, u32) {
    let source_pixels = u64::from(width) * u64::from(height);
    let mut selected = WALLPAPER_TIERS[0];
    for tier in WALLPAPER_TIERS.into_iter().skip(1) {
        let tier_pixels = u64::from(tier.0) * u64::from(tier.1);
        if tier_pixels > source_pixels * 2 {
            break;
        }
        selected = tier;
    }
    selected
}
