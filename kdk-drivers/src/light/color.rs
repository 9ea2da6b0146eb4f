//! Colour temperature scale
//!
//! The controller takes colour as 1 (warmest) to 100 (coldest). Hosts work
//! in mireds, so the scale is mapped linearly onto the range between the
//! fixture's cold and warm white points. Integer arithmetic only.

/// Warmest colour value
pub const COLOR_WARMEST: u8 = 1;

/// Coldest colour value
pub const COLOR_COLDEST: u8 = 100;

const COLOR_STEPS: u32 = (COLOR_COLDEST - COLOR_WARMEST) as u32;

/// Convert a colour temperature in kelvin to mireds, rounded
pub const fn kelvin_to_mireds(kelvin: u32) -> u16 {
    if kelvin == 0 {
        return 0;
    }
    ((1_000_000 + kelvin / 2) / kelvin) as u16
}

/// Cold and warm ends of the fixture's white range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WhitePoints {
    pub cold_mireds: u16,
    pub warm_mireds: u16,
}

impl Default for WhitePoints {
    /// 6000 K to 2700 K
    fn default() -> Self {
        Self::from_kelvin(6000, 2700)
    }
}

impl WhitePoints {
    pub const fn from_kelvin(cold_kelvin: u32, warm_kelvin: u32) -> Self {
        Self {
            cold_mireds: kelvin_to_mireds(cold_kelvin),
            warm_mireds: kelvin_to_mireds(warm_kelvin),
        }
    }

    fn span(&self) -> u32 {
        self.warm_mireds.saturating_sub(self.cold_mireds) as u32
    }

    /// Colour temperature for a controller colour value
    pub fn to_mireds(&self, color: u8) -> u16 {
        let warmth = (COLOR_COLDEST - color.clamp(COLOR_WARMEST, COLOR_COLDEST)) as u32;
        let offset = (self.span() * warmth + COLOR_STEPS / 2) / COLOR_STEPS;
        self.cold_mireds + offset as u16
    }

    /// Controller colour value for a colour temperature
    ///
    /// Values outside the white range saturate at its ends.
    pub fn from_mireds(&self, mireds: u16) -> u8 {
        let span = self.span();
        if span == 0 {
            return COLOR_COLDEST;
        }
        let offset = (mireds.clamp(self.cold_mireds, self.warm_mireds) - self.cold_mireds) as u32;
        let warmth = (offset * COLOR_STEPS + span / 2) / span;
        COLOR_COLDEST - warmth as u8
    }
}
