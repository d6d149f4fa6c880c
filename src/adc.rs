//! ADC code to voltage conversion

/// Linear scale of a signed, bipolar analog-to-digital converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcScale {
    /// Voltage represented by the largest positive code, in nanovolts
    pub full_scale_nanovolts: i64,
    /// Converter resolution including the sign bit
    pub resolution_bits: u8,
}

impl Default for AdcScale {
    fn default() -> Self {
        // 16-bit converter on a 3 V range
        Self {
            full_scale_nanovolts: 3_000_000_000,
            resolution_bits: 16,
        }
    }
}

impl AdcScale {
    /// Create a scale for the given range and resolution
    pub fn new(full_scale_nanovolts: i64, resolution_bits: u8) -> Self {
        Self {
            full_scale_nanovolts,
            resolution_bits: resolution_bits.clamp(2, 32),
        }
    }

    /// Number of codes on each side of zero
    pub fn half_range(&self) -> i64 {
        1i64 << (self.resolution_bits.clamp(2, 32) - 1)
    }

    /// Convert a raw code to nanovolts (saturating)
    pub fn to_nanovolts(&self, raw: i64) -> i64 {
        let nv = raw as i128 * self.full_scale_nanovolts as i128 / self.half_range() as i128;
        nv.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scale() {
        let adc = AdcScale::default();
        assert_eq!(adc.half_range(), 32_768);
        assert_eq!(adc.to_nanovolts(0), 0);
        assert_eq!(adc.to_nanovolts(-32_768), -3_000_000_000);
        assert_eq!(adc.to_nanovolts(16_384), 1_500_000_000);
    }

    #[test]
    fn test_no_overflow_on_wide_converter() {
        let adc = AdcScale::new(i64::MAX, 32);
        assert_eq!(adc.to_nanovolts(i64::MAX), i64::MAX);
    }
}
