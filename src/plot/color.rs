//! Colours of the scale chart.

use serde::{Deserialize, Serialize};

/// RGB colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| f64::from((hex >> shift) & 0xff) / 255.0;
        Self::new(channel(16), channel(8), channel(0))
    }

    pub fn to_u8(self) -> (u8, u8, u8) {
        let c = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        (c(self.r), c(self.g), c(self.b))
    }

    /// `(hue, lightness, saturation)`, all in `[0, 1]`.
    pub fn to_hls(self) -> (f64, f64, f64) {
        let Rgb { r, g, b } = self;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        if max == min {
            return (0.0, l, 0.0);
        }
        let range = max - min;
        let s = if l <= 0.5 { range / (max + min) } else { range / (2.0 - max - min) };
        let (rc, gc, bc) = ((max - r) / range, (max - g) / range, (max - b) / range);
        let h = if r == max {
            bc - gc
        } else if g == max {
            2.0 + rc - bc
        } else {
            4.0 + gc - rc
        };
        ((h / 6.0).rem_euclid(1.0), l, s)
    }

    pub fn from_hls(h: f64, l: f64, s: f64) -> Self {
        if s == 0.0 {
            return Self::new(l, l, l);
        }
        let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let m1 = 2.0 * l - m2;
        let channel = |hue: f64| {
            let hue = hue.rem_euclid(1.0);
            if hue < 1.0 / 6.0 {
                m1 + (m2 - m1) * hue * 6.0
            } else if hue < 0.5 {
                m2
            } else if hue < 2.0 / 3.0 {
                m1 + (m2 - m1) * (2.0 / 3.0 - hue) * 6.0
            } else {
                m1
            }
        };
        Self::new(channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
    }

    /// Moves lightness towards white and scales saturation down.
    pub fn lighten(self, l_degree: f64, s_degree: f64) -> Self {
        let (h, l, s) = self.to_hls();
        Self::from_hls(h, 1.0 - l_degree * (1.0 - l), s_degree * s)
    }
}

/// First two entries of seaborn's "colorblind" palette.
pub const FORWARD: Rgb = Rgb::new(0.003_921_568_6, 0.450_980_39, 0.698_039_22);
pub const BACKWARD: Rgb = Rgb::new(0.870_588_24, 0.560_784_3, 0.019_607_843);

pub const REFERENCE_LINE: Rgb = Rgb::new(0.5, 0.5, 0.5);

pub const ERROR_BAR_LIGHTNESS: f64 = 0.35;
pub const ERROR_BAR_SATURATION: f64 = 0.45;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn palette_matches_hex_codes() {
        assert_eq!(FORWARD.to_u8(), (0x01, 0x73, 0xb2));
        assert_eq!(BACKWARD.to_u8(), (0xde, 0x8f, 0x05));
        assert_eq!(Rgb::from_hex(0x0173b2).to_u8(), FORWARD.to_u8());
    }

    #[test]
    fn hls_round_trip() {
        for c in [FORWARD, BACKWARD, Rgb::new(0.2, 0.9, 0.4)] {
            let (h, l, s) = c.to_hls();
            let back = Rgb::from_hls(h, l, s);
            assert_abs_diff_eq!(back.r, c.r, epsilon = 1e-9);
            assert_abs_diff_eq!(back.g, c.g, epsilon = 1e-9);
            assert_abs_diff_eq!(back.b, c.b, epsilon = 1e-9);
        }
    }

    #[test]
    fn lightened_colour_is_paler() {
        let light = FORWARD.lighten(ERROR_BAR_LIGHTNESS, ERROR_BAR_SATURATION);
        let (_, l0, s0) = FORWARD.to_hls();
        let (_, l1, s1) = light.to_hls();
        assert!(l1 > l0);
        assert_abs_diff_eq!(s1, s0 * ERROR_BAR_SATURATION, epsilon = 1e-9);
        assert_eq!(Rgb::new(0.3, 0.3, 0.3).to_hls(), (0.0, 0.3, 0.0));
    }
}
