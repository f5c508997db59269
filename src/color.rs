use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};
use serde::{Deserialize, Serialize};

/// 8-bit sRGB colour shared by the PNG renderer and the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const GRAY: Rgb = Rgb(128, 128, 128);
    pub const RED: Rgb = Rgb(214, 39, 40);

    fn from_srgb(rgb: Srgb) -> Self {
        Rgb(
            (rgb.red.clamp(0.0, 1.0) * 255.0) as u8,
            (rgb.green.clamp(0.0, 1.0) * 255.0) as u8,
            (rgb.blue.clamp(0.0, 1.0) * 255.0) as u8,
        )
    }

    fn to_linear(self) -> LinSrgb {
        let srgb = Srgb::new(
            self.0 as f32 / 255.0,
            self.1 as f32 / 255.0,
            self.2 as f32 / 255.0,
        );
        srgb.into_linear()
    }
}

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Rgb> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.45);
            Rgb::from_srgb(hsl.into_color())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Gradients for heatmaps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gradient {
    Viridis,
    Plasma,
}

const VIRIDIS: [Rgb; 5] = [
    Rgb(68, 1, 84),
    Rgb(59, 82, 139),
    Rgb(33, 145, 140),
    Rgb(94, 201, 98),
    Rgb(253, 231, 37),
];

const PLASMA: [Rgb; 5] = [
    Rgb(13, 8, 135),
    Rgb(126, 3, 168),
    Rgb(204, 71, 120),
    Rgb(248, 149, 64),
    Rgb(240, 249, 33),
];

impl Gradient {
    fn stops(self) -> &'static [Rgb] {
        match self {
            Gradient::Viridis => &VIRIDIS,
            Gradient::Plasma => &PLASMA,
        }
    }

    /// Colour at `t` in `[0, 1]`; values outside are clamped.
    pub fn sample(self, t: f64) -> Rgb {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let pos = t * (stops.len() - 1) as f64;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let frac = (pos - i as f64) as f32;
        let mixed = stops[i].to_linear().mix(stops[i + 1].to_linear(), frac);
        Rgb::from_srgb(Srgb::from_linear(mixed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_colours_are_distinct() {
        let p = generate_palette(5);
        assert_eq!(p.len(), 5);
        for i in 0..p.len() {
            for j in i + 1..p.len() {
                assert_ne!(p[i], p[j]);
            }
        }
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn gradient_hits_its_end_stops() {
        let lo = Gradient::Viridis.sample(0.0);
        let hi = Gradient::Viridis.sample(1.0);
        assert!((lo.0 as i32 - 68).abs() <= 1 && (lo.2 as i32 - 84).abs() <= 1);
        assert!((hi.0 as i32 - 253).abs() <= 1 && (hi.1 as i32 - 231).abs() <= 1);
        assert_eq!(Gradient::Plasma.sample(2.0), Gradient::Plasma.sample(1.0));
    }
}
