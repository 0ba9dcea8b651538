// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the smallest unit the colour transforms work on. It is a
// "dumb" data container for a single RGB pixel plus the handful of single-pixel
// heuristics the colour jitter needs: Rec. 601 luminance and the HSV round trip.
// Anything that needs more than one pixel (the mean grey level for contrast,
// geometric warps) lives in `transforms`.
//
// Channels are held as normalised sRGB (0..1). Radiographs are effectively grey, so
// hue and saturation are near zero for most real inputs, but the augmentations run
// on the RGB conversion of the image and must stay correct for colour pixels too.

pub mod pixel {
    use image::Rgb;

    pub type NormalizedChannel = f32;
    pub type Luminance = f32;
    /// Hue as a fraction of a full turn, in [0, 1).
    pub type Hue = f32;

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pixel {
        pub red: NormalizedChannel,
        pub green: NormalizedChannel,
        pub blue: NormalizedChannel,
    }

    impl Pixel {
        pub fn new(red: NormalizedChannel, green: NormalizedChannel, blue: NormalizedChannel) -> Self {
            Self { red, green, blue }
        }

        /// Luminance estimate (Rec. 601 luma), in the same 0..1 scale as the channels.
        pub fn luminance(&self) -> Luminance {
            0.299 * self.red + 0.587 * self.green + 0.114 * self.blue
        }

        /// Converts to (hue, saturation, value).
        pub fn to_hsv(&self) -> (Hue, f32, f32) {
            let max = self.red.max(self.green).max(self.blue);
            let min = self.red.min(self.green).min(self.blue);
            let chroma = max - min;

            let saturation = if max > 0.0 { chroma / max } else { 0.0 };
            if chroma <= f32::EPSILON {
                return (0.0, saturation, max);
            }

            let sector = if max == self.red {
                ((self.green - self.blue) / chroma).rem_euclid(6.0)
            } else if max == self.green {
                (self.blue - self.red) / chroma + 2.0
            } else {
                (self.red - self.green) / chroma + 4.0
            };
            ((sector / 6.0).rem_euclid(1.0), saturation, max)
        }

        pub fn from_hsv(hue: Hue, saturation: f32, value: f32) -> Self {
            let h = hue.rem_euclid(1.0) * 6.0;
            let sector = h.floor();
            let fraction = h - sector;
            let p = value * (1.0 - saturation);
            let q = value * (1.0 - saturation * fraction);
            let t = value * (1.0 - saturation * (1.0 - fraction));
            match sector as u8 % 6 {
                0 => Self::new(value, t, p),
                1 => Self::new(q, value, p),
                2 => Self::new(p, value, t),
                3 => Self::new(p, q, value),
                4 => Self::new(t, p, value),
                _ => Self::new(value, p, q),
            }
        }

        /// Linear blend toward `other`: `factor * self + (1 - factor) * other`, clamped.
        pub fn blend(&self, other: &Pixel, factor: f32) -> Self {
            let mix = |a: f32, b: f32| (factor * a + (1.0 - factor) * b).clamp(0.0, 1.0);
            Self::new(
                mix(self.red, other.red),
                mix(self.green, other.green),
                mix(self.blue, other.blue),
            )
        }

        pub fn grey(level: NormalizedChannel) -> Self {
            Self::new(level, level, level)
        }
    }

    impl From<&Rgb<u8>> for Pixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            Pixel::new(
                rgb[0] as f32 / 255.0,
                rgb[1] as f32 / 255.0,
                rgb[2] as f32 / 255.0,
            )
        }
    }

    impl From<Pixel> for Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb([byte(pixel.red), byte(pixel.green), byte(pixel.blue)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;
    use image::Rgb;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn luminance_of_primaries() {
        assert!(close(Pixel::new(1.0, 0.0, 0.0).luminance(), 0.299));
        assert!(close(Pixel::grey(1.0).luminance(), 1.0));
    }

    #[test]
    fn hsv_of_known_colours() {
        let (h, s, v) = Pixel::new(0.0, 1.0, 0.0).to_hsv();
        assert!(close(h, 1.0 / 3.0) && close(s, 1.0) && close(v, 1.0));

        let (h, s, v) = Pixel::grey(0.5).to_hsv();
        assert!(close(h, 0.0) && close(s, 0.0) && close(v, 0.5));
    }

    #[test]
    fn hsv_round_trip_is_stable() {
        for rgb in [[200u8, 30, 90], [12, 250, 7], [40, 40, 41], [0, 0, 0]] {
            let pixel = Pixel::from(&Rgb(rgb));
            let (h, s, v) = pixel.to_hsv();
            let back: Rgb<u8> = Pixel::from_hsv(h, s, v).into();
            assert_eq!(back.0, rgb);
        }
    }

    #[test]
    fn blend_clamps() {
        let bright = Pixel::grey(0.8).blend(&Pixel::grey(0.0), 2.0);
        assert!(close(bright.red, 1.0));
    }
}
