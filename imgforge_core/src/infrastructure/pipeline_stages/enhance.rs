//! `LocalEnhanceStage` — spec §4.4 stage 6. Sharpening is the `image`
//! crate's unsharp mask; saturation has no built-in equivalent, so it's
//! applied manually via an HSL round-trip per pixel.

use async_trait::async_trait;
use image::{GenericImageView, Rgba, RgbaImage};

use imgforge_domain::error::{StageFailure, StageName};
use imgforge_domain::ports::{DownloadedAsset, EnhanceStage};

pub struct LocalEnhanceStage;

impl Default for LocalEnhanceStage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEnhanceStage {
    pub fn new() -> Self {
        Self
    }
}

/// `saturation` is a multiplier: `0.0` desaturates fully, `1.0` is a no-op,
/// values above `1.0` boost it; applied per-pixel in HSL space so hue and
/// lightness are left untouched.
fn apply_saturation(img: &RgbaImage, saturation: f64) -> RgbaImage {
    let (width, height) = img.dimensions();
    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let (h, s, l) = rgb_to_hsl(r, g, b);
        let s = (s * saturation).clamp(0.0, 1.0);
        let (nr, ng, nb) = hsl_to_rgb(h, s, l);
        out.put_pixel(x, y, Rgba([nr, ng, nb, a]));
    }
    out
}

fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, l)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    if s.abs() < f64::EPSILON {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let r = hue_to_rgb(p, q, h + 1.0 / 3.0);
    let g = hue_to_rgb(p, q, h);
    let b = hue_to_rgb(p, q, h - 1.0 / 3.0);
    ((r * 255.0).round() as u8, (g * 255.0).round() as u8, (b * 255.0).round() as u8)
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let mut t = t;
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[async_trait]
impl EnhanceStage for LocalEnhanceStage {
    async fn enhance(&self, input: &DownloadedAsset, sharpening: f64, saturation: f64) -> Result<DownloadedAsset, StageFailure> {
        let path = input.temp_path.clone();
        let output_path = path.with_extension("enhanced.png");
        let output_path_for_task = output_path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StageFailure> {
            let img = image::open(&path)
                .map_err(|err| StageFailure::new(StageName::Enhance, format!("decoding image: {err}")))?
                .into_rgba8();

            let saturated = if (saturation - 1.0).abs() < f64::EPSILON {
                img
            } else {
                apply_saturation(&img, saturation)
            };

            let sharpened = if sharpening <= 0.0 {
                saturated
            } else {
                image::imageops::unsharpen(&saturated, sharpening as f32, 1)
            };

            sharpened
                .save(&output_path_for_task)
                .map_err(|err| StageFailure::new(StageName::Enhance, format!("writing enhanced image: {err}")))?;
            Ok(())
        })
        .await
        .map_err(|err| StageFailure::new(StageName::Enhance, format!("task join error: {err}")))??;

        Ok(DownloadedAsset {
            temp_path: output_path,
            format: input.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_hsl_round_trips_for_gray() {
        let (h, s, l) = rgb_to_hsl(128, 128, 128);
        assert_eq!(h, 0.0);
        assert_eq!(s, 0.0);
        assert!((l - 128.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn zero_saturation_desaturates_to_gray() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([200, 50, 50, 255]));
        let out = apply_saturation(&img, 0.0);
        let Rgba([r, g, b, _]) = *out.get_pixel(0, 0);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn unit_saturation_is_near_identity() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([200, 50, 50, 255]));
        let out = apply_saturation(&img, 1.0);
        let Rgba([r, g, b, a]) = *out.get_pixel(0, 0);
        assert!((r as i16 - 200).abs() <= 1);
        assert!((g as i16 - 50).abs() <= 1);
        assert!((b as i16 - 50).abs() <= 1);
        assert_eq!(a, 255);
    }
}
