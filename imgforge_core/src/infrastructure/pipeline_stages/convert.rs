//! `LocalConvertStage` — spec §4.4 stage 7. Re-encodes to PNG/JPG/WebP at
//! the requested quality; JPEG has no alpha channel, so a `jpg_background`
//! color is composited underneath first when the caller passes one (only
//! when `removeBg ∧ imageConvert ∧ convertToJpg`, resolved upstream by
//! `Settings::effective_jpg_background`).

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ImageEncoder, Rgba, RgbaImage};

use imgforge_domain::error::{StageFailure, StageName};
use imgforge_domain::ports::{ConvertStage, DownloadedAsset, ImageFormat};
use imgforge_domain::value_objects::settings::ConvertFormat;

pub struct LocalConvertStage;

impl Default for LocalConvertStage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalConvertStage {
    pub fn new() -> Self {
        Self
    }
}

const CSS_COLORS: &[(&str, [u8; 3])] = &[
    ("white", [255, 255, 255]),
    ("black", [0, 0, 0]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("blue", [0, 0, 255]),
    ("yellow", [255, 255, 0]),
    ("transparent", [255, 255, 255]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
];

/// Parses the same `jpgBackground` grammar `services::validate_settings`
/// accepts (a fixed CSS name set or `#rgb`/`#rrggbb`) into solid RGB.
fn parse_background_color(value: &str) -> Option<[u8; 3]> {
    let lower = value.to_ascii_lowercase();
    if let Some((_, rgb)) = CSS_COLORS.iter().find(|(name, _)| *name == lower) {
        return Some(*rgb);
    }
    let digits = value.strip_prefix('#')?;
    let padded = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => digits.to_string(),
        _ => return None,
    };
    let bytes = hex::decode(padded).ok()?;
    Some([bytes[0], bytes[1], bytes[2]])
}

fn composite_on_background(img: &RgbaImage, background: [u8; 3]) -> RgbaImage {
    let (width, height) = img.dimensions();
    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f64 / 255.0;
        let blend = |fg: u8, bg: u8| -> u8 { (fg as f64 * alpha + bg as f64 * (1.0 - alpha)).round() as u8 };
        out.put_pixel(
            x,
            y,
            Rgba([blend(r, background[0]), blend(g, background[1]), blend(b, background[2]), 255]),
        );
    }
    out
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpg => "jpg",
        ImageFormat::Webp => "webp",
    }
}

#[async_trait]
impl ConvertStage for LocalConvertStage {
    async fn convert(
        &self,
        input: &DownloadedAsset,
        format: ConvertFormat,
        quality: u32,
        background: Option<&str>,
    ) -> Result<DownloadedAsset, StageFailure> {
        let path = input.temp_path.clone();
        let target_format = match format {
            ConvertFormat::Png => ImageFormat::Png,
            ConvertFormat::Jpg => ImageFormat::Jpg,
            ConvertFormat::Webp => ImageFormat::Webp,
        };
        let output_path = path.with_extension(format!("converted.{}", extension_for(target_format)));
        let output_path_for_task = output_path.clone();
        let background = background.map(String::from);

        tokio::task::spawn_blocking(move || -> Result<(), StageFailure> {
            let img = image::open(&path)
                .map_err(|err| StageFailure::new(StageName::Convert, format!("decoding image: {err}")))?
                .into_rgba8();

            let prepared = match (&background, format) {
                (Some(color), ConvertFormat::Jpg) => {
                    let rgb = parse_background_color(color)
                        .ok_or_else(|| StageFailure::new(StageName::Convert, format!("unrecognized background color: {color}")))?;
                    composite_on_background(&img, rgb)
                }
                _ => img,
            };

            let mut bytes = Vec::new();
            match format {
                ConvertFormat::Png => {
                    let encoder = PngEncoder::new_with_quality(
                        Cursor::new(&mut bytes),
                        compression_for(quality),
                        FilterType::Adaptive,
                    );
                    encoder
                        .write_image(&prepared, prepared.width(), prepared.height(), image::ExtendedColorType::Rgba8)
                        .map_err(|err| StageFailure::new(StageName::Convert, format!("encoding png: {err}")))?;
                }
                ConvertFormat::Jpg => {
                    let rgb = image::DynamicImage::ImageRgba8(prepared).into_rgb8();
                    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality.clamp(1, 100) as u8);
                    encoder
                        .write_image(&rgb, rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
                        .map_err(|err| StageFailure::new(StageName::Convert, format!("encoding jpg: {err}")))?;
                }
                ConvertFormat::Webp => {
                    let encoder = WebPEncoder::new_lossless(Cursor::new(&mut bytes));
                    encoder
                        .write_image(&prepared, prepared.width(), prepared.height(), image::ExtendedColorType::Rgba8)
                        .map_err(|err| StageFailure::new(StageName::Convert, format!("encoding webp: {err}")))?;
                }
            }

            std::fs::write(&output_path_for_task, &bytes)
                .map_err(|err| StageFailure::new(StageName::Convert, format!("writing converted image: {err}")))?;
            Ok(())
        })
        .await
        .map_err(|err| StageFailure::new(StageName::Convert, format!("task join error: {err}")))??;

        Ok(DownloadedAsset {
            temp_path: output_path,
            format: target_format,
        })
    }
}

fn compression_for(quality: u32) -> CompressionType {
    if quality >= 90 {
        CompressionType::Best
    } else if quality >= 50 {
        CompressionType::Default
    } else {
        CompressionType::Fast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_css_names_case_insensitively() {
        assert_eq!(parse_background_color("White"), Some([255, 255, 255]));
        assert_eq!(parse_background_color("BLACK"), Some([0, 0, 0]));
    }

    #[test]
    fn parses_short_and_long_hex() {
        assert_eq!(parse_background_color("#FFF"), Some([255, 255, 255]));
        assert_eq!(parse_background_color("#a1b2c3"), Some([0xa1, 0xb2, 0xc3]));
    }

    #[test]
    fn rejects_unknown_values() {
        assert_eq!(parse_background_color("chartreuse"), None);
        assert_eq!(parse_background_color("#12345"), None);
    }

    #[test]
    fn composites_fully_transparent_pixel_to_pure_background() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        let out = composite_on_background(&img, [255, 255, 255]);
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn composites_fully_opaque_pixel_unchanged() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        let out = composite_on_background(&img, [255, 255, 255]);
        assert_eq!(*out.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
    }
}
