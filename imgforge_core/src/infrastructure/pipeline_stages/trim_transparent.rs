//! `LocalTrimTransparentStage` — spec §4.4 stage 5. Crops the image to the
//! bounding box of its non-transparent pixels. Grounded directly on the
//! `image` crate's `GenericImageView`/`crop_imm` primitives.

use async_trait::async_trait;
use image::GenericImageView;

use imgforge_domain::error::{StageFailure, StageName};
use imgforge_domain::ports::{DownloadedAsset, TrimTransparentStage};

pub struct LocalTrimTransparentStage;

impl Default for LocalTrimTransparentStage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTrimTransparentStage {
    pub fn new() -> Self {
        Self
    }
}

/// Smallest rectangle containing every pixel with nonzero alpha, or `None`
/// if the image is fully transparent.
fn opaque_bounds(img: &image::RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = img.dimensions();
    let (mut min_x, mut min_y) = (width, height);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    let mut found = false;

    for (x, y, pixel) in img.enumerate_pixels() {
        if pixel[3] != 0 {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !found {
        return None;
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

#[async_trait]
impl TrimTransparentStage for LocalTrimTransparentStage {
    async fn trim_transparent(&self, input: &DownloadedAsset) -> Result<DownloadedAsset, StageFailure> {
        let path = input.temp_path.clone();
        let output_path = path.with_extension("trimmed.png");
        let output_path_for_task = output_path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StageFailure> {
            let img = image::open(&path)
                .map_err(|err| StageFailure::new(StageName::TrimTransparent, format!("decoding image: {err}")))?
                .into_rgba8();

            let (x, y, w, h) = opaque_bounds(&img)
                .ok_or_else(|| StageFailure::new(StageName::TrimTransparent, "image has no opaque pixels to trim to"))?;

            let cropped = image::imageops::crop_imm(&img, x, y, w, h).to_image();
            cropped
                .save(&output_path_for_task)
                .map_err(|err| StageFailure::new(StageName::TrimTransparent, format!("writing trimmed image: {err}")))?;
            Ok(())
        })
        .await
        .map_err(|err| StageFailure::new(StageName::TrimTransparent, format!("task join error: {err}")))??;

        Ok(DownloadedAsset {
            temp_path: output_path,
            format: input.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn finds_bounding_box_of_opaque_pixels() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        img.put_pixel(3, 4, Rgba([255, 0, 0, 255]));
        img.put_pixel(6, 7, Rgba([255, 0, 0, 255]));
        assert_eq!(opaque_bounds(&img), Some((3, 4, 4, 4)));
    }

    #[test]
    fn fully_transparent_image_has_no_bounds() {
        let img = RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 0]));
        assert_eq!(opaque_bounds(&img), None);
    }
}
