//! `HttpRemoveBackgroundStage` — spec §4.4 stage 4. Retries 5xx with bounded
//! exponential backoff up to a deadline derived from `pollingTimeout`; the
//! soft/hard failure policy itself is applied by the caller (`ImageProcessor`),
//! not here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use imgforge_domain::error::{DomainError, StageFailure, StageName};
use imgforge_domain::ports::{CancelSignal, DownloadedAsset, ImageFormat, RemoveBackgroundStage, SecretsVault};
use imgforge_domain::value_objects::settings::RemoveBgSize;
use imgforge_domain::value_objects::Settings;

const ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";
const MAX_BACKOFF: Duration = Duration::from_secs(8);

pub struct HttpRemoveBackgroundStage {
    client: reqwest::Client,
    secrets: Arc<dyn SecretsVault>,
}

impl HttpRemoveBackgroundStage {
    pub fn new(client: reqwest::Client, secrets: Arc<dyn SecretsVault>) -> Self {
        Self { client, secrets }
    }
}

fn size_param(size: RemoveBgSize) -> &'static str {
    match size {
        RemoveBgSize::Auto => "auto",
        RemoveBgSize::Preview => "preview",
        RemoveBgSize::Full => "full",
        RemoveBgSize::FourK => "4k",
    }
}

#[async_trait]
impl RemoveBackgroundStage for HttpRemoveBackgroundStage {
    async fn remove_background(
        &self,
        input: &DownloadedAsset,
        settings: &Settings,
        cancel: &dyn CancelSignal,
    ) -> Result<DownloadedAsset, StageFailure> {
        let api_key = match self.secrets.get("remove_bg", "api_key").await {
            Ok(Some((value, _))) => value,
            Ok(None) => {
                return Err(StageFailure::new(
                    StageName::RemoveBackground,
                    "no remove.bg api key configured in the secrets vault",
                ))
            }
            Err(err) => return Err(map_secrets_err(err)),
        };

        let image_bytes = tokio::fs::read(&input.temp_path)
            .await
            .map_err(|err| StageFailure::new(StageName::RemoveBackground, format!("reading input: {err}")))?;

        let deadline = Instant::now() + Duration::from_secs(settings.parameters.polling_timeout as u64);
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(StageFailure::new(StageName::RemoveBackground, "cancelled"));
            }

            let form = reqwest::multipart::Form::new()
                .part(
                    "image_file",
                    reqwest::multipart::Part::bytes(image_bytes.clone()).file_name("input.png"),
                )
                .text("size", size_param(settings.processing.remove_bg_size))
                .text("format", "png");

            let response = self
                .client
                .post(ENDPOINT)
                .header("X-Api-Key", &api_key)
                .multipart(form)
                .send()
                .await;

            match response {
                Ok(res) if res.status().is_success() => {
                    let bytes = res
                        .bytes()
                        .await
                        .map_err(|err| StageFailure::new(StageName::RemoveBackground, err.to_string()))?;
                    let output_path = input.temp_path.with_extension("removebg.png");
                    tokio::fs::write(&output_path, &bytes)
                        .await
                        .map_err(|err| StageFailure::new(StageName::RemoveBackground, format!("writing output: {err}")))?;
                    return Ok(DownloadedAsset {
                        temp_path: output_path,
                        format: ImageFormat::Png,
                    });
                }
                Ok(res) => {
                    let status = res.status();
                    let body = res.text().await.unwrap_or_default();
                    let failure = StageFailure::new(StageName::RemoveBackground, format!("{status}: {body}"))
                        .http_status(status.as_u16());
                    if !failure.retryable || Instant::now() >= deadline {
                        return Err(failure);
                    }
                }
                Err(err) => {
                    let failure = StageFailure::new(StageName::RemoveBackground, err.to_string())
                        .retryable(err.is_timeout() || err.is_connect());
                    if !failure.retryable || Instant::now() >= deadline {
                        return Err(failure);
                    }
                }
            }

            attempt += 1;
            let backoff = Duration::from_millis(200 * 2u64.pow(attempt.min(6))).min(MAX_BACKOFF);
            tokio::time::sleep(backoff.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}

fn map_secrets_err(err: DomainError) -> StageFailure {
    StageFailure::new(StageName::RemoveBackground, format!("reading api key: {err}"))
}
