//! `OpenAiQualityCheckStage` / `OpenAiMetadataStage` — spec §4.4 stages 8–9.
//! Both wrap the same OpenAI chat-completions vision endpoint; the quality
//! check asks for a pass/fail verdict, metadata generation asks for
//! `{title, description, tags}`. Grounded on the same thin-adapter shape as
//! `HttpGenerateStage`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use imgforge_domain::error::{DomainError, StageFailure, StageName};
use imgforge_domain::ports::{
    CancelSignal, DownloadedAsset, MetadataResult, MetadataStage, QcResult, QualityCheckStage, SecretsVault,
};
use imgforge_domain::value_objects::Settings;

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiClient {
    client: reqwest::Client,
    secrets: Arc<dyn SecretsVault>,
}

impl OpenAiClient {
    fn new(client: reqwest::Client, secrets: Arc<dyn SecretsVault>) -> Self {
        Self { client, secrets }
    }

    async fn api_key(&self, stage: StageName) -> Result<String, StageFailure> {
        match self.secrets.get("openai", "api_key").await {
            Ok(Some((value, _))) => Ok(value),
            Ok(None) => Err(StageFailure::new(stage, "no openai api key configured in the secrets vault")),
            Err(err) => Err(map_secrets_err(stage, err)),
        }
    }

    async fn encode_image(&self, path: &std::path::Path, stage: StageName) -> Result<String, StageFailure> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| StageFailure::new(stage, format!("reading image for vision call: {err}")))?;
        Ok(format!("data:image/png;base64,{}", B64.encode(bytes)))
    }

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        image_data_url: &str,
        stage: StageName,
        cancel: &dyn CancelSignal,
    ) -> Result<String, StageFailure> {
        if cancel.is_cancelled() {
            return Err(StageFailure::new(stage, "cancelled before request"));
        }
        let api_key = self.api_key(stage).await?;

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ChatContent::Text { text: prompt },
                    ChatContent::ImageUrl {
                        image_url: ImageUrl { url: image_data_url },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(ENDPOINT)
            .bearer_auth(&api_key)
            .json(&request)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|err| StageFailure::new(stage, err.to_string()).retryable(err.is_timeout() || err.is_connect()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StageFailure::new(stage, format!("{status}: {text}")).http_status(status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| StageFailure::new(stage, format!("decoding response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| StageFailure::new(stage, "empty response from model"))
    }
}

fn map_secrets_err(stage: StageName, err: DomainError) -> StageFailure {
    StageFailure::new(stage, format!("reading api key: {err}"))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ChatContent<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContent<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Quality-check vision call (spec §4.4 stage 8): the prompt instructs the
/// model to answer with a `PASS` or `FAIL: <reason>` line, parsed here
/// rather than trusting free-form JSON from a vision model.
pub struct OpenAiQualityCheckStage {
    inner: OpenAiClient,
}

impl OpenAiQualityCheckStage {
    pub fn new(client: reqwest::Client, secrets: Arc<dyn SecretsVault>) -> Self {
        Self {
            inner: OpenAiClient::new(client, secrets),
        }
    }
}

#[async_trait]
impl QualityCheckStage for OpenAiQualityCheckStage {
    async fn quality_check(
        &self,
        input: &DownloadedAsset,
        settings: &Settings,
        cancel: &dyn CancelSignal,
    ) -> Result<QcResult, StageFailure> {
        let prompt_template = quality_check_prompt(settings, StageName::QualityCheck)?;
        let image_data_url = self.inner.encode_image(&input.temp_path, StageName::QualityCheck).await?;
        let verdict = self
            .inner
            .complete(
                &settings.parameters.openai_model,
                &prompt_template,
                &image_data_url,
                StageName::QualityCheck,
                cancel,
            )
            .await?;

        let trimmed = verdict.trim();
        if let Some(reason) = trimmed.strip_prefix("FAIL:") {
            Ok(QcResult {
                passed: false,
                reason: Some(reason.trim().to_string()),
            })
        } else if trimmed.eq_ignore_ascii_case("PASS") || trimmed.starts_with("PASS") {
            Ok(QcResult {
                passed: true,
                reason: None,
            })
        } else {
            Ok(QcResult {
                passed: false,
                reason: Some(format!("unrecognized verdict: {trimmed}")),
            })
        }
    }
}

fn quality_check_prompt(settings: &Settings, stage: StageName) -> Result<String, StageFailure> {
    match &settings.file_paths.quality_check_prompt_file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|err| StageFailure::new(stage, format!("reading quality check prompt file: {err}"))),
        None => Ok(
            "Inspect this image. Reply with exactly `PASS` if it is usable, or `FAIL: <reason>` if not.".to_string(),
        ),
    }
}

/// Metadata generation call (spec §4.4 stage 9). The model is asked to
/// return one `title|description|tag1,tag2,...` line; a malformed response
/// degrades to an empty tag list rather than failing the stage, since
/// metadata failure must never invalidate an otherwise-passed image.
pub struct OpenAiMetadataStage {
    inner: OpenAiClient,
}

impl OpenAiMetadataStage {
    pub fn new(client: reqwest::Client, secrets: Arc<dyn SecretsVault>) -> Self {
        Self {
            inner: OpenAiClient::new(client, secrets),
        }
    }
}

#[async_trait]
impl MetadataStage for OpenAiMetadataStage {
    async fn generate_metadata(
        &self,
        input: &DownloadedAsset,
        settings: &Settings,
        cancel: &dyn CancelSignal,
    ) -> Result<MetadataResult, StageFailure> {
        let prompt_template = metadata_prompt(settings, StageName::Metadata)?;
        let image_data_url = self.inner.encode_image(&input.temp_path, StageName::Metadata).await?;
        let raw = self
            .inner
            .complete(
                &settings.parameters.openai_model,
                &prompt_template,
                &image_data_url,
                StageName::Metadata,
                cancel,
            )
            .await?;

        Ok(parse_metadata_line(&raw))
    }
}

fn metadata_prompt(settings: &Settings, stage: StageName) -> Result<String, StageFailure> {
    match &settings.file_paths.metadata_prompt_file {
        Some(path) => {
            std::fs::read_to_string(path).map_err(|err| StageFailure::new(stage, format!("reading metadata prompt file: {err}")))
        }
        None => Ok(
            "Describe this image. Reply with exactly one line: title|description|tag1,tag2,tag3".to_string(),
        ),
    }
}

fn parse_metadata_line(raw: &str) -> MetadataResult {
    let line = raw.lines().next().unwrap_or_default();
    let mut parts = line.splitn(3, '|');
    let title = parts.next().unwrap_or_default().trim().to_string();
    let description = parts.next().unwrap_or_default().trim().to_string();
    let tags = parts
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    MetadataResult {
        title,
        description,
        tags,
    }
}
