// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain error taxonomy.
//!
//! `spec.md` §7 names kinds, not wrapper types: configuration, per-stage,
//! per-image, catalog, external-service, and cancellation failures. Each
//! variant here carries the structured data a caller needs to decide whether
//! to retry, record, or surface the failure to a human — never just a string.

use std::fmt;

use thiserror::Error;

/// The named pipeline stages, in the fixed order `spec.md` §4.4 defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Plan,
    Generate,
    Download,
    RemoveBackground,
    TrimTransparent,
    Enhance,
    Convert,
    QualityCheck,
    Metadata,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageName::Plan => "plan",
            StageName::Generate => "generate",
            StageName::Download => "download",
            StageName::RemoveBackground => "remove_bg",
            StageName::TrimTransparent => "trim_transparent",
            StageName::Enhance => "enhance",
            StageName::Convert => "convert",
            StageName::QualityCheck => "quality_check",
            StageName::Metadata => "metadata",
        };
        f.write_str(s)
    }
}

/// A typed failure raised by one `PipelineStages` function.
///
/// `retryable` drives the external-service retry policy in §7:
/// HTTP 5xx/network failures are retryable, 4xx (except 429) are not.
#[derive(Debug, Clone, Error)]
#[error("stage {stage} failed: {cause}{}", http_status.map(|s| format!(" (http {s})")).unwrap_or_default())]
pub struct StageFailure {
    pub stage: StageName,
    pub retryable: bool,
    pub cause: String,
    pub http_status: Option<u16>,
}

impl StageFailure {
    pub fn new(stage: StageName, cause: impl Into<String>) -> Self {
        Self {
            stage,
            retryable: false,
            cause: cause.into(),
            http_status: None,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        // 5xx and 429 are the retryable HTTP outcomes per spec §7.
        self.retryable = status >= 500 || status == 429;
        self
    }
}

/// `CatalogError` kinds per spec §4.1's failure model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogErrorKind {
    Open,
    Busy,
    Corrupt,
    Constraint,
}

impl fmt::Display for CatalogErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CatalogErrorKind::Open => "open",
            CatalogErrorKind::Busy => "busy",
            CatalogErrorKind::Corrupt => "corrupt",
            CatalogErrorKind::Constraint => "constraint",
        };
        f.write_str(s)
    }
}

/// The single error type shared by every layer above the domain crate.
///
/// Each variant is a *kind*, carrying exactly the context named in spec §7 so
/// callers can decide to retry, record, or surface the failure — never a bare
/// opaque string standing in for a foreign error type.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Invalid or out-of-range settings. Never logged with secrets attached.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A pipeline stage failed; consumed by `ImageProcessor`, never surfaced
    /// directly to the UI.
    #[error(transparent)]
    Stage(#[from] StageFailure),

    /// Terminal outcome for one image; persisted on the row, one event
    /// emitted.
    #[error("image failed at stage {stage}: {reason}")]
    Image { stage: StageName, reason: String },

    /// `CatalogError::Busy` is retried by the caller up to 5x with 10-200ms
    /// jittered backoff; other kinds propagate.
    #[error("catalog error ({kind}): {message}")]
    Catalog { kind: CatalogErrorKind, message: String },

    /// HTTP 5xx/network errors, retried inside a stage with bounded
    /// exponential backoff; HTTP 4xx (except 429) is not retried.
    #[error("external service error: {message}")]
    ExternalService { retryable: bool, message: String },

    /// Cooperative cancellation. Expected, not logged as an error.
    #[error("operation cancelled")]
    Cancelled,

    /// Job-level failure not covered by the above (e.g. a duplicated
    /// `startJob` call while a run is already live).
    #[error("{0}")]
    Internal(String),
}

impl DomainError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn catalog(kind: CatalogErrorKind, message: impl Into<String>) -> Self {
        Self::Catalog {
            kind,
            message: message.into(),
        }
    }

    pub fn external_service(retryable: bool, message: impl Into<String>) -> Self {
        Self::ExternalService {
            retryable,
            message: message.into(),
        }
    }

    /// Whether retrying the operation that produced this error is sensible.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::Catalog { kind: CatalogErrorKind::Busy, .. }
                | DomainError::ExternalService { retryable: true, .. }
                | DomainError::Stage(StageFailure { retryable: true, .. })
        )
    }

    /// Whether this error represents expected cancellation rather than a
    /// genuine failure (spec §7: "treated as expected, not logged as error").
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Internal(format!("io error: {err}"))
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Internal(format!("serialization error: {err}"))
    }
}
