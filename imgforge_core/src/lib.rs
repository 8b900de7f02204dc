// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # imgforge-core
//!
//! Application and infrastructure layers for the batch AI image generation
//! pipeline. Follows the same Clean Architecture split as the domain crate:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Application Layer                │
//! │  JobRunner · RetryExecutor · ImageProcessor  │
//! │  Adapter · bulk export / statistics          │
//! └─────────────────┬─────────────────────────────┘
//! ┌─────────────────┴─────────────────────────────┐
//! │          Infrastructure Layer                │
//! │  SqliteCatalog · EventBus · SecretsVault     │
//! │  PipelineStages (HTTP) · WorkerPool          │
//! └─────────────────┬─────────────────────────────┘
//! ┌─────────────────┴─────────────────────────────┐
//! │              Domain Layer (imgforge-domain)  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Application code depends on the domain crate's port traits
//! (`CatalogRepository`, `SecretsVault`, `PipelineStage`) and never the other
//! way around; infrastructure provides the concrete, I/O-performing
//! implementations of those ports.

pub mod application;
pub mod infrastructure;

pub use imgforge_domain::{DomainError, JobAggregate};
