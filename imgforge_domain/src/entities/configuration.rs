//! `Configuration` — spec §3: a user-saved preset.

use serde::{Deserialize, Serialize};

use crate::value_objects::Settings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub id: i64,
    pub name: String,
    pub settings: Settings,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to create or overwrite a configuration by name (spec §4.1:
/// `saveConfiguration` "upserts by name").
#[derive(Debug, Clone)]
pub struct NewConfiguration {
    pub name: String,
    pub settings: Settings,
}
