//! Output types for batch extraction.
//!
//! A batch never aborts on a single bad image: each image yields exactly one
//! [`ItemOutcome`], and the [`BatchReport`] holds them in input order.

use crate::error::ExtractError;
use crate::schema::{ExtractionResult, SchemaVersion};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Result of processing one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    /// 0-based position in the submitted batch.
    pub index: usize,
    /// Image identifier (usually the file path).
    pub id: String,
    pub result: Result<ExtractionResult, ExtractError>,
    /// Model calls made, including retries. `0` when the image could not
    /// even be loaded.
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn extraction(&self) -> Option<&ExtractionResult> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ExtractError> {
        self.result.as_ref().err()
    }
}

impl Serialize for ItemOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ItemOutcome", 7)?;
        s.serialize_field("index", &self.index)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("status", if self.is_success() { "ok" } else { "error" })?;
        s.serialize_field("attempts", &self.attempts)?;
        s.serialize_field("duration_ms", &self.duration_ms)?;
        s.serialize_field("extraction", &self.extraction())?;
        s.serialize_field("error", &self.error())?;
        s.end()
    }
}

/// All outcomes of one batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
    /// Model identifier reported by the gateway.
    pub model: String,
    pub schema_version: SchemaVersion,
    /// Wall-clock time for the whole batch.
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// One-line `attempted / succeeded / failed` summary.
    pub fn summary(&self) -> String {
        format!(
            "{} attempted, {} succeeded, {} failed in {:.1}s",
            self.attempted(),
            self.succeeded(),
            self.failed(),
            self.duration_ms as f64 / 1000.0
        )
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

impl Serialize for BatchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BatchReport", 7)?;
        s.serialize_field("model", &self.model)?;
        s.serialize_field("schema_version", &self.schema_version)?;
        s.serialize_field("attempted", &self.attempted())?;
        s.serialize_field("succeeded", &self.succeeded())?;
        s.serialize_field("failed", &self.failed())?;
        s.serialize_field("duration_ms", &self.duration_ms)?;
        s.serialize_field("outcomes", &self.outcomes)?;
        s.end()
    }
}
