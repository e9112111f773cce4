use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire keys used by the scoring engine. The spaces are part of the contract.
pub mod fields {
    pub const ID: &str = "id";
    pub const TEXT: &str = "text";
    pub const SYLL_LTRS: &str = "syll ltrs";
    pub const SYLL_PHNS: &str = "syll phns";
    pub const FST: &str = "fst";
    pub const WAV_USR: &str = "wav usr";
    pub const CONFIG: &str = "config";

    pub const SYLL_LTRS_ALIASES: &[&str] = &["syll ltrs", "syll_ltrs"];
    pub const SYLL_PHNS_ALIASES: &[&str] = &["syll phns", "syll_phns"];
    pub const FST_ALIASES: &[&str] = &["fst"];
    pub const ERROR_CODE_ALIASES: &[&str] = &["error code", "error_code", "errorCode"];
}

/// One of the three ordered exchanges with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Gtp,
    Model,
    Score,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Gtp => "gtp",
            Stage::Model => "model",
            Stage::Score => "score",
        }
    }

    /// Fields that must be present and non-empty in a successful response.
    ///
    /// Each entry lists the accepted spellings of one field.
    pub fn required_fields(&self) -> &'static [&'static [&'static str]] {
        match self {
            Stage::Gtp => &[fields::SYLL_LTRS_ALIASES, fields::SYLL_PHNS_ALIASES],
            Stage::Model => &[fields::FST_ALIASES],
            Stage::Score => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a pipeline run stopped when it did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailedStage {
    /// Rejected before any engine call (empty text or audio).
    Input,
    Gtp,
    Model,
    Score,
}

impl From<Stage> for FailedStage {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Gtp => FailedStage::Gtp,
            Stage::Model => FailedStage::Model,
            Stage::Score => FailedStage::Score,
        }
    }
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailedStage::Input => "input",
            FailedStage::Gtp => "gtp",
            FailedStage::Model => "model",
            FailedStage::Score => "score",
        };
        f.write_str(name)
    }
}

/// Decoded body of a stage response.
///
/// The orchestrator only forwards values between stages; it never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageOutput(Map<String, Value>);

impl StageOutput {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// First non-null value among `keys`.
    pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !v.is_null())
    }

    /// Like [`get_any`](Self::get_any), but also skips empty strings, arrays and objects.
    pub fn get_present(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !is_blank(v))
    }

    /// Engine-reported error code; 0 means success.
    pub fn error_code(&self) -> i64 {
        error_code_in(&self.0)
    }

    /// Names of required fields missing from this output.
    pub fn missing_fields(&self, stage: Stage) -> Vec<&'static str> {
        stage
            .required_fields()
            .iter()
            .filter(|aliases| self.get_present(aliases).is_none())
            .map(|aliases| aliases[0])
            .collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Error code of a raw engine body; 0 means success.
///
/// Accepts numbers and numeric strings. Anything else counts as 0.
pub fn error_code_in(body: &Map<String, Value>) -> i64 {
    let code = fields::ERROR_CODE_ALIASES
        .iter()
        .filter_map(|k| body.get(*k))
        .find(|v| !v.is_null());
    match code {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(value: Value) -> StageOutput {
        match value {
            Value::Object(map) => StageOutput::new(map),
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn test_error_code_variants() {
        assert_eq!(output(json!({})).error_code(), 0);
        assert_eq!(output(json!({"error code": 0})).error_code(), 0);
        assert_eq!(output(json!({"error code": 3})).error_code(), 3);
        assert_eq!(output(json!({"error_code": "7"})).error_code(), 7);
        assert_eq!(output(json!({"errorCode": -1})).error_code(), -1);
        assert_eq!(output(json!({"error code": "n/a"})).error_code(), 0);
    }

    #[test]
    fn test_missing_fields_accepts_aliases() {
        let gtp = output(json!({"syll_ltrs": "안녕", "syll phns": "a n"}));
        assert!(gtp.missing_fields(Stage::Gtp).is_empty());

        let gtp = output(json!({"syll ltrs": "", "syll phns": "a n"}));
        assert_eq!(gtp.missing_fields(Stage::Gtp), vec!["syll ltrs"]);

        let model = output(json!({"syll ltrs": "x"}));
        assert_eq!(model.missing_fields(Stage::Model), vec!["fst"]);
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&FailedStage::Score).unwrap(), "\"score\"");
        assert_eq!(FailedStage::from(Stage::Gtp), FailedStage::Gtp);
        assert_eq!(Stage::Model.to_string(), "model");
    }
}
