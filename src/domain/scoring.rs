use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentence label the engine uses for silence segments.
const SILENCE_LABEL: &str = "!SIL";

/// Score-stage body, which the engine sometimes encodes twice.
///
/// Either the whole body is a JSON string, or an object carries a `result` string holding
/// the real payload. When the inner text does not decode to an object the outer value is
/// used as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreBody {
    Nested { outer: Value, inner: Value },
    Plain(Value),
}

impl ScoreBody {
    pub fn decode(outer: Value) -> Self {
        let encoded = match &outer {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("result").and_then(Value::as_str),
            _ => None,
        };

        match encoded.and_then(|s| serde_json::from_str::<Value>(s).ok()) {
            Some(inner) if inner.is_object() => ScoreBody::Nested { outer, inner },
            _ => ScoreBody::Plain(outer),
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, ScoreBody::Nested { .. })
    }

    /// The payload to read scores from.
    pub fn into_payload(self) -> Value {
        match self {
            ScoreBody::Nested { inner, .. } => inner,
            ScoreBody::Plain(value) => value,
        }
    }
}

/// Score of one recognised sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceScore {
    pub text: String,
    pub score: f64,
}

/// What the pipeline reads out of a score payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub score: f64,
    pub sentences: Vec<SentenceScore>,
}

/// Pull the overall score out of a decoded score payload.
///
/// Looks inside a `result` object when there is one, then tries a top-level `score`,
/// then `quality.score`, then the first non-silence entry of `quality.sentences`.
pub fn extract_score(payload: &Value) -> Option<ScoreSummary> {
    let data = match payload.get("result") {
        Some(inner @ Value::Object(_)) => inner,
        _ => payload,
    };

    let quality = data.get("quality").filter(|q| q.is_object());
    let sentences = quality
        .and_then(|q| q.get("sentences"))
        .and_then(Value::as_array)
        .map(|items| spoken_sentences(items))
        .unwrap_or_default();

    let score = data
        .get("score")
        .and_then(as_number)
        .or_else(|| quality.and_then(|q| q.get("score")).and_then(as_number))
        .or_else(|| sentences.first().map(|s| s.score))?;

    Some(ScoreSummary { score, sentences })
}

fn spoken_sentences(items: &[Value]) -> Vec<SentenceScore> {
    items
        .iter()
        .filter_map(|item| {
            let text = item.get("text").and_then(Value::as_str).unwrap_or_default();
            if text == SILENCE_LABEL {
                return None;
            }
            let score = item.get("score").and_then(as_number)?;
            Some(SentenceScore {
                text: text.to_string(),
                score,
            })
        })
        .collect()
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

/// Score band shown to the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    Good,
    Ok,
    NeedsPractice,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            Grade::Excellent
        } else if score >= 88.0 {
            Grade::Good
        } else if score >= 80.0 {
            Grade::Ok
        } else {
            Grade::NeedsPractice
        }
    }

    pub fn feedback(&self) -> &'static str {
        match self {
            Grade::Excellent => "Very accurate and natural pronunciation.",
            Grade::Good => "Good overall. Try to make the intonation a little clearer.",
            Grade::Ok => "The meaning comes across. Pay a bit more attention to final consonants and linking.",
            Grade::NeedsPractice => "Practice slowly and clearly, repeating each syllable.",
        }
    }
}
