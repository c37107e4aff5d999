//! Result normalization
//!
//! Upstream engines report finished transcriptions in different shapes. This
//! module resolves them into one canonical [`Transcript`]: a full text plus an
//! ordered list of timestamped [`Segment`]s.
//!
//! Malformed payloads never produce an error. They degrade to a transcript
//! with a placeholder text and no segments.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text used when the payload shape is not recognized
pub const UNRECOGNIZED_RESULT_TEXT: &str =
    "Transcription finished, but the result format was not recognized.";

/// One timestamped span of transcript text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Segment text
    pub text: String,
    /// Speaker label, when diarization was performed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Canonical transcription result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    /// Full transcript text
    pub text: String,
    /// Segments in upstream order
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// Engine payload kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Utterance as reported by the nested engine shape
#[derive(Debug, Deserialize)]
struct Utterance {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    speaker: Option<Value>,
}

/// Recognized shapes of a completed job's `result` value
#[derive(Debug)]
pub enum TranscriptPayload {
    /// `{result: {transcription: {utterances: [...]}}}`
    Utterances { utterances: Vec<Segment>, raw: Value },
    /// `{text, segments}`
    Flat { text: String, segments: Vec<Segment> },
    /// Anything else
    Unrecognized(Value),
}

impl TranscriptPayload {
    /// Detect the shape of a status response's `result` value
    pub fn detect(result: &Value) -> Self {
        let engine = result.get("result");
        let utterances = engine
            .and_then(|r| r.get("transcription"))
            .and_then(|t| t.get("utterances"))
            .and_then(Value::as_array);

        if let (Some(engine), Some(items)) = (engine, utterances) {
            let utterances = items
                .iter()
                .filter_map(|item| match Utterance::deserialize(item) {
                    Ok(u) => Some(u.into_segment()),
                    Err(e) => {
                        warn!("Skipping malformed utterance: {}", e);
                        None
                    }
                })
                .collect();
            return TranscriptPayload::Utterances {
                utterances,
                raw: engine.clone(),
            };
        }

        if let Some(text) = result.get("text").and_then(Value::as_str) {
            let segments = result
                .get("segments")
                .and_then(Value::as_array)
                .map(|items| parse_segments(items))
                .unwrap_or_default();
            return TranscriptPayload::Flat {
                text: text.to_string(),
                segments,
            };
        }

        TranscriptPayload::Unrecognized(result.clone())
    }

    /// Whether the payload carries an actual transcript
    pub fn is_recognized(&self) -> bool {
        !matches!(self, TranscriptPayload::Unrecognized(_))
    }

    /// Map the payload to the canonical transcript
    pub fn into_transcript(self) -> Transcript {
        match self {
            TranscriptPayload::Utterances { utterances, raw } => {
                let text = utterances
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
                    .trim()
                    .to_string();
                Transcript {
                    text,
                    segments: check_ordering(utterances),
                    raw: Some(raw),
                }
            }
            TranscriptPayload::Flat { text, segments } => Transcript {
                text,
                segments: check_ordering(segments),
                raw: None,
            },
            TranscriptPayload::Unrecognized(raw) => {
                warn!("Unexpected transcription result format");
                Transcript {
                    text: UNRECOGNIZED_RESULT_TEXT.to_string(),
                    segments: Vec::new(),
                    raw: Some(raw),
                }
            }
        }
    }
}

impl Transcript {
    /// Normalize a status response's `result` value
    pub fn from_result(result: &Value) -> Self {
        TranscriptPayload::detect(result).into_transcript()
    }
}

impl Utterance {
    fn into_segment(self) -> Segment {
        let text = self.text.or(self.transcript).unwrap_or_default();
        repair_segment(Segment {
            start: self.start,
            end: self.end,
            text,
            speaker: self.speaker.and_then(speaker_label),
        })
    }
}

fn speaker_label(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_segments(items: &[Value]) -> Vec<Segment> {
    items
        .iter()
        .filter_map(|item| match Segment::deserialize(item) {
            Ok(segment) => Some(repair_segment(segment)),
            Err(e) => {
                warn!("Skipping malformed segment: {}", e);
                None
            }
        })
        .collect()
}

fn repair_segment(mut segment: Segment) -> Segment {
    if !segment.start.is_finite() || segment.start < 0.0 {
        warn!("Segment with invalid start {} clamped to 0", segment.start);
        segment.start = 0.0;
    }
    if !segment.end.is_finite() || segment.end < segment.start {
        warn!(
            "Segment ending at {} before its start {}, clamping",
            segment.end, segment.start
        );
        segment.end = segment.start;
    }
    segment
}

// Upstream order is kept even when it is not monotonic.
fn check_ordering(segments: Vec<Segment>) -> Vec<Segment> {
    if segments.windows(2).any(|w| w[1].start < w[0].start) {
        warn!("Transcript segments are not ordered by start time");
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_utterances_are_joined_and_mapped() {
        let status = json!({
            "status": "completed",
            "result": {"result": {"transcription": {"utterances": [
                {"start": 0, "end": 1, "text": "hi"},
                {"start": 1, "end": 2, "text": "there"}
            ]}}}
        });

        let transcript = Transcript::from_result(&status["result"]);
        assert_eq!(transcript.text, "hi there");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].start, 0.0);
        assert_eq!(transcript.segments[0].end, 1.0);
        assert_eq!(transcript.segments[0].text, "hi");
        assert_eq!(transcript.segments[1].start, 1.0);
        assert_eq!(transcript.segments[1].end, 2.0);
        assert_eq!(transcript.segments[1].text, "there");
        assert!(transcript.raw.is_some());
    }

    #[test]
    fn test_utterance_falls_back_to_transcript_field() {
        let result = json!({"result": {"transcription": {"utterances": [
            {"start": 0.5, "end": 1.5, "transcript": " bonjour ", "speaker": 1}
        ]}}});

        let transcript = Transcript::from_result(&result);
        assert_eq!(transcript.text, "bonjour");
        assert_eq!(transcript.segments[0].speaker.as_deref(), Some("1"));
    }

    #[test]
    fn test_flat_shape_is_kept() {
        let result = json!({
            "text": "hello world",
            "segments": [{"start": 0.0, "end": 2.0, "text": "hello world", "speaker": "A"}]
        });

        let transcript = Transcript::from_result(&result);
        assert_eq!(transcript.text, "hello world");
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].speaker.as_deref(), Some("A"));
        assert!(transcript.raw.is_none());
    }

    #[test]
    fn test_unrecognized_shape_degrades_to_placeholder() {
        let result = json!({"foo": "bar"});
        let payload = TranscriptPayload::detect(&result);
        assert!(!payload.is_recognized());

        let transcript = payload.into_transcript();
        assert_eq!(transcript.text, UNRECOGNIZED_RESULT_TEXT);
        assert!(transcript.segments.is_empty());
    }

    #[test]
    fn test_segment_ending_before_start_is_clamped() {
        let result = json!({"text": "x", "segments": [{"start": 3.0, "end": 1.0, "text": "x"}]});
        let transcript = Transcript::from_result(&result);
        assert_eq!(transcript.segments[0].start, 3.0);
        assert_eq!(transcript.segments[0].end, 3.0);
    }

    #[test]
    fn test_out_of_order_segments_are_not_resorted() {
        let result = json!({"text": "b a", "segments": [
            {"start": 5.0, "end": 6.0, "text": "b"},
            {"start": 1.0, "end": 2.0, "text": "a"}
        ]});
        let transcript = Transcript::from_result(&result);
        assert_eq!(transcript.segments[0].text, "b");
        assert_eq!(transcript.segments[1].text, "a");
    }

    #[test]
    fn test_malformed_utterances_are_skipped() {
        let result = json!({"result": {"transcription": {"utterances": [
            "garbage",
            {"start": 0, "end": 1, "text": "ok"}
        ]}}});
        let transcript = Transcript::from_result(&result);
        assert_eq!(transcript.text, "ok");
        assert_eq!(transcript.segments.len(), 1);
    }
}
