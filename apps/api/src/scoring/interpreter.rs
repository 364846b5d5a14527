//! Response Interpreter: turns raw model text into an `EvaluationResult`.
//!
//! Parsing is an ordered list of strategies; the first that recognises the reply wins:
//! 1. `strict_json`: the whole reply is a JSON object
//! 2. `fenced_json`: a JSON object inside a markdown code fence
//! 3. `embedded_json`: the outermost `{ ... }` span inside surrounding prose
//! 4. `field_scan`: `key: number` patterns for each schema field in loose text
//!
//! Never fails. Missing numeric fields become 0 and mark the record `partial`.
//! The caller's filename is authoritative: whatever key the model used, the
//! record is stored under `resume_filename`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::scoring::models::{EvaluationResult, ScoreRecord, ScorerBackend};
use crate::scoring::prompts::{RECOMMENDATIONS_KEY, SCORES_KEY, SCORE_FIELDS};
use crate::scoring::truncate::{truncate_to_budget, RESPONSE_TOKEN_BUDGET};

pub const DEFAULT_RECOMMENDATIONS: &str = "Your resume shows good potential. Consider \
    highlighting more specific achievements and quantifiable results to strengthen your \
    application.";

/// Recovered text shorter than this is replaced by `DEFAULT_RECOMMENDATIONS`.
const MIN_RECOMMENDATIONS_CHARS: usize = 10;

/// Field values in `SCORE_FIELDS` order, before clamping.
#[derive(Debug, Default, Clone, PartialEq)]
struct ParsedReply {
    fields: [Option<i64>; SCORE_FIELDS.len()],
    recommendations: Option<String>,
}

struct ParseStrategy {
    name: &'static str,
    parse: fn(&str, &str) -> Option<ParsedReply>,
}

const STRATEGIES: &[ParseStrategy] = &[
    ParseStrategy {
        name: "strict_json",
        parse: parse_strict_json,
    },
    ParseStrategy {
        name: "fenced_json",
        parse: parse_fenced_json,
    },
    ParseStrategy {
        name: "embedded_json",
        parse: parse_embedded_json,
    },
    ParseStrategy {
        name: "field_scan",
        parse: parse_field_scan,
    },
];

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("fence pattern is valid")
});

static FIELD_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SCORE_FIELDS
        .iter()
        .map(|field| {
            // overall_score, "overall score", overall-score ...
            let name = field.replace('_', r"[_\s-]?");
            Regex::new(&format!(
                r#"(?i)["']?\b{name}["']?\s*[:=]\s*["']?(-?\d+(?:\.\d+)?)"#
            ))
            .expect("field pattern is valid")
        })
        .collect()
});

static RECOMMENDATIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)"recommendations"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("recommendations pattern is valid")
});

/// Parses a raw model reply. Always returns a result, degraded if necessary.
pub fn interpret(raw: &str, resume_filename: &str) -> EvaluationResult {
    let parsed = STRATEGIES.iter().find_map(|strategy| {
        (strategy.parse)(raw, resume_filename).map(|reply| {
            debug!(
                "Parsed reply for {} with strategy {}",
                resume_filename, strategy.name
            );
            reply
        })
    });

    let mut parsed = parsed.unwrap_or_else(|| {
        warn!(
            "No parse strategy recognised the reply for {}; scoring as partial",
            resume_filename
        );
        ParsedReply {
            recommendations: Some(recover_recommendations_from_text(raw)),
            ..ParsedReply::default()
        }
    });

    // Second pass: fields the structured parse left empty may still be findable in the text.
    if parsed.fields.iter().any(Option::is_none) {
        for (slot, scanned) in parsed.fields.iter_mut().zip(scan_fields(raw)) {
            if slot.is_none() {
                *slot = scanned;
            }
        }
    }

    let partial = parsed.fields.iter().any(Option::is_none) || parsed.recommendations.is_none();
    if partial {
        warn!("Reply for {} was missing fields; defaulted to 0", resume_filename);
    }

    let [overall, skills, experience, education, found, total] =
        parsed.fields.map(|v| v.unwrap_or(0));
    let record = ScoreRecord::new(overall, skills, experience, education, found, total)
        .with_partial(partial);

    let recommendations = parsed
        .recommendations
        .filter(|r| r.trim().chars().count() >= MIN_RECOMMENDATIONS_CHARS)
        .map(|r| truncate_to_budget(r.trim(), RESPONSE_TOKEN_BUDGET).into_owned())
        .unwrap_or_else(|| DEFAULT_RECOMMENDATIONS.to_string());

    EvaluationResult::single(resume_filename, record, recommendations, ScorerBackend::Remote)
}

// ────────────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────────────

fn parse_strict_json(raw: &str, filename: &str) -> Option<ParsedReply> {
    from_json_text(raw.trim(), filename)
}

fn parse_fenced_json(raw: &str, filename: &str) -> Option<ParsedReply> {
    FENCE_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .find_map(|m| from_json_text(m.as_str().trim(), filename))
}

fn parse_embedded_json(raw: &str, filename: &str) -> Option<ParsedReply> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    from_json_text(&raw[start..=end], filename)
}

fn parse_field_scan(raw: &str, _filename: &str) -> Option<ParsedReply> {
    let fields = scan_fields(raw);
    if fields.iter().all(Option::is_none) {
        return None;
    }
    Some(ParsedReply {
        fields,
        recommendations: Some(recover_recommendations_from_text(raw)),
    })
}

fn scan_fields(raw: &str) -> [Option<i64>; SCORE_FIELDS.len()] {
    let mut fields = [None; SCORE_FIELDS.len()];
    for (slot, re) in fields.iter_mut().zip(FIELD_RES.iter()) {
        *slot = re
            .captures(raw)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|n| n.round() as i64);
    }
    fields
}

// ────────────────────────────────────────────────────────────────────────────
// JSON helpers
// ────────────────────────────────────────────────────────────────────────────

/// How deep to look for the schema when the model wraps it in extra objects.
const MAX_WRAPPER_DEPTH: usize = 4;

/// A JSON object without any schema key is not a recognised reply, so the
/// next strategy gets a chance at it.
fn from_json_text(text: &str, filename: &str) -> Option<ParsedReply> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(root) => {
            find_schema_root(&root, 0).map(|schema| from_json_object(schema, filename))
        }
        _ => None,
    }
}

/// The object carrying the reply schema: `root` itself, or the first nested
/// object (e.g. `{"evaluation": {"scores": ...}}`) that has a schema key.
fn find_schema_root(map: &Map<String, Value>, depth: usize) -> Option<&Map<String, Value>> {
    if map.contains_key(SCORES_KEY) || map.contains_key(RECOMMENDATIONS_KEY) || has_score_field(map) {
        return Some(map);
    }
    if depth >= MAX_WRAPPER_DEPTH {
        return None;
    }
    map.values()
        .filter_map(Value::as_object)
        .find_map(|child| find_schema_root(child, depth + 1))
}

fn from_json_object(root: &Map<String, Value>, filename: &str) -> ParsedReply {
    let mut reply = ParsedReply::default();

    if let Some(record) = locate_record(root, filename) {
        for (slot, field) in reply.fields.iter_mut().zip(SCORE_FIELDS) {
            *slot = record.get(field).and_then(number_from_value);
        }
    }

    reply.recommendations = match root.get(RECOMMENDATIONS_KEY) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    };

    reply
}

/// Finds the score object, tolerating a mismatched filename key or a flat layout.
fn locate_record<'a>(root: &'a Map<String, Value>, filename: &str) -> Option<&'a Map<String, Value>> {
    let Some(scores) = root.get(SCORES_KEY).and_then(Value::as_object) else {
        // No "scores" wrapper: fields may sit at the top level.
        return has_score_field(root).then_some(root);
    };

    if let Some(record) = scores.get(filename).and_then(Value::as_object) {
        return Some(record);
    }
    if has_score_field(scores) {
        return Some(scores);
    }
    scores
        .values()
        .filter_map(Value::as_object)
        .find(|candidate| has_score_field(candidate))
}

fn has_score_field(map: &Map<String, Value>) -> bool {
    SCORE_FIELDS.iter().any(|field| map.contains_key(*field))
}

fn number_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok()
            .map(|f| f.round() as i64),
        _ => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loose recommendations recovery
// ────────────────────────────────────────────────────────────────────────────

/// Best-effort recommendations from non-JSON text:
/// a quoted `"recommendations": "..."` value, else the lines from the first
/// mention of "recommendations" onward, else the whole reply.
fn recover_recommendations_from_text(raw: &str) -> String {
    if let Some(value) = RECOMMENDATIONS_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str::<String>(&format!("\"{}\"", m.as_str())).ok())
    {
        if !value.trim().is_empty() {
            return value;
        }
    }

    if raw.to_lowercase().contains("recommendations") {
        let lines: Vec<&str> = raw
            .lines()
            .skip_while(|line| !line.to_lowercase().contains("recommendations"))
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("\"recommendations\""))
            .collect();
        if !lines.is_empty() {
            return lines.join(" ");
        }
    }

    raw.trim().to_string()
}
