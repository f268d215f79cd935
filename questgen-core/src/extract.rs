use serde_json::{Map, Value};

use crate::{GenerationError, ParsedResult};

/// Pulls the JSON object out of a model response that may wrap it in prose or
/// markdown fences.
///
/// Candidates are the top-level balanced `{ ... }` groups of the response, in
/// order. Braces inside string literals are ignored. The first candidate that
/// parses as a JSON object wins; an unterminated group ends the search.
pub fn extract(raw_response: &str) -> Result<ParsedResult, GenerationError> {
    let text = strip_code_fence(raw_response.trim());
    let mut offset = 0;
    let mut last_parse_error = None;

    while let Some(relative_start) = text[offset..].find('{') {
        let start = offset + relative_start;
        let Some(end) = matching_brace(text, start) else {
            return Err(invalid(
                raw_response,
                "response contains an unbalanced JSON object",
            ));
        };

        let candidate = &text[start..=end];
        match serde_json::from_str::<Map<String, Value>>(candidate) {
            Ok(fields) => return Ok(ParsedResult::unscored(fields)),
            Err(err) => {
                tracing::trace!(error = %err, "skipping unparseable JSON candidate");
                last_parse_error = Some(err);
                offset = end + 1;
            }
        }
    }

    let reason = match last_parse_error {
        Some(err) => format!("no parseable JSON object in response: {err}"),
        None => "no JSON object found in response".to_string(),
    };
    Err(invalid(raw_response, reason))
}

fn invalid(raw_response: &str, reason: impl Into<String>) -> GenerationError {
    GenerationError::Validation {
        reason: reason.into(),
        raw_response: Some(raw_response.to_string()),
        partial: None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Byte index of the brace closing the one opened at `start`.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, byte) in text.bytes().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}
