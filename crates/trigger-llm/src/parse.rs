use serde::Deserialize;

/// The model's verdict on a rule, parsed from its response content.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LlmOutcome {
    pub should_trigger: bool,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    should_trigger: bool,
    confidence: f64,
    reason: String,
}

/// Extract the first balanced `{...}` JSON object from `content` —
/// handling both a bare object and one fenced in a ```json block```,
/// with arbitrary prose around it — and parse it into an
/// [`LlmOutcome`].
///
/// Never executes model-returned content; this is a pure data parse.
pub fn parse_llm_response(content: &str) -> Result<LlmOutcome, String> {
    let candidate = extract_balanced_json(content).ok_or_else(|| "no JSON object found".to_string())?;
    let raw: RawVerdict =
        serde_json::from_str(&candidate).map_err(|e| format!("json decode: {e}"))?;

    if !raw.confidence.is_finite() {
        return Err("confidence is not a finite number".to_string());
    }

    Ok(LlmOutcome {
        should_trigger: raw.should_trigger,
        confidence: raw.confidence,
        reason: raw.reason,
    })
}

/// Scan `content` for the first `{` and return the substring up to its
/// matching `}`, respecting string literals and escapes so braces
/// inside a JSON string value don't confuse the brace counter.
fn extract_balanced_json(content: &str) -> Option<String> {
    let bytes = content.as_bytes();
    let start = content.find('{')?;

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes[start..].iter().enumerate() {
        let ch = *byte as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(content[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
