//! `WWW-Authenticate` challenge parsing (RFC 6750 / RFC 9110 §11.6.1).

use std::collections::HashMap;

/// One Bearer challenge with its auth-params.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerChallenge {
    /// Challenge parameters (`realm`, `scope`, `error`,
    /// `resource_metadata`, ...) with quotes removed
    pub params: HashMap<String, String>,
}

impl BearerChallenge {
    /// The `scope` parameter, authoritative for the request when present.
    pub fn scope(&self) -> Option<&str> {
        self.params.get("scope").map(String::as_str)
    }

    /// The `error` parameter.
    pub fn error(&self) -> Option<&str> {
        self.params.get("error").map(String::as_str)
    }

    /// The RFC 9728 `resource_metadata` pointer.
    pub fn resource_metadata(&self) -> Option<&str> {
        self.params.get("resource_metadata").map(String::as_str)
    }
}

/// Parse every Bearer challenge out of a list of `WWW-Authenticate` header
/// values. Non-Bearer schemes are skipped; a header may carry several
/// challenges.
pub fn parse_bearer_challenges(headers: &[String]) -> Vec<BearerChallenge> {
    let mut challenges = Vec::new();
    for header in headers {
        let mut current: Option<(String, BearerChallenge)> = None;
        for part in split_respecting_quotes(header) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match parse_param(part) {
                // `scheme param=value` opens a new challenge.
                Some((Some(scheme), key, value)) => {
                    finish(&mut current, &mut challenges);
                    let mut challenge = BearerChallenge::default();
                    challenge.params.insert(key, value);
                    current = Some((scheme, challenge));
                }
                // `param=value` continues the current challenge.
                Some((None, key, value)) => {
                    if let Some((_, challenge)) = &mut current {
                        challenge.params.insert(key, value);
                    }
                }
                // A bare token is a scheme with no params (e.g. `Bearer`).
                None => {
                    finish(&mut current, &mut challenges);
                    current = Some((part.to_string(), BearerChallenge::default()));
                }
            }
        }
        finish(&mut current, &mut challenges);
    }
    challenges
}

fn finish(
    current: &mut Option<(String, BearerChallenge)>,
    challenges: &mut Vec<BearerChallenge>,
) {
    if let Some((scheme, challenge)) = current.take() {
        if scheme.eq_ignore_ascii_case("bearer") {
            challenges.push(challenge);
        }
    }
}

/// Split on commas that are not inside quoted strings.
fn split_respecting_quotes(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buffer = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in input.chars() {
        match c {
            '\\' if in_quotes && !escaped => escaped = true,
            '"' if !escaped => {
                in_quotes = !in_quotes;
                buffer.push(c);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut buffer));
            }
            _ => {
                escaped = false;
                buffer.push(c);
            }
        }
    }
    if !buffer.is_empty() {
        parts.push(buffer);
    }
    parts
}

/// Parse one comma-separated part into `(leading scheme, key, value)`.
/// Returns `None` for a bare scheme token.
fn parse_param(part: &str) -> Option<(Option<String>, String, String)> {
    let eq = part.find('=')?;
    let (lhs, rhs) = part.split_at(eq);
    let value = unquote(rhs[1..].trim());

    let lhs = lhs.trim();
    match lhs.split_once(char::is_whitespace) {
        Some((scheme, key)) => Some((
            Some(scheme.to_string()),
            key.trim().to_string(),
            value,
        )),
        None => Some((None, lhs.to_string(), value)),
    }
}

fn unquote(value: &str) -> String {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    stripped.replace("\\\"", "\"").replace("\\\\", "\\")
}
