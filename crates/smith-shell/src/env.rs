//! Subprocess environment sanitization.
//!
//! Tool subprocesses inherit the agent's environment minus anything that
//! looks like a credential. Matching is glob-based and case-insensitive.

/// Default deny-list patterns for sensitive environment variables.
const DEFAULT_ENV_DENY_PATTERNS: &[&str] = &[
    "*_KEY",
    "*_SECRET",
    "*_TOKEN",
    "*_PASSWORD",
    "*_CREDENTIAL*",
    "AWS_*",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "DATABASE_URL",
    "PRIVATE_KEY",
    "SSH_*_KEY",
];

/// Filter sensitive variables out of an environment snapshot.
///
/// If `deny_patterns` is empty, the built-in defaults are used.
pub fn sanitize_env(env: &[(String, String)], deny_patterns: &[String]) -> Vec<(String, String)> {
    let patterns: Vec<String> = if deny_patterns.is_empty() {
        DEFAULT_ENV_DENY_PATTERNS
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        deny_patterns.to_vec()
    };

    env.iter()
        .filter(|(key, _)| !patterns.iter().any(|pat| glob_match(key, pat)))
        .cloned()
        .collect()
}

/// Case-insensitive glob match: `*` matches any sequence, `?` exactly one
/// character.
pub fn glob_match(key: &str, pattern: &str) -> bool {
    glob_match_bytes(
        key.to_uppercase().as_bytes(),
        pattern.to_uppercase().as_bytes(),
    )
}

/// Iterative byte-level glob matcher with single-star backtracking.
fn glob_match_bytes(text: &[u8], pattern: &[u8]) -> bool {
    let mut t = 0;
    let mut p = 0;
    let mut star_p = usize::MAX;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star_p = p;
            star_t = t;
            p += 1;
        } else if star_p != usize::MAX {
            p = star_p + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
