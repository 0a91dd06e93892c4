//! `${VAR}` substitution against the process environment.
//!
//! Per §9: substitution must be *total*. A placeholder referencing an unset
//! variable is preserved verbatim in the output rather than replaced with an
//! empty string, so that downstream consumers (notably the OAuth2
//! pre-activation check, §4.1) can detect it and fail loudly instead of
//! silently misconfiguring a route.

use std::collections::HashMap;

/// Substitutes every `${VAR}` occurrence in `input` using `env`.
///
/// Unknown variables are left as literal `${VAR}` text. A small set of
/// reserved names used by process environment construction (§3) are resolved
/// from `reserved` first, taking priority over `env`.
pub fn substitute(input: &str, env: &HashMap<String, String>) -> String {
    substitute_with_reserved(input, env, &HashMap::new())
}

/// Like [`substitute`], but `reserved` entries (e.g. `PROCESS_ID`, `TIMESTAMP`)
/// take precedence over `env` for the same key.
pub fn substitute_with_reserved(
    input: &str,
    env: &HashMap<String, String>,
    reserved: &HashMap<String, String>,
) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end) = input[i + 2..].find('}') {
                let name = &input[i + 2..i + 2 + end];
                if let Some(v) = reserved.get(name).or_else(|| env.get(name)) {
                    out.push_str(v);
                } else {
                    // Unresolved: preserve verbatim, including the braces.
                    out.push_str(&input[i..i + 2 + end + 1]);
                }
                i += 2 + end + 1;
                continue;
            }
        }
        // Fall through: copy one char at a time (safe for multi-byte UTF-8
        // since we only branch on the ASCII '$' byte above).
        let ch_len = input[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Returns true if `s` still contains an unresolved `${...}` placeholder.
pub fn has_unresolved_placeholder(s: &str) -> bool {
    if let Some(start) = s.find("${") {
        s[start + 2..].contains('}')
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_vars() {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/root".to_string());
        assert_eq!(substitute("path=${HOME}/x", &env), "path=/root/x");
    }

    #[test]
    fn preserves_unknown_vars_verbatim() {
        let env = HashMap::new();
        assert_eq!(substitute("id=${MISSING}", &env), "id=${MISSING}");
        assert!(has_unresolved_placeholder("id=${MISSING}"));
    }

    #[test]
    fn reserved_takes_priority_over_env() {
        let mut env = HashMap::new();
        env.insert("PROCESS_ID".to_string(), "from-env".to_string());
        let mut reserved = HashMap::new();
        reserved.insert("PROCESS_ID".to_string(), "from-reserved".to_string());
        assert_eq!(
            substitute_with_reserved("${PROCESS_ID}", &env, &reserved),
            "from-reserved"
        );
    }

    #[test]
    fn handles_multiple_and_adjacent_placeholders() {
        let mut env = HashMap::new();
        env.insert("A".to_string(), "1".to_string());
        env.insert("B".to_string(), "2".to_string());
        assert_eq!(substitute("${A}${B}-${A}", &env), "12-1");
    }
}
