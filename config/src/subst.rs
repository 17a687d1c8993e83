//! `${ENV_VAR}` substitution over the raw YAML text, before parsing.
//!
//! Only the `${NAME}` form is recognized (NAME: ASCII alphanumeric plus `_`).
//! A reference to an unset variable is an error, not an empty string; secrets
//! silently collapsing to "" would pass validation they should fail.

use crate::LoadError;

/// Replaces every `${NAME}` in `raw` with the value of the environment variable
/// `NAME`. `$` not followed by `{` is left as-is.
pub fn substitute_env(raw: &str) -> Result<String, LoadError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if is_var_name(&after[..end]) => {
                let name = &after[..end];
                let value = std::env::var(name)
                    .map_err(|_| LoadError::MissingEnv(name.to_string()))?;
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            _ => {
                // Unterminated or non-identifier contents: keep literal "${".
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn is_var_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
