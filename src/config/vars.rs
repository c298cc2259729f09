//! Environment variable interpolation for config files.
//!
//! Supported syntax:
//! - `$VAR` or `${VAR}` - substitute with the env var value, error if missing
//! - `${VAR:-default}` - use the default if VAR is unset or empty
//! - `$$` - escape sequence for a literal `$`

use std::env;
use std::sync::LazyLock;

use regex::Regex;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape sequence $$
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # braced variable name
            (?:
                :-
                ([^}]*)                # default value
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # unbraced $VAR
        ",
    )
    .expect("env var pattern is a valid regex")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Errors encountered, accumulated so all missing variables surface at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let full_match = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            if full_match == "$$" {
                return "$".to_string();
            }

            let var_name = caps
                .get(1)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(value) if value.is_empty() && default_value.is_some() => {
                    default_value.unwrap_or_default().to_string()
                }
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => {
                        errors.push(format!("environment variable '{var_name}' is not set"));
                        full_match.to_string()
                    }
                },
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        let result = interpolate("source:\n  path: /data/customers\n");
        assert!(result.is_ok());
        assert_eq!(result.text, "source:\n  path: /data/customers\n");
    }

    #[test]
    fn test_default_used_when_unset() {
        let result = interpolate("path: ${TALLY_TEST_UNSET_VAR:-/tmp/fallback}");
        assert!(result.is_ok());
        assert_eq!(result.text, "path: /tmp/fallback");
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let result = interpolate("path: ${TALLY_TEST_DEFINITELY_MISSING}");
        assert!(!result.is_ok());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_dollar_escape() {
        let result = interpolate("cost: $$5");
        assert!(result.is_ok());
        assert_eq!(result.text, "cost: $5");
    }

    #[test]
    fn test_multiple_errors_accumulate() {
        let result = interpolate("$TALLY_MISSING_ONE and ${TALLY_MISSING_TWO}");
        assert_eq!(result.errors.len(), 2);
    }
}
