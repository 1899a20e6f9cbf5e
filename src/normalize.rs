/// Literal text the source data uses to mean "no value". Distinct from an
/// actually empty field.
pub const NULL_SENTINEL: &str = "null";

/// Reduce a raw phone field to a 10-digit mobile number.
///
/// Strips every non-digit character and keeps the first 10 digits; anything
/// beyond that (extensions, country-code suffixes) is dropped on purpose.
/// Returns `None` for the `null` sentinel or when fewer than 10 digits remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    if raw == NULL_SENTINEL {
        return None;
    }
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[..10].to_string())
}

/// Map the `null` sentinel and the empty string to "absent"; pass every other
/// value through unchanged.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == NULL_SENTINEL {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Empty input yields `default`; anything else passes through.
pub fn default_categorical(raw: &str, default: &str) -> String {
    if raw.is_empty() {
        default.to_string()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_strips_punctuation_and_truncates() {
        assert_eq!(
            normalize_phone("(98) 765-43210x9").as_deref(),
            Some("9876543210")
        );
    }

    #[test]
    fn phone_rejects_short_and_sentinel() {
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("null"), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[test]
    fn phone_is_idempotent_on_its_own_output() {
        let once = normalize_phone("+91 98765 43210").expect("first pass");
        let twice = normalize_phone(&once).expect("second pass");
        assert_eq!(once, twice);
        assert_eq!(once, "9876543210");
    }

    #[test]
    fn identifier_maps_sentinel_and_empty_to_absent() {
        assert_eq!(normalize_identifier("null"), None);
        assert_eq!(normalize_identifier(""), None);
        assert_eq!(normalize_identifier("T-104").as_deref(), Some("T-104"));
    }

    #[test]
    fn categorical_defaults_only_when_empty() {
        assert_eq!(default_categorical("", "Primary"), "Primary");
        assert_eq!(default_categorical("Secondary", "Primary"), "Secondary");
    }
}
