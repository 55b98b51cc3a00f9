/// Display helpers shared between the TUI and one-shot mode.
use crate::session::Role;

// ── Value masking ─────────────────────────────────────────────────────────────

const MASK_CHAR: char = '•';

/// Mask a secret-like configuration value for display.
///
/// Values of 8 characters or fewer are fully opaque; longer values keep the
/// first and last 4 characters visible around a run of at least 4 mask
/// characters. Char-counted, so multibyte input never splits a code point.
pub fn mask_value(value: &str, reveal: bool) -> String {
    if reveal || value.is_empty() {
        return value.to_string();
    }
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= 8 {
        return MASK_CHAR.to_string().repeat(len);
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[len - 4..].iter().collect();
    let middle = MASK_CHAR.to_string().repeat((len - 8).max(4));
    format!("{head}{middle}{tail}")
}

// ── Role labels ───────────────────────────────────────────────────────────────

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "agent",
    }
}

/// Local wall-clock time for a message timestamp, e.g. "14:05:31".
pub fn fmt_time(timestamp: chrono::DateTime<chrono::Utc>) -> String {
    timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_short_values_are_fully_opaque() {
        for len in 1..=8 {
            let value: String = "a".repeat(len);
            let masked = mask_value(&value, false);
            assert_eq!(masked.chars().count(), len);
            assert!(masked.chars().all(|c| c == '•'));
        }
    }

    #[test]
    fn masked_long_values_keep_head_and_tail() {
        let masked = mask_value("0123456789abcdef", false);
        assert!(masked.starts_with("0123"));
        assert!(masked.ends_with("cdef"));
        assert_eq!(masked.chars().filter(|c| *c == '•').count(), 8);
    }

    #[test]
    fn mask_run_never_shrinks_below_four() {
        // 9 chars: len - 8 = 1, but the middle stays at 4 mask chars.
        let masked = mask_value("123456789", false);
        assert_eq!(masked, "1234••••6789");
    }

    #[test]
    fn reveal_returns_value_unchanged() {
        assert_eq!(mask_value("secret-value", true), "secret-value");
        assert_eq!(mask_value("ab", true), "ab");
    }

    #[test]
    fn empty_value_stays_empty() {
        assert_eq!(mask_value("", false), "");
        assert_eq!(mask_value("", true), "");
    }

    #[test]
    fn multibyte_values_do_not_split_code_points() {
        let masked = mask_value("ééééééééééé", false);
        assert!(masked.starts_with("éééé"));
        assert!(masked.ends_with("éééé"));
    }
}
