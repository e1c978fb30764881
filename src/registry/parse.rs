//! Stock parsers for `ConfigRegistry::get_typed`.
//!
//! Each parser takes the raw stored string and returns the typed value or a
//! human-readable reason. Reasons never echo the input, since the value may
//! belong to a sensitive key.

use std::time::Duration;

use url::Url;

pub fn parse_int(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| format!("expected an integer: {}", e))
}

/// Accepts `1/0`, `true/false`, `yes/no`, `on/off`, case-insensitively.
pub fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected a boolean (1/0, true/false, yes/no, on/off)".to_string()),
    }
}

/// Whole seconds, e.g. `order.timeout = "60"`.
pub fn parse_duration_secs(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("expected a number of seconds: {}", e))
}

pub fn parse_url(raw: &str) -> Result<Url, String> {
    Url::parse(raw.trim()).map_err(|e| format!("expected a URL: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("60"), Ok(60));
        assert_eq!(parse_int(" 999 "), Ok(999));
        assert_eq!(parse_int("-1"), Ok(-1));
        assert!(parse_int("sixty").is_err());
        assert!(parse_int("").is_err());
    }

    #[test]
    fn test_parse_bool() {
        for raw in ["1", "true", "TRUE", "yes", "On"] {
            assert_eq!(parse_bool(raw), Ok(true), "{}", raw);
        }
        for raw in ["0", "false", "No", "off"] {
            assert_eq!(parse_bool(raw), Ok(false), "{}", raw);
        }
        assert!(parse_bool("60").is_err());
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn test_parse_duration_secs() {
        assert_eq!(parse_duration_secs("60"), Ok(Duration::from_secs(60)));
        assert!(parse_duration_secs("-5").is_err());
        assert!(parse_duration_secs("1m").is_err());
    }

    #[test]
    fn test_parse_url() {
        let url = parse_url("https://example.com/assets/banner.jpg").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert!(parse_url("not a url").is_err());
    }

    #[test]
    fn test_errors_do_not_echo_input() {
        let raw = "123456:hunter2";
        let reasons = [
            parse_int(raw).unwrap_err(),
            parse_bool(raw).unwrap_err(),
            parse_duration_secs(raw).unwrap_err(),
            parse_url(raw).unwrap_err(),
        ];
        for reason in reasons {
            assert!(!reason.contains("hunter2"), "{}", reason);
        }
    }
}
