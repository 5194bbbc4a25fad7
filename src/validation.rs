// 📐 Format Validator - pure shape checks for scan request fields
//
// Every predicate returns bool and never panics. Callers collect the
// messages for failed checks in a `Violations` list and raise a single
// InvalidInput carrying all of them.

use crate::config::{LedgerConfig, DATE_PATTERN_DISPLAY};
use crate::error::{LedgerError, LedgerResult};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use rust_decimal::Decimal;
use std::fmt::Write;

// ============================================================================
// PRESENCE CHECKS
// ============================================================================

/// A string is empty when absent or blank after trim
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// A decimal is empty when absent or exactly zero
pub fn is_null_or_zero(value: Option<Decimal>) -> bool {
    value.map_or(true, |v| v.is_zero())
}

pub fn is_positive(n: i64) -> bool {
    n > 0
}

/// Names of the fields whose emptiness check is true, in declaration order
pub fn empty_fields(checks: &[(&'static str, bool)]) -> Vec<&'static str> {
    checks
        .iter()
        .filter(|(_, empty)| *empty)
        .map(|(name, _)| *name)
        .collect()
}

pub fn empty_fields_message(fields: &[&str]) -> String {
    format!("The following fields are empty: [{}]", fields.join(", "))
}

// ============================================================================
// VIOLATIONS
// ============================================================================

/// Accumulates format errors for one call
#[derive(Debug, Default)]
pub struct Violations {
    messages: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// One InvalidInput listing every collected message
    pub fn into_error(self) -> LedgerError {
        LedgerError::invalid(self.messages.join("\n"))
    }

    /// Ok if nothing was collected
    pub fn into_result(self) -> LedgerResult<()> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }
}

// ============================================================================
// FORMAT VALIDATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct FormatValidator {
    epc: Regex,
    tag: Regex,
    ref_code: Regex,
    date_format: String,
    epc_digits: usize,
    tag_min_digits: usize,
    tag_max_digits: usize,
    ref_code_digits: usize,
}

impl FormatValidator {
    pub fn new(config: &LedgerConfig) -> LedgerResult<Self> {
        if config.tag_min_digits > config.tag_max_digits {
            return Err(LedgerError::Config(format!(
                "tag_min_digits ({}) exceeds tag_max_digits ({})",
                config.tag_min_digits, config.tag_max_digits
            )));
        }
        check_separator(&config.name_separator)?;
        check_date_format(&config.date_format)?;

        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| LedgerError::Config(e.to_string()))
        };

        Ok(FormatValidator {
            epc: compile(format!("^(?i:EPC)[0-9]{{{}}}$", config.epc_digits))?,
            tag: compile(format!(
                "^(?i:TAG)[0-9]{{{},{}}}$",
                config.tag_min_digits, config.tag_max_digits
            ))?,
            ref_code: compile(format!("^[0-9]{{{}}}$", config.ref_code_digits))?,
            date_format: config.date_format.clone(),
            epc_digits: config.epc_digits,
            tag_min_digits: config.tag_min_digits,
            tag_max_digits: config.tag_max_digits,
            ref_code_digits: config.ref_code_digits,
        })
    }

    /// `EPC` + exactly N digits, case-insensitive prefix
    pub fn is_valid_epc(&self, input: &str) -> bool {
        self.epc.is_match(input)
    }

    /// `TAG` + min..=max digits, case-insensitive prefix
    pub fn is_valid_tag(&self, input: &str) -> bool {
        self.tag.is_match(input)
    }

    pub fn is_valid_ref_code(&self, input: &str) -> bool {
        self.ref_code.is_match(input)
    }

    pub fn is_valid_date(&self, input: &str) -> bool {
        self.parse_date(input).is_some()
    }

    /// Strict parse: the input must re-format to itself, which rejects
    /// unpadded fields such as `2024-1-1 9:00:00`.
    pub fn parse_date(&self, input: &str) -> Option<NaiveDateTime> {
        if input.trim().is_empty() {
            return None;
        }
        let parsed = NaiveDateTime::parse_from_str(input, &self.date_format).ok()?;
        if parsed.format(&self.date_format).to_string() == input {
            Some(parsed)
        } else {
            None
        }
    }

    pub fn epc_message(&self) -> String {
        format!("EPC should look like 'EPC' followed by {} digits", self.epc_digits)
    }

    pub fn tag_message(&self) -> String {
        format!(
            "Tag Id should look like 'TAG' followed by {} to {} digits",
            self.tag_min_digits, self.tag_max_digits
        )
    }

    pub fn ref_code_message(&self) -> String {
        format!("RefCode should be {} digits long", self.ref_code_digits)
    }

    pub fn date_message(&self, input: &str) -> String {
        format!("Date should look like {}: {}", DATE_PATTERN_DISPLAY, input)
    }
}

/// Stored names must convert back to display form, so the separator is two
/// visible characters
fn check_separator(separator: &str) -> LedgerResult<()> {
    if separator.chars().count() != 2 || separator.chars().any(char::is_whitespace) {
        return Err(LedgerError::Config(format!(
            "name_separator must be two non-blank characters, got {:?}",
            separator
        )));
    }
    Ok(())
}

/// Scan keys are stored at second precision. A date format must render every
/// field down to the second and nothing finer, or distinct scans would share a key.
fn check_date_format(format: &str) -> LedgerResult<()> {
    let unusable = || {
        LedgerError::Config(format!(
            "date_format {:?} must name date and time to the second",
            format
        ))
    };
    let sample = NaiveDate::from_ymd_opt(2024, 3, 15)
        .and_then(|d| d.and_hms_nano_opt(13, 45, 27, 123_456_789))
        .ok_or_else(unusable)?;
    let truncated = sample.with_nanosecond(0).ok_or_else(unusable)?;

    // write! reports bad specifiers as an error where to_string would panic
    let mut rendered = String::new();
    write!(rendered, "{}", sample.format(format)).map_err(|_| unusable())?;

    match NaiveDateTime::parse_from_str(&rendered, format) {
        Ok(parsed) if parsed == truncated => Ok(()),
        _ => Err(unusable()),
    }
}

/// Inclusive order check: start may equal end
pub fn dates_in_order(start: &NaiveDateTime, end: &NaiveDateTime) -> bool {
    start <= end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn validator() -> FormatValidator {
        FormatValidator::new(&LedgerConfig::default()).unwrap()
    }

    #[test]
    fn test_epc_format() {
        let v = validator();

        assert!(v.is_valid_epc("EPC123"));
        assert!(v.is_valid_epc("epc001"));
        assert!(v.is_valid_epc("Epc999"));

        assert!(!v.is_valid_epc("EPC12"));
        assert!(!v.is_valid_epc("EPC1234"));
        assert!(!v.is_valid_epc("EPX123"));
        assert!(!v.is_valid_epc(" EPC123"));
        assert!(!v.is_valid_epc(""));
    }

    #[test]
    fn test_epc_rejects_non_ascii_digits() {
        assert!(!validator().is_valid_epc("EPC١٢٣"));
    }

    #[test]
    fn test_normalized_epc_stays_valid() {
        let v = validator();
        for raw in ["epc000", "EpC042", "EPC999"] {
            assert!(v.is_valid_epc(&raw.to_uppercase()));
        }
    }

    #[test]
    fn test_tag_format() {
        let v = validator();

        assert!(v.is_valid_tag("TAG1"));
        assert!(v.is_valid_tag("tag0123456789"));
        assert!(v.is_valid_tag("Tag42"));

        assert!(!v.is_valid_tag("TAG"));
        assert!(!v.is_valid_tag("TAG01234567890"));
        assert!(!v.is_valid_tag("TAGX1"));
        assert!(!v.is_valid_tag("1TAG"));
    }

    #[test]
    fn test_ref_code_format() {
        let v = validator();

        assert!(v.is_valid_ref_code("12345"));
        assert!(v.is_valid_ref_code("00001"));
        assert!(!v.is_valid_ref_code("1234"));
        assert!(!v.is_valid_ref_code("123456"));
        assert!(!v.is_valid_ref_code("12a45"));
    }

    #[test]
    fn test_date_format() {
        let v = validator();

        assert!(v.is_valid_date("2024-01-01 10:00:00"));
        assert!(v.is_valid_date("2024-02-29 23:59:59"));

        assert!(!v.is_valid_date("2023-02-29 10:00:00"));
        assert!(!v.is_valid_date("2024-1-1 10:00:00"));
        assert!(!v.is_valid_date("2024-01-01T10:00:00"));
        assert!(!v.is_valid_date("2024-01-01"));
        assert!(!v.is_valid_date("2024-01-01 25:00:00"));
        assert!(!v.is_valid_date(""));
    }

    #[test]
    fn test_configured_lengths() {
        let config = LedgerConfig {
            epc_digits: 4,
            tag_min_digits: 2,
            tag_max_digits: 3,
            ref_code_digits: 6,
            ..LedgerConfig::default()
        };
        let v = FormatValidator::new(&config).unwrap();

        assert!(v.is_valid_epc("EPC1234"));
        assert!(!v.is_valid_epc("EPC123"));
        assert!(v.is_valid_tag("TAG12"));
        assert!(!v.is_valid_tag("TAG1"));
        assert!(v.is_valid_ref_code("123456"));
        assert_eq!(v.ref_code_message(), "RefCode should be 6 digits long");
    }

    #[test]
    fn test_inverted_tag_bounds_is_config_error() {
        let config = LedgerConfig {
            tag_min_digits: 5,
            tag_max_digits: 2,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            FormatValidator::new(&config),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn test_unusable_separator_is_config_error() {
        for separator in ["", ".", "...", " .", "  "] {
            let config = LedgerConfig {
                name_separator: separator.to_string(),
                ..LedgerConfig::default()
            };
            assert!(
                matches!(FormatValidator::new(&config), Err(LedgerError::Config(_))),
                "separator {:?} accepted",
                separator
            );
        }

        let config = LedgerConfig { name_separator: "__".to_string(), ..LedgerConfig::default() };
        assert!(FormatValidator::new(&config).is_ok());
    }

    #[test]
    fn test_date_format_must_stop_at_seconds() {
        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S.%3f", "%Y-%m-%d %H:%M", "%Y-%m-%d", "%Q"] {
            let config = LedgerConfig { date_format: format.to_string(), ..LedgerConfig::default() };
            assert!(
                matches!(FormatValidator::new(&config), Err(LedgerError::Config(_))),
                "format {:?} accepted",
                format
            );
        }

        let config = LedgerConfig { date_format: "%d/%m/%Y %H:%M:%S".to_string(), ..LedgerConfig::default() };
        let v = FormatValidator::new(&config).unwrap();
        assert!(v.is_valid_date("15/03/2024 13:45:27"));
    }

    #[test]
    fn test_presence_checks() {
        assert!(is_blank(None));
        assert!(is_blank(Some("   ")));
        assert!(!is_blank(Some(" x ")));

        assert!(is_null_or_zero(None));
        assert!(is_null_or_zero(Some(Decimal::ZERO)));
        assert!(is_null_or_zero(Some(Decimal::from_str("0.000").unwrap())));
        assert!(!is_null_or_zero(Some(Decimal::from_str("-61.5").unwrap())));

        assert!(is_positive(1));
        assert!(!is_positive(0));
        assert!(!is_positive(-3));
    }

    #[test]
    fn test_empty_fields_keeps_order() {
        let checks = [("siteName", true), ("epc", false), ("rssi", true)];
        assert_eq!(empty_fields(&checks), vec!["siteName", "rssi"]);
        assert_eq!(
            empty_fields_message(&empty_fields(&checks)),
            "The following fields are empty: [siteName, rssi]"
        );
    }

    #[test]
    fn test_violations_aggregate() {
        let mut violations = Violations::new();
        assert!(violations.is_empty());

        violations.push("first");
        violations.push("second");

        match violations.into_result() {
            Err(LedgerError::InvalidInput(msg)) => {
                assert!(msg.contains("first"));
                assert!(msg.contains("second"));
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_dates_in_order_is_inclusive() {
        let v = validator();
        let a = v.parse_date("2024-01-01 10:00:00").unwrap();
        let b = v.parse_date("2024-01-02 10:00:00").unwrap();

        assert!(dates_in_order(&a, &b));
        assert!(dates_in_order(&a, &a));
        assert!(!dates_in_order(&b, &a));
    }
}
