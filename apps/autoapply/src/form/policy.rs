//! Fill heuristics. These are defaults rather than truths: every value here
//! can be overridden when constructing the engine.

use chrono::NaiveDate;

/// Format a date-validation message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    MonthDayYear,
    DayMonthYear,
    Iso,
}

impl DateFormat {
    fn pattern(&self) -> &'static str {
        match self {
            DateFormat::MonthDayYear => "%m/%d/%Y",
            DateFormat::DayMonthYear => "%d/%m/%Y",
            DateFormat::Iso => "%Y-%m-%d",
        }
    }

    pub fn render(&self, date: NaiveDate) -> String {
        date.format(self.pattern()).to_string()
    }
}

/// How a client-side validation message should be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFix {
    Date(DateFormat),
    Numeric,
}

#[derive(Debug, Clone)]
pub struct FillPolicy {
    /// Written into unresolved required text fields during the probe pass.
    pub placeholder: String,
    /// Preferred option for selects when no usable answer exists.
    pub affirmative_option: String,
    /// Check every box of a checkbox group instead of asking.
    pub check_all_boxes: bool,
    /// Used when a numeric field's answer has no digits.
    pub numeric_fallback: String,
    /// Option labels meaning "nothing selected" (compared case-insensitively).
    pub placeholder_options: Vec<String>,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            placeholder: "1".to_string(),
            affirmative_option: "Yes".to_string(),
            check_all_boxes: true,
            numeric_fallback: "0".to_string(),
            placeholder_options: vec!["Select an option".to_string(), String::new()],
        }
    }
}

impl FillPolicy {
    pub fn is_placeholder_option(&self, option: &str) -> bool {
        let option = option.trim();
        self.placeholder_options
            .iter()
            .any(|p| p.trim().eq_ignore_ascii_case(option))
    }

    /// Options a human could actually pick, in display order.
    pub fn real_options<'a>(&self, options: &'a [String]) -> Vec<&'a str> {
        options
            .iter()
            .map(String::as_str)
            .filter(|o| !self.is_placeholder_option(o))
            .collect()
    }

    /// A text value counts as filled when it is non-blank and not our own
    /// placeholder.
    pub fn is_real_text_value(&self, value: Option<&str>) -> bool {
        match value.map(str::trim) {
            Some(v) => !v.is_empty() && v != self.placeholder,
            None => false,
        }
    }

    pub fn is_real_selection(&self, value: Option<&str>) -> bool {
        value.is_some_and(|v| !self.is_placeholder_option(v))
    }

    /// Reduces an answer to the digits it contains, or the numeric fallback
    /// when there are none.
    pub fn numeric_value(&self, answer: &str) -> String {
        let digits: String = answer.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            self.numeric_fallback.clone()
        } else {
            digits
        }
    }

    /// Decides how to correct a field from its validation message.
    pub fn classify_validation(&self, message: &str) -> Option<ValidationFix> {
        let message = message.trim().to_lowercase();
        if message.is_empty() {
            return None;
        }
        if message.contains("dd/mm/yyyy") {
            Some(ValidationFix::Date(DateFormat::DayMonthYear))
        } else if message.contains("yyyy-mm-dd") {
            Some(ValidationFix::Date(DateFormat::Iso))
        } else if message.contains("mm/dd/yyyy") || message.contains("date") {
            Some(ValidationFix::Date(DateFormat::MonthDayYear))
        } else {
            Some(ValidationFix::Numeric)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_value_extracts_digits() {
        let policy = FillPolicy::default();
        assert_eq!(policy.numeric_value("Answer: 5 years"), "5");
        assert_eq!(policy.numeric_value("10+ years, 2 months"), "102");
    }

    #[test]
    fn test_numeric_value_without_digits_falls_back_to_zero() {
        let policy = FillPolicy::default();
        assert_eq!(policy.numeric_value("several years"), "0");
        assert_eq!(policy.numeric_value(""), "0");
    }

    #[test]
    fn test_placeholder_options_are_case_insensitive() {
        let policy = FillPolicy::default();
        assert!(policy.is_placeholder_option("select an option"));
        assert!(policy.is_placeholder_option("  "));
        assert!(!policy.is_placeholder_option("Yes"));

        let options = vec!["Select an option".to_string(), "Yes".to_string(), "No".to_string()];
        assert_eq!(policy.real_options(&options), vec!["Yes", "No"]);
    }

    #[test]
    fn test_placeholder_text_is_not_a_real_value() {
        let policy = FillPolicy::default();
        assert!(!policy.is_real_text_value(Some("1")));
        assert!(!policy.is_real_text_value(Some("  ")));
        assert!(!policy.is_real_text_value(None));
        assert!(policy.is_real_text_value(Some("ada@example.com")));
    }

    #[test]
    fn test_validation_messages_map_to_fixes() {
        let policy = FillPolicy::default();
        assert_eq!(
            policy.classify_validation("Enter a date in mm/dd/yyyy format"),
            Some(ValidationFix::Date(DateFormat::MonthDayYear))
        );
        assert_eq!(
            policy.classify_validation("Please use DD/MM/YYYY"),
            Some(ValidationFix::Date(DateFormat::DayMonthYear))
        );
        assert_eq!(
            policy.classify_validation("Enter a whole number between 0 and 99"),
            Some(ValidationFix::Numeric)
        );
        assert_eq!(policy.classify_validation("   "), None);
    }

    #[test]
    fn test_date_rendering() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(DateFormat::MonthDayYear.render(date), "03/07/2024");
        assert_eq!(DateFormat::DayMonthYear.render(date), "07/03/2024");
        assert_eq!(DateFormat::Iso.render(date), "2024-03-07");
    }
}
