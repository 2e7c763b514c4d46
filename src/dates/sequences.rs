//! Component sequences the date parser tries to match, and the knobs that
//! go with them. Both are configuration, not constants.

use serde::{Deserialize, Serialize};

/// The role a single token can play in a date or time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// `99` or `1999`
    Year,
    /// `1` or `Jan`
    Month,
    Day,
    Hour,
    Minute,
    /// `1400`
    HourAndMinute,
    Second,
    Nano,
    AmPm,
    Offset,
}

pub type Sequence = Vec<Component>;

/// Pattern tables and the two-digit year window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateParserConfig {
    /// Date sequences in preference order for day-first input.
    pub day_first: Vec<Sequence>,
    /// Date sequences in preference order for month-first input.
    pub month_first: Vec<Sequence>,
    /// Time sequences, appended to date sequences for datetimes.
    pub time: Vec<Sequence>,
    /// A two-digit year lands in the reference year's century unless that
    /// puts it this many years or more away from the reference year.
    pub two_digit_year_window: i32,
}

impl Default for DateParserConfig {
    fn default() -> Self {
        use Component::*;
        Self {
            day_first: vec![
                vec![Day, Month, Year],
                vec![Month, Day, Year],
                vec![Year, Month, Day],
                vec![Day, Month],
                vec![Month, Day],
                vec![Month, Year],
            ],
            month_first: vec![
                vec![Month, Day, Year],
                vec![Day, Month, Year],
                vec![Year, Month, Day],
                vec![Month, Day],
                vec![Day, Month],
                vec![Month, Year],
            ],
            time: vec![
                vec![HourAndMinute],
                vec![Hour, Minute],
                vec![Hour, Minute, AmPm],
                vec![Hour, Minute, Second],
                vec![Hour, Minute, Second, AmPm],
                vec![Hour, Minute, Second, Nano],
                vec![Hour, Minute, Second, Nano, Offset],
                vec![Hour, Minute, Second, Offset],
                vec![Hour, Minute, Offset],
            ],
            two_digit_year_window: 50,
        }
    }
}

impl DateParserConfig {
    /// Expands a two-digit year relative to `current_year`. Longer years pass through.
    pub fn expand_year(&self, short_year: i32, current_year: i32) -> i32 {
        if short_year >= 100 {
            return short_year;
        }
        let year = short_year + current_year - current_year.rem_euclid(100);
        if (year - current_year).abs() >= self.two_digit_year_window {
            if year < current_year {
                year + 100
            } else {
                year - 100
            }
        } else {
            year
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_two_digit_years_around_reference() {
        let config = DateParserConfig::default();
        assert_eq!(config.expand_year(1, 2015), 2001);
        assert_eq!(config.expand_year(64, 2015), 2064);
        assert_eq!(config.expand_year(65, 2015), 1965);
        assert_eq!(config.expand_year(99, 2015), 1999);
        assert_eq!(config.expand_year(1, 1990), 2001);
        assert_eq!(config.expand_year(40, 1990), 2040);
        assert_eq!(config.expand_year(2034, 1990), 2034);
    }

    #[test]
    fn window_is_configurable() {
        let config = DateParserConfig { two_digit_year_window: 20, ..DateParserConfig::default() };
        assert_eq!(config.expand_year(40, 2015), 1940);
        assert_eq!(config.expand_year(30, 2015), 2030);
    }

    #[test]
    fn tables_deserialize_from_snake_case() {
        let config: DateParserConfig =
            serde_json::from_str(r#"{"day_first": [["year", "month", "day"]], "two_digit_year_window": 30}"#).unwrap();
        assert_eq!(config.day_first, vec![vec![Component::Year, Component::Month, Component::Day]]);
        assert_eq!(config.two_digit_year_window, 30);
        assert_eq!(config.time, DateParserConfig::default().time);
    }
}
