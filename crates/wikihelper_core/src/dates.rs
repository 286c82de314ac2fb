use std::sync::OnceLock;

use anyhow::{Result, bail};
use regex::Regex;
use tracing::warn;

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Misspellings and abbreviations that occur in the chapter articles.
const MONTH_FALLBACKS: [(&str, u32); 2] = [("Feburary", 2), ("Mar", 3)];

fn mdy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^ *([A-Z][a-z]+) +([0-9]{1,2})(?:[stndrdth]{2})?, (20[0-9]+) *$")
            .expect("month-day-year pattern must compile")
    })
}

pub fn month_number(name: &str) -> Option<u32> {
    if let Some(index) = MONTHS.iter().position(|month| *month == name) {
        return Some(index as u32 + 1);
    }
    MONTH_FALLBACKS
        .iter()
        .find(|(fallback, _)| *fallback == name)
        .map(|(_, number)| *number)
}

pub fn zero_pad_two(value: &str) -> String {
    if value.chars().count() < 2 {
        format!("0{value}")
    } else {
        value.to_string()
    }
}

/// Convert `"March 8, 2018"` or `"February 2nd, 2019"` into `YYYY-MM-DD`.
///
/// An unknown month name is kept verbatim in the month slot so the bad
/// source value stays visible in the output.
pub fn mdy_date_to_iso(input: &str) -> Result<String> {
    let Some(captures) = mdy_pattern().captures(input) else {
        bail!("not a month-day-year date: {input:?}");
    };
    let month_name = &captures[1];
    let day = &captures[2];
    let year = &captures[3];

    let month = match month_number(month_name) {
        Some(number) => zero_pad_two(&number.to_string()),
        None => {
            warn!(month = month_name, input, "unrecognized month name kept as-is");
            zero_pad_two(month_name)
        }
    };

    Ok(format!("{year}-{month}-{}", zero_pad_two(day)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn converts_plain_dates() {
        assert_eq!(mdy_date_to_iso("March 8, 2018").expect("date"), "2018-03-08");
        assert_eq!(mdy_date_to_iso("December 25, 2020").expect("date"), "2020-12-25");
    }

    #[test]
    fn strips_ordinal_suffixes() {
        assert_eq!(mdy_date_to_iso("February 2nd, 2019").expect("date"), "2019-02-02");
        assert_eq!(mdy_date_to_iso("May 1st, 2021").expect("date"), "2021-05-01");
        assert_eq!(mdy_date_to_iso("June 3rd, 2022").expect("date"), "2022-06-03");
        assert_eq!(mdy_date_to_iso("July 14th, 2023").expect("date"), "2023-07-14");
    }

    #[test]
    fn tolerates_surrounding_spaces() {
        assert_eq!(mdy_date_to_iso("  April 10, 2019  ").expect("date"), "2019-04-10");
        assert_eq!(mdy_date_to_iso("April   10, 2019").expect("date"), "2019-04-10");
    }

    #[test]
    fn maps_known_misspellings() {
        assert_eq!(mdy_date_to_iso("Feburary 3, 2020").expect("date"), "2020-02-03");
        assert_eq!(mdy_date_to_iso("Mar 9, 2021").expect("date"), "2021-03-09");
    }

    #[test]
    fn keeps_unknown_month_names() {
        assert_eq!(mdy_date_to_iso("Smarch 4, 2020").expect("date"), "2020-Smarch-04");
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(mdy_date_to_iso("2018-03-08").is_err());
        assert!(mdy_date_to_iso("8 March 2018").is_err());
        assert!(mdy_date_to_iso("March 8 2018").is_err());
        assert!(mdy_date_to_iso("March 8, 1999").is_err());
        assert!(mdy_date_to_iso("March 123, 2018").is_err());
        assert!(mdy_date_to_iso("").is_err());
    }

    #[test]
    fn every_month_round_trips_through_chrono() {
        let iso_shape = Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("regex");
        for (index, month) in MONTHS.iter().enumerate() {
            let input = format!("{month} 7th, 2024");
            let iso = mdy_date_to_iso(&input).expect("date");
            assert!(iso_shape.is_match(&iso), "{iso}");
            let parsed = NaiveDate::parse_from_str(&iso, "%Y-%m-%d").expect("valid date");
            assert_eq!(
                parsed,
                NaiveDate::from_ymd_opt(2024, index as u32 + 1, 7).expect("date")
            );
        }
    }

    #[test]
    fn zero_pad_two_only_pads_single_characters() {
        assert_eq!(zero_pad_two("3"), "03");
        assert_eq!(zero_pad_two("12"), "12");
        assert_eq!(zero_pad_two("Smarch"), "Smarch");
    }
}
