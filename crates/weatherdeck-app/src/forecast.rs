//! Forecast records

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

pub const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

/// Configuration key whose value becomes the sentinel summary
pub const SUMMARY_KEY: &str = "SecretForecast:Summary";

pub const SENTINEL_TEMPERATURE_C: i32 = -99;

/// Days of random forecast before the sentinel
pub const FORECAST_DAYS: i64 = 5;

/// Forecast date: local time with its offset, or a bare date-time for the
/// sentinel
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize)]
#[serde(untagged)]
pub enum ForecastDate {
    Zoned(DateTime<Local>),
    Naive(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: ForecastDate,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: Option<String>,
}

impl WeatherForecast {
    pub fn new(date: ForecastDate, temperature_c: i32, summary: Option<String>) -> Self {
        Self {
            date,
            temperature_c,
            temperature_f: fahrenheit(temperature_c),
            summary,
        }
    }
}

/// `32 + C / 0.5556`, truncated toward zero
pub fn fahrenheit(celsius: i32) -> i32 {
    32 + (celsius as f64 / 0.5556) as i32
}

/// Minimum representable date, `0001-01-01T00:00:00`
pub fn sentinel_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Five random days from tomorrow, then the sentinel carrying `summary`
pub fn forecasts(rng: &mut impl Rng, summary: Option<String>) -> Vec<WeatherForecast> {
    let now = Local::now();

    let mut records: Vec<WeatherForecast> = (1..=FORECAST_DAYS)
        .map(|day| {
            WeatherForecast::new(
                ForecastDate::Zoned(now + Duration::days(day)),
                rng.gen_range(-20..55),
                SUMMARIES.choose(rng).map(|s| s.to_string()),
            )
        })
        .collect();

    records.push(WeatherForecast::new(
        ForecastDate::Naive(sentinel_date()),
        SENTINEL_TEMPERATURE_C,
        summary,
    ));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_fahrenheit_truncates() {
        assert_eq!(fahrenheit(0), 32);
        assert_eq!(fahrenheit(-99), -146);
        assert_eq!(fahrenheit(-20), -3);
        assert_eq!(fahrenheit(54), 129);
        assert_eq!(fahrenheit(1), 33);
    }

    #[test]
    fn test_sentinel_serialization() {
        let sentinel = WeatherForecast::new(
            ForecastDate::Naive(sentinel_date()),
            SENTINEL_TEMPERATURE_C,
            None,
        );
        let json = serde_json::to_value(&sentinel).unwrap();
        assert_eq!(json["date"], "0001-01-01T00:00:00");
        assert_eq!(json["temperatureC"], -99);
        assert_eq!(json["temperatureF"], -146);
        assert!(json["summary"].is_null());
    }

    #[test]
    fn test_forecast_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let records = forecasts(&mut rng, Some("Secret".to_string()));
            assert_eq!(records.len(), 6);

            let (days, sentinel) = records.split_at(5);
            for record in days {
                assert!((-20..55).contains(&record.temperature_c));
                assert_eq!(record.temperature_f, fahrenheit(record.temperature_c));
                let summary = record.summary.as_deref().unwrap();
                assert!(SUMMARIES.contains(&summary));
            }
            assert!(days.windows(2).all(|w| w[0].date < w[1].date));

            assert_eq!(sentinel[0].date, ForecastDate::Naive(sentinel_date()));
            assert_eq!(sentinel[0].temperature_c, -99);
            assert_eq!(sentinel[0].summary.as_deref(), Some("Secret"));
        }
    }

    #[test]
    fn test_daily_dates_carry_their_offset() {
        let records = forecasts(&mut StdRng::seed_from_u64(1), None);
        let json = serde_json::to_value(&records[0]).unwrap();
        let date = json["date"].as_str().unwrap();
        let parsed = DateTime::parse_from_rfc3339(date).unwrap();
        assert!(parsed.with_timezone(&Local) > Local::now());
    }
}
