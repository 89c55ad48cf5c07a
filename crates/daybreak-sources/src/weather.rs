//! OpenWeatherMap current-conditions source.

use std::time::Duration;

use async_trait::async_trait;
use daybreak_core::config::WeatherConfig;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::traits::WeatherSource;
use daybreak_core::types::WeatherSnapshot;
use serde_json::Value;

pub struct OpenWeather {
    endpoint: String,
    api_key: String,
    country: String,
    client: reqwest::Client,
}

impl OpenWeather {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DaybreakError::Http(format!("weather client: {e}")))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            country: config.country.clone(),
            client,
        })
    }
}

/// m/s to km/h, one decimal.
fn kmh(ms: f64) -> f64 {
    (ms * 3.6 * 10.0).round() / 10.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Map an OpenWeatherMap `/weather` payload.
fn parse_snapshot(location: &str, data: &Value) -> Result<WeatherSnapshot> {
    let main = data
        .get("main")
        .ok_or_else(|| DaybreakError::adapter("openweather", "payload has no 'main' block"))?;
    let num = |v: &Value| v.as_f64().unwrap_or(0.0);

    Ok(WeatherSnapshot {
        location: location.to_string(),
        description: data["weather"][0]["description"]
            .as_str()
            .unwrap_or("n/a")
            .to_string(),
        temperature_c: round1(num(&main["temp"])),
        feels_like_c: round1(num(&main["feels_like"])),
        humidity_pct: num(&main["humidity"]),
        wind_kmh: kmh(num(&data["wind"]["speed"])),
        gust_kmh: kmh(num(&data["wind"]["gust"])),
        rain_1h_mm: num(&data["rain"]["1h"]),
        rain_chance_pct: 0.0,
        // Missing visibility means "not reported", which should not count as fog.
        visibility_m: data["visibility"].as_f64().unwrap_or(10_000.0),
        clouds_pct: num(&data["clouds"]["all"]),
    })
}

#[async_trait]
impl WeatherSource for OpenWeather {
    fn name(&self) -> &str {
        "openweather"
    }

    async fn fetch_weather(&self, location: &str) -> Result<WeatherSnapshot> {
        if self.api_key.is_empty() {
            return Err(DaybreakError::adapter("openweather", "no API key configured"));
        }

        let query = if self.country.is_empty() {
            location.to_string()
        } else {
            format!("{location},{}", self.country)
        };
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| DaybreakError::Http(format!("openweather: {e}")))?;

        if !resp.status().is_success() {
            return Err(DaybreakError::adapter(
                "openweather",
                format!("HTTP {} for '{location}'", resp.status()),
            ));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| DaybreakError::Http(format!("openweather: {e}")))?;
        let snapshot = parse_snapshot(location, &data)?;
        tracing::info!(
            "🌤️ Weather {}: {} {}°C wind {} km/h",
            location,
            snapshot.description,
            snapshot.temperature_c,
            snapshot.wind_kmh
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample() -> Value {
        json!({
            "weather": [{"description": "clear sky", "icon": "01d"}],
            "main": {"temp": 17.46, "feels_like": 16.9, "humidity": 55},
            "wind": {"speed": 5.0, "gust": 8.0},
            "rain": {"1h": 0.2},
            "clouds": {"all": 10},
            "visibility": 8000
        })
    }

    fn config(endpoint: String, key: &str) -> WeatherConfig {
        WeatherConfig {
            api_key: key.into(),
            endpoint,
            ..WeatherConfig::default()
        }
    }

    #[test]
    fn test_parse_converts_units() {
        let snap = parse_snapshot("Marseille", &sample()).unwrap();
        assert_eq!(snap.temperature_c, 17.5);
        assert_eq!(snap.wind_kmh, 18.0);
        assert_eq!(snap.gust_kmh, 28.8);
        assert_eq!(snap.rain_1h_mm, 0.2);
        assert_eq!(snap.visibility_m, 8000.0);
        assert_eq!(snap.description, "clear sky");
    }

    #[test]
    fn test_parse_tolerates_missing_blocks() {
        let snap = parse_snapshot("Lyon", &json!({"main": {"temp": 3.0}})).unwrap();
        assert_eq!(snap.wind_kmh, 0.0);
        assert_eq!(snap.rain_1h_mm, 0.0);
        assert_eq!(snap.visibility_m, 10_000.0);
        assert!(parse_snapshot("Lyon", &json!({})).is_err());
    }

    #[tokio::test]
    async fn test_fetch_weather() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "Marseille,FR"))
            .and(query_param("appid", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample()))
            .mount(&server)
            .await;

        let source = OpenWeather::new(&config(server.uri(), "k")).unwrap();
        let snap = source.fetch_weather("Marseille").await.unwrap();
        assert_eq!(snap.location, "Marseille");
    }

    #[tokio::test]
    async fn test_missing_key_is_adapter_error() {
        let source = OpenWeather::new(&config("http://127.0.0.1:9".into(), "")).unwrap();
        let err = source.fetch_weather("Marseille").await.unwrap_err();
        assert!(matches!(err, DaybreakError::Adapter { .. }));
    }

    #[tokio::test]
    async fn test_unknown_city() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = OpenWeather::new(&config(server.uri(), "k")).unwrap();
        assert!(source.fetch_weather("Atlantis").await.is_err());
    }
}
