//! Yahoo Finance market source (chart API, no key required).
//!
//! Scans the CAC 40 one ticker at a time with a small pause between requests.
//! A ticker that fails is skipped; the scan only fails when nothing came back.

use std::time::Duration;

use async_trait::async_trait;
use daybreak_core::config::MarketConfig;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::traits::MarketSource;
use daybreak_core::types::{ClosingPrice, Mover, MoversResult, Quote};
use serde::Deserialize;

/// CAC 40 constituents with display names.
pub const CAC40: &[(&str, &str)] = &[
    ("AIR.PA", "Airbus"),
    ("AI.PA", "Air Liquide"),
    ("ALO.PA", "Alstom"),
    ("MT.PA", "ArcelorMittal"),
    ("CS.PA", "AXA"),
    ("BNP.PA", "BNP Paribas"),
    ("EN.PA", "Bouygues"),
    ("CAP.PA", "Capgemini"),
    ("CA.PA", "Carrefour"),
    ("ACA.PA", "Crédit Agricole"),
    ("BN.PA", "Danone"),
    ("DSY.PA", "Dassault Systèmes"),
    ("ENGI.PA", "Engie"),
    ("EL.PA", "EssilorLuxottica"),
    ("ERF.PA", "Eurofins Scientific"),
    ("RMS.PA", "Hermès"),
    ("KER.PA", "Kering"),
    ("LR.PA", "Legrand"),
    ("OR.PA", "L'Oréal"),
    ("MC.PA", "LVMH"),
    ("ML.PA", "Michelin"),
    ("ORA.PA", "Orange"),
    ("RI.PA", "Pernod Ricard"),
    ("PUB.PA", "Publicis"),
    ("RNO.PA", "Renault"),
    ("SAF.PA", "Safran"),
    ("SGO.PA", "Saint-Gobain"),
    ("SAN.PA", "Sanofi"),
    ("SU.PA", "Schneider Electric"),
    ("GLE.PA", "Société Générale"),
    ("STLAP.PA", "Stellantis"),
    ("STMPA.PA", "STMicroelectronics"),
    ("TEP.PA", "Teleperformance"),
    ("HO.PA", "Thales"),
    ("TTE.PA", "TotalEnergies"),
    ("URW.PA", "Unibail-Rodamco-Westfield"),
    ("VIE.PA", "Veolia"),
    ("DG.PA", "Vinci"),
    ("VIV.PA", "Vivendi"),
    ("WLN.PA", "Worldline"),
];

/// Display name for a ticker, or the ticker itself when unknown.
pub fn ticker_name(ticker: &str) -> String {
    CAC40
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(ticker))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| ticker.to_string())
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Yahoo Finance client.
pub struct YahooMarket {
    endpoint: String,
    tickers: Vec<(String, String)>,
    request_delay: Duration,
    top_n: usize,
    client: reqwest::Client,
}

impl YahooMarket {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) Daybreak")
            .build()
            .map_err(|e| DaybreakError::Http(format!("yahoo client: {e}")))?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            tickers: CAC40
                .iter()
                .map(|(t, n)| (t.to_string(), n.to_string()))
                .collect(),
            request_delay: Duration::from_millis(config.request_delay_ms),
            top_n: config.top_n,
            client,
        })
    }

    /// Replace the scanned universe.
    pub fn with_tickers(mut self, tickers: Vec<(String, String)>) -> Self {
        self.tickers = tickers;
        self
    }

    async fn fetch_chart(&self, ticker: &str, range: &str) -> Result<ChartResult> {
        let url = format!("{}/{}", self.endpoint, ticker);
        let resp = self
            .client
            .get(&url)
            .query(&[("range", range), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| DaybreakError::Http(format!("yahoo {ticker}: {e}")))?;

        if !resp.status().is_success() {
            return Err(DaybreakError::adapter(
                "yahoo",
                format!("{ticker}: HTTP {}", resp.status()),
            ));
        }

        let body: ChartResponse = resp
            .json()
            .await
            .map_err(|e| DaybreakError::adapter("yahoo", format!("{ticker}: bad payload: {e}")))?;

        if let Some(err) = body.chart.error.filter(|e| !e.is_null()) {
            return Err(DaybreakError::adapter("yahoo", format!("{ticker}: {err}")));
        }
        body.chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
            .ok_or_else(|| DaybreakError::adapter("yahoo", format!("{ticker}: no data")))
    }

    async fn fetch_mover(&self, ticker: &str, name: &str) -> Result<Mover> {
        let chart = self.fetch_chart(ticker, "5d").await?;
        let closes: Vec<f64> = chart
            .indicators
            .quote
            .first()
            .map(|q| q.close.iter().flatten().copied().collect())
            .unwrap_or_default();

        let price = *closes
            .last()
            .ok_or_else(|| DaybreakError::adapter("yahoo", format!("{ticker}: no close")))?;
        let previous = if closes.len() >= 2 {
            closes[closes.len() - 2]
        } else {
            chart.meta.chart_previous_close.unwrap_or(price)
        };

        let change = price - previous;
        let change_pct = if previous != 0.0 { change / previous * 100.0 } else { 0.0 };
        Ok(Mover {
            ticker: ticker.to_string(),
            name: name.to_string(),
            price: round2(price),
            change: round2(change),
            change_pct: round2(change_pct),
        })
    }
}

/// Rank quoted movers into the top-N gainers and losers.
pub fn rank_movers(mut movers: Vec<Mover>, top_n: usize) -> MoversResult {
    if movers.is_empty() {
        return MoversResult::default();
    }
    let overall = movers.iter().map(|m| m.change_pct).sum::<f64>() / movers.len() as f64;
    movers.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));

    let top_gainers = movers.iter().take(top_n).cloned().collect();
    let top_losers = movers.iter().rev().take(top_n).cloned().collect();
    MoversResult {
        top_gainers,
        top_losers,
        overall_change_pct: round2(overall),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn history_range(days: u32) -> &'static str {
    match days {
        0..=5 => "5d",
        6..=30 => "1mo",
        31..=90 => "3mo",
        _ => "1y",
    }
}

#[async_trait]
impl MarketSource for YahooMarket {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_market_movers(&self) -> Result<MoversResult> {
        let mut movers = Vec::with_capacity(self.tickers.len());
        for (i, (ticker, name)) in self.tickers.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            match self.fetch_mover(ticker, name).await {
                Ok(m) => movers.push(m),
                Err(e) => tracing::warn!("⚠️ Skipping {}: {e}", ticker),
            }
        }

        if movers.is_empty() {
            return Err(DaybreakError::adapter("yahoo", "no market data retrieved"));
        }
        tracing::info!("📈 Market scan: {}/{} tickers quoted", movers.len(), self.tickers.len());
        Ok(rank_movers(movers, self.top_n))
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote> {
        let mover = self.fetch_mover(ticker, &ticker_name(ticker)).await?;
        Ok(Quote {
            ticker: mover.ticker,
            price: mover.price,
            change_pct: mover.change_pct,
        })
    }

    async fn fetch_history(&self, ticker: &str, days: u32) -> Result<Vec<ClosingPrice>> {
        let chart = self.fetch_chart(ticker, history_range(days)).await?;
        let closes = chart
            .indicators
            .quote
            .first()
            .map(|q| q.close.clone())
            .unwrap_or_default();

        let mut history: Vec<ClosingPrice> = chart
            .timestamp
            .iter()
            .zip(closes)
            .filter_map(|(ts, close)| {
                let close = close?;
                let date = chrono::DateTime::from_timestamp(*ts, 0)?;
                Some(ClosingPrice {
                    date: date.format("%Y-%m-%d").to_string(),
                    close: round2(close),
                })
            })
            .collect();

        let keep = days as usize;
        if history.len() > keep {
            history.drain(..history.len() - keep);
        }
        if history.is_empty() {
            return Err(DaybreakError::adapter("yahoo", format!("{ticker}: empty history")));
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chart(timestamps: &[i64], closes: &[Option<f64>]) -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {"chartPreviousClose": 100.0},
                    "timestamp": timestamps,
                    "indicators": {"quote": [{"close": closes}]}
                }],
                "error": null
            }
        })
    }

    fn market_for(server: &MockServer, tickers: &[&str]) -> YahooMarket {
        let config = MarketConfig {
            endpoint: server.uri(),
            request_delay_ms: 0,
            top_n: 2,
            history_days: 5,
        };
        YahooMarket::new(&config)
            .unwrap()
            .with_tickers(tickers.iter().map(|t| (t.to_string(), ticker_name(t))).collect())
    }

    fn mover(ticker: &str, pct: f64) -> Mover {
        Mover {
            ticker: ticker.into(),
            name: ticker.into(),
            price: 10.0,
            change: 0.0,
            change_pct: pct,
        }
    }

    #[test]
    fn test_ticker_name_lookup() {
        assert_eq!(ticker_name("MC.PA"), "LVMH");
        assert_eq!(ticker_name("mc.pa"), "LVMH");
        assert_eq!(ticker_name("ZZZ.PA"), "ZZZ.PA");
        assert_eq!(CAC40.len(), 40);
    }

    #[test]
    fn test_rank_movers() {
        let result = rank_movers(
            vec![mover("A", 1.0), mover("B", -3.0), mover("C", 2.5), mover("D", -0.5)],
            2,
        );
        let gainers: Vec<_> = result.top_gainers.iter().map(|m| m.ticker.as_str()).collect();
        let losers: Vec<_> = result.top_losers.iter().map(|m| m.ticker.as_str()).collect();
        assert_eq!(gainers, ["C", "A"]);
        assert_eq!(losers, ["B", "D"]);
        assert_eq!(result.overall_change_pct, 0.0);
    }

    #[test]
    fn test_rank_movers_empty() {
        assert!(rank_movers(vec![], 5).is_empty());
    }

    #[tokio::test]
    async fn test_quote_uses_previous_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/MC.PA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(
                &[1_700_000_000, 1_700_086_400, 1_700_172_800],
                &[Some(700.0), None, Some(721.0)],
            )))
            .mount(&server)
            .await;

        let quote = market_for(&server, &["MC.PA"]).fetch_quote("MC.PA").await.unwrap();
        assert_eq!(quote.price, 721.0);
        assert_eq!(quote.change_pct, 3.0);
    }

    #[tokio::test]
    async fn test_movers_skip_failed_tickers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/AIR.PA"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chart(&[1, 2], &[Some(100.0), Some(102.0)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/BNP.PA"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = market_for(&server, &["AIR.PA", "BNP.PA"])
            .fetch_market_movers()
            .await
            .unwrap();
        assert_eq!(result.top_gainers.len(), 1);
        assert_eq!(result.top_gainers[0].name, "Airbus");
        assert_eq!(result.overall_change_pct, 2.0);
    }

    #[tokio::test]
    async fn test_movers_fail_when_nothing_quoted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = market_for(&server, &["AIR.PA"]).fetch_market_movers().await.unwrap_err();
        assert!(err.to_string().contains("no market data"));
    }

    #[tokio::test]
    async fn test_history_keeps_last_days() {
        let server = MockServer::start().await;
        let day = 86_400;
        let ts: Vec<i64> = (0..7).map(|i| 1_700_000_000 + i * day).collect();
        let closes: Vec<Option<f64>> = (0..7).map(|i| Some(10.0 + i as f64)).collect();
        Mock::given(method("GET"))
            .and(path("/OR.PA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(&ts, &closes)))
            .mount(&server)
            .await;

        let history = market_for(&server, &[]).fetch_history("OR.PA", 5).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].close, 12.0);
        assert_eq!(history[4].close, 16.0);
    }
}
