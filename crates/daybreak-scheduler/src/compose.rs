//! Briefing composition. Pure: the same inputs always give the same artifact.

use chrono::DateTime;
use chrono_tz::Tz;
use daybreak_core::types::{
    BriefingArtifact, HoldingsResult, Mover, MoversResult, Section, SectionKind, Tone,
    WeatherSnapshot,
};

use crate::scoring::RideScore;

/// Character budget of a regular section.
pub const SECTION_CAP: usize = 1024;
/// Character budget of the alerts section.
pub const ALERTS_CAP: usize = 4096;

pub const BRIEFING_TITLE: &str = "☀️ Morning briefing";

/// Everything the pipeline collected for one briefing.
#[derive(Debug, Clone)]
pub struct BriefingInputs {
    pub generated_at: DateTime<Tz>,
    pub movers: MoversResult,
    pub commentary: String,
    pub holdings: HoldingsResult,
    /// `None` when the alerts stage failed or was skipped.
    pub alerts: Option<String>,
    pub weather: Option<WeatherSnapshot>,
    pub ride: RideScore,
    /// `"<stage>: <reason>"`, in stage order.
    pub failures: Vec<String>,
}

impl BriefingInputs {
    fn failed(&self, stage: &str) -> bool {
        let prefix = format!("{stage}:");
        self.failures.iter().any(|f| f.starts_with(&prefix))
    }
}

pub fn compose(inputs: &BriefingInputs) -> BriefingArtifact {
    let mut sections = vec![
        market_section(inputs),
        commentary_section(inputs),
        holdings_section(inputs),
    ];
    if let Some(alerts) = &inputs.alerts {
        sections.push(Section {
            kind: SectionKind::Alerts,
            title: "🚨 Alerts".into(),
            body: cap_lines(alerts.trim(), ALERTS_CAP),
            tone: Tone::Warning,
        });
    }
    sections.push(weather_section(inputs));

    BriefingArtifact {
        title: BRIEFING_TITLE.into(),
        generated_at: inputs.generated_at.format("%d/%m/%Y %H:%M %Z").to_string(),
        sections,
        failures: inputs.failures.clone(),
    }
}

/// Cap `body` to `cap` characters by dropping trailing lines. A single line
/// that is still too long is cut with an ellipsis.
pub fn cap_lines(body: &str, cap: usize) -> String {
    if body.chars().count() <= cap {
        return body.to_string();
    }
    let mut lines: Vec<&str> = body.lines().collect();
    while lines.len() > 1 {
        lines.pop();
        let candidate = format!("{}\n…", lines.join("\n"));
        if candidate.chars().count() <= cap {
            return candidate;
        }
    }
    let first = lines.first().copied().unwrap_or("");
    let kept: String = first.chars().take(cap.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn pct(v: f64) -> String {
    format!("{v:+.2}%")
}

fn signed_eur(v: f64) -> String {
    format!("{v:+.2}€")
}

fn dot(v: f64) -> &'static str {
    match Tone::of_change(v) {
        Tone::Positive => "🟢",
        Tone::Negative => "🔴",
        _ => "⚪",
    }
}

fn mover_line(m: &Mover) -> String {
    format!("`{:>18}` {} ({:.2}€)", m.name, pct(m.change_pct), m.price)
}

fn market_section(inputs: &BriefingInputs) -> Section {
    let movers = &inputs.movers;
    if movers.is_empty() {
        return Section {
            kind: SectionKind::Market,
            title: "📈 CAC 40".into(),
            body: "Market data unavailable.".into(),
            tone: Tone::Warning,
        };
    }

    let mut lines = vec![format!("**Overall: {}**", pct(movers.overall_change_pct))];
    if !movers.top_gainers.is_empty() {
        lines.push(String::new());
        lines.push("**🟢 Top gainers**".into());
        lines.extend(movers.top_gainers.iter().map(mover_line));
    }
    if !movers.top_losers.is_empty() {
        lines.push(String::new());
        lines.push("**🔴 Top losers**".into());
        lines.extend(movers.top_losers.iter().map(mover_line));
    }

    Section {
        kind: SectionKind::Market,
        title: "📈 CAC 40".into(),
        body: cap_lines(&lines.join("\n"), SECTION_CAP),
        tone: Tone::of_change(movers.overall_change_pct),
    }
}

fn commentary_section(inputs: &BriefingInputs) -> Section {
    Section {
        kind: SectionKind::Commentary,
        title: "🤖 Analysis".into(),
        body: cap_lines(inputs.commentary.trim(), SECTION_CAP),
        tone: Tone::Info,
    }
}

fn holdings_section(inputs: &BriefingInputs) -> Section {
    let h = &inputs.holdings;
    if h.holdings.is_empty() {
        let body = if inputs.failed("holdings") {
            "Holdings unavailable."
        } else {
            "No holdings yet. Add one with `daybreak holdings add`."
        };
        return Section {
            kind: SectionKind::Holdings,
            title: "💼 Holdings".into(),
            body: body.into(),
            tone: if inputs.failed("holdings") { Tone::Warning } else { Tone::Neutral },
        };
    }

    // Totals first so they survive truncation.
    let mut lines = vec![
        format!(
            "💰 **Total** {} ({})",
            signed_eur(h.total_gain),
            pct(h.total_gain_pct)
        ),
        format!("Invested {:.2}€ · Value {:.2}€", h.total_invested, h.total_value),
        String::new(),
    ];
    for v in &h.holdings {
        lines.push(format!(
            "{} **{}** ({}) x{} · {:.2}€ → {:.2}€ · day {} · total {} ({})",
            dot(v.gain_pct),
            v.name,
            v.ticker,
            v.quantity,
            v.buy_price,
            v.current_price,
            pct(v.day_change_pct),
            signed_eur(v.gain),
            pct(v.gain_pct)
        ));
    }

    Section {
        kind: SectionKind::Holdings,
        title: "💼 Holdings".into(),
        body: cap_lines(&lines.join("\n"), SECTION_CAP),
        tone: Tone::of_change(h.total_gain),
    }
}

fn weather_section(inputs: &BriefingInputs) -> Section {
    let mut lines = Vec::new();
    match &inputs.weather {
        Some(w) => {
            lines.push(format!(
                "📍 **{}**: {} {}",
                w.location,
                weather_emoji(&w.description),
                capitalize(&w.description)
            ));
            lines.push(format!(
                "🌡️ {:.1}°C (feels like {:.1}°C)",
                w.temperature_c, w.feels_like_c
            ));
            lines.push(format!("💨 Wind {:.0} km/h", w.wind_kmh));
            lines.push(format!("💧 Humidity {:.0}%", w.humidity_pct));
            if w.rain_1h_mm > 0.0 {
                lines.push(format!("🌧️ Rain {:.1} mm/h", w.rain_1h_mm));
            }
        }
        None => lines.push("Weather unavailable.".into()),
    }

    let ride = &inputs.ride;
    let filled = usize::from(ride.score.min(10));
    lines.push(String::new());
    lines.push(format!(
        "🏍️ **Ride score** {}{} {}/10",
        "🟩".repeat(filled),
        "⬜".repeat(10 - filled),
        ride.score
    ));
    lines.push(ride.verdict.label().into());
    lines.extend(ride.details.iter().cloned());

    Section {
        kind: SectionKind::Weather,
        title: "🌦️ Weather & ride".into(),
        body: cap_lines(&lines.join("\n"), SECTION_CAP),
        tone: if inputs.weather.is_some() { Tone::Info } else { Tone::Warning },
    }
}

/// Condition emoji for a weather description. Order matters: a
/// "thunderstorm with light rain" is a storm first.
pub fn weather_emoji(description: &str) -> &'static str {
    const MAP: &[(&[&str], &str)] = &[
        (&["thunder"], "⛈️"),
        (&["snow", "sleet"], "❄️"),
        (&["rain", "drizzle", "shower"], "🌧️"),
        (&["mist", "fog", "haze", "smoke", "dust"], "🌫️"),
        (&["cloud", "overcast"], "☁️"),
        (&["clear", "sun"], "☀️"),
    ];
    let d = description.to_lowercase();
    MAP.iter()
        .find(|(words, _)| words.iter().any(|w| d.contains(w)))
        .map_or("🌤️", |(_, emoji)| emoji)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
