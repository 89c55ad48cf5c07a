//! Prompts sent to the local model.

use daybreak_core::types::{ClosingPrice, HoldingsResult, Mover, MoversResult};

pub const COMMENTARY_TEMPERATURE: f32 = 0.3;
pub const ALERTS_TEMPERATURE: f32 = 0.2;

fn mover_lines(movers: &[Mover]) -> String {
    movers
        .iter()
        .map(|m| format!("  - {} ({}): {:+.2}% ({:.2}€)", m.ticker, m.name, m.change_pct, m.price))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Market commentary over yesterday's movers.
pub fn commentary_prompt(movers: &MoversResult) -> String {
    format!(
        "You are a concise financial analyst writing for a retail investor.

CAC 40 yesterday:
- Overall performance: {:+.2}%
- Top gainers:
{}
- Top losers:
{}

Task:
1. Summarize the macro context in 2-3 sentences
2. Identify 2 buying opportunities among the losers (explain why)
3. Flag 1 stock to avoid (value trap)

Format: bullet points, factual, actionable.",
        movers.overall_change_pct,
        mover_lines(&movers.top_gainers),
        mover_lines(&movers.top_losers)
    )
}

/// One line per holding, fed to the alerts prompt.
pub fn holdings_summary(holdings: &HoldingsResult) -> String {
    holdings
        .holdings
        .iter()
        .map(|h| {
            format!(
                "{} ({}): {}x, bought {:.2}€, now {:.2}€, day {:+.2}%",
                h.ticker, h.name, h.quantity, h.buy_price, h.current_price, h.day_change_pct
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `TICKER: date: close€, ...` for one holding.
pub fn history_line(ticker: &str, history: &[ClosingPrice]) -> String {
    let closes = history
        .iter()
        .map(|c| format!("{}: {:.2}€", c.date, c.close))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{ticker}: {closes}")
}

/// Abnormal-move alerts over the holdings book.
pub fn alerts_prompt(holdings: &str, history: &str, days: u32) -> String {
    format!(
        "Review this retail investor's holdings:

{holdings}

Closing prices over the last {days} days:
{history}

Detect:
- Abnormal moves (more than ±2% away from the {days}-day average)
- Important warning signs

Format: \"⚠️ [Stock]: [short reason]\"
At most 3 alerts, only if critical.
If nothing is abnormal, write \"✅ No critical alert.\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commentary_prompt_lists_movers() {
        let movers = MoversResult {
            top_gainers: vec![Mover {
                ticker: "AIR.PA".into(),
                name: "Airbus".into(),
                price: 150.0,
                change: 3.0,
                change_pct: 2.04,
            }],
            top_losers: vec![],
            overall_change_pct: -0.4,
        };
        let prompt = commentary_prompt(&movers);
        assert!(prompt.contains("-0.40%"));
        assert!(prompt.contains("AIR.PA (Airbus): +2.04%"));
        assert!(prompt.contains("value trap"));
    }

    #[test]
    fn test_alerts_prompt_shape() {
        let line = history_line(
            "MC.PA",
            &[ClosingPrice { date: "2026-10-16".into(), close: 701.5 }],
        );
        assert_eq!(line, "MC.PA: 2026-10-16: 701.50€");
        let prompt = alerts_prompt("MC.PA (LVMH)", &line, 5);
        assert!(prompt.contains("5-day average"));
        assert!(prompt.contains("No critical alert"));
    }
}
