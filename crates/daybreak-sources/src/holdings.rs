//! Holdings book: the user's positions, kept in the shared SQLite database.
//!
//! Removal is a soft delete (`active = 0`) so the history of a position
//! survives. Every add and remove also appends a row to the `transactions`
//! ledger in the same SQLite transaction. [`PricedHoldings`] values the active
//! book through a market source.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use daybreak_core::db::Database;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::traits::{HoldingsSource, MarketSource};
use daybreak_core::types::{HoldingValuation, HoldingsResult};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::yahoo::ticker_name;

/// Most ledger rows returned by [`HoldingsBook::history`].
pub const HISTORY_LIMIT: usize = 20;

/// One active position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub buy_price: f64,
    pub quantity: u32,
    /// RFC 3339.
    pub bought_at: String,
}

/// Kind of change recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Buy,
    Sell,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Buy => "BUY",
            TransactionKind::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "BUY" => Ok(TransactionKind::Buy),
            "SELL" => Ok(TransactionKind::Sell),
            other => Err(FromSqlError::Other(
                format!("unknown transaction kind '{other}'").into(),
            )),
        }
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub holding_id: Option<i64>,
    pub kind: TransactionKind,
    pub ticker: String,
    pub price: Option<f64>,
    pub quantity: Option<u32>,
    /// RFC 3339.
    pub at: String,
    pub note: Option<String>,
}

/// CRUD over the `holdings` table, with its ledger.
#[derive(Clone)]
pub struct HoldingsBook {
    db: Database,
}

impl HoldingsBook {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a position. A ticker can only be held once at a time.
    pub fn add(
        &self,
        ticker: &str,
        name: Option<&str>,
        buy_price: f64,
        quantity: u32,
    ) -> Result<Holding> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(DaybreakError::Config("ticker must not be empty".into()));
        }
        if !(buy_price.is_finite() && buy_price > 0.0) {
            return Err(DaybreakError::Config(format!("invalid buy price {buy_price}")));
        }
        if quantity == 0 {
            return Err(DaybreakError::Config("quantity must be at least 1".into()));
        }
        if let Some(existing) = self.find_active(&ticker)? {
            return Err(DaybreakError::Config(format!(
                "{ticker} is already held (x{})",
                existing.quantity
            )));
        }

        let name = name
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| ticker_name(&ticker));
        let bought_at = Utc::now().to_rfc3339();

        let id = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO holdings (ticker, name, buy_price, quantity, bought_at, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                rusqlite::params![ticker, name, buy_price, quantity, bought_at],
            )?;
            let id = tx.last_insert_rowid();
            append_ledger(
                &tx,
                id,
                TransactionKind::Buy,
                &ticker,
                buy_price,
                quantity,
                &bought_at,
                &format!("Initial purchase of {name}"),
            )?;
            tx.commit()?;
            Ok(id)
        })?;

        tracing::info!("💼 Holding added: {} x{} @ {:.2}", ticker, quantity, buy_price);
        Ok(Holding {
            id,
            ticker,
            name,
            buy_price,
            quantity,
            bought_at,
        })
    }

    /// Soft-remove the active position for `ticker`.
    pub fn remove(&self, ticker: &str) -> Result<Holding> {
        let ticker = ticker.trim().to_uppercase();
        let holding = self
            .find_active(&ticker)?
            .ok_or_else(|| DaybreakError::Config(format!("{ticker} is not in the active book")))?;
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("UPDATE holdings SET active = 0 WHERE id = ?1", [holding.id])?;
            append_ledger(
                &tx,
                holding.id,
                TransactionKind::Sell,
                &ticker,
                holding.buy_price,
                holding.quantity,
                &Utc::now().to_rfc3339(),
                &format!("Removed {}", holding.name),
            )?;
            tx.commit()
        })?;
        tracing::info!("💼 Holding removed: {}", ticker);
        Ok(holding)
    }

    /// Ledger rows for `ticker`, newest first, at most [`HISTORY_LIMIT`].
    pub fn history(&self, ticker: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let ticker = ticker.trim().to_uppercase();
        let limit = limit.min(HISTORY_LIMIT);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, holding_id, kind, ticker, price, quantity, at, note
                 FROM transactions WHERE ticker = ?1
                 ORDER BY at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(rusqlite::params![ticker, limit as i64], |row| {
                Ok(LedgerEntry {
                    id: row.get(0)?,
                    holding_id: row.get(1)?,
                    kind: row.get(2)?,
                    ticker: row.get(3)?,
                    price: row.get(4)?,
                    quantity: row.get(5)?,
                    at: row.get(6)?,
                    note: row.get(7)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Active positions, oldest first.
    pub fn list(&self) -> Result<Vec<Holding>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, ticker, name, buy_price, quantity, bought_at
                 FROM holdings WHERE active = 1 ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_holding)?;
            rows.collect()
        })
    }

    fn find_active(&self, ticker: &str) -> Result<Option<Holding>> {
        use rusqlite::OptionalExtension;
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, ticker, name, buy_price, quantity, bought_at
                 FROM holdings WHERE ticker = ?1 AND active = 1",
                [ticker],
                row_to_holding,
            )
            .optional()
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn append_ledger(
    conn: &rusqlite::Connection,
    holding_id: i64,
    kind: TransactionKind,
    ticker: &str,
    price: f64,
    quantity: u32,
    at: &str,
    note: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO transactions (holding_id, kind, ticker, price, quantity, at, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![holding_id, kind, ticker, price, quantity, at, note],
    )?;
    Ok(())
}

fn row_to_holding(row: &rusqlite::Row<'_>) -> rusqlite::Result<Holding> {
    Ok(Holding {
        id: row.get(0)?,
        ticker: row.get(1)?,
        name: row.get(2)?,
        buy_price: row.get(3)?,
        quantity: row.get(4)?,
        bought_at: row.get(5)?,
    })
}

/// The holdings book valued at market prices.
pub struct PricedHoldings {
    book: HoldingsBook,
    market: Arc<dyn MarketSource>,
}

impl PricedHoldings {
    pub fn new(book: HoldingsBook, market: Arc<dyn MarketSource>) -> Self {
        Self { book, market }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn pct(gain: f64, base: f64) -> f64 {
    if base != 0.0 { gain / base * 100.0 } else { 0.0 }
}

#[async_trait]
impl HoldingsSource for PricedHoldings {
    async fn fetch_holdings_valuation(&self) -> Result<HoldingsResult> {
        let holdings = self.book.list()?;
        let mut result = HoldingsResult::default();

        for h in holdings {
            let (current_price, day_change_pct) = match self.market.fetch_quote(&h.ticker).await {
                Ok(q) => (q.price, q.change_pct),
                Err(e) => {
                    tracing::warn!("⚠️ No quote for {}, valuing at buy price: {e}", h.ticker);
                    (h.buy_price, 0.0)
                }
            };

            let invested = h.buy_price * h.quantity as f64;
            let value = current_price * h.quantity as f64;
            let gain = value - invested;
            result.total_invested += invested;
            result.total_value += value;

            result.holdings.push(HoldingValuation {
                ticker: h.ticker,
                name: h.name,
                quantity: h.quantity,
                buy_price: h.buy_price,
                current_price,
                day_change_pct: round2(day_change_pct),
                invested: round2(invested),
                value: round2(value),
                gain: round2(gain),
                gain_pct: round2(pct(gain, invested)),
            });
        }

        let total_gain = result.total_value - result.total_invested;
        result.total_gain = round2(total_gain);
        result.total_gain_pct = round2(pct(total_gain, result.total_invested));
        result.total_invested = round2(result.total_invested);
        result.total_value = round2(result.total_value);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybreak_core::types::{ClosingPrice, MoversResult, Quote};

    struct FixedQuotes;

    #[async_trait]
    impl MarketSource for FixedQuotes {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn fetch_market_movers(&self) -> Result<MoversResult> {
            Ok(MoversResult::default())
        }
        async fn fetch_quote(&self, ticker: &str) -> Result<Quote> {
            match ticker {
                "MC.PA" => Ok(Quote {
                    ticker: ticker.into(),
                    price: 110.0,
                    change_pct: 3.0,
                }),
                _ => Err(DaybreakError::adapter("fixed", "unknown ticker")),
            }
        }
        async fn fetch_history(&self, _ticker: &str, _days: u32) -> Result<Vec<ClosingPrice>> {
            Ok(vec![])
        }
    }

    fn book() -> HoldingsBook {
        HoldingsBook::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_add_list_remove() {
        let book = book();
        let h = book.add("mc.pa", None, 100.0, 10).unwrap();
        assert_eq!(h.ticker, "MC.PA");
        assert_eq!(h.name, "LVMH");
        book.add("OR.PA", Some("L'Oreal"), 400.0, 2).unwrap();

        assert_eq!(book.list().unwrap().len(), 2);
        book.remove("mc.pa").unwrap();
        let remaining = book.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "L'Oreal");
    }

    #[test]
    fn test_duplicate_active_ticker_rejected() {
        let book = book();
        book.add("MC.PA", None, 100.0, 1).unwrap();
        assert!(book.add("MC.PA", None, 90.0, 1).is_err());

        // Re-buying after a removal is allowed.
        book.remove("MC.PA").unwrap();
        assert!(book.add("MC.PA", None, 90.0, 1).is_ok());
    }

    #[test]
    fn test_invalid_inputs() {
        let book = book();
        assert!(book.add("", None, 10.0, 1).is_err());
        assert!(book.add("MC.PA", None, 0.0, 1).is_err());
        assert!(book.add("MC.PA", None, 10.0, 0).is_err());
        assert!(book.remove("MC.PA").is_err());
    }

    #[test]
    fn test_ledger_records_buy_and_sell() {
        let book = book();
        let bought = book.add("MC.PA", None, 100.0, 10).unwrap();
        book.add("OR.PA", None, 400.0, 2).unwrap();
        book.remove("mc.pa").unwrap();

        let history = book.history("mc.pa", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransactionKind::Sell);
        assert_eq!(history[0].note.as_deref(), Some("Removed LVMH"));
        assert_eq!(history[1].kind, TransactionKind::Buy);
        assert_eq!(history[1].holding_id, Some(bought.id));
        assert_eq!(history[1].price, Some(100.0));
        assert_eq!(history[1].quantity, Some(10));
        assert!(history.iter().all(|e| e.ticker == "MC.PA"));
    }

    #[test]
    fn test_rejected_add_leaves_no_ledger_row() {
        let book = book();
        book.add("MC.PA", None, 100.0, 1).unwrap();
        assert!(book.add("MC.PA", None, 90.0, 1).is_err());
        assert!(book.add("AI.PA", None, -5.0, 1).is_err());

        assert_eq!(book.history("MC.PA", 20).unwrap().len(), 1);
        assert!(book.history("AI.PA", 20).unwrap().is_empty());
    }

    #[test]
    fn test_history_is_capped() {
        let book = book();
        for _ in 0..15 {
            book.add("SAN.PA", None, 90.0, 1).unwrap();
            book.remove("SAN.PA").unwrap();
        }
        let history = book.history("SAN.PA", 100).unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].kind, TransactionKind::Sell);
        assert_eq!(book.history("SAN.PA", 3).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_valuation_with_fallback_price() {
        let book = book();
        book.add("MC.PA", None, 100.0, 10).unwrap();
        book.add("XX.PA", None, 50.0, 2).unwrap();

        let priced = PricedHoldings::new(book, Arc::new(FixedQuotes));
        let result = priced.fetch_holdings_valuation().await.unwrap();

        assert_eq!(result.holdings.len(), 2);
        let lvmh = &result.holdings[0];
        assert_eq!(lvmh.value, 1100.0);
        assert_eq!(lvmh.gain, 100.0);
        assert_eq!(lvmh.gain_pct, 10.0);
        assert_eq!(lvmh.day_change_pct, 3.0);

        let unknown = &result.holdings[1];
        assert_eq!(unknown.current_price, 50.0);
        assert_eq!(unknown.day_change_pct, 0.0);

        assert_eq!(result.total_invested, 1100.0);
        assert_eq!(result.total_value, 1200.0);
        assert_eq!(result.total_gain, 100.0);
    }

    #[tokio::test]
    async fn test_empty_book_values_to_zero() {
        let priced = PricedHoldings::new(book(), Arc::new(FixedQuotes));
        let result = priced.fetch_holdings_valuation().await.unwrap();
        assert_eq!(result, HoldingsResult::default());
    }
}
