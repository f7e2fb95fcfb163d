use crate::models::{profit_rate, Candle, TradeRow, TradeStatus};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

/// Postgres-backed trade ledger and candle archive.
///
/// Writes are individually atomic row operations; a failed write is logged
/// by the caller and the cycle's operation abandoned, never queued.
pub struct TradeStore {
    pool: PgPool,
}

impl TradeStore {
    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("connected to Postgres");
        Ok(Self { pool })
    }

    /// Record a filled buy as a new open trade, returning the row id
    pub async fn log_buy(
        &self,
        market: &str,
        buy_price: f64,
        buy_amount: f64,
        strategy_name: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO trades (market, buy_price, buy_amount, buy_time, status, strategy_name)
            VALUES ($1, $2, $3, $4, 'open', $5)
            RETURNING id
            "#,
        )
        .bind(market)
        .bind(buy_price)
        .bind(buy_amount)
        .bind(Utc::now())
        .bind(strategy_name)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        tracing::info!(market, id, buy_price, "buy recorded");
        Ok(id)
    }

    /// Close a trade after a filled sell, computing the realized profit rate
    pub async fn log_sell(&self, trade_id: i64, sell_price: f64, reason: &str) -> Result<()> {
        let row = sqlx::query("SELECT buy_price FROM trades WHERE id = $1")
            .bind(trade_id)
            .fetch_optional(&self.pool)
            .await?;

        let rate = row
            .map(|r| {
                let buy_price: rust_decimal::Decimal = r.get("buy_price");
                let buy_price: f64 = buy_price.to_string().parse().unwrap_or(0.0);
                profit_rate(buy_price, sell_price)
            })
            .unwrap_or(0.0);

        sqlx::query(
            r#"
            UPDATE trades
            SET status = 'closed', sell_price = $1, sell_time = $2, sell_reason = $3,
                profit_rate = $4
            WHERE id = $5
            "#,
        )
        .bind(sell_price)
        .bind(Utc::now())
        .bind(reason)
        .bind(rate)
        .bind(trade_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(trade_id, sell_price, rate, "sell recorded");
        Ok(())
    }

    /// Force-close a trade whose holding no longer exists externally.
    /// The sell price is unknown and recorded as zero.
    pub async fn close_zombie(&self, trade_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trades
            SET status = 'closed', sell_price = 0, sell_time = $1, sell_reason = 'zombie'
            WHERE id = $2 AND status = 'open'
            "#,
        )
        .bind(Utc::now())
        .bind(trade_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(trade_id, "zombie trade closed");
        Ok(())
    }

    /// Every open trade, oldest first
    pub async fn open_trades(&self) -> Result<Vec<TradeRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, market, buy_price, buy_amount, buy_time, status,
                   sell_price, sell_time, profit_rate, strategy_name, sell_reason
            FROM trades
            WHERE status = 'open'
            ORDER BY buy_time ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_trade_row).collect()
    }

    /// The open trade for one market, if any
    pub async fn open_trade(&self, market: &str) -> Result<Option<TradeRow>> {
        let row = sqlx::query(
            r#"
            SELECT id, market, buy_price, buy_amount, buy_time, status,
                   sell_price, sell_time, profit_rate, strategy_name, sell_reason
            FROM trades
            WHERE market = $1 AND status = 'open'
            "#,
        )
        .bind(market)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_trade_row).transpose()
    }

    pub async fn open_trade_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM trades WHERE status = 'open'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn open_markets(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT market FROM trades WHERE status = 'open'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("market")).collect())
    }

    /// Bulk-insert candles, ignoring rows already archived for (market, time)
    pub async fn save_candles(&self, candles: &[Candle]) -> Result<u64> {
        let mut inserted = 0;
        for candle in candles {
            let result = sqlx::query(
                r#"
                INSERT INTO candles (market, time, open, high, low, close, volume)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (market, time) DO NOTHING
                "#,
            )
            .bind(&candle.market)
            .bind(candle.timestamp)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }
}

fn decode_trade_row(row: sqlx::postgres::PgRow) -> Result<TradeRow> {
    let status_str: String = row.get("status");
    let status = match status_str.as_str() {
        "open" => TradeStatus::Open,
        "closed" => TradeStatus::Closed,
        other => return Err(format!("invalid trade status '{other}'").into()),
    };

    let buy_price: rust_decimal::Decimal = row.get("buy_price");
    let buy_amount: rust_decimal::Decimal = row.get("buy_amount");
    let sell_price: Option<rust_decimal::Decimal> = row.get("sell_price");
    let sell_time: Option<DateTime<Utc>> = row.get("sell_time");

    Ok(TradeRow {
        id: row.get("id"),
        market: row.get("market"),
        buy_price: buy_price.to_string().parse()?,
        buy_amount: buy_amount.to_string().parse()?,
        buy_time: row.get("buy_time"),
        status,
        sell_price: sell_price.map(|v| v.to_string().parse()).transpose()?,
        sell_time,
        profit_rate: row.get("profit_rate"),
        strategy_name: row.get("strategy_name"),
        sell_reason: row.get("sell_reason"),
    })
}
