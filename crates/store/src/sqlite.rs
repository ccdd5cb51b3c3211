use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use kaipan_core::store::error::StoreError;
use kaipan_core::store::port::{LedgerBatch, LedgerSnapshot, LedgerStore, SystemState};
use kaipan_core::trade::entity::{
    AccountState, DailyPnl, Event, Fill, Order, OrderStatus, Position, Rejection,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// 默认账本数据库文件名
pub const DB_FILE: &str = "paper_trading.db";

const ACCOUNT_ID: &str = "MAIN";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS account (
    id TEXT PRIMARY KEY,
    cash TEXT NOT NULL,
    frozen_cash TEXT NOT NULL,
    initial_cash TEXT NOT NULL,
    realized_pnl TEXT NOT NULL,
    updated_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS positions (
    symbol TEXT PRIMARY KEY,
    total_quantity INTEGER NOT NULL,
    available_quantity INTEGER NOT NULL,
    avg_cost_gross TEXT NOT NULL,
    avg_cost_net TEXT NOT NULL,
    updated_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    client_order_id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    order_type TEXT NOT NULL,
    limit_price TEXT,
    submit_price TEXT,
    status TEXT NOT NULL,
    filled_quantity INTEGER NOT NULL,
    reserved_cash TEXT NOT NULL,
    reject_code TEXT,
    reject_reason TEXT,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL,
    expires_at DATETIME
);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status);
CREATE INDEX IF NOT EXISTS idx_orders_created ON orders (created_at);

CREATE TABLE IF NOT EXISTS fills (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    fill_id TEXT NOT NULL UNIQUE,
    client_order_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    price TEXT NOT NULL,
    commission TEXT NOT NULL,
    stamp_tax TEXT NOT NULL,
    transfer_fee TEXT NOT NULL,
    trade_time DATETIME NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_fills_symbol ON fills (symbol);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    event_type TEXT NOT NULL,
    symbol TEXT,
    details TEXT NOT NULL,
    timestamp DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS system_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_pnl (
    date TEXT PRIMARY KEY,
    start_value TEXT NOT NULL,
    end_value TEXT NOT NULL,
    realized_pnl TEXT NOT NULL,
    unrealized_pnl TEXT NOT NULL,
    fees TEXT NOT NULL,
    trades INTEGER NOT NULL
);
"#;

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn to_i64(v: u64) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Corrupted(format!("integer out of range: {}", v)))
}

fn to_u64(v: i64) -> Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| StoreError::Corrupted(format!("negative integer: {}", v)))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn dec(s: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(s).map_err(|e| StoreError::Corrupted(format!("bad decimal '{}': {}", s, e)))
}

fn opt_dec(s: Option<String>) -> Result<Option<Decimal>, StoreError> {
    s.as_deref().map(dec).transpose()
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> Result<T, StoreError> {
    T::from_str(s).map_err(StoreError::Corrupted)
}

fn get<'r, T>(row: &'r SqliteRow, col: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(col).map_err(db_err)
}

fn account_from_row(row: &SqliteRow) -> Result<AccountState, StoreError> {
    Ok(AccountState {
        cash: dec(&get::<String>(row, "cash")?)?,
        frozen_cash: dec(&get::<String>(row, "frozen_cash")?)?,
        initial_cash: dec(&get::<String>(row, "initial_cash")?)?,
        realized_pnl: dec(&get::<String>(row, "realized_pnl")?)?,
        updated_at: get(row, "updated_at")?,
    })
}

fn position_from_row(row: &SqliteRow) -> Result<Position, StoreError> {
    Ok(Position {
        symbol: get(row, "symbol")?,
        total_quantity: to_u64(get(row, "total_quantity")?)?,
        available_quantity: to_u64(get(row, "available_quantity")?)?,
        avg_cost_gross: dec(&get::<String>(row, "avg_cost_gross")?)?,
        avg_cost_net: dec(&get::<String>(row, "avg_cost_net")?)?,
        updated_at: get(row, "updated_at")?,
    })
}

fn order_from_row(row: &SqliteRow) -> Result<Order, StoreError> {
    let reject_code: Option<String> = get(row, "reject_code")?;
    let rejection = match reject_code {
        Some(code) => Some(Rejection {
            code: parse_enum(&code)?,
            reason: get::<Option<String>>(row, "reject_reason")?.unwrap_or_default(),
        }),
        None => None,
    };
    Ok(Order {
        client_order_id: get(row, "client_order_id")?,
        symbol: get(row, "symbol")?,
        direction: parse_enum(&get::<String>(row, "direction")?)?,
        quantity: to_u64(get(row, "quantity")?)?,
        order_type: parse_enum(&get::<String>(row, "order_type")?)?,
        limit_price: opt_dec(get(row, "limit_price")?)?,
        submit_price: opt_dec(get(row, "submit_price")?)?,
        status: parse_enum(&get::<String>(row, "status")?)?,
        filled_quantity: to_u64(get(row, "filled_quantity")?)?,
        reserved_cash: dec(&get::<String>(row, "reserved_cash")?)?,
        rejection,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        expires_at: get(row, "expires_at")?,
    })
}

fn fill_from_row(row: &SqliteRow) -> Result<Fill, StoreError> {
    Ok(Fill {
        fill_id: get(row, "fill_id")?,
        client_order_id: get(row, "client_order_id")?,
        symbol: get(row, "symbol")?,
        direction: parse_enum(&get::<String>(row, "direction")?)?,
        quantity: to_u64(get(row, "quantity")?)?,
        price: dec(&get::<String>(row, "price")?)?,
        commission: dec(&get::<String>(row, "commission")?)?,
        stamp_tax: dec(&get::<String>(row, "stamp_tax")?)?,
        transfer_fee: dec(&get::<String>(row, "transfer_fee")?)?,
        trade_time: get(row, "trade_time")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<Event, StoreError> {
    let details: String = get(row, "details")?;
    Ok(Event {
        id: to_u64(get(row, "id")?)?,
        event_type: parse_enum(&get::<String>(row, "event_type")?)?,
        symbol: get(row, "symbol")?,
        details: serde_json::from_str(&details)
            .map_err(|e| StoreError::Corrupted(format!("bad event details: {}", e)))?,
        timestamp: get(row, "timestamp")?,
    })
}

fn daily_pnl_from_row(row: &SqliteRow) -> Result<DailyPnl, StoreError> {
    let date: String = get(row, "date")?;
    let trades: i64 = get(row, "trades")?;
    Ok(DailyPnl {
        date: NaiveDate::from_str(&date)
            .map_err(|e| StoreError::Corrupted(format!("bad date '{}': {}", date, e)))?,
        start_value: dec(&get::<String>(row, "start_value")?)?,
        end_value: dec(&get::<String>(row, "end_value")?)?,
        realized_pnl: dec(&get::<String>(row, "realized_pnl")?)?,
        unrealized_pnl: dec(&get::<String>(row, "unrealized_pnl")?)?,
        fees: dec(&get::<String>(row, "fees")?)?,
        trades: u32::try_from(trades)
            .map_err(|_| StoreError::Corrupted(format!("bad trade count: {}", trades)))?,
    })
}

/// # Summary
/// 交易账本的 SQLite 实现。
///
/// # Invariants
/// - 全部状态位于同一个数据库文件 (WAL 模式)。
/// - 金额与价格以十进制字符串存储，避免二进制浮点误差。
/// - 每个 `LedgerBatch` 在单个事务内提交。
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// # Summary
    /// 打开 (必要时创建) `<data_dir>/paper_trading.db` 并初始化表结构。
    ///
    /// # Logic
    /// 1. 确保数据目录存在。
    /// 2. 以 WAL + NORMAL 同步级别打开连接池。
    /// 3. 执行 DDL。
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::InitError(format!("failed to create {}: {}", dir.display(), e)))?;
        let db_path = dir.join(DB_FILE);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!(path = %db_path.display(), "ledger database ready");
        Ok(Self { pool })
    }

    async fn upsert_account(
        tx: &mut Transaction<'_, Sqlite>,
        account: &AccountState,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO account (id, cash, frozen_cash, initial_cash, realized_pnl, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(ACCOUNT_ID)
        .bind(account.cash.to_string())
        .bind(account.frozen_cash.to_string())
        .bind(account.initial_cash.to_string())
        .bind(account.realized_pnl.to_string())
        .bind(account.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_position(
        tx: &mut Transaction<'_, Sqlite>,
        p: &Position,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO positions
             (symbol, total_quantity, available_quantity, avg_cost_gross, avg_cost_net, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&p.symbol)
        .bind(to_i64(p.total_quantity)?)
        .bind(to_i64(p.available_quantity)?)
        .bind(p.avg_cost_gross.to_string())
        .bind(p.avg_cost_net.to_string())
        .bind(p.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_order(tx: &mut Transaction<'_, Sqlite>, o: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO orders
             (client_order_id, symbol, direction, quantity, order_type, limit_price, submit_price,
              status, filled_quantity, reserved_cash, reject_code, reject_reason,
              created_at, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&o.client_order_id)
        .bind(&o.symbol)
        .bind(o.direction.as_str())
        .bind(to_i64(o.quantity)?)
        .bind(o.order_type.as_str())
        .bind(o.limit_price.map(|p| p.to_string()))
        .bind(o.submit_price.map(|p| p.to_string()))
        .bind(o.status.as_str())
        .bind(to_i64(o.filled_quantity)?)
        .bind(o.reserved_cash.to_string())
        .bind(o.rejection.as_ref().map(|r| r.code.as_str()))
        .bind(o.rejection.as_ref().map(|r| r.reason.clone()))
        .bind(o.created_at)
        .bind(o.updated_at)
        .bind(o.expires_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_fill(tx: &mut Transaction<'_, Sqlite>, f: &Fill) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO fills
             (fill_id, client_order_id, symbol, direction, quantity, price,
              commission, stamp_tax, transfer_fee, trade_time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&f.fill_id)
        .bind(&f.client_order_id)
        .bind(&f.symbol)
        .bind(f.direction.as_str())
        .bind(to_i64(f.quantity)?)
        .bind(f.price.to_string())
        .bind(f.commission.to_string())
        .bind(f.stamp_tax.to_string())
        .bind(f.transfer_fee.to_string())
        .bind(f.trade_time)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_event(tx: &mut Transaction<'_, Sqlite>, e: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events (id, event_type, symbol, details, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(to_i64(e.id)?)
        .bind(e.event_type.as_str())
        .bind(&e.symbol)
        .bind(e.details.to_string())
        .bind(e.timestamp)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn put_state<T: Serialize>(
        tx: &mut Transaction<'_, Sqlite>,
        key: &str,
        value: &T,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)
            .map_err(|e| StoreError::Corrupted(format!("failed to encode {}: {}", key, e)))?;
        sqlx::query("INSERT OR REPLACE INTO system_state (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(json)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn write_system(
        tx: &mut Transaction<'_, Sqlite>,
        s: &SystemState,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        Self::put_state(tx, "kill_switch", &s.kill_switch, now).await?;
        Self::put_state(tx, "day_start_value", &s.day_start_value, now).await?;
        Self::put_state(tx, "session", &s.session, now).await?;
        Self::put_state(tx, "last_unfreeze_date", &s.last_unfreeze_date, now).await?;
        Self::put_state(tx, "last_snapshot_date", &s.last_snapshot_date, now).await?;
        Self::put_state(tx, "last_daily_pnl_date", &s.last_daily_pnl_date, now).await?;
        Ok(())
    }

    async fn upsert_daily_pnl(
        tx: &mut Transaction<'_, Sqlite>,
        d: &DailyPnl,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO daily_pnl
             (date, start_value, end_value, realized_pnl, unrealized_pnl, fees, trades)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(d.date.to_string())
        .bind(d.start_value.to_string())
        .bind(d.end_value.to_string())
        .bind(d.realized_pnl.to_string())
        .bind(d.unrealized_pnl.to_string())
        .bind(d.fees.to_string())
        .bind(i64::from(d.trades))
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_state<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM system_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match value {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::Corrupted(format!("bad system_state '{}': {}", key, e))),
            None => Ok(T::default()),
        }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    /// # Summary
    /// 读取恢复账本所需的全部状态。
    ///
    /// # Logic
    /// 1. 账户行 (可能不存在)。
    /// 2. 全部持仓与挂单中的订单。
    /// 3. `system_state` 中的运行状态。
    /// 4. 事件表最大 id。
    async fn load_snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let account = sqlx::query("SELECT * FROM account WHERE id = ?")
            .bind(ACCOUNT_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(account_from_row)
            .transpose()?;

        let positions = sqlx::query("SELECT * FROM positions ORDER BY symbol")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(position_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let open_orders = sqlx::query(
            "SELECT * FROM orders WHERE status IN (?, ?) ORDER BY created_at, client_order_id",
        )
        .bind(OrderStatus::New.as_str())
        .bind(OrderStatus::PartiallyFilled.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(order_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let system = SystemState {
            kill_switch: self.load_state("kill_switch").await?,
            day_start_value: self.load_state("day_start_value").await?,
            session: self.load_state("session").await?,
            last_unfreeze_date: self.load_state("last_unfreeze_date").await?,
            last_snapshot_date: self.load_state("last_snapshot_date").await?,
            last_daily_pnl_date: self.load_state("last_daily_pnl_date").await?,
        };

        let last_event_id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        debug!(
            positions = positions.len(),
            open_orders = open_orders.len(),
            "ledger snapshot loaded"
        );
        Ok(LedgerSnapshot {
            account,
            positions,
            open_orders,
            system,
            last_event_id: to_u64(last_event_id.unwrap_or(0))?,
        })
    }

    /// # Summary
    /// 在单个事务中写入一个批次，任一步失败则整体回滚。
    async fn commit(&self, batch: &LedgerBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(account) = &batch.account {
            Self::upsert_account(&mut tx, account).await?;
        }
        for p in &batch.positions {
            Self::upsert_position(&mut tx, p).await?;
        }
        for symbol in &batch.removed_positions {
            sqlx::query("DELETE FROM positions WHERE symbol = ?")
                .bind(symbol)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        for o in &batch.orders {
            Self::upsert_order(&mut tx, o).await?;
        }
        for f in &batch.fills {
            Self::insert_fill(&mut tx, f).await?;
        }
        for e in &batch.events {
            Self::insert_event(&mut tx, e).await?;
        }
        if let Some(system) = &batch.system {
            Self::write_system(&mut tx, system).await?;
        }
        if let Some(d) = &batch.daily_pnl {
            Self::upsert_daily_pnl(&mut tx, d).await?;
        }

        // 未提交的事务在 drop 时自动回滚
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_order(&self, client_order_id: &str) -> Result<Option<Order>, StoreError> {
        sqlx::query("SELECT * FROM orders WHERE client_order_id = ?")
            .bind(client_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(order_from_row)
            .transpose()
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let limit = sql_limit(limit);
        let rows = match status {
            Some(s) => sqlx::query(
                "SELECT * FROM orders WHERE status = ? ORDER BY created_at DESC, client_order_id DESC LIMIT ?",
            )
            .bind(s.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT * FROM orders ORDER BY created_at DESC, client_order_id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(db_err)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_fills(
        &self,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Fill>, StoreError> {
        let limit = sql_limit(limit);
        let rows = match symbol {
            Some(s) => sqlx::query(
                "SELECT * FROM fills WHERE symbol = ? ORDER BY trade_time DESC, seq DESC LIMIT ?",
            )
            .bind(s)
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query("SELECT * FROM fills ORDER BY trade_time DESC, seq DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(db_err)?;
        rows.iter().map(fill_from_row).collect()
    }

    async fn list_events(&self, since_id: u64, limit: usize) -> Result<Vec<Event>, StoreError> {
        let limit = sql_limit(limit);
        sqlx::query("SELECT * FROM events WHERE id > ? ORDER BY id ASC LIMIT ?")
            .bind(to_i64(since_id)?)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(event_from_row)
            .collect()
    }

    async fn list_daily_pnl(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyPnl>, StoreError> {
        let from = from.map(|d| d.to_string()).unwrap_or_else(|| "0000-01-01".to_string());
        let to = to.map(|d| d.to_string()).unwrap_or_else(|| "9999-12-31".to_string());
        sqlx::query("SELECT * FROM daily_pnl WHERE date >= ? AND date <= ? ORDER BY date ASC")
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(daily_pnl_from_row)
            .collect()
    }
}
