use async_trait::async_trait;
use chrono::Utc;
use mediagen_domain::CreditLedger;
use mediagen_errors::{GenerationError, GenerationResult};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

/// 积分账本
///
/// 扣费是单条条件 UPDATE, 余额不足时不修改任何数据。
pub struct SqliteCreditLedger {
    pool: SqlitePool,
}

impl SqliteCreditLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn check_amount(amount: i64) -> GenerationResult<()> {
        if amount < 0 {
            return Err(GenerationError::validation(format!("积分数额不能为负: {amount}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for SqliteCreditLedger {
    #[instrument(skip(self))]
    async fn debit(&self, user_id: &str, amount: i64) -> GenerationResult<()> {
        Self::check_amount(amount)?;
        let result = sqlx::query(
            r#"
            UPDATE credits SET balance = balance - $1, updated_at = $2
            WHERE user_id = $3 AND balance >= $1
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!("扣费成功");
            return Ok(());
        }

        let reason = match self.balance(user_id).await? {
            Some(balance) => format!("当前余额 {balance}"),
            None => "账户不存在".to_string(),
        };
        Err(GenerationError::insufficient_funds(user_id, amount, reason))
    }

    #[instrument(skip(self))]
    async fn credit(&self, user_id: &str, amount: i64) -> GenerationResult<()> {
        Self::check_amount(amount)?;
        sqlx::query(
            r#"
            INSERT INTO credits (user_id, balance, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT(user_id) DO UPDATE SET
                balance = balance + excluded.balance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!("积分已入账");
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> GenerationResult<Option<i64>> {
        let row = sqlx::query("SELECT balance FROM credits WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("balance")?),
            None => None,
        })
    }
}
