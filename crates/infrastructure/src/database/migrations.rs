//! 表结构
//!
//! `generations` 为生成记录, `ai_models` 为模型目录 (由管理后台维护, 这里只读),
//! `credits` 为积分余额。

use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS generations (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        project_id TEXT,
        node_id TEXT,
        prompt TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        result_url TEXT,
        slug TEXT NOT NULL UNIQUE,
        error_message TEXT,
        created_at TEXT NOT NULL,
        completed_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ai_models (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        provider TEXT NOT NULL,
        api_path TEXT NOT NULL,
        cost_per_gen INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        parameter_schema TEXT NOT NULL DEFAULT '[]',
        priority INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS credits (
        user_id TEXT PRIMARY KEY,
        balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_generations_status_created ON generations(status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_ai_models_api_path ON ai_models(api_path)",
    "CREATE INDEX IF NOT EXISTS idx_ai_models_type_active ON ai_models(type, is_active)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("开始执行 SQLite 表结构迁移");
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("SQLite 表结构迁移完成");
    Ok(())
}
