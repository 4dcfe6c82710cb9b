//! DB コネクション管理の統合テスト
//!
//! 接続プールの作成とマイグレーション適用を検証する。
//!
//! 実行方法:
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p mailflow-infra --test db_test
//! ```

use mailflow_infra::db;

/// テスト用の DATABASE_URL
fn database_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set")
}

#[tokio::test]
async fn test_接続プールからクエリを実行できる() {
    let pool = db::create_pool(&database_url()).await.unwrap();

    let row: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, 1);
}

#[tokio::test]
async fn test_マイグレーションは再実行しても安全() {
    let pool = db::create_pool(&database_url()).await.unwrap();

    // 適用済みマイグレーションはスキップされるため、2 回目もエラーにならない
    db::run_migrations(&pool).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
}
