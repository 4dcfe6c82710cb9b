//! 送信開始 CAS の統合テスト
//!
//! 二重送信防止はリポジトリの `transition_status`
//! （`UPDATE ... WHERE status = ANY(...)` の compare-and-swap）で保証する。
//! sqlx::test は単一接続プールのため、tokio::spawn による真の並行テストは
//! 行わず、逐次実行で同等の競合シナリオを検証する。
//!
//! 実行方法:
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p mailflow-infra --test send_transition_test
//! ```

mod common;

use common::{create_ready_newsletter, setup_tenant, test_now};
use mailflow_domain::newsletter::NewsletterStatus;
use mailflow_infra::repository::{NewsletterRepository, PostgresNewsletterRepository};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

const SEND_EXPECTED: &[NewsletterStatus] =
    &[NewsletterStatus::ReadyToSend, NewsletterStatus::Scheduled];

#[sqlx::test(migrations = "../../migrations")]
async fn test_ready_to_sendからsendingへのcasが成功する(pool: PgPool) {
    let tenant_id = setup_tenant(&pool).await;
    let ready = create_ready_newsletter(&tenant_id);
    let repo = PostgresNewsletterRepository::new(pool);
    repo.insert(&ready).await.unwrap();

    let sending = ready.sending_started(test_now()).unwrap();
    let swapped = repo.transition_status(&sending, SEND_EXPECTED).await.unwrap();

    assert!(swapped);
    let stored = repo
        .find_by_id(sending.id(), &tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), NewsletterStatus::Sending);
    assert!(stored.started_at().is_some());
}

/// シナリオ:
/// 1. ready_to_send のニュースレターに対し、2 つの送信要求が同じ状態を読む
/// 2. 先勝ちの CAS は成功し、status が sending に変わる
/// 3. 後発の CAS は status が既に sending のため外れ、`Ok(false)` を返す
#[sqlx::test(migrations = "../../migrations")]
async fn test_二重の送信開始は後発のcasが外れる(pool: PgPool) {
    let tenant_id = setup_tenant(&pool).await;
    let ready = create_ready_newsletter(&tenant_id);
    let repo = PostgresNewsletterRepository::new(pool);
    repo.insert(&ready).await.unwrap();

    // 両者が同じ ready_to_send 状態から遷移を組み立てる
    let first = ready.clone().sending_started(test_now()).unwrap();
    let second = ready.sending_started(test_now()).unwrap();

    assert!(repo.transition_status(&first, SEND_EXPECTED).await.unwrap());
    assert!(!repo.transition_status(&second, SEND_EXPECTED).await.unwrap());

    let stored = repo
        .find_by_id(first.id(), &tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), NewsletterStatus::Sending);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_全滅時はsendingからready_to_sendへ巻き戻せる(pool: PgPool) {
    let tenant_id = setup_tenant(&pool).await;
    let ready = create_ready_newsletter(&tenant_id);
    let repo = PostgresNewsletterRepository::new(pool);
    repo.insert(&ready).await.unwrap();

    let sending = ready.sending_started(test_now()).unwrap();
    assert!(repo.transition_status(&sending, SEND_EXPECTED).await.unwrap());

    let aborted = sending.sending_aborted(test_now()).unwrap();
    let swapped = repo
        .transition_status(&aborted, &[NewsletterStatus::Sending])
        .await
        .unwrap();

    assert!(swapped);
    let stored = repo
        .find_by_id(aborted.id(), &tenant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), NewsletterStatus::ReadyToSend);
    assert!(stored.started_at().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_存在しない行へのcasは外れる(pool: PgPool) {
    let tenant_id = setup_tenant(&pool).await;
    let ready = create_ready_newsletter(&tenant_id);
    let repo = PostgresNewsletterRepository::new(pool);

    // 挿入せずに CAS を試みる
    let sending = ready.sending_started(test_now()).unwrap();
    let swapped = repo.transition_status(&sending, SEND_EXPECTED).await.unwrap();

    assert!(!swapped);
}
