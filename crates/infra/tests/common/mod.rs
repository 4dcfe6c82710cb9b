//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するシードヘルパー・
//! エンティティ生成ヘルパー。Rust の統合テスト規約に従い `tests/common/mod.rs`
//! に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use mailflow_domain::{
    newsletter::{NewNewsletter, Newsletter, NewsletterId, Targeting},
    recipient_send::{RecipientSend, RecipientSendId},
    tenant::TenantId,
    user::UserId,
    value_objects::{EmailAddress, NewsletterTitle, Subject},
};
use sqlx::PgPool;
use uuid::Uuid;

/// テスト用の固定日時
pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

// =============================================================================
// DB セットアップヘルパー
// =============================================================================

/// テスト用のテナントを DB に作成
pub async fn setup_tenant(pool: &PgPool) -> TenantId {
    let tenant_id = TenantId::from_uuid(Uuid::now_v7());

    sqlx::query("INSERT INTO tenants (id, name) VALUES ($1, 'テストテナント')")
        .bind(tenant_id.as_uuid())
        .execute(pool)
        .await
        .expect("テナント作成に失敗");

    tenant_id
}

// =============================================================================
// エンティティ生成ヘルパー
// =============================================================================

/// デフォルト値で下書きニュースレターを作成
pub fn create_test_newsletter(tenant_id: &TenantId) -> Newsletter {
    Newsletter::new(NewNewsletter {
        id:         NewsletterId::new(),
        tenant_id:  tenant_id.clone(),
        title:      NewsletterTitle::new("8月号").unwrap(),
        subject:    Subject::new("今月のお知らせ").unwrap(),
        content:    "<p>本文</p>".to_string(),
        targeting:  Targeting::All,
        created_by: UserId::new(),
        now:        test_now(),
    })
}

/// ready_to_send 状態のニュースレターを作成
pub fn create_ready_newsletter(tenant_id: &TenantId) -> Newsletter {
    create_test_newsletter(tenant_id)
        .marked_ready(test_now())
        .unwrap()
}

/// queued 状態の配信記録を作成
pub fn create_queued_send(newsletter_id: &NewsletterId, email: &str) -> RecipientSend {
    RecipientSend::queued(
        RecipientSendId::new(),
        newsletter_id.clone(),
        EmailAddress::new(email).unwrap(),
        test_now(),
    )
}
