//! # ユーザー
//!
//! レビュー通知の宛先解決と権限チェックに必要な最小限のユーザーモデル。
//! 認証・セッション管理はこのサービスの責務外。

use crate::{
    tenant::TenantId,
    value_objects::{EmailAddress, UserName},
};

define_uuid_id! {
    /// ユーザー ID（一意識別子）
    ///
    /// UUID v7 を使用し、生成順にソート可能。
    /// Newtype パターンで型安全性を確保。
    pub struct UserId;
}

/// ユーザーエンティティ
///
/// レビュアーへの通知メール送信と、承認・却下時の権限チェック
/// （操作者が指名レビュアーか）に使用する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id:        UserId,
    tenant_id: TenantId,
    name:      UserName,
    email:     EmailAddress,
}

impl User {
    pub fn new(id: UserId, tenant_id: TenantId, name: UserName, email: EmailAddress) -> Self {
        Self {
            id,
            tenant_id,
            name,
            email,
        }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn name(&self) -> &UserName {
        &self.name
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }
}
