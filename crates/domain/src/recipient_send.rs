//! # 受信者配信記録
//!
//! ニュースレター 1 件 × 受信者 1 人ごとの配信記録。
//! 配信ステータスとエンゲージメントカウンター（開封・クリック）を保持する。
//!
//! ## カウンターの更新規則
//!
//! - 開封・クリックはイベントログには常に記録できるが、カウンターは
//!   終端ステータス（バウンス・苦情・配信停止）でない間だけ増える
//! - 戻り値の [`EngagementApplied`] で「初回か」「記録のみか」を区別し、
//!   集計側がユニーク数と総数を正しく維持できるようにする
//! - 終端ステータス到達後のイベントがカウンターを復活させることはない

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{DomainError, newsletter::NewsletterId, value_objects::EmailAddress};

define_uuid_id! {
    /// 受信者配信記録 ID
    pub struct RecipientSendId;
}

/// 配信ステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientSendStatus {
    /// 送信待ち（ファンアウトでキューに積まれた直後）
    Queued,
    /// プロバイダに受け渡し済み
    Sent,
    /// 受信者に到達
    Delivered,
    /// バウンス（終端）
    Bounced,
    /// 苦情報告（終端）
    Complained,
    /// 配信停止（終端）
    Suppressed,
    /// 送信失敗（ディスパッチ失敗・バッチタイムアウト）
    Failed,
}

impl RecipientSendStatus {
    /// エンゲージメントカウンターの更新を止める終端ステータスか
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Bounced | Self::Complained | Self::Suppressed)
    }
}

/// エンゲージメント適用の結果
///
/// イベントが到着したときにカウンターがどう変化したかを表す。
/// 集計側はこれを見てユニークカウントと総数を区別する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementApplied {
    /// カウンターが増えた。`first` はこの受信者で初めてのイベントか
    Counted { first: bool },
    /// イベントログには残すがカウンターは変化しない（終端ステータス・重複到達）
    LoggedOnly,
}

/// 受信者配信記録エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientSend {
    id: RecipientSendId,
    newsletter_id: NewsletterId,
    recipient: EmailAddress,
    provider_message_id: Option<String>,
    status: RecipientSendStatus,
    opens: u32,
    clicks: u32,
    last_activity_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// 受信者配信記録の DB 復元パラメータ
pub struct RecipientSendRecord {
    pub id: RecipientSendId,
    pub newsletter_id: NewsletterId,
    pub recipient: EmailAddress,
    pub provider_message_id: Option<String>,
    pub status: RecipientSendStatus,
    pub opens: u32,
    pub clicks: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecipientSend {
    /// 送信待ちの配信記録を作成する
    pub fn queued(
        id: RecipientSendId,
        newsletter_id: NewsletterId,
        recipient: EmailAddress,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            newsletter_id,
            recipient,
            provider_message_id: None,
            status: RecipientSendStatus::Queued,
            opens: 0,
            clicks: 0,
            last_activity_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 既存のデータから復元する
    pub fn from_db(record: RecipientSendRecord) -> Self {
        Self {
            id: record.id,
            newsletter_id: record.newsletter_id,
            recipient: record.recipient,
            provider_message_id: record.provider_message_id,
            status: record.status,
            opens: record.opens,
            clicks: record.clicks,
            last_activity_at: record.last_activity_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &RecipientSendId {
        &self.id
    }

    pub fn newsletter_id(&self) -> &NewsletterId {
        &self.newsletter_id
    }

    pub fn recipient(&self) -> &EmailAddress {
        &self.recipient
    }

    pub fn provider_message_id(&self) -> Option<&str> {
        self.provider_message_id.as_deref()
    }

    pub fn status(&self) -> RecipientSendStatus {
        self.status
    }

    pub fn opens(&self) -> u32 {
        self.opens
    }

    pub fn clicks(&self) -> u32 {
        self.clicks
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ビジネスロジックメソッド

    /// プロバイダへの受け渡し成功を記録した新しい値を返す
    ///
    /// `provider_message_id` は Webhook イベントとの突き合わせに使う。
    /// プロバイダがキュー受付のみ返した場合は None のまま Sent になる。
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition`: Queued 以外からの呼び出し
    pub fn marked_sent(
        self,
        provider_message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        match self.status {
            RecipientSendStatus::Queued => Ok(Self {
                provider_message_id,
                status: RecipientSendStatus::Sent,
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "送信記録",
                current: self.status.to_string(),
            }),
        }
    }

    /// 送信失敗を記録した新しい値を返す
    ///
    /// ディスパッチ失敗、またはバッチタイムアウトで未送信のまま残った記録に使う。
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidTransition`: Queued 以外からの呼び出し
    pub fn failed(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.status {
            RecipientSendStatus::Queued => Ok(Self {
                status: RecipientSendStatus::Failed,
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "失敗記録",
                current: self.status.to_string(),
            }),
        }
    }

    /// 到達イベントを適用した新しい値を返す
    ///
    /// 冪等: 初回のみ `Counted` を返し、2 回目以降と終端ステータスでは
    /// `LoggedOnly` で値は変化しない。
    pub fn delivered(self, now: DateTime<Utc>) -> (Self, EngagementApplied) {
        if self.status.is_terminal() || self.status == RecipientSendStatus::Delivered {
            return (self, EngagementApplied::LoggedOnly);
        }
        (
            Self {
                status: RecipientSendStatus::Delivered,
                last_activity_at: Some(now),
                updated_at: now,
                ..self
            },
            EngagementApplied::Counted { first: true },
        )
    }

    /// 開封イベントを適用した新しい値を返す
    ///
    /// 終端ステータスでは `LoggedOnly`。それ以外では総開封数が 1 増え、
    /// この受信者の初開封なら `first: true` が返る。
    pub fn opened(self, now: DateTime<Utc>) -> (Self, EngagementApplied) {
        if self.status.is_terminal() {
            return (self, EngagementApplied::LoggedOnly);
        }
        let first = self.opens == 0;
        (
            Self {
                opens: self.opens + 1,
                last_activity_at: Some(now),
                updated_at: now,
                ..self
            },
            EngagementApplied::Counted { first },
        )
    }

    /// クリックイベントを適用した新しい値を返す
    ///
    /// 規則は [`opened`](Self::opened) と同じ。
    pub fn clicked(self, now: DateTime<Utc>) -> (Self, EngagementApplied) {
        if self.status.is_terminal() {
            return (self, EngagementApplied::LoggedOnly);
        }
        let first = self.clicks == 0;
        (
            Self {
                clicks: self.clicks + 1,
                last_activity_at: Some(now),
                updated_at: now,
                ..self
            },
            EngagementApplied::Counted { first },
        )
    }

    /// バウンスを記録した新しい値を返す（終端）
    pub fn bounced(self, now: DateTime<Utc>) -> (Self, EngagementApplied) {
        self.terminated(RecipientSendStatus::Bounced, now)
    }

    /// 苦情報告を記録した新しい値を返す（終端）
    pub fn complained(self, now: DateTime<Utc>) -> (Self, EngagementApplied) {
        self.terminated(RecipientSendStatus::Complained, now)
    }

    /// 配信停止を記録した新しい値を返す（終端）
    pub fn suppressed(self, now: DateTime<Utc>) -> (Self, EngagementApplied) {
        self.terminated(RecipientSendStatus::Suppressed, now)
    }

    /// 終端ステータスへの遷移。既に終端なら何もしない
    fn terminated(
        self,
        status: RecipientSendStatus,
        now: DateTime<Utc>,
    ) -> (Self, EngagementApplied) {
        if self.status.is_terminal() {
            return (self, EngagementApplied::LoggedOnly);
        }
        (
            Self {
                status,
                last_activity_at: Some(now),
                updated_at: now,
                ..self
            },
            EngagementApplied::Counted { first: true },
        )
    }
}
