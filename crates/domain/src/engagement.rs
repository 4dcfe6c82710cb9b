//! # エンゲージメントイベント
//!
//! プロバイダ Webhook から取り込まれた受信者ごとのイベントログ（追記専用）と、
//! そこからタイムライン表示を組み立てる純粋関数を定義する。
//!
//! カウンター（[`crate::recipient_send`]）が集計用の導出値であるのに対し、
//! イベントログは監査用の一次記録であり、終端ステータス後のイベントも残る。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::IntoStaticStr;

use crate::recipient_send::RecipientSendId;

define_uuid_id! {
    /// エンゲージメントイベント ID
    pub struct EngagementEventId;
}

/// エンゲージメントイベント種別
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
pub enum EngagementEventType {
    /// 受信者に到達
    Delivered,
    /// 開封
    Opened,
    /// リンククリック
    Clicked,
    /// バウンス
    Bounced,
    /// 苦情報告
    Complained,
    /// 配信停止
    Suppressed,
}

/// エンゲージメントイベント（追記専用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementEvent {
    id: EngagementEventId,
    recipient_send_id: RecipientSendId,
    event_type: EngagementEventType,
    occurred_at: DateTime<Utc>,
    metadata: JsonValue,
}

impl EngagementEvent {
    pub fn new(
        id: EngagementEventId,
        recipient_send_id: RecipientSendId,
        event_type: EngagementEventType,
        occurred_at: DateTime<Utc>,
        metadata: JsonValue,
    ) -> Self {
        Self {
            id,
            recipient_send_id,
            event_type,
            occurred_at,
            metadata,
        }
    }

    pub fn id(&self) -> &EngagementEventId {
        &self.id
    }

    pub fn recipient_send_id(&self) -> &RecipientSendId {
        &self.recipient_send_id
    }

    pub fn event_type(&self) -> EngagementEventType {
        self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn metadata(&self) -> &JsonValue {
        &self.metadata
    }
}

/// タイムライン上のイベント種別
///
/// イベントログの種別に加えて、ニュースレターの `sent_at` から導出される
/// 合成 `Sent` エントリを表現する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, IntoStaticStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimelineEventType {
    /// 送信完了（合成エントリ。イベントログには存在しない）
    Sent,
    /// 受信者に到達
    Delivered,
    /// 開封
    Opened,
    /// リンククリック
    Clicked,
    /// バウンス
    Bounced,
    /// 苦情報告
    Complained,
    /// 配信停止
    Suppressed,
}

impl From<EngagementEventType> for TimelineEventType {
    fn from(value: EngagementEventType) -> Self {
        match value {
            EngagementEventType::Delivered => Self::Delivered,
            EngagementEventType::Opened => Self::Opened,
            EngagementEventType::Clicked => Self::Clicked,
            EngagementEventType::Bounced => Self::Bounced,
            EngagementEventType::Complained => Self::Complained,
            EngagementEventType::Suppressed => Self::Suppressed,
        }
    }
}

/// タイムラインの 1 エントリ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub event_type:  TimelineEventType,
    pub occurred_at: DateTime<Utc>,
    pub metadata:    Option<JsonValue>,
}

/// 受信者のタイムラインを組み立てる
///
/// イベントを発生時刻の昇順に整列し、先頭にニュースレターの `sent_at` から
/// 導出した合成 `Sent` エントリを置く（未送信なら合成エントリなし）。
/// 同時刻のイベントは元の順序を保つ（安定ソート）。
pub fn build_timeline(
    sent_at: Option<DateTime<Utc>>,
    mut events: Vec<EngagementEvent>,
) -> Vec<TimelineEntry> {
    events.sort_by_key(EngagementEvent::occurred_at);

    let mut timeline = Vec::with_capacity(events.len() + 1);
    if let Some(sent_at) = sent_at {
        timeline.push(TimelineEntry {
            event_type:  TimelineEventType::Sent,
            occurred_at: sent_at,
            metadata:    None,
        });
    }
    timeline.extend(events.into_iter().map(|event| TimelineEntry {
        event_type:  event.event_type.into(),
        occurred_at: event.occurred_at,
        metadata:    Some(event.metadata),
    }));
    timeline
}
