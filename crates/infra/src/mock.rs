//! # テスト用モック実装
//!
//! ユースケーステストで使用するインメモリモック。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! mailflow-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailflow_domain::{
    approval_code::ApprovalCode,
    engagement::{EngagementEvent, EngagementEventType},
    newsletter::{Newsletter, NewsletterId, NewsletterStatus, Targeting},
    notification::{EmailMessage, NotificationError},
    recipient_send::{RecipientSend, RecipientSendId},
    tenant::{ReviewSettings, TenantId},
    user::{User, UserId},
    value_objects::{EmailAddress, Subject, Version},
};

use crate::{
    audience::{AudienceResolver, SuppressionList},
    error::InfraError,
    notification::NotificationSender,
    repository::{
        AggregateStats,
        ApprovalCodeRepository,
        EngagementEventRepository,
        NewsletterRepository,
        RecipientSendPage,
        RecipientSendRepository,
        TenantRepository,
        UserRepository,
    },
    transmission::{TransmissionError, TransmissionGateway, TransmitReceipt},
};

// ===== MockNewsletterRepository =====

#[derive(Clone, Default)]
pub struct MockNewsletterRepository {
    newsletters:      Arc<Mutex<Vec<Newsletter>>>,
    fail_next_update: Arc<Mutex<bool>>,
}

impl MockNewsletterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の `update_with_version_check` を一度だけ失敗させる
    pub fn fail_next_update(&self) {
        *self.fail_next_update.lock().unwrap() = true;
    }

    /// ニュースレターを投入する（同一 ID があれば置き換え）
    pub fn add(&self, newsletter: Newsletter) {
        let mut newsletters = self.newsletters.lock().unwrap();
        newsletters.retain(|n| n.id() != newsletter.id());
        newsletters.push(newsletter);
    }

    /// 現在の保存状態を取得する（テストの検証用）
    pub fn get(&self, id: &NewsletterId) -> Option<Newsletter> {
        self.newsletters
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id() == id)
            .cloned()
    }
}

#[async_trait]
impl NewsletterRepository for MockNewsletterRepository {
    async fn insert(&self, newsletter: &Newsletter) -> Result<(), InfraError> {
        self.newsletters.lock().unwrap().push(newsletter.clone());
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        newsletter: &Newsletter,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut fail_next = self.fail_next_update.lock().unwrap();
        if *fail_next {
            *fail_next = false;
            return Err(InfraError::unexpected("接続が一時的に失われました"));
        }
        drop(fail_next);

        let mut newsletters = self.newsletters.lock().unwrap();
        if let Some(pos) = newsletters.iter().position(|n| n.id() == newsletter.id()) {
            if newsletters[pos].version() != expected_version {
                return Err(InfraError::conflict(
                    "Newsletter",
                    newsletter.id().as_uuid().to_string(),
                ));
            }
            newsletters[pos] = newsletter.clone();
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        newsletter: &Newsletter,
        expected: &[NewsletterStatus],
    ) -> Result<bool, InfraError> {
        // 実装同様、ロック保持中に比較と差し替えを行い CAS を模倣する
        let mut newsletters = self.newsletters.lock().unwrap();
        let Some(pos) = newsletters.iter().position(|n| n.id() == newsletter.id()) else {
            return Ok(false);
        };
        if !expected.contains(&newsletters[pos].status()) {
            return Ok(false);
        }
        newsletters[pos] = newsletter.clone();
        Ok(true)
    }

    async fn find_by_id(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<Option<Newsletter>, InfraError> {
        Ok(self
            .newsletters
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id() == id && n.tenant_id() == tenant_id)
            .cloned())
    }

    async fn find_by_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Newsletter>, InfraError> {
        Ok(self
            .newsletters
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.tenant_id() == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>, InfraError> {
        Ok(self
            .newsletters
            .lock()
            .unwrap()
            .iter()
            .filter(|n| {
                n.status() == NewsletterStatus::Scheduled
                    && n.scheduled_at().is_some_and(|at| at <= now)
            })
            .cloned()
            .collect())
    }
}

// ===== MockApprovalCodeRepository =====

#[derive(Clone, Default)]
pub struct MockApprovalCodeRepository {
    codes: Arc<Mutex<Vec<ApprovalCode>>>,
}

impl MockApprovalCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, code: ApprovalCode) {
        self.codes.lock().unwrap().push(code);
    }

    pub fn all(&self) -> Vec<ApprovalCode> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalCodeRepository for MockApprovalCodeRepository {
    async fn save_invalidating_previous(
        &self,
        code: &ApprovalCode,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut codes = self.codes.lock().unwrap();
        let invalidated: Vec<ApprovalCode> = codes
            .drain(..)
            .map(|c| {
                if c.newsletter_id() == code.newsletter_id() && c.consumed_at().is_none() {
                    c.consumed(now)
                } else {
                    c
                }
            })
            .collect();
        *codes = invalidated;
        codes.push(code.clone());
        Ok(())
    }

    async fn find_active_by_newsletter(
        &self,
        newsletter_id: &NewsletterId,
    ) -> Result<Option<ApprovalCode>, InfraError> {
        Ok(self
            .codes
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.newsletter_id() == newsletter_id && c.consumed_at().is_none())
            .max_by_key(|c| c.issued_at())
            .cloned())
    }

    async fn mark_consumed(&self, code: &ApprovalCode) -> Result<(), InfraError> {
        let mut codes = self.codes.lock().unwrap();
        if let Some(pos) = codes.iter().position(|c| c.id() == code.id()) {
            codes[pos] = code.clone();
        }
        Ok(())
    }

    async fn invalidate_for_newsletter(
        &self,
        newsletter_id: &NewsletterId,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut codes = self.codes.lock().unwrap();
        let invalidated: Vec<ApprovalCode> = codes
            .drain(..)
            .map(|c| {
                if c.newsletter_id() == newsletter_id && c.consumed_at().is_none() {
                    c.consumed(now)
                } else {
                    c
                }
            })
            .collect();
        *codes = invalidated;
        Ok(())
    }
}

// ===== MockRecipientSendRepository =====

#[derive(Clone, Default)]
pub struct MockRecipientSendRepository {
    sends:      Arc<Mutex<Vec<RecipientSend>>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl MockRecipientSendRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, send: RecipientSend) {
        self.sends.lock().unwrap().push(send);
    }

    pub fn all(&self) -> Vec<RecipientSend> {
        self.sends.lock().unwrap().clone()
    }

    /// save をデータベースエラーで失敗させる（Webhook の 5xx テスト用）
    pub fn fail_saves(&self) {
        *self.fail_saves.lock().unwrap() = true;
    }
}

#[async_trait]
impl RecipientSendRepository for MockRecipientSendRepository {
    async fn insert_batch(&self, sends: &[RecipientSend]) -> Result<(), InfraError> {
        self.sends.lock().unwrap().extend_from_slice(sends);
        Ok(())
    }

    async fn save(&self, send: &RecipientSend) -> Result<(), InfraError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(InfraError::from(sqlx::Error::PoolClosed));
        }
        let mut sends = self.sends.lock().unwrap();
        if let Some(pos) = sends.iter().position(|s| s.id() == send.id()) {
            sends[pos] = send.clone();
        } else {
            sends.push(send.clone());
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &RecipientSendId,
    ) -> Result<Option<RecipientSend>, InfraError> {
        Ok(self
            .sends
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id() == id)
            .cloned())
    }

    async fn find_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<RecipientSend>, InfraError> {
        Ok(self
            .sends
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.provider_message_id() == Some(provider_message_id))
            .cloned())
    }

    async fn list_by_newsletter(
        &self,
        newsletter_id: &NewsletterId,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<RecipientSendPage, InfraError> {
        let mut items: Vec<RecipientSend> = self
            .sends
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.newsletter_id() == newsletter_id)
            .cloned()
            .collect();
        items.sort_by_key(|s| *s.id().as_uuid());

        if let Some(cursor) = cursor {
            let after = uuid::Uuid::parse_str(cursor)
                .map_err(|_| InfraError::invalid_input(format!("不正なカーソル: {cursor}")))?;
            items.retain(|s| *s.id().as_uuid() > after);
        }

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let has_more = items.len() > limit;
        items.truncate(limit);
        let next_cursor = if has_more {
            items.last().map(|s| s.id().as_uuid().to_string())
        } else {
            None
        };

        Ok(RecipientSendPage { items, next_cursor })
    }

    async fn aggregate_stats(
        &self,
        newsletter_id: &NewsletterId,
    ) -> Result<AggregateStats, InfraError> {
        use mailflow_domain::recipient_send::RecipientSendStatus as S;

        let sends = self.sends.lock().unwrap();
        let mut stats = AggregateStats::default();
        for send in sends.iter().filter(|s| s.newsletter_id() == newsletter_id) {
            if send.status() != S::Failed {
                stats.recipient_count += 1;
            }
            match send.status() {
                S::Delivered => stats.delivered += 1,
                S::Bounced => stats.bounced += 1,
                S::Complained => stats.complained += 1,
                S::Suppressed => stats.suppressed += 1,
                S::Failed => stats.failed += 1,
                S::Queued | S::Sent => {}
            }
            if send.opens() > 0 {
                stats.unique_opens += 1;
            }
            stats.total_opens += i64::from(send.opens());
            if send.clicks() > 0 {
                stats.unique_clicks += 1;
            }
            stats.total_clicks += i64::from(send.clicks());
        }
        Ok(stats)
    }
}

// ===== MockEngagementEventRepository =====

#[derive(Clone, Default)]
pub struct MockEngagementEventRepository {
    events:      Arc<Mutex<Vec<EngagementEvent>>>,
    blind_probe: Arc<Mutex<bool>>,
}

impl MockEngagementEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: EngagementEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn all(&self) -> Vec<EngagementEvent> {
        self.events.lock().unwrap().clone()
    }

    /// 重複プローブが常に「未登録」と答えるようにする
    ///
    /// 読み取りと追記の間に同一イベントの並行再送が割り込む
    /// 競合ウィンドウを再現するためのテスト用フック。
    pub fn blind_duplicate_probe(&self) {
        *self.blind_probe.lock().unwrap() = true;
    }
}

#[async_trait]
impl EngagementEventRepository for MockEngagementEventRepository {
    async fn append(&self, event: &EngagementEvent) -> Result<(), InfraError> {
        // 実装同様、（配信記録, 種別, 発生時刻）のユニークインデックスを模倣する
        let mut events = self.events.lock().unwrap();
        if events.iter().any(|e| {
            e.recipient_send_id() == event.recipient_send_id()
                && e.event_type() == event.event_type()
                && e.occurred_at() == event.occurred_at()
        }) {
            return Err(InfraError::conflict(
                "EngagementEvent",
                event.recipient_send_id().as_uuid().to_string(),
            ));
        }
        events.push(event.clone());
        Ok(())
    }

    async fn exists(
        &self,
        recipient_send_id: &RecipientSendId,
        event_type: EngagementEventType,
        occurred_at: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        if *self.blind_probe.lock().unwrap() {
            return Ok(false);
        }
        Ok(self.events.lock().unwrap().iter().any(|e| {
            e.recipient_send_id() == recipient_send_id
                && e.event_type() == event_type
                && e.occurred_at() == occurred_at
        }))
    }

    async fn list_by_recipient_send(
        &self,
        recipient_send_id: &RecipientSendId,
    ) -> Result<Vec<EngagementEvent>, InfraError> {
        let mut events: Vec<EngagementEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.recipient_send_id() == recipient_send_id)
            .cloned()
            .collect();
        events.sort_by_key(EngagementEvent::occurred_at);
        Ok(events)
    }
}

// ===== MockTenantRepository =====

#[derive(Clone, Default)]
pub struct MockTenantRepository {
    settings: Arc<Mutex<Vec<(TenantId, ReviewSettings)>>>,
}

impl MockTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_review_settings(&self, tenant_id: TenantId, settings: ReviewSettings) {
        let mut entries = self.settings.lock().unwrap();
        entries.retain(|(id, _)| *id != tenant_id);
        entries.push((tenant_id, settings));
    }
}

#[async_trait]
impl TenantRepository for MockTenantRepository {
    async fn find_review_settings(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<ReviewSettings>, InfraError> {
        Ok(self
            .settings
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == tenant_id)
            .map(|(_, settings)| settings.clone()))
    }
}

// ===== MockUserRepository =====

#[derive(Clone, Default)]
pub struct MockUserRepository {
    users: Arc<Mutex<Vec<User>>>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_id(
        &self,
        id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<Option<User>, InfraError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id() == id && u.tenant_id() == tenant_id)
            .cloned())
    }
}

// ===== MockAudienceResolver =====

#[derive(Clone, Default)]
pub struct MockAudienceResolver {
    audience: Arc<Mutex<Vec<EmailAddress>>>,
}

impl MockAudienceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audience(addresses: Vec<EmailAddress>) -> Self {
        Self {
            audience: Arc::new(Mutex::new(addresses)),
        }
    }

    pub fn add(&self, address: EmailAddress) {
        self.audience.lock().unwrap().push(address);
    }
}

#[async_trait]
impl AudienceResolver for MockAudienceResolver {
    async fn resolve(
        &self,
        _tenant_id: &TenantId,
        _targeting: &Targeting,
    ) -> Result<Vec<EmailAddress>, InfraError> {
        Ok(self.audience.lock().unwrap().clone())
    }
}

// ===== MockSuppressionList =====

#[derive(Clone, Default)]
pub struct MockSuppressionList {
    suppressed: Arc<Mutex<HashSet<EmailAddress>>>,
}

impl MockSuppressionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppress(&self, address: EmailAddress) {
        self.suppressed.lock().unwrap().insert(address);
    }
}

#[async_trait]
impl SuppressionList for MockSuppressionList {
    async fn suppressed_of(
        &self,
        _tenant_id: &TenantId,
        candidates: &[EmailAddress],
    ) -> Result<HashSet<EmailAddress>, InfraError> {
        let suppressed = self.suppressed.lock().unwrap();
        Ok(candidates
            .iter()
            .filter(|c| suppressed.contains(c))
            .cloned()
            .collect())
    }
}

// ===== MockTransmissionGateway =====

/// 配信ゲートウェイのモック
///
/// 送信記録の検証、特定アドレスの失敗、送信遅延（タイムアウトテスト用）を
/// プログラムできる。
#[derive(Clone, Default)]
pub struct MockTransmissionGateway {
    transmitted:  Arc<Mutex<Vec<EmailAddress>>>,
    failing:      Arc<Mutex<HashSet<EmailAddress>>>,
    fail_all:     Arc<Mutex<bool>>,
    delay:        Arc<Mutex<Option<Duration>>>,
    sequence:     Arc<AtomicUsize>,
}

impl MockTransmissionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定アドレスへの送信を失敗させる
    pub fn fail_for(&self, address: EmailAddress) {
        self.failing.lock().unwrap().insert(address);
    }

    /// すべての送信を失敗させる（全滅テスト用）
    pub fn fail_all(&self) {
        *self.fail_all.lock().unwrap() = true;
    }

    /// 送信ごとに遅延を挿入する（バッチタイムアウトテスト用）
    pub fn delay_each(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// 送信されたアドレスの一覧を取得する
    pub fn transmitted(&self) -> Vec<EmailAddress> {
        self.transmitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransmissionGateway for MockTransmissionGateway {
    async fn transmit(
        &self,
        recipient: &EmailAddress,
        _subject: &Subject,
        _html_body: &str,
    ) -> Result<TransmitReceipt, TransmissionError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_all.lock().unwrap() || self.failing.lock().unwrap().contains(recipient) {
            return Err(TransmissionError::SendFailed(format!(
                "モック送信失敗: {}",
                recipient.as_str()
            )));
        }

        self.transmitted.lock().unwrap().push(recipient.clone());
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(TransmitReceipt::MessageId(format!("mock-message-{seq}")))
    }
}

// ===== MockNotificationSender =====

#[derive(Clone, Default)]
pub struct MockNotificationSender {
    sent:      Arc<Mutex<Vec<EmailMessage>>>,
    fail_next: Arc<Mutex<bool>>,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の送信を失敗させる
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// 送信されたメールの一覧を取得する
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let mut fail_next = self.fail_next.lock().unwrap();
        if *fail_next {
            *fail_next = false;
            return Err(NotificationError::SendFailed(
                "モック送信失敗".to_string(),
            ));
        }
        drop(fail_next);

        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
