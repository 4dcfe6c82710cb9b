//! # ニュースレター
//!
//! テナントごとのニュースレターを管理する集約ルート。
//! 下書き・レビュー・承認・スケジュール・配信・送信完了のライフサイクルを持つ。
//!
//! 状態遷移は ADT（代数的データ型）で表現し、不正な状態を型レベルで防止する。
//! 「送信済みなのに sent_at がない」「レビュー待ちなのにレビュアーがいない」
//! といった組み合わせは構築できない。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    tenant::TenantId,
    user::UserId,
    value_objects::{NewsletterTitle, Subject, Version},
};

define_uuid_id! {
    /// ニュースレター ID
    pub struct NewsletterId;
}

define_uuid_id! {
    /// 連絡先 ID（配信対象の個別指定に使用）
    pub struct ContactId;
}

define_uuid_id! {
    /// タグ ID（配信対象のタグ指定に使用）
    pub struct TagId;
}

/// ニュースレターステータス
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NewsletterStatus {
    /// 下書き
    Draft,
    /// レビュー待ち
    PendingReview,
    /// 送信可能
    ReadyToSend,
    /// 送信予約済み
    Scheduled,
    /// 送信中
    Sending,
    /// 送信完了
    Sent,
}

impl std::str::FromStr for NewsletterStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending_review" => Ok(Self::PendingReview),
            "ready_to_send" => Ok(Self::ReadyToSend),
            "scheduled" => Ok(Self::Scheduled),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            _ => Err(DomainError::Validation(format!(
                "不正なニュースレターステータス: {}",
                s
            ))),
        }
    }
}

/// 配信対象の指定方法
///
/// DB には `recipient_type` カラム + ID 配列として保存される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Targeting {
    /// テナントの全連絡先
    All,
    /// 個別に選択した連絡先
    Selected { contact_ids: Vec<ContactId> },
    /// 指定タグのいずれかを持つ連絡先
    Tags { tag_ids: Vec<TagId> },
}

impl Targeting {
    /// DB の `recipient_type` カラムに格納する識別子を返す
    pub fn kind(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Selected { .. } => "selected",
            Self::Tags { .. } => "tags",
        }
    }
}

/// レビューの裁定
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
pub enum ReviewDecision {
    /// 承認
    Approved,
    /// 却下
    Rejected,
}

/// 直近のレビュー結果
///
/// 承認・却下のたびに上書きされる。却下後に再申請しても、
/// 次の裁定が出るまでは前回の結果が参照できる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub decision:    ReviewDecision,
    pub reviewer_id: UserId,
    pub notes:       Option<String>,
    pub decided_at:  DateTime<Utc>,
}

/// ニュースレターの状態（ADT ベースステートマシン）
///
/// 各状態で有効なフィールドのみを持たせることで、不正な状態を型レベルで防止する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewsletterState {
    /// 下書き
    Draft,
    /// レビュー待ち
    PendingReview(PendingReviewState),
    /// 送信可能（承認済み、またはレビュー不要で確定済み）
    ReadyToSend,
    /// 送信予約済み
    Scheduled(ScheduledState),
    /// 送信中（ファンアウト実行中）
    Sending(SendingState),
    /// 送信完了
    Sent(SentState),
}

/// PendingReview 状態の固有フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReviewState {
    /// 裁定を行う指名レビュアー
    pub reviewer_id:  UserId,
    /// レビュー申請日時
    pub submitted_at: DateTime<Utc>,
}

/// Scheduled 状態の固有フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledState {
    /// 送信予定日時
    pub scheduled_at: DateTime<Utc>,
}

/// Sending 状態の固有フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendingState {
    /// ファンアウト開始日時
    pub started_at: DateTime<Utc>,
}

/// Sent 状態の固有フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentState {
    /// 送信完了日時。エンゲージメント集計ウィンドウの起点
    pub sent_at: DateTime<Utc>,
}

/// エンゲージメント集計フェーズ
///
/// 送信完了から 24 時間は `Running`、以降は `Completed`。
/// 常に `sent_at` と現在時刻から導出され、永続化されない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, IntoStaticStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalyticsPhase {
    /// 集計ウィンドウ内
    Running,
    /// 集計ウィンドウ終了
    Completed,
}

/// エンゲージメント集計ウィンドウの長さ（時間）
pub const ANALYTICS_WINDOW_HOURS: i64 = 24;

/// ニュースレターエンティティ
///
/// 共通フィールドを外側に、状態固有フィールドを `state` enum に分離する。
///
/// ## 楽観的ロック
///
/// `version` フィールドにより、並行更新時の競合を検出する。
/// ただし送信開始（ReadyToSend/Scheduled → Sending）だけは version ではなく
/// リポジトリのステータス CAS で直列化する。同時に `send` を呼ばれても
/// 勝者は一人だけであり、二重配信は起こらない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Newsletter {
    id: NewsletterId,
    tenant_id: TenantId,
    title: NewsletterTitle,
    subject: Subject,
    content: String,
    targeting: Targeting,
    version: Version,
    created_by: UserId,
    review: Option<ReviewOutcome>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    state: NewsletterState,
}

/// ニュースレターの新規作成パラメータ
pub struct NewNewsletter {
    pub id: NewsletterId,
    pub tenant_id: TenantId,
    pub title: NewsletterTitle,
    pub subject: Subject,
    pub content: String,
    pub targeting: Targeting,
    pub created_by: UserId,
    pub now: DateTime<Utc>,
}

/// 下書き編集の入力
pub struct DraftContent {
    pub title:     NewsletterTitle,
    pub subject:   Subject,
    pub content:   String,
    pub targeting: Targeting,
}

/// ニュースレターの DB 復元パラメータ
///
/// DB スキーマのフラット構造を表現する。`from_db()` で不変条件を検証して ADT に変換する。
pub struct NewsletterRecord {
    pub id: NewsletterId,
    pub tenant_id: TenantId,
    pub title: NewsletterTitle,
    pub subject: Subject,
    pub content: String,
    pub targeting: Targeting,
    pub status: NewsletterStatus,
    pub version: Version,
    pub created_by: UserId,
    pub review: Option<ReviewOutcome>,
    pub reviewer_id: Option<UserId>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Newsletter {
    /// 新しいニュースレターを下書きとして作成する
    pub fn new(params: NewNewsletter) -> Self {
        Self {
            id: params.id,
            tenant_id: params.tenant_id,
            title: params.title,
            subject: params.subject,
            content: params.content,
            targeting: params.targeting,
            version: Version::initial(),
            created_by: params.created_by,
            review: None,
            created_at: params.now,
            updated_at: params.now,
            state: NewsletterState::Draft,
        }
    }

    /// 既存のデータから復元する
    ///
    /// DB のフラット構造から ADT に変換し、状態ごとの不変条件を検証する。
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation`: 不変条件違反（例: Sent で sent_at が None）
    pub fn from_db(record: NewsletterRecord) -> Result<Self, DomainError> {
        let state = match record.status {
            NewsletterStatus::Draft => NewsletterState::Draft,
            NewsletterStatus::PendingReview => {
                let reviewer_id = record.reviewer_id.ok_or_else(|| {
                    DomainError::Validation(
                        "PendingReview のニュースレターには reviewer_id が必要です".to_string(),
                    )
                })?;
                let submitted_at = record.submitted_at.ok_or_else(|| {
                    DomainError::Validation(
                        "PendingReview のニュースレターには submitted_at が必要です".to_string(),
                    )
                })?;
                NewsletterState::PendingReview(PendingReviewState {
                    reviewer_id,
                    submitted_at,
                })
            }
            NewsletterStatus::ReadyToSend => NewsletterState::ReadyToSend,
            NewsletterStatus::Scheduled => {
                let scheduled_at = record.scheduled_at.ok_or_else(|| {
                    DomainError::Validation(
                        "Scheduled のニュースレターには scheduled_at が必要です".to_string(),
                    )
                })?;
                NewsletterState::Scheduled(ScheduledState { scheduled_at })
            }
            NewsletterStatus::Sending => {
                let started_at = record.started_at.ok_or_else(|| {
                    DomainError::Validation(
                        "Sending のニュースレターには started_at が必要です".to_string(),
                    )
                })?;
                NewsletterState::Sending(SendingState { started_at })
            }
            NewsletterStatus::Sent => {
                let sent_at = record.sent_at.ok_or_else(|| {
                    DomainError::Validation(
                        "Sent のニュースレターには sent_at が必要です".to_string(),
                    )
                })?;
                NewsletterState::Sent(SentState { sent_at })
            }
        };

        Ok(Self {
            id: record.id,
            tenant_id: record.tenant_id,
            title: record.title,
            subject: record.subject,
            content: record.content,
            targeting: record.targeting,
            version: record.version,
            created_by: record.created_by,
            review: record.review,
            created_at: record.created_at,
            updated_at: record.updated_at,
            state,
        })
    }

    // Getter メソッド

    pub fn id(&self) -> &NewsletterId {
        &self.id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn title(&self) -> &NewsletterTitle {
        &self.title
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn targeting(&self) -> &Targeting {
        &self.targeting
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_by(&self) -> &UserId {
        &self.created_by
    }

    pub fn review(&self) -> Option<&ReviewOutcome> {
        self.review.as_ref()
    }

    pub fn status(&self) -> NewsletterStatus {
        match &self.state {
            NewsletterState::Draft => NewsletterStatus::Draft,
            NewsletterState::PendingReview(_) => NewsletterStatus::PendingReview,
            NewsletterState::ReadyToSend => NewsletterStatus::ReadyToSend,
            NewsletterState::Scheduled(_) => NewsletterStatus::Scheduled,
            NewsletterState::Sending(_) => NewsletterStatus::Sending,
            NewsletterState::Sent(_) => NewsletterStatus::Sent,
        }
    }

    pub fn reviewer_id(&self) -> Option<&UserId> {
        match &self.state {
            NewsletterState::PendingReview(s) => Some(&s.reviewer_id),
            _ => None,
        }
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            NewsletterState::PendingReview(s) => Some(s.submitted_at),
            _ => None,
        }
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            NewsletterState::Scheduled(s) => Some(s.scheduled_at),
            _ => None,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            NewsletterState::Sending(s) => Some(s.started_at),
            _ => None,
        }
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            NewsletterState::Sent(s) => Some(s.sent_at),
            _ => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 状態への直接アクセス（パターンマッチ用）
    pub fn state(&self) -> &NewsletterState {
        &self.state
    }

    /// エンゲージメント集計フェーズを導出する
    ///
    /// 送信完了から [`ANALYTICS_WINDOW_HOURS`] 時間は `Running`、以降は `Completed`。
    /// 未送信なら `None`。時刻を引数で受け取る純粋関数であり、永続化されない。
    pub fn analytics_phase(&self, now: DateTime<Utc>) -> Option<AnalyticsPhase> {
        match &self.state {
            NewsletterState::Sent(s) => {
                let window_end = s.sent_at + Duration::hours(ANALYTICS_WINDOW_HOURS);
                if now < window_end {
                    Some(AnalyticsPhase::Running)
                } else {
                    Some(AnalyticsPhase::Completed)
                }
            }
            _ => None,
        }
    }

    // ビジネスロジックメソッド

    /// レビュー申請した新しいニュースレターを返す
    ///
    /// Draft / ReadyToSend から遷移可能（ReadyToSend からの再申請は
    /// 送信前にもう一度レビューを通したい場合に使う）。
    pub fn submitted_for_review(
        self,
        reviewer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::Draft | NewsletterState::ReadyToSend => Ok(Self {
                state: NewsletterState::PendingReview(PendingReviewState {
                    reviewer_id,
                    submitted_at: now,
                }),
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "レビュー申請",
                current: self.status().to_string(),
            }),
        }
    }

    /// 承認された新しいニュースレターを返す
    ///
    /// PendingReview → ReadyToSend。レビュー結果を記録する。
    /// 承認コードの検証は呼び出し側（ユースケース層）の責務。
    pub fn approved(self, notes: Option<String>, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::PendingReview(pending) => Ok(Self {
                state: NewsletterState::ReadyToSend,
                review: Some(ReviewOutcome {
                    decision:    ReviewDecision::Approved,
                    reviewer_id: pending.reviewer_id,
                    notes,
                    decided_at:  now,
                }),
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "承認",
                current: self.status().to_string(),
            }),
        }
    }

    /// 却下された新しいニュースレターを返す
    ///
    /// PendingReview → Draft。修正のため下書きに戻る。
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation`: 却下理由が空の場合
    /// - `DomainError::InvalidTransition`: PendingReview 以外の状態
    pub fn rejected(self, notes: String, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if notes.trim().is_empty() {
            return Err(DomainError::Validation(
                "却下には理由が必要です".to_string(),
            ));
        }
        match self.state {
            NewsletterState::PendingReview(pending) => Ok(Self {
                state: NewsletterState::Draft,
                review: Some(ReviewOutcome {
                    decision:    ReviewDecision::Rejected,
                    reviewer_id: pending.reviewer_id,
                    notes:       Some(notes),
                    decided_at:  now,
                }),
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "却下",
                current: self.status().to_string(),
            }),
        }
    }

    /// レビューなしで送信可能にした新しいニュースレターを返す
    ///
    /// レビュー機能が無効なテナント用のパス。Draft → ReadyToSend。
    pub fn marked_ready(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::Draft => Ok(Self {
                state: NewsletterState::ReadyToSend,
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "送信可能化",
                current: self.status().to_string(),
            }),
        }
    }

    /// 送信予約した新しいニュースレターを返す
    ///
    /// Draft / ReadyToSend → Scheduled。
    pub fn scheduled(
        self,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::Draft | NewsletterState::ReadyToSend => Ok(Self {
                state: NewsletterState::Scheduled(ScheduledState { scheduled_at }),
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "送信予約",
                current: self.status().to_string(),
            }),
        }
    }

    /// 送信を開始した新しいニュースレターを返す
    ///
    /// ReadyToSend / Scheduled → Sending。
    /// 永続化時はリポジトリのステータス CAS と組で使い、並行呼び出しの
    /// 勝者を一人に絞る。
    pub fn sending_started(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::ReadyToSend | NewsletterState::Scheduled(_) => Ok(Self {
                state: NewsletterState::Sending(SendingState { started_at: now }),
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "送信開始",
                current: self.status().to_string(),
            }),
        }
    }

    /// 送信を完了した新しいニュースレターを返す
    ///
    /// Sending → Sent。`sent_at` がエンゲージメント集計ウィンドウの起点になる。
    pub fn completed(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::Sending(_) => Ok(Self {
                state: NewsletterState::Sent(SentState { sent_at: now }),
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "送信完了",
                current: self.status().to_string(),
            }),
        }
    }

    /// 送信を中断した新しいニュースレターを返す
    ///
    /// Sending → ReadyToSend。全件失敗時のロールバックに使う。
    /// 再試行可能な状態に戻し、Sent にはしない。
    pub fn sending_aborted(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::Sending(_) => Ok(Self {
                state: NewsletterState::ReadyToSend,
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            _ => Err(DomainError::InvalidTransition {
                action:  "送信中断",
                current: self.status().to_string(),
            }),
        }
    }

    /// 下書きの内容を編集した新しいニュースレターを返す
    ///
    /// Draft のみ編集可能。
    ///
    /// # Errors
    ///
    /// - `DomainError::ImmutableContent`: 送信済み（Sent）の編集
    /// - `DomainError::InvalidTransition`: その他の非 Draft 状態
    pub fn edited(self, draft: DraftContent, now: DateTime<Utc>) -> Result<Self, DomainError> {
        match self.state {
            NewsletterState::Draft => Ok(Self {
                title: draft.title,
                subject: draft.subject,
                content: draft.content,
                targeting: draft.targeting,
                version: self.version.next(),
                updated_at: now,
                ..self
            }),
            NewsletterState::Sent(_) => Err(DomainError::ImmutableContent(
                self.id.to_string(),
            )),
            _ => Err(DomainError::InvalidTransition {
                action:  "編集",
                current: self.status().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    /// テスト用の固定タイムスタンプ
    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[fixture]
    fn test_newsletter(now: DateTime<Utc>) -> Newsletter {
        Newsletter::new(NewNewsletter {
            id: NewsletterId::new(),
            tenant_id: TenantId::new(),
            title: NewsletterTitle::new("8月号").unwrap(),
            subject: Subject::new("今月のお知らせ").unwrap(),
            content: "<p>こんにちは</p>".to_string(),
            targeting: Targeting::All,
            created_by: UserId::new(),
            now,
        })
    }

    mod newsletter {
        use pretty_assertions::assert_eq;

        use super::*;

        /// Newsletter の getter から NewsletterRecord を構築するヘルパー。
        /// 構造体更新構文 `..record_from(&newsletter)` と組み合わせて、
        /// テストで差異のあるフィールドだけを指定するために使用する。
        fn record_from(newsletter: &Newsletter) -> NewsletterRecord {
            NewsletterRecord {
                id: newsletter.id().clone(),
                tenant_id: newsletter.tenant_id().clone(),
                title: newsletter.title().clone(),
                subject: newsletter.subject().clone(),
                content: newsletter.content().to_string(),
                targeting: newsletter.targeting().clone(),
                status: newsletter.status(),
                version: newsletter.version(),
                created_by: newsletter.created_by().clone(),
                review: newsletter.review().cloned(),
                reviewer_id: newsletter.reviewer_id().cloned(),
                submitted_at: newsletter.submitted_at(),
                scheduled_at: newsletter.scheduled_at(),
                started_at: newsletter.started_at(),
                sent_at: newsletter.sent_at(),
                created_at: newsletter.created_at(),
                updated_at: newsletter.updated_at(),
            }
        }

        #[rstest]
        fn test_新規作成の初期状態(test_newsletter: Newsletter) {
            let expected = Newsletter::from_db(record_from(&test_newsletter)).unwrap();
            assert_eq!(test_newsletter, expected);
            assert_eq!(test_newsletter.status(), NewsletterStatus::Draft);
        }

        // --- submitted_for_review() テスト ---

        #[rstest]
        fn test_レビュー申請後の状態(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let reviewer = UserId::new();
            let before = test_newsletter.clone();

            let sut = test_newsletter
                .submitted_for_review(reviewer.clone(), now)
                .unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::PendingReview,
                version: before.version().next(),
                reviewer_id: Some(reviewer),
                submitted_at: Some(now),
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_送信可能状態からの再レビュー申請は成功する(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter.marked_ready(now).unwrap();

            let result = newsletter.submitted_for_review(UserId::new(), now);

            assert!(result.is_ok());
        }

        #[rstest]
        fn test_レビュー待ちからの再申請はエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .submitted_for_review(UserId::new(), now)
                .unwrap();

            let result = newsletter.submitted_for_review(UserId::new(), now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        // --- approved() テスト ---

        #[rstest]
        fn test_承認後の状態(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let reviewer = UserId::new();
            let newsletter = test_newsletter
                .submitted_for_review(reviewer.clone(), now)
                .unwrap();
            let before = newsletter.clone();

            let sut = newsletter.approved(Some("問題なし".to_string()), now).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::ReadyToSend,
                version: before.version().next(),
                review: Some(ReviewOutcome {
                    decision:    ReviewDecision::Approved,
                    reviewer_id: reviewer,
                    notes:       Some("問題なし".to_string()),
                    decided_at:  now,
                }),
                reviewer_id: None,
                submitted_at: None,
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_レビュー待ち以外で承認するとエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let result = test_newsletter.approved(None, now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        // --- rejected() テスト ---

        #[rstest]
        fn test_却下後は下書きに戻る(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let reviewer = UserId::new();
            let newsletter = test_newsletter
                .submitted_for_review(reviewer.clone(), now)
                .unwrap();
            let before = newsletter.clone();

            let sut = newsletter.rejected("リンク切れ".to_string(), now).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::Draft,
                version: before.version().next(),
                review: Some(ReviewOutcome {
                    decision:    ReviewDecision::Rejected,
                    reviewer_id: reviewer,
                    notes:       Some("リンク切れ".to_string()),
                    decided_at:  now,
                }),
                reviewer_id: None,
                submitted_at: None,
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_却下理由が空ならエラー(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let newsletter = test_newsletter
                .submitted_for_review(UserId::new(), now)
                .unwrap();

            let result = newsletter.rejected("   ".to_string(), now);

            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        #[rstest]
        fn test_却下後に再申請できる(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let newsletter = test_newsletter
                .submitted_for_review(UserId::new(), now)
                .unwrap()
                .rejected("修正してください".to_string(), now)
                .unwrap();

            let result = newsletter.submitted_for_review(UserId::new(), now);

            assert!(result.is_ok());
        }

        // --- marked_ready() テスト ---

        #[rstest]
        fn test_レビューなし確定後の状態(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let before = test_newsletter.clone();

            let sut = test_newsletter.marked_ready(now).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::ReadyToSend,
                version: before.version().next(),
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_下書き以外からのレビューなし確定はエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter.marked_ready(now).unwrap();

            let result = newsletter.marked_ready(now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        // --- scheduled() テスト ---

        #[rstest]
        fn test_送信予約後の状態(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let at = now + Duration::hours(3);
            let newsletter = test_newsletter.marked_ready(now).unwrap();
            let before = newsletter.clone();

            let sut = newsletter.scheduled(at, now).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::Scheduled,
                version: before.version().next(),
                scheduled_at: Some(at),
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_下書きからの送信予約は成功する(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let result = test_newsletter.scheduled(now + Duration::hours(1), now);

            assert!(result.is_ok());
        }

        #[rstest]
        fn test_レビュー待ちからの送信予約はエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .submitted_for_review(UserId::new(), now)
                .unwrap();

            let result = newsletter.scheduled(now + Duration::hours(1), now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        // --- sending_started() / completed() / sending_aborted() テスト ---

        #[rstest]
        fn test_送信開始後の状態(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let newsletter = test_newsletter.marked_ready(now).unwrap();
            let before = newsletter.clone();

            let sut = newsletter.sending_started(now).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::Sending,
                version: before.version().next(),
                started_at: Some(now),
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_予約済みからの送信開始は成功する(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .scheduled(now + Duration::hours(1), now)
                .unwrap();

            let result = newsletter.sending_started(now);

            assert!(result.is_ok());
        }

        #[rstest]
        fn test_下書きからの送信開始はエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let result = test_newsletter.sending_started(now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        #[rstest]
        fn test_送信完了後の状態(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let newsletter = test_newsletter
                .marked_ready(now)
                .unwrap()
                .sending_started(now)
                .unwrap();
            let before = newsletter.clone();
            let finished = now + Duration::minutes(5);

            let sut = newsletter.completed(finished).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::Sent,
                version: before.version().next(),
                started_at: None,
                sent_at: Some(finished),
                updated_at: finished,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_送信中以外で送信完了するとエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let result = test_newsletter.completed(now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        #[rstest]
        fn test_送信中断後は送信可能に戻る(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .marked_ready(now)
                .unwrap()
                .sending_started(now)
                .unwrap();
            let before = newsletter.clone();

            let sut = newsletter.sending_aborted(now).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::ReadyToSend,
                version: before.version().next(),
                started_at: None,
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_送信中以外での送信中断はエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let result = test_newsletter.sending_aborted(now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        // --- edited() テスト ---

        fn new_draft_content() -> DraftContent {
            DraftContent {
                title:     NewsletterTitle::new("9月号").unwrap(),
                subject:   Subject::new("改訂版").unwrap(),
                content:   "<p>改訂しました</p>".to_string(),
                targeting: Targeting::All,
            }
        }

        #[rstest]
        fn test_下書きの編集後の状態(test_newsletter: Newsletter, now: DateTime<Utc>) {
            let before = test_newsletter.clone();

            let sut = test_newsletter.edited(new_draft_content(), now).unwrap();

            let expected = Newsletter::from_db(NewsletterRecord {
                title: NewsletterTitle::new("9月号").unwrap(),
                subject: Subject::new("改訂版").unwrap(),
                content: "<p>改訂しました</p>".to_string(),
                version: before.version().next(),
                updated_at: now,
                ..record_from(&before)
            })
            .unwrap();
            assert_eq!(sut, expected);
        }

        #[rstest]
        fn test_送信済みの編集はimmutable_contentエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .marked_ready(now)
                .unwrap()
                .sending_started(now)
                .unwrap()
                .completed(now)
                .unwrap();

            let result = newsletter.edited(new_draft_content(), now);

            assert!(matches!(result, Err(DomainError::ImmutableContent(_))));
        }

        #[rstest]
        fn test_レビュー待ちの編集はエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .submitted_for_review(UserId::new(), now)
                .unwrap();

            let result = newsletter.edited(new_draft_content(), now);

            assert!(matches!(
                result,
                Err(DomainError::InvalidTransition { .. })
            ));
        }

        // --- analytics_phase() テスト ---

        #[rstest]
        fn test_集計フェーズ_送信から24時間未満はrunning(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .marked_ready(now)
                .unwrap()
                .sending_started(now)
                .unwrap()
                .completed(now)
                .unwrap();

            let probe = now + Duration::hours(23) + Duration::minutes(59);

            assert_eq!(
                newsletter.analytics_phase(probe),
                Some(AnalyticsPhase::Running)
            );
        }

        #[rstest]
        fn test_集計フェーズ_送信からちょうど24時間でcompleted(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .marked_ready(now)
                .unwrap()
                .sending_started(now)
                .unwrap()
                .completed(now)
                .unwrap();

            let probe = now + Duration::hours(24);

            assert_eq!(
                newsletter.analytics_phase(probe),
                Some(AnalyticsPhase::Completed)
            );
        }

        #[rstest]
        fn test_集計フェーズ_未送信ならnone(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            assert_eq!(test_newsletter.analytics_phase(now), None);
        }

        #[rstest]
        fn test_集計フェーズは同じ入力に対して同じ結果を返す(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let newsletter = test_newsletter
                .marked_ready(now)
                .unwrap()
                .sending_started(now)
                .unwrap()
                .completed(now)
                .unwrap();
            let probe = now + Duration::hours(1);

            let first = newsletter.analytics_phase(probe);
            let second = newsletter.analytics_phase(probe);

            assert_eq!(first, second);
        }

        // --- from_db() 不変条件バリデーション ---

        #[rstest]
        fn test_from_db_pending_reviewでreviewer_id欠損はエラー(
            test_newsletter: Newsletter,
            now: DateTime<Utc>,
        ) {
            let result = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::PendingReview,
                reviewer_id: None,
                submitted_at: Some(now),
                ..record_from(&test_newsletter)
            });

            assert!(result.is_err());
        }

        #[rstest]
        fn test_from_db_pending_reviewでsubmitted_at欠損はエラー(
            test_newsletter: Newsletter,
        ) {
            let result = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::PendingReview,
                reviewer_id: Some(UserId::new()),
                submitted_at: None,
                ..record_from(&test_newsletter)
            });

            assert!(result.is_err());
        }

        #[rstest]
        fn test_from_db_scheduledでscheduled_at欠損はエラー(
            test_newsletter: Newsletter,
        ) {
            let result = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::Scheduled,
                scheduled_at: None,
                ..record_from(&test_newsletter)
            });

            assert!(result.is_err());
        }

        #[rstest]
        fn test_from_db_sendingでstarted_at欠損はエラー(test_newsletter: Newsletter) {
            let result = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::Sending,
                started_at: None,
                ..record_from(&test_newsletter)
            });

            assert!(result.is_err());
        }

        #[rstest]
        fn test_from_db_sentでsent_at欠損はエラー(test_newsletter: Newsletter) {
            let result = Newsletter::from_db(NewsletterRecord {
                status: NewsletterStatus::Sent,
                sent_at: None,
                ..record_from(&test_newsletter)
            });

            assert!(result.is_err());
        }
    }
}
