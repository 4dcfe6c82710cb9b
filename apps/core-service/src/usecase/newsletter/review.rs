//! # レビューワークフロー
//!
//! レビュー申請・承認・却下の各操作。
//!
//! ## 設計方針
//!
//! - **承認コードの検証はドメインに委譲**: 定数時間比較・期限切れ判定は `ApprovalCode::verify`
//! - **レビュアー検証**: 指名レビュアー以外の承認・却下は `Forbidden`
//! - **コードは単回使用**: 承認成功時に消費、却下・再申請で無効化

use mailflow_domain::{
    DomainError,
    approval_code::ApprovalCode,
    newsletter::{Newsletter, NewsletterId},
    notification::NewsletterNotification,
    tenant::{ReviewSettings, TenantId},
    user::{User, UserId},
};
use mailflow_shared::{event_log::event, log_business_event};

use super::{NewsletterUseCaseImpl, ReviewInput, SendReport};
use crate::{
    error::CoreError,
    usecase::helpers::{FindResultExt, map_version_conflict},
};

impl NewsletterUseCaseImpl {
    /// レビューを申請する
    ///
    /// 承認コードを発行してレビュアーにメールで届ける。既存の未消費コードは
    /// 無効化されるため、有効なコードは常に最新の 1 つだけになる。
    pub async fn submit_for_review(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
    ) -> Result<Newsletter, CoreError> {
        let newsletter = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        let settings = self
            .tenant_repo
            .find_review_settings(tenant_id)
            .await?
            .unwrap_or_else(ReviewSettings::disabled);
        let reviewer_id = settings.require_reviewer()?.clone();

        let now = self.clock.now();
        let expected_version = newsletter.version();
        let submitted = newsletter.submitted_for_review(reviewer_id.clone(), now)?;

        self.newsletter_repo
            .update_with_version_check(&submitted, expected_version)
            .await
            .map_err(map_version_conflict)?;

        let code = ApprovalCode::issue(id.clone(), now);
        self.approval_code_repo
            .save_invalidating_previous(&code, now)
            .await?;

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::NEWSLETTER_SUBMITTED,
            event.tenant_id = %tenant_id,
            event.entity_id = %submitted.id(),
            event.entity_type = event::entity_type::NEWSLETTER,
            event.result = event::result::SUCCESS,
            reviewer_id = %reviewer_id,
            "レビューを申請しました"
        );

        if let (Some(reviewer), Some(author)) = (
            self.load_user(&reviewer_id, tenant_id).await,
            self.load_user(submitted.created_by(), tenant_id).await,
        ) {
            self.notification_service
                .notify(
                    NewsletterNotification::ReviewRequest {
                        newsletter_title: submitted.title().as_str().to_string(),
                        author_name:      author.name().as_str().to_string(),
                        approval_code:    code.code().to_string(),
                        reviewer_email:   reviewer.email().as_str().to_string(),
                        reviewer_user_id: reviewer_id,
                    },
                    tenant_id,
                    submitted.id(),
                )
                .await;
        }

        Ok(submitted)
    }

    /// ニュースレターを承認する
    ///
    /// 指名レビュアーのみが実行でき、有効な承認コードの完全一致が必要。
    /// 成功するとコードは消費され、再利用できない。
    pub async fn approve(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
        input: ReviewInput,
    ) -> Result<Newsletter, CoreError> {
        let newsletter = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        self.require_assigned_reviewer(&newsletter, &input.acting_user)?;

        let now = self.clock.now();
        let code = self
            .approval_code_repo
            .find_active_by_newsletter(id)
            .await?
            .ok_or(DomainError::InvalidApprovalCode)?;
        code.verify(&input.code, now)?;

        let expected_version = newsletter.version();
        let approved = newsletter.approved(input.notes.clone(), now)?;

        self.newsletter_repo
            .update_with_version_check(&approved, expected_version)
            .await
            .map_err(map_version_conflict)?;

        // コードの消費は承認の保存成功後に行う。逆順だと保存が一時的な
        // エラーで失敗したときにコードだけが消費され、再試行にはレビュー
        // 再申請による再発行が必要になってしまう。
        let consumed = code.consumed(now);
        self.approval_code_repo.mark_consumed(&consumed).await?;

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::NEWSLETTER_APPROVED,
            event.tenant_id = %tenant_id,
            event.entity_id = %approved.id(),
            event.entity_type = event::entity_type::NEWSLETTER,
            event.result = event::result::SUCCESS,
            "ニュースレターを承認しました"
        );

        self.notify_author_of_decision(&approved, &input.acting_user, tenant_id, |author, reviewer| {
            NewsletterNotification::Approved {
                newsletter_title: approved.title().as_str().to_string(),
                reviewer_name:    reviewer.name().as_str().to_string(),
                notes:            input.notes.clone(),
                author_email:     author.email().as_str().to_string(),
                author_user_id:   author.id().clone(),
            }
        })
        .await;

        Ok(approved)
    }

    /// 承認してそのまま送信する
    ///
    /// 承認後の送信が失敗した場合、ニュースレターは `ready_to_send` のまま残り、
    /// 送信エラーがそのまま返される。再試行は行わない。
    pub async fn approve_and_send(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
        input: ReviewInput,
    ) -> Result<SendReport, CoreError> {
        self.approve(id, tenant_id, input).await?;
        self.send(id, tenant_id).await
    }

    /// ニュースレターを却下する
    ///
    /// 指名レビュアーのみが実行でき、コメントは必須。
    /// 下書きに戻り、未消費の承認コードはすべて無効化される。
    pub async fn reject(
        &self,
        id: &NewsletterId,
        tenant_id: &TenantId,
        input: ReviewInput,
    ) -> Result<Newsletter, CoreError> {
        let notes = match input.notes.as_deref() {
            Some(notes) if !notes.trim().is_empty() => notes.to_string(),
            _ => {
                return Err(
                    DomainError::Validation("却下にはコメントが必須です".to_string()).into(),
                );
            }
        };

        let newsletter = self
            .newsletter_repo
            .find_by_id(id, tenant_id)
            .await
            .or_not_found("ニュースレター")?;

        self.require_assigned_reviewer(&newsletter, &input.acting_user)?;

        let now = self.clock.now();
        let expected_version = newsletter.version();
        let rejected = newsletter.rejected(notes.clone(), now)?;

        self.newsletter_repo
            .update_with_version_check(&rejected, expected_version)
            .await
            .map_err(map_version_conflict)?;

        self.approval_code_repo
            .invalidate_for_newsletter(id, now)
            .await?;

        log_business_event!(
            event.category = event::category::NEWSLETTER,
            event.action = event::action::NEWSLETTER_REJECTED,
            event.tenant_id = %tenant_id,
            event.entity_id = %rejected.id(),
            event.entity_type = event::entity_type::NEWSLETTER,
            event.result = event::result::SUCCESS,
            "ニュースレターを却下しました"
        );

        self.notify_author_of_decision(&rejected, &input.acting_user, tenant_id, |author, reviewer| {
            NewsletterNotification::Rejected {
                newsletter_title: rejected.title().as_str().to_string(),
                reviewer_name:    reviewer.name().as_str().to_string(),
                notes:            notes.clone(),
                author_email:     author.email().as_str().to_string(),
                author_user_id:   author.id().clone(),
            }
        })
        .await;

        Ok(rejected)
    }

    /// 操作ユーザーが指名レビュアーであることを検証する
    ///
    /// レビュー待ちでない場合はここでは弾かず、後続の状態遷移に
    /// `InvalidTransition` を判定させる。
    fn require_assigned_reviewer(
        &self,
        newsletter: &Newsletter,
        acting_user: &UserId,
    ) -> Result<(), CoreError> {
        if let Some(reviewer_id) = newsletter.reviewer_id()
            && reviewer_id != acting_user
        {
            return Err(DomainError::Forbidden(
                "この操作は指名レビュアーのみ実行できます".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// 裁定結果を作成者に通知する（fire-and-forget）
    async fn notify_author_of_decision<F>(
        &self,
        newsletter: &Newsletter,
        reviewer_id: &UserId,
        tenant_id: &TenantId,
        build: F,
    ) where
        F: FnOnce(&User, &User) -> NewsletterNotification,
    {
        if let (Some(author), Some(reviewer)) = (
            self.load_user(newsletter.created_by(), tenant_id).await,
            self.load_user(reviewer_id, tenant_id).await,
        ) {
            self.notification_service
                .notify(build(&author, &reviewer), tenant_id, newsletter.id())
                .await;
        }
    }

    /// 通知用にユーザーを取得する
    ///
    /// 見つからない・取得に失敗した場合は警告ログを出して `None` を返す。
    /// 通知はベストエフォートであり、操作本体を失敗させない。
    async fn load_user(&self, user_id: &UserId, tenant_id: &TenantId) -> Option<User> {
        match self.user_repo.find_by_id(user_id, tenant_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                tracing::warn!(user_id = %user_id, "通知先ユーザーが見つかりません");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "通知先ユーザーの取得に失敗");
                None
            }
        }
    }
}
