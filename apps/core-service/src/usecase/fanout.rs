//! # 受信者ファンアウト
//!
//! ニュースレター 1 通を受信者集合への個別送信に展開する。
//!
//! ## 設計方針
//!
//! - **対象解決 → 抑制 → 重複除去 → 送信**: パイプラインの各段を順に適用
//! - **並行制御**: `tokio::task::JoinSet` + `Semaphore` で同時送信数を制限
//! - **バッチタイムアウト**: 全体の待ち時間に上限を設け、超過分は `failed` 扱い
//! - **個別失敗は継続**: 1 受信者の失敗がバッチ全体を止めることはない

use std::{
    collections::HashSet,
    sync::Arc,
};

use mailflow_domain::{
    clock::Clock,
    newsletter::Newsletter,
    recipient_send::{RecipientSend, RecipientSendId},
    value_objects::EmailAddress,
};
use mailflow_infra::{
    audience::{AudienceResolver, SuppressionList},
    repository::RecipientSendRepository,
    transmission::{TransmissionGateway, TransmitReceipt},
};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{config::DeliveryConfig, error::CoreError};

/// ファンアウトの実行結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    /// 送信に成功した受信者数
    pub successful: usize,
    /// 送信に失敗した受信者数
    pub failed:     usize,
    /// 抑制・重複除去後の送信候補数
    pub candidates: usize,
}

/// 受信者ファンアウトコーディネータ
///
/// 配信対象の解決から個別送信の完了までを調停する。
/// 送信結果の解釈（全滅判定など）は呼び出し側のユースケースが行う。
pub struct FanoutCoordinator {
    audience_resolver:   Arc<dyn AudienceResolver>,
    suppression_list:    Arc<dyn SuppressionList>,
    recipient_send_repo: Arc<dyn RecipientSendRepository>,
    gateway:             Arc<dyn TransmissionGateway>,
    clock:               Arc<dyn Clock>,
    config:              DeliveryConfig,
}

impl FanoutCoordinator {
    pub fn new(
        audience_resolver: Arc<dyn AudienceResolver>,
        suppression_list: Arc<dyn SuppressionList>,
        recipient_send_repo: Arc<dyn RecipientSendRepository>,
        gateway: Arc<dyn TransmissionGateway>,
        clock: Arc<dyn Clock>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            audience_resolver,
            suppression_list,
            recipient_send_repo,
            gateway,
            clock,
            config,
        }
    }

    /// ニュースレターを受信者集合に展開して送信する
    ///
    /// ## 処理フロー
    ///
    /// 1. 配信対象条件をメールアドレス一覧に解決
    /// 2. 正規化済みアドレスで重複を除去（先勝ち）
    /// 3. 抑制リストに載っているアドレスを除外
    /// 4. `queued` の配信記録を一括挿入
    /// 5. 同時数制限つきで並行送信し、結果を配信記録に反映
    /// 6. バッチタイムアウト超過時は未完了分を `failed` にして打ち切る
    pub async fn run(&self, newsletter: &Newsletter) -> Result<FanoutReport, CoreError> {
        // 1-3. 対象解決 → 重複除去 → 抑制フィルタ
        let audience = self
            .audience_resolver
            .resolve(newsletter.tenant_id(), newsletter.targeting())
            .await?;

        let mut seen: HashSet<EmailAddress> = HashSet::new();
        let deduped: Vec<EmailAddress> = audience
            .into_iter()
            .filter(|address| seen.insert(address.clone()))
            .collect();

        let suppressed = self
            .suppression_list
            .suppressed_of(newsletter.tenant_id(), &deduped)
            .await?;
        let recipients: Vec<EmailAddress> = deduped
            .into_iter()
            .filter(|address| !suppressed.contains(address))
            .collect();

        let candidates = recipients.len();
        if candidates == 0 {
            return Ok(FanoutReport {
                successful: 0,
                failed: 0,
                candidates: 0,
            });
        }

        // 4. queued 行を一括挿入
        let now = self.clock.now();
        let sends: Vec<RecipientSend> = recipients
            .into_iter()
            .map(|recipient| {
                RecipientSend::queued(
                    RecipientSendId::new(),
                    newsletter.id().clone(),
                    recipient,
                    now,
                )
            })
            .collect();
        self.recipient_send_repo.insert_batch(&sends).await?;

        // 5. 並行送信
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let subject = newsletter.subject().clone();
        let html_body = newsletter.content().to_string();

        let mut join_set: JoinSet<(RecipientSendId, Result<TransmitReceipt, String>)> =
            JoinSet::new();
        for send in &sends {
            let semaphore = Arc::clone(&semaphore);
            let gateway = Arc::clone(&self.gateway);
            let subject = subject.clone();
            let html_body = html_body.clone();
            let recipient = send.recipient().clone();
            let send_id = send.id().clone();

            join_set.spawn(async move {
                // クローズは run() 終了までないため acquire は失敗しない
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (send_id, Err("セマフォが閉じられました".to_string()));
                };
                let result = gateway
                    .transmit(&recipient, &subject, &html_body)
                    .await
                    .map_err(|e| e.to_string());
                (send_id, result)
            });
        }

        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut completed: HashSet<RecipientSendId> = HashSet::new();

        let drain = async {
            let mut outcomes = Vec::with_capacity(candidates);
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => tracing::error!(error = %e, "送信タスクの join に失敗"),
                }
            }
            outcomes
        };

        let outcomes = match tokio::time::timeout(self.config.batch_timeout, drain).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                tracing::warn!(
                    newsletter_id = %newsletter.id(),
                    timeout_secs = self.config.batch_timeout.as_secs(),
                    "バッチタイムアウト。未完了の送信を failed 扱いにします"
                );
                join_set.abort_all();
                Vec::new()
            }
        };

        // 6. 結果を配信記録に反映
        let now = self.clock.now();
        for (send_id, result) in outcomes {
            completed.insert(send_id.clone());
            let Some(send) = sends.iter().find(|s| *s.id() == send_id) else {
                continue;
            };
            match result {
                Ok(receipt) => {
                    match send
                        .clone()
                        .marked_sent(receipt.message_id().map(str::to_string), now)
                    {
                        Ok(sent) => {
                            if let Err(e) = self.recipient_send_repo.save(&sent).await {
                                tracing::error!(
                                    error = %e,
                                    recipient_send_id = %send_id,
                                    "配信記録の保存に失敗"
                                );
                                failed += 1;
                            } else {
                                successful += 1;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "送信済みへの遷移に失敗");
                            failed += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        recipient_send_id = %send_id,
                        "受信者への送信に失敗"
                    );
                    self.mark_failed(send, now).await;
                    failed += 1;
                }
            }
        }

        // タイムアウトで完了しなかった分
        for send in sends.iter().filter(|s| !completed.contains(s.id())) {
            self.mark_failed(send, now).await;
            failed += 1;
        }

        Ok(FanoutReport {
            successful,
            failed,
            candidates,
        })
    }

    async fn mark_failed(&self, send: &RecipientSend, now: chrono::DateTime<chrono::Utc>) {
        match send.clone().failed(now) {
            Ok(failed_send) => {
                if let Err(e) = self.recipient_send_repo.save(&failed_send).await {
                    tracing::error!(
                        error = %e,
                        recipient_send_id = %send.id(),
                        "失敗状態の保存に失敗"
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "失敗状態への遷移に失敗");
            }
        }
    }
}
