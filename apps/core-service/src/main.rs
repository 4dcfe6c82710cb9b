//! # Core Service サーバー
//!
//! ニュースレターの承認ワークフローと配信を実行する内部サービス。
//!
//! ## 役割
//!
//! - **状態機械**: ニュースレターのライフサイクル遷移と承認コード検証
//! - **ファンアウト配信**: 受信者ごとの並行送信と配信記録
//! - **エンゲージメント集計**: プロバイダ Webhook の取り込みと統計の導出
//! - **予約配信**: tokio インターバルタスクによる定期ディスパッチ
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `CORE_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `CORE_PORT` | **Yes** | ポート番号 |
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `NOTIFICATION_BACKEND` | No | `smtp` または `noop`（デフォルト: `noop`） |
//! | `DELIVERY_MAX_CONCURRENCY` | No | ファンアウトの最大同時送信数（デフォルト: 16） |
//! | `DELIVERY_BATCH_TIMEOUT_SECS` | No | バッチ送信タイムアウト秒（デフォルト: 300） |
//! | `SCHEDULER_INTERVAL_SECS` | No | 予約配信のポーリング間隔秒（デフォルト: 30） |
//!
//! ## 起動方法
//!
//! ```bash
//! CORE_PORT=3001 DATABASE_URL=postgres://... cargo run -p mailflow-core-service
//! ```

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post, put},
};
use mailflow_core_service::{
    config::CoreConfig,
    handler::{
        NewsletterState,
        StatsState,
        WebhookState,
        approve_and_send_newsletter,
        approve_newsletter,
        create_newsletter,
        get_newsletter,
        get_newsletter_stats,
        get_recipient_timeline,
        get_task_status,
        health_check,
        ingest_engagement_event,
        list_newsletters,
        list_recipients,
        reject_newsletter,
        schedule_newsletter,
        send_newsletter,
        submit_newsletter_for_review,
        update_newsletter,
    },
    usecase::{
        EngagementUseCaseImpl,
        FanoutCoordinator,
        NewsletterUseCaseImpl,
        NotificationService,
        StatsUseCaseImpl,
        TemplateRenderer,
    },
};
use mailflow_domain::clock::{Clock, SystemClock};
use mailflow_infra::{
    audience::{AudienceResolver, PostgresAudienceResolver, PostgresSuppressionList, SuppressionList},
    db,
    notification::{NoopNotificationSender, SmtpNotificationSender},
    repository::{
        ApprovalCodeRepository,
        EngagementEventRepository,
        NewsletterRepository,
        PostgresApprovalCodeRepository,
        PostgresEngagementEventRepository,
        PostgresNewsletterRepository,
        PostgresRecipientSendRepository,
        PostgresTenantRepository,
        PostgresUserRepository,
        RecipientSendRepository,
        TenantRepository,
        UserRepository,
    },
    transmission::{NoopTransmissionGateway, SmtpTransmissionGateway, TransmissionGateway},
    NotificationSender,
};
use mailflow_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Core Service サーバーのエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(TracingConfig::from_env("mailflow-core-service"));

    let config = CoreConfig::from_env().expect("設定の読み込みに失敗しました");

    tracing::info!(
        "Core Service サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("データベース接続に失敗しました");
    db::run_migrations(&pool)
        .await
        .expect("マイグレーションの実行に失敗しました");
    tracing::info!("データベースに接続しました");

    // リポジトリ
    let newsletter_repo: Arc<dyn NewsletterRepository> =
        Arc::new(PostgresNewsletterRepository::new(pool.clone()));
    let approval_code_repo: Arc<dyn ApprovalCodeRepository> =
        Arc::new(PostgresApprovalCodeRepository::new(pool.clone()));
    let recipient_send_repo: Arc<dyn RecipientSendRepository> =
        Arc::new(PostgresRecipientSendRepository::new(pool.clone()));
    let event_repo: Arc<dyn EngagementEventRepository> =
        Arc::new(PostgresEngagementEventRepository::new(pool.clone()));
    let tenant_repo: Arc<dyn TenantRepository> =
        Arc::new(PostgresTenantRepository::new(pool.clone()));
    let user_repo: Arc<dyn UserRepository> = Arc::new(PostgresUserRepository::new(pool.clone()));
    let audience_resolver: Arc<dyn AudienceResolver> =
        Arc::new(PostgresAudienceResolver::new(pool.clone()));
    let suppression_list: Arc<dyn SuppressionList> =
        Arc::new(PostgresSuppressionList::new(pool.clone()));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 通知・配信バックエンド（NOTIFICATION_BACKEND で切り替え）
    let notification_sender: Arc<dyn NotificationSender> =
        match config.notification.backend.as_str() {
            "smtp" => Arc::new(SmtpNotificationSender::new(
                &config.notification.smtp_host,
                config.notification.smtp_port,
                config.notification.from_address.clone(),
            )),
            _ => Arc::new(NoopNotificationSender),
        };
    let transmission_gateway: Arc<dyn TransmissionGateway> =
        match config.notification.backend.as_str() {
            "smtp" => Arc::new(SmtpTransmissionGateway::new(
                &config.notification.smtp_host,
                config.notification.smtp_port,
                config.notification.from_address.clone(),
            )),
            _ => Arc::new(NoopTransmissionGateway),
        };

    let template_renderer =
        TemplateRenderer::new().expect("通知テンプレートの初期化に失敗しました");
    let notification_service = Arc::new(NotificationService::new(
        notification_sender,
        template_renderer,
        config.notification.base_url.clone(),
    ));

    let fanout = Arc::new(FanoutCoordinator::new(
        audience_resolver,
        suppression_list,
        Arc::clone(&recipient_send_repo),
        transmission_gateway,
        Arc::clone(&clock),
        config.delivery.clone(),
    ));

    // ユースケースと共有状態
    let newsletter_usecase = Arc::new(NewsletterUseCaseImpl::new(
        Arc::clone(&newsletter_repo),
        approval_code_repo,
        tenant_repo,
        user_repo,
        fanout,
        notification_service,
        Arc::clone(&clock),
    ));
    let newsletter_state = Arc::new(NewsletterState {
        usecase: Arc::clone(&newsletter_usecase),
    });

    let stats_state = Arc::new(StatsState {
        usecase: StatsUseCaseImpl::new(
            Arc::clone(&newsletter_repo),
            Arc::clone(&recipient_send_repo),
            Arc::clone(&event_repo),
            Arc::clone(&clock),
        ),
    });

    let webhook_state = Arc::new(WebhookState {
        usecase: EngagementUseCaseImpl::new(recipient_send_repo, event_repo),
    });

    // 予約配信スケジューラ
    let scheduler_usecase = Arc::clone(&newsletter_usecase);
    let scheduler_clock = Arc::clone(&clock);
    let scheduler_interval = config.delivery.scheduler_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(scheduler_interval);
        // 遅延後のバースト発火を避ける
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match scheduler_usecase
                .dispatch_due_schedules(scheduler_clock.now())
                .await
            {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "予約配信をディスパッチしました"),
                Err(e) => tracing::error!(error = %e, "予約配信のディスパッチに失敗"),
            }
        }
    });

    // ルーター構築
    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/internal/newsletters",
            get(list_newsletters).post(create_newsletter),
        )
        .route(
            "/internal/newsletters/{id}",
            put(update_newsletter).get(get_newsletter),
        )
        .route(
            "/internal/newsletters/{id}/submit-for-review",
            post(submit_newsletter_for_review),
        )
        .route("/internal/newsletters/{id}/approve", post(approve_newsletter))
        .route(
            "/internal/newsletters/{id}/approve-and-send",
            post(approve_and_send_newsletter),
        )
        .route("/internal/newsletters/{id}/reject", post(reject_newsletter))
        .route("/internal/newsletters/{id}/send", post(send_newsletter))
        .route("/internal/newsletters/{id}/schedule", post(schedule_newsletter))
        .with_state(newsletter_state)
        .route(
            "/internal/newsletters/{id}/task-status",
            get(get_task_status),
        )
        .route("/internal/newsletters/{id}/stats", get(get_newsletter_stats))
        .route("/internal/newsletters/{id}/recipients", get(list_recipients))
        .route(
            "/internal/newsletters/{id}/recipients/{recipient_send_id}/timeline",
            get(get_recipient_timeline),
        )
        .with_state(stats_state)
        .route("/webhooks/engagement", post(ingest_engagement_event))
        .with_state(webhook_state)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("バインドアドレスが不正です");
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Core Service サーバーを開始しました: {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
