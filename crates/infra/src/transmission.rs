//! # ニュースレター配信ゲートウェイ
//!
//! 受信者 1 人分のニュースレター送信を抽象化する。
//!
//! ## 設計方針
//!
//! - **1 受信者 1 呼び出し**: ファンアウトの並行制御はユースケース側が担う
//! - **受領証の返却**: プロバイダのメッセージ ID が得られる場合は
//!   [`TransmitReceipt::MessageId`] として返し、Webhook の逆引きに使う
//! - **SMTP 実装**: lettre の `AsyncSmtpTransport` を使用する

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Message, SinglePart, header::ContentType},
};
use mailflow_domain::value_objects::{EmailAddress, Subject};
use thiserror::Error;

/// 配信に失敗した場合のエラー
#[derive(Debug, Error)]
pub enum TransmissionError {
    /// メッセージ構築または送信の失敗
    #[error("配信失敗: {0}")]
    SendFailed(String),
}

/// 配信の受領証
///
/// プロバイダがメッセージ ID を同期的に返す場合は `MessageId`、
/// キュー投入のみで ID が後続の Webhook でしか分からない場合は `Queued`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitReceipt {
    /// プロバイダ採番のメッセージ ID
    MessageId(String),
    /// キュー受付のみ（ID なし）
    Queued,
}

impl TransmitReceipt {
    /// メッセージ ID を取り出す
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::MessageId(id) => Some(id),
            Self::Queued => None,
        }
    }
}

/// ニュースレター配信ゲートウェイトレイト
#[async_trait]
pub trait TransmissionGateway: Send + Sync {
    /// 1 受信者にニュースレターを送信する
    async fn transmit(
        &self,
        recipient: &EmailAddress,
        subject: &Subject,
        html_body: &str,
    ) -> Result<TransmitReceipt, TransmissionError>;
}

/// SMTP 実装の配信ゲートウェイ
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
/// Mailpit（開発）や SMTP リレー（テスト環境）で使用する。
pub struct SmtpTransmissionGateway {
    transport:    AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpTransmissionGateway {
    /// 新しい SMTP ゲートウェイを作成
    ///
    /// # 引数
    ///
    /// - `host`: SMTP サーバーのホスト名（例: "localhost"）
    /// - `port`: SMTP サーバーのポート番号（例: 1025 for Mailpit）
    /// - `from_address`: 送信元メールアドレス
    pub fn new(host: &str, port: u16, from_address: String) -> Self {
        // builder_dangerous: TLS なしで接続（Mailpit 等のローカル SMTP 向け）
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Self {
            transport,
            from_address,
        }
    }
}

#[async_trait]
impl TransmissionGateway for SmtpTransmissionGateway {
    async fn transmit(
        &self,
        recipient: &EmailAddress,
        subject: &Subject,
        html_body: &str,
    ) -> Result<TransmitReceipt, TransmissionError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e| TransmissionError::SendFailed(format!("送信元アドレス不正: {e}")))?,
            )
            .to(recipient
                .as_str()
                .parse()
                .map_err(|e| TransmissionError::SendFailed(format!("宛先アドレス不正: {e}")))?)
            .subject(subject.as_str())
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html_body.to_string()),
            )
            .map_err(|e| TransmissionError::SendFailed(format!("メッセージ構築失敗: {e}")))?;

        let message_id = message
            .headers()
            .get_raw("Message-ID")
            .map(str::to_string);

        self.transport
            .send(message)
            .await
            .map_err(|e| TransmissionError::SendFailed(format!("SMTP 送信失敗: {e}")))?;

        // lettre が採番した Message-ID を受領証として返す
        Ok(match message_id {
            Some(id) => TransmitReceipt::MessageId(id),
            None => TransmitReceipt::Queued,
        })
    }
}

/// Noop 実装の配信ゲートウェイ（ログ出力のみ）
///
/// テスト環境や配信無効化時に使用する。
#[derive(Debug, Clone)]
pub struct NoopTransmissionGateway;

#[async_trait]
impl TransmissionGateway for NoopTransmissionGateway {
    async fn transmit(
        &self,
        recipient: &EmailAddress,
        subject: &Subject,
        _html_body: &str,
    ) -> Result<TransmitReceipt, TransmissionError> {
        tracing::info!(
            recipient = %recipient.as_str(),
            subject = %subject.as_str(),
            "Noop: ニュースレター配信をスキップ"
        );
        Ok(TransmitReceipt::Queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpTransmissionGateway>();
        assert_send_sync::<NoopTransmissionGateway>();
        assert_send_sync::<Box<dyn TransmissionGateway>>();
    }

    #[test]
    fn test_receiptからメッセージidを取り出せる() {
        let receipt = TransmitReceipt::MessageId("abc-123".to_string());
        assert_eq!(receipt.message_id(), Some("abc-123"));
        assert_eq!(TransmitReceipt::Queued.message_id(), None);
    }

    #[tokio::test]
    async fn test_noopゲートウェイはエラーを返さない() {
        let gateway = NoopTransmissionGateway;
        let recipient = EmailAddress::new("test@example.com").unwrap();
        let subject = Subject::new("テスト件名").unwrap();

        let result = gateway.transmit(&recipient, &subject, "<p>本文</p>").await;
        assert!(matches!(result, Ok(TransmitReceipt::Queued)));
    }
}
