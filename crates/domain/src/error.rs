//! # ドメイン層エラー定義
//!
//! ビジネスルール違反やドメイン固有の例外状態を表現するエラー型。
//!
//! ## 設計方針
//!
//! - **型による分類**: エラーの種類を列挙型で明示し、パターンマッチで処理可能に
//! - **thiserror 活用**: `#[error(...)]` マクロでエラーメッセージを自動生成
//! - **HTTP ステータスへのマッピング**: API 層でステータスコードに変換可能
//!
//! ## エラーの種類と HTTP ステータスの対応
//!
//! | エラー種別 | HTTP ステータス | 用途 |
//! |-----------|----------------|------|
//! | `Validation` | 400 Bad Request | 入力値の検証失敗 |
//! | `InvalidApprovalCode` | 400 Bad Request | 承認コードの不一致 |
//! | `ExpiredApprovalCode` | 400 Bad Request | 承認コードの期限切れ |
//! | `Forbidden` | 403 Forbidden | 権限不足（指名レビュアー以外の承認など） |
//! | `NotFound` | 404 Not Found | エンティティが存在しない |
//! | `InvalidTransition` | 409 Conflict | 状態機械の不正遷移 |
//! | `ImmutableContent` | 409 Conflict | 送信済みコンテンツの編集 |
//! | `Conflict` | 409 Conflict | 楽観的ロックの失敗 |
//! | `ConfigurationError` | 422 Unprocessable Entity | テナント設定の不備 |
//!
//! ## 使用例
//!
//! ```rust
//! use mailflow_domain::DomainError;
//!
//! fn validate_subject(subject: &str) -> Result<(), DomainError> {
//!     if subject.is_empty() {
//!         return Err(DomainError::Validation("件名は必須です".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// ビジネスロジックの実行中に発生する例外状態を表現する。
/// API 層でこのエラーを受け取り、適切な HTTP レスポンスに変換する。
///
/// # 設計判断
///
/// - `thiserror` を使用し、`std::error::Error` トレイトを自動実装
/// - 各バリアントに `#[error(...)]` で人間可読なメッセージを定義
/// - `Debug` derive により、ログ出力時に詳細情報を表示可能
#[derive(Debug, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値がビジネスルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - 必須フィールドが未入力
    /// - 文字数制限の超過
    /// - 不正なフォーマット
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    ///
    /// 指定された ID のエンティティがデータベースに存在しない場合に使用する。
    /// `entity_type` にはエンティティの種類（"Newsletter", "RecipientSend" など）を
    /// 指定し、エラーメッセージを具体的にする。
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類（"Newsletter", "RecipientSend" など）
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },

    /// 競合エラー（楽観的ロック失敗など）
    ///
    /// 同時更新による競合が発生した場合に使用する。
    /// クライアントは最新データを再取得してから再度更新を試みる必要がある。
    #[error("競合が発生しました: {0}")]
    Conflict(String),

    /// 権限エラー
    ///
    /// ユーザーに操作の実行権限がない場合に使用する。
    /// 典型的には、指名されたレビュアー以外が承認・却下を試みた場合に発生する。
    #[error("権限がありません: {0}")]
    Forbidden(String),

    /// 状態機械の不正遷移
    ///
    /// 現在の状態では許可されていない操作を試みた場合に使用する。
    /// `action` は試みた操作、`current` は現在のステータス文字列。
    #[error("{action} は現在の状態では実行できません（現在: {current}）")]
    InvalidTransition {
        /// 試みた操作の名前（"承認", "配信開始" など）
        action:  &'static str,
        /// 現在のステータス
        current: String,
    },

    /// 承認コードの不一致
    ///
    /// 入力された承認コードが発行済みコードと一致しない場合に使用する。
    /// どの桁が違うかは漏らさない（比較は定数時間で行われる）。
    #[error("承認コードが一致しません")]
    InvalidApprovalCode,

    /// 承認コードの期限切れ
    ///
    /// 発行から有効期限を過ぎた承認コードが入力された場合に使用する。
    #[error("承認コードの有効期限が切れています")]
    ExpiredApprovalCode,

    /// テナント設定の不備
    ///
    /// レビュー機能が無効、またはレビュアーが未設定のテナントで
    /// レビュー申請を試みた場合など、操作の前提となる設定が欠けている場合に使用する。
    #[error("設定が不足しています: {0}")]
    ConfigurationError(String),

    /// 送信済みコンテンツの編集
    ///
    /// 送信済み（Sent）のニュースレターはエンゲージメント集計の対象であり、
    /// 内容を変更できない。
    #[error("送信済みのコンテンツは変更できません: {0}")]
    ImmutableContent(String),
}
