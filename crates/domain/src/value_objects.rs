//! # 共通値オブジェクト
//!
//! 複数のエンティティで共有される値オブジェクトを定義する。
//!
//! ## 設計方針
//!
//! - **Newtype パターン**: プリミティブ型をラップし、型安全性を確保
//! - **バリデーション**: 生成時に検証し、不正な値の存在を型レベルで排除
//! - **不変性**: 一度作成したら変更不可
//!
//! ## 含まれる型
//!
//! | 型 | ラップ対象 | 用途 |
//! |---|-----------|------|
//! | [`Version`] | `u32` | エンティティのバージョン番号（楽観的ロック） |
//! | [`EmailAddress`] | `String` | 正規化済みメールアドレス（PII） |
//! | [`Subject`] | `String` | メール件名 |
//! | [`NewsletterTitle`] | `String` | ニュースレターの管理用タイトル |
//! | [`UserName`] | `String` | ユーザー表示名（PII） |

use serde::{Deserialize, Serialize};

use crate::DomainError;

// =========================================================================
// Version（バージョン番号）
// =========================================================================

/// バージョン番号（値オブジェクト）
///
/// ニュースレターの楽観的ロックに使用。
/// 1 から始まり、更新のたびにインクリメントされる。
///
/// # 不変条件
///
/// - バージョン番号は 1 以上
///
/// # 使用例
///
/// ```rust
/// use mailflow_domain::value_objects::Version;
///
/// let v1 = Version::initial();
/// assert_eq!(v1.as_u32(), 1);
///
/// let v2 = v1.next();
/// assert_eq!(v2.as_u32(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u32);

impl Version {
    /// 初期バージョン（1）を作成する
    pub fn initial() -> Self {
        Self(1)
    }

    /// 指定した値からバージョンを作成する
    ///
    /// # エラー
    ///
    /// 0 は無効（バージョンは 1 以上）。`DomainError::Validation` を返す。
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::Validation(
                "バージョン番号は 1 以上である必要があります".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// 次のバージョンを返す
    ///
    /// # パニック
    ///
    /// u32 の最大値を超える場合はパニックする。
    /// 実運用では到達しない想定。
    pub fn next(&self) -> Self {
        Self(
            self.0
                .checked_add(1)
                .expect("バージョン番号がオーバーフローしました"),
        )
    }

    /// 内部の u32 値を取得する
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// i32 に変換する（DB 互換用）
    ///
    /// # パニック
    ///
    /// i32 の範囲を超える場合はパニックする。
    pub fn as_i32(&self) -> i32 {
        i32::try_from(self.0).expect("バージョン番号が i32 の範囲を超えています")
    }
}

impl TryFrom<i32> for Version {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if value <= 0 {
            return Err(DomainError::Validation(
                "バージョン番号は 1 以上である必要があります".to_string(),
            ));
        }
        Ok(Self(value as u32))
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::initial()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// =========================================================================
// EmailAddress（メールアドレス）
// =========================================================================

/// メールアドレス（値オブジェクト）
///
/// 生成時に trim + 小文字化で正規化する。ファンアウト時の重複排除は
/// この正規化済み表現に対して行われる。
/// PII（個人識別情報）のため、Debug 出力はマスクされる。
///
/// # バリデーション
///
/// - 空文字列ではない
/// - `@` を 1 つ含み、ローカル部・ドメイン部が空でない
/// - 最大 254 文字（RFC 5321 の上限）
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_lowercase();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスは必須です".to_string(),
            ));
        }

        if value.chars().count() > 254 {
            return Err(DomainError::Validation(
                "メールアドレスは 254 文字以内である必要があります".to_string(),
            ));
        }

        let Some((local, domain)) = value.split_once('@') else {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {}",
                crate::REDACTED
            )));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {}",
                crate::REDACTED
            )));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 所有権を持つ文字列に変換する
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EmailAddress")
            .field(&crate::REDACTED)
            .finish()
    }
}

// =========================================================================
// Subject（メール件名）
// =========================================================================

define_validated_string! {
    /// メール件名（値オブジェクト）
    ///
    /// 配信されるメールの件名を表現する。
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 200 文字
    pub struct Subject {
        label: "件名",
        max_length: 200,
    }
}

// =========================================================================
// NewsletterTitle（ニュースレタータイトル）
// =========================================================================

define_validated_string! {
    /// ニュースレタータイトル（値オブジェクト）
    ///
    /// 管理画面で表示される内部名。配信メールには含まれない。
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 200 文字
    pub struct NewsletterTitle {
        label: "タイトル",
        max_length: 200,
    }
}

// =========================================================================
// UserName（ユーザー表示名）
// =========================================================================

define_validated_string! {
    /// ユーザー表示名（値オブジェクト）
    ///
    /// レビュー通知メールの宛名などに使用する。
    /// PII（個人識別情報）のため、Debug 出力はマスクされる。
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - 最大 100 文字
    pub struct UserName {
        label: "ユーザー名",
        max_length: 100,
    }
}

// =========================================================================
// テスト
// =========================================================================
