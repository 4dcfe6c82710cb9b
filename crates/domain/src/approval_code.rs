//! # 承認コード
//!
//! レビュー承認に使うワンタイムコード。レビュー申請ごとに CSPRNG で発行され、
//! レビュアーにメールで届けられる。承認時に完全一致で検証し、一度使えば無効になる。
//!
//! ## セキュリティ
//!
//! - 比較は `subtle::ConstantTimeEq` による定数時間比較。タイミングから
//!   桁の一致状況を推測できない
//! - 前方一致・部分一致は受け付けない（長さが違えば即不一致）
//! - 有効期限は発行から 24 時間

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::{DomainError, newsletter::NewsletterId};

define_uuid_id! {
    /// 承認コード ID
    pub struct ApprovalCodeId;
}

/// コードの桁数
pub const CODE_LENGTH: usize = 5;

/// 発行からの有効期限（時間）
pub const VALIDITY_HOURS: i64 = 24;

/// 承認コードエンティティ
///
/// ニュースレター 1 件につき有効なコードは常に 1 つ。
/// 再申請で新しいコードが発行されると、古いコードはリポジトリ側で無効化される。
#[derive(Clone, PartialEq, Eq)]
pub struct ApprovalCode {
    id: ApprovalCodeId,
    newsletter_id: NewsletterId,
    code: String,
    issued_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

/// 承認コードの DB 復元パラメータ
pub struct ApprovalCodeRecord {
    pub id: ApprovalCodeId,
    pub newsletter_id: NewsletterId,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ApprovalCode {
    /// 新しい承認コードを発行する
    ///
    /// CSPRNG から 0〜99999 の乱数を取り、ゼロ埋め 5 桁で表現する。
    pub fn issue(newsletter_id: NewsletterId, now: DateTime<Utc>) -> Self {
        let value: u32 = rand::rng().random_range(0..100_000);
        Self {
            id: ApprovalCodeId::new(),
            newsletter_id,
            code: format!("{value:05}"),
            issued_at: now,
            consumed_at: None,
        }
    }

    /// 既存のデータから復元する
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation`: コードが 5 桁の数字でない
    pub fn from_db(record: ApprovalCodeRecord) -> Result<Self, DomainError> {
        if record.code.len() != CODE_LENGTH
            || !record.code.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(DomainError::Validation(
                "承認コードは 5 桁の数字である必要があります".to_string(),
            ));
        }
        Ok(Self {
            id: record.id,
            newsletter_id: record.newsletter_id,
            code: record.code,
            issued_at: record.issued_at,
            consumed_at: record.consumed_at,
        })
    }

    pub fn id(&self) -> &ApprovalCodeId {
        &self.id
    }

    pub fn newsletter_id(&self) -> &NewsletterId {
        &self.newsletter_id
    }

    /// コード本体（通知メールの本文にのみ使用する）
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn consumed_at(&self) -> Option<DateTime<Utc>> {
        self.consumed_at
    }

    /// 入力されたコードを検証する
    ///
    /// 長さ一致 + 定数時間比較による完全一致のみを受け付ける。
    ///
    /// # Errors
    ///
    /// - `DomainError::ExpiredApprovalCode`: 発行から 24 時間経過、または使用済み
    /// - `DomainError::InvalidApprovalCode`: コード不一致
    pub fn verify(&self, input: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.consumed_at.is_some() {
            return Err(DomainError::ExpiredApprovalCode);
        }
        if now >= self.issued_at + Duration::hours(VALIDITY_HOURS) {
            return Err(DomainError::ExpiredApprovalCode);
        }
        if input.len() != self.code.len() {
            return Err(DomainError::InvalidApprovalCode);
        }
        if bool::from(input.as_bytes().ct_eq(self.code.as_bytes())) {
            Ok(())
        } else {
            Err(DomainError::InvalidApprovalCode)
        }
    }

    /// コードを使用済みにした新しい値を返す
    pub fn consumed(self, now: DateTime<Utc>) -> Self {
        Self {
            consumed_at: Some(now),
            ..self
        }
    }
}

// コード本体をログに漏らさない
impl std::fmt::Debug for ApprovalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalCode")
            .field("id", &self.id)
            .field("newsletter_id", &self.newsletter_id)
            .field("code", &crate::REDACTED)
            .field("issued_at", &self.issued_at)
            .field("consumed_at", &self.consumed_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn code_with(code: &str, issued_at: DateTime<Utc>) -> ApprovalCode {
        ApprovalCode::from_db(ApprovalCodeRecord {
            id: ApprovalCodeId::new(),
            newsletter_id: NewsletterId::new(),
            code: code.to_string(),
            issued_at,
            consumed_at: None,
        })
        .unwrap()
    }

    #[rstest]
    fn test_発行されたコードは5桁の数字(now: DateTime<Utc>) {
        let code = ApprovalCode::issue(NewsletterId::new(), now);

        assert_eq!(code.code().len(), CODE_LENGTH);
        assert!(code.code().bytes().all(|b| b.is_ascii_digit()));
        assert!(code.consumed_at().is_none());
    }

    #[rstest]
    fn test_正しいコードは検証を通過する(now: DateTime<Utc>) {
        let code = code_with("04217", now);

        assert!(code.verify("04217", now).is_ok());
    }

    #[rstest]
    #[case("04218", "1桁違い")]
    #[case("99999", "全桁違い")]
    fn test_不一致のコードは拒否される(
        now: DateTime<Utc>,
        #[case] input: &str,
        #[case] _reason: &str,
    ) {
        let code = code_with("04217", now);

        let result = code.verify(input, now);

        assert!(matches!(result, Err(DomainError::InvalidApprovalCode)));
    }

    #[rstest]
    #[case("0421", "前方一致4桁")]
    #[case("042170", "6桁")]
    #[case("", "空文字列")]
    fn test_長さの違うコードは拒否される(
        now: DateTime<Utc>,
        #[case] input: &str,
        #[case] _reason: &str,
    ) {
        let code = code_with("04217", now);

        let result = code.verify(input, now);

        assert!(matches!(result, Err(DomainError::InvalidApprovalCode)));
    }

    #[rstest]
    fn test_発行から24時間経過したコードは期限切れ(now: DateTime<Utc>) {
        let code = code_with("04217", now);
        let probe = now + Duration::hours(VALIDITY_HOURS);

        let result = code.verify("04217", probe);

        assert!(matches!(result, Err(DomainError::ExpiredApprovalCode)));
    }

    #[rstest]
    fn test_24時間未満なら有効(now: DateTime<Utc>) {
        let code = code_with("04217", now);
        let probe = now + Duration::hours(VALIDITY_HOURS) - Duration::seconds(1);

        assert!(code.verify("04217", probe).is_ok());
    }

    #[rstest]
    fn test_使用済みコードは再利用できない(now: DateTime<Utc>) {
        let code = code_with("04217", now).consumed(now);

        let result = code.verify("04217", now);

        assert!(matches!(result, Err(DomainError::ExpiredApprovalCode)));
    }

    #[rstest]
    fn test_consumedはconsumed_atを設定する(now: DateTime<Utc>) {
        let code = code_with("04217", now);

        let consumed = code.consumed(now);

        assert_eq!(consumed.consumed_at(), Some(now));
    }

    #[rstest]
    fn test_from_dbは数字以外のコードを拒否する(now: DateTime<Utc>) {
        let result = ApprovalCode::from_db(ApprovalCodeRecord {
            id: ApprovalCodeId::new(),
            newsletter_id: NewsletterId::new(),
            code: "abc12".to_string(),
            issued_at: now,
            consumed_at: None,
        });

        assert!(result.is_err());
    }

    #[rstest]
    fn test_debug出力はコード本体をマスクする(now: DateTime<Utc>) {
        let code = code_with("04217", now);

        let debug = format!("{:?}", code);

        assert!(debug.contains(crate::REDACTED));
        assert!(!debug.contains("04217"));
    }
}
