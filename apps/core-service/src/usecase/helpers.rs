//! ユースケース層の共通ヘルパー
//!
//! リポジトリ呼び出し結果の変換など、複数のユースケースで
//! 繰り返されるパターンを共通化する。

use mailflow_infra::{InfraError, error::InfraErrorKind};

use crate::error::CoreError;

/// リポジトリの `Result<Option<T>, InfraError>` を `Result<T, CoreError>` に変換する
///
/// `find_by_id` 等の `Option` を返すリポジトリメソッドの結果を、
/// `CoreError::NotFound` または `CoreError::Database` に変換する。
///
/// ```ignore
/// let newsletter = self.newsletter_repo.find_by_id(&id, &tenant_id).await
///     .or_not_found("ニュースレター")?;
/// ```
pub(crate) trait FindResultExt<T> {
    /// `None` の場合は `CoreError::NotFound`、`InfraError` の場合は `CoreError::Database` を返す
    fn or_not_found(self, entity_name: &str) -> Result<T, CoreError>;
}

impl<T> FindResultExt<T> for Result<Option<T>, InfraError> {
    fn or_not_found(self, entity_name: &str) -> Result<T, CoreError> {
        self.map_err(CoreError::Database)?
            .ok_or_else(|| CoreError::NotFound(format!("{}が見つかりません", entity_name)))
    }
}

/// 楽観的ロック競合を利用者向けメッセージに変換する
///
/// `update_with_version_check` の失敗を `CoreError::Conflict` にし、
/// それ以外のインフラエラーはそのまま伝播する。
pub(crate) fn map_version_conflict(e: InfraError) -> CoreError {
    match e.kind() {
        InfraErrorKind::Conflict { .. } => CoreError::Conflict(
            "ニュースレターは既に更新されています。最新の情報を取得してください。".to_string(),
        ),
        _ => CoreError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_not_found_ok_some_は値を返す() {
        let result: Result<Option<i32>, InfraError> = Ok(Some(42));

        let value = result.or_not_found("テスト").unwrap();

        assert_eq!(value, 42);
    }

    #[test]
    fn test_or_not_found_ok_none_はnotfoundエラーを返す() {
        let result: Result<Option<i32>, InfraError> = Ok(None);

        let err = result.or_not_found("ニュースレター").unwrap_err();

        match err {
            CoreError::NotFound(msg) => {
                assert_eq!(msg, "ニュースレターが見つかりません");
            }
            other => panic!("NotFound を期待したが {:?} を受信", other),
        }
    }

    #[test]
    fn test_or_not_found_errはdatabaseエラーを返す() {
        let result: Result<Option<i32>, InfraError> = Err(InfraError::unexpected("接続失敗"));

        let err = result.or_not_found("ニュースレター").unwrap_err();

        assert!(matches!(err, CoreError::Database(_)));
    }

    #[test]
    fn test_map_version_conflictは競合をconflictに変換する() {
        let err = map_version_conflict(InfraError::conflict("Newsletter", "NL-001"));
        assert!(matches!(err, CoreError::Conflict(_)));

        let err = map_version_conflict(InfraError::unexpected("その他"));
        assert!(matches!(err, CoreError::Database(_)));
    }
}
