// 结果序列化
//
// 结果集合输出为 JSON 数组，元素顺序即集合顺序

use crate::uploader::task::UploadResult;
use anyhow::{Context, Result};

/// 序列化结果集合
///
/// 内存中的结果只含字符串字段，序列化不会失败；若失败说明内部状态已损坏，直接 panic
pub fn serialize_results(results: &[UploadResult]) -> Vec<u8> {
    match serde_json::to_vec(results) {
        Ok(bytes) => bytes,
        Err(e) => panic!("结果序列化失败（内部错误）: {}", e),
    }
}

/// 解析序列化后的结果集合（供宿主侧与校验使用）
pub fn deserialize_results(bytes: &[u8]) -> Result<Vec<UploadResult>> {
    serde_json::from_slice(bytes).context("Failed to parse upload results")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_serialize_array_in_order() {
        let mut ids = BTreeMap::new();
        ids.insert("sha1".to_string(), "abc".to_string());
        let results = vec![
            UploadResult::success("a.jpg", ids),
            UploadResult::failure("b.jpg"),
        ];

        let json = String::from_utf8(serialize_results(&results)).unwrap();
        assert_eq!(json, r#"[{"name":"a.jpg","sha1":"abc"},{"name":"b.jpg"}]"#);
    }

    #[test]
    fn test_serialize_empty() {
        assert_eq!(serialize_results(&[]), b"[]");
    }

    #[test]
    fn test_deserialize_rejects_non_string_field() {
        assert!(deserialize_results(br#"[{"name":"a","size":1}]"#).is_err());
        assert!(deserialize_results(br#"[{"sha1":"x"}]"#).is_err());
    }

    fn arb_result() -> impl Strategy<Value = UploadResult> {
        (
            "[a-z0-9_.]{1,12}",
            proptest::collection::btree_map("[a-z]{1,6}", "[ -~]{0,16}", 0..4),
        )
            .prop_map(|(name, ids)| UploadResult::success(name, ids))
    }

    proptest! {
        #[test]
        fn prop_serialize_is_idempotent(results in proptest::collection::vec(arb_result(), 0..10)) {
            let once = serialize_results(&results);
            let parsed = deserialize_results(&once).unwrap();
            prop_assert_eq!(&parsed, &results);
            prop_assert_eq!(serialize_results(&parsed), once);
        }
    }
}
