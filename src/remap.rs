use std::collections::HashMap;

use serde_json::{Map, Value};

/// ====== 필드 리매핑 엔진 ======

/// 리매핑 테이블 엔트리.
/// 원본 필드를 이름만 바꿔 그대로 옮기거나(Direct),
/// 이름 있는 변환 함수를 거쳐 옮깁니다(Apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapEntry {
    /// 출력 키로 이름만 바꿔 값을 그대로 대입
    Direct(&'static str),
    /// (출력 키, 변환 함수 이름) — 대입 전에 변환을 거침
    Apply(&'static str, &'static str),
}

/// 원본 필드 이름 -> 리매핑 엔트리. 사이트마다 하나씩 선언합니다.
pub type RemapTable = HashMap<&'static str, RemapEntry>;

/// 변환 함수 이름 -> 순수 변환 함수.
/// 타입 변환(예: 문자열 타임스탬프 -> 마이크로초 정수)은 전부 여기서만 일어납니다.
pub type TransformTable = HashMap<&'static str, fn(Value) -> Value>;

/// 원본 키/값 하나를 정규화 출력 맵에 투영합니다.
/// 테이블에 없는 키는 조용히 버립니다 — 플랫폼이 내보내는 필드 중
/// 쓰지 않는 것이 훨씬 많기 때문에 에러가 아니라 정상 경로입니다.
/// 알 수 없는 변환 함수 이름은 사이트 테이블의 프로그래밍 오류이므로
/// 그대로 룩업 실패(패닉)로 드러나게 둡니다.
pub fn remap(
    info: &mut Map<String, Value>,
    table: &RemapTable,
    transforms: &TransformTable,
    key: &str,
    value: Value,
) {
    match table.get(key) {
        Some(RemapEntry::Direct(output_key)) => {
            info.insert((*output_key).to_string(), value);
        }
        Some(RemapEntry::Apply(output_key, transform_name)) => {
            let transform = transforms[transform_name];
            info.insert((*output_key).to_string(), transform(value));
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_micros(value: Value) -> Value {
        Value::from(value.as_i64().unwrap() * 1000)
    }

    fn transforms() -> TransformTable {
        HashMap::from([("to_micros", to_micros as fn(Value) -> Value)])
    }

    #[test]
    fn test_direct_rename() {
        let table: RemapTable = HashMap::from([("authorName", RemapEntry::Direct("author_name"))]);
        let mut info = Map::new();

        remap(&mut info, &table, &transforms(), "authorName", json!("Alice"));

        assert_eq!(info.get("author_name"), Some(&json!("Alice")));
        assert_eq!(info.len(), 1);
    }

    #[test]
    fn test_named_transform() {
        let table: RemapTable =
            HashMap::from([("ts", RemapEntry::Apply("timestamp", "to_micros"))]);
        let mut info = Map::new();

        remap(&mut info, &table, &transforms(), "ts", json!(5));

        assert_eq!(info.get("timestamp"), Some(&json!(5000)));
    }

    #[test]
    fn test_unmapped_key_is_dropped() {
        let table: RemapTable = HashMap::from([("authorName", RemapEntry::Direct("author_name"))]);
        let mut info = Map::new();
        info.insert("existing".to_string(), json!(1));

        remap(&mut info, &table, &transforms(), "clickTracking", json!("ignored"));

        // 출력은 변하지 않아야 함
        assert_eq!(info.len(), 1);
        assert_eq!(info.get("existing"), Some(&json!(1)));
    }

    #[test]
    #[should_panic]
    fn test_unknown_transform_is_a_programming_error() {
        let table: RemapTable =
            HashMap::from([("ts", RemapEntry::Apply("timestamp", "no_such_transform"))]);
        let mut info = Map::new();

        remap(&mut info, &table, &transforms(), "ts", json!(5));
    }
}
