//! 属性値

use super::resource::Reference;
use std::collections::BTreeMap;

/// リソース属性の値
///
/// 参照 (`Ref`) を含められる点以外は JSON と同じ構造。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ref(Reference),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// 文字列と参照を連結した文字列（例: `table/${aws_dynamodb_table.x.name}`）
    Concat(Vec<Value>),
    /// JSON 文字列としてエンコードされるドキュメント（IAM ポリシーなど）
    Json(Box<Value>),
}

impl Value {
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn concat<V: Into<Value>>(parts: impl IntoIterator<Item = V>) -> Self {
        Value::Concat(parts.into_iter().map(Into::into).collect())
    }

    pub fn json(document: impl Into<Value>) -> Self {
        Value::Json(Box::new(document.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map のキー、または Json ドキュメント内のキーを引く
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            Value::Json(inner) => inner.get(key),
            _ => None,
        }
    }

    /// 値に含まれる参照を再帰的に収集
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Value::Ref(r) => out.push(r),
            Value::List(items) | Value::Concat(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Value::Map(m) => {
                for v in m.values() {
                    v.collect_references(out);
                }
            }
            Value::Json(inner) => inner.collect_references(out),
            _ => {}
        }
    }

    /// エンジンの JSON 形式へ変換（参照は `${...}` 補間式になる）
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Ref(r) => serde_json::Value::String(r.interpolation()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Concat(parts) => {
                let mut s = String::new();
                for part in parts {
                    match part {
                        Value::String(text) => s.push_str(text),
                        Value::Ref(r) => s.push_str(&r.interpolation()),
                        other => s.push_str(&other.to_json().to_string()),
                    }
                }
                serde_json::Value::String(s)
            }
            Value::Json(inner) => serde_json::Value::String(inner.to_json().to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Ref(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceAddress, ResourceKind};

    fn queue_arn() -> Reference {
        ResourceAddress::new(ResourceKind::SqsQueue, "queue").attr("arn")
    }

    #[test]
    fn test_scalar_to_json() {
        assert_eq!(Value::from(true).to_json(), serde_json::json!(true));
        assert_eq!(Value::from(20u32).to_json(), serde_json::json!(20));
        assert_eq!(Value::from(70.0).to_json(), serde_json::json!(70.0));
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_concat_renders_interpolation() {
        let table = ResourceAddress::new(ResourceKind::DynamodbTable, "tokens").attr("name");
        let v = Value::concat([Value::from("table/"), Value::from(table)]);
        assert_eq!(v.to_json(), "table/${aws_dynamodb_table.tokens.name}");

        let mut refs = Vec::new();
        v.collect_references(&mut refs);
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_json_document_is_encoded_string() {
        let policy = Value::json(Value::map([
            ("Version", Value::from("2012-10-17")),
            ("Resource", Value::from(queue_arn())),
        ]));
        let rendered = policy.to_json();
        let text = rendered.as_str().unwrap();
        let decoded: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(decoded["Resource"], "${aws_sqs_queue.queue.arn}");

        assert_eq!(policy.get("Version").and_then(Value::as_str), Some("2012-10-17"));

        let mut refs = Vec::new();
        policy.collect_references(&mut refs);
        assert_eq!(refs, vec![&queue_arn()]);
    }

    #[test]
    fn test_nested_references() {
        let v = Value::list([Value::map([("queue_arn", Value::from(queue_arn()))])]);
        let mut refs = Vec::new();
        v.collect_references(&mut refs);
        assert_eq!(refs.len(), 1);
        assert_eq!(v.as_list().map(|l| l.len()), Some(1));
    }
}
