use crate::domain::value_objects::Row;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    IsNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

/// 行フィルタ。条件はすべて AND で結合する。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn neq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op: FilterOp::Neq,
            value: value.into(),
        });
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op: FilterOp::IsNull,
            value: Value::Null,
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|cond| {
            let actual = row.get(&cond.column).unwrap_or(&Value::Null);
            match cond.op {
                FilterOp::Eq => loose_eq(actual, &cond.value),
                FilterOp::Neq => !loose_eq(actual, &cond.value),
                FilterOp::IsNull => actual.is_null(),
            }
        })
    }
}

/// ID カラムは数値と文字列が混在するので、文字列表現が一致すれば等しいとみなす。
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (scalar_text(left), scalar_text(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order: Option<OrderBy>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// リモートのテーブルストア。行は JSON オブジェクトとして扱う。
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert(&self, table: &str, row: Row) -> Result<Row, AppError>;
    /// `on_conflict` はカンマ区切りのカラム名。
    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError>;
    async fn update(&self, table: &str, filter: &Filter, patch: Row)
        -> Result<Vec<Row>, AppError>;
    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AppError>;
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, AppError>;
}
