//! Parsed-query AST
//!
//! The SQL-text-to-AST conversion is an external service; this module types
//! its JSON output. A query arrives either as the service's response
//! envelope (`data.attributes.jsonSql`) or as the bare clause object
//! `{from, select, where, orderBy, group, limit}`. Any clause may be absent
//! entirely, which means "no such clause".
//!
//! Nodes are immutable once parsed; the core only reads them.

use serde_json::Value;

use super::errors::{AstError, AstResult};

/// One node of the parsed query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// A column or band reference
    Literal {
        value: String,
        alias: Option<String>,
    },
    /// An aggregate or postgis function call
    Function {
        name: String,
        arguments: Vec<AstNode>,
        alias: Option<String>,
    },
    /// `*`
    Wildcard,
    /// Comparison or boolean combinator; `op` is the operator token
    Conditional {
        op: String,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    /// Negation modifier around a subtree
    Not { operand: Box<AstNode> },
    /// Numeric leaf
    Number(f64),
    /// String leaf (quotes preserved as delivered)
    String(String),
    /// Boolean leaf
    Bool(bool),
    /// Ordered value list (IN lists, BETWEEN bounds)
    List(Vec<AstNode>),
    /// Any node kind this core does not interpret, retained verbatim
    Other(Value),
}

impl AstNode {
    /// Parses one node from the conversion service's JSON.
    pub fn from_value(value: &Value) -> AstResult<AstNode> {
        if let Some(items) = value.as_array() {
            let nodes = items
                .iter()
                .map(AstNode::from_value)
                .collect::<AstResult<Vec<_>>>()?;
            return Ok(AstNode::List(nodes));
        }

        let object = match value.as_object() {
            Some(o) => o,
            None => return Err(AstError::NotAnObject(value.to_string())),
        };

        let node_type = match object.get("type").and_then(Value::as_str) {
            Some(t) => t.to_ascii_lowercase(),
            None => return Ok(AstNode::Other(value.clone())),
        };

        match node_type.as_str() {
            "literal" => Ok(AstNode::Literal {
                value: require_str(object, &node_type, "value")?,
                alias: optional_str(object, "alias"),
            }),
            "function" => {
                let arguments = match object.get("arguments").and_then(Value::as_array) {
                    Some(args) => args
                        .iter()
                        .map(AstNode::from_value)
                        .collect::<AstResult<Vec<_>>>()?,
                    None => Vec::new(),
                };
                Ok(AstNode::Function {
                    name: require_str(object, &node_type, "value")?,
                    arguments,
                    alias: optional_str(object, "alias"),
                })
            }
            "wildcard" => Ok(AstNode::Wildcard),
            "conditional" | "operator" => {
                let op = require_str(object, &node_type, "value")?;
                let left = object.get("left");
                let right = object.get("right");
                if op.eq_ignore_ascii_case("not") {
                    let operand = right
                        .or(left)
                        .ok_or_else(|| AstError::missing_field(&node_type, "right"))?;
                    return Ok(AstNode::Not {
                        operand: Box::new(AstNode::from_value(operand)?),
                    });
                }
                let left = left.ok_or_else(|| AstError::missing_field(&node_type, "left"))?;
                let right = right.ok_or_else(|| AstError::missing_field(&node_type, "right"))?;
                Ok(AstNode::Conditional {
                    op,
                    left: Box::new(AstNode::from_value(left)?),
                    right: Box::new(AstNode::from_value(right)?),
                })
            }
            "number" => {
                let n = object
                    .get("value")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| AstError::missing_field(&node_type, "value"))?;
                Ok(AstNode::Number(n))
            }
            "string" => Ok(AstNode::String(require_str(object, &node_type, "value")?)),
            "boolean" | "bool" => {
                let b = object
                    .get("value")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| AstError::missing_field(&node_type, "value"))?;
                Ok(AstNode::Bool(b))
            }
            _ => Ok(AstNode::Other(value.clone())),
        }
    }

    /// The referenced name, for literal nodes.
    pub fn literal_name(&self) -> Option<&str> {
        match self {
            AstNode::Literal { value, .. } => Some(value.as_str()),
            _ => None,
        }
    }

    /// String form of a leaf, as a postgis-style argument token.
    pub fn token(&self) -> Option<String> {
        match self {
            AstNode::Literal { value, .. } => Some(value.clone()),
            AstNode::String(s) => Some(s.clone()),
            AstNode::Number(n) => {
                if n.fract() == 0.0 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{}", n))
                }
            }
            AstNode::Bool(b) => Some(b.to_string()),
            AstNode::Wildcard => Some("*".to_string()),
            _ => None,
        }
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub ascending: bool,
}

impl OrderKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// The full parsed query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryAst {
    /// Target asset identifier, unquoted
    pub from: Option<String>,
    pub select: Vec<AstNode>,
    pub where_clause: Option<AstNode>,
    pub order_by: Vec<OrderKey>,
    pub group: Vec<AstNode>,
    pub limit: Option<u64>,
}

impl QueryAst {
    /// Parses a query from the conversion service's JSON.
    ///
    /// Accepts either the full response envelope or a bare clause object.
    pub fn from_json(value: &Value) -> AstResult<QueryAst> {
        let clauses = value
            .pointer("/data/attributes/jsonSql")
            .unwrap_or(value);
        let object = clauses
            .as_object()
            .ok_or_else(|| AstError::NotAnObject(clauses.to_string()))?;

        let from = object
            .get("from")
            .and_then(Value::as_str)
            .map(|s| unquote(s).to_string());

        let select = match object.get("select").and_then(Value::as_array) {
            Some(entries) => entries
                .iter()
                .map(AstNode::from_value)
                .collect::<AstResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let where_clause = match object.get("where") {
            Some(Value::Null) | None => None,
            Some(node) => Some(AstNode::from_value(node)?),
        };

        let order_by = match object.get("orderBy").and_then(Value::as_array) {
            Some(keys) => keys
                .iter()
                .map(parse_order_key)
                .collect::<AstResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let group = match object.get("group").and_then(Value::as_array) {
            Some(keys) => keys
                .iter()
                .map(AstNode::from_value)
                .collect::<AstResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let limit = match object.get("limit") {
            Some(Value::Null) | None => None,
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| AstError::malformed("limit", v.to_string()))?,
            ),
        };

        Ok(QueryAst {
            from,
            select,
            where_clause,
            order_by,
            group,
            limit,
        })
    }
}

fn parse_order_key(value: &Value) -> AstResult<OrderKey> {
    let object = value
        .as_object()
        .ok_or_else(|| AstError::malformed("orderBy", value.to_string()))?;
    let field = object
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| AstError::malformed("orderBy", "key without a 'value'"))?;
    let ascending = match object.get("direction").and_then(Value::as_str) {
        Some(d) if d.eq_ignore_ascii_case("desc") => false,
        _ => true,
    };
    Ok(OrderKey {
        field: field.to_string(),
        ascending,
    })
}

fn require_str(
    object: &serde_json::Map<String, Value>,
    node_type: &str,
    field: &'static str,
) -> AstResult<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AstError::missing_field(node_type, field))
}

fn optional_str(object: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    object.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Strips one matching pair of surrounding quote characters, if present.
pub fn unquote(input: &str) -> &str {
    let bytes = input.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' || first == b'"') && first == last {
            return &input[1..input.len() - 1];
        }
    }
    input
}
