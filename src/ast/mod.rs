//! AST input contract for terrasql
//!
//! Types the JSON produced by the external SQL-text-to-AST conversion
//! service. Parsing is pure: nodes are read from `serde_json::Value` into an
//! immutable tree, with unrecognized node kinds retained verbatim for later
//! stages to interpret or reject.

mod errors;
mod node;

pub use errors::{AstError, AstResult};
pub use node::{unquote, AstNode, OrderKey, QueryAst};
