use regex::Regex;
use tracing::warn;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::ToolCall;

/// Text returned in place of running a rejected query.
pub const READ_ONLY_REJECTION: &str = "데이터 조회를 위한 SELECT 쿼리만 실행 가능합니다.";

const MUTATION_VERBS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE", "REPLACE", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM",
];

/// Pre-dispatch policy applied by a tool step to each pending call.
pub trait CallGuard: Send + Sync + 'static {
    /// `Some(text)` rejects the call; the text becomes its tool result.
    fn inspect(&self, call: &ToolCall) -> Option<String>;
}

/// Rejects any query that is not a plain read.
///
/// Applies to calls of one tool and inspects one string argument. A query
/// passes only when it starts with `SELECT` or `WITH` (after comments and
/// whitespace) and contains no mutation verb anywhere.
pub struct ReadOnlySqlGuard {
    tool: String,
    arg: String,
    leading: Regex,
    mutation: Regex,
    comments: Regex,
}

impl ReadOnlySqlGuard {
    pub fn new(tool: impl Into<String>, arg: impl Into<String>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| TrellisError::Config(format!("guard pattern: {}", e)))
        };
        Ok(Self {
            tool: tool.into(),
            arg: arg.into(),
            leading: compile(r"(?i)^(SELECT|WITH)\b")?,
            mutation: compile(&format!(r"(?i)\b({})\b", MUTATION_VERBS.join("|")))?,
            comments: compile(r"(?s)--[^\n]*|/\*.*?\*/")?,
        })
    }

    /// Guard for the warehouse `execute_query` tool.
    pub fn for_execute_query() -> Result<Self> {
        Self::new("execute_query", "sql")
    }

    /// Whether the query text is a permitted read.
    pub fn is_read_only(&self, query: &str) -> bool {
        let stripped = self.comments.replace_all(query, " ");
        let trimmed = stripped.trim_start();
        self.leading.is_match(trimmed) && !self.mutation.is_match(&stripped)
    }
}

impl CallGuard for ReadOnlySqlGuard {
    fn inspect(&self, call: &ToolCall) -> Option<String> {
        if call.name != self.tool {
            return None;
        }
        let query = call.args.get(&self.arg).and_then(|v| v.as_str()).unwrap_or("");
        if self.is_read_only(query) {
            None
        } else {
            warn!(tool = %call.name, call_id = %call.id, "Rejected non read-only query");
            Some(READ_ONLY_REJECTION.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn guard() -> ReadOnlySqlGuard {
        ReadOnlySqlGuard::for_execute_query().unwrap()
    }

    #[test]
    fn allows_reads() {
        let g = guard();
        assert!(g.is_read_only("SELECT COUNT(*) FROM orders WHERE status = 'done'"));
        assert!(g.is_read_only("  select updated_at from loans"));
        assert!(g.is_read_only(
            "WITH t AS (SELECT * FROM account) SELECT COUNT(*) FROM t"
        ));
        assert!(g.is_read_only("-- latest rows\nSELECT * FROM trans LIMIT 5"));
    }

    #[test]
    fn rejects_mutations() {
        let g = guard();
        assert!(!g.is_read_only("DELETE FROM orders"));
        assert!(!g.is_read_only("SELECT 1; DROP TABLE orders"));
        assert!(!g.is_read_only("with x as (select 1) insert into t select * from x"));
        assert!(!g.is_read_only("PRAGMA table_info(orders)"));
        assert!(!g.is_read_only(""));
        assert!(!g.is_read_only("/* SELECT */ UPDATE orders SET status = 'x'"));
    }

    #[test]
    fn inspect_only_targets_its_tool() {
        let g = guard();
        let other = ToolCall::new("get_weather", json!({"city": "seoul"}));
        assert!(g.inspect(&other).is_none());

        let bad = ToolCall::new("execute_query", json!({"sql": "DROP TABLE district"}));
        assert_eq!(g.inspect(&bad).as_deref(), Some(READ_ONLY_REJECTION));

        let missing = ToolCall::new("execute_query", json!({}));
        assert_eq!(g.inspect(&missing).as_deref(), Some(READ_ONLY_REJECTION));
    }
}
