use std::sync::Arc;

use trellis_core::error::Result;
use trellis_core::types::Role;
use trellis_tools::{CallGuard, ReadOnlySqlGuard};

use crate::graph::{tool_loop, Graph, GraphBuilder, Next};
use crate::steps::{ContextView, ReasoningStep, ToolStep};

use super::{prompts, WorkflowDeps};

pub const NAME: &str = "data_explorer";

pub const TEXT_TO_SQL: &str = "text_to_sql";
pub const SQL_CORRECTOR: &str = "sql_corrector";
pub const SQL_EXECUTOR: &str = "sql_executor";
pub const SUMMARY: &str = "summary";

/// Query drafted from the question.
pub const GENERATED_SQL: &str = "generated_sql";
/// Query after schema-checked correction.
pub const CORRECTED_SQL: &str = "corrected_sql";
/// The question the query answers.
pub const USER_QUESTION: &str = "user_question";
/// Rows returned by the executed query.
pub const RESULT_SET: &str = "result_set";

const SCHEMA_TOOLS: &[&str] = &["get_table_schemas"];
const CORRECTOR_TOOLS: &[&str] = &["get_table_schemas", "execute_query"];
const EXECUTOR_TOOLS: &[&str] = &["execute_query"];

fn tools_step(step: &str) -> String {
    format!("{}.tools", step)
}

/// Natural language to SQL: draft, correct, execute (optionally behind an
/// approval), then summarize the rows for the user.
pub fn build(deps: &WorkflowDeps) -> Result<Graph> {
    let guard: Arc<dyn CallGuard> = Arc::new(ReadOnlySqlGuard::for_execute_query()?);

    let text_to_sql = ReasoningStep::new(deps.backend.clone(), prompts::TEXT_TO_SQL)
        .with_view(ContextView::Trimmed {
            marker: Role::Human,
            n: 3,
        })
        .with_tools(deps.tools.definitions_for(SCHEMA_TOOLS)?)
        .with_stage_field(GENERATED_SQL)
        .extract_code_block()
        .with_question_field(USER_QUESTION)
        .with_reasoning(true);

    let corrector = ReasoningStep::new(deps.backend.clone(), prompts::SQL_CORRECTOR)
        .with_view(ContextView::Trimmed {
            marker: Role::Human,
            n: 1,
        })
        .with_trailer(format!("초기 쿼리: {{{}}}", GENERATED_SQL))
        .with_tools(deps.tools.definitions_for(CORRECTOR_TOOLS)?)
        .with_stage_field(CORRECTED_SQL)
        .extract_code_block()
        .with_reasoning(true);

    let mut executor = ReasoningStep::new(deps.backend.clone(), prompts::SQL_EXECUTOR)
        .with_view(ContextView::Empty)
        .with_trailer(format!("**입력 쿼리**:\n{{{}}}", CORRECTED_SQL))
        .with_tools(deps.tools.definitions_for(EXECUTOR_TOOLS)?)
        .with_reasoning(false);
    if let Some(policy) = deps.approval_policy() {
        executor = executor.with_approval(policy);
    }

    let summary = ReasoningStep::new(deps.backend.clone(), prompts::SUMMARY)
        .with_trailer(format!("**사용자의 원래 질문**:\n{{{}}}", USER_QUESTION))
        .with_reasoning(false);

    GraphBuilder::new(NAME)
        .step(TEXT_TO_SQL, text_to_sql)
        .step(
            tools_step(TEXT_TO_SQL),
            ToolStep::new(deps.tools.clone()).only(SCHEMA_TOOLS),
        )
        .step(SQL_CORRECTOR, corrector)
        .step(
            tools_step(SQL_CORRECTOR),
            ToolStep::new(deps.tools.clone())
                .only(CORRECTOR_TOOLS)
                .with_guard(guard.clone()),
        )
        .step(SQL_EXECUTOR, executor)
        .step(
            tools_step(SQL_EXECUTOR),
            ToolStep::new(deps.tools.clone())
                .only(EXECUTOR_TOOLS)
                .with_guard(guard)
                .with_payload_field(RESULT_SET),
        )
        .step(SUMMARY, summary)
        .route(
            TEXT_TO_SQL,
            tool_loop(&tools_step(TEXT_TO_SQL), Next::step(SQL_CORRECTOR)),
        )
        .edge(tools_step(TEXT_TO_SQL), Next::step(TEXT_TO_SQL))
        .route(
            SQL_CORRECTOR,
            tool_loop(&tools_step(SQL_CORRECTOR), Next::step(SQL_EXECUTOR)),
        )
        .edge(tools_step(SQL_CORRECTOR), Next::step(SQL_CORRECTOR))
        .route(SQL_EXECUTOR, tool_loop(&tools_step(SQL_EXECUTOR), Next::End))
        .edge(tools_step(SQL_EXECUTOR), Next::step(SUMMARY))
        .edge(SUMMARY, Next::End)
        .entry(TEXT_TO_SQL)
        .max_steps(deps.max_steps)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use trellis_core::config::ApprovalConfig;
    use trellis_core::types::ConversationId;
    use trellis_test_utils::{CountingTool, ScriptedBackend};
    use trellis_tools::ToolRegistry;

    use crate::graph::{RunContext, RunStatus};
    use crate::state::State;

    const QUESTION: &str = "10대 고객은 몇 명이야?";
    const QUERY: &str = "SELECT COUNT(*) FROM client WHERE age < 20";

    struct Fixture {
        backend: ScriptedBackend,
        executions: Arc<std::sync::atomic::AtomicUsize>,
        deps: WorkflowDeps,
    }

    fn fixture(approval: bool) -> Fixture {
        let backend = ScriptedBackend::new();
        let execute = CountingTool::new("execute_query", r#"{"data": [{"COUNT(*)": 42}]}"#);
        let executions = execute.counter();
        let mut tools = ToolRegistry::new();
        tools.register(CountingTool::new("get_table_schemas", "client(id, age)"));
        tools.register(execute);

        let deps = WorkflowDeps::new(Arc::new(backend.clone()), Arc::new(tools)).with_approval(
            ApprovalConfig {
                enabled: approval,
                allow_edit: true,
            },
        );
        Fixture {
            backend,
            executions,
            deps,
        }
    }

    fn script_until_executor(backend: &ScriptedBackend) {
        backend
            .call("s1", "get_table_schemas", json!({"query": "client"}))
            .text(&format!("```sql\n{}\n```", QUERY))
            .text(&format!("검증 완료\n```sql\n{}\n```", QUERY))
            .call("q1", "execute_query", json!({"sql": QUERY}));
    }

    #[tokio::test]
    async fn runs_every_stage_in_order() {
        let fx = fixture(false);
        script_until_executor(&fx.backend);
        fx.backend.text("10대 고객은 42명입니다.");

        let graph = build(&fx.deps).unwrap();
        let result = graph
            .run(State::from_human(QUESTION), &RunContext::new(ConversationId::new()))
            .await
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.state.field_str(GENERATED_SQL).unwrap(), QUERY);
        assert_eq!(result.state.field_str(CORRECTED_SQL).unwrap(), QUERY);
        assert_eq!(result.state.field_str(USER_QUESTION).unwrap(), QUESTION);
        assert_eq!(fx.executions.load(Ordering::SeqCst), 1);

        let steps: Vec<&str> = result.steps.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(
            steps,
            vec![
                "text_to_sql",
                "text_to_sql.tools",
                "text_to_sql",
                "sql_corrector",
                "sql_executor",
                "sql_executor.tools",
                "summary"
            ]
        );

        let requests = fx.backend.requests();
        let corrector = &requests[2];
        assert_eq!(
            corrector.messages.last().unwrap().content,
            format!("초기 쿼리: {}", QUERY)
        );
        let executor = &requests[3];
        assert_eq!(executor.messages.len(), 1);
        assert_eq!(
            executor.messages[0].content,
            format!("**입력 쿼리**:\n{}", QUERY)
        );
        let summary = &requests[4];
        assert_eq!(
            summary.messages.last().unwrap().content,
            format!("**사용자의 원래 질문**:\n{}", QUESTION)
        );
    }

    #[tokio::test]
    async fn executor_suspends_before_running_query() {
        let fx = fixture(true);
        script_until_executor(&fx.backend);

        let graph = build(&fx.deps).unwrap();
        let result = graph
            .run(State::from_human(QUESTION), &RunContext::new(ConversationId::new()))
            .await
            .unwrap();

        let RunStatus::Suspended(point) = &result.status else {
            panic!("expected suspension");
        };
        assert_eq!(point.step, SQL_EXECUTOR);
        assert_eq!(point.request.items.len(), 1);
        assert_eq!(point.request.items[0].call.args["sql"], QUERY);
        assert_eq!(fx.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mutation_is_blocked_at_executor() {
        let fx = fixture(false);
        fx.backend
            .text("```sql\nDELETE FROM client\n```")
            .text("```sql\nDELETE FROM client\n```")
            .call("q1", "execute_query", json!({"sql": "DELETE FROM client"}))
            .text("실행할 수 없는 쿼리입니다.");

        let graph = build(&fx.deps).unwrap();
        let result = graph
            .run(State::from_human("고객 다 지워"), &RunContext::new(ConversationId::new()))
            .await
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(fx.executions.load(Ordering::SeqCst), 0);
        assert!(result.state.field(RESULT_SET).is_none());
        assert!(result
            .state
            .transcript
            .iter()
            .any(|m| m.content == trellis_tools::guard::READ_ONLY_REJECTION));
    }
}
