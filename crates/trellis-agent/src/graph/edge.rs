use std::fmt;
use std::sync::Arc;

use trellis_core::error::{Result, TrellisError};

use super::step::StepOutcome;
use crate::state::State;

/// Where the run goes after a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Next {
    Step(String),
    End,
}

impl Next {
    pub fn step(name: impl Into<String>) -> Self {
        Self::Step(name.into())
    }
}

impl fmt::Display for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(name) => f.write_str(name),
            Self::End => f.write_str("END"),
        }
    }
}

type RouteFn = dyn Fn(&State, &StepOutcome) -> Result<Next> + Send + Sync;

/// Conditional edge: a routing function plus the targets it may return.
#[derive(Clone)]
pub struct Router {
    targets: Vec<Next>,
    func: Arc<RouteFn>,
}

impl Router {
    pub fn new<F>(targets: Vec<Next>, func: F) -> Self
    where
        F: Fn(&State, &StepOutcome) -> Result<Next> + Send + Sync + 'static,
    {
        Self {
            targets,
            func: Arc::new(func),
        }
    }

    pub fn targets(&self) -> &[Next] {
        &self.targets
    }

    /// Evaluate against the merged state. `from` names the step for errors.
    pub fn route(&self, from: &str, state: &State, outcome: &StepOutcome) -> Result<Next> {
        let next = (self.func)(state, outcome)?;
        if !self.targets.contains(&next) {
            return Err(TrellisError::UndeclaredRoute {
                step: from.to_string(),
                target: next.to_string(),
            });
        }
        Ok(next)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("targets", &self.targets)
            .finish()
    }
}

/// How a step hands off to its successor.
#[derive(Debug, Clone)]
pub enum Transition {
    Fixed(Next),
    Routed(Router),
}

impl Transition {
    pub fn targets(&self) -> Vec<&Next> {
        match self {
            Self::Fixed(next) => vec![next],
            Self::Routed(router) => router.targets().iter().collect(),
        }
    }

    pub fn resolve(&self, from: &str, state: &State, outcome: &StepOutcome) -> Result<Next> {
        match self {
            Self::Fixed(next) => Ok(next.clone()),
            Self::Routed(router) => router.route(from, state, outcome),
        }
    }
}

/// Reasoning step paired with a tool step.
///
/// Requested calls go to `tools_step`, a completed stage goes to
/// `on_complete`, and an empty response ends the run.
pub fn tool_loop(tools_step: &str, on_complete: Next) -> Router {
    let tools = Next::step(tools_step);
    let done = on_complete.clone();
    let mut targets = vec![tools.clone(), on_complete];
    if !targets.contains(&Next::End) {
        targets.push(Next::End);
    }
    Router::new(targets, move |_state, outcome| {
        Ok(match outcome {
            StepOutcome::ToolRequested { .. } => tools.clone(),
            StepOutcome::StageComplete => done.clone(),
            StepOutcome::NoOutput => Next::End,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::ToolCall;

    #[test]
    fn tool_loop_routes_each_outcome() {
        let router = tool_loop("casual_chat.tools", Next::End);
        let state = State::new();
        let requested = StepOutcome::ToolRequested {
            calls: vec![ToolCall::new("get_weather", serde_json::json!({}))],
        };
        assert_eq!(
            router.route("casual_chat", &state, &requested).unwrap(),
            Next::step("casual_chat.tools")
        );
        assert_eq!(
            router
                .route("casual_chat", &state, &StepOutcome::StageComplete)
                .unwrap(),
            Next::End
        );
        assert_eq!(
            router.route("casual_chat", &state, &StepOutcome::NoOutput).unwrap(),
            Next::End
        );
        assert_eq!(router.targets().len(), 2);
    }

    #[test]
    fn undeclared_target_is_an_error() {
        let router = Router::new(vec![Next::End], |_, _| Ok(Next::step("nowhere")));
        let err = router
            .route("text_to_sql", &State::new(), &StepOutcome::StageComplete)
            .unwrap_err();
        match err {
            TrellisError::UndeclaredRoute { step, target } => {
                assert_eq!(step, "text_to_sql");
                assert_eq!(target, "nowhere");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn router_errors_propagate() {
        let router = Router::new(vec![Next::End], |_, _| {
            Err(TrellisError::unroutable("supervisor", "no choice recorded"))
        });
        assert!(matches!(
            router.route("supervisor", &State::new(), &StepOutcome::NoOutput),
            Err(TrellisError::UnroutableState { .. })
        ));
    }

    #[test]
    fn fixed_transition_ignores_outcome() {
        let t = Transition::Fixed(Next::step("summary"));
        assert_eq!(
            t.resolve("sql_executor.tools", &State::new(), &StepOutcome::NoOutput)
                .unwrap(),
            Next::step("summary")
        );
        assert_eq!(t.targets(), vec![&Next::step("summary")]);
    }
}
