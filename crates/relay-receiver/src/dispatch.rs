//! Hand-off to the action execution engine.

use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};

use crate::{ReceiverError, ReceiverResult, ResolvedActionRequest};

/// Execution context passed alongside the actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    /// Sinks the results may be routed to. `None` leaves routing to the engine.
    pub named_sinks: Option<Vec<String>>,
    /// Where the request originated, when the sender said so.
    pub origin: Option<String>,
}

/// A named action with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInvocation {
    pub action_name: String,
    pub action_params: Map<String, Value>,
}

/// The external engine that runs actions.
///
/// Invoked synchronously on the receiver thread: no further inbound message
/// is read until `run_actions` returns. A handler that never returns stalls
/// the connection.
pub trait ActionRunner: Send + Sync {
    fn run_actions(
        &self,
        context: ExecutionContext,
        actions: Vec<ActionInvocation>,
    ) -> anyhow::Result<()>;
}

impl<F> ActionRunner for F
where
    F: Fn(ExecutionContext, Vec<ActionInvocation>) -> anyhow::Result<()> + Send + Sync,
{
    fn run_actions(
        &self,
        context: ExecutionContext,
        actions: Vec<ActionInvocation>,
    ) -> anyhow::Result<()> {
        self(context, actions)
    }
}

/// Run one resolved request, turning runner errors and panics into
/// [`ReceiverError::Dispatch`].
pub(crate) fn run_request(
    runner: &dyn ActionRunner,
    request: ResolvedActionRequest,
) -> ReceiverResult<()> {
    let context = ExecutionContext {
        named_sinks: request.sinks,
        origin: request.origin,
    };
    let invocation = ActionInvocation {
        action_name: request.action_name,
        action_params: request.action_params,
    };

    match panic::catch_unwind(AssertUnwindSafe(|| {
        runner.run_actions(context, vec![invocation])
    })) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ReceiverError::Dispatch(format!("{e:#}"))),
        Err(payload) => Err(ReceiverError::Dispatch(format!(
            "action runner panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
