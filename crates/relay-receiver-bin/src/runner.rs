use relay_receiver::{ActionInvocation, ActionRunner, ExecutionContext};
use tracing::info;

/// Action runner that only logs what it is asked to run.
///
/// Stands in for the execution engine, which lives outside this process.
pub struct LoggingActionRunner;

impl ActionRunner for LoggingActionRunner {
    fn run_actions(
        &self,
        context: ExecutionContext,
        actions: Vec<ActionInvocation>,
    ) -> anyhow::Result<()> {
        for action in actions {
            info!(
                action_name = %action.action_name,
                action_params = %serde_json::Value::Object(action.action_params),
                sinks = ?context.named_sinks,
                origin = ?context.origin,
                "Action requested"
            );
        }
        Ok(())
    }
}
