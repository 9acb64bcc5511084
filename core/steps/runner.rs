use super::{Step, StepContext, StepError};
use crate::events::{EventChannel, WorkerEvent};
use crate::model::BuildTarget;
use thiserror::*;
use tracing::*;

/// Runs the steps of one rule in sequence.
///
/// Execution always starts at the first step, and the first failing step aborts the rest.
///
pub struct StepRunner;

impl StepRunner {
    #[tracing::instrument(name = "StepRunner::run", skip(ctx, steps, event_channel), fields(target = %ctx.target()))]
    pub async fn run(
        ctx: &StepContext,
        steps: &[Step],
        event_channel: &EventChannel,
    ) -> Result<(), StepExecutionError> {
        for (index, step) in steps.iter().enumerate() {
            let description = step.description();
            debug!("Running step #{}: {}", index, description);
            event_channel.send(WorkerEvent::StepStarted {
                target: ctx.target().clone(),
                index,
                description: description.clone(),
            });

            if let Err(source) = step.run(ctx).await {
                return Err(StepExecutionError {
                    target: ctx.target().clone(),
                    index,
                    description,
                    source,
                });
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
#[error("Step #{index} of {target} failed: {description}\n{source}")]
pub struct StepExecutionError {
    pub target: BuildTarget,
    pub index: usize,
    pub description: String,
    #[source]
    pub source: StepError,
}
