//! Sequential agent chain: one LLM call per role, then plan parsing.

use tracing::{debug, info, info_span, warn};

use super::agents::{AgentOutputs, AgentRole, MarketSnapshot, render_prompt};
use super::error::TraderError;
use super::instruction::ParsedPlan;
use super::plan_parser::parse_with_fallback;
use super::strategy::TradingStrategy;
use crate::ports::llm_port::LlmPort;

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub outputs: AgentOutputs,
    pub plan: ParsedPlan,
}

pub struct AgentPipeline<'a> {
    llm: &'a dyn LlmPort,
    strategy: &'a TradingStrategy,
    min_purchase: f64,
}

impl<'a> AgentPipeline<'a> {
    pub fn new(llm: &'a dyn LlmPort, strategy: &'a TradingStrategy, min_purchase: f64) -> Self {
        AgentPipeline {
            llm,
            strategy,
            min_purchase,
        }
    }

    /// Ask every role in turn, then turn the executor's reply into
    /// instructions. Any LLM failure aborts the run; an unreadable executor
    /// reply falls back to free-text parsing and is an error only when that
    /// also finds nothing.
    pub fn run(&self, snapshot: &MarketSnapshot) -> Result<PipelineOutcome, TraderError> {
        let mut outputs = AgentOutputs::default();

        for role in AgentRole::ALL {
            let _span = info_span!("agent", role = %role).entered();
            let prompt = render_prompt(role, self.strategy, snapshot, &outputs, self.min_purchase);
            let reply = self.llm.complete(&prompt)?;
            info!(chars = reply.len(), "agent replied");
            debug!(%reply);
            outputs.set(role, reply);
        }

        let plan = parse_with_fallback(
            &outputs.execution_instructions,
            &outputs.trading_plan,
            &snapshot.prices,
        )?;

        for rejected in &plan.rejected {
            warn!(
                index = rejected.index,
                entry = %rejected.raw,
                reason = %rejected.reason,
                "discarding trade instruction"
            );
        }
        info!(
            source = %plan.source,
            accepted = plan.instructions.len(),
            rejected = plan.rejected.len(),
            "trade plan parsed"
        );

        Ok(PipelineOutcome { outputs, plan })
    }
}
