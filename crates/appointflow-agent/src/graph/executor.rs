use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use appointflow_core::error::{AppointflowError, Result};
use appointflow_core::event::EventBus;
use appointflow_core::types::{RunContext, RunEvent, ROUTING_FALLBACK};

use super::builder::Graph;
use super::edge::Route;
use super::node::StepId;

/// Walks a [`Graph`] for one run at a time.
///
/// The executor holds no per-run state, so one instance can serve any number
/// of runs, including concurrent ones on separate threads. Each run is
/// synchronous: steps execute one after another on the calling thread.
pub struct GraphExecutor {
    graph: Arc<Graph>,
    events: Option<Arc<EventBus>>,
}

impl GraphExecutor {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            events: None,
        }
    }

    /// Publish [`RunEvent`]s for every run and step.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run from the entry node until a route ends the walk.
    ///
    /// Never fails. A run that arrives already halted (ESCALATE or NEED_INFO)
    /// runs no step at all. The walk also stops early when a step leaves the
    /// run halted but its edge still points at another step. In both cases
    /// `halted:<STATUS>` is appended. A route back to a step that already ran
    /// escalates the run.
    pub fn run(&self, ctx: RunContext) -> RunContext {
        let start = Instant::now();
        let mut ctx = ctx;
        let mut visited: HashSet<StepId> = HashSet::new();
        let mut current = self.graph.entry();

        info!(run_id = %ctx.run_id(), entry = current.as_str(), "Run started");
        self.publish(RunEvent::RunStarted {
            run_id: ctx.run_id().clone(),
        });

        if let Some(status) = ctx.terminal_status.filter(|s| s.halts()) {
            debug!(
                run_id = %ctx.run_id(),
                status = status.as_str(),
                skipped = current.as_str(),
                "Run already halted, no step runs"
            );
            ctx.trace(format!("halted:{status}"));
            return self.finish(ctx, start);
        }

        loop {
            visited.insert(current);
            ctx = match self.invoke(current, ctx) {
                Ok(done) => done,
                Err((failed, e)) => {
                    ctx = failed;
                    warn!(run_id = %ctx.run_id(), step = current.as_str(), error = %e, "Step missing from graph");
                    ctx.escalate(ROUTING_FALLBACK, format!("missing_step:{current}"));
                    break;
                }
            };

            let route = self
                .graph
                .edge(current)
                .map(|edge| edge.resolve(&ctx))
                .unwrap_or(Route::End);

            let next = match route {
                Route::End => break,
                Route::To(next) => next,
            };

            if let Some(status) = ctx.terminal_status.filter(|s| s.halts()) {
                debug!(
                    run_id = %ctx.run_id(),
                    step = current.as_str(),
                    status = status.as_str(),
                    skipped = next.as_str(),
                    "Run halted, skipping remaining steps"
                );
                ctx.trace(format!("halted:{status}"));
                break;
            }

            if visited.contains(&next) {
                warn!(
                    run_id = %ctx.run_id(),
                    from = current.as_str(),
                    to = next.as_str(),
                    "Route revisits a step that already ran"
                );
                ctx.escalate(ROUTING_FALLBACK, format!("route_cycle_detected:{next}"));
                break;
            }

            current = next;
        }

        self.finish(ctx, start)
    }

    fn finish(&self, ctx: RunContext, start: Instant) -> RunContext {
        info!(
            run_id = %ctx.run_id(),
            status = ctx.terminal_status.map(|s| s.as_str()).unwrap_or("PENDING"),
            steps = ctx.step_calls(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run finished"
        );
        self.publish(RunEvent::RunFinished {
            run_id: ctx.run_id().clone(),
            status: ctx.terminal_status,
            route_trace: ctx.route_trace().to_vec(),
        });
        ctx
    }

    /// Invoke one wrapped step outside the graph walk.
    pub fn run_step(&self, id: StepId, ctx: RunContext) -> Result<RunContext> {
        self.invoke(id, ctx).map_err(|(_, e)| e)
    }

    fn invoke(
        &self,
        id: StepId,
        ctx: RunContext,
    ) -> std::result::Result<RunContext, (RunContext, AppointflowError)> {
        let Some(node) = self.graph.node(id) else {
            return Err((
                ctx,
                AppointflowError::Graph(format!("step '{id}' is not registered")),
            ));
        };

        let ctx = self.graph.pipeline().invoke(node.step(), ctx);
        debug!(
            run_id = %ctx.run_id(),
            step = id.as_str(),
            calls = ctx.step_calls(),
            status = ctx.terminal_status.map(|s| s.as_str()),
            "Step completed"
        );
        self.publish(RunEvent::StepCompleted {
            run_id: ctx.run_id().clone(),
            step: id.as_str().to_string(),
            step_calls: ctx.step_calls(),
            status: ctx.terminal_status,
        });
        Ok(ctx)
    }

    fn publish(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::graph::{build_graph, Edge, GraphBuilder, ReviewMode};
    use crate::middleware::{CallLimit, Pipeline};
    use crate::steps::{FnStep, Step};
    use appointflow_core::config::EngineConfig;
    use appointflow_core::types::{TerminalStatus, CALL_LIMIT_FALLBACK};

    fn executor(config: &EngineConfig) -> GraphExecutor {
        GraphExecutor::new(Arc::new(build_graph(ReviewMode::Pause, config).unwrap()))
    }

    fn quick_config(max_step_calls: u32) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.max_step_calls = max_step_calls;
        config.retry.backoff_ms = 0;
        config
    }

    fn mark(mut ctx: RunContext) -> Result<RunContext> {
        ctx.trace("mark");
        Ok(ctx)
    }

    /// Counts how often it actually ran.
    struct Tally {
        id: StepId,
        runs: Arc<AtomicU32>,
    }

    impl Step for Tally {
        fn id(&self) -> StepId {
            self.id
        }

        fn run(&self, mut ctx: RunContext) -> Result<RunContext> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.trace(self.id.as_str());
            Ok(ctx)
        }
    }

    #[test]
    fn pause_mode_stops_after_review() {
        let out = executor(&quick_config(50)).run(RunContext::new("how do I prepare for my MRI"));
        assert!(out.terminal_status.is_none());
        assert_eq!(
            out.route_trace(),
            &[
                "classify_intent",
                "safety_check",
                "safety_ok",
                "info_check",
                "info_complete",
                "handle_intent",
                "draft",
                "human_review",
                "hitl_pause",
            ]
        );
        assert_eq!(out.step_calls(), 6);
    }

    #[test]
    fn escalation_ends_after_safety() {
        let out = executor(&quick_config(50)).run(RunContext::new("chest pain, cancel appointment 1234"));
        assert_eq!(out.terminal_status, Some(TerminalStatus::Escalate));
        assert_eq!(out.draft_response, None);
        assert_eq!(
            out.route_trace(),
            &["classify_intent", "safety_check", "safety_escalate"]
        );
    }

    #[test]
    fn halted_run_short_circuits_at_next_edge() {
        // The fourth call (handle_intent) trips the limit; its edge to draft is
        // unconditional, so the executor must stop there.
        let out = executor(&quick_config(3)).run(RunContext::new("how do I prepare for my MRI"));
        assert_eq!(out.terminal_status, Some(TerminalStatus::Escalate));
        assert_eq!(out.final_response.as_deref(), Some(CALL_LIMIT_FALLBACK));
        assert_eq!(
            out.route_trace(),
            &[
                "classify_intent",
                "safety_check",
                "safety_ok",
                "info_check",
                "info_complete",
                "call_limit_exceeded",
                "halted:ESCALATE",
            ]
        );
        assert!(!out.route_trace().iter().any(|e| e == "draft"));
    }

    #[test]
    fn step_runs_never_exceed_ceiling() {
        let runs = Arc::new(AtomicU32::new(0));
        let tally = |id| -> Arc<dyn Step> {
            Arc::new(Tally {
                id,
                runs: runs.clone(),
            })
        };
        let graph = GraphBuilder::new(Pipeline::new(vec![Arc::new(CallLimit::new(2))]))
            .entry(StepId::Classify)
            .node(tally(StepId::Classify))
            .node(tally(StepId::SafetyCheck))
            .node(tally(StepId::InfoCheck))
            .node(tally(StepId::HandleIntent))
            .edge(StepId::Classify, Edge::to(StepId::SafetyCheck))
            .edge(StepId::SafetyCheck, Edge::to(StepId::InfoCheck))
            .edge(StepId::InfoCheck, Edge::to(StepId::HandleIntent))
            .edge(StepId::HandleIntent, Edge::end())
            .build()
            .unwrap();
        let out = GraphExecutor::new(Arc::new(graph)).run(RunContext::new("x"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(out.terminal_status, Some(TerminalStatus::Escalate));
        assert!(out.final_response.is_some());
    }

    #[test]
    fn looping_branch_is_escalated() {
        let graph = GraphBuilder::new(Pipeline::default())
            .entry(StepId::Classify)
            .node(Arc::new(FnStep::new(StepId::Classify, mark)))
            .node(Arc::new(FnStep::new(StepId::SafetyCheck, mark)))
            .edge(StepId::Classify, Edge::to(StepId::SafetyCheck))
            .edge(
                StepId::SafetyCheck,
                Edge::branch(|_: &RunContext| true, StepId::Classify, Route::End),
            )
            .build()
            .unwrap();
        let out = GraphExecutor::new(Arc::new(graph)).run(RunContext::new("x"));
        assert_eq!(out.terminal_status, Some(TerminalStatus::Escalate));
        assert_eq!(out.final_response.as_deref(), Some(ROUTING_FALLBACK));
        assert_eq!(
            out.route_trace(),
            &["mark", "mark", "route_cycle_detected:classify_intent"]
        );
    }

    #[test]
    fn halted_before_start_runs_nothing() {
        for status in [TerminalStatus::Escalate, TerminalStatus::NeedInfo] {
            let mut ctx = RunContext::new("cancel appointment 1234");
            ctx.terminal_status = Some(status);
            ctx.final_response = Some("stopped".into());

            let out = executor(&quick_config(50)).run(ctx);
            assert_eq!(out.terminal_status, Some(status));
            assert_eq!(out.step_calls(), 0);
            assert_eq!(out.intent, None);
            assert_eq!(out.route_trace(), &[format!("halted:{status}")]);
            assert_eq!(out.final_response.as_deref(), Some("stopped"));
        }
    }

    #[test]
    fn ready_before_start_still_walks() {
        let mut ctx = RunContext::new("how do I prepare for my MRI");
        ctx.terminal_status = Some(TerminalStatus::Ready);
        let out = executor(&quick_config(50)).run(ctx);
        assert_eq!(out.route_trace().first().map(String::as_str), Some("classify_intent"));
    }

    #[test]
    fn missing_step_keeps_escalated_context() {
        let graph = Graph::unchecked(
            StepId::Classify,
            Vec::new(),
            Vec::new(),
            Pipeline::default(),
        );
        let mut ctx = RunContext::new("x");
        ctx.trace("before");
        let out = GraphExecutor::new(Arc::new(graph)).run(ctx);
        assert_eq!(out.terminal_status, Some(TerminalStatus::Escalate));
        assert_eq!(out.final_response.as_deref(), Some(ROUTING_FALLBACK));
        assert_eq!(out.route_trace(), &["before", "missing_step:classify_intent"]);
    }

    #[test]
    fn run_step_outside_walk() {
        let exec = executor(&quick_config(50));
        let out = exec.run_step(StepId::Finalize, RunContext::new("x")).unwrap();
        assert_eq!(out.terminal_status, Some(TerminalStatus::Ready));
        assert_eq!(out.route_trace(), &["finalize"]);
        assert_eq!(out.step_calls(), 1);
    }

    #[test]
    fn run_step_unknown_is_graph_error() {
        let graph = GraphBuilder::new(Pipeline::default())
            .entry(StepId::Classify)
            .node(Arc::new(FnStep::new(StepId::Classify, mark)))
            .edge(StepId::Classify, Edge::end())
            .build()
            .unwrap();
        let exec = GraphExecutor::new(Arc::new(graph));
        let err = exec.run_step(StepId::Finalize, RunContext::new("x")).unwrap_err();
        assert_eq!(err.kind(), "graph");
    }

    #[tokio::test]
    async fn publishes_run_events() {
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();
        let exec = executor(&quick_config(50)).with_events(bus);
        let out = exec.run(RunContext::new("I want to reschedule"));
        assert_eq!(out.terminal_status, Some(TerminalStatus::NeedInfo));

        let mut steps = Vec::new();
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                RunEvent::StepCompleted { step, .. } => steps.push(step),
                RunEvent::RunFinished { status, .. } => finished = status,
                RunEvent::RunStarted { .. } => {}
            }
        }
        assert_eq!(steps, vec!["classify_intent", "safety_check", "info_check"]);
        assert_eq!(finished, Some(TerminalStatus::NeedInfo));
    }
}
