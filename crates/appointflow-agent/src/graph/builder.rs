use std::collections::BTreeMap;
use std::sync::Arc;

use appointflow_core::config::EngineConfig;
use appointflow_core::error::{AppointflowError, Result};
use appointflow_core::types::{RunContext, TerminalStatus};

use super::edge::{Edge, Route};
use super::node::{Node, StepId};
use crate::middleware::Pipeline;
use crate::steps::{triage, FnStep, HumanReview, PauseForReview, Reviewer, Step};

/// How the `human_review` node is bound. Chosen once, at build time.
#[derive(Clone)]
pub enum ReviewMode {
    /// Ask the reviewer inline, then finalize.
    Blocking(Arc<dyn Reviewer>),
    /// Mark the run as awaiting review and end the walk.
    Pause,
}

impl ReviewMode {
    pub fn is_pause(&self) -> bool {
        matches!(self, Self::Pause)
    }
}

impl std::fmt::Debug for ReviewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("Blocking"),
            Self::Pause => f.write_str("Pause"),
        }
    }
}

/// A validated, immutable step graph.
#[derive(Debug)]
pub struct Graph {
    entry: StepId,
    nodes: BTreeMap<StepId, Node>,
    edges: BTreeMap<StepId, Edge>,
    pipeline: Pipeline,
}

impl Graph {
    pub fn entry(&self) -> StepId {
        self.entry
    }

    pub fn node(&self, id: StepId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: StepId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn step_ids(&self) -> impl Iterator<Item = StepId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Assemble without validation, for exercising executor guards.
    #[cfg(test)]
    pub(crate) fn unchecked(
        entry: StepId,
        nodes: Vec<Node>,
        edges: Vec<(StepId, Edge)>,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            entry,
            nodes: nodes.into_iter().map(|n| (n.id(), n)).collect(),
            edges: edges.into_iter().collect(),
            pipeline,
        }
    }
}

/// Collects nodes and edges, then validates them into a [`Graph`].
pub struct GraphBuilder {
    entry: Option<StepId>,
    nodes: BTreeMap<StepId, Node>,
    edges: BTreeMap<StepId, Edge>,
    pipeline: Pipeline,
    problems: Vec<String>,
}

impl GraphBuilder {
    /// Every node of the graph is wrapped by `pipeline`.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            entry: None,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            pipeline,
            problems: Vec::new(),
        }
    }

    pub fn entry(mut self, id: StepId) -> Self {
        self.entry = Some(id);
        self
    }

    pub fn node(mut self, step: Arc<dyn Step>) -> Self {
        let node = Node::new(step);
        let id = node.id();
        if self.nodes.insert(id, node).is_some() {
            self.problems.push(format!("step '{id}' registered twice"));
        }
        self
    }

    pub fn edge(mut self, from: StepId, edge: Edge) -> Self {
        if self.edges.insert(from, edge).is_some() {
            self.problems.push(format!("step '{from}' has more than one outgoing edge"));
        }
        self
    }

    pub fn build(self) -> Result<Graph> {
        let mut problems = self.problems;

        match self.entry {
            None => problems.push("no entry step declared".to_string()),
            Some(id) if !self.nodes.contains_key(&id) => {
                problems.push(format!("entry step '{id}' is not registered"))
            }
            Some(_) => {}
        }

        for id in self.nodes.keys() {
            if !self.edges.contains_key(id) {
                problems.push(format!("step '{id}' has no outgoing edge"));
            }
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                problems.push(format!("edge from unregistered step '{from}'"));
            }
            for target in edge.targets() {
                if let Route::To(to) = target {
                    if !self.nodes.contains_key(&to) {
                        problems.push(format!("edge '{from}' -> '{to}' targets an unregistered step"));
                    }
                }
            }
        }

        match (self.entry, problems.is_empty()) {
            (Some(entry), true) => Ok(Graph {
                entry,
                nodes: self.nodes,
                edges: self.edges,
                pipeline: self.pipeline,
            }),
            _ => Err(AppointflowError::Graph(problems.join("; "))),
        }
    }
}

fn status_is(status: TerminalStatus) -> impl Fn(&RunContext) -> bool + Send + Sync {
    move |ctx: &RunContext| ctx.terminal_status == Some(status)
}

/// The triage graph:
/// `classify_intent -> safety_check -> info_check -> handle_intent -> draft ->
/// human_review -> finalize`, ending early on ESCALATE after safety, on
/// NEED_INFO after info, and after review in pause mode.
pub fn build_graph(mode: ReviewMode, config: &EngineConfig) -> Result<Graph> {
    let review: Arc<dyn Step> = match &mode {
        ReviewMode::Blocking(reviewer) => Arc::new(HumanReview::new(reviewer.clone())),
        ReviewMode::Pause => Arc::new(PauseForReview),
    };
    let after_review = if mode.is_pause() {
        Edge::end()
    } else {
        Edge::to(StepId::Finalize)
    };

    GraphBuilder::new(Pipeline::standard(config))
        .entry(StepId::Classify)
        .node(Arc::new(FnStep::new(StepId::Classify, triage::classify_intent)))
        .node(Arc::new(FnStep::new(StepId::SafetyCheck, triage::safety_check)))
        .node(Arc::new(FnStep::new(StepId::InfoCheck, triage::info_check)))
        .node(Arc::new(FnStep::new(StepId::HandleIntent, triage::handle_intent)))
        .node(Arc::new(FnStep::new(StepId::Draft, triage::draft)))
        .node(review)
        .node(Arc::new(FnStep::new(StepId::Finalize, triage::finalize)))
        .edge(StepId::Classify, Edge::to(StepId::SafetyCheck))
        .edge(
            StepId::SafetyCheck,
            Edge::branch(
                status_is(TerminalStatus::Escalate),
                Route::End,
                StepId::InfoCheck,
            ),
        )
        .edge(
            StepId::InfoCheck,
            Edge::branch(
                status_is(TerminalStatus::NeedInfo),
                Route::End,
                StepId::HandleIntent,
            ),
        )
        .edge(StepId::HandleIntent, Edge::to(StepId::Draft))
        .edge(StepId::Draft, Edge::to(StepId::HumanReview))
        .edge(StepId::HumanReview, after_review)
        .edge(StepId::Finalize, Edge::end())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: StepId) -> Arc<dyn Step> {
        Arc::new(FnStep::new(id, |mut ctx| {
            ctx.trace("noop");
            Ok(ctx)
        }))
    }

    fn graph_error(builder: GraphBuilder) -> String {
        match builder.build() {
            Err(AppointflowError::Graph(msg)) => msg,
            other => panic!("expected graph error, got {other:?}"),
        }
    }

    #[test]
    fn pause_graph_ends_after_review() {
        let pause = build_graph(ReviewMode::Pause, &EngineConfig::default()).unwrap();
        assert_eq!(pause.len(), 7);
        assert_eq!(pause.entry(), StepId::Classify);
        assert_eq!(
            pause.edge(StepId::HumanReview).unwrap().targets(),
            vec![Route::End]
        );
        assert_eq!(
            pause.pipeline().layer_names(),
            vec!["call_limit", "retry", "redact"]
        );
    }

    #[test]
    fn missing_entry_is_rejected() {
        let msg = graph_error(GraphBuilder::new(Pipeline::default()));
        assert!(msg.contains("no entry step"));
    }

    #[test]
    fn node_without_edge_is_rejected() {
        let builder = GraphBuilder::new(Pipeline::default())
            .entry(StepId::Classify)
            .node(noop(StepId::Classify));
        assert!(graph_error(builder).contains("no outgoing edge"));
    }

    #[test]
    fn unregistered_target_is_rejected() {
        let builder = GraphBuilder::new(Pipeline::default())
            .entry(StepId::Classify)
            .node(noop(StepId::Classify))
            .edge(StepId::Classify, Edge::to(StepId::Draft));
        assert!(graph_error(builder).contains("unregistered step"));
    }

    #[test]
    fn duplicate_edge_is_rejected() {
        let builder = GraphBuilder::new(Pipeline::default())
            .entry(StepId::Classify)
            .node(noop(StepId::Classify))
            .edge(StepId::Classify, Edge::end())
            .edge(StepId::Classify, Edge::end());
        assert!(graph_error(builder).contains("more than one outgoing edge"));
    }

    #[test]
    fn branch_to_unregistered_step_is_rejected() {
        let builder = GraphBuilder::new(Pipeline::default())
            .entry(StepId::Classify)
            .node(noop(StepId::Classify))
            .edge(
                StepId::Classify,
                Edge::branch(|_: &RunContext| false, Route::End, StepId::Draft),
            );
        let msg = graph_error(builder);
        assert!(msg.contains("'classify_intent' -> 'draft'"), "{msg}");
    }

    #[test]
    fn standard_branches_only_reach_declared_steps() {
        let graph = build_graph(ReviewMode::Pause, &EngineConfig::default()).unwrap();
        assert_eq!(
            graph.edge(StepId::SafetyCheck).unwrap().targets(),
            vec![Route::End, Route::To(StepId::InfoCheck)]
        );
        assert_eq!(
            graph.edge(StepId::InfoCheck).unwrap().targets(),
            vec![Route::End, Route::To(StepId::HandleIntent)]
        );
    }

    #[test]
    fn minimal_graph_builds() {
        let graph = GraphBuilder::new(Pipeline::default())
            .entry(StepId::Classify)
            .node(noop(StepId::Classify))
            .edge(StepId::Classify, Edge::end())
            .build()
            .unwrap();
        assert_eq!(graph.step_ids().collect::<Vec<_>>(), vec![StepId::Classify]);
    }
}
