//! # Block Workers
//!
//! One worker per block, running the receive / filter / combine /
//! analyze / broadcast loop until cancellation or a terminal failure.
//! A worker owns its mailbox for reading, a per-edge best-known summary
//! table, and per-edge visit counts that switch combining over to
//! widening once the domain's threshold is crossed.
//!
//! All outbound traffic goes to the orchestrator as [`WorkerEvent`]s;
//! workers never talk to each other directly.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use sunder_core::block::{BlockGraph, BlockId, BlockNode, NodeId};
use sunder_core::{Direction, EngineError, Message, MessageKind};
use sunder_domain::{DistributedAnalysis, ProceedDecision};

use crate::diagnostics::{Action, ActionRecord, DiagnosticsSink};
use crate::mailbox::Mailbox;
use crate::quiescence::QuiescenceTracker;

/// Lifecycle of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Processing,
    Broadcasting,
    Finished,
    Cancelled,
}

/// Per-worker counters, reported once on finish.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub received: u64,
    pub combines: u64,
    pub widenings: u64,
    pub broadcasts: u64,
    pub suppressed: u64,
    pub already_enqueued: u64,
}

/// Everything a worker can tell the orchestrator.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Route this message into the mailbox of `to`. Already charged to
    /// the quiescence tracker by the sender.
    Deliver { to: BlockId, message: Message },
    /// A violation condition reached the program entry satisfiably.
    ViolationConfirmed { path: Vec<BlockId> },
    /// This worker can no longer contribute a sound result.
    LocalUnknown { block: BlockId, reason: String },
    /// Terminal report, carrying the final counters.
    Finished {
        block: BlockId,
        phase: Phase,
        stats: WorkerStats,
    },
}

struct EdgeSummary<S> {
    state: S,
    visits: u32,
}

enum Flow {
    Continue,
    Finish(Phase),
}

pub struct Worker<S> {
    block: Arc<BlockNode>,
    graph: Arc<BlockGraph>,
    analysis: DistributedAnalysis<S>,
    mailbox: Arc<Mailbox>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    cancel: watch::Receiver<bool>,
    tracker: Arc<QuiescenceTracker>,
    sink: Arc<dyn DiagnosticsSink>,
    /// Best-known summary per incoming edge and direction.
    summaries: HashMap<(BlockId, Direction), EdgeSummary<S>>,
    /// Last state sent per outgoing edge, for coverage suppression.
    last_sent: HashMap<(BlockId, Direction), S>,
    stats: WorkerStats,
    phase: Phase,
}

impl<S: Clone + Send + Sync + 'static> Worker<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        block: Arc<BlockNode>,
        graph: Arc<BlockGraph>,
        analysis: DistributedAnalysis<S>,
        mailbox: Arc<Mailbox>,
        events: mpsc::UnboundedSender<WorkerEvent>,
        cancel: watch::Receiver<bool>,
        tracker: Arc<QuiescenceTracker>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            block,
            graph,
            analysis,
            mailbox,
            events,
            cancel,
            tracker,
            sink,
            summaries: HashMap::new(),
            last_sent: HashMap::new(),
            stats: WorkerStats::default(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The worker loop. Cancellation is observed at the state-machine
    /// boundary: between messages, never mid-analysis.
    pub async fn run(mut self) {
        let terminal = loop {
            let message = tokio::select! {
                changed = self.cancel.changed() => {
                    match changed {
                        Ok(()) if *self.cancel.borrow() => break Phase::Cancelled,
                        Ok(()) => continue,
                        // Orchestrator gone; nothing left to do.
                        Err(_) => break Phase::Cancelled,
                    }
                }
                message = self.mailbox.recv() => message,
            };
            if *self.cancel.borrow() {
                if message.kind != MessageKind::Shutdown {
                    self.tracker.retire();
                }
                break Phase::Cancelled;
            }
            match self.handle(message) {
                Flow::Continue => {}
                Flow::Finish(phase) => break phase,
            }
        };
        self.finish(terminal);
    }

    fn handle(&mut self, message: Message) -> Flow {
        self.log(Action::Take, message.summary());
        match message.kind {
            MessageKind::Shutdown => Flow::Finish(Phase::Cancelled),
            MessageKind::FoundEquivalent => {
                self.stats.already_enqueued += 1;
                self.log(Action::AlreadyEnqueued, message.summary());
                self.tracker.retire();
                Flow::Continue
            }
            MessageKind::Statistics => {
                // Statistics flow worker -> orchestrator only.
                tracing::warn!(worker = %self.block.id, "unexpected statistics message");
                self.tracker.retire();
                Flow::Continue
            }
            MessageKind::Postcondition | MessageKind::ViolationCondition => {
                let flow = self.process_summary(&message);
                self.tracker.retire();
                flow
            }
        }
    }

    /// FILTER, COMBINE, ANALYZE, CHECK_TARGET, BROADCAST for one
    /// summary-carrying message.
    fn process_summary(&mut self, message: &Message) -> Flow {
        self.stats.received += 1;

        if let Err(error) = self.validate(message) {
            tracing::warn!(worker = %self.block.id, %error, "dropping message");
            return Flow::Continue;
        }

        let state = match (self.analysis.deserialize)(
            &message.payload,
            &self.block,
            message.direction,
        ) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(worker = %self.block.id, %error, "dropping message");
                return Flow::Continue;
            }
        };

        if (self.analysis.proceed)(&state, &self.block, message.direction) == ProceedDecision::Stop
        {
            self.log(Action::AlreadyEnqueued, message.summary());
            return Flow::Continue;
        }

        self.phase = Phase::Processing;
        let flow = self.combine_and_analyze(message, state);
        if matches!(flow, Flow::Continue) {
            self.phase = Phase::Idle;
        }
        flow
    }

    fn combine_and_analyze(&mut self, message: &Message, incoming: S) -> Flow {
        let key = (message.sender.clone(), message.direction);
        let gained = match self.summaries.get_mut(&key) {
            None => {
                self.summaries.insert(
                    key.clone(),
                    EdgeSummary {
                        state: incoming,
                        visits: 1,
                    },
                );
                true
            }
            Some(edge) => {
                edge.visits += 1;
                let merged = if edge.visits > self.analysis.widening_threshold {
                    self.stats.widenings += 1;
                    (self.analysis.widen)(&edge.state, &incoming)
                } else {
                    self.stats.combines += 1;
                    match (self.analysis.combine)(&edge.state, &incoming, &self.analysis.precision)
                    {
                        Ok(merged) => merged,
                        Err(error) => {
                            self.report_unknown(error);
                            return Flow::Continue;
                        }
                    }
                };
                if (self.analysis.equal)(&merged, &edge.state) {
                    false
                } else {
                    edge.state = merged;
                    true
                }
            }
        };

        if !gained {
            // No new information: the bound on total message traffic.
            self.stats.already_enqueued += 1;
            self.log(Action::AlreadyEnqueued, message.summary());
            return Flow::Continue;
        }

        let mut visited = message.visited_blocks.clone();
        visited.insert(self.block.id.clone());

        if message.direction == Direction::Backward {
            // Violation conditions are per-path disjuncts. Folding them
            // across successor edges would take the hull of conditions
            // that must each be refuted on its own: two individually
            // infeasible conditions can have a feasible hull. Pursue
            // only the per-edge condition just combined.
            let condition = match self.summaries.get(&key) {
                Some(edge) => edge.state.clone(),
                None => return Flow::Continue,
            };
            return self.pursue_violation(condition, visited);
        }

        // Forward summaries are joinable over-approximations, so the
        // entry state is the fold of every predecessor edge.
        let merged = match self.merged_summary(Direction::Forward) {
            Ok(Some(state)) => state,
            Ok(None) => return Flow::Continue,
            Err(error) => {
                self.report_unknown(error);
                return Flow::Continue;
            }
        };

        let outcome = match self
            .analysis
            .inner
            .analyze(&merged, &self.block, Direction::Forward)
        {
            Ok(outcome) => outcome,
            Err(error) => {
                self.report_unknown(error);
                return Flow::Finish(Phase::Finished);
            }
        };

        if let Some(hit) = outcome.violation {
            if self.accepts_hit(hit.location) {
                if let Flow::Finish(phase) = self.pursue_violation(hit.condition, visited.clone()) {
                    return Flow::Finish(phase);
                }
            }
        }
        if let Some(exit_state) = outcome.exit_state {
            self.phase = Phase::Broadcasting;
            self.broadcast(Direction::Forward, &exit_state, &visited);
        }
        Flow::Continue
    }

    /// Push a violation condition (positioned at this block's exit)
    /// backward through the block. Confirms at the root, otherwise
    /// forwards the entry condition to the predecessors.
    fn pursue_violation(&mut self, condition: S, visited: BTreeSet<BlockId>) -> Flow {
        let outcome = match self
            .analysis
            .inner
            .analyze(&condition, &self.block, Direction::Backward)
        {
            Ok(outcome) => outcome,
            Err(error) => {
                self.report_unknown(error);
                return Flow::Finish(Phase::Finished);
            }
        };

        if outcome.root_feasible && self.block.is_root() {
            let path: Vec<BlockId> = visited.into_iter().collect();
            let _ = self.events.send(WorkerEvent::ViolationConfirmed { path });
            return Flow::Continue;
        }

        if let Some(entry_condition) = outcome.exit_state {
            self.phase = Phase::Broadcasting;
            self.broadcast(Direction::Backward, &entry_condition, &visited);
        }
        Flow::Continue
    }

    fn broadcast(&mut self, direction: Direction, state: &S, visited: &BTreeSet<BlockId>) {
        let (targets, target_location, action) = match direction {
            Direction::Forward => (
                self.block.successors.clone(),
                self.block.exit_location,
                Action::Forward,
            ),
            Direction::Backward => (
                self.block.predecessors.clone(),
                self.block.entry_location,
                Action::Backward,
            ),
        };
        if targets.is_empty() {
            return;
        }

        let mut sent = 0;
        for target in targets {
            let key = (target.clone(), direction);
            let is_first = !self.last_sent.contains_key(&key);
            if let Some(previous) = self.last_sent.get(&key) {
                if (self.analysis.covered)(state, previous) {
                    self.stats.suppressed += 1;
                    self.send(
                        &target,
                        Message::found_equivalent(
                            self.block.id.clone(),
                            target_location,
                            direction,
                        ),
                    );
                    continue;
                }
            }
            let message = self
                .build_summary_message(direction, target_location, state, visited)
                .with_first(is_first);
            self.log(action, message.summary());
            self.send(&target, message);
            self.last_sent.insert(key, state.clone());
            self.stats.broadcasts += 1;
            sent += 1;
        }
        if sent > 0 {
            self.log(Action::Broadcast, format!("{} {} edges", sent, direction));
        }
    }

    fn build_summary_message(
        &self,
        direction: Direction,
        target_location: NodeId,
        state: &S,
        visited: &BTreeSet<BlockId>,
    ) -> Message {
        let payload = (self.analysis.serialize)(state);
        match direction {
            Direction::Forward => Message::postcondition(
                self.block.id.clone(),
                target_location,
                payload,
                visited.clone(),
            ),
            Direction::Backward => Message::violation_condition(
                self.block.id.clone(),
                target_location,
                payload,
                visited.clone(),
            ),
        }
    }

    fn send(&self, target: &BlockId, message: Message) {
        self.tracker.charge();
        let delivered = self.events.send(WorkerEvent::Deliver {
            to: target.clone(),
            message,
        });
        if delivered.is_err() {
            self.tracker.retire();
        }
    }

    /// Structural checks before any domain work.
    fn validate(&self, message: &Message) -> Result<(), EngineError> {
        if !self.graph.contains(&message.sender) {
            return Err(EngineError::protocol(format!(
                "unknown sender '{}'",
                message.sender
            )));
        }
        for id in &message.visited_blocks {
            if !self.graph.contains(id) {
                return Err(EngineError::protocol(format!(
                    "unknown block '{}' in visited set",
                    id
                )));
            }
        }
        let adjacent = match message.direction {
            Direction::Forward => {
                message.kind == MessageKind::Postcondition
                    && (self.block.predecessors.contains(&message.sender)
                        || (message.is_first && message.sender == self.block.id))
            }
            Direction::Backward => {
                message.kind == MessageKind::ViolationCondition
                    && self.block.successors.contains(&message.sender)
            }
        };
        if !adjacent {
            return Err(EngineError::protocol(format!(
                "'{}' is not a {} neighbor of '{}'",
                message.sender,
                message.direction.opposite(),
                self.block.id
            )));
        }
        Ok(())
    }

    /// Fold every per-edge summary of `direction` into one entry state.
    fn merged_summary(&self, direction: Direction) -> Result<Option<S>, EngineError> {
        let mut merged: Option<S> = None;
        for ((_, dir), edge) in &self.summaries {
            if *dir != direction {
                continue;
            }
            merged = Some(match merged {
                None => edge.state.clone(),
                Some(acc) => (self.analysis.combine)(&acc, &edge.state, &self.analysis.precision)?,
            });
        }
        Ok(merged)
    }

    fn accepts_hit(&self, location: NodeId) -> bool {
        self.graph.violation_locations().is_empty() || self.graph.is_violation_location(location)
    }

    fn report_unknown(&self, error: EngineError) {
        tracing::warn!(worker = %self.block.id, %error, "degrading to unknown");
        let _ = self.events.send(WorkerEvent::LocalUnknown {
            block: self.block.id.clone(),
            reason: error.to_string(),
        });
    }

    fn finish(mut self, terminal: Phase) {
        self.phase = terminal;
        // Messages still pending for us will never be processed; retire
        // them so the in-flight count stays exact.
        while let Some(message) = self.mailbox.try_pop() {
            if message.kind != MessageKind::Shutdown {
                self.tracker.retire();
            }
        }
        self.log(
            Action::Dump,
            format!(
                "received={} combines={} widenings={} broadcasts={} suppressed={} already_enqueued={}",
                self.stats.received,
                self.stats.combines,
                self.stats.widenings,
                self.stats.broadcasts,
                self.stats.suppressed,
                self.stats.already_enqueued
            ),
        );
        self.log(Action::Finish, format!("{:?}", terminal));
        let _ = self.events.send(WorkerEvent::Finished {
            block: self.block.id.clone(),
            phase: terminal,
            stats: self.stats,
        });
    }

    fn log(&self, action: Action, message: impl Into<String>) {
        self.sink
            .log(ActionRecord::new(self.block.id.clone(), action, message));
    }
}
