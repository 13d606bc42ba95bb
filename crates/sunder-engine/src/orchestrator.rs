//! # Orchestrator
//!
//! Spawns one worker per block, routes every broadcast message to the
//! mailbox of its addressed neighbor, owns the global verdict, and
//! watches for quiescence, a confirmed violation, or the deadline.
//! Whichever terminal condition wins the verdict cell triggers one
//! cooperative cancellation broadcast; no worker is killed mid-analysis.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use serde::Serialize;

use sunder_core::block::{BlockGraph, BlockId};
use sunder_core::{Direction, Message, Verdict, VerdictCell};
use sunder_domain::DistributedAnalysis;

use crate::config::EngineConfig;
use crate::diagnostics::{Action, ActionRecord, DiagnosticsSink};
use crate::mailbox::{Deposit, Mailbox};
use crate::quiescence::QuiescenceTracker;
use crate::worker::{Worker, WorkerEvent, WorkerStats};

/// Aggregated counters of one analysis run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub workers: usize,
    pub messages_routed: u64,
    pub messages_coalesced: u64,
    pub received: u64,
    pub combines: u64,
    pub widenings: u64,
    pub broadcasts: u64,
    pub suppressed: u64,
    pub already_enqueued: u64,
}

impl EngineStats {
    fn absorb(&mut self, stats: &WorkerStats) {
        self.received += stats.received;
        self.combines += stats.combines;
        self.widenings += stats.widenings;
        self.broadcasts += stats.broadcasts;
        self.suppressed += stats.suppressed;
        self.already_enqueued += stats.already_enqueued;
    }
}

/// Final report of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub run_id: String,
    pub verdict: Verdict,
    /// Blocks on the reconstructed violation path, on `Unsafe`.
    pub counterexample: Option<Vec<BlockId>>,
    pub stats: EngineStats,
    pub started_at: String,
    pub wall_ms: u64,
}

/// Run the distributed analysis to a terminal verdict.
///
/// Creates one worker task per block, seeds the root block with the
/// domain's initial state, and resolves the verdict on the first of:
/// a confirmed violation (`Unsafe`), global quiescence (`Safe`, or
/// `Unknown` if any worker degraded), the deadline (`Unknown`), or all
/// workers finishing without a verdict (`Unknown`).
pub async fn run_analysis<S: Clone + Send + Sync + 'static>(
    graph: BlockGraph,
    mut analysis: DistributedAnalysis<S>,
    config: EngineConfig,
    sink: Arc<dyn DiagnosticsSink>,
) -> AnalysisOutcome {
    let run_id = uuid::Uuid::new_v4().as_simple().to_string();
    let started_at = chrono::Utc::now().to_rfc3339();
    let started = Instant::now();

    if let Some(threshold) = config.widening_threshold {
        analysis.widening_threshold = threshold;
    }

    let graph = Arc::new(graph);
    let verdict = VerdictCell::new();
    let tracker = Arc::new(QuiescenceTracker::new());
    let mut quiescent = tracker.subscribe();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WorkerEvent>();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let mut mailboxes: HashMap<BlockId, Arc<Mailbox>> = HashMap::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(graph.len());
    for block in graph.blocks() {
        let mailbox = Arc::new(Mailbox::new());
        mailboxes.insert(block.id.clone(), mailbox.clone());
        let worker = Worker::new(
            Arc::new(block.clone()),
            graph.clone(),
            analysis.clone(),
            mailbox,
            event_tx.clone(),
            cancel_rx.clone(),
            tracker.clone(),
            sink.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
    }
    tracing::info!(run_id = %run_id, workers = graph.len(), "analysis started");

    let mut stats = EngineStats {
        workers: graph.len(),
        ..EngineStats::default()
    };

    // Seed the root with the domain's initial ("true") entry state.
    {
        let root = graph.root();
        let initial = (analysis.initial)(root, Direction::Forward);
        let payload = (analysis.serialize)(&initial);
        let seed = Message::postcondition(
            root.id.clone(),
            root.entry_location,
            payload,
            Default::default(),
        )
        .with_first(true);
        tracker.charge();
        deliver(
            &mailboxes,
            &tracker,
            &sink,
            &mut stats,
            root.id.clone(),
            seed,
        );
    }

    let deadline = config.deadline();
    let mut progress = tokio::time::interval(config.progress_interval());
    progress.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut counterexample: Option<Vec<BlockId>> = None;
    let mut any_unknown = false;
    let mut finished: HashSet<BlockId> = HashSet::new();

    while !verdict.is_resolved() {
        // Biased: pending worker events always beat the quiescence
        // watch, so an unknown-degradation or a confirmation that
        // happened right before the counter hit zero is seen first.
        tokio::select! {
            biased;
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    WorkerEvent::Deliver { to, message } => {
                        if finished.contains(&to) {
                            // Addressee already terminal; the message can
                            // never be consumed.
                            tracker.retire();
                            continue;
                        }
                        deliver(&mailboxes, &tracker, &sink, &mut stats, to, message);
                    }
                    WorkerEvent::ViolationConfirmed { path } => {
                        if verdict.resolve(Verdict::Unsafe) {
                            tracing::info!(run_id = %run_id, ?path, "violation confirmed");
                            counterexample = Some(path);
                        }
                    }
                    WorkerEvent::LocalUnknown { block, reason } => {
                        tracing::warn!(run_id = %run_id, %block, %reason, "worker degraded");
                        any_unknown = true;
                    }
                    WorkerEvent::Finished { block, stats: worker_stats, .. } => {
                        stats.absorb(&worker_stats);
                        // Its mailbox has no reader anymore; account for
                        // anything routed there in the meantime.
                        if let Some(mailbox) = mailboxes.get(&block) {
                            drain(mailbox, &tracker);
                        }
                        finished.insert(block);
                        if finished.len() == graph.len() {
                            verdict.resolve(Verdict::Unknown);
                        }
                    }
                }
            }
            changed = quiescent.changed() => {
                if changed.is_err() {
                    break;
                }
                if *quiescent.borrow() && tracker.is_quiescent() {
                    let result = if any_unknown { Verdict::Unknown } else { Verdict::Safe };
                    verdict.resolve(result);
                }
            }
            _ = async {
                match deadline {
                    Some(limit) => tokio::time::sleep(limit.saturating_sub(started.elapsed())).await,
                    None => std::future::pending().await,
                }
            } => {
                tracing::warn!(run_id = %run_id, "deadline exceeded");
                verdict.resolve(Verdict::Unknown);
            }
            _ = progress.tick() => {
                tracing::debug!(run_id = %run_id, pending = tracker.pending(), "in flight");
            }
        }
    }

    // Cooperative shutdown: flip the cancel watch and drop a shutdown
    // message into every mailbox so sleeping workers wake promptly.
    let _ = cancel_tx.send(true);
    for mailbox in mailboxes.values() {
        mailbox.push(Message::shutdown());
    }

    // Collect the stragglers' final stats, bounded by the grace period.
    let grace = tokio::time::sleep(config.shutdown_grace());
    tokio::pin!(grace);
    drop(event_tx);
    while finished.len() < graph.len() {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(WorkerEvent::Finished { block, stats: worker_stats, .. }) => {
                        stats.absorb(&worker_stats);
                        finished.insert(block);
                    }
                    Some(WorkerEvent::ViolationConfirmed { path }) => {
                        if verdict.resolve(Verdict::Unsafe) {
                            counterexample = Some(path);
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            _ = &mut grace => {
                tracing::warn!(run_id = %run_id, "shutdown grace expired");
                break;
            }
        }
    }
    for handle in handles {
        handle.abort();
    }

    let final_verdict = verdict.get();
    tracing::info!(run_id = %run_id, verdict = %final_verdict, "analysis finished");
    AnalysisOutcome {
        run_id,
        verdict: final_verdict,
        counterexample,
        stats,
        started_at,
        wall_ms: started.elapsed().as_millis() as u64,
    }
}

fn deliver(
    mailboxes: &HashMap<BlockId, Arc<Mailbox>>,
    tracker: &QuiescenceTracker,
    sink: &Arc<dyn DiagnosticsSink>,
    stats: &mut EngineStats,
    to: BlockId,
    message: Message,
) {
    let Some(mailbox) = mailboxes.get(&to) else {
        tracing::warn!(target_block = %to, "message for unknown block dropped");
        tracker.retire();
        return;
    };
    sink.log(ActionRecord::new(to, Action::Receive, message.summary()));
    stats.messages_routed += 1;
    if mailbox.push(message) == Deposit::Coalesced {
        stats.messages_coalesced += 1;
        // The displaced message counts as consumed.
        tracker.retire();
    }
}

fn drain(mailbox: &Mailbox, tracker: &QuiescenceTracker) {
    while let Some(message) = mailbox.try_pop() {
        if message.kind != sunder_core::MessageKind::Shutdown {
            tracker.retire();
        }
    }
}
