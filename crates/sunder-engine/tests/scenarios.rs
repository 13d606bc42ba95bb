//! End-to-end runs of the distributed engine on small block graphs,
//! using the interval domain as the plugged-in analysis.

use std::collections::HashMap;

use sunder_core::block::{BlockGraph, BlockGraphBuilder};
use sunder_core::Verdict;
use sunder_domain::{interval_analysis, CmpOp, DistributedAnalysis, IntervalState, Stmt};
use sunder_engine::{run_analysis, Action, EngineConfig, MemorySink};

fn assign(var: &str, value: i64) -> Stmt {
    Stmt::Assign {
        var: var.into(),
        value,
    }
}

fn add(var: &str, delta: i64) -> Stmt {
    Stmt::AddConst {
        var: var.into(),
        delta,
    }
}

fn assert_cmp(var: &str, cmp: CmpOp, value: i64) -> Stmt {
    Stmt::Assert {
        var: var.into(),
        cmp,
        value,
    }
}

fn setup(
    graph: BlockGraph,
    bodies: Vec<(&str, Vec<Stmt>)>,
    widening_threshold: u32,
) -> (BlockGraph, DistributedAnalysis<IntervalState>) {
    let mut map = HashMap::new();
    for (id, body) in bodies {
        map.insert(id.to_string(), body);
    }
    (graph, interval_analysis(map, widening_threshold))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn linear_graph_without_violation_is_safe() {
    let graph = BlockGraphBuilder::new()
        .block("B1", 0, 10)
        .block("B2", 10, 20)
        .edge("B1", "B2")
        .build()
        .unwrap();
    let (graph, analysis) = setup(
        graph,
        vec![
            ("B1", vec![assign("x", 1)]),
            ("B2", vec![assert_cmp("x", CmpOp::Ge, 0)]),
        ],
        4,
    );

    let sink = MemorySink::new();
    let outcome = run_analysis(graph, analysis, EngineConfig::default(), sink.clone()).await;

    assert_eq!(outcome.verdict, Verdict::Safe);
    assert!(outcome.counterexample.is_none());
    // The postcondition of B1 reached B2.
    assert!(sink.count(Action::Forward) >= 1);
    assert_eq!(sink.count(Action::Backward), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loop_graph_stabilizes_through_widening() {
    // B0 -> B1 -> B2 -> B1: x grows by one per lap, so only widening
    // can close the ascending chain.
    let graph = BlockGraphBuilder::new()
        .block("B0", 0, 5)
        .block("B1", 5, 10)
        .block("B2", 10, 5)
        .edge("B0", "B1")
        .edge("B1", "B2")
        .edge("B2", "B1")
        .build()
        .unwrap();
    let (graph, analysis) = setup(
        graph,
        vec![
            ("B0", vec![assign("x", 0)]),
            ("B1", vec![add("x", 1)]),
            ("B2", vec![]),
        ],
        2,
    );

    let sink = MemorySink::new();
    let outcome = run_analysis(graph, analysis, EngineConfig::default(), sink).await;

    assert_eq!(outcome.verdict, Verdict::Safe);
    assert!(outcome.stats.widenings >= 1, "loop must be widened shut");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn violation_in_second_block_is_unsafe_with_counterexample() {
    let graph = BlockGraphBuilder::new()
        .block("B1", 0, 10)
        .block("B2", 10, 20)
        .edge("B1", "B2")
        .violation_location(20)
        .build()
        .unwrap();
    let (graph, analysis) = setup(
        graph,
        vec![
            ("B1", vec![assign("x", 1)]),
            ("B2", vec![assert_cmp("x", CmpOp::Le, 0)]),
        ],
        4,
    );

    let sink = MemorySink::new();
    let outcome = run_analysis(graph, analysis, EngineConfig::default(), sink.clone()).await;

    assert_eq!(outcome.verdict, Verdict::Unsafe);
    let path = outcome.counterexample.expect("counterexample path");
    assert!(path.contains(&"B1".to_string()));
    assert!(path.contains(&"B2".to_string()));
    // The violation condition travelled backward at least once.
    assert!(sink.count(Action::Backward) >= 1);
    // Every worker wound down cooperatively.
    assert_eq!(sink.count(Action::Finish), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spurious_violation_refuted_backward_is_safe() {
    // Join imprecision: x is 1 via B2 or 3 via B3, so the hull [1,3]
    // appears to violate `x != 2`. The backward condition x = 2 dies in
    // both branches, so no counterexample is ever confirmed.
    let graph = BlockGraphBuilder::new()
        .block("B1", 0, 10)
        .block("B2", 10, 20)
        .block("B3", 10, 20)
        .block("B4", 20, 30)
        .edge("B1", "B2")
        .edge("B1", "B3")
        .edge("B2", "B4")
        .edge("B3", "B4")
        .build()
        .unwrap();
    let (graph, analysis) = setup(
        graph,
        vec![
            ("B1", vec![assign("x", 0)]),
            ("B2", vec![add("x", 1)]),
            ("B3", vec![add("x", 3)]),
            ("B4", vec![assert_cmp("x", CmpOp::Ne, 2)]),
        ],
        4,
    );

    let sink = MemorySink::new();
    let outcome = run_analysis(graph, analysis, EngineConfig::default(), sink.clone()).await;

    assert_eq!(outcome.verdict, Verdict::Safe);
    // The spurious hit did travel backward before being refuted.
    assert!(sink.count(Action::Backward) >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_runs_agree() {
    // Message interleavings differ between runs; the fixpoint does not.
    let build = || {
        let graph = BlockGraphBuilder::new()
            .block("B0", 0, 5)
            .block("B1", 5, 10)
            .block("B2", 10, 5)
            .edge("B0", "B1")
            .edge("B1", "B2")
            .edge("B2", "B1")
            .build()
            .unwrap();
        setup(
            graph,
            vec![
                ("B0", vec![assign("x", 0)]),
                ("B1", vec![add("x", 1), assert_cmp("x", CmpOp::Ge, 1)]),
                ("B2", vec![]),
            ],
            2,
        )
    };

    let (graph, analysis) = build();
    let first = run_analysis(graph, analysis, EngineConfig::default(), MemorySink::new()).await;
    let (graph, analysis) = build();
    let second = run_analysis(graph, analysis, EngineConfig::default(), MemorySink::new()).await;

    assert_eq!(first.verdict, second.verdict);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_block_body_degrades_to_unknown() {
    let graph = BlockGraphBuilder::new().block("B1", 0, 10).build().unwrap();
    // No body registered for B1: the inner analysis fails.
    let analysis = interval_analysis(HashMap::new(), 4);

    let outcome = run_analysis(graph, analysis, EngineConfig::default(), MemorySink::new()).await;
    assert_eq!(outcome.verdict, Verdict::Unknown);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_forces_unknown() {
    // Unbounded ascending chain and no widening: only the deadline can
    // end this run.
    let graph = BlockGraphBuilder::new()
        .block("B0", 0, 5)
        .block("B1", 5, 10)
        .block("B2", 10, 5)
        .edge("B0", "B1")
        .edge("B1", "B2")
        .edge("B2", "B1")
        .build()
        .unwrap();
    let (graph, analysis) = setup(
        graph,
        vec![
            ("B0", vec![assign("x", 0)]),
            ("B1", vec![add("x", 1)]),
            ("B2", vec![]),
        ],
        u32::MAX,
    );

    let config = EngineConfig {
        deadline_secs: Some(1),
        ..EngineConfig::default()
    };
    let outcome = run_analysis(graph, analysis, config, MemorySink::new()).await;
    assert_eq!(outcome.verdict, Verdict::Unknown);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn diamond_graph_joins_before_deciding() {
    //      B1
    //     /  \
    //   B2    B3
    //     \  /
    //      B4
    // Both branches bound x, so the assert in B4 holds for the join.
    let graph = BlockGraphBuilder::new()
        .block("B1", 0, 10)
        .block("B2", 10, 20)
        .block("B3", 10, 20)
        .block("B4", 20, 30)
        .edge("B1", "B2")
        .edge("B1", "B3")
        .edge("B2", "B4")
        .edge("B3", "B4")
        .build()
        .unwrap();
    let (graph, analysis) = setup(
        graph,
        vec![
            ("B1", vec![assign("x", 0)]),
            ("B2", vec![add("x", 1)]),
            ("B3", vec![add("x", 2)]),
            ("B4", vec![assert_cmp("x", CmpOp::Le, 2)]),
        ],
        4,
    );

    let outcome = run_analysis(graph, analysis, EngineConfig::default(), MemorySink::new()).await;
    assert_eq!(outcome.verdict, Verdict::Safe);
}
