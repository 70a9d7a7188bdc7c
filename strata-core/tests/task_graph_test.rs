use strata_core::graph::PackageGraph;
use strata_core::package::{Package, Task, TaskId};
use strata_core::task_graph::{EdgeKind, TaskGraph};
use strata_core::Error;

fn id(package: &str, task: &str) -> TaskId {
    TaskId::new(package, task)
}

fn package(name: &str, deps: &[&str], tasks: Vec<Task>) -> Package {
    Package::new(
        name,
        "core",
        name,
        deps.iter().map(|d| d.to_string()).collect(),
        tasks,
    )
}

fn build_graph(packages: Vec<Package>) -> strata_core::Result<TaskGraph> {
    TaskGraph::build(&PackageGraph::new(packages)?)
}

#[test]
fn test_same_task_propagates_across_dependencies() {
    let graph = build_graph(vec![
        package("a", &[], vec![Task::new("build", "make")]),
        package("b", &["a"], vec![Task::new("build", "make")]),
    ])
    .unwrap();

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.predecessors(&id("b", "build")), vec![&id("a", "build")]);
    assert!(graph.predecessors(&id("a", "build")).is_empty());
    assert_eq!(graph.dependents(&id("a", "build")), vec![&id("b", "build")]);
}

#[test]
fn test_intra_package_ordering() {
    let graph = build_graph(vec![package(
        "a",
        &[],
        vec![
            Task::new("build", "make"),
            Task::new("test", "make test").with_depends_on(["build"]),
        ],
    )])
    .unwrap();

    assert_eq!(graph.predecessors(&id("a", "test")), vec![&id("a", "build")]);
    let edges = graph.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].2, EdgeKind::Intra);
}

#[test]
fn test_propagation_passes_through_packages_without_the_task() {
    // c -> b -> a, only a and c declare build
    let graph = build_graph(vec![
        package("a", &[], vec![Task::new("build", "make")]),
        package("b", &["a"], vec![Task::new("lint", "lint")]),
        package("c", &["b"], vec![Task::new("build", "make")]),
    ])
    .unwrap();

    assert_eq!(graph.predecessors(&id("c", "build")), vec![&id("a", "build")]);
    assert!(graph.predecessors(&id("b", "lint")).is_empty());
}

#[test]
fn test_propagation_stops_at_nearest_provider() {
    // c -> b -> a, all declare build: c waits on b only
    let graph = build_graph(vec![
        package("a", &[], vec![Task::new("build", "make")]),
        package("b", &["a"], vec![Task::new("build", "make")]),
        package("c", &["b"], vec![Task::new("build", "make")]),
    ])
    .unwrap();

    assert_eq!(graph.predecessors(&id("c", "build")), vec![&id("b", "build")]);
}

#[test]
fn test_walk_continues_past_non_propagating_provider() {
    // a -> b -> c, b builds without waiting on its own dependencies
    let graph = build_graph(vec![
        package("c", &[], vec![Task::new("build", "make")]),
        package("b", &["c"], vec![Task::new("build", "make").without_propagation()]),
        package("a", &["b"], vec![Task::new("build", "make")]),
    ])
    .unwrap();

    assert_eq!(
        graph.predecessors(&id("a", "build")),
        vec![&id("b", "build"), &id("c", "build")]
    );
    assert!(graph.predecessors(&id("b", "build")).is_empty());

    let order: Vec<String> = graph
        .topological_order()
        .into_iter()
        .map(|n| n.id.to_string())
        .collect();
    let position = |name: &str| order.iter().position(|i| i == name).unwrap();
    assert!(position("c#build") < position("a#build"));
    assert!(position("b#build") < position("a#build"));
}

#[test]
fn test_no_propagation_when_disabled() {
    let graph = build_graph(vec![
        package("a", &[], vec![Task::new("fmt", "fmt")]),
        package("b", &["a"], vec![Task::new("fmt", "fmt").without_propagation()]),
    ])
    .unwrap();

    assert!(graph.predecessors(&id("b", "fmt")).is_empty());
}

#[test]
fn test_topological_order_respects_edges() {
    let graph = build_graph(vec![
        package("d", &["b", "c"], vec![Task::new("build", "make")]),
        package("c", &["a"], vec![Task::new("build", "make")]),
        package("b", &["a"], vec![Task::new("build", "make")]),
        package(
            "a",
            &[],
            vec![
                Task::new("build", "make"),
                Task::new("gen", "gen"),
            ],
        ),
    ])
    .unwrap();

    let order: Vec<&TaskId> = graph.topological_order().into_iter().map(|n| &n.id).collect();
    assert_eq!(order.len(), 5);
    let position = |target: &TaskId| order.iter().position(|i| *i == target).unwrap();
    for node in graph.nodes() {
        for pred in graph.predecessors(&node.id) {
            assert!(position(pred) < position(&node.id), "{} before {}", pred, node.id);
        }
    }
}

#[test]
fn test_unknown_depends_on_is_config_error() {
    let err = build_graph(vec![package(
        "a",
        &[],
        vec![Task::new("test", "make test").with_depends_on(["build"])],
    )])
    .unwrap_err();

    match err {
        Error::Config { message, .. } => assert!(message.contains("build")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_task_cycle_reports_minimal_cycle() {
    let err = build_graph(vec![package(
        "a",
        &[],
        vec![
            Task::new("x", "x").with_depends_on(["y"]),
            Task::new("y", "y").with_depends_on(["z"]),
            Task::new("z", "z").with_depends_on(["x", "y"]),
        ],
    )])
    .unwrap_err();

    match err {
        Error::Cycle { members } => assert_eq!(members, vec!["a#y", "a#z"]),
        other => panic!("expected cycle error, got {:?}", other),
    }
}

#[test]
fn test_package_cycle_with_shared_task_is_a_task_cycle() {
    let err = build_graph(vec![
        package("a", &["b"], vec![Task::new("build", "make")]),
        package("b", &["a"], vec![Task::new("build", "make")]),
    ])
    .unwrap_err();

    assert!(err.is_fatal());
    match err {
        Error::Cycle { members } => assert_eq!(members, vec!["a#build", "b#build"]),
        other => panic!("expected cycle error, got {:?}", other),
    }
}

#[test]
fn test_package_cycle_without_propagation_is_fine() {
    let graph = build_graph(vec![
        package("a", &["b"], vec![Task::new("build", "make").without_propagation()]),
        package("b", &["a"], vec![Task::new("test", "make test")]),
    ])
    .unwrap();
    assert_eq!(graph.len(), 2);
}

#[test]
fn test_select_includes_transitive_predecessors() {
    let graph = build_graph(vec![
        package(
            "a",
            &[],
            vec![
                Task::new("build", "make"),
                Task::new("test", "make test").with_depends_on(["build"]),
            ],
        ),
        package(
            "b",
            &["a"],
            vec![
                Task::new("build", "make"),
                Task::new("test", "make test").with_depends_on(["build"]),
            ],
        ),
    ])
    .unwrap();

    let selected = graph
        .select(&["test".to_string()], &["b".to_string()])
        .unwrap();
    let mut ids: Vec<String> = selected.nodes().map(|n| n.id.to_string()).collect();
    ids.sort();
    // b#test waits on b#build and a#test, which waits on a#build
    assert_eq!(ids, vec!["a#build", "a#test", "b#build", "b#test"]);

    let only_build = graph.select(&["build".to_string()], &["a".to_string()]).unwrap();
    assert_eq!(only_build.len(), 1);

    assert!(matches!(
        graph.select(&["deploy".to_string()], &[]),
        Err(Error::TaskNotFound { .. })
    ));
}
