use std::fs;

use tempfile::TempDir;

use strata_core::graph::PackageGraph;
use strata_core::package::Package;
use strata_core::Error;

fn create_test_packages() -> Vec<Package> {
    vec![
        Package::new("pkg-c", "apps", "pkg-c", vec!["pkg-b".to_string()], vec![]),
        Package::new("pkg-a", "core", "pkg-a", vec![], vec![]),
        Package::new("pkg-b", "tools", "pkg-b", vec!["pkg-a".to_string()], vec![]),
    ]
}

#[test]
fn test_packages_sorted_by_name() {
    let graph = PackageGraph::new(create_test_packages()).unwrap();
    let names: Vec<&str> = graph.packages().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["pkg-a", "pkg-b", "pkg-c"]);
    assert_eq!(graph.len(), 3);
}

#[test]
fn test_dependencies() {
    let graph = PackageGraph::new(create_test_packages()).unwrap();

    let deps = graph.dependencies_of("pkg-b").unwrap();
    assert_eq!(deps, vec!["pkg-a"]);

    let deps = graph.dependencies_of("pkg-a").unwrap();
    assert!(deps.is_empty());
}

#[test]
fn test_dependents() {
    let graph = PackageGraph::new(create_test_packages()).unwrap();

    let dependents = graph.dependents_of("pkg-a").unwrap();
    assert_eq!(dependents, vec!["pkg-b"]);

    let dependents = graph.dependents_of("pkg-c").unwrap();
    assert!(dependents.is_empty());
}

#[test]
fn test_layer_of() {
    let graph = PackageGraph::new(create_test_packages()).unwrap();
    assert_eq!(graph.layer_of("pkg-b").unwrap(), "tools");
    assert!(matches!(
        graph.layer_of("missing"),
        Err(Error::PackageNotFound { .. })
    ));
}

#[test]
fn test_edges() {
    let graph = PackageGraph::new(create_test_packages()).unwrap();
    let edges: Vec<(&str, &str)> = graph
        .edges()
        .map(|(from, to)| (from.name.as_str(), to.name.as_str()))
        .collect();
    assert_eq!(edges, vec![("pkg-b", "pkg-a"), ("pkg-c", "pkg-b")]);
}

#[test]
fn test_all_dependents() {
    let graph = PackageGraph::new(create_test_packages()).unwrap();

    let all_deps = graph.all_dependents("pkg-a").unwrap();
    assert_eq!(all_deps.len(), 2);
    assert!(all_deps.contains("pkg-b"));
    assert!(all_deps.contains("pkg-c"));
}

#[test]
fn test_affected_packages() {
    let graph = PackageGraph::new(create_test_packages()).unwrap();

    let affected = graph.affected_packages(&["pkg-b".to_string()]).unwrap();
    assert_eq!(affected.len(), 2);
    assert!(affected.contains("pkg-b"));
    assert!(affected.contains("pkg-c"));
    assert!(!affected.contains("pkg-a"));
}

#[test]
fn test_duplicate_names_rejected() {
    let packages = vec![
        Package::new("dup", "core", "one", vec![], vec![]),
        Package::new("dup", "core", "two", vec![], vec![]),
    ];
    match PackageGraph::new(packages) {
        Err(Error::Config { path, message }) => {
            assert!(path.ends_with("strata.toml"));
            assert!(message.contains("dup"));
            assert!(message.contains("strata.toml"));
        }
        other => panic!("expected config error, got {:?}", other.map(|g| g.len())),
    }
}

#[test]
fn test_unresolved_dependency_rejected() {
    let packages = vec![Package::new(
        "a",
        "core",
        "a",
        vec!["ghost".to_string()],
        vec![],
    )];
    let err = PackageGraph::new(packages).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn test_external_dependency_ignored() {
    let packages = vec![Package::new(
        "a",
        "core",
        "a",
        vec!["left-pad".to_string()],
        vec![],
    )
    .with_external(vec!["left-pad".to_string()])];
    let graph = PackageGraph::new(packages).unwrap();
    assert!(graph.dependencies_of("a").unwrap().is_empty());
    assert_eq!(graph.edges().count(), 0);
}

#[test]
fn test_package_cycle_loads() {
    let packages = vec![
        Package::new("a", "core", "a", vec!["b".to_string()], vec![]),
        Package::new("b", "core", "b", vec!["a".to_string()], vec![]),
    ];
    let graph = PackageGraph::new(packages).unwrap();
    assert_eq!(graph.dependencies_of("a").unwrap(), vec!["b"]);
    assert_eq!(graph.dependencies_of("b").unwrap(), vec!["a"]);
}

#[test]
fn test_load_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    for (name, layer, deps) in [("base", "core", ""), ("app", "apps", "\"base\"")] {
        let dir = temp_dir.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("strata.toml"),
            format!(
                "name = \"{}\"\nlayer = \"{}\"\n[deps]\ninternal = [{}]\n",
                name, layer, deps
            ),
        )
        .unwrap();
    }

    let graph = PackageGraph::load([temp_dir.path()]).unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.dependents_of("base").unwrap(), vec!["app"]);
}
