//! Filesystem discovery through the manifest loader.

use std::path::Path;

use convokit_core::{ComponentRegistry, ManifestLoader};
use convokit_test_utils::{ComponentDir, capture_logs};
use pretty_assertions::assert_eq;

fn names(registry: &ComponentRegistry) -> Vec<&str> {
    registry.components().iter().map(|c| c.name()).collect()
}

#[test_log::test]
fn test_assemble_registers_unique_units() {
    let dir = ComponentDir::new();
    dir.greeting("a_hello.json", "hello", "Hi");
    dir.greeting("b_bye.json", "bye", "Bye");
    dir.greeting("c_hello_again.json", "hello", "Hi again");

    let registry = dir.assemble();
    assert!(registry.is_valid());
    assert_eq!(names(&registry), vec!["hello", "bye"]);
    let first = registry.get_component("hello").unwrap();
    assert_eq!(first.metadata().supported_actions, vec!["done"]);
}

#[test_log::test]
fn test_subdirectories_become_collections() {
    let dir = ComponentDir::new();
    dir.greeting("hello.json", "hello", "Hi");
    dir.greeting("sales/quote.json", "quote", "Here you go");
    dir.greeting("sales/nested/deep.json", "deep", "unreachable");
    dir.dir("empty");

    let registry = dir.assemble();
    assert_eq!(registry.collection_names(), vec!["empty", "sales"]);
    assert!(registry.is_collection("sales"));
    assert!(!registry.is_component("quote"));

    let sales = registry.get_registry(Some("sales")).unwrap();
    assert_eq!(names(sales), vec!["quote"]);
    assert!(sales.collection_names().is_empty());

    let metadata = registry.get_metadata(Some("sales"));
    assert_eq!(metadata[0].name, "quote");
}

#[test_log::test]
fn test_dotfiles_and_foreign_extensions_skipped() {
    let dir = ComponentDir::new();
    dir.greeting(".hidden.json", "hidden", "no");
    dir.greeting("visible.json", "visible", "yes");
    dir.file("README.md", "# not a component");
    dir.file(
        "extensionless",
        "reply = [\"plain\"]\n[metadata]\nname = \"plain\"\n",
    );

    let registry = dir.assemble();
    assert_eq!(names(&registry), vec!["plain", "visible"]);
}

#[test]
fn test_broken_manifest_is_logged_and_skipped() {
    let dir = ComponentDir::new();
    dir.file("broken.json", "{ not json");
    dir.greeting("ok.json", "ok", "fine");

    let (registry, logs) = capture_logs(|| dir.assemble());
    assert_eq!(names(&registry), vec!["ok"]);
    let problems = logs.problems();
    assert_eq!(problems.len(), 1);
    assert!(problems[0].field("path").unwrap().ends_with("broken.json"));
}

#[test]
fn test_missing_directory_yields_invalid_registry() {
    let dir = ComponentDir::new();
    let registry = ComponentRegistry::assemble(
        &ManifestLoader::new(),
        None,
        Path::new("does-not-exist"),
        dir.path(),
    );
    assert!(!registry.is_valid());
    assert!(registry.components().is_empty());
}

#[test]
fn test_configured_extensions_limit_discovery() {
    let dir = ComponentDir::new();
    dir.greeting("a.json", "json_unit", "json");
    dir.file(
        "b.toml",
        "reply = [\"toml\"]\n[metadata]\nname = \"toml_unit\"\n",
    );

    let loader = ManifestLoader::with_extensions(&["toml"]);
    let registry = ComponentRegistry::assemble(&loader, None, dir.path(), dir.path());
    assert_eq!(names(&registry), vec!["toml_unit"]);
}

#[cfg(unix)]
#[test]
fn test_symlinks_followed_one_hop_and_cycles_skipped() {
    let dir = ComponentDir::new();
    dir.greeting("real.json", "real", "real");
    dir.dir("team");
    dir.symlink("../real.json", "team/linked.json");
    dir.symlink("..", "team/loop");
    dir.symlink("real.json", "alias.json");
    dir.symlink("alias.json", "alias_of_alias.json");
    dir.symlink("missing.json", "dangling.json");

    let (registry, logs) = capture_logs(|| dir.assemble());

    // alias.json resolves to the same manifest, so "real" is a duplicate.
    assert_eq!(names(&registry), vec!["real"]);
    let team = registry.get_registry(Some("team")).unwrap();
    assert_eq!(names(team), vec!["real"]);

    let messages: Vec<String> = logs.problems().into_iter().map(|e| e.message).collect();
    assert!(messages.iter().any(|m| m.contains("cycle")));
    assert!(messages.iter().any(|m| m.contains("chain")));
    assert!(messages.iter().any(|m| m.contains("dangling")));
}

#[test]
fn test_merge_recursive_reaches_collections() {
    let base = ComponentDir::new();
    base.greeting("sales/quote.json", "quote", "quote");
    let shared = ComponentDir::new();
    shared.greeting("common.json", "common", "common");

    let shared = shared.assemble();

    let mut flat = base.assemble();
    flat.merge(&shared, false);
    assert_eq!(names(&flat), vec!["common"]);
    assert_eq!(names(flat.get_registry(Some("sales")).unwrap()), vec!["quote"]);

    let mut deep = base.assemble();
    deep.merge(&shared, true);
    assert_eq!(
        names(deep.get_registry(Some("sales")).unwrap()),
        vec!["quote", "common"]
    );
}
