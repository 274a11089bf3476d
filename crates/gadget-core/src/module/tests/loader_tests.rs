use std::fs;
use std::path::PathBuf;

use super::super::{GadgetModule, ModuleLoader, SearchPaths};
use crate::error::ModuleError;
use crate::manager::GadgetManager;
use crate::request::Request;
use crate::types::{DisplayOption, GadgetId, GadgetMode, IndicatorPolicy, Layout};

struct NullModule;

impl GadgetModule for NullModule {
    fn options(&self) -> DisplayOption {
        DisplayOption {
            indicator: IndicatorPolicy::Disable,
            overlap: false,
        }
    }

    fn on_create(
        &mut self,
        _man: &mut GadgetManager,
        _id: GadgetId,
        _mode: GadgetMode,
        _request: &Request,
    ) -> Option<Layout> {
        Some(Layout::new(()))
    }
}

#[test]
fn candidates_follow_probe_order() {
    let search = SearchPaths::with_roots([PathBuf::from("/a"), PathBuf::from("/b")]);
    let file = SearchPaths::file_name("picker");
    assert_eq!(
        search.candidates("picker"),
        vec![PathBuf::from("/a").join(&file), PathBuf::from("/b").join(&file)]
    );
}

#[test]
fn standard_paths_prefer_package_private_dirs() {
    let search = SearchPaths::standard(Some("org.example.phone"));
    let candidates = search.candidates("contacts");
    assert!(candidates[0].to_string_lossy().contains("org.example.phone"));
    assert!(candidates
        .iter()
        .any(|p| p.starts_with("/usr/ug/lib")));
    // no package identity, no package dirs
    assert!(SearchPaths::standard(None)
        .candidates("contacts")
        .iter()
        .all(|p| !p.to_string_lossy().contains("apps")));
}

#[test]
fn resolve_picks_first_existing_candidate() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let search = SearchPaths::with_roots([first.path().to_path_buf(), second.path().to_path_buf()]);
    let file = SearchPaths::file_name("picker");

    assert_eq!(search.resolve("picker"), None);

    fs::write(second.path().join(&file), b"").unwrap();
    assert_eq!(search.resolve("picker"), Some(second.path().join(&file)));

    fs::write(first.path().join(&file), b"").unwrap();
    assert_eq!(search.resolve("picker"), Some(first.path().join(&file)));
}

#[test]
fn builtin_modules_resolve_without_filesystem() {
    let mut loader = ModuleLoader::new(SearchPaths::with_roots(Vec::new()));
    assert!(!loader.exists("picker"));

    loader.register_builtin("picker", || Box::new(NullModule));
    assert!(loader.exists("picker"));

    let module = loader.load("picker").expect("builtin should load");
    assert_eq!(module.name(), "picker");
    assert_eq!(module.address(), None);
    assert_eq!(module.options().indicator, IndicatorPolicy::Disable);
}

#[test]
fn missing_module_reports_not_found() {
    let loader = ModuleLoader::new(SearchPaths::with_roots(Vec::new()));
    match loader.load("nowhere") {
        Err(ModuleError::NotFound { name }) => assert_eq!(name, "nowhere"),
        Err(other) => panic!("expected NotFound, got {other:?}"),
        Ok(_) => panic!("expected NotFound, got a module"),
    }
}

#[test]
fn garbage_library_reports_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let file = SearchPaths::file_name("broken");
    fs::write(dir.path().join(&file), b"not a shared object").unwrap();

    let loader = ModuleLoader::new(SearchPaths::with_roots([dir.path().to_path_buf()]));
    assert!(loader.exists("broken"));
    match loader.load("broken") {
        Err(ModuleError::LoadFailure { path, .. }) => {
            assert_eq!(path, dir.path().join(&file));
        }
        Err(other) => panic!("expected LoadFailure, got {other:?}"),
        Ok(_) => panic!("expected LoadFailure, got a module"),
    }
}
