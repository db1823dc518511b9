use std::sync::Arc;

use quire_core::{
    ContentChange, FileTextLoader, HelperDescriptor, HelperKind, HostProject, LanguageVersion,
    Position, ProjectConfiguration, ProjectKey, Range, SemanticFacts, SourceText, TextSource,
};
use quire_workspace::{ListenerTier, ProjectChangeKind, ProjectSnapshotManager};

use super::support::{
    document_path, host_document, host_project, manager_with_projects, project_key,
    CountingLoader, Recorder,
};

fn facts(name: &str) -> SemanticFacts {
    SemanticFacts::new(vec![HelperDescriptor::new(
        HelperKind::Component,
        name,
        format!("App.{name}"),
        "App",
    )])
}

#[test]
fn adding_the_same_document_twice_is_a_no_op() {
    let manager = manager_with_projects(&["App"]);
    let recorder = Recorder::default();
    recorder.attach(&manager, ListenerTier::Normal);
    let key = project_key("App");

    for _ in 0..2 {
        manager
            .update(|updater| {
                updater.add_document(
                    &key,
                    host_document("App", "Pages/Index.cshtml"),
                    CountingLoader::new("").source(),
                )
            })
            .unwrap();
    }

    assert_eq!(recorder.kinds(), vec![ProjectChangeKind::DocumentAdded]);
    let document = manager
        .document(&key, document_path("App", "Pages/Index.cshtml"))
        .unwrap();
    assert_eq!(document.version(), 1);
}

#[test]
fn every_text_change_bumps_the_document_version() {
    let manager = manager_with_projects(&["App"]);
    let key = project_key("App");
    let path = document_path("App", "Pages/Counter.razor");
    let version = || manager.document(&key, &path).map(|document| document.version());

    manager
        .update(|updater| {
            updater.add_document(
                &key,
                host_document("App", "Pages/Counter.razor"),
                CountingLoader::new("<p>disk</p>").source(),
            )
        })
        .unwrap();
    assert_eq!(version(), Some(1));

    manager
        .update(|updater| updater.open_document(&key, &path, SourceText::new("<p>0</p>")))
        .unwrap();
    assert_eq!(version(), Some(2));
    assert!(manager.is_document_open(&path));

    let edit = Range::new(Position::new(0, 3), Position::new(0, 4));
    manager
        .update(|updater| {
            updater.apply_document_changes(&key, &path, &[ContentChange::replace(edit, "1")])
        })
        .unwrap();
    assert_eq!(version(), Some(3));

    manager
        .update(|updater| updater.update_document_text(&key, &path, SourceText::new("<p>2</p>")))
        .unwrap();
    assert_eq!(version(), Some(4));
    assert_eq!(
        manager.document(&key, &path).unwrap().text().unwrap().as_str(),
        "<p>2</p>"
    );

    manager
        .update(|updater| {
            updater.close_document(&key, &path, CountingLoader::new("<p>disk</p>").source())
        })
        .unwrap();
    assert_eq!(version(), Some(5));
    assert!(!manager.is_document_open(&path));

    // Closing again is ignored.
    manager
        .update(|updater| updater.close_document(&key, &path, TextSource::empty()))
        .unwrap();
    assert_eq!(version(), Some(5));

    // Re-adding restarts numbering.
    manager
        .update(|updater| {
            updater.remove_document(&key, &path);
            updater.add_document(
                &key,
                host_document("App", "Pages/Counter.razor"),
                TextSource::empty(),
            );
        })
        .unwrap();
    assert_eq!(version(), Some(1));
}

#[test]
fn unknown_projects_and_documents_are_ignored() {
    let manager = manager_with_projects(&["App"]);
    let recorder = Recorder::default();
    recorder.attach(&manager, ListenerTier::Priority);
    let revision = manager.revision();
    let missing = project_key("Missing");
    let key = project_key("App");

    manager
        .update(|updater| {
            updater.remove_project(&missing);
            updater.update_project_configuration(&missing, ProjectConfiguration::default());
            updater.update_semantic_facts(&missing, Some(facts("Counter")));
            updater.add_document(
                &missing,
                host_document("Missing", "Index.cshtml"),
                TextSource::empty(),
            );
            updater.remove_document(&key, document_path("App", "Nope.cshtml"));
            updater.open_document(&key, document_path("App", "Nope.cshtml"), "x".into());
            updater.apply_document_changes(
                &key,
                document_path("App", "Nope.cshtml"),
                &[ContentChange::full("y")],
            );
        })
        .unwrap();

    assert!(recorder.events().is_empty());
    assert_eq!(manager.revision(), revision);
    assert_eq!(manager.project(&key).unwrap().version(), 1);
}

#[test]
fn document_churn_keeps_cached_facts_and_engine() {
    let manager = manager_with_projects(&["App"]);
    let key = project_key("App");
    manager
        .update(|updater| updater.update_semantic_facts(&key, Some(facts("Counter"))))
        .unwrap();

    let before = manager.project(&key).unwrap();
    let engine_before = before.engine();
    assert!(before.is_engine_built());

    manager
        .update(|updater| {
            updater.add_document(&key, host_document("App", "A.razor"), TextSource::empty())
        })
        .unwrap();
    manager
        .update(|updater| updater.remove_document(&key, document_path("App", "A.razor")))
        .unwrap();

    let after = manager.project(&key).unwrap();
    assert!(!after.ptr_eq(&before));
    assert_eq!(after.version(), before.version() + 2);
    assert!(Arc::ptr_eq(
        before.semantic_facts().unwrap(),
        after.semantic_facts().unwrap()
    ));
    assert!(after.is_engine_built());
    assert!(Arc::ptr_eq(&engine_before, &after.engine()));
}

#[test]
fn facts_updates_keep_the_engine_but_configuration_updates_rebuild_it() {
    let manager = manager_with_projects(&["App"]);
    let key = project_key("App");
    let engine = manager.project(&key).unwrap().engine();

    manager
        .update(|updater| updater.update_semantic_facts(&key, Some(facts("Counter"))))
        .unwrap();
    let project = manager.project(&key).unwrap();
    assert!(Arc::ptr_eq(&engine, &project.engine()));
    let facts_before = Arc::clone(project.semantic_facts().unwrap());

    // Same configuration: still a fresh engine.
    let configuration = project.configuration().clone();
    manager
        .update(|updater| updater.update_project_configuration(&key, configuration))
        .unwrap();
    let project = manager.project(&key).unwrap();
    assert!(!project.is_engine_built());
    let rebuilt = project.engine();
    assert!(!Arc::ptr_eq(&engine, &rebuilt));
    assert!(Arc::ptr_eq(&facts_before, project.semantic_facts().unwrap()));

    // The rebuilt engine sees the cached facts.
    let cached = project.semantic_facts().unwrap();
    assert!(rebuilt.resolve_helper(cached, "Counter").is_some());

    let legacy = ProjectConfiguration::new(LanguageVersion::VERSION_2_0, "MVC-2.1", Vec::new());
    manager
        .update(|updater| updater.update_project_configuration(&key, legacy.clone()))
        .unwrap();
    let project = manager.project(&key).unwrap();
    assert_eq!(project.configuration(), &legacy);
    assert_eq!(project.engine().configuration(), &legacy);
}

#[test]
fn helpers_follow_facts_published_after_the_engine_was_built() {
    let manager = manager_with_projects(&["App"]);
    let key = project_key("App");
    let project = manager.project(&key).unwrap();
    let engine = project.engine();
    assert!(project.helper("Counter").is_none());

    manager
        .update(|updater| updater.update_semantic_facts(&key, Some(facts("Counter"))))
        .unwrap();
    let project = manager.project(&key).unwrap();
    assert!(Arc::ptr_eq(&engine, &project.engine()));
    assert_eq!(project.helper("Counter").unwrap().name, "Counter");

    manager
        .update(|updater| updater.update_semantic_facts(&key, Some(facts("Toggle"))))
        .unwrap();
    let project = manager.project(&key).unwrap();
    assert!(project.helper("Counter").is_none());
    assert!(project.helper("Toggle").is_some());
}

#[test]
fn solution_closing_tags_events_and_never_runs_loaders() {
    let manager = manager_with_projects(&["App"]);
    let recorder = Recorder::default();
    recorder.attach(&manager, ListenerTier::Normal);
    let key = project_key("App");
    let loader = CountingLoader::new("<p>from disk</p>");

    manager.update(|updater| updater.solution_closed()).unwrap();
    manager
        .update(|updater| {
            updater.add_document(&key, host_document("App", "Index.cshtml"), loader.source())
        })
        .unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ProjectChangeKind::DocumentAdded);
    assert!(events[0].solution_is_closing);

    let document = manager
        .document(&key, document_path("App", "Index.cshtml"))
        .unwrap();
    assert_eq!(document.text().unwrap().as_str(), "");
    assert_eq!(loader.calls(), 0);

    manager.update(|updater| updater.solution_opened()).unwrap();
    manager
        .update(|updater| {
            updater.add_document(&key, host_document("App", "About.cshtml"), loader.source())
        })
        .unwrap();
    assert!(!recorder.events()[1].solution_is_closing);
}

#[test]
fn rename_is_a_remove_followed_by_an_add() {
    let manager = manager_with_projects(&["Old"]);
    let recorder = Recorder::default();
    recorder.attach(&manager, ListenerTier::Normal);

    let old = manager.project(&project_key("Old")).unwrap();
    let mut renamed = host_project("New");
    renamed.configuration = old.configuration().clone();

    manager
        .update(|updater| {
            updater.remove_project(old.key());
            updater.add_project(renamed);
        })
        .unwrap();

    assert_eq!(
        recorder.kinds(),
        vec![ProjectChangeKind::ProjectRemoved, ProjectChangeKind::ProjectAdded]
    );
    let events = recorder.events();
    assert!(events[0].newer.is_none());
    assert!(events[1].older.is_none());

    let new = manager.project(&project_key("New")).unwrap();
    assert_eq!(new.configuration(), old.configuration());
    assert_ne!(new.file_path(), old.file_path());
    assert!(manager.project(old.key()).is_none());
}

#[test]
fn loaders_run_once_per_text_state() {
    let manager = manager_with_projects(&["App"]);
    let key = project_key("App");
    let path = document_path("App", "Index.cshtml");
    let loader = CountingLoader::new("<h1>Hello</h1>");

    manager
        .update(|updater| {
            updater.add_document(&key, host_document("App", "Index.cshtml"), loader.source())
        })
        .unwrap();
    let document = manager.document(&key, &path).unwrap();
    assert!(!document.is_text_loaded());
    assert_eq!(loader.calls(), 0);

    assert_eq!(document.text().unwrap().as_str(), "<h1>Hello</h1>");
    assert_eq!(document.text().unwrap().as_str(), "<h1>Hello</h1>");

    // Unrelated mutations share the memoized text.
    manager
        .update(|updater| updater.update_semantic_facts(&key, Some(facts("Counter"))))
        .unwrap();
    let later = manager.document(&key, &path).unwrap();
    assert!(later.is_text_loaded());
    later.text().unwrap();
    assert_eq!(loader.calls(), 1);
}

#[test]
fn file_loader_reads_through_the_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("Index.cshtml");
    std::fs::write(&file, "@page\n<h1>Index</h1>\n").unwrap();

    let manager = manager_with_projects(&["App"]);
    let key = project_key("App");
    manager
        .update(|updater| {
            updater.add_document(
                &key,
                quire_core::HostDocument::new(&file, "Index.cshtml"),
                TextSource::loader(FileTextLoader::new(&file)),
            )
        })
        .unwrap();

    let text = manager.document(&key, &file).unwrap().text().unwrap();
    assert_eq!(text.line_count(), 3);
}

#[test]
fn open_documents_are_tracked_across_projects() {
    let manager = manager_with_projects(&["App", "Lib"]);
    let shared = document_path("Shared", "_Imports.razor");

    manager
        .update(|updater| {
            for name in ["App", "Lib"] {
                updater.add_document(
                    &project_key(name),
                    quire_core::HostDocument::new(&shared, "_Imports.razor"),
                    TextSource::empty(),
                );
            }
            updater.open_document(&project_key("Lib"), &shared, "@using App".into());
        })
        .unwrap();

    assert_eq!(manager.documents_for_path(&shared).len(), 2);
    assert!(manager.is_document_open(&shared));
    assert_eq!(manager.open_documents(), vec![shared.clone()]);
    assert!(!manager
        .document(&project_key("App"), &shared)
        .unwrap()
        .is_open());
    assert_eq!(
        manager
            .document(&project_key("App"), &shared)
            .unwrap()
            .file_kind(),
        quire_core::FileKind::ComponentImport
    );
}

#[test]
fn concurrent_writers_are_serialized() {
    let manager = manager_with_projects(&["App"]);
    let key = project_key("App");
    let revision = manager.revision();

    std::thread::scope(|scope| {
        for writer in 0..8 {
            let manager = manager.clone();
            let key = key.clone();
            scope.spawn(move || {
                for index in 0..25 {
                    manager
                        .update(|updater| {
                            updater.add_document(
                                &key,
                                host_document("App", &format!("Pages/W{writer}_{index}.cshtml")),
                                TextSource::empty(),
                            )
                        })
                        .unwrap();
                }
            });
        }
    });

    let project = manager.project(&key).unwrap();
    assert_eq!(project.document_count(), 200);
    assert_eq!(project.version(), 201);
    assert_eq!(manager.revision(), revision + 200);
}

#[test]
fn default_manager_starts_empty() {
    let manager = ProjectSnapshotManager::default();
    assert!(manager.projects().is_empty());
    assert_eq!(manager.revision(), 0);
    assert!(!manager.solution_is_closing());
    assert!(manager
        .find_project_by_intermediate_output_path("/repo/App/obj")
        .is_none());

    manager
        .update(|updater| updater.add_project(host_project("App")))
        .unwrap();
    let project = manager
        .find_project_by_intermediate_output_path("/repo/App/./obj")
        .unwrap();
    assert_eq!(project.display_name(), "App");
    assert_eq!(project.root_namespace(), Some("App"));
}

#[test]
fn output_path_lookup_tracks_adds_and_removals() {
    let manager = manager_with_projects(&["App", "Lib"]);
    let shared = HostProject::new(
        ProjectKey::new("App.Multi"),
        "/repo/App/App.Multi.csproj",
        "/repo/App/obj",
        ProjectConfiguration::default(),
        None,
    );
    manager
        .update(|updater| updater.add_project(shared.clone()))
        .unwrap();

    let found = |path: &str| {
        manager
            .find_project_by_intermediate_output_path(path)
            .map(|project| project.key().clone())
    };
    assert_eq!(found("/repo/Lib/./obj"), Some(project_key("Lib")));
    assert_eq!(found("/repo/App/obj"), Some(project_key("App")));

    // The remaining project at a shared path takes over.
    manager
        .update(|updater| updater.remove_project(&project_key("App")))
        .unwrap();
    assert_eq!(found("/repo/App/obj"), Some(shared.key.clone()));

    manager
        .update(|updater| updater.remove_project(&shared.key))
        .unwrap();
    assert_eq!(found("/repo/App/obj"), None);
    assert_eq!(found("/repo/Lib/obj"), Some(project_key("Lib")));
}
