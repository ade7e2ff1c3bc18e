use std::collections::BTreeMap;

use pagesmith_buffers::{BufferStore, InMemoryBufferStore};
use pagesmith_compiler::{
    BundleError, BundleService, Compile, ShadowCompiler, TargetVersion,
};
use pagesmith_project::{NodeId, NodeKind, ProjectStore, ProjectStoreError};
use pagesmith_relay::{InProcessTabs, RelayBroker, TabId};
use pagesmith_session::{
    NodeEdit, PanelSettings, SaveOutcome, Session, SessionError, SessionState, SettingsStore,
    ViewSide,
};
use tempfile::tempdir;

/// Deterministic stand-in for the external transpiler.
struct BannerCompiler;

impl Compile for BannerCompiler {
    fn compile(&self, source: &str, target: TargetVersion) -> String {
        format!("/* {target} */ {source}")
    }
}

struct FixedBundler {
    output: String,
}

impl BundleService for FixedBundler {
    fn bundle(&self, _virtual_files: &BTreeMap<String, String>) -> Result<String, BundleError> {
        Ok(self.output.clone())
    }
}

struct EmptyBundler;

impl BundleService for EmptyBundler {
    fn bundle(&self, _virtual_files: &BTreeMap<String, String>) -> Result<String, BundleError> {
        Err(BundleError::EmptyOutput)
    }
}

fn open_session(store: &ProjectStore) -> Session<BannerCompiler> {
    let record = store.create("demo", "https://example.test").unwrap();
    Session::open(
        record,
        PanelSettings::default(),
        ShadowCompiler::new(BannerCompiler),
        Box::new(InMemoryBufferStore::new()),
    )
}

#[test]
fn open_backfills_companions_and_selects_the_first_file() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let session = open_session(&store);

    // Two sources gain hidden companions; one buffer per file.
    let paths: Vec<String> = session.tree().flatten().into_iter().map(|f| f.path).collect();
    assert_eq!(
        paths,
        vec![
            "src/main.ts",
            "src/main.js",
            "src/exp.ts",
            "src/exp.js",
            "src/styles.css"
        ]
    );
    assert_eq!(session.buffers().list().len(), 5);
    let companion = session.tree().find(&NodeId::from_string("2-js")).unwrap();
    assert!(companion.hidden);

    assert_eq!(session.state(), SessionState::EditingSource(NodeId::from_string("2")));
    assert_eq!(session.active_buffer(), Some("src/main.ts"));
    assert!(!session.is_dirty());
}

#[test]
fn creating_a_source_file_adds_the_hidden_pair_and_both_buffers() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let before = session.buffers().list().len();
    let root = session.tree().root_id();

    let id = session.create_node(&root, NodeKind::TypeScript).unwrap();
    let source = session.tree().find(&id).unwrap();
    assert_eq!(source.name, format!("{id}.ts"));
    let companion = session.tree().find(&id.shadow()).unwrap();
    assert!(companion.hidden);
    assert_eq!(companion.content, "/* esnext */ ");
    assert_eq!(session.buffers().list().len(), before + 2);
    assert!(session.is_dirty());
}

#[test]
fn creating_under_a_missing_parent_leaves_the_tree_alone() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let snapshot = session.tree().clone();

    let err = session
        .create_node(&NodeId::from_string("missing"), NodeKind::Css)
        .unwrap_err();
    assert!(matches!(err, SessionError::Tree(_)));
    assert_eq!(session.tree(), &snapshot);
}

#[test]
fn source_edits_keep_the_companion_consistent_without_touching_the_view() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let main = NodeId::from_string("2");

    session
        .edit(&main, NodeEdit::Content("let x = 1;".into()))
        .unwrap();

    let companion = session.tree().find(&main.shadow()).unwrap();
    assert_eq!(companion.content, "/* esnext */ let x = 1;");
    // The compiled buffer was refreshed even though the source view is active.
    assert_eq!(
        session.buffers().get("src/main.js").unwrap().value(),
        "/* esnext */ let x = 1;"
    );
    assert_eq!(session.active_buffer(), Some("src/main.ts"));
    assert!(session.is_dirty());
}

#[test]
fn style_edits_are_direct_tree_updates() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let styles = NodeId::from_string("4");

    session
        .edit(&styles, NodeEdit::Content("p { color: blue; }".into()))
        .unwrap();
    assert_eq!(
        session.tree().find(&styles).unwrap().content,
        "p { color: blue; }"
    );
    assert_eq!(
        session.buffers().get("src/styles.css").unwrap().value(),
        "p { color: blue; }"
    );
}

#[test]
fn toggling_the_view_rebinds_without_recompiling() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let main = NodeId::from_string("2");
    let compiled_before = session.buffers().get("src/main.js").unwrap().value().to_string();

    session.toggle_view(ViewSide::Compiled).unwrap();
    assert_eq!(session.state(), SessionState::EditingCompiled(main.clone()));
    assert_eq!(session.active_buffer(), Some("src/main.js"));
    assert_eq!(
        session.buffers().get("src/main.js").unwrap().value(),
        compiled_before
    );

    session.toggle_view(ViewSide::Source).unwrap();
    assert_eq!(session.state(), SessionState::EditingSource(main));
    assert_eq!(session.active_buffer(), Some("src/main.ts"));
}

#[test]
fn view_toggle_needs_a_source_selection() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    session.select_node(&NodeId::from_string("4")).unwrap();

    let err = session.toggle_view(ViewSide::Compiled).unwrap_err();
    assert!(matches!(err, SessionError::NotASourceView(_)));
    assert_eq!(session.state(), SessionState::EditingStyle(NodeId::from_string("4")));
}

#[test]
fn renames_re_establish_buffer_identity() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let main = NodeId::from_string("2");

    session.edit(&main, NodeEdit::Name("entry.ts".into())).unwrap();

    let keys = session.buffers().list();
    assert!(keys.contains(&"src/entry.ts".to_string()));
    assert!(!keys.contains(&"src/main.ts".to_string()));
    // The selection follows the node, not the stale path.
    assert_eq!(session.active_buffer(), Some("src/entry.ts"));
}

#[test]
fn duplicate_sibling_names_are_rejected() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let snapshot = session.tree().clone();

    let err = session
        .edit(&NodeId::from_string("4"), NodeEdit::Name("main.ts".into()))
        .unwrap_err();
    assert!(matches!(err, SessionError::Tree(_)));
    assert_eq!(session.tree(), &snapshot);
}

#[test]
fn deleting_a_folder_tears_down_descendants_companions_and_buffers() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let root = session.tree().root_id();

    let folder = session.create_node(&root, NodeKind::Folder).unwrap();
    let nested = session.create_node(&folder, NodeKind::TypeScript).unwrap();
    let nested_path = format!("src/{folder}/{nested}.ts");
    assert!(session.buffers().list().contains(&nested_path));

    session.delete_node(&folder, &root).unwrap();
    assert!(session.tree().find(&nested).is_none());
    assert!(session.tree().find(&nested.shadow()).is_none());
    let keys = session.buffers().list();
    assert!(keys.iter().all(|key| !key.contains(folder.as_str())));
}

#[test]
fn deleting_a_source_removes_its_companion_too() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let root = session.tree().root_id();
    let exp = NodeId::from_string("3");

    session.delete_node(&exp, &root).unwrap();
    assert!(session.tree().find(&exp).is_none());
    assert!(session.tree().find(&exp.shadow()).is_none());
    let keys = session.buffers().list();
    assert!(!keys.contains(&"src/exp.ts".to_string()));
    assert!(!keys.contains(&"src/exp.js".to_string()));
}

#[test]
fn save_validates_before_writing_anything() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);
    let id = session.project_id();

    session.set_name("");
    let err = session.save(&store).unwrap_err();
    match err {
        SessionError::Store(ProjectStoreError::Validation(failure)) => {
            assert_eq!(failure.issues.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Zero writes: the stored name is untouched and the session stays dirty.
    assert_eq!(store.get(id).unwrap().unwrap().name, "demo");
    assert!(session.is_dirty());

    session.set_name("renamed");
    assert_eq!(session.save(&store).unwrap(), SaveOutcome::Saved);
    assert!(!session.is_dirty());
    assert_eq!(store.get(id).unwrap().unwrap().name, "renamed");
    assert_eq!(session.save(&store).unwrap(), SaveOutcome::NoChange);
}

#[test]
fn version_changes_recompile_companions_and_persist_the_setting() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let settings_store = SettingsStore::new(dir.path().join("settings.json"));
    let mut session = open_session(&store);
    let was_dirty = session.is_dirty();

    session
        .change_target_version(TargetVersion::Es5, &settings_store)
        .unwrap();
    let companion = session.tree().find(&NodeId::from_string("2-js")).unwrap();
    assert!(companion.content.starts_with("/* es5 */"));
    assert_eq!(
        session.buffers().get("src/main.js").unwrap().value(),
        companion.content
    );
    // Sources are untouched and the dirty flag is left alone.
    assert_eq!(
        session.tree().find(&NodeId::from_string("2")).unwrap().content,
        "import exp from \"./exp\"; exp();"
    );
    assert_eq!(session.is_dirty(), was_dirty);
    assert_eq!(
        settings_store.load().unwrap().target_version,
        TargetVersion::Es5
    );

    // Applying the same version again changes nothing.
    let snapshot = session.tree().clone();
    session
        .change_target_version(TargetVersion::Es5, &settings_store)
        .unwrap();
    assert_eq!(session.tree(), &snapshot);
}

#[test]
fn bundling_is_gated_and_upserts_the_artifact() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let settings_store = SettingsStore::new(dir.path().join("settings.json"));
    let mut session = open_session(&store);

    assert!(matches!(
        session.bundle(&FixedBundler { output: "bundled;".into() }),
        Err(SessionError::BundleDisabled)
    ));

    session.set_bundle_enabled(true, &settings_store).unwrap();
    let artifact = session
        .bundle(&FixedBundler { output: "bundled;".into() })
        .unwrap();
    let root = &session.tree().root;
    assert_eq!(root.children[0].id, artifact);
    assert_eq!(root.children[0].name, "bundle.js");
    assert!(!root.children[0].hidden);
    assert_eq!(
        session.buffers().get("src/bundle.js").unwrap().value(),
        "bundled;"
    );

    // A second run replaces the artifact in place.
    session
        .bundle(&FixedBundler { output: "bundled v2;".into() })
        .unwrap();
    assert_eq!(session.tree().root.children[0].content, "bundled v2;");
    assert_eq!(
        session.buffers().get("src/bundle.js").unwrap().value(),
        "bundled v2;"
    );

    session.select_node(&artifact).unwrap();
    assert_eq!(session.state(), SessionState::ViewingBundle(artifact));
}

#[test]
fn empty_bundle_output_writes_no_artifact() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let settings_store = SettingsStore::new(dir.path().join("settings.json"));
    let mut session = open_session(&store);
    session.set_bundle_enabled(true, &settings_store).unwrap();
    let snapshot = session.tree().clone();

    let err = session.bundle(&EmptyBundler).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Bundle(BundleError::EmptyOutput)
    ));
    assert_eq!(session.tree(), &snapshot);
}

#[test]
fn injection_compiles_sources_and_relays_styles() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    let mut session = open_session(&store);

    let mut gateway = InProcessTabs::new();
    gateway.open(TabId::new(1));
    gateway.activate(TabId::new(1));
    let mut broker = RelayBroker::new(gateway);
    let connection = broker.connect(TabId::new(1));
    connection.init().unwrap();

    session.inject_script(&connection).unwrap();
    session.select_node(&NodeId::from_string("4")).unwrap();
    session.insert_css(&connection).unwrap();
    broker.pump();

    let agent = broker.gateway().agent(TabId::new(1)).unwrap();
    assert_eq!(
        agent.executed(),
        ["/* esnext */ import exp from \"./exp\"; exp();"]
    );
    assert_eq!(agent.injected_css(), Some("p {color: red;}"));

    session.clear_css(&connection).unwrap();
    broker.pump();
    let agent = broker.gateway().agent(TabId::new(1)).unwrap();
    assert_eq!(agent.injected_css(), None);

    // A style selection refuses script injection.
    let err = session.inject_script(&connection).unwrap_err();
    assert!(matches!(err, SessionError::NotInjectable(_)));
}
