use std::path::Path;

use tempfile::TempDir;

use vaultmind_knowledge::{EngineSettings, IndexHandle, Note, PageRequest, VaultIndex, load_vault};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vaultmind_knowledge=debug,warn")
        .with_test_writer()
        .try_init();
}

async fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, content).await.unwrap();
}

async fn sample_vault() -> TempDir {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    write(
        root,
        "people/Alex Johnson.md",
        "---\ntitle: Alex Johnson\naliases: [AJ]\ntags: [person]\nrole: engineer\nteam: \"[[Platform]]\"\n---\nWorks with [[Sam]] on [[Platform]].\nAlex Johnson reviews code.\n",
    )
    .await;
    write(
        root,
        "people/Sam.md",
        "---\nrole: engineer\ntags: [person]\n---\nSam pairs with [[Alex Johnson]].\nOwner: [[Platform]]\n",
    )
    .await;
    write(
        root,
        "projects/Platform.md",
        "---\nstatus: active\n---\nThe platform team. Contact Alex Johnson, immediately.\n",
    )
    .await;
    write(root, "daily/2024-01-01.md", "Met [[Sam]].\n").await;
    write(root, "daily/2024-01-02.md", "Met [[Sam]] again.\n").await;
    write(root, "Orphan.md", "Nothing links here.\n").await;
    write(root, "broken.md", "---\ntitle: never closed\n").await;
    write(root, ".obsidian/cache.md", "ignored").await;
    temp
}

async fn sample_handle() -> (TempDir, IndexHandle) {
    init_tracing();
    let temp = sample_vault().await;
    let settings = EngineSettings {
        vault_root: Some(temp.path().to_path_buf()),
        ..Default::default()
    };
    let load = load_vault(temp.path(), &settings).await.expect("load vault");
    assert_eq!(load.failures.len(), 1);
    let handle = IndexHandle::build(load.notes, settings).await.expect("build");
    (temp, handle)
}

#[tokio::test]
async fn test_graph_queries_over_loaded_vault() {
    let (_temp, handle) = sample_handle().await;
    assert_eq!(handle.index().len(), 6);

    let backlinks = handle.backlinks("people/Sam.md", PageRequest::default());
    assert!(backlinks.exists);
    let sources: Vec<&str> = backlinks.page.items.iter().map(|b| b.source.as_str()).collect();
    assert_eq!(
        sources,
        vec!["daily/2024-01-01.md", "daily/2024-01-02.md", "people/Alex Johnson.md"]
    );

    for note in handle.index().notes() {
        let path = handle.shortest_path(&note.path, &note.path, None);
        assert!(path.exists);
        assert_eq!(path.length, Some(0));
    }

    let route = handle.shortest_path("daily/2024-01-01.md", "Platform", None);
    assert_eq!(route.length, Some(2));
    assert_eq!(
        route.path,
        vec!["daily/2024-01-01.md", "people/Sam.md", "projects/Platform.md"]
    );
    assert!(!handle.shortest_path("daily/2024-01-01.md", "Platform", Some(1)).exists);

    let hubs = handle.hubs(2, PageRequest::default());
    let paths: Vec<&str> = hubs.items.iter().map(|d| d.path.as_str()).collect();
    insta::assert_debug_snapshot!(paths, @r#"
    [
        "people/Sam.md",
        "people/Alex Johnson.md",
        "projects/Platform.md",
    ]
    "#);
}

#[tokio::test]
async fn test_connection_strength_is_symmetric() {
    let (_temp, handle) = sample_handle().await;

    let forward = handle.connection_strength("Alex Johnson", "Sam");
    let backward = handle.connection_strength("Sam", "AJ");
    assert_eq!(forward, backward);
    assert_eq!(forward.factors.direct_links, 2);
    assert_eq!(forward.factors.shared_tags, 1);
    assert_eq!(forward.factors.shared_neighbors, 1);
    assert!((forward.score - 8.5).abs() < 1e-9);

    let disconnected = handle.connection_strength("Orphan.md", "projects/Platform.md");
    assert!(disconnected.exists);
    assert_eq!(disconnected.score, 0.0);

    assert!(!handle.connection_strength("Orphan.md", "nope").exists);
}

#[tokio::test]
async fn test_mentions_and_link_suggestions() {
    let (_temp, handle) = sample_handle().await;

    let mentions = handle.find_mentions("Contact Alex Johnson, immediately.");
    assert_eq!(mentions.len(), 1);
    assert_eq!((mentions[0].start, mentions[0].end), (8, 20));
    assert_eq!(mentions[0].entity, "people/Alex Johnson.md");

    let suggestions = handle.suggest_links("projects/Platform.md", PageRequest::default());
    assert!(suggestions.exists);
    let targets: Vec<&str> = suggestions.page.items.iter().map(|s| s.target.as_str()).collect();
    assert_eq!(targets, vec!["people/Alex Johnson.md"]);
}

#[tokio::test]
async fn test_schema_and_bridge() {
    let (_temp, handle) = sample_handle().await;

    let schema = handle.infer_schema(Some("people"));
    let role = schema.field("role").expect("role field");
    assert!(role.is_required);
    assert_eq!(role.common_values.as_ref().map(|v| v[0].value.as_str()), Some("engineer"));

    let daily = handle.infer_schema(Some("daily"));
    assert_eq!(daily.naming_pattern.map(|p| p.template), Some("YYYY-MM-DD".to_string()));

    let report = handle.validate_cross_layer("people/Sam.md");
    assert_eq!(report.prose_only, vec!["projects/Platform.md"]);

    let empty = handle.validate_cross_layer("Orphan.md");
    assert!(empty.exists);
    assert!(empty.consistent.is_empty() && empty.frontmatter_only.is_empty() && empty.prose_only.is_empty());

    let suggestions = handle.suggest_frontmatter("people/Sam.md", PageRequest::default());
    assert_eq!(suggestions.page.items[0].key, "owner");
}

#[tokio::test]
async fn test_lexical_search_and_rebuild() {
    let (temp, handle) = sample_handle().await;

    let page = handle
        .lexical_search("platform", PageRequest::default())
        .await
        .expect("search");
    assert_eq!(page.total_count, 3);
    assert_eq!(page.items[0].path, "projects/Platform.md");

    write(temp.path(), "Orphan.md", "Now about the platform.\n").await;
    let load = load_vault(temp.path(), handle.settings()).await.expect("reload");
    let rebuilt = handle.rebuild(load.notes).await.expect("rebuild");
    assert_eq!(rebuilt.generation(), handle.generation() + 1);

    let after = rebuilt
        .lexical_search("platform", PageRequest::default())
        .await
        .expect("search");
    assert_eq!(after.total_count, 4);

    let before = handle
        .lexical_search("platform", PageRequest::default())
        .await
        .expect("search");
    assert_eq!(before.total_count, 3);
}

#[tokio::test]
async fn test_concurrent_readers_share_snapshot() {
    let (_temp, handle) = sample_handle().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let hits = handle
                .hybrid_search("sam OR platform", None, PageRequest::new(10, 0))
                .await
                .expect("hybrid search");
            let orphans = handle.orphans(None, PageRequest::default());
            (hits.page.total_count, hits.total_matches, orphans.total_count)
        }));
    }

    let mut answers = Vec::new();
    for task in tasks {
        answers.push(task.await.expect("join"));
    }
    assert!(answers.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_rebuild_from_same_notes_is_idempotent() {
    init_tracing();
    let temp = sample_vault().await;
    let settings = EngineSettings::default();
    let first = VaultIndex::build(load_vault(temp.path(), &settings).await.unwrap().notes);
    let second = VaultIndex::build(load_vault(temp.path(), &settings).await.unwrap().notes);
    assert_eq!(first.entities(), second.entities());
    assert_eq!(first.backlinks(), second.backlinks());
    assert_eq!(first.tags(), second.tags());
}

#[tokio::test]
async fn test_hybrid_total_counts_matches_beyond_candidate_cap() {
    init_tracing();
    let notes: Vec<Note> = (0..60)
        .map(|idx| Note::new(format!("bulk/{idx:02}.md"), format!("Bulk {idx}")).with_body("alpha beta"))
        .collect();
    let handle = IndexHandle::build(notes, EngineSettings::default()).await.expect("build");

    let keyword = handle
        .lexical_search("alpha", PageRequest::default())
        .await
        .expect("lexical");
    assert_eq!(keyword.total_count, 60);

    let fused = handle
        .hybrid_search("alpha", None, PageRequest::default())
        .await
        .expect("hybrid");
    assert_eq!(fused.page.total_count, handle.settings().search.bm25_limit);
    assert_eq!(fused.total_matches, 60);
    assert!(fused.truncated);
}
