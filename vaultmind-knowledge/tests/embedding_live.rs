#![cfg(feature = "live-tests")]

use vaultmind_knowledge::{EmbeddingClient, EngineSettings, IndexHandle, Note, PageRequest};

#[tokio::test]
async fn test_ollama_embedding_live() {
    let settings = EngineSettings::default();
    let client = EmbeddingClient::new(&settings);
    let inputs = vec!["hello world".to_string(), "vault graph search".to_string()];

    let embeddings = client.embed_batch(&inputs).await.expect("embedding request");
    assert_eq!(embeddings.len(), inputs.len());
    let dim = embeddings[0].len();
    assert!(dim > 0);
    assert!(embeddings.iter().all(|vec| vec.len() == dim));
}

#[tokio::test]
async fn test_hybrid_search_live() {
    let settings = EngineSettings::default();
    let client = EmbeddingClient::new(&settings);
    let notes = vec![
        Note::new("rust.md", "Rust").with_body("Ownership and borrowing in systems programming."),
        Note::new("garden.md", "Garden").with_body("Tomatoes, basil and summer watering."),
    ];

    let handle = IndexHandle::build(notes, settings)
        .await
        .expect("build")
        .refresh_embeddings(&client)
        .await
        .expect("embed notes");
    assert!(handle.stale_embeddings().is_empty());

    let query = client
        .embed_batch(&["growing vegetables".to_string()])
        .await
        .expect("embed query");
    let page = handle
        .hybrid_search("", Some(&query[0]), PageRequest::new(1, 0))
        .await
        .expect("hybrid search")
        .page;
    assert_eq!(page.items[0].path, "garden.md");
}
