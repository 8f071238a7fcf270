use std::path::Path;

use docrag::{
    ArtifactPaths,
    ReconcileOptions,
    embedding::HashingEmbedder,
    mapping::ChunkMapping,
    reconcile,
    retrieval::{NO_DOCUMENTS_INDEXED, search_context},
    retrieve,
    vector_index::FlatIndex,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn lines(prefix: &str, n: usize) -> String {
    (1..=n)
        .map(|i| format!("{prefix} line {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn index_dir(docs: &Path, paths: &ArtifactPaths) -> docrag::Result<usize> {
    let report = reconcile(
        docs,
        paths,
        &mut HashingEmbedder::new(),
        &ReconcileOptions::default(),
    )?;
    Ok(report.total_chunks)
}

#[test]
fn index_then_query_returns_matching_chunk() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let docs = tmp.path().join("code_docs");
    std::fs::create_dir(&docs)?;
    std::fs::write(
        docs.join("parser.py"),
        "def parse(tokens):\n    return Tree(tokens)",
    )?;
    std::fs::write(
        docs.join("server.py"),
        "def serve(port):\n    listen(port)",
    )?;
    let paths = ArtifactPaths::in_dir(&tmp.path().join("data"));

    assert_eq!(index_dir(&docs, &paths)?, 2);

    let context = retrieve(
        "def serve(port):\n    listen(port)",
        &paths.index,
        &paths.mapping,
        1,
        &mut HashingEmbedder::new(),
    );
    assert_eq!(context, "def serve(port):\n    listen(port)");
    Ok(())
}

#[test]
fn exact_chunk_query_is_top_hit_at_zero_distance() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs)?;
    std::fs::write(docs.join("a.txt"), lines("alpha", 45))?;
    let paths = ArtifactPaths::in_dir(tmp.path());
    index_dir(&docs, &paths)?;

    let index = FlatIndex::read(&paths.index)?;
    let mapping = ChunkMapping::read(&paths.mapping)?;
    let target = mapping.get(1).ok_or("missing chunk")?.to_string();

    let mut embedder = HashingEmbedder::new();
    let query = docrag::Embedder::embed_query(&mut embedder, &target)?;
    let hits = index.search(&query, 3);
    assert_eq!(hits[0].position, 1);
    assert_eq!(hits[0].distance, 0.0);

    let context = search_context(&target, &index, &mapping, &mut embedder, 1);
    assert_eq!(context, target);
    Ok(())
}

#[test]
fn deleting_a_file_shrinks_the_index() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs)?;
    std::fs::write(docs.join("keep.md"), lines("keep", 30))?;
    std::fs::write(docs.join("drop.md"), lines("drop", 60))?;
    let paths = ArtifactPaths::in_dir(tmp.path());

    assert_eq!(index_dir(&docs, &paths)?, 2 + 3);

    std::fs::remove_file(docs.join("drop.md"))?;
    assert_eq!(index_dir(&docs, &paths)?, 2);

    let mapping = ChunkMapping::read(&paths.mapping)?;
    assert_eq!(mapping.len(), FlatIndex::read(&paths.index)?.len());
    assert!(mapping.as_slice().iter().all(|c| c.starts_with("keep")));
    Ok(())
}

#[test]
fn query_before_indexing_reports_no_documents() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let context = retrieve(
        "anything at all",
        &tmp.path().join("vectors.idx"),
        &tmp.path().join("mapping.json"),
        5,
        &mut HashingEmbedder::new(),
    );
    assert_eq!(context, NO_DOCUMENTS_INDEXED);
    Ok(())
}

#[test]
fn reindexing_unchanged_directory_keeps_artifacts_identical() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs)?;
    std::fs::write(docs.join("a.rs"), lines("fn", 25))?;
    std::fs::write(docs.join("b.md"), "# Title\n\nbody")?;
    let paths = ArtifactPaths::in_dir(&tmp.path().join("data"));

    index_dir(&docs, &paths)?;
    let read_all = || -> std::io::Result<Vec<Vec<u8>>> {
        [&paths.index, &paths.mapping, &paths.metadata, &paths.cache]
            .iter()
            .map(std::fs::read)
            .collect()
    };
    let before = read_all()?;

    index_dir(&docs, &paths)?;
    assert_eq!(read_all()?, before);
    Ok(())
}
