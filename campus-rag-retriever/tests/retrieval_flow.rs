//! End-to-end behaviour of the retrieval index over real files and a SQLite file store.

mod common;

use anyhow::Result;
use campus_rag_retriever::RetrieverError;
use campus_rag_retriever::retrieval::rag_index::{IndexConfig, RetrievalIndex, SearchOptions};
use campus_rag_retriever::retrieval::registry::{registry_size, shared_index};
use common::{HashEmbedder, campus_corpus, long_corpus, write_doc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

struct Fixture {
    _temp: TempDir,
    docs: PathBuf,
    db: PathBuf,
}

fn fixture(populate: impl FnOnce(&Path)) -> Fixture {
    let temp = tempdir().expect("tempdir");
    let docs = temp.path().join("docs");
    std::fs::create_dir(&docs).expect("docs dir");
    populate(&docs);
    let db = temp.path().join("data").join("rag.sqlite");
    Fixture {
        _temp: temp,
        docs,
        db,
    }
}

async fn open(fixture: &Fixture, embedder: Arc<HashEmbedder>) -> Result<RetrievalIndex> {
    Ok(RetrievalIndex::open(IndexConfig::new(&fixture.docs, &fixture.db), embedder).await?)
}

fn keys(hits: &[campus_rag_retriever::retrieval::rag_index::SearchHit]) -> HashSet<(String, usize)> {
    hits.iter()
        .map(|h| (h.source.clone(), h.chunk_index))
        .collect()
}

#[tokio::test]
async fn test_campus_scenario() -> Result<()> {
    let fx = fixture(campus_corpus);
    let embedder = Arc::new(HashEmbedder::new("hash-64"));
    let index = open(&fx, embedder.clone()).await?;

    assert!(!index.status().await?.ready);

    let report = index.reindex().await?;
    assert!(report.ok);
    assert_eq!(report.documents, vec!["A.md", "B.md"]);
    assert_eq!(report.embedding_model, "hash-64");
    assert_eq!(report.per_document[0].source, "A.md");
    assert_eq!(report.per_document[1].source, "B.md");
    assert_eq!(
        report.chunks,
        report.per_document.iter().map(|d| d.chunks).sum::<usize>()
    );

    let hits = index
        .search("教务处 办公时间", &SearchOptions::default().with_min_score(0.0))
        .await?;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].source, "A.md");
    assert!(hits[0].text.contains("教务处"));
    assert!(hits.iter().all(|h| h.source == "A.md" && h.keyword_hits >= 1));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let hits = index.search("量子力学", &SearchOptions::default()).await?;
    assert!(hits.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_single_document_scenario() -> Result<()> {
    let fx = fixture(|dir| {
        write_doc(
            dir,
            "A.md",
            "上海大学教务处办公时间为周一至周五 9:00-17:00。\n\n请假流程需联系辅导员。",
        )
    });
    let index = open(&fx, Arc::new(HashEmbedder::new("hash-64"))).await?;

    let report = index.reindex().await?;
    assert_eq!(report.documents, vec!["A.md"]);
    assert!(report.chunks >= 1);

    let options = SearchOptions::default()
        .with_min_score(0.0)
        .with_min_keyword_hits(1);
    let hits = index.search("教务处 办公时间", &options).await?;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].source, "A.md");
    assert!(hits[0].text.contains("教务处"));

    assert!(index.search("量子力学", &SearchOptions::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_index_survives_restart_without_embedding() -> Result<()> {
    let fx = fixture(long_corpus);
    let first = open(&fx, Arc::new(HashEmbedder::new("hash-64"))).await?;
    let report = first.reindex().await?;
    assert!(report.chunks > 3);

    let status = first.status().await?;
    assert!(status.ready);
    assert_eq!(status.in_memory_chunk_count, report.chunks);
    assert_eq!(status.cached_fingerprint.as_deref(), Some(status.current_fingerprint.as_str()));
    assert_eq!(status.cached_model.as_deref(), Some("hash-64"));
    drop(first);

    let embedder = Arc::new(HashEmbedder::new("hash-64"));
    let reopened = open(&fx, embedder.clone()).await?;
    let status = reopened.status().await?;
    assert!(status.ready);
    assert_eq!(status.in_memory_chunk_count, report.chunks);
    assert_eq!(status.documents_count, 3);
    assert_eq!(embedder.calls(), 0);

    // Still ready on repeated checks.
    assert!(reopened.ensure_loaded().await?);
    assert!(reopened.status().await?.ready);
    Ok(())
}

#[tokio::test]
async fn test_document_change_makes_index_stale() -> Result<()> {
    let fx = fixture(campus_corpus);
    let embedder = Arc::new(HashEmbedder::new("hash-64"));
    let index = open(&fx, embedder.clone()).await?;
    index.reindex().await?;
    assert!(index.status().await?.ready);

    write_doc(&fx.docs, "A.md", "# 教务处\n\n办公地点已搬迁至新行政楼二楼，请提前预约。");

    let status = index.status().await?;
    assert!(!status.ready);
    assert_eq!(status.in_memory_chunk_count, 0);
    assert_ne!(status.cached_fingerprint.as_deref(), Some(status.current_fingerprint.as_str()));

    let calls_before = embedder.calls();
    let hits = index
        .search("教务处", &SearchOptions::default().with_min_score(0.0))
        .await?;
    assert!(hits.is_empty());
    assert_eq!(embedder.calls(), calls_before);

    index.reindex().await?;
    let hits = index
        .search("教务处 办公", &SearchOptions::default().with_min_score(0.0))
        .await?;
    assert!(hits.iter().any(|h| h.text.contains("新行政楼")));
    Ok(())
}

#[tokio::test]
async fn test_added_and_removed_documents_make_index_stale() -> Result<()> {
    let fx = fixture(campus_corpus);
    let index = open(&fx, Arc::new(HashEmbedder::new("hash-64"))).await?;
    index.reindex().await?;

    write_doc(&fx.docs, "C.md", "# 宿舍\n\n宿舍门禁时间为 23:00。");
    assert!(!index.status().await?.ready);
    index.reindex().await?;
    assert!(index.status().await?.ready);

    std::fs::remove_file(fx.docs.join("C.md"))?;
    assert!(!index.status().await?.ready);

    // Files the corpus ignores do not affect freshness.
    index.reindex().await?;
    write_doc(&fx.docs, "notes.txt", "scratch");
    write_doc(&fx.docs, ".draft.md", "hidden");
    assert!(index.status().await?.ready);
    Ok(())
}

#[tokio::test]
async fn test_model_change_makes_index_stale() -> Result<()> {
    let fx = fixture(campus_corpus);
    open(&fx, Arc::new(HashEmbedder::new("hash-64")))
        .await?
        .reindex()
        .await?;

    let other = Arc::new(HashEmbedder::new("other-model"));
    let index = open(&fx, other.clone()).await?;
    let status = index.status().await?;
    assert!(!status.ready);
    assert_eq!(status.cached_model.as_deref(), Some("hash-64"));
    assert_eq!(status.embedding_model, "other-model");

    assert!(index.search("教务处", &SearchOptions::default()).await?.is_empty());
    assert_eq!(other.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_reindex_is_stale_until_next_success() -> Result<()> {
    let fx = fixture(long_corpus);
    open(&fx, Arc::new(HashEmbedder::new("hash-64")))
        .await?
        .reindex()
        .await?;

    let flaky = Arc::new(HashEmbedder::failing_after("hash-64", 2));
    let index = open(&fx, flaky.clone()).await?;
    assert!(index.status().await?.ready);

    let err = index.reindex().await.unwrap_err();
    assert!(matches!(err, RetrieverError::Embedding(_)));
    assert_eq!(flaky.calls(), 3);

    let status = index.status().await?;
    assert!(!status.ready);
    assert_eq!(status.cached_fingerprint, None);
    assert_eq!(index.stored_chunks(None).await?.len(), 2);
    assert!(index.search("选课", &SearchOptions::default()).await?.is_empty());

    // A fresh process with a healthy embedder repairs the index.
    let healthy = open(&fx, Arc::new(HashEmbedder::new("hash-64"))).await?;
    assert!(!healthy.status().await?.ready);
    healthy.reindex().await?;
    assert!(healthy.status().await?.ready);
    Ok(())
}

#[tokio::test]
async fn test_unindexed_corpus_searches_without_embedding() -> Result<()> {
    let fx = fixture(campus_corpus);
    let embedder = Arc::new(HashEmbedder::new("hash-64"));
    let index = open(&fx, embedder.clone()).await?;

    let hits = index.search("教务处 办公时间", &SearchOptions::default()).await?;
    assert!(hits.is_empty());
    assert_eq!(embedder.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_corpus_is_ready_after_reindex() -> Result<()> {
    let fx = fixture(|_| {});
    let embedder = Arc::new(HashEmbedder::new("hash-64"));
    let index = open(&fx, embedder.clone()).await?;

    let report = index.reindex().await?;
    assert!(report.documents.is_empty());
    assert_eq!(report.chunks, 0);

    let status = index.status().await?;
    assert!(status.ready);
    assert_eq!(status.in_memory_chunk_count, 0);
    assert!(index.search("anything", &SearchOptions::default()).await?.is_empty());
    assert_eq!(embedder.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_docs_dir_is_configuration_error() -> Result<()> {
    let temp = tempdir()?;
    let config = IndexConfig::new(temp.path().join("nope"), temp.path().join("rag.sqlite"));
    let err = RetrievalIndex::open(config, Arc::new(HashEmbedder::new("m")))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrieverError::Configuration { .. }));
    Ok(())
}

#[tokio::test]
async fn test_filters_are_monotonic() -> Result<()> {
    let fx = fixture(|dir| {
        campus_corpus(dir);
        long_corpus(dir);
    });
    let index = open(&fx, Arc::new(HashEmbedder::new("hash-64"))).await?;
    index.reindex().await?;

    let query = "教务处 选课 请假 说明";
    let wide = SearchOptions::default()
        .with_top_k(1000)
        .with_preselect(Some(1000))
        .with_min_keyword_hits(0);

    let mut previous: Option<HashSet<(String, usize)>> = None;
    for min_score in [0.0, 0.2, 0.4, 0.6, 0.8] {
        let hits = index
            .search(query, &wide.clone().with_min_score(min_score))
            .await?;
        assert!(hits.iter().all(|h| h.score >= min_score));
        let current = keys(&hits);
        if let Some(prev) = &previous {
            assert!(current.is_subset(prev), "raising min_score added results");
        }
        previous = Some(current);
    }

    let mut previous: Option<HashSet<(String, usize)>> = None;
    for min_hits in [0, 1, 2, 3] {
        let hits = index
            .search(query, &wide.clone().with_min_keyword_hits(min_hits))
            .await?;
        assert!(hits.iter().all(|h| h.keyword_hits >= min_hits));
        let current = keys(&hits);
        if let Some(prev) = &previous {
            assert!(current.is_subset(prev), "raising min_keyword_hits added results");
        }
        previous = Some(current);
    }

    let top = index
        .search(query, &wide.clone().with_min_score(0.0).with_top_k(2))
        .await?;
    assert_eq!(top.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_embedding_preserves_chunk_order() -> Result<()> {
    let sequential = fixture(long_corpus);
    let seq_index = open(&sequential, Arc::new(HashEmbedder::new("hash-64").with_jitter())).await?;
    seq_index.reindex().await?;

    let parallel = fixture(long_corpus);
    let config = IndexConfig::new(&parallel.docs, &parallel.db).with_embed_concurrency(4);
    let par_index =
        RetrievalIndex::open(config, Arc::new(HashEmbedder::new("hash-64").with_jitter())).await?;
    par_index.reindex().await?;

    let expected = seq_index.stored_chunks(None).await?;
    let actual = par_index.stored_chunks(None).await?;
    assert_eq!(expected, actual);
    for chunk in &actual {
        assert_eq!(chunk.embedding, HashEmbedder::vector(&chunk.text));
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrent_searches_share_index() -> Result<()> {
    let fx = fixture(campus_corpus);
    let index = Arc::new(open(&fx, Arc::new(HashEmbedder::new("hash-64"))).await?);
    index.reindex().await?;

    let options = SearchOptions::default().with_min_score(0.0);
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let index = index.clone();
            let options = options.clone();
            tokio::spawn(async move { index.search("教务处 办公时间", &options).await })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await??);
    }
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert!(!results[0].is_empty());
    Ok(())
}

#[tokio::test]
async fn test_spawned_reindexes_are_serialized() -> Result<()> {
    let fx = fixture(long_corpus);
    let embedder = Arc::new(HashEmbedder::new("hash-64").with_jitter());
    let config = IndexConfig::new(&fx.docs, &fx.db).with_embed_concurrency(3);
    let index = Arc::new(RetrievalIndex::open(config, embedder.clone()).await?);

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let index = index.clone();
            tokio::spawn(async move { index.reindex().await })
        })
        .collect();
    let mut reports = Vec::new();
    for task in tasks {
        reports.push(task.await??);
    }
    assert_eq!(reports[0].chunks, reports[1].chunks);
    assert_eq!(embedder.calls(), reports[0].chunks * 2);

    let status = index.status().await?;
    assert!(status.ready);
    assert_eq!(status.in_memory_chunk_count, reports[0].chunks);

    let stored = index.stored_chunks(None).await?;
    assert_eq!(stored.len(), reports[0].chunks);
    for doc in &reports[0].per_document {
        let indices: Vec<usize> = stored
            .iter()
            .filter(|c| c.source == doc.source)
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(indices, (0..doc.chunks).collect::<Vec<_>>());
    }
    Ok(())
}

#[tokio::test]
async fn test_readers_never_observe_partial_index() -> Result<()> {
    let fx = fixture(long_corpus);
    let index = Arc::new(
        open(&fx, Arc::new(HashEmbedder::new("hash-64").with_jitter())).await?,
    );
    let full = index.reindex().await?.chunks;
    let options = SearchOptions::default().with_min_score(0.0);
    let baseline = index.search("选课 说明", &options).await?;

    let rebuild = {
        let index = index.clone();
        tokio::spawn(async move { index.reindex().await })
    };
    let readers: Vec<_> = (0..6)
        .map(|i| {
            let index = index.clone();
            let options = options.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(i * 5)).await;
                let status = index.status().await?;
                let hits = index.search("选课 说明", &options).await?;
                Ok::<_, RetrieverError>((status, hits))
            })
        })
        .collect();

    for reader in readers {
        let (status, hits) = reader.await??;
        assert!(status.ready);
        assert_eq!(status.in_memory_chunk_count, full);
        assert_eq!(hits, baseline);
    }
    assert_eq!(rebuild.await??.chunks, full);
    Ok(())
}

#[tokio::test]
async fn test_stored_chunks_filter_by_source() -> Result<()> {
    let fx = fixture(campus_corpus);
    let index = open(&fx, Arc::new(HashEmbedder::new("hash-64"))).await?;
    index.reindex().await?;

    let only_b = index.stored_chunks(Some("B.md")).await?;
    assert!(!only_b.is_empty());
    assert!(only_b.iter().all(|c| c.source == "B.md"));
    assert!(only_b.iter().enumerate().all(|(i, c)| c.chunk_index == i));
    assert!(index.stored_chunks(Some("missing.md")).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_registry_shares_one_index_per_location() -> Result<()> {
    let fx = fixture(campus_corpus);
    let config = IndexConfig::new(&fx.docs, &fx.db);

    let first = shared_index(config.clone(), Arc::new(HashEmbedder::new("hash-64"))).await?;
    let second = shared_index(config, Arc::new(HashEmbedder::new("hash-64"))).await?;
    assert!(Arc::ptr_eq(&first, &second));

    let other_db = fx.db.with_file_name("other.sqlite");
    let third = shared_index(
        IndexConfig::new(&fx.docs, &other_db),
        Arc::new(HashEmbedder::new("hash-64")),
    )
    .await?;
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(registry_size().await >= 2);

    first.reindex().await?;
    assert!(second.status().await?.ready);
    assert!(!third.status().await?.ready);
    Ok(())
}
