use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use ingest::{
    config::Retention,
    lake::Devnull,
    pipeline::Pipeline,
    scheduler::Scheduler,
    store::{
        BundleDraft, DataSource, ErrorDraft, FolderPath, Memory, Seed, Store,
    },
};
use stable_eyre::Result;

use crate::runner;

#[tokio::test]
async fn empty_worlds_produce_nothing() -> Result<()> {
    let root = tempfile::tempdir()?;
    let store = runner::seeded_store(&[]);
    let pipeline = runner::pipeline(store.clone(), root.path());

    // Zero folders.
    pipeline.run(&runner::data_source(), &[]).await?;

    // One folder with zero files.
    let empty = tempfile::tempdir()?;
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", empty.path())])
        .await?;

    assert!(store.bundles().await.is_empty());
    assert!(store.errors().await.is_empty());
    assert!(runner::list_names(&root.path().join("finance/temp/stage")).is_empty());
    Ok(())
}

#[tokio::test]
async fn directory_only_archives_drain_away() -> Result<()> {
    let src = tempfile::tempdir()?;
    runner::make_zip(
        &src.path().join("dirs.zip"),
        &[("one/", b"".as_slice()), ("one/two/", b"".as_slice())],
    );
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    assert!(store.bundles().await.is_empty());
    assert!(store.errors().await.is_empty());
    assert!(runner::list_names(&root.path().join("finance/temp/stage")).is_empty());
    Ok(())
}

#[tokio::test]
async fn uppercase_xml_survives_classification() -> Result<()> {
    let src = tempfile::tempdir()?;
    fs::write(src.path().join("UPPER.XML"), b"<upper/>")?;
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].draft.files_info[0].file_name, "UPPER.XML");
    assert!(store.errors().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn drained_directories_flatten_into_the_pass() -> Result<()> {
    let src = tempfile::tempdir()?;
    let nested = src.path().join("batch/deeper");
    fs::create_dir_all(&nested)?;
    fs::write(nested.join("c.xml"), b"<c/>")?;
    runner::make_zip(&src.path().join("batch").join("inner.zip"), &[("d.xml", b"<d/>".as_slice())]);
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "10")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    let draft = &bundles[0].draft;

    // Both files were bundled; the archive-descended one carries lineage, the
    // plain directory file is an untracked intermediate.
    assert_eq!(draft.total_files_count, 2);
    assert_eq!(draft.files_info.len(), 1);
    assert_eq!(draft.files_info[0].file_name, "d.xml");
    assert_eq!(draft.files_info[0].original_zip.as_deref(), Some("inner.zip"));

    assert!(runner::list_names(&root.path().join("finance/temp/stage")).is_empty());
    Ok(())
}

#[tokio::test]
async fn a_second_run_over_the_same_world_is_a_no_op() -> Result<()> {
    let src = tempfile::tempdir()?;
    fs::write(src.path().join("a.xml"), b"<a/>")?;
    fs::write(src.path().join("readme.txt"), b"read me")?;
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    let source = runner::data_source();
    let folders = [runner::folder(1, "stage", src.path())];

    pipeline.run(&source, &folders).await?;
    let bundles_after_first = store.bundles().await.len();
    let errors_after_first = store.errors().await.len();
    assert_eq!(bundles_after_first, 1);
    assert_eq!(errors_after_first, 1);

    // No new files arrived; the second run finds nothing to do.
    pipeline.run(&source, &folders).await?;
    assert_eq!(store.bundles().await.len(), bundles_after_first);
    assert_eq!(store.errors().await.len(), errors_after_first);
    assert!(runner::list_names(&root.path().join("finance/temp/stage")).is_empty());
    Ok(())
}

/// Delegates to a [`Memory`] store but stalls and counts data-source loads,
/// making tick overlap observable.
struct SlowStore {
    inner: Memory,
    delay: Duration,
    loads: AtomicUsize,
}

#[async_trait]
impl Store for SlowStore {
    async fn active_data_sources(&self) -> Result<Vec<DataSource>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.active_data_sources().await
    }

    async fn active_folder_paths(&self, data_source_id: i64) -> Result<Vec<FolderPath>> {
        self.inner.active_folder_paths(data_source_id).await
    }

    async fn setting(&self, name: &str) -> Result<Option<String>> {
        self.inner.setting(name).await
    }

    async fn insert_error(&self, draft: ErrorDraft) -> Result<u64> {
        self.inner.insert_error(draft).await
    }

    async fn insert_bundle(&self, draft: BundleDraft) -> Result<u64> {
        self.inner.insert_bundle(draft).await
    }

    async fn update_backup_path(&self, final_archive_name: &str, path: &Path) -> Result<()> {
        self.inner.update_backup_path(final_archive_name, path).await
    }

    async fn update_uploaded(&self, final_archive_name: &str, uploaded: bool) -> Result<()> {
        self.inner.update_uploaded(final_archive_name, uploaded).await
    }
}

#[tokio::test]
async fn overlapping_ticks_are_dropped() -> Result<()> {
    let root = tempfile::tempdir()?;
    let store = Arc::new(SlowStore {
        inner: Memory::seeded(Seed {
            data_sources: vec![runner::data_source()],
            folder_paths: Vec::new(),
            settings: Vec::new(),
        }),
        delay: Duration::from_millis(250),
        loads: AtomicUsize::new(0),
    });

    let pipeline = Arc::new(
        Pipeline::builder()
            .store(Arc::clone(&store))
            .lake(Arc::new(Devnull::new()))
            .processing_root(root.path())
            .flush_pause(Duration::ZERO)
            .build(),
    );
    let scheduler = Scheduler::new(
        pipeline,
        Arc::clone(&store),
        root.path().to_owned(),
        Retention::new(2, 6),
        Duration::from_secs(60),
    );

    // The first tick holds the single-flight gate through its stalled load;
    // the overlapping tick must return without doing any work.
    tokio::join!(scheduler.ingestion_tick(), scheduler.ingestion_tick());

    assert_eq!(store.loads.load(Ordering::SeqCst), 1);
    Ok(())
}
