use std::{collections::BTreeSet, fs};

use ingest::store::{ErrorKind, FileOrigin};
use stable_eyre::Result;

use crate::runner;

#[tokio::test]
async fn direct_files_bundle_together() -> Result<()> {
    let src = tempfile::tempdir()?;
    fs::write(src.path().join("a.xml"), b"<a/>")?;
    fs::write(src.path().join("b.xml"), b"<b/>")?;
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "10")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    let draft = &bundles[0].draft;
    assert_eq!(draft.total_files_count, 2);
    assert_eq!(draft.files_info.len(), 2);
    assert!(draft
        .files_info
        .iter()
        .all(|info| info.origin == FileOrigin::Direct));
    assert_eq!(
        draft.source_folder_paths,
        BTreeSet::from([src.path().to_owned()])
    );

    // The bundle shipped to backup; unpacking it yields exactly the inputs.
    let shipped = runner::only_file(&root.path().join("finance/backup/stage"));
    let unpack = tempfile::tempdir()?;
    let copied = unpack.path().join("bundle.zip");
    fs::copy(&shipped, &copied)?;
    archive::extract_in_place(&copied)?;
    assert_eq!(fs::read(unpack.path().join("a.xml"))?, b"<a/>");
    assert_eq!(fs::read(unpack.path().join("b.xml"))?, b"<b/>");

    // The working directory drained completely, as did the source folder.
    assert!(runner::list_names(&root.path().join("finance/temp/stage")).is_empty());
    assert!(runner::list_names(src.path()).is_empty());
    assert!(store.errors().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn nested_extraction_reports_the_first_level_archive() -> Result<()> {
    let src = tempfile::tempdir()?;
    let inner = runner::zip_bytes(&[("x.xml", b"<x/>")]);
    runner::make_zip(
        &src.path().join("outer.zip"),
        &[("inner.zip", inner.as_slice())],
    );
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "10")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    let info = &bundles[0].draft.files_info;
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].file_name, "x.xml");
    assert_eq!(info[0].origin, FileOrigin::Extracted);
    // The first-level archive, not the intermediate one.
    assert_eq!(info[0].original_zip.as_deref(), Some("outer.zip"));
    assert_eq!(info[0].original_folder_path.as_deref(), Some(src.path()));
    Ok(())
}

#[tokio::test]
async fn duplicate_files_quarantine_the_newcomer() -> Result<()> {
    let first = tempfile::tempdir()?;
    let second = tempfile::tempdir()?;
    fs::write(first.path().join("a.xml"), b"<first/>")?;
    fs::write(second.path().join("a.xml"), b"<second/>")?;
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "10")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(
            &runner::data_source(),
            &[
                runner::folder(1, "stage", first.path()),
                runner::folder(2, "stage", second.path()),
            ],
        )
        .await?;

    // The first mover won the name and got bundled.
    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].draft.files_info.len(), 1);
    assert_eq!(bundles[0].draft.files_info[0].file_name, "a.xml");

    // The newcomer was suffixed and quarantined, one row per offender.
    let errors = store.errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].draft.kind, ErrorKind::DuplicateFile);
    assert_eq!(errors[0].draft.file_name, "a(1).xml");
    assert_eq!(errors[0].draft.folder_path.as_deref(), Some(second.path()));
    assert_eq!(errors[0].draft.original_archive_file_name, None);
    assert!(!errors[0].solved);

    assert_eq!(
        runner::list_names(&root.path().join("finance/error/files/stage")),
        ["a(1).xml"]
    );
    Ok(())
}

#[tokio::test]
async fn non_xml_survivors_are_wrong_file_type() -> Result<()> {
    let src = tempfile::tempdir()?;
    runner::make_zip(
        &src.path().join("arc.zip"),
        &[("readme.txt", b"read me".as_slice()), ("doc.xml", b"<doc/>")],
    );
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "10")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].draft.files_info.len(), 1);
    assert_eq!(bundles[0].draft.files_info[0].file_name, "doc.xml");

    let errors = store.errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].draft.kind, ErrorKind::WrongFileType);
    assert_eq!(errors[0].draft.file_name, "readme.txt");
    assert_eq!(
        errors[0].draft.original_archive_file_name.as_deref(),
        Some("arc.zip")
    );
    assert_eq!(errors[0].draft.folder_path.as_deref(), Some(src.path()));

    assert_eq!(
        runner::list_names(&root.path().join("finance/error/files/stage")),
        ["readme.txt"]
    );
    Ok(())
}

#[tokio::test]
async fn identically_named_files_from_two_archives_collide() -> Result<()> {
    let first = tempfile::tempdir()?;
    let second = tempfile::tempdir()?;
    runner::make_zip(&first.path().join("arc1.zip"), &[("a.xml", b"<one/>".as_slice())]);
    runner::make_zip(&second.path().join("arc2.zip"), &[("a.xml", b"<two/>".as_slice())]);
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "10")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(
            &runner::data_source(),
            &[
                runner::folder(1, "stage", first.path()),
                runner::folder(2, "stage", second.path()),
            ],
        )
        .await?;

    // One copy wins the name and bundles; the other is suffixed and
    // quarantined, attributed to the archive it was extracted from.
    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].draft.files_info.len(), 1);
    assert_eq!(bundles[0].draft.files_info[0].file_name, "a.xml");

    let errors = store.errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].draft.kind, ErrorKind::DuplicateFile);
    assert_eq!(errors[0].draft.file_name, "a(1).xml");
    // Which archive loses depends on the directory listing order; either way
    // the row names a first-level archive.
    let zip = errors[0].draft.original_archive_file_name.as_deref();
    assert!(
        zip == Some("arc1.zip") || zip == Some("arc2.zip"),
        "unexpected archive attribution: {zip:?}"
    );
    Ok(())
}

#[tokio::test]
async fn corrupt_archives_are_extraction_errors() -> Result<()> {
    let src = tempfile::tempdir()?;
    fs::write(src.path().join("bad.tar"), b"this is not a tar archive")?;
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    assert!(store.bundles().await.is_empty());

    let errors = store.errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].draft.kind, ErrorKind::ExtractionError);
    assert_eq!(errors[0].draft.file_name, "bad.tar");
    assert_eq!(errors[0].draft.folder_path.as_deref(), Some(src.path()));
    assert_eq!(errors[0].draft.original_archive_file_name, None);

    assert_eq!(
        runner::list_names(&root.path().join("finance/error/files/stage")),
        ["bad.tar"]
    );
    assert!(runner::list_names(&root.path().join("finance/temp/stage")).is_empty());
    Ok(())
}

#[tokio::test]
async fn pathological_nesting_terminates_at_the_sweep_cap() -> Result<()> {
    // An archive containing itself by reference cannot be written to disk,
    // but a chain nested deeper than the sweep cap behaves the same way:
    // every round of the sweep yields exactly one more archive to expand,
    // so the sweep can never drain the working directory on its own.
    let src = tempfile::tempdir()?;
    let mut inner = runner::zip_bytes(&[("x.xml", b"<x/>".as_slice())]);
    for level in 0..110 {
        let name = format!("level{level:03}.zip");
        inner = runner::zip_bytes(&[(name.as_str(), inner.as_slice())]);
    }
    fs::write(src.path().join("chain.zip"), &inner)?;
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    // The sweep gave up at its cap and said so in the run log.
    let log = fs::read_to_string(runner::only_file(&root.path().join("finance/log")))?;
    assert!(
        log.contains("sweep cap (100) reached"),
        "missing sweep cap line in run log:\n{log}"
    );

    // The archive still pending at the cap was classified out, so the pass
    // completed with an empty working directory and nothing bundled.
    assert!(store.bundles().await.is_empty());
    let errors = store.errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].draft.kind, ErrorKind::WrongFileType);
    assert!(
        errors[0].draft.file_name.starts_with("level")
            && errors[0].draft.file_name.ends_with(".zip"),
        "unexpected leftover: {}",
        errors[0].draft.file_name
    );
    assert!(runner::list_names(&root.path().join("finance/temp/stage")).is_empty());
    Ok(())
}

#[tokio::test]
async fn bundles_split_at_the_byte_cap() -> Result<()> {
    // Three 600 KB files against a 1 MB cap: 600 + 600 KB overflows, so every
    // file lands alone.
    let src = tempfile::tempdir()?;
    for name in ["one.xml", "two.xml", "three.xml"] {
        fs::write(src.path().join(name), vec![b'x'; 600 * 1024])?;
    }
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "1")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 3);
    assert!(bundles
        .iter()
        .all(|bundle| bundle.draft.total_files_count == 1));
    assert_eq!(
        runner::list_names(&root.path().join("finance/backup/stage")).len(),
        3
    );
    Ok(())
}

#[tokio::test]
async fn files_exactly_filling_the_cap_share_a_bundle() -> Result<()> {
    // 400 KB + 624 KB is exactly 1 MB; the comparison is strictly
    // greater-than, so both fit together.
    let src = tempfile::tempdir()?;
    fs::write(src.path().join("a.xml"), vec![b'x'; 400 * 1024])?;
    fs::write(src.path().join("b.xml"), vec![b'x'; 624 * 1024])?;
    let root = tempfile::tempdir()?;

    let store = runner::seeded_store(&[("MAX_ZIP_SIZE", "1")]);
    let pipeline = runner::pipeline(store.clone(), root.path());
    pipeline
        .run(&runner::data_source(), &[runner::folder(1, "stage", src.path())])
        .await?;

    let bundles = store.bundles().await;
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].draft.total_files_count, 2);
    Ok(())
}
