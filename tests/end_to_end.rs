//! End-to-end submissions through the real backend and ZIP writer.
//!
//! Source images are generated in memory, transcoded to AVIF, packaged, and
//! the resulting archive is read back and re-imported.

use image::{DynamicImage, ImageFormat, RgbImage};
use lineup_kit::catalog::{Catalog, DirCatalog, MemoryCatalog};
use lineup_kit::draft::CandidateFile;
use lineup_kit::imaging::{ImageBackend, RustBackend};
use lineup_kit::import::import_archive;
use lineup_kit::package::{ZipPackageWriter, read_package};
use lineup_kit::types::{Method, Post, Side, Utility};
use lineup_kit::workflow::{AuthoringSession, Collaborators, SessionMode, SessionSettings, SessionState};
use std::io::Cursor;

fn synthetic(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), format)
        .unwrap();
    out
}

fn settings(max_dimension: u32) -> SessionSettings {
    let mut settings = SessionSettings::default();
    settings.transcode.max_dimension = max_dimension;
    settings
}

fn nuke_post() -> Post {
    Post {
        id: "de_nuke-Ab12Cd34".into(),
        map_id: "de_nuke".into(),
        title: "Outside Smoke".into(),
        images: vec!["de_nuke/outside.png".into()],
        tags: vec!["CT".into(), "B".into(), "SMOKE".into()],
        method: vec!["THROW".into(), "JUMP".into()],
        tip: None,
    }
}

#[test]
fn edit_post_produces_bounded_avif_archive() {
    let catalog = MemoryCatalog::new()
        .with_map("de_nuke")
        .with_post(nuke_post())
        .with_image("de_nuke/outside.png", synthetic(128, 64, ImageFormat::Png));
    let backend = RustBackend::new();
    let writer = ZipPackageWriter::new();
    let services = Collaborators {
        backend: &backend,
        catalog: &catalog,
        writer: &writer,
    };

    let post = catalog.find_post("de_nuke-Ab12Cd34").unwrap().clone();
    let (session, notices) = AuthoringSession::edit(services, settings(64), &post);
    assert!(notices.is_empty());
    session
        .edit_draft(|draft| {
            draft.add_images(vec![CandidateFile::from_name(
                "ramp.jpg",
                synthetic(40, 80, ImageFormat::Jpeg),
            )])
        })
        .unwrap();

    let outcome = session.submit().unwrap();
    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(outcome.file_name, "cs2-post-outside-smoke.zip");
    assert_eq!(outcome.manifest.id, "de_nuke-Ab12Cd34");
    assert_eq!(outcome.manifest.tags, ["CT", "B", "SMOKE"]);
    assert_eq!(outcome.manifest.method, ["JUMP", "THROW"]);
    assert!(outcome.warnings.is_empty());

    let entries = read_package(&outcome.package).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        ["post.json", "images/image_1.avif", "images/image_2.avif"]
    );

    let first = backend.identify(&entries[1].bytes).unwrap();
    assert_eq!(first.as_tuple(), (64, 32));
    // Already inside the bound: size unchanged, still re-encoded.
    let second = backend.identify(&entries[2].bytes).unwrap();
    assert_eq!(second.as_tuple(), (40, 80));

    let manifest: serde_json::Value = serde_json::from_slice(&entries[0].bytes).unwrap();
    assert_eq!(manifest["mapId"], "de_nuke");
    assert_eq!(manifest["imageCount"], 2);
}

#[test]
fn exported_archive_reimports_into_new_session() {
    let catalog = MemoryCatalog::new().with_map("de_mirage");
    let backend = RustBackend::new();
    let writer = ZipPackageWriter::new();
    let services = Collaborators {
        backend: &backend,
        catalog: &catalog,
        writer: &writer,
    };

    let session = AuthoringSession::create(services, settings(32));
    session
        .edit_draft(|draft| {
            draft.set_title("Window Flash");
            draft.set_map(Some("de_mirage".into()));
            draft.set_methods([Method::Run, Method::Crouch]);
            draft.set_side(Some(Side::T));
            draft.set_site(Some("mid".parse().unwrap()));
            draft.set_utility(Some(Utility::Flash));
            draft.add_images(vec![
                CandidateFile::from_name("a.png", synthetic(48, 48, ImageFormat::Png)),
                CandidateFile::from_name("b.png", synthetic(16, 24, ImageFormat::Png)),
            ])
        })
        .unwrap();
    let outcome = session.submit().unwrap();
    assert!(outcome.manifest.id.starts_with("de_mirage-"));

    let imported = import_archive(&outcome.package, &SessionSettings::default().layout).unwrap();
    assert_eq!(imported.id.as_deref(), Some(outcome.manifest.id.as_str()));
    assert_eq!(imported.fields.title, "Window Flash");
    assert_eq!(imported.fields.method_labels(), ["CROUCH", "RUN"]);
    assert_eq!(imported.fields.tags.flatten(), ["T", "MID", "FLASH"]);
    let names: Vec<_> = imported.images.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["image_1.avif", "image_2.avif"]);

    let (again, _, notices) = AuthoringSession::import(services, settings(32), imported);
    assert!(notices.is_empty());
    assert_eq!(
        again.mode(),
        &SessionMode::Edit {
            id: outcome.manifest.id.clone()
        }
    );
    let second = again.submit().unwrap();
    assert_eq!(second.manifest.id, outcome.manifest.id);
    assert_eq!(second.manifest.images, ["image_1.avif", "image_2.avif"]);
}

#[test]
fn directory_catalog_feeds_a_submission() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("posts")).unwrap();
    std::fs::create_dir_all(root.join("assets/maps")).unwrap();
    std::fs::create_dir_all(root.join("assets/posts/de_nuke")).unwrap();
    std::fs::write(root.join("assets/maps/de_nuke.png"), b"map").unwrap();
    std::fs::write(
        root.join("assets/posts/de_nuke/outside.png"),
        synthetic(20, 10, ImageFormat::Png),
    )
    .unwrap();
    std::fs::write(
        root.join("posts/de_nuke.json"),
        serde_json::to_string(&vec![nuke_post()]).unwrap(),
    )
    .unwrap();

    let catalog = DirCatalog::open(root).unwrap();
    assert_eq!(catalog.list_maps()[0].label, "Nuke");

    let backend = RustBackend::new();
    let writer = ZipPackageWriter::new();
    let services = Collaborators {
        backend: &backend,
        catalog: &catalog,
        writer: &writer,
    };
    let post = catalog.list_posts()[0].clone();
    let (session, _) = AuthoringSession::edit(services, SessionSettings::default(), &post);
    let outcome = session.submit().unwrap();

    let entries = read_package(&outcome.package).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(backend.identify(&entries[1].bytes).unwrap().as_tuple(), (20, 10));
}
