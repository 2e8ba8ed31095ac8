//! Shared test helpers: state builders, a stub conversion engine, and
//! small document/archive fixtures.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;

use bindery::db::{self, DbPool};
use bindery::services::{ArtifactStore, ConversionEngine};
use bindery::{AppState, Error, Result};

/// A conversion engine that writes a tiny one-page PDF instead of invoking
/// an office suite. Records the conversion order and can be told to refuse
/// files whose name contains a marker.
pub struct StubEngine {
    fail_matching: Option<String>,
    pub converted: Arc<Mutex<Vec<String>>>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            fail_matching: None,
            converted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Refuse any document whose filename contains `marker`.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_matching: Some(marker.to_string()),
            converted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn converted_names(&self) -> Vec<String> {
        self.converted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(marker) = &self.fail_matching {
            if name.contains(marker.as_str()) {
                return Err(Error::ConversionFailed(format!("stub refused {}", name)));
            }
        }

        self.converted.lock().unwrap().push(name.clone());
        write_test_pdf(output, &name);
        Ok(())
    }
}

/// Write a one-page PDF that mentions `label`.
pub fn write_test_pdf(path: &Path, label: &str) {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let safe_label: String = label.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let content = format!("BT /F1 11 Tf 50 742 Td ({}) Tj ET", safe_label);
    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content.into_bytes(),
    )));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1_u32,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Build a ZIP archive from (name, bytes) entries.
pub fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

/// Test harness: file-backed database and artifact root in one temp dir,
/// wired to the given engine.
pub struct TestHarness {
    pub state: AppState,
    pub dir: TempDir,
}

impl TestHarness {
    pub async fn with_engine(engine: Arc<dyn ConversionEngine>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = build_state(dir.path(), engine).await;
        Self { state, dir }
    }

    pub async fn new() -> Self {
        Self::with_engine(Arc::new(StubEngine::new())).await
    }

    /// Rebuild the state on the same paths, simulating a process restart.
    pub async fn restart(&mut self) {
        let engine = self.state.engine.clone();
        self.state = build_state(self.dir.path(), engine).await;
    }
}

async fn build_state(root: &Path, engine: Arc<dyn ConversionEngine>) -> AppState {
    let db_path = root.join("test.db");
    let pool: DbPool = db::init_pool(db_path.to_str().unwrap()).await.unwrap();
    db::initialize_schema(&pool).await.unwrap();

    let store = Arc::new(ArtifactStore::new(root.join("outputs")));
    AppState::from_parts(pool, engine, store)
}
