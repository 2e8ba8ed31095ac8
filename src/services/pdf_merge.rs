//! PDF assembly: merge per-document PDFs into one file.
//!
//! Rebuilds a single page tree from the input documents' pages, renumbering
//! object IDs so they cannot collide. Outlines are dropped; everything else
//! (fonts, images, content streams) is carried over untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};

use crate::{Error, Result};

/// Merge `inputs` into a single PDF at `output`. Returns the page count of
/// the merged document. Inputs that no longer exist are skipped, matching
/// the conversion pipeline's per-file failure policy.
pub fn merge_pdf_files(inputs: &[PathBuf], output: &Path) -> Result<usize> {
    let mut documents = Vec::new();
    for path in inputs {
        if !path.exists() {
            tracing::warn!(file = %path.display(), "merge input missing, skipping");
            continue;
        }
        let doc = Document::load(path).map_err(|e| {
            Error::ConversionFailed(format!("unreadable PDF {}: {}", path.display(), e))
        })?;
        documents.push(doc);
    }

    if documents.is_empty() {
        return Err(Error::ConversionFailed("no PDFs to merge".into()));
    }

    // Renumber every document into one ID space, collecting page objects
    // separately so the page tree can be rebuilt.
    let mut max_id = 1;
    let mut pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for object_id in doc.get_pages().into_values() {
            if let Ok(object) = doc.get_object(object_id) {
                pages.insert(object_id, object.to_owned());
            }
        }
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut page_tree: Option<(ObjectId, lopdf::Dictionary)> = None;

    for (object_id, object) in objects {
        match object_type(&object) {
            Some(b"Catalog") => {
                let id = catalog.as_ref().map(|(id, _)| *id).unwrap_or(object_id);
                catalog = Some((id, object));
            }
            Some(b"Pages") => {
                if let Ok(dict) = object.as_dict() {
                    let mut dict = dict.clone();
                    if let Some((_, ref existing)) = page_tree {
                        dict.extend(existing);
                    }
                    let id = page_tree.as_ref().map(|(id, _)| *id).unwrap_or(object_id);
                    page_tree = Some((id, dict));
                }
            }
            // Page objects are re-inserted below with the rebuilt parent
            Some(b"Page") => {}
            // Merging outline trees is not worth the bookkeeping
            Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (pages_id, pages_dict) =
        page_tree.ok_or_else(|| Error::ConversionFailed("merged PDF has no page tree".into()))?;
    let (catalog_id, catalog_object) =
        catalog.ok_or_else(|| Error::ConversionFailed("merged PDF has no catalog".into()))?;

    let page_count = pages.len();

    for (object_id, object) in &pages {
        if let Ok(dict) = object.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            merged.objects.insert(*object_id, Object::Dictionary(dict));
        }
    }

    let mut pages_dict = pages_dict;
    pages_dict.set("Count", page_count as u32);
    pages_dict.set(
        "Kids",
        pages
            .keys()
            .map(|id| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    merged.objects.insert(pages_id, Object::Dictionary(pages_dict));

    if let Ok(dict) = catalog_object.as_dict() {
        let mut dict = dict.clone();
        dict.set("Pages", pages_id);
        dict.remove(b"Outlines");
        merged.objects.insert(catalog_id, Object::Dictionary(dict));
    }

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();

    merged
        .save(output)
        .map_err(|e| Error::ConversionFailed(format!("failed to write merged PDF: {}", e)))?;

    Ok(page_count)
}

fn object_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
}
