use crate::error::{Error, Result};
use crate::image_engine;
use crate::layout;
use crate::models::{PdfDocument, PdfPage, PdfSettings};
use crate::page_ranges::PageRange;
use crate::storage;
use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FALLBACK_PAGE_SIZE: (f32, f32) = (595.0, 842.0);

const MAX_TREE_DEPTH: usize = 64;

fn load_document(path: &Path) -> Result<Document> {
    let doc = Document::load(path)?;
    reject_encrypted(&doc, path)?;
    Ok(doc)
}

fn reject_encrypted(doc: &Document, path: &Path) -> Result<()> {
    if doc.is_encrypted() {
        return Err(Error::Encrypted(path.to_path_buf()));
    }
    Ok(())
}

fn save_document(doc: &mut Document, output: &Path) -> Result<()> {
    ensure_parent(output)?;
    doc.save(output)?;
    check_written(output)
}

fn ensure_parent(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn check_written(output: &Path) -> Result<()> {
    if fs::metadata(output)?.len() == 0 {
        return Err(Error::EmptyOutput(output.to_path_buf()));
    }
    Ok(())
}

pub fn pdf_details(path: &Path) -> Result<PdfDocument> {
    let size = fs::metadata(path)?.len();
    let doc = load_document(path)?;

    Ok(PdfDocument {
        path: path.to_path_buf(),
        name: storage::display_name(path),
        size,
        page_count: doc.get_pages().len() as u32,
    })
}

pub fn pdf_pages(path: &Path) -> Result<Vec<PdfPage>> {
    let doc = load_document(path)?;

    Ok(doc
        .get_pages()
        .into_iter()
        .map(|(page_number, page_id)| {
            let (width, height) = page_dimensions(&doc, page_id);
            PdfPage {
                page_number,
                width,
                height,
                is_selected: false,
            }
        })
        .collect())
}

fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    let mut depth = 0;

    while let Some(id) = current {
        let dict = doc.get_object(id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn page_dimensions(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let size = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .filter(|arr| arr.len() == 4)
        .and_then(|arr| arr.iter().map(number).collect::<Option<Vec<f32>>>())
        .map(|n| ((n[2] - n[0]).abs(), (n[3] - n[1]).abs()))
        .unwrap_or(FALLBACK_PAGE_SIZE);

    let rotate = inherited(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0);
    if rotate.rem_euclid(180) == 90 {
        (size.1, size.0)
    } else {
        size
    }
}

struct PageImage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

pub fn create_pdf_from_images(
    paths: &[PathBuf],
    settings: &PdfSettings,
    output: &Path,
) -> Result<PdfDocument> {
    debug!(
        "Creating PDF from {} images: {} pages, margin {}pt",
        paths.len(),
        settings.page_size.display_name(),
        settings.margins.points()
    );

    let images: Vec<DynamicImage> = paths
        .par_iter()
        .map(|path| match image_engine::load_for_pdf(path) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                None
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    if images.is_empty() {
        return Err(Error::NoImages);
    }

    let sizes: Vec<(u32, u32)> = images.iter().map(|i| (i.width(), i.height())).collect();
    let page_size = layout::uniform_page_size(&sizes, settings.page_size).ok_or(Error::NoImages)?;
    debug!("Uniform page size {}x{}", page_size.0, page_size.1);

    let pages = images
        .par_iter()
        .map(|img| {
            Ok(PageImage {
                width: img.width(),
                height: img.height(),
                jpeg: image_engine::encode_jpeg(img, settings.image_quality)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    drop(images);

    let bytes = write_image_pdf(&pages, page_size, settings.margins.points());
    ensure_parent(output)?;
    fs::write(output, bytes)?;
    check_written(output)?;

    let details = pdf_details(output)?;
    info!(
        "Created {} ({} pages, {} bytes)",
        output.display(),
        details.page_count,
        details.size
    );
    Ok(details)
}

fn write_image_pdf(pages: &[PageImage], (page_width, page_height): (f32, f32), margin: f32) -> Vec<u8> {
    let mut pdf = Pdf::new();
    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let image_name = Name(b"Im1");

    // three objects per page: page, image, content stream
    let ids: Vec<(Ref, Ref, Ref)> = (0..pages.len() as i32)
        .map(|i| {
            let base = 3 + 3 * i;
            (Ref::new(base), Ref::new(base + 1), Ref::new(base + 2))
        })
        .collect();

    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id)
        .kids(ids.iter().map(|&(page_id, _, _)| page_id))
        .count(pages.len() as i32);

    for (page_image, &(page_id, image_id, content_id)) in pages.iter().zip(&ids) {
        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, page_width, page_height));
        page.parent(page_tree_id);
        page.contents(content_id);
        page.resources().x_objects().pair(image_name, image_id);
        page.finish();

        let mut image = pdf.image_xobject(image_id, &page_image.jpeg);
        image.filter(Filter::DctDecode);
        image.width(page_image.width as i32);
        image.height(page_image.height as i32);
        image.color_space().device_rgb();
        image.bits_per_component(8);
        image.finish();

        let placement = layout::place_in_page(
            (page_image.width, page_image.height),
            (page_width, page_height),
            margin,
        );
        let mut content = Content::new();
        content.save_state();
        content.transform([
            placement.width,
            0.0,
            0.0,
            placement.height,
            placement.x,
            placement.pdf_y(page_height),
        ]);
        content.x_object(image_name);
        content.restore_state();
        pdf.stream(content_id, &content.finish());
    }

    pdf.finish()
}

/// Inheritable attributes of a page as it renders now. Keys found nowhere in
/// the tree get their PDF defaults so a new parent cannot supply them.
fn effective_attributes(doc: &Document, page_id: ObjectId) -> [(&'static str, Object); 4] {
    let lookup = |key: &str| inherited(doc, page_id, key.as_bytes()).cloned();

    let media_box = lookup("MediaBox").unwrap_or_else(|| {
        let (width, height) = FALLBACK_PAGE_SIZE;
        Object::Array(vec![0.into(), 0.into(), width.into(), height.into()])
    });
    let crop_box = lookup("CropBox").unwrap_or_else(|| media_box.clone());
    let resources = lookup("Resources").unwrap_or_else(|| Object::Dictionary(Dictionary::new()));
    let rotate = lookup("Rotate").unwrap_or(Object::Integer(0));

    [
        ("MediaBox", media_box),
        ("CropBox", crop_box),
        ("Resources", resources),
        ("Rotate", rotate),
    ]
}

fn pin_page_attributes(doc: &mut Document) {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for page_id in page_ids {
        let attributes = effective_attributes(doc, page_id);
        if let Ok(dict) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            for (key, value) in attributes {
                dict.set(key, value);
            }
        }
    }
}

fn append_document(primary: &mut Document, mut secondary: Document) -> Result<()> {
    pin_page_attributes(&mut secondary);
    secondary.renumber_objects_with(primary.max_id + 1);

    let secondary_pages: Vec<ObjectId> = secondary.get_pages().into_values().collect();
    let pages_root_id = primary
        .catalog()?
        .get(b"Pages")
        .and_then(Object::as_reference)?;

    primary.max_id = primary.max_id.max(secondary.max_id);
    primary.objects.extend(secondary.objects);

    {
        let pages_dict = primary
            .get_object_mut(pages_root_id)
            .and_then(Object::as_dict_mut)?;
        let kids = pages_dict.get_mut(b"Kids").and_then(Object::as_array_mut)?;
        kids.extend(secondary_pages.iter().map(|&id| Object::Reference(id)));
        let count = pages_dict.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        pages_dict.set("Count", count + secondary_pages.len() as i64);
    }

    for page_id in secondary_pages {
        if let Ok(page_dict) = primary.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page_dict.set("Parent", pages_root_id);
        }
    }

    Ok(())
}

pub fn merge_pdfs(paths: &[PathBuf], output: &Path) -> Result<PdfDocument> {
    let (first, rest) = paths.split_first().ok_or(Error::NoDocuments)?;
    debug!("Merging {} PDFs into {}", paths.len(), output.display());

    let mut merged = load_document(first)?;
    for path in rest {
        let next = load_document(path)?;
        debug!("Appending {} ({} pages)", path.display(), next.get_pages().len());
        append_document(&mut merged, next)?;
    }

    merged.prune_objects();
    merged.renumber_objects();
    merged.compress();
    save_document(&mut merged, output)?;

    let details = pdf_details(output)?;
    info!(
        "Merged {} PDFs into {} ({} pages)",
        paths.len(),
        output.display(),
        details.page_count
    );
    Ok(details)
}

/// Writes one PDF per range to `output_dir`. Nothing is left behind on failure.
pub fn split_pdf(
    path: &Path,
    ranges: &[PageRange],
    output_dir: &Path,
    prefix: &str,
) -> Result<Vec<PathBuf>> {
    if ranges.is_empty() {
        return Err(Error::NoPagesSelected);
    }

    let page_count = load_document(path)?.get_pages().len() as u32;
    for range in ranges {
        range.check(page_count)?;
    }

    storage::ensure_dir(output_dir)?;
    let outputs: Vec<PathBuf> = (1..=ranges.len())
        .map(|n| storage::unique_path(output_dir, &format!("{prefix}_part{n}.pdf")))
        .collect();

    write_all_or_nothing(ranges, &outputs, |range, output| {
        write_part(path, *range, page_count, output)?;
        debug!("Wrote pages {range} to {}", output.display());
        Ok(())
    })?;

    info!("Split {} into {} files", path.display(), outputs.len());
    Ok(outputs)
}

/// Writes `items[i]` to `outputs[i]` in order. On the first failure every
/// output touched so far, including the failing one, is removed.
fn write_all_or_nothing<T>(
    items: &[T],
    outputs: &[PathBuf],
    mut write: impl FnMut(&T, &Path) -> Result<()>,
) -> Result<()> {
    for (index, (item, output)) in items.iter().zip(outputs).enumerate() {
        if let Err(e) = write(item, output) {
            warn!("Writing {} failed, removing {} outputs", output.display(), index + 1);
            for written in &outputs[..=index] {
                let _ = fs::remove_file(written);
            }
            return Err(e);
        }
    }
    Ok(())
}

fn write_part(source: &Path, range: PageRange, page_count: u32, output: &Path) -> Result<()> {
    let mut part = load_document(source)?;
    let to_drop: Vec<u32> = (1..=page_count).filter(|p| !range.pages().contains(p)).collect();
    if !to_drop.is_empty() {
        part.delete_pages(&to_drop);
    }
    part.prune_objects();
    part.renumber_objects();
    part.compress();
    save_document(&mut part, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};

    /// Two pages inheriting a 300x400 MediaBox from the page tree root.
    fn inherited_box_document() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));

        let mut kids = Vec::new();
        for _ in 0..2 {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn page_size_is_inherited_from_tree() {
        let doc = inherited_box_document();
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        assert_eq!(page_dimensions(&doc, pages[0]), (300.0, 400.0));
    }

    fn pages_root(doc: &mut Document) -> &mut Dictionary {
        let pages_id = doc.catalog().unwrap().get(b"Pages").and_then(Object::as_reference).unwrap();
        doc.get_object_mut(pages_id).and_then(Object::as_dict_mut).unwrap()
    }

    fn page_dict(doc: &Document, page_id: ObjectId) -> &Dictionary {
        doc.get_object(page_id).and_then(Object::as_dict).unwrap()
    }

    #[test]
    fn pinning_copies_media_box_onto_pages() {
        let mut doc = inherited_box_document();
        pin_page_attributes(&mut doc);
        for page_id in doc.get_pages().into_values() {
            assert!(page_dict(&doc, page_id).has(b"MediaBox"));
            assert_eq!(page_dimensions(&doc, page_id), (300.0, 400.0));
        }
    }

    #[test]
    fn pinning_fills_defaults_for_absent_attributes() {
        let mut doc = inherited_box_document();
        pages_root(&mut doc).remove(b"MediaBox");
        pin_page_attributes(&mut doc);

        let page_id = doc.get_pages().into_values().next().unwrap();
        let dict = page_dict(&doc, page_id);
        let numbers = |key: &[u8]| -> Vec<f32> {
            let arr = dict.get(key).and_then(Object::as_array).unwrap();
            arr.iter().map(|n| number(n).unwrap()).collect()
        };
        assert_eq!(numbers(b"MediaBox"), vec![0.0, 0.0, 595.0, 842.0]);
        assert_eq!(numbers(b"CropBox"), numbers(b"MediaBox"));
        assert_eq!(dict.get(b"Rotate").and_then(Object::as_i64).unwrap(), 0);
        assert!(dict.get(b"Resources").and_then(Object::as_dict).unwrap().is_empty());
    }

    #[test]
    fn rotated_pages_report_swapped_size() {
        for (rotate, expected) in [
            (90_i64, (400.0, 300.0)),
            (180, (300.0, 400.0)),
            (270, (400.0, 300.0)),
            (-90, (400.0, 300.0)),
        ] {
            let mut doc = inherited_box_document();
            pages_root(&mut doc).set("Rotate", rotate);
            let page_id = doc.get_pages().into_values().next().unwrap();
            assert_eq!(page_dimensions(&doc, page_id), expected, "Rotate {rotate}");
        }
    }

    #[test]
    fn append_keeps_sizes_and_counts() {
        let mut primary = inherited_box_document();
        append_document(&mut primary, inherited_box_document()).unwrap();

        let pages = primary.get_pages();
        assert_eq!(pages.len(), 4);
        for page_id in pages.into_values() {
            assert_eq!(page_dimensions(&primary, page_id), (300.0, 400.0));
        }
    }

    #[test]
    fn appended_pages_do_not_pick_up_primary_rotation() {
        let mut primary = inherited_box_document();
        pages_root(&mut primary).set("Rotate", 90_i64);
        append_document(&mut primary, inherited_box_document()).unwrap();

        let sizes: Vec<(f32, f32)> = primary
            .get_pages()
            .into_values()
            .map(|id| page_dimensions(&primary, id))
            .collect();
        assert_eq!(
            sizes,
            vec![(400.0, 300.0), (400.0, 300.0), (300.0, 400.0), (300.0, 400.0)]
        );
    }

    #[test]
    fn appended_pages_keep_their_own_rotation() {
        let mut primary = inherited_box_document();
        let mut secondary = inherited_box_document();
        pages_root(&mut secondary).set("Rotate", 270_i64);
        append_document(&mut primary, secondary).unwrap();

        let last = primary.get_pages().into_values().last().unwrap();
        assert_eq!(page_dimensions(&primary, last), (400.0, 300.0));
    }

    #[test]
    fn missing_media_box_falls_back_to_a4() {
        let mut doc = inherited_box_document();
        pages_root(&mut doc).remove(b"MediaBox");
        let page_id = doc.get_pages().into_values().next().unwrap();
        assert_eq!(page_dimensions(&doc, page_id), FALLBACK_PAGE_SIZE);
    }

    #[test]
    fn encrypted_documents_are_rejected() {
        let path = Path::new("locked.pdf");
        let mut doc = inherited_box_document();
        assert!(reject_encrypted(&doc, path).is_ok());

        doc.trailer.set(
            "Encrypt",
            dictionary! {
                "Filter" => "Standard",
                "V" => 2,
                "R" => 3,
            },
        );
        assert!(matches!(
            reject_encrypted(&doc, path),
            Err(Error::Encrypted(p)) if p == path
        ));
    }

    #[test]
    fn failed_write_removes_earlier_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let outputs: Vec<PathBuf> = ["a.pdf", "b.pdf", "c.pdf"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();

        let mut attempted = Vec::new();
        let result = write_all_or_nothing(&[1, 2, 3], &outputs, |item, output| {
            attempted.push(*item);
            fs::write(output, b"%PDF-1.7")?;
            if *item == 2 {
                return Err(Error::EmptyOutput(output.to_path_buf()));
            }
            Ok(())
        });

        assert!(matches!(result, Err(Error::EmptyOutput(_))));
        assert_eq!(attempted, vec![1, 2]);
        assert!(outputs.iter().all(|p| !p.exists()));
    }

    #[test]
    fn successful_writes_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = vec![dir.path().join("a.pdf"), dir.path().join("b.pdf")];
        write_all_or_nothing(&["x", "y"], &outputs, |item, output| {
            fs::write(output, item)?;
            Ok(())
        })
        .unwrap();
        assert!(outputs.iter().all(|p| p.exists()));
    }
}
