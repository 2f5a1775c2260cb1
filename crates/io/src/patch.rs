// In-place cell patching for xlsx files
//
// Rewrites only the worksheet XML of the target sheet; every other zip entry
// (styles, shared strings, other sheets, drawings) is copied through as-is.
// Patched cells become inline strings and keep their original style index.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};
use salidas_recon::CellUpdate;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Outcome of an in-place patch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchResult {
    /// Worksheet part that was rewritten (e.g. `xl/worksheets/sheet1.xml`).
    pub sheet_part: String,
    /// Existing `<c>` elements whose value was replaced.
    pub cells_replaced: usize,
    /// Cells that did not exist in the XML and were inserted.
    pub cells_inserted: usize,
}

/// Write `updates` into `sheet` of the workbook at `path`, in place.
///
/// The workbook is rewritten to `<path>.tmp` and renamed over the original,
/// so a failure midway leaves the original untouched.
pub fn patch_cells(path: &Path, sheet: &str, updates: &[CellUpdate]) -> Result<PatchResult, String> {
    let f = File::open(path).map_err(|e| format!("Failed to open '{}': {}", path.display(), e))?;
    let mut zip = ZipArchive::new(f).map_err(|e| format!("Failed to read xlsx zip: {}", e))?;

    let workbook_xml = zip_read_to_string(&mut zip, "xl/workbook.xml")?;
    let rels_xml = zip_read_to_string(&mut zip, "xl/_rels/workbook.xml.rels")?;
    let sheet_paths = resolve_worksheet_paths(&workbook_xml, &rels_xml);
    let sheet_part = sheet_paths
        .get(sheet)
        .cloned()
        .ok_or_else(|| format!("Sheet '{}' not found in '{}'", sheet, path.display()))?;

    let xml = zip_read_to_string(&mut zip, &sheet_part)?;
    let (patched, mut result) = patch_sheet_xml(&xml, updates)?;
    result.sheet_part = sheet_part.clone();
    drop(zip);

    rewrite_via_tmp(path, &sheet_part, &patched)?;

    log::debug!(
        "patched {} in {} ({} replaced, {} inserted)",
        result.sheet_part,
        path.display(),
        result.cells_replaced,
        result.cells_inserted
    );
    Ok(result)
}

/// Replace `path` with a copy whose `sheet_part` entry holds `patched`.
///
/// The copy is staged at `<path>.tmp`, which never outlives a failed call.
fn rewrite_via_tmp(path: &Path, sheet_part: &str, patched: &str) -> Result<(), String> {
    let tmp_path = path.with_extension("xlsx.tmp");
    let staged = write_patched_zip(path, &tmp_path, sheet_part, patched)
        .and_then(|()| replace_file(&tmp_path, path));
    if staged.is_err() && tmp_path.exists() {
        if let Err(e) = std::fs::remove_file(&tmp_path) {
            log::warn!("could not remove '{}': {}", tmp_path.display(), e);
        }
    }
    staged
}

fn write_patched_zip(path: &Path, tmp_path: &Path, sheet_part: &str, patched: &str) -> Result<(), String> {
    let dst = File::create(tmp_path)
        .map_err(|e| format!("Failed to create '{}': {}", tmp_path.display(), e))?;
    let mut out = ZipWriter::new(dst);

    let src = File::open(path).map_err(|e| format!("Failed to open '{}': {}", path.display(), e))?;
    let mut zip = ZipArchive::new(src).map_err(|e| format!("Failed to read xlsx zip: {}", e))?;

    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|e| format!("Failed to read zip entry {}: {}", i, e))?;
        let name = file.name().to_string();

        let mut opts = SimpleFileOptions::default().compression_method(file.compression());
        if let Some(dt) = file.last_modified() {
            opts = opts.last_modified_time(dt);
        }
        if let Some(mode) = file.unix_mode() {
            opts = opts.unix_permissions(mode);
        }

        if file.is_dir() {
            out.add_directory(name, opts)
                .map_err(|e| format!("Failed to add directory to zip: {}", e))?;
            continue;
        }

        let mut data: Vec<u8> = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| format!("Failed to read zip entry: {}", e))?;
        if name == sheet_part {
            data = patched.as_bytes().to_vec();
        }

        out.start_file(name, opts)
            .map_err(|e| format!("Failed to write zip entry: {}", e))?;
        out.write_all(&data)
            .map_err(|e| format!("Failed to write zip entry: {}", e))?;
    }
    out.finish()
        .map_err(|e| format!("Failed to finalize zip: {}", e))?;
    Ok(())
}

fn replace_file(tmp_path: &Path, path: &Path) -> Result<(), String> {
    if let Err(e) = std::fs::rename(tmp_path, path) {
        // On some platforms rename() may not replace; retry with explicit remove
        std::fs::remove_file(path)
            .map_err(|e2| format!("Failed to replace '{}': {}; {}", path.display(), e, e2))?;
        std::fs::rename(tmp_path, path)
            .map_err(|e2| format!("Failed to replace '{}': {}; {}", path.display(), e, e2))?;
    }
    Ok(())
}

fn zip_read_to_string<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, String> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| format!("Missing '{}' in xlsx: {}", name, e))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("Failed to read '{}': {}", name, e))?;
    Ok(content)
}

/// Sheet name → worksheet part path, from workbook.xml + workbook.xml.rels
fn resolve_worksheet_paths(workbook_xml: &str, rels_xml: &str) -> HashMap<String, String> {
    // Step 1: Parse workbook.xml to get (name, rId) per sheet
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut reader = XmlReader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => {
                            let raw = String::from_utf8_lossy(&attr.value).to_string();
                            let unescaped = quick_xml::escape::unescape(&raw)
                                .map(|v| v.to_string())
                                .ok();
                            name = Some(unescaped.unwrap_or(raw));
                        }
                        b"r:id" => rid = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        _ => {}
                    }
                }
                if let (Some(name), Some(rid)) = (name, rid) {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    // Step 2: Parse rels to resolve rId → target path
    let mut rid_to_target: HashMap<String, String> = HashMap::new();
    let mut reader = XmlReader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => target = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    rid_to_target.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    // Step 3: Resolve each rId to a full path (worksheets only)
    sheets
        .into_iter()
        .filter_map(|(name, rid)| {
            let target = rid_to_target.get(&rid)?;
            if !target.contains("worksheet") {
                return None;
            }
            let part = match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("xl/{}", target),
            };
            Some((name, part))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Worksheet XML rewrite
// ---------------------------------------------------------------------------

/// 1-based sheet row → 0-based column → value
type PendingRows = BTreeMap<u32, BTreeMap<u32, String>>;

/// Stream the worksheet XML, replacing or inserting the updated cells.
fn patch_sheet_xml(xml: &str, updates: &[CellUpdate]) -> Result<(String, PatchResult), String> {
    let mut pending: PendingRows = BTreeMap::new();
    for u in updates {
        pending
            .entry(u.row as u32 + 1)
            .or_default()
            .insert(u.col as u32, u.value.clone());
    }

    let mut result = PatchResult::default();
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf: Vec<u8> = Vec::new();

    // Cells still to write in the row being streamed
    let mut row_cells: Option<(u32, BTreeMap<u32, String>)> = None;
    let mut last_row: u32 = 0;
    let mut last_col: Option<u32> = None;
    let mut skip_depth: usize = 0;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("Failed to parse worksheet XML: {}", e))?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => return Err("Unexpected end of worksheet XML".to_string()),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) if e.name().as_ref() == b"row" => {
                let r = attr_value(&e, b"r")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(last_row + 1);
                flush_rows_before(&mut writer, &mut pending, r, &mut result)?;
                last_row = r;
                last_col = None;
                match pending.remove(&r) {
                    Some(cells) => {
                        write(&mut writer, Event::Start(without_spans(&e)))?;
                        row_cells = Some((r, cells));
                    }
                    None => write(&mut writer, Event::Start(e))?,
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"row" => {
                let r = attr_value(&e, b"r")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(last_row + 1);
                flush_rows_before(&mut writer, &mut pending, r, &mut result)?;
                last_row = r;
                match pending.remove(&r) {
                    Some(cells) => {
                        let start = without_spans(&e);
                        write(&mut writer, Event::Start(start))?;
                        for (col, value) in &cells {
                            write_inline_cell(&mut writer, r, *col, value, None)?;
                            result.cells_inserted += 1;
                        }
                        write(&mut writer, Event::End(BytesEnd::new("row")))?;
                    }
                    None => write(&mut writer, Event::Empty(e))?,
                }
            }
            Event::End(e) if e.name().as_ref() == b"row" => {
                if let Some((r, cells)) = row_cells.take() {
                    for (col, value) in &cells {
                        write_inline_cell(&mut writer, r, *col, value, None)?;
                        result.cells_inserted += 1;
                    }
                }
                write(&mut writer, Event::End(e))?;
            }
            Event::Start(e) if e.name().as_ref() == b"c" && row_cells.is_some() => {
                let col = cell_col(&e, last_col);
                last_col = Some(col);
                if replace_cell(&mut writer, &mut row_cells, &e, col, &mut result)? {
                    // Drop the original value children up to </c>
                    skip_depth = 1;
                } else {
                    write(&mut writer, Event::Start(e))?;
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"c" && row_cells.is_some() => {
                let col = cell_col(&e, last_col);
                last_col = Some(col);
                if !replace_cell(&mut writer, &mut row_cells, &e, col, &mut result)? {
                    write(&mut writer, Event::Empty(e))?;
                }
            }
            Event::End(e) if e.name().as_ref() == b"sheetData" => {
                flush_rows_before(&mut writer, &mut pending, u32::MAX, &mut result)?;
                write(&mut writer, Event::End(e))?;
            }
            Event::Empty(e) if e.name().as_ref() == b"sheetData" => {
                write(&mut writer, Event::Start(e))?;
                flush_rows_before(&mut writer, &mut pending, u32::MAX, &mut result)?;
                write(&mut writer, Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::Eof => break,
            other => write(&mut writer, other)?,
        }
    }

    if !pending.is_empty() {
        return Err("Worksheet XML has no <sheetData> element".to_string());
    }

    let out = writer.into_inner();
    let xml = String::from_utf8(out).map_err(|e| format!("Worksheet XML not UTF-8: {}", e))?;
    Ok((xml, result))
}

fn write(writer: &mut XmlWriter<Vec<u8>>, event: Event<'_>) -> Result<(), String> {
    writer
        .write_event(event)
        .map_err(|e| format!("XML write error: {}", e))
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Copy of a `<row>` start tag without its `spans` hint, which may no longer
/// cover the inserted cells.
fn without_spans(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut row = BytesStart::new("row");
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != b"spans" {
            row.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    row
}

/// Column of a `<c>` element; cells without `r` follow the previous one.
fn cell_col(e: &BytesStart<'_>, last_col: Option<u32>) -> u32 {
    attr_value(e, b"r")
        .and_then(|r| parse_cell_ref(&r))
        .map(|(_, col)| col)
        .unwrap_or_else(|| last_col.map_or(0, |c| c + 1))
}

/// Flush pending cells left of `col`, then write the replacement for `col`
/// if one is pending. Returns true when the original cell was replaced.
fn replace_cell(
    writer: &mut XmlWriter<Vec<u8>>,
    row_cells: &mut Option<(u32, BTreeMap<u32, String>)>,
    cell: &BytesStart<'_>,
    col: u32,
    result: &mut PatchResult,
) -> Result<bool, String> {
    let Some((row, cells)) = row_cells.as_mut() else {
        return Ok(false);
    };
    flush_cells_before(writer, *row, cells, col, result)?;
    match cells.remove(&col) {
        Some(value) => {
            let style = attr_value(cell, b"s");
            write_inline_cell(writer, *row, col, &value, style.as_deref())?;
            result.cells_replaced += 1;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Write whole rows for every pending row number below `before`.
fn flush_rows_before(
    writer: &mut XmlWriter<Vec<u8>>,
    pending: &mut PendingRows,
    before: u32,
    result: &mut PatchResult,
) -> Result<(), String> {
    let rows: Vec<u32> = pending.range(..before).map(|(r, _)| *r).collect();
    for r in rows {
        let Some(cells) = pending.remove(&r) else {
            continue;
        };
        let r_str = r.to_string();
        let mut row = BytesStart::new("row");
        row.push_attribute(("r", r_str.as_str()));
        write(writer, Event::Start(row))?;
        for (col, value) in &cells {
            write_inline_cell(writer, r, *col, value, None)?;
            result.cells_inserted += 1;
        }
        write(writer, Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

/// Insert pending cells of the current row that sort before column `before`.
fn flush_cells_before(
    writer: &mut XmlWriter<Vec<u8>>,
    row: u32,
    cells: &mut BTreeMap<u32, String>,
    before: u32,
    result: &mut PatchResult,
) -> Result<(), String> {
    let cols: Vec<u32> = cells.range(..before).map(|(c, _)| *c).collect();
    for col in cols {
        if let Some(value) = cells.remove(&col) {
            write_inline_cell(writer, row, col, &value, None)?;
            result.cells_inserted += 1;
        }
    }
    Ok(())
}

/// `<c r="C4" s=".." t="inlineStr"><is><t>value</t></is></c>`
fn write_inline_cell(
    writer: &mut XmlWriter<Vec<u8>>,
    row: u32,
    col: u32,
    value: &str,
    style: Option<&str>,
) -> Result<(), String> {
    let reference = cell_ref(row, col);
    let mut c = BytesStart::new("c");
    c.push_attribute(("r", reference.as_str()));
    if let Some(s) = style {
        c.push_attribute(("s", s));
    }
    c.push_attribute(("t", "inlineStr"));

    write(writer, Event::Start(c))?;
    write(writer, Event::Start(BytesStart::new("is")))?;
    write(writer, Event::Start(BytesStart::new("t")))?;
    write(writer, Event::Text(BytesText::new(value)))?;
    write(writer, Event::End(BytesEnd::new("t")))?;
    write(writer, Event::End(BytesEnd::new("is")))?;
    write(writer, Event::End(BytesEnd::new("c")))
}

/// Convert column index to Excel column letter (0 = A, 25 = Z, 26 = AA, etc.)
fn col_to_letter(col: u32) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// 1-based row + 0-based column → "C4"
fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", col_to_letter(col), row)
}

/// "C4" → (4, 2): 1-based row, 0-based column
fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some((digits.parse().ok()?, col - 1))
}
