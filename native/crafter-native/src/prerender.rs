//! Prerender Module for Crafter
//!
//! Runs the binding engine over static HTML pages ahead of time. Each page gets its
//! own document, engine and local executor, so pages render in parallel while every
//! engine stays single threaded. All pending bindings are driven to settlement
//! before the page is serialized.
//!
//! Event-trigger bindings are armed but never fired here. Their elements keep no
//! processed marker in the output, so a client-side engine picks them up.

use futures::executor::LocalPool;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::bridge::Bridge;
use crate::cache::IncrementalCache;
use crate::dom::Document;
use crate::engine::Crafter;
use crate::error::CrafterError;
use crate::options::CrafterOptions;

// ═══════════════════════════════════════════════════════════════════════════════
// REPORT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPage {
    pub html: String,
    /// Elements carrying the processed marker after settlement.
    pub processed: usize,
    /// Trigger bindings left for the client.
    pub armed: usize,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    /// Path relative to the source directory, `/` separated.
    pub page: String,
    pub output: PathBuf,
    pub cached: bool,
    pub processed: usize,
    pub failures: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// All `.html`/`.htm` files below `dir`, sorted.
pub fn find_html_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

/// Render one page: attach, scan, then run the executor until every pending
/// binding has settled.
///
/// A pending value that never settles blocks this call.
pub fn render_page(
    source: &str,
    bridge: Arc<Bridge>,
    options: &CrafterOptions,
) -> Result<RenderedPage, CrafterError> {
    let mut pool = LocalPool::new();
    let crafter = Crafter::new(Document::parse(source), options.clone(), pool.spawner());
    crafter.attach(bridge)?;

    let report = crafter.start()?;
    pool.run();

    let document = crafter.document();
    Ok(RenderedPage {
        html: document.to_html()?,
        processed: document
            .elements_with_attribute(&options.processed_attribute)
            .len(),
        armed: report.armed,
        failures: report
            .failures
            .iter()
            .map(|failure| failure.error.to_string())
            .collect(),
    })
}

/// Render every page under `src_dir` into `out_dir`, mirroring relative paths.
///
/// Pages whose render reported failures are written but not cached, so the next
/// run retries them.
pub fn prerender_dir(
    src_dir: &Path,
    out_dir: &Path,
    bridge: Arc<Bridge>,
    options: &CrafterOptions,
    cache: Option<&IncrementalCache>,
) -> Result<Vec<PageReport>, CrafterError> {
    let files = find_html_files(src_dir);
    let signature = bridge.signature();
    tracing::info!(pages = files.len(), src = %src_dir.display(), "prerendering");

    files
        .par_iter()
        .map(|path| {
            prerender_file(src_dir, out_dir, path, &bridge, options, cache, &signature)
        })
        .collect()
}

fn prerender_file(
    src_dir: &Path,
    out_dir: &Path,
    path: &Path,
    bridge: &Arc<Bridge>,
    options: &CrafterOptions,
    cache: Option<&IncrementalCache>,
    signature: &str,
) -> Result<PageReport, CrafterError> {
    let relative = path.strip_prefix(src_dir).unwrap_or(path);
    let page = relative.to_string_lossy().replace('\\', "/");
    let source = fs::read_to_string(path).map_err(|e| CrafterError::io(path, e))?;

    let output = out_dir.join(relative);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| CrafterError::io(parent, e))?;
    }

    if let Some(html) = cache.and_then(|c| c.get(&page, &source, signature)) {
        tracing::debug!(page = %page, "cache hit");
        let processed = Document::parse(&html)
            .elements_with_attribute(&options.processed_attribute)
            .len();
        fs::write(&output, html).map_err(|e| CrafterError::io(&output, e))?;
        return Ok(PageReport {
            page,
            output,
            cached: true,
            processed,
            failures: Vec::new(),
        });
    }

    let rendered = render_page(&source, Arc::clone(bridge), options)?;
    for failure in &rendered.failures {
        tracing::warn!(page = %page, error = %failure, "binding failed during prerender");
    }

    fs::write(&output, &rendered.html).map_err(|e| CrafterError::io(&output, e))?;
    if let Some(cache) = cache {
        if rendered.failures.is_empty() {
            cache.set(&page, &source, signature, &rendered.html)?;
        }
    }

    Ok(PageReport {
        page,
        output,
        cached: false,
        processed: rendered.processed,
        failures: rendered.failures,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
