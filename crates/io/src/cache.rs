// Snapshot cache lifecycle: load-or-build, handle fixup

use std::path::{Path, PathBuf};

use cellgraph_engine::builder::{build, BuildOptions};
use cellgraph_engine::extract::ReferenceExtractor;
use cellgraph_engine::graph::DepGraph;
use cellgraph_engine::handle::RefHandle;
use cellgraph_engine::progress::Progress;
use cellgraph_engine::source::DataSource;

use crate::{snapshot, CacheError, CACHE_FORMAT_VERSION};

/// Cache behavior knobs.
#[derive(Clone, Debug, Default)]
pub struct CacheOptions {
    /// Skip any existing snapshot and rebuild from the source.
    pub force_rebuild: bool,
    pub build: BuildOptions,
}

/// Snapshot file path for a workbook inside `cache_dir`.
///
/// The format version is part of the file name, so upgrading the format
/// leaves old snapshots behind rather than overwriting them.
pub fn cache_path(cache_dir: &Path, workbook: &str) -> PathBuf {
    cache_dir.join(format!(
        "cellgraph_{workbook}.v{CACHE_FORMAT_VERSION}.sheetdag"
    ))
}

/// Per-user default location for snapshots.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("cellgraph"))
}

/// Return a graph for the source's workbook, restoring a snapshot when one
/// exists and rebuilding otherwise.
///
/// A snapshot written by a different format version is discarded and the
/// graph rebuilt; that is not an error. Freshly built graphs are persisted
/// only when the build ran to completion.
pub fn load_or_build(
    source: &dyn DataSource,
    extractor: &dyn ReferenceExtractor,
    cache_dir: &Path,
    options: &CacheOptions,
    progress: &Progress,
) -> Result<DepGraph, CacheError> {
    let path = cache_path(cache_dir, source.workbook_name());

    if !options.force_rebuild && path.exists() {
        match restore(&path, source, progress) {
            Ok(graph) => return Ok(graph),
            Err(CacheError::VersionMismatch { .. }) => {
                progress.reset();
            }
            Err(err) => return Err(err),
        }
    }

    build_and_persist(source, extractor, &path, cache_dir, options, progress)
}

fn build_and_persist(
    source: &dyn DataSource,
    extractor: &dyn ReferenceExtractor,
    path: &Path,
    cache_dir: &Path,
    options: &CacheOptions,
    progress: &Progress,
) -> Result<DepGraph, CacheError> {
    let graph = build(source, extractor, &options.build, progress)?;
    // A cancelled build is partial state; never snapshot it.
    if graph.is_complete() {
        std::fs::create_dir_all(cache_dir)?;
        snapshot::save(&graph.to_parts(), path)?;
    }
    Ok(graph)
}

/// Restore a graph from a snapshot and re-resolve its handles against the
/// live source.
pub fn restore(
    path: &Path,
    source: &dyn DataSource,
    progress: &Progress,
) -> Result<DepGraph, CacheError> {
    let parts = snapshot::load(path)?;
    let mut graph = DepGraph::from_parts(parts);
    fixup_handles(&mut graph, source, progress)?;
    Ok(graph)
}

/// Re-derive every persisted handle against the live source.
///
/// Handles into open workbooks must resolve; failure means the snapshot
/// refers to something that no longer exists. Handles into closed workbooks
/// stay non-local. Cancellation leaves the graph marked incomplete with
/// whatever was fixed up so far.
fn fixup_handles(
    graph: &mut DepGraph,
    source: &dyn DataSource,
    progress: &Progress,
) -> Result<(), CacheError> {
    let open = source.open_workbooks();
    let addresses = graph.handle_addresses();
    let ranges = graph.handle_ranges();
    progress.set_total((addresses.len() + ranges.len()) as u64);

    for addr in addresses {
        if progress.is_cancelled() {
            graph.mark_incomplete();
            return Ok(());
        }
        let handle = if open.contains(&addr.workbook) {
            match source.resolve_cell(&addr) {
                Some(loc) => RefHandle::Local(loc),
                None => return Err(CacheError::StaleReference(addr.to_string())),
            }
        } else {
            RefHandle::NonLocal {
                dir: addr.dir.clone(),
                workbook: addr.workbook.clone(),
                worksheet: addr.worksheet.clone(),
            }
        };
        graph.replace_cell_handle(&addr, handle);
        progress.increment();
    }

    for range in ranges {
        if progress.is_cancelled() {
            graph.mark_incomplete();
            return Ok(());
        }
        let handle = if open.contains(&range.workbook) {
            match source.resolve_range(&range) {
                Some(loc) => RefHandle::Local(loc),
                None => return Err(CacheError::StaleReference(range.to_string())),
            }
        } else {
            RefHandle::NonLocal {
                dir: range.dir.clone(),
                workbook: range.workbook.clone(),
                worksheet: range.worksheet.clone(),
            }
        };
        graph.replace_vector_handle(&range, handle);
        progress.increment();
    }

    Ok(())
}
