//! Maps triggers onto scan work.
//!
//! Planning is pure: the engine owns the state and applies the returned [`Plan`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tagtree_core::{RootFolder, ScanUnit};

/// An external event that may require scan work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    FullRefresh,
    ConfigChanged {
        /// The match pattern differs from the previous configuration.
        affects_matches: bool,
    },
    FileSaved(PathBuf),
    FileClosed(PathBuf),
    ActiveEditorChanged {
        /// Workspace folder of the newly focused document, if it has one.
        workspace: Option<PathBuf>,
    },
}

/// Engine state a plan is computed against.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub root: &'a RootFolder,
    /// The root was configured explicitly; editor focus never replaces it.
    pub root_pinned: bool,
    /// Root captured by the most recent full scan, if any ran.
    pub last_scanned_root: Option<&'a RootFolder>,
    pub open_documents: &'a BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Clear every result and queue `units` (in push order) under `root`.
    FullScan { root: RootFolder, units: Vec<ScanUnit> },
    /// Drop the file's results and queue a rescan of it.
    Rescan { file: PathBuf },
    /// Re-sort and project the current results without scanning.
    Reproject,
    Nothing,
}

pub fn plan(trigger: &Trigger, ctx: &PlanContext<'_>) -> Plan {
    match trigger {
        Trigger::Startup | Trigger::FullRefresh => full_scan(ctx.root.clone(), ctx.open_documents),
        Trigger::ConfigChanged { affects_matches: true } => {
            full_scan(ctx.root.clone(), ctx.open_documents)
        }
        Trigger::ConfigChanged { affects_matches: false } => Plan::Reproject,
        Trigger::FileSaved(file) | Trigger::FileClosed(file) => Plan::Rescan { file: file.clone() },
        Trigger::ActiveEditorChanged { workspace } => {
            let workspace: Option<&Path> = if ctx.root_pinned {
                ctx.root.path()
            } else {
                workspace.as_deref()
            };
            let unchanged = match (workspace, ctx.last_scanned_root) {
                (Some(workspace), Some(RootFolder::Path(last))) => workspace == last,
                _ => false,
            };
            if unchanged {
                return Plan::Nothing;
            }
            let root = match workspace {
                Some(workspace) => RootFolder::Path(workspace.to_path_buf()),
                None => ctx.root.clone(),
            };
            full_scan(root, ctx.open_documents)
        }
    }
}

/// Units of a full scan, in push order.
///
/// Open documents outside the root come first and the root folder last. With no
/// root every open document is queued and no folder unit is produced.
pub fn full_scan_units(root: &RootFolder, open_documents: &BTreeSet<PathBuf>) -> Vec<ScanUnit> {
    let mut units: Vec<ScanUnit> = open_documents
        .iter()
        .filter(|doc| !root.contains(doc))
        .cloned()
        .map(ScanUnit::File)
        .collect();
    if let Some(path) = root.path() {
        units.push(ScanUnit::Folder(path.to_path_buf()));
    }
    units
}

fn full_scan(root: RootFolder, open_documents: &BTreeSet<PathBuf>) -> Plan {
    let units = full_scan_units(&root, open_documents);
    Plan::FullScan { root, units }
}
