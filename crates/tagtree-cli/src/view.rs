//! Tree and flat presentations of the sorted result set.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tagtree_core::{Match, RootFolder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub line: u32,
    pub column: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Path relative to the root, or the full path for files outside it.
    pub label: String,
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum View {
    Flat {
        root: Option<PathBuf>,
        files: Vec<FileEntry>,
    },
    Tree {
        root: Option<PathBuf>,
        tree: FolderEntry,
    },
}

impl View {
    /// `matches` must already be in presentation order.
    pub fn build(root: &RootFolder, matches: &[Match], flat: bool) -> Self {
        let files = group_by_file(root, matches);
        let root_path = root.path().map(Path::to_path_buf);
        if flat {
            return View::Flat {
                root: root_path,
                files,
            };
        }

        let mut tree = FolderEntry {
            name: root.to_string(),
            ..FolderEntry::default()
        };
        for mut file in files {
            let relative = root
                .path()
                .and_then(|r| file.path.strip_prefix(r).ok())
                .map(Path::to_path_buf);
            let dirs: Vec<String> = match relative {
                Some(relative) => {
                    if let Some(name) = relative.file_name() {
                        file.label = name.to_string_lossy().into_owned();
                    }
                    relative
                        .parent()
                        .map(|parent| {
                            parent
                                .components()
                                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                                .collect()
                        })
                        .unwrap_or_default()
                }
                None => Vec::new(),
            };
            insert(&mut tree, &dirs, file);
        }
        View::Tree {
            root: root_path,
            tree,
        }
    }

    pub fn marker_count(&self) -> usize {
        match self {
            View::Flat { files, .. } => files.iter().map(|f| f.markers.len()).sum(),
            View::Tree { tree, .. } => count_markers(tree),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if self.marker_count() == 0 {
            out.push_str("no markers found\n");
            return out;
        }
        match self {
            View::Flat { files, .. } => {
                for file in files {
                    render_file(&mut out, file, &file.label, 0);
                }
            }
            View::Tree { tree, .. } => {
                let _ = writeln!(out, "{}", tree.name);
                render_folder_contents(&mut out, tree, 1);
            }
        }
        out
    }
}

/// Group consecutive matches of the same file.
pub fn group_by_file(root: &RootFolder, matches: &[Match]) -> Vec<FileEntry> {
    let mut files: Vec<FileEntry> = Vec::new();
    for m in matches {
        let marker = Marker {
            line: m.line,
            column: m.column,
            text: m.text.trim().to_owned(),
        };
        match files.last_mut() {
            Some(last) if last.path == m.file => last.markers.push(marker),
            _ => files.push(FileEntry {
                path: m.file.clone(),
                label: label_for(root, &m.file),
                markers: vec![marker],
            }),
        }
    }
    files
}

fn label_for(root: &RootFolder, file: &Path) -> String {
    match root.path().and_then(|r| file.strip_prefix(r).ok()) {
        Some(relative) if !relative.as_os_str().is_empty() => relative.display().to_string(),
        _ => file.display().to_string(),
    }
}

fn insert(folder: &mut FolderEntry, dirs: &[String], file: FileEntry) {
    let Some((first, rest)) = dirs.split_first() else {
        folder.files.push(file);
        return;
    };

    let idx = match folder.folders.iter().position(|f| &f.name == first) {
        Some(idx) => idx,
        None => {
            folder.folders.push(FolderEntry {
                name: first.clone(),
                ..FolderEntry::default()
            });
            folder.folders.len() - 1
        }
    };
    insert(&mut folder.folders[idx], rest, file);
}

fn count_markers(folder: &FolderEntry) -> usize {
    folder.files.iter().map(|f| f.markers.len()).sum::<usize>()
        + folder.folders.iter().map(count_markers).sum::<usize>()
}

fn render_folder_contents(out: &mut String, folder: &FolderEntry, depth: usize) {
    for child in &folder.folders {
        let _ = writeln!(out, "{}{}/", indent(depth), child.name);
        render_folder_contents(out, child, depth + 1);
    }
    for file in &folder.files {
        render_file(out, file, &file.label, depth);
    }
}

fn render_file(out: &mut String, file: &FileEntry, label: &str, depth: usize) {
    let _ = writeln!(out, "{}{}", indent(depth), label);
    for marker in &file.markers {
        let _ = writeln!(
            out,
            "{}{}:{} {}",
            indent(depth + 1),
            marker.line,
            marker.column,
            marker.text
        );
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}
