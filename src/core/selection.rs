use crate::core::metadata::FileRecord;
use crate::core::tree::TreeNode;
use crate::error::{RestoreError, Result};
use serde::Serialize;

/// One checked entry of the tree: a whole folder or a single file.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Selected<'t> {
    Folder(&'t TreeNode),
    File(&'t FileRecord),
}

/// Renders the tree and reports what the user checked. `Ok(None)` means the
/// user backed out.
pub(crate) trait SelectionUI {
    fn present<'t>(&self, tree: &'t TreeNode) -> Result<Option<Vec<Selected<'t>>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct SelectionStats {
    pub(crate) folders: u64,
    pub(crate) files: u64,
    pub(crate) bytes: u64,
}

#[derive(Debug)]
pub(crate) struct SelectionResult<'t> {
    pub(crate) selected: Vec<Selected<'t>>,
    pub(crate) files: Vec<&'t FileRecord>,
    pub(crate) stats: SelectionStats,
}

impl SelectionResult<'_> {
    pub(crate) fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub(crate) fn plan<'t>(tree: &'t TreeNode, ui: &dyn SelectionUI) -> Result<SelectionResult<'t>> {
    match ui.present(tree)? {
        Some(selected) => Ok(flatten(selected)),
        None => Err(RestoreError::SelectionCancelled),
    }
}

/// Drops entries already covered by a selected ancestor folder, then
/// expands what is left into files in tree order.
pub(crate) fn flatten(selected: Vec<Selected<'_>>) -> SelectionResult<'_> {
    let folders: Vec<&TreeNode> = selected
        .iter()
        .filter_map(|s| match s {
            Selected::Folder(node) => Some(*node),
            Selected::File(_) => None,
        })
        .collect();

    let covered_by = |path: &str, itself: Option<&TreeNode>| {
        folders.iter().any(|folder| {
            !itself.is_some_and(|node| std::ptr::eq(node, *folder))
                && (folder.path.is_empty() || path.starts_with(&format!("{}/", folder.path)))
        })
    };

    let mut kept: Vec<Selected<'_>> = Vec::new();
    for entry in selected {
        let redundant = match entry {
            Selected::Folder(node) => {
                covered_by(&node.path, Some(node))
                    || kept.iter().any(|k| matches!(k, Selected::Folder(other) if std::ptr::eq(*other, node)))
            }
            Selected::File(record) => {
                covered_by(&record.base_path, None)
                    || kept.iter().any(|k| matches!(k, Selected::File(other) if other.base_path == record.base_path))
            }
        };
        if !redundant {
            kept.push(entry);
        }
    }

    let mut files: Vec<&FileRecord> = Vec::new();
    let mut stats = SelectionStats {
        folders: 0,
        files: 0,
        bytes: 0,
    };

    for entry in &kept {
        match entry {
            Selected::Folder(node) => {
                stats.folders += 1;
                stats.files += node.file_count;
                stats.bytes += node.total_bytes;
                node.collect_files(&mut files);
            }
            Selected::File(record) => {
                stats.files += 1;
                stats.bytes += record.file_size;
                files.push(record);
            }
        }
    }

    SelectionResult {
        selected: kept,
        files,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::build_tree;

    struct Fixed(Vec<&'static str>);

    impl SelectionUI for Fixed {
        fn present<'t>(&self, tree: &'t TreeNode) -> Result<Option<Vec<Selected<'t>>>> {
            Ok(Some(
                self.0
                    .iter()
                    .map(|path| match tree.find(path) {
                        Some(node) => Selected::Folder(node),
                        None => Selected::File(find_file(tree, path).unwrap()),
                    })
                    .collect(),
            ))
        }
    }

    struct Cancelling;

    impl SelectionUI for Cancelling {
        fn present<'t>(&self, _tree: &'t TreeNode) -> Result<Option<Vec<Selected<'t>>>> {
            Ok(None)
        }
    }

    fn find_file<'t>(node: &'t TreeNode, path: &str) -> Option<&'t FileRecord> {
        node.files
            .iter()
            .find(|f| f.base_path == path)
            .or_else(|| node.children.iter().find_map(|c| find_file(c, path)))
    }

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            share_name: "shareA".to_string(),
            base_path: path.to_string(),
            archive_id: format!("id-{}", path),
            file_size: size,
        }
    }

    fn scenario_tree() -> TreeNode {
        build_tree(
            "ShareA",
            &[
                record("/ShareA/docs/a.txt", 100),
                record("/ShareA/docs/b.txt", 200),
                record("/ShareA/img.png", 50),
            ],
        )
    }

    #[test]
    fn selecting_root_takes_everything() {
        let tree = scenario_tree();

        let result = plan(&tree, &Fixed(vec!["/ShareA"])).unwrap();

        assert_eq!(
            result.stats,
            SelectionStats {
                folders: 1,
                files: 3,
                bytes: 350
            }
        );
        let paths: Vec<&str> = result.files.iter().map(|f| f.base_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/ShareA/img.png", "/ShareA/docs/a.txt", "/ShareA/docs/b.txt"]
        );
    }

    #[test]
    fn overlapping_folders_are_not_counted_twice() {
        let tree = build_tree(
            "s",
            &[
                record("/s/a/1", 1),
                record("/s/a/b/2", 2),
                record("/s/a/b/c/3", 3),
                record("/s/d/4", 4),
            ],
        );

        let result = plan(&tree, &Fixed(vec!["/s/a/b", "/s/a", "/s/a/b/c/3", "/s/d"])).unwrap();

        let expected: u64 = result
            .selected
            .iter()
            .map(|s| match s {
                Selected::Folder(node) => node.file_count,
                Selected::File(_) => 1,
            })
            .sum();
        assert_eq!(result.files.len() as u64, expected);
        assert_eq!(result.stats.files, 4);
        assert_eq!(result.stats.folders, 2);
        assert_eq!(result.stats.bytes, 10);
    }

    #[test]
    fn single_files_are_kept() {
        let tree = scenario_tree();

        let result = plan(&tree, &Fixed(vec!["/ShareA/docs/b.txt", "/ShareA/img.png"])).unwrap();

        assert_eq!(result.stats.folders, 0);
        assert_eq!(result.stats.files, 2);
        assert_eq!(result.stats.bytes, 250);
    }

    #[test]
    fn duplicate_entries_collapse() {
        let tree = scenario_tree();

        let result = plan(
            &tree,
            &Fixed(vec!["/ShareA/docs", "/ShareA/docs", "/ShareA/img.png", "/ShareA/img.png"]),
        )
        .unwrap();

        assert_eq!(result.stats.folders, 1);
        assert_eq!(result.stats.files, 3);
    }

    #[test]
    fn cancelled_selection_is_an_error() {
        let tree = scenario_tree();

        let result = plan(&tree, &Cancelling);

        assert!(matches!(result, Err(RestoreError::SelectionCancelled)));
    }
}
