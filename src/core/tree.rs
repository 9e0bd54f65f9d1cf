use crate::core::metadata::FileRecord;
use std::collections::HashMap;

/// A folder reconstructed from the `/`-separated paths of the mapping.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TreeNode {
    pub(crate) name: String,
    /// Prefix of every path under this node, without the trailing `/`.
    pub(crate) path: String,
    pub(crate) children: Vec<TreeNode>,
    pub(crate) files: Vec<FileRecord>,
    pub(crate) file_count: u64,
    pub(crate) total_bytes: u64,
}

impl TreeNode {
    fn new(name: String, path: String) -> Self {
        Self {
            name,
            path,
            children: Vec::new(),
            files: Vec::new(),
            file_count: 0,
            total_bytes: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub(crate) fn find(&self, path: &str) -> Option<&TreeNode> {
        if self.path == path {
            return Some(self);
        }

        self.children
            .iter()
            .filter(|child| path == child.path || path.starts_with(&format!("{}/", child.path)))
            .find_map(|child| child.find(path))
    }

    /// Every file owned by this node or any descendant, in tree order.
    pub(crate) fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileRecord>) {
        out.extend(self.files.iter());
        for child in &self.children {
            child.collect_files(out);
        }
    }

    pub(crate) fn folder_count(&self) -> u64 {
        self.children
            .iter()
            .map(|child| 1 + child.folder_count())
            .sum()
    }

    pub(crate) fn contains_file(&self, base_path: &str) -> bool {
        base_path.starts_with(&format!("{}/", self.path)) || self.path.is_empty()
    }
}

/// Builds the folder tree for `records`. The root stands for the longest
/// common folder of all paths and is labelled `root_label`.
///
/// Child folders and owned files keep the order in which they first appear
/// in `records`, so the same input always yields the same tree.
pub(crate) fn build_tree(root_label: &str, records: &[FileRecord]) -> TreeNode {
    let prefix = common_folder_prefix(records);
    let candidates: Vec<&FileRecord> = records.iter().collect();

    let root_path = prefix.strip_suffix('/').unwrap_or(&prefix).to_string();
    build_node(root_label.to_string(), root_path, &prefix, candidates)
}

fn build_node(name: String, path: String, prefix: &str, candidates: Vec<&FileRecord>) -> TreeNode {
    let mut node = TreeNode::new(name, path);

    let mut folder_order: Vec<(String, Vec<&FileRecord>)> = Vec::new();
    let mut folder_index: HashMap<String, usize> = HashMap::new();
    let mut direct_files: Vec<&FileRecord> = Vec::new();

    for record in candidates {
        let Some(remainder) = record.base_path.strip_prefix(prefix) else {
            continue;
        };

        if remainder.is_empty() {
            continue;
        }

        match remainder.split_once('/') {
            None => direct_files.push(record),
            Some((folder, rest)) => {
                // "docs/" names the folder itself, not a file inside it.
                if rest.is_empty() {
                    continue;
                }
                let index = *folder_index.entry(folder.to_string()).or_insert_with(|| {
                    folder_order.push((folder.to_string(), Vec::new()));
                    folder_order.len() - 1
                });
                folder_order[index].1.push(record);
            }
        }
    }

    for record in direct_files {
        if folder_index.contains_key(record.file_name()) {
            continue;
        }
        node.files.push(record.clone());
    }

    for (folder, members) in folder_order {
        let child_prefix = format!("{}{}/", prefix, folder);
        let child_path = format!("{}{}", prefix, folder);
        node.children
            .push(build_node(folder, child_path, &child_prefix, members));
    }

    node.file_count = node.files.len() as u64
        + node.children.iter().map(|c| c.file_count).sum::<u64>();
    node.total_bytes = node.files.iter().map(|f| f.file_size).sum::<u64>()
        + node.children.iter().map(|c| c.total_bytes).sum::<u64>();

    node
}

/// Longest prefix ending in `/` shared by the folders of every path.
fn common_folder_prefix(records: &[FileRecord]) -> String {
    let mut folders = records
        .iter()
        .filter_map(|record| record.base_path.rfind('/').map(|i| &record.base_path[..=i]));

    let Some(first) = folders.next() else {
        return "/".to_string();
    };

    let mut common = first;
    for folder in folders {
        let shared = common
            .char_indices()
            .zip(folder.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map_or(0, |((i, c), _)| i + c.len_utf8());
        common = &common[..shared];
    }

    // A record without any `/` forces the prefix back to nothing.
    if records.iter().any(|r| !r.base_path.contains('/')) {
        return String::new();
    }

    match common.rfind('/') {
        Some(i) => common[..=i].to_string(),
        None => String::new(),
    }
}
