use std::collections::{HashMap, HashSet};
use std::io::Write;

use bytesize::ByteSize;
use clap::ArgMatches;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    terminal::{self, ClearType},
};

use crate::core::metadata::FileRecord;
use crate::core::selection::{Selected, SelectionUI};
use crate::core::tree::TreeNode;
use crate::error::{RestoreError, Result};
use crate::output::is_json_mode;

pub(crate) enum OnlyRequest {
    All,
    Paths(Vec<String>),
    Interactive,
}

pub(crate) fn parse_only_request(matches: &ArgMatches) -> std::result::Result<OnlyRequest, String> {
    if matches.get_flag("all") {
        return Ok(OnlyRequest::All);
    }

    let values: Vec<String> = matches
        .get_many::<String>("only")
        .map(|vals| vals.map(|v| v.to_string()).collect())
        .unwrap_or_default();

    if values.is_empty() {
        if is_json_mode() {
            return Err("--only or --all is required in --mode json".to_string());
        }
        return Ok(OnlyRequest::Interactive);
    }

    let mut normalized = Vec::with_capacity(values.len());
    for value in values {
        normalized.push(normalize_only_path(&value)?);
    }

    Ok(OnlyRequest::Paths(normalized))
}

pub(crate) fn selector_for(request: OnlyRequest) -> Box<dyn SelectionUI> {
    match request {
        OnlyRequest::All => Box::new(WholeBackup),
        OnlyRequest::Paths(paths) => Box::new(PathList { paths }),
        OnlyRequest::Interactive => Box::new(InteractiveSelector),
    }
}

fn normalize_only_path(value: &str) -> std::result::Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("Invalid --only path: empty".to_string());
    }

    let mut path = trimmed.replace('\\', "/");

    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }

    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    if path.is_empty() || path == "." {
        return Err(format!("Invalid --only path: {}", value));
    }

    Ok(path)
}

/// Selects the root folder.
struct WholeBackup;

impl SelectionUI for WholeBackup {
    fn present<'t>(&self, tree: &'t TreeNode) -> Result<Option<Vec<Selected<'t>>>> {
        Ok(Some(vec![Selected::Folder(tree)]))
    }
}

/// Selects folders or files named on the command line, either by their full
/// backup path or relative to the root folder.
struct PathList {
    paths: Vec<String>,
}

impl SelectionUI for PathList {
    fn present<'t>(&self, tree: &'t TreeNode) -> Result<Option<Vec<Selected<'t>>>> {
        let mut selected = Vec::with_capacity(self.paths.len());

        for path in &self.paths {
            let candidates = if path.starts_with('/') {
                vec![path.clone()]
            } else {
                vec![format!("{}/{}", tree.path, path), format!("/{}", path)]
            };

            let found = candidates.iter().find_map(|candidate| {
                tree.find(candidate)
                    .map(Selected::Folder)
                    .or_else(|| find_file(tree, candidate).map(Selected::File))
            });

            match found {
                Some(entry) => selected.push(entry),
                None => {
                    return Err(RestoreError::Config(format!(
                        "no folder or file in the backup matches '{}'",
                        path
                    )));
                }
            }
        }

        Ok(Some(selected))
    }
}

fn find_file<'t>(node: &'t TreeNode, base_path: &str) -> Option<&'t FileRecord> {
    if !node.contains_file(base_path) {
        return None;
    }

    node.files
        .iter()
        .find(|file| file.base_path == base_path)
        .or_else(|| node.children.iter().find_map(|child| find_file(child, base_path)))
}

/// Full-screen checkbox tree on the terminal.
pub(crate) struct InteractiveSelector;

impl SelectionUI for InteractiveSelector {
    fn present<'t>(&self, tree: &'t TreeNode) -> Result<Option<Vec<Selected<'t>>>> {
        if tree.file_count == 0 {
            return Err(RestoreError::Config(
                "the backup contains no files to restore".to_string(),
            ));
        }

        let selected = match run_selector(tree) {
            Ok(Some(selected)) => selected,
            Ok(None) => return Ok(None),
            Err(e) => return Err(RestoreError::Config(e)),
        };

        let mut out = Vec::new();
        collect_selection(tree, &selected, &mut out);
        Ok(Some(out))
    }
}

struct VisibleNode<'t> {
    path: &'t str,
    name: &'t str,
    is_dir: bool,
    depth: usize,
    file_count: u64,
    bytes: u64,
}

#[derive(Copy, Clone)]
enum SelectionState {
    None,
    Partial,
    Selected,
}

struct TerminalGuard;

impl TerminalGuard {
    fn new() -> std::result::Result<Self, String> {
        terminal::enable_raw_mode().map_err(|e| format!("Failed to enable raw mode: {}", e))?;
        let mut stdout = std::io::stdout();
        if let Err(e) = execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(format!("Failed to initialize terminal: {}", e));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = std::io::stdout();
        let _ = execute!(stdout, terminal::LeaveAlternateScreen, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// Returns the checked file paths, or `None` when the user cancels.
fn run_selector(root: &TreeNode) -> std::result::Result<Option<HashSet<String>>, String> {
    let _guard = TerminalGuard::new()?;

    let mut expanded: HashSet<String> = HashSet::new();
    let mut selected: HashSet<String> = HashSet::new();
    let mut cursor_index: usize = 0;
    let mut scroll_offset: usize = 0;
    let mut status_message: Option<String> = None;

    expanded.insert(root.path.clone());

    loop {
        let visible = visible_nodes(root, &expanded);

        if cursor_index >= visible.len() {
            cursor_index = visible.len().saturating_sub(1);
        }

        let mut states = HashMap::new();
        fill_selection_states(root, &selected, &mut states);
        let (selected_files, selected_bytes) = selected_totals(root, &selected);

        render_selector(
            &visible,
            &expanded,
            &states,
            cursor_index,
            &mut scroll_offset,
            selected_files,
            selected_bytes,
            status_message.as_deref(),
        )?;
        status_message = None;

        let event = event::read().map_err(|e| format!("Failed to read input: {}", e))?;
        let Event::Key(key) = event else {
            continue;
        };

        if key.kind == KeyEventKind::Release {
            continue;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            return Ok(None);
        }

        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return Ok(None),
            KeyCode::Up => {
                cursor_index = cursor_index.saturating_sub(1);
            }
            KeyCode::Down => {
                if cursor_index + 1 < visible.len() {
                    cursor_index += 1;
                }
            }
            KeyCode::PageUp => {
                let page_size = current_page_size()?;
                cursor_index = cursor_index.saturating_sub(page_size);
            }
            KeyCode::PageDown => {
                let page_size = current_page_size()?;
                cursor_index = cursor_index
                    .saturating_add(page_size)
                    .min(visible.len().saturating_sub(1));
            }
            KeyCode::BackTab => {
                expanded.clear();
                expanded.insert(root.path.clone());
                cursor_index = 0;
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Left => {
                let Some(current) = visible.get(cursor_index) else {
                    continue;
                };
                if current.is_dir && current.path != root.path {
                    let open = expanded.contains(current.path);
                    match key.code {
                        KeyCode::Right if !open => {
                            expanded.insert(current.path.to_string());
                        }
                        KeyCode::Left if open => {
                            expanded.remove(current.path);
                        }
                        KeyCode::Tab if open => {
                            expanded.remove(current.path);
                        }
                        KeyCode::Tab => {
                            expanded.insert(current.path.to_string());
                        }
                        _ => {}
                    }
                }
            }
            KeyCode::Char(' ') => {
                let Some(current) = visible.get(cursor_index) else {
                    continue;
                };
                if current.is_dir {
                    if let Some(node) = root.find(current.path) {
                        let mut files = Vec::new();
                        node.collect_files(&mut files);
                        let all_selected = files.iter().all(|f| selected.contains(&f.base_path));
                        for file in files {
                            if all_selected {
                                selected.remove(&file.base_path);
                            } else {
                                selected.insert(file.base_path.clone());
                            }
                        }
                    }
                } else if !selected.remove(current.path) {
                    selected.insert(current.path.to_string());
                }
            }
            KeyCode::Enter => {
                if selected.is_empty() {
                    status_message = Some("Select at least one entry using space.".to_string());
                } else {
                    return Ok(Some(selected));
                }
            }
            _ => {}
        }
    }
}

fn current_page_size() -> std::result::Result<usize, String> {
    let (_, height) =
        terminal::size().map_err(|e| format!("Failed to read terminal size: {}", e))?;
    let page_size = height.saturating_sub(3) as usize;
    if page_size == 0 {
        return Err("Terminal window too small to render selector".to_string());
    }
    Ok(page_size)
}

#[allow(clippy::too_many_arguments)]
fn render_selector(
    visible: &[VisibleNode<'_>],
    expanded: &HashSet<String>,
    states: &HashMap<String, SelectionState>,
    cursor_index: usize,
    scroll_offset: &mut usize,
    selected_files: u64,
    selected_bytes: u64,
    status_message: Option<&str>,
) -> std::result::Result<(), String> {
    let (width, height) =
        terminal::size().map_err(|e| format!("Failed to read terminal size: {}", e))?;
    let view_height = height.saturating_sub(3) as usize;

    if view_height == 0 {
        return Err("Terminal window too small to render selector".to_string());
    }

    if cursor_index < *scroll_offset {
        *scroll_offset = cursor_index;
    } else if cursor_index >= *scroll_offset + view_height {
        *scroll_offset = cursor_index + 1 - view_height;
    }

    let mut stdout = std::io::stdout();
    queue!(
        stdout,
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )
    .map_err(|e| format!("Failed to render selector: {}", e))?;

    write_line(
        &mut stdout,
        "Keys: Tab/Right/Left=expand Shift+Tab=collapse-all Space=select Enter=restore Esc=cancel",
        width,
        true,
    )?;
    write_line(
        &mut stdout,
        &format!(
            "Selected: {} files, {}",
            selected_files,
            ByteSize(selected_bytes)
        ),
        width,
        true,
    )?;

    for line_index in 0..view_height {
        let item_index = *scroll_offset + line_index;
        let Some(item) = visible.get(item_index) else {
            write_line(&mut stdout, "", width, true)?;
            continue;
        };

        let cursor_marker = if item_index == cursor_index { ">" } else { " " };
        let selection_marker = match states.get(item.path).copied().unwrap_or(SelectionState::None) {
            SelectionState::None => "[ ]",
            SelectionState::Partial => "[~]",
            SelectionState::Selected => "[x]",
        };

        let indent = "  ".repeat(item.depth);
        let line = if item.is_dir {
            let expand_marker = if expanded.contains(item.path) { "-" } else { "+" };
            format!(
                "{} {} {}{} {}/ ({} files, {})",
                cursor_marker,
                selection_marker,
                indent,
                expand_marker,
                item.name,
                item.file_count,
                ByteSize(item.bytes)
            )
        } else {
            format!(
                "{} {} {}  {} ({})",
                cursor_marker,
                selection_marker,
                indent,
                item.name,
                ByteSize(item.bytes)
            )
        };
        write_line(&mut stdout, &line, width, true)?;
    }

    write_line(&mut stdout, status_message.unwrap_or(""), width, false)?;

    stdout
        .flush()
        .map_err(|e| format!("Failed to render selector: {}", e))?;
    Ok(())
}

fn write_line(
    stdout: &mut std::io::Stdout,
    text: &str,
    width: u16,
    newline: bool,
) -> std::result::Result<(), String> {
    let mut line: String = text.chars().take(width as usize).collect();
    if newline {
        line.push_str("\r\n");
    } else {
        line.push('\r');
    }
    stdout
        .write_all(line.as_bytes())
        .map_err(|e| format!("Failed to write output: {}", e))
}

fn visible_nodes<'t>(root: &'t TreeNode, expanded: &HashSet<String>) -> Vec<VisibleNode<'t>> {
    let mut out = Vec::new();
    out.push(VisibleNode {
        path: &root.path,
        name: &root.name,
        is_dir: true,
        depth: 0,
        file_count: root.file_count,
        bytes: root.total_bytes,
    });
    collect_visible_nodes(root, expanded, 1, &mut out);
    out
}

fn collect_visible_nodes<'t>(
    node: &'t TreeNode,
    expanded: &HashSet<String>,
    depth: usize,
    out: &mut Vec<VisibleNode<'t>>,
) {
    if !expanded.contains(&node.path) {
        return;
    }

    for child in &node.children {
        out.push(VisibleNode {
            path: &child.path,
            name: &child.name,
            is_dir: true,
            depth,
            file_count: child.file_count,
            bytes: child.total_bytes,
        });
        collect_visible_nodes(child, expanded, depth + 1, out);
    }

    for file in &node.files {
        out.push(VisibleNode {
            path: &file.base_path,
            name: file.file_name(),
            is_dir: false,
            depth,
            file_count: 1,
            bytes: file.file_size,
        });
    }
}

fn fill_selection_states(
    node: &TreeNode,
    selected: &HashSet<String>,
    states: &mut HashMap<String, SelectionState>,
) -> SelectionState {
    let mut any_selected = false;
    let mut all_selected = true;

    for child in &node.children {
        match fill_selection_states(child, selected, states) {
            SelectionState::Selected => any_selected = true,
            SelectionState::Partial => {
                any_selected = true;
                all_selected = false;
            }
            SelectionState::None => all_selected = false,
        }
    }

    for file in &node.files {
        if selected.contains(&file.base_path) {
            any_selected = true;
            states.insert(file.base_path.clone(), SelectionState::Selected);
        } else {
            all_selected = false;
            states.insert(file.base_path.clone(), SelectionState::None);
        }
    }

    let state = if node.file_count == 0 {
        SelectionState::None
    } else if all_selected {
        SelectionState::Selected
    } else if any_selected {
        SelectionState::Partial
    } else {
        SelectionState::None
    };

    states.insert(node.path.clone(), state);
    state
}

fn selected_totals(node: &TreeNode, selected: &HashSet<String>) -> (u64, u64) {
    let mut files = Vec::new();
    node.collect_files(&mut files);
    files
        .iter()
        .filter(|file| selected.contains(&file.base_path))
        .fold((0, 0), |(count, bytes), file| (count + 1, bytes + file.file_size))
}

/// Collapses checked files into the largest fully checked folders.
fn collect_selection<'t>(node: &'t TreeNode, selected: &HashSet<String>, out: &mut Vec<Selected<'t>>) {
    let mut files = Vec::new();
    node.collect_files(&mut files);

    if files.is_empty() {
        return;
    }

    if files.iter().all(|file| selected.contains(&file.base_path)) {
        out.push(Selected::Folder(node));
        return;
    }

    for file in &node.files {
        if selected.contains(&file.base_path) {
            out.push(Selected::File(file));
        }
    }

    for child in &node.children {
        collect_selection(child, selected, out);
    }
}
