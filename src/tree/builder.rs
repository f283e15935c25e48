//! Rebuilding a tree from a flat listing
//!
//! Account-wide queries return every item at once, each carrying the ids of
//! its parents. An entry hangs under the first of its parents that is a
//! folder present in the same listing. Anything else (no parents, parents
//! outside the listing, members of a parent cycle) lands at the top level.

use super::{ROOT_ID, RemoteItem, ResolutionState, sort_children};
use crate::format::{ROOT_TYPE, is_folder_type};
use crate::remote::RemoteEntry;
use crate::types::ItemId;
use std::collections::HashMap;
use std::sync::Arc;

/// Build a resolved synthetic root named `root_name` from a flat listing
///
/// Folder sizes are the sum of everything beneath them.
pub fn build_tree(entries: Vec<RemoteEntry>, root_name: &str) -> Arc<RemoteItem> {
    let mut children = attach_flat(entries);
    sort_children(&mut children);
    let size = children.iter().map(|child| child.size).sum();

    let mut root = RemoteItem::with_state(
        ItemId::from(ROOT_ID),
        root_name.to_string(),
        ROOT_TYPE.to_string(),
        size,
        ResolutionState::Resolved(Vec::new()),
    );
    root = root.with_children(children);
    Arc::new(root)
}

/// Top-level items of a flat listing, each with its subtree attached
pub(crate) fn attach_flat(entries: Vec<RemoteEntry>) -> Vec<Arc<RemoteItem>> {
    // First occurrence of an id wins; later duplicates are dropped
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        index.entry(entry.id.as_str()).or_insert(i);
    }

    let mut kids: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    let mut top = Vec::new();
    let mut live = vec![false; entries.len()];

    for (i, entry) in entries.iter().enumerate() {
        if index.get(entry.id.as_str()) != Some(&i) {
            continue;
        }
        live[i] = true;

        let parent = entry
            .parents
            .iter()
            .filter_map(|p| index.get(p.as_str()).copied())
            .find(|&p| p != i && is_folder_type(&entries[p].content_type));

        match parent {
            Some(p) => kids[p].push(i),
            None => top.push(i),
        }
    }

    let mut visited = vec![false; entries.len()];
    let mut roots = Vec::with_capacity(top.len());
    for i in top {
        roots.push(build_node(i, &entries, &kids, &mut visited));
    }

    // Whatever is still unvisited only hangs off a cycle
    for i in 0..entries.len() {
        if live[i] && !visited[i] {
            tracing::warn!(item_id = %entries[i].id, "Parent cycle in listing; attaching at top level");
            roots.push(build_node(i, &entries, &kids, &mut visited));
        }
    }

    roots
}

fn build_node(
    i: usize,
    entries: &[RemoteEntry],
    kids: &[Vec<usize>],
    visited: &mut [bool],
) -> Arc<RemoteItem> {
    visited[i] = true;
    let entry = entries[i].clone();

    if !is_folder_type(&entry.content_type) {
        return Arc::new(RemoteItem::from_entry(entry));
    }

    let mut children = Vec::with_capacity(kids[i].len());
    for &child in &kids[i] {
        if !visited[child] {
            children.push(build_node(child, entries, kids, visited));
        }
    }

    let mut folder = RemoteItem::from_entry(entry);
    folder.size = children.iter().map(|child| child.size).sum();
    Arc::new(folder.with_children(children))
}
