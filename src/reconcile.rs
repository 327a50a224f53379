use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::catalog::Catalog;
use crate::models::Item;
use crate::quickxor::quickxor_file;

/// The three classes of work a directory produces: pairs to update in
/// place, catalog items with no local counterpart (deletions), and local
/// paths with no catalog item (creations).
#[derive(Debug, Default)]
pub struct DirectoryPlan {
    pub paired: Vec<(PathBuf, Item)>,
    pub orphans: Vec<Item>,
    pub new_paths: Vec<PathBuf>,
}

/// Match a directory's catalog children against its filesystem entries.
///
/// Names are compared ASCII-lowercased: the remote store is
/// case-insensitive, so folding is a correctness concern rather than a
/// locale one.
pub fn plan_directory(
    catalog: &Catalog,
    dir_path: &Path,
    dir_item: &Item,
) -> Result<DirectoryPlan> {
    let mut paired: Vec<(PathBuf, Item)> = Vec::new();
    let mut paired_names: HashSet<OsString> = HashSet::new();
    let mut orphans: HashMap<String, Item> = HashMap::new();

    for mut item in catalog.children(Some(&dir_item.remote_id)) {
        if let Some(path) = item.local_path.clone() {
            if path.exists() {
                if let Some(name) = path.file_name() {
                    paired_names.insert(name.to_os_string());
                }
                paired.push((path, item));
                continue;
            }
            // The associated path vanished; the item competes as an orphan.
            item.local_path = None;
        }
        orphans.insert(fold(&item.name), item);
    }

    // Bucket unpaired filesystem entries by folded name. Several entries can
    // share a bucket on a case-sensitive filesystem.
    let mut buckets: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let entries = std::fs::read_dir(dir_path)
        .with_context(|| format!("list {}", dir_path.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", dir_path.display()))?;
        if paired_names.contains(&entry.file_name()) {
            continue;
        }
        let folded = fold(&entry.file_name().to_string_lossy());
        buckets.entry(folded).or_default().push(entry.path());
    }

    let mut new_paths: Vec<PathBuf> = Vec::new();
    let mut conflicts: Vec<(String, Vec<PathBuf>)> = Vec::new();
    for (folded, mut paths) in buckets {
        if paths.len() == 1 && orphans.contains_key(&folded) {
            // Rename detection: one candidate, one same-named orphan.
            let item = orphans.remove(&folded).expect("orphan present");
            paired.push((paths.pop().expect("single path"), item));
        } else if !orphans.contains_key(&folded) {
            // Any case-only collision is the remote's to resolve via rename.
            new_paths.append(&mut paths);
        } else {
            conflicts.push((folded, paths));
        }
    }

    // Several local candidates compete for one orphan: the stored content
    // hash decides.
    for (folded, mut paths) in conflicts {
        let stored_hash = orphans
            .get(&folded)
            .and_then(|item| item.content_hash.clone());
        let mut matched = None;
        if let Some(stored_hash) = stored_hash {
            for (i, path) in paths.iter().enumerate() {
                let hash = quickxor_file(path)?;
                if hash == stored_hash {
                    matched = Some(i);
                    break;
                }
            }
        }
        if let Some(i) = matched {
            let item = orphans.remove(&folded).expect("orphan present");
            paired.push((paths.remove(i), item));
        }
        new_paths.append(&mut paths);
    }

    // A surviving new file can be a rename of a surviving orphan under a
    // different name; content decides, with sizes gating the hashing.
    if !orphans.is_empty() && !new_paths.is_empty() {
        let mut hash_to_orphan: HashMap<String, String> = HashMap::new();
        let mut orphan_sizes: HashSet<u64> = HashSet::new();
        for (key, item) in &orphans {
            if item.is_folder {
                continue;
            }
            if let Some(hash) = &item.content_hash {
                hash_to_orphan.entry(hash.clone()).or_insert_with(|| key.clone());
                orphan_sizes.insert(item.size);
            }
        }
        if !hash_to_orphan.is_empty() {
            let mut still_new = Vec::with_capacity(new_paths.len());
            for path in new_paths {
                if !path.is_file() {
                    still_new.push(path);
                    continue;
                }
                let size = std::fs::metadata(&path)
                    .with_context(|| format!("stat {}", path.display()))?
                    .len();
                if !orphan_sizes.contains(&size) {
                    still_new.push(path);
                    continue;
                }
                let hash = quickxor_file(&path)?;
                match hash_to_orphan.remove(&hash) {
                    Some(key) => {
                        let item = orphans.remove(&key).expect("orphan present");
                        paired.push((path, item));
                    }
                    None => still_new.push(path),
                }
            }
            new_paths = still_new;
        }
    }

    Ok(DirectoryPlan {
        paired,
        orphans: orphans.into_values().collect(),
        new_paths,
    })
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}
