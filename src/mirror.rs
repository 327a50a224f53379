use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::http::DriveClient;
use crate::models::Item;
use crate::quickxor::quickxor_file;
use crate::reconcile::plan_directory;

/// Commit the catalog whenever this many remote mutations have accumulated.
const CHECKPOINT_EVERY: u64 = 1000;

/// Files are considered unchanged when size matches and the local mtime is
/// within the window; exactly the window counts as changed.
const MTIME_WINDOW_SECS: i64 = 2;

#[derive(Debug, Default, Clone, Copy)]
pub struct MirrorStats {
    pub nodes: u64,
    pub remote_mutations: u64,
}

/// One unit of mirroring work: a local path, a catalog item, or both.
/// Parent linkage is carried as plain strings so nothing retains the parent
/// node once the traversal moves past it.
struct Node {
    path: Option<PathBuf>,
    item: Option<Item>,
    parent_id: Option<String>,
    parent_remote_path: Option<String>,
    remote_path: String,
    /// Configured remote path when this node is a sync root.
    root_key: Option<String>,
    queries: u64,
}

impl Node {
    fn root(local_dir: PathBuf, item: Option<Item>, remote_key: &str) -> Self {
        Node {
            path: Some(local_dir),
            item,
            parent_id: None,
            parent_remote_path: None,
            remote_path: remote_key.to_string(),
            root_key: Some(remote_key.to_string()),
            queries: 0,
        }
    }

    fn child(
        path: Option<PathBuf>,
        item: Option<Item>,
        parent_id: &str,
        parent_remote_path: &str,
    ) -> Self {
        let remote_path = match &item {
            Some(item) => format!("{parent_remote_path}/{}", item.name),
            None => String::new(),
        };
        Node {
            path,
            item,
            parent_id: Some(parent_id.to_string()),
            parent_remote_path: Some(parent_remote_path.to_string()),
            remote_path,
            root_key: None,
            queries: 0,
        }
    }

    /// Act on this node, then produce its children (directories only).
    async fn process(
        &mut self,
        client: &DriveClient,
        catalog: &mut Catalog,
        check_hash: bool,
    ) -> Result<Vec<Node>> {
        self.act(client, catalog, check_hash).await?;
        self.children(catalog)
    }

    async fn act(
        &mut self,
        client: &DriveClient,
        catalog: &mut Catalog,
        check_hash: bool,
    ) -> Result<()> {
        match (self.path.is_some(), self.item.is_some()) {
            (true, true) => self.update(client, catalog, check_hash).await,
            (true, false) => self.create(client, catalog).await,
            (false, true) => self.delete_remote(client, catalog).await,
            (false, false) => {
                crate::logging::error("node with neither path nor item");
                Ok(())
            }
        }
    }

    async fn update(
        &mut self,
        client: &DriveClient,
        catalog: &mut Catalog,
        check_hash: bool,
    ) -> Result<()> {
        if !self.repair_kind_mismatch(client, catalog).await? {
            return Ok(());
        }

        let path = self.path.clone().expect("update needs a path");
        {
            // First pairing after a rename lands here: persist the new
            // association (and, for files, track the local name). Catalog
            // only; not a remote mutation.
            let item = self.item.as_mut().expect("update needs an item");
            if item.local_path.as_deref() != Some(path.as_path()) {
                item.local_path = Some(path.clone());
                if !item.is_folder {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        item.name = name.to_string();
                    }
                }
                catalog.upsert(item.clone());
            }
        }

        // Directories carry no content of their own.
        if path.is_file() {
            self.update_file(client, catalog, check_hash).await?;
        }
        Ok(())
    }

    async fn update_file(
        &mut self,
        client: &DriveClient,
        catalog: &mut Catalog,
        check_hash: bool,
    ) -> Result<()> {
        let path = self.path.clone().expect("update needs a path");
        let item = self.item.as_ref().expect("update needs an item");

        let meta = std::fs::metadata(&path)
            .with_context(|| format!("stat {}", path.display()))?;
        let mtime = epoch_seconds(
            meta.modified()
                .with_context(|| format!("mtime of {}", path.display()))?,
        );

        let mut up_to_date = metadata_matches(meta.len(), mtime, item);
        if check_hash && up_to_date {
            let hash = quickxor_file(&path)?;
            if Some(hash.as_str()) != item.content_hash.as_deref() {
                up_to_date = false;
                crate::logging::info(format!(
                    "{} passed size and mtime check but not hash",
                    path.display()
                ));
            }
        }
        if up_to_date {
            return Ok(());
        }
        if meta.len() == 0 {
            crate::logging::warn(format!(
                "skipping update of empty file {}",
                path.display()
            ));
            return Ok(());
        }

        crate::logging::info(format!("uploading new version of {}", path.display()));
        let remote_id = item.remote_id.clone();
        let uploaded = client
            .upload(&path, &remote_id, self.parent_id.as_deref(), true)
            .await?;
        match uploaded {
            Some(new_item) => {
                catalog.upsert(new_item.clone());
                self.item = Some(new_item);
                self.queries += 1;
            }
            None => {
                crate::logging::error(format!("could not update {}", path.display()));
            }
        }
        Ok(())
    }

    async fn create(&mut self, client: &DriveClient, catalog: &mut Catalog) -> Result<()> {
        if let Some(item) = &self.item {
            crate::logging::error(format!(
                "create called on a node that already has item {}",
                item.remote_id
            ));
            return Ok(());
        }
        let path = self.path.clone().expect("create needs a path");

        let created = if path.is_dir() {
            let name = match &self.root_key {
                Some(key) => last_segment(key).to_string(),
                None => local_name(&path)?,
            };
            crate::logging::info(format!("creating folder {}", path.display()));
            client
                .create_folder(self.parent_id.as_deref(), &name)
                .await?
        } else if path.is_file() {
            let meta = std::fs::metadata(&path)
                .with_context(|| format!("stat {}", path.display()))?;
            if meta.len() == 0 {
                crate::logging::warn(format!("ignoring empty file {}", path.display()));
                return Ok(());
            }
            let name = local_name(&path)?;
            let target = match &self.parent_remote_path {
                Some(parent) => format!("{parent}/{name}"),
                None => name.clone(),
            };
            crate::logging::info(format!("uploading new file {}", path.display()));
            client
                .upload(&path, &target, self.parent_id.as_deref(), false)
                .await?
        } else {
            crate::logging::error(format!(
                "{} is neither a file nor a directory",
                path.display()
            ));
            return Ok(());
        };

        let Some(mut item) = created else {
            crate::logging::error(format!("creation of {} failed", path.display()));
            return Ok(());
        };

        item.local_path = Some(path.clone());
        if let Some(key) = &self.root_key {
            // Sync roots keep their configured remote path as the catalog
            // name so the next cycle finds them again.
            if item.name != last_segment(key) {
                crate::logging::error(format!(
                    "sync root {key} was renamed remotely to {}",
                    item.name
                ));
            }
            item.name = key.clone();
        }
        catalog.upsert(item.clone());
        self.queries += 1;

        self.remote_path = match (&self.root_key, &self.parent_remote_path) {
            (Some(key), _) => key.clone(),
            (None, Some(parent)) => format!("{parent}/{}", item.name),
            (None, None) => item.name.clone(),
        };
        self.item = Some(item);
        Ok(())
    }

    async fn delete_remote(
        &mut self,
        client: &DriveClient,
        catalog: &mut Catalog,
    ) -> Result<()> {
        let Some(item) = self.item.take() else {
            return Ok(());
        };
        crate::logging::info(format!(
            "deleting remote item {} ({})",
            item.remote_id, item.name
        ));
        if client.delete(&item.remote_id).await? {
            // The remote delete cascades; drop the descendant rows too so
            // no row is left pointing at a missing parent.
            let mut doomed = vec![item.remote_id.clone()];
            let mut queue = vec![item.remote_id.clone()];
            while let Some(id) = queue.pop() {
                for child in catalog.children(Some(&id)) {
                    queue.push(child.remote_id.clone());
                    doomed.push(child.remote_id);
                }
            }
            catalog.delete(doomed.iter().map(String::as_str));
            self.queries += 1;
        } else {
            crate::logging::error(format!(
                "could not delete {} ({})",
                item.remote_id, item.name
            ));
        }
        Ok(())
    }

    /// A folder in the catalog facing a file on disk (or the reverse) is
    /// resolved by deleting the remote item and recreating from the local
    /// path. Returns false when that happened.
    async fn repair_kind_mismatch(
        &mut self,
        client: &DriveClient,
        catalog: &mut Catalog,
    ) -> Result<bool> {
        let consistent = match (&self.path, &self.item) {
            (Some(path), Some(item)) => item.is_folder == path.is_dir(),
            _ => true,
        };
        if consistent {
            return Ok(true);
        }
        crate::logging::warn(format!(
            "kind mismatch between {} and its catalog item, recreating",
            self.path.as_deref().unwrap_or(Path::new("")).display()
        ));
        self.delete_remote(client, catalog).await?;
        self.create(client, catalog).await?;
        Ok(false)
    }

    fn children(&self, catalog: &Catalog) -> Result<Vec<Node>> {
        let (Some(path), Some(item)) = (&self.path, &self.item) else {
            return Ok(Vec::new());
        };
        if !path.is_dir() {
            return Ok(Vec::new());
        }

        let plan = plan_directory(catalog, path, item)?;
        let parent_id = item.remote_id.clone();
        let parent_path = self.remote_path.clone();

        let mut out =
            Vec::with_capacity(plan.paired.len() + plan.orphans.len() + plan.new_paths.len());
        for (child_path, child_item) in plan.paired {
            out.push(Node::child(
                Some(child_path),
                Some(child_item),
                &parent_id,
                &parent_path,
            ));
        }
        for child_item in plan.orphans {
            out.push(Node::child(None, Some(child_item), &parent_id, &parent_path));
        }
        for child_path in plan.new_paths {
            out.push(Node::child(Some(child_path), None, &parent_id, &parent_path));
        }
        Ok(out)
    }
}

/// Mirror every configured sync root into the remote. Depth-first: children
/// are processed before the current node's siblings, so a folder exists
/// remotely before any descendant reaches it. Per-node failures are logged
/// and the node abandoned for this cycle.
pub async fn mirror_trees(
    cfg: &Config,
    client: &DriveClient,
    catalog: &mut Catalog,
    check_hash: bool,
) -> Result<MirrorStats> {
    let mut stack: Vec<Node> = Vec::new();
    for (remote_key, local_dir) in cfg.synchronize.iter().rev() {
        let key = remote_key.trim_matches('/');
        stack.push(Node::root(local_dir.clone(), catalog.root(key), key));
    }

    let mut stats = MirrorStats::default();
    let mut unsaved: u64 = 0;
    while let Some(mut node) = stack.pop() {
        stats.nodes += 1;
        let children = match node.process(client, catalog, check_hash).await {
            Ok(children) => children,
            Err(err) => {
                crate::logging::error(format!(
                    "abandoning {}: {err:#}",
                    node.path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .or_else(|| node.item.as_ref().map(|i| i.remote_id.clone()))
                        .unwrap_or_default()
                ));
                Vec::new()
            }
        };

        stats.remote_mutations += node.queries;
        unsaved += node.queries;
        if unsaved > CHECKPOINT_EVERY {
            catalog.commit().context("checkpoint commit")?;
            crate::logging::info(format!("checkpointed catalog ({unsaved} mutations)"));
            unsaved = 0;
        }

        // Children go on top so they run before this node's siblings.
        stack.extend(children.into_iter().rev());
    }

    Ok(stats)
}

fn metadata_matches(size: u64, mtime: i64, item: &Item) -> bool {
    size == item.size && (mtime - item.mtime).abs() < MTIME_WINDOW_SECS
}

fn epoch_seconds(t: std::time::SystemTime) -> i64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn local_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| anyhow::anyhow!("no usable file name in {}", path.display()))
}

fn last_segment(remote_key: &str) -> &str {
    remote_key.rsplit('/').next().unwrap_or(remote_key)
}
