use std::path::PathBuf;

/// One record per known remote object. Plain aggregate: callers mutate
/// fields in place between reads and upserts.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Opaque remote identifier, unique across the catalog.
    pub remote_id: String,
    /// Remote display name (may carry a rename-on-conflict suffix).
    pub name: String,
    /// Local path this item mirrors; `None` while unassociated.
    pub local_path: Option<PathBuf>,
    /// Cleared at refresh start, set as entries are re-observed.
    pub existing: bool,
    pub is_folder: bool,
    /// Bytes; 0 for folders.
    pub size: u64,
    /// Epoch seconds; 0 for folders.
    pub mtime: i64,
    /// Base64 quick hash; `None` for folders and zero-length files.
    pub content_hash: Option<String>,
    /// `None` marks a sync root.
    pub parent_id: Option<String>,
}

impl Item {
    pub fn folder(remote_id: String, name: String, parent_id: Option<String>) -> Self {
        Item {
            remote_id,
            name,
            local_path: None,
            existing: true,
            is_folder: true,
            size: 0,
            mtime: 0,
            content_hash: None,
            parent_id,
        }
    }

    pub fn file(
        remote_id: String,
        name: String,
        size: u64,
        mtime: i64,
        content_hash: Option<String>,
        parent_id: Option<String>,
    ) -> Self {
        Item {
            remote_id,
            name,
            local_path: None,
            existing: true,
            is_folder: false,
            size,
            mtime,
            content_hash,
            parent_id,
        }
    }

    /// Folders carry no content metadata.
    pub fn normalize(&mut self) {
        if self.is_folder {
            self.size = 0;
            self.mtime = 0;
            self.content_hash = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clears_content_fields_on_folders() {
        let mut item = Item::file(
            "id1".into(),
            "docs".into(),
            42,
            1234,
            Some("aGFzaA==".into()),
            None,
        );
        item.is_folder = true;
        item.normalize();
        assert_eq!(item.size, 0);
        assert_eq!(item.mtime, 0);
        assert!(item.content_hash.is_none());
    }
}
