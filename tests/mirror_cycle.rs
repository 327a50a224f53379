//! Full-cycle tests against an in-process mock drive: refresh, mirror,
//! rename, delete, hash verification, throttling.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use drive_mirror::auth::{save_token_file, TokenSet};
use drive_mirror::catalog::Catalog;
use drive_mirror::config::Config;
use drive_mirror::http::{DriveClient, UPLOAD_CHUNK_SIZE};
use drive_mirror::mirror::mirror_trees;
use drive_mirror::quickxor::QuickXorHash;
use drive_mirror::refresh::refresh_catalog;

#[derive(Clone)]
struct MockItem {
    id: String,
    name: String,
    parent: Option<String>,
    folder: bool,
    size: u64,
    mtime: String,
    hash: Option<String>,
}

enum UploadTarget {
    Existing(String),
    Create { parent: Option<String>, name: String },
}

struct UploadSession {
    target: UploadTarget,
    mtime: String,
    received: Vec<u8>,
}

#[derive(Default)]
struct DriveState {
    items: HashMap<String, MockItem>,
    sessions: HashMap<String, UploadSession>,
    next_id: usize,
    mutations: usize,
    chunk_ranges: Vec<String>,
    throttle_children: HashMap<String, usize>,
}

#[derive(Default)]
struct MockDrive {
    state: Mutex<DriveState>,
    base: Mutex<String>,
}

impl MockDrive {
    fn seed_folder(&self, id: &str, name: &str, parent: Option<&str>) {
        let mut st = self.state.lock().unwrap();
        st.items.insert(
            id.to_string(),
            MockItem {
                id: id.to_string(),
                name: name.to_string(),
                parent: parent.map(String::from),
                folder: true,
                size: 0,
                mtime: String::new(),
                hash: None,
            },
        );
    }

    fn seed_file(&self, id: &str, name: &str, parent: &str, content: &[u8]) {
        let mut h = QuickXorHash::new();
        h.update(content);
        let mut st = self.state.lock().unwrap();
        st.items.insert(
            id.to_string(),
            MockItem {
                id: id.to_string(),
                name: name.to_string(),
                parent: Some(parent.to_string()),
                folder: false,
                size: content.len() as u64,
                mtime: "2026-01-01T00:00:00.000Z".to_string(),
                hash: Some(h.base64()),
            },
        );
    }

    fn remove_item(&self, id: &str) {
        self.state.lock().unwrap().items.remove(id);
    }

    fn throttle_children_once(&self, parent: &str) {
        self.state
            .lock()
            .unwrap()
            .throttle_children
            .insert(parent.to_string(), 1);
    }

    fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    fn chunk_ranges(&self) -> Vec<String> {
        self.state.lock().unwrap().chunk_ranges.clone()
    }

    fn item_named(&self, name: &str) -> Option<MockItem> {
        self.state
            .lock()
            .unwrap()
            .items
            .values()
            .find(|it| it.name == name)
            .cloned()
    }
}

fn item_json(item: &MockItem) -> Value {
    let mut v = json!({"id": item.id, "name": item.name});
    if item.folder {
        v["folder"] = json!({});
    } else {
        v["size"] = json!(item.size);
        v["file"] = match &item.hash {
            Some(h) => json!({"hashes": {"quickXorHash": h}}),
            None => json!({}),
        };
        v["fileSystemInfo"] = json!({"lastModifiedDateTime": item.mtime});
    }
    v
}

fn resolve_path(st: &DriveState, path: &str) -> Option<String> {
    let mut current: Option<String> = None;
    for segment in path.trim_matches('/').split('/') {
        let found = st.items.values().find(|it| {
            it.parent.as_deref() == current.as_deref() && it.name.eq_ignore_ascii_case(segment)
        })?;
        current = Some(found.id.clone());
    }
    current
}

fn dedupe_name(st: &DriveState, parent: Option<&str>, name: &str) -> String {
    let taken = |candidate: &str| {
        st.items
            .values()
            .any(|it| it.parent.as_deref() == parent && it.name.eq_ignore_ascii_case(candidate))
    };
    if !taken(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), Some(e.to_string())),
        None => (name.to_string(), None),
    };
    let mut i = 1;
    loop {
        let candidate = match &ext {
            Some(e) => format!("{stem} {i}.{e}"),
            None => format!("{stem} {i}"),
        };
        if !taken(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

fn alloc_id(st: &mut DriveState) -> String {
    st.next_id += 1;
    format!("id-{}", st.next_id)
}

async fn get_drives() -> StatusCode {
    StatusCode::OK
}

async fn token_endpoint() -> Json<Value> {
    Json(json!({
        "access_token": "fresh-access",
        "refresh_token": "fresh-refresh",
        "expires_in": 3600
    }))
}

async fn children_get(
    State(drive): State<Arc<MockDrive>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    let mut st = drive.state.lock().unwrap();
    if let Some(remaining) = st.throttle_children.get_mut(&id) {
        if *remaining > 0 {
            *remaining -= 1;
            return (StatusCode::TOO_MANY_REQUESTS, [("Retry-After", "1")]).into_response();
        }
    }
    let value: Vec<Value> = st
        .items
        .values()
        .filter(|it| it.parent.as_deref() == Some(id.as_str()))
        .map(item_json)
        .collect();
    Json(json!({ "value": value })).into_response()
}

async fn children_post(
    State(drive): State<Arc<MockDrive>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut st = drive.state.lock().unwrap();
    if !st.items.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let requested = body["name"].as_str().unwrap_or_default().to_string();
    let name = dedupe_name(&st, Some(id.as_str()), &requested);
    let new_id = alloc_id(&mut st);
    let item = MockItem {
        id: new_id.clone(),
        name,
        parent: Some(id),
        folder: true,
        size: 0,
        mtime: String::new(),
        hash: None,
    };
    let rendered = item_json(&item);
    st.items.insert(new_id, item);
    st.mutations += 1;
    (StatusCode::CREATED, Json(rendered)).into_response()
}

async fn item_delete(
    State(drive): State<Arc<MockDrive>>,
    UrlPath(id): UrlPath<String>,
) -> StatusCode {
    let mut st = drive.state.lock().unwrap();
    if !st.items.contains_key(&id) {
        return StatusCode::NOT_FOUND;
    }
    let mut doomed = vec![id.clone()];
    let mut queue = vec![id];
    while let Some(current) = queue.pop() {
        let children: Vec<String> = st
            .items
            .values()
            .filter(|it| it.parent.as_deref() == Some(current.as_str()))
            .map(|it| it.id.clone())
            .collect();
        queue.extend(children.iter().cloned());
        doomed.extend(children);
    }
    for gone in doomed {
        st.items.remove(&gone);
    }
    st.mutations += 1;
    StatusCode::NO_CONTENT
}

fn session_mtime(body: &Value) -> String {
    body["item"]["fileSystemInfo"]["lastModifiedDateTime"]
        .as_str()
        .unwrap_or("2020-01-01T00:00:00.000Z")
        .to_string()
}

fn open_session(drive: &MockDrive, target: UploadTarget, mtime: String) -> Response {
    let base = drive.base.lock().unwrap().clone();
    let mut st = drive.state.lock().unwrap();
    let sid = alloc_id(&mut st);
    st.sessions.insert(
        sid.clone(),
        UploadSession {
            target,
            mtime,
            received: Vec::new(),
        },
    );
    Json(json!({ "uploadUrl": format!("{base}/upload/{sid}") })).into_response()
}

async fn item_session_post(
    State(drive): State<Arc<MockDrive>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<Value>,
) -> Response {
    if !drive.state.lock().unwrap().items.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let mtime = session_mtime(&body);
    open_session(&drive, UploadTarget::Existing(id), mtime)
}

async fn root_path_get(
    State(drive): State<Arc<MockDrive>>,
    UrlPath(full): UrlPath<String>,
) -> Response {
    let Some(rest) = full.strip_prefix("root:/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let st = drive.state.lock().unwrap();
    match resolve_path(&st, rest) {
        Some(id) => Json(item_json(&st.items[&id])).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "itemNotFound"}))).into_response(),
    }
}

async fn root_path_post(
    State(drive): State<Arc<MockDrive>>,
    UrlPath(full): UrlPath<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(rest) = full.strip_prefix("root:/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(target) = rest.strip_suffix(":/createUploadSession") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let target = target.trim_matches('/');
    let (parent_path, name) = match target.rsplit_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, target),
    };
    let parent = {
        let st = drive.state.lock().unwrap();
        match parent_path {
            Some(p) => match resolve_path(&st, p) {
                Some(id) => Some(id),
                None => return StatusCode::NOT_FOUND.into_response(),
            },
            None => None,
        }
    };
    let mtime = session_mtime(&body);
    open_session(
        &drive,
        UploadTarget::Create {
            parent,
            name: name.to_string(),
        },
        mtime,
    )
}

async fn upload_put(
    State(drive): State<Arc<MockDrive>>,
    UrlPath(sid): UrlPath<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let range = headers
        .get(axum::http::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    // "bytes a-b/total"
    let numbers = range.trim_start_matches("bytes ");
    let (span, total) = numbers.split_once('/').expect("range has a total");
    let (_, upper) = span.split_once('-').expect("range has a span");
    let upper: u64 = upper.parse().expect("numeric upper bound");
    let total: u64 = total.parse().expect("numeric total");

    let mut st = drive.state.lock().unwrap();
    st.chunk_ranges.push(range);
    let Some(session) = st.sessions.get_mut(&sid) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    session.received.extend_from_slice(&body);

    if upper + 1 < total {
        return (StatusCode::ACCEPTED, Json(json!({}))).into_response();
    }

    let session = st.sessions.remove(&sid).expect("session present");
    let mut h = QuickXorHash::new();
    h.update(&session.received);
    let hash = h.base64();

    let (id, name, parent) = match session.target {
        UploadTarget::Existing(id) => {
            let existing = st.items.get(&id).expect("existing item");
            (id.clone(), existing.name.clone(), existing.parent.clone())
        }
        UploadTarget::Create { parent, name } => {
            let name = dedupe_name(&st, parent.as_deref(), &name);
            let id = alloc_id(&mut st);
            (id, name, parent)
        }
    };
    let item = MockItem {
        id: id.clone(),
        name,
        parent,
        folder: false,
        size: session.received.len() as u64,
        mtime: session.mtime,
        hash: Some(hash),
    };
    let rendered = item_json(&item);
    st.items.insert(id, item);
    st.mutations += 1;
    (StatusCode::CREATED, Json(rendered)).into_response()
}

fn router(drive: Arc<MockDrive>) -> axum::Router {
    axum::Router::new()
        .route("/me/drives", axum::routing::get(get_drives))
        .route("/token", axum::routing::post(token_endpoint))
        .route(
            "/me/drive/items/:id/children",
            axum::routing::get(children_get).post(children_post),
        )
        .route(
            "/me/drive/items/:id/createUploadSession",
            axum::routing::post(item_session_post),
        )
        .route("/me/drive/items/:id", axum::routing::delete(item_delete))
        .route(
            "/me/drive/*rest",
            axum::routing::get(root_path_get).post(root_path_post),
        )
        .route("/upload/:sid", axum::routing::put(upload_put))
        .layer(axum::extract::DefaultBodyLimit::max(
            (UPLOAD_CHUNK_SIZE as usize) * 4,
        ))
        .with_state(drive)
}

struct Harness {
    drive: Arc<MockDrive>,
    cfg: Config,
    token_path: PathBuf,
    base: String,
    local: PathBuf,
}

impl Harness {
    async fn new(tag: &str) -> Self {
        let tmp = std::env::temp_dir().join(format!("drive-mirror-cycle-test-{tag}"));
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        let local = tmp.join("docs");
        std::fs::create_dir_all(&local).unwrap();

        let cfg_path = tmp.join("config.json");
        let cfg_json = json!({
            "client_id": "app-id",
            "client_secret": "app-secret",
            "synchronize": { "Docs": local.display().to_string() }
        });
        std::fs::write(&cfg_path, serde_json::to_vec_pretty(&cfg_json).unwrap()).unwrap();
        let cfg = Config::load(&cfg_path).unwrap();

        let token_path = cfg.token_path();
        save_token_file(
            &token_path,
            &TokenSet {
                access_token: "test-access".into(),
                refresh_token: Some("test-refresh".into()),
                expires_at: 9_999_999_999,
            },
        )
        .unwrap();

        let drive = Arc::new(MockDrive::default());
        drive.seed_folder("docs-id", "Docs", None);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(drive.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let base = format!("http://{addr}");
        *drive.base.lock().unwrap() = base.clone();

        Harness {
            drive,
            cfg,
            token_path,
            base,
            local,
        }
    }

    fn client(&self) -> DriveClient {
        DriveClient::with_endpoints(
            "app-id",
            "app-secret",
            &self.token_path,
            &self.base,
            &format!("{}/token", self.base),
        )
        .unwrap()
    }

    fn catalog(&self) -> Catalog {
        Catalog::open(&self.cfg.catalog_path()).unwrap()
    }
}

fn hash_of(data: &[u8]) -> String {
    let mut h = QuickXorHash::new();
    h.update(data);
    h.base64()
}

#[tokio::test]
async fn first_sync_of_a_clean_tree() {
    let h = Harness::new("s1").await;
    std::fs::write(h.local.join("a.txt"), b"x").unwrap();
    std::fs::create_dir_all(h.local.join("sub")).unwrap();
    let big_size = UPLOAD_CHUNK_SIZE + 1;
    std::fs::write(h.local.join("sub/b.txt"), vec![0x42; big_size as usize]).unwrap();

    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    assert_eq!(catalog.len(), 1);
    let root = catalog.root("Docs").expect("root in catalog");
    assert_eq!(root.remote_id, "docs-id");
    assert_eq!(root.local_path.as_deref(), Some(h.local.as_path()));

    let stats = mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    catalog.commit().unwrap();
    assert_eq!(catalog.len(), 4);
    assert_eq!(stats.remote_mutations, 3);

    // The big file went up in exactly two ranged chunks.
    let big_ranges: Vec<String> = h
        .drive
        .chunk_ranges()
        .into_iter()
        .filter(|r| r.ends_with(&format!("/{big_size}")))
        .collect();
    assert_eq!(
        big_ranges,
        vec![
            format!("bytes 0-{}/{}", UPLOAD_CHUNK_SIZE - 1, big_size),
            format!("bytes {}-{}/{}", UPLOAD_CHUNK_SIZE, big_size - 1, big_size),
        ]
    );

    let remote_b = h.drive.item_named("b.txt").expect("b.txt on the drive");
    assert_eq!(remote_b.size, big_size);
    assert_eq!(remote_b.hash.as_deref(), Some(hash_of(&vec![0x42; big_size as usize]).as_str()));

    // Nothing changed: the second pass issues zero remote mutations.
    let before = h.drive.mutations();
    let stats = mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 0);
    assert_eq!(h.drive.mutations(), before);
}

#[tokio::test]
async fn local_rename_updates_the_catalog_without_uploading() {
    let h = Harness::new("s2").await;
    std::fs::write(h.local.join("a.txt"), b"x").unwrap();

    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(catalog.len(), 2);

    std::fs::rename(h.local.join("a.txt"), h.local.join("A2.txt")).unwrap();

    let before = h.drive.mutations();
    let stats = mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 0);
    assert_eq!(h.drive.mutations(), before);

    let rows = catalog.children(Some("docs-id"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "A2.txt");
    assert_eq!(rows[0].local_path.as_deref(), Some(h.local.join("A2.txt").as_path()));
}

#[tokio::test]
async fn local_deletion_removes_the_remote_item_and_the_row() {
    let h = Harness::new("s3").await;
    std::fs::write(h.local.join("a.txt"), b"x").unwrap();

    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert!(h.drive.item_named("a.txt").is_some());

    std::fs::remove_file(h.local.join("a.txt")).unwrap();

    let stats = mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 1);
    assert!(h.drive.item_named("a.txt").is_none());
    assert_eq!(catalog.len(), 1);

    // Re-running yields no further changes.
    let stats = mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 0);
}

#[tokio::test]
async fn hash_mismatch_is_caught_only_with_check_hash() {
    let h = Harness::new("s5").await;
    let path = h.local.join("a.txt");
    std::fs::write(&path, b"abc").unwrap();

    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();

    // Corrupt in place: size preserved, mtime restored.
    let original_mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
    std::fs::write(&path, b"xyz").unwrap();
    let f = std::fs::File::options().write(true).open(&path).unwrap();
    f.set_modified(original_mtime).unwrap();
    drop(f);

    let stats = mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 0);

    let stats = mirror_trees(&h.cfg, &client, &mut catalog, true)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 1);

    let rows = catalog.children(Some("docs-id"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content_hash.as_deref(), Some(hash_of(b"xyz").as_str()));

    // The refreshed hash makes the next verified pass a no-op.
    let stats = mirror_trees(&h.cfg, &client, &mut catalog, true)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 0);
}

#[tokio::test]
async fn refresh_sweeps_items_deleted_remotely() {
    let h = Harness::new("s6").await;
    std::fs::write(h.local.join("a.txt"), b"x").unwrap();

    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(catalog.len(), 2);

    let remote = h.drive.item_named("a.txt").unwrap();
    h.drive.remove_item(&remote.id);

    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog.get(&remote.id).is_none());
}

#[tokio::test]
async fn throttled_refresh_retries_the_same_folder_without_losing_children() {
    let h = Harness::new("throttle").await;
    h.drive.seed_file("c-id", "c.txt", "docs-id", b"abc");
    h.drive.throttle_children_once("docs-id");

    let client = h.client();
    let mut catalog = h.catalog();
    let started = std::time::Instant::now();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));

    assert_eq!(catalog.len(), 2);
    let rows = catalog.children(Some("docs-id"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].remote_id, "c-id");
    assert_eq!(rows[0].content_hash.as_deref(), Some(hash_of(b"abc").as_str()));
}

#[tokio::test]
async fn upload_of_exactly_one_chunk_size_uses_a_single_chunk() {
    let h = Harness::new("chunk-boundary").await;
    let size = UPLOAD_CHUNK_SIZE;
    std::fs::write(h.local.join("even.bin"), vec![0x17; size as usize]).unwrap();

    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();

    let ranges: Vec<String> = h
        .drive
        .chunk_ranges()
        .into_iter()
        .filter(|r| r.ends_with(&format!("/{size}")))
        .collect();
    assert_eq!(ranges, vec![format!("bytes 0-{}/{}", size - 1, size)]);
}

#[tokio::test]
async fn empty_local_file_is_skipped_entirely() {
    let h = Harness::new("empty-skip").await;
    std::fs::write(h.local.join("empty.txt"), b"").unwrap();

    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();
    let stats = mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();
    assert_eq!(stats.remote_mutations, 0);
    assert_eq!(h.drive.mutations(), 0);
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn name_conflict_on_create_accepts_the_remote_rename() {
    let h = Harness::new("rename-on-conflict").await;
    let client = h.client();
    let mut catalog = h.catalog();
    refresh_catalog(&h.cfg, &client, &mut catalog).await.unwrap();

    // Created remotely after the refresh, so the catalog does not know it;
    // the local create must accept the remote's disambiguation suffix.
    h.drive.seed_folder("other-sub", "sub", Some("docs-id"));
    std::fs::create_dir_all(h.local.join("sub")).unwrap();
    std::fs::write(h.local.join("sub/inner.txt"), b"deep").unwrap();

    mirror_trees(&h.cfg, &client, &mut catalog, false)
        .await
        .unwrap();

    let rows = catalog.children(Some("docs-id"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "sub 1");

    // The child landed beneath the renamed folder, remotely and in the
    // catalog.
    let inner = catalog.children(Some(&rows[0].remote_id));
    assert_eq!(inner.len(), 1);
    assert_eq!(inner[0].name, "inner.txt");
    let remote_inner = h.drive.item_named("inner.txt").unwrap();
    assert_eq!(remote_inner.parent.as_deref(), Some(rows[0].remote_id.as_str()));
}
