use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use reqwest::StatusCode;
use smugmug_core::{NodeType, RemoteImage, RemoteNode, SmugClient, SmugError, UploadRequest};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fingerprint::{CacheError, FingerprintCache};
use crate::ignore::IgnorePatternSet;
use crate::pool::{KeyedLocks, TaskPool};
use crate::report::{self, ErrorKind, RunReport, TaskFailure};
use crate::scanner::{self, LocalEntry, LocalEntryKind, ScanError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("api error: {0}")]
    Api(#[from] SmugError),
    #[error("fingerprint cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("{0}")]
    Scan(#[from] ScanError),
    #[error("requires a {required} node but the remote \"{path}\" is a {found}")]
    TypeMismatch {
        path: String,
        required: NodeType,
        found: NodeType,
    },
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub delete: bool,
    pub detect_moves: bool,
    pub folder_threads: usize,
    pub file_threads: usize,
    pub upload_threads: usize,
    pub media_extensions: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        let defaults = crate::config::Defaults::default();
        Self {
            delete: false,
            detect_moves: true,
            folder_threads: defaults.folder_threads,
            file_threads: defaults.file_threads,
            upload_threads: defaults.upload_threads,
            media_extensions: defaults.media_extensions,
        }
    }
}

/// One local source directory mapped onto the destination.
///
/// `contents_only` carries the trailing-separator convention: `root/`
/// syncs the directory's contents straight into the destination node,
/// while `root` syncs into a destination child named after the source.
#[derive(Debug, Clone)]
pub struct SyncSource {
    pub dir: PathBuf,
    pub contents_only: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    pub failures: usize,
    pub orphans: usize,
}

#[derive(Debug, Clone)]
struct MoveCandidate {
    image_uri: String,
    album_uri: String,
}

/// Per-album record of which remote images this run accounted for; the
/// deletion pass treats everything else in the album as an orphan.
#[derive(Debug, Clone, Default)]
struct AlbumClaims {
    remote_path: String,
    local_names: HashSet<String>,
    claimed_uris: HashSet<String>,
}

/// Album image listing taken once per run; file tasks for the album all
/// diff against this snapshot.
struct AlbumSnapshot {
    images: Vec<RemoteImage>,
    by_name: HashMap<String, usize>,
    by_md5: HashMap<String, usize>,
}

impl AlbumSnapshot {
    fn new(images: Vec<RemoteImage>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_md5 = HashMap::new();
        for (index, image) in images.iter().enumerate() {
            by_name.entry(image.file_name.clone()).or_insert(index);
            let md5 = image.md5();
            if !md5.is_empty() {
                by_md5.entry(md5).or_insert(index);
            }
        }
        Self {
            images,
            by_name,
            by_md5,
        }
    }

    fn by_name(&self, name: &str) -> Option<&RemoteImage> {
        self.by_name.get(name).map(|&index| &self.images[index])
    }

    fn by_md5(&self, md5: &str) -> Option<&RemoteImage> {
        self.by_md5.get(md5).map(|&index| &self.images[index])
    }
}

/// Reconciles local directory trees against the remote node tree: creates
/// missing folders and albums, uploads new or changed files, detects
/// cross-album moves by md5, and (behind `--delete`) removes remote
/// images with no local counterpart.
pub struct SyncEngine {
    shared: Arc<Shared>,
}

struct Shared {
    client: Arc<SmugClient>,
    fingerprints: Arc<FingerprintCache>,
    ignore: IgnorePatternSet,
    report: Arc<RunReport>,
    folder_pool: TaskPool,
    file_pool: TaskPool,
    upload_pool: TaskPool,
    create_locks: KeyedLocks,
    children: Mutex<HashMap<String, HashMap<String, RemoteNode>>>,
    albums: Mutex<HashMap<String, Arc<AlbumSnapshot>>>,
    claims: Mutex<HashMap<String, AlbumClaims>>,
    move_index: Mutex<Option<Arc<HashMap<String, MoveCandidate>>>>,
    root_node: RemoteNode,
    opts: SyncOptions,
    cancel: CancellationToken,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<SmugClient>,
        fingerprints: Arc<FingerprintCache>,
        ignore: IgnorePatternSet,
        root_node: RemoteNode,
        opts: SyncOptions,
        report: Arc<RunReport>,
        cancel: CancellationToken,
    ) -> Self {
        let folder_pool = TaskPool::new(
            "folder",
            opts.folder_threads,
            None,
            report.clone(),
            cancel.clone(),
        );
        // Bounded intake: folder workers block here before the file
        // pipeline outgrows memory on deep trees.
        let file_pool = TaskPool::new(
            "file",
            opts.file_threads,
            Some(opts.file_threads.max(1) * 4),
            report.clone(),
            cancel.clone(),
        );
        let upload_pool = TaskPool::new(
            "upload",
            opts.upload_threads,
            None,
            report.clone(),
            cancel.clone(),
        );
        Self {
            shared: Arc::new(Shared {
                client,
                fingerprints,
                ignore,
                report,
                folder_pool,
                file_pool,
                upload_pool,
                create_locks: KeyedLocks::default(),
                children: Mutex::new(HashMap::new()),
                albums: Mutex::new(HashMap::new()),
                claims: Mutex::new(HashMap::new()),
                move_index: Mutex::new(None),
                root_node,
                opts,
                cancel,
            }),
        }
    }

    pub async fn sync(
        &self,
        sources: Vec<SyncSource>,
        dest: RemoteNode,
        dest_path: &str,
    ) -> Result<SyncOutcome, EngineError> {
        let shared = &self.shared;
        let mut roots = Vec::new();
        for source in sources {
            if shared.cancel.is_cancelled() {
                break;
            }
            let (target, target_path) = if source.contents_only {
                (dest.clone(), dest_path.to_string())
            } else {
                let Some(name) = source
                    .dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                else {
                    shared.report.record(TaskFailure::new(
                        source.dir.display().to_string(),
                        ErrorKind::LocalIo,
                        "source path has no base name",
                    ));
                    continue;
                };
                let child_path = join_remote(dest_path, &name);
                match shared
                    .prepare_destination(&dest, &name, &source.dir, &child_path)
                    .await
                {
                    Ok(Some(node)) => (node, child_path),
                    Ok(None) => {
                        println!("Nothing to sync in \"{}\".", source.dir.display());
                        continue;
                    }
                    Err(err) => {
                        let path = source.dir.display().to_string();
                        shared.report.record(failure_for(&path, err));
                        continue;
                    }
                }
            };

            let label = source.dir.display().to_string();
            let task = shared.clone().run_folder(
                source.dir.clone(),
                target,
                target_path,
            );
            if let Some(handle) = shared.folder_pool.submit(label, task).await {
                roots.push(handle);
            }
        }

        for result in futures_util::future::join_all(roots).await {
            if let Err(join_err) = result {
                shared.report.record(TaskFailure::new(
                    dest_path,
                    ErrorKind::LocalIo,
                    format!("task aborted: {join_err}"),
                ));
            }
        }

        let orphans = shared.reconcile_orphans().await;
        shared.fingerprints.flush().await?;

        Ok(SyncOutcome {
            failures: shared.report.len(),
            orphans,
        })
    }
}

impl Shared {
    /// Step A: resolves or creates the destination child a non-slash
    /// source maps onto, typed after the source directory's contents.
    async fn prepare_destination(
        &self,
        parent: &RemoteNode,
        name: &str,
        local_dir: &Path,
        remote_path: &str,
    ) -> Result<Option<RemoteNode>, EngineError> {
        if parent.node_type != NodeType::Folder {
            return Err(EngineError::TypeMismatch {
                path: remote_path.to_string(),
                required: NodeType::Folder,
                found: parent.node_type,
            });
        }
        let Some(required) = self.classify_dir(local_dir).await? else {
            return Ok(None);
        };
        let node = self.ensure_child(parent, name, required, remote_path).await?;
        Ok(Some(node))
    }

    /// Peeks one level into a local directory to decide what kind of
    /// remote node it needs. `None` means there is nothing to sync.
    async fn classify_dir(&self, dir: &Path) -> Result<Option<NodeType>, EngineError> {
        let entries = scanner::scan(dir, &self.ignore).await?;
        let mut has_dirs = false;
        let mut has_files = false;
        for entry in &entries {
            match &entry.kind {
                LocalEntryKind::Dir => has_dirs = true,
                LocalEntryKind::File { .. }
                    if scanner::is_media(&entry.file_name, &self.opts.media_extensions) =>
                {
                    has_files = true
                }
                _ => {}
            }
        }
        if has_dirs {
            Ok(Some(NodeType::Folder))
        } else if has_files {
            Ok(Some(NodeType::Album))
        } else {
            Ok(None)
        }
    }

    /// Looks up or creates a child node, serialized per `(parent, name)`
    /// so concurrent discoveries issue exactly one create call.
    async fn ensure_child(
        &self,
        parent: &RemoteNode,
        name: &str,
        required: NodeType,
        remote_path: &str,
    ) -> Result<RemoteNode, EngineError> {
        let _guard = self.create_locks.acquire(&parent.uri, name).await;
        if let Some(existing) = self.child_by_name(parent, name).await? {
            if existing.node_type == required {
                return Ok(existing);
            }
            return Err(EngineError::TypeMismatch {
                path: remote_path.to_string(),
                required,
                found: existing.node_type,
            });
        }
        let created = self.client.create_node(parent, name, required).await?;
        println!(
            "Created {} \"{}\".",
            match required {
                NodeType::Album => "album",
                _ => "folder",
            },
            remote_path
        );
        self.remember_child(&parent.uri, created.clone()).await;
        Ok(created)
    }

    async fn child_by_name(
        &self,
        parent: &RemoteNode,
        name: &str,
    ) -> Result<Option<RemoteNode>, EngineError> {
        Ok(self.children_of(parent).await?.get(name).cloned())
    }

    /// Remote children listing, cached per node for the run. The first
    /// listing wins; creations append to the cached map.
    async fn children_of(
        &self,
        parent: &RemoteNode,
    ) -> Result<HashMap<String, RemoteNode>, EngineError> {
        if let Some(map) = self.children.lock().await.get(&parent.uri) {
            return Ok(map.clone());
        }
        let listed = self.client.list_children(parent, None).await?;
        let map: HashMap<String, RemoteNode> = listed
            .into_iter()
            .map(|node| (node.name.clone(), node))
            .collect();
        let mut cache = self.children.lock().await;
        Ok(cache.entry(parent.uri.clone()).or_insert(map).clone())
    }

    async fn remember_child(&self, parent_uri: &str, node: RemoteNode) {
        let mut cache = self.children.lock().await;
        cache
            .entry(parent_uri.to_string())
            .or_default()
            .insert(node.name.clone(), node);
    }

    /// Step B: reconcile one `(local_dir, remote_node)` pair and fan out.
    fn run_folder(
        self: Arc<Self>,
        local_dir: PathBuf,
        node: RemoteNode,
        remote_path: String,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<JoinHandle<()>>, TaskFailure>> + Send>> {
        Box::pin(async move {
        if self.cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let entries = scanner::scan(&local_dir, &self.ignore).await.map_err(|err| {
            TaskFailure::new(
                local_dir.display().to_string(),
                ErrorKind::LocalIo,
                err.to_string(),
            )
        })?;

        let mut subdirs = Vec::new();
        let mut files = Vec::new();
        for entry in entries {
            if matches!(entry.kind, LocalEntryKind::Ignored) {
                println!("Skipping ignored path \"{}\".", entry.path.display());
            } else if matches!(entry.kind, LocalEntryKind::Dir) {
                subdirs.push(entry);
            } else if scanner::is_media(&entry.file_name, &self.opts.media_extensions) {
                files.push(entry);
            }
        }

        let mut handles = Vec::new();
        match node.node_type {
            NodeType::Album => {
                for dir in &subdirs {
                    self.report.record(TaskFailure::new(
                        dir.path.display().to_string(),
                        ErrorKind::TypeMismatch,
                        format!("album \"{remote_path}\" cannot contain sub-folders"),
                    ));
                }
                let Some(album_uri) = node.album_uri().map(str::to_string) else {
                    return Err(TaskFailure::new(
                        remote_path,
                        ErrorKind::TypeMismatch,
                        "node reports type Album but carries no album uri",
                    ));
                };
                self.register_album(
                    &album_uri,
                    &remote_path,
                    files.iter().map(|file| file.file_name.clone()),
                )
                .await;
                for file in files {
                    let label = file.path.display().to_string();
                    let task = Box::pin(self.clone().run_file(
                        file,
                        album_uri.clone(),
                        remote_path.clone(),
                    ));
                    if let Some(handle) = self.file_pool.submit(label, task).await {
                        handles.push(handle);
                    }
                }
            }
            NodeType::Folder => {
                if !files.is_empty() && !subdirs.is_empty() {
                    for file in files.drain(..) {
                        self.report.record(TaskFailure::new(
                            file.path.display().to_string(),
                            ErrorKind::MixedContent,
                            format!(
                                "\"{}\" holds both files and sub-directories; its files cannot sync",
                                local_dir.display()
                            ),
                        ));
                    }
                } else if !files.is_empty() {
                    self.report.record(TaskFailure::new(
                        local_dir.display().to_string(),
                        ErrorKind::TypeMismatch,
                        format!(
                            "remote node \"{remote_path}\" is a folder; media files require an album"
                        ),
                    ));
                    files.clear();
                }
                for dir in subdirs {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let child_path = join_remote(&remote_path, &dir.file_name);
                    let required = match self.classify_dir(&dir.path).await {
                        Ok(Some(required)) => required,
                        Ok(None) => continue,
                        Err(err) => {
                            self.report
                                .record(failure_for(&dir.path.display().to_string(), err));
                            continue;
                        }
                    };
                    let child = match self
                        .ensure_child(&node, &dir.file_name, required, &child_path)
                        .await
                    {
                        Ok(child) => child,
                        Err(err) => {
                            self.report
                                .record(failure_for(&dir.path.display().to_string(), err));
                            continue;
                        }
                    };
                    let label = dir.path.display().to_string();
                    let task = self.clone().run_folder(dir.path, child, child_path);
                    if let Some(handle) = self.folder_pool.submit(label, task).await {
                        handles.push(handle);
                    }
                }
            }
            other => {
                return Err(TaskFailure::new(
                    remote_path,
                    ErrorKind::TypeMismatch,
                    format!("cannot sync into a node of type {other}"),
                ));
            }
        }
        Ok(handles)
        })
    }

    /// Step C: decide whether a local file is unchanged, replaced,
    /// renamed, moved from another album, or new.
    async fn run_file(
        self: Arc<Self>,
        entry: LocalEntry,
        album_uri: String,
        album_path: String,
    ) -> Result<Vec<JoinHandle<()>>, TaskFailure> {
        if self.cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let label = entry.path.display().to_string();
        let LocalEntryKind::File { size, .. } = entry.kind else {
            return Ok(Vec::new());
        };
        let snapshot = self
            .album_snapshot(&album_uri)
            .await
            .map_err(|err| failure_for(&label, err))?;

        let mut local_md5: Option<String> = None;

        if let Some(image) = snapshot.by_name(&entry.file_name) {
            let image_uri = image.image_uri().to_string();
            self.claim_image(&album_uri, &image_uri).await;

            if image.archived_size == size {
                let remote_md5 = match self.fingerprints.get(&image_uri).await {
                    Some(md5) => md5,
                    None => image.md5(),
                };
                if !remote_md5.is_empty() {
                    let md5 = self.local_md5(&entry.path, &mut local_md5).await?;
                    if md5 == remote_md5 {
                        return Ok(Vec::new());
                    }
                }
            }

            let md5 = self.local_md5(&entry.path, &mut local_md5).await?;
            let handle = self
                .schedule_upload(entry, album_uri, album_path, md5, Some(image_uri))
                .await;
            return Ok(handle.into_iter().collect());
        }

        let md5 = self.local_md5(&entry.path, &mut local_md5).await?;

        if self.opts.detect_moves {
            if let Some(image) = snapshot.by_md5(&md5) {
                // Renamed on disk; prefer keeping the remote image.
                self.claim_image(&album_uri, image.image_uri()).await;
                println!(
                    "\"{}\" already in \"{}\" as \"{}\"; keeping the remote name.",
                    entry.path.display(),
                    album_path,
                    image.file_name
                );
                return Ok(Vec::new());
            }
            let candidate = self
                .find_move_candidate(&md5, &album_uri)
                .await
                .map_err(|err| failure_for(&label, err))?;
            if let Some(candidate) = candidate {
                match self
                    .client
                    .change_image_album(&candidate.image_uri, &album_uri)
                    .await
                {
                    Ok(()) => {
                        self.claim_image(&album_uri, &candidate.image_uri).await;
                        println!(
                            "Moved remote image to \"{}\" from another album.",
                            join_remote(&album_path, &entry.file_name)
                        );
                        return Ok(Vec::new());
                    }
                    Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => {
                        // Stale index entry; upload instead.
                    }
                    Err(err) => {
                        return Err(TaskFailure::new(
                            label,
                            report::kind_for_api(&err),
                            err.to_string(),
                        ));
                    }
                }
            }
        }

        let handle = self
            .schedule_upload(entry, album_uri, album_path, md5, None)
            .await;
        Ok(handle.into_iter().collect())
    }

    async fn schedule_upload(
        self: Arc<Self>,
        entry: LocalEntry,
        album_uri: String,
        album_path: String,
        md5: String,
        replace_uri: Option<String>,
    ) -> Option<JoinHandle<()>> {
        let label = entry.path.display().to_string();
        let task = Box::pin(self.clone().run_upload(
            entry,
            album_uri,
            album_path,
            md5,
            replace_uri,
        ));
        self.upload_pool.submit(label, task).await
    }

    /// Step D: push the bytes. A replace whose image URI answers 404 means
    /// the snapshot went stale; the album cache is dropped and the file
    /// goes up as a fresh image instead.
    async fn run_upload(
        self: Arc<Self>,
        entry: LocalEntry,
        album_uri: String,
        album_path: String,
        md5: String,
        replace_uri: Option<String>,
    ) -> Result<Vec<JoinHandle<()>>, TaskFailure> {
        if self.cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let label = entry.path.display().to_string();
        let LocalEntryKind::File { size, .. } = entry.kind else {
            return Ok(Vec::new());
        };

        if let Some(stale) = &replace_uri {
            self.fingerprints
                .remove(stale)
                .await
                .map_err(|err| TaskFailure::new(label.clone(), ErrorKind::LocalIo, err.to_string()))?;
        }

        let request = UploadRequest {
            album_uri: &album_uri,
            file_path: &entry.path,
            file_name: &entry.file_name,
            size,
            md5_hex: &md5,
            keywords: None,
            replace_uri: replace_uri.as_deref(),
        };
        let uploaded = match self.client.upload_image(request).await {
            Ok(uploaded) => uploaded,
            Err(err) if replace_uri.is_some() && err.status() == Some(StatusCode::NOT_FOUND) => {
                self.invalidate_album(&album_uri).await;
                let fresh = UploadRequest {
                    replace_uri: None,
                    ..request
                };
                self.client.upload_image(fresh).await.map_err(|err| {
                    TaskFailure::new(label.clone(), report::kind_for_api(&err), err.to_string())
                })?
            }
            Err(err) => {
                return Err(TaskFailure::new(
                    label,
                    report::kind_for_api(&err),
                    err.to_string(),
                ));
            }
        };

        self.fingerprints
            .insert(&uploaded.image_uri, &md5)
            .await
            .map_err(|err| TaskFailure::new(label.clone(), ErrorKind::LocalIo, err.to_string()))?;
        self.claim_image(&album_uri, &uploaded.image_uri).await;
        if replace_uri.is_some() {
            println!("Re-uploaded \"{}\".", entry.path.display());
        } else {
            println!("Uploaded \"{}\" to \"{}\".", entry.path.display(), album_path);
        }
        Ok(Vec::new())
    }

    async fn local_md5(
        &self,
        path: &Path,
        memo: &mut Option<String>,
    ) -> Result<String, TaskFailure> {
        if let Some(md5) = memo {
            return Ok(md5.clone());
        }
        let digest = scanner::file_md5(path).await.map_err(|err| {
            TaskFailure::new(
                path.display().to_string(),
                ErrorKind::LocalIo,
                err.to_string(),
            )
        })?;
        *memo = Some(digest.clone());
        Ok(digest)
    }

    async fn album_snapshot(&self, album_uri: &str) -> Result<Arc<AlbumSnapshot>, EngineError> {
        if let Some(snapshot) = self.albums.lock().await.get(album_uri) {
            return Ok(snapshot.clone());
        }
        let images = self.client.list_album_images(album_uri).await?;
        for image in &images {
            let md5 = image.md5();
            if !md5.is_empty() {
                self.fingerprints.insert(image.image_uri(), &md5).await?;
            }
        }
        let snapshot = Arc::new(AlbumSnapshot::new(images));
        let mut cache = self.albums.lock().await;
        Ok(cache
            .entry(album_uri.to_string())
            .or_insert(snapshot)
            .clone())
    }

    async fn invalidate_album(&self, album_uri: &str) {
        self.albums.lock().await.remove(album_uri);
    }

    async fn register_album(
        &self,
        album_uri: &str,
        remote_path: &str,
        names: impl Iterator<Item = String>,
    ) {
        let mut claims = self.claims.lock().await;
        let entry = claims.entry(album_uri.to_string()).or_default();
        entry.remote_path = remote_path.to_string();
        entry.local_names.extend(names);
    }

    async fn claim_image(&self, album_uri: &str, image_uri: &str) {
        let mut claims = self.claims.lock().await;
        claims
            .entry(album_uri.to_string())
            .or_default()
            .claimed_uris
            .insert(image_uri.to_string());
    }

    /// Whole-user md5 index for cross-album move detection; built lazily
    /// on the first file that is absent from its album, then shared.
    async fn find_move_candidate(
        &self,
        md5: &str,
        current_album: &str,
    ) -> Result<Option<MoveCandidate>, EngineError> {
        let index = {
            let mut guard = self.move_index.lock().await;
            match guard.as_ref() {
                Some(index) => index.clone(),
                None => {
                    let built = Arc::new(self.build_move_index().await?);
                    *guard = Some(built.clone());
                    built
                }
            }
        };
        Ok(index
            .get(md5)
            .filter(|candidate| candidate.album_uri != current_album)
            .cloned())
    }

    async fn build_move_index(&self) -> Result<HashMap<String, MoveCandidate>, EngineError> {
        let mut map: HashMap<String, MoveCandidate> = HashMap::new();
        let mut stack = vec![self.root_node.clone()];
        while let Some(node) = stack.pop() {
            if self.cancel.is_cancelled() {
                break;
            }
            match node.node_type {
                NodeType::Folder => {
                    let children = self.children_of(&node).await?;
                    stack.extend(children.into_values());
                }
                NodeType::Album => {
                    let Some(album_uri) = node.album_uri().map(str::to_string) else {
                        continue;
                    };
                    let snapshot = self.album_snapshot(&album_uri).await?;
                    for image in &snapshot.images {
                        let md5 = image.md5();
                        if md5.is_empty() {
                            continue;
                        }
                        map.entry(md5).or_insert_with(|| MoveCandidate {
                            image_uri: image.image_uri().to_string(),
                            album_uri: album_uri.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(map)
    }

    /// Step E: per touched album, re-list and report or delete images
    /// with no local counterpart and no move claim.
    async fn reconcile_orphans(&self) -> usize {
        let claims: Vec<(String, AlbumClaims)> = self
            .claims
            .lock()
            .await
            .iter()
            .map(|(uri, claim)| (uri.clone(), claim.clone()))
            .collect();

        let mut orphans = 0usize;
        for (album_uri, claim) in claims {
            if self.cancel.is_cancelled() {
                break;
            }
            let images = match self.client.list_album_images(&album_uri).await {
                Ok(images) => images,
                Err(err) => {
                    self.report.record(TaskFailure::new(
                        claim.remote_path.clone(),
                        report::kind_for_api(&err),
                        err.to_string(),
                    ));
                    continue;
                }
            };
            for image in images {
                if claim.local_names.contains(&image.file_name)
                    || claim.claimed_uris.contains(image.image_uri())
                {
                    continue;
                }
                orphans += 1;
                let display = join_remote(&claim.remote_path, &image.file_name);
                if self.opts.delete {
                    match self.client.delete_image(image.image_uri()).await {
                        Ok(()) => {
                            if let Err(err) = self.fingerprints.remove(image.image_uri()).await {
                                self.report.record(TaskFailure::new(
                                    display.clone(),
                                    ErrorKind::LocalIo,
                                    err.to_string(),
                                ));
                            }
                            println!("Deleted remote image \"{display}\".");
                        }
                        Err(err) => {
                            self.report.record(TaskFailure::new(
                                display,
                                report::kind_for_api(&err),
                                err.to_string(),
                            ));
                        }
                    }
                } else {
                    println!(
                        "Remote image \"{display}\" has no local counterpart; pass --delete to remove it."
                    );
                }
            }
        }
        orphans
    }
}

fn failure_for(path: &str, err: EngineError) -> TaskFailure {
    let kind = match &err {
        EngineError::Api(api) => report::kind_for_api(api),
        EngineError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
        EngineError::Cache(_) | EngineError::Scan(_) => ErrorKind::LocalIo,
    };
    TaskFailure::new(path, kind, err.to_string())
}

fn join_remote(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
