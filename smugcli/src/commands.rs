use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use smugmug_core::{NodeType, OAuth1Flow, OAuth1Signer, SmugClient, UploadRequest};
use tokio_util::sync::CancellationToken;

use crate::config::{self, ConfigDir, Credentials};
use crate::fingerprint::FingerprintCache;
use crate::ignore::{self, IgnorePatternSet};
use crate::report::RunReport;
use crate::resolver::{PathResolver, ResolveError};
use crate::scanner;
use crate::sync::{SyncEngine, SyncOptions, SyncSource};

const MAX_FOLDER_DEPTH: usize = 5;

#[derive(Parser)]
#[command(name = "smugcli", version, about = "Command line tool for SmugMug")]
pub struct Cli {
    /// Log every HTTP request to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log into SmugMug via the OAuth1 three-legged flow
    Login {
        /// SmugMug API key
        #[arg(long)]
        key: String,
        /// SmugMug API secret
        #[arg(long)]
        secret: String,
    },
    /// Forget the saved OAuth credentials
    Logout,
    /// List the children of a remote node
    Ls {
        path: Option<String>,
        /// SmugMug user; defaults to the logged-in user
        #[arg(short, long)]
        user: Option<String>,
        /// Print the values selected by a dotted query, e.g. "Uris.Album.Uri"
        #[arg(long)]
        query: Option<String>,
        /// Print full node records as JSON
        #[arg(short = 'l')]
        details: bool,
    },
    /// Create folders
    Mkdir {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Create missing intermediate folders
        #[arg(short = 'p')]
        parents: bool,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Create albums; intermediate segments become folders
    Mkalbum {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Create missing intermediate folders
        #[arg(short = 'p')]
        parents: bool,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Remove empty folders or albums
    Rmdir {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Also remove parents that become empty
        #[arg(short = 'p')]
        parents: bool,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Remove nodes
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Do not ask for confirmation
        #[arg(short = 'f')]
        force: bool,
        /// Also remove parents that become empty
        #[arg(short = 'p')]
        prune: bool,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Upload files into an album
    Upload {
        /// Files to upload, followed by the destination album path
        #[arg(required = true, num_args = 2..)]
        args: Vec<String>,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Mirror local directory trees into the remote tree
    Sync {
        /// Source directories, followed by the destination path
        #[arg(required = true)]
        args: Vec<String>,
        /// Delete remote images with no local counterpart
        #[arg(long)]
        delete: bool,
        #[arg(long = "folder_threads")]
        folder_threads: Option<usize>,
        #[arg(long = "file_threads")]
        file_threads: Option<usize>,
        #[arg(long = "upload_threads")]
        upload_threads: Option<usize>,
        /// Persist the thread counts as defaults and exit
        #[arg(long = "set_defaults")]
        set_defaults: bool,
        /// Upload duplicates instead of moving matching images across albums
        #[arg(long)]
        no_detect_moves: bool,
        /// Skip the confirmation prompt
        #[arg(short = 'f', long)]
        force: bool,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Exclude local paths from sync
    Ignore {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Re-include previously ignored local paths
    Include {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

/// Runs one verb. `Ok(true)` means a fully clean run (exit 0), `Ok(false)`
/// a run with reported task failures (exit 1); `Err` is a hard failure.
pub async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config_dir = ConfigDir::locate()?;
    match cli.command {
        Command::Login { key, secret } => {
            login(&config_dir, key, secret).await?;
            Ok(true)
        }
        Command::Logout => {
            if config::delete_credentials(&config_dir)? {
                println!("Logged out.");
            } else {
                println!("No saved credentials.");
            }
            Ok(true)
        }
        Command::Ignore { paths } => ignore_paths(&config_dir, paths, true),
        Command::Include { paths } => ignore_paths(&config_dir, paths, false),
        Command::Ls {
            path,
            user,
            query,
            details,
        } => {
            let session = Session::open(&config_dir, cli.verbose)?;
            session.ls(path, user, query, details).await
        }
        Command::Mkdir {
            paths,
            parents,
            user,
        } => {
            let session = Session::open(&config_dir, cli.verbose)?;
            session
                .make_nodes(paths, parents, NodeType::Folder, user)
                .await
        }
        Command::Mkalbum {
            paths,
            parents,
            user,
        } => {
            let session = Session::open(&config_dir, cli.verbose)?;
            session
                .make_nodes(paths, parents, NodeType::Album, user)
                .await
        }
        Command::Rmdir {
            paths,
            parents,
            user,
        } => {
            let session = Session::open(&config_dir, cli.verbose)?;
            session.rmdir(paths, parents, user).await
        }
        Command::Rm {
            paths,
            force,
            prune,
            user,
        } => {
            let session = Session::open(&config_dir, cli.verbose)?;
            session.rm(paths, force, prune, user).await
        }
        Command::Upload { args, user } => {
            let session = Session::open(&config_dir, cli.verbose)?;
            session.upload(args, user).await
        }
        Command::Sync {
            args,
            delete,
            folder_threads,
            file_threads,
            upload_threads,
            set_defaults,
            no_detect_moves,
            force,
            user,
        } => {
            if set_defaults {
                let mut defaults = config::load_defaults(&config_dir)?;
                if let Some(threads) = folder_threads {
                    defaults.folder_threads = threads;
                }
                if let Some(threads) = file_threads {
                    defaults.file_threads = threads;
                }
                if let Some(threads) = upload_threads {
                    defaults.upload_threads = threads;
                }
                config::save_defaults(&config_dir, &defaults)?;
                println!("Defaults updated.");
                return Ok(true);
            }
            let session = Session::open(&config_dir, cli.verbose)?;
            session
                .sync(
                    &config_dir,
                    args,
                    SyncFlags {
                        delete,
                        folder_threads,
                        file_threads,
                        upload_threads,
                        no_detect_moves,
                        force,
                        user,
                    },
                )
                .await
        }
    }
}

struct SyncFlags {
    delete: bool,
    folder_threads: Option<usize>,
    file_threads: Option<usize>,
    upload_threads: Option<usize>,
    no_detect_moves: bool,
    force: bool,
    user: Option<String>,
}

struct Session {
    client: Arc<SmugClient>,
    resolver: PathResolver,
}

impl Session {
    fn open(config_dir: &ConfigDir, verbose: bool) -> anyhow::Result<Self> {
        let credentials = config::load_credentials(config_dir)?
            .context("not logged in; run \"smugcli login --key KEY --secret SECRET\" first")?;
        let signer = OAuth1Signer::new(&credentials.api_key, &credentials.api_secret)
            .with_token(&credentials.access_token, &credentials.token_secret);
        let client = Arc::new(SmugClient::new(signer)?.verbose(verbose));
        Ok(Self {
            resolver: PathResolver::new(client.clone()),
            client,
        })
    }

    async fn user(&self, explicit: &Option<String>) -> anyhow::Result<String> {
        match explicit {
            Some(user) => Ok(user.clone()),
            None => Ok(self.client.authuser().await?.nick_name),
        }
    }

    async fn ls(
        &self,
        path: Option<String>,
        user: Option<String>,
        query: Option<String>,
        details: bool,
    ) -> anyhow::Result<bool> {
        let user = self.user(&user).await?;
        let path = path.unwrap_or_else(|| "/".to_string());
        let node = match self.resolver.resolve(&user, &path).await {
            Ok(node) => node,
            Err(ResolveError::NotFound { segment, parent }) => {
                println!("\"{segment}\" not found in \"{parent}\".");
                return Ok(false);
            }
            Err(ResolveError::Api(err)) => return Err(err.into()),
        };

        if node.node_type == NodeType::Album {
            let album_uri = node
                .album_uri()
                .context("album node carries no album uri")?;
            for image in self.client.list_album_images(album_uri).await? {
                let json = serde_json::to_value(&image).expect("image serialize");
                render_entry(&image.file_name, &json, &query, details);
            }
        } else {
            for child in self.client.list_children(&node, None).await? {
                let json = serde_json::to_value(&child).expect("node serialize");
                render_entry(&child.name, &json, &query, details);
            }
        }
        Ok(true)
    }

    async fn make_nodes(
        &self,
        paths: Vec<String>,
        parents: bool,
        leaf_type: NodeType,
        user: Option<String>,
    ) -> anyhow::Result<bool> {
        let user = self.user(&user).await?;
        let mut clean = true;
        for path in paths {
            let (mut node, remaining) = self.resolver.resolve_or_parent(&user, &path).await?;
            if remaining.is_empty() {
                println!("Path \"{path}\" already exists.");
                clean = false;
                continue;
            }
            if remaining.len() > 1 && !parents {
                println!(
                    "\"{}\" not found in \"{}\"; pass -p to create intermediate folders.",
                    remaining[0], node.name
                );
                clean = false;
                continue;
            }
            if node.node_type != NodeType::Folder {
                println!(
                    "Cannot create \"{path}\": \"{}\" is a {} and cannot have child nodes.",
                    node.name, node.node_type
                );
                clean = false;
                continue;
            }
            let segments = PathResolver::split_segments(&path);
            let mut folder_depth = segments.len();
            if leaf_type == NodeType::Album {
                folder_depth -= 1;
            }
            if folder_depth > MAX_FOLDER_DEPTH {
                println!(
                    "Cannot create \"{path}\": SmugMug folders can be at most {MAX_FOLDER_DEPTH} levels deep."
                );
                clean = false;
                continue;
            }

            let matched = segments.len() - remaining.len();
            for (index, segment) in remaining.iter().enumerate() {
                let node_type = if index == remaining.len() - 1 {
                    leaf_type
                } else {
                    NodeType::Folder
                };
                node = self.client.create_node(&node, segment, node_type).await?;
                let created_path = format!("/{}", segments[..matched + index + 1].join("/"));
                println!(
                    "Created {} \"{created_path}\".",
                    if node_type == NodeType::Album {
                        "album"
                    } else {
                        "folder"
                    }
                );
                self.resolver
                    .cache_node(&user, &created_path, node.clone())
                    .await;
            }
        }
        Ok(clean)
    }

    async fn rmdir(
        &self,
        paths: Vec<String>,
        parents: bool,
        user: Option<String>,
    ) -> anyhow::Result<bool> {
        let user = self.user(&user).await?;
        let mut clean = true;
        'paths: for path in paths {
            let mut segments = PathResolver::split_segments(&path);
            if segments.is_empty() {
                println!("Cannot remove the root node.");
                clean = false;
                continue;
            }
            loop {
                let current = format!("/{}", segments.join("/"));
                let node = match self.resolver.resolve(&user, &current).await {
                    Ok(node) => node,
                    Err(ResolveError::NotFound { .. }) => {
                        println!("Folder or album \"{current}\" not found.");
                        clean = false;
                        continue 'paths;
                    }
                    Err(ResolveError::Api(err)) => return Err(err.into()),
                };
                let empty = match node.node_type {
                    NodeType::Folder => {
                        self.client.list_children(&node, None).await?.is_empty()
                    }
                    NodeType::Album => match node.album_uri() {
                        Some(album_uri) => {
                            self.client.list_album_images(album_uri).await?.is_empty()
                        }
                        None => true,
                    },
                    other => {
                        println!("Cannot remove \"{current}\": node is a {other}.");
                        clean = false;
                        continue 'paths;
                    }
                };
                if !empty {
                    println!(
                        "Cannot remove {}: \"{current}\" is not empty.",
                        node.node_type.to_string().to_lowercase()
                    );
                    clean = false;
                    continue 'paths;
                }
                println!("Removing \"{current}\".");
                self.client.delete_node(&node.uri).await?;

                segments.pop();
                if !parents || segments.is_empty() {
                    continue 'paths;
                }
            }
        }
        Ok(clean)
    }

    async fn rm(
        &self,
        paths: Vec<String>,
        force: bool,
        prune: bool,
        user: Option<String>,
    ) -> anyhow::Result<bool> {
        let user = self.user(&user).await?;
        let mut clean = true;
        for path in paths {
            let node = match self.resolver.resolve(&user, &path).await {
                Ok(node) => node,
                Err(ResolveError::NotFound { .. }) => {
                    println!("\"{path}\" not found.");
                    clean = false;
                    continue;
                }
                Err(ResolveError::Api(err)) => return Err(err.into()),
            };
            let kind = node.node_type.to_string().to_lowercase();
            if !force && !confirm(&format!("Remove {kind} \"{path}\"? "))? {
                continue;
            }
            println!("Removing {kind} \"{path}\".");
            self.client.delete_node(&node.uri).await?;
            if prune {
                self.prune_empty_parents(&user, &path).await?;
            }
        }
        Ok(clean)
    }

    async fn prune_empty_parents(&self, user: &str, path: &str) -> anyhow::Result<()> {
        let mut segments = PathResolver::split_segments(path);
        segments.pop();
        while !segments.is_empty() {
            let current = format!("/{}", segments.join("/"));
            let node = match self.resolver.resolve(user, &current).await {
                Ok(node) => node,
                Err(_) => break,
            };
            if node.node_type != NodeType::Folder
                || !self.client.list_children(&node, None).await?.is_empty()
            {
                break;
            }
            println!("Removing \"{current}\".");
            self.client.delete_node(&node.uri).await?;
            segments.pop();
        }
        Ok(())
    }

    async fn upload(&self, mut args: Vec<String>, user: Option<String>) -> anyhow::Result<bool> {
        let album_path = args.pop().expect("clap enforces at least two arguments");
        let user = self.user(&user).await?;
        let node = match self.resolver.resolve(&user, &album_path).await {
            Ok(node) => node,
            Err(ResolveError::NotFound { .. }) => {
                println!("Album not found: \"{album_path}\".");
                return Ok(false);
            }
            Err(ResolveError::Api(err)) => return Err(err.into()),
        };
        if node.node_type != NodeType::Album {
            println!(
                "Cannot upload images into a node of type \"{}\".",
                node.node_type
            );
            return Ok(false);
        }
        let album_uri = node
            .album_uri()
            .context("album node carries no album uri")?;
        let existing: std::collections::HashSet<String> = self
            .client
            .list_album_images(album_uri)
            .await?
            .into_iter()
            .map(|image| image.file_name)
            .collect();

        let mut clean = true;
        for file in args {
            let path = PathBuf::from(&file);
            let Some(file_name) = path
                .file_name()
                .map(|name| name.to_string_lossy().trim().to_string())
            else {
                println!("\"{file}\" has no file name.");
                clean = false;
                continue;
            };
            if existing.contains(&file_name) {
                println!("Skipping \"{file}\": file already exists in album \"{album_path}\".");
                continue;
            }
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    println!("Cannot read \"{file}\": {err}.");
                    clean = false;
                    continue;
                }
            };
            let md5 = scanner::file_md5(&path).await?;
            println!("Uploading \"{file}\" to \"{album_path}\"...");
            let request = UploadRequest {
                album_uri,
                file_path: &path,
                file_name: &file_name,
                size: metadata.len(),
                md5_hex: &md5,
                keywords: None,
                replace_uri: None,
            };
            if let Err(err) = self.client.upload_image(request).await {
                println!("Upload of \"{file}\" failed: {err}.");
                clean = false;
            }
        }
        Ok(clean)
    }

    async fn sync(
        &self,
        config_dir: &ConfigDir,
        args: Vec<String>,
        flags: SyncFlags,
    ) -> anyhow::Result<bool> {
        let defaults = config::load_defaults(config_dir)?;
        let (source_args, dst) = split_sync_args(args);

        let mut sources = Vec::new();
        for raw in &source_args {
            let source = parse_sync_source(raw);
            match std::fs::metadata(&source.dir) {
                Ok(metadata) if metadata.is_dir() => sources.push(source),
                Ok(_) => {
                    println!("\"{raw}\" is not a directory; use \"upload\" for single files.");
                    return Ok(false);
                }
                Err(_) => {
                    println!("File not found: \"{raw}\".");
                    return Ok(false);
                }
            }
        }

        let user = self.user(&flags.user).await?;
        let dest = match self.resolver.resolve(&user, &dst).await {
            Ok(node) => node,
            Err(ResolveError::NotFound { .. }) => {
                println!("Target folder not found: \"{dst}\".");
                return Ok(false);
            }
            Err(ResolveError::Api(err)) => return Err(err.into()),
        };
        if !matches!(dest.node_type, NodeType::Folder | NodeType::Album) {
            println!("Cannot sync to a node of type \"{}\".", dest.node_type);
            return Ok(false);
        }

        let target_kind = dest.node_type.to_string().to_lowercase();
        if sources.len() == 1 {
            println!(
                "Syncing \"{}\" to SmugMug {target_kind} \"{dst}\".",
                sources[0].dir.display()
            );
        } else {
            println!("Syncing:");
            for source in &sources {
                println!("  {}", source.dir.display());
            }
            println!("to SmugMug {target_kind} \"{dst}\".");
        }
        if !flags.force && !confirm("Proceed (yes/no)? ")? {
            return Ok(true);
        }

        let opts = SyncOptions {
            delete: flags.delete,
            detect_moves: !flags.no_detect_moves,
            folder_threads: flags.folder_threads.unwrap_or(defaults.folder_threads),
            file_threads: flags.file_threads.unwrap_or(defaults.file_threads),
            upload_threads: flags.upload_threads.unwrap_or(defaults.upload_threads),
            media_extensions: defaults.media_extensions.clone(),
        };
        let ignore_set = IgnorePatternSet::load(config_dir.ignore_path())?;
        let fingerprints = Arc::new(FingerprintCache::load(config_dir.fingerprints_path(&user))?);
        let root = self.resolver.root(&user).await?;
        let report = Arc::new(RunReport::default());
        let cancel = CancellationToken::new();
        spawn_interrupt_watcher(cancel.clone());

        let engine = SyncEngine::new(
            self.client.clone(),
            fingerprints,
            ignore_set,
            root,
            opts,
            report,
            cancel,
        );
        let outcome = engine
            .sync(sources, dest, dst.trim_matches('/'))
            .await?;

        if outcome.failures == 0 {
            println!("Sync complete.");
        } else {
            println!("Sync completed with {} failure(s).", outcome.failures);
        }
        Ok(outcome.failures == 0)
    }
}

async fn login(config_dir: &ConfigDir, key: String, secret: String) -> anyhow::Result<()> {
    let flow = OAuth1Flow::new(&key, &secret)?;
    let request = flow.request_token().await?;
    let url = flow.authorize_url(&request)?;
    println!("Open this URL in a browser and authorize smugcli:");
    println!("  {url}");
    let verifier = prompt("Verifier code: ")?;
    let access = flow.access_token(&request, verifier.trim()).await?;
    config::save_credentials(
        config_dir,
        &Credentials {
            api_key: key,
            api_secret: secret,
            access_token: access.token,
            token_secret: access.secret,
        },
    )?;
    println!("Login successful.");
    Ok(())
}

fn ignore_paths(
    config_dir: &ConfigDir,
    paths: Vec<String>,
    add: bool,
) -> anyhow::Result<bool> {
    let mut set = IgnorePatternSet::load(config_dir.ignore_path())?;
    for path in paths {
        let pattern = ignore::normalize_pattern(&path)?;
        if add {
            if set.add(&pattern)? {
                println!("Ignoring \"{pattern}\".");
            } else {
                println!("\"{pattern}\" is already ignored.");
            }
        } else if set.remove(&pattern)? {
            println!("Including \"{pattern}\".");
        } else {
            println!("\"{pattern}\" was not ignored.");
        }
    }
    Ok(true)
}

/// The last positional is the destination; a single argument syncs into
/// the remote root.
fn split_sync_args(mut args: Vec<String>) -> (Vec<String>, String) {
    if args.len() >= 2 {
        let dst = args.pop().expect("len checked");
        (args, dst)
    } else {
        (args, "/".to_string())
    }
}

fn parse_sync_source(raw: &str) -> SyncSource {
    let contents_only =
        raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR);
    SyncSource {
        dir: PathBuf::from(raw),
        contents_only,
    }
}

fn spawn_interrupt_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "[smugcli] interrupted; letting in-flight work finish (press ctrl-c again to abort)"
            );
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });
}

fn render_entry(
    name: &str,
    json: &serde_json::Value,
    query: &Option<String>,
    details: bool,
) {
    if let Some(query) = query {
        for value in json_query(json, query) {
            match value {
                serde_json::Value::String(text) => println!("{text}"),
                other => println!("{other}"),
            }
        }
    } else if details {
        println!(
            "{}",
            serde_json::to_string_pretty(json).expect("value serialize")
        );
    } else {
        println!("{name}");
    }
}

/// Evaluates a dotted selector ("Uris.Album.Uri", "Items[*].Name") against
/// a JSON value, returning every match.
fn json_query(root: &serde_json::Value, query: &str) -> Vec<serde_json::Value> {
    let mut current = vec![root.clone()];
    for step in query.trim().trim_start_matches('$').split('.') {
        let step = step.trim();
        if step.is_empty() {
            continue;
        }
        let (name, selectors) = match step.find('[') {
            Some(open) => (&step[..open], Some(&step[open..])),
            None => (step, None),
        };
        let mut next = Vec::new();
        for value in &current {
            let scoped = if name.is_empty() {
                vec![value.clone()]
            } else {
                match value.get(name) {
                    Some(found) => vec![found.clone()],
                    None => Vec::new(),
                }
            };
            let scoped = match selectors {
                Some(selectors) => apply_selectors(scoped, selectors),
                None => scoped,
            };
            next.extend(scoped);
        }
        current = next;
    }
    current
}

fn apply_selectors(values: Vec<serde_json::Value>, selectors: &str) -> Vec<serde_json::Value> {
    let mut current = values;
    for part in selectors.split('[').filter(|part| !part.is_empty()) {
        let key = part.trim_end_matches(']').trim();
        let mut next = Vec::new();
        for value in current {
            if key == "*" {
                if let Some(items) = value.as_array() {
                    next.extend(items.iter().cloned());
                }
            } else if let Ok(index) = key.parse::<usize>() {
                if let Some(item) = value.get(index) {
                    next.push(item.clone());
                }
            }
        }
        current = next;
    }
    current
}

fn prompt(question: &str) -> std::io::Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer)
}

fn confirm(question: &str) -> std::io::Result<bool> {
    let answer = prompt(question)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_args_default_destination_to_root() {
        let (sources, dst) = split_sync_args(vec!["photos".to_string()]);
        assert_eq!(sources, vec!["photos".to_string()]);
        assert_eq!(dst, "/");

        let (sources, dst) =
            split_sync_args(vec!["a".to_string(), "b".to_string(), "dst".to_string()]);
        assert_eq!(sources, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(dst, "dst");
    }

    #[test]
    fn trailing_separator_syncs_contents_only() {
        assert!(parse_sync_source("photos/").contents_only);
        assert!(!parse_sync_source("photos").contents_only);
    }

    #[test]
    fn query_walks_nested_fields() {
        let value = json!({
            "Name": "2015",
            "Uris": { "Album": { "Uri": "/api/v2/album/abc" } },
            "Keywords": ["summer", "beach"]
        });
        assert_eq!(
            json_query(&value, "Uris.Album.Uri"),
            vec![json!("/api/v2/album/abc")]
        );
        assert_eq!(
            json_query(&value, "$.Keywords[0]"),
            vec![json!("summer")]
        );
        assert_eq!(
            json_query(&value, "Keywords[*]"),
            vec![json!("summer"), json!("beach")]
        );
        assert!(json_query(&value, "Missing.Field").is_empty());
    }

    #[test]
    fn cli_parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "smugcli",
            "sync",
            "photos",
            "dst",
            "--delete",
            "--folder_threads",
            "2",
            "--no-detect-moves",
        ])
        .unwrap();
        match cli.command {
            Command::Sync {
                args,
                delete,
                folder_threads,
                no_detect_moves,
                ..
            } => {
                assert_eq!(args, vec!["photos".to_string(), "dst".to_string()]);
                assert!(delete);
                assert_eq!(folder_threads, Some(2));
                assert!(no_detect_moves);
            }
            _ => panic!("parsed into the wrong command"),
        }
    }

    #[test]
    fn cli_rejects_upload_without_album() {
        assert!(Cli::try_parse_from(["smugcli", "upload", "only-one"]).is_err());
    }
}
