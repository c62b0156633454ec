//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::ResolveError;
use crate::models::{CacheOutcome, Inode};
use crate::output;
use crate::path::parse_query_path;
use crate::resolver::Resolver;
use crate::store::{TagRef, TagStore};

/// Tagsift: boolean tag queries over a cached, SQLite-backed tag store
#[derive(Parser, Debug)]
#[command(
    name = "tsf",
    version,
    about = "Resolve boolean tag queries against a tag store",
    long_about = "Tagsift resolves tag paths such as /tags/red/+/blue/-/draft into the \
                  set of objects satisfying them, and caches each result so repeated \
                  or overlapping queries are served without recomputation."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Directory holding the .tagsift/ store
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the tag store
    Init,

    /// Add an object and print its inode
    Add {
        /// Object name
        name: String,

        /// Tags to attach right away (name or namespace:key=value)
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Rename an object
    Rename { inode: Inode, name: String },

    /// Remove an object and its tag assignments
    Rm { inode: Inode },

    /// Attach tags to an object
    ///
    /// Examples:
    ///   tsf tag 3 red blue
    ///   tsf tag 3 time:year=2024
    Tag {
        inode: Inode,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Detach tags from an object
    Untag {
        inode: Inode,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// List the objects matching a tag path
    ///
    /// Path syntax:
    ///   /tags/red/blue          red AND blue
    ///   /tags/red/+/blue        red OR blue
    ///   /tags/red/-/blue        red AND NOT blue
    ///   /tags/red|crimson       red, or its related tag crimson
    ///   /tags/time:/year/gt/2020  triple tag (eq, inc, gt, lt)
    ///   /tags/ALL               every object
    /// Everything after '@' is ignored by the cache key.
    Ls {
        /// Tag path
        path: String,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// List tags with their object counts
    Tags {
        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop cached query results
    Invalidate {
        /// Only drop results depending on this tag (or triple namespace)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show cache statistics
    Stats {
        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// List cached queries
    Entries,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let log_level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        match self.command {
            Command::Init => handle_init(&self.root),
            Command::Add { name, tags } => handle_add(&self.root, &name, &tags),
            Command::Rename { inode, name } => handle_rename(&self.root, inode, &name),
            Command::Rm { inode } => handle_rm(&self.root, inode),
            Command::Tag { inode, tags } => handle_tag(&self.root, inode, &tags, true),
            Command::Untag { inode, tags } => handle_tag(&self.root, inode, &tags, false),
            Command::Ls { path, json, pretty } => handle_ls(&self.root, &path, json, pretty),
            Command::Tags { json } => handle_tags(&self.root, json),
            Command::Invalidate { tag } => handle_invalidate(&self.root, tag),
            Command::Stats { json } => handle_stats(&self.root, json),
            Command::Entries => handle_entries(&self.root),
        }
    }
}

/// Open an initialized store, or explain how to create one
fn open_store(root: &Path) -> Result<TagStore> {
    let store = TagStore::open(root)?;

    if !store.exists() {
        anyhow::bail!(
            "No tag store found in {}.\n\
             \n\
             Run 'tsf init' to create one.",
            root.display()
        );
    }

    Ok(store)
}

fn parse_tags(tags: &[String]) -> Result<Vec<TagRef>> {
    tags.iter()
        .map(|t| t.parse::<TagRef>().with_context(|| format!("Invalid tag '{}'", t)))
        .collect()
}

fn handle_init(root: &Path) -> Result<()> {
    let store = TagStore::open(root)?;
    store.init()?;
    println!("Initialized tag store at {}", store.path().display());
    Ok(())
}

fn handle_add(root: &Path, name: &str, tags: &[String]) -> Result<()> {
    let store = open_store(root)?;
    let tags = parse_tags(tags)?;

    let inode = store.add_object(name)?;
    for tag in &tags {
        store.tag_object(inode, tag)?;
    }

    println!("{}", inode);
    Ok(())
}

fn handle_rename(root: &Path, inode: Inode, name: &str) -> Result<()> {
    let store = open_store(root)?;
    store.rename_object(inode, name)?;
    Ok(())
}

fn handle_rm(root: &Path, inode: Inode) -> Result<()> {
    let store = open_store(root)?;
    store.remove_object(inode)?;
    Ok(())
}

fn handle_tag(root: &Path, inode: Inode, tags: &[String], attach: bool) -> Result<()> {
    let store = open_store(root)?;

    for tag in parse_tags(tags)? {
        let changed = if attach {
            store.tag_object(inode, &tag)?
        } else {
            store.untag_object(inode, &tag)?
        };

        if !changed {
            let state = if attach { "already tagged" } else { "not tagged" };
            output::note(&format!("{}: {} '{}'", inode, state, tag));
        }
    }

    Ok(())
}

fn handle_ls(root: &Path, path: &str, as_json: bool, pretty_json: bool) -> Result<()> {
    let store = open_store(root)?;
    let parsed = parse_query_path(path, &store.config().query)
        .with_context(|| format!("Invalid tag path '{}'", path))?;

    let resolver = Resolver::new(store);
    let start = Instant::now();

    let resolution = match resolver.resolve_detailed(&parsed.query, parsed.is_all_path) {
        Ok(resolution) => resolution,
        Err(ResolveError::EmptyQuery) => {
            output::warn("Tag path has no tags; nothing to list.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to resolve tag path"),
    };

    let elapsed = start.elapsed();
    log::info!("Resolved '{}' in {:?} ({:?})", path, elapsed, resolution.outcome);

    if as_json {
        let json_output = if pretty_json {
            serde_json::to_string_pretty(&resolution.files)?
        } else {
            serde_json::to_string(&resolution.files)?
        };
        println!("{}", json_output);
        return Ok(());
    }

    for name in resolution.files.names() {
        let inodes = resolution.files.inodes(name);
        let inodes = inodes.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
        println!("{}  [{}]", name, inodes);
    }

    let outcome = match resolution.outcome {
        CacheOutcome::Hit(id) => format!("cache hit (RDS {})", id),
        CacheOutcome::Miss(id) => format!("materialized RDS {}", id),
        CacheOutcome::Bypass => "all objects, cache bypassed".to_string(),
    };
    output::note(&format!(
        "{} objects, {} in {:.1}ms",
        resolution.files.total_handles(),
        outcome,
        elapsed.as_secs_f64() * 1000.0
    ));

    Ok(())
}

fn handle_tags(root: &Path, as_json: bool) -> Result<()> {
    let store = open_store(root)?;
    let tags = store.list_tags()?;

    if as_json {
        println!("{}", serde_json::to_string(&tags)?);
        return Ok(());
    }

    for info in tags {
        println!("{:>6}  {}  ({} objects)", info.tag_id, info.tag, info.object_count);
    }
    Ok(())
}

fn handle_invalidate(root: &Path, tag: Option<String>) -> Result<()> {
    let resolver = Resolver::new(open_store(root)?);

    let dropped = match tag {
        Some(tag) => resolver.invalidate_tag(&tag)?,
        None => resolver.invalidate()?,
    };

    println!("Dropped {} cached queries", dropped);
    Ok(())
}

fn handle_stats(root: &Path, as_json: bool) -> Result<()> {
    let resolver = Resolver::new(open_store(root)?);
    let stats = resolver.stats()?;

    if as_json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!("Tagsift Cache Statistics");
    println!("========================");
    println!("Cached queries:   {}", stats.entries);
    println!("Result rows:      {}", stats.rows);
    println!("Provenance tags:  {}", stats.provenance_tags);
    println!("Invalidation:     {:?}", resolver.store().config().cache.invalidation);
    Ok(())
}

fn handle_entries(root: &Path) -> Result<()> {
    let resolver = Resolver::new(open_store(root)?);

    for entry in resolver.entries()? {
        println!("{:>6}  {}  ({} rows, {})", entry.id, entry.query, entry.row_count, entry.created_at);
    }
    Ok(())
}
