// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sql_masker::unstable::split_statements;
use sql_masker::*;

fn parse_filter(s: &str) -> Result<ConstraintFilter, String> {
    match s {
        "none" => Ok(ConstraintFilter::None),
        "keep-int-pk" => Ok(ConstraintFilter::KeepIntPk),
        "all" => Ok(ConstraintFilter::All),
        _ => Err(format!("expected none, keep-int-pk or all, got `{s}`")),
    }
}

#[derive(clap::Args)]
struct GlobalArgs {
    /// Configuration file. json or yaml.
    #[arg(long, global = true, value_name = "config.yaml")]
    config: Option<PathBuf>,

    /// Directories of schema scripts, run once before masking.
    #[arg(long = "ddl-dir", global = true)]
    ddl_dirs: Vec<PathBuf>,

    /// Directories of scripts run at the start of every session.
    #[arg(long = "prepare-dir", global = true)]
    prepare_dirs: Vec<PathBuf>,

    /// Default database.
    #[arg(long, global = true)]
    db: Option<String>,

    /// Mask function. See `list`.
    #[arg(long, global = true)]
    mask: Option<String>,

    /// Hash key material.
    #[arg(long, global = true)]
    key: Option<String>,

    /// Keep integer primary keys unmasked.
    #[arg(long, global = true)]
    ignore_int_pk: bool,

    /// Constraints to drop from schema scripts: none, keep-int-pk or all.
    #[arg(long, global = true, value_parser = parse_filter)]
    filter_constraints: Option<ConstraintFilter>,

    /// Name map used to rename identifiers. json.
    #[arg(long, global = true)]
    name_map: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short, global = true)]
    verbose: bool,
}

impl GlobalArgs {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if !self.ddl_dirs.is_empty() {
            config.ddl_dirs = self.ddl_dirs.clone();
        }
        if !self.prepare_dirs.is_empty() {
            config.prepare_dirs = self.prepare_dirs.clone();
        }
        if let Some(db) = &self.db {
            config.default_db = db.clone();
        }
        if let Some(mask) = &self.mask {
            config.mask_func = mask.clone();
        }
        if let Some(key) = &self.key {
            config.key = key.clone();
        }
        if self.ignore_int_pk {
            config.ignore_int_pk = true;
        }
        if let Some(filter) = self.filter_constraints {
            config.filter_constraints = filter;
        }
        if let Some(path) = &self.name_map {
            config.name_map = Some(path.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum MaskerCommand {
    /// Mask `;` separated SQL statements.
    Sql {
        /// SQL files. Reads stdin when none is given.
        files: Vec<PathBuf>,
    },

    /// Mask files of JSON-lines replay events.
    Event {
        /// Directory of event files.
        #[arg(long, short)]
        input_dir: PathBuf,

        /// Directory for masked event files. Existing files are not overwritten.
        #[arg(long, short)]
        output_dir: PathBuf,

        /// Worker threads. Defaults to the number of CPUs.
        #[arg(long, short = 't')]
        concurrency: Option<usize>,
    },

    /// Generate a name map from original and masked schema files.
    Name {
        /// Directory of `<db>.<table>-schema.sql` files.
        dir: PathBuf,

        /// Database prefix of the masked schemas.
        #[arg(long, default_value = "masked_")]
        masked_prefix: String,

        /// Output file. Prints to stdout when not given.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List mask functions.
    List,
}

#[derive(clap::Parser)]
#[command(author, version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: MaskerCommand,

    #[command(flatten)]
    global: GlobalArgs,
}

/// Resolve settings and load the schema.
fn setup(config: &Config) -> Result<(Instance, Arc<MaskSettings>, Vec<Script>)> {
    let settings = Arc::new(config.resolve()?);
    let instance = Instance::new();
    let ddls = read_scripts(&config.ddl_dirs)?;
    instance.load_schema(&config.default_db, &ddls, config.filter_constraints)?;
    let prepare = read_scripts(&config.prepare_dirs)?;
    Ok((instance, settings, prepare))
}

fn mask_sql(config: &Config, files: &[PathBuf]) -> Result<()> {
    let (instance, settings, prepare) = setup(config)?;
    let mut session = Session::open(&instance, settings, &prepare)?;

    let mut texts = vec![];
    if files.is_empty() {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        texts.push(text);
    }
    for file in files {
        texts.push(
            std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?,
        );
    }

    for text in &texts {
        for sql in split_statements(text) {
            let outcome = session.mask_sql(&sql);
            if let Some(error) = outcome.error() {
                log::debug!("{sql}: {error}");
            }
            println!("{};", outcome.output());
        }
    }

    let stats = session.stats();
    println!();
    println!("====Summary====");
    println!("Success      {}", stats.success);
    println!("Problematic  {}", stats.problematic);
    println!("Failed       {}", stats.failed());
    println!("Total        {}", stats.all);
    Ok(())
}

fn mask_event_file(
    instance: &Instance,
    settings: &Arc<MaskSettings>,
    prepare: &[Script],
    from: &Path,
    to: &Path,
) -> Result<Stats> {
    let mut session = Session::open(instance, settings.clone(), prepare)?;
    let input = std::fs::File::open(from)
        .with_context(|| format!("Failed to open {}", from.display()))?;
    let output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(to)
        .with_context(|| format!("Failed to create {}", to.display()))?;
    session.mask_lines(BufReader::new(input), BufWriter::new(output))
}

fn mask_events(
    config: &Config,
    input_dir: &Path,
    output_dir: &Path,
    concurrency: Option<usize>,
) -> Result<()> {
    let (instance, settings, prepare) = setup(config)?;
    std::fs::create_dir_all(output_dir)?;

    let mut paths = vec![];
    for entry in walkdir::WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }

    let workers = concurrency
        .or(config.concurrency)
        .unwrap_or_else(num_cpus::get)
        .clamp(1, paths.len().max(1));
    log::info!("masking {} files with {workers} workers", paths.len());

    let start = Instant::now();
    let next = AtomicUsize::new(0);
    let done = AtomicUsize::new(0);
    let failed_files = AtomicUsize::new(0);
    let total = paths.len();
    let stats: Stats = std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(|| {
                    let mut stats = Stats::default();
                    loop {
                        let idx = next.fetch_add(1, Ordering::SeqCst);
                        let Some(from) = paths.get(idx) else {
                            break;
                        };
                        let to = output_dir.join(from.file_name().unwrap_or_default());
                        let result = mask_event_file(&instance, &settings, &prepare, from, &to);
                        let progress = format!("{}/{total}", done.fetch_add(1, Ordering::SeqCst) + 1);
                        match result {
                            Ok(file_stats) => {
                                log::info!(
                                    "[{progress}] masked {} -> {}: {file_stats}",
                                    from.display(),
                                    to.display()
                                );
                                stats += file_stats;
                            }
                            Err(e) => {
                                failed_files.fetch_add(1, Ordering::SeqCst);
                                log::warn!("[{progress}] failed to mask {}: {e:#}", from.display());
                            }
                        }
                    }
                    stats
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| match h.join() {
                Ok(stats) => Some(stats),
                Err(_) => {
                    log::error!("worker panicked; its files are missing from the summary");
                    None
                }
            })
            .sum()
    });

    log::info!(
        "all done: {total} files ({} failed), {stats}, {:.2?}",
        failed_files.load(Ordering::SeqCst),
        start.elapsed()
    );
    Ok(())
}

fn generate_names(dir: &Path, masked_prefix: &str, output: Option<&Path>) -> Result<()> {
    let mut schemas = vec![];
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !entry.file_type().is_file() || !name.ends_with("-schema.sql") {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        schemas.push((name, contents));
    }
    if schemas.is_empty() {
        bail!("no schema files found in {}", dir.display());
    }

    let map = generate_name_map(schemas, masked_prefix)?;
    let json = map.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("wrote {} column renames to {}", map.columns.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn list_mask_functions() {
    for f in mask_functions() {
        println!("{:<16}{}", f.name, f.description);
    }
}

fn main() -> Result<()> {
    // Parse and dispatch command.
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = cli.global.config()?;
    match cli.command {
        MaskerCommand::Sql { files } => mask_sql(&config, &files),
        MaskerCommand::Event {
            input_dir,
            output_dir,
            concurrency,
        } => mask_events(&config, &input_dir, &output_dir, concurrency),
        MaskerCommand::Name {
            dir,
            masked_prefix,
            output,
        } => generate_names(&dir, &masked_prefix, output.as_deref()),
        MaskerCommand::List => {
            list_mask_functions();
            Ok(())
        }
    }
}
