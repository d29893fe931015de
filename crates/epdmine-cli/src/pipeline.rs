//! Work planning and the worker pool.
//!
//! Planning collects and filters the corpus up front; failures there are
//! fatal. Execution splits the file list into about four chunks per worker
//! so a slow archive cannot idle the pool, then runs a fixed number of
//! threads over a FIFO queue. All cross-thread state lives in
//! [`RunContext`]: the two sharded tables, the shared output writer and
//! the run totals. Readers, parsers and visitors are strictly
//! thread-local.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use pgn_reader::Reader;

use epdmine_core::{Board, CanonicalTable, CountTable};

use crate::cli::Config;
use crate::files;
use crate::io;
use crate::meta;
use crate::visitor::GameVisitor;

/// One file of work, with its precomputed fixFEN patch value.
pub struct FileJob {
    pub path: String,
    pub move_counter: Option<String>,
}

/// Shared state of one mining run.
pub struct RunContext {
    pub cfg: Config,
    pub counts: CountTable,
    pub canonical: CanonicalTable,
    pub totals: Totals,
    writer: Mutex<BufWriter<File>>,
}

#[derive(Default)]
pub struct Totals {
    pub files: AtomicU64,
    pub games: AtomicU64,
    pub reported: AtomicU64,
}

pub struct RunSummary {
    pub files: u64,
    pub games: u64,
    pub reported: u64,
    pub unique_positions: usize,
}

impl RunContext {
    pub fn new(cfg: Config) -> Result<Self> {
        let out = File::create(&cfg.output)
            .with_context(|| format!("failed to create {}", cfg.output.display()))?;
        Ok(RunContext {
            counts: CountTable::new(),
            canonical: CanonicalTable::new(),
            totals: Totals::default(),
            writer: Mutex::new(BufWriter::new(out)),
            cfg,
        })
    }

    /// The single shared output handle. Concurrent writes are forbidden;
    /// every emission goes through this lock.
    pub fn lock_writer(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Discover, vet and order the corpus; resolve per-file fixFEN patches.
pub fn plan(cfg: &Config) -> Result<Vec<FileJob>> {
    let mut file_list: Vec<String> = match &cfg.file {
        Some(file) => vec![file.to_string_lossy().into_owned()],
        None => {
            log::info!(
                "looking {}for pgn files in {}",
                if cfg.recursive { "(recursively) " } else { "" },
                cfg.dir.display()
            );
            files::collect_files(&cfg.dir, cfg.recursive)?
        }
    };
    files::sort_and_check(&mut file_list)?;

    let meta_map = meta::get_metadata(&file_list, cfg.allow_duplicates)?;

    if cfg.sprt_only {
        meta::filter_files_sprt(&mut file_list, &meta_map);
    }
    if let Some(regex) = &cfg.book_regex {
        log::info!(
            "filtering pgn files {}matching the book name {}",
            if cfg.book_invert { "not " } else { "" },
            regex.as_str()
        );
        meta::filter_files_book(&mut file_list, &meta_map, regex, cfg.book_invert);
    }

    let mut jobs = Vec::with_capacity(file_list.len());
    for path in file_list {
        let move_counter =
            if cfg.fix_fen { meta::fixfen_move_counter(&path, &meta_map)? } else { None };
        jobs.push(FileJob { path, move_counter });
    }
    Ok(jobs)
}

/// Run the pool over the planned jobs, then the deferred output pass.
pub fn run(ctx: &RunContext, jobs: Vec<FileJob>) -> Result<RunSummary> {
    let total_files = jobs.len();
    let chunks = split_chunks(jobs, 4 * ctx.cfg.concurrency);
    log::info!(
        "found {} pgn file(s), created {} chunk(s) for processing",
        total_files,
        chunks.len()
    );

    let progress = ProgressBar::new(total_files as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({per_sec}) ETA: {eta}")
            .expect("valid template"),
    );

    let started = Instant::now();
    let (tx, rx) = crossbeam_channel::unbounded::<Vec<FileJob>>();
    for chunk in chunks {
        tx.send(chunk).expect("queue outlives the senders");
    }
    drop(tx);

    std::thread::scope(|scope| {
        for _ in 0..ctx.cfg.concurrency {
            let rx = rx.clone();
            let progress = &progress;
            scope.spawn(move || {
                for chunk in rx.iter() {
                    for job in &chunk {
                        process_file(ctx, job);
                        ctx.totals.files.fetch_add(1, Ordering::Relaxed);
                        progress.inc(1);
                    }
                }
            });
        }
    });
    progress.finish_and_clear();

    log::info!(
        "processed {} file(s) in {:.2}s",
        total_files,
        started.elapsed().as_secs_f64()
    );

    if ctx.cfg.save_count {
        write_counted(ctx)?;
    }
    ctx.lock_writer().flush().context("failed to flush output")?;

    Ok(RunSummary {
        files: ctx.totals.files.load(Ordering::Relaxed),
        games: ctx.totals.games.load(Ordering::Relaxed),
        reported: ctx.totals.reported.load(Ordering::Relaxed),
        unique_positions: ctx.counts.len(),
    })
}

/// Split into successive chunks, about `target_chunks` of them.
fn split_chunks(mut jobs: Vec<FileJob>, target_chunks: usize) -> Vec<Vec<FileJob>> {
    let chunk_size = jobs.len().div_ceil(target_chunks.max(1)).max(1);
    let mut chunks = Vec::new();
    while !jobs.is_empty() {
        let tail = jobs.split_off(chunk_size.min(jobs.len()));
        chunks.push(std::mem::replace(&mut jobs, tail));
    }
    chunks
}

fn process_file(ctx: &RunContext, job: &FileJob) {
    let reader = match io::open_reader(&job.path) {
        Ok(reader) => reader,
        Err(err) => {
            log::warn!("failed to open {}: {err}", job.path);
            return;
        }
    };

    let mut visitor = GameVisitor::new(ctx, &job.path, job.move_counter.as_deref());
    let mut games = Reader::new(reader);
    loop {
        match games.read_game(&mut visitor) {
            Ok(Some(())) => {}
            Ok(None) => break,
            Err(err) => {
                // abandon the rest of this stream; other files continue
                log::warn!("error while parsing {}: {err}", job.path);
                break;
            }
        }
    }
}

/// The deferred `--saveCount` output pass: every position that crossed the
/// threshold, annotated with its final count.
fn write_counted(ctx: &RunContext) -> Result<()> {
    let started = Instant::now();
    let mut written = 0u64;
    let mut first_error: Option<anyhow::Error> = None;

    let mut writer = ctx.lock_writer();
    ctx.canonical.for_each(|key, packed| {
        if first_error.is_some() {
            return;
        }
        let count = ctx.counts.get(key).unwrap_or(0);
        match Board::decode(packed) {
            Ok(board) => {
                match writeln!(writer, "{} ; c0 {}", board.get_fen(false), count) {
                    Ok(()) => written += 1,
                    Err(err) => first_error = Some(err.into()),
                }
            }
            Err(err) => first_error = Some(err.into()),
        }
    });
    drop(writer);

    if let Some(err) = first_error {
        return Err(err.context("failed to write counted positions"));
    }
    log::info!(
        "wrote {} scored positions to {} in {:.2}s",
        written,
        ctx.cfg.output.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
