//! Command line surface and resolved run configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;

#[derive(Parser, Debug)]
#[command(
    name = "epdmine",
    version,
    about = "Mine frequently-occurring positions out of .pgn(.gz|.zst) corpora into EPD"
)]
pub struct Cli {
    /// Analyse a single .pgn(.gz|.zst) file instead of a directory
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Directory containing .pgn(.gz|.zst) files
    #[arg(long, default_value = "./pgns")]
    pub dir: PathBuf,

    /// Search for files recursively in subdirectories
    #[arg(short = 'r')]
    pub recursive: bool,

    /// Skip games tagged [Variant "fischerandom"]
    #[arg(long = "noFRC")]
    pub no_frc: bool,

    /// Allow duplicate tests across directories (warn instead of abort)
    #[arg(long = "allowDuplicates")]
    pub allow_duplicates: bool,

    /// Number of worker threads (default: hardware threads)
    #[arg(long, default_value_t = default_concurrency())]
    pub concurrency: usize,

    /// Only count positions reached by engines whose name matches this regex
    #[arg(long = "matchEngine", value_name = "regex")]
    pub match_engine: Option<String>,

    /// Only analyse tests whose opening book name matches this regex
    #[arg(long = "matchBook", value_name = "regex")]
    pub match_book: Option<String>,

    /// Invert the --matchBook filter
    #[arg(long = "matchBookInvert")]
    pub match_book_invert: bool,

    /// Only analyse pgns coming from SPRT tests
    #[arg(long = "SPRTonly")]
    pub sprt_only: bool,

    /// Patch move counters stripped from .epd opening books by the match runner
    #[arg(long = "fixFEN")]
    pub fix_fen: bool,

    /// Maximum number of counted plies per game, excluding book moves
    #[arg(long = "maxPlies", default_value_t = 20, value_name = "N")]
    pub max_plies: u32,

    /// Stop analysing a game once it reaches novel territory
    #[arg(long = "stopEarly")]
    pub stop_early: bool,

    /// With --stopEarly: number of new positions that ends the game
    #[arg(long = "countStopEarly", default_value_t = 1, value_name = "N")]
    pub count_stop_early: u64,

    /// Minimum count before a position is written (0: never write, timing mode)
    #[arg(long = "minCount", default_value_t = 1, value_name = "N")]
    pub min_count: u64,

    /// Defer output and annotate each position with its final count
    #[arg(long = "saveCount")]
    pub save_count: bool,

    /// Write positions without the halfmove/fullmove counter fields
    #[arg(long = "omitMoveCounter")]
    pub omit_move_counter: bool,

    /// Stop counting a game once at most N pieces are left
    #[arg(long = "TBlimit", default_value_t = 0, value_name = "N")]
    pub tb_limit: u32,

    /// Stop counting a game when a position has no legal moves
    #[arg(long = "omitMates")]
    pub omit_mates: bool,

    /// Skip games where either player is rated below N
    #[arg(long = "minElo", default_value_t = 0, value_name = "N")]
    pub min_elo: i32,

    /// Shorthand for --TBlimit 7 --omitMates
    #[arg(long)]
    pub cdb: bool,

    /// Path of the output epd file
    #[arg(short = 'o', default_value = "popular.epd", value_name = "path")]
    pub output: PathBuf,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Validated run configuration.
#[derive(Debug)]
pub struct Config {
    pub file: Option<PathBuf>,
    pub dir: PathBuf,
    pub recursive: bool,
    pub no_frc: bool,
    pub allow_duplicates: bool,
    pub concurrency: usize,
    pub engine_regex: Option<Regex>,
    pub book_regex: Option<Regex>,
    pub book_invert: bool,
    pub sprt_only: bool,
    pub fix_fen: bool,
    pub max_plies: u32,
    /// Number of novel positions that ends a game; `u64::MAX` disables.
    pub stop_early_at: u64,
    pub min_count: u64,
    pub save_count: bool,
    pub omit_move_counter: bool,
    pub tb_limit: u32,
    pub omit_mates: bool,
    pub min_elo: i32,
    pub output: PathBuf,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if cli.save_count && !cli.omit_move_counter {
            bail!("--saveCount requires --omitMoveCounter");
        }
        if cli.stop_early && cli.count_stop_early == 0 {
            bail!("--countStopEarly must be positive");
        }
        if cli.concurrency == 0 {
            bail!("--concurrency must be positive");
        }
        if let Some(file) = &cli.file {
            if !file.is_file() {
                bail!("--file target not found: {}", file.display());
            }
        }

        // anchored: the whole name has to match, not a substring
        let engine_regex = cli
            .match_engine
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(anchored)
            .transpose()
            .context("invalid --matchEngine regex")?;
        let book_regex = cli
            .match_book
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(anchored)
            .transpose()
            .context("invalid --matchBook regex")?;

        let (mut tb_limit, mut omit_mates) = (cli.tb_limit, cli.omit_mates);
        if cli.cdb {
            if tb_limit == 0 {
                tb_limit = 7;
            }
            omit_mates = true;
        }

        let stop_early_at = if cli.stop_early { cli.count_stop_early } else { u64::MAX };

        Ok(Config {
            file: cli.file,
            dir: cli.dir,
            recursive: cli.recursive,
            no_frc: cli.no_frc,
            allow_duplicates: cli.allow_duplicates,
            concurrency: cli.concurrency,
            engine_regex,
            book_regex,
            book_invert: cli.match_book_invert,
            sprt_only: cli.sprt_only,
            fix_fen: cli.fix_fen,
            max_plies: cli.max_plies,
            stop_early_at,
            min_count: cli.min_count,
            save_count: cli.save_count,
            omit_move_counter: cli.omit_move_counter,
            tb_limit,
            omit_mates,
            min_elo: cli.min_elo,
            output: cli.output,
        })
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}
