//! Input stream opening, by extension.

use std::fs::File;
use std::io::{self, BufReader, Read};

use flate2::read::MultiGzDecoder;

const BUF_BYTES: usize = 128 * 1024;

/// Open a pgn file as a byte stream, decompressing `.gz` and `.zst`.
pub fn open_reader(path: &str) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.ends_with(".gz") {
        // MultiGzDecoder: pgn archives are often concatenated gzip members
        let dec = MultiGzDecoder::new(BufReader::with_capacity(BUF_BYTES, file));
        return Ok(Box::new(dec));
    }
    if path.ends_with(".zst") {
        let dec = zstd::Decoder::new(file)?;
        return Ok(Box::new(dec));
    }
    Ok(Box::new(BufReader::with_capacity(BUF_BYTES, file)))
}
