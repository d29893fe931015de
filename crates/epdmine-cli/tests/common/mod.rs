#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;

use assert_cmd::Command;

/// Four plies from the standard start position.
pub const ITALIAN: &str =
    "[Event \"t\"]\n[Result \"1-0\"]\n\n1. e4 e5 2. Nf3 Nc6 1-0\n";

/// The positions after plies 1..=4 of [`ITALIAN`], with move counters.
pub const ITALIAN_FENS: [&str; 4] = [
    "rnbqkbnr/pppppppp/8/8/4P3/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1",
    "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPPPPPP/RNBQKBNR w KQkq - 0 2",
    "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPPPPPP/RNBQKB1R b KQkq - 1 2",
    "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPPPPPP/RNBQKB1R w KQkq - 2 3",
];

pub fn epdmine() -> Command {
    Command::cargo_bin("epdmine").expect("binary builds")
}

pub fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("write fixture");
}

pub fn write_gz(path: &Path, content: &str) {
    let file = fs::File::create(path).expect("create gz fixture");
    let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    enc.write_all(content.as_bytes()).expect("write gz fixture");
    enc.finish().expect("finish gz fixture");
}

pub fn write_zst(path: &Path, content: &str) {
    let encoded = zstd::encode_all(content.as_bytes(), 0).expect("encode zst fixture");
    fs::write(path, encoded).expect("write zst fixture");
}

/// Output order is unspecified; tests compare as sets.
pub fn sorted_lines(path: &Path) -> Vec<String> {
    let text = fs::read_to_string(path).expect("output file readable");
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    lines.sort();
    lines
}

pub fn sorted(mut fens: Vec<&str>) -> Vec<String> {
    fens.sort();
    fens.into_iter().map(String::from).collect()
}
