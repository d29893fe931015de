mod common;

use common::*;

fn sidecar(book: &str, sprt: bool) -> String {
    if sprt {
        format!(r#"{{"args": {{"book": "{book}", "sprt": {{"elo0": 0.0, "elo1": 2.0}}}}}}"#)
    } else {
        format!(r#"{{"args": {{"book": "{book}"}}}}"#)
    }
}

#[test]
fn sprt_only_keeps_sprt_tests() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(&dir.path().join("sprt-test-0.pgn"), ITALIAN);
    write_file(&dir.path().join("sprt-test.json"), &sidecar("x.pgn", true));
    // an SPSA-style test contributes nothing under --SPRTonly
    let spsa = "[Event \"t\"]\n[Result \"1-0\"]\n\n1. d4 d5 1-0\n";
    write_file(&dir.path().join("spsa-test-0.pgn"), spsa);
    write_file(&dir.path().join("spsa-test.json"), &sidecar("x.pgn", false));
    let out = dir.path().join("popular.epd");

    epdmine()
        .args(["--dir"])
        .arg(dir.path())
        .args(["--SPRTonly", "-o"])
        .arg(&out)
        .assert()
        .success();

    assert_eq!(sorted_lines(&out), sorted(ITALIAN_FENS.to_vec()));
}

#[test]
fn match_book_filters_by_book_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(&dir.path().join("uho-test-0.pgn"), ITALIAN);
    write_file(&dir.path().join("uho-test.json"), &sidecar("UHO_4060_v2.epd", true));
    let noob = "[Event \"t\"]\n[Result \"1-0\"]\n\n1. c4 c5 1-0\n";
    write_file(&dir.path().join("noob-test-0.pgn"), noob);
    write_file(&dir.path().join("noob-test.json"), &sidecar("noob_3moves.epd", true));
    // no sidecar at all: always dropped by the book filter
    write_file(&dir.path().join("bare-test-0.pgn"), ITALIAN);
    let out = dir.path().join("popular.epd");

    epdmine()
        .args(["--dir"])
        .arg(dir.path())
        .args(["--matchBook", "UHO.*", "-o"])
        .arg(&out)
        .assert()
        .success();
    assert_eq!(sorted_lines(&out), sorted(ITALIAN_FENS.to_vec()));

    let out_inverted = dir.path().join("inverted.epd");
    epdmine()
        .args(["--dir"])
        .arg(dir.path())
        .args(["--matchBook", "UHO.*", "--matchBookInvert", "-o"])
        .arg(&out_inverted)
        .assert()
        .success();
    assert_eq!(
        sorted_lines(&out_inverted),
        sorted(vec![
            "rnbqkbnr/pp1ppppp/8/2p5/2P5/8/PP1PPPPP/RNBQKBNR w KQkq - 0 2",
            "rnbqkbnr/pppppppp/8/8/2P5/8/PP1PPPPP/RNBQKBNR b KQkq - 0 1",
        ])
    );
}

#[test]
fn duplicate_tests_abort_without_override() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("a")).expect("subdir");
    std::fs::create_dir_all(dir.path().join("b")).expect("subdir");
    write_file(&dir.path().join("a/test-0.pgn"), ITALIAN);
    write_file(&dir.path().join("b/test-0.pgn"), ITALIAN);
    let out = dir.path().join("popular.epd");

    epdmine()
        .args(["--dir"])
        .arg(dir.path())
        .args(["-r", "-o"])
        .arg(&out)
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("duplicate"));

    epdmine()
        .args(["--dir"])
        .arg(dir.path())
        .args(["-r", "--allowDuplicates", "-o"])
        .arg(&out)
        .assert()
        .success();
}

#[test]
fn min_elo_removes_low_rated_games() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rated = "[Result \"1-0\"]\n[WhiteElo \"3200\"]\n[BlackElo \"3150\"]\n\n1. e4 1-0\n";
    let low = "[Result \"1-0\"]\n[WhiteElo \"3200\"]\n[BlackElo \"1800\"]\n\n1. d4 1-0\n";
    write_file(&dir.path().join("game-0.pgn"), &format!("{rated}{low}"));
    let out = dir.path().join("popular.epd");

    epdmine()
        .args(["--dir"])
        .arg(dir.path())
        .args(["--minElo", "3000", "-o"])
        .arg(&out)
        .assert()
        .success();

    assert_eq!(sorted_lines(&out), vec![ITALIAN_FENS[0].to_string()]);
}
