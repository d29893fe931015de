//! ゲーム訪問者（1ゲームぶんの採掘ポリシー）
//!
//! パーサのコールバックを受けて盤を1つ進め、フィルタを通った局面を
//! カウント表に記録する。ヘッダ段階で結果・レーティング・エンジン名の
//! ゲートを判定し、指し手段階で1手ごとに持ち時間ならぬ「採掘予算」
//! （plyバジェット・新規局面での早期打ち切り・駒数・詰み）を適用する。
//!
//! PGNでは指し手の注釈（`{book}`）が指し手コールバックの後に届くので、
//! 適用済みの手は次のイベントまで「保留」しておき、book注釈が来なければ
//! そこで初めてカウントする。順序はインライン処理と観測等価。
//!
//! スキップビットは片方向: 一度立てたらそのゲームでは何もしない。

use std::borrow::Cow;
use std::io::Write as _;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;

use pgn_reader::{RawComment, RawTag, SanPlus, Skip, Visitor};
use shakmaty::Color;

use epdmine_core::Board;

use crate::pipeline::RunContext;

/// ヘッダ段階で集める情報
#[derive(Default)]
pub struct GameTags {
    has_result: bool,
    chess960: bool,
    start_fen: Option<String>,
    white: String,
    black: String,
    white_elo: i32,
    black_elo: i32,
}

/// 指し手段階の状態
pub struct GameState {
    board: Board,
    filter_side: Option<Color>,
    retained_plies: u32,
    new_entries: u64,
    /// 適用済み・未カウントの手が保留中か
    pending: bool,
    skip: bool,
}

pub struct GameVisitor<'a> {
    ctx: &'a RunContext,
    file: &'a str,
    /// fixFEN時の全手数フィールドの置換値（開始局面の` 0 1`を戻す）
    move_counter: Option<&'a str>,
}

impl<'a> GameVisitor<'a> {
    pub fn new(ctx: &'a RunContext, file: &'a str, move_counter: Option<&'a str>) -> Self {
        GameVisitor {
            ctx,
            file,
            move_counter,
        }
    }

    fn patched_fen<'f>(&self, fen: &'f str) -> Cow<'f, str> {
        if let Some(counter) = self.move_counter {
            if let Some(base) = fen.strip_suffix(" 0 1") {
                return Cow::Owned(format!("{base} 0 {counter}"));
            }
        }
        Cow::Borrowed(fen)
    }

    /// 保留中の手をカウント表に反映する
    ///
    /// 呼ばれる時点で盤は保留局面のまま（次の手はまだ適用されていない）。
    fn commit_pending(&self, state: &mut GameState) {
        if !state.pending {
            return;
        }
        state.pending = false;

        let cfg = &self.ctx.cfg;
        let key = state.board.hash();
        let (is_new, count) = self.ctx.counts.increment_or_insert(key);

        // 閾値ちょうどの一度だけ発火する（`>=`ではない）
        if count == cfg.min_count {
            self.ctx.totals.reported.fetch_add(1, Ordering::Relaxed);
            if cfg.save_count {
                self.ctx.canonical.try_insert(key, state.board.encode());
            } else {
                let fen = state.board.get_fen(!cfg.omit_move_counter);
                let mut writer = self.ctx.lock_writer();
                if let Err(err) = writeln!(writer, "{fen}") {
                    log::error!("failed to write output: {err}");
                }
            }
        }

        if is_new {
            state.new_entries += 1;
            if state.new_entries >= cfg.stop_early_at {
                state.skip = true;
                return;
            }
        }
        state.retained_plies += 1;
    }
}

fn parse_elo(value: &[u8]) -> i32 {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

impl Visitor for GameVisitor<'_> {
    type Tags = GameTags;
    type Movetext = GameState;
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<(), GameTags> {
        ControlFlow::Continue(GameTags::default())
    }

    fn tag(&mut self, tags: &mut GameTags, name: &[u8], value: RawTag<'_>) -> ControlFlow<()> {
        match name {
            b"FEN" => tags.start_fen = Some(value.decode_utf8_lossy().into_owned()),
            b"Variant" => {
                if value.as_bytes() == b"fischerandom" {
                    tags.chess960 = true;
                }
            }
            b"Result" => {
                tags.has_result = matches!(value.as_bytes(), b"1-0" | b"0-1" | b"1/2-1/2");
            }
            b"White" => tags.white = value.decode_utf8_lossy().into_owned(),
            b"Black" => tags.black = value.decode_utf8_lossy().into_owned(),
            b"WhiteElo" => tags.white_elo = parse_elo(value.as_bytes()),
            b"BlackElo" => tags.black_elo = parse_elo(value.as_bytes()),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameTags) -> ControlFlow<(), GameState> {
        let cfg = &self.ctx.cfg;

        if !tags.has_result {
            return ControlFlow::Break(());
        }
        if tags.white_elo < cfg.min_elo || tags.black_elo < cfg.min_elo {
            return ControlFlow::Break(());
        }

        // どちらか片方のエンジン名だけが合致した時のみ、その側に絞る。
        // 両方・どちらでもない場合はフィルタなし。空名は合致しない。
        let filter_side = cfg.engine_regex.as_ref().and_then(|re| {
            let white = !tags.white.is_empty() && re.is_match(&tags.white);
            let black = !tags.black.is_empty() && re.is_match(&tags.black);
            match (white, black) {
                (true, false) => Some(Color::White),
                (false, true) => Some(Color::Black),
                _ => None,
            }
        });

        if cfg.no_frc && tags.chess960 {
            return ControlFlow::Break(());
        }

        let mut board = Board::new();
        board.set_chess960(tags.chess960);
        if let Some(fen) = &tags.start_fen {
            let fen = self.patched_fen(fen);
            if let Err(err) = board.set_fen(&fen) {
                log::warn!("{}: bad FEN tag ({err}), skipping game", self.file);
                return ControlFlow::Break(());
            }
        }

        self.ctx.totals.games.fetch_add(1, Ordering::Relaxed);

        ControlFlow::Continue(GameState {
            board,
            filter_side,
            retained_plies: 0,
            new_entries: 0,
            pending: false,
            skip: false,
        })
    }

    fn san(&mut self, state: &mut GameState, san_plus: SanPlus) -> ControlFlow<()> {
        if state.skip {
            return ControlFlow::Continue(());
        }
        self.commit_pending(state);
        if state.skip {
            return ControlFlow::Continue(());
        }

        let cfg = &self.ctx.cfg;

        if state.retained_plies >= cfg.max_plies {
            state.skip = true;
            return ControlFlow::Continue(());
        }

        let Some(m) = state.board.resolve_san(&san_plus.san) else {
            log::warn!(
                "{}: unresolvable SAN {}, skipping game",
                self.file,
                san_plus.san
            );
            state.skip = true;
            return ControlFlow::Continue(());
        };
        state.board.make_move(m);

        if cfg.tb_limit > 1 && state.board.piece_count() <= cfg.tb_limit {
            state.skip = true;
            return ControlFlow::Continue(());
        }
        if cfg.omit_mates && !state.board.legal_moves_nonempty() {
            state.skip = true;
            return ControlFlow::Continue(());
        }
        if let Some(side) = state.filter_side {
            // 絞った側の手番で迎える局面だけ数える。盤は進むが
            // plyバジェットは消費しない。
            if state.board.side_to_move() != side {
                return ControlFlow::Continue(());
            }
        }

        state.pending = true;
        ControlFlow::Continue(())
    }

    fn comment(&mut self, state: &mut GameState, comment: RawComment<'_>) -> ControlFlow<()> {
        // 定跡手はカウントもバジェット消費もしない
        if state.pending && comment.as_bytes().trim_ascii() == b"book" {
            state.pending = false;
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _state: &mut GameState) -> ControlFlow<(), Skip> {
        // 本譜のみ
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, mut state: GameState) {
        self.commit_pending(&mut state);
    }
}
