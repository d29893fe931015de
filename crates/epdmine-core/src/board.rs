//! チェス局面の追跡
//!
//! コーパス採掘用の局面マシン。1ゲームにつき1インスタンスを使い、
//! FEN設定→SAN解決→着手適用→ハッシュ取得、を繰り返す。
//! 指し手生成・合法判定・Zobristキーはshakmatyに委譲する。
//!
//! キャスリング権の解釈はChess960フラグで切り替わる（ルーク筋ベース）。
//! フラグは`set_fen`より前に設定しておくこと。

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};

use crate::codec::{self, CodecError, PackedBoard};
use crate::fen;

/// 標準初期局面のFEN
pub const FEN_STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// FEN解析エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    /// 字句・形式が不正
    Syntax(String),
    /// 形式は正しいが局面として成立しない
    Illegal(String),
}

impl std::fmt::Display for FenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FenError::Syntax(s) => write!(f, "invalid FEN: {s}"),
            FenError::Illegal(s) => write!(f, "illegal position: {s}"),
        }
    }
}

impl std::error::Error for FenError {}

/// 採掘用の局面
#[derive(Debug, Clone)]
pub struct Board {
    pos: Chess,
    chess960: bool,
}

impl Board {
    /// 標準初期局面を生成
    pub fn new() -> Self {
        Board {
            pos: Chess::default(),
            chess960: false,
        }
    }

    /// キャスリング権の解釈を切り替える
    ///
    /// 以降の`set_fen`・テキスト出力・エンコードに効く。
    pub fn set_chess960(&mut self, on: bool) {
        self.chess960 = on;
    }

    /// Chess960フラグ
    pub fn is_chess960(&self) -> bool {
        self.chess960
    }

    fn castling_mode(&self) -> CastlingMode {
        if self.chess960 {
            CastlingMode::Chess960
        } else {
            CastlingMode::Standard
        }
    }

    /// FEN文字列から局面を設定
    pub fn set_fen(&mut self, fen: &str) -> Result<(), FenError> {
        let parsed =
            Fen::from_ascii(fen.as_bytes()).map_err(|e| FenError::Syntax(e.to_string()))?;
        self.pos = parsed
            .into_position(self.castling_mode())
            .map_err(|e| FenError::Illegal(e.to_string()))?;
        Ok(())
    }

    /// SAN表記を現局面に対して解決する
    ///
    /// 不正・曖昧・非合法なら`None`（パニックしない）。
    pub fn parse_san(&self, s: &str) -> Option<Move> {
        let san = San::from_ascii(s.as_bytes()).ok()?;
        self.resolve_san(&san)
    }

    /// 解析済みSANを現局面に対して解決する
    pub fn resolve_san(&self, san: &San) -> Option<Move> {
        san.to_move(&self.pos).ok()
    }

    /// 着手を適用する
    ///
    /// `m`は`parse_san`/`resolve_san`が返した合法手であること。
    pub fn make_move(&mut self, m: Move) {
        self.pos.play_unchecked(m);
    }

    /// 手番
    pub fn side_to_move(&self) -> Color {
        self.pos.turn()
    }

    /// 局面ハッシュ（64bit Zobrist）
    ///
    /// 配置・手番・キャスリング権・アンパッサンのみ。手数カウンタは含めない。
    /// 着手適用後の値は、同一局面をFENから再構築した値と一致する。
    pub fn hash(&self) -> u64 {
        self.pos.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
    }

    /// 盤上の駒数
    pub fn piece_count(&self) -> u32 {
        self.pos.board().occupied().count() as u32
    }

    /// 合法手が存在するか
    ///
    /// 指し手生成を伴うため、詰み除外フィルタが有効な時だけ呼ぶこと。
    pub fn legal_moves_nonempty(&self) -> bool {
        !self.pos.legal_moves().is_empty()
    }

    /// 正規形テキストを出力
    ///
    /// `include_counters=false`なら手数カウンタ2フィールドを省く。
    pub fn get_fen(&self, include_counters: bool) -> String {
        fen::render(&self.pos, self.chess960, include_counters)
    }

    /// 固定長バイナリにエンコード
    pub fn encode(&self) -> PackedBoard {
        codec::pack(&self.pos, self.chess960)
    }

    /// バイナリから局面を復元
    pub fn decode(packed: &PackedBoard) -> Result<Self, CodecError> {
        let (pos, chess960) = codec::unpack(packed)?;
        Ok(Board { pos, chess960 })
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
