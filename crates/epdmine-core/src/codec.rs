//! 固定長バイナリ局面エンコード
//!
//! 局面を48バイトの固定長レコードに詰める。正規形テキストを後から
//! 完全に復元できることが要件（多数の局面を保持して出力を後回しに
//! するモードで、テキスト化を遅延するためだけに使う）。
//!
//! # レイアウト (48バイト/レコード)
//!
//! | フィールド   | オフセット | サイズ | 説明                                   |
//! |--------------|------------|--------|----------------------------------------|
//! | placement    | 0          | 32     | 1マス4bit × 64マス（a1→h8、下位nibble先）|
//! | turn         | 32         | 1      | 0=白, 1=黒                             |
//! | castling     | 33         | 8      | 権利を持つルークのビットボード (u64 LE) |
//! | ep           | 41         | 1      | アンパッサン対象マス+1（0=なし）        |
//! | halfmoves    | 42         | 2      | 半手クロック (u16 LE, 飽和)            |
//! | fullmoves    | 44         | 2      | 手数 (u16 LE, 飽和)                    |
//! | chess960     | 46         | 1      | キャスリング解釈フラグ                  |
//! | marker       | 47         | 1      | 常に1（ゼロ初期化スロットと区別）       |
//!
//! nibble値: 0=空, 1..=6 白PNBRQK, 7..=12 黒PNBRQK。

use std::num::NonZeroU32;

use shakmaty::{
    Bitboard, CastlingMode, Chess, Color, EnPassantMode, FromSetup, Piece, Position, Role, Setup,
    Square,
};

/// レコード長（バイト）
pub const PACKED_SIZE: usize = 48;

const MARKER: u8 = 1;

/// 48バイト固定長の局面レコード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedBoard(pub [u8; PACKED_SIZE]);

impl PackedBoard {
    /// ゼロ初期化（未使用スロット用）。`is_present()`は偽を返す。
    pub const fn zeroed() -> Self {
        PackedBoard([0; PACKED_SIZE])
    }

    /// 実データが入っているか
    pub fn is_present(&self) -> bool {
        self.0[47] == MARKER
    }

    pub fn as_bytes(&self) -> &[u8; PACKED_SIZE] {
        &self.0
    }
}

/// デコードエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// nibble値が駒として不正
    BadPiece(u8),
    /// マス番号が不正
    BadSquare(u8),
    /// markerバイト不正（未使用スロットや別形式）
    BadMarker(u8),
    /// フィールドは読めたが局面として成立しない
    Position(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::BadPiece(n) => write!(f, "invalid piece nibble: {n}"),
            CodecError::BadSquare(n) => write!(f, "invalid square index: {n}"),
            CodecError::BadMarker(n) => write!(f, "invalid record marker: {n}"),
            CodecError::Position(s) => write!(f, "packed record is not a legal position: {s}"),
        }
    }
}

impl std::error::Error for CodecError {}

fn piece_nibble(piece: Piece) -> u8 {
    let role = match piece.role {
        Role::Pawn => 1,
        Role::Knight => 2,
        Role::Bishop => 3,
        Role::Rook => 4,
        Role::Queen => 5,
        Role::King => 6,
    };
    match piece.color {
        Color::White => role,
        Color::Black => role + 6,
    }
}

fn nibble_piece(nibble: u8) -> Result<Option<Piece>, CodecError> {
    if nibble == 0 {
        return Ok(None);
    }
    let (color, role_idx) = if nibble <= 6 {
        (Color::White, nibble)
    } else {
        (Color::Black, nibble - 6)
    };
    let role = match role_idx {
        1 => Role::Pawn,
        2 => Role::Knight,
        3 => Role::Bishop,
        4 => Role::Rook,
        5 => Role::Queen,
        6 => Role::King,
        _ => return Err(CodecError::BadPiece(nibble)),
    };
    Ok(Some(Piece { color, role }))
}

/// 局面をエンコードする
pub fn pack(pos: &Chess, chess960: bool) -> PackedBoard {
    let mut buf = [0u8; PACKED_SIZE];

    let board = pos.board();
    for idx in 0..64u32 {
        let sq = Square::new(idx);
        if let Some(piece) = board.piece_at(sq) {
            let nibble = piece_nibble(piece);
            let byte = (idx / 2) as usize;
            if idx % 2 == 0 {
                buf[byte] |= nibble;
            } else {
                buf[byte] |= nibble << 4;
            }
        }
    }

    buf[32] = match pos.turn() {
        Color::White => 0,
        Color::Black => 1,
    };

    let rights: u64 = pos.castles().castling_rights().0;
    buf[33..41].copy_from_slice(&rights.to_le_bytes());

    buf[41] = pos
        .ep_square(EnPassantMode::Legal)
        .map(|sq| sq as u8 + 1)
        .unwrap_or(0);

    let halfmoves = u16::try_from(pos.halfmoves()).unwrap_or(u16::MAX);
    buf[42..44].copy_from_slice(&halfmoves.to_le_bytes());

    let fullmoves = u16::try_from(pos.fullmoves().get()).unwrap_or(u16::MAX);
    buf[44..46].copy_from_slice(&fullmoves.to_le_bytes());

    buf[46] = chess960 as u8;
    buf[47] = MARKER;

    PackedBoard(buf)
}

/// レコードから局面を復元する
pub fn unpack(packed: &PackedBoard) -> Result<(Chess, bool), CodecError> {
    let buf = &packed.0;
    if buf[47] != MARKER {
        return Err(CodecError::BadMarker(buf[47]));
    }

    let mut board = shakmaty::Board::empty();
    for idx in 0..64u32 {
        let byte = buf[(idx / 2) as usize];
        let nibble = if idx % 2 == 0 { byte & 0x0F } else { byte >> 4 };
        if let Some(piece) = nibble_piece(nibble)? {
            board.set_piece_at(Square::new(idx), piece);
        }
    }

    let turn = if buf[32] == 0 {
        Color::White
    } else {
        Color::Black
    };

    let rights = u64::from_le_bytes(
        buf[33..41]
            .try_into()
            .expect("slice of fixed length 8"),
    );

    let ep_square = match buf[41] {
        0 => None,
        n if n <= 64 => Some(Square::new(u32::from(n - 1))),
        n => return Err(CodecError::BadSquare(n)),
    };

    let halfmoves = u16::from_le_bytes(buf[42..44].try_into().expect("slice of fixed length 2"));
    let fullmoves = u16::from_le_bytes(buf[44..46].try_into().expect("slice of fixed length 2"));
    let chess960 = buf[46] != 0;

    let mut setup = Setup::empty();
    setup.board = board;
    setup.turn = turn;
    setup.castling_rights = Bitboard(rights);
    setup.ep_square = ep_square;
    setup.halfmoves = u32::from(halfmoves);
    setup.fullmoves = NonZeroU32::new(u32::from(fullmoves.max(1))).expect("at least 1");

    let mode = if chess960 {
        CastlingMode::Chess960
    } else {
        CastlingMode::Standard
    };

    let pos = Chess::from_setup(setup, mode).map_err(|e| CodecError::Position(e.to_string()))?;
    Ok((pos, chess960))
}
