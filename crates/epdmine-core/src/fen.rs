//! 正規形テキスト（FEN）の出力
//!
//! 6フィールド形式: 配置 / 手番 / キャスリング / アンパッサン / 半手 / 全手。
//! `include_counters=false`で末尾2フィールドを省いた4フィールド形式になる。
//!
//! キャスリング欄はChess960フラグが立っていればルーク筋の文字
//! （例: `HAha`）、そうでなければ標準の`KQkq`で出す。
//! アンパッサン欄は実際に取れる場合のみ意味を持つ（取れなければ`-`）。

use std::fmt::Write as _;

use shakmaty::{CastlingSide, Chess, Color, EnPassantMode, File, Position, Rank, Square};

/// 局面を正規形テキストに変換する
pub fn render(pos: &Chess, chess960: bool, include_counters: bool) -> String {
    let mut out = String::with_capacity(96);

    // 配置
    let board = pos.board();
    for rank in (0u32..8).rev() {
        let mut empty = 0u32;
        for file in 0u32..8 {
            let sq = Square::from_coords(File::new(file), Rank::new(rank));
            match board.piece_at(sq) {
                Some(piece) => {
                    if empty > 0 {
                        let _ = write!(out, "{empty}");
                        empty = 0;
                    }
                    out.push(piece.char());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            let _ = write!(out, "{empty}");
        }
        if rank > 0 {
            out.push('/');
        }
    }

    // 手番
    out.push(' ');
    out.push(match pos.turn() {
        Color::White => 'w',
        Color::Black => 'b',
    });

    // キャスリング
    out.push(' ');
    out.push_str(&castling_field(pos, chess960));

    // アンパッサン
    out.push(' ');
    match pos.ep_square(EnPassantMode::Legal) {
        Some(sq) => {
            let _ = write!(out, "{sq}");
        }
        None => out.push('-'),
    }

    if include_counters {
        let _ = write!(out, " {} {}", pos.halfmoves(), pos.fullmoves());
    }

    out
}

fn castling_field(pos: &Chess, chess960: bool) -> String {
    let castles = pos.castles();
    let mut field = String::with_capacity(4);

    for color in [Color::White, Color::Black] {
        for side in [CastlingSide::KingSide, CastlingSide::QueenSide] {
            if let Some(rook) = castles.rook(color, side) {
                let ch = if chess960 {
                    rook.file().char()
                } else {
                    match side {
                        CastlingSide::KingSide => 'k',
                        CastlingSide::QueenSide => 'q',
                    }
                };
                field.push(if color == Color::White {
                    ch.to_ascii_uppercase()
                } else {
                    ch
                });
            }
        }
    }

    if field.is_empty() {
        field.push('-');
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_startpos() {
        let pos = Chess::default();
        assert_eq!(
            render(&pos, false, true),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
    }

    #[test]
    fn test_render_startpos_frc_letters() {
        let pos = Chess::default();
        assert_eq!(
            render(&pos, true, true),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w HAha - 0 1"
        );
    }

    #[test]
    fn test_render_without_counters() {
        let pos = Chess::default();
        assert_eq!(
            render(&pos, false, false),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -"
        );
    }
}
