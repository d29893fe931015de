//! epdmine-core
//!
//! PGNコーパスから頻出局面を採掘するためのドメイン層。
//!
//! - `board`: チェス局面の追跡（FEN解析・SAN解決・ハッシュ）
//! - `fen`: 正規形テキスト（FEN）の出力
//! - `codec`: 固定長バイナリ局面エンコード（PackedBoard）
//! - `table`: シャード分割された並行カウント表・正規形表

pub mod board;
pub mod codec;
pub mod fen;
pub mod table;

pub use board::{Board, FenError};
pub use codec::{CodecError, PackedBoard};
pub use table::{CanonicalTable, CountTable};
