//! シャード分割された並行テーブル
//!
//! 64bit局面ハッシュをキーとする2種類の表。どちらもキー上位ビットで
//! シャードを選び、シャード単位のミューテックスで保護する。異なる
//! キーへの書き込みが互いをブロックしない程度にシャード数を取る
//! （ワーカー数の数倍では衝突は統計的に無視できる）。
//!
//! - [`CountTable`]: ハッシュ→出現回数。公開する変更操作は
//!   `increment_or_insert`のみ。
//! - [`CanonicalTable`]: ハッシュ→固定長レコード。書き込みは
//!   キーごとに一度きり（後続は黙って捨てる）。
//!
//! シャード内部は線形探索のオープンアドレス表（容量は2の冪、
//! 負荷率3/4で倍増）。ハッシュそのものをキーに使うので再ハッシュは
//! 不要、下位ビットがそのままスロット位置になる。

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::codec::PackedBoard;

/// シャード数の指数（128シャード）
const SHARD_BITS: u32 = 7;
const SHARD_COUNT: usize = 1 << SHARD_BITS;

/// シャードあたりの初期スロット数。フィッシュテスト規模のコーパスで
/// 百万キー程度を再配置なしで収める。
const INITIAL_SLOTS: usize = 1 << 13;

const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

#[inline]
fn shard_index(key: u64) -> usize {
    (key >> (64 - SHARD_BITS)) as usize
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// カウント表
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct CountSlot {
    key: u64,
    /// 0なら未使用（カウントは常に1以上）
    count: u64,
}

struct CountShard {
    slots: Vec<CountSlot>,
    len: usize,
}

impl CountShard {
    fn new() -> Self {
        CountShard {
            slots: vec![CountSlot { key: 0, count: 0 }; INITIAL_SLOTS],
            len: 0,
        }
    }

    fn increment_or_insert(&mut self, key: u64) -> (bool, u64) {
        if (self.len + 1) * MAX_LOAD_DEN > self.slots.len() * MAX_LOAD_NUM {
            self.grow();
        }
        let mask = self.slots.len() - 1;
        let mut idx = key as usize & mask;
        loop {
            let slot = &mut self.slots[idx];
            if slot.count == 0 {
                *slot = CountSlot { key, count: 1 };
                self.len += 1;
                return (true, 1);
            }
            if slot.key == key {
                slot.count += 1;
                return (false, slot.count);
            }
            idx = (idx + 1) & mask;
        }
    }

    fn get(&self, key: u64) -> Option<u64> {
        let mask = self.slots.len() - 1;
        let mut idx = key as usize & mask;
        loop {
            let slot = &self.slots[idx];
            if slot.count == 0 {
                return None;
            }
            if slot.key == key {
                return Some(slot.count);
            }
            idx = (idx + 1) & mask;
        }
    }

    fn grow(&mut self) {
        let new_cap = self.slots.len() * 2;
        let old = std::mem::replace(&mut self.slots, vec![CountSlot { key: 0, count: 0 }; new_cap]);
        let mask = new_cap - 1;
        for slot in old {
            if slot.count == 0 {
                continue;
            }
            let mut idx = slot.key as usize & mask;
            while self.slots[idx].count != 0 {
                idx = (idx + 1) & mask;
            }
            self.slots[idx] = slot;
        }
    }
}

/// ハッシュ→出現回数の並行カウント表
pub struct CountTable {
    shards: Vec<Mutex<CountShard>>,
}

impl CountTable {
    pub fn new() -> Self {
        CountTable {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(CountShard::new())).collect(),
        }
    }

    /// キーを挿入またはインクリメントする（シャード内でアトミック）
    ///
    /// 新規挿入なら`(true, 1)`、既存なら`(false, インクリメント後の値)`。
    /// `is_new=true`は各キーにつき生涯一度だけ返る。
    pub fn increment_or_insert(&self, key: u64) -> (bool, u64) {
        lock_ignore_poison(&self.shards[shard_index(key)]).increment_or_insert(key)
    }

    /// キーの現在値
    pub fn get(&self, key: u64) -> Option<u64> {
        lock_ignore_poison(&self.shards[shard_index(key)]).get(key)
    }

    /// 登録済みキー数
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| lock_ignore_poison(s).len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全エントリを走査する（ワーカー合流後の読み取り専用フェーズ用）
    pub fn for_each(&self, mut f: impl FnMut(u64, u64)) {
        for shard in &self.shards {
            let shard = lock_ignore_poison(shard);
            for slot in &shard.slots {
                if slot.count != 0 {
                    f(slot.key, slot.count);
                }
            }
        }
    }
}

impl Default for CountTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// 正規形表
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct CanonicalSlot {
    key: u64,
    packed: PackedBoard,
}

struct CanonicalShard {
    slots: Vec<CanonicalSlot>,
    len: usize,
}

impl CanonicalShard {
    fn new() -> Self {
        CanonicalShard {
            slots: vec![
                CanonicalSlot { key: 0, packed: PackedBoard::zeroed() };
                INITIAL_SLOTS
            ],
            len: 0,
        }
    }

    fn try_insert(&mut self, key: u64, packed: PackedBoard) -> bool {
        if (self.len + 1) * MAX_LOAD_DEN > self.slots.len() * MAX_LOAD_NUM {
            self.grow();
        }
        let mask = self.slots.len() - 1;
        let mut idx = key as usize & mask;
        loop {
            let slot = &mut self.slots[idx];
            if !slot.packed.is_present() {
                *slot = CanonicalSlot { key, packed };
                self.len += 1;
                return true;
            }
            if slot.key == key {
                return false;
            }
            idx = (idx + 1) & mask;
        }
    }

    fn grow(&mut self) {
        let new_cap = self.slots.len() * 2;
        let old = std::mem::replace(
            &mut self.slots,
            vec![
                CanonicalSlot { key: 0, packed: PackedBoard::zeroed() };
                new_cap
            ],
        );
        let mask = new_cap - 1;
        for slot in old {
            if !slot.packed.is_present() {
                continue;
            }
            let mut idx = slot.key as usize & mask;
            while self.slots[idx].packed.is_present() {
                idx = (idx + 1) & mask;
            }
            self.slots[idx] = slot;
        }
    }
}

/// ハッシュ→固定長レコードの一度書き表
pub struct CanonicalTable {
    shards: Vec<Mutex<CanonicalShard>>,
}

impl CanonicalTable {
    pub fn new() -> Self {
        CanonicalTable {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(CanonicalShard::new())).collect(),
        }
    }

    /// 未登録なら挿入する。既登録なら何もせず偽を返す。
    pub fn try_insert(&self, key: u64, packed: PackedBoard) -> bool {
        lock_ignore_poison(&self.shards[shard_index(key)]).try_insert(key, packed)
    }

    /// 登録済みキー数
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| lock_ignore_poison(s).len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全エントリを走査する（ワーカー合流後の読み取り専用フェーズ用）
    pub fn for_each(&self, mut f: impl FnMut(u64, &PackedBoard)) {
        for shard in &self.shards {
            let shard = lock_ignore_poison(shard);
            for slot in &shard.slots {
                if slot.packed.is_present() {
                    f(slot.key, &slot.packed);
                }
            }
        }
    }
}

impl Default for CanonicalTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_increment() {
        let table = CountTable::new();
        assert_eq!(table.increment_or_insert(42), (true, 1));
        assert_eq!(table.increment_or_insert(42), (false, 2));
        assert_eq!(table.increment_or_insert(42), (false, 3));
        assert_eq!(table.get(42), Some(3));
        assert_eq!(table.get(43), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_keys_in_same_shard_probe_independently() {
        let table = CountTable::new();
        // 上位ビットが同じ＝同一シャード、下位ビットも同じ＝スロット衝突
        let a = 0x0123_4567_0000_0001u64;
        let b = 0x0123_0000_0000_0001u64;
        assert_eq!(table.increment_or_insert(a), (true, 1));
        assert_eq!(table.increment_or_insert(b), (true, 1));
        assert_eq!(table.increment_or_insert(a), (false, 2));
        assert_eq!(table.get(a), Some(2));
        assert_eq!(table.get(b), Some(1));
    }

    #[test]
    fn test_growth_preserves_counts() {
        let table = CountTable::new();
        // 1シャードの初期容量を大きく超える数を詰める
        let n = (INITIAL_SLOTS * 4) as u64;
        for key in 1..=n {
            table.increment_or_insert(key);
        }
        for key in 1..=n {
            table.increment_or_insert(key);
        }
        assert_eq!(table.len(), n as usize);
        for key in 1..=n {
            assert_eq!(table.get(key), Some(2), "key {key}");
        }
        let mut sum = 0u64;
        table.for_each(|_, count| sum += count);
        assert_eq!(sum, 2 * n);
    }

    #[test]
    fn test_concurrent_counts_are_exact() {
        use std::sync::Arc;

        let table = Arc::new(CountTable::new());
        let threads = 8u64;
        let keys_per_thread = 2000u64;
        let repeats = 5u64;

        let mut handles = Vec::new();
        for _ in 0..threads {
            let table = Arc::clone(&table);
            handles.push(std::thread::spawn(move || {
                let mut new_seen = 0u64;
                for _ in 0..repeats {
                    // 全スレッド共通のキー空間を回す
                    for i in 0..keys_per_thread {
                        let key = i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
                        let (is_new, _) = table.increment_or_insert(key);
                        if is_new {
                            new_seen += 1;
                        }
                    }
                }
                new_seen
            }));
        }

        let total_new: u64 = handles.into_iter().map(|h| h.join().expect("worker")).sum();

        // is_newはキーごとに全スレッド合計で一度だけ
        assert_eq!(total_new, keys_per_thread);
        assert_eq!(table.len(), keys_per_thread as usize);
        for i in 0..keys_per_thread {
            let key = i.wrapping_mul(0x9E37_79B9_7F4A_7C15);
            assert_eq!(table.get(key), Some(threads * repeats));
        }
    }

    #[test]
    fn test_canonical_is_write_once() {
        let table = CanonicalTable::new();
        let mut a = PackedBoard::zeroed();
        a.0[0] = 0xAB;
        a.0[47] = 1;
        let mut b = PackedBoard::zeroed();
        b.0[0] = 0xCD;
        b.0[47] = 1;

        assert!(table.try_insert(7, a));
        assert!(!table.try_insert(7, b));
        assert_eq!(table.len(), 1);

        let mut seen = Vec::new();
        table.for_each(|key, packed| seen.push((key, packed.0[0])));
        assert_eq!(seen, vec![(7, 0xAB)]);
    }
}
