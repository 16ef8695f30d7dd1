//! RunIdGenerator port - 実行 ID 生成の抽象化
//!
//! # 実装
//! - **UlidRunIdGenerator**: Clock から時刻を取り ULID を作る

use ulid::Ulid;

use crate::domain::RunId;
use crate::ports::Clock;

/// RunIdGenerator は実行ごとの ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait RunIdGenerator: Send + Sync {
    fn next_run_id(&self) -> RunId;
}

/// UlidRunIdGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// テスト時に ManualClock を使えば timestamp 部分が決定的になります。
pub struct UlidRunIdGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidRunIdGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> RunIdGenerator for UlidRunIdGenerator<C> {
    fn next_run_id(&self) -> RunId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        RunId::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ManualClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidRunIdGenerator::new(SystemClock);

        let id1 = id_gen.next_run_id();
        let id2 = id_gen.next_run_id();

        assert_ne!(id1, id2);
    }

    #[test]
    fn timestamp_comes_from_the_clock() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidRunIdGenerator::new(ManualClock::new(fixed_time));

        let id1 = id_gen.next_run_id();
        let id2 = id_gen.next_run_id();

        // 同じ時刻でもランダム部分で区別される
        assert_ne!(id1, id2);
        assert_eq!(id1.timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
