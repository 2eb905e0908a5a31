use crate::models::common::{AgentId, KinematicState, Vector3};

/// 他エージェント位置の外部供給源（トランスポート）のインターフェース
pub trait IPositionFeed {
    /// 前回のポーリング以降に届いた位置更新を返す
    ///
    /// 含まれないエージェントは「前回から変化なし」として扱われる。
    fn poll(&mut self) -> Vec<(AgentId, Vector3)>;
}

/// 更新後の状態の出力先（ブロードキャスト・テレメトリ）のインターフェース
pub trait IStateSink {
    fn publish(&mut self, agent_id: AgentId, state: &KinematicState);
}

/// 固定周期のティック発生源のインターフェース
pub trait ITicker {
    /// 次のティック番号。実行終了なら None
    fn next_tick(&mut self) -> Option<u64>;
}

/// 更新を一切届けないフィード（単独エージェント用）
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeed;

impl IPositionFeed for NoFeed {
    fn poll(&mut self) -> Vec<(AgentId, Vector3)> {
        Vec::new()
    }
}

/// 出力を捨てるシンク
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl IStateSink for NullSink {
    fn publish(&mut self, _agent_id: AgentId, _state: &KinematicState) {}
}

/// 待ち時間なしで固定回数だけティックを発生させる模擬クロック
#[derive(Debug, Clone)]
pub struct SimClock {
    next: u64,
    max_ticks: u64,
}

impl SimClock {
    pub fn new(max_ticks: u64) -> Self {
        Self { next: 0, max_ticks }
    }

    /// 総シミュレーション時間と Δt からティック数を決める
    pub fn for_duration(t_max: f64, dt: f64) -> Self {
        Self::new(ticks_for_duration(t_max, dt))
    }

    pub fn max_ticks(&self) -> u64 {
        self.max_ticks
    }
}

impl ITicker for SimClock {
    fn next_tick(&mut self) -> Option<u64> {
        if self.next >= self.max_ticks {
            return None;
        }
        let tick = self.next;
        self.next += 1;
        Some(tick)
    }
}

/// `t_max` 秒を `dt` 刻みで進めるのに必要なティック数
pub fn ticks_for_duration(t_max: f64, dt: f64) -> u64 {
    if dt <= 0.0 || !t_max.is_finite() || t_max <= 0.0 {
        return 0;
    }
    // 0.1 / 0.02 のような丸め誤差で 1 ティック増えないよう余裕を持たせる
    (t_max / dt - 1e-9).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_clock_yields_fixed_number_of_ticks() {
        let mut clock = SimClock::new(3);
        assert_eq!(clock.next_tick(), Some(0));
        assert_eq!(clock.next_tick(), Some(1));
        assert_eq!(clock.next_tick(), Some(2));
        assert_eq!(clock.next_tick(), None);
    }

    #[test]
    fn test_ticks_for_duration() {
        assert_eq!(ticks_for_duration(1.0, 0.02), 50);
        assert_eq!(ticks_for_duration(0.1, 0.02), 5);
        assert_eq!(ticks_for_duration(0.11, 0.02), 6);
        assert_eq!(ticks_for_duration(0.0, 0.02), 0);
        assert_eq!(SimClock::for_duration(60.0, 0.01).max_ticks(), 6000);
    }
}
