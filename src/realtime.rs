//! # Realtime モジュール
//!
//! エージェントごとに独立した tokio タスクで制御ループを実時間実行します。
//!
//! 各タスクは周期 Δt の [`IntervalTicker`] で駆動され、位置は
//! [`PositionBoard`] 経由で非同期に共有されます。処理が周期に間に合わなかった
//! 場合は遅れたティックを破棄し（`MissedTickBehavior::Skip`）、破棄数を記録します。
//! 状態の積分は常に固定の Δt で行い、実時間のずれで刻み幅を変えることはありません。

use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::models::{AgentId, AgentLoop, ControlError, KinematicState, ViolationKind, ticks_for_duration};
use crate::scenario::MissionConfig;
use crate::transport::PositionBoard;

/// 固定周期のティック発生源（tokio interval）
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
    period: Duration,
    last: Option<Instant>,
    next: u64,
    max_ticks: u64,
    dropped: u64,
}

impl IntervalTicker {
    /// 周期 `dt` 秒で `max_ticks` 回発火するティッカー
    ///
    /// tokio ランタイム内で呼び出す必要がある。
    pub fn new(dt: f64, max_ticks: u64) -> Self {
        let period = Duration::from_secs_f64(dt);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            interval,
            period,
            last: None,
            next: 0,
            max_ticks,
            dropped: 0,
        }
    }

    /// 次のティックまで待機し、ティック番号を返す。終了なら None
    pub async fn next_tick(&mut self) -> Option<u64> {
        if self.next >= self.max_ticks {
            return None;
        }

        let at = self.interval.tick().await;
        if let Some(last) = self.last {
            let periods = at.duration_since(last).as_secs_f64() / self.period.as_secs_f64();
            let missed = periods.round() as u64;
            if missed > 1 {
                self.dropped += missed - 1;
                warn!(dropped = missed - 1, "処理遅延によりティックを破棄");
            }
        }
        self.last = Some(at);

        let tick = self.next;
        self.next += 1;
        Some(tick)
    }

    /// 破棄したティック数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// 1エージェントの実時間実行結果
#[derive(Debug, Clone)]
pub struct RealtimeOutcome {
    pub agent_id: AgentId,
    pub final_state: KinematicState,
    pub ticks: u64,
    pub dropped_ticks: u64,
    pub distance_to_goal: f64,
    pub peer_violations: u64,
    pub obstacle_violations: u64,
}

/// 全エージェントを並行タスクとして実時間実行
///
/// `t_max_s` 相当のティック数を各タスクが実行し終えるまで待つ。
/// いずれかのタスクで致命的エラーが起きた場合は残りのタスクを中断してそのエラーを返す。
pub async fn run_realtime(
    mission: &MissionConfig,
) -> Result<Vec<RealtimeOutcome>, Box<dyn std::error::Error>> {
    mission.validate()?;

    let params = mission.control_parameters();
    let max_ticks = ticks_for_duration(mission.sim.t_max_s, params.dt);
    let board = PositionBoard::new(&mission.starts());
    let obstacles = mission.obstacle_set();

    info!(
        "=== 実時間実行開始: {}機, {}ティック (周期 {:.3}秒) ===",
        mission.agent_count(),
        max_ticks,
        params.dt
    );

    let mut tasks = JoinSet::new();
    for agent_id in 0..mission.agent_count() {
        let scene = mission.scene_with_obstacles(agent_id, obstacles.clone())?;
        let agent = AgentLoop::new(scene, params, board.feed_for(agent_id), board.sink_for(agent_id))?;

        tasks.spawn(async move {
            let mut agent = agent;
            let mut ticker = IntervalTicker::new(params.dt, max_ticks);
            let mut peer_violations = 0;
            let mut obstacle_violations = 0;

            while ticker.next_tick().await.is_some() {
                let report = agent.tick()?;
                for violation in &report.violations {
                    match violation.kind {
                        ViolationKind::Peer(_) => peer_violations += 1,
                        ViolationKind::Obstacle(_) => obstacle_violations += 1,
                    }
                }
            }

            Ok::<RealtimeOutcome, ControlError>(RealtimeOutcome {
                agent_id: agent.id(),
                final_state: *agent.state(),
                ticks: agent.tick_count(),
                dropped_ticks: ticker.dropped(),
                distance_to_goal: agent.distance_to_goal(),
                peer_violations,
                obstacle_violations,
            })
        });
    }

    // 1機でも致命的エラーになれば残りのタスクも中断する
    let mut outcomes = Vec::with_capacity(mission.agent_count());
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!(error = %e, "制御ループが停止したため実時間実行を中断");
                tasks.abort_all();
                return Err(e.into());
            }
        }
    }
    outcomes.sort_by_key(|outcome| outcome.agent_id);

    info!("=== 実時間実行完了 ===");
    Ok(outcomes)
}
