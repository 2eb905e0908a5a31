use tracing::{error, trace, warn};

use crate::models::collision::{self, ProximityStats, Violation};
use crate::models::common::{AgentId, KinematicState, PeerPositions, Vector3};
use crate::models::force;
use crate::models::integrator;
use crate::models::params::ControlParameters;
use crate::models::scene::SceneModel;
use crate::models::traits::{IPositionFeed, IStateSink, ITicker};

/// 制御ループの致命的エラー
///
/// 調整パラメータの破綻やモデルのバグを示すため、回復は試みない。
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// 制御パラメータが不正（ティック開始前に検出）
    InvalidParameters(String),
    /// 加速度指令が非有限値になった
    NonFiniteCommand { agent_id: AgentId, tick: u64, command: Vector3 },
    /// 積分後の状態が非有限値になった
    NonFiniteState { agent_id: AgentId, tick: u64 },
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::InvalidParameters(msg) => write!(f, "制御パラメータが不正です: {}", msg),
            ControlError::NonFiniteCommand { agent_id, tick, command } => write!(
                f,
                "エージェント{}: ティック{}で加速度指令が非有限値です ({:?})",
                agent_id, tick, command
            ),
            ControlError::NonFiniteState { agent_id, tick } => write!(
                f,
                "エージェント{}: ティック{}で状態が非有限値になりました",
                agent_id, tick
            ),
        }
    }
}

impl std::error::Error for ControlError {}

/// 1ティックの処理結果
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// ティック番号（0始まり）
    pub tick: u64,
    /// 更新後の状態
    pub state: KinematicState,
    /// このティックで適用した加速度指令
    pub command: Vector3,
    /// スナップショットで検出された近接違反
    pub violations: Vec<Violation>,
    /// スナップショット上の最近接距離
    pub proximity: ProximityStats,
}

/// 1エージェントの制御ループ
///
/// 各ティックで次の順に処理する。
///
/// 1. 外部フィードから位置スナップショットを更新
/// 2. スナップショットに対して近接違反を検査
/// 3. 同じスナップショットで加速度指令を計算
/// 4. 二重積分器で状態を更新
/// 5. 新しい状態を外部シンクへ出力
///
/// 2 と 3 は同じ不変スナップショットを読むため、違反報告と制御は常に整合する。
pub struct AgentLoop<F, S> {
    scene: SceneModel,
    params: ControlParameters,
    state: KinematicState,
    peers: PeerPositions,
    feed: F,
    sink: S,
    tick_count: u64,
}

impl<F: IPositionFeed, S: IStateSink> AgentLoop<F, S> {
    /// シーンの初期位置から静止状態で制御ループを作成
    ///
    /// パラメータはここで検証し、不正なら制御ループを作らない。
    pub fn new(scene: SceneModel, params: ControlParameters, feed: F, sink: S) -> Result<Self, ControlError> {
        params.validate().map_err(ControlError::InvalidParameters)?;

        let state = KinematicState::at_rest(scene.start());
        let peers = PeerPositions::new(scene.agent_start.clone());

        Ok(Self {
            scene,
            params,
            state,
            peers,
            feed,
            sink,
            tick_count: 0,
        })
    }

    pub fn id(&self) -> AgentId {
        self.scene.agent_id
    }

    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    pub fn scene(&self) -> &SceneModel {
        &self.scene
    }

    pub fn params(&self) -> &ControlParameters {
        &self.params
    }

    pub fn peers(&self) -> &PeerPositions {
        &self.peers
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn goal(&self) -> Vector3 {
        self.scene.agent_goal
    }

    pub fn distance_to_goal(&self) -> f64 {
        self.state.position.distance(&self.scene.agent_goal)
    }

    /// ゴールから `tolerance` 以内かつ速さも `tolerance` 未満なら到着とみなす
    pub fn has_arrived(&self, tolerance: f64) -> bool {
        self.distance_to_goal() <= tolerance && self.state.speed() < tolerance
    }

    /// (a) 位置スナップショットの更新
    ///
    /// 更新が届かなかった他機は最後に観測した位置のまま。自機のエントリは
    /// 常に自分の状態で上書きする。
    pub fn refresh(&mut self) {
        let updates = self.feed.poll();
        let rejected = self.peers.apply(&updates);
        for id in rejected {
            warn!(agent = self.id(), peer = id, "範囲外のエージェントIDからの位置更新を無視");
        }
        self.peers.set(self.id(), self.state.position);
    }

    /// (b)〜(e) 現在のスナップショットで1ティック分の制御を実行
    ///
    /// 非有限値が発生した場合は状態を変更せずにエラーを返す。
    pub fn step(&mut self) -> Result<TickReport, ControlError> {
        let id = self.id();
        let tick = self.tick_count;
        let obstacles = &self.scene.obstacles;

        // (b) 近接監視
        let violations = collision::check(
            id,
            self.state.position,
            &self.peers,
            obstacles,
            self.params.agent_radius,
        );
        for violation in &violations {
            warn!(agent = id, tick, "{}", violation);
        }
        let proximity = collision::nearest_distances(
            id,
            self.state.position,
            &self.peers,
            obstacles,
            self.params.agent_radius,
        );

        // (c) APF制御（クリップ前の合力で桁あふれを検出する）
        let breakdown = force::compute_breakdown(
            id,
            &self.state,
            self.scene.agent_goal,
            &self.peers,
            obstacles,
            &self.params,
        );
        let command = breakdown.command;
        if !breakdown.unclamped.is_finite() || !command.is_finite() {
            error!(agent = id, tick, unclamped = ?breakdown.unclamped, "加速度指令が非有限値");
            return Err(ControlError::NonFiniteCommand {
                agent_id: id,
                tick,
                command: breakdown.unclamped,
            });
        }

        // (d) 状態更新（全て計算し終えてから置き換える）
        let next = integrator::advance(&self.state, command, self.params.dt, self.params.integration);
        if !next.is_finite() {
            error!(agent = id, tick, "積分後の状態が非有限値");
            return Err(ControlError::NonFiniteState { agent_id: id, tick });
        }
        self.state = next;
        self.tick_count += 1;

        trace!(
            agent = id,
            tick,
            x = next.position.x,
            y = next.position.y,
            z = next.position.z,
            speed = next.speed(),
            "状態更新"
        );

        // (e) 出力
        self.sink.publish(id, &self.state);

        Ok(TickReport {
            tick,
            state: self.state,
            command,
            violations,
            proximity,
        })
    }

    /// スナップショット更新と制御を続けて実行
    pub fn tick(&mut self) -> Result<TickReport, ControlError> {
        self.refresh();
        self.step()
    }

    /// 注入されたティッカーが終了するまでティックを繰り返す
    ///
    /// 最後のティック結果を返す（ティックが1回もなければ None）。
    pub fn run<T: ITicker>(&mut self, ticker: &mut T) -> Result<Option<TickReport>, ControlError> {
        let mut last = None;
        while ticker.next_tick().is_some() {
            last = Some(self.tick()?);
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::Obstacle;
    use crate::models::traits::{NoFeed, NullSink, SimClock};
    use std::sync::Arc;

    fn scene(start: Vector3, goal: Vector3, obstacles: Vec<Obstacle>) -> SceneModel {
        SceneModel::new(0, vec![start], goal, obstacles.into()).unwrap()
    }

    /// 受け取った状態を記録するシンク
    #[derive(Default)]
    struct RecordingSink {
        states: Vec<KinematicState>,
    }

    impl IStateSink for RecordingSink {
        fn publish(&mut self, _agent_id: AgentId, state: &KinematicState) {
            self.states.push(*state);
        }
    }

    /// 指定ティックだけ更新を返すフィード
    struct ScriptedFeed {
        script: Vec<Vec<(AgentId, Vector3)>>,
    }

    impl IPositionFeed for ScriptedFeed {
        fn poll(&mut self) -> Vec<(AgentId, Vector3)> {
            if self.script.is_empty() {
                Vec::new()
            } else {
                self.script.remove(0)
            }
        }
    }

    #[test]
    fn test_single_agent_converges_without_overshoot() {
        let params = ControlParameters {
            attraction_gain: 1.0,
            damping_gain: 2.0,
            max_acceleration: 2.0,
            dt: 0.01,
            ..Default::default()
        };
        let goal = Vector3::new(10.0, 0.0, 0.0);
        let mut agent =
            AgentLoop::new(scene(Vector3::ZERO, goal, vec![]), params, NoFeed, RecordingSink::default()).unwrap();

        agent.run(&mut SimClock::new(3000)).unwrap();

        let xs: Vec<f64> = agent.sink.states.iter().map(|s| s.position.x).collect();
        assert_eq!(xs.len(), 3000);
        for pair in xs.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-9, "position moved backwards: {:?}", pair);
        }
        assert!(xs.iter().all(|x| *x <= 10.0 + 1e-9));
        assert!(agent.distance_to_goal() < 1e-6);
        assert!(agent.state().speed() < 1e-6);
        assert!(agent.has_arrived(1e-3));
        assert!(agent.sink.states.iter().all(|s| s.position.y == 0.0 && s.position.z == 0.0));
    }

    #[test]
    fn test_agent_steers_around_obstacle_near_straight_line() {
        let params = ControlParameters::default();
        let obstacle = Obstacle::new(Vector3::new(5.0, 0.2, 0.0), 1.0);
        let goal = Vector3::new(10.0, 0.0, 0.0);
        let mut agent = AgentLoop::new(
            scene(Vector3::ZERO, goal, vec![obstacle]),
            params,
            NoFeed,
            RecordingSink::default(),
        )
        .unwrap();

        agent.run(&mut SimClock::for_duration(60.0, params.dt)).unwrap();

        let limit = params.agent_radius + obstacle.radius;
        let min_distance = agent
            .sink
            .states
            .iter()
            .map(|s| s.position.distance(&obstacle.position))
            .fold(f64::INFINITY, f64::min);
        let max_lateral = agent
            .sink
            .states
            .iter()
            .map(|s| s.position.y.abs())
            .fold(0.0, f64::max);

        assert!(min_distance >= limit, "penetrated obstacle: {}", min_distance);
        assert!(max_lateral > 1.0, "no lateral deviation: {}", max_lateral);
        assert!(agent.distance_to_goal() < 1e-2);
    }

    /// 障害物がちょうど直線上にあると横向きの力が生じず、APFの対称な局所解で
    /// 障害物手前に停止する（x≈2.84）。迂回ではなく非侵入のみを確認する。
    #[test]
    fn test_head_on_obstacle_is_never_penetrated() {
        let params = ControlParameters::default();
        let obstacle = Obstacle::new(Vector3::new(5.0, 0.0, 0.0), 1.0);
        let mut agent = AgentLoop::new(
            scene(Vector3::ZERO, Vector3::new(10.0, 0.0, 0.0), vec![obstacle]),
            params,
            NoFeed,
            NullSink,
        )
        .unwrap();

        for _ in 0..3000 {
            let report = agent.tick().unwrap();
            assert!(report.violations.is_empty());
            assert!(report.state.position.distance(&obstacle.position) >= params.agent_radius + obstacle.radius);
        }
    }

    #[test]
    fn test_missing_updates_keep_last_known_peer_position() {
        let start = vec![Vector3::ZERO, Vector3::new(5.0, 0.0, 0.0)];
        let scene = SceneModel::new(0, start, Vector3::ZERO, Arc::from(Vec::new())).unwrap();
        let feed = ScriptedFeed {
            script: vec![
                vec![(1, Vector3::new(4.0, 0.0, 0.0))],
                vec![],
                vec![(9, Vector3::ZERO)],
            ],
        };
        let mut agent = AgentLoop::new(scene, ControlParameters::default(), feed, NullSink).unwrap();

        agent.tick().unwrap();
        assert_eq!(agent.peers().get(1), Some(Vector3::new(4.0, 0.0, 0.0)));
        agent.tick().unwrap();
        assert_eq!(agent.peers().get(1), Some(Vector3::new(4.0, 0.0, 0.0)));
        agent.tick().unwrap();
        assert_eq!(agent.peers().get(1), Some(Vector3::new(4.0, 0.0, 0.0)));
        assert_eq!(agent.tick_count(), 3);
    }

    #[test]
    fn test_violation_reported_but_tick_continues() {
        let start = vec![Vector3::ZERO, Vector3::new(0.3, 0.0, 0.0)];
        let scene = SceneModel::new(0, start, Vector3::ZERO, Arc::from(Vec::new())).unwrap();
        let mut agent = AgentLoop::new(scene, ControlParameters::default(), NoFeed, NullSink).unwrap();

        let report = agent.tick().unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.tick, 0);
        // 他機から離れる向きに加速
        assert!(report.command.x < 0.0);
        assert_eq!(agent.tick_count(), 1);
    }

    #[test]
    fn test_overflowing_force_is_fatal_and_state_untouched() {
        let params = ControlParameters {
            attraction_gain: 1e300,
            ..Default::default()
        };
        let mut agent = AgentLoop::new(
            scene(Vector3::ZERO, Vector3::new(1e10, 0.0, 0.0), vec![]),
            params,
            NoFeed,
            RecordingSink::default(),
        )
        .unwrap();

        // 軸ごとのクリップで有限値に丸められても桁あふれとして扱う
        let err = agent.tick().unwrap_err();
        match err {
            ControlError::NonFiniteCommand { agent_id, tick, command } => {
                assert_eq!((agent_id, tick), (0, 0));
                assert_eq!(command.x, f64::INFINITY);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(*agent.state(), KinematicState::at_rest(Vector3::ZERO));
        assert_eq!(agent.tick_count(), 0);
        assert!(agent.sink.states.is_empty());
    }

    #[test]
    fn test_invalid_parameters_are_rejected_before_first_tick() {
        let invalid = [
            ControlParameters { max_acceleration: f64::NAN, ..Default::default() },
            ControlParameters { max_acceleration: -1.0, ..Default::default() },
            ControlParameters { attraction_gain: f64::NAN, ..Default::default() },
            ControlParameters { dt: 0.0, ..Default::default() },
        ];

        for params in invalid {
            let result = AgentLoop::new(
                scene(Vector3::ZERO, Vector3::new(1.0, 0.0, 0.0), vec![]),
                params,
                NoFeed,
                NullSink,
            );
            assert!(matches!(result, Err(ControlError::InvalidParameters(_))));
        }
    }

    #[test]
    fn test_run_with_empty_ticker_returns_none() {
        let mut agent = AgentLoop::new(
            scene(Vector3::ZERO, Vector3::ZERO, vec![]),
            ControlParameters::default(),
            NoFeed,
            NullSink,
        )
        .unwrap();
        assert_eq!(agent.run(&mut SimClock::new(0)).unwrap(), None);
    }
}
