//! # Simulation モジュール
//!
//! ミッション内の全エージェントを1プロセスでロックステップ実行する
//! シミュレーションエンジンを提供します。
//!
//! 各エージェントは独立した制御ループ（[`AgentLoop`]）を持ち、位置は
//! [`PositionBoard`] を介して共有されます。固定時間刻み（Δt）の模擬クロックで
//! ティックを進め、実行結果を [`RunReport`] にまとめます。
//!
//! ## ティック内の処理順序
//!
//! 1. **スナップショット更新**: 全エージェントが掲示板から位置を読み込む
//! 2. **制御ステップ**: 全エージェントが監視・制御・積分・出力を実行
//!
//! 全員が読み込みを終えてから更新を書き込むため、同じティックの
//! エージェントは全員同じ時点の位置を参照します。
//!
//! ## 使用例
//!
//! ```rust,no_run
//! use apfnav::scenario::MissionConfig;
//! use apfnav::simulation::SimulationEngine;
//!
//! let mission = MissionConfig::from_file("missions/mission_multi_agent.yaml")?;
//! let mut engine = SimulationEngine::new(mission, 1);
//! engine.initialize()?;
//! let report = engine.run()?;
//! report.print_summary();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, trace};

use crate::models::{
    AgentLoop, ControlParameters, ITicker, SimClock, TickReport, Vector3, ViolationKind,
};
use crate::scenario::MissionConfig;
use crate::transport::{BoardFeed, BoardSink, PositionBoard};

/// シミュレーション中に集計するエージェントごとの統計
#[derive(Debug, Clone)]
struct AgentStats {
    arrival_tick: Option<u64>,
    min_peer_distance: Option<f64>,
    min_obstacle_clearance: Option<f64>,
    peer_violations: u64,
    obstacle_violations: u64,
}

impl AgentStats {
    fn new() -> Self {
        Self {
            arrival_tick: None,
            min_peer_distance: None,
            min_obstacle_clearance: None,
            peer_violations: 0,
            obstacle_violations: 0,
        }
    }

    fn record(&mut self, report: &TickReport) {
        self.min_peer_distance = min_option(self.min_peer_distance, report.proximity.min_peer_distance);
        self.min_obstacle_clearance =
            min_option(self.min_obstacle_clearance, report.proximity.min_obstacle_clearance);

        for violation in &report.violations {
            match violation.kind {
                ViolationKind::Peer(_) => self.peer_violations += 1,
                ViolationKind::Obstacle(_) => self.obstacle_violations += 1,
            }
        }
    }
}

fn min_option(current: Option<f64>, sample: Option<f64>) -> Option<f64> {
    match (current, sample) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (None, b) => b,
        (a, None) => a,
    }
}

pub struct SimulationEngine {
    pub current_time: f64,
    pub dt: f64,
    pub max_time: f64,
    pub step_count: u64,
    pub goal_tolerance: f64,
    pub record_every: u64,

    pub params: ControlParameters,
    pub agents: Vec<AgentLoop<BoardFeed, BoardSink>>,
    pub board: PositionBoard,

    pub mission: MissionConfig,
    pub verbose_level: u8,

    stats: Vec<AgentStats>,
    trajectory: Vec<TrajectorySample>,
}

impl SimulationEngine {
    pub fn new(mission: MissionConfig, verbose_level: u8) -> Self {
        let params = mission.control_parameters();
        let board = PositionBoard::new(&mission.starts());

        Self {
            current_time: 0.0,
            dt: params.dt,
            max_time: mission.sim.t_max_s,
            step_count: 0,
            goal_tolerance: mission.sim.goal_tolerance_m,
            record_every: mission.sim.record_every,
            params,
            agents: Vec::new(),
            board,
            mission,
            verbose_level,
            stats: Vec::new(),
            trajectory: Vec::new(),
        }
    }

    /// 全エージェントの制御ループを構築
    ///
    /// 設定エラーはここで検出し、ティック開始前に失敗させる。
    pub fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.verbose_level > 0 {
            info!("シミュレーションエンジンを初期化中...");
        }

        self.mission.validate()?;

        let obstacles = self.mission.obstacle_set();
        self.agents.clear();
        self.stats.clear();
        self.trajectory.clear();

        for agent_id in 0..self.mission.agent_count() {
            let scene = self.mission.scene_with_obstacles(agent_id, obstacles.clone())?;

            if self.verbose_level > 1 {
                let start = scene.start();
                debug!(
                    "エージェント初期化: Agent{} (開始: {:.2}, {:.2}, {:.2} / ゴール: {:.2}, {:.2}, {:.2})",
                    agent_id, start.x, start.y, start.z,
                    scene.agent_goal.x, scene.agent_goal.y, scene.agent_goal.z
                );
            }

            let agent = AgentLoop::new(
                scene,
                self.params,
                self.board.feed_for(agent_id),
                self.board.sink_for(agent_id),
            )?;
            self.agents.push(agent);
            self.stats.push(AgentStats::new());
        }

        if self.verbose_level > 0 {
            info!("初期化完了:");
            info!("  エージェント: {}機", self.agents.len());
            info!("  障害物: {}個", obstacles.len());
        }

        Ok(())
    }

    /// 最大時間に達するか全機がゴールに到着するまで実行
    pub fn run(&mut self) -> Result<RunReport, Box<dyn std::error::Error>> {
        if self.agents.is_empty() {
            self.initialize()?;
        }

        info!("=== シミュレーション実行開始 ===");

        let mut clock = SimClock::for_duration(self.max_time, self.dt);
        self.record_trajectory();

        while clock.next_tick().is_some() {
            let all_arrived = self.step()?;

            if self.verbose_level > 2 {
                trace!("時刻: {:.2}秒 (ステップ: {})", self.current_time, self.step_count);
            }

            if self.step_count % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.current_time / self.max_time) * 100.0;
                info!("進行状況: {:.1}% ({:.1}/{:.1}秒)", progress, self.current_time, self.max_time);
            }

            if all_arrived {
                info!("全エージェントがゴールに到着しました");
                break;
            }
        }

        info!("=== シミュレーション完了 ===");
        info!("シミュレーション時間: {:.2}秒", self.current_time);
        info!("総ステップ数: {}", self.step_count);

        Ok(self.report())
    }

    /// 1ティック進める。全機が到着済みなら true
    pub fn step(&mut self) -> Result<bool, Box<dyn std::error::Error>> {
        // 全員が同じ時点の位置を読んでから書き込む
        for agent in &mut self.agents {
            agent.refresh();
        }

        for (agent, stats) in self.agents.iter_mut().zip(self.stats.iter_mut()) {
            let report = agent.step()?;
            stats.record(&report);

            if stats.arrival_tick.is_none() && agent.has_arrived(self.goal_tolerance) {
                stats.arrival_tick = Some(report.tick + 1);
                if self.verbose_level > 0 {
                    info!("Agent{} がゴールに到着 (ステップ: {})", agent.id(), report.tick + 1);
                }
            }
        }

        self.step_count += 1;
        self.current_time = self.step_count as f64 * self.dt;

        if self.record_every > 0 && self.step_count % self.record_every == 0 {
            self.record_trajectory();
        }

        Ok(self.stats.iter().all(|s| s.arrival_tick.is_some())
            && self.agents.iter().all(|a| a.has_arrived(self.goal_tolerance)))
    }

    fn record_trajectory(&mut self) {
        if self.record_every == 0 {
            return;
        }
        self.trajectory.push(TrajectorySample {
            tick: self.step_count,
            time_s: self.current_time,
            positions: self.board.snapshot().iter().map(Vector3::to_array).collect(),
        });
    }

    /// 現時点の実行結果
    pub fn report(&self) -> RunReport {
        let agents = self
            .agents
            .iter()
            .zip(self.stats.iter())
            .map(|(agent, stats)| AgentReport {
                id: agent.id(),
                start: agent.scene().start().to_array(),
                goal: agent.goal().to_array(),
                final_position: agent.state().position.to_array(),
                final_velocity: agent.state().velocity.to_array(),
                distance_to_goal: agent.distance_to_goal(),
                arrival_tick: stats.arrival_tick,
                arrival_time_s: stats.arrival_tick.map(|t| t as f64 * self.dt),
                min_peer_distance: stats.min_peer_distance,
                min_obstacle_clearance: stats.min_obstacle_clearance,
                peer_violations: stats.peer_violations,
                obstacle_violations: stats.obstacle_violations,
            })
            .collect::<Vec<_>>();

        RunReport {
            mission: self.mission.meta.name.clone(),
            agent_count: self.agents.len(),
            ticks: self.step_count,
            simulated_time_s: self.current_time,
            all_arrived: agents.iter().all(|a| a.arrival_tick.is_some()),
            agents,
            trajectory: self.trajectory.clone(),
        }
    }
}

/// 軌跡の1サンプル
#[derive(Debug, Clone, Serialize)]
pub struct TrajectorySample {
    pub tick: u64,
    pub time_s: f64,
    pub positions: Vec<[f64; 3]>,
}

/// エージェントごとの実行結果
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub id: usize,
    pub start: [f64; 3],
    pub goal: [f64; 3],
    pub final_position: [f64; 3],
    pub final_velocity: [f64; 3],
    pub distance_to_goal: f64,
    pub arrival_tick: Option<u64>,
    pub arrival_time_s: Option<f64>,
    pub min_peer_distance: Option<f64>,
    pub min_obstacle_clearance: Option<f64>,
    pub peer_violations: u64,
    pub obstacle_violations: u64,
}

/// シミュレーション全体の実行結果
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mission: String,
    pub agent_count: usize,
    pub ticks: u64,
    pub simulated_time_s: f64,
    pub all_arrived: bool,
    pub agents: Vec<AgentReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trajectory: Vec<TrajectorySample>,
}

impl RunReport {
    pub fn total_violations(&self) -> u64 {
        self.agents
            .iter()
            .map(|a| a.peer_violations + a.obstacle_violations)
            .sum()
    }

    /// YAML形式でファイルへ書き出し
    pub fn write_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// 結果の概要を表示
    pub fn print_summary(&self) {
        println!("=== 実行結果 ===");
        println!("ミッション: {}", self.mission);
        println!("ステップ数: {} ({:.2}秒)", self.ticks, self.simulated_time_s);
        println!("全機到着: {}", if self.all_arrived { "はい" } else { "いいえ" });
        println!("近接違反: {}件", self.total_violations());
        for agent in &self.agents {
            let arrival = match agent.arrival_time_s {
                Some(t) => format!("{:.2}秒", t),
                None => "未到着".to_string(),
            };
            let peer = agent
                .min_peer_distance
                .map(|d| format!("{:.3}m", d))
                .unwrap_or_else(|| "-".to_string());
            let obstacle = agent
                .min_obstacle_clearance
                .map(|d| format!("{:.3}m", d))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  Agent{}: 到着 {} / ゴールまで {:.4}m / 最小機間距離 {} / 最小障害物クリアランス {}",
                agent.id, arrival, agent.distance_to_goal, peer, obstacle
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ControlError;

    fn swap_mission() -> MissionConfig {
        MissionConfig::from_yaml_str(
            r#"
meta: { name: swap }
agents:
  - { start: [0, 0, 0], goal: [10, 0, 0] }
  - { start: [10, 0.3, 0], goal: [0, 0.3, 0] }
sim:
  t_max_s: 60
  record_every: 100
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_two_agents_swap_without_collision() {
        let mut engine = SimulationEngine::new(swap_mission(), 0);
        engine.initialize().unwrap();
        let report = engine.run().unwrap();

        assert!(report.all_arrived);
        assert_eq!(report.total_violations(), 0);
        for agent in &report.agents {
            let min_peer = agent.min_peer_distance.unwrap();
            assert!(min_peer > 2.0 * engine.params.agent_radius, "too close: {}", min_peer);
            assert!(agent.distance_to_goal <= 0.05);
            assert_eq!(agent.min_obstacle_clearance, None);
        }
        // 到着で早期終了する
        assert!(report.ticks < 3000);
    }

    #[test]
    fn test_board_reflects_agent_states_after_step() {
        let mut engine = SimulationEngine::new(swap_mission(), 0);
        engine.initialize().unwrap();
        engine.step().unwrap();

        let snapshot = engine.board.snapshot();
        for (agent, position) in engine.agents.iter().zip(snapshot) {
            assert_eq!(agent.state().position, position);
        }
        assert_eq!(engine.step_count, 1);
        assert!((engine.current_time - engine.dt).abs() < 1e-12);
    }

    #[test]
    fn test_trajectory_sampling() {
        let mut engine = SimulationEngine::new(swap_mission(), 0);
        let report = engine.run().unwrap();

        // 初期サンプル + 100ステップごと
        assert_eq!(report.trajectory.len() as u64, 1 + report.ticks / 100);
        assert_eq!(report.trajectory[0].tick, 0);
        assert_eq!(report.trajectory[0].positions[1], [10.0, 0.3, 0.0]);
    }

    #[test]
    fn test_bundled_multi_agent_mission_completes_safely() {
        let mission = MissionConfig::from_file("missions/mission_multi_agent.yaml").unwrap();
        let mut engine = SimulationEngine::new(mission, 0);
        let report = engine.run().unwrap();

        assert_eq!(report.agent_count, 4);
        assert!(report.all_arrived);
        assert_eq!(report.total_violations(), 0);
    }

    #[test]
    fn test_report_writes_yaml() {
        let mut engine = SimulationEngine::new(swap_mission(), 0);
        let report = engine.run().unwrap();

        let path = std::env::temp_dir().join(format!("apfnav_report_{}.yaml", std::process::id()));
        report.write_yaml(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&contents).unwrap();
        assert_eq!(value["mission"].as_str(), Some("swap"));
        assert_eq!(value["agents"].as_sequence().map(|a| a.len()), Some(2));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_overflow_aborts_lockstep_run() {
        let mission = MissionConfig::from_yaml_str(
            r#"
agents:
  - { start: [0, 0, 0], goal: [1.0e10, 0, 0] }
control:
  attraction_gain: 1.0e300
"#,
        )
        .unwrap();
        let mut engine = SimulationEngine::new(mission, 0);
        let err = engine.run().unwrap_err();

        assert!(err.downcast_ref::<ControlError>().is_some());
        assert_eq!(engine.step_count, 0);
        assert_eq!(engine.agents[0].state().position, Vector3::ZERO);
    }

    #[test]
    fn test_min_option() {
        assert_eq!(min_option(None, Some(2.0)), Some(2.0));
        assert_eq!(min_option(Some(1.0), Some(2.0)), Some(1.0));
        assert_eq!(min_option(Some(1.0), None), Some(1.0));
        assert_eq!(min_option(None, None), None);
    }
}
