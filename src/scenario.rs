use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::models::{AgentId, ControlParameters, IntegrationScheme, Obstacle, SceneModel, Vector3};

/// ミッションメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MissionMeta {
    #[serde(default = "default_mission_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn default_mission_name() -> String {
    "unnamed".to_string()
}

impl Default for MissionMeta {
    fn default() -> Self {
        Self {
            name: default_mission_name(),
            description: String::new(),
        }
    }
}

/// エージェント設定（初期位置とゴール）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub start: [f64; 3],
    pub goal: [f64; 3],
}

/// 障害物設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObstacleConfig {
    pub position: [f64; 3],
    pub radius: f64,
}

/// APF制御設定（省略時は既定値）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    pub attraction_gain: f64,
    pub repulsion_gain: f64,
    pub influence_radius: f64,
    pub damping_gain: f64,
    pub max_acceleration: f64,
    pub agent_radius: f64,
    pub dt: f64,
    pub integration: IntegrationScheme,
}

impl Default for ControlConfig {
    fn default() -> Self {
        let defaults = ControlParameters::default();
        Self {
            attraction_gain: defaults.attraction_gain,
            repulsion_gain: defaults.repulsion_gain,
            influence_radius: defaults.influence_radius,
            damping_gain: defaults.damping_gain,
            max_acceleration: defaults.max_acceleration,
            agent_radius: defaults.agent_radius,
            dt: defaults.dt,
            integration: defaults.integration,
        }
    }
}

impl ControlConfig {
    pub fn to_parameters(&self) -> ControlParameters {
        ControlParameters {
            attraction_gain: self.attraction_gain,
            repulsion_gain: self.repulsion_gain,
            influence_radius: self.influence_radius,
            damping_gain: self.damping_gain,
            max_acceleration: self.max_acceleration,
            agent_radius: self.agent_radius,
            dt: self.dt,
            integration: self.integration,
        }
    }
}

/// シミュレーション実行設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 最大シミュレーション時間（秒）
    pub t_max_s: f64,
    /// 到着判定の許容誤差（位置[m]・速さ[m/s]共通）
    pub goal_tolerance_m: f64,
    /// 軌跡を記録する間隔（ティック数、0で記録しない）
    pub record_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t_max_s: 60.0,
            goal_tolerance_m: 0.05,
            record_every: 0,
        }
    }
}

/// 完全なミッション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MissionConfig {
    #[serde(default)]
    pub meta: MissionMeta,
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub sim: SimulationConfig,
}

impl MissionConfig {
    /// YAMLファイルからミッション設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        // ファイル読み込み
        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        // YAML解析
        let config: MissionConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        // 基本的な検証
        config.validate()?;

        Ok(config)
    }

    /// YAML文字列から読み込み（検証込み）
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: MissionConfig = serde_yaml::from_str(contents)
            .map_err(|e| ScenarioError::ParseError(Path::new("<inline>").to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の検証（ティック開始前に失敗させる）
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.agents.is_empty() {
            return Err(ScenarioError::ValidationError("at least one agent is required".to_string()));
        }

        for (id, agent) in self.agents.iter().enumerate() {
            if !all_finite(&agent.start) || !all_finite(&agent.goal) {
                return Err(ScenarioError::ValidationError(
                    format!("agent {} has non-finite start or goal", id)
                ));
            }
        }

        for (index, obstacle) in self.obstacles.iter().enumerate() {
            if !all_finite(&obstacle.position) {
                return Err(ScenarioError::ValidationError(
                    format!("obstacle {} has non-finite position", index)
                ));
            }
            if !obstacle.radius.is_finite() || obstacle.radius < 0.0 {
                return Err(ScenarioError::ValidationError(
                    format!("obstacle {} radius {} must be non-negative", index, obstacle.radius)
                ));
            }
        }

        self.control
            .to_parameters()
            .validate()
            .map_err(ScenarioError::ValidationError)?;

        if !self.sim.t_max_s.is_finite() || self.sim.t_max_s <= 0.0 {
            return Err(ScenarioError::ValidationError("t_max_s must be positive".to_string()));
        }
        if !self.sim.goal_tolerance_m.is_finite() || self.sim.goal_tolerance_m < 0.0 {
            return Err(ScenarioError::ValidationError("goal_tolerance_m must be non-negative".to_string()));
        }

        Ok(())
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn control_parameters(&self) -> ControlParameters {
        self.control.to_parameters()
    }

    /// 全エージェントの初期位置
    pub fn starts(&self) -> Vec<Vector3> {
        self.agents.iter().map(|a| Vector3::from(a.start)).collect()
    }

    /// 共有用の障害物集合
    pub fn obstacle_set(&self) -> Arc<[Obstacle]> {
        self.obstacles
            .iter()
            .map(|o| Obstacle::new(Vector3::from(o.position), o.radius))
            .collect::<Vec<_>>()
            .into()
    }

    /// 指定エージェントから見たシーンを構築
    pub fn scene_for(&self, agent_id: AgentId) -> Result<SceneModel, ScenarioError> {
        self.scene_with_obstacles(agent_id, self.obstacle_set())
    }

    /// 障害物集合を共有したまま指定エージェントのシーンを構築
    pub fn scene_with_obstacles(
        &self,
        agent_id: AgentId,
        obstacles: Arc<[Obstacle]>,
    ) -> Result<SceneModel, ScenarioError> {
        let goal = self
            .agents
            .get(agent_id)
            .map(|a| Vector3::from(a.goal))
            .ok_or_else(|| ScenarioError::ValidationError(format!(
                "agent id {} is out of range (agent count: {})",
                agent_id,
                self.agents.len()
            )))?;

        SceneModel::new(agent_id, self.starts(), goal, obstacles)
            .map_err(|e| ScenarioError::ValidationError(e.to_string()))
    }

    /// ミッションの概要を表示
    pub fn print_summary(&self) {
        let params = self.control_parameters();

        println!("=== ミッション情報 ===");
        println!("名前: {}", self.meta.name);
        if !self.meta.description.is_empty() {
            println!("説明: {}", self.meta.description);
        }
        println!();

        println!("=== エージェント ===");
        println!("エージェント数: {}", self.agents.len());
        for (id, agent) in self.agents.iter().enumerate() {
            println!(
                "  Agent{}: start ({:.2}, {:.2}, {:.2}) -> goal ({:.2}, {:.2}, {:.2})",
                id,
                agent.start[0], agent.start[1], agent.start[2],
                agent.goal[0], agent.goal[1], agent.goal[2]
            );
        }
        println!();

        println!("=== 障害物 ===");
        println!("障害物数: {}", self.obstacles.len());
        for (index, obstacle) in self.obstacles.iter().enumerate() {
            println!(
                "  Obstacle{}: ({:.2}, {:.2}, {:.2}) 半径 {:.2}m",
                index, obstacle.position[0], obstacle.position[1], obstacle.position[2], obstacle.radius
            );
        }
        println!();

        println!("=== 制御パラメータ ===");
        println!("引力ゲイン: {}", params.attraction_gain);
        println!("斥力ゲイン: {} (影響半径 {}m)", params.repulsion_gain, params.influence_radius);
        println!("減衰ゲイン: {}", params.damping_gain);
        println!("最大加速度: {} m/s² (軸ごと)", params.max_acceleration);
        println!("エージェント半径: {}m", params.agent_radius);
        println!("時間刻み: {:.3}秒 ({:?})", params.dt, params.integration);
        println!("最大時間: {:.1}秒", self.sim.t_max_s);
    }
}

fn all_finite(v: &[f64; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// ミッション読み込みエラー
#[derive(Debug)]
pub enum ScenarioError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::FileNotFound(path) => {
                write!(f, "ミッションファイルが見つかりません: {}", path.display())
            }
            ScenarioError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ScenarioError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ScenarioError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
        }
    }
}

impl std::error::Error for ScenarioError {}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_AGENT: &str = r#"
agents:
  - start: [0.0, 0.0, 0.0]
    goal: [10.0, 0.0, 0.0]
obstacles: []
"#;

    const FULL: &str = r#"
meta:
  name: crossing
  description: two agents and one obstacle
agents:
  - { start: [0, 0, 0], goal: [10, 0, 0] }
  - { start: [10, 0.3, 0], goal: [0, 0.3, 0] }
obstacles:
  - { position: [5, 5, 0], radius: 1.0 }
control:
  repulsion_gain: 4.0
  dt: 0.01
  integration: explicit_euler
sim:
  t_max_s: 30
  record_every: 10
"#;

    #[test]
    fn test_minimal_mission_uses_defaults() {
        let mission = MissionConfig::from_yaml_str(SINGLE_AGENT).unwrap();
        assert_eq!(mission.agent_count(), 1);
        assert_eq!(mission.meta.name, "unnamed");
        assert_eq!(mission.control_parameters(), ControlParameters::default());
        assert_eq!(mission.sim.t_max_s, 60.0);
    }

    #[test]
    fn test_full_mission_parses_all_sections() {
        let mission = MissionConfig::from_yaml_str(FULL).unwrap();
        let params = mission.control_parameters();
        assert_eq!(mission.meta.name, "crossing");
        assert_eq!(params.repulsion_gain, 4.0);
        assert_eq!(params.dt, 0.01);
        assert_eq!(params.integration, IntegrationScheme::ExplicitEuler);
        // 省略したキーは既定値
        assert_eq!(params.attraction_gain, ControlParameters::default().attraction_gain);
        assert_eq!(mission.sim.record_every, 10);

        let scene = mission.scene_for(1).unwrap();
        assert_eq!(scene.agent_goal, Vector3::new(0.0, 0.3, 0.0));
        assert_eq!(scene.start(), Vector3::new(10.0, 0.3, 0.0));
        assert_eq!(scene.obstacles.len(), 1);
    }

    #[test]
    fn test_out_of_range_agent_is_rejected() {
        let mission = MissionConfig::from_yaml_str(SINGLE_AGENT).unwrap();
        assert!(matches!(mission.scene_for(1), Err(ScenarioError::ValidationError(_))));
    }

    #[test]
    fn test_negative_radius_is_rejected() {
        let yaml = r#"
agents:
  - { start: [0, 0, 0], goal: [1, 0, 0] }
obstacles:
  - { position: [5, 0, 0], radius: -1.0 }
"#;
        assert!(matches!(
            MissionConfig::from_yaml_str(yaml),
            Err(ScenarioError::ValidationError(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let yaml = "agents:\n  - { start: [0, 0], goal: [1, 0, 0] }\n";
        assert!(matches!(
            MissionConfig::from_yaml_str(yaml),
            Err(ScenarioError::ParseError(_, _))
        ));
    }

    #[test]
    fn test_empty_agents_and_bad_dt_are_rejected() {
        assert!(MissionConfig::from_yaml_str("agents: []\n").is_err());

        let yaml = "agents:\n  - { start: [0, 0, 0], goal: [1, 0, 0] }\ncontrol:\n  dt: 0.0\n";
        assert!(matches!(
            MissionConfig::from_yaml_str(yaml),
            Err(ScenarioError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = MissionConfig::from_file("missions/does_not_exist.yaml").unwrap_err();
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }

    #[test]
    fn test_bundled_missions_load() {
        for path in [
            "missions/mission_single_agent.yaml",
            "missions/mission_obstacle.yaml",
            "missions/mission_multi_agent.yaml",
        ] {
            let mission = MissionConfig::from_file(path).unwrap();
            assert!(mission.agent_count() >= 1, "{}", path);
        }
    }
}
