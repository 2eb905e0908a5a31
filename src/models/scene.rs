use std::sync::Arc;

use crate::models::common::{AgentId, Obstacle, Vector3};

/// エージェント1機から見たシーン（不変）
///
/// 全エージェントの初期位置、自機のゴール、静的障害物の集合を保持します。
/// 障害物集合は全エージェントで読み取り専用として共有されます。
#[derive(Debug, Clone)]
pub struct SceneModel {
    /// このシーンを所有するエージェントのID
    pub agent_id: AgentId,
    /// 全エージェントの初期位置（AgentIdで索引）
    pub agent_start: Vec<Vector3>,
    /// 自機のゴール位置
    pub agent_goal: Vector3,
    /// 静的障害物（共有・読み取り専用）
    pub obstacles: Arc<[Obstacle]>,
}

/// シーン構築時の不変条件違反
#[derive(Debug, Clone, PartialEq)]
pub enum SceneError {
    /// エージェントIDが範囲外
    AgentIdOutOfRange { agent_id: AgentId, agent_count: usize },
    /// 障害物半径が負または非有限
    InvalidObstacleRadius { index: usize, radius: f64 },
    /// 座標に非有限値が含まれる
    NonFiniteCoordinate(String),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::AgentIdOutOfRange { agent_id, agent_count } => {
                write!(f, "agent id {} is out of range (agent count: {})", agent_id, agent_count)
            }
            SceneError::InvalidObstacleRadius { index, radius } => {
                write!(f, "obstacle {} has invalid radius {}", index, radius)
            }
            SceneError::NonFiniteCoordinate(what) => {
                write!(f, "non-finite coordinate in {}", what)
            }
        }
    }
}

impl std::error::Error for SceneError {}

impl SceneModel {
    /// 不変条件を検証しつつシーンを構築
    pub fn new(
        agent_id: AgentId,
        agent_start: Vec<Vector3>,
        agent_goal: Vector3,
        obstacles: Arc<[Obstacle]>,
    ) -> Result<Self, SceneError> {
        if agent_id >= agent_start.len() {
            return Err(SceneError::AgentIdOutOfRange {
                agent_id,
                agent_count: agent_start.len(),
            });
        }

        for (id, start) in agent_start.iter().enumerate() {
            if !start.is_finite() {
                return Err(SceneError::NonFiniteCoordinate(format!("start of agent {}", id)));
            }
        }
        if !agent_goal.is_finite() {
            return Err(SceneError::NonFiniteCoordinate(format!("goal of agent {}", agent_id)));
        }

        for (index, obstacle) in obstacles.iter().enumerate() {
            if !obstacle.position.is_finite() {
                return Err(SceneError::NonFiniteCoordinate(format!("obstacle {}", index)));
            }
            if !obstacle.radius.is_finite() || obstacle.radius < 0.0 {
                return Err(SceneError::InvalidObstacleRadius {
                    index,
                    radius: obstacle.radius,
                });
            }
        }

        Ok(Self {
            agent_id,
            agent_start,
            agent_goal,
            obstacles,
        })
    }

    pub fn agent_count(&self) -> usize {
        self.agent_start.len()
    }

    /// 自機の初期位置
    pub fn start(&self) -> Vector3 {
        self.agent_start[self.agent_id]
    }
}
