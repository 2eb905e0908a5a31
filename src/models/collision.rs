use crate::models::common::{AgentId, Obstacle, PeerPositions, Vector3};

/// 近接違反の相手
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViolationKind {
    /// 他エージェントとの接近
    Peer(AgentId),
    /// 障害物（インデックス）との接触
    Obstacle(usize),
}

/// 近接違反の記録
///
/// 監視のみで状態は変更しない。回避は制御器の責務。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Violation {
    /// 最も近い違反相手
    pub kind: ViolationKind,
    /// 中心間距離（m）
    pub distance: f64,
    /// 違反判定のしきい値（m）
    pub threshold: f64,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ViolationKind::Peer(id) => write!(
                f,
                "衝突! エージェント{}との最小距離: {:.4} (しきい値 {:.4})",
                id, self.distance, self.threshold
            ),
            ViolationKind::Obstacle(index) => write!(
                f,
                "衝突! 障害物{}との距離: {:.4} (しきい値 {:.4})",
                index, self.distance, self.threshold
            ),
        }
    }
}

/// 近接統計（レポート用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityStats {
    /// 他エージェントとの最小中心間距離（他機がいなければ None）
    pub min_peer_distance: Option<f64>,
    /// 障害物表面までの最小クリアランス（障害物がなければ None）
    pub min_obstacle_clearance: Option<f64>,
}

/// 現在位置と安全半径から近接違反を検査
///
/// 他エージェントは距離 `< 2 * agent_radius`、障害物は
/// `< agent_radius + obstacle.radius` で違反。種類ごとに最も近い違反相手のみを返す。
pub fn check(
    self_id: AgentId,
    self_position: Vector3,
    peers: &PeerPositions,
    obstacles: &[Obstacle],
    agent_radius: f64,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    let peer_threshold = 2.0 * agent_radius;
    let closest_peer = peers
        .others(self_id)
        .map(|(id, position)| (id, self_position.distance(&position)))
        .filter(|(_, distance)| *distance < peer_threshold)
        .min_by(|a, b| a.1.total_cmp(&b.1));

    if let Some((id, distance)) = closest_peer {
        violations.push(Violation {
            kind: ViolationKind::Peer(id),
            distance,
            threshold: peer_threshold,
        });
    }

    let closest_obstacle = obstacles
        .iter()
        .enumerate()
        .map(|(index, obstacle)| {
            let distance = self_position.distance(&obstacle.position);
            (index, distance, agent_radius + obstacle.radius)
        })
        .filter(|(_, distance, threshold)| distance < threshold)
        .min_by(|a, b| a.1.total_cmp(&b.1));

    if let Some((index, distance, threshold)) = closest_obstacle {
        violations.push(Violation {
            kind: ViolationKind::Obstacle(index),
            distance,
            threshold,
        });
    }

    violations
}

/// 最近接の他エージェント距離と障害物クリアランスを計算
pub fn nearest_distances(
    self_id: AgentId,
    self_position: Vector3,
    peers: &PeerPositions,
    obstacles: &[Obstacle],
    agent_radius: f64,
) -> ProximityStats {
    let min_peer_distance = peers
        .others(self_id)
        .map(|(_, position)| self_position.distance(&position))
        .min_by(f64::total_cmp);

    let min_obstacle_clearance = obstacles
        .iter()
        .map(|obstacle| self_position.distance(&obstacle.position) - agent_radius - obstacle.radius)
        .min_by(f64::total_cmp);

    ProximityStats {
        min_peer_distance,
        min_obstacle_clearance,
    }
}
