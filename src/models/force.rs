//! # Force モジュール
//!
//! 人工ポテンシャル場（APF）による加速度指令の計算を提供します。
//!
//! 指令は次の3つの力の和を軸ごとにクリップしたものです。
//!
//! - **引力**: ゴールへの変位ベクトルに比例（距離上限なし）
//! - **斥力**: 影響半径 R 内の障害物・他エージェントから離れる向き
//! - **減衰力**: 現在速度の逆向きに比例
//!
//! 斥力の距離はクリアランス（中心間距離 − 双方の半径の和）で評価します。
//! 障害物と他エージェントで同じ規約を用います。

use crate::models::common::{AgentId, KinematicState, Obstacle, PeerPositions, Vector3};
use crate::models::params::ControlParameters;

/// 距離がゼロとみなされる下限値
pub const EPSILON: f64 = 1e-6;

/// 中心が重なった場合の退避方向
pub const ESCAPE_DIRECTION: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 1.0 };

/// 加速度指令の内訳
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceBreakdown {
    /// 引力項
    pub attractive: Vector3,
    /// 斥力項の総和
    pub repulsive: Vector3,
    /// 減衰項
    pub damping: Vector3,
    /// クリップ前の合力
    pub unclamped: Vector3,
    /// 軸ごとにクリップした最終指令
    pub command: Vector3,
}

/// ゴールへの引力
pub fn attraction(position: Vector3, goal: Vector3, params: &ControlParameters) -> Vector3 {
    (goal - position) * params.attraction_gain
}

/// 速度に比例する減衰力
pub fn damping(velocity: Vector3, params: &ControlParameters) -> Vector3 {
    -velocity * params.damping_gain
}

/// 1つの球形エンティティから受ける斥力
///
/// `other_radius` は障害物なら障害物半径、他エージェントならエージェント半径。
/// クリアランス `d` が R 以上なら寄与はゼロ。`d < R` では
/// `k_rep * (1/d - 1/R) / d²` の大きさで中心から離れる向きに働く。
pub fn repulsion_from(
    position: Vector3,
    centre: Vector3,
    other_radius: f64,
    params: &ControlParameters,
) -> Vector3 {
    let offset = position - centre;
    let centre_distance = offset.norm();
    let clearance = centre_distance - (params.agent_radius + other_radius);

    if clearance >= params.influence_radius {
        return Vector3::ZERO;
    }

    let direction = if centre_distance > EPSILON {
        offset * (1.0 / centre_distance)
    } else {
        ESCAPE_DIRECTION
    };

    let d = clearance.max(EPSILON);
    let magnitude = params.repulsion_gain * (1.0 / d - 1.0 / params.influence_radius) / (d * d);

    direction * magnitude
}

/// 全障害物と自分以外の全エージェントからの斥力の総和
pub fn total_repulsion(
    self_id: AgentId,
    position: Vector3,
    peers: &PeerPositions,
    obstacles: &[Obstacle],
    params: &ControlParameters,
) -> Vector3 {
    let mut sum = Vector3::ZERO;

    for obstacle in obstacles {
        sum += repulsion_from(position, obstacle.position, obstacle.radius, params);
    }

    for (_, peer_position) in peers.others(self_id) {
        sum += repulsion_from(position, peer_position, params.agent_radius, params);
    }

    sum
}

/// 各力の内訳を含めて加速度指令を計算
pub fn compute_breakdown(
    self_id: AgentId,
    state: &KinematicState,
    goal: Vector3,
    peers: &PeerPositions,
    obstacles: &[Obstacle],
    params: &ControlParameters,
) -> ForceBreakdown {
    let attractive = attraction(state.position, goal, params);
    let repulsive = total_repulsion(self_id, state.position, peers, obstacles, params);
    let damping = damping(state.velocity, params);

    let unclamped = attractive + repulsive + damping;
    let command = unclamped.clamp_axes(params.max_acceleration);

    ForceBreakdown {
        attractive,
        repulsive,
        damping,
        unclamped,
        command,
    }
}

/// APF制御器: 状態・ゴール・周囲の位置から加速度指令を計算
///
/// 副作用はなく、呼び出し間で内部状態も保持しない。
pub fn compute_acceleration(
    self_id: AgentId,
    state: &KinematicState,
    goal: Vector3,
    peers: &PeerPositions,
    obstacles: &[Obstacle],
    params: &ControlParameters,
) -> Vector3 {
    compute_breakdown(self_id, state, goal, peers, obstacles, params).command
}
