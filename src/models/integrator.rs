//! 二重積分器（質点）モデルによる状態更新
//!
//! 固定時間刻みで速度と位置を進める。速度の制限はここでは行わない
//! （加速度は上流の制御器で軸ごとに制限済み）。

use crate::models::common::{KinematicState, Vector3};
use crate::models::params::IntegrationScheme;

/// 加速度指令と固定 Δt で状態を1ステップ進めた新しい状態を返す
///
/// - 半陰的オイラー: `v' = v + a·dt`, `p' = p + v'·dt`
/// - 陽的オイラー:   `v' = v + a·dt`, `p' = p + v·dt`
pub fn advance(
    state: &KinematicState,
    acceleration: Vector3,
    dt: f64,
    scheme: IntegrationScheme,
) -> KinematicState {
    let velocity = state.velocity + acceleration * dt;

    let position = match scheme {
        IntegrationScheme::SemiImplicitEuler => state.position + velocity * dt,
        IntegrationScheme::ExplicitEuler => state.position + state.velocity * dt,
    };

    KinematicState { position, velocity }
}
