// 基本的なデータ型（ベクトル・状態・スナップショット）
pub mod common;

// 制御パラメータ
pub mod params;

// エージェントから見たシーン
pub mod scene;

// 外部協調者（フィード・シンク・ティッカー）のインターフェース
pub mod traits;

// 制御・積分・監視
pub mod force;
pub mod integrator;
pub mod collision;

// 1ティックの制御ループ
pub mod agent;

// 便利な re-export
pub use common::*;
pub use params::{ControlParameters, IntegrationScheme};
pub use scene::{SceneError, SceneModel};
pub use traits::*;
pub use force::{ForceBreakdown, compute_acceleration, compute_breakdown};
pub use integrator::advance;
pub use collision::{ProximityStats, Violation, ViolationKind};
pub use agent::{AgentLoop, ControlError, TickReport};
