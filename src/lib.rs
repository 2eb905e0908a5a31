//! APF (人工ポテンシャル場) によるマルチエージェント航法コントローラ
//!
//! 各エージェントは独立に、ゴールへの引力・障害物と他機からの斥力・減衰力を
//! 合成した加速度指令を計算し、二重積分器モデルで状態を進めます。

pub mod logging;
pub mod models;
pub mod realtime;
pub mod scenario;
pub mod simulation;
pub mod transport;
