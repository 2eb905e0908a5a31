use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// エージェント識別子（0..N の範囲、設定時に割り当て）
pub type AgentId = usize;

/// 3次元ベクトル（位置・速度・加速度で共用）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64, // m
    pub y: f64, // m
    pub z: f64, // m
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// ベクトルの長さ（ユークリッドノルム）
    pub fn norm(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }

    /// 2点間の3次元距離
    pub fn distance(&self, other: &Vector3) -> f64 {
        (*self - *other).norm()
    }

    /// 単位ベクトル化（ゼロベクトルはそのまま返す）
    pub fn normalize(&self) -> Self {
        let mag = self.norm();
        if mag > 0.0 {
            *self * (1.0 / mag)
        } else {
            *self
        }
    }

    /// 各軸を独立に [-limit, +limit] へクリップ
    ///
    /// ノルムではなく軸ごとの制限なので、斜め方向の指令は
    /// `limit * √3` まで大きくなり得る。
    pub fn clamp_axes(&self, limit: f64) -> Self {
        Self::new(
            self.x.clamp(-limit, limit),
            self.y.clamp(-limit, limit),
            self.z.clamp(-limit, limit),
        )
    }

    /// 全成分が有限値かどうか
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Add for Vector3 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Vector3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

/// 静的な球形障害物
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    /// 中心位置
    pub position: Vector3,
    /// 半径（非負）
    pub radius: f64,
}

impl Obstacle {
    pub fn new(position: Vector3, radius: f64) -> Self {
        Self { position, radius }
    }
}

/// エージェントの運動状態（位置・速度）
///
/// 1エージェントが排他的に所有し、積分器の結果で1ティックに1回丸ごと置き換えられる。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicState {
    pub position: Vector3,
    pub velocity: Vector3,
}

impl KinematicState {
    /// 静止状態で初期化
    pub fn at_rest(position: Vector3) -> Self {
        Self {
            position,
            velocity: Vector3::ZERO,
        }
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

/// 他エージェント位置のスナップショット（自分自身を含む）
///
/// AgentId で索引される密な表。1ティックの間は読み取り専用として扱い、
/// 更新が届かなかったエントリは最後に観測した値を保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPositions {
    positions: Vec<Vector3>,
}

impl PeerPositions {
    pub fn new(initial: Vec<Vector3>) -> Self {
        Self { positions: initial }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, id: AgentId) -> Option<Vector3> {
        self.positions.get(id).copied()
    }

    /// 単一エントリを上書き。範囲外IDなら false
    pub fn set(&mut self, id: AgentId, position: Vector3) -> bool {
        match self.positions.get_mut(id) {
            Some(slot) => {
                *slot = position;
                true
            }
            None => false,
        }
    }

    /// 部分更新をマージし、範囲外だったIDを返す
    pub fn apply(&mut self, updates: &[(AgentId, Vector3)]) -> Vec<AgentId> {
        let mut rejected = Vec::new();
        for &(id, position) in updates {
            if !self.set(id, position) {
                rejected.push(id);
            }
        }
        rejected
    }

    /// 自分以外のエージェントを (ID, 位置) で列挙
    pub fn others(&self, self_id: AgentId) -> impl Iterator<Item = (AgentId, Vector3)> + '_ {
        self.positions
            .iter()
            .copied()
            .enumerate()
            .filter(move |(id, _)| *id != self_id)
    }

    pub fn as_slice(&self) -> &[Vector3] {
        &self.positions
    }
}
