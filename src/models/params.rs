use serde::{Deserialize, Serialize};

/// 状態積分の方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationScheme {
    /// 半陰的オイラー法: 先に速度を更新し、新しい速度で位置を進める
    #[default]
    SemiImplicitEuler,
    /// 陽的オイラー法: 旧速度で位置を進める
    ExplicitEuler,
}

/// APF制御パラメータ
///
/// 起動時に一度だけ読み込まれ、以降は変更されない。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlParameters {
    /// 引力ゲイン
    pub attraction_gain: f64,
    /// 斥力ゲイン
    pub repulsion_gain: f64,
    /// 斥力の影響半径 R（クリアランス基準、m）
    pub influence_radius: f64,
    /// 減衰ゲイン
    pub damping_gain: f64,
    /// 軸ごとの最大加速度（m/s²）
    pub max_acceleration: f64,
    /// エージェント半径（m）
    pub agent_radius: f64,
    /// 固定時間刻み Δt（秒）
    pub dt: f64,
    /// 積分方式
    pub integration: IntegrationScheme,
}

impl Default for ControlParameters {
    fn default() -> Self {
        Self {
            attraction_gain: 0.5,
            repulsion_gain: 5.0,
            influence_radius: 2.0,
            damping_gain: 2.0,
            max_acceleration: 3.0,
            agent_radius: 0.25,
            dt: 0.02,
            integration: IntegrationScheme::SemiImplicitEuler,
        }
    }
}

impl ControlParameters {
    /// パラメータの整合性検証。問題があればエラーメッセージを返す
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("attraction_gain", self.attraction_gain),
            ("repulsion_gain", self.repulsion_gain),
            ("influence_radius", self.influence_radius),
            ("damping_gain", self.damping_gain),
            ("max_acceleration", self.max_acceleration),
            ("agent_radius", self.agent_radius),
            ("dt", self.dt),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(format!("{} must be finite (got {})", name, value));
            }
            if value < 0.0 {
                return Err(format!("{} must be non-negative (got {})", name, value));
            }
        }

        if self.dt <= 0.0 {
            return Err("dt must be positive".to_string());
        }
        if self.influence_radius <= 0.0 {
            return Err("influence_radius must be positive".to_string());
        }
        if self.max_acceleration <= 0.0 {
            return Err("max_acceleration must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_valid() {
        assert_eq!(ControlParameters::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let params = ControlParameters { dt: 0.0, ..Default::default() };
        assert!(params.validate().is_err());

        let params = ControlParameters { agent_radius: -0.1, ..Default::default() };
        assert!(params.validate().is_err());

        let params = ControlParameters { repulsion_gain: f64::NAN, ..Default::default() };
        assert!(params.validate().is_err());

        let params = ControlParameters { influence_radius: 0.0, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_integration_scheme_yaml_names() {
        let scheme: IntegrationScheme = serde_yaml::from_str("explicit_euler").unwrap();
        assert_eq!(scheme, IntegrationScheme::ExplicitEuler);
        let scheme: IntegrationScheme = serde_yaml::from_str("semi_implicit_euler").unwrap();
        assert_eq!(scheme, IntegrationScheme::SemiImplicitEuler);
        assert!(serde_yaml::from_str::<IntegrationScheme>("rk4").is_err());
    }
}
