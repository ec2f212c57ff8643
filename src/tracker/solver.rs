use crate::catalog::GarmentCalibration;
use crate::config::{ScaleMode, SolverConfig};
use crate::pose::BodyMeasurement;
use crate::tracker::smooth::lerp_angle;
use crate::transform::RigidTransform;

/// 体の計測値からガーメントの目標変換を求める
///
/// 失敗しない。計測に失敗したフレームではそもそも呼ばれない。
pub struct TransformSolver {
    config: SolverConfig,
}

impl TransformSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.clone())
    }

    pub fn solve(&self, m: &BodyMeasurement, calibration: &GarmentCalibration) -> RigidTransform {
        let base = RigidTransform::new(self.position(m), self.rotation(m), self.scale(m));
        calibration.apply(&base)
    }

    /// 正規化座標 → ワールド座標
    /// X: origin_x を0とし horizontal_gain でスケール
    /// Y: 画像は下が正なので反転し、offset_y を基準高さとする
    /// Z: 奥行き代理値（負ほど手前）を反転して depth_bias に足す
    fn position(&self, m: &BodyMeasurement) -> [f32; 3] {
        let c = &self.config;
        let w = c.hip_anchor_weight;
        let anchor_x = m.shoulder_mid[0] * (1.0 - w) + m.hip_mid[0] * w;
        let anchor_y = m.shoulder_mid[1] * (1.0 - w) + m.hip_mid[1] * w;

        let mut pos_x = (anchor_x - c.origin_x) * c.horizontal_gain;
        if c.mirror_x {
            pos_x = -pos_x;
        }
        let pos_y = c.offset_y - (anchor_y - c.origin_y) * c.vertical_gain;
        let pos_z = c.depth_bias - m.depth * c.depth_gain;
        [pos_x, pos_y, pos_z]
    }

    fn scale(&self, m: &BodyMeasurement) -> [f32; 3] {
        let c = &self.config;
        match c.scale_mode {
            ScaleMode::Uniform => {
                let raw = c.width_weight * m.shoulder_width
                    + c.torso_weight * m.torso_length
                    + c.depth_weight * m.body_depth;
                [self.clamp_scale(raw); 3]
            }
            ScaleMode::PerAxis => [
                self.clamp_scale(c.width_weight * m.shoulder_width),
                self.clamp_scale(c.torso_weight * m.torso_length),
                self.clamp_scale(c.width_weight * m.shoulder_width * c.depth_ratio),
            ],
        }
    }

    /// 範囲が不正（min > max や NaN）でもパニックしない
    fn clamp_scale(&self, raw: f32) -> f32 {
        raw.max(self.config.min_scale).min(self.config.max_scale)
    }

    /// X: 前傾角（減衰）, Y: facing_yaw + 肩/腰ライン角, Z: 肩ライン角（重み付き）
    fn rotation(&self, m: &BodyMeasurement) -> [f32; 3] {
        let c = &self.config;
        // 肩と腰の角度を最短経路でブレンド
        let body_yaw = lerp_angle(m.shoulder_angle, m.hip_angle, c.hip_yaw_weight);
        let mut roll = m.shoulder_angle * c.roll_weight;
        let mut yaw = body_yaw;
        // 鏡像では回転の向きが逆になる
        if c.mirror_x {
            yaw = -yaw;
            roll = -roll;
        }
        [m.lean_angle * c.lean_weight, c.facing_yaw + yaw, roll]
    }
}
