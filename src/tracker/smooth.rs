use std::f32::consts::{PI, TAU};

use crate::config::SmoothConfig;
use crate::pose::{Landmark, LandmarkSet};
use crate::transform::RigidTransform;

/// 指数平滑: prev * (1 - t) + new * t
pub fn lerp(prev: f32, new: f32, t: f32) -> f32 {
    prev * (1.0 - t) + new * t
}

/// 角度を [-π, π) に正規化
pub fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// 最短経路で角度を補間する（±πをまたいでも逆回りしない）
pub fn lerp_angle(prev: f32, new: f32, t: f32) -> f32 {
    prev + wrap_angle(new - prev) * t
}

/// 誤差 initial_error が係数 factor の指数平滑で tolerance 未満になるまでのフレーム数
///
/// factor が 0 以下なら収束しないので None。
pub fn settle_frames(factor: f32, initial_error: f32, tolerance: f32) -> Option<u32> {
    let e0 = initial_error.abs();
    if e0 < tolerance {
        return Some(0);
    }
    if factor <= 0.0 || tolerance <= 0.0 {
        return None;
    }
    if factor >= 1.0 {
        return Some(1);
    }
    // e0 * (1 - t)^n < tol
    let n = (tolerance / e0).ln() / (1.0 - factor).ln();
    Some(n.ceil().max(1.0) as u32)
}

/// ランドマーク入力の平滑化フィルタ
///
/// ランドマークごと・軸ごとのEMA。可視度は前フレームとの最大値。
pub struct LandmarkSmoother {
    factor: f32,
    prev: Option<LandmarkSet>,
}

impl LandmarkSmoother {
    pub fn new(factor: f32) -> Self {
        Self { factor, prev: None }
    }

    /// 係数 0.0 は無効（None）
    pub fn from_config(config: &SmoothConfig) -> Option<Self> {
        if config.input_smoothing_factor > 0.0 {
            Some(Self::new(config.input_smoothing_factor))
        } else {
            None
        }
    }

    pub fn apply(&mut self, set: LandmarkSet) -> LandmarkSet {
        // 非有限値を履歴に混ぜると以降のフレームがすべて汚染される
        if !set.iter().all(Landmark::is_finite) {
            return set;
        }

        let result = match self.prev.as_ref() {
            Some(prev) if prev.len() == set.len() => {
                let t = self.factor;
                let landmarks = prev
                    .iter()
                    .zip(set.iter())
                    .map(|(p, c)| Landmark {
                        x: lerp(p.x, c.x, t),
                        y: lerp(p.y, c.y, t),
                        z: lerp(p.z, c.z, t),
                        visibility: max_visibility(p.visibility, c.visibility),
                    })
                    .collect();
                LandmarkSet {
                    landmarks,
                    timestamp: set.timestamp,
                }
            }
            // 初回、またはランドマーク数が変わった場合は素通し
            _ => set,
        };

        self.prev = Some(result.clone());
        result
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

fn max_visibility(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// 出力変換の平滑化
///
/// 位置・スケール・回転を別々の係数でブレンドする。状態は持たず、
/// 前回値はセッションが保持する。
#[derive(Debug, Clone, Copy)]
pub struct TransformSmoother {
    position: f32,
    scale: f32,
    rotation: f32,
}

impl TransformSmoother {
    pub fn new(position: f32, scale: f32, rotation: f32) -> Self {
        Self { position, scale, rotation }
    }

    pub fn from_config(config: &SmoothConfig) -> Self {
        Self::new(
            config.output_position_smoothing_factor,
            config.output_scale_smoothing_factor,
            config.output_rotation_smoothing_factor,
        )
    }

    pub fn blend(&self, prev: &RigidTransform, target: &RigidTransform) -> RigidTransform {
        let (ap, asc, ar) = (self.position, self.scale, self.rotation);
        RigidTransform::new(
            [
                lerp(prev.position[0], target.position[0], ap),
                lerp(prev.position[1], target.position[1], ap),
                lerp(prev.position[2], target.position[2], ap),
            ],
            [
                lerp_angle(prev.rotation[0], target.rotation[0], ar),
                lerp_angle(prev.rotation[1], target.rotation[1], ar),
                lerp_angle(prev.rotation[2], target.rotation[2], ar),
            ],
            [
                lerp(prev.scale[0], target.scale[0], asc),
                lerp(prev.scale[1], target.scale[1], asc),
                lerp(prev.scale[2], target.scale[2], asc),
            ],
        )
    }

    /// 最も遅いチャンネルの係数
    pub fn slowest_factor(&self) -> f32 {
        self.position.min(self.scale).min(self.rotation)
    }
}
