use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// ガーメントに適用する剛体変換
///
/// レンダラー側で scale → rotate → translate (TRS) の順に合成される。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// 位置 (x, y, z)（ワールド単位）
    pub position: [f32; 3],
    /// 回転: X, Y, Z 各軸まわりの角度（ラジアン）。X=pitch, Y=yaw, Z=roll
    pub rotation: [f32; 3],
    /// 軸ごとのスケール。一様スケールなら3成分が等しい
    pub scale: [f32; 3],
}

impl RigidTransform {
    pub fn new(position: [f32; 3], rotation: [f32; 3], scale: [f32; 3]) -> Self {
        Self { position, rotation, scale }
    }

    /// 原点、回転なし、等倍
    pub fn identity() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(self.rotation.iter())
            .chain(self.scale.iter())
            .all(|v| v.is_finite())
    }

    /// 回転をクォータニオン (x, y, z, w) で返す
    ///
    /// 固定軸で X → Y → Z の順に回転する（R = Rz * Ry * Rx）。
    pub fn quaternion(&self) -> [f32; 4] {
        let q = self.unit_quaternion();
        [q.i, q.j, q.k, q.w]
    }

    /// TRS を合成した同次変換行列
    pub fn to_homogeneous(&self) -> Matrix4<f32> {
        let translation = Matrix4::new_translation(&Vector3::from(self.position));
        let rotation = self.unit_quaternion().to_homogeneous();
        let scale = Matrix4::new_nonuniform_scaling(&Vector3::from(self.scale));
        translation * rotation * scale
    }

    /// メッシュ座標の点にこの変換を適用する
    pub fn apply(&self, point: [f32; 3]) -> [f32; 3] {
        let p = self
            .to_homogeneous()
            .transform_point(&Point3::new(point[0], point[1], point[2]));
        [p.x, p.y, p.z]
    }

    fn unit_quaternion(&self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_euler_angles(self.rotation[0], self.rotation[1], self.rotation[2])
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}
