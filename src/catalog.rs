use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::transform::RigidTransform;

/// ガーメントごとの補正値（作者が指定する静的データ）
///
/// 体から求めた変換の後に適用される: 位置・回転は加算、スケールは乗算。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GarmentCalibration {
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_scale() -> f32 { 1.0 }

impl GarmentCalibration {
    pub fn new(position: [f32; 3], rotation: [f32; 3], scale: f32) -> Self {
        Self { position, rotation, scale }
    }

    /// 補正なし
    pub fn identity() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: 1.0,
        }
    }

    pub fn apply(&self, base: &RigidTransform) -> RigidTransform {
        RigidTransform::new(
            [
                base.position[0] + self.position[0],
                base.position[1] + self.position[1],
                base.position[2] + self.position[2],
            ],
            [
                base.rotation[0] + self.rotation[0],
                base.rotation[1] + self.rotation[1],
                base.rotation[2] + self.rotation[2],
            ],
            [
                base.scale[0] * self.scale,
                base.scale[1] * self.scale,
                base.scale[2] * self.scale,
            ],
        )
    }
}

impl Default for GarmentCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentCategory {
    Tops,
    Bottoms,
    Outerwear,
    Dresses,
}

/// カタログの1エントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarmentEntry {
    pub id: String,
    pub name: String,
    pub category: GarmentCategory,
    /// レンダラーが読み込むモデルのパス（エンジンは参照しない）
    #[serde(default)]
    pub model_path: String,
    #[serde(default, rename = "offset")]
    pub calibration: GarmentCalibration,
}

/// ガーメントカタログ（読み取り専用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GarmentCatalog {
    pub garments: Vec<GarmentEntry>,
}

impl GarmentCatalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("invalid catalog {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let catalog: GarmentCatalog = serde_json::from_str(content)?;
        Ok(catalog)
    }

    pub fn entry(&self, id: &str) -> Option<&GarmentEntry> {
        self.garments.iter().find(|g| g.id == id)
    }

    pub fn calibration(&self, id: &str) -> Option<&GarmentCalibration> {
        self.entry(id).map(|g| &g.calibration)
    }

    /// 未登録IDは補正なしとして扱う
    pub fn calibration_or_identity(&self, id: &str) -> GarmentCalibration {
        match self.calibration(id) {
            Some(cal) => *cal,
            None => {
                log::warn!("garment '{}' not in catalog, using identity calibration", id);
                GarmentCalibration::identity()
            }
        }
    }

    /// 切り替え先の補正値
    ///
    /// 空のカタログでは任意のIDを補正なしで受け付ける。
    /// 登録済みのカタログに無いIDは None（入力ミスとして現在のガーメントを維持する）。
    pub fn switch_target(&self, id: &str) -> Option<GarmentCalibration> {
        if self.garments.is_empty() {
            return Some(GarmentCalibration::identity());
        }
        self.calibration(id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.garments.iter().map(|g| g.id.as_str())
    }
}
