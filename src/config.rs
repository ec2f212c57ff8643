use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub smoothing: SmoothConfig,
    #[serde(default)]
    pub measure: MeasureConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// フレームループの目標FPS
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// ガーメントカタログ(JSON)のパス
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    /// 起動時に選択するガーメントID
    #[serde(default = "default_garment")]
    pub garment: String,
}

fn default_target_fps() -> u32 { 30 }
fn default_catalog_path() -> String { "garments.json".to_string() }
fn default_garment() -> String { "womens-shirt-1".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            catalog_path: default_catalog_path(),
            garment: default_garment(),
        }
    }
}

/// 姿勢推定サービスへの接続
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_feed_addr")]
    pub addr: String,
    /// 切断時の再接続間隔（秒）
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
}

fn default_feed_addr() -> String { "127.0.0.1:8765".to_string() }
fn default_reconnect_secs() -> u64 { 2 }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            addr: default_feed_addr(),
            reconnect_secs: default_reconnect_secs(),
        }
    }
}

/// レンダラーへのOSC送信先
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_addr")]
    pub addr: String,
    #[serde(default)]
    pub garment_index: i32,
}

fn default_output_addr() -> String { "127.0.0.1:39571".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            addr: default_output_addr(),
            garment_index: 0,
        }
    }
}

/// 平滑化係数（新しい値の重み、1.0で履歴なし）
#[derive(Debug, Deserialize, Clone)]
pub struct SmoothConfig {
    /// ランドマーク入力の平滑化。0.0 で無効
    #[serde(default = "default_input_smoothing")]
    pub input_smoothing_factor: f32,
    #[serde(default = "default_output_position")]
    pub output_position_smoothing_factor: f32,
    #[serde(default = "default_output_scale")]
    pub output_scale_smoothing_factor: f32,
    #[serde(default = "default_output_rotation")]
    pub output_rotation_smoothing_factor: f32,
}

fn default_input_smoothing() -> f32 { 0.3 }
fn default_output_position() -> f32 { 0.3 }
fn default_output_scale() -> f32 { 0.3 }
fn default_output_rotation() -> f32 { 0.15 }

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            input_smoothing_factor: default_input_smoothing(),
            output_position_smoothing_factor: default_output_position(),
            output_scale_smoothing_factor: default_output_scale(),
            output_rotation_smoothing_factor: default_output_rotation(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeasureConfig {
    /// 必須ランドマークの可視度がこれ未満なら拒否。未設定なら可視度では拒否しない
    #[serde(default)]
    pub visibility_rejection_threshold: Option<f32>,
    /// これより狭い肩幅は縮退とみなす（正規化座標）
    #[serde(default = "default_min_shoulder_width")]
    pub min_shoulder_width: f32,
}

fn default_min_shoulder_width() -> f32 { 1e-4 }

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            visibility_rejection_threshold: None,
            min_shoulder_width: default_min_shoulder_width(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// 肩幅・胴長の線形結合を3軸共通に使う
    #[default]
    Uniform,
    /// X=肩幅, Y=胴長, Z=肩幅×depth_ratio
    PerAxis,
}

/// 正規化座標 → ワールド座標の写像とスケール・回転の重み
///
/// 数値はカメラ/FOVごとに実測で合わせる較正データ。
#[derive(Debug, Deserialize, Clone)]
pub struct SolverConfig {
    #[serde(default = "default_horizontal_gain")]
    pub horizontal_gain: f32,
    #[serde(default = "default_vertical_gain")]
    pub vertical_gain: f32,
    /// z = depth_bias - depth * depth_gain
    #[serde(default = "default_depth_bias")]
    pub depth_bias: f32,
    #[serde(default = "default_depth_gain")]
    pub depth_gain: f32,
    /// ワールド原点に対応する画像上の点
    #[serde(default = "default_origin_x")]
    pub origin_x: f32,
    #[serde(default = "default_origin_y")]
    pub origin_y: f32,
    #[serde(default = "default_offset_y")]
    pub offset_y: f32,
    /// X軸反転（鏡像表示のとき）
    #[serde(default)]
    pub mirror_x: bool,
    /// 位置の基準点: 0.0=肩中点, 1.0=腰中点
    #[serde(default = "default_hip_anchor_weight")]
    pub hip_anchor_weight: f32,

    #[serde(default)]
    pub scale_mode: ScaleMode,
    #[serde(default = "default_width_weight")]
    pub width_weight: f32,
    #[serde(default = "default_torso_weight")]
    pub torso_weight: f32,
    #[serde(default)]
    pub depth_weight: f32,
    /// PerAxis のZスケール: 肩幅に対する比
    #[serde(default = "default_depth_ratio")]
    pub depth_ratio: f32,
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,

    /// メッシュの正面向きに合わせるyaw（アセットごとの作法。前向きに作られたメッシュはπ）
    #[serde(default = "default_facing_yaw")]
    pub facing_yaw: f32,
    /// yawへの腰ライン角の寄与（残りは肩ライン角）
    #[serde(default)]
    pub hip_yaw_weight: f32,
    /// pitchへの前傾角の寄与。前傾角はノイズが多いので1未満
    #[serde(default = "default_lean_weight")]
    pub lean_weight: f32,
    /// rollへの肩ライン角の寄与
    #[serde(default)]
    pub roll_weight: f32,
}

fn default_horizontal_gain() -> f32 { 10.0 }
fn default_vertical_gain() -> f32 { 12.0 }
fn default_depth_bias() -> f32 { -1.0 }
fn default_depth_gain() -> f32 { 2.0 }
fn default_origin_x() -> f32 { 0.5 }
fn default_origin_y() -> f32 { 0.4 }
fn default_offset_y() -> f32 { 2.0 }
fn default_hip_anchor_weight() -> f32 { 0.5 }
fn default_width_weight() -> f32 { 3.5 }
fn default_torso_weight() -> f32 { 1.5 }
fn default_depth_ratio() -> f32 { 0.5 }
fn default_min_scale() -> f32 { 0.1 }
fn default_max_scale() -> f32 { 10.0 }
fn default_facing_yaw() -> f32 { std::f32::consts::PI }
fn default_lean_weight() -> f32 { 0.5 }

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            horizontal_gain: default_horizontal_gain(),
            vertical_gain: default_vertical_gain(),
            depth_bias: default_depth_bias(),
            depth_gain: default_depth_gain(),
            origin_x: default_origin_x(),
            origin_y: default_origin_y(),
            offset_y: default_offset_y(),
            mirror_x: false,
            hip_anchor_weight: default_hip_anchor_weight(),
            scale_mode: ScaleMode::default(),
            width_weight: default_width_weight(),
            torso_weight: default_torso_weight(),
            depth_weight: 0.0,
            depth_ratio: default_depth_ratio(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            facing_yaw: default_facing_yaw(),
            hip_yaw_weight: 0.0,
            lean_weight: default_lean_weight(),
            roll_weight: 0.0,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト値で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.smoothing;
        if !(0.0..=1.0).contains(&s.input_smoothing_factor) {
            bail!("input_smoothing_factor must be in [0, 1], got {}", s.input_smoothing_factor);
        }
        for (name, v) in [
            ("output_position_smoothing_factor", s.output_position_smoothing_factor),
            ("output_scale_smoothing_factor", s.output_scale_smoothing_factor),
            ("output_rotation_smoothing_factor", s.output_rotation_smoothing_factor),
        ] {
            // 0 だと出力が永久に固定される
            if !(v > 0.0 && v <= 1.0) {
                bail!("{} must be in (0, 1], got {}", name, v);
            }
        }

        let sv = &self.solver;
        if !sv.min_scale.is_finite() || !sv.max_scale.is_finite() {
            bail!("min_scale and max_scale must be finite, got [{}, {}]", sv.min_scale, sv.max_scale);
        }
        if !(sv.min_scale > 0.0) || sv.min_scale > sv.max_scale {
            bail!("scale range must satisfy 0 < min_scale <= max_scale, got [{}, {}]", sv.min_scale, sv.max_scale);
        }
        if !(0.0..=1.0).contains(&sv.hip_anchor_weight) {
            bail!("hip_anchor_weight must be in [0, 1], got {}", sv.hip_anchor_weight);
        }
        if !(0.0..=1.0).contains(&sv.hip_yaw_weight) {
            bail!("hip_yaw_weight must be in [0, 1], got {}", sv.hip_yaw_weight);
        }

        if let Some(t) = self.measure.visibility_rejection_threshold {
            if !(0.0..=1.0).contains(&t) {
                bail!("visibility_rejection_threshold must be in [0, 1], got {}", t);
            }
        }
        if self.app.target_fps == 0 {
            bail!("target_fps must be positive");
        }
        Ok(())
    }
}
