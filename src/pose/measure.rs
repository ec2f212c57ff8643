use crate::config::MeasureConfig;
use crate::error::AlignmentError;
use crate::pose::{BodyPart, Landmark, LandmarkSet};

/// 計測に必須の部位
pub const REQUIRED_PARTS: [BodyPart; 4] = [
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftHip,
    BodyPart::RightHip,
];

/// 角度計算を打ち切る最小長（正規化座標）
const ANGLE_EPSILON: f32 = 1e-4;

/// 1フレーム分の体の計測値（正規化座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMeasurement {
    /// 肩幅: 左右肩のXY平面距離
    pub shoulder_width: f32,
    /// 胴長: 肩中点→腰中点のXY平面距離
    pub torso_length: f32,
    /// 肩ラインの角度 atan2(dy, dx)（ラジアン）
    pub shoulder_angle: f32,
    /// 腰ラインの角度。腰幅が潰れている場合は肩ラインの角度
    pub hip_angle: f32,
    /// 前傾角: 肩中点→腰中点ベクトルのYZ平面での傾き
    pub lean_angle: f32,
    pub shoulder_mid: [f32; 3],
    pub hip_mid: [f32; 3],
    /// 肩中点と腰中点の中点
    pub center: [f32; 3],
    /// 奥行きの代理値（鼻のz、なければ肩中点のz）
    pub depth: f32,
    /// 体の厚み: 肩中点と腰中点のz差
    pub body_depth: f32,
}

/// LandmarkSet から BodyMeasurement を導出する
#[derive(Debug, Clone)]
pub struct MeasurementExtractor {
    visibility_threshold: Option<f32>,
    min_shoulder_width: f32,
}

impl MeasurementExtractor {
    pub fn new(visibility_threshold: Option<f32>) -> Self {
        Self {
            visibility_threshold,
            min_shoulder_width: ANGLE_EPSILON,
        }
    }

    pub fn from_config(config: &MeasureConfig) -> Self {
        Self {
            visibility_threshold: config.visibility_rejection_threshold,
            min_shoulder_width: config.min_shoulder_width.max(ANGLE_EPSILON),
        }
    }

    pub fn extract(&self, set: &LandmarkSet) -> Result<BodyMeasurement, AlignmentError> {
        let [ls, rs, lh, rh] = self.required_landmarks(set)?;

        if ![ls, rs, lh, rh].iter().all(|lm| lm.is_finite()) {
            return Err(AlignmentError::DegenerateMeasurement(
                "non-finite landmark coordinate",
            ));
        }

        let dx = rs.x - ls.x;
        let dy = rs.y - ls.y;
        let shoulder_width = dx.hypot(dy);
        // 両肩が同一点だと肩ラインの角度が定義できない
        if shoulder_width < self.min_shoulder_width {
            return Err(AlignmentError::DegenerateMeasurement("shoulders coincide"));
        }
        let shoulder_angle = f32::atan2(dy, dx);

        let hdx = rh.x - lh.x;
        let hdy = rh.y - lh.y;
        let hip_angle = if hdx.hypot(hdy) >= ANGLE_EPSILON {
            f32::atan2(hdy, hdx)
        } else {
            shoulder_angle
        };

        let shoulder_mid = midpoint(&ls, &rs);
        let hip_mid = midpoint(&lh, &rh);
        let torso_length = (hip_mid[0] - shoulder_mid[0]).hypot(hip_mid[1] - shoulder_mid[1]);

        let spine_dy = hip_mid[1] - shoulder_mid[1];
        let spine_dz = hip_mid[2] - shoulder_mid[2];
        let lean_angle = if spine_dy.hypot(spine_dz) >= ANGLE_EPSILON {
            f32::atan2(spine_dz, spine_dy)
        } else {
            0.0
        };

        let center = [
            (shoulder_mid[0] + hip_mid[0]) / 2.0,
            (shoulder_mid[1] + hip_mid[1]) / 2.0,
            (shoulder_mid[2] + hip_mid[2]) / 2.0,
        ];

        // 鼻は任意。見えていればそのzを奥行きに使う
        let depth = match set.get(BodyPart::Nose) {
            Some(nose) if nose.is_finite() && self.passes_visibility(nose) => nose.z,
            _ => shoulder_mid[2],
        };

        Ok(BodyMeasurement {
            shoulder_width,
            torso_length,
            shoulder_angle,
            hip_angle,
            lean_angle,
            shoulder_mid,
            hip_mid,
            center,
            depth,
            body_depth: spine_dz.abs(),
        })
    }

    /// 必須部位の有無と可視度だけを検査する
    pub fn check_required(&self, set: &LandmarkSet) -> Result<(), AlignmentError> {
        self.required_landmarks(set).map(|_| ())
    }

    /// REQUIRED_PARTS の順に取り出す
    fn required_landmarks(&self, set: &LandmarkSet) -> Result<[Landmark; 4], AlignmentError> {
        let mut found = [Landmark::default(); REQUIRED_PARTS.len()];
        for (slot, &part) in found.iter_mut().zip(REQUIRED_PARTS.iter()) {
            *slot = *self.required(set, part)?;
        }
        Ok(found)
    }

    fn required<'a>(
        &self,
        set: &'a LandmarkSet,
        part: BodyPart,
    ) -> Result<&'a Landmark, AlignmentError> {
        let lm = set.get(part).ok_or(AlignmentError::MissingLandmarks {
            part,
            index: part.index(),
            len: set.len(),
        })?;
        if let (Some(threshold), Some(visibility)) = (self.visibility_threshold, lm.visibility) {
            if visibility < threshold {
                return Err(AlignmentError::LowConfidence {
                    part,
                    visibility,
                    threshold,
                });
            }
        }
        Ok(lm)
    }

    fn passes_visibility(&self, lm: &Landmark) -> bool {
        self.visibility_threshold.map_or(true, |t| lm.is_visible(t))
    }
}

impl Default for MeasurementExtractor {
    fn default() -> Self {
        Self::new(None)
    }
}

fn midpoint(a: &Landmark, b: &Landmark) -> [f32; 3] {
    [(a.x + b.x) / 2.0, (a.y + b.y) / 2.0, (a.z + b.z) / 2.0]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 肩・腰・鼻だけを埋めた33点のセット
    pub(crate) fn make_set(
        left_shoulder: (f32, f32, f32),
        right_shoulder: (f32, f32, f32),
        left_hip: (f32, f32, f32),
        right_hip: (f32, f32, f32),
    ) -> LandmarkSet {
        let mut landmarks = vec![Landmark::default(); BodyPart::COUNT];
        let put = |lms: &mut Vec<Landmark>, part: BodyPart, p: (f32, f32, f32)| {
            lms[part.index()] = Landmark::new(p.0, p.1, p.2);
        };
        put(&mut landmarks, BodyPart::LeftShoulder, left_shoulder);
        put(&mut landmarks, BodyPart::RightShoulder, right_shoulder);
        put(&mut landmarks, BodyPart::LeftHip, left_hip);
        put(&mut landmarks, BodyPart::RightHip, right_hip);
        LandmarkSet::new(landmarks)
    }

    pub(crate) fn upright_set() -> LandmarkSet {
        make_set(
            (0.4, 0.3, 0.0),
            (0.6, 0.3, 0.0),
            (0.42, 0.6, 0.0),
            (0.58, 0.6, 0.0),
        )
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_upright_measurement() {
        let m = MeasurementExtractor::default().extract(&upright_set()).unwrap();
        assert!(approx(m.shoulder_width, 0.2));
        assert!(approx(m.shoulder_angle, 0.0));
        assert!(approx(m.hip_angle, 0.0));
        assert!(approx(m.torso_length, 0.3));
        assert!(approx(m.lean_angle, 0.0));
        assert!(approx(m.shoulder_mid[0], 0.5));
        assert!(approx(m.shoulder_mid[1], 0.3));
        assert!(approx(m.center[1], 0.45));
        assert!(approx(m.body_depth, 0.0));
    }

    #[test]
    fn test_deterministic() {
        let ex = MeasurementExtractor::default();
        let set = make_set(
            (0.37, 0.31, -0.12),
            (0.61, 0.28, -0.1),
            (0.41, 0.62, 0.02),
            (0.57, 0.59, 0.01),
        );
        let a = ex.extract(&set).unwrap();
        let b = ex.extract(&set).unwrap();
        assert_eq!(a.shoulder_width.to_bits(), b.shoulder_width.to_bits());
        assert_eq!(a.shoulder_angle.to_bits(), b.shoulder_angle.to_bits());
        assert_eq!(a.lean_angle.to_bits(), b.lean_angle.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn test_tilted_shoulders() {
        // 右肩が下がっている → 正の角度
        let set = make_set((0.4, 0.3, 0.0), (0.6, 0.5, 0.0), (0.42, 0.7, 0.0), (0.58, 0.7, 0.0));
        let m = MeasurementExtractor::default().extract(&set).unwrap();
        assert!(approx(m.shoulder_angle, std::f32::consts::FRAC_PI_4));
    }

    #[test]
    fn test_missing_right_shoulder() {
        let mut set = upright_set();
        set.landmarks.truncate(12);
        let err = MeasurementExtractor::default().extract(&set).unwrap_err();
        assert_eq!(
            err,
            AlignmentError::MissingLandmarks {
                part: BodyPart::RightShoulder,
                index: 12,
                len: 12,
            }
        );
    }

    #[test]
    fn test_missing_hips() {
        let mut set = upright_set();
        set.landmarks.truncate(24);
        let err = MeasurementExtractor::default().extract(&set).unwrap_err();
        assert!(matches!(
            err,
            AlignmentError::MissingLandmarks { part: BodyPart::RightHip, .. }
        ));
    }

    #[test]
    fn test_visibility_policy() {
        let mut set = upright_set();
        set.landmarks[BodyPart::LeftHip.index()].visibility = Some(0.2);

        // デフォルトでは可視度で拒否しない
        assert!(MeasurementExtractor::default().extract(&set).is_ok());

        let err = MeasurementExtractor::new(Some(0.5)).extract(&set).unwrap_err();
        assert!(matches!(
            err,
            AlignmentError::LowConfidence { part: BodyPart::LeftHip, .. }
        ));
    }

    #[test]
    fn test_check_required_ignores_geometry() {
        let extractor = MeasurementExtractor::new(Some(0.5));
        // 両肩が同一点でも部位と可視度の検査は通る
        let set = make_set((0.5, 0.3, 0.0), (0.5, 0.3, 0.0), (0.42, 0.6, 0.0), (0.58, 0.6, 0.0));
        assert!(extractor.check_required(&set).is_ok());

        let mut dim = upright_set();
        dim.landmarks[BodyPart::RightShoulder.index()].visibility = Some(0.1);
        assert!(matches!(
            extractor.check_required(&dim),
            Err(AlignmentError::LowConfidence { part: BodyPart::RightShoulder, .. })
        ));

        let mut short = upright_set();
        short.landmarks.truncate(20);
        assert!(matches!(
            extractor.check_required(&short),
            Err(AlignmentError::MissingLandmarks { index: 23, .. })
        ));
    }

    #[test]
    fn test_coincident_shoulders_degenerate() {
        let set = make_set((0.5, 0.3, 0.0), (0.5, 0.3, 0.0), (0.42, 0.6, 0.0), (0.58, 0.6, 0.0));
        let err = MeasurementExtractor::default().extract(&set).unwrap_err();
        assert!(matches!(err, AlignmentError::DegenerateMeasurement(_)));
    }

    #[test]
    fn test_non_finite_degenerate() {
        let set = make_set((f32::NAN, 0.3, 0.0), (0.6, 0.3, 0.0), (0.42, 0.6, 0.0), (0.58, 0.6, 0.0));
        let err = MeasurementExtractor::default().extract(&set).unwrap_err();
        assert!(matches!(err, AlignmentError::DegenerateMeasurement(_)));
    }

    #[test]
    fn test_coincident_hips_use_shoulder_angle() {
        let set = make_set((0.4, 0.3, 0.0), (0.6, 0.4, 0.0), (0.5, 0.6, 0.0), (0.5, 0.6, 0.0));
        let m = MeasurementExtractor::default().extract(&set).unwrap();
        assert_eq!(m.hip_angle, m.shoulder_angle);
        assert!(m.hip_angle.is_finite());
    }

    #[test]
    fn test_depth_prefers_nose() {
        let mut set = make_set((0.4, 0.3, -0.2), (0.6, 0.3, -0.2), (0.42, 0.6, 0.0), (0.58, 0.6, 0.0));
        set.landmarks[BodyPart::Nose.index()] = Landmark::new(0.5, 0.15, -0.5);
        let m = MeasurementExtractor::default().extract(&set).unwrap();
        assert!(approx(m.depth, -0.5));
        assert!(approx(m.body_depth, 0.2));

        // 鼻が見えていなければ肩中点のz
        set.landmarks[BodyPart::Nose.index()].visibility = Some(0.1);
        let m = MeasurementExtractor::new(Some(0.5)).extract(&set).unwrap();
        assert!(approx(m.depth, -0.2));
    }

    #[test]
    fn test_lean_forward_positive() {
        // 肩が腰よりカメラに近い（zが小さい）→ 前傾
        let set = make_set((0.4, 0.3, -0.3), (0.6, 0.3, -0.3), (0.42, 0.6, 0.0), (0.58, 0.6, 0.0));
        let m = MeasurementExtractor::default().extract(&set).unwrap();
        assert!(approx(m.lean_angle, f32::atan2(0.3, 0.3)));
    }
}
