use thiserror::Error;

use crate::pose::BodyPart;

/// 1フレーム分の計測に失敗した理由
///
/// いずれも `AlignmentSession` 内で回復され（Frozen状態・最後の姿勢を保持）、
/// 呼び出し側へ致命的エラーとして伝播することはない。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentError {
    /// 必須ランドマークが存在しない（セットが短すぎる）
    #[error("missing landmark {part:?} (index {index}), set has {len} landmarks")]
    MissingLandmarks {
        part: BodyPart,
        index: usize,
        len: usize,
    },

    /// 必須ランドマークの可視度が閾値未満
    #[error("landmark {part:?} visibility {visibility:.2} below threshold {threshold:.2}")]
    LowConfidence {
        part: BodyPart,
        visibility: f32,
        threshold: f32,
    },

    /// 角度や距離が定義できない入力（両肩が同一点、非有限値など）
    #[error("degenerate measurement: {0}")]
    DegenerateMeasurement(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = AlignmentError::MissingLandmarks {
            part: BodyPart::RightShoulder,
            index: 12,
            len: 12,
        };
        assert_eq!(e.to_string(), "missing landmark RightShoulder (index 12), set has 12 landmarks");

        let e = AlignmentError::LowConfidence {
            part: BodyPart::LeftHip,
            visibility: 0.1,
            threshold: 0.5,
        };
        assert_eq!(e.to_string(), "landmark LeftHip visibility 0.10 below threshold 0.50");
    }
}
