use crate::catalog::GarmentCalibration;
use crate::config::Config;
use crate::error::AlignmentError;
use crate::pose::{LandmarkSet, MeasurementExtractor};
use crate::tracker::smooth::{LandmarkSmoother, TransformSmoother};
use crate::tracker::solver::TransformSolver;
use crate::transform::RigidTransform;

/// セッションの状態
///
/// Uninitialized → Tracking ⇄ Frozen → Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// まだ一度も計測に成功していない
    Uninitialized,
    Tracking,
    /// 直近フレームが失敗し、最後の姿勢を保持している
    Frozen,
    /// 終了済み。以降のフレームは処理しない
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub tracked: u64,
    pub frozen: u64,
}

/// 1着のガーメントを追従させるセッション
///
/// 前回採用した変換を所有し、フレームごとに
/// 計測 → 変換計算 → 平滑化 を行う。失敗したフレームでは最後の姿勢を保持する。
pub struct AlignmentSession {
    extractor: MeasurementExtractor,
    solver: TransformSolver,
    smoother: TransformSmoother,
    input_smoother: Option<LandmarkSmoother>,
    state: SessionState,
    last_accepted: Option<RigidTransform>,
    last_error: Option<AlignmentError>,
    stats: SessionStats,
}

impl AlignmentSession {
    pub fn new(
        extractor: MeasurementExtractor,
        solver: TransformSolver,
        smoother: TransformSmoother,
        input_smoother: Option<LandmarkSmoother>,
    ) -> Self {
        Self {
            extractor,
            solver,
            smoother,
            input_smoother,
            state: SessionState::Uninitialized,
            last_accepted: None,
            last_error: None,
            stats: SessionStats::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MeasurementExtractor::from_config(&config.measure),
            TransformSolver::from_config(&config.solver),
            TransformSmoother::from_config(&config.smoothing),
            LandmarkSmoother::from_config(&config.smoothing),
        )
    }

    /// 1フレーム処理する。失敗しない
    ///
    /// `None` は「新しいランドマークなし」を意味し、失敗フレームと同様に Frozen へ遷移する。
    pub fn process_frame(
        &mut self,
        landmarks: Option<LandmarkSet>,
        calibration: &GarmentCalibration,
    ) -> RigidTransform {
        if self.state == SessionState::Closed {
            return RigidTransform::identity();
        }
        self.stats.frames += 1;

        match landmarks {
            Some(set) => match self.solve_target(set, calibration) {
                Ok(target) => self.accept(target),
                Err(e) => {
                    log::debug!("frame rejected: {}", e);
                    self.last_error = Some(e);
                    self.hold()
                }
            },
            None => {
                self.last_error = None;
                self.hold()
            }
        }
    }

    /// セッションを終了し、保持している変換を破棄する
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            log::debug!("session {:?} -> Closed", self.state);
        }
        self.state = SessionState::Closed;
        self.last_accepted = None;
        self.last_error = None;
        if let Some(s) = self.input_smoother.as_mut() {
            s.reset();
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == SessionState::Tracking
    }

    /// 直近フレームの失敗理由。成功・ランドマークなしのフレームでは None
    pub fn last_error(&self) -> Option<&AlignmentError> {
        self.last_error.as_ref()
    }

    pub fn last_accepted(&self) -> Option<&RigidTransform> {
        self.last_accepted.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn solve_target(
        &mut self,
        set: LandmarkSet,
        calibration: &GarmentCalibration,
    ) -> Result<RigidTransform, AlignmentError> {
        let set = match self.input_smoother.as_mut() {
            Some(s) => {
                // 平滑化後の可視度は下がらないので、生の入力で判定する
                self.extractor.check_required(&set)?;
                s.apply(set)
            }
            None => set,
        };
        let measurement = self.extractor.extract(&set)?;
        let target = self.solver.solve(&measurement, calibration);
        if !target.is_finite() {
            return Err(AlignmentError::DegenerateMeasurement("non-finite transform"));
        }
        Ok(target)
    }

    fn accept(&mut self, target: RigidTransform) -> RigidTransform {
        // 初回は平滑化しない（サンプルが1つしかない）
        let out = match self.last_accepted {
            Some(prev) => self.smoother.blend(&prev, &target),
            None => target,
        };
        if self.state != SessionState::Tracking {
            log::debug!("session {:?} -> Tracking", self.state);
        }
        self.state = SessionState::Tracking;
        self.last_accepted = Some(out);
        self.last_error = None;
        self.stats.tracked += 1;
        out
    }

    /// 最後に採用した変換をそのまま返す
    fn hold(&mut self) -> RigidTransform {
        match self.last_accepted {
            Some(prev) => {
                self.stats.frozen += 1;
                if self.state == SessionState::Tracking {
                    log::debug!("session Tracking -> Frozen");
                    self.state = SessionState::Frozen;
                }
                prev
            }
            // 保持する姿勢がまだない
            None => RigidTransform::identity(),
        }
    }
}
