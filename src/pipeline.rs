use std::time::Instant;

use opencv::{core::Mat, prelude::*};
use tracing::debug;

use crate::config::LaneConfig;
use crate::edges::EdgeExtractor;
use crate::error::LaneDetectionResult;
use crate::hough::LineSegmentDetector;
use crate::lanes::{LaneAggregator, LanePair};
use crate::overlay::OverlayCompositor;
use crate::roi::RegionMasker;

/// 한 프레임 처리 결과
#[derive(Debug)]
pub struct FrameOutput {
    pub lanes: LanePair,
    pub segment_count: usize,
    pub overlay: Mat,
}

/// 단일 프레임에 대한 전체 차선 인식 처리 과정입니다.
///
/// 1) 엣지 추출 (그레이 → 블러 → 캐니)
/// 2) ROI 마스크
/// 3) 확률적 허프 변환
/// 4) 좌/우 분류, 평균, 외삽
/// 5) 원본과 합성
///
/// 프레임 사이에 공유하는 상태는 해상도별 ROI 마스크 캐시뿐이며,
/// `&self`로 동작하므로 여러 스레드가 하나의 파이프라인을 함께 쓸 수 있습니다.
pub struct LanePipeline {
    extractor: EdgeExtractor,
    masker: RegionMasker,
    detector: LineSegmentDetector,
    aggregator: LaneAggregator,
    compositor: OverlayCompositor,
}

impl LanePipeline {
    pub fn new(config: LaneConfig) -> LaneDetectionResult<Self> {
        config.validate()?;
        let LaneConfig {
            edge,
            roi,
            hough,
            extrapolation,
            overlay,
        } = config;

        Ok(Self {
            extractor: EdgeExtractor::new(edge),
            masker: RegionMasker::new(roi),
            detector: LineSegmentDetector::new(hough),
            aggregator: LaneAggregator::new(extrapolation),
            compositor: OverlayCompositor::new(overlay),
        })
    }

    pub fn process(&self, frame: &Mat) -> LaneDetectionResult<FrameOutput> {
        let start_time = Instant::now();

        let edges = self.extractor.extract(frame)?;
        let masked = self.masker.mask(&edges)?;
        let segments = self.detector.detect(&masked)?;
        let lanes = self.aggregator.aggregate(frame.rows(), &segments);
        let overlay = self.compositor.composite(frame, &lanes)?;

        debug!(
            segments = segments.len(),
            left = lanes.left.is_some(),
            right = lanes.right.is_some(),
            elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0,
            "frame processed"
        );

        Ok(FrameOutput {
            lanes,
            segment_count: segments.len(),
            overlay,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::LaneError;
    use opencv::core::{Point, Scalar, CV_8UC3};
    use opencv::imgproc;

    /// 어두운 노면 위에 좌/우 흰 차선을 그린 1280x720 프레임
    pub(crate) fn synthetic_road() -> Mat {
        let mut frame =
            Mat::new_rows_cols_with_default(720, 1280, CV_8UC3, Scalar::all(40.0)).unwrap();
        let white = Scalar::new(255.0, 255.0, 255.0, 0.0);
        imgproc::line(&mut frame, Point::new(300, 719), Point::new(520, 420), white, 10, imgproc::LINE_8, 0)
            .unwrap();
        imgproc::line(&mut frame, Point::new(1000, 719), Point::new(680, 420), white, 10, imgproc::LINE_8, 0)
            .unwrap();
        frame
    }

    #[test]
    fn synthetic_road_yields_both_lanes() {
        let pipeline = LanePipeline::new(LaneConfig::default()).unwrap();
        let frame = synthetic_road();
        let output = pipeline.process(&frame).unwrap();

        assert!(output.segment_count > 0);
        let left = output.lanes.left.expect("left lane");
        let right = output.lanes.right.expect("right lane");
        assert_eq!((left.y1, left.y2), (720, 432));
        assert_eq!((right.y1, right.y2), (720, 432));
        // 왼쪽 차선은 위로 갈수록 오른쪽, 오른쪽 차선은 위로 갈수록 왼쪽
        assert!(left.x2 > left.x1);
        assert!(right.x2 < right.x1);
        assert!(left.x1 < right.x1);

        assert_eq!((output.overlay.cols(), output.overlay.rows()), (1280, 720));
    }

    #[test]
    fn blank_frame_passes_through_unchanged() {
        let pipeline = LanePipeline::new(LaneConfig::default()).unwrap();
        let frame = Mat::new_rows_cols_with_default(720, 1280, CV_8UC3, Scalar::all(40.0)).unwrap();
        let output = pipeline.process(&frame).unwrap();

        assert_eq!(output.segment_count, 0);
        assert!(output.lanes.is_empty());
        assert_eq!(output.overlay.data_bytes().unwrap(), frame.data_bytes().unwrap());
    }

    #[test]
    fn empty_frame_is_invalid() {
        let pipeline = LanePipeline::new(LaneConfig::default()).unwrap();
        let err = pipeline.process(&Mat::default()).unwrap_err();
        assert!(matches!(err, LaneError::InvalidFrame { .. }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = LaneConfig::default();
        config.hough.rho = 0.0;
        assert!(LanePipeline::new(config).is_err());
    }

    #[test]
    fn pipeline_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LanePipeline>();
    }
}
