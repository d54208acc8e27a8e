use opencv::{
    core::{Vec4i, Vector},
    imgproc,
    prelude::*,
};
use tracing::debug;

use crate::config::HoughConfig;
use crate::edges::EdgeMap;
use crate::error::LaneDetectionResult;
use crate::lanes::LineSegment;

/// 마스크된 엣지 영상에서 확률적 허프 변환으로 직선 조각을 찾는 단계.
#[derive(Debug, Clone)]
pub struct LineSegmentDetector {
    config: HoughConfig,
}

impl LineSegmentDetector {
    pub fn new(config: HoughConfig) -> Self {
        Self { config }
    }

    /// 임계값을 넘는 선분이 하나도 없으면 빈 벡터를 돌려줍니다 (에러 아님).
    pub fn detect(&self, masked_edges: &EdgeMap) -> LaneDetectionResult<Vec<LineSegment>> {
        let mut lines: Vector<Vec4i> = Vector::new();
        imgproc::hough_lines_p(
            masked_edges.as_mat(),
            &mut lines,
            self.config.rho,
            self.config.theta,
            self.config.threshold,
            self.config.min_line_length,
            self.config.max_line_gap,
        )?;

        let segments: Vec<LineSegment> = lines.iter().map(LineSegment::from).collect();
        debug!(segments = segments.len(), "hough segments detected");
        Ok(segments)
    }
}

impl From<Vec4i> for LineSegment {
    fn from(v: Vec4i) -> Self {
        LineSegment::new(v[0], v[1], v[2], v[3])
    }
}
