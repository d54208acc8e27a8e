use opencv::{
    core::{self, Mat, Size, CV_8U, CV_8UC1},
    imgproc,
    prelude::*,
};
use opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT;
use tracing::debug;

use crate::config::EdgeConfig;
use crate::error::{LaneDetectionResult, LaneError};

/// 단일 채널 이진 엣지 영상 (0 또는 255).
///
/// 원본 프레임과 가로/세로 크기가 항상 같습니다.
#[derive(Debug)]
pub struct EdgeMap {
    mat: Mat,
}

impl EdgeMap {
    /// 이미 이진화된 `CV_8UC1` 영상을 감쌉니다.
    pub fn from_mat(mat: Mat) -> LaneDetectionResult<Self> {
        ensure_frame(&mat)?;
        if mat.typ() != CV_8UC1 {
            return Err(LaneError::invalid_frame(format!(
                "edge map must be CV_8UC1, got type {}",
                mat.typ()
            )));
        }
        Ok(Self { mat })
    }

    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }

    pub fn width(&self) -> i32 {
        self.mat.cols()
    }

    pub fn height(&self) -> i32 {
        self.mat.rows()
    }

    /// 엣지로 표시된 픽셀 수
    pub fn edge_count(&self) -> LaneDetectionResult<i32> {
        Ok(core::count_non_zero(&self.mat)?)
    }
}

/// 비어 있거나 크기가 0인 프레임과 8비트 1/3채널이 아닌 프레임을 걸러냅니다.
pub(crate) fn ensure_frame(frame: &Mat) -> LaneDetectionResult<()> {
    if frame.empty() || frame.rows() <= 0 || frame.cols() <= 0 {
        return Err(LaneError::invalid_frame(format!(
            "empty frame ({}x{})",
            frame.cols(),
            frame.rows()
        )));
    }
    let channels = frame.channels();
    if channels != 1 && channels != 3 {
        return Err(LaneError::invalid_frame(format!(
            "expected 1 or 3 channels, got {channels}"
        )));
    }
    // 캐니는 8비트 입력만 받음
    let depth = frame.depth();
    if depth != CV_8U {
        return Err(LaneError::invalid_frame(format!(
            "expected 8-bit pixels, got depth {depth}"
        )));
    }
    Ok(())
}

/// 컬러 프레임을 이진 엣지 영상으로 변환하는 단계.
///
/// 그레이 변환 → 가우시안 블러 → 캐니 엣지 순서로 처리하며,
/// 같은 입력에 대해 항상 같은 결과를 내는 순수 함수입니다.
#[derive(Debug, Clone)]
pub struct EdgeExtractor {
    config: EdgeConfig,
}

impl EdgeExtractor {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    /// # 인자
    /// * `frame` - BGR 3채널 또는 1채널 영상
    ///
    /// # 반환
    /// * 입력과 같은 크기의 `EdgeMap`
    ///
    /// # 에러
    /// * 빈 프레임이면 `LaneError::InvalidFrame`
    pub fn extract(&self, frame: &Mat) -> LaneDetectionResult<EdgeMap> {
        ensure_frame(frame)?;

        // 1) 그레이 변환
        let gray = self.gray_scale(frame)?;

        // 2) 가우시안 블러
        let blur = self.noise_removal(&gray)?;

        // 3) 캐니 엣지
        let edges = self.edge_detection(&blur)?;

        let map = EdgeMap { mat: edges };
        debug!(
            width = map.width(),
            height = map.height(),
            edge_pixels = map.edge_count()?,
            "edge map extracted"
        );
        Ok(map)
    }

    fn gray_scale(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        if img.channels() == 1 {
            return Ok(img.try_clone()?);
        }
        let mut gray = Mat::default();
        imgproc::cvt_color(img, &mut gray, imgproc::COLOR_BGR2GRAY, 0, ALGO_HINT_DEFAULT)?;
        Ok(gray)
    }

    /// sigma는 0으로 넘겨 커널 크기로부터 자동 계산되게 합니다.
    fn noise_removal(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        let k = self.config.blur_kernel_size;
        let mut dst = Mat::default();
        imgproc::gaussian_blur(
            img,
            &mut dst,
            Size::new(k, k),
            0.0,
            0.0,
            core::BORDER_DEFAULT,
            ALGO_HINT_DEFAULT,
        )?;
        Ok(dst)
    }

    fn edge_detection(&self, img: &Mat) -> LaneDetectionResult<Mat> {
        let mut edges = Mat::default();
        imgproc::canny(
            img,
            &mut edges,
            self.config.low_threshold,
            self.config.high_threshold,
            self.config.aperture_size,
            false,
        )?;
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Point, Scalar, CV_16UC3, CV_32FC3, CV_8UC3};

    fn road_like_frame() -> Mat {
        let mut frame =
            Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(30.0)).unwrap();
        imgproc::line(
            &mut frame,
            Point::new(60, 239),
            Point::new(150, 120),
            Scalar::new(255.0, 255.0, 255.0, 0.0),
            6,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        frame
    }

    #[test]
    fn extract_preserves_dimensions_and_is_binary() {
        let extractor = EdgeExtractor::new(EdgeConfig::default());
        let frame = road_like_frame();
        let edges = extractor.extract(&frame).unwrap();

        assert_eq!(edges.width(), 320);
        assert_eq!(edges.height(), 240);
        assert_eq!(edges.as_mat().typ(), CV_8UC1);
        assert!(edges.edge_count().unwrap() > 0);
        assert!(edges
            .as_mat()
            .data_bytes()
            .unwrap()
            .iter()
            .all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn extract_is_deterministic() {
        let extractor = EdgeExtractor::new(EdgeConfig::default());
        let frame = road_like_frame();
        let a = extractor.extract(&frame).unwrap();
        let b = extractor.extract(&frame).unwrap();
        assert_eq!(
            a.as_mat().data_bytes().unwrap(),
            b.as_mat().data_bytes().unwrap()
        );
    }

    #[test]
    fn uniform_frame_has_no_edges() {
        let extractor = EdgeExtractor::new(EdgeConfig::default());
        let frame = Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(90.0)).unwrap();
        let edges = extractor.extract(&frame).unwrap();
        assert_eq!(edges.edge_count().unwrap(), 0);
    }

    #[test]
    fn single_channel_input_is_accepted() {
        let extractor = EdgeExtractor::new(EdgeConfig::default());
        let frame = Mat::new_rows_cols_with_default(50, 80, CV_8UC1, Scalar::all(0.0)).unwrap();
        let edges = extractor.extract(&frame).unwrap();
        assert_eq!((edges.width(), edges.height()), (80, 50));
    }

    #[test]
    fn empty_frame_is_invalid() {
        let extractor = EdgeExtractor::new(EdgeConfig::default());
        let err = extractor.extract(&Mat::default()).unwrap_err();
        assert!(matches!(err, LaneError::InvalidFrame { .. }));
    }

    #[test]
    fn non_8bit_frames_are_invalid() {
        let extractor = EdgeExtractor::new(EdgeConfig::default());
        for typ in [CV_16UC3, CV_32FC3] {
            let frame = Mat::new_rows_cols_with_default(40, 60, typ, Scalar::all(1.0)).unwrap();
            let err = extractor.extract(&frame).unwrap_err();
            assert!(matches!(err, LaneError::InvalidFrame { .. }));
        }
    }
}
