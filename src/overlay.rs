use opencv::{
    core::{self, Mat, Point},
    imgproc,
    prelude::*,
};

use crate::config::OverlayConfig;
use crate::edges::ensure_frame;
use crate::error::LaneDetectionResult;
use crate::lanes::LanePair;

/// 검출된 차선을 빈 캔버스에 그린 뒤 원본 프레임과 가중 합성하는 단계.
///
/// 화면 표시는 하지 않습니다. 창에 띄우거나 파일로 쓰는 일은 `display` 모듈의 몫입니다.
#[derive(Debug, Clone)]
pub struct OverlayCompositor {
    config: OverlayConfig,
}

impl OverlayCompositor {
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    /// 그릴 차선이 없으면 원본 프레임의 복사본을 그대로 돌려줍니다.
    pub fn composite(&self, frame: &Mat, lanes: &LanePair) -> LaneDetectionResult<Mat> {
        ensure_frame(frame)?;
        if lanes.is_empty() {
            return Ok(frame.try_clone()?);
        }

        let canvas = self.draw_lines(frame, lanes)?;

        let mut blended = Mat::default();
        core::add_weighted(
            frame,
            self.config.frame_weight,
            &canvas,
            self.config.line_weight,
            self.config.gamma,
            &mut blended,
            -1,
        )?;
        Ok(blended)
    }

    /// 프레임과 같은 크기/타입의 검정 캔버스에 차선을 그립니다.
    pub fn draw_lines(&self, frame: &Mat, lanes: &LanePair) -> LaneDetectionResult<Mat> {
        let mut canvas = Mat::zeros(frame.rows(), frame.cols(), frame.typ())?.to_mat()?;
        let color = self.config.color_scalar();

        for line in lanes.iter() {
            imgproc::line(
                &mut canvas,
                Point::new(line.x1, line.y1),
                Point::new(line.x2, line.y2),
                color,
                self.config.thickness,
                imgproc::LINE_8,
                0,
            )?;
        }
        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::LaneLine;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    fn gray_frame() -> Mat {
        Mat::new_rows_cols_with_default(720, 1280, CV_8UC3, Scalar::all(100.0)).unwrap()
    }

    fn both_lanes() -> LanePair {
        LanePair {
            left: Some(LaneLine { x1: 300, y1: 720, x2: 500, y2: 432 }),
            right: Some(LaneLine { x1: 1000, y1: 720, x2: 750, y2: 432 }),
        }
    }

    #[test]
    fn no_lines_returns_frame_unchanged() {
        let compositor = OverlayCompositor::new(OverlayConfig::default());
        let frame = gray_frame();
        let out = compositor.composite(&frame, &LanePair::default()).unwrap();
        assert_eq!(out.data_bytes().unwrap(), frame.data_bytes().unwrap());
    }

    #[test]
    fn lines_are_blended_over_dimmed_frame() {
        let compositor = OverlayCompositor::new(OverlayConfig::default());
        let frame = gray_frame();
        let out = compositor.composite(&frame, &both_lanes()).unwrap();

        assert_eq!((out.cols(), out.rows()), (1280, 720));
        assert_eq!(out.typ(), frame.typ());

        // 선 위: B = 100*0.8 + 255 + 1 (포화), G/R = 100*0.8 + 1
        let on_line = *out.at_2d::<Vec3b>(576, 400).unwrap();
        assert_eq!(on_line[0], 255);
        assert_eq!(on_line[1], 81);
        assert_eq!(on_line[2], 81);

        // 선 밖: 0.8 가중치만 적용
        let background = *out.at_2d::<Vec3b>(50, 50).unwrap();
        assert_eq!(background[0], 81);
    }

    #[test]
    fn canvas_only_contains_drawn_lanes() {
        let compositor = OverlayCompositor::new(OverlayConfig::default());
        let frame = gray_frame();
        let lanes = LanePair {
            left: None,
            right: Some(LaneLine { x1: 1000, y1: 720, x2: 750, y2: 432 }),
        };
        let canvas = compositor.draw_lines(&frame, &lanes).unwrap();
        let off_line = *canvas.at_2d::<Vec3b>(576, 400).unwrap();
        assert_eq!((off_line[0], off_line[1], off_line[2]), (0, 0, 0));
        let on_line = *canvas.at_2d::<Vec3b>(576, 875).unwrap();
        assert_eq!((on_line[0], on_line[1], on_line[2]), (255, 0, 0));
    }

    #[test]
    fn empty_frame_is_rejected() {
        let compositor = OverlayCompositor::new(OverlayConfig::default());
        assert!(compositor.composite(&Mat::default(), &both_lanes()).is_err());
    }
}
