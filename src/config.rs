use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use opencv::core::{Point, Scalar};
use serde::{Deserialize, Serialize};

use crate::error::{LaneDetectionResult, LaneError};

/// 파이프라인 전 단계에서 사용하는 설정 묶음.
///
/// 기본값은 기준 해상도(1280x720) 영상에 맞춰 튜닝된 상수들입니다.
/// 프로세스 전역 상태가 아니라 각 단계에 명시적으로 전달되므로,
/// 해상도가 다른 여러 스트림을 동시에 처리해도 서로 간섭하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub edge: EdgeConfig,
    pub roi: RoiConfig,
    pub hough: HoughConfig,
    pub extrapolation: ExtrapolationConfig,
    pub overlay: OverlayConfig,
}

/// 가우시안 블러 + 캐니 엣지 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub blur_kernel_size: i32,
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub aperture_size: i32,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            low_threshold: 50.0,
            high_threshold: 150.0,
            aperture_size: 3,
        }
    }
}

/// ROI 꼭짓점을 프레임 크기에 맞추는 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiScaling {
    /// 설정된 좌표를 그대로 사용 (아래쪽 두 꼭짓점만 프레임 높이에 고정)
    Fixed,
    /// 기준 해상도 대비 비율로 x, y를 확대/축소
    Proportional,
}

/// 삼각형 관심영역(ROI) 설정.
///
/// 왼쪽/오른쪽 아래 꼭짓점의 y는 항상 프레임 높이이고,
/// x 좌표와 꼭짓점(apex)은 `reference_width` x `reference_height` 기준 좌표입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub reference_width: i32,
    pub reference_height: i32,
    pub left_bottom_x: i32,
    pub right_bottom_x: i32,
    pub apex: (i32, i32),
    pub scaling: RoiScaling,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            reference_width: 1280,
            reference_height: 720,
            left_bottom_x: 200,
            right_bottom_x: 1100,
            apex: (550, 250),
            scaling: RoiScaling::Proportional,
        }
    }
}

impl RoiConfig {
    /// 주어진 프레임 크기에 대한 삼각형 꼭짓점(좌하, 우하, 꼭짓점)을 계산합니다.
    pub fn vertices(&self, width: i32, height: i32) -> [Point; 3] {
        let (sx, sy) = match self.scaling {
            RoiScaling::Fixed => (1.0, 1.0),
            RoiScaling::Proportional => (
                width as f64 / self.reference_width as f64,
                height as f64 / self.reference_height as f64,
            ),
        };
        let scale_x = |x: i32| (x as f64 * sx).round() as i32;

        [
            Point::new(scale_x(self.left_bottom_x), height),
            Point::new(scale_x(self.right_bottom_x), height),
            Point::new(scale_x(self.apex.0), (self.apex.1 as f64 * sy).round() as i32),
        ]
    }
}

/// 확률적 허프 변환 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughConfig {
    pub rho: f64,
    pub theta: f64,
    pub threshold: i32,
    pub min_line_length: f64,
    pub max_line_gap: f64,
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            rho: 2.0,
            theta: PI / 180.0,
            threshold: 100,
            min_line_length: 40.0,
            max_line_gap: 5.0,
        }
    }
}

/// 평균 모델을 화면 좌표로 외삽할 때 사용하는 값.
///
/// 아래쪽 끝점은 프레임 하단(`y = height`), 위쪽 끝점은 `height * top_ratio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtrapolationConfig {
    pub top_ratio: f64,
    pub min_abs_slope: f64,
}

impl Default for ExtrapolationConfig {
    fn default() -> Self {
        Self {
            top_ratio: 0.6,
            min_abs_slope: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// BGR 순서
    pub color: [u8; 3],
    pub thickness: i32,
    pub frame_weight: f64,
    pub line_weight: f64,
    pub gamma: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            color: [255, 0, 0],
            thickness: 10,
            frame_weight: 0.8,
            line_weight: 1.0,
            gamma: 1.0,
        }
    }
}

impl OverlayConfig {
    pub fn color_scalar(&self) -> Scalar {
        let [b, g, r] = self.color;
        Scalar::new(b as f64, g as f64, r as f64, 0.0)
    }
}

impl LaneConfig {
    /// YAML 파일에서 설정을 읽고 검증합니다. 파일에 없는 항목은 기본값을 사용합니다.
    pub fn load(path: &Path) -> LaneDetectionResult<Self> {
        if !path.exists() {
            return Err(LaneError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&contents).map_err(|err| match err {
            LaneError::ConfigParse { source, .. } => LaneError::ConfigParse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> LaneDetectionResult<Self> {
        let config: LaneConfig =
            serde_yaml::from_str(contents).map_err(|source| LaneError::ConfigParse {
                path: "<inline>".into(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// 각 단계가 OpenCV에 넘기기 전에 반드시 만족해야 하는 조건을 확인합니다.
    pub fn validate(&self) -> LaneDetectionResult<()> {
        let edge = &self.edge;
        if edge.blur_kernel_size <= 0 || edge.blur_kernel_size % 2 == 0 {
            return Err(LaneError::Config(format!(
                "edge.blur_kernel_size must be a positive odd number, got {}",
                edge.blur_kernel_size
            )));
        }
        if !(edge.low_threshold >= 0.0 && edge.low_threshold <= edge.high_threshold) {
            return Err(LaneError::Config(format!(
                "edge thresholds must satisfy 0 <= low <= high, got low={} high={}",
                edge.low_threshold, edge.high_threshold
            )));
        }
        if !matches!(edge.aperture_size, 3 | 5 | 7) {
            return Err(LaneError::Config(format!(
                "edge.aperture_size must be 3, 5 or 7, got {}",
                edge.aperture_size
            )));
        }

        let roi = &self.roi;
        if roi.reference_width <= 0 || roi.reference_height <= 0 {
            return Err(LaneError::Config(
                "roi reference resolution must be positive".into(),
            ));
        }
        if roi.left_bottom_x >= roi.right_bottom_x {
            return Err(LaneError::Config(format!(
                "roi.left_bottom_x ({}) must be left of roi.right_bottom_x ({})",
                roi.left_bottom_x, roi.right_bottom_x
            )));
        }

        let hough = &self.hough;
        if hough.rho <= 0.0 || hough.theta <= 0.0 {
            return Err(LaneError::Config(
                "hough.rho and hough.theta must be positive".into(),
            ));
        }
        if hough.threshold <= 0 || hough.min_line_length < 0.0 || hough.max_line_gap < 0.0 {
            return Err(LaneError::Config(
                "hough threshold must be positive and segment lengths non-negative".into(),
            ));
        }

        let ext = &self.extrapolation;
        if !(ext.top_ratio > 0.0 && ext.top_ratio < 1.0) {
            return Err(LaneError::Config(format!(
                "extrapolation.top_ratio must lie in (0, 1), got {}",
                ext.top_ratio
            )));
        }
        if ext.min_abs_slope < 0.0 {
            return Err(LaneError::Config(
                "extrapolation.min_abs_slope must be non-negative".into(),
            ));
        }

        if self.overlay.thickness <= 0 {
            return Err(LaneError::Config(format!(
                "overlay.thickness must be positive, got {}",
                self.overlay.thickness
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let config = LaneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.edge.blur_kernel_size, 5);
        assert_eq!(config.hough.threshold, 100);
        assert_eq!(config.overlay.thickness, 10);
        assert!((config.hough.theta - PI / 180.0).abs() < 1e-12);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let config = LaneConfig::from_yaml_str(
            "hough:\n  threshold: 60\noverlay:\n  color: [0, 0, 255]\n",
        )
        .unwrap();
        assert_eq!(config.hough.threshold, 60);
        assert_eq!(config.hough.min_line_length, 40.0);
        assert_eq!(config.overlay.color, [0, 0, 255]);
        assert_eq!(config.edge, EdgeConfig::default());
    }

    #[test]
    fn even_kernel_is_rejected() {
        let mut config = LaneConfig::default();
        config.edge.blur_kernel_size = 4;
        assert!(matches!(config.validate(), Err(LaneError::Config(_))));
    }

    #[test]
    fn top_ratio_out_of_range_is_rejected() {
        let err = LaneConfig::from_yaml_str("extrapolation:\n  top_ratio: 1.5\n").unwrap_err();
        assert!(matches!(err, LaneError::Config(_)));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = LaneConfig::from_yaml_str("hough: [1, 2").unwrap_err();
        assert!(matches!(err, LaneError::ConfigParse { .. }));
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.yaml");
        let config = LaneConfig::load(&path).unwrap();
        assert_eq!(config, LaneConfig::default());
    }

    #[test]
    fn missing_file_reports_not_found() {
        let err = LaneConfig::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, LaneError::FileNotFound { .. }));
    }

    #[test]
    fn roi_vertices_at_reference_resolution_are_unscaled() {
        let roi = RoiConfig::default();
        let v = roi.vertices(1280, 720);
        assert_eq!(v[0], Point::new(200, 720));
        assert_eq!(v[1], Point::new(1100, 720));
        assert_eq!(v[2], Point::new(550, 250));
    }

    #[test]
    fn roi_vertices_scale_proportionally() {
        let roi = RoiConfig::default();
        let v = roi.vertices(640, 360);
        assert_eq!(v[0], Point::new(100, 360));
        assert_eq!(v[1], Point::new(550, 360));
        assert_eq!(v[2], Point::new(275, 125));
    }

    #[test]
    fn fixed_roi_keeps_coordinates_but_tracks_height() {
        let roi = RoiConfig {
            scaling: RoiScaling::Fixed,
            ..RoiConfig::default()
        };
        let v = roi.vertices(1920, 1080);
        assert_eq!(v[0], Point::new(200, 1080));
        assert_eq!(v[2], Point::new(550, 250));
    }
}
