use tracing::debug;

use crate::config::ExtrapolationConfig;
use crate::error::{LaneDetectionResult, LaneError};

/// 허프 변환이 돌려준 선분 하나 (x1, y1, x2, y2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// 이미지 좌표계의 직선 `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearModel {
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    /// 선분의 두 끝점을 지나는 1차 최소제곱 직선.
    /// 수직 선분(x1 == x2)은 기울기를 정의할 수 없으므로 `None`.
    pub fn fit(segment: &LineSegment) -> Option<Self> {
        let xs = [segment.x1 as f64, segment.x2 as f64];
        let ys = [segment.y1 as f64, segment.y2 as f64];
        polyfit_1d(&xs, &ys).map(|[slope, intercept]| Self { slope, intercept })
    }

    /// 주어진 y에서의 x 좌표를 반올림해 돌려줍니다.
    ///
    /// 기울기의 절댓값이 `min_abs_slope` 이하이거나 결과가 `i32` 범위를 벗어나면
    /// `LaneError::DegenerateModel`.
    pub fn x_at(&self, y: f64, min_abs_slope: f64) -> LaneDetectionResult<i32> {
        if !self.slope.is_finite() || self.slope.abs() <= min_abs_slope {
            return Err(LaneError::DegenerateModel { slope: self.slope });
        }
        let x = ((y - self.intercept) / self.slope).round();
        if !x.is_finite() || x < i32::MIN as f64 || x > i32::MAX as f64 {
            return Err(LaneError::DegenerateModel { slope: self.slope });
        }
        Ok(x as i32)
    }

    /// 두 y 좌표에서의 끝점을 계산해 `LaneLine`으로 만듭니다.
    pub fn extrapolate(&self, y1: i32, y2: i32, min_abs_slope: f64) -> LaneDetectionResult<LaneLine> {
        let x1 = self.x_at(y1 as f64, min_abs_slope)?;
        let x2 = self.x_at(y2 as f64, min_abs_slope)?;
        Ok(LaneLine { x1, y1, x2, y2 })
    }

    /// 기울기와 절편을 각각 산술 평균 (가중치 없음). 빈 입력이면 `None`.
    pub fn average(models: &[LinearModel]) -> Option<Self> {
        if models.is_empty() {
            return None;
        }
        let n = models.len() as f64;
        let slope = models.iter().map(|m| m.slope).sum::<f64>() / n;
        let intercept = models.iter().map(|m| m.intercept).sum::<f64>() / n;
        Some(Self { slope, intercept })
    }
}

/// 화면에 그릴 차선 하나. 아래쪽 끝점 (x1, y1), 위쪽 끝점 (x2, y2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneLine {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// 한 프레임의 좌/우 차선. 해당 쪽으로 분류된 선분이 없으면 `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LanePair {
    pub left: Option<LaneLine>,
    pub right: Option<LaneLine>,
}

impl LanePair {
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LaneLine> {
        self.left.iter().chain(self.right.iter())
    }
}

/// 선분들을 기울기 부호로 좌/우로 나누고, 그룹별 평균 모델을 외삽하는 단계.
///
/// 이미지 y축은 아래로 증가하므로 왼쪽 차선(왼쪽 아래에서 오른쪽 위로 올라가는 선)은
/// 음의 기울기, 오른쪽 차선은 0 이상의 기울기를 가집니다.
#[derive(Debug, Clone)]
pub struct LaneAggregator {
    config: ExtrapolationConfig,
}

impl LaneAggregator {
    pub fn new(config: ExtrapolationConfig) -> Self {
        Self { config }
    }

    /// # 인자
    /// * `frame_height` - 프레임 세로 크기 (아래쪽 끝점의 y)
    /// * `segments` - 허프 변환 결과. 순서는 결과에 영향을 주지 않습니다.
    ///
    /// # 반환
    /// * 좌/우 `LaneLine`. 선분이 없거나 모델이 퇴화한 쪽은 `None`.
    pub fn aggregate(&self, frame_height: i32, segments: &[LineSegment]) -> LanePair {
        let (left_fit, right_fit) = classify(segments);

        let y1 = frame_height;
        let y2 = (frame_height as f64 * self.config.top_ratio).round() as i32;

        let left = self.side_line("left", &left_fit, y1, y2);
        let right = self.side_line("right", &right_fit, y1, y2);

        debug!(
            segments = segments.len(),
            left_models = left_fit.len(),
            right_models = right_fit.len(),
            ?left,
            ?right,
            "lane lines aggregated"
        );

        LanePair { left, right }
    }

    fn side_line(&self, side: &str, fits: &[LinearModel], y1: i32, y2: i32) -> Option<LaneLine> {
        let model = LinearModel::average(fits)?;
        match model.extrapolate(y1, y2, self.config.min_abs_slope) {
            Ok(line) => Some(line),
            Err(err) => {
                debug!(side, %err, "skipping lane side");
                None
            }
        }
    }
}

/// 선분마다 1차 직선을 맞추고 기울기 부호로 좌/우 그룹에 넣습니다.
fn classify(segments: &[LineSegment]) -> (Vec<LinearModel>, Vec<LinearModel>) {
    let mut left_fit = Vec::new();
    let mut right_fit = Vec::new();

    for segment in segments {
        let Some(model) = LinearModel::fit(segment) else {
            debug!(?segment, "vertical segment ignored");
            continue;
        };
        if model.slope < 0.0 {
            left_fit.push(model);
        } else {
            right_fit.push(model);
        }
    }

    (left_fit, right_fit)
}

/// (x, y) 데이터로부터 1차 다항식(직선: y = a*x + b)을 최소제곱법(OLS)으로 피팅하는 함수.
///
/// # 반환
/// * [a, b]: a=기울기, b=절편. (None: 점이 부족하거나 기울기 계산 불가능 시)
fn polyfit_1d(xs: &[f64], ys: &[f64]) -> Option<[f64; 2]> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }

    let n = xs.len() as f64;
    let sum_x = xs.iter().sum::<f64>();
    let sum_y = ys.iter().sum::<f64>();
    let sum_x2 = xs.iter().map(|&x| x * x).sum::<f64>();
    let sum_xy = xs
        .iter()
        .zip(ys.iter())
        .map(|(&x, &y)| x * y)
        .sum::<f64>();

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom.abs() < 1e-12 {
        return None;
    }

    let a = (n * sum_xy - sum_x * sum_y) / denom;
    let b = (sum_y - a * sum_x) / n;

    Some([a, b])
}
