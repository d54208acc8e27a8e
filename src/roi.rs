use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use opencv::{
    core::{self, Mat, Point, Scalar, Vector, CV_8UC1},
    imgproc,
    prelude::*,
};
use tracing::debug;

use crate::config::RoiConfig;
use crate::edges::EdgeMap;
use crate::error::LaneDetectionResult;

/// 삼각형 관심영역(ROI) 밖의 엣지를 지우는 단계.
///
/// 마스크는 해상도별로 한 번만 만들어 캐시하며, 한 번 생성된 뒤에는 읽기만 하므로
/// 여러 작업 스레드가 같은 `RegionMasker`를 공유해도 됩니다.
pub struct RegionMasker {
    config: RoiConfig,
    cache: Mutex<HashMap<(i32, i32), Mat>>,
}

impl RegionMasker {
    pub fn new(config: RoiConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// # 인자
    /// * `edges` - 엣지 영상
    ///
    /// # 반환
    /// * ROI 내부 엣지만 남은, 같은 크기의 `EdgeMap`
    pub fn mask(&self, edges: &EdgeMap) -> LaneDetectionResult<EdgeMap> {
        let mask = self.mask_for(edges.width(), edges.height())?;

        // mask와 bitwise_and를 하여 ROI 내부만 살림
        let mut masked = Mat::default();
        core::bitwise_and(edges.as_mat(), &mask, &mut masked, &Mat::default())?;
        EdgeMap::from_mat(masked)
    }

    /// 해당 해상도의 ROI 마스크 사본을 돌려줍니다. 없으면 새로 만들어 캐시에 넣습니다.
    pub fn mask_for(&self, width: i32, height: i32) -> LaneDetectionResult<Mat> {
        let mut cache = self.lock_cache();

        if let Some(mask) = cache.get(&(width, height)) {
            return Ok(mask.try_clone()?);
        }

        let mask = self.build_mask(width, height)?;
        let copy = mask.try_clone()?;
        cache.insert((width, height), mask);
        Ok(copy)
    }

    /// 캐시된 해상도 개수
    pub fn cached_resolutions(&self) -> usize {
        self.lock_cache().len()
    }

    /// 캐시는 완성된 마스크를 추가하기만 하므로, 다른 스레드가 패닉해도 내용은 유효합니다.
    fn lock_cache(&self) -> MutexGuard<'_, HashMap<(i32, i32), Mat>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_mask(&self, width: i32, height: i32) -> LaneDetectionResult<Mat> {
        let vertices = self.config.vertices(width, height);
        debug!(width, height, ?vertices, "building roi mask");

        // 영상과 동일한 크기의 검정색 마스크 생성
        let mut mask = Mat::zeros(height, width, CV_8UC1)?.to_mat()?;

        let mut polygon: Vector<Point> = Vector::new();
        for vertex in vertices {
            polygon.push(vertex);
        }
        let mut polygons: Vector<Vector<Point>> = Vector::new();
        polygons.push(polygon);

        // 마스크에 흰색으로 삼각형 영역을 채움
        imgproc::fill_poly(
            &mut mask,
            &polygons,
            Scalar::all(255.0),
            imgproc::LINE_8,
            0,
            Point::new(0, 0),
        )?;
        Ok(mask)
    }
}
