//! 도로 영상에서 좌/우 차선 경계를 찾아 원본 프레임 위에 겹쳐 그리는 라이브러리.
//!
//! 프레임마다 독립적으로 다음 단계를 순서대로 수행합니다.
//!
//! 1. [`EdgeExtractor`] - 그레이 변환, 가우시안 블러, 캐니 엣지
//! 2. [`RegionMasker`] - 삼각형 관심영역 밖의 엣지 제거
//! 3. [`LineSegmentDetector`] - 확률적 허프 변환으로 선분 검출
//! 4. [`LaneAggregator`] - 기울기 부호로 좌/우 분류, 평균 모델 외삽
//! 5. [`OverlayCompositor`] - 차선을 그려 원본과 가중 합성
//!
//! 프레임 사이에 이어지는 상태(추적, 평활화)는 없습니다.

pub mod config;
pub mod display;
pub mod edges;
pub mod error;
pub mod hough;
pub mod lanes;
pub mod overlay;
pub mod pipeline;
pub mod roi;
pub mod runner;
pub mod source;

pub use config::LaneConfig;
pub use edges::{EdgeExtractor, EdgeMap};
pub use error::{LaneDetectionResult, LaneError};
pub use hough::LineSegmentDetector;
pub use lanes::{LaneAggregator, LaneLine, LanePair, LineSegment, LinearModel};
pub use overlay::OverlayCompositor;
pub use pipeline::{FrameOutput, LanePipeline};
pub use roi::RegionMasker;
pub use runner::{RunStats, Runner};
