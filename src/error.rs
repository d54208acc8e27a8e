use std::path::PathBuf;

use thiserror::Error;

/// 파이프라인 함수들에서 공통으로 사용할 `Result` 타입 별칭입니다.
pub type LaneDetectionResult<T> = Result<T, LaneError>;

/// 차선 검출 라이브러리의 에러 분류.
///
/// - `InvalidFrame`: 비어 있거나 크기가 0인 프레임, 8비트 1/3채널이 아닌 프레임. 스트림 모드에서는 해당 프레임만 건너뜁니다.
/// - `DegenerateModel`: 기울기가 0에 가까워 외삽이 불가능한 모델. 그쪽 차선만 생략합니다.
/// - `FileNotFound` / `Decode` / `StreamOpen`: 시작 시점의 입력 오류로, 호출부에 즉시 전달됩니다.
/// - `WorkerPanic` / `IncompleteRun`: 병렬 처리 중 작업 스레드가 죽어 프레임이 유실된 경우.
#[derive(Debug, Error)]
pub enum LaneError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("degenerate linear model (slope = {slope})")]
    DegenerateModel { slope: f64 },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to decode image {}", path.display())]
    Decode { path: PathBuf },

    #[error("failed to open video source {source_name:?}")]
    StreamOpen { source_name: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("lane worker {worker_index} panicked")]
    WorkerPanic { worker_index: usize },

    #[error("{missing} frame(s) never came back from the worker pool")]
    IncompleteRun { missing: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

impl LaneError {
    pub(crate) fn invalid_frame(reason: impl Into<String>) -> Self {
        LaneError::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// 스트림 전체를 중단하지 않고 해당 프레임만 건너뛰어도 되는 에러인지 여부.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            LaneError::InvalidFrame { .. } | LaneError::DegenerateModel { .. }
        )
    }
}
