use std::path::Path;

use opencv::{
    core::Mat,
    imgcodecs,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{info, warn};

use crate::error::{LaneDetectionResult, LaneError};

/// 파이프라인을 구동하는 풀(pull) 방식 프레임 공급원.
///
/// `next_frame`이 `Ok(None)`을 돌려주면 스트림의 끝입니다.
pub trait FrameSource {
    fn next_frame(&mut self) -> LaneDetectionResult<Option<Mat>>;

    fn release(&mut self) -> LaneDetectionResult<()> {
        Ok(())
    }

    /// 스틸 이미지처럼 프레임이 하나뿐인 공급원인지 여부
    fn is_still(&self) -> bool {
        false
    }

    /// 알 수 없으면 0
    fn fps(&self) -> f64 {
        0.0
    }
}

/// 이미지 파일을 읽어 BGR 프레임으로 돌려줍니다.
///
/// # 에러
/// * 파일이 없으면 `FileNotFound`, 디코딩에 실패하면 `Decode`
pub fn load(path: &Path) -> LaneDetectionResult<Mat> {
    if !path.exists() {
        return Err(LaneError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let path_str = path.to_str().ok_or_else(|| LaneError::Decode {
        path: path.to_path_buf(),
    })?;

    let image = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
    if image.empty() {
        return Err(LaneError::Decode {
            path: path.to_path_buf(),
        });
    }
    info!(
        path = %path.display(),
        width = image.cols(),
        height = image.rows(),
        "image loaded"
    );
    Ok(image)
}

/// 한 장의 이미지를 한 번만 내보내는 공급원
pub struct ImageSource {
    frame: Option<Mat>,
}

impl ImageSource {
    pub fn open(path: &Path) -> LaneDetectionResult<Self> {
        Ok(Self::from_mat(load(path)?))
    }

    pub fn from_mat(frame: Mat) -> Self {
        Self { frame: Some(frame) }
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> LaneDetectionResult<Option<Mat>> {
        Ok(self.frame.take())
    }

    fn is_still(&self) -> bool {
        true
    }
}

/// 동영상 파일 또는 카메라 장치에서 프레임을 읽는 공급원
pub struct VideoStream {
    cap: VideoCapture,
    name: String,
    fps: f64,
    frames_read: u64,
}

impl VideoStream {
    /// 동영상 파일을 엽니다. 열 수 없으면 `StreamOpen`.
    pub fn open(path: &Path) -> LaneDetectionResult<Self> {
        if !path.exists() {
            return Err(LaneError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let name = path.display().to_string();
        let cap = VideoCapture::from_file(&name, videoio::CAP_ANY)?;
        Self::from_capture(cap, name)
    }

    /// 카메라 장치(웹캠)를 엽니다.
    pub fn camera(index: i32) -> LaneDetectionResult<Self> {
        let cap = VideoCapture::new(index, videoio::CAP_ANY)?;
        Self::from_capture(cap, format!("camera:{index}"))
    }

    fn from_capture(cap: VideoCapture, name: String) -> LaneDetectionResult<Self> {
        if !cap.is_opened()? {
            return Err(LaneError::StreamOpen { source_name: name });
        }

        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        info!(source = %name, width, height, fps, "video source opened");

        Ok(Self {
            cap,
            name,
            fps,
            frames_read: 0,
        })
    }
}

impl FrameSource for VideoStream {
    fn next_frame(&mut self) -> LaneDetectionResult<Option<Mat>> {
        let mut frame = Mat::default();
        match self.cap.read(&mut frame) {
            Ok(true) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            // 더 이상 프레임이 없음
            Ok(false) => Ok(None),
            // 손상된 컨테이너 등은 정상 종료와 구분해 호출부로 전달
            Err(err) => {
                warn!(source = %self.name, frames = self.frames_read, %err, "failed to read frame");
                Err(err.into())
            }
        }
    }

    fn release(&mut self) -> LaneDetectionResult<()> {
        self.cap.release()?;
        info!(source = %self.name, frames = self.frames_read, "video source released");
        Ok(())
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn image_source_yields_exactly_one_frame() {
        let frame = Mat::new_rows_cols_with_default(10, 20, CV_8UC3, Scalar::all(0.0)).unwrap();
        let mut source = ImageSource::from_mat(frame);
        assert!(source.is_still());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_image_is_not_found() {
        let err = load(Path::new("/no/such/road.jpg")).unwrap_err();
        assert!(matches!(err, LaneError::FileNotFound { .. }));
    }

    #[test]
    fn undecodable_image_is_a_decode_error() {
        let path = std::env::temp_dir().join("lane_lines_not_an_image.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        let err = load(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, LaneError::Decode { .. }));
    }

    #[test]
    fn missing_video_is_not_found() {
        let err = VideoStream::open(Path::new("/no/such/clip.mp4")).err().unwrap();
        assert!(matches!(err, LaneError::FileNotFound { .. }));
    }
}
