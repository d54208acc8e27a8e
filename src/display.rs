use std::path::{Path, PathBuf};

use opencv::{
    core::{Mat, Size, Vector},
    highgui, imgcodecs,
    prelude::*,
    videoio::VideoWriter,
};
use tracing::info;

use crate::error::{LaneDetectionResult, LaneError};

/// 'q' 키 (ASCII)
pub const QUIT_KEY: i32 = 113;

/// 프레임을 출력한 뒤 루프를 계속할지 여부
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Quit,
}

/// 합성된 프레임을 받아 화면이나 파일로 내보내는 쪽.
///
/// 프레임은 항상 `index` 오름차순으로 전달됩니다.
pub trait FrameSink {
    fn present(&mut self, index: u64, frame: &Mat) -> LaneDetectionResult<SinkControl>;

    fn finish(&mut self) -> LaneDetectionResult<()> {
        Ok(())
    }
}

/// 아무것도 하지 않는 출력 (헤드리스 실행용)
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&mut self, _index: u64, _frame: &Mat) -> LaneDetectionResult<SinkControl> {
        Ok(SinkControl::Continue)
    }
}

/// HighGUI 창에 결과를 띄웁니다.
///
/// 동영상 모드에서는 `wait_key(1)`로 'q' 입력을 확인하고,
/// 스틸 이미지 모드에서는 아무 키나 누를 때까지 기다립니다.
pub struct WindowSink {
    name: String,
    delay_ms: i32,
}

impl WindowSink {
    pub fn new(name: &str, still: bool) -> LaneDetectionResult<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_string(),
            delay_ms: if still { 0 } else { 1 },
        })
    }
}

impl FrameSink for WindowSink {
    fn present(&mut self, _index: u64, frame: &Mat) -> LaneDetectionResult<SinkControl> {
        highgui::imshow(&self.name, frame)?;
        let key = highgui::wait_key(self.delay_ms)?;
        if key == QUIT_KEY {
            return Ok(SinkControl::Quit);
        }
        Ok(SinkControl::Continue)
    }

    fn finish(&mut self) -> LaneDetectionResult<()> {
        highgui::destroy_all_windows()?;
        Ok(())
    }
}

/// 결과를 파일로 저장하는 출력 (배치/오프라인 모드).
///
/// 스틸 이미지는 `imwrite`로 한 장, 동영상은 첫 프레임 크기로 `VideoWriter`를 만들어 기록합니다.
pub struct WriterSink {
    path: PathBuf,
    mode: WriterMode,
    written: u64,
}

enum WriterMode {
    Image,
    Video { fps: f64, writer: Option<VideoWriter> },
}

impl WriterSink {
    pub fn image(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            mode: WriterMode::Image,
            written: 0,
        }
    }

    pub fn video(path: &Path, fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        Self {
            path: path.to_path_buf(),
            mode: WriterMode::Video { fps, writer: None },
            written: 0,
        }
    }

    fn path_str(&self) -> LaneDetectionResult<&str> {
        self.path.to_str().ok_or_else(|| {
            LaneError::Config(format!("output path is not valid UTF-8: {}", self.path.display()))
        })
    }
}

impl FrameSink for WriterSink {
    fn present(&mut self, _index: u64, frame: &Mat) -> LaneDetectionResult<SinkControl> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let path = self.path_str()?.to_string();

        match &mut self.mode {
            WriterMode::Image => {
                imgcodecs::imwrite(&path, frame, &Vector::new())?;
            }
            WriterMode::Video { fps, writer } => {
                if writer.is_none() {
                    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
                    let size = Size::new(frame.cols(), frame.rows());
                    info!(output = %path, width = size.width, height = size.height, "opening video writer");
                    let opened = VideoWriter::new(&path, fourcc, *fps, size, frame.channels() == 3)?;
                    if !opened.is_opened()? {
                        return Err(LaneError::StreamOpen { source_name: path });
                    }
                    *writer = Some(opened);
                }
                if let Some(writer) = writer.as_mut() {
                    writer.write(frame)?;
                }
            }
        }

        self.written += 1;
        Ok(SinkControl::Continue)
    }

    fn finish(&mut self) -> LaneDetectionResult<()> {
        if let WriterMode::Video {
            writer: Some(writer),
            ..
        } = &mut self.mode
        {
            writer.release()?;
        }
        info!(output = %self.path.display(), frames = self.written, "output written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn image_writer_round_trips_dimensions() {
        let path = std::env::temp_dir().join("lane_lines_writer_test.png");
        let frame = Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(7.0)).unwrap();

        let mut sink = WriterSink::image(&path);
        assert_eq!(sink.present(0, &frame).unwrap(), SinkControl::Continue);
        sink.finish().unwrap();

        let read = crate::source::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!((read.cols(), read.rows()), (64, 48));
    }

    #[test]
    fn null_sink_never_quits() {
        let frame = Mat::default();
        assert_eq!(NullSink.present(3, &frame).unwrap(), SinkControl::Continue);
    }
}
