use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use lane_lines::display::{FrameSink, NullSink, WindowSink, WriterSink};
use lane_lines::source::{FrameSource, ImageSource, VideoStream};
use lane_lines::{LaneConfig, LanePipeline, Runner};

const WINDOW_NAME: &str = "result";

#[derive(Parser, Debug)]
#[command(name = "lane_lines")]
#[command(about = "Detect lane boundary lines and overlay them on road images or video")]
struct Cli {
    /// YAML 설정 파일. 없으면 기본 상수를 사용합니다.
    #[arg(long)]
    config: Option<PathBuf>,

    /// 프레임을 병렬로 처리할 작업 스레드 수
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// 결과를 창에 띄우지 않고 파일로 저장
    #[arg(long)]
    output: Option<PathBuf>,

    /// 창도 파일도 없이 처리만 수행
    #[arg(long)]
    headless: bool,

    #[command(subcommand)]
    input: Input,
}

#[derive(Subcommand, Debug)]
enum Input {
    /// 이미지 한 장
    Image { path: PathBuf },
    /// 동영상 파일
    Video { path: PathBuf },
    /// 카메라 장치
    Camera {
        #[arg(long, default_value_t = 0)]
        index: i32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lane_lines=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LaneConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LaneConfig::default(),
    };
    let pipeline = LanePipeline::new(config).context("building lane pipeline")?;

    let mut source: Box<dyn FrameSource> = match &cli.input {
        Input::Image { path } => Box::new(ImageSource::open(path).context("opening image")?),
        Input::Video { path } => Box::new(VideoStream::open(path).context("opening video")?),
        Input::Camera { index } => {
            Box::new(VideoStream::camera(*index).context("opening camera")?)
        }
    };

    let mut sink: Box<dyn FrameSink> = if cli.headless {
        Box::new(NullSink)
    } else if let Some(output) = &cli.output {
        if source.is_still() {
            Box::new(WriterSink::image(output))
        } else {
            Box::new(WriterSink::video(output, source.fps()))
        }
    } else {
        Box::new(WindowSink::new(WINDOW_NAME, source.is_still()).context("opening window")?)
    };

    info!(workers = cli.workers, "lane detection starting");
    let runner = Runner::new(pipeline, cli.workers);
    let stats = runner.run(source.as_mut(), sink.as_mut())?;

    info!(
        frames = stats.frames_processed,
        skipped = stats.frames_skipped,
        fps = %format!("{:.2}", stats.fps()),
        "done"
    );
    Ok(())
}
