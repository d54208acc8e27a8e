//! 프레임 공급원 → 파이프라인 → 출력으로 이어지는 구동 루프.
//!
//! 기본은 한 프레임씩 순차 처리이고, `workers > 1`이면 작업 스레드 풀에서
//! 프레임을 병렬로 처리한 뒤 프레임 번호 순서대로 출력에 넘깁니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use opencv::core::Mat;
use tracing::{debug, error, info, warn};

use crate::display::{FrameSink, SinkControl};
use crate::error::{LaneDetectionResult, LaneError};
use crate::pipeline::{FrameOutput, LanePipeline};
use crate::source::FrameSource;

/// 한 번의 실행 통계
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub frames_with_left: u64,
    pub frames_with_right: u64,
    pub quit_requested: bool,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.frames_processed as f64 / secs
    }

    fn record(&mut self, output: &FrameOutput) {
        self.frames_processed += 1;
        if output.lanes.left.is_some() {
            self.frames_with_left += 1;
        }
        if output.lanes.right.is_some() {
            self.frames_with_right += 1;
        }
    }
}

struct FrameJob {
    index: u64,
    frame: Mat,
}

struct FrameDone {
    index: u64,
    result: LaneDetectionResult<FrameOutput>,
}

pub struct Runner {
    pipeline: Arc<LanePipeline>,
    workers: usize,
}

impl Runner {
    pub fn new(pipeline: LanePipeline, workers: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            workers: workers.max(1),
        }
    }

    /// 공급원이 끝나거나 출력 쪽에서 종료를 요청할 때까지 실행합니다.
    ///
    /// 잘못된 프레임은 경고 로그를 남기고 건너뛰며, 그 외의 에러는 즉시 돌려줍니다.
    /// 어느 경우든 공급원의 `release`와 출력의 `finish`는 호출됩니다.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> LaneDetectionResult<RunStats> {
        let start_time = Instant::now();
        let outcome = if self.workers == 1 {
            self.run_sequential(source, sink)
        } else {
            self.run_parallel(source, sink)
        };

        let released = source.release();
        let finished = sink.finish();

        let mut stats = outcome?;
        released?;
        finished?;

        stats.elapsed = start_time.elapsed();
        info!(
            read = stats.frames_read,
            processed = stats.frames_processed,
            skipped = stats.frames_skipped,
            left = stats.frames_with_left,
            right = stats.frames_with_right,
            fps = %format!("{:.2}", stats.fps()),
            "run finished"
        );
        Ok(stats)
    }

    fn run_sequential(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> LaneDetectionResult<RunStats> {
        let mut stats = RunStats::default();
        let mut index = 0u64;

        while let Some(frame) = source.next_frame()? {
            stats.frames_read += 1;
            let result = self.pipeline.process(&frame);
            if handle_result(index, result, sink, &mut stats)? == SinkControl::Quit {
                stats.quit_requested = true;
                break;
            }
            index += 1;
        }
        Ok(stats)
    }

    fn run_parallel(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> LaneDetectionResult<RunStats> {
        let (job_tx, job_rx) = bounded::<FrameJob>(self.workers * 2);
        let (done_tx, done_rx) = unbounded::<FrameDone>();

        let handles: Vec<_> = (0..self.workers)
            .map(|worker_index| {
                spawn_worker(
                    worker_index,
                    Arc::clone(&self.pipeline),
                    job_rx.clone(),
                    done_tx.clone(),
                )
            })
            .collect();
        drop(job_rx);
        drop(done_tx);

        let mut reorder = Reorder::default();
        let mut stats = RunStats::default();
        let outcome = feed_workers(source, sink, &job_tx, &done_rx, &mut reorder, &mut stats);

        // 작업 큐를 닫고 남은 결과를 순서대로 정리
        drop(job_tx);
        let drained = if outcome.is_ok() && !stats.quit_requested {
            drain_remaining(&done_rx, &mut reorder, sink, &mut stats)
        } else {
            Ok(())
        };
        drop(done_rx);
        let joined = join_workers(handles);

        outcome?;
        drained?;
        joined?;
        if !stats.quit_requested {
            reorder.ensure_complete(stats.frames_read)?;
        }
        Ok(stats)
    }
}

fn drain_remaining(
    done_rx: &Receiver<FrameDone>,
    reorder: &mut Reorder,
    sink: &mut dyn FrameSink,
    stats: &mut RunStats,
) -> LaneDetectionResult<()> {
    for done in done_rx.iter() {
        reorder.insert(done);
        if reorder.drain(sink, stats)? == SinkControl::Quit {
            break;
        }
    }
    Ok(())
}

/// 모든 작업 스레드를 기다립니다. 패닉한 스레드가 있으면 첫 번째 것을 에러로 돌려줍니다.
fn join_workers(handles: Vec<thread::JoinHandle<()>>) -> LaneDetectionResult<()> {
    let mut result = Ok(());
    for (worker_index, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            error!(worker_index, "lane worker panicked");
            if result.is_ok() {
                result = Err(LaneError::WorkerPanic { worker_index });
            }
        }
    }
    result
}

/// 공급원이 끝날 때까지 프레임을 작업 큐에 넣고, 그 사이 도착한 결과를 순서대로 내보냅니다.
fn feed_workers(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    job_tx: &Sender<FrameJob>,
    done_rx: &Receiver<FrameDone>,
    reorder: &mut Reorder,
    stats: &mut RunStats,
) -> LaneDetectionResult<()> {
    let mut next_index = 0u64;
    while let Some(frame) = source.next_frame()? {
        stats.frames_read += 1;
        let job = FrameJob {
            index: next_index,
            frame,
        };
        next_index += 1;
        if job_tx.send(job).is_err() {
            break;
        }

        while let Ok(done) = done_rx.try_recv() {
            reorder.insert(done);
        }
        if reorder.drain(sink, stats)? == SinkControl::Quit {
            break;
        }
    }
    Ok(())
}

fn spawn_worker(
    worker_index: usize,
    pipeline: Arc<LanePipeline>,
    job_rx: Receiver<FrameJob>,
    done_tx: Sender<FrameDone>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        debug!(worker_index, "lane worker started");
        for job in job_rx.iter() {
            let result = pipeline.process(&job.frame);
            if done_tx
                .send(FrameDone {
                    index: job.index,
                    result,
                })
                .is_err()
            {
                break;
            }
        }
        debug!(worker_index, "lane worker stopped");
    })
}

/// 작업 스레드가 순서 없이 돌려준 결과를 프레임 번호 순으로 내보내는 버퍼
#[derive(Default)]
struct Reorder {
    pending: BTreeMap<u64, LaneDetectionResult<FrameOutput>>,
    next: u64,
}

impl Reorder {
    fn insert(&mut self, done: FrameDone) {
        self.pending.insert(done.index, done.result);
    }

    fn drain(
        &mut self,
        sink: &mut dyn FrameSink,
        stats: &mut RunStats,
    ) -> LaneDetectionResult<SinkControl> {
        while let Some(result) = self.pending.remove(&self.next) {
            let index = self.next;
            self.next += 1;
            if handle_result(index, result, sink, stats)? == SinkControl::Quit {
                stats.quit_requested = true;
                return Ok(SinkControl::Quit);
            }
        }
        Ok(SinkControl::Continue)
    }

    /// 읽은 프레임이 모두 출력까지 도달했는지 확인합니다.
    fn ensure_complete(&self, frames_read: u64) -> LaneDetectionResult<()> {
        if self.next < frames_read {
            let missing = frames_read - self.next;
            warn!(
                next = self.next,
                pending = self.pending.len(),
                missing,
                "worker pool lost frames"
            );
            return Err(LaneError::IncompleteRun { missing });
        }
        Ok(())
    }
}

/// 처리 결과 하나를 통계에 반영하고 출력으로 넘깁니다.
/// 프레임 단위 에러는 건너뛰고, 나머지는 호출부로 전달합니다.
fn handle_result(
    index: u64,
    result: LaneDetectionResult<FrameOutput>,
    sink: &mut dyn FrameSink,
    stats: &mut RunStats,
) -> LaneDetectionResult<SinkControl> {
    match result {
        Ok(output) => {
            stats.record(&output);
            sink.present(index, &output.overlay)
        }
        Err(err) if err.is_frame_local() => {
            warn!(frame = index, %err, "skipping frame");
            stats.frames_skipped += 1;
            Ok(SinkControl::Continue)
        }
        Err(err) => Err(err),
    }
}
