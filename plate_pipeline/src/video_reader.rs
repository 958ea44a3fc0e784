use std::path::{Path, PathBuf};

use opencv::core::Size;
use opencv::imgproc::resize;
use opencv::imgproc::INTER_LINEAR;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::VideoCaptureTrait;
use opencv::prelude::VideoCaptureTraitConst;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;
use rusted_pipe::channels::typed_write_channel::WriteChannel1;
use rusted_pipe::graph::processor::ProcessorWriter;
use rusted_pipe::graph::processor::SourceProcessor;
use rusted_pipe::DataVersion;
use rusted_pipe::RustedPipeError;
use tracing::{debug, error, info, warn};

use crate::utils::FpsLimiter;

/// Frames are scaled to this size before entering the graph.
pub const FRAME_SIZE: Size = Size {
    width: 640,
    height: 480,
};

fn open_video(path: &Path) -> anyhow::Result<VideoCapture> {
    let capture = VideoCapture::from_file(&path.to_string_lossy(), CAP_ANY)?;
    if !capture.is_opened()? {
        anyhow::bail!("cannot open video {}", path.display());
    }
    Ok(capture)
}

/// Source node decoding a video file at a fixed rate, optionally looping.
pub struct VideoReader {
    path: PathBuf,
    capture: VideoCapture,
    fps_limiter: FpsLimiter,
    do_loop: bool,
    frames: u64,
}

impl VideoReader {
    pub fn from_file(path: &Path, fps: usize, do_loop: bool) -> anyhow::Result<Self> {
        let capture = open_video(path)?;
        info!("reading {} at {fps} fps (loop: {do_loop})", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            capture,
            fps_limiter: FpsLimiter::new(fps),
            do_loop,
            frames: 0,
        })
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<Mat>> {
        let mut image = Mat::default();
        let grabbed = self.capture.read(&mut image)?;

        if !grabbed || image.empty() {
            if !self.do_loop {
                return Ok(None);
            }
            debug!("rewinding {}", self.path.display());
            self.capture = open_video(&self.path)?;
            if !self.capture.read(&mut image)? || image.empty() {
                warn!("{} has no frames", self.path.display());
                return Ok(None);
            }
        }

        let mut image_resized = Mat::default();
        resize(&image, &mut image_resized, FRAME_SIZE, 0.0, 0.0, INTER_LINEAR)?;
        Ok(Some(image_resized))
    }
}

impl SourceProcessor for VideoReader {
    type OUTPUT = WriteChannel1<Mat>;
    fn handle(&mut self, mut output: ProcessorWriter<Self::OUTPUT>) -> Result<(), RustedPipeError> {
        let image = match self.next_frame() {
            Ok(Some(image)) => image,
            Ok(None) => {
                info!("end of {} after {} frames", self.path.display(), self.frames);
                return Err(RustedPipeError::EndOfStream());
            }
            Err(e) => {
                error!("failed to decode {}: {e:#}", self.path.display());
                return Err(RustedPipeError::EndOfStream());
            }
        };

        let frame_ts = DataVersion::from_now();
        debug!("frame {} at {}", self.frames, frame_ts.timestamp_ns);
        if output.writer.c1().write(image, &frame_ts).is_err() {
            warn!("dropped frame {}", self.frames);
        }
        self.frames += 1;

        self.fps_limiter.wait();
        Ok(())
    }
}

unsafe impl Send for VideoReader {}
unsafe impl Sync for VideoReader {}
