//! ffmpeg subprocess adapter. Frames travel through a small bounded channel
//! to a named writer thread that owns the subprocess; when ffmpeg falls
//! behind, the channel fills and `submit` blocks, which is the render loop's
//! only flow-control point.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};

use crate::schema::RenderConfig;

/// Destination for finished frames, in strict presentation order.
pub trait FrameSink {
    fn submit(&mut self, frame: Vec<u8>) -> Result<()>;
    /// Signals end-of-stream and waits for the consumer to drain. Must be
    /// called exactly once, after the last frame.
    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegMode {
    Auto,
    System,
    Sidecar,
}

trait EncoderBackend: Send {
    fn mode_label(&self) -> &'static str;
    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()>;
}

pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
}

struct SystemFfmpegBackend {
    args: Vec<String>,
}

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend {
    args: Vec<String>,
}

impl FfmpegPipe {
    pub fn spawn(config: &RenderConfig, input: &Path, output: &Path) -> Result<Self> {
        Self::spawn_with_mode(config, input, output, FfmpegMode::Auto)
    }

    pub fn spawn_with_mode(
        config: &RenderConfig,
        input: &Path,
        output: &Path,
        mode: FfmpegMode,
    ) -> Result<Self> {
        let path_str = output.to_string_lossy();
        if path_str.chars().any(|c| c.is_control()) {
            bail!("output path contains invalid control characters");
        }

        let args = overlay_encode_args(
            input,
            config.width,
            config.height,
            config.fps,
            output,
        );
        let backend = select_backend(mode, args)?;
        Self::spawn_backend(backend)
    }

    fn spawn_backend(backend: Box<dyn EncoderBackend>) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let worker_name = format!("subburn-encoder-{}", backend.mode_label());
        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || backend.run(receiver))
            .context("failed to spawn encoder writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl FrameSink for FfmpegPipe {
    fn submit(&mut self, frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        // Blocks when the channel is full; this is the backpressure wait.
        sender
            .send(frame)
            .map_err(|_| anyhow!("encoder thread exited before the stream ended"))
    }

    fn finish(&mut self) -> Result<()> {
        drop(self.sender.take());

        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("encoder worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("encoder worker thread panicked")),
        }
    }
}

fn select_backend(mode: FfmpegMode, args: Vec<String>) -> Result<Box<dyn EncoderBackend>> {
    match mode {
        FfmpegMode::Auto | FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend { args })),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend { args }))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                Err(anyhow!(
                    "ffmpeg sidecar mode requested but this build lacks `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                ))
            }
        }
    }
}

impl EncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        run_ffmpeg_process(Path::new("ffmpeg"), &self.args, receiver, self.mode_label())
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl EncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        run_ffmpeg_process(&path, &self.args, receiver, self.mode_label())
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    args: &[String],
    receiver: mpsc::Receiver<Vec<u8>>,
    mode_label: &str,
) -> Result<()> {
    let mut command = Command::new(ffmpeg_path);
    command
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            anyhow!(
                "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg or build with `--features sidecar_ffmpeg`.",
                ffmpeg_path.display()
            )
        } else {
            anyhow!(
                "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}, args='{}'): {error}",
                ffmpeg_path.display(),
                args.join(" ")
            )
        }
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    while let Ok(frame) = receiver.recv() {
        stdin
            .write_all(&frame)
            .context("failed to write frame to ffmpeg stdin")?;
    }

    stdin.flush().context("failed to flush ffmpeg stdin")?;
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(
            "ffmpeg failed with status {status} (mode={mode_label}, resolved_path={}, args='{}', stderr_tail='{}')",
            ffmpeg_path.display(),
            args.join(" "),
            stderr_tail
        ));
    }

    Ok(())
}

/// Argument list for the overlay pipeline: input 0 is the source video,
/// input 1 the raw caption stream on stdin, composited at the origin. Output
/// color metadata is tagged bt709 explicitly so players do not guess.
pub fn overlay_encode_args(
    input: &Path,
    width: u32,
    height: u32,
    fps: u32,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-i".to_owned(),
        input.to_string_lossy().into_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        format!("{width}x{height}"),
        "-r".to_owned(),
        fps.to_string(),
        "-i".to_owned(),
        "-".to_owned(),
        // format=auto keeps the overlay filter from converting the caption
        // stream's color prematurely.
        "-filter_complex".to_owned(),
        "[0:v][1:v]overlay=0:0:format=auto".to_owned(),
        "-c:v".to_owned(),
        "libx264".to_owned(),
        "-preset".to_owned(),
        "medium".to_owned(),
        "-crf".to_owned(),
        "18".to_owned(),
        "-color_primaries".to_owned(),
        "bt709".to_owned(),
        "-color_trc".to_owned(),
        "bt709".to_owned(),
        "-colorspace".to_owned(),
        "bt709".to_owned(),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
    ];

    let ext = output
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(ext.as_str(), "mov" | "mp4" | "m4v") {
        args.push("-movflags".to_owned());
        args.push("+faststart".to_owned());
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Collects frames in memory; stands in for the encoder in tests and dry
/// runs.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub frames: Vec<Vec<u8>>,
    pub finished: bool,
}

impl FrameSink for CollectingSink {
    fn submit(&mut self, frame: Vec<u8>) -> Result<()> {
        if self.finished {
            bail!("frame submitted after end-of-stream");
        }
        self.frames.push(frame);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct SlowCountingBackend {
        delay: Duration,
        received: Arc<AtomicUsize>,
    }

    impl EncoderBackend for SlowCountingBackend {
        fn mode_label(&self) -> &'static str {
            "test"
        }

        fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
            while receiver.recv().is_ok() {
                thread::sleep(self.delay);
                self.received.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[test]
    fn slow_consumer_applies_backpressure_without_losing_frames() {
        let received = Arc::new(AtomicUsize::new(0));
        let mut pipe = FfmpegPipe::spawn_backend(Box::new(SlowCountingBackend {
            delay: Duration::from_millis(2),
            received: Arc::clone(&received),
        }))
        .unwrap();

        let total = 32;
        for index in 0..total {
            pipe.submit(vec![index as u8; 16]).unwrap();
        }
        pipe.finish().unwrap();

        assert_eq!(received.load(Ordering::SeqCst), total);
    }

    #[test]
    fn finish_is_rejected_twice() {
        let received = Arc::new(AtomicUsize::new(0));
        let mut pipe = FfmpegPipe::spawn_backend(Box::new(SlowCountingBackend {
            delay: Duration::from_millis(0),
            received,
        }))
        .unwrap();
        pipe.finish().unwrap();
        assert!(pipe.finish().is_err());
        assert!(pipe.submit(vec![0; 4]).is_err());
    }

    #[test]
    fn overlay_args_declare_both_inputs_and_color_tags() {
        let args = overlay_encode_args(
            Path::new("in.mp4"),
            1280,
            720,
            30,
            Path::new("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-i in.mp4"));
        assert!(joined.contains("-pix_fmt rgba -s:v 1280x720 -r 30 -i -"));
        assert!(joined.contains("[0:v][1:v]overlay=0:0:format=auto"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-color_primaries bt709"));
        assert!(joined.contains("-colorspace bt709"));
        assert!(joined.contains("-pix_fmt yuv420p"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(args.last().unwrap() == "out.mp4");
    }

    #[test]
    fn collecting_sink_rejects_frames_after_finish() {
        let mut sink = CollectingSink::default();
        sink.submit(vec![1, 2, 3]).unwrap();
        sink.finish().unwrap();
        assert!(sink.submit(vec![4]).is_err());
        assert_eq!(sink.frames.len(), 1);
    }
}
