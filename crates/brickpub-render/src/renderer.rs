//! External renderer bridge
//!
//! Step images come from a renderer executable outside the process. The
//! bridge writes each step's accumulated content to its own working
//! file, hands the file and camera over, and reports the image path
//! back to the traversal. Failure is per image; a step without a
//! picture never stops a draw.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use brickpub_core::constants::{DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_WIDTH};
use brickpub_core::{RenderError, RotStep, RotStepKind};
use brickpub_traversal::{CameraView, StepImager, StepRequest};

use crate::workfile::WorkFileWriter;

/// One image order for the external renderer
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Working file holding the content to render.
    pub input: PathBuf,
    /// Where the image must land.
    pub output: PathBuf,
    /// Camera settings in force.
    pub camera: CameraView,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

/// Produces one image from one working file
pub trait Renderer: Send + Sync {
    /// Render the request and return the image path
    ///
    /// # Errors
    /// Returns a render error when the tool could not be started or
    /// reported failure for the image.
    fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError>;
}

/// Renderer that claims success without touching the disk
#[derive(Debug, Default)]
pub struct NullRenderer {
    invocations: AtomicUsize,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many render requests this instance has received
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl Renderer for NullRenderer {
    fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        Ok(request.output.clone())
    }
}

/// Renderer that spawns an external executable per image
///
/// The tool is called as `program [extra args] INPUT --out OUTPUT
/// --width W --height H`, with `--fov`, `--latitude`, `--longitude`,
/// and `--distance` appended for whichever camera settings are present.
/// A non-zero exit fails that one image, carrying the tool's stderr as
/// the reason.
#[derive(Debug)]
pub struct CommandLineRenderer {
    program: PathBuf,
    extra_args: Vec<String>,
    invocations: AtomicUsize,
}

impl CommandLineRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            invocations: AtomicUsize::new(0),
        }
    }

    /// Arguments placed before the generated ones on every call
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// How many times the external tool has been launched
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    fn command_for(&self, request: &RenderRequest) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.extra_args);
        command.arg(&request.input);
        command.arg("--out").arg(&request.output);
        command.arg("--width").arg(request.width.to_string());
        command.arg("--height").arg(request.height.to_string());
        append_camera(&mut command, &request.camera);
        command
    }
}

fn append_camera(command: &mut Command, camera: &CameraView) {
    if let Some(fov) = camera.fov {
        command.arg("--fov").arg(fov.to_string());
    }
    if let Some(latitude) = camera.latitude {
        command.arg("--latitude").arg(latitude.to_string());
    }
    if let Some(longitude) = camera.longitude {
        command.arg("--longitude").arg(longitude.to_string());
    }
    if let Some(distance) = camera.distance {
        command.arg("--distance").arg(distance.to_string());
    }
}

impl Renderer for CommandLineRenderer {
    fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        debug!(
            program = %self.program.display(),
            input = %request.input.display(),
            "invoking renderer"
        );
        match self.command_for(request).output() {
            Ok(output) if output.status.success() => Ok(request.output.clone()),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = match stderr.trim() {
                    "" => output.status.to_string(),
                    text => text.to_string(),
                };
                Err(RenderError::RenderFailed {
                    image: request.output.display().to_string(),
                    reason,
                })
            }
            Err(error) => Err(RenderError::LaunchFailed {
                program: self.program.display().to_string(),
                reason: error.to_string(),
            }),
        }
    }
}

/// Step imager backed by a renderer
///
/// Each step's accumulated content goes to its own working file, named
/// after the submodel and step. The file is only rewritten when the
/// content hash moved, and an image already on disk for unchanged
/// content is reused without launching the tool again.
pub struct RenderImager {
    renderer: Arc<dyn Renderer>,
    work: Mutex<WorkFileWriter>,
    image_dir: PathBuf,
    width: u32,
    height: u32,
    camera_defaults: CameraView,
}

impl RenderImager {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        work_dir: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            renderer,
            work: Mutex::new(WorkFileWriter::new(work_dir)),
            image_dir: image_dir.into(),
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
            camera_defaults: CameraView::default(),
        }
    }

    /// Image size in pixels
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Camera settings used where a step sets none of its own
    pub fn with_camera_defaults(mut self, defaults: CameraView) -> Self {
        self.camera_defaults = defaults;
        self
    }
}

impl StepImager for RenderImager {
    fn image_step(&self, request: &StepRequest<'_>) -> Result<Option<PathBuf>, RenderError> {
        let stem = step_stem(request.model_name, request.step_number);
        let contents = step_contents(request.lines, request.rotation);
        let output = self.image_dir.join(format!("{stem}.png"));
        let (input, wrote) = {
            let mut work = self.work.lock();
            let path = work.dir().join(format!("{stem}.ldr"));
            let wrote = work.write_if_changed(&path, &contents)?;
            (path, wrote)
        };
        if !wrote && output.exists() {
            debug!(step = request.step_number, "step content unchanged, reusing image");
            return Ok(Some(output));
        }
        let render_request = RenderRequest {
            input,
            output,
            camera: request.camera.with_defaults(self.camera_defaults),
            width: self.width,
            height: self.height,
        };
        self.renderer.render(&render_request).map(Some)
    }
}

/// The step's working-file text: accumulated content plus the rotation
/// meta the renderer applies last
fn step_contents(lines: &[String], rotation: Option<RotStep>) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum::<usize>() + 40);
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    if let Some(rotation) = rotation {
        if rotation.kind == RotStepKind::End {
            text.push_str("0 ROTSTEP END\n");
        } else {
            text.push_str(&format!(
                "0 ROTSTEP {} {} {} {}\n",
                rotation.x, rotation.y, rotation.z, rotation.kind
            ));
        }
    }
    text
}

fn step_stem(model_name: &str, step_number: usize) -> String {
    let flat: String = model_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '.' => '_',
            c => c,
        })
        .collect();
    format!("{flat}-step-{step_number}")
}
