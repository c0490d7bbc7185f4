use crate::error::{ErrorKind, Result};
use crate::{Status, Transcoder};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use tracing::instrument;

/// Program looked up on `PATH` when none is configured.
pub const DEFAULT_PROGRAM: &str = "silk2mp3";
/// Argument template used when none is configured.
pub const DEFAULT_ARGS: [&str; 3] = ["{input}", "{output}", "{rate}"];

const INPUT: &str = "{input}";
const OUTPUT: &str = "{output}";
const RATE: &str = "{rate}";

/// Runs an external program once per payload.
///
/// The argument template may use three placeholders, substituted anywhere
/// inside each argument:
///
/// - `{input}`: path to a file holding the input payload,
/// - `{output}`: path the program must write to (required),
/// - `{rate}`: the sample rate in Hz.
///
/// The program's exit code becomes the [`Status`].
///
/// ```no_run
/// use voxport_transcode::{CommandTranscoder, Transcoder};
/// use std::path::Path;
///
/// # fn main() -> voxport_transcode::error::Result<()> {
/// let ffmpeg = CommandTranscoder::discover(
///     "ffmpeg",
///     ["-y", "-f", "s16le", "-ar", "{rate}", "-i", "{input}", "{output}"],
/// )?;
/// let status = ffmpeg.transcode(&[0; 4096], Path::new("out.mp3"), 24_000);
/// assert!(status.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CommandTranscoder {
    program: PathBuf,
    args: Vec<String>,
}
impl CommandTranscoder {
    /// Resolve `program` (an executable path, or a name looked up on `PATH`)
    /// and validate the argument template.
    pub fn discover(program: &str, args: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if !args.iter().any(|arg| arg.contains(OUTPUT)) {
            exn::bail!(ErrorKind::InvalidArguments(format!("no argument contains `{OUTPUT}`")));
        }
        let Ok(program) = which::which(program) else {
            tracing::info!(program, "Transcoder executable not found");
            exn::bail!(ErrorKind::ProgramNotFound(program.to_string()));
        };
        tracing::debug!(program = %program.display(), "Discovered transcoder");
        Ok(Self { program, args })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn render_args(&self, input: &Path, output: &Path, sample_rate: u32) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let rate = sample_rate.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(INPUT, &input).replace(OUTPUT, &output).replace(RATE, &rate))
            .collect()
    }

    fn execute(&self, input: &Path, output: &Path, sample_rate: u32) -> Status {
        let result = Command::new(&self.program)
            .args(self.render_args(input, output, sample_rate))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();
        match result {
            Ok(out) => {
                // `None` means the process was killed by a signal.
                let status = out.status.code().map(Status).unwrap_or(Status::NOT_RUN);
                if !status.is_success() {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    tracing::debug!(%status, stderr = %stderr.trim(), "Transcoder exited unsuccessfully");
                }
                status
            },
            Err(err) => {
                tracing::warn!(program = %self.program.display(), error = %err, "Could not run transcoder");
                Status::NOT_RUN
            },
        }
    }

    fn persist_input(input: &[u8]) -> std::io::Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(input)?;
        tmp.flush()?;
        Ok(tmp)
    }
}

impl Transcoder for CommandTranscoder {
    #[instrument(skip(self, input), fields(bytes = input.len(), output = %output.display()))]
    fn transcode(&self, input: &[u8], output: &Path, sample_rate: u32) -> Status {
        // The temporary file is removed when `tmp` is dropped, after the
        // program has exited.
        let tmp = match Self::persist_input(input) {
            Ok(tmp) => tmp,
            Err(err) => {
                tracing::warn!(error = %err, "Could not write transcoder input to a temporary file");
                return Status::NOT_RUN;
            },
        };
        self.execute(tmp.path(), output, sample_rate)
    }

    fn transcode_file(&self, input: &Path, output: &Path, sample_rate: u32) -> Status {
        self.execute(input, output, sample_rate)
    }
}
