use std::{
    io::{self, Read, BufRead, BufReader, BufWriter, stdin},
    fs::{self, File},
    path::{Path, PathBuf},
    ffi::OsStr,
    process::{Child, Command, Output, Stdio},
    thread,
    time::Instant,
};
use flate2::bufread::MultiGzDecoder;
use crate::{
    Error,
    err::add_path,
    ext::fmt,
};

/// Finds an executable, returns None if it is not available.
pub fn find_exe(p: impl AsRef<Path>) -> Option<PathBuf> {
    which::which(p.as_ref()).ok()
}

/// Returns
/// - stdin if filename is `-`,
/// - gzip reader if the file starts with gzip magic number,
/// - regular text file otherwise.
pub fn open(filename: &Path) -> crate::Result<Box<dyn BufRead + Send>> {
    if filename == OsStr::new("-") || filename == OsStr::new("/dev/stdin") {
        return Ok(Box::new(BufReader::new(stdin())));
    }
    let mut stream = BufReader::new(File::open(filename).map_err(add_path!(filename))?);
    let mut two_bytes = [0_u8; 2];
    let bytes_read = stream.read(&mut two_bytes).map_err(add_path!(filename))?;
    stream.seek_relative(-(bytes_read as i64)).map_err(add_path!(filename))?;
    if bytes_read == 2 && two_bytes[0] == 0x1f && two_bytes[1] == 0x8b {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(stream))))
    } else {
        Ok(Box::new(stream))
    }
}

/// Creates a buffered file.
pub fn create_file(filename: &Path) -> crate::Result<BufWriter<File>> {
    File::create(filename).map_err(add_path!(filename)).map(BufWriter::new)
}

/// Create directory (and all its parents), if it does not exist yet.
pub fn mkdir(path: impl AsRef<Path>) -> crate::Result<()> {
    let path = path.as_ref();
    if path.exists() {
        Ok(())
    } else {
        fs::create_dir_all(path).map_err(add_path!(path))
    }
}

/// Removes file or directory, if it exists.
pub fn remove_artifact(path: &Path) -> crate::Result<()> {
    // symlink_metadata: do not follow links, remove the link itself.
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e, vec![path.to_owned()])),
    };
    log::trace!("    Removing {}", fmt::path(path));
    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(add_path!(path))
    } else {
        fs::remove_file(path).map_err(add_path!(path))
    }
}

/// Returns true if the path exists and is either a non-empty file or a directory.
pub fn is_present(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => metadata.is_dir() || metadata.len() > 0,
        Err(_) => false,
    }
}

/// RAII child wrapper, that kills the child if it gets dropped.
pub struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// Waits for the child to finish, after which the guard does nothing.
    pub fn wait_with_output(mut self) -> io::Result<Output> {
        match self.child.take() {
            Some(child) => child.wait_with_output(),
            None => Err(io::Error::new(io::ErrorKind::Other, "Child process was already collected")),
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.kill() {
                Err(e) => {
                    // InvalidInput means that the process exited already.
                    if e.kind() != io::ErrorKind::InvalidInput {
                        log::error!("Could not kill child process: {}", e);
                    }
                }
                Ok(_) => log::error!("Successfully killed child process"),
            }
        }
    }
}

/// Keep this many last lines of the standard error in the error message.
const STDERR_LINES: usize = 10;

fn stderr_tail(stderr: &[u8]) -> String {
    let s = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = s.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_LINES);
    lines[start..].iter().map(|line| format!("    {}", line)).collect::<Vec<_>>().join("\n")
}

/// Converts unsuccessful process output into `StageFailed`.
fn check_output(stage: &'static str, cmd_str: &str, output: &Output) -> crate::Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        let tail = stderr_tail(&output.stderr);
        let descr = if tail.is_empty() {
            format!("    {}", cmd_str)
        } else {
            format!("    {}\n{}", cmd_str, tail)
        };
        Err(Error::StageFailed(stage, output.status.code(), descr))
    }
}

fn spawn_error(cmd: &Command) -> impl FnOnce(io::Error) -> Error {
    let program = PathBuf::from(cmd.get_program());
    move |e| Error::Io(e, vec![program])
}

/// Runs a command and waits for it to finish.
/// Standard output is discarded unless it was redirected beforehand.
pub fn run_command(stage: &'static str, cmd: &mut Command) -> crate::Result<()> {
    let cmd_str = fmt::command(cmd);
    log::debug!("    {}", cmd_str);
    let start = Instant::now();
    let output = cmd.stdin(Stdio::null()).stderr(Stdio::piped()).output().map_err(spawn_error(cmd))?;
    log::trace!("    Finished in {}", fmt::Duration(start.elapsed()));
    check_output(stage, &cmd_str, &output)
}

/// Runs a command, and writes its standard output into a file.
pub fn run_to_file(stage: &'static str, cmd: &mut Command, out_filename: &Path) -> crate::Result<()> {
    let file = File::create(out_filename).map_err(add_path!(out_filename))?;
    log::debug!("    {} > {}", fmt::command(cmd), fmt::path(out_filename));
    cmd.stdout(Stdio::from(file));
    run_command(stage, cmd)
}

/// Runs `first | second` and waits for both commands to finish.
pub fn run_pipe(stage: &'static str, first: &mut Command, second: &mut Command) -> crate::Result<()> {
    let first_str = fmt::command(first);
    let second_str = fmt::command(second);
    log::debug!("    {} | {}", first_str, second_str);
    let start = Instant::now();
    let mut child = first.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped())
        .spawn().map_err(spawn_error(first))?;
    let child_stdout = child.stdout.take()
        .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "Cannot capture standard output"),
            vec![PathBuf::from(first.get_program())]))?;
    let child_stderr = child.stderr.take();
    let guard = ChildGuard::new(child);
    // Read concurrently with the second command: a full stderr pipe would stall the first one.
    let stderr_reader = child_stderr.map(|mut stderr| thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    }));
    let second_output = second.stdin(Stdio::from(child_stdout)).stderr(Stdio::piped())
        .output().map_err(spawn_error(second))?;
    let mut first_output = guard.wait_with_output().map_err(spawn_error(first))?;
    if let Some(handle) = stderr_reader {
        first_output.stderr = handle.join().unwrap_or_default();
    }
    log::trace!("    Finished in {}", fmt::Duration(start.elapsed()));
    check_output(stage, &first_str, &first_output)?;
    check_output(stage, &second_str, &second_output)
}
