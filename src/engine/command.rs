//! Running an external recognition executable.
//!
//! The image is written to the child's stdin from a helper thread while two
//! more threads drain stdout and stderr, so a chatty child can never block on
//! a full pipe. With a timeout the parent polls for exit and kills the child
//! once the deadline passes.

use super::EngineError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Resolve a configured executable: a directory means "the engine's binary
/// inside this directory", anything else is used as given.
pub fn resolve_executable(configured: &Path, name: &str) -> PathBuf {
    if configured.is_dir() {
        configured.join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
    } else {
        configured.to_path_buf()
    }
}

/// One execution of an engine binary.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub engine: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    /// Unix niceness to run at; 0 leaves priority alone.
    pub nice: i32,
}

impl Invocation {
    pub fn new(engine: &'static str, program: &Path) -> Self {
        Self {
            engine,
            program: program.to_path_buf(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
            nice: 0,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, data: Vec<u8>) -> Self {
        self.stdin = Some(data);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn nice(mut self, nice: i32) -> Self {
        self.nice = nice;
        self
    }

    /// The command line as it will be executed, for logging.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::new();
        if cfg!(unix) && self.nice != 0 {
            parts.extend(["nice".to_string(), "-n".to_string(), self.nice.to_string()]);
        }
        parts.push(self.program.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = if cfg!(unix) && self.nice != 0 {
            let mut cmd = Command::new("nice");
            cmd.arg("-n").arg(self.nice.to_string()).arg(&self.program);
            cmd
        } else {
            Command::new(&self.program)
        };
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn unavailable(&self) -> EngineError {
        EngineError::Unavailable {
            engine: self.engine.to_string(),
            message: format!(
                "{} was not found. Set [engines.{}] executable in the config file \
                 or add its directory to PATH",
                self.program.display(),
                self.engine
            ),
        }
    }

    /// Run to completion and collect the output.
    pub fn run(self) -> Result<Output, EngineError> {
        let started = Instant::now();
        log::info!("{} command: {}", self.engine, self.command_line());

        // Under `nice` the spawn succeeds even when the engine is missing.
        if cfg!(unix) && self.nice != 0 && !is_executable_present(&self.program) {
            return Err(self.unavailable());
        }
        let mut child = self.command().spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => self.unavailable(),
            _ => EngineError::Io(e),
        })?;

        let writer = match (child.stdin.take(), self.stdin) {
            (Some(mut pipe), Some(data)) => Some(thread::spawn(move || {
                // The child may exit before reading all of it.
                let _ = pipe.write_all(&data);
            })),
            _ => None,
        };
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(limit) => wait_with_deadline(&mut child, limit, self.engine)?,
            None => child.wait()?,
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let output = Output {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        log::debug!(
            "{} finished with {} in {:.3}s",
            self.engine,
            output.status,
            started.elapsed().as_secs_f64()
        );
        Ok(output)
    }
}

/// Whether `program` would be found by a spawn: a path with a directory part
/// must be a file, a bare name must be a file in one of the `PATH` entries.
pub fn is_executable_present(program: &Path) -> bool {
    let has_dir = program
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());
    if has_dir {
        return program.is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
}

/// Captured result of an engine run.
#[derive(Debug, Clone)]
pub struct Output {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn wait_with_deadline(
    child: &mut Child,
    limit: Duration,
    engine: &str,
) -> Result<ExitStatus, EngineError> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            log::warn!("{engine} exceeded {:.1}s, killed", limit.as_secs_f64());
            return Err(EngineError::Timeout {
                engine: engine.to_string(),
                seconds: limit.as_secs_f64(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}
