use std::{
    ffi::OsStr,
    fmt,
    io::{self, Read, Write},
    process, thread, time,
};

use log::debug;

/// How often a running child is checked for completion while waiting on a [`Deadline`].
const POLLING_INTERVAL: time::Duration = time::Duration::from_millis(50);

pub struct Deadline(time::Instant);

impl Deadline {
    /// Create a new deadline that times out after the provided duration.
    pub fn after(timeout: time::Duration) -> Self {
        Self(time::Instant::now() + timeout)
    }

    /// If there is enough time to sleep before the deadline, sleeps and returns
    /// Ok. Otherwise, returns Err.
    pub fn sleep(&self, duration: time::Duration) -> Result<(), ()> {
        if time::Instant::now() + duration < self.0 {
            thread::sleep(duration);
            Ok(())
        } else {
            Err(())
        }
    }
}

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<'a, I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn env<K: AsRef<OsStr>, V: AsRef<OsStr>>(mut self, key: K, value: V) -> Self {
        self.0.env(key, value);
        self
    }

    pub fn program(&self) -> &OsStr {
        self.0.get_program()
    }

    /// Runs the command to completion and captures stdout and stderr. When `input` is provided it
    /// is written to the child's stdin, which is then closed. The child is killed when it is still
    /// running after `timeout`.
    pub fn capture(mut self, input: Option<Vec<u8>>, timeout: time::Duration) -> Result<Output> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        let stdin = if input.is_some() {
            process::Stdio::piped()
        } else {
            process::Stdio::null()
        };

        let mut child = match self
            .0
            .stdin(stdin)
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        // The child may exit without reading its input, a broken pipe is not our concern.
        let stdin_thread = child.stdin.take().zip(input).map(|(mut stdin, input)| {
            thread::spawn(move || {
                let _ = stdin.write_all(&input);
            })
        });
        let stdout_thread = child.stdout.take().map(read_to_end);
        let stderr_thread = child.stderr.take().map(read_to_end);

        let deadline = Deadline::after(timeout);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if deadline.sleep(POLLING_INTERVAL).is_err() {
                        let _ = child.kill();
                        let _ = child.wait();
                        // Grandchildren may still hold the pipes open, so the reader threads are
                        // left to finish on their own.
                        return Err(Error {
                            command: self,
                            kind: ErrorKind::TimedOut(timeout),
                        });
                    }
                }
                Err(error) => {
                    let _ = child.kill();
                    return Err(Error {
                        command: self,
                        kind: error.into(),
                    });
                }
            }
        };

        if let Some(thread) = stdin_thread {
            let _ = thread.join();
        }

        Ok(Output {
            command: self,
            output: process::Output {
                status,
                stdout: join_reader(stdout_thread),
                stderr: join_reader(stderr_thread),
            },
        })
    }
}

fn read_to_end<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    })
}

fn join_reader(thread: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    thread
        .and_then(|thread| thread.join().ok())
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    TimedOut(time::Duration),
    Io(io::ErrorKind),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            kind => ErrorKind::Io(kind),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl Error {
    /// Describes what went wrong without repeating the full command line.
    pub fn reason(&self) -> String {
        let program = self.command.program().to_string_lossy();
        match self.kind {
            ErrorKind::NotFound => format!(
                "the `{program}` command is required but not available on your system, please install it"
            ),
            ErrorKind::PermissionDenied => format!(
                "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable"
            ),
            ErrorKind::TimedOut(timeout) => format!(
                "`{program}` timed out after {seconds}s",
                seconds = timeout.as_secs()
            ),
            ErrorKind::Io(kind) => format!("`{program}` could not be run: {kind}"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to run `{command:?}`: {reason}",
            command = &self.command.0,
            reason = self.reason()
        )
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::AsRef::as_ref`] on each.
macro_rules! command {
    ($program:expr, $($arg:expr),* $(,)?) => {
        $crate::process::args!($crate::process::Command::new($program), $($arg,)*)
    };
}

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr, $($arg:expr),+ $(,)?) => {
        $program.args([
            $(::std::convert::AsRef::<::std::ffi::OsStr>::as_ref(&$arg),)*
        ])
    }
}

pub(crate) use args;
pub(crate) use command;

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: time::Duration = time::Duration::from_secs(10);

    #[test]
    fn missing_program_is_reported_as_not_found() {
        let error = command!("dockship-this-program-does-not-exist", "--version")
            .capture(None, TIMEOUT)
            .unwrap_err();
        assert!(matches!(error.kind, ErrorKind::NotFound));
        assert!(error.reason().contains("is required but not available"));
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_stderr_and_stdin() {
        let output = command!("sh", "-c", "read line; echo \"got $line\"; echo oops >&2")
            .capture(Some(b"secret\n".to_vec()), TIMEOUT)
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout_lossy(), "got secret\n");
        assert_eq!(output.stderr_lossy(), "oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_captured() {
        let output = command!("sh", "-c", "exit 3").capture(None, TIMEOUT).unwrap();
        assert_eq!(output.status.code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn slow_commands_are_killed_at_the_deadline() {
        let started = time::Instant::now();
        let error = command!("sleep", "30")
            .capture(None, time::Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(error.kind, ErrorKind::TimedOut(_)));
        assert!(started.elapsed() < time::Duration::from_secs(10));
    }
}
