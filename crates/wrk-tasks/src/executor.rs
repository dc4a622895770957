//! Task executor
//!
//! Runs one leaf task: builds the shell-quoted command, applies the
//! execution environment's runner prefix and PATH rules, merges task
//! environment, and executes either streaming (live output, stderr merged
//! into stdout) or buffered (both streams captured). Composite tasks are
//! the registry's job.

use crate::environment::ExecutionEnvironment;
use crate::error::{Error, Result};
use crate::schema::{ExecutionMode, ProcessTitleFormat, TaskConfig, TaskResult, TaskRun};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tracing::{error, info};

/// Default task timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Environment variable carrying the formatted task title to the child
pub const TASK_TITLE_ENV: &str = "WRK_TASK_TITLE";

/// Format a task's name for the process title
///
/// `full` keeps the namespaced name, `leaf` keeps the last segment, and
/// `abbreviated` shows `first...last` for names deep enough to shorten.
pub fn format_task_title(task: &TaskConfig) -> String {
    let full_name = task.full_name();
    match task.process_title_format {
        ProcessTitleFormat::Leaf => task.name.clone(),
        ProcessTitleFormat::Abbreviated => {
            let parts: Vec<&str> = full_name.split('.').collect();
            if parts.len() <= 2 {
                full_name
            } else {
                format!("{}...{}", parts[0], parts[parts.len() - 1])
            }
        }
        ProcessTitleFormat::Full => full_name,
    }
}

/// Whether a task's output should stream live
///
/// Explicit configuration wins; otherwise stream when stdout is an
/// interactive terminal.
fn should_stream_output(task: &TaskConfig) -> bool {
    task.stream_output || std::io::stdout().is_terminal()
}

/// Executes leaf tasks for one repository
#[derive(Debug)]
pub struct TaskExecutor {
    repo_path: PathBuf,
    env: BTreeMap<String, String>,
    default_timeout: Duration,
    package_name: Option<String>,
    execution_mode: ExecutionMode,
    auto_detect_env: bool,
    execution_env: Option<ExecutionEnvironment>,
}

impl TaskExecutor {
    /// Create an executor rooted at a repository
    pub fn new(repo_path: &Path) -> Self {
        let mut executor = Self {
            repo_path: repo_path.to_path_buf(),
            env: BTreeMap::new(),
            default_timeout: DEFAULT_TIMEOUT,
            package_name: None,
            execution_mode: ExecutionMode::Auto,
            auto_detect_env: true,
            execution_env: None,
        };
        executor.refresh_environment();
        executor
    }

    /// Extra environment exported to every task
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Package name used for editable-install detection
    pub fn with_package_name(mut self, package_name: Option<String>) -> Self {
        self.package_name = package_name;
        self.refresh_environment();
        self
    }

    /// Execution mode override
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self.refresh_environment();
        self
    }

    /// Enable or disable environment auto-detection
    pub fn with_auto_detect(mut self, auto_detect: bool) -> Self {
        self.auto_detect_env = auto_detect;
        self.refresh_environment();
        self
    }

    /// Default timeout for tasks that set none
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn refresh_environment(&mut self) {
        self.execution_env = self.auto_detect_env.then(|| {
            ExecutionEnvironment::new(
                &self.repo_path,
                self.package_name.as_deref(),
                self.execution_mode,
            )
        });
    }

    /// The detected execution environment, when auto-detection is on
    pub fn execution_env(&self) -> Option<&ExecutionEnvironment> {
        self.execution_env.as_ref()
    }

    /// Execute a single leaf task
    ///
    /// Subprocess failures are captured into a non-success [`TaskResult`];
    /// only timeouts surface as errors.
    pub async fn execute(
        &self,
        task: &TaskConfig,
        args: &[String],
        dry_run: bool,
    ) -> Result<TaskResult> {
        let TaskRun::Command(raw) = &task.run else {
            unreachable!("composite tasks are handled by the registry");
        };

        // Append arguments with shell quoting
        let mut command = raw.clone();
        if !args.is_empty() {
            command = format!("{} {}", command, shell_words::join(args));
        }

        // Runner prefix rules
        command = match &self.execution_env {
            Some(env) => env.prepare_command(&command, task.command_prefix.as_deref()),
            None => match task.command_prefix.as_deref() {
                Some(prefix) if !prefix.is_empty() => format!("{} {}", prefix, command),
                _ => command,
            },
        };

        let cwd = task
            .working_dir
            .clone()
            .unwrap_or_else(|| self.repo_path.clone());
        let timeout = task
            .timeout
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_timeout);
        let title = format_task_title(task);

        if dry_run {
            info!(task = %task.full_name(), command = %command, cwd = %cwd.display(), "Dry run task");
            return Ok(TaskResult {
                task: task.clone(),
                success: true,
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration: 0.0,
            });
        }

        // Merge executor env with task env, then apply PATH rules
        let mut exec_env = self.env.clone();
        exec_env.extend(task.env.clone());
        if let Some(env) = &self.execution_env {
            exec_env = env.prepare_environment(&exec_env);
        }
        exec_env.insert(TASK_TITLE_ENV.to_string(), title.clone());

        let streaming = should_stream_output(task);
        info!(
            task = %task.full_name(),
            command = %truncate(&command, 100),
            cwd = %cwd.display(),
            streaming = streaming,
            "Starting task"
        );

        let start = Instant::now();
        let outcome = if streaming {
            // Force unbuffered output from interpreter subprocesses
            exec_env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());

            // Shell-word split, with a shell wrapper for commands the
            // splitter cannot handle
            let argv = match shell_words::split(&command) {
                Ok(argv) if !argv.is_empty() => argv,
                _ => shell_wrapper(&command),
            };

            let mut cmd = tokio::process::Command::new(&argv[0]);
            cmd.args(&argv[1..]).current_dir(&cwd).envs(&exec_env);
            run_child(cmd, timeout, true).await
        } else {
            let argv = shell_wrapper(&command);
            let mut cmd = tokio::process::Command::new(&argv[0]);
            cmd.args(&argv[1..]).current_dir(&cwd).envs(&exec_env);
            run_child(cmd, timeout, false).await
        };

        let duration = start.elapsed().as_secs_f64();

        match outcome {
            Ok(outcome) => {
                let success = outcome.exit_code == 0;
                info!(
                    task = %task.full_name(),
                    success = success,
                    exit_code = outcome.exit_code,
                    duration = format!("{:.2}s", duration),
                    "Task completed"
                );
                Ok(TaskResult {
                    task: task.clone(),
                    success,
                    exit_code: outcome.exit_code,
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                    duration,
                })
            }
            Err(RunError::Timeout) => {
                error!(
                    task = %task.full_name(),
                    timeout = timeout.as_secs(),
                    "Task timed out"
                );
                Err(Error::TaskTimeout {
                    task: task.full_name(),
                    timeout_secs: timeout.as_secs(),
                })
            }
            Err(RunError::Io(e)) => {
                // Spawn failures become a failed result, not an error
                error!(task = %task.full_name(), error = %e, "Task execution failed");
                Ok(TaskResult {
                    task: task.clone(),
                    success: false,
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    duration,
                })
            }
        }
    }
}

/// Wrap a command for the platform shell
fn shell_wrapper(command: &str) -> Vec<String> {
    if cfg!(windows) {
        vec!["cmd".into(), "/C".into(), command.into()]
    } else {
        vec!["/bin/sh".into(), "-c".into(), command.into()]
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

struct CommandOutcome {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

enum RunError {
    Timeout,
    Io(std::io::Error),
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Spawn a child and collect its output within a timeout
///
/// Streaming mode echoes chunks to the parent's stdout as they arrive and
/// merges stderr into the stdout accumulation. On timeout the child is
/// killed (SIGKILL after tokio's kill-on-drop grace).
async fn run_child(
    mut cmd: tokio::process::Command,
    timeout: Duration,
    stream: bool,
) -> std::result::Result<CommandOutcome, RunError> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");

    let work = async {
        let (out, err) = tokio::join!(read_stream(stdout, stream), read_stream(stderr, stream));
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((out?, err?, status))
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok((out, err, status))) => {
            let exit_code = status.code().unwrap_or(-1);
            if stream {
                // Live mode merged both streams as they printed
                Ok(CommandOutcome {
                    exit_code,
                    stdout: format!("{}{}", out, err),
                    stderr: String::new(),
                })
            } else {
                Ok(CommandOutcome {
                    exit_code,
                    stdout: out,
                    stderr: err,
                })
            }
        }
        Ok(Err(e)) => Err(RunError::Io(e)),
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(RunError::Timeout)
        }
    }
}

/// Read a child stream to completion, optionally echoing chunks live
async fn read_stream(
    mut reader: impl tokio::io::AsyncRead + Unpin,
    echo: bool,
) -> std::io::Result<String> {
    let mut accumulated = Vec::new();
    let mut buffer = [0u8; 4096];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        if echo {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(&buffer[..n]);
            let _ = stdout.flush();
        }
        accumulated.extend_from_slice(&buffer[..n]);
    }
    Ok(String::from_utf8_lossy(&accumulated).into_owned())
}
