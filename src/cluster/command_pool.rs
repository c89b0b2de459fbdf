// src/cluster/command_pool.rs
// Worker pool reached through a batch client process: item names go in as
// arguments, one JSON result per stdout line comes back.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::cluster::{ResultLines, WorkerPool};
use crate::control::types::WorkItem;
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone)]
pub struct CommandWorkerPool {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    /// Longest wait for the next result line.
    idle_timeout: Duration,
}

impl CommandWorkerPool {
    /// `command` is the program followed by its fixed arguments.
    pub fn new(
        command: Vec<String>,
        working_dir: Option<PathBuf>,
        idle_timeout: Duration,
    ) -> ControlResult<Self> {
        let mut parts = command.into_iter();
        let program = parts.next().ok_or_else(|| {
            ControlError::DispatchTransport("worker pool command is empty".to_string())
        })?;

        Ok(Self {
            program,
            args: parts.collect(),
            working_dir,
            idle_timeout,
        })
    }
}

#[async_trait]
impl WorkerPool for CommandWorkerPool {
    async fn submit(&self, items: &[WorkItem]) -> ControlResult<ResultLines> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(items.iter().map(WorkItem::name))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            ControlError::DispatchTransport(format!("failed to start {}: {}", self.program, e))
        })?;
        debug!("Started worker pool client (pid {:?}) for {} items", child.id(), items.len());

        let stdout = child.stdout.take().ok_or_else(|| {
            ControlError::DispatchTransport("worker pool stdout not captured".to_string())
        })?;

        // drained concurrently so a chatty client cannot block on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf).await;
                buf
            })
        });

        let state = LineReader {
            lines: BufReader::new(stdout).lines(),
            child,
            stderr,
            idle_timeout: self.idle_timeout,
            finished: false,
        };

        Ok(futures::stream::unfold(state, LineReader::next).boxed())
    }

    fn describe(&self, items: &[WorkItem]) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.extend(items.iter().map(|item| item.name().to_string()));
        format!("$ {}", parts.join(" "))
    }
}

struct LineReader {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    stderr: Option<JoinHandle<String>>,
    idle_timeout: Duration,
    finished: bool,
}

impl LineReader {
    async fn next(mut self) -> Option<(ControlResult<String>, Self)> {
        if self.finished {
            return None;
        }

        loop {
            let next = tokio::time::timeout(self.idle_timeout, self.lines.next_line()).await;
            match next {
                Err(_) => {
                    self.finished = true;
                    let _ = self.child.start_kill();
                    let err = ControlError::DispatchTransport(format!(
                        "no result from worker pool within {}s",
                        self.idle_timeout.as_secs()
                    ));
                    return Some((Err(err), self));
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    // the client is reachable but its output is not text
                    self.finished = true;
                    let _ = self.child.start_kill();
                    let err = ControlError::DispatchProtocol(format!(
                        "worker pool output is not valid UTF-8: {}",
                        e
                    ));
                    return Some((Err(err), self));
                }
                Ok(Err(e)) => {
                    self.finished = true;
                    let err = ControlError::DispatchTransport(format!(
                        "failed to read worker pool output: {}",
                        e
                    ));
                    return Some((Err(err), self));
                }
                Ok(Ok(Some(line))) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some((Ok(line), self));
                }
                Ok(Ok(None)) => {
                    self.finished = true;
                    return match self.finish().await {
                        Ok(()) => None,
                        Err(err) => Some((Err(err), self)),
                    };
                }
            }
        }
    }

    async fn finish(&mut self) -> ControlResult<()> {
        let status = self.child.wait().await.map_err(|e| {
            ControlError::DispatchTransport(format!("failed to wait for worker pool client: {}", e))
        })?;

        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(ControlError::DispatchTransport(format!(
                "worker pool client exited with {}: {}",
                status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            warn!("Worker pool client stderr: {}", stderr.trim());
        }
        Ok(())
    }
}
