use std::{collections::HashMap, process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
    process::{self, Child},
    sync::{Mutex, RwLock, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    console::ConsoleLine,
    error::StarterError,
    instance::{LifecycleState, ServerInstance},
    paths::DataDirs,
};

use super::Starter;

#[derive(Debug)]
struct ProcHandle {
    child: Arc<RwLock<Child>>,
    stdin_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

/// Built-in starter driving a local child process over piped stdio.
///
/// One `ProcessStarter` serves every instance that selects it; per-instance
/// process state lives in an internal map keyed by instance id. Child stdout
/// and stderr are pumped line-by-line into the instance console; input is
/// delivered over the child's stdin. Stopping writes the configured stop
/// command and waits for the process to exit.
pub struct ProcessStarter {
    dirs: DataDirs,
    stop_command: String,
    procs: Mutex<HashMap<i64, ProcHandle>>,
}

impl ProcessStarter {
    pub fn new(dirs: DataDirs) -> Self {
        Self::with_stop_command(dirs, "stop")
    }

    pub fn with_stop_command<S: Into<String>>(dirs: DataDirs, stop_command: S) -> Self {
        Self {
            dirs,
            stop_command: stop_command.into(),
            procs: Mutex::new(HashMap::new()),
        }
    }

    fn build_command(
        &self,
        instance: &ServerInstance,
        program: &str,
        args: &[String],
    ) -> process::Command {
        let mut command = process::Command::new(program);
        command
            .args(args)
            .current_dir(instance.dir(&self.dirs))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped());

        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// Wires the child's pipes to the instance console and the stdin queue.
    ///
    /// The stdout pump doubles as the crash detector: pipe loss while the
    /// instance is still `Starting` or `Running` marks it `Crashed` and
    /// cancels the shutdown token, which lets a later `start` replace the
    /// stale handle.
    fn setup_stream_pumps(
        &self,
        instance: &Arc<ServerInstance>,
        mut child: Child,
        mut stdin_rx: mpsc::Receiver<String>,
        shutdown: CancellationToken,
    ) -> Result<Arc<RwLock<Child>>, StarterError> {
        let stdout = child.stdout.take().ok_or(StarterError::NoStdoutPipe)?;
        let stderr = child.stderr.take().ok_or(StarterError::NoStderrPipe)?;
        let stdin = child.stdin.take().ok_or(StarterError::NoStdinPipe)?;

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut writer = BufWriter::new(stdin);
            loop {
                tokio::select! {
                    _ = writer_shutdown.cancelled() => {
                        break;
                    }
                    maybe_line = stdin_rx.recv() => {
                        match maybe_line {
                            Some(line) => {
                                _ = writer.write_all(line.as_bytes()).await;
                                _ = writer.flush().await;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        let stdout_instance = instance.clone();
        let stdout_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        stdout_instance.console.push(ConsoleLine::stdout(line)).await;
                    }
                    _ => {
                        let state = stdout_instance.state().await;
                        if state == LifecycleState::Running || state == LifecycleState::Starting {
                            warn!(server = stdout_instance.data.id, "stdout pipe lost, marking crashed");
                            stdout_instance.set_state(LifecycleState::Crashed).await;
                        }
                        stdout_shutdown.cancel();
                        break;
                    }
                }
            }
        });

        let stderr_instance = instance.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                stderr_instance.console.push(ConsoleLine::stderr(line)).await;
            }
        });

        Ok(Arc::new(RwLock::new(child)))
    }
}

#[async_trait]
impl Starter for ProcessStarter {
    async fn start(
        &self,
        instance: Arc<ServerInstance>,
        program: String,
        args: Vec<String>,
    ) -> Result<bool, StarterError> {
        let mut procs = self.procs.lock().await;

        if let Some(existing) = procs.get(&instance.data.id) {
            if !existing.shutdown.is_cancelled() {
                return Err(StarterError::AlreadyRunning);
            }
            // Stale handle from a crashed child.
            procs.remove(&instance.data.id);
        }

        let mut command = self.build_command(&instance, &program, &args);
        let child = command.spawn().map_err(|err| {
            warn!(server = instance.data.id, %program, %err, "failed to spawn server process");
            StarterError::SpawnFailed
        })?;

        let (stdin_tx, stdin_rx) = mpsc::channel(1024);
        let shutdown = CancellationToken::new();
        let child = self.setup_stream_pumps(&instance, child, stdin_rx, shutdown.clone())?;

        debug!(server = instance.data.id, %program, "server process spawned");
        procs.insert(
            instance.data.id,
            ProcHandle {
                child,
                stdin_tx,
                shutdown,
            },
        );

        Ok(true)
    }

    async fn stop(&self, instance: Arc<ServerInstance>) -> Result<bool, StarterError> {
        // The handle stays in the map until the child is confirmed dead, so a
        // stop that fails (or is abandoned at a timeout) can be retried.
        let (child, stdin_tx, shutdown) = {
            let procs = self.procs.lock().await;
            let handle = procs
                .get(&instance.data.id)
                .ok_or(StarterError::NotRunning)?;
            (
                handle.child.clone(),
                handle.stdin_tx.clone(),
                handle.shutdown.clone(),
            )
        };

        let mut command = self.stop_command.clone();
        if !command.ends_with('\n') {
            command.push('\n');
        }
        _ = stdin_tx.send(command).await;

        let mut guard = child.write().await;
        guard.wait().await.map_err(|err| {
            warn!(server = instance.data.id, %err, "failed to reap server process");
            StarterError::Fault(err.to_string())
        })?;
        drop(guard);

        shutdown.cancel();
        self.procs.lock().await.remove(&instance.data.id);
        instance.set_state(LifecycleState::Stopped).await;

        Ok(true)
    }

    async fn send_input(
        &self,
        instance: Arc<ServerInstance>,
        text: &str,
    ) -> Result<bool, StarterError> {
        let procs = self.procs.lock().await;
        let handle = procs
            .get(&instance.data.id)
            .ok_or(StarterError::NotRunning)?;

        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        handle
            .stdin_tx
            .send(line)
            .await
            .map_err(|_| StarterError::StdinWriteFailed)?;

        Ok(true)
    }
}
