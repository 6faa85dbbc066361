//! Client side of the line protocol: tool workers running as child
//! processes (or any async byte stream) behind a [`ToolChannel`].

use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relaygraph_core::config::WorkerConfig;
use relaygraph_core::{ToolChannel, ToolDescriptor, ToolError};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, METHOD_CALL_TOOL, METHOD_LIST_TOOLS,
    METHOD_PING, METHOD_SHUTDOWN,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type Waiters = HashMap<u64, oneshot::Sender<JsonRpcResponse>>;
type PendingMap = Arc<std::sync::Mutex<Waiters>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Connection {
    writer: Mutex<BoxedWriter>,
    pending: PendingMap,
    child: Mutex<Option<Child>>,
    reader: JoinHandle<()>,
}

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, Waiters> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops the waiter of request `id` when the caller stops waiting, whether
/// it got an answer, timed out or was cancelled.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// One tool worker reached over newline-delimited JSON-RPC.
///
/// Workers built with [`new`](Self::new) spawn the configured command on
/// [`start`](Self::start); calls made before that (or after
/// [`stop`](Self::stop)) fail with [`ToolError::NotRunning`]. A background
/// task reads responses and hands them to the waiting caller by request id,
/// so concurrent calls on one worker are fine.
pub struct StdioToolWorker {
    name: String,
    config: Option<WorkerConfig>,
    timeout: Duration,
    next_id: AtomicU64,
    conn: RwLock<Option<Arc<Connection>>>,
}

impl StdioToolWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            name: config.name.clone(),
            timeout: config.timeout(),
            config: Some(config),
            next_id: AtomicU64::new(1),
            conn: RwLock::new(None),
        }
    }

    /// A worker already connected to `reader`/`writer`, e.g. an in-process
    /// server on a duplex pipe.
    pub fn connect<R, W>(name: impl Into<String>, reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let name = name.into();
        let conn = attach(&name, reader, Box::new(writer), None);
        Self {
            name,
            config: None,
            timeout,
            next_id: AtomicU64::new(1),
            conn: RwLock::new(Some(Arc::new(conn))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the worker process. Does nothing if it is already running.
    pub async fn start(&self) -> Result<(), ToolError> {
        let mut slot = self.conn.write().await;
        if slot.as_ref().is_some_and(|c| !c.reader.is_finished()) {
            return Ok(());
        }
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ToolError::NotRunning(self.name.clone()))?;

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::Transport(format!(
                    "failed to spawn worker '{}' (`{}`): {e}",
                    self.name, config.command
                ))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::Transport("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Transport("worker stdout not captured".to_string()))?;

        info!(worker = %self.name, command = %config.command, pid = ?child.id(), "Worker started");
        *slot = Some(Arc::new(attach(&self.name, stdout, Box::new(stdin), Some(child))));
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.conn
            .read()
            .await
            .as_ref()
            .is_some_and(|c| !c.reader.is_finished())
    }

    /// Ask the worker to shut down, then kill it if it does not exit in time.
    pub async fn stop(&self) {
        let Some(conn) = self.conn.write().await.take() else {
            return;
        };
        if !conn.reader.is_finished() {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let request = JsonRpcRequest::new(id, METHOD_SHUTDOWN, None);
            if let Err(e) = send(&self.name, &conn, request, SHUTDOWN_GRACE).await {
                debug!(worker = %self.name, error = %e, "Shutdown request failed");
            }
        }
        if let Some(mut child) = conn.child.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(worker = %self.name, %status, "Worker exited"),
                _ => {
                    warn!(worker = %self.name, "Worker did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
        conn.reader.abort();
        info!(worker = %self.name, "Worker stopped");
    }

    pub async fn ping(&self) -> Result<(), ToolError> {
        self.request(METHOD_PING, None).await.map(|_| ())
    }

    /// Send one request and wait for its result.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let conn = self
            .conn
            .read()
            .await
            .clone()
            .filter(|c| !c.reader.is_finished())
            .ok_or_else(|| ToolError::NotRunning(self.name.clone()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        send(&self.name, &conn, JsonRpcRequest::new(id, method, params), self.timeout)
            .await?
            .into_result()
    }
}

impl std::fmt::Debug for StdioToolWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioToolWorker")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn attach<R>(name: &str, reader: R, writer: BoxedWriter, child: Option<Child>) -> Connection
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let pending: PendingMap = Arc::new(std::sync::Mutex::new(HashMap::new()));
    let pending_clone = Arc::clone(&pending);
    let worker = name.to_string();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(resp) => match resp.id {
                    Some(id) => {
                        let waiter = lock_pending(&pending_clone).remove(&id);
                        if let Some(sender) = waiter {
                            let _ = sender.send(resp);
                        }
                    }
                    None => warn!(worker = %worker, error = ?resp.error, "Worker reported an uncorrelated error"),
                },
                Err(e) => warn!(worker = %worker, error = %e, "Failed to parse worker response line"),
            }
        }
        // Dropping the senders wakes every caller still waiting.
        lock_pending(&pending_clone).clear();
        debug!(worker = %worker, "Worker output closed");
    });

    Connection {
        writer: Mutex::new(writer),
        pending,
        child: Mutex::new(child),
        reader,
    }
}

async fn send(
    worker: &str,
    conn: &Connection,
    request: JsonRpcRequest,
    timeout: Duration,
) -> Result<JsonRpcResponse, ToolError> {
    let id = request.id;
    let (tx, rx) = oneshot::channel();
    lock_pending(&conn.pending).insert(id, tx);
    let _waiting = PendingGuard {
        pending: &conn.pending,
        id,
    };

    let mut line = serde_json::to_string(&request)
        .map_err(|e| ToolError::Transport(format!("failed to serialize request: {e}")))?;
    line.push('\n');
    debug!(worker = %worker, id, method = %request.method, "Sending request");

    let written = {
        let mut writer = conn.writer.lock().await;
        match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        }
    };
    if let Err(e) = written {
        return Err(ToolError::Transport(format!(
            "failed to write to worker '{worker}': {e}"
        )));
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) => Err(ToolError::Transport(format!(
            "worker '{worker}' closed the connection"
        ))),
        Err(_) => Err(ToolError::Timeout {
            elapsed_ms: timeout.as_millis() as u64,
        }),
    }
}

#[async_trait]
impl ToolChannel for StdioToolWorker {
    async fn invoke(&self, tool: &str, payload: Value) -> Result<Value, ToolError> {
        self.request(
            METHOD_CALL_TOOL,
            Some(json!({ "name": tool, "arguments": payload })),
        )
        .await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let result = self.request(METHOD_LIST_TOOLS, None).await?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ToolError::Malformed(format!("invalid tools/list result: {e}")))?;
        Ok(list.tools)
    }
}

/// Several workers behind one channel, routed by tool name.
#[derive(Debug, Default)]
pub struct WorkerSet {
    workers: Vec<Arc<StdioToolWorker>>,
    routes: RwLock<HashMap<String, usize>>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[WorkerConfig]) -> Self {
        configs
            .iter()
            .cloned()
            .fold(Self::new(), |set, config| set.with_worker(StdioToolWorker::new(config)))
    }

    pub fn with_worker(mut self, worker: StdioToolWorker) -> Self {
        self.workers.push(Arc::new(worker));
        self
    }

    pub fn workers(&self) -> &[Arc<StdioToolWorker>] {
        &self.workers
    }

    /// Start every worker and learn which tools each one serves. When two
    /// workers serve the same tool, the first one declared wins.
    pub async fn start_all(&self) -> Result<usize, ToolError> {
        let mut routes = HashMap::new();
        for (index, worker) in self.workers.iter().enumerate() {
            worker.start().await?;
            for tool in worker.list_tools().await? {
                if let Some(&owner) = routes.get(&tool.name) {
                    let owner: &Arc<StdioToolWorker> = &self.workers[owner];
                    warn!(tool = %tool.name, kept = %owner.name(), ignored = %worker.name(), "Tool served by two workers");
                    continue;
                }
                routes.insert(tool.name, index);
            }
        }
        let count = routes.len();
        info!(workers = self.workers.len(), tools = count, "Workers started");
        *self.routes.write().await = routes;
        Ok(count)
    }

    pub async fn stop_all(&self) {
        for worker in &self.workers {
            worker.stop().await;
        }
        self.routes.write().await.clear();
    }

    async fn route(&self, tool: &str) -> Result<Arc<StdioToolWorker>, ToolError> {
        let routes = self.routes.read().await;
        routes
            .get(tool)
            .map(|&index| Arc::clone(&self.workers[index]))
            .ok_or_else(|| ToolError::NotFound(tool.to_string()))
    }
}

#[async_trait]
impl ToolChannel for WorkerSet {
    async fn invoke(&self, tool: &str, payload: Value) -> Result<Value, ToolError> {
        self.route(tool).await?.invoke(tool, payload).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let mut tools = Vec::new();
        for worker in &self.workers {
            if worker.is_running().await {
                tools.extend(worker.list_tools().await?);
            }
        }
        Ok(tools)
    }
}
