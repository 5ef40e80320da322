//! IPC (Inter-Process Communication) module for DocBridge backend
//!
//! This module provides Unix domain socket communication between clients
//! and the backend daemon. Messages are JSON, one per line.
//!
//! Requests on a connection are processed concurrently so that a
//! `CancelRequest` can reach an `OpenDocument` that is still waiting for its
//! download. Responses carry the id of the request they answer and may
//! arrive out of order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ApiHandlers, ConnectionId, DocumentInfo, OpenedDocument, ThumbnailInfo};
use crate::config::IpcConfig;
use crate::error::{BackendError, BackendResult, IpcError, UserFriendlyError};
use docbridge_shared::logging::sanitize_log_message;
use docbridge_shared::{Root, SizeHint};

/// IPC server that handles Unix socket communication
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
    api: Arc<ApiHandlers>,
    active_connections: Arc<AtomicUsize>,
    max_connections: usize,
    log_requests: bool,
    started: Instant,
}

/// Request message from client to backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcRequest {
    /// Unique request ID for correlation and cancellation
    pub request_id: String,
    /// The actual request
    pub request: Request,
}

/// Response message from backend to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Request ID this response corresponds to
    pub request_id: String,
    /// Success or error result
    pub result: RequestResult,
}

/// Available request types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Ping {
        client_info: Option<String>,
    },

    // Browsing
    ListRoots,
    GetDocument {
        document_id: String,
    },
    ListChildren {
        parent_id: String,
    },
    IsChildDocument {
        parent_id: String,
        document_id: String,
    },
    SearchDocuments {
        root_id: String,
        query: String,
    },

    // Content
    OpenDocument {
        document_id: String,
        mode: String,
    },
    CloseDocument {
        handle_id: Uuid,
    },
    GetThumbnail {
        document_id: String,
        #[serde(default)]
        size_hint: SizeHint,
    },
    CreateDocument {
        parent_id: String,
        mime_type: String,
        display_name: String,
    },

    /// Cancel the pending `OpenDocument` sent with `target_request_id`
    CancelRequest {
        target_request_id: String,
    },
}

/// Request result (success or error)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestResult {
    Success(ResponseData),
    Error {
        error_type: String,
        message: String,
        details: Option<String>,
    },
}

/// Response data for successful requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    Pong {
        server_version: String,
        uptime_seconds: u64,
    },
    Roots {
        roots: Vec<Root>,
    },
    Document {
        document: DocumentInfo,
    },
    Children {
        documents: Vec<DocumentInfo>,
    },
    IsChild {
        is_child: bool,
    },
    SearchResults {
        documents: Vec<DocumentInfo>,
        total_matches: usize,
    },
    DocumentOpened {
        opened: OpenedDocument,
    },
    /// The open was cancelled before the download completed
    NoContent,
    DocumentClosed,
    Thumbnail {
        thumbnail: ThumbnailInfo,
    },
    DocumentCreated {
        document: Option<DocumentInfo>,
    },
    CancelResult {
        cancelled: bool,
    },
}

impl RequestResult {
    fn from_error(e: &BackendError) -> Self {
        RequestResult::Error {
            error_type: e.category().to_string(),
            message: e.user_message(),
            details: Some(e.to_string()),
        }
    }
}

impl IpcServer {
    /// Create a new IPC server
    pub async fn new(config: &IpcConfig, api: Arc<ApiHandlers>) -> BackendResult<Self> {
        let socket_path = config.socket_path.clone();
        let bind_error = || IpcError::SocketBind {
            path: socket_path.to_string_lossy().to_string(),
        };

        // Remove existing socket file if it exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(|_| bind_error())?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| bind_error())?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(|_| bind_error())?;

        // Set socket permissions (owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&socket_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&socket_path, perms).map_err(|e| {
                IpcError::SocketPermissions {
                    reason: e.to_string(),
                }
            })?;
        }

        info!("IPC server bound to socket: {:?}", socket_path);

        Ok(Self {
            listener,
            socket_path,
            api,
            active_connections: Arc::new(AtomicUsize::new(0)),
            max_connections: config.max_connections,
            log_requests: config.log_requests,
            started: Instant::now(),
        })
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Run the IPC server
    pub async fn run(self) -> Result<()> {
        info!("Starting IPC server");

        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let current = self.active_connections.load(Ordering::SeqCst);
                    if current >= self.max_connections {
                        warn!("{}, rejecting new connection", IpcError::TooManyConnections);
                        drop(stream);
                        continue;
                    }
                    self.active_connections.fetch_add(1, Ordering::SeqCst);

                    let api = Arc::clone(&self.api);
                    let active = Arc::clone(&self.active_connections);
                    let log_requests = self.log_requests;
                    let started = self.started;
                    tokio::spawn(async move {
                        debug!("Starting client handler task");
                        if let Err(e) = Self::handle_client(stream, api, log_requests, started).await
                        {
                            error!("Client handler error: {}", e);
                        }
                        active.fetch_sub(1, Ordering::SeqCst);
                        debug!("Client handler task completed");
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Handle a client connection
    ///
    /// When the client goes away its pending opens are cancelled, in-flight
    /// requests are drained, and any handle it left open is closed so the
    /// upload on close still happens.
    async fn handle_client(
        stream: UnixStream,
        api: Arc<ApiHandlers>,
        log_requests: bool,
        started: Instant,
    ) -> Result<()> {
        let connection: ConnectionId = Uuid::new_v4();
        info!("New client {} connected to backend", connection);

        let (reader, mut writer) = stream.into_split();
        let (responses, mut outgoing) = mpsc::unbounded_channel::<IpcResponse>();

        let write_task = tokio::spawn(async move {
            while let Some(response) = outgoing.recv().await {
                let response_json = serde_json::to_string(&response).map_err(|e| {
                    IpcError::ResponseSerialization {
                        reason: e.to_string(),
                    }
                })?;
                writer
                    .write_all(response_json.as_bytes())
                    .await
                    .context("Failed to write response")?;
                writer
                    .write_all(b"\n")
                    .await
                    .context("Failed to write newline")?;
                writer.flush().await.context("Failed to flush response")?;
            }
            Ok::<_, anyhow::Error>(())
        });

        let mut requests = JoinSet::new();
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Failed to read request from {}: {}", connection, e);
                            break;
                        }
                    };
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if log_requests {
                        debug!("Received request: {}", sanitize_log_message(&line));
                    }

                    let api = Arc::clone(&api);
                    let responses = responses.clone();
                    requests.spawn(async move {
                        let response =
                            Self::process_request(&line, &api, connection, started).await;
                        if responses.send(response).is_err() {
                            debug!("Client went away before its response was ready");
                        }
                    });
                }
                Some(_) = requests.join_next(), if !requests.is_empty() => {}
            }
        }

        info!("Client {} disconnected from backend", connection);
        let cancelled = api.cancel_connection_requests(connection).await;
        if cancelled > 0 {
            debug!("Cancelled {} pending opens of {}", cancelled, connection);
        }
        while requests.join_next().await.is_some() {}
        let closed = api.close_connection_handles(connection).await;
        if closed > 0 {
            info!("Closed {} documents left open by {}", closed, connection);
        }

        drop(responses);
        if let Err(e) = write_task.await.context("Response writer panicked")? {
            debug!("Response writer for {} stopped: {}", connection, e);
        }
        Ok(())
    }

    /// Process a request from a client
    pub(crate) async fn process_request(
        request_line: &str,
        api: &ApiHandlers,
        connection: ConnectionId,
        started: Instant,
    ) -> IpcResponse {
        let request: IpcRequest = match serde_json::from_str(request_line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                let error: BackendError = IpcError::InvalidRequest {
                    reason: e.to_string(),
                }
                .into();
                return IpcResponse {
                    request_id: "unknown".to_string(),
                    result: RequestResult::from_error(&error),
                };
            }
        };

        debug!("Processing request: {:?}", request.request);
        let request_id = request.request_id.clone();
        let result = match Self::dispatch(request, api, connection, started).await {
            Ok(data) => RequestResult::Success(data),
            Err(e) => {
                warn!("Request {} failed: {}", request_id, e);
                RequestResult::from_error(&e)
            }
        };

        IpcResponse { request_id, result }
    }

    async fn dispatch(
        request: IpcRequest,
        api: &ApiHandlers,
        connection: ConnectionId,
        started: Instant,
    ) -> BackendResult<ResponseData> {
        let data = match request.request {
            Request::Ping { client_info } => {
                if let Some(info) = client_info {
                    debug!("Ping from {}", info);
                }
                ResponseData::Pong {
                    server_version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_seconds: started.elapsed().as_secs(),
                }
            }
            Request::ListRoots => ResponseData::Roots {
                roots: api.list_roots().await?,
            },
            Request::GetDocument { document_id } => ResponseData::Document {
                document: api.get_document(document_id).await?,
            },
            Request::ListChildren { parent_id } => ResponseData::Children {
                documents: api.list_children(parent_id).await?,
            },
            Request::IsChildDocument {
                parent_id,
                document_id,
            } => ResponseData::IsChild {
                is_child: api.is_child_document(parent_id, document_id).await?,
            },
            Request::SearchDocuments { root_id, query } => {
                let documents = api.search(root_id, query).await?;
                ResponseData::SearchResults {
                    total_matches: documents.len(),
                    documents,
                }
            }
            Request::OpenDocument { document_id, mode } => {
                match api
                    .open_document(connection, request.request_id, document_id, mode)
                    .await?
                {
                    Some(opened) => ResponseData::DocumentOpened { opened },
                    None => ResponseData::NoContent,
                }
            }
            Request::CloseDocument { handle_id } => {
                api.close_document(connection, handle_id).await?;
                ResponseData::DocumentClosed
            }
            Request::GetThumbnail {
                document_id,
                size_hint,
            } => ResponseData::Thumbnail {
                thumbnail: api.get_thumbnail(document_id, size_hint).await?,
            },
            Request::CreateDocument {
                parent_id,
                mime_type,
                display_name,
            } => ResponseData::DocumentCreated {
                document: api
                    .create_document(parent_id, mime_type, display_name)
                    .await?,
            },
            Request::CancelRequest { target_request_id } => ResponseData::CancelResult {
                cancelled: api.cancel_request(connection, &target_request_id).await,
            },
        };
        Ok(data)
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!("Could not remove socket {:?}: {}", self.socket_path, e);
        }
    }
}
