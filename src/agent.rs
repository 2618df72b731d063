//! Agent-side view of a connection.
//!
//! An agent process wraps its [`Agent`] implementation in an
//! [`AgentSideConnection`]: inbound requests from the editor are dispatched
//! to the implementation, and the connection exposes the client-directed
//! operations (file access, permission prompts, session updates, terminals).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::cancel::CancelScope;
use crate::connection::{decode_params, encode_result, Connection, MethodHandler};
use crate::error::{RequestError, Result};
use crate::extension::{is_extension_method, validate_extension_method_name, ExtensionMethodHandler};
use crate::schema::{
    methods, AuthenticateRequest, AuthenticateResponse, CancelNotification,
    CreateTerminalRequest, CreateTerminalResponse, InitializeRequest, InitializeResponse,
    KillTerminalCommandRequest, KillTerminalCommandResponse, LoadSessionRequest,
    LoadSessionResponse, NewSessionRequest, NewSessionResponse, PromptRequest, PromptResponse,
    ReadTextFileRequest, ReadTextFileResponse, ReleaseTerminalRequest, ReleaseTerminalResponse,
    RequestPermissionRequest, RequestPermissionResponse, SessionNotification,
    SetSessionModeRequest, SetSessionModeResponse, TerminalOutputRequest, TerminalOutputResponse,
    WaitForTerminalExitRequest, WaitForTerminalExitResponse, WriteTextFileRequest,
    WriteTextFileResponse,
};

/// Core agent operations, served by the agent process.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn initialize(
        &self,
        ctx: CancelScope,
        request: InitializeRequest,
    ) -> Result<InitializeResponse>;

    async fn authenticate(
        &self,
        ctx: CancelScope,
        request: AuthenticateRequest,
    ) -> Result<AuthenticateResponse>;

    async fn new_session(
        &self,
        ctx: CancelScope,
        request: NewSessionRequest,
    ) -> Result<NewSessionResponse>;

    async fn set_session_mode(
        &self,
        ctx: CancelScope,
        request: SetSessionModeRequest,
    ) -> Result<SetSessionModeResponse>;

    async fn prompt(&self, ctx: CancelScope, request: PromptRequest) -> Result<PromptResponse>;

    /// `session/cancel` notification: stop the session's current turn.
    async fn cancel(&self, ctx: CancelScope, notification: CancelNotification) -> Result<()>;
}

/// Optional capability: restoring previously persisted sessions.
#[async_trait]
pub trait AgentLoader: Send + Sync {
    async fn load_session(
        &self,
        ctx: CancelScope,
        request: LoadSessionRequest,
    ) -> Result<LoadSessionResponse>;
}

/// Handler bundle installed on an agent-side connection.
///
/// Capability presence is expressed by the optional fields: a missing loader
/// or extension handler answers the corresponding methods with
/// "method not found".
pub struct AgentHandlers {
    pub agent: Arc<dyn Agent>,
    pub loader: Option<Arc<dyn AgentLoader>>,
    pub extensions: Option<Arc<dyn ExtensionMethodHandler>>,
}

impl AgentHandlers {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            agent,
            loader: None,
            extensions: None,
        }
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn AgentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Arc<dyn ExtensionMethodHandler>) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

/// Routes inbound methods to the agent implementation; the connection only
/// holds this function object, never a back-reference from domain code.
struct AgentRouter {
    handlers: AgentHandlers,
}

#[async_trait]
impl MethodHandler for AgentRouter {
    async fn handle_method(
        &self,
        ctx: CancelScope,
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<serde_json::Value> {
        if is_extension_method(method) {
            return match &self.handlers.extensions {
                Some(extensions) => extensions.handle_extension_method(ctx, method, params).await,
                None => Err(RequestError::method_not_found(method)),
            };
        }

        let agent = &self.handlers.agent;
        match method {
            methods::INITIALIZE => {
                encode_result(&agent.initialize(ctx, decode_params(params)?).await?)
            }
            methods::AUTHENTICATE => {
                encode_result(&agent.authenticate(ctx, decode_params(params)?).await?)
            }
            methods::SESSION_NEW => {
                encode_result(&agent.new_session(ctx, decode_params(params)?).await?)
            }
            methods::SESSION_LOAD => match &self.handlers.loader {
                Some(loader) => {
                    encode_result(&loader.load_session(ctx, decode_params(params)?).await?)
                }
                None => Err(RequestError::method_not_found(method)),
            },
            methods::SESSION_SET_MODE => {
                encode_result(&agent.set_session_mode(ctx, decode_params(params)?).await?)
            }
            methods::SESSION_PROMPT => {
                encode_result(&agent.prompt(ctx, decode_params(params)?).await?)
            }
            methods::SESSION_CANCEL => {
                agent.cancel(ctx, decode_params(params)?).await?;
                Ok(serde_json::Value::Null)
            }
            _ => Err(RequestError::method_not_found(method)),
        }
    }
}

/// The agent process's connection to its client (editor).
#[derive(Clone)]
pub struct AgentSideConnection {
    conn: Connection,
}

impl AgentSideConnection {
    /// Bind `handlers` to the stream pair. `peer_input` carries bytes to the
    /// client, `peer_output` bytes from it. Must be called within a Tokio
    /// runtime.
    pub fn new<W, R>(handlers: AgentHandlers, peer_input: W, peer_output: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            conn: Connection::new(AgentRouter { handlers }, peer_input, peer_output),
        }
    }

    /// Completes when the client disconnects.
    pub async fn closed(&self) {
        self.conn.closed().await;
    }

    /// The underlying transport connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Stream a `session/update` notification to the client.
    pub async fn session_update(
        &self,
        ctx: &CancelScope,
        notification: SessionNotification,
    ) -> Result<()> {
        self.conn
            .notify(ctx, methods::SESSION_UPDATE, Some(&notification))
            .await
    }

    pub async fn request_permission(
        &self,
        ctx: &CancelScope,
        request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse> {
        self.conn
            .request(ctx, methods::SESSION_REQUEST_PERMISSION, Some(&request))
            .await
    }

    pub async fn read_text_file(
        &self,
        ctx: &CancelScope,
        request: ReadTextFileRequest,
    ) -> Result<ReadTextFileResponse> {
        self.conn
            .request(ctx, methods::FS_READ_TEXT_FILE, Some(&request))
            .await
    }

    pub async fn write_text_file(
        &self,
        ctx: &CancelScope,
        request: WriteTextFileRequest,
    ) -> Result<WriteTextFileResponse> {
        self.conn
            .request(ctx, methods::FS_WRITE_TEXT_FILE, Some(&request))
            .await
    }

    pub async fn create_terminal(
        &self,
        ctx: &CancelScope,
        request: CreateTerminalRequest,
    ) -> Result<CreateTerminalResponse> {
        self.conn
            .request(ctx, methods::TERMINAL_CREATE, Some(&request))
            .await
    }

    pub async fn terminal_output(
        &self,
        ctx: &CancelScope,
        request: TerminalOutputRequest,
    ) -> Result<TerminalOutputResponse> {
        self.conn
            .request(ctx, methods::TERMINAL_OUTPUT, Some(&request))
            .await
    }

    pub async fn kill_terminal_command(
        &self,
        ctx: &CancelScope,
        request: KillTerminalCommandRequest,
    ) -> Result<KillTerminalCommandResponse> {
        self.conn
            .request(ctx, methods::TERMINAL_KILL, Some(&request))
            .await
    }

    pub async fn release_terminal(
        &self,
        ctx: &CancelScope,
        request: ReleaseTerminalRequest,
    ) -> Result<ReleaseTerminalResponse> {
        self.conn
            .request(ctx, methods::TERMINAL_RELEASE, Some(&request))
            .await
    }

    pub async fn wait_for_terminal_exit(
        &self,
        ctx: &CancelScope,
        request: WaitForTerminalExitRequest,
    ) -> Result<WaitForTerminalExitResponse> {
        self.conn
            .request(ctx, methods::TERMINAL_WAIT_FOR_EXIT, Some(&request))
            .await
    }

    /// Send an extension-method request (name must start with `_`) to the
    /// client and return its raw result.
    pub async fn call_extension(
        &self,
        ctx: &CancelScope,
        method: &str,
        params: impl Serialize,
    ) -> Result<Box<RawValue>> {
        validate_extension_method_name(method)?;
        self.conn.request(ctx, method, Some(params)).await
    }

    /// Send an extension-method notification (name must start with `_`).
    pub async fn notify_extension(
        &self,
        ctx: &CancelScope,
        method: &str,
        params: impl Serialize,
    ) -> Result<()> {
        validate_extension_method_name(method)?;
        self.conn.notify(ctx, method, Some(params)).await
    }
}
