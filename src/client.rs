//! Client-side view of a connection.
//!
//! An editor wraps its [`Client`] implementation in a
//! [`ClientSideConnection`]: inbound requests from the agent (file access,
//! permissions, terminals) are dispatched to the implementation, and the
//! connection exposes the agent-directed operations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::cancel::CancelScope;
use crate::connection::{decode_params, encode_result, Connection, MethodHandler};
use crate::error::{RequestError, Result, REQUEST_CANCELLED};
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

/// Core client operations, served by the editor.
#[async_trait]
pub trait Client: Send + Sync {
    async fn request_permission(
        &self,
        ctx: CancelScope,
        request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse>;

    async fn read_text_file(
        &self,
        ctx: CancelScope,
        request: ReadTextFileRequest,
    ) -> Result<ReadTextFileResponse>;

    async fn write_text_file(
        &self,
        ctx: CancelScope,
        request: WriteTextFileRequest,
    ) -> Result<WriteTextFileResponse>;

    /// `session/update` notification: streamed progress for a running turn.
    async fn session_update(
        &self,
        ctx: CancelScope,
        notification: SessionNotification,
    ) -> Result<()>;
}

/// Optional capability: embedded terminals.
#[async_trait]
pub trait TerminalHandler: Send + Sync {
    async fn create_terminal(
        &self,
        ctx: CancelScope,
        request: CreateTerminalRequest,
    ) -> Result<CreateTerminalResponse>;

    async fn terminal_output(
        &self,
        ctx: CancelScope,
        request: TerminalOutputRequest,
    ) -> Result<TerminalOutputResponse>;

    async fn kill_terminal_command(
        &self,
        ctx: CancelScope,
        request: KillTerminalCommandRequest,
    ) -> Result<KillTerminalCommandResponse>;

    async fn release_terminal(
        &self,
        ctx: CancelScope,
        request: ReleaseTerminalRequest,
    ) -> Result<ReleaseTerminalResponse>;

    async fn wait_for_terminal_exit(
        &self,
        ctx: CancelScope,
        request: WaitForTerminalExitRequest,
    ) -> Result<WaitForTerminalExitResponse>;
}

/// Handler bundle installed on a client-side connection.
///
/// A missing terminal or extension handler answers the corresponding methods
/// with "method not found".
pub struct ClientHandlers {
    pub client: Arc<dyn Client>,
    pub terminal: Option<Arc<dyn TerminalHandler>>,
    pub extensions: Option<Arc<dyn ExtensionMethodHandler>>,
}

impl ClientHandlers {
    pub fn new(client: Arc<dyn Client>) -> Self {
        Self {
            client,
            terminal: None,
            extensions: None,
        }
    }

    #[must_use]
    pub fn with_terminal(mut self, terminal: Arc<dyn TerminalHandler>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Arc<dyn ExtensionMethodHandler>) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

struct ClientRouter {
    handlers: ClientHandlers,
}

impl ClientRouter {
    async fn dispatch_terminal(
        &self,
        ctx: CancelScope,
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<serde_json::Value> {
        let Some(terminal) = &self.handlers.terminal else {
            return Err(RequestError::method_not_found(method));
        };
        match method {
            methods::TERMINAL_CREATE => {
                encode_result(&terminal.create_terminal(ctx, decode_params(params)?).await?)
            }
            methods::TERMINAL_OUTPUT => {
                encode_result(&terminal.terminal_output(ctx, decode_params(params)?).await?)
            }
            methods::TERMINAL_KILL => encode_result(
                &terminal
                    .kill_terminal_command(ctx, decode_params(params)?)
                    .await?,
            ),
            methods::TERMINAL_RELEASE => encode_result(
                &terminal
                    .release_terminal(ctx, decode_params(params)?)
                    .await?,
            ),
            methods::TERMINAL_WAIT_FOR_EXIT => encode_result(
                &terminal
                    .wait_for_terminal_exit(ctx, decode_params(params)?)
                    .await?,
            ),
            _ => Err(RequestError::method_not_found(method)),
        }
    }
}

#[async_trait]
impl MethodHandler for ClientRouter {
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
        if method.starts_with("terminal/") {
            return self.dispatch_terminal(ctx, method, params).await;
        }

        let client = &self.handlers.client;
        match method {
            methods::SESSION_REQUEST_PERMISSION => encode_result(
                &client
                    .request_permission(ctx, decode_params(params)?)
                    .await?,
            ),
            methods::FS_READ_TEXT_FILE => {
                encode_result(&client.read_text_file(ctx, decode_params(params)?).await?)
            }
            methods::FS_WRITE_TEXT_FILE => {
                encode_result(&client.write_text_file(ctx, decode_params(params)?).await?)
            }
            methods::SESSION_UPDATE => {
                client.session_update(ctx, decode_params(params)?).await?;
                Ok(serde_json::Value::Null)
            }
            _ => Err(RequestError::method_not_found(method)),
        }
    }
}

/// The editor's connection to an agent.
#[derive(Clone)]
pub struct ClientSideConnection {
    conn: Connection,
}

impl ClientSideConnection {
    /// Bind `handlers` to the stream pair. `peer_input` carries bytes to the
    /// agent, `peer_output` bytes from it. Must be called within a Tokio
    /// runtime.
    pub fn new<W, R>(handlers: ClientHandlers, peer_input: W, peer_output: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            conn: Connection::new(ClientRouter { handlers }, peer_input, peer_output),
        }
    }

    /// Completes when the agent disconnects.
    pub async fn closed(&self) {
        self.conn.closed().await;
    }

    /// The underlying transport connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn initialize(
        &self,
        ctx: &CancelScope,
        request: InitializeRequest,
    ) -> Result<InitializeResponse> {
        self.conn
            .request(ctx, methods::INITIALIZE, Some(&request))
            .await
    }

    pub async fn authenticate(
        &self,
        ctx: &CancelScope,
        request: AuthenticateRequest,
    ) -> Result<AuthenticateResponse> {
        self.conn
            .request(ctx, methods::AUTHENTICATE, Some(&request))
            .await
    }

    pub async fn new_session(
        &self,
        ctx: &CancelScope,
        request: NewSessionRequest,
    ) -> Result<NewSessionResponse> {
        self.conn
            .request(ctx, methods::SESSION_NEW, Some(&request))
            .await
    }

    pub async fn load_session(
        &self,
        ctx: &CancelScope,
        request: LoadSessionRequest,
    ) -> Result<LoadSessionResponse> {
        self.conn
            .request(ctx, methods::SESSION_LOAD, Some(&request))
            .await
    }

    pub async fn set_session_mode(
        &self,
        ctx: &CancelScope,
        request: SetSessionModeRequest,
    ) -> Result<SetSessionModeResponse> {
        self.conn
            .request(ctx, methods::SESSION_SET_MODE, Some(&request))
            .await
    }

    /// Run a prompt turn.
    ///
    /// Cancelling `ctx` makes the transport send `$/cancel_request` for the
    /// in-flight call; this wrapper additionally sends a best-effort
    /// `session/cancel` so the agent ends the turn itself.
    pub async fn prompt(
        &self,
        ctx: &CancelScope,
        request: PromptRequest,
    ) -> Result<PromptResponse> {
        let session_id = request.session_id.clone();
        let outcome = self
            .conn
            .request(ctx, methods::SESSION_PROMPT, Some(&request))
            .await;

        if let Err(err) = &outcome {
            if err.code == REQUEST_CANCELLED {
                let scope = CancelScope::new();
                let notification = CancelNotification { session_id };
                if let Err(notify_err) = self
                    .conn
                    .notify(&scope, methods::SESSION_CANCEL, Some(&notification))
                    .await
                {
                    debug!(%notify_err, "failed to send session/cancel");
                }
            }
        }
        outcome
    }

    /// Send a `session/cancel` notification.
    pub async fn cancel(
        &self,
        ctx: &CancelScope,
        notification: CancelNotification,
    ) -> Result<()> {
        self.conn
            .notify(ctx, methods::SESSION_CANCEL, Some(&notification))
            .await
    }

    /// Send an extension-method request (name must start with `_`) to the
    /// agent and return its raw result.
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
