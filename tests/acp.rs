//! End-to-end behavior of the agent/client adapters over duplex pipes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use acp_rpc::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;

type CallLog = Arc<Mutex<Vec<String>>>;

// ── Test doubles ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct TestClient {
    log: CallLog,
    permission_responses: Mutex<Vec<RequestPermissionOutcome>>,
    written_files: Mutex<Vec<(PathBuf, String)>>,
    session_updates: Mutex<Vec<SessionNotification>>,
    updates_completed: AtomicUsize,
    update_delay: Option<Duration>,
    write_delay: Option<Duration>,
}

impl TestClient {
    fn log(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Client for TestClient {
    async fn request_permission(
        &self,
        _ctx: CancelScope,
        request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse> {
        let title = request.tool_call.title.unwrap_or_default();
        self.log(format!("requestPermission called: {title}"));
        let outcome = self
            .permission_responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(RequestPermissionOutcome::Cancelled);
        Ok(RequestPermissionResponse { outcome })
    }

    async fn read_text_file(
        &self,
        _ctx: CancelScope,
        request: ReadTextFileRequest,
    ) -> Result<ReadTextFileResponse> {
        self.log(format!("readTextFile called: {}", request.path.display()));
        Ok(ReadTextFileResponse {
            content: format!("Content of {}", request.path.display()),
        })
    }

    async fn write_text_file(
        &self,
        _ctx: CancelScope,
        request: WriteTextFileRequest,
    ) -> Result<WriteTextFileResponse> {
        self.log(format!("writeTextFile called: {}", request.path.display()));
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.written_files
            .lock()
            .unwrap()
            .push((request.path, request.content));
        Ok(WriteTextFileResponse::default())
    }

    async fn session_update(
        &self,
        _ctx: CancelScope,
        notification: SessionNotification,
    ) -> Result<()> {
        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }
        self.session_updates.lock().unwrap().push(notification);
        self.updates_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
enum PromptBehavior {
    #[default]
    Respond,
    WaitForCancel,
    StreamUpdates(usize),
    NestedPermission,
}

#[derive(Default)]
struct TestAgent {
    log: CallLog,
    prompts: Mutex<Vec<PromptRequest>>,
    cancellations: Mutex<Vec<SessionId>>,
    prompt_behavior: PromptBehavior,
    prompts_finished: AtomicUsize,
    side: OnceLock<AgentSideConnection>,
}

impl TestAgent {
    fn log(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Agent for TestAgent {
    async fn initialize(
        &self,
        _ctx: CancelScope,
        request: InitializeRequest,
    ) -> Result<InitializeResponse> {
        Ok(InitializeResponse {
            protocol_version: request.protocol_version,
            agent_capabilities: AgentCapabilities { load_session: false },
            auth_methods: vec![],
        })
    }

    async fn authenticate(
        &self,
        _ctx: CancelScope,
        _request: AuthenticateRequest,
    ) -> Result<AuthenticateResponse> {
        Ok(AuthenticateResponse::default())
    }

    async fn new_session(
        &self,
        _ctx: CancelScope,
        request: NewSessionRequest,
    ) -> Result<NewSessionResponse> {
        self.log(format!("newSession called: {}", request.cwd.display()));
        Ok(NewSessionResponse {
            session_id: SessionId::new("test-session"),
        })
    }

    async fn set_session_mode(
        &self,
        _ctx: CancelScope,
        _request: SetSessionModeRequest,
    ) -> Result<SetSessionModeResponse> {
        Ok(SetSessionModeResponse::default())
    }

    async fn prompt(&self, ctx: CancelScope, request: PromptRequest) -> Result<PromptResponse> {
        let session_id = request.session_id.clone();
        self.prompts.lock().unwrap().push(request);

        match self.prompt_behavior {
            PromptBehavior::Respond => Ok(PromptResponse {
                stop_reason: StopReason::EndTurn,
            }),
            PromptBehavior::WaitForCancel => {
                ctx.cancelled().await;
                self.prompts_finished.fetch_add(1, Ordering::SeqCst);
                Ok(PromptResponse {
                    stop_reason: StopReason::Cancelled,
                })
            }
            PromptBehavior::StreamUpdates(count) => {
                let side = self.side.get().expect("side connection not wired");
                let scope = CancelScope::new();
                for _ in 0..count {
                    side.session_update(
                        &scope,
                        SessionNotification {
                            session_id: session_id.clone(),
                            update: SessionUpdate::AgentMessageChunk {
                                content: ContentBlock::text("chunk"),
                            },
                        },
                    )
                    .await?;
                }
                // Give the notifications a moment to be queued peer-side.
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(PromptResponse {
                    stop_reason: StopReason::EndTurn,
                })
            }
            PromptBehavior::NestedPermission => {
                let side = self.side.get().expect("side connection not wired");
                side.request_permission(
                    &ctx,
                    RequestPermissionRequest {
                        session_id,
                        tool_call: ToolCallUpdate {
                            tool_call_id: "call_1".to_string(),
                            title: Some("Test permission".to_string()),
                        },
                        options: vec![PermissionOption {
                            option_id: "allow".to_string(),
                            name: "Allow".to_string(),
                            kind: PermissionOptionKind::AllowOnce,
                        }],
                    },
                )
                .await?;
                Ok(PromptResponse {
                    stop_reason: StopReason::EndTurn,
                })
            }
        }
    }

    async fn cancel(&self, _ctx: CancelScope, notification: CancelNotification) -> Result<()> {
        self.cancellations.lock().unwrap().push(notification.session_id);
        Ok(())
    }
}

/// Fails every operation; exercises error propagation in both directions.
struct FailingAgent;

#[async_trait]
impl Agent for FailingAgent {
    async fn initialize(
        &self,
        _ctx: CancelScope,
        _request: InitializeRequest,
    ) -> Result<InitializeResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Failed to initialize"))
    }

    async fn authenticate(
        &self,
        _ctx: CancelScope,
        _request: AuthenticateRequest,
    ) -> Result<AuthenticateResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Authentication failed"))
    }

    async fn new_session(
        &self,
        _ctx: CancelScope,
        _request: NewSessionRequest,
    ) -> Result<NewSessionResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Failed to create session"))
    }

    async fn set_session_mode(
        &self,
        _ctx: CancelScope,
        _request: SetSessionModeRequest,
    ) -> Result<SetSessionModeResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Failed to set mode"))
    }

    async fn prompt(&self, _ctx: CancelScope, _request: PromptRequest) -> Result<PromptResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Prompt failed"))
    }

    async fn cancel(&self, _ctx: CancelScope, _notification: CancelNotification) -> Result<()> {
        Ok(())
    }
}

struct FailingClient;

#[async_trait]
impl Client for FailingClient {
    async fn request_permission(
        &self,
        _ctx: CancelScope,
        _request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Permission denied"))
    }

    async fn read_text_file(
        &self,
        _ctx: CancelScope,
        _request: ReadTextFileRequest,
    ) -> Result<ReadTextFileResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Read failed"))
    }

    async fn write_text_file(
        &self,
        _ctx: CancelScope,
        _request: WriteTextFileRequest,
    ) -> Result<WriteTextFileResponse> {
        Err(RequestError::new(INTERNAL_ERROR, "Write failed"))
    }

    async fn session_update(
        &self,
        _ctx: CancelScope,
        _notification: SessionNotification,
    ) -> Result<()> {
        Ok(())
    }
}

struct EchoExtensions;

#[async_trait]
impl ExtensionMethodHandler for EchoExtensions {
    async fn handle_extension_method(
        &self,
        _ctx: CancelScope,
        method: &str,
        params: Option<&serde_json::value::RawValue>,
    ) -> Result<Value> {
        if method != "_vendor.test/echo" {
            return Err(RequestError::method_not_found(method));
        }
        let params: Value = params
            .map(|raw| serde_json::from_str(raw.get()).expect("params are valid json"))
            .unwrap_or(Value::Null);
        Ok(json!({ "msg": params["msg"] }))
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

fn connected(
    agent: AgentHandlers,
    client: ClientHandlers,
) -> (AgentSideConnection, ClientSideConnection) {
    let (client_to_agent_w, client_to_agent_r) = tokio::io::duplex(256 * 1024);
    let (agent_to_client_w, agent_to_client_r) = tokio::io::duplex(256 * 1024);

    let agent_conn = AgentSideConnection::new(agent, agent_to_client_w, client_to_agent_r);
    let client_conn = ClientSideConnection::new(client, client_to_agent_w, agent_to_client_r);
    (agent_conn, client_conn)
}

fn write_request(path: &str) -> WriteTextFileRequest {
    WriteTextFileRequest {
        session_id: SessionId::new("test-session"),
        path: PathBuf::from(path),
        content: "test".to_string(),
    }
}

async fn start_session(client_conn: &ClientSideConnection) -> SessionId {
    let ctx = CancelScope::new();
    client_conn
        .initialize(
            &ctx,
            InitializeRequest {
                protocol_version: PROTOCOL_VERSION,
                ..Default::default()
            },
        )
        .await
        .expect("initialize");
    client_conn
        .new_session(
            &ctx,
            NewSessionRequest {
                cwd: PathBuf::from("/"),
                mcp_servers: vec![],
            },
        )
        .await
        .expect("newSession")
        .session_id
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn errors_propagate_in_both_directions() {
    let (agent_conn, client_conn) = connected(
        AgentHandlers::new(Arc::new(FailingAgent)),
        ClientHandlers::new(Arc::new(FailingClient)),
    );
    let ctx = CancelScope::new();

    let err = agent_conn
        .write_text_file(&ctx, write_request("/test.txt"))
        .await
        .unwrap_err();
    assert_eq!(err.message, "Write failed");

    let err = client_conn
        .new_session(
            &ctx,
            NewSessionRequest {
                cwd: PathBuf::from("/test"),
                mcp_servers: vec![],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.message, "Failed to create session");
}

#[tokio::test]
async fn concurrent_requests_all_complete() {
    let client = Arc::new(TestClient {
        write_delay: Some(Duration::from_millis(40)),
        ..Default::default()
    });
    let (agent_conn, _client_conn) = connected(
        AgentHandlers::new(Arc::new(TestAgent::default())),
        ClientHandlers::new(client.clone()),
    );

    let mut calls = Vec::new();
    for path in ["/file1.txt", "/file2.txt", "/file3.txt"] {
        let agent_conn = agent_conn.clone();
        calls.push(tokio::spawn(async move {
            let ctx = CancelScope::new();
            agent_conn.write_text_file(&ctx, write_request(path)).await
        }));
    }
    for call in calls {
        call.await.unwrap().expect("write_text_file");
    }

    assert_eq!(client.written_files.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn sequential_calls_run_in_order() {
    let log: CallLog = Arc::default();
    let client = Arc::new(TestClient {
        log: log.clone(),
        ..Default::default()
    });
    let agent = Arc::new(TestAgent {
        log: log.clone(),
        ..Default::default()
    });
    let (agent_conn, client_conn) = connected(
        AgentHandlers::new(agent),
        ClientHandlers::new(client),
    );
    let ctx = CancelScope::new();

    client_conn
        .new_session(
            &ctx,
            NewSessionRequest {
                cwd: PathBuf::from("/test"),
                mcp_servers: vec![],
            },
        )
        .await
        .unwrap();
    agent_conn
        .write_text_file(&ctx, write_request("/test.txt"))
        .await
        .unwrap();
    agent_conn
        .read_text_file(
            &ctx,
            ReadTextFileRequest {
                session_id: SessionId::new("test-session"),
                path: PathBuf::from("/test.txt"),
                line: None,
                limit: None,
            },
        )
        .await
        .unwrap();
    agent_conn
        .request_permission(
            &ctx,
            RequestPermissionRequest {
                session_id: SessionId::new("test-session"),
                tool_call: ToolCallUpdate {
                    tool_call_id: "tool-123".to_string(),
                    title: Some("Execute command".to_string()),
                },
                options: vec![
                    PermissionOption {
                        option_id: "allow".to_string(),
                        name: "Allow".to_string(),
                        kind: PermissionOptionKind::AllowOnce,
                    },
                    PermissionOption {
                        option_id: "reject".to_string(),
                        name: "Reject".to_string(),
                        kind: PermissionOptionKind::RejectOnce,
                    },
                ],
            },
        )
        .await
        .unwrap();

    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![
            "newSession called: /test",
            "writeTextFile called: /test.txt",
            "readTextFile called: /test.txt",
            "requestPermission called: Execute command",
        ]
    );
}

#[tokio::test]
async fn notifications_reach_both_sides() {
    let client = Arc::new(TestClient::default());
    let agent = Arc::new(TestAgent::default());
    let (agent_conn, client_conn) = connected(
        AgentHandlers::new(agent.clone()),
        ClientHandlers::new(client.clone()),
    );
    let ctx = CancelScope::new();

    agent_conn
        .session_update(
            &ctx,
            SessionNotification {
                session_id: SessionId::new("test-session"),
                update: SessionUpdate::AgentMessageChunk {
                    content: ContentBlock::text("Hello from agent"),
                },
            },
        )
        .await
        .unwrap();
    client_conn
        .cancel(
            &ctx,
            CancelNotification {
                session_id: SessionId::new("test-session"),
            },
        )
        .await
        .unwrap();

    // Notifications are fire-and-forget; flush them with request turnarounds.
    client_conn
        .initialize(
            &ctx,
            InitializeRequest {
                protocol_version: PROTOCOL_VERSION,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    agent_conn
        .read_text_file(
            &ctx,
            ReadTextFileRequest {
                session_id: SessionId::new("test-session"),
                path: PathBuf::from("/x"),
                line: None,
                limit: None,
            },
        )
        .await
        .unwrap();

    let updates = client.session_updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].session_id, SessionId::new("test-session"));
    let cancellations = agent.cancellations.lock().unwrap();
    assert_eq!(*cancellations, vec![SessionId::new("test-session")]);
}

#[tokio::test]
async fn initialize_round_trips_agent_metadata() {
    struct CapableAgent;

    #[async_trait]
    impl Agent for CapableAgent {
        async fn initialize(
            &self,
            _ctx: CancelScope,
            request: InitializeRequest,
        ) -> Result<InitializeResponse> {
            Ok(InitializeResponse {
                protocol_version: request.protocol_version,
                agent_capabilities: AgentCapabilities { load_session: true },
                auth_methods: vec![AuthMethod {
                    id: "oauth".to_string(),
                    name: "OAuth".to_string(),
                    description: Some("Authenticate with OAuth".to_string()),
                }],
            })
        }

        async fn authenticate(
            &self,
            _ctx: CancelScope,
            _request: AuthenticateRequest,
        ) -> Result<AuthenticateResponse> {
            Ok(AuthenticateResponse::default())
        }

        async fn new_session(
            &self,
            _ctx: CancelScope,
            _request: NewSessionRequest,
        ) -> Result<NewSessionResponse> {
            Ok(NewSessionResponse {
                session_id: SessionId::new("test-session"),
            })
        }

        async fn set_session_mode(
            &self,
            _ctx: CancelScope,
            _request: SetSessionModeRequest,
        ) -> Result<SetSessionModeResponse> {
            Ok(SetSessionModeResponse::default())
        }

        async fn prompt(
            &self,
            _ctx: CancelScope,
            _request: PromptRequest,
        ) -> Result<PromptResponse> {
            Ok(PromptResponse {
                stop_reason: StopReason::EndTurn,
            })
        }

        async fn cancel(
            &self,
            _ctx: CancelScope,
            _notification: CancelNotification,
        ) -> Result<()> {
            Ok(())
        }
    }

    let (_agent_conn, client_conn) = connected(
        AgentHandlers::new(Arc::new(CapableAgent)),
        ClientHandlers::new(Arc::new(TestClient::default())),
    );
    let ctx = CancelScope::new();

    let response = client_conn
        .initialize(
            &ctx,
            InitializeRequest {
                protocol_version: PROTOCOL_VERSION,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.protocol_version, PROTOCOL_VERSION);
    assert!(response.agent_capabilities.load_session);
    assert_eq!(response.auth_methods.len(), 1);
    assert_eq!(response.auth_methods[0].id, "oauth");
}

#[tokio::test]
async fn cancelled_prompt_notifies_agent_and_leaves_connection_usable() {
    let agent = Arc::new(TestAgent {
        prompt_behavior: PromptBehavior::WaitForCancel,
        ..Default::default()
    });
    let (_agent_conn, client_conn) = connected(
        AgentHandlers::new(agent.clone()),
        ClientHandlers::new(Arc::new(TestClient::default())),
    );

    let session_id = start_session(&client_conn).await;

    let scope = CancelScope::new();
    let prompt = tokio::spawn({
        let client_conn = client_conn.clone();
        let scope = scope.clone();
        let session_id = session_id.clone();
        async move {
            client_conn
                .prompt(
                    &scope,
                    PromptRequest {
                        session_id,
                        prompt: vec![ContentBlock::text("hello")],
                    },
                )
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    scope.cancel(CancelCause::Cancelled);

    let err = timeout(Duration::from_secs(2), prompt)
        .await
        .expect("prompt did not return after cancel")
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code, REQUEST_CANCELLED);

    // The transport cancel reaches the prompt handler, and the session/cancel
    // notification reaches Agent::cancel.
    timeout(Duration::from_secs(2), async {
        loop {
            let notified = !agent.cancellations.lock().unwrap().is_empty();
            if notified && agent.prompts_finished.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("agent never observed the cancellation");

    // Connection remains usable afterwards.
    let ctx = CancelScope::new();
    client_conn
        .new_session(
            &ctx,
            NewSessionRequest {
                cwd: PathBuf::from("/"),
                mcp_servers: vec![],
            },
        )
        .await
        .expect("newSession after cancel");
}

#[tokio::test]
async fn prompt_returns_only_after_all_session_updates_are_handled() {
    const NUM_UPDATES: usize = 10;

    let client = Arc::new(TestClient {
        update_delay: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let agent = Arc::new(TestAgent {
        prompt_behavior: PromptBehavior::StreamUpdates(NUM_UPDATES),
        ..Default::default()
    });
    let (agent_conn, client_conn) = connected(
        AgentHandlers::new(agent.clone()),
        ClientHandlers::new(client.clone()),
    );
    let _ = agent.side.set(agent_conn);

    let session_id = start_session(&client_conn).await;

    let ctx = CancelScope::new();
    client_conn
        .prompt(
            &ctx,
            PromptRequest {
                session_id,
                prompt: vec![ContentBlock::text("test")],
            },
        )
        .await
        .expect("prompt");

    // Every update the agent streamed before its response must be fully
    // handled by the time prompt() returns.
    assert_eq!(client.updates_completed.load(Ordering::SeqCst), NUM_UPDATES);
}

#[tokio::test]
async fn prompt_handler_can_make_a_nested_request() {
    let client = Arc::new(TestClient::default());
    client
        .permission_responses
        .lock()
        .unwrap()
        .push(RequestPermissionOutcome::Selected {
            option_id: "allow".to_string(),
        });

    let agent = Arc::new(TestAgent {
        prompt_behavior: PromptBehavior::NestedPermission,
        ..Default::default()
    });
    let (agent_conn, client_conn) = connected(
        AgentHandlers::new(agent.clone()),
        ClientHandlers::new(client),
    );
    let _ = agent.side.set(agent_conn);

    let session_id = start_session(&client_conn).await;

    let scope = CancelScope::with_timeout(Duration::from_secs(2));
    let response = client_conn
        .prompt(
            &scope,
            PromptRequest {
                session_id,
                prompt: vec![ContentBlock::text("test")],
            },
        )
        .await
        .expect("nested prompt deadlocked or failed");
    assert_eq!(response.stop_reason, StopReason::EndTurn);
}

#[tokio::test]
async fn extension_request_client_to_agent() {
    let (_agent_conn, client_conn) = connected(
        AgentHandlers::new(Arc::new(TestAgent::default()))
            .with_extensions(Arc::new(EchoExtensions)),
        ClientHandlers::new(Arc::new(TestClient::default())),
    );
    let ctx = CancelScope::new();

    let raw = client_conn
        .call_extension(&ctx, "_vendor.test/echo", json!({"msg": "hi"}))
        .await
        .unwrap();
    let response: Value = serde_json::from_str(raw.get()).unwrap();
    assert_eq!(response["msg"], "hi");
}

#[tokio::test]
async fn extension_request_agent_to_client() {
    let (agent_conn, _client_conn) = connected(
        AgentHandlers::new(Arc::new(TestAgent::default())),
        ClientHandlers::new(Arc::new(TestClient::default()))
            .with_extensions(Arc::new(EchoExtensions)),
    );
    let ctx = CancelScope::new();

    let raw = agent_conn
        .call_extension(&ctx, "_vendor.test/echo", json!({"msg": "hi"}))
        .await
        .unwrap();
    let response: Value = serde_json::from_str(raw.get()).unwrap();
    assert_eq!(response["msg"], "hi");
}

#[tokio::test]
async fn unknown_extension_request_is_method_not_found() {
    let (_agent_conn, client_conn) = connected(
        AgentHandlers::new(Arc::new(TestAgent::default())),
        ClientHandlers::new(Arc::new(TestClient::default())),
    );
    let ctx = CancelScope::with_timeout(Duration::from_secs(1));

    let err = client_conn
        .call_extension(&ctx, "_vendor.test/missing", json!({"msg": "hi"}))
        .await
        .unwrap_err();
    assert_eq!(err.code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn extension_calls_require_the_underscore_prefix() {
    let (_agent_conn, client_conn) = connected(
        AgentHandlers::new(Arc::new(TestAgent::default())),
        ClientHandlers::new(Arc::new(TestClient::default())),
    );
    let ctx = CancelScope::new();

    let err = client_conn
        .call_extension(&ctx, "vendor.test/echo", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code, INVALID_REQUEST);
}

#[tokio::test]
async fn missing_capabilities_answer_method_not_found() {
    let (agent_conn, client_conn) = connected(
        AgentHandlers::new(Arc::new(TestAgent::default())),
        ClientHandlers::new(Arc::new(TestClient::default())),
    );
    let ctx = CancelScope::new();

    // No loader on the agent side.
    let err = client_conn
        .load_session(
            &ctx,
            LoadSessionRequest {
                session_id: SessionId::new("s-1"),
                cwd: PathBuf::from("/"),
                mcp_servers: vec![],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, METHOD_NOT_FOUND);

    // No terminal handler on the client side.
    let err = agent_conn
        .create_terminal(
            &ctx,
            CreateTerminalRequest {
                session_id: SessionId::new("s-1"),
                command: "ls".to_string(),
                args: vec![],
                cwd: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, METHOD_NOT_FOUND);
}
