//! Transport session. Drives one connection from connect to close.
//!
//! State machine:
//! `Init → Connected → { AwaitingRequest → Processing → AwaitingRequest }* → Closed`
//!
//! One frame is read, dispatched, answered, and only then is the next frame
//! read. A close notification therefore never interrupts a call in flight.

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use super::dispatcher::Dispatcher;
use super::errors::SessionError;
use super::transport::LineTransport;
use super::types::{error_codes, JsonRpcRequest, JsonRpcResponse, ToolCallParams};

/// MCP protocol revision advertised in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connected,
    AwaitingRequest,
    Processing,
    Closed,
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Input stream reached end-of-file.
    EndOfStream,
    /// Peer sent `shutdown` or `exit`.
    CloseNotification,
}

/// Counters reported when the session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: CloseReason,
    pub messages: u64,
    pub tool_calls: u64,
}

/// What to do after handling one message.
enum Flow {
    Continue,
    Close,
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// One end-to-end connection lifecycle over a line transport.
pub struct Session<R, W> {
    transport: LineTransport<R, W>,
    dispatcher: Dispatcher,
    server_name: String,
    state: SessionState,
    messages: u64,
    tool_calls: u64,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create an unconnected session.
    pub fn new(reader: R, writer: W, dispatcher: Dispatcher, server_name: &str) -> Self {
        Self {
            transport: LineTransport::new(reader, writer),
            dispatcher,
            server_name: server_name.to_string(),
            state: SessionState::Init,
            messages: 0,
            tool_calls: 0,
        }
    }

    /// Attach to the streams. Must be called once before [`Session::run`].
    pub async fn connect(&mut self) {
        if self.state == SessionState::Init {
            self.state = SessionState::Connected;
            tracing::info!(
                server = %self.server_name,
                tools = self.dispatcher.registry().len(),
                "session connected"
            );
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve until end-of-stream or a close notification.
    ///
    /// Per-call failures are answered inline; only framing or I/O failures
    /// return `Err`. The session is `Closed` afterwards either way.
    pub async fn run(&mut self) -> Result<SessionSummary, SessionError> {
        self.connect().await;
        if self.state == SessionState::Closed {
            return Ok(self.summary(CloseReason::EndOfStream));
        }

        let result = self.serve().await;
        if let Err(e) = self.transport.close().await {
            tracing::warn!(error = %e, "failed to flush output on close");
        }
        self.state = SessionState::Closed;

        match &result {
            Ok(summary) => tracing::info!(
                reason = ?summary.reason,
                messages = summary.messages,
                tool_calls = summary.tool_calls,
                "session closed"
            ),
            Err(e) => tracing::error!(error = %e, "session terminated by transport error"),
        }
        result
    }

    /// Consume the session and hand back the output stream.
    pub fn into_writer(self) -> W {
        self.transport.into_writer()
    }

    async fn serve(&mut self) -> Result<SessionSummary, SessionError> {
        loop {
            self.state = SessionState::AwaitingRequest;
            let frame = match self.transport.read_frame().await? {
                Some(frame) => frame,
                None => return Ok(self.summary(CloseReason::EndOfStream)),
            };

            self.state = SessionState::Processing;
            self.messages += 1;

            let (response, flow) = self.handle_frame(&frame).await;
            if let Some(response) = response {
                self.transport.write_response(&response).await?;
            }

            if let Flow::Close = flow {
                return Ok(self.summary(CloseReason::CloseNotification));
            }
        }
    }

    fn summary(&self, reason: CloseReason) -> SessionSummary {
        SessionSummary {
            reason,
            messages: self.messages,
            tool_calls: self.tool_calls,
        }
    }

    /// Decode one frame and produce its response, if any.
    async fn handle_frame(&mut self, frame: &str) -> (Option<JsonRpcResponse>, Flow) {
        let value: Value = match serde_json::from_str(frame) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "received malformed JSON frame");
                return (
                    Some(JsonRpcResponse::error(None, error_codes::PARSE_ERROR, e.to_string())),
                    Flow::Continue,
                );
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(r) => r,
            Err(e) => {
                let id = value.get("id").cloned().filter(|v| !v.is_null());
                return (
                    Some(JsonRpcResponse::error(
                        id,
                        error_codes::INVALID_REQUEST,
                        format!("invalid request: {e}"),
                    )),
                    Flow::Continue,
                );
            }
        };

        let (response, flow) = self.handle_request(&request).await;
        if request.is_notification() {
            (None, flow)
        } else {
            (Some(response), flow)
        }
    }

    async fn handle_request(&mut self, req: &JsonRpcRequest) -> (JsonRpcResponse, Flow) {
        tracing::debug!(method = %req.method, "handling request");
        let id = req.id.clone();

        match req.method.as_str() {
            "initialize" => (self.handle_initialize(id), Flow::Continue),
            "notifications/initialized" | "initialized" | "notifications/cancelled" => {
                (JsonRpcResponse::success(id, json!({})), Flow::Continue)
            }
            "ping" => (JsonRpcResponse::success(id, json!({})), Flow::Continue),
            "tools/list" => (
                JsonRpcResponse::success(
                    id,
                    json!({ "tools": self.dispatcher.registry().to_mcp_tools() }),
                ),
                Flow::Continue,
            ),
            "tools/call" => (self.handle_tools_call(id, &req.params).await, Flow::Continue),
            "shutdown" | "exit" => {
                tracing::info!(method = %req.method, "close requested by peer");
                (JsonRpcResponse::success(id, json!({})), Flow::Close)
            }
            _ => (
                JsonRpcResponse::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Unknown method: {}", req.method),
                ),
                Flow::Continue,
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": true }
                },
                "serverInfo": {
                    "name": self.server_name,
                    "version": SERVER_VERSION
                }
            }),
        )
    }

    async fn handle_tools_call(&mut self, id: Option<Value>, params: &Value) -> JsonRpcResponse {
        let call: ToolCallParams = match serde_json::from_value(params.clone()) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, e.to_string());
            }
        };

        self.tool_calls += 1;
        let result = self.dispatcher.dispatch(&call.name, &call.arguments).await;

        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendRequest, BackendResponse, StockBackend};
    use crate::mcp_server::registry::ToolRegistry;
    use crate::mcp_server::tools::register_default_tools;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StockBackend for CountingBackend {
        async fn query(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.params.get("ts_code").map(String::as_str) == Some("BAD") {
                return Ok(BackendResponse {
                    code: 1,
                    msg: "bad code".into(),
                    data: String::new(),
                });
            }
            Ok(BackendResponse {
                code: 0,
                msg: String::new(),
                data: "X".into(),
            })
        }
    }

    fn new_session(input: &'static str) -> (Session<&'static [u8], Vec<u8>>, Arc<CountingBackend>) {
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
        });
        let mut registry = ToolRegistry::new();
        register_default_tools(&mut registry, backend.clone()).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry));
        (
            Session::new(input.as_bytes(), Vec::new(), dispatcher, "stock-analyzer"),
            backend,
        )
    }

    fn output_lines(session: Session<&'static [u8], Vec<u8>>) -> Vec<Value> {
        let out = String::from_utf8(session.into_writer()).unwrap();
        out.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (mut session, _) = new_session("");
        assert_eq!(session.state(), SessionState::Init);
        session.connect().await;
        assert_eq!(session.state(), SessionState::Connected);

        let summary = session.run().await.unwrap();
        assert_eq!(summary.reason, CloseReason::EndOfStream);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, "\n",
        );
        let (mut session, _) = new_session(input);
        session.run().await.unwrap();

        let lines = output_lines(session);
        // The notification produces no output.
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["result"]["serverInfo"]["name"], "stock-analyzer");
        assert_eq!(lines[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(lines[0]["result"]["capabilities"]["tools"]["listChanged"], true);

        let tools = lines[1]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "get_current_date");
        assert_eq!(tools[1]["name"], "query_stock_data");
        assert_eq!(
            tools[1]["inputSchema"]["required"],
            json!(["ts_code", "start_date", "end_date"])
        );
        assert_eq!(tools[1]["inputSchema"]["properties"]["fields"]["type"], "string");
    }

    #[tokio::test]
    async fn test_tool_call_success_and_backend_error() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"query_stock_data","arguments":{"ts_code":"000001.SZ","start_date":"20250401","end_date":"20250421"}}}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"query_stock_data","arguments":{"ts_code":"BAD","start_date":"20250401","end_date":"20250421"}}}"#, "\n",
        );
        let (mut session, backend) = new_session(input);
        let summary = session.run().await.unwrap();
        assert_eq!(summary.tool_calls, 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        let lines = output_lines(session);
        assert_eq!(lines[0]["result"], json!({"content": [{"type": "text", "text": "X"}]}));
        assert_eq!(lines[1]["result"]["isError"], true);
        assert_eq!(
            lines[1]["result"]["content"][0]["text"],
            "Error from stock API: bad code"
        );
    }

    #[tokio::test]
    async fn test_survives_malformed_and_erroring_calls() {
        let mut input = String::new();
        for i in 0..5 {
            input.push_str("{not json\n");
            input.push_str(&format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":{i},\"method\":\"tools/call\",\"params\":{{\"name\":\"nope\",\"arguments\":{{}}}}}}\n"
            ));
            input.push_str(&format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":\"m{i}\",\"method\":\"tools/call\",\"params\":{{\"name\":\"query_stock_data\"}}}}\n"
            ));
            input.push_str(&format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":\"p{i}\",\"method\":\"tools/call\",\"params\":42}}\n"
            ));
        }
        input.push_str(r#"{"jsonrpc":"2.0","id":99,"method":"ping"}"#);
        input.push('\n');

        let input: &'static str = Box::leak(input.into_boxed_str());
        let (mut session, backend) = new_session(input);
        let summary = session.run().await.unwrap();

        assert_eq!(summary.reason, CloseReason::EndOfStream);
        assert_eq!(summary.messages, 21);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let lines = output_lines(session);
        assert_eq!(lines.len(), 21);
        assert_eq!(lines[0]["error"]["code"], error_codes::PARSE_ERROR);
        assert!(lines[0]["id"].is_null());
        assert_eq!(lines[1]["result"]["isError"], true);
        assert_eq!(lines[1]["result"]["content"][0]["text"], "Unknown tool `nope`");
        assert_eq!(lines[2]["result"]["isError"], true);
        assert_eq!(lines[3]["error"]["code"], error_codes::INVALID_PARAMS);
        assert_eq!(lines[20]["id"], 99);
        assert_eq!(lines[20]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_close_notification_stops_reading() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"shutdown"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#, "\n",
        );
        let (mut session, _) = new_session(input);
        let summary = session.run().await.unwrap();
        assert_eq!(summary.reason, CloseReason::CloseNotification);
        assert_eq!(summary.messages, 2);
        assert_eq!(session.state(), SessionState::Closed);

        let lines = output_lines(session);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["id"], 1);
    }

    /// Answers after a delay, so a close notification queued behind the call
    /// is already buffered while the call is in flight.
    struct SlowBackend;

    #[async_trait]
    impl StockBackend for SlowBackend {
        async fn query(&self, _request: &BackendRequest) -> Result<BackendResponse, BackendError> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(BackendResponse {
                code: 0,
                msg: String::new(),
                data: "slow".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_call_in_flight() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"query_stock_data","arguments":{"ts_code":"000001.SZ","start_date":"20250401","end_date":"20250421"}}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"shutdown"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#, "\n",
        );
        let mut registry = ToolRegistry::new();
        register_default_tools(&mut registry, Arc::new(SlowBackend)).unwrap();
        let mut session = Session::new(
            input.as_bytes(),
            Vec::new(),
            Dispatcher::new(Arc::new(registry)),
            "stock-analyzer",
        );

        let summary = session.run().await.unwrap();
        assert_eq!(summary.reason, CloseReason::CloseNotification);
        assert_eq!(summary.tool_calls, 1);
        assert_eq!(summary.messages, 2);

        let lines = output_lines(session);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(
            lines[0]["result"],
            json!({"content": [{"type": "text", "text": "slow"}]})
        );
    }

    #[tokio::test]
    async fn test_null_id_request_is_answered() {
        let input = concat!(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#, "\n");
        let (mut session, _) = new_session(input);
        session.run().await.unwrap();

        let lines = output_lines(session);
        assert_eq!(lines, vec![json!({"jsonrpc": "2.0", "id": null, "result": {}})]);
    }

    /// Accepts writes but fails every flush.
    struct UnflushableWriter;

    impl AsyncWrite for UnflushableWriter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer gone",
            )))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_flush_failure_on_close_still_closes() {
        let mut registry = ToolRegistry::new();
        register_default_tools(
            &mut registry,
            Arc::new(CountingBackend {
                calls: AtomicUsize::new(0),
            }),
        )
        .unwrap();
        let mut session = Session::new(
            &b""[..],
            UnflushableWriter,
            Dispatcher::new(Arc::new(registry)),
            "stock-analyzer",
        );

        let summary = session.run().await.unwrap();
        assert_eq!(summary.reason, CloseReason::EndOfStream);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_exit_request_is_acknowledged() {
        let input = concat!(r#"{"jsonrpc":"2.0","id":7,"method":"exit"}"#, "\n");
        let (mut session, _) = new_session(input);
        let summary = session.run().await.unwrap();
        assert_eq!(summary.reason, CloseReason::CloseNotification);

        let lines = output_lines(session);
        assert_eq!(lines, vec![json!({"jsonrpc": "2.0", "id": 7, "result": {}})]);
    }

    #[tokio::test]
    async fn test_unknown_method_and_invalid_request() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":2}"#, "\n",
        );
        let (mut session, _) = new_session(input);
        session.run().await.unwrap();

        let lines = output_lines(session);
        assert_eq!(lines[0]["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert_eq!(lines[1]["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(lines[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_repeated_query_output_is_identical() {
        let call = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"query_stock_data","arguments":{"ts_code":"000001.SZ","start_date":"20250401","end_date":"20250421"}}}"#;
        let input: &'static str = Box::leak(format!("{call}\n{call}\n").into_boxed_str());
        let (mut session, _) = new_session(input);
        session.run().await.unwrap();

        let out = String::from_utf8(session.into_writer()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
    }

    #[tokio::test]
    async fn test_framing_error_terminates_session() {
        let input: &'static [u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\xff\xfe\n";
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
        });
        let mut registry = ToolRegistry::new();
        register_default_tools(&mut registry, backend).unwrap();
        let mut session = Session::new(
            input,
            Vec::new(),
            Dispatcher::new(Arc::new(registry)),
            "stock-analyzer",
        );

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, SessionError::Read(_)));
        assert_eq!(session.state(), SessionState::Closed);

        let out = String::from_utf8(session.into_writer()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
