//! Scripted inspection engine and handlers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

use rampart_inspect::{
    BodyProgress, BoxBodyReader, Engine, EngineCapabilities, InspectError, InspectResult, Session,
    SessionMode, TransactionId, Verdict,
};
use rampart_waf::{BodyWriter, Handler, Request, ResponseWriter};

/// What the scripted engine decides at each phase.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub engine_off: bool,
    pub context_aware: bool,

    pub connection_verdict: Option<Verdict>,
    pub uri_verdict: Option<Verdict>,
    /// Deny (no explicit status) any URI containing `../`
    pub traversal_rule: bool,
    pub header_verdict: Option<Verdict>,

    pub request_body_accessible: bool,
    pub request_body_limit: usize,
    /// Raise this verdict while buffering when the body exceeds the limit
    pub request_body_limit_verdict: Option<Verdict>,
    pub request_body_read_error: bool,
    /// Raise this verdict in the body phase when the buffered body contains the needle
    pub request_body_needle: Option<(Vec<u8>, Verdict)>,
    pub request_body_phase_error: bool,

    pub response_header_verdict: Option<Verdict>,
    pub response_body_accessible: bool,
    pub response_body_processable: bool,
    /// Raise this verdict once more than N response bytes are buffered
    pub response_write_verdict: Option<(usize, Verdict)>,
    pub response_body_verdict: Option<Verdict>,
    pub response_body_phase_error: bool,
    pub response_reader_error: bool,

    pub close_error: bool,
}

impl Script {
    /// Rules on, nothing matches, no body inspection.
    pub fn permissive() -> Self {
        Self {
            request_body_limit: 1024,
            ..Self::default()
        }
    }

    /// Response bodies are buffered for inspection.
    pub fn inspect_response(mut self) -> Self {
        self.response_body_accessible = true;
        self.response_body_processable = true;
        self
    }

    /// Request bodies are buffered up to `limit` bytes.
    pub fn inspect_request(mut self, limit: usize) -> Self {
        self.request_body_accessible = true;
        self.request_body_limit = limit;
        self
    }
}

/// Everything the engine observed, across all sessions.
#[derive(Debug, Default)]
pub struct Record {
    pub sessions: usize,
    pub bound_sessions: usize,
    pub ids: Vec<String>,
    pub calls: Vec<&'static str>,
    pub connection: Option<(String, Option<u16>)>,
    pub uri: Option<(String, String, String)>,
    pub request_headers: Vec<(String, Vec<u8>)>,
    pub server_name: Option<Vec<u8>>,
    pub buffered_request_body: Vec<u8>,
    pub response_headers: Vec<(String, Vec<u8>)>,
    pub response_status: Option<(u16, String)>,
    pub buffered_response_body: Vec<u8>,
    pub logging_calls: usize,
    pub close_calls: usize,
}

impl Record {
    pub fn called(&self, phase: &str) -> bool {
        self.calls.iter().any(|c| *c == phase)
    }

    pub fn request_header(&self, name: &str) -> Vec<&[u8]> {
        self.request_headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .collect()
    }
}

pub type SharedRecord = Arc<Mutex<Record>>;

pub struct ScriptedEngine {
    script: Script,
    record: SharedRecord,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> (Self, SharedRecord) {
        let record = SharedRecord::default();
        (
            Self {
                script,
                record: record.clone(),
            },
            record,
        )
    }
}

impl Engine for ScriptedEngine {
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            context_aware: self.script.context_aware,
        }
    }

    fn new_session(&self, id: TransactionId, mode: SessionMode) -> Box<dyn Session> {
        {
            let mut record = self.record.lock();
            record.sessions += 1;
            record.ids.push(id.to_string());
            if mode.token().is_some() {
                record.bound_sessions += 1;
            }
        }
        Box::new(ScriptedSession {
            id,
            script: self.script.clone(),
            record: self.record.clone(),
            interruption: None,
            request_body: Vec::new(),
            response_body: Vec::new(),
        })
    }
}

struct ScriptedSession {
    id: TransactionId,
    script: Script,
    record: SharedRecord,
    interruption: Option<Verdict>,
    request_body: Vec<u8>,
    response_body: Vec<u8>,
}

impl ScriptedSession {
    fn log(&self, phase: &'static str) {
        self.record.lock().calls.push(phase);
    }

    fn raise(&mut self, verdict: Option<Verdict>) -> Option<Verdict> {
        if verdict.is_some() {
            self.interruption = verdict.clone();
        }
        verdict
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn id(&self) -> &TransactionId {
        &self.id
    }

    fn is_rule_engine_off(&self) -> bool {
        self.script.engine_off
    }

    fn interruption(&self) -> Option<&Verdict> {
        self.interruption.as_ref()
    }

    fn process_connection(
        &mut self,
        client: &str,
        client_port: Option<u16>,
        _server: &str,
        _server_port: Option<u16>,
    ) -> Option<Verdict> {
        self.log("connection");
        self.record.lock().connection = Some((client.to_string(), client_port));
        let verdict = self.script.connection_verdict.clone();
        self.raise(verdict)
    }

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) -> Option<Verdict> {
        self.log("uri");
        self.record.lock().uri = Some((uri.to_string(), method.to_string(), protocol.to_string()));
        let verdict = if self.script.traversal_rule && uri.contains("../") {
            Some(Verdict::deny().with_rule_id(930100).with_data("path traversal"))
        } else {
            self.script.uri_verdict.clone()
        };
        self.raise(verdict)
    }

    fn add_request_header(&mut self, name: &str, value: &[u8]) {
        self.record
            .lock()
            .request_headers
            .push((name.to_string(), value.to_vec()));
    }

    fn set_server_name(&mut self, name: &[u8]) {
        self.record.lock().server_name = Some(name.to_vec());
    }

    fn process_request_headers(&mut self) -> Option<Verdict> {
        self.log("request_headers");
        let verdict = self.script.header_verdict.clone();
        self.raise(verdict)
    }

    fn is_request_body_accessible(&self) -> bool {
        self.script.request_body_accessible
    }

    async fn read_request_body_from(
        &mut self,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> InspectResult<BodyProgress> {
        self.log("read_request_body");
        if self.script.request_body_read_error {
            return Err(InspectError::BodyBuffer("disk full".to_string()));
        }

        let limit = self.script.request_body_limit;
        let mut buf = Vec::new();
        (&mut *body).take(limit as u64).read_to_end(&mut buf).await?;

        if buf.len() == limit {
            // Peek one byte to learn whether the body goes on past the limit.
            let mut probe = [0u8; 1];
            if body.read(&mut probe).await? == 1 {
                if let Some(verdict) = self.script.request_body_limit_verdict.clone() {
                    self.raise(Some(verdict.clone()));
                    return Ok(BodyProgress::interrupted(verdict, buf.len() as u64));
                }
                buf.push(probe[0]);
            }
        }

        let handled = buf.len() as u64;
        self.record.lock().buffered_request_body = buf.clone();
        self.request_body = buf;
        Ok(BodyProgress::handled(handled))
    }

    fn request_body_reader(&mut self) -> InspectResult<BoxBodyReader> {
        Ok(Box::new(Cursor::new(self.request_body.clone())))
    }

    fn process_request_body(&mut self) -> InspectResult<Option<Verdict>> {
        self.log("request_body");
        if self.script.request_body_phase_error {
            return Err(InspectError::Evaluation("rule crashed".to_string()));
        }
        let verdict = match &self.script.request_body_needle {
            Some((needle, verdict))
                if self
                    .request_body
                    .windows(needle.len())
                    .any(|w| w == needle.as_slice()) =>
            {
                Some(verdict.clone())
            }
            _ => None,
        };
        Ok(self.raise(verdict))
    }

    fn add_response_header(&mut self, name: &str, value: &[u8]) {
        self.record
            .lock()
            .response_headers
            .push((name.to_string(), value.to_vec()));
    }

    fn process_response_headers(&mut self, status: u16, protocol: &str) -> Option<Verdict> {
        self.log("response_headers");
        self.record.lock().response_status = Some((status, protocol.to_string()));
        let verdict = self.script.response_header_verdict.clone();
        self.raise(verdict)
    }

    fn is_response_body_accessible(&self) -> bool {
        self.script.response_body_accessible
    }

    fn is_response_body_processable(&self) -> bool {
        self.script.response_body_processable
    }

    async fn write_response_body(&mut self, buf: &[u8]) -> InspectResult<BodyProgress> {
        self.response_body.extend_from_slice(buf);
        self.record.lock().buffered_response_body = self.response_body.clone();

        if let Some((threshold, verdict)) = self.script.response_write_verdict.clone() {
            if self.response_body.len() > threshold {
                self.raise(Some(verdict.clone()));
                return Ok(BodyProgress::interrupted(verdict, buf.len() as u64));
            }
        }
        Ok(BodyProgress::handled(buf.len() as u64))
    }

    fn process_response_body(&mut self) -> InspectResult<Option<Verdict>> {
        self.log("response_body");
        if self.script.response_body_phase_error {
            return Err(InspectError::Evaluation("response rule crashed".to_string()));
        }
        let verdict = self.script.response_body_verdict.clone();
        Ok(self.raise(verdict))
    }

    fn response_body_reader(&mut self) -> InspectResult<BoxBodyReader> {
        if self.script.response_reader_error {
            return Err(InspectError::BodyBuffer("temp file vanished".to_string()));
        }
        Ok(Box::new(Cursor::new(std::mem::take(&mut self.response_body))))
    }

    fn process_logging(&mut self) {
        self.log("logging");
        self.record.lock().logging_calls += 1;
    }

    fn close(&mut self) -> InspectResult<()> {
        self.log("close");
        self.record.lock().close_calls += 1;
        if self.script.close_error {
            return Err(InspectError::Release("tmp cleanup failed".to_string()));
        }
        Ok(())
    }
}

/// Handler writing a fixed response.
#[derive(Clone, Default)]
pub struct StaticHandler {
    pub status: Option<StatusCode>,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub chunks: Vec<Vec<u8>>,
    pub calls: Arc<AtomicUsize>,
}

impl StaticHandler {
    pub fn new(status: Option<StatusCode>, chunks: &[&[u8]]) -> Self {
        Self {
            status,
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.push((name, HeaderValue::from_static(value)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for StaticHandler {
    async fn call(&self, writer: &mut dyn ResponseWriter, _req: &mut Request) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (name, value) in &self.headers {
            writer.headers_mut().append(name.clone(), value.clone());
        }
        if let Some(status) = self.status {
            writer.write_header(status);
        }
        for chunk in &self.chunks {
            writer.write(chunk).await.unwrap();
        }
    }
}

/// Handler echoing the request body back.
#[derive(Clone, Default)]
pub struct EchoHandler {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for EchoHandler {
    async fn call(&self, writer: &mut dyn ResponseWriter, req: &mut Request) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut body = Vec::new();
        if let Some(reader) = req.body.as_mut() {
            reader.read_to_end(&mut body).await.unwrap();
        }
        writer.write_header(StatusCode::OK);
        writer.write(&body).await.unwrap();
    }
}

/// Handler that never finishes.
pub struct StuckHandler;

#[async_trait]
impl Handler for StuckHandler {
    async fn call(&self, writer: &mut dyn ResponseWriter, _req: &mut Request) {
        writer.write_header(StatusCode::OK);
        std::future::pending::<()>().await;
    }
}

/// Handler that panics after recording a status.
pub struct PanickingHandler;

#[async_trait]
impl Handler for PanickingHandler {
    async fn call(&self, writer: &mut dyn ResponseWriter, _req: &mut Request) {
        writer.write_header(StatusCode::OK);
        panic!("handler bug");
    }
}
