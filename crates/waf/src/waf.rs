//! Middleware entry point.
//!
//! [`Waf`] composes the request phase driver, the pooled response
//! interceptor and the response phase driver around a downstream
//! [`Handler`]. One inspection session is created per request and is always
//! finalized and released, whichever way the request ends.

use async_trait::async_trait;
use http::header::{HeaderValue, CONTENT_LENGTH};
use http::StatusCode;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, error, info_span, trace, Instrument};

use rampart_inspect::{headers, Engine, Session, SessionMode, TransactionId};

use crate::config::WafConfig;
use crate::errors::ConfigError;
use crate::interceptor::ResponseInterceptor;
use crate::pool::InterceptorPool;
use crate::request::{process_request, Request};
use crate::resolve::StatusPolicy;
use crate::response::process_response;
use crate::writer::ResponseWriter;

/// Downstream request handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produce the response for `req` through `writer`.
    async fn call(&self, writer: &mut dyn ResponseWriter, req: &mut Request);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn call(&self, writer: &mut dyn ResponseWriter, req: &mut Request) {
        (**self).call(writer, req).await
    }
}

/// Finalizes and releases a session when dropped.
///
/// Dropping covers normal completion, early returns, panics unwinding through
/// the handler and cancellation of the request future.
struct SessionGuard {
    session: Box<dyn Session>,
}

impl Deref for SessionGuard {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Logging phase rules and audit logs.
        self.session.process_logging();
        // Temporary body storage.
        if let Err(err) = self.session.close() {
            error!(
                tx = %self.session.id(),
                error = %err,
                "Failed to close the transaction"
            );
        }
    }
}

/// Web application firewall middleware.
pub struct Waf<E> {
    engine: E,
    config: WafConfig,
    policy: StatusPolicy,
    interceptors: InterceptorPool,
}

impl<E: Engine> Waf<E> {
    /// Create the middleware with the default configuration.
    pub fn new(engine: E) -> Self {
        Self::build(engine, WafConfig::default())
    }

    /// Create the middleware with a validated configuration.
    pub fn with_config(engine: E, config: WafConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(engine, config))
    }

    fn build(engine: E, config: WafConfig) -> Self {
        let policy = config.status_policy();
        let interceptors =
            InterceptorPool::new(config.max_idle_interceptors, policy, config.copy_buffer_size);
        Self {
            engine,
            config,
            policy,
            interceptors,
        }
    }

    /// The inspection engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Active configuration.
    pub fn config(&self) -> &WafConfig {
        &self.config
    }

    /// Interceptor pool, for introspection.
    pub fn interceptor_pool(&self) -> &InterceptorPool {
        &self.interceptors
    }

    /// Wrap `next` so every call goes through this middleware.
    pub fn wrap<H: Handler>(self: Arc<Self>, next: H) -> Intercepted<E, H> {
        Intercepted { waf: self, next }
    }

    fn new_session(&self, req: &Request) -> SessionGuard {
        let id = TransactionId::from_header_or_new(
            req.headers
                .get(headers::X_REQUEST_ID)
                .and_then(|v| v.to_str().ok()),
        );

        let mode = match &req.cancellation {
            Some(token) if self.engine.capabilities().context_aware => {
                SessionMode::Bound(token.clone())
            }
            _ => SessionMode::Detached,
        };

        SessionGuard {
            session: self.engine.new_session(id, mode),
        }
    }

    /// Serve one request through the middleware.
    pub async fn serve<H: Handler + ?Sized>(
        &self,
        writer: &mut dyn ResponseWriter,
        req: &mut Request,
        next: &H,
    ) {
        let mut session = self.new_session(req);
        let span = info_span!("waf", tx = %session.id(), method = %req.method);

        async move {
            // Nothing will be evaluated, get out of the way entirely.
            if session.is_rule_engine_off() {
                trace!("Rule engine off, passing through");
                next.call(writer, req).await;
                return;
            }

            match process_request(&mut *session, req).await {
                Err(err) => {
                    let status = self.config.request_failure_status();
                    error!(error = %err, status = status.as_u16(), "Failed to process request");
                    respond_empty(writer, status);
                    return;
                }
                Ok(Some(verdict)) => {
                    let status = self.policy.resolve(&verdict, StatusCode::OK);
                    debug!(
                        action = %verdict.action,
                        rule_id = ?verdict.rule_id,
                        status = status.as_u16(),
                        "Request interrupted by verdict"
                    );
                    respond_empty(writer, status);
                    return;
                }
                Ok(None) => {}
            }

            let mut state = self.interceptors.acquire(req.protocol());
            let mut interceptor = ResponseInterceptor::new(&mut state, writer, &mut *session);

            next.call(&mut interceptor, req).await;

            if let Err(err) = process_response(&mut interceptor).await {
                error!(error = %err, "Failed to close the response");
            }
        }
        .instrument(span)
        .await
    }
}

/// Send a bodiless response with `status`.
fn respond_empty(writer: &mut dyn ResponseWriter, status: StatusCode) {
    writer
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    writer.write_header(status);
}

/// A handler wrapped by the middleware.
pub struct Intercepted<E, H> {
    waf: Arc<Waf<E>>,
    next: H,
}

impl<E, H> Intercepted<E, H> {
    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.next
    }
}

#[async_trait]
impl<E: Engine, H: Handler> Handler for Intercepted<E, H> {
    async fn call(&self, writer: &mut dyn ResponseWriter, req: &mut Request) {
        self.waf.serve(writer, req, &self.next).await
    }
}
