//! # Intent Router
//!
//! This crate implements the versioned command protocol of the device kernel.
//!
//! ## Philosophy
//!
//! Unlike shell commands (free text, parsed ad hoc by each tool), intents are:
//! - Addressed by a stable dotted opcode (`dev.bind`, `ep.probe`)
//! - Checked against a per-opcode minimum argument count before dispatch
//! - Answered with a fixed error taxonomy and `key=value` data lines
//! - Versioned: [`PROTOCOL_VERSION`] changes whenever an opcode's arguments do
//!
//! ## Core Concepts
//!
//! - [`IntentRequest`] / [`IntentResponse`]: transient wire values
//! - [`ErrorKind`]: the stable error taxonomy
//! - [`ResponseWriter`]: structured builder for data lines
//! - [`IntentRouter`]: flat opcode table mapping to handler functions

pub mod protocol;

pub use protocol::{
    ErrorKind, IntentError, IntentRequest, IntentResponse, ResponseWriter, MAX_INTENT_ARGS,
    PROTOCOL_VERSION,
};

use thiserror::Error;
use tracing::debug;

/// Outcome of a handler: data lines on success
pub type HandlerResult = Result<ResponseWriter, IntentError>;

/// Handler for one opcode
pub type Handler<C> = fn(&mut C, &IntentRequest) -> HandlerResult;

/// One entry of the opcode table
pub struct Route<C> {
    pub opcode: &'static str,
    /// Arguments required before the handler is called
    pub min_args: usize,
    /// Argument synopsis, e.g. `<driver> <endpoint>`
    pub usage: &'static str,
    pub summary: &'static str,
    pub handler: Handler<C>,
}

impl<C> Clone for Route<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Route<C> {}

impl<C> std::fmt::Debug for Route<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("opcode", &self.opcode)
            .field("min_args", &self.min_args)
            .field("usage", &self.usage)
            .finish()
    }
}

impl<C> Route<C> {
    /// `opcode usage`
    pub fn synopsis(&self) -> String {
        if self.usage.is_empty() {
            self.opcode.to_string()
        } else {
            format!("{} {}", self.opcode, self.usage)
        }
    }
}

/// Router registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("opcode '{0}' is already registered")]
    Duplicate(String),

    #[error("opcode '{0}' requires more arguments than a request can carry")]
    TooManyArgs(String),
}

/// Flat opcode table
pub struct IntentRouter<C> {
    routes: Vec<Route<C>>,
}

impl<C> IntentRouter<C> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a handler
    pub fn register(&mut self, route: Route<C>) -> Result<(), RouterError> {
        if self.routes.iter().any(|r| r.opcode == route.opcode) {
            return Err(RouterError::Duplicate(route.opcode.to_string()));
        }
        if route.min_args > MAX_INTENT_ARGS {
            return Err(RouterError::TooManyArgs(route.opcode.to_string()));
        }
        self.routes.push(route);
        Ok(())
    }

    /// Shorthand for [`IntentRouter::register`]
    pub fn route(
        &mut self,
        opcode: &'static str,
        min_args: usize,
        usage: &'static str,
        summary: &'static str,
        handler: Handler<C>,
    ) -> Result<(), RouterError> {
        self.register(Route {
            opcode,
            min_args,
            usage,
            summary,
            handler,
        })
    }

    pub fn get(&self, opcode: &str) -> Option<&Route<C>> {
        self.routes.iter().find(|r| r.opcode == opcode)
    }

    /// Validates a request and returns its handler
    pub fn resolve(&self, request: &IntentRequest) -> Result<Handler<C>, IntentError> {
        if request.arg_count() > MAX_INTENT_ARGS {
            return Err(IntentError::bad_args(format!(
                "too many arguments ({} > {})",
                request.arg_count(),
                MAX_INTENT_ARGS
            )));
        }
        let route = self
            .get(&request.opcode)
            .ok_or_else(|| IntentError::not_found(format!("unknown opcode: {}", request.opcode)))?;
        if request.arg_count() < route.min_args {
            return Err(IntentError::bad_args(format!("usage: {}", route.synopsis())));
        }
        Ok(route.handler)
    }

    /// Resolves and runs a request against `ctx`
    pub fn dispatch(&self, ctx: &mut C, request: &IntentRequest) -> IntentResponse {
        let response = IntentResponse::from_result(
            self.resolve(request).and_then(|handler| handler(ctx, request)),
        );
        debug!(opcode = %request.opcode, result = %response.error, "intent dispatched");
        response
    }

    /// Registered routes in registration order
    pub fn routes(&self) -> &[Route<C>] {
        &self.routes
    }

    /// One `<opcode>=<usage> - <summary>` line per route
    pub fn help(&self) -> ResponseWriter {
        let mut out = ResponseWriter::new();
        out.kv("protocol", PROTOCOL_VERSION);
        for route in &self.routes {
            if route.usage.is_empty() {
                out.kv(route.opcode, route.summary);
            } else {
                out.kv(route.opcode, format!("{} - {}", route.usage, route.summary));
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<C> Default for IntentRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i64,
    }

    fn add(ctx: &mut Counter, req: &IntentRequest) -> HandlerResult {
        let n = req
            .arg(0)
            .and_then(|a| a.parse::<i64>().ok())
            .ok_or_else(|| IntentError::bad_args("expected a number"))?;
        ctx.value += n;
        Ok(ResponseWriter::new().with("value", ctx.value))
    }

    fn get(ctx: &mut Counter, _req: &IntentRequest) -> HandlerResult {
        Ok(ResponseWriter::new().with("value", ctx.value))
    }

    fn router() -> IntentRouter<Counter> {
        let mut router = IntentRouter::new();
        router.route("counter.add", 1, "<n>", "add to the counter", add).unwrap();
        router.route("counter.get", 0, "", "read the counter", get).unwrap();
        router
    }

    #[test]
    fn test_dispatch_runs_handler() {
        let router = router();
        let mut ctx = Counter::default();
        let response = router.dispatch(&mut ctx, &IntentRequest::new("counter.add").with_arg("5"));
        assert!(response.is_ok());
        assert_eq!(response.data, "value=5\n");
        assert_eq!(ctx.value, 5);
    }

    #[test]
    fn test_handler_error_becomes_response() {
        let router = router();
        let mut ctx = Counter::default();
        let response = router.dispatch(&mut ctx, &IntentRequest::new("counter.add").with_arg("x"));
        assert_eq!(response.error, ErrorKind::BadArgs);
        assert_eq!(response.render(), "ERR_BAD_ARGS: expected a number\n");
    }

    #[test]
    fn test_unknown_opcode() {
        let router = router();
        let mut ctx = Counter::default();
        let response = router.dispatch(&mut ctx, &IntentRequest::new("counter.reset"));
        assert_eq!(response.error, ErrorKind::NotFound);
        assert_eq!(response.message, "unknown opcode: counter.reset");
    }

    #[test]
    fn test_missing_args_returns_usage() {
        let router = router();
        let mut ctx = Counter::default();
        let response = router.dispatch(&mut ctx, &IntentRequest::new("counter.add"));
        assert_eq!(response.error, ErrorKind::BadArgs);
        assert_eq!(response.message, "usage: counter.add <n>");
        assert_eq!(ctx.value, 0);
    }

    #[test]
    fn test_too_many_args() {
        let router = router();
        let mut ctx = Counter::default();
        let mut request = IntentRequest::new("counter.get");
        for i in 0..=MAX_INTENT_ARGS {
            request = request.with_arg(i.to_string());
        }
        let response = router.dispatch(&mut ctx, &request);
        assert_eq!(response.error, ErrorKind::BadArgs);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut router = router();
        assert_eq!(
            router.route("counter.get", 0, "", "again", get),
            Err(RouterError::Duplicate("counter.get".to_string()))
        );
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_help_lists_routes() {
        let help = router().help().finish();
        assert_eq!(
            help,
            "protocol=1.0\ncounter.add=<n> - add to the counter\ncounter.get=read the counter\n"
        );
    }
}
