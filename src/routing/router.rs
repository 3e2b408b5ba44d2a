//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Collect routes while the gateway is configured
//! - Resolve RPC bindings against the engine and detect conflicts at startup
//! - Look up `(verb, path)` in the frozen table
//! - Mount sub-tables under path prefixes
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - One segment trie per table, walked a level at a time: lookup cost is
//!   bounded by path segments times routes, never exponential in depth
//! - Literals are preferred over variables, with fallback to a variable
//!   branch when the literal one dead-ends
//! - Explicit NotFound / MethodNotAllowed rather than a silent default

use axum::body::Body;
use axum::http::{Method, Request, Response};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::SetupError;
use crate::routing::matcher::{split_path, PathParams, PathTemplate, Segment};
use crate::rpc::engine::MethodDescriptor;

/// A plain HTTP handler bound to a route.
pub type RawHandler =
    Arc<dyn Fn(Request<Body>, PathParams) -> BoxFuture<'static, Response<Body>> + Send + Sync>;

/// What a route resolves to once the table is frozen.
#[derive(Clone)]
pub enum Endpoint {
    /// Translate the request into a call of this method.
    Rpc(Arc<MethodDescriptor>),
    Handler(RawHandler),
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Rpc(descriptor) => write!(f, "Rpc({})", descriptor),
            Endpoint::Handler(_) => f.write_str("Handler"),
        }
    }
}

enum Target {
    Rpc { service: String, method: String },
    Handler(RawHandler),
}

struct PendingRoute {
    verb: Method,
    template: PathTemplate,
    target: Target,
}

/// Accumulates the routes of one sub-table.
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: Vec<PendingRoute>,
    errors: Vec<SetupError>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `verb template` to the RPC method `/{service}/{method}`.
    pub fn rpc(self, verb: Method, template: &str, service: &str, method: &str) -> Self {
        self.push(
            verb,
            template,
            Target::Rpc {
                service: service.to_string(),
                method: method.to_string(),
            },
        )
    }

    /// Bind `verb template` to a plain handler.
    pub fn handler<F, Fut>(self, verb: Method, template: &str, handler: F) -> Self
    where
        F: Fn(Request<Body>, PathParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        let handler: RawHandler = Arc::new(move |request, params| Box::pin(handler(request, params)));
        self.push(verb, template, Target::Handler(handler))
    }

    fn push(mut self, verb: Method, template: &str, target: Target) -> Self {
        match PathTemplate::parse(template) {
            Ok(template) => self.routes.push(PendingRoute {
                verb,
                template,
                target,
            }),
            Err(e) => self.errors.push(e),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freeze into a table, resolving RPC bindings with `resolve`.
    ///
    /// Reports every problem found, not only the first.
    pub fn freeze<R>(self, resolve: R) -> Result<RouteTable, Vec<SetupError>>
    where
        R: Fn(&str, &str) -> Option<MethodDescriptor>,
    {
        let mut errors = self.errors;
        let mut table = RouteTable::default();

        for pending in self.routes {
            let endpoint = match pending.target {
                Target::Handler(handler) => Endpoint::Handler(handler),
                Target::Rpc { service, method } => match resolve(&service, &method) {
                    Some(descriptor) => Endpoint::Rpc(Arc::new(descriptor)),
                    None => {
                        errors.push(SetupError::UnknownMethod {
                            verb: pending.verb.clone(),
                            template: pending.template.to_string(),
                            service,
                            method,
                        });
                        continue;
                    }
                },
            };

            let route = Route {
                verb: pending.verb,
                template: pending.template,
                endpoint,
            };
            if let Err(e) = table.insert(route) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(table)
        } else {
            Err(errors)
        }
    }
}

/// A frozen route.
#[derive(Debug)]
pub struct Route {
    pub verb: Method,
    pub template: PathTemplate,
    pub endpoint: Endpoint,
}

#[derive(Debug, Default)]
struct Node {
    literals: HashMap<String, Node>,
    variable: Option<Box<Node>>,
    routes: HashMap<Method, usize>,
}

impl Node {
    /// Nodes reached by `segments`, most preferred first.
    ///
    /// Walks the trie one level per segment instead of backtracking. At each
    /// level a node contributes its literal child before its variable child,
    /// so the order equals literal-first depth-first order. A level never
    /// holds more nodes than there are routes, so a lookup costs at most
    /// `segments * routes` steps.
    fn walk<'a>(&'a self, segments: &[&str]) -> Vec<&'a Node> {
        let mut level = vec![self];
        for segment in segments {
            let mut next = Vec::with_capacity(level.len());
            for node in &level {
                if let Some(child) = node.literals.get(*segment) {
                    next.push(child);
                }
                if let Some(child) = &node.variable {
                    if !segment.is_empty() {
                        next.push(child.as_ref());
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            level = next;
        }
        level
    }
}

/// Frozen `(verb, path template)` → endpoint table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    root: Node,
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: PathParams,
}

#[derive(Debug)]
pub enum Lookup<'a> {
    Matched(RouteMatch<'a>),
    /// The path exists, but not for this verb.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

impl RouteTable {
    fn insert(&mut self, route: Route) -> Result<(), SetupError> {
        let mut node = &mut self.root;
        for segment in route.template.segments() {
            node = match segment {
                Segment::Literal(literal) => node.literals.entry(literal.clone()).or_default(),
                Segment::Variable(_) => node.variable.get_or_insert_with(Default::default),
            };
        }
        if node.routes.contains_key(&route.verb) {
            return Err(SetupError::DuplicateRoute {
                verb: route.verb.clone(),
                template: route.template.to_string(),
            });
        }
        node.routes.insert(route.verb.clone(), self.routes.len());
        self.routes.push(route);
        Ok(())
    }

    /// Look up `verb path`, distinguishing an unknown path from a verb mismatch.
    pub fn lookup(&self, verb: &Method, path: &str) -> Lookup<'_> {
        let segments = split_path(path);
        let reached = self.root.walk(&segments);
        if let Some(index) = reached.iter().find_map(|node| node.routes.get(verb).copied()) {
            let route = &self.routes[index];
            return Lookup::Matched(RouteMatch {
                route,
                params: route.template.bind(&segments),
            });
        }

        let mut allowed: Vec<Method> = reached
            .iter()
            .flat_map(|node| node.routes.keys().cloned())
            .collect();
        if allowed.is_empty() {
            Lookup::NotFound
        } else {
            allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            allowed.dedup();
            Lookup::MethodNotAllowed(allowed)
        }
    }

    /// Exact match on verb and path; a verb mismatch is a plain miss.
    pub fn match_route(&self, verb: &Method, path: &str) -> Option<RouteMatch<'_>> {
        match self.lookup(verb, path) {
            Lookup::Matched(found) => Some(found),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

struct Mount {
    prefix: String,
    table: RouteTable,
}

impl Mount {
    /// The remaining path when `path` falls under this mount.
    fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.prefix.ends_with('/') {
            // subtree mount: "/pingpong/" serves "/pingpong/..." as "/..."
            path.starts_with(&self.prefix)
                .then(|| &path[self.prefix.len() - 1..])
        } else {
            (path == self.prefix).then_some("/")
        }
    }
}

/// Accumulates prefix mounts.
#[derive(Default)]
pub struct MountTableBuilder {
    mounts: Vec<(String, RouteTableBuilder)>,
    errors: Vec<SetupError>,
}

impl MountTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `routes` under `prefix`. Mounting the same prefix twice is an error.
    pub fn mount(&mut self, prefix: &str, routes: RouteTableBuilder) {
        if !prefix.starts_with('/') {
            self.errors.push(SetupError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "must start with '/'",
            });
            return;
        }
        if self.mounts.iter().any(|(existing, _)| existing == prefix) {
            self.errors.push(SetupError::DuplicateMount(prefix.to_string()));
            return;
        }
        self.mounts.push((prefix.to_string(), routes));
    }

    pub fn record_error(&mut self, error: SetupError) {
        self.errors.push(error);
    }

    pub fn freeze<R>(self, resolve: R) -> Result<MountTable, Vec<SetupError>>
    where
        R: Fn(&str, &str) -> Option<MethodDescriptor>,
    {
        let mut errors = self.errors;
        let mut mounts = Vec::with_capacity(self.mounts.len());

        for (prefix, builder) in self.mounts {
            match builder.freeze(&resolve) {
                Ok(table) => {
                    tracing::info!(prefix = %prefix, routes = table.len(), "Route table mounted");
                    mounts.push(Mount { prefix, table });
                }
                Err(mut e) => errors.append(&mut e),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        // longest prefix wins
        mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(MountTable { mounts })
    }
}

/// Frozen set of mounted route tables.
#[derive(Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn lookup(&self, verb: &Method, path: &str) -> Lookup<'_> {
        for mount in &self.mounts {
            if let Some(rest) = mount.strip(path) {
                return mount.table.lookup(verb, rest);
            }
        }
        Lookup::NotFound
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().map(|m| m.prefix.as_str())
    }
}
