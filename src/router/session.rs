//! Per-connection Router session state.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::net::SocketAddr;

use tracing::debug;

use super::route::RouteHop;
use crate::findings::FrameId;

/// Route discovery state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RouteState {
    /// No route request seen
    NoRoute,
    /// Route requested, waiting for the router to accept it
    RouteRequested,
    /// Route accepted, traffic is forwarded to the last hop
    RouteAccepted,
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoRoute => "NO_ROUTE",
            Self::RouteRequested => "ROUTE_REQUESTED",
            Self::RouteAccepted => "ROUTE_ACCEPTED",
        };
        write!(f, "{name}")
    }
}

/// Router state of one connection.
///
/// State only moves forward. Every mutation is guarded by a per-PDU marker
/// so decoding the same frame again never duplicates history.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    route_hops: Vec<RouteHop>,
    route_requested_frame: Option<FrameId>,
    route_accepted_frame: Option<FrameId>,
    snc_protected: bool,
    visited: HashSet<(FrameId, usize)>,
}

impl SessionState {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current route state.
    #[must_use]
    pub fn state(&self) -> RouteState {
        if self.route_accepted_frame.is_some() {
            RouteState::RouteAccepted
        } else if self.route_requested_frame.is_some() {
            RouteState::RouteRequested
        } else {
            RouteState::NoRoute
        }
    }

    /// Hops of the requested route, source first.
    #[must_use]
    pub fn route_hops(&self) -> &[RouteHop] {
        &self.route_hops
    }

    /// Frame that carried the route request.
    #[must_use]
    pub const fn route_requested_frame(&self) -> Option<FrameId> {
        self.route_requested_frame
    }

    /// Frame that carried the route accept.
    #[must_use]
    pub const fn route_accepted_frame(&self) -> Option<FrameId> {
        self.route_accepted_frame
    }

    /// Whether SNC protection was negotiated on this connection.
    #[must_use]
    pub const fn snc_protected(&self) -> bool {
        self.snc_protected
    }

    /// Final hop of the route, if one is on file.
    #[must_use]
    pub fn destination(&self) -> Option<&RouteHop> {
        self.route_hops.last()
    }

    /// Mark a PDU as processed. Returns `true` the first time it is seen.
    pub fn first_visit(&mut self, frame: FrameId, pdu_offset: usize) -> bool {
        self.visited.insert((frame, pdu_offset))
    }

    /// Whether a PONG in `frame` accepts the pending route.
    ///
    /// Also true when re-decoding the frame that was recorded as the accept.
    #[must_use]
    pub fn is_route_accept(&self, frame: FrameId) -> bool {
        match self.state() {
            RouteState::RouteRequested => !self.route_hops.is_empty(),
            RouteState::RouteAccepted => self.route_accepted_frame == Some(frame),
            RouteState::NoRoute => false,
        }
    }

    /// Record a route request. Ignored once the route is accepted.
    ///
    /// Returns `false` when the request was ignored.
    pub fn record_route(&mut self, frame: FrameId, hops: Vec<RouteHop>) -> bool {
        if self.state() == RouteState::RouteAccepted {
            return false;
        }
        debug!(%frame, hops = hops.len(), "route requested");
        self.route_hops = hops;
        self.route_requested_frame = Some(frame);
        true
    }

    /// Record the route accept.
    pub fn record_accept(&mut self, frame: FrameId) {
        if self.state() == RouteState::RouteRequested {
            debug!(%frame, "route accepted");
            self.route_accepted_frame = Some(frame);
        }
    }

    /// Mark the connection as SNC-protected. Never cleared.
    pub fn mark_snc_protected(&mut self) {
        if !self.snc_protected {
            debug!("snc protection negotiated");
        }
        self.snc_protected = true;
    }
}

/// Direction-independent connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    low: SocketAddr,
    high: SocketAddr,
}

impl ConnectionKey {
    /// Build the key for a segment from `src` to `dst`.
    #[must_use]
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        if src <= dst {
            Self { low: src, high: dst }
        } else {
            Self { low: dst, high: src }
        }
    }

    /// Endpoints in canonical order.
    #[must_use]
    pub const fn endpoints(&self) -> (SocketAddr, SocketAddr) {
        (self.low, self.high)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.low, self.high)
    }
}

/// Sessions of all live connections.
///
/// Bounded: when full, the oldest session is dropped to make room.
#[derive(Debug, Clone)]
pub struct SessionTable {
    max_entries: usize,
    sessions: HashMap<ConnectionKey, SessionState>,
    order: VecDeque<ConnectionKey>,
}

impl SessionTable {
    /// Create a table holding at most `max_entries` sessions.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            sessions: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Session for `key`, created on first use.
    pub fn get_or_create(&mut self, key: ConnectionKey) -> &mut SessionState {
        if !self.sessions.contains_key(&key) {
            while self.sessions.len() >= self.max_entries {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                debug!(connection = %oldest, "session table full, dropping oldest");
                self.sessions.remove(&oldest);
            }
            self.order.push_back(key);
        }
        self.sessions.entry(key).or_default()
    }

    /// Session for `key`, if one exists.
    #[must_use]
    pub fn get(&self, key: &ConnectionKey) -> Option<&SessionState> {
        self.sessions.get(key)
    }

    /// Mutable session for `key`, if one exists.
    pub fn get_mut(&mut self, key: &ConnectionKey) -> Option<&mut SessionState> {
        self.sessions.get_mut(key)
    }

    /// Drop the session for `key`.
    pub fn remove(&mut self, key: &ConnectionKey) -> Option<SessionState> {
        let removed = self.sessions.remove(key);
        if removed.is_some() {
            self.order.retain(|candidate| candidate != key);
        }
        removed
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
