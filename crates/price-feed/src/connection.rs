//! Live feed connection management
//!
//! `ReconnectMachine` holds the connection lifecycle as explicit phases and
//! returns the `Action`s each transition requires. `ConnectionManager` is the
//! single task that executes those actions against a `Transport`, reads
//! frames into the `PriceStore`, and owns the reconnect timer.
//!
//! Guarantees:
//! - at most one socket (open or connecting) per manager
//! - at most one armed reconnect timer
//! - nothing reconnects after `stop()` until the next `start()`

use futures::future::BoxFuture;
use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use nexus_core::{ConnectionState, FeedResult};

use crate::decoder::decode_frame;
use crate::state::PriceStore;
use crate::transport::{Socket, SocketEvent, Transport};

/// Lifecycle phase of the logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    /// An error was observed; the close event is pending
    Closing,
    Closed { clean: bool },
    ReconnectScheduled,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenSocket,
    CloseSocket,
    ArmTimer(Duration),
    CancelTimer,
}

/// Reconnect state machine, independent of any socket
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    phase: Phase,
    reconnect_delay: Duration,
    socket_active: bool,
    timer_armed: bool,
    retrying: bool,
}

impl ReconnectMachine {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            reconnect_delay,
            socket_active: false,
            timer_armed: false,
            retrying: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// A socket is open or being opened
    pub fn socket_active(&self) -> bool {
        self.socket_active
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self.phase {
            Phase::Idle | Phase::Closed { clean: true } => ConnectionState::Disconnected,
            Phase::Connecting if self.retrying => ConnectionState::Reconnecting,
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Open => ConnectionState::Connected,
            Phase::Closing | Phase::Closed { clean: false } | Phase::ReconnectScheduled => {
                ConnectionState::Reconnecting
            }
        }
    }

    /// Open a new socket, closing the current one first
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(2);
        if self.socket_active {
            actions.push(Action::CloseSocket);
        }
        actions.push(Action::OpenSocket);
        self.socket_active = true;
        self.phase = Phase::Connecting;
        actions
    }

    pub fn opened(&mut self) -> Vec<Action> {
        if self.phase != Phase::Connecting {
            return vec![];
        }
        self.phase = Phase::Open;
        self.retrying = false;

        if self.timer_armed {
            self.timer_armed = false;
            vec![Action::CancelTimer]
        } else {
            vec![]
        }
    }

    /// Errors are only recorded; the close event that follows drives retry
    pub fn errored(&mut self) -> Vec<Action> {
        if matches!(self.phase, Phase::Connecting | Phase::Open) {
            self.phase = Phase::Closing;
        }
        vec![]
    }

    pub fn closed(&mut self, clean: bool) -> Vec<Action> {
        if !self.socket_active {
            return vec![];
        }
        self.socket_active = false;
        self.phase = Phase::Closed { clean };

        if clean {
            self.retrying = false;
            return vec![];
        }

        self.phase = Phase::ReconnectScheduled;
        if self.timer_armed {
            return vec![];
        }
        self.timer_armed = true;
        vec![Action::ArmTimer(self.reconnect_delay)]
    }

    pub fn timer_fired(&mut self) -> Vec<Action> {
        if !self.timer_armed {
            return vec![];
        }
        self.timer_armed = false;
        self.retrying = true;
        self.start()
    }

    /// Teardown. Safe from any phase, any number of times.
    pub fn stop(&mut self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(2);
        if self.socket_active {
            actions.push(Action::CloseSocket);
            self.socket_active = false;
        }
        if self.timer_armed {
            actions.push(Action::CancelTimer);
            self.timer_armed = false;
        }
        self.phase = Phase::Idle;
        self.retrying = false;
        actions
    }
}

/// Connection settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Full feed URI, subscription query included
    pub url: String,
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.coincap.io/prices?assets=bitcoin,ethereum,dogecoin".to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    reconnects: AtomicU64,
    frames: AtomicU64,
    ticks: AtomicU64,
    decode_errors: AtomicU64,
}

/// Feed statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connect_attempts: u64,
    pub reconnects: u64,
    pub frames: u64,
    pub ticks: u64,
    pub decode_errors: u64,
}

enum Command {
    Start,
    Stop(oneshot::Sender<()>),
}

/// Owner's handle to a running connection manager.
///
/// Dropping the handle tears the connection down.
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Connect, superseding any current socket
    pub fn start(&self) {
        let _ = self.commands.send(Command::Start);
    }

    /// Close the socket and cancel any pending reconnect. Returns once done.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Stop(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Stop and wait for the manager task to exit
    pub async fn shutdown(self) {
        self.stop().await;
        let ConnectionHandle { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            error!("Connection task failed: {}", e);
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            connect_attempts: self.counters.connect_attempts.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
            frames: self.counters.frames.load(Ordering::Relaxed),
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Single-task driver of one live connection
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    config: ConnectionConfig,
    store: Arc<PriceStore>,
    machine: ReconnectMachine,
    socket: Option<T::Socket>,
    connecting: Option<BoxFuture<'static, FeedResult<T::Socket>>>,
    reconnect_at: Option<Instant>,
    state_tx: watch::Sender<ConnectionState>,
    counters: Arc<Counters>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Spawn the manager task. It stays idle until `start()`.
    pub fn spawn(transport: T, config: ConnectionConfig, store: Arc<PriceStore>) -> ConnectionHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let counters = Arc::new(Counters::default());

        let manager = Self {
            transport: Arc::new(transport),
            machine: ReconnectMachine::new(config.reconnect_delay),
            config,
            store,
            socket: None,
            connecting: None,
            reconnect_at: None,
            state_tx,
            counters: Arc::clone(&counters),
        };

        let task = tokio::spawn(manager.run(commands_rx));

        ConnectionHandle {
            commands: commands_tx,
            state: state_rx,
            counters,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start) => {
                        let actions = self.machine.start();
                        self.apply(actions).await;
                    }
                    Some(Command::Stop(ack)) => {
                        let actions = self.machine.stop();
                        self.apply(actions).await;
                        let _ = ack.send(());
                    }
                    None => {
                        let actions = self.machine.stop();
                        self.apply(actions).await;
                        self.publish_state();
                        break;
                    }
                },
                result = wait_connect(&mut self.connecting), if self.connecting.is_some() => {
                    self.connecting = None;
                    self.on_connect_result(result).await;
                }
                event = wait_event(&mut self.socket), if self.socket.is_some() => {
                    self.on_socket_event(event).await;
                }
                _ = wait_deadline(self.reconnect_at), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                    info!("Reconnecting to {}", self.config.url);
                    let actions = self.machine.timer_fired();
                    self.apply(actions).await;
                }
            }

            self.publish_state();
        }

        debug!("Connection manager for {} exited", self.config.url);
    }

    async fn on_connect_result(&mut self, result: FeedResult<T::Socket>) {
        match result {
            Ok(socket) => {
                info!("Connected to {}", self.config.url);
                self.socket = Some(socket);
                let actions = self.machine.opened();
                self.apply(actions).await;
            }
            Err(e) => {
                // A failed connect is an error followed by an unclean close
                error!("WebSocket error: {}", e);
                self.machine.errored();
                let actions = self.machine.closed(false);
                self.apply(actions).await;
            }
        }
    }

    async fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Message(text) => self.on_frame(&text),
            SocketEvent::Error(e) => {
                error!("WebSocket error: {}", e);
                self.machine.errored();
            }
            SocketEvent::Closed { clean, reason } => {
                self.socket = None;
                let reason = reason.as_deref().unwrap_or("unknown reason");
                if clean {
                    info!("WebSocket closed by server: {}", reason);
                } else {
                    warn!("WebSocket disconnected: {}", reason);
                }
                let actions = self.machine.closed(clean);
                self.apply(actions).await;
            }
        }
    }

    fn on_frame(&self, text: &str) {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);

        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping live frame: {}", e);
                return;
            }
        };

        let counters = &self.counters;
        let ticks = frame.valid(|e| {
            counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Skipping live entry: {}", e);
        });

        for tick in ticks {
            counters.ticks.fetch_add(1, Ordering::Relaxed);
            if self.store.apply_tick(&tick) {
                debug!("{} -> {}", tick.id, tick.price);
            }
        }
    }

    async fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::CloseSocket => {
                    self.connecting = None;
                    if let Some(mut socket) = self.socket.take() {
                        debug!("Closing socket to {}", self.config.url);
                        socket.close().await;
                    }
                }
                Action::OpenSocket => {
                    info!("Connecting to {}", self.config.url);
                    self.counters.connect_attempts.fetch_add(1, Ordering::Relaxed);
                    let transport = Arc::clone(&self.transport);
                    let url = self.config.url.clone();
                    self.connecting = Some(Box::pin(async move { transport.connect(&url).await }));
                }
                Action::ArmTimer(delay) => {
                    warn!("Attempting to reconnect in {:?}", delay);
                    self.reconnect_at = Some(Instant::now() + delay);
                }
                Action::CancelTimer => {
                    self.reconnect_at = None;
                }
            }
        }
    }

    fn publish_state(&self) {
        let next = self.machine.connection_state();
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!("Connection state {} -> {}", state, next);
            *state = next;
            true
        });
    }
}

async fn wait_connect<S>(connecting: &mut Option<BoxFuture<'static, FeedResult<S>>>) -> FeedResult<S> {
    match connecting {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn wait_event<S: Socket>(socket: &mut Option<S>) -> SocketEvent {
    match socket {
        Some(socket) => socket.next_event().await,
        None => pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    const DELAY: Duration = Duration::from_millis(5_000);

    // Machine

    #[test]
    fn test_start_opens_one_socket() {
        let mut m = ReconnectMachine::new(DELAY);
        assert_eq!(m.start(), vec![Action::OpenSocket]);
        assert_eq!(m.phase(), Phase::Connecting);
        assert_eq!(m.connection_state(), ConnectionState::Connecting);

        assert!(m.opened().is_empty());
        assert_eq!(m.connection_state(), ConnectionState::Connected);

        // Second start closes the first socket before opening
        assert_eq!(m.start(), vec![Action::CloseSocket, Action::OpenSocket]);
    }

    #[test]
    fn test_unclean_close_arms_single_timer() {
        let mut m = ReconnectMachine::new(DELAY);
        m.start();
        m.opened();

        assert_eq!(m.closed(false), vec![Action::ArmTimer(DELAY)]);
        assert!(m.timer_armed());
        assert_eq!(m.phase(), Phase::ReconnectScheduled);

        // A duplicate close is ignored
        assert!(m.closed(false).is_empty());

        // A socket started by hand that also fails does not stack a timer
        assert_eq!(m.start(), vec![Action::OpenSocket]);
        assert!(m.closed(false).is_empty());
        assert!(m.timer_armed());
    }

    #[test]
    fn test_error_does_not_reconnect_by_itself() {
        let mut m = ReconnectMachine::new(DELAY);
        m.start();
        m.opened();

        assert!(m.errored().is_empty());
        assert_eq!(m.phase(), Phase::Closing);
        assert!(!m.timer_armed());

        assert_eq!(m.closed(false), vec![Action::ArmTimer(DELAY)]);
    }

    #[test]
    fn test_clean_close_is_terminal() {
        let mut m = ReconnectMachine::new(DELAY);
        m.start();
        m.opened();

        assert!(m.closed(true).is_empty());
        assert_eq!(m.phase(), Phase::Closed { clean: true });
        assert_eq!(m.connection_state(), ConnectionState::Disconnected);
        assert!(m.timer_fired().is_empty());
    }

    #[test]
    fn test_timer_fire_restarts_and_open_cancels() {
        let mut m = ReconnectMachine::new(DELAY);
        m.start();
        m.closed(false);

        assert_eq!(m.timer_fired(), vec![Action::OpenSocket]);
        assert_eq!(m.connection_state(), ConnectionState::Reconnecting);
        assert!(!m.timer_armed());

        assert!(m.opened().is_empty());
        assert_eq!(m.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn test_open_cancels_armed_timer() {
        let mut m = ReconnectMachine::new(DELAY);
        m.start();
        m.closed(false);

        m.start();
        assert_eq!(m.opened(), vec![Action::CancelTimer]);
        assert!(!m.timer_armed());
        assert!(m.timer_fired().is_empty());
    }

    #[test]
    fn test_stop_from_any_phase() {
        let mut m = ReconnectMachine::new(DELAY);
        assert!(m.stop().is_empty());

        m.start();
        assert_eq!(m.stop(), vec![Action::CloseSocket]);
        assert!(m.stop().is_empty());

        m.start();
        m.closed(false);
        assert_eq!(m.stop(), vec![Action::CancelTimer]);
        assert_eq!(m.phase(), Phase::Idle);

        // Timer cancelled: a late fire does nothing
        assert!(m.timer_fired().is_empty());
        assert_eq!(m.connection_state(), ConnectionState::Disconnected);
    }

    // Manager

    struct Harness {
        transport: FakeTransport,
        store: Arc<PriceStore>,
        handle: ConnectionHandle,
    }

    fn harness() -> Harness {
        let transport = FakeTransport::new();
        let store = Arc::new(PriceStore::new());
        let config = ConnectionConfig {
            url: "wss://feed.test/prices?assets=bitcoin,ethereum".to_string(),
            reconnect_delay: DELAY,
        };
        let handle = ConnectionManager::spawn(transport.clone(), config, Arc::clone(&store));
        Harness {
            transport,
            store,
            handle,
        }
    }

    /// Let the manager task drain its queue
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_reach_store() {
        let h = harness();
        h.handle.start();
        settle().await;

        assert_eq!(h.handle.state(), ConnectionState::Connected);
        assert_eq!(
            h.transport.last_url().as_deref(),
            Some("wss://feed.test/prices?assets=bitcoin,ethereum")
        );

        h.transport.emit_text(r#"{"bitcoin":"50000","ethereum":"bad"}"#);
        h.transport.emit_text("not json");
        h.transport.emit_text(r#"{"bitcoin":"50500"}"#);
        settle().await;

        assert_eq!(h.store.get("bitcoin").unwrap().price, 50_500.0);
        assert!(h.store.get("ethereum").is_none());

        let stats = h.handle.stats();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.decode_errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclean_close_reconnects_after_delay() {
        let h = harness();
        h.handle.start();
        settle().await;

        h.transport.close_unclean();
        settle().await;
        assert_eq!(h.handle.state(), ConnectionState::Reconnecting);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(h.transport.connects(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.transport.connects(), 2);
        assert_eq!(h.handle.state(), ConnectionState::Connected);
        assert_eq!(h.handle.stats().reconnects, 1);

        // No further attempts once connected
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_then_close_schedules_one_retry() {
        let h = harness();
        h.handle.start();
        settle().await;

        h.transport.emit(SocketEvent::Error("connection reset".to_string()));
        settle().await;
        assert_eq!(h.handle.state(), ConnectionState::Reconnecting);
        assert_eq!(h.transport.connects(), 1);

        h.transport.close_unclean();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(h.transport.connects(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_does_not_reconnect() {
        let h = harness();
        h.handle.start();
        settle().await;

        h.transport.close_clean();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(h.transport.connects(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connects_retry_forever_at_fixed_delay() {
        let h = harness();
        h.transport.fail_next(3);
        h.handle.start();
        settle().await;

        assert_eq!(h.transport.connects(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Reconnecting);

        for expected in 2..=4 {
            tokio::time::sleep(Duration::from_millis(5_001)).await;
            assert_eq!(h.transport.connects(), expected);
        }
        assert_eq!(h.handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let h = harness();
        h.handle.start();
        settle().await;

        h.transport.close_unclean();
        settle().await;

        h.handle.stop().await;
        assert_eq!(h.handle.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_socket_and_is_idempotent() {
        let h = harness();
        h.handle.stop().await;

        h.handle.start();
        settle().await;
        h.handle.stop().await;
        h.handle.stop().await;

        assert_eq!(h.transport.closes(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Disconnected);

        // Frames on a closed socket are not read
        h.transport.emit_text(r#"{"bitcoin":"1"}"#);
        settle().await;
        assert!(h.store.get("bitcoin").is_none());

        // Restart after stop
        h.handle.start();
        settle().await;
        assert_eq!(h.transport.connects(), 2);
        assert_eq!(h.handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_supersedes_open_socket() {
        let h = harness();
        h.handle.start();
        settle().await;
        h.handle.start();
        settle().await;

        assert_eq!(h.transport.connects(), 2);
        assert_eq!(h.transport.closes(), 1);
        assert_eq!(h.handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_tears_down() {
        let h = harness();
        h.handle.start();
        settle().await;
        h.transport.close_unclean();
        settle().await;

        let transport = h.transport.clone();
        h.handle.shutdown().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_handle_closes_socket() {
        let h = harness();
        h.handle.start();
        settle().await;

        let Harness {
            transport, handle, ..
        } = h;
        drop(handle);
        settle().await;

        assert_eq!(transport.closes(), 1);
    }
}
