use alloc::boxed::Box;
use alloc::vec::Vec;
use core::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use core::time::Duration;

use networked::prelude::*;
use networked_core::id::NetworkId;
use networked_transport::local::{LocalConnector, LocalServerBackend};
use networked_transport::tcp::{TcpClient, TcpConfig, TcpServerBackend};
use tracing::info;

use crate::protocol::{EventLog, register_prefabs};

const LOCALHOST: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));

/// Stepper with:
/// - 1 server session
/// - n client sessions connected to it
///
/// Every participant records its hooks in its own [`EventLog`]. A frame runs the client ticks first,
/// then the server tick, so a message sent by a client is applied by the server in the same frame
/// and the answer reaches the clients on the next one.
pub struct ClientServerStepper {
    pub server: ServerSession,
    pub clients: Vec<ClientSession>,
    pub server_log: EventLog,
    pub client_logs: Vec<EventLog>,
    /// Connection events reported by the server, oldest first
    pub server_events: Vec<SessionEvent>,
    pub frame_duration: Duration,
    /// Sleep between frames, for transports that deliver asynchronously
    pub io_delay: Option<Duration>,
    connector: Option<LocalConnector>,
    tcp_addr: Option<SocketAddr>,
}

impl ClientServerStepper {
    pub fn single() -> Self {
        Self::with_clients(1)
    }

    /// n clients connected with in-process channels
    pub fn with_clients(n: usize) -> Self {
        let backend = LocalServerBackend::new();
        let connector = backend.connector();
        let mut stepper = Self::new(Box::new(backend));
        stepper.connector = Some(connector);
        for _ in 0..n {
            stepper.new_client();
        }
        stepper.init();
        stepper
    }

    /// n clients connected over TCP on the loopback interface
    pub fn tcp(n: usize) -> Self {
        let mut backend = TcpServerBackend::new(LOCALHOST, TcpConfig::default());
        backend.start().expect("could not bind the tcp listener");
        let addr = backend.local_addr();
        let mut stepper = Self::new(Box::new(backend));
        stepper.tcp_addr = Some(addr);
        stepper.io_delay = Some(Duration::from_millis(1));
        for _ in 0..n {
            stepper.new_client();
        }
        stepper.init();
        stepper
    }

    pub fn new(backend: Box<dyn ServerBackend>) -> Self {
        let mut server = ServerSession::new(
            backend,
            SessionConfig::default(),
            ReplicationConfig::default(),
        );
        let server_log = EventLog::default();
        register_prefabs(server.context_mut(), &server_log);
        server.start().expect("could not start the server");
        Self {
            server,
            clients: Vec::new(),
            server_log,
            client_logs: Vec::new(),
            server_events: Vec::new(),
            frame_duration: Duration::from_millis(10),
            io_delay: None,
            connector: None,
            tcp_addr: None,
        }
    }

    /// Connect a client with the transport of the stepper
    pub fn new_client(&mut self) -> usize {
        let backend: Box<dyn ClientBackend> = match (&self.connector, self.tcp_addr) {
            (Some(connector), _) => Box::new(connector.connect().expect("local server is gone")),
            (None, Some(addr)) => Box::new(
                TcpClient::connect(addr, &TcpConfig::default()).expect("could not connect"),
            ),
            (None, None) => panic!("the stepper has no default client transport"),
        };
        self.add_client(backend)
    }

    /// Add a client over an already connected backend
    pub fn add_client(&mut self, backend: Box<dyn ClientBackend>) -> usize {
        let mut client = ClientSession::connect(
            backend,
            SessionConfig::default(),
            ReplicationConfig::default(),
        )
        .expect("could not open the client session");
        let log = EventLog::default();
        register_prefabs(client.context_mut(), &log);
        self.clients.push(client);
        self.client_logs.push(log);
        self.clients.len() - 1
    }

    /// Step until the server accepted every client
    pub fn init(&mut self) {
        self.wait_for_connection();
        // deliver the snapshots
        self.frame_step(1);
    }

    pub fn wait_for_connection(&mut self) {
        for _ in 0..500 {
            if self.server.peers().len() >= self.clients.len() {
                info!("Clients are all connected");
                return;
            }
            self.frame_step(1);
        }
        panic!("clients did not connect");
    }

    /// Disconnect the last client
    pub fn disconnect_client(&mut self) {
        let mut client = self.clients.pop().expect("no client to disconnect");
        self.client_logs.pop();
        client.disconnect();
        self.frame_step(1);
    }

    pub fn client(&self, id: usize) -> &ReplicationContext {
        self.clients[id].context()
    }

    pub fn client_mut(&mut self, id: usize) -> &mut ReplicationContext {
        self.clients[id].context_mut()
    }

    pub fn server(&self) -> &ReplicationContext {
        self.server.context()
    }

    pub fn server_mut(&mut self) -> &mut ReplicationContext {
        self.server.context_mut()
    }

    pub fn advance_time(&mut self, duration: Duration) {
        mock_instant::thread_local::MockClock::advance(duration);
        if let Some(delay) = self.io_delay {
            std::thread::sleep(delay);
        }
    }

    /// Advance the sessions by n frames
    pub fn frame_step(&mut self, n: usize) {
        let delta = self.frame_duration.as_secs_f32();
        for _ in 0..n {
            self.advance_time(self.frame_duration);
            for client in self.clients.iter_mut() {
                if client.is_connected() {
                    client.tick(delta).expect("client tick failed");
                }
            }
            let events = self.server.tick(delta).expect("server tick failed");
            self.server_events.extend(events);
        }
    }

    /// Frame step until `condition` holds, at most `max` frames. Returns false on timeout.
    pub fn step_until(
        &mut self,
        max: usize,
        mut condition: impl FnMut(&ClientServerStepper) -> bool,
    ) -> bool {
        for _ in 0..max {
            if condition(self) {
                return true;
            }
            self.frame_step(1);
        }
        condition(self)
    }

    /// Key of the object registered as `network_id` on client `id`
    pub fn client_key(&self, id: usize, network_id: NetworkId) -> Option<ObjectKey> {
        self.client(id).key_of(network_id)
    }
}
