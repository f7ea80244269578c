// UDP packet listener that only keeps the most recent datagram

use std::{
    io::{self, ErrorKind},
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::TimeTrialError;

/// Upper bound on how long the receive loop blocks before re-checking its stop flag.
pub const RECV_TIMEOUT_MS: u64 = 50;

#[derive(Default)]
struct SlotState {
    payload: Option<Arc<[u8]>>,
    received: u64,
    failure: Option<String>,
}

/// Single-value handoff between the receive loop and whoever polls it.
///
/// Every publish replaces the previous payload wholesale, readers get a shared
/// handle to a complete datagram and never see a partially written one.
#[derive(Clone, Default)]
pub struct PayloadSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl PayloadSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current payload with a copy of `payload`
    pub fn publish(&self, payload: &[u8]) {
        let payload: Arc<[u8]> = Arc::from(payload);
        let mut state = self.state();
        state.payload = Some(payload);
        state.received += 1;
    }

    /// Most recent payload, `None` until the first datagram arrives
    pub fn latest(&self) -> Option<Arc<[u8]>> {
        self.state().payload.clone()
    }

    /// Number of datagrams published since the last reset
    pub fn received(&self) -> u64 {
        self.state().received
    }

    /// Reason the receive loop died, if it did
    pub fn failure(&self) -> Option<String> {
        self.state().failure.clone()
    }

    pub(crate) fn fail(&self, cause: String) {
        self.state().failure = Some(cause);
    }

    pub(crate) fn reset(&self) {
        *self.state() = SlotState::default();
    }
}

/// Listens for telemetry datagrams on a loopback port in a background thread.
///
/// Only one receive loop is ever alive per listener: calling [`PacketListener::start`]
/// again stops and joins the previous loop before the new socket is bound.
pub struct PacketListener {
    slot: PayloadSlot,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Default for PacketListener {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketListener {
    pub fn new() -> Self {
        Self {
            slot: PayloadSlot::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
            local_addr: None,
        }
    }

    /// Bind `127.0.0.1:port` and start receiving in a background thread.
    ///
    /// Port `0` binds an ephemeral port, the address actually bound is returned.
    /// Any previous payload is discarded so a new session never sees stale data.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or configured, or if the
    /// receive thread cannot be spawned.
    pub fn start(&mut self, port: u16, buffer_size: usize) -> Result<SocketAddr, TimeTrialError> {
        self.stop();

        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, port))
            .map_err(|e| TimeTrialError::SocketBind { port, source: e })?;
        socket
            .set_read_timeout(Some(Duration::from_millis(RECV_TIMEOUT_MS)))
            .map_err(|e| TimeTrialError::SocketConfig { source: e })?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| TimeTrialError::SocketConfig { source: e })?;

        self.slot.reset();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let slot = self.slot.clone();
        let loop_stop_flag = stop_flag.clone();
        let handle = thread::Builder::new()
            .name("udp-listener".to_string())
            .spawn(move || receive_loop(socket, buffer_size, slot, loop_stop_flag))
            .map_err(|e| TimeTrialError::ThreadSpawn {
                name: "udp-listener".to_string(),
                source: e,
            })?;

        info!("Listening for telemetry on {}", local_addr);
        self.stop_flag = stop_flag;
        self.handle = Some(handle);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Ask the receive loop to exit and wait for it, bounded by [`RECV_TIMEOUT_MS`].
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("UDP listener thread panicked");
            }
        }
        if let Some(addr) = self.local_addr.take() {
            info!("Stopped listening on {}", addr);
        }
    }

    pub fn latest(&self) -> Option<Arc<[u8]>> {
        self.slot.latest()
    }

    /// A handle to the shared payload slot that can be moved to another thread
    pub fn slot(&self) -> PayloadSlot {
        self.slot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for PacketListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `WSAEMSGSIZE`: Windows reports a datagram larger than the buffer as an error
/// after filling the buffer with its first bytes. Other platforms truncate silently.
const WSAEMSGSIZE: i32 = 10040;

fn is_truncated_datagram(e: &io::Error) -> bool {
    cfg!(windows) && e.raw_os_error() == Some(WSAEMSGSIZE)
}

fn receive_loop(socket: UdpSocket, buffer_size: usize, slot: PayloadSlot, stop_flag: Arc<AtomicBool>) {
    let mut buf = vec![0u8; buffer_size];
    while !stop_flag.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => slot.publish(&buf[..len]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if is_truncated_datagram(&e) => {
                debug!("Datagram larger than {} bytes, keeping the first part", buffer_size);
                slot.publish(&buf);
            }
            // ICMP port unreachable surfaces as a reset on some platforms
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::ConnectionReset) => {
                debug!("Ignoring transient UDP error: {}", e);
            }
            Err(e) => {
                error!("UDP listener failed: {}", e);
                slot.fail(e.to_string());
                break;
            }
        }
    }
}
