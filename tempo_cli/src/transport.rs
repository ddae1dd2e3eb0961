//! UDP command channel.
//!
//! There is one session at a time. The first datagram from a peer opens
//! it. Responses go back to that peer. Silence for `idle_timeout_ms`
//! closes it. A datagram from a different peer takes the session over.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempo_core::TransportEvent;
use tempo_traits::{Clock, ResponseSink};

use crate::error_fmt::CliError;

/// Largest datagram accepted; the longest command frame is 20 bytes.
const RX_BUF_LEN: usize = 512;
/// Datagrams drained per poll before control returns to the loop.
const MAX_DATAGRAMS_PER_POLL: usize = 32;

type PeerSlot = Arc<Mutex<Option<SocketAddr>>>;

pub struct UdpTransport {
    socket: UdpSocket,
    peer: PeerSlot,
    last_rx_ms: i64,
    idle_timeout_ms: i64,
    rxbuf: Vec<u8>,
}

impl UdpTransport {
    /// Bind `addr`. Reads block for at most `read_timeout`, which paces the
    /// service loop when the channel is quiet.
    pub fn bind(addr: &str, idle_timeout_ms: u64, read_timeout: Duration) -> eyre::Result<Self> {
        let bind_err = |source| CliError::Bind {
            addr: addr.to_string(),
            source,
        };
        let socket = UdpSocket::bind(addr).map_err(bind_err)?;
        socket
            .set_read_timeout(Some(read_timeout.max(Duration::from_micros(100))))
            .map_err(bind_err)?;
        tracing::info!(addr = %socket.local_addr().map_err(bind_err)?, "udp transport listening");
        Ok(Self {
            socket,
            peer: Arc::new(Mutex::new(None)),
            last_rx_ms: 0,
            idle_timeout_ms: i64::try_from(idle_timeout_ms).unwrap_or(i64::MAX),
            rxbuf: vec![0; RX_BUF_LEN],
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sink that sends responses to the current peer.
    pub fn sink(&self) -> eyre::Result<UdpSink> {
        Ok(UdpSink {
            socket: self.socket.try_clone()?,
            peer: Arc::clone(&self.peer),
        })
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer.lock().map(|p| *p).unwrap_or_else(|e| *e.into_inner())
    }

    fn set_peer(&self, addr: Option<SocketAddr>) {
        match self.peer.lock() {
            Ok(mut p) => *p = addr,
            Err(e) => *e.into_inner() = addr,
        }
    }

    /// Drain pending datagrams and check the idle timeout. Each datagram is
    /// stamped when it arrives, not when the poll started.
    pub fn poll(&mut self, clock: &dyn Clock, events: &mut Vec<TransportEvent>) {
        for _ in 0..MAX_DATAGRAMS_PER_POLL {
            let (len, from) = match self.socket.recv_from(&mut self.rxbuf) {
                Ok(r) => r,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "udp receive failed");
                    break;
                }
            };
            match self.peer() {
                Some(current) if current == from => {}
                Some(current) => {
                    tracing::info!(old = %current, new = %from, "session taken over by new peer");
                    events.push(TransportEvent::Disconnected);
                    self.set_peer(Some(from));
                    events.push(TransportEvent::Connected);
                }
                None => {
                    tracing::info!(peer = %from, "session opened");
                    self.set_peer(Some(from));
                    events.push(TransportEvent::Connected);
                }
            }
            self.last_rx_ms = clock.now_ms();
            events.push(TransportEvent::Write(self.rxbuf[..len].to_vec()));
        }

        let now_ms = clock.now_ms();
        if let Some(peer) = self.peer()
            && now_ms.saturating_sub(self.last_rx_ms) >= self.idle_timeout_ms
        {
            tracing::info!(%peer, idle_ms = now_ms - self.last_rx_ms, "session idle; closing");
            self.set_peer(None);
            events.push(TransportEvent::Disconnected);
        }
    }
}

/// Notifies responses to whichever peer holds the session.
pub struct UdpSink {
    socket: UdpSocket,
    peer: PeerSlot,
}

impl ResponseSink for UdpSink {
    fn notify(&mut self, payload: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let peer = self.peer.lock().map(|p| *p).unwrap_or_else(|e| *e.into_inner());
        let Some(peer) = peer else {
            return Err("no peer for response".into());
        };
        self.socket.send_to(payload, peer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use tempo_traits::ManualClock;

    use super::*;

    /// Advances a fixed step every time it is read.
    struct SteppingClock {
        now: AtomicI64,
        step: i64,
    }

    impl Clock for SteppingClock {
        fn now_ms(&self) -> i64 {
            self.now.fetch_add(self.step, Ordering::Relaxed) + self.step
        }

        fn delay(&self, _d: Duration) {}
    }

    fn loopback() -> (UdpTransport, UdpSocket) {
        let transport =
            UdpTransport::bind("127.0.0.1:0", 100, Duration::from_millis(20)).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.connect(transport.local_addr().unwrap()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        (transport, client)
    }

    #[test]
    fn first_datagram_opens_session_and_responses_return() {
        let (mut transport, client) = loopback();
        let mut sink = transport.sink().unwrap();
        client.send(&[0x05]).unwrap();

        let mut events = Vec::new();
        transport.poll(&ManualClock::new(), &mut events);
        assert_eq!(
            events,
            vec![TransportEvent::Connected, TransportEvent::Write(vec![0x05])]
        );

        sink.notify(&[1, 0]).unwrap();
        let mut buf = [0u8; 8];
        let n = client.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 0]);
    }

    #[test]
    fn idle_timeout_closes_session() {
        let (mut transport, client) = loopback();
        client.send(&[0x05]).unwrap();
        let clock = ManualClock::starting_at_ms(1_000);
        let mut events = Vec::new();
        transport.poll(&clock, &mut events);
        events.clear();

        clock.set_ms(1_050);
        transport.poll(&clock, &mut events);
        assert!(events.is_empty());
        clock.set_ms(1_100);
        transport.poll(&clock, &mut events);
        assert_eq!(events, vec![TransportEvent::Disconnected]);

        let mut sink = transport.sink().unwrap();
        assert!(sink.notify(&[0]).is_err());
    }

    #[test]
    fn datagrams_are_stamped_on_arrival() {
        let (mut transport, client) = loopback();
        client.send(&[0x05]).unwrap();
        client.send(&[0x05]).unwrap();
        // Let both datagrams queue before the drain starts.
        std::thread::sleep(Duration::from_millis(20));

        // 1060 and 1120 for the two receives, 1180 for the idle check.
        let clock = SteppingClock {
            now: AtomicI64::new(1_000),
            step: 60,
        };
        let mut events = Vec::new();
        transport.poll(&clock, &mut events);
        assert_eq!(
            events,
            vec![
                TransportEvent::Connected,
                TransportEvent::Write(vec![0x05]),
                TransportEvent::Write(vec![0x05]),
            ]
        );
    }
}
