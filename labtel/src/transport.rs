//! Byte transport: TCP (optionally TLS-wrapped) + telnet plumbing.
//!
//! [`Protocol`] is the pure half — telnet parsing, option negotiation, and
//! ENQ answerback — with no I/O handles, so the whole wire behaviour is
//! testable without a socket. [`Transport`] owns the stream and a
//! `Protocol`, and exposes the three primitives the session driver needs:
//! `read_eager` (drain whatever is available, waiting briefly for more),
//! `read_until` (login prompts and echo drains), and `write_bytes`.
//!
//! The session is half-duplex at the application layer: the driver strictly
//! alternates writes and reads, so no task runs reads concurrently.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::HostConfig;
use crate::telnet::{Negotiator, TelnetEvent, TelnetParser};

/// ENQ — the host asks the terminal to identify itself.
pub const ENQ: u8 = 0x05;
/// EOT — sent to the host to end the session after logout.
pub const EOT: u8 = 0x04;

const READ_BUF: usize = 8192;

// ── Protocol (pure, testable) ─────────────────────────────────────────────

/// Telnet-level state with no I/O: parser, negotiation policy, answerback.
///
/// `process` consumes a raw segment and returns `(data, replies)`: the
/// cleaned data bytes (telnet commands and ENQ stripped) and whatever must
/// be written back to the host.
pub struct Protocol {
    parser: TelnetParser,
    negotiator: Negotiator,
    answerback: Vec<u8>,
    /// An ENQ arrived since the last [`Self::take_enq`].
    enq_seen: bool,
}

impl Protocol {
    pub fn new(answerback: Vec<u8>, terminals: Vec<String>, window: (u16, u16)) -> Self {
        Self {
            parser: TelnetParser::new(),
            negotiator: Negotiator::new(terminals, window),
            answerback,
            enq_seen: false,
        }
    }

    /// Process one raw segment from the network.
    pub fn process(&mut self, raw: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let mut replies = Vec::new();
        for event in self.parser.feed(raw) {
            match event {
                TelnetEvent::Data(bytes) => {
                    for b in bytes {
                        if b == ENQ {
                            // Answer before the rest of the stream is parsed;
                            // the host holds the login until it hears a
                            // terminal it recognises.
                            debug!("ENQ received, sending answerback");
                            self.enq_seen = true;
                            replies.extend_from_slice(&self.answerback);
                        } else {
                            data.push(b);
                        }
                    }
                }
                other => {
                    if let Some(reply) = self.negotiator.respond(&other) {
                        replies.extend_from_slice(&reply);
                    }
                }
            }
        }
        (data, replies)
    }

    /// Whether an ENQ arrived since the last call; clears the flag.
    pub fn take_enq(&mut self) -> bool {
        std::mem::take(&mut self.enq_seen)
    }
}

// ── Internal stream type ──────────────────────────────────────────────────

enum Inner {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Inner {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Inner::Plain(s) => s.read(buf).await,
            Inner::Tls(s) => s.read(buf).await,
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Inner::Plain(s) => s.write_all(buf).await,
            Inner::Tls(s) => s.write_all(buf).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Inner::Plain(s) => s.shutdown().await,
            Inner::Tls(s) => s.shutdown().await,
        }
    }
}

// ── Transport ─────────────────────────────────────────────────────────────

/// One telnet session to the host.
pub struct Transport {
    stream: Inner,
    proto: Protocol,
    /// Data decoded but not yet handed to a caller (`read_until` leftovers).
    pending: Vec<u8>,
}

impl Transport {
    /// Open a session per the host configuration.
    pub async fn connect(config: &HostConfig) -> io::Result<Self> {
        let proto = Protocol::new(
            config.answerback.clone(),
            config.terminals.clone(),
            config.window,
        );
        let tcp = TcpStream::connect((config.address.as_str(), config.port)).await?;
        let stream = if config.tls {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let tls_config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let connector = TlsConnector::from(Arc::new(tls_config));
            let server_name: ServerName<'static> =
                ServerName::try_from(config.address.clone())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
            let tls = connector.connect(server_name, tcp).await?;
            Inner::Tls(Box::new(tls))
        } else {
            Inner::Plain(tcp)
        };
        debug!(address = %config.address, port = config.port, tls = config.tls, "transport open");
        Ok(Self {
            stream,
            proto,
            pending: Vec::new(),
        })
    }

    /// Read one segment with a bounded wait, run it through the protocol,
    /// and flush any negotiation replies.
    ///
    /// Returns the decoded data bytes; `None` when the wait elapsed with
    /// nothing on the wire.
    async fn read_segment(&mut self, wait: Duration) -> io::Result<Option<Vec<u8>>> {
        let mut raw = [0u8; READ_BUF];
        match timeout(wait, self.stream.read(&mut raw)).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(e),
            Ok(Ok(0)) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "host closed the connection",
            )),
            Ok(Ok(n)) => {
                let (data, replies) = self.proto.process(&raw[..n]);
                if !replies.is_empty() {
                    self.stream.write_all(&replies).await?;
                }
                Ok(Some(data))
            }
        }
    }

    /// Drain whatever the host has sent, waiting briefly for more.
    ///
    /// Reads in `slice_wait` steps: data keeps the drain going until a step
    /// comes back empty or the cumulative wait reaches `max_wait`. When the
    /// first step is empty, `wait_if_empty` decides whether to keep waiting
    /// for the host to start talking or to return an empty buffer at once.
    pub async fn read_eager(
        &mut self,
        max_wait: Duration,
        slice_wait: Duration,
        wait_if_empty: bool,
    ) -> io::Result<Vec<u8>> {
        let mut out = std::mem::take(&mut self.pending);
        let start = Instant::now();
        loop {
            match self.read_segment(slice_wait).await {
                Err(e) if !out.is_empty() => {
                    // Hand over what we have; the next read reports the error.
                    warn!(error = %e, "read failed with data in hand");
                    break;
                }
                Err(e) => return Err(e),
                Ok(Some(data)) => {
                    out.extend_from_slice(&data);
                    if start.elapsed() >= max_wait {
                        debug!("maximum wait reached; the frame may be cut off");
                        break;
                    }
                }
                Ok(None) => {
                    if out.is_empty() && wait_if_empty && start.elapsed() < max_wait {
                        continue;
                    }
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Read until `pattern` appears in the decoded data or `max_wait`
    /// elapses. Returns everything up to and including the pattern; data
    /// after it stays buffered for the next read.
    ///
    /// On timeout, whatever arrived is returned without the pattern — the
    /// caller decides whether that is fatal.
    pub async fn read_until(&mut self, pattern: &[u8], max_wait: Duration) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + max_wait;
        let mut buf = std::mem::take(&mut self.pending);
        loop {
            if !pattern.is_empty() {
                if let Some(pos) = find(&buf, pattern) {
                    let rest = buf.split_off(pos + pattern.len());
                    self.pending = rest;
                    return Ok(buf);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(pattern = %String::from_utf8_lossy(pattern), "read_until timed out");
                return Ok(buf);
            }
            match self.read_segment(deadline - now).await {
                Ok(Some(data)) => buf.extend_from_slice(&data),
                Ok(None) => {}
                Err(e) if !buf.is_empty() => {
                    warn!(error = %e, "read failed while scanning for pattern");
                    return Ok(buf);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait until the host sends ENQ (the answerback goes out automatically).
    pub async fn wait_for_enq(&mut self, max_wait: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.proto.take_enq() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            if let Some(data) = self.read_segment(deadline - now).await? {
                // Anything around the ENQ is banner text; keep it for the
                // next read.
                self.pending.extend_from_slice(&data);
            }
        }
    }

    /// Write raw bytes to the host.
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Close the session; errors are reported but the stream is dropped
    /// regardless.
    pub async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// First position of `needle` in `hay`.
fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{build_ttype_is, opt, DO, IAC, SB, SE, TTYPE_SEND, WILL, WONT};

    fn protocol() -> Protocol {
        Protocol::new(
            b"PTERM:CHM\r".to_vec(),
            vec!["VT100".into(), "VT102".into()],
            (128, 5000),
        )
    }

    // ── Protocol ──────────────────────────────────────────────────────────

    #[test]
    fn data_passes_through() {
        let (data, replies) = protocol().process(b"login: ");
        assert_eq!(data, b"login: ");
        assert!(replies.is_empty());
    }

    #[test]
    fn enq_answered_and_stripped() {
        let mut p = protocol();
        let (data, replies) = p.process(b"ab\x05cd");
        assert_eq!(data, b"abcd");
        assert_eq!(replies, b"PTERM:CHM\r");
        assert!(p.take_enq());
        assert!(!p.take_enq());
    }

    #[test]
    fn negotiation_replies_assembled() {
        let mut p = protocol();
        let input = [IAC, WILL, opt::ECHO, IAC, DO, opt::TTYPE, IAC, DO, 42];
        let (data, replies) = p.process(&input);
        assert!(data.is_empty());
        assert_eq!(
            replies,
            vec![IAC, DO, opt::ECHO, IAC, WILL, opt::TTYPE, IAC, WONT, 42]
        );
    }

    #[test]
    fn ttype_subnegotiation_answered() {
        let mut p = protocol();
        let input = [IAC, SB, opt::TTYPE, TTYPE_SEND, IAC, SE];
        let (_, replies) = p.process(&input);
        assert_eq!(replies, build_ttype_is("VT100"));
        let (_, replies) = p.process(&input);
        assert_eq!(replies, build_ttype_is("VT102"));
    }

    #[test]
    fn data_interleaved_with_commands() {
        let mut p = protocol();
        let mut input = b"abc".to_vec();
        input.extend_from_slice(&[IAC, WILL, opt::ECHO]);
        input.extend_from_slice(b"def");
        let (data, replies) = p.process(&input);
        assert_eq!(data, b"abcdef");
        assert_eq!(replies, vec![IAC, DO, opt::ECHO]);
    }

    // ── find ──────────────────────────────────────────────────────────────

    #[test]
    fn find_locates_pattern() {
        assert_eq!(find(b"abcdef", b"cd"), Some(2));
        assert_eq!(find(b"abcdef", b"xy"), None);
        assert_eq!(find(b"ab", b"abc"), None);
    }

    // ── Loopback ──────────────────────────────────────────────────────────

    async fn loopback_pair() -> (Transport, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = HostConfig {
            address: "127.0.0.1".to_owned(),
            port: addr.port(),
            ..HostConfig::default()
        };
        let (transport, accepted) = tokio::join!(Transport::connect(&config), listener.accept());
        (transport.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn read_until_splits_at_pattern() {
        let (mut transport, mut host) = loopback_pair().await;
        host.write_all(b"login: leftover").await.unwrap();

        let got = transport
            .read_until(b"login: ", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(got, b"login: ");

        // The remainder is buffered for the next read.
        let rest = transport
            .read_eager(
                Duration::from_millis(200),
                Duration::from_millis(50),
                false,
            )
            .await
            .unwrap();
        assert_eq!(rest, b"leftover");
    }

    #[tokio::test]
    async fn read_until_pattern_across_segments() {
        let (mut transport, mut host) = loopback_pair().await;
        let writer = tokio::spawn(async move {
            host.write_all(b"log").await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            host.write_all(b"in: ").await.unwrap();
            host
        });
        let got = transport
            .read_until(b"login: ", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(got, b"login: ");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn read_eager_returns_empty_without_waiting() {
        let (mut transport, _host) = loopback_pair().await;
        let got = transport
            .read_eager(Duration::from_millis(400), Duration::from_millis(20), false)
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn read_eager_waits_for_first_bytes() {
        let (mut transport, mut host) = loopback_pair().await;
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            host.write_all(b"\x1b[1;1Hhello").await.unwrap();
            host
        });
        let got = transport
            .read_eager(Duration::from_millis(800), Duration::from_millis(25), true)
            .await
            .unwrap();
        assert_eq!(got, b"\x1b[1;1Hhello");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn negotiation_answered_over_loopback() {
        let (mut transport, mut host) = loopback_pair().await;
        host.write_all(&[IAC, DO, opt::TTYPE]).await.unwrap();
        host.write_all(b"banner").await.unwrap();

        let got = transport
            .read_until(b"banner", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(got, b"banner");

        let mut reply = [0u8; 3];
        host.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [IAC, WILL, opt::TTYPE]);
    }

    #[tokio::test]
    async fn wait_for_enq_sends_answerback() {
        let (mut transport, mut host) = loopback_pair().await;
        host.write_all(&[ENQ]).await.unwrap();

        let seen = transport
            .wait_for_enq(Duration::from_millis(500))
            .await
            .unwrap();
        assert!(seen);

        let mut reply = [0u8; 6];
        host.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"VT100\r");
    }

    #[tokio::test]
    async fn closed_peer_surfaces_eof() {
        let (mut transport, host) = loopback_pair().await;
        drop(host);
        let err = transport
            .read_eager(Duration::from_millis(200), Duration::from_millis(20), true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
