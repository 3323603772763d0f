use super::*;
use crate::host::{BasicConnManager, ConnManager};

use futures::future::{BoxFuture, FutureExt};
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

struct CountingConnManager {
    inner: BasicConnManager,
    protects: AtomicUsize,
    unprotects: AtomicUsize,
    tags: Mutex<Vec<String>>,
    /// What each unprotect reported, in call order.
    still_protected: Mutex<Vec<bool>>,
}

impl CountingConnManager {
    fn new() -> Self {
        CountingConnManager {
            inner: BasicConnManager::new(1, 2, Duration::from_secs(0)).unwrap(),
            protects: AtomicUsize::new(0),
            unprotects: AtomicUsize::new(0),
            tags: Mutex::new(vec![]),
            still_protected: Mutex::new(vec![]),
        }
    }
}

impl ConnManager for CountingConnManager {
    fn protect(&self, peer: &PeerId, tag: &str) {
        self.protects.fetch_add(1, Ordering::SeqCst);
        self.tags.lock().unwrap().push(tag.to_owned());
        self.inner.protect(peer, tag)
    }

    fn unprotect(&self, peer: &PeerId, tag: &str) -> bool {
        self.unprotects.fetch_add(1, Ordering::SeqCst);
        let still = self.inner.unprotect(peer, tag);
        self.still_protected.lock().unwrap().push(still);
        still
    }

    fn is_protected(&self, peer: &PeerId, tag: Option<&str>) -> bool {
        self.inner.is_protected(peer, tag)
    }
}

/// How the fake remote end behaves once a stream is open.
#[derive(Clone, Copy)]
enum Remote {
    /// Reads one `String` and sends it back.
    Echo,
    /// Replies with a canned `String` without reading.
    Greet,
    /// Keeps the stream open and never answers.
    Silent,
    /// Closes the stream straight away.
    HangUp,
}

#[derive(Default)]
struct StreamLog {
    deadlines: Mutex<Vec<Option<Instant>>>,
    shutdowns: AtomicUsize,
    /// Closing never completes.
    stall_shutdown: AtomicBool,
}

struct FakeStream {
    inner: DuplexStream,
    log: Arc<StreamLog>,
}

impl RpcStream for FakeStream {
    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.log.deadlines.lock().unwrap().push(deadline);
    }
}

impl AsyncRead for FakeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FakeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.log.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.log.stall_shutdown.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

struct FakeHost {
    id: PeerId,
    conn_manager: CountingConnManager,
    fail_connect: bool,
    reject_streams: bool,
    remote: Remote,
    streams_opened: AtomicUsize,
    protected_while_opening: Mutex<Option<bool>>,
    log: Arc<StreamLog>,
}

impl FakeHost {
    fn new(remote: Remote) -> Self {
        FakeHost {
            id: PeerId::generate(),
            conn_manager: CountingConnManager::new(),
            fail_connect: false,
            reject_streams: false,
            remote,
            streams_opened: AtomicUsize::new(0),
            protected_while_opening: Mutex::new(None),
            log: Arc::new(StreamLog::default()),
        }
    }

    fn protects(&self) -> usize {
        self.conn_manager.protects.load(Ordering::SeqCst)
    }

    fn unprotects(&self) -> usize {
        self.conn_manager.unprotects.load(Ordering::SeqCst)
    }

    fn deadlines(&self) -> Vec<Option<Instant>> {
        self.log.deadlines.lock().unwrap().clone()
    }
}

impl Host for FakeHost {
    type Stream = FakeStream;

    fn id(&self) -> PeerId {
        self.id
    }

    fn conn_manager(&self) -> &dyn ConnManager {
        &self.conn_manager
    }

    fn connect<'a>(&'a self, _peer: &'a AddrInfo) -> BoxFuture<'a, io::Result<()>> {
        let fail = self.fail_connect;
        async move {
            if fail {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn new_stream<'a>(
        &'a self,
        peer: &'a PeerId,
        protocol: &'a ProtocolId,
    ) -> BoxFuture<'a, io::Result<FakeStream>> {
        async move {
            self.streams_opened.fetch_add(1, Ordering::SeqCst);
            *self.protected_while_opening.lock().unwrap() =
                Some(self.conn_manager.is_protected(peer, None));
            if self.reject_streams {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("protocol {} not supported by peer", protocol),
                ));
            }

            let (local, mut remote) = duplex(4096);
            match self.remote {
                Remote::Echo => {
                    tokio::spawn(async move {
                        let request: String = wire::read_rpc(&mut remote).await?;
                        wire::write_rpc(&mut remote, &request).await
                    });
                }
                Remote::Greet => {
                    tokio::spawn(async move {
                        wire::write_rpc(&mut remote, &String::from("greetings")).await
                    });
                }
                Remote::Silent => {
                    tokio::spawn(async move {
                        let _open = remote;
                        futures::future::pending::<()>().await
                    });
                }
                Remote::HangUp => drop(remote),
            }
            Ok(FakeStream { inner: local, log: self.log.clone() })
        }
        .boxed()
    }
}

fn target() -> AddrInfo {
    AddrInfo::new(PeerId::generate(), vec!["/ip4/127.0.0.1/tcp/4001".parse().unwrap()])
}

fn protocol() -> ProtocolId {
    ProtocolId::from("/fake/1.0.0")
}

#[tokio::test]
async fn successful_call_reports_every_phase() {
    let host = FakeHost::new(Remote::Echo);
    let ctx = CallContext::background();
    let request = String::from("ping");

    let start = Instant::now();
    let (took, res) =
        exec_rpc::<_, String, String>(&ctx, &host, &target(), &protocol(), Some(&request)).await;

    assert_eq!(res.unwrap(), "ping");
    assert_eq!(took.local_peer_id, host.id());
    assert!(took.peer_connect_msecs.is_some());
    assert!(took.stream_open_msecs.is_some());
    assert!(took.stream_write_msecs.is_some());
    assert!(took.stream_read_msecs.is_some());

    // the default deadline was set, then cleared again
    let deadlines = host.deadlines();
    assert_eq!(deadlines.len(), 2);
    let deadline = deadlines[0].unwrap();
    assert!(deadline >= start + DEFAULT_RPC_TIMEOUT);
    assert!(deadline <= Instant::now() + DEFAULT_RPC_TIMEOUT);
    assert_eq!(deadlines[1], None);
    assert_eq!(host.log.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn peer_stays_protected_until_the_call_returns() {
    let host = FakeHost::new(Remote::Echo);
    let peer = target();
    let (_, res) = exec_rpc::<_, str, String>(
        &CallContext::background(),
        &host,
        &peer,
        &protocol(),
        Some("x"),
    )
    .await;

    assert!(res.is_ok());
    assert_eq!(*host.protected_while_opening.lock().unwrap(), Some(true));
    assert_eq!(host.protects(), 1);
    assert_eq!(host.unprotects(), 1);
    assert!(!host.conn_manager.is_protected(&peer.peer_id, None));
}

#[tokio::test]
async fn context_deadline_is_inherited() {
    let host = FakeHost::new(Remote::Echo);
    let ctx = CallContext::with_timeout(Duration::from_secs(30));
    let request = String::from("ping");
    let (_, res) =
        exec_rpc::<_, String, String>(&ctx, &host, &target(), &protocol(), Some(&request)).await;

    assert!(res.is_ok());
    assert_eq!(host.deadlines(), vec![ctx.deadline(), None]);
}

#[tokio::test]
async fn connect_failure_ends_the_call() {
    let mut host = FakeHost::new(Remote::Echo);
    host.fail_connect = true;
    let peer = target();

    let (took, res) = exec_rpc::<_, String, String>(
        &CallContext::background(),
        &host,
        &peer,
        &protocol(),
        Some(&String::from("ping")),
    )
    .await;

    match res {
        Err(Error::ConnectFailed { peer: failed, source }) => {
            assert_eq!(failed, peer.peer_id);
            assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused);
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(took.peer_connect_msecs.is_some());
    assert_eq!(took.stream_open_msecs, None);
    assert_eq!(took.stream_write_msecs, None);
    assert_eq!(took.stream_read_msecs, None);

    assert_eq!(host.streams_opened.load(Ordering::SeqCst), 0);
    assert_eq!(host.protects(), 1);
    assert_eq!(host.unprotects(), 1);
    assert!(!host.conn_manager.is_protected(&peer.peer_id, None));
}

#[tokio::test]
async fn refused_protocol_ends_the_call() {
    let mut host = FakeHost::new(Remote::Echo);
    host.reject_streams = true;

    let (took, res) = exec_rpc::<_, String, String>(
        &CallContext::background(),
        &host,
        &target(),
        &protocol(),
        Some(&String::from("ping")),
    )
    .await;

    let err = res.unwrap_err();
    assert!(matches!(err, Error::StreamOpenFailed { .. }));
    assert_eq!(err.io_cause().unwrap().kind(), io::ErrorKind::Unsupported);
    assert!(took.stream_open_msecs.is_some());
    assert_eq!(took.stream_write_msecs, None);
    assert_eq!(took.stream_read_msecs, None);
    assert_eq!(host.unprotects(), 1);
    // no stream, so no deadline was ever set
    assert!(host.deadlines().is_empty());
}

#[tokio::test]
async fn missing_request_skips_the_write() {
    let host = FakeHost::new(Remote::Greet);
    let (took, res) = exec_rpc::<_, (), String>(
        &CallContext::background(),
        &host,
        &target(),
        &protocol(),
        None,
    )
    .await;

    assert_eq!(res.unwrap(), "greetings");
    assert_eq!(took.stream_write_msecs, None);
    assert!(took.stream_read_msecs.is_some());
}

#[tokio::test]
async fn hang_up_is_a_read_failure() {
    let host = FakeHost::new(Remote::HangUp);
    let (took, res) = exec_rpc::<_, (), String>(
        &CallContext::background(),
        &host,
        &target(),
        &protocol(),
        None,
    )
    .await;

    let err = res.unwrap_err();
    assert!(matches!(err, Error::StreamReadFailed { .. }));
    assert_eq!(err.io_cause().unwrap().kind(), io::ErrorKind::UnexpectedEof);
    assert!(took.stream_read_msecs.is_some());
    // the deadline is cleared and the stream closed on failure too
    assert_eq!(host.deadlines().last(), Some(&None));
    assert_eq!(host.log.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(host.unprotects(), 1);
}

#[tokio::test]
async fn expired_context_fails_a_later_phase() {
    let host = FakeHost::new(Remote::Silent);
    let ctx = CallContext::with_timeout(Duration::from_millis(0));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let (took, res) = exec_rpc::<_, String, String>(
        &ctx,
        &host,
        &target(),
        &protocol(),
        Some(&String::from("ping")),
    )
    .await;

    let err = res.unwrap_err();
    assert!(matches!(
        err,
        Error::StreamOpenFailed { .. }
            | Error::StreamWriteFailed { .. }
            | Error::StreamReadFailed { .. }
    ));
    assert_eq!(err.io_cause().unwrap().kind(), io::ErrorKind::TimedOut);
    // connecting is immediate, so it still completed
    assert!(took.peer_connect_msecs.is_some());
    assert_eq!(host.unprotects(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_a_blocked_read() {
    let host = FakeHost::new(Remote::Silent);
    let ctx = CallContext::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let (took, res) = exec_rpc::<_, (), String>(&ctx, &host, &target(), &protocol(), None).await;

    let err = res.unwrap_err();
    assert!(matches!(err, Error::StreamReadFailed { .. }));
    assert_eq!(err.io_cause().unwrap().kind(), io::ErrorKind::Interrupted);
    assert!(took.stream_read_msecs.is_some());
    assert_eq!(host.unprotects(), 1);
}

#[tokio::test]
async fn concurrent_calls_to_one_peer() {
    let host = FakeHost::new(Remote::Echo);
    let peer = target();
    let ctx = CallContext::background();
    let protocol = protocol();
    let requests: Vec<String> = (0..5).map(|i| format!("call-{}", i)).collect();

    let calls = requests
        .iter()
        .map(|request| exec_rpc::<_, String, String>(&ctx, &host, &peer, &protocol, Some(request)));
    let results = futures::future::join_all(calls).await;

    for ((_, res), request) in results.into_iter().zip(requests.iter()) {
        assert_eq!(&res.unwrap(), request);
    }

    let mut tags = host.conn_manager.tags.lock().unwrap().clone();
    tags.sort();
    tags.dedup();
    assert_eq!(tags.len(), 5);
    assert_eq!(host.protects(), 5);
    assert_eq!(host.unprotects(), 5);

    // only the last release leaves the peer unprotected
    let still_protected = host.conn_manager.still_protected.lock().unwrap().clone();
    assert_eq!(still_protected, vec![true, true, true, true, false]);
    assert!(!host.conn_manager.is_protected(&peer.peer_id, None));
}

#[tokio::test]
async fn stalled_close_is_bounded_by_the_context() {
    let host = FakeHost::new(Remote::Greet);
    host.log.stall_shutdown.store(true, Ordering::SeqCst);
    let ctx = CallContext::with_timeout(Duration::from_millis(100));

    let start = Instant::now();
    let (_, res) = exec_rpc::<_, (), String>(&ctx, &host, &target(), &protocol(), None).await;

    assert_eq!(res.unwrap(), "greetings");
    assert!(host.log.shutdowns.load(Ordering::SeqCst) >= 1);
    assert!(start.elapsed() < STREAM_CLOSE_TIMEOUT);
    assert_eq!(host.unprotects(), 1);
}

#[test]
fn timings_serialize_with_wire_names() {
    let mut took = RpcTook::new(PeerId([0u8; 32]));
    took.peer_connect_msecs = Some(12);
    let value = serde_json::to_value(&took).unwrap();
    assert_eq!(value["peer_connect_took_msecs"], 12);
    assert!(value.get("dialing_peerid").is_some());
    assert!(value.get("stream_open_took_msecs").is_none());
}

mod end_to_end {
    use super::*;
    use crate::protocol::{EchoRequest, EchoResponse, IdentifyResponse, ECHO_PROTOCOL, IDENTIFY_PROTOCOL};
    use crate::addr_info::tcp_multiaddr;
    use crate::{assemble_addr_info, new_tcp_host, HostConfig, Router, Server, TcpHost};

    use tokio::net::TcpListener;

    use std::net::SocketAddr;

    async fn start_server() -> AddrInfo {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Server::bind(addr, &HostConfig::default(), Router::new().with_echo())
            .await
            .unwrap();
        let info = server.addr_info().unwrap();
        server.spawn();
        info
    }

    fn client() -> (TcpHost, Arc<crate::PeerStore>) {
        new_tcp_host(HostConfig::with_timeout(Duration::from_secs(5))).unwrap()
    }

    fn echo_request() -> EchoRequest {
        EchoRequest { message: String::from("hello") }
    }

    #[tokio::test]
    async fn echo_over_tcp() {
        let server = start_server().await;
        let info = assemble_addr_info(
            Some(server.peer_id.to_string().as_str()),
            vec![server.addrs[0].to_string()],
        )
        .unwrap();
        let (host, peerstore) = client();

        let (took, res) = exec_rpc::<_, EchoRequest, EchoResponse>(
            &CallContext::with_timeout(Duration::from_secs(10)),
            &host,
            &info,
            &ProtocolId::from(ECHO_PROTOCOL),
            Some(&echo_request()),
        )
        .await;

        let response = res.unwrap();
        assert_eq!(response.message, "hello");
        assert_eq!(response.caller, host.id());
        assert!(took.peer_connect_msecs.is_some());
        assert!(took.stream_open_msecs.is_some());
        assert!(took.stream_write_msecs.is_some());
        assert!(took.stream_read_msecs.is_some());

        assert!(host.is_connected(&info.peer_id));
        assert!(!host.conn_manager().is_protected(&info.peer_id, None));
        let record = peerstore.get(&info.peer_id).unwrap();
        assert_eq!(record.addrs, info.addrs);
        assert!(record.last_remote_addr.is_some());
        assert_eq!(record.protocols, vec![ProtocolId::from(ECHO_PROTOCOL)]);
    }

    #[tokio::test]
    async fn identify_without_request() {
        let server = start_server().await;
        let (host, _) = client();

        let (took, res) = exec_rpc::<_, (), IdentifyResponse>(
            &CallContext::background(),
            &host,
            &server,
            &ProtocolId::from(IDENTIFY_PROTOCOL),
            None,
        )
        .await;

        let identify = res.unwrap();
        assert_eq!(identify.peer_id, server.peer_id);
        assert_eq!(identify.agent_version, "peer-rpc");
        assert_eq!(
            identify.protocols,
            vec![ECHO_PROTOCOL.to_owned(), IDENTIFY_PROTOCOL.to_owned()]
        );
        assert!(identify.observed_addr.to_string().starts_with("/ip4/127.0.0.1/tcp/"));
        assert_eq!(took.stream_write_msecs, None);
    }

    #[tokio::test]
    async fn calls_share_one_connection() {
        let server = start_server().await;
        let (host, _) = client();
        let ctx = CallContext::background();

        for _ in 0..3 {
            let (_, res) = exec_rpc::<_, EchoRequest, EchoResponse>(
                &ctx,
                &host,
                &server,
                &ProtocolId::from(ECHO_PROTOCOL),
                Some(&echo_request()),
            )
            .await;
            assert!(res.is_ok());
        }
        assert_eq!(host.connected_peers().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_protocol_fails_stream_open() {
        let server = start_server().await;
        let (host, _) = client();

        let (took, res) = exec_rpc::<_, EchoRequest, EchoResponse>(
            &CallContext::background(),
            &host,
            &server,
            &ProtocolId::from("/not-served/1.0.0"),
            Some(&echo_request()),
        )
        .await;

        let err = res.unwrap_err();
        assert!(matches!(err, Error::StreamOpenFailed { .. }));
        assert_eq!(err.io_cause().unwrap().kind(), io::ErrorKind::Unsupported);
        assert!(took.stream_open_msecs.is_some());
        assert_eq!(took.stream_write_msecs, None);
    }

    #[tokio::test]
    async fn wrong_peer_id_is_refused() {
        let server = start_server().await;
        let impostor = AddrInfo::new(PeerId::generate(), server.addrs.clone());
        let (host, _) = client();

        let (took, res) = exec_rpc::<_, EchoRequest, EchoResponse>(
            &CallContext::background(),
            &host,
            &impostor,
            &ProtocolId::from(ECHO_PROTOCOL),
            Some(&echo_request()),
        )
        .await;

        let err = res.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
        assert_eq!(err.io_cause().unwrap().kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(took.stream_open_msecs, None);
        assert!(!host.is_connected(&impostor.peer_id));
    }

    #[tokio::test]
    async fn unreachable_peer_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let peer = PeerId::generate();
        let info = assemble_addr_info(
            Some(peer.to_string().as_str()),
            vec![format!("/ip4/127.0.0.1/tcp/{}", port)],
        )
        .unwrap();
        let (host, _) = client();

        let (took, res) = exec_rpc::<_, EchoRequest, EchoResponse>(
            &CallContext::background(),
            &host,
            &info,
            &ProtocolId::from(ECHO_PROTOCOL),
            Some(&echo_request()),
        )
        .await;

        assert!(matches!(res, Err(Error::ConnectFailed { .. })));
        assert!(took.peer_connect_msecs.is_some());
        assert_eq!(took.stream_open_msecs, None);
        assert_eq!(took.stream_write_msecs, None);
        assert_eq!(took.stream_read_msecs, None);
        assert!(!host.conn_manager().is_protected(&peer, None));
    }

    #[tokio::test]
    async fn silent_address_does_not_block_a_reachable_one() {
        let server = start_server().await;
        // accepts TCP through the backlog but never speaks TLS
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = tcp_multiaddr(&silent.local_addr().unwrap());

        let mut addrs = vec![silent_addr];
        addrs.extend(server.addrs.iter().cloned());
        let info = AddrInfo::new(server.peer_id, addrs);
        let (host, _) = new_tcp_host(HostConfig::with_timeout(Duration::from_secs(2))).unwrap();

        let (took, res) = exec_rpc::<_, EchoRequest, EchoResponse>(
            &CallContext::background(),
            &host,
            &info,
            &ProtocolId::from(ECHO_PROTOCOL),
            Some(&echo_request()),
        )
        .await;

        assert_eq!(res.unwrap().message, "hello");
        assert!(took.peer_connect_msecs.unwrap() < 2000);
        let connected = host.connected_peers();
        assert_eq!(connected.len(), 1);
        assert_ne!(connected[0].1, silent.local_addr().unwrap());
    }

    #[tokio::test]
    async fn known_addresses_are_dialed_when_none_are_given() {
        let server = start_server().await;
        let (host, peerstore) = client();
        let ctx = CallContext::background();
        let protocol = ProtocolId::from(ECHO_PROTOCOL);

        let (_, first) = exec_rpc::<_, EchoRequest, EchoResponse>(
            &ctx,
            &host,
            &server,
            &protocol,
            Some(&echo_request()),
        )
        .await;
        assert!(first.is_ok());
        assert!(host.disconnect(&server.peer_id));
        assert!(!host.is_connected(&server.peer_id));

        let bare = AddrInfo::new(server.peer_id, vec![]);
        let request = echo_request();
        let (_, second) =
            exec_rpc::<_, EchoRequest, EchoResponse>(&ctx, &host, &bare, &protocol, Some(&request))
                .await;
        assert_eq!(second.unwrap().message, "hello");
        assert_eq!(peerstore.addrs(&server.peer_id), server.addrs);
    }

    #[tokio::test]
    async fn peer_without_any_address_fails_connect() {
        let (host, _) = client();
        let unknown = AddrInfo::new(PeerId::generate(), vec![]);
        let (_, res) = exec_rpc::<_, EchoRequest, EchoResponse>(
            &CallContext::background(),
            &host,
            &unknown,
            &ProtocolId::from(ECHO_PROTOCOL),
            Some(&echo_request()),
        )
        .await;

        let err = res.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
        assert_eq!(err.io_cause().unwrap().kind(), io::ErrorKind::AddrNotAvailable);
    }

    #[tokio::test]
    async fn stream_deadline_interrupts_a_read() {
        let server = start_server().await;
        let (host, _) = client();
        host.connect(&server).await.unwrap();

        let protocol = ProtocolId::from(ECHO_PROTOCOL);
        let mut stream = host.new_stream(&server.peer_id, &protocol).await.unwrap();
        assert_eq!(stream.protocol(), &protocol);
        stream.set_deadline(Some(Instant::now() + Duration::from_millis(50)));

        // the server waits for a request that never comes
        let err = wire::read_rpc::<_, EchoResponse>(&mut stream).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
