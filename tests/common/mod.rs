//! Mock receivers shared by the integration tests.

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use nad_amp::{BoxedTransport, Connector};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds, failing after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Device side of an in-memory connection.
pub struct Device {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Device {
    fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    /// Next line sent by the client, `None` once the client hung up.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.next_line().await.ok().flatten()
    }

    pub async fn send(&mut self, text: &str) {
        self.writer
            .write_all(text.as_bytes())
            .await
            .expect("device write should succeed");
    }
}

#[derive(Default)]
struct Script {
    /// Outcomes for the next attempts, `true` meaning refuse
    plan: VecDeque<bool>,
    /// Refuse every attempt once the plan is used up
    refuse_all: bool,
    /// Leave attempts pending forever
    stall: bool,
}

/// Connector handing out in-memory streams.
#[derive(Clone)]
pub struct MockConnector {
    attempts: Arc<AtomicUsize>,
    script: Arc<Mutex<Script>>,
    devices: mpsc::UnboundedSender<DuplexStream>,
}

/// Test-side view of a `MockConnector`.
pub struct MockHandle {
    attempts: Arc<AtomicUsize>,
    script: Arc<Mutex<Script>>,
    devices: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MockConnector {
    pub fn new() -> (Self, MockHandle) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(Mutex::new(Script::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        let connector = Self {
            attempts: attempts.clone(),
            script: script.clone(),
            devices: tx,
        };
        let handle = MockHandle {
            attempts,
            script,
            devices: rx,
        };
        (connector, handle)
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, _host: &'a str, _port: u16) -> BoxFuture<'a, io::Result<BoxedTransport>> {
        async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            let (stall, refuse) = {
                let mut script = self.script.lock().unwrap();
                let refuse_all = script.refuse_all;
                (script.stall, script.plan.pop_front().unwrap_or(refuse_all))
            };
            if stall {
                std::future::pending::<()>().await;
            }
            if refuse {
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            }

            let (client, device) = tokio::io::duplex(4096);
            let _ = self.devices.send(device);
            Ok(Box::new(client) as BoxedTransport)
        }
        .boxed()
    }
}

impl MockHandle {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Refuse the next `count` attempts.
    pub fn refuse_next(&self, count: usize) {
        let mut script = self.script.lock().unwrap();
        script.plan.extend(std::iter::repeat(true).take(count));
    }

    pub fn refuse_all(&self, refuse: bool) {
        self.script.lock().unwrap().refuse_all = refuse;
    }

    /// Make every following attempt hang instead of resolving.
    pub fn stall(&self, stall: bool) {
        self.script.lock().unwrap().stall = stall;
    }

    /// Device side of the next accepted connection.
    pub async fn next_device(&mut self) -> Device {
        let stream = self
            .devices
            .recv()
            .await
            .expect("connector should still be alive");
        Device::new(stream)
    }
}

/// A receiver on loopback TCP that answers the model queries.
pub struct MockReceiver {
    pub port: u16,
    /// Lines received from the client
    pub received: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<String>,
}

impl MockReceiver {
    pub async fn spawn(model: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let port = listener.local_addr().expect("should have address").port();
        let model = model.to_string();

        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("should accept");
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();

            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else { break };
                        if line == "?" || line == "Main.Model?" {
                            let reply = format!("Main.Model={}\n", model);
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        let _ = received_tx.send(line);
                    }
                    text = push_rx.recv() => {
                        let Some(text) = text else { break };
                        if write.write_all(text.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            port,
            received,
            push,
        }
    }

    /// Send raw text to the client.
    pub fn push(&self, text: &str) {
        self.push
            .send(text.to_string())
            .expect("mock receiver should be running");
    }

    /// Next line from the client that is not a model query.
    pub async fn next_command(&mut self) -> Option<String> {
        while let Some(line) = self.received.recv().await {
            if line != "?" && line != "Main.Model?" {
                return Some(line);
            }
        }
        None
    }
}
