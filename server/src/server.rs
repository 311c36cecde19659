// TCP transport
// Thread-per-connection over newline-delimited JSON. Every request takes the
// engine lock for its full duration, so clients observe operations in a
// single total order.

use crate::dispatch::handle_request;
use crate::protocol::{Request, Response};
use log::{debug, error, info, warn};
use omnifs_core::{OmniError, ServerSection};
use omnifs_engine::OmniFs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub struct Server {
    engine: Arc<Mutex<OmniFs>>,
    settings: ServerSection,
}

impl Server {
    pub fn new(engine: OmniFs, settings: ServerSection) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            settings,
        }
    }

    /// Bind the configured port and serve until the listener fails.
    pub fn run(&self) -> Result<(), OmniError> {
        let address = format!("0.0.0.0:{}", self.settings.port);
        let listener = TcpListener::bind(&address)?;
        self.serve_on(listener)
    }

    /// Accept loop over an already bound listener.
    pub fn serve_on(&self, listener: TcpListener) -> Result<(), OmniError> {
        info!(
            "listening on {} (max {} connections)",
            listener.local_addr()?,
            self.settings.max_connections
        );

        let active = Arc::new(AtomicU32::new(0));
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };

            if active.load(Ordering::SeqCst) >= self.settings.max_connections {
                warn!("connection limit reached, refusing client");
                let _ = refuse(&stream);
                continue;
            }

            active.fetch_add(1, Ordering::SeqCst);
            let engine = Arc::clone(&self.engine);
            let active = Arc::clone(&active);
            let timeout = self.settings.queue_timeout;
            thread::spawn(move || {
                if let Err(e) = serve_client(&stream, &engine, timeout) {
                    debug!("client dropped: {}", e);
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }
        Ok(())
    }
}

fn refuse(mut stream: &TcpStream) -> std::io::Result<()> {
    let response = Response::error(&OmniError::NoSpace(
        "server connection limit reached".to_string(),
    ));
    let mut line = serde_json::to_string(&response).unwrap_or_default();
    line.push('\n');
    stream.write_all(line.as_bytes())
}

fn serve_client(
    stream: &TcpStream,
    engine: &Mutex<OmniFs>,
    timeout_secs: u32,
) -> std::io::Result<()> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("client connected: {}", peer);

    if timeout_secs > 0 {
        stream.set_read_timeout(Some(Duration::from_secs(timeout_secs as u64)))?;
    }

    let mut reader = BufReader::new(stream);
    let mut writer = stream;
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break; // client closed the connection
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                // Engine lock held for the whole operation; poisoning means a
                // handler panicked and the process is no longer trustworthy.
                let mut fs = engine.lock().unwrap_or_else(|e| e.into_inner());
                handle_request(&mut fs, &request)
            }
            Err(e) => {
                debug!("malformed request from {}: {}", peer, e);
                Response::error(&OmniError::InvalidArgument(format!(
                    "malformed request: {}",
                    e
                )))
            }
        };

        let mut payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!("response serialization failed: {}", e);
                break;
            }
        };
        payload.push('\n');
        writer.write_all(payload.as_bytes())?;
        writer.flush()?;
    }

    info!("client disconnected: {}", peer);
    Ok(())
}
