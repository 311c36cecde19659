// Client-side request plumbing
// One TCP connection per request, newline-delimited JSON both ways. The
// session token is remembered after a successful login and attached to every
// later request.

use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Reply {
    pub status: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_code: Option<i32>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    pub fn error_text(&self) -> String {
        match (&self.error_message, self.error_code) {
            (Some(message), Some(code)) => format!("{} (code {})", message, code),
            (Some(message), None) => message.clone(),
            _ => "unknown error".to_string(),
        }
    }
}

pub struct Connection {
    host: String,
    port: u16,
    pub session_id: Option<String>,
    pub username: Option<String>,
}

impl Connection {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            session_id: None,
            username: None,
        }
    }

    pub fn send(&self, operation: &str, parameters: Value) -> Result<Reply, String> {
        let request = json!({
            "operation": operation,
            "session_id": self.session_id.clone().unwrap_or_default(),
            "parameters": parameters,
        });
        debug!("-> {}", operation);

        let address = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&address)
            .map_err(|e| format!("cannot connect to {}: {}", address, e))?;
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .map_err(|e| e.to_string())?;

        let mut writer = &stream;
        let mut line = serde_json::to_string(&request).map_err(|e| e.to_string())?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| format!("send failed: {}", e))?;

        let mut reader = BufReader::new(&stream);
        let mut response = String::new();
        reader
            .read_line(&mut response)
            .map_err(|e| format!("no response: {}", e))?;

        serde_json::from_str(&response).map_err(|e| format!("malformed response: {}", e))
    }
}
