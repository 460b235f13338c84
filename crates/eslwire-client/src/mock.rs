//! Loopback stand-in for the switch side of the event socket.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub(crate) async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

pub(crate) struct MockSwitch {
    stream: BufReader<TcpStream>,
}

impl MockSwitch {
    /// Accept one client and run the auth exchange, accepting only `password`.
    pub(crate) async fn accept(listener: &TcpListener, password: &str) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        let mut switch = Self {
            stream: BufReader::new(stream),
        };

        switch.send("Content-Type: auth/request\n\n").await;
        let auth = switch.read_request().await;
        if auth == format!("auth {password}") {
            switch.reply("+OK accepted").await;
        } else {
            switch.reply("-ERR invalid").await;
        }
        switch
    }

    /// Read one request block, without its terminating blank line.
    pub(crate) async fn read_request(&mut self) -> String {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.stream.read_line(&mut line).await.unwrap();
            if n == 0 || line == "\n" {
                break;
            }
            lines.push(line.trim_end_matches('\n').to_string());
        }
        lines.join("\n")
    }

    pub(crate) async fn read_exact(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    pub(crate) async fn send(&mut self, raw: &str) {
        self.stream.get_mut().write_all(raw.as_bytes()).await.unwrap();
    }

    pub(crate) async fn reply(&mut self, text: &str) {
        self.send(&format!(
            "Content-Type: command/reply\nReply-Text: {text}\n\n"
        ))
        .await;
    }

    pub(crate) async fn api_response(&mut self, body: &str) {
        self.send(&format!(
            "Content-Type: api/response\nContent-Length: {}\n\n{body}",
            body.len()
        ))
        .await;
    }

    /// Push a plain notification; `extra` is appended to the nested block.
    pub(crate) async fn notification(&mut self, name: &str, extra: &str) {
        let body = format!(
            "Event-Name: {name}\nCore-UUID: 2f3b\nEvent-Date-Timestamp: 1700000000000000\n{extra}\n"
        );
        self.send(&format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{body}",
            body.len()
        ))
        .await;
    }
}
