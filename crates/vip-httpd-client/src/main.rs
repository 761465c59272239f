//! A very, very primitive HTTP client, ported from `examples/original_source/client.c`.
//!
//! Usage: `vip-httpd-client <host> <port> <path> [method]` (method defaults to `GET`).

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process::ExitCode;

use clap::Parser;

/// Single-shot HTTP/1.0 test client.
#[derive(Parser, Debug)]
#[command(name = "vip-httpd-client", about = "client <host> <port> <path> [method]")]
struct Args {
    host: String,
    port: u16,
    path: String,
    /// HTTP method, e.g. GET or REAL
    #[arg(default_value = "GET")]
    method: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let stream = match TcpStream::connect((args.host.as_str(), args.port)) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("Error: could not connect to {}:{}: {err}", args.host, args.port);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = client_send(&stream, &args.path, &args.method) {
        eprintln!("Error: failed to send request: {err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = client_print(&stream) {
        eprintln!("Error: failed to read response: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Forms and sends the HTTP request line plus a `Host` header, exactly as
/// `clientSend` does in the original — `HTTP/1.1` in the request line even
/// though the server only speaks HTTP/1.0, which the original harness relies
/// on for its header-echo test.
fn client_send(mut stream: &TcpStream, path: &str, method: &str) -> std::io::Result<()> {
    let hostname = hostname();
    let request = format!("{method} {path} HTTP/1.1\r\nhost: {hostname}\r\n\r\n");
    stream.write_all(request.as_bytes())
}

/// Reads and prints response headers (one `Header: ` line each, plus a
/// `Length = N` line when `Content-Length` is seen), then the body.
fn client_print(stream: &TcpStream) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        print!("Header: {line}");
        if let Some(rest) = line.strip_prefix("Content-Length:") {
            if let Ok(length) = rest.trim().parse::<usize>() {
                println!("Length = {length}");
            }
        }
    }

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        print!("{line}");
    }

    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
