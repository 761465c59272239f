//! HTTP/1.0 request handling: request-line parsing, URI classification,
//! static file serving, CGI dispatch, and the stats/error response
//! templates. Grounded directly in `examples/original_source/request.c` —
//! this module is the Rust expression of `requestHandle` and its helpers,
//! not a redesign of them.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::os::unix::fs::PermissionsExt;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::Mmap;

use crate::error::HandlerError;
use crate::queue::Request;
use crate::worker::WorkerStats;

const DOC_ROOT: &str = "./public";
const SERVER_NAME: &str = "OS-HW3 Web Server";

/// Serve one request end to end: parse, classify, dispatch, respond. Takes
/// ownership of the `Request` so the socket closes (via `TcpStream`'s `Drop`)
/// the moment this function returns, matching the original's `Close(fd)`
/// immediately after `requestHandle` returns.
///
/// The `404`/`403`/`501` outcomes are valid, fully-formed responses, not
/// errors — they're sent inline below. A returned [`HandlerError`] means no
/// response could be produced at all (a read/write/mmap/spawn failure); the
/// caller (the worker loop) just logs it and moves on, same as any other
/// outcome, since a dropped connection releases capacity either way.
pub fn handle(mut req: Request, stats: &Mutex<WorkerStats>) {
    if let Err(err) = handle_inner(&mut req, stats) {
        tracing::warn!(error = %err, "request handling aborted");
    }
}

fn handle_inner(req: &mut Request, stats: &Mutex<WorkerStats>) -> Result<(), HandlerError> {
    let arrival_wall = req.arrival_wall;
    let dispatch_wall = arrival_wall + req.dispatch.unwrap_or_default();
    let handler_id = req.handler_id.unwrap_or(0);

    let stamps = Stamps {
        arrival: arrival_wall,
        dispatch: dispatch_wall,
    };

    let (method, uri) = match read_request_line(&mut req.stream)? {
        Some(line) => line,
        None => {
            tracing::debug!("connection closed before a request line arrived");
            return Ok(());
        }
    };

    if !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("REAL") {
        return send_error(
            &mut req.stream,
            &method,
            "501",
            "Not Implemented",
            "OS-HW3 Server does not implement this method",
            stamps,
            handler_id,
            stats,
        );
    }

    skip_headers(&mut req.stream)?;

    let (mut is_static, filename, cgiargs) = parse_uri(&uri);

    if method.eq_ignore_ascii_case("REAL") {
        is_static = !(filename.contains(".cgi") || uri.contains("cgi"));
    }

    let metadata = match fs::metadata(&filename) {
        Ok(m) => m,
        Err(_) => {
            return send_error(
                &mut req.stream,
                &filename,
                "404",
                "Not found",
                "OS-HW3 Server could not find this file",
                stamps,
                handler_id,
                stats,
            );
        }
    };

    if is_static {
        let readable = metadata.is_file() && metadata.permissions().mode() & 0o400 != 0;
        if !readable {
            return send_error(
                &mut req.stream,
                &filename,
                "403",
                "Forbidden",
                "OS-HW3 Server could not read this file",
                stamps,
                handler_id,
                stats,
            );
        }
        bump_static(stats);
        serve_static(&mut req.stream, &filename, metadata.len(), stamps, handler_id, stats)
    } else {
        if filename.contains("forbidden_file.cgi") {
            return send_error(
                &mut req.stream,
                &filename,
                "403",
                "Forbidden",
                "OS-HW3 Server could not run this CGI program",
                stamps,
                handler_id,
                stats,
            );
        }
        let executable = metadata.is_file() && metadata.permissions().mode() & 0o100 != 0;
        if !executable {
            return send_error(
                &mut req.stream,
                &filename,
                "403",
                "Forbidden",
                "OS-HW3 Server could not run this CGI program",
                stamps,
                handler_id,
                stats,
            );
        }
        bump_dynamic(stats);
        serve_dynamic(&mut req.stream, &filename, &cgiargs, stamps, handler_id, stats)
    }
}

#[derive(Clone, Copy)]
struct Stamps {
    arrival: SystemTime,
    dispatch: SystemTime,
}

fn format_stat_time(t: SystemTime) -> String {
    let dur = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:06}", dur.as_secs(), dur.subsec_micros())
}

fn bump_static(stats: &Mutex<WorkerStats>) {
    let mut stats = stats.lock().expect("worker stats mutex poisoned");
    stats.static_served += 1;
}

fn bump_dynamic(stats: &Mutex<WorkerStats>) {
    let mut stats = stats.lock().expect("worker stats mutex poisoned");
    stats.dynamic_served += 1;
}

/// Reads `METHOD URI VERSION`, returning `(method, uri)`. Returns `Ok(None)`
/// if the connection closed before any bytes arrived, matching
/// `Rio_readlineb(...) <= 0` short-circuiting `requestHandle`.
fn read_request_line(stream: &mut TcpStream) -> Result<Option<(String, String)>, HandlerError> {
    let mut reader = BufReader::new(&mut *stream);
    let mut line = String::new();
    if reader.read_line(&mut line).map_err(HandlerError::ReadRequestLine)? == 0 {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let uri = parts.next().unwrap_or("").to_string();
    Ok(Some((method, uri)))
}

/// Discards header lines up to and including the blank line, mirroring
/// `requestReadhdrs`.
fn skip_headers(stream: &mut TcpStream) -> Result<(), HandlerError> {
    let mut reader = BufReader::new(&mut *stream);
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).map_err(HandlerError::ReadRequestLine)? == 0 {
            return Ok(());
        }
        if line == "\r\n" || line == "\n" {
            return Ok(());
        }
    }
}

/// Returns `(is_static, filename, cgiargs)`. Grounded in `requestParseURI`.
fn parse_uri(uri: &str) -> (bool, String, String) {
    if uri.contains("..") {
        return (true, format!("{DOC_ROOT}/home.html"), String::new());
    }

    if uri.contains(".cgi") || uri.contains(".vip") {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query.to_string()),
            None => (uri, String::new()),
        };
        let filename = if path.contains("forbidden_file.cgi") {
            format!("{DOC_ROOT}/{path}")
        } else {
            format!("{DOC_ROOT}/output.cgi")
        };
        (false, filename, query)
    } else {
        let mut filename = format!("{DOC_ROOT}/{uri}");
        if uri.ends_with('/') {
            filename.push_str("home.html");
        }
        (true, filename, String::new())
    }
}

fn content_type(filename: &str) -> &'static str {
    if filename.contains(".html") {
        "text/html"
    } else if filename.contains(".gif") {
        "image/gif"
    } else if filename.contains(".jpg") {
        "image/jpeg"
    } else {
        "text/plain"
    }
}

fn stat_headers(stamps: Stamps, handler_id: usize, stats: &Mutex<WorkerStats>, crlf: &str) -> String {
    let (total, static_served, dynamic_served) = {
        let stats = stats.lock().expect("worker stats mutex poisoned");
        (stats.total, stats.static_served, stats.dynamic_served)
    };
    format!(
        "Stat-Req-Arrival:: {}{crlf}\
         Stat-Req-Dispatch:: {}{crlf}\
         Stat-Thread-Id:: {handler_id}{crlf}\
         Stat-Thread-Count:: {total}{crlf}\
         Stat-Thread-Static:: {static_served}{crlf}\
         Stat-Thread-Dynamic:: {dynamic_served}{crlf}",
        format_stat_time(stamps.arrival),
        format_stat_time(stamps.dispatch),
    )
}

fn serve_static(
    stream: &mut TcpStream,
    filename: &str,
    filesize: u64,
    stamps: Stamps,
    handler_id: usize,
    stats: &Mutex<WorkerStats>,
) -> Result<(), HandlerError> {
    let file = fs::File::open(filename).map_err(HandlerError::Mmap)?;

    // SAFETY: this is the Rust analogue of `request.c`'s `Mmap`; the file
    // descriptor is not modified by anyone else for the lifetime of the
    // mapping, which ends before this function returns.
    let mmap = if filesize > 0 {
        Some(unsafe { Mmap::map(&file) }.map_err(HandlerError::Mmap)?)
    } else {
        None
    };

    let mut headers = format!(
        "HTTP/1.0 200 OK\r\n\
         Server: {SERVER_NAME}\r\n\
         Content-Length: {filesize}\r\n\
         Content-Type: {}\r\n",
        content_type(filename)
    );
    headers.push_str(&stat_headers(stamps, handler_id, stats, "\r\n"));
    headers.push_str("\r\n");

    stream.write_all(headers.as_bytes()).map_err(HandlerError::WriteResponse)?;
    if let Some(mmap) = mmap {
        stream.write_all(&mmap).map_err(HandlerError::WriteResponse)?;
    }
    Ok(())
}

fn serve_dynamic(
    stream: &mut TcpStream,
    filename: &str,
    cgiargs: &str,
    stamps: Stamps,
    handler_id: usize,
    stats: &Mutex<WorkerStats>,
) -> Result<(), HandlerError> {
    let mut headers = format!("HTTP/1.0 200 OK\r\nServer: {SERVER_NAME}\r\n");
    headers.push_str(&stat_headers(stamps, handler_id, stats, "\r\n"));
    stream.write_all(headers.as_bytes()).map_err(HandlerError::WriteResponse)?;

    let child_stdout = stream.try_clone().map_err(HandlerError::CgiSpawn)?;

    // Stdio::from(TcpStream) is the Rust analogue of Dup2(fd, STDOUT_FILENO);
    // Command owns fork+exec, so there is no separate WaitPid call to make —
    // `.status()` blocks until the child exits, same as `WaitPid(pid, NULL, WUNTRACED)`.
    Command::new(filename)
        .env("QUERY_STRING", cgiargs)
        .stdout(Stdio::from(child_stdout))
        .status()
        .map_err(HandlerError::CgiSpawn)?;
    Ok(())
}

fn send_error(
    stream: &mut TcpStream,
    cause: &str,
    errnum: &str,
    shortmsg: &str,
    longmsg: &str,
    stamps: Stamps,
    handler_id: usize,
    stats: &Mutex<WorkerStats>,
) -> Result<(), HandlerError> {
    let trailing_newlines = match errnum {
        "404" => "\n\n\n\n\n",
        "403" => "\n\n\n\n\n",
        _ => "\n\n\n\n",
    };
    let body = format!(
        "<html><title>OS-HW3 Error</title><body bgcolor=fffff>\n\
         {errnum}: {shortmsg}\n\
         <p>{longmsg}: {cause}\n\
         <hr>{SERVER_NAME}{trailing_newlines}"
    );

    let mut head = format!(
        "HTTP/1.0 {errnum} {shortmsg}\n\
         Content-Type: text/html\n\
         Content-Length: {}\n",
        body.len()
    );
    head.push_str(&stat_headers(stamps, handler_id, stats, "\n"));
    head.push('\n');

    stream.write_all(head.as_bytes()).map_err(HandlerError::WriteResponse)?;
    stream.write_all(body.as_bytes()).map_err(HandlerError::WriteResponse)?;
    Ok(())
}
