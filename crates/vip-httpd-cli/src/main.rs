//! CLI entry point: `vip-httpd --port <port> --threads <threads> --queue-size <size> --policy <policy>`.
//!
//! Mirrors `server.c`'s `getArguments` + `main`: validate, then either run
//! forever or print a usage-shaped error to stderr and exit 1.

use clap::Parser;
use vip_httpd::ServerConfig;

/// Concurrent bounded-capacity HTTP/1.0 server with VIP admission control.
#[derive(Parser, Debug)]
#[command(name = "vip-httpd", about = "server <port> <threads> <queue_size> <schedalg>")]
struct Args {
    /// TCP port to listen on
    #[arg(long)]
    port: u16,

    /// Number of ordinary worker threads
    #[arg(long)]
    threads: i64,

    /// Shared capacity budget across the vip/waiting/running queues
    #[arg(long = "queue-size")]
    queue_size: i64,

    /// Overload policy applied to ordinary admission when capacity is exhausted
    #[arg(long, value_parser = ["block", "dt", "dh", "bf", "random"])]
    policy: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match ServerConfig::new(args.port, args.threads, args.queue_size, &args.policy) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = vip_httpd::run(config) {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
