//! Send a few frames through a running relay and print the replies
//!
//! Several of these can run at once; each only ever sees its own replies.

use canrelay::FRAME_SIZE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let addr = std::env::var("RELAY_ADDR").unwrap_or_else(|_| "127.0.0.1:2002".to_string());
    let mut sock = TcpStream::connect(&addr).await?;
    println!("✓ Connected to {}", addr);

    let pid = std::process::id();
    let msg = format!("{:*<width$}", pid, width = FRAME_SIZE);

    for _ in 0..3 {
        sock.write_all(msg.as_bytes()).await?;

        let mut reply = [0u8; FRAME_SIZE];
        sock.read_exact(&mut reply).await?;

        println!("Sent: {}  Received: {}", msg, String::from_utf8_lossy(&reply));
    }

    Ok(())
}
