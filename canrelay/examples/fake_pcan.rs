//! Fake PCAN-Ethernet gateway for trying the daemon without hardware
//!
//! Listens for the daemon's lan2can connection on port 2000, dials back to
//! the daemon's can2lan port 2001, and answers every frame with its bytes
//! reversed after a short delay.
//!
//! ```bash
//! cargo run --example fake_pcan &
//! cargo run --bin canrelayd -- --host 127.0.0.1 -v
//! cargo run --example send_frame
//! ```

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, info};

use canrelay::FRAME_SIZE;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let listener = TcpListener::bind("127.0.0.1:2000").await?;
    info!("Fake PCAN waiting for lan2can on 127.0.0.1:2000");
    let (mut lan2can, peer) = listener.accept().await?;
    info!("lan2can connected from {}", peer);

    let mut can2lan = loop {
        match TcpStream::connect("127.0.0.1:2001").await {
            Ok(sock) => break sock,
            Err(_) => {
                debug!("Waiting for the relay to open can2lan");
                sleep(Duration::from_secs(1)).await;
            }
        }
    };
    info!("can2lan connected");

    let mut buf = [0u8; FRAME_SIZE];
    loop {
        if lan2can.read_exact(&mut buf).await.is_err() {
            info!("Relay went away");
            return Ok(());
        }

        // Slow enough that concurrent clients visibly queue
        sleep(Duration::from_millis(250)).await;

        buf.reverse();
        can2lan.write_all(&buf).await?;
        debug!("Replied {:02x?}", &buf[..8]);
    }
}
