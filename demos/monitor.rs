//! Connect to a receiver and log every state change.
//!
//! Usage: `cargo run --example monitor -- <host> [port]`

use nad_amp::{ConnectionConfig, NadClient, StateUpdate, DEFAULT_PORT};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().ok_or("usage: monitor <host> [port]")?;
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    let client = NadClient::connect(ConnectionConfig::new(host).with_port(port)).await?;

    println!("Model:   {}", client.model().unwrap_or_default());
    println!("Volume:  {}", client.volume());
    println!("Sources: {}", client.sources().join(", "));
    println!("Current: {}", client.current_source().unwrap_or_default());

    let mut updates = client.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update? {
                StateUpdate::Changed(message) => {
                    let snapshot = client.snapshot();
                    println!(
                        "{:<28} volume={} source={}",
                        message,
                        snapshot.volume,
                        snapshot.current_source_name().unwrap_or("-")
                    );
                }
                StateUpdate::Initialised(model) => println!("Device ready: {}", model),
            },
        }
    }

    client.close();
    Ok(())
}
