use log::{Level, info, logger};
use spectral::CLOSE_APPLICATION;
use spectral_log::SpectralLogger;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    SpectralLogger::init(Level::Debug, 1024)?;

    let connection = spectral::dial("127.0.0.1:8080", Duration::from_secs(10)).await?;
    let stream = connection.open_stream().await?;

    let message = "Hello, World!";
    stream.write(message.as_bytes()).await?;

    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await?;
    info!("Received echo: {}", String::from_utf8_lossy(&buf[..n]));

    stream.close()?;
    connection.close_with_error(CLOSE_APPLICATION, "").await;
    connection.closed().await;
    logger().flush();
    Ok(())
}
