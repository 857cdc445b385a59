use log::{Level, info, logger};
use spectral::{CLOSE_APPLICATION, Listener};
use spectral_log::SpectralLogger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    SpectralLogger::init(Level::Debug, 1024)?;

    let listener = Listener::bind("127.0.0.1:8080").await?;
    info!("Echo server started on 127.0.0.1:8080");

    let connection = listener.accept().await?;
    let stream = connection.accept_stream().await?;

    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await?;
    info!("Received: {}", String::from_utf8_lossy(&buf[..n]));
    stream.write(&buf[..n]).await?;
    stream.close()?;

    connection.closed().await;
    connection.close_with_error(CLOSE_APPLICATION, "").await;
    logger().flush();
    Ok(())
}
