//! Card scanner demo: simulated camera feeding a stub text recognizer

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cardscan::capture::SimulatedCamera;
use cardscan::recognition::card::extract_card;
use cardscan::recognition::{self, RecognitionError, TextLine};
use cardscan::{CameraSession, Config, ScanEvent};
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Pretends to read a card once the image has "settled": early frames come
/// back empty, every seventh frame fails, and later frames carry the usual
/// lookalike-glyph misreads.
fn stub_recognizer() -> impl cardscan::Recognizer {
    recognition::from_fn(|image| {
        if image.sequence % 7 == 0 {
            return Err(RecognitionError::Failed("image too blurry".into()));
        }
        if image.sequence < 20 {
            return Ok(Vec::new());
        }
        Ok(vec![
            TextLine::new("VISA", 0),
            TextLine::new("4H11 1L11 1111 1111", 0),
            TextLine::new("D9/2E", 0),
        ])
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cardscan=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Card scanner launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    cardscan::CONFIG.store(Arc::new(config.clone()));

    let camera = SimulatedCamera::open(config.capture.facing, &config.simulator);
    let mut session = CameraSession::new(camera, stub_recognizer());
    let events = session.events();

    let pair = session.start()?;
    info!(preview = %pair.preview, picture = %pair.picture, "Scanning");

    let deadline = tokio::time::sleep(Duration::from_secs(config.simulator.run_seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Run time elapsed without a card");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.recv_async() => match event {
                Ok(ScanEvent::Recognized { sequence, lines }) => {
                    if let Some(card) = extract_card(&lines) {
                        info!(sequence, number = %card.number, expiry = %card.expiry, "Card recognized");
                        break;
                    }
                }
                Ok(ScanEvent::Failed { sequence, error }) => {
                    warn!(sequence, %error, "Recognition failed");
                }
                Ok(ScanEvent::Camera(status)) => info!(?status, "Camera status changed"),
                Err(_) => break,
            }
        }
    }

    session.stop();
    let stats = session.stats();
    info!(
        delivered = stats.pool.delivered,
        recycled = stats.pool.recycled,
        superseded = stats.exchange.superseded,
        processed = stats.worker.processed,
        "Pipeline totals"
    );
    session.close();

    info!("Card scanner shutting down");
    Ok(())
}
