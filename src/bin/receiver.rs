//! MRC Receiver Application
//!
//! Connects to a headset, decodes its capture stream and serves the control API.
//!
//! Usage: `receiver [config.toml]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mrc_receiver::{
    codec::{decoder_factory, ffmpeg_converter_factory, FfmpegDecoder},
    config::AppConfig,
    network::{TcpConnector, TransportSubsystem},
    pipeline::ChannelAudioSink,
    source::MrcSource,
    ui::WebServer,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MRC Receiver");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    let subsystem = TransportSubsystem::init();

    let (audio_sink, audio_rx) = ChannelAudioSink::new(config.stream.audio_queue_capacity);
    let audio_sink = Arc::new(audio_sink);

    let source = Arc::new(MrcSource::new(
        &config,
        Box::new(TcpConnector::new(&config.network)),
        decoder_factory(FfmpegDecoder::new),
        ffmpeg_converter_factory(),
        audio_sink.clone(),
    ));

    // Start web UI
    let _web_handle = if config.ui.enabled {
        tracing::info!(
            "Control API available at http://{}:{}",
            config.ui.bind_address,
            config.ui.http_port
        );
        Some(WebServer::new(config.ui.clone(), source.clone()).start_background())
    } else {
        None
    };

    if config.network.auto_connect {
        let connecting = source.clone();
        match tokio::task::spawn_blocking(move || connecting.connect()).await? {
            Ok(()) => tracing::info!(
                "Connected to {}:{}",
                config.network.address,
                config.network.port
            ),
            Err(e) => tracing::warn!("Auto-connect failed: {}", e),
        }
    } else {
        tracing::info!("Waiting for a connect request...");
    }

    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_stats_time = Instant::now();
    let mut audio_blocks = 0u64;
    let mut audio_us = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = source.on_tick_in_place();
                if summary.disconnected {
                    tracing::warn!("Connection lost");
                }

                // Drain synchronized audio
                while let Ok(block) = audio_rx.try_recv() {
                    audio_blocks += 1;
                    audio_us += block.duration_us();
                }

                if last_stats_time.elapsed() >= STATS_INTERVAL {
                    let status = source.status();
                    tracing::info!(
                        "Connected: {}, video frames: {}, presented: {}, decode errors: {}, \
                         audio blocks: {} ({:.1} s), pending audio: {}, dropped: {}",
                        status.connected,
                        status.pipeline.video_frames_decoded,
                        status.frames_presented,
                        status.pipeline.decode_errors,
                        audio_blocks,
                        audio_us as f64 / 1_000_000.0,
                        status.pending_audio,
                        status.pipeline.audio_frames_dropped + audio_sink.dropped(),
                    );
                    last_stats_time = Instant::now();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    if source.is_connected() {
        if let Err(e) = source.disconnect() {
            tracing::warn!("Disconnect failed: {}", e);
        }
    }
    subsystem.shutdown();

    Ok(())
}
