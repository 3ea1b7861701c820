use std::net::UdpSocket;
use std::sync::{Arc, RwLock};
use std::thread;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use udpscope::args::{convert_filter, Args};
use udpscope::buffer::{ring_capacity, SampleBuffer};
use udpscope::capture::{capture_udp, CaptureQueue};
use udpscope::hub::Hub;
use udpscope::relay::FgRelay;
use udpscope::server::{router, AppState};
use udpscope::trigger::{run_trigger_stage, TriggerController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    // Listener binds are the only fatal errors; everything after this point
    // recovers locally.
    let udp = UdpSocket::bind(&args.udp)
        .with_context(|| format!("binding UDP ingest socket on {}", args.udp))?;
    let http = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("binding HTTP listener on {}", args.listen))?;

    let capacity = ring_capacity(args.history, args.sample_rate);
    info!(
        udp = %args.udp,
        http = %args.listen,
        sample_rate = args.sample_rate,
        history_secs = args.history,
        ring_capacity = capacity,
        ui_fps = args.ui_fps,
        "udpscope starting"
    );

    let buffer = Arc::new(RwLock::new(SampleBuffer::new(
        capacity,
        args.sample_rate,
        args.history,
    )));
    let trigger = Arc::new(TriggerController::new(args.sample_rate));
    let relay = match FgRelay::connect(&args.fg_addr) {
        Ok(relay) => {
            if relay.is_enabled() {
                info!(fg_addr = %args.fg_addr, "function generator relay enabled");
            }
            Arc::new(relay)
        }
        Err(e) => {
            warn!(fg_addr = %args.fg_addr, error = %e, "fg relay unavailable, disabling");
            Arc::new(FgRelay::disabled())
        }
    };

    let (capture_tx, capture_rx) = CaptureQueue::new(args.ingest_q).split();

    let dump = args.dump_packets;
    thread::Builder::new()
        .name("udp-reader".into())
        .spawn(move || capture_udp(udp, capture_tx, dump))
        .context("spawning reader thread")?;

    let trigger_stage = trigger.clone();
    let buffer_stage = buffer.clone();
    thread::Builder::new()
        .name("trigger".into())
        .spawn(move || run_trigger_stage(capture_rx, trigger_stage, buffer_stage))
        .context("spawning trigger thread")?;

    let hub = Arc::new(Hub::new(buffer, trigger, args.ui_fps));
    tokio::spawn(hub.clone().run());

    let app = router(AppState { hub, relay });
    info!("serving viewer at http://{}", args.listen);
    axum::serve(http, app).await.context("http server failed")?;

    Ok(())
}
