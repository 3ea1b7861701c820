//! Argument parsing for running from the command line

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// HTTP listen address for the viewer and websocket endpoint
    #[clap(long, default_value = "0.0.0.0:8080")]
    pub listen: String,
    /// UDP listen address for the ADC sample stream
    #[clap(long, default_value = "0.0.0.0:5000")]
    pub udp: String,
    /// Maximum websocket frame rate (frames per second)
    #[clap(long, default_value_t = 30)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..=240))]
    pub ui_fps: u32,
    /// Seconds of sample history to retain per channel
    #[clap(long, default_value_t = 5.0)]
    pub history: f64,
    /// Capture queue depth between reader and trigger stage
    #[clap(long, default_value_t = 64)]
    pub ingest_q: usize,
    /// Per-channel sample rate of the source in Hz
    #[clap(long, default_value_t = 1_255_800)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..))]
    pub sample_rate: u32,
    /// Function generator relay endpoint, e.g. 192.168.10.2:6001 (empty = disabled)
    #[clap(long, default_value = "")]
    pub fg_addr: String,
    /// Log a one-line summary of every UDP packet
    #[clap(long)]
    pub dump_packets: bool,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
