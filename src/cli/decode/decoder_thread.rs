use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use indicatif::ProgressBar;
use log::Level;
use ttx::log_or_err;
use ttx::process::decode::Decoder;
use ttx::utils::errors::PacketError;

use crate::cli::command::InputFormat;
use crate::input::{InputReader, PacketReader};

/// Errors at or above `fail_level` abort decoding.
pub struct FailState {
    pub fail_level: Level,
}

impl FailState {
    pub fn new(strict: bool) -> Self {
        Self {
            fail_level: if strict { Level::Warn } else { Level::Error },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeSummary {
    pub packets: u64,
    pub dropped: u64,
    pub trailing_bytes: usize,
}

pub struct DecoderThreadConfig {
    pub input_path: PathBuf,
    pub input_format: InputFormat,
    pub strict_mode: bool,
    pub decoder: Arc<Decoder>,
    pub pb: Option<ProgressBar>,
}

/// Removes the decoder's event sink when dropped, also while unwinding, so a
/// channel based sink always sees its receiver disconnect.
struct SinkReset<'a>(&'a Decoder);

impl Drop for SinkReset<'_> {
    fn drop(&mut self) {
        self.0.set_event_sink(None);
    }
}

/// Feeds the whole input into the decoder on a worker thread.
pub fn spawn_decoder_thread(
    config: DecoderThreadConfig,
) -> thread::JoinHandle<Result<DecodeSummary>> {
    thread::spawn(move || -> Result<DecodeSummary> {
        let _reset = SinkReset(&config.decoder);
        decode_input(&config)
    })
}

pub fn decode_input(config: &DecoderThreadConfig) -> Result<DecodeSummary> {
    let state = FailState::new(config.strict_mode);
    let mut reader = PacketReader::new(config.input_format, state.fail_level);
    let mut input_reader = InputReader::new(&config.input_path)?;
    let mut summary = DecodeSummary::default();

    input_reader.process_chunks(64 * 1024, |chunk| {
        reader.push_bytes(chunk);
        process_packets(&mut reader, &config.decoder, &state, &mut summary, &config.pb)?;
        Ok(true)
    })?;

    summary.trailing_bytes = reader.trailing_bytes();
    if summary.trailing_bytes > 0 {
        log_or_err!(
            state,
            Level::Warn,
            anyhow::anyhow!("Input ends with {} bytes of a partial packet", summary.trailing_bytes)
        );
    }

    log::info!(
        "Processing complete: {} packets, {} dropped, {} pages",
        summary.packets,
        summary.dropped,
        config.decoder.received_pages_count()
    );
    Ok(summary)
}

pub fn process_packets(
    reader: &mut PacketReader,
    decoder: &Decoder,
    state: &FailState,
    summary: &mut DecodeSummary,
    pb: &Option<ProgressBar>,
) -> Result<()> {
    loop {
        let packet = match reader.next_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(e) => {
                log_or_err!(state, Level::Warn, anyhow::Error::from(e));
                continue;
            }
        };

        summary.packets += 1;
        match decoder.decode_packet(&packet.data) {
            Ok(()) => {}
            Err(PacketError::OutOfWindow { .. }) => summary.dropped += 1,
            Err(e) => {
                summary.dropped += 1;
                log_or_err!(
                    state,
                    Level::Warn,
                    anyhow::anyhow!("Packet {}: {e}", summary.packets)
                );
            }
        }

        if let Some(pb) = pb {
            if summary.packets % 256 == 0 {
                pb.set_position(summary.packets);
                pb.set_message(format!("{} pages", decoder.received_pages_count()));
            }
        }
    }

    Ok(())
}
