use std::sync::{Arc, mpsc};

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar};
use ttx::process::decode::Decoder;
use ttx::process::elements::ParseFlags;
use ttx::process::event::DecoderEvent;
use ttx::structs::page::PageCode;

use super::decoder_thread::{DecoderThreadConfig, spawn_decoder_thread};
use super::output::{create_writer, write_dump};
use super::progress::{create_progress_bar, finalize_progress_bar};
use super::render::render_page;
use crate::cli::command::{Cli, DecodeArgs};
use crate::cli::config::load_decoder_config;

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = load_decoder_config(cli.config.as_deref(), &args.decoder)?;

    log::info!(
        "Decoding teletext stream: {} (format: {:?}, strict mode: {}, page: {:03X})",
        args.input.display(),
        args.decoder.input_format,
        cli.strict,
        config.initial_page
    );

    let decoder = Arc::new(Decoder::new(config)?);
    let (tx, rx) = mpsc::channel();
    decoder.set_event_sink(Some(Arc::new(tx)));

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi)?),
        None => None,
    };

    let decode_thread = spawn_decoder_thread(DecoderThreadConfig {
        input_path: args.input.clone(),
        input_format: args.decoder.input_format,
        strict_mode: cli.strict,
        decoder: Arc::clone(&decoder),
        pb: pb.clone(),
    });

    while let Ok(event) = rx.recv() {
        match event {
            DecoderEvent::PageUpdate(code) if args.watch => print_page(&decoder, code, &pb),
            DecoderEvent::WaitingPageResolved(code) => {
                log::debug!("Waiting page {code} arrived");
            }
            _ => {}
        }
    }

    let summary = match decode_thread.join() {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            if let Some(pb) = pb {
                pb.finish_with_message("decode failed");
            }
            return Err(e);
        }
        Err(_) => {
            if let Some(pb) = pb {
                pb.finish_with_message("decode thread panicked");
            }
            return Err(anyhow::anyhow!("Decode thread panicked"));
        }
    };

    finalize_progress_bar(&pb, summary.packets, decoder.received_pages_count());

    let mut writer = create_writer(args.output.as_deref(), args.dump_format)?;
    let written = write_dump(&mut writer, &decoder, args.dump_format)?;
    log::info!("Wrote {written} pages");

    Ok(())
}

fn print_page(decoder: &Decoder, code: PageCode, pb: &Option<ProgressBar>) {
    let Some(mut page) = decoder.get_display_page(code) else {
        return;
    };
    decoder.display_header(&mut page, false);

    let text = render_page(&page, ParseFlags::default())
        .iter()
        .map(|row| row.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    match pb {
        Some(pb) => pb.suspend(|| println!("{text}\n")),
        None => println!("{text}\n"),
    }
}
