use std::sync::Arc;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ttx::process::decode::Decoder;

use super::command::{Cli, InfoArgs};
use super::config::load_decoder_config;
use super::decode::decoder_thread::{DecodeSummary, DecoderThreadConfig, decode_input};
use crate::timestamp::service_time_str;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing teletext stream: {}", args.input.display());

    let config = load_decoder_config(cli.config.as_deref(), &args.decoder)?;
    let decoder = Arc::new(Decoder::new(config)?);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {pos} packets {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("analyzing");
            Some(pb)
        }
        None => None,
    };

    let summary = decode_input(&DecoderThreadConfig {
        input_path: args.input.clone(),
        input_format: args.decoder.input_format,
        strict_mode: cli.strict,
        decoder: Arc::clone(&decoder),
        pb: pb.clone(),
    })?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if summary.packets == 0 {
        println!("No teletext packets found in the input.");
        return Ok(());
    }

    print_packet_stats(&decoder, &summary);
    print_page_stats(&decoder);
    print_service_data(&decoder);
    print_top_stats(&decoder);

    Ok(())
}

fn print_packet_stats(decoder: &Decoder, summary: &DecodeSummary) {
    let stats = decoder.stats();

    println!("Packets");
    println!("  Packets processed         {}", summary.packets);
    println!("  Hamming errors            {}", stats.errors);
    println!("  Outside caching window    {}", stats.out_of_window);
    if summary.trailing_bytes > 0 {
        println!("  Trailing bytes            {}", summary.trailing_bytes);
    }

    let magazines: Vec<String> = stats
        .magazine_packets
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(m, count)| format!("{}:{count}", if m == 0 { 8 } else { m }))
        .collect();
    println!("  Magazines                 {}", magazines.join(" "));
    println!();
}

fn print_page_stats(decoder: &Decoder) {
    let visible = decoder.visible_page_numbers(usize::MAX);
    let non_visible = decoder.non_visible_page_numbers(usize::MAX);
    let codes = decoder.received_page_codes();

    println!("Pages");
    println!("  Pages received            {}", decoder.received_pages_count());
    println!("  Cached pages              {}", codes.len());
    println!("  Visible page numbers      {}", visible.len());
    println!("  Non-visible page numbers  {}", non_visible.len());

    if let (Some(first), Some(last)) = (visible.iter().min(), visible.iter().max()) {
        println!("  Page range                {first:03X}-{last:03X}");
    }
    println!();
}

fn print_service_data(decoder: &Decoder) {
    let service = decoder.service_data();

    println!("Broadcast Service Data");
    println!(
        "  Network ID                {:#06X} (previous {:#06X})",
        service.network_id[0], service.network_id[1]
    );
    match service.initial_page {
        Some(code) => println!("  Initial page              {code}"),
        None => println!("  Initial page              none"),
    }
    println!("  Date/time                 {}", service_time_str(&service));
    println!(
        "  Time offset               {}{}:{:02}",
        if service.time_offset < 0 { '-' } else { '+' },
        service.time_offset.unsigned_abs() / 2,
        (service.time_offset.unsigned_abs() % 2) * 30
    );
    println!("  Status display            {}", service.status_text());
    println!();
}

fn print_top_stats(decoder: &Decoder) {
    let top = decoder.top_stats();

    println!("TOP-Text");
    println!("  BTT page levels           {}", top.levels);
    println!("  MPT sub-page counts       {}", top.sub_page_counts);
    println!("  AIT titles                {}", top.titles);
    println!("  Additional table pages    {}", top.extra_pages);
    println!();
}
