use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub fn create_progress_bar(multi: &MultiProgress) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} {pos} packets\n{msg} | elapsed: {elapsed_precise}",
    )?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("waiting for packets");
    Ok(pb)
}

pub fn finalize_progress_bar(pb: &Option<ProgressBar>, packets: u64, pages: usize) {
    if let Some(pb) = pb {
        pb.set_style(
            ProgressStyle::with_template("{pos} packets\n{msg} | elapsed: {elapsed_precise}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_position(packets);
        pb.finish_with_message(format!("{pages} pages received"));
    }
}
