use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Row progress for the blended output; hidden unless `visible`.
pub fn bar(prefix: String, n_rows: u64, visible: bool) -> Result<ProgressBar> {
    let pb = if visible {
        ProgressBar::new(n_rows)
    } else {
        ProgressBar::hidden()
    };
    pb.set_prefix(prefix);
    pb.set_style(
        ProgressStyle::with_template("{prefix}...\n[{wide_bar:.cyan/blue}] {pos}/{len} rows")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
