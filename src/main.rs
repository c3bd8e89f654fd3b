use anyhow::{bail, Result};
use tracing::{info, warn};

use blockcarve::{cli, config, engine, formats, logging, metadata};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let cfg = loaded.config;

    let names: Vec<String> = cli_opts
        .types
        .clone()
        .unwrap_or_else(|| cfg.enabled_formats.clone());
    let (mask, unknown) = formats::mask_from_names(&names);
    for name in unknown {
        warn!("unknown file type in --types: {name}");
    }
    if !mask.iter().any(|enabled| *enabled) {
        bail!("no file types enabled");
    }

    info!(
        "starting run_id={} input={} output={}",
        cfg.run_id,
        cli_opts.input.display(),
        cli_opts.output.display()
    );

    std::fs::create_dir_all(&cli_opts.output)?;
    let sink = metadata::build_sink(
        env!("CARGO_PKG_VERSION"),
        &loaded.config_hash,
        &cli_opts.input,
        &cli_opts.output,
    )?;

    let mut session = engine::CarveSession::new(
        &cli_opts.input,
        &cli_opts.output,
        mask,
        cfg.mp3.clone(),
    )
    .with_run_id(&cfg.run_id)
    .with_metadata(sink);

    let mut last_percent = u8::MAX;
    let mut hooks = engine::HostHooks::new(
        |message| info!("{message}"),
        |percent| {
            if percent != last_percent {
                last_percent = percent;
                info!("progress: {percent}%");
            }
        },
        || false,
    );

    match session.run(&mut hooks) {
        Ok(summary) => {
            info!(
                "carve finished: {} files recovered from {} bytes",
                summary.total_recovered, summary.bytes_scanned
            );
            Ok(())
        }
        Err(engine::RunError::Cancelled) => bail!("carve cancelled"),
        Err(err) => Err(err.into()),
    }
}
