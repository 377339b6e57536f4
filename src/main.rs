use std::sync::Arc;

use anyhow::Context as _;
use env_logger::Env;
use log::info;

use round_tracer::config_loader::ConfigFileLoader;
use round_tracer::observer::LogObserver;
use round_tracer::vulkan::context::Context;
use round_tracer::PathTracer;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let mut config_loader = ConfigFileLoader::new(config_path);
    let config = config_loader.load_config()?.clone();

    let context = Arc::new(Context::new(config.enable_validation)?);

    let mut path_tracer = PathTracer::new(context, config.render_settings());
    path_tracer.set_observer(Box::new(LogObserver));
    path_tracer.load_environment(&config.environment_path);
    for model_path in &config.model_paths {
        path_tracer.load_model(model_path);
    }

    path_tracer.init()?;

    let elapsed = path_tracer.run()?;
    info!("rendered in {:.3} ms", elapsed as f64 / 1_000_000.0);

    {
        let mapped = path_tracer.map_image()?;
        image::save_buffer(
            &config.output_path,
            &mapped.to_packed(),
            mapped.width,
            mapped.height,
            image::ColorType::Rgba8,
        )
        .with_context(|| format!("writing {}", config.output_path.display()))?;
    }
    info!("saved {}", config.output_path.display());

    path_tracer.destroy()?;
    Ok(())
}
