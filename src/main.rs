use anyhow::Result;
use clap::Parser;
use picture_uploader::app::{App, AppOptions, DEFAULT_CONCURRENCY};
use picture_uploader::markup::RenderOptions;
use picture_uploader::models::Config;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "picture-uploader")]
#[command(about = "Upload photos and generate responsive <picture> markup")]
struct CliArgs {
    /// Batch file listing the photos to upload.
    #[arg(long, value_name = "PATH", default_value = "photosToUpload.json")]
    input: PathBuf,

    /// File the generated markup is appended to.
    #[arg(long, value_name = "PATH", default_value = "output.html")]
    output: PathBuf,

    /// Do not emit WebP <source> alternates.
    #[arg(long)]
    no_webp: bool,

    /// Also emit a block using the service's own breakpoint URLs.
    #[arg(long)]
    native_block: bool,

    /// Emit only the service-URL block.
    #[arg(long, conflicts_with = "native_block")]
    native_only: bool,

    /// Maximum uploads in flight at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY as u16, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Simulate uploads instead of calling the service.
    #[arg(long)]
    dry_run: bool,
}

impl CliArgs {
    fn app_options(&self) -> AppOptions {
        AppOptions {
            output_path: self.output.clone(),
            render: RenderOptions {
                webp: !self.no_webp,
                native_block: self.native_block,
                native_only: self.native_only,
            },
            concurrency: usize::from(self.concurrency),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "picture_uploader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting picture-uploader");

    let args = CliArgs::parse();

    let config = match Config::from_env(args.dry_run) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app = App::new(&config, args.app_options());
    match app.run(&args.input).await {
        Ok(report) => {
            info!(
                "Upload run finished ({} rendered, {} skipped, {} failed)",
                report.rendered, report.skipped, report.failed
            );
            Ok(())
        }
        Err(e) => {
            error!("Batch failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["picture-uploader"]).unwrap();
        let options = args.app_options();

        assert_eq!(args.input.to_str(), Some("photosToUpload.json"));
        assert_eq!(options.output_path.to_str(), Some("output.html"));
        assert!(options.render.webp);
        assert!(!options.render.native_block);
        assert_eq!(options.concurrency, 4);
    }

    #[test]
    fn test_render_flags() {
        let args =
            CliArgs::try_parse_from(["picture-uploader", "--no-webp", "--native-only"]).unwrap();
        let render = args.app_options().render;

        assert!(!render.webp);
        assert!(render.native_only);
    }

    #[test]
    fn test_native_flags_conflict() {
        assert!(
            CliArgs::try_parse_from(["picture-uploader", "--native-block", "--native-only"])
                .is_err()
        );
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(CliArgs::try_parse_from(["picture-uploader", "--concurrency", "0"]).is_err());
    }
}
