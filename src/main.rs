// src/main.rs

use clap::Parser;
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use scene2story::{
    measure_story, AppError, BottomCrop, CacheSweeper, CommandLineInput, ContentCache,
    ExtractionConfig, ExtractionCoordinator, HttpTransport, HydrationReport, ImageHydrator,
    RefreshCallback, RetryingFetcher, Story,
};
use std::fs;
use std::sync::Arc;

/// Sets up logging configuration. Logs go to stderr so stdout stays pure JSON.
fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let log_file_path = std::env::temp_dir().join("scene2story.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "{m}{n}"
    };

    let stderr_appender = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr_appender)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file_appender)),
        )
        .build(
            Root::builder()
                .appender("stderr")
                .appender("file")
                .build(log_level),
        )?;

    log4rs::init_config(config)?;
    log::info!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

/// Reads the raw payload from a file, or from stdin when the path is "-".
async fn read_payload(source: &str) -> Result<String, AppError> {
    if source == "-" {
        use tokio::io::AsyncReadExt;
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        Ok(raw)
    } else {
        Ok(tokio::fs::read_to_string(source).await?)
    }
}

fn print_story(label: &str, story: &Story) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(story).map_err(|e| AppError::InternalError {
        message: format!("could not serialize {} story", label),
        source: Some(Box::new(e)),
    })?;
    println!("{}", json);
    Ok(())
}

/// Builds the cache stack, runs one extraction session and reports the result.
async fn execute(cli: &CommandLineInput, config: &ExtractionConfig) -> Result<(), AppError> {
    let payload_path = cli.payload.clone();
    let source = async move { read_payload(&payload_path).await };

    if cli.no_hydrate {
        let coordinator = ExtractionCoordinator::without_hydration(config);
        let story = coordinator.submit(source, |_| {}, None).wait().await?;
        print_story("decoded", &story)?;
        eprintln!("✓ {}", measure_story(&story));
        return Ok(());
    }

    let policy = config.retry_policy();
    let fetcher = RetryingFetcher::new(Arc::new(HttpTransport::new(&policy)?), policy);
    let mut cache = ContentCache::open(config.cache_policy(), fetcher).await?;
    if config.crop_bottom_px > 0 {
        cache = cache.with_post_processor(Arc::new(BottomCrop::new(config.crop_bottom_px)));
    }
    let cache = Arc::new(cache);
    let sweeper = CacheSweeper::spawn(Arc::clone(&cache), config.sweep_interval);

    let hydrator = ImageHydrator::new(Arc::clone(&cache), config.hydration_task_timeout);
    let coordinator = ExtractionCoordinator::new(hydrator, config);

    let final_only = cli.final_only;
    let (report_tx, mut report_rx) = tokio::sync::oneshot::channel::<HydrationReport>();
    let on_refresh: RefreshCallback = Box::new(move |story, report| {
        log::info!("Refreshed '{}': {}", story.display_title(), report);
        let _ = report_tx.send(report);
    });

    let result = coordinator
        .submit(
            source,
            move |fast| {
                if let Ok(story) = fast {
                    if !final_only {
                        if let Err(e) = print_story("decoded", &story) {
                            log::error!("{}", e);
                        }
                    }
                }
            },
            Some(on_refresh),
        )
        .wait()
        .await;

    let report = sweeper.shutdown().await;
    if !report.removed.is_empty() {
        log::info!("Shutdown sweep freed {} bytes", report.freed_bytes());
    }

    let story = result?;
    print_story("hydrated", &story)?;

    match report_rx.try_recv() {
        Ok(report) => eprintln!("✓ {}; {}", measure_story(&story), report),
        Err(_) => eprintln!("✓ {}", measure_story(&story)),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CommandLineInput::parse();

    setup_logging(cli.verbose)?;

    let config = ExtractionConfig::resolve(&cli)?;

    execute(&cli, &config).await?;

    Ok(())
}
