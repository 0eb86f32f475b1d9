use clap::Parser;

#[tokio::main]
async fn main() {
    let args = migrator::arguments::Arguments::parse();
    observe::tracing::initialize(
        "warn,migrator=debug,checkpoint=debug",
        tracing::Level::ERROR.into(),
    );
    tracing::info!("running migrator with validated arguments:\n{}", args);
    if let Err(err) = migrator::run(args).await {
        tracing::error!(?err, "command failed");
        std::process::exit(1);
    }
}
